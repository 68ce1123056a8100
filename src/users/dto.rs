use serde::{Deserialize, Serialize};

use crate::users::repo_types::User;

/// Request body for create and update.
#[derive(Debug, Default, Deserialize)]
pub struct UserPayload {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Raw `page`/`limit` query values; anything unparsable falls back to defaults.
#[derive(Debug, Default)]
pub struct ListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl ListQuery {
    /// Keeps the first value of each key; later repeats are ignored.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut q = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "page" => &mut q.page,
                "limit" => &mut q.limit,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        q
    }
}

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
}

impl Pagination {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl From<ListQuery> for Pagination {
    fn from(q: ListQuery) -> Self {
        Self {
            page: positive_or(q.page.as_deref(), DEFAULT_PAGE),
            limit: positive_or(q.limit.as_deref(), DEFAULT_LIMIT),
        }
    }
}

fn positive_or(raw: Option<&str>, default: i64) -> i64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse {
    pub users: Vec<User>,
    pub page: i64,
    pub limit: i64,
    pub total_users: i64,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: String,
}
