use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::users::repo::UserRepository;
use crate::users::repo_types::{NewUser, User, UserChanges};
use crate::users::validation::ValidationError;

/// Vec-backed repository for tests; keeps insertion order like a heap table.
#[derive(Debug, Default, Clone)]
pub struct InMemoryUserRepository {
    users: Arc<RwLock<Vec<User>>>,
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn count(&self) -> AppResult<i64> {
        Ok(self.users.read().await.len() as i64)
    }

    async fn list(&self, limit: i64, offset: i64) -> AppResult<Vec<User>> {
        let users = self.users.read().await;
        Ok(users
            .iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<User> {
        let users = self.users.read().await;
        users
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .ok_or(AppError::NotFound)
    }

    async fn email_exists(&self, email: &str) -> AppResult<bool> {
        Ok(self.users.read().await.iter().any(|u| u.email == email))
    }

    async fn create(&self, user: NewUser) -> AppResult<User> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.id == user.id) {
            return Err(AppError::Constraint("users_pkey".into()));
        }
        if users.iter().any(|u| u.email == user.email) {
            return Err(ValidationError::DuplicateEmail.into());
        }
        let user = user.into_user();
        users.push(user.clone());
        Ok(user)
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> AppResult<User> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.id != id && u.email == changes.email) {
            return Err(ValidationError::DuplicateEmail.into());
        }
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(AppError::NotFound)?;
        user.name = changes.name;
        user.email = changes.email;
        user.updated_at = changes.updated_at;
        Ok(user.clone())
    }

    async fn delete_by_id(&self, id: Uuid) -> AppResult<(String, String)> {
        let mut users = self.users.write().await;
        let idx = users
            .iter()
            .position(|u| u.id == id)
            .ok_or(AppError::NotFound)?;
        let removed = users.remove(idx);
        Ok((removed.name, removed.email))
    }
}
