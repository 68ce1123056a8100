use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    state::AppState,
    users::{
        dto::{DeleteResponse, ListQuery, PaginatedResponse, Pagination, UserPayload},
        password::{hash_password, verify_password},
        repo_types::{NewUser, User, UserChanges},
        validation::validate,
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

// An id that is not a UUID cannot name a stored row.
fn parse_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound)
}

fn decode(payload: Result<Json<UserPayload>, JsonRejection>) -> AppResult<UserPayload> {
    match payload {
        Ok(Json(p)) => Ok(p),
        Err(e) => {
            warn!(error = %e, "invalid request payload");
            Err(AppError::InvalidPayload)
        }
    }
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> AppResult<Json<PaginatedResponse>> {
    let p = Pagination::from(ListQuery::from_pairs(params));

    let total_users = state.users.count().await?;
    let users = state.users.list(p.limit, p.offset()).await?;

    Ok(Json(PaginatedResponse {
        users,
        page: p.page,
        limit: p.limit,
        total_users,
    }))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<User>> {
    let id = parse_id(&id)?;
    let user = state.users.get_by_id(id).await?;
    Ok(Json(user))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<UserPayload>, JsonRejection>,
) -> AppResult<(StatusCode, Json<User>)> {
    let payload = decode(payload)?;
    validate(&payload, false, state.users.as_ref()).await?;

    let hash = hash_password(&payload.password)?;
    if !verify_password(&payload.password, &hash) {
        return Err(AppError::Encoding("fresh hash failed verification".into()));
    }

    let now = OffsetDateTime::now_utc();
    let user = state
        .users
        .create(NewUser {
            id: Uuid::new_v4(),
            name: payload.name,
            email: payload.email,
            password_hash: hash,
            created_at: now,
            updated_at: now,
            is_active: true,
        })
        .await?;

    info!(user_id = %user.id, "user created");
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UserPayload>, JsonRejection>,
) -> AppResult<Json<User>> {
    let payload = decode(payload)?;
    validate(&payload, true, state.users.as_ref()).await?;

    let id = parse_id(&id)?;
    let user = state
        .users
        .update(
            id,
            UserChanges {
                name: payload.name,
                email: payload.email,
                updated_at: OffsetDateTime::now_utc(),
            },
        )
        .await?;

    info!(user_id = %user.id, "user updated");
    Ok(Json(user))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<DeleteResponse>> {
    let id = parse_id(&id)?;
    let (name, email) = state.users.delete_by_id(id).await?;

    info!(user_id = %id, "user deleted");
    Ok(Json(DeleteResponse {
        message: format!(
            "User {} with ID {} and email {} deleted successfully",
            name, id, email
        ),
    }))
}
