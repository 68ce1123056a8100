use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::users::repo_types::{NewUser, User, UserChanges};
use crate::users::validation::ValidationError;

const EMAIL_UNIQUE_INDEX: &str = "users_email_key";

/// Storage seam for users. Every write runs in its own transaction.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn count(&self) -> AppResult<i64>;

    async fn list(&self, limit: i64, offset: i64) -> AppResult<Vec<User>>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<User>;

    /// Non-locking existence check used before inserts.
    async fn email_exists(&self, email: &str) -> AppResult<bool>;

    async fn create(&self, user: NewUser) -> AppResult<User>;

    /// Touches name, email and updated_at only.
    async fn update(&self, id: Uuid, changes: UserChanges) -> AppResult<User>;

    /// Returns the deleted row's name and email.
    async fn delete_by_id(&self, id: Uuid) -> AppResult<(String, String)>;
}

#[derive(Clone)]
pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

async fn rollback(tx: Transaction<'_, Postgres>) {
    if let Err(e) = tx.rollback().await {
        error!(error = %e, "transaction rollback failed");
    }
}

fn map_write_error(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() && db.constraint() == Some(EMAIL_UNIQUE_INDEX) {
            return ValidationError::DuplicateEmail.into();
        }
        if db.is_unique_violation() || db.is_check_violation() || db.is_foreign_key_violation() {
            return AppError::Constraint(db.message().to_string());
        }
    }
    AppError::Database(e)
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn count(&self) -> AppResult<i64> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await?;
        Ok(total)
    }

    async fn list(&self, limit: i64, offset: i64) -> AppResult<Vec<User>> {
        let rows = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, username, password_hash, created_at, updated_at,
                   last_login, is_active, groups, metadata
            FROM users
            ORDER BY created_at ASC, id ASC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, username, password_hash, created_at, updated_at,
                   last_login, is_active, groups, metadata
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::NotFound)
    }

    async fn email_exists(&self, email: &str) -> AppResult<bool> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.db)
                .await?;
        Ok(exists)
    }

    async fn create(&self, user: NewUser) -> AppResult<User> {
        let mut tx = self.db.begin().await?;

        let inserted = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, name, email, password_hash, created_at, updated_at, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, name, email, username, password_hash, created_at, updated_at,
                      last_login, is_active, groups, metadata
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.updated_at)
        .bind(user.is_active)
        .fetch_one(&mut *tx)
        .await;

        let created = match inserted {
            Ok(u) => u,
            Err(e) => {
                rollback(tx).await;
                return Err(map_write_error(e));
            }
        };

        tx.commit().await?;
        debug!(user_id = %created.id, "user inserted");
        Ok(created)
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> AppResult<User> {
        let mut tx = self.db.begin().await?;

        let updated = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
               SET name = $1, email = $2, updated_at = $3
             WHERE id = $4
            RETURNING id, name, email, username, password_hash, created_at, updated_at,
                      last_login, is_active, groups, metadata
            "#,
        )
        .bind(&changes.name)
        .bind(&changes.email)
        .bind(changes.updated_at)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await;

        let user = match updated {
            Ok(Some(u)) => u,
            Ok(None) => {
                rollback(tx).await;
                return Err(AppError::NotFound);
            }
            Err(e) => {
                rollback(tx).await;
                return Err(map_write_error(e));
            }
        };

        tx.commit().await?;
        debug!(user_id = %id, "user updated");
        Ok(user)
    }

    async fn delete_by_id(&self, id: Uuid) -> AppResult<(String, String)> {
        let mut tx = self.db.begin().await?;

        let current = sqlx::query_as::<_, (String, String)>(
            "SELECT name, email FROM users WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await;

        let (name, email) = match current {
            Ok(Some(row)) => row,
            Ok(None) => {
                rollback(tx).await;
                return Err(AppError::NotFound);
            }
            Err(e) => {
                rollback(tx).await;
                return Err(e.into());
            }
        };

        if let Err(e) = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
        {
            rollback(tx).await;
            return Err(map_write_error(e));
        }

        tx.commit().await?;
        debug!(user_id = %id, "user deleted");
        Ok((name, email))
    }
}
