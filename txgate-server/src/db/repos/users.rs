//! User repository.
//!
//! Reads run on the request's ReadOnly transaction, writes on its ReadWrite
//! transaction; the intent is resolved through [`TxContext`], so a handler
//! mounted on a route without the matching interceptor layer fails loudly
//! with `MissingIntent` instead of silently querying a pool.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::{Paginated, Pagination};
use crate::db::context::TxContext;
use crate::db::error::DbError;
use crate::db::options::TxIntent;

/// User record.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for registering a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Fields a modify call may change. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// User repository. Stateless; every method draws its transaction from the
/// passed context.
pub struct UserRepo;

impl UserRepo {
    /// Register a new user.
    pub async fn create(cx: &TxContext, new: NewUser) -> Result<User, DbError> {
        let tx = cx.require(TxIntent::ReadWrite)?;
        let mut conn = tx.conn().await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, first_name, last_name)
            VALUES ($1, $2, $3)
            RETURNING id, email, first_name, last_name, created_at, updated_at
            "#,
        )
        .bind(&new.email)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .fetch_one(&mut *conn)
        .await?;

        Ok(user)
    }

    /// Fetch a user by id.
    pub async fn find_by_id(cx: &TxContext, id: i64) -> Result<User, DbError> {
        let tx = cx.require(TxIntent::ReadOnly)?;
        let mut conn = tx.conn().await?;

        sqlx::query_as::<_, User>(
            "SELECT id, email, first_name, last_name, created_at, updated_at \
             FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(DbError::NotFound {
            resource: "user",
            id: id.to_string(),
        })
    }

    /// Apply a partial update; unset fields keep their value.
    pub async fn update(cx: &TxContext, id: i64, changes: UserChanges) -> Result<User, DbError> {
        let tx = cx.require(TxIntent::ReadWrite)?;
        let mut conn = tx.conn().await?;

        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                email = COALESCE($2, email),
                first_name = COALESCE($3, first_name),
                last_name = COALESCE($4, last_name),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, email, first_name, last_name, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(changes.email)
        .bind(changes.first_name)
        .bind(changes.last_name)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(DbError::NotFound {
            resource: "user",
            id: id.to_string(),
        })
    }

    /// Delete a user by id.
    pub async fn delete(cx: &TxContext, id: i64) -> Result<(), DbError> {
        let tx = cx.require(TxIntent::ReadWrite)?;
        let mut conn = tx.conn().await?;

        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound {
                resource: "user",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// List users, newest first.
    pub async fn list(cx: &TxContext, page: Pagination) -> Result<Paginated<User>, DbError> {
        let tx = cx.require(TxIntent::ReadOnly)?;
        let mut conn = tx.conn().await?;

        let items = sqlx::query_as::<_, User>(
            "SELECT id, email, first_name, last_name, created_at, updated_at \
             FROM users ORDER BY id DESC LIMIT $1 OFFSET $2",
        )
        .bind(page.per_page)
        .bind(page.offset())
        .fetch_all(&mut *conn)
        .await?;

        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&mut *conn)
            .await?;

        Ok(Paginated {
            items,
            total,
            page: page.page,
            per_page: page.per_page,
        })
    }
}
