//! User endpoints.
//!
//! Write routes are layered with the `STANDARD` preset (repeatable read on
//! the writer pool), read routes with `READ_ONLY` (read committed on the
//! reader pool). Handlers take the bound transaction from the request's
//! [`TxContext`] extension and never manage its lifecycle.

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    middleware,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::repos::{NewUser, Paginated, PaginationParams, Pagination, User, UserChanges, UserRepo};
use crate::db::{bind_unary, TxContext, TxOptions, TxRoute};
use crate::error::ApiError;
use crate::state::AppState;

/// Register user request
#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Modify user request; absent fields are left unchanged.
#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// User response
#[derive(Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            first_name: u.first_name,
            last_name: u.last_name,
            created_at: u.created_at.to_rfc3339(),
            updated_at: u.updated_at.to_rfc3339(),
        }
    }
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    if email.trim().is_empty() || !email.contains('@') {
        return Err(ApiError::Validation {
            message: format!("'{email}' is not a valid email address"),
        });
    }
    Ok(())
}

/// POST /users - register a new user
async fn create_user(
    Extension(txcx): Extension<TxContext>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    validate_email(&req.email)?;

    let user = UserRepo::create(
        &txcx,
        NewUser {
            email: req.email,
            first_name: req.first_name,
            last_name: req.last_name,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// GET /users/{id} - retrieve a single user
async fn get_user(
    Extension(txcx): Extension<TxContext>,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = UserRepo::find_by_id(&txcx, id).await?;
    Ok(Json(UserResponse::from(user)))
}

/// GET /users - list users with pagination
async fn list_users(
    Extension(txcx): Extension<TxContext>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Paginated<UserResponse>>, ApiError> {
    let page = Pagination::from(params);
    let result = UserRepo::list(&txcx, page).await?;

    Ok(Json(Paginated {
        items: result.items.into_iter().map(UserResponse::from).collect(),
        total: result.total,
        page: result.page,
        per_page: result.per_page,
    }))
}

/// PUT /users/{id} - modify a user
async fn update_user(
    Extension(txcx): Extension<TxContext>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    if let Some(email) = &req.email {
        validate_email(email)?;
    }

    let user = UserRepo::update(
        &txcx,
        id,
        UserChanges {
            email: req.email,
            first_name: req.first_name,
            last_name: req.last_name,
        },
    )
    .await?;

    Ok(Json(UserResponse::from(user)))
}

/// DELETE /users/{id} - remove a user
async fn delete_user(
    Extension(txcx): Extension<TxContext>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    UserRepo::delete(&txcx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// User routes, with transaction intent attached per route group.
pub fn router(state: &AppState) -> Router<AppState> {
    let writes = Router::new()
        .route("/users", post(create_user))
        .route("/users/{id}", put(update_user).delete(delete_user))
        .route_layer(middleware::from_fn_with_state(
            TxRoute::new(state.pools().clone(), TxOptions::STANDARD),
            bind_unary,
        ));

    let reads = Router::new()
        .route("/users", get(list_users))
        .route("/users/{id}", get(get_user))
        .route_layer(middleware::from_fn_with_state(
            TxRoute::new(state.pools().clone(), TxOptions::READ_ONLY),
            bind_unary,
        ));

    writes.merge(reads)
}
