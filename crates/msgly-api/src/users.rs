use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};

use msgly_db::Database;
use msgly_types::api::{InboxResponse, OutboxResponse, UserListResponse, UserResponse};
use msgly_types::models::{UserDetail, UserSummary};

use crate::error::{ApiError, ApiResult};
use crate::guard::Caller;
use crate::messages;
use crate::state::{AppState, run_blocking};

pub fn list(db: &Database) -> ApiResult<Vec<UserSummary>> {
    let users = db
        .list_users()?
        .into_iter()
        .map(|row| UserSummary {
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
        })
        .collect();
    Ok(users)
}

pub fn detail(db: &Database, username: &str) -> ApiResult<UserDetail> {
    let row = db
        .get_user_by_username(username)?
        .ok_or(ApiError::NotFound("user"))?;

    Ok(UserDetail {
        username: row.username,
        first_name: row.first_name,
        last_name: row.last_name,
        phone: row.phone,
        join_at: row.join_at,
        last_login_at: row.last_login_at,
    })
}

/// GET /users — any logged-in user may browse the directory.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(_caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let users = run_blocking(&state, |s| list(&s.db)).await?;
    Ok(Json(UserListResponse { users }))
}

/// GET /users/{username}
pub async fn get_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    caller.ensure_is(&username)?;

    let user = run_blocking(&state, move |s| detail(&s.db, &username)).await?;
    Ok(Json(UserResponse { user }))
}

/// GET /users/{username}/from
pub async fn messages_from(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    caller.ensure_is(&username)?;

    let messages = run_blocking(&state, move |s| messages::messages_from(&s.db, &username)).await?;
    Ok(Json(OutboxResponse { messages }))
}

/// GET /users/{username}/to
pub async fn messages_to(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    caller.ensure_is(&username)?;

    let messages = run_blocking(&state, move |s| messages::messages_to(&s.db, &username)).await?;
    Ok(Json(InboxResponse { messages }))
}
