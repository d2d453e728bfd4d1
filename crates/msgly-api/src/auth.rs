use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::error;

use msgly_types::api::{LoginRequest, RegisterRequest, TokenResponse};

use crate::credentials;
use crate::error::ApiError;
use crate::extract::AppJson;
use crate::state::{AppState, run_blocking};
use crate::tokens::TokenIssuer;

/// POST /auth/register — creates the user and logs them straight in.
pub async fn register(
    State(state): State<AppState>,
    AppJson(req): AppJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = run_blocking(&state, move |s| credentials::register(&s.db, &req)).await?;

    let token = issue_token(&state.tokens, &profile.username)?;
    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.clone();
    run_blocking(&state, move |s| {
        credentials::authenticate(&s.db, &req.username, &req.password)
    })
    .await?;

    let token = issue_token(&state.tokens, &username)?;
    Ok(Json(TokenResponse { token }))
}

fn issue_token(tokens: &TokenIssuer, username: &str) -> Result<String, ApiError> {
    tokens.issue(username).map_err(|e| {
        error!("Token issue failed for {}: {}", username, e);
        ApiError::Internal
    })
}
