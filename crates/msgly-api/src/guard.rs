use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use tracing::warn;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::tokens::TokenIssuer;

/// The authenticated identity of the current request.
///
/// Produced only by [`require_logged_in`]; handlers receive it as an
/// explicit `Extension<Caller>` rather than reading ambient state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub username: String,
}

impl Caller {
    /// Second half of the is-the-named-user check.
    pub fn ensure_is(&self, claimed_username: &str) -> ApiResult<()> {
        if self.username == claimed_username {
            Ok(())
        } else {
            warn!("{} tried to act as {}", self.username, claimed_username);
            Err(ApiError::Forbidden)
        }
    }
}

/// Resolve a bearer token to a caller. A missing or unverifiable token is
/// `Unauthorized`.
pub fn require_logged_in(tokens: &TokenIssuer, bearer: Option<&str>) -> ApiResult<Caller> {
    let token = bearer.ok_or(ApiError::Unauthorized)?;

    let username = tokens.resolve(token).map_err(|e| {
        warn!("Rejected bearer token: {}", e);
        ApiError::Unauthorized
    })?;

    Ok(Caller { username })
}

/// Logged in, and specifically as `claimed_username`.
pub fn require_is_user(
    tokens: &TokenIssuer,
    bearer: Option<&str>,
    claimed_username: &str,
) -> ApiResult<Caller> {
    let caller = require_logged_in(tokens, bearer)?;
    caller.ensure_is(claimed_username)?;
    Ok(caller)
}

/// Extract and validate the bearer token, then attach the [`Caller`].
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth = req.headers().typed_get::<Authorization<Bearer>>();
    let caller = require_logged_in(&state.tokens, auth.as_ref().map(|a| a.token()))?;

    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}
