use axum::extract::FromRequest;

use crate::error::ApiError;

/// `Json` whose rejection is an [`ApiError::BadRequest`], so a bad body gets
/// the same `{"error": ...}` shape as every other failure.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);
