use serde::{Deserialize, Serialize};

use crate::models::{
    InboxMessage, MessageDetail, OutboxMessage, ReadReceipt, SentMessage, UserDetail, UserSummary,
};

// -- JWT Claims --

/// Signed claim set carried by every bearer token. `username` is the only
/// identity claim; `iat`/`exp` bound the token's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

// -- Users --

#[derive(Debug, Serialize, Deserialize)]
pub struct UserListResponse {
    pub users: Vec<UserSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub user: UserDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OutboxResponse {
    pub messages: Vec<OutboxMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InboxResponse {
    pub messages: Vec<InboxMessage>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub to_username: String,
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: MessageDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SentMessageResponse {
    pub message: SentMessage,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadReceiptResponse {
    pub message: ReadReceipt,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
