use anyhow::anyhow;
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use msgly_db::Database;
use msgly_db::models::{MessageRow, ParticipantRow};
use msgly_types::api::{
    MessageResponse, ReadReceiptResponse, SendMessageRequest, SentMessageResponse,
};
use msgly_types::models::{
    InboxMessage, MessageDetail, OutboxMessage, ReadReceipt, SentMessage, UserProfile,
};

use crate::error::{ApiError, ApiResult};
use crate::extract::AppJson;
use crate::guard::Caller;
use crate::state::{AppState, run_blocking};

const MAX_BODY_LEN: usize = 10_000;

// -- Lifecycle --

/// Store a new unread message from `from_username` to `to_username`.
///
/// The caller must be the sender.
pub fn create(
    db: &Database,
    caller: &Caller,
    from_username: &str,
    to_username: &str,
    body: &str,
) -> ApiResult<SentMessage> {
    caller.ensure_is(from_username)?;

    if body.trim().is_empty() {
        return Err(ApiError::BadRequest("message body is required".into()));
    }
    if body.len() > MAX_BODY_LEN {
        return Err(ApiError::BadRequest(format!(
            "message body exceeds {} bytes",
            MAX_BODY_LEN
        )));
    }
    if !db.user_exists(to_username)? {
        return Err(ApiError::NotFound("recipient"));
    }

    let id = Uuid::new_v4();
    let sent_at = db.insert_message(&id.to_string(), from_username, to_username, body, Utc::now())?;

    info!("Message {} sent from {} to {}", id, from_username, to_username);
    Ok(SentMessage {
        id,
        from_username: from_username.to_string(),
        to_username: to_username.to_string(),
        body: body.to_string(),
        sent_at,
    })
}

/// Fetch a message with both participants resolved. Visible to its two
/// participants only.
pub fn get_by_id(db: &Database, id: Uuid, caller: &Caller) -> ApiResult<MessageDetail> {
    let row = db
        .get_message(&id.to_string())?
        .ok_or(ApiError::NotFound("message"))?;
    let message = message_from_row(row)?;

    if !message.is_participant(&caller.username) {
        warn!("{} denied read access to message {}", caller.username, id);
        return Err(ApiError::Forbidden);
    }

    Ok(message)
}

/// Move a message from unread to read. Only the recipient may do this.
///
/// Marking an already-read message is a no-op that returns the original
/// `read_at`.
pub fn mark_read(db: &Database, id: Uuid, caller: &Caller) -> ApiResult<ReadReceipt> {
    let key = id.to_string();
    let row = db.get_message(&key)?.ok_or(ApiError::NotFound("message"))?;

    if row.to_user.username != caller.username {
        warn!("{} denied mark-read on message {}", caller.username, id);
        return Err(ApiError::Forbidden);
    }

    let read_at = db
        .mark_message_read(&key, Utc::now())?
        .ok_or(ApiError::NotFound("message"))?;

    info!("Message {} read by {}", id, caller.username);
    Ok(ReadReceipt { id, read_at })
}

/// Messages sent by `username`, oldest first.
pub fn messages_from(db: &Database, username: &str) -> ApiResult<Vec<OutboxMessage>> {
    db.messages_from(username)?
        .into_iter()
        .map(|row| {
            Ok(OutboxMessage {
                id: parse_id(&row.id)?,
                body: row.body,
                sent_at: row.sent_at,
                read_at: row.read_at,
                to_user: profile_from_row(row.other),
            })
        })
        .collect()
}

/// Messages received by `username`, oldest first.
pub fn messages_to(db: &Database, username: &str) -> ApiResult<Vec<InboxMessage>> {
    db.messages_to(username)?
        .into_iter()
        .map(|row| {
            Ok(InboxMessage {
                id: parse_id(&row.id)?,
                body: row.body,
                sent_at: row.sent_at,
                read_at: row.read_at,
                from_user: profile_from_row(row.other),
            })
        })
        .collect()
}

// -- Handlers --

/// POST /messages
pub async fn send_message(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    AppJson(req): AppJson<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = run_blocking(&state, move |s| {
        create(&s.db, &caller, &caller.username, &req.to_username, &req.body)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(SentMessageResponse { message })))
}

/// GET /messages/{id}
pub async fn get_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let id = id_from_path(&id)?;
    let message = run_blocking(&state, move |s| get_by_id(&s.db, id, &caller)).await?;
    Ok(Json(MessageResponse { message }))
}

/// POST /messages/{id}/read
pub async fn mark_message_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let id = id_from_path(&id)?;
    let message = run_blocking(&state, move |s| mark_read(&s.db, id, &caller)).await?;
    Ok(Json(ReadReceiptResponse { message }))
}

// -- Row conversion --

/// An id that cannot name any message is simply a message that isn't there.
fn id_from_path(raw: &str) -> ApiResult<Uuid> {
    raw.parse::<Uuid>().map_err(|_| ApiError::NotFound("message"))
}

fn parse_id(raw: &str) -> ApiResult<Uuid> {
    raw.parse::<Uuid>()
        .map_err(|e| anyhow!("Corrupt message id '{}': {}", raw, e).into())
}

fn profile_from_row(row: ParticipantRow) -> UserProfile {
    UserProfile {
        username: row.username,
        first_name: row.first_name,
        last_name: row.last_name,
        phone: row.phone,
    }
}

fn message_from_row(row: MessageRow) -> ApiResult<MessageDetail> {
    Ok(MessageDetail {
        id: parse_id(&row.id)?,
        body: row.body,
        sent_at: row.sent_at,
        read_at: row.read_at,
        from_user: profile_from_row(row.from_user),
        to_user: profile_from_row(row.to_user),
    })
}
