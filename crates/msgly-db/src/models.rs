//! Database row types: these map directly to SQLite rows.
//! Distinct from msgly-types API models to keep the DB layer independent.

use chrono::{DateTime, Utc};

pub struct UserRow {
    pub username: String,
    /// Argon2 PHC string, never the raw secret.
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub join_at: DateTime<Utc>,
    pub last_login_at: DateTime<Utc>,
}

pub struct NewUser<'a> {
    pub username: &'a str,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub phone: &'a str,
    pub now: DateTime<Utc>,
}

/// Public columns of a user, as joined onto a message.
pub struct ParticipantRow {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
}

/// A message with both participants joined in.
pub struct MessageRow {
    pub id: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub from_user: ParticipantRow,
    pub to_user: ParticipantRow,
}

/// A message as seen from one participant's mailbox; `other` is the
/// counterpart (recipient for an outbox, sender for an inbox).
pub struct MailboxRow {
    pub id: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub other: ParticipantRow,
}
