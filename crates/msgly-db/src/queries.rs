use crate::models::{MailboxRow, MessageRow, NewUser, ParticipantRow, UserRow};
use crate::Database;
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};

impl Database {
    // -- Users --

    /// Inserts a user. Returns `false` without touching the existing row if
    /// the username is already taken.
    pub fn insert_user(&self, user: &NewUser<'_>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (username, password, first_name, last_name, phone, join_at, last_login_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(username) DO NOTHING",
                rusqlite::params![
                    user.username,
                    user.password_hash,
                    user.first_name,
                    user.last_name,
                    user.phone,
                    user.now,
                ],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    pub fn user_exists(&self, username: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT 1 FROM users WHERE username = ?1", [username], |row| row.get(0))
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Returns `false` if no such user exists.
    pub fn update_last_login(&self, username: &str, at: DateTime<Utc>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE users SET last_login_at = ?2 WHERE username = ?1",
                rusqlite::params![username, at],
            )?;
            Ok(updated == 1)
        })
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT username, password, first_name, last_name, phone, join_at, last_login_at
                 FROM users
                 ORDER BY username",
            )?;
            let rows = stmt
                .query_map([], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    /// Stores a new unread message and returns its effective `sent_at`.
    ///
    /// `sent_at` is never earlier than the previously stored message's, so
    /// creation order and `sent_at` order agree even if the clock steps back.
    pub fn insert_message(
        &self,
        id: &str,
        from_username: &str,
        to_username: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        self.with_conn_mut(|conn| {
            let last: Option<DateTime<Utc>> = conn
                .query_row(
                    "SELECT sent_at FROM messages ORDER BY rowid DESC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            let sent_at = last.map_or(now, |last| now.max(last));

            conn.execute(
                "INSERT INTO messages (id, from_username, to_username, body, sent_at, read_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
                rusqlite::params![id, from_username, to_username, body, sent_at],
            )?;
            Ok(sent_at)
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// Moves a message to the read state.
    ///
    /// Returns `None` if the message does not exist. An already-read message
    /// keeps its original `read_at`, which is returned unchanged. The new
    /// `read_at` is clamped so it never precedes `sent_at`.
    pub fn mark_message_read(&self, id: &str, at: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        self.with_conn_mut(|conn| {
            let current: Option<(DateTime<Utc>, Option<DateTime<Utc>>)> = conn
                .query_row(
                    "SELECT sent_at, read_at FROM messages WHERE id = ?1",
                    [id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let read_at = match current {
                None => None,
                Some((_, Some(read_at))) => Some(read_at),
                Some((sent_at, None)) => {
                    let read_at = at.max(sent_at);
                    // read_at is set once; the guard keeps it that way
                    conn.execute(
                        "UPDATE messages SET read_at = ?2 WHERE id = ?1 AND read_at IS NULL",
                        rusqlite::params![id, read_at],
                    )?;
                    Some(read_at)
                }
            };

            Ok(read_at)
        })
    }

    /// Messages sent by `username`, oldest first, with each recipient joined in.
    pub fn messages_from(&self, username: &str) -> Result<Vec<MailboxRow>> {
        self.with_conn(|conn| {
            query_mailbox(
                conn,
                "SELECT m.id, m.body, m.sent_at, m.read_at,
                        u.username, u.first_name, u.last_name, u.phone
                 FROM messages m
                 JOIN users u ON u.username = m.to_username
                 WHERE m.from_username = ?1
                 ORDER BY m.sent_at ASC, m.rowid ASC",
                username,
            )
        })
    }

    /// Messages received by `username`, oldest first, with each sender joined in.
    pub fn messages_to(&self, username: &str) -> Result<Vec<MailboxRow>> {
        self.with_conn(|conn| {
            query_mailbox(
                conn,
                "SELECT m.id, m.body, m.sent_at, m.read_at,
                        u.username, u.first_name, u.last_name, u.phone
                 FROM messages m
                 JOIN users u ON u.username = m.from_username
                 WHERE m.to_username = ?1
                 ORDER BY m.sent_at ASC, m.rowid ASC",
                username,
            )
        })
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        username: row.get(0)?,
        password: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        phone: row.get(4)?,
        join_at: row.get(5)?,
        last_login_at: row.get(6)?,
    })
}

/// Reads four participant columns starting at `offset`.
fn participant_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<ParticipantRow> {
    Ok(ParticipantRow {
        username: row.get(offset)?,
        first_name: row.get(offset + 1)?,
        last_name: row.get(offset + 2)?,
        phone: row.get(offset + 3)?,
    })
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT username, password, first_name, last_name, phone, join_at, last_login_at
         FROM users
         WHERE username = ?1",
    )?;

    let row = stmt.query_row([username], user_from_row).optional()?;

    Ok(row)
}

fn query_message(conn: &Connection, id: &str) -> Result<Option<MessageRow>> {
    // JOIN both participants in a single query
    let mut stmt = conn.prepare(
        "SELECT m.id, m.body, m.sent_at, m.read_at,
                f.username, f.first_name, f.last_name, f.phone,
                t.username, t.first_name, t.last_name, t.phone
         FROM messages m
         JOIN users f ON f.username = m.from_username
         JOIN users t ON t.username = m.to_username
         WHERE m.id = ?1",
    )?;

    let row = stmt
        .query_row([id], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                body: row.get(1)?,
                sent_at: row.get(2)?,
                read_at: row.get(3)?,
                from_user: participant_from_row(row, 4)?,
                to_user: participant_from_row(row, 8)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_mailbox(conn: &Connection, sql: &str, username: &str) -> Result<Vec<MailboxRow>> {
    let mut stmt = conn.prepare(sql)?;

    let rows = stmt
        .query_map([username], |row| {
            Ok(MailboxRow {
                id: row.get(0)?,
                body: row.get(1)?,
                sent_at: row.get(2)?,
                read_at: row.get(3)?,
                other: participant_from_row(row, 4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;
    use std::thread;

    fn add_user(db: &Database, username: &str) {
        let inserted = db
            .insert_user(&NewUser {
                username,
                password_hash: "$argon2id$stub",
                first_name: "First",
                last_name: "Last",
                phone: "555-0100",
                now: Utc::now(),
            })
            .unwrap();
        assert!(inserted);
    }

    fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    #[test]
    fn duplicate_user_is_rejected_and_original_kept() {
        let db = Database::open_in_memory().unwrap();
        add_user(&db, "alice");

        let again = db
            .insert_user(&NewUser {
                username: "alice",
                password_hash: "other",
                first_name: "Mallory",
                last_name: "M",
                phone: "",
                now: Utc::now(),
            })
            .unwrap();
        assert!(!again);

        let alice = db.get_user_by_username("alice").unwrap().unwrap();
        assert_eq!(alice.first_name, "First");
        assert_eq!(alice.password, "$argon2id$stub");
        assert_eq!(alice.join_at, alice.last_login_at);
    }

    #[test]
    fn update_last_login_only_touches_existing_users() {
        let db = Database::open_in_memory().unwrap();
        add_user(&db, "alice");

        let later = Utc::now() + Duration::hours(1);
        assert!(db.update_last_login("alice", later).unwrap());
        assert!(!db.update_last_login("nobody", later).unwrap());

        let alice = db.get_user_by_username("alice").unwrap().unwrap();
        assert_eq!(alice.last_login_at, later);
        assert!(alice.join_at < alice.last_login_at);
    }

    #[test]
    fn message_joins_both_participants() {
        let db = Database::open_in_memory().unwrap();
        add_user(&db, "alice");
        add_user(&db, "bob");

        let id = new_id();
        db.insert_message(&id, "alice", "bob", "hi", Utc::now()).unwrap();

        let msg = db.get_message(&id).unwrap().unwrap();
        assert_eq!(msg.body, "hi");
        assert_eq!(msg.from_user.username, "alice");
        assert_eq!(msg.to_user.username, "bob");
        assert_eq!(msg.to_user.phone, "555-0100");
        assert!(msg.read_at.is_none());

        assert!(db.get_message(&new_id()).unwrap().is_none());
    }

    #[test]
    fn message_to_unknown_user_violates_foreign_key() {
        let db = Database::open_in_memory().unwrap();
        add_user(&db, "alice");

        let result = db.insert_message(&new_id(), "alice", "ghost", "hello?", Utc::now());
        assert!(result.is_err());
    }

    #[test]
    fn sent_at_never_goes_backwards() {
        let db = Database::open_in_memory().unwrap();
        add_user(&db, "alice");
        add_user(&db, "bob");

        let now = Utc::now();
        let first = db.insert_message(&new_id(), "alice", "bob", "one", now).unwrap();
        let second = db
            .insert_message(&new_id(), "alice", "bob", "two", now - Duration::minutes(5))
            .unwrap();
        assert_eq!(first, now);
        assert!(second >= first);
    }

    #[test]
    fn mark_read_sets_read_at_once() {
        let db = Database::open_in_memory().unwrap();
        add_user(&db, "alice");
        add_user(&db, "bob");

        let id = new_id();
        let sent_at = db.insert_message(&id, "alice", "bob", "hi", Utc::now()).unwrap();

        let first = db.mark_message_read(&id, sent_at + Duration::seconds(1)).unwrap().unwrap();
        let second = db.mark_message_read(&id, sent_at + Duration::seconds(30)).unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(db.get_message(&id).unwrap().unwrap().read_at, Some(first));
    }

    #[test]
    fn concurrent_mark_read_settles_on_one_read_at() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        add_user(&db, "alice");
        add_user(&db, "bob");

        let id = new_id();
        let sent_at = db.insert_message(&id, "alice", "bob", "hi", Utc::now()).unwrap();

        let handles: Vec<_> = (0..8i64)
            .map(|i| {
                let db = Arc::clone(&db);
                let id = id.clone();
                thread::spawn(move || {
                    db.mark_message_read(&id, sent_at + Duration::milliseconds(i + 1))
                        .unwrap()
                        .unwrap()
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let stored = db.get_message(&id).unwrap().unwrap().read_at.unwrap();
        assert!(results.iter().all(|read_at| *read_at == stored));
        assert!(stored > sent_at);
    }

    #[test]
    fn mark_read_never_precedes_sent_at() {
        let db = Database::open_in_memory().unwrap();
        add_user(&db, "alice");
        add_user(&db, "bob");

        let id = new_id();
        let sent_at = db.insert_message(&id, "alice", "bob", "hi", Utc::now()).unwrap();
        let read_at = db.mark_message_read(&id, sent_at - Duration::hours(1)).unwrap().unwrap();
        assert!(read_at >= sent_at);
    }

    #[test]
    fn mark_read_missing_message() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.mark_message_read(&new_id(), Utc::now()).unwrap().is_none());
    }

    #[test]
    fn mailboxes_resolve_the_other_participant_in_order() {
        let db = Database::open_in_memory().unwrap();
        add_user(&db, "alice");
        add_user(&db, "bob");
        add_user(&db, "carol");

        let now = Utc::now();
        db.insert_message(&new_id(), "alice", "bob", "first", now).unwrap();
        db.insert_message(&new_id(), "alice", "carol", "second", now + Duration::seconds(1)).unwrap();
        db.insert_message(&new_id(), "bob", "alice", "reply", now + Duration::seconds(2)).unwrap();

        let outbox = db.messages_from("alice").unwrap();
        let bodies: Vec<_> = outbox.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["first", "second"]);
        assert_eq!(outbox[0].other.username, "bob");
        assert_eq!(outbox[1].other.username, "carol");

        let inbox = db.messages_to("alice").unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].other.username, "bob");
        assert_eq!(inbox[0].body, "reply");

        assert_eq!(db.messages_to("carol").unwrap()[0].other.username, "alice");
    }
}
