//! Users, password verification and server-side sessions.

use anyhow::{anyhow, Context, Result};
use r2d2_sqlite::rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "sess";
const BCRYPT_COST: u32 = 10;

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub expires_at: i64,
}

/// Creates the bootstrap user when it does not exist yet. Returns whether a
/// row was inserted.
pub fn ensure_admin(conn: &Connection, username: &str, password: &str) -> Result<bool> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT username FROM users WHERE username = ?1",
            params![username],
            |row| row.get(0),
        )
        .optional()?;
    if existing.is_some() {
        return Ok(false);
    }
    create_user(conn, username, password)?;
    log::info!("created admin user {username:?}");
    Ok(true)
}

pub fn create_user(conn: &Connection, username: &str, password: &str) -> Result<()> {
    let hash = bcrypt::hash(password, BCRYPT_COST).context("failed to hash password")?;
    let now = OffsetDateTime::now_utc().unix_timestamp();
    conn.execute(
        "INSERT INTO users (username, password_hash, created_at) VALUES (?1, ?2, ?3)",
        params![username, hash, now],
    )?;
    Ok(())
}

pub fn authenticate(conn: &Connection, username: &str, password: &str) -> Result<bool> {
    let hash: Option<String> = conn
        .query_row(
            "SELECT password_hash FROM users WHERE username = ?1",
            params![username],
            |row| row.get(0),
        )
        .optional()?;
    match hash {
        Some(hash) => bcrypt::verify(password, &hash).context("stored password hash is invalid"),
        None => Ok(false),
    }
}

pub fn create_session(conn: &Connection, username: &str, ttl: time::Duration) -> Result<Session> {
    let token = Uuid::new_v4().simple().to_string();
    let now = OffsetDateTime::now_utc();
    let expires_at = now
        .checked_add(ttl)
        .ok_or_else(|| anyhow!("session lifetime {ttl} is out of range"))?
        .unix_timestamp();
    conn.execute(
        "INSERT INTO sessions (token, username, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![token, username, now.unix_timestamp(), expires_at],
    )?;
    Ok(Session {
        token,
        username: username.to_string(),
        expires_at,
    })
}

/// Username behind a live session token. Expired rows are removed on sight.
pub fn session_user(conn: &Connection, token: &str) -> Result<Option<String>> {
    let row: Option<(String, i64)> = conn
        .query_row(
            "SELECT username, expires_at FROM sessions WHERE token = ?1",
            params![token],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    match row {
        Some((username, expires_at)) if expires_at > OffsetDateTime::now_utc().unix_timestamp() => {
            Ok(Some(username))
        }
        Some(_) => {
            end_session(conn, token)?;
            Ok(None)
        }
        None => Ok(None),
    }
}

pub fn end_session(conn: &Connection, token: &str) -> Result<()> {
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

pub fn purge_expired_sessions(conn: &Connection) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM sessions WHERE expires_at <= ?1",
        params![OffsetDateTime::now_utc().unix_timestamp()],
    )?;
    Ok(removed)
}
