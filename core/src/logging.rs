//! Structured diagnostics written to the `event_log` table.
//!
//! Every durable event is mirrored to the `log` facade so that the process
//! logger and the table tell the same story.

use r2d2_sqlite::rusqlite::{self, params, Connection, Row};
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// Event row as stored in SQLite.
pub struct NewEvent<'a> {
    pub level: &'a str,
    pub code: Option<&'a str>,
    pub module: &'a str,
    pub actor: Option<&'a str>,
    pub message: &'a str,
    pub explain: Option<&'a str>,
    pub data: Option<Value>,
}

/// Event surfaced through `GET /api/events`.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub id: String,
    pub ts: i64,
    pub level: String,
    pub code: Option<String>,
    pub message: String,
    pub explain: Option<String>,
    pub data: Option<Value>,
}

pub fn log_event(conn: &Connection, event: NewEvent<'_>) -> rusqlite::Result<()> {
    let lvl = match event.level {
        "error" => log::Level::Error,
        "warn" => log::Level::Warn,
        "debug" => log::Level::Debug,
        _ => log::Level::Info,
    };
    log::log!(
        target: event.module,
        lvl,
        "{} [{}]",
        event.message,
        event.code.unwrap_or("-")
    );

    let id = Uuid::new_v4().to_string();
    let ts = OffsetDateTime::now_utc().unix_timestamp();
    let data_str = event.data.map(|v| v.to_string());
    conn.execute(
        "INSERT INTO event_log (id, ts, level, code, module, actor, message, explain, data) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            id,
            ts,
            event.level,
            event.code,
            event.module,
            event.actor,
            event.message,
            event.explain,
            data_str
        ],
    )?;
    Ok(())
}

/// Most recent events for one module and actor, newest first.
pub fn list_events(
    conn: &Connection,
    module: &str,
    actor: &str,
    limit: usize,
) -> rusqlite::Result<Vec<EventRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, ts, level, code, message, explain, data FROM event_log WHERE module = ?1 AND actor = ?2 ORDER BY ts DESC, rowid DESC LIMIT ?3",
    )?;
    let rows = stmt.query_map(params![module, actor, limit as i64], map_event)?;
    let mut events = Vec::new();
    for row in rows {
        events.push(row?);
    }
    Ok(events)
}

fn map_event(row: &Row) -> rusqlite::Result<EventRecord> {
    let data_str: Option<String> = row.get(6)?;
    let data = data_str.and_then(|raw| serde_json::from_str(&raw).ok());
    Ok(EventRecord {
        id: row.get(0)?,
        ts: row.get(1)?,
        level: row.get(2)?,
        code: row.get(3)?,
        message: row.get(4)?,
        explain: row.get(5)?,
        data,
    })
}
