//! Session lookup and access audit trail.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::repository::directory::get_user;
use crate::db::DatabaseError;
use crate::models::directory::StaffUser;

/// Provision a session for a user. Token issuance UX lives outside this
/// service; operators (and tests) insert the hash directly.
pub fn create_session(
    conn: &Connection,
    token_hash: &str,
    user_id: Uuid,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO sessions (token_hash, user_id, created_at) VALUES (?1, ?2, ?3)",
        params![token_hash, user_id.to_string(), Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

/// Resolve a bearer token hash to its active user and touch last_seen.
pub fn resolve_session(
    conn: &Connection,
    token_hash: &str,
) -> Result<Option<StaffUser>, DatabaseError> {
    let user_id: Option<String> = conn
        .query_row(
            "SELECT user_id FROM sessions WHERE token_hash = ?1",
            params![token_hash],
            |row| row.get(0),
        )
        .optional()?;

    let Some(user_id) = user_id else {
        return Ok(None);
    };

    conn.execute(
        "UPDATE sessions SET last_seen_at = ?1 WHERE token_hash = ?2",
        params![Utc::now().to_rfc3339(), token_hash],
    )?;

    let id = Uuid::parse_str(&user_id)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;
    Ok(get_user(conn, id)?.filter(|u| u.is_active))
}

/// Record one audit row: who did what, with what outcome.
pub fn log_access(
    conn: &Connection,
    actor: &str,
    action: &str,
    outcome: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO audit_log (actor, action, outcome, at) VALUES (?1, ?2, ?3, ?4)",
        params![actor, action, outcome, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

pub fn count_audit_rows(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))?;
    Ok(count)
}
