use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::{NotificationKind, Role};
use crate::models::notification::Notification;

pub fn insert_notification(conn: &Connection, n: &Notification) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO notifications (id, recipient_id, recipient_role, test_request_id,
         kind, title, body, is_read, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            n.id.to_string(),
            n.recipient_id.to_string(),
            n.recipient_role.as_str(),
            n.test_request_id.map(|id| id.to_string()),
            n.kind.as_str(),
            n.title,
            n.body,
            n.is_read,
            n.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn list_for_recipient(
    conn: &Connection,
    recipient_id: Uuid,
) -> Result<Vec<Notification>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, recipient_id, recipient_role, test_request_id,
         kind, title, body, is_read, created_at
         FROM notifications WHERE recipient_id = ?1 ORDER BY created_at DESC",
    )?;

    type Row = (
        String,
        String,
        String,
        Option<String>,
        String,
        String,
        String,
        bool,
        String,
    );
    let rows: Vec<Row> = stmt
        .query_map(params![recipient_id.to_string()], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
            ))
        })?
        .collect::<Result<_, _>>()?;

    rows.into_iter()
        .map(
            |(id, recipient_id, role, tr_id, kind, title, body, is_read, created_at)| {
                Ok(Notification {
                    id: parse_uuid(&id)?,
                    recipient_id: parse_uuid(&recipient_id)?,
                    recipient_role: Role::from_str(&role)?,
                    test_request_id: tr_id.as_deref().map(parse_uuid).transpose()?,
                    kind: NotificationKind::from_str(&kind)?,
                    title,
                    body,
                    is_read,
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .map(|d| d.with_timezone(&Utc))
                        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
                })
            },
        )
        .collect()
}

/// Count of notifications referencing a test request (test support).
pub fn count_for_test_request(
    conn: &Connection,
    test_request_id: Uuid,
) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE test_request_id = ?1",
        params![test_request_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}
