//! Directory lookups: doctors, patients, centers, staff users.
//!
//! Doctor identity lives in two places historically (the dedicated
//! `doctors` table and `users` rows with the doctor role). Resolution
//! checks the dedicated table first and falls back to the user
//! directory, so callers see a single contract.

use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::directory::{Center, Doctor, Patient, StaffUser};
use crate::models::enums::Role;

pub fn resolve_doctor(conn: &Connection, id: Uuid) -> Result<Doctor, DatabaseError> {
    let direct = conn
        .query_row(
            "SELECT id, name, specialty, center_id, is_active
             FROM doctors WHERE id = ?1 AND is_active = 1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, bool>(4)?,
                ))
            },
        )
        .optional()?;

    if let Some((id, name, specialty, center_id, is_active)) = direct {
        return Ok(Doctor {
            id: parse_uuid(&id)?,
            name,
            specialty,
            center_id: opt_uuid(center_id)?,
            is_active,
        });
    }

    // Fallback: user directory entry carrying the doctor role
    let user = get_user(conn, id)?;
    match user {
        Some(u) if u.role == Role::Doctor => Ok(Doctor {
            id: u.id,
            name: u.name,
            specialty: None,
            center_id: u.center_id,
            is_active: u.is_active,
        }),
        _ => Err(DatabaseError::NotFound {
            entity_type: "doctor".into(),
            id: id.to_string(),
        }),
    }
}

pub fn resolve_patient(conn: &Connection, id: Uuid) -> Result<Patient, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, name, contact, center_id, is_active
             FROM patients WHERE id = ?1 AND is_active = 1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, bool>(4)?,
                ))
            },
        )
        .optional()?;

    match row {
        Some((id, name, contact, center_id, is_active)) => Ok(Patient {
            id: parse_uuid(&id)?,
            name,
            contact,
            center_id: opt_uuid(center_id)?,
            is_active,
        }),
        None => Err(DatabaseError::NotFound {
            entity_type: "patient".into(),
            id: id.to_string(),
        }),
    }
}

pub fn resolve_center(conn: &Connection, id: Uuid) -> Result<Center, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, name, code FROM centers WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;

    match row {
        Some((id, name, code)) => Ok(Center {
            id: parse_uuid(&id)?,
            name,
            code,
        }),
        None => Err(DatabaseError::NotFound {
            entity_type: "center".into(),
            id: id.to_string(),
        }),
    }
}

pub fn get_user(conn: &Connection, id: Uuid) -> Result<Option<StaffUser>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, name, role, center_id, is_active FROM users WHERE id = ?1",
            params![id.to_string()],
            map_user,
        )
        .optional()?;
    row.map(user_from_row).transpose()
}

/// Active users holding one of the given roles, across all centers.
pub fn users_with_roles(
    conn: &Connection,
    roles: &[Role],
) -> Result<Vec<StaffUser>, DatabaseError> {
    let mut out = Vec::new();
    let mut stmt = conn.prepare(
        "SELECT id, name, role, center_id, is_active
         FROM users WHERE role = ?1 AND is_active = 1",
    )?;
    for role in roles {
        let rows: Vec<UserRow> = stmt
            .query_map(params![role.as_str()], map_user)?
            .collect::<Result<_, _>>()?;
        for row in rows {
            out.push(user_from_row(row)?);
        }
    }
    Ok(out)
}

/// Active users with a role, restricted to one center.
pub fn users_with_role_in_center(
    conn: &Connection,
    role: Role,
    center_id: Uuid,
) -> Result<Vec<StaffUser>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, role, center_id, is_active
         FROM users WHERE role = ?1 AND center_id = ?2 AND is_active = 1",
    )?;
    let rows: Vec<UserRow> = stmt
        .query_map(params![role.as_str(), center_id.to_string()], map_user)?
        .collect::<Result<_, _>>()?;
    rows.into_iter().map(user_from_row).collect()
}

/// All active lab staff, across centers (assignment pool).
pub fn active_lab_staff(conn: &Connection) -> Result<Vec<StaffUser>, DatabaseError> {
    users_with_roles(conn, &[Role::LabStaff])
}

type UserRow = (String, String, String, Option<String>, bool);

fn map_user(row: &rusqlite::Row<'_>) -> Result<UserRow, rusqlite::Error> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn user_from_row(row: UserRow) -> Result<StaffUser, DatabaseError> {
    let (id, name, role, center_id, is_active) = row;
    Ok(StaffUser {
        id: parse_uuid(&id)?,
        name,
        role: Role::from_str(&role)?,
        center_id: opt_uuid(center_id)?,
        is_active,
    })
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

fn opt_uuid(s: Option<String>) -> Result<Option<Uuid>, DatabaseError> {
    s.as_deref().map(parse_uuid).transpose()
}

// ─── Seeding helpers (used by tests and provisioning) ────────────────────────

pub fn insert_center(conn: &Connection, center: &Center) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO centers (id, name, code) VALUES (?1, ?2, ?3)",
        params![center.id.to_string(), center.name, center.code],
    )?;
    Ok(())
}

pub fn insert_doctor(conn: &Connection, doctor: &Doctor) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO doctors (id, name, specialty, center_id, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            doctor.id.to_string(),
            doctor.name,
            doctor.specialty,
            doctor.center_id.map(|id| id.to_string()),
            doctor.is_active,
        ],
    )?;
    Ok(())
}

pub fn insert_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, name, contact, center_id, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            patient.id.to_string(),
            patient.name,
            patient.contact,
            patient.center_id.map(|id| id.to_string()),
            patient.is_active,
        ],
    )?;
    Ok(())
}

pub fn insert_user(conn: &Connection, user: &StaffUser) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO users (id, name, role, center_id, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user.id.to_string(),
            user.name,
            user.role.as_str(),
            user.center_id.map(|id| id.to_string()),
            user.is_active,
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;

    fn center(conn: &Connection) -> Center {
        let c = Center {
            id: Uuid::new_v4(),
            name: "East Clinic".into(),
            code: "EC1".into(),
        };
        insert_center(conn, &c).unwrap();
        c
    }

    #[test]
    fn doctor_resolves_from_dedicated_table() {
        let conn = open_memory_database().unwrap();
        let c = center(&conn);
        let d = Doctor {
            id: Uuid::new_v4(),
            name: "Dr. Varga".into(),
            specialty: Some("Allergy".into()),
            center_id: Some(c.id),
            is_active: true,
        };
        insert_doctor(&conn, &d).unwrap();

        let got = resolve_doctor(&conn, d.id).unwrap();
        assert_eq!(got.name, "Dr. Varga");
        assert_eq!(got.specialty.as_deref(), Some("Allergy"));
    }

    #[test]
    fn doctor_falls_back_to_user_directory() {
        let conn = open_memory_database().unwrap();
        let c = center(&conn);
        let u = StaffUser {
            id: Uuid::new_v4(),
            name: "Dr. Boateng".into(),
            role: Role::Doctor,
            center_id: Some(c.id),
            is_active: true,
        };
        insert_user(&conn, &u).unwrap();

        let got = resolve_doctor(&conn, u.id).unwrap();
        assert_eq!(got.name, "Dr. Boateng");
        assert_eq!(got.center_id, Some(c.id));
    }

    #[test]
    fn non_doctor_user_does_not_resolve_as_doctor() {
        let conn = open_memory_database().unwrap();
        let c = center(&conn);
        let u = StaffUser {
            id: Uuid::new_v4(),
            name: "Front Desk".into(),
            role: Role::Receptionist,
            center_id: Some(c.id),
            is_active: true,
        };
        insert_user(&conn, &u).unwrap();

        let err = resolve_doctor(&conn, u.id).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn patient_and_center_resolve_by_id() {
        let conn = open_memory_database().unwrap();
        let c = center(&conn);
        let p = Patient {
            id: Uuid::new_v4(),
            name: "M. Osei".into(),
            contact: Some("555-0102".into()),
            center_id: Some(c.id),
            is_active: true,
        };
        insert_patient(&conn, &p).unwrap();

        let got = resolve_patient(&conn, p.id).unwrap();
        assert_eq!(got.name, "M. Osei");
        assert_eq!(got.center_id, Some(c.id));

        let got = resolve_center(&conn, c.id).unwrap();
        assert_eq!(got.code, "EC1");
    }

    #[test]
    fn missing_patient_and_center_report_not_found() {
        let conn = open_memory_database().unwrap();
        let err = resolve_patient(&conn, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
        let err = resolve_center(&conn, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn role_queries_exclude_inactive_users() {
        let conn = open_memory_database().unwrap();
        let c = center(&conn);
        for (name, active) in [("R1", true), ("R2", true), ("R3", false)] {
            insert_user(
                &conn,
                &StaffUser {
                    id: Uuid::new_v4(),
                    name: name.into(),
                    role: Role::Receptionist,
                    center_id: Some(c.id),
                    is_active: active,
                },
            )
            .unwrap();
        }

        let active = users_with_role_in_center(&conn, Role::Receptionist, c.id).unwrap();
        assert_eq!(active.len(), 2);
    }
}
