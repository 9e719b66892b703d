//! Notification fan-out on workflow transitions.
//!
//! Best-effort, non-transactional side channel: a failed write for one
//! recipient is logged and never aborts the triggering transition or
//! blocks delivery to the remaining recipients.

use rusqlite::Connection;

use crate::db::repository::directory::{
    active_lab_staff, users_with_role_in_center, users_with_roles,
};
use crate::db::repository::notification::insert_notification;
use crate::models::directory::StaffUser;
use crate::models::enums::{NotificationKind, Role};
use crate::models::notification::Notification;
use crate::models::test_request::TestRequest;

/// New request: superadmins, superadmin doctors, plus the admins and
/// receptionists of the request's center.
pub fn on_created(conn: &Connection, tr: &TestRequest) {
    let mut recipients = collect(|| {
        let mut all = users_with_roles(conn, &[Role::Superadmin, Role::SuperadminDoctor])?;
        all.extend(users_with_role_in_center(
            conn,
            Role::CenterAdmin,
            tr.center_id,
        )?);
        all.extend(users_with_role_in_center(
            conn,
            Role::Receptionist,
            tr.center_id,
        )?);
        Ok(all)
    });
    // A user can hold a center role and appear once per query
    recipients.sort_by_key(|u| u.id);
    recipients.dedup_by_key(|u| u.id);

    let title = format!("New test request: {}", tr.test_type);
    let body = format!(
        "{} requested {} for {} ({})",
        tr.doctor_name, tr.test_type, tr.patient_name, tr.urgency
    );
    deliver_all(conn, tr, NotificationKind::TestRequestCreated, &title, &body, &recipients);
}

/// Lab staff assigned: inform the requesting doctor.
pub fn on_assigned(conn: &Connection, tr: &TestRequest) {
    let staff = tr.assigned_lab_staff_name.as_deref().unwrap_or("lab staff");
    let title = format!("Lab staff assigned: {}", tr.test_type);
    let body = format!("{staff} was assigned to the {} request for {}", tr.test_type, tr.patient_name);
    deliver_to_doctor(conn, tr, NotificationKind::LabStaffAssigned, &title, &body);
}

/// Review approved: requesting doctor plus every active lab staff member.
pub fn on_review_approved(conn: &Connection, tr: &TestRequest) {
    let title = format!("Test request approved: {}", tr.test_type);
    let body = format!(
        "The {} request for {} was approved and is ready for lab assignment",
        tr.test_type, tr.patient_name
    );
    deliver_to_doctor(conn, tr, NotificationKind::ReviewApproved, &title, &body);

    let staff = collect(|| active_lab_staff(conn));
    deliver_all(conn, tr, NotificationKind::ReviewApproved, &title, &body, &staff);
}

/// Review rejected: requesting doctor, with the reviewer's reason.
pub fn on_review_rejected(conn: &Connection, tr: &TestRequest) {
    let reason = tr
        .review
        .notes
        .as_deref()
        .unwrap_or("no reason recorded");
    let title = format!("Test request rejected: {}", tr.test_type);
    let body = format!(
        "The {} request for {} was rejected: {reason}",
        tr.test_type, tr.patient_name
    );
    deliver_to_doctor(conn, tr, NotificationKind::ReviewRejected, &title, &body);
}

fn deliver_to_doctor(
    conn: &Connection,
    tr: &TestRequest,
    kind: NotificationKind,
    title: &str,
    body: &str,
) {
    let note = Notification::new(tr.doctor_id, Role::Doctor, tr.id, kind, title, body);
    if let Err(e) = insert_notification(conn, &note) {
        tracing::warn!(recipient = %tr.doctor_id, "notification delivery failed: {e}");
    }
}

fn deliver_all(
    conn: &Connection,
    tr: &TestRequest,
    kind: NotificationKind,
    title: &str,
    body: &str,
    recipients: &[StaffUser],
) {
    for user in recipients {
        let note = Notification::new(user.id, user.role, tr.id, kind, title, body);
        if let Err(e) = insert_notification(conn, &note) {
            tracing::warn!(recipient = %user.id, "notification delivery failed: {e}");
        }
    }
}

/// Recipient-set computation itself is also best-effort.
fn collect<F>(f: F) -> Vec<StaffUser>
where
    F: FnOnce() -> Result<Vec<StaffUser>, crate::db::DatabaseError>,
{
    match f() {
        Ok(users) => users,
        Err(e) => {
            tracing::warn!("recipient lookup failed, skipping fan-out: {e}");
            Vec::new()
        }
    }
}
