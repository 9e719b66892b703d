//! Test request persistence. Every write is conditional on the row
//! version so transition guards stay race-free under concurrent actors.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::test_request::{Billing, ResultValue, SuperadminReview, TestRequest};

const COLUMNS: &str = "id, doctor_id, doctor_name, patient_id, patient_name, \
     center_id, center_name, center_code, test_type, test_description, urgency, \
     status, workflow_stage, billing_status, billing_amount, \
     review_status, reviewed_by, reviewed_at, review_notes, additional_tests, \
     patient_instructions, changes_required, approved_for_lab, \
     assigned_lab_staff_id, assigned_lab_staff_name, \
     sample_collector_id, sample_collector_name, \
     lab_technician_id, lab_technician_name, \
     sample_collection_status, sample_collection_scheduled_date, \
     sample_collection_actual_date, sample_collection_notes, \
     testing_start_date, testing_end_date, \
     report_generated_date, report_generated_by, report_sent_date, report_sent_by, \
     report_file_path, send_method, sent_to, delivery_confirmed, \
     test_results, result_values, conclusion, recommendations, notes, \
     is_active, version, created_at, updated_at";

pub fn insert_test_request(conn: &Connection, tr: &TestRequest) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO test_requests (id, doctor_id, doctor_name, patient_id, patient_name,
         center_id, center_name, center_code, test_type, test_description, urgency,
         status, workflow_stage, billing_status, billing_amount,
         review_status, reviewed_by, reviewed_at, review_notes, additional_tests,
         patient_instructions, changes_required, approved_for_lab,
         assigned_lab_staff_id, assigned_lab_staff_name,
         sample_collector_id, sample_collector_name,
         lab_technician_id, lab_technician_name,
         sample_collection_status, sample_collection_scheduled_date,
         sample_collection_actual_date, sample_collection_notes,
         testing_start_date, testing_end_date,
         report_generated_date, report_generated_by, report_sent_date, report_sent_by,
         report_file_path, send_method, sent_to, delivery_confirmed,
         test_results, result_values, conclusion, recommendations, notes,
         is_active, version, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                 ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29,
                 ?30, ?31, ?32, ?33, ?34, ?35, ?36, ?37, ?38, ?39, ?40, ?41, ?42, ?43,
                 ?44, ?45, ?46, ?47, ?48, ?49, ?50, ?51, ?52)",
        params![
            tr.id.to_string(),
            tr.doctor_id.to_string(),
            tr.doctor_name,
            tr.patient_id.to_string(),
            tr.patient_name,
            tr.center_id.to_string(),
            tr.center_name,
            tr.center_code,
            tr.test_type,
            tr.test_description,
            tr.urgency.as_str(),
            tr.status.as_str(),
            tr.workflow_stage.as_str(),
            tr.billing.status.as_str(),
            tr.billing.amount,
            tr.review.status.as_str(),
            tr.review.reviewed_by.map(|id| id.to_string()),
            tr.review.reviewed_at.map(|d| d.to_rfc3339()),
            tr.review.notes,
            tr.review.additional_tests,
            tr.review.patient_instructions,
            tr.review.changes_required,
            tr.review.approved_for_lab,
            tr.assigned_lab_staff_id.map(|id| id.to_string()),
            tr.assigned_lab_staff_name,
            tr.sample_collector_id.map(|id| id.to_string()),
            tr.sample_collector_name,
            tr.lab_technician_id.map(|id| id.to_string()),
            tr.lab_technician_name,
            tr.sample_collection_status.map(|s| s.as_str()),
            tr.sample_collection_scheduled_date.map(|d| d.to_rfc3339()),
            tr.sample_collection_actual_date.map(|d| d.to_rfc3339()),
            tr.sample_collection_notes,
            tr.testing_start_date.map(|d| d.to_rfc3339()),
            tr.testing_end_date.map(|d| d.to_rfc3339()),
            tr.report_generated_date.map(|d| d.to_rfc3339()),
            tr.report_generated_by.map(|id| id.to_string()),
            tr.report_sent_date.map(|d| d.to_rfc3339()),
            tr.report_sent_by.map(|id| id.to_string()),
            tr.report_file_path,
            tr.send_method.map(|m| m.as_str()),
            tr.sent_to,
            tr.delivery_confirmed,
            tr.test_results,
            serde_json::to_string(&tr.result_values)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            tr.conclusion,
            tr.recommendations,
            tr.notes,
            tr.is_active,
            tr.version,
            tr.created_at.to_rfc3339(),
            tr.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Fetch an active test request. Soft-deleted rows are invisible here.
pub fn get_test_request(conn: &Connection, id: Uuid) -> Result<TestRequest, DatabaseError> {
    let sql = format!("SELECT {COLUMNS} FROM test_requests WHERE id = ?1 AND is_active = 1");
    conn.query_row(&sql, params![id.to_string()], map_row)
        .optional()?
        .map(from_row)
        .transpose()?
        .ok_or_else(|| DatabaseError::NotFound {
            entity_type: "test_request".into(),
            id: id.to_string(),
        })
}

/// All active requests, optionally scoped to one center, newest first.
pub fn list_test_requests(
    conn: &Connection,
    center_id: Option<Uuid>,
) -> Result<Vec<TestRequest>, DatabaseError> {
    let sql = match center_id {
        Some(_) => format!(
            "SELECT {COLUMNS} FROM test_requests \
             WHERE is_active = 1 AND center_id = ?1 ORDER BY created_at DESC"
        ),
        None => format!(
            "SELECT {COLUMNS} FROM test_requests WHERE is_active = 1 ORDER BY created_at DESC"
        ),
    };
    let mut stmt = conn.prepare(&sql)?;

    let rows: Vec<Row> = match center_id {
        Some(cid) => stmt
            .query_map(params![cid.to_string()], map_row)?
            .collect::<Result<_, _>>()?,
        None => stmt.query_map([], map_row)?.collect::<Result<_, _>>()?,
    };

    rows.into_iter().map(from_row).collect()
}

/// Conditional write: commits only if the stored row still carries the
/// version the caller read. Bumps `version` and `updated_at` on success.
///
/// Zero affected rows after a successful read means either a concurrent
/// writer won the race (`StaleVersion`) or the row disappeared.
pub fn update_test_request(conn: &Connection, tr: &mut TestRequest) -> Result<(), DatabaseError> {
    let now = Utc::now();
    let affected = conn.execute(
        "UPDATE test_requests SET
            test_description = ?1, urgency = ?2, status = ?3, workflow_stage = ?4,
            billing_status = ?5, billing_amount = ?6,
            review_status = ?7, reviewed_by = ?8, reviewed_at = ?9, review_notes = ?10,
            additional_tests = ?11, patient_instructions = ?12, changes_required = ?13,
            approved_for_lab = ?14,
            assigned_lab_staff_id = ?15, assigned_lab_staff_name = ?16,
            sample_collector_id = ?17, sample_collector_name = ?18,
            lab_technician_id = ?19, lab_technician_name = ?20,
            sample_collection_status = ?21, sample_collection_scheduled_date = ?22,
            sample_collection_actual_date = ?23, sample_collection_notes = ?24,
            testing_start_date = ?25, testing_end_date = ?26,
            report_generated_date = ?27, report_generated_by = ?28,
            report_sent_date = ?29, report_sent_by = ?30,
            report_file_path = ?31, send_method = ?32, sent_to = ?33,
            delivery_confirmed = ?34,
            test_results = ?35, result_values = ?36, conclusion = ?37,
            recommendations = ?38, notes = ?39, is_active = ?40,
            version = version + 1, updated_at = ?41
         WHERE id = ?42 AND version = ?43 AND is_active = 1",
        params![
            tr.test_description,
            tr.urgency.as_str(),
            tr.status.as_str(),
            tr.workflow_stage.as_str(),
            tr.billing.status.as_str(),
            tr.billing.amount,
            tr.review.status.as_str(),
            tr.review.reviewed_by.map(|id| id.to_string()),
            tr.review.reviewed_at.map(|d| d.to_rfc3339()),
            tr.review.notes,
            tr.review.additional_tests,
            tr.review.patient_instructions,
            tr.review.changes_required,
            tr.review.approved_for_lab,
            tr.assigned_lab_staff_id.map(|id| id.to_string()),
            tr.assigned_lab_staff_name,
            tr.sample_collector_id.map(|id| id.to_string()),
            tr.sample_collector_name,
            tr.lab_technician_id.map(|id| id.to_string()),
            tr.lab_technician_name,
            tr.sample_collection_status.map(|s| s.as_str()),
            tr.sample_collection_scheduled_date.map(|d| d.to_rfc3339()),
            tr.sample_collection_actual_date.map(|d| d.to_rfc3339()),
            tr.sample_collection_notes,
            tr.testing_start_date.map(|d| d.to_rfc3339()),
            tr.testing_end_date.map(|d| d.to_rfc3339()),
            tr.report_generated_date.map(|d| d.to_rfc3339()),
            tr.report_generated_by.map(|id| id.to_string()),
            tr.report_sent_date.map(|d| d.to_rfc3339()),
            tr.report_sent_by.map(|id| id.to_string()),
            tr.report_file_path,
            tr.send_method.map(|m| m.as_str()),
            tr.sent_to,
            tr.delivery_confirmed,
            tr.test_results,
            serde_json::to_string(&tr.result_values)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            tr.conclusion,
            tr.recommendations,
            tr.notes,
            tr.is_active,
            now.to_rfc3339(),
            tr.id.to_string(),
            tr.version,
        ],
    )?;

    if affected == 0 {
        let exists: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM test_requests WHERE id = ?1 AND is_active = 1",
                params![tr.id.to_string()],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n > 0)?;
        return Err(if exists {
            DatabaseError::StaleVersion {
                entity_type: "test_request".into(),
                id: tr.id.to_string(),
            }
        } else {
            DatabaseError::NotFound {
                entity_type: "test_request".into(),
                id: tr.id.to_string(),
            }
        });
    }

    tr.version += 1;
    tr.updated_at = now;
    Ok(())
}

// Internal row type, mirrors the column list above.
struct Row {
    id: String,
    doctor_id: String,
    doctor_name: String,
    patient_id: String,
    patient_name: String,
    center_id: String,
    center_name: String,
    center_code: Option<String>,
    test_type: String,
    test_description: Option<String>,
    urgency: String,
    status: String,
    workflow_stage: String,
    billing_status: String,
    billing_amount: Option<f64>,
    review_status: String,
    reviewed_by: Option<String>,
    reviewed_at: Option<String>,
    review_notes: Option<String>,
    additional_tests: Option<String>,
    patient_instructions: Option<String>,
    changes_required: Option<String>,
    approved_for_lab: bool,
    assigned_lab_staff_id: Option<String>,
    assigned_lab_staff_name: Option<String>,
    sample_collector_id: Option<String>,
    sample_collector_name: Option<String>,
    lab_technician_id: Option<String>,
    lab_technician_name: Option<String>,
    sample_collection_status: Option<String>,
    sample_collection_scheduled_date: Option<String>,
    sample_collection_actual_date: Option<String>,
    sample_collection_notes: Option<String>,
    testing_start_date: Option<String>,
    testing_end_date: Option<String>,
    report_generated_date: Option<String>,
    report_generated_by: Option<String>,
    report_sent_date: Option<String>,
    report_sent_by: Option<String>,
    report_file_path: Option<String>,
    send_method: Option<String>,
    sent_to: Option<String>,
    delivery_confirmed: bool,
    test_results: Option<String>,
    result_values: Option<String>,
    conclusion: Option<String>,
    recommendations: Option<String>,
    notes: Option<String>,
    is_active: bool,
    version: i64,
    created_at: String,
    updated_at: String,
}

fn map_row(row: &rusqlite::Row<'_>) -> Result<Row, rusqlite::Error> {
    Ok(Row {
        id: row.get(0)?,
        doctor_id: row.get(1)?,
        doctor_name: row.get(2)?,
        patient_id: row.get(3)?,
        patient_name: row.get(4)?,
        center_id: row.get(5)?,
        center_name: row.get(6)?,
        center_code: row.get(7)?,
        test_type: row.get(8)?,
        test_description: row.get(9)?,
        urgency: row.get(10)?,
        status: row.get(11)?,
        workflow_stage: row.get(12)?,
        billing_status: row.get(13)?,
        billing_amount: row.get(14)?,
        review_status: row.get(15)?,
        reviewed_by: row.get(16)?,
        reviewed_at: row.get(17)?,
        review_notes: row.get(18)?,
        additional_tests: row.get(19)?,
        patient_instructions: row.get(20)?,
        changes_required: row.get(21)?,
        approved_for_lab: row.get(22)?,
        assigned_lab_staff_id: row.get(23)?,
        assigned_lab_staff_name: row.get(24)?,
        sample_collector_id: row.get(25)?,
        sample_collector_name: row.get(26)?,
        lab_technician_id: row.get(27)?,
        lab_technician_name: row.get(28)?,
        sample_collection_status: row.get(29)?,
        sample_collection_scheduled_date: row.get(30)?,
        sample_collection_actual_date: row.get(31)?,
        sample_collection_notes: row.get(32)?,
        testing_start_date: row.get(33)?,
        testing_end_date: row.get(34)?,
        report_generated_date: row.get(35)?,
        report_generated_by: row.get(36)?,
        report_sent_date: row.get(37)?,
        report_sent_by: row.get(38)?,
        report_file_path: row.get(39)?,
        send_method: row.get(40)?,
        sent_to: row.get(41)?,
        delivery_confirmed: row.get(42)?,
        test_results: row.get(43)?,
        result_values: row.get(44)?,
        conclusion: row.get(45)?,
        recommendations: row.get(46)?,
        notes: row.get(47)?,
        is_active: row.get(48)?,
        version: row.get(49)?,
        created_at: row.get(50)?,
        updated_at: row.get(51)?,
    })
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

fn parse_dt(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| DatabaseError::ConstraintViolation(format!("timestamp: {e}")))
}

fn opt_uuid(s: Option<String>) -> Result<Option<Uuid>, DatabaseError> {
    s.as_deref().map(parse_uuid).transpose()
}

fn opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    s.as_deref().map(parse_dt).transpose()
}

fn from_row(row: Row) -> Result<TestRequest, DatabaseError> {
    let result_values: Vec<ResultValue> = match row.result_values.as_deref() {
        Some(json) if !json.is_empty() => serde_json::from_str(json)
            .map_err(|e| DatabaseError::ConstraintViolation(format!("result_values: {e}")))?,
        _ => Vec::new(),
    };

    Ok(TestRequest {
        id: parse_uuid(&row.id)?,
        doctor_id: parse_uuid(&row.doctor_id)?,
        doctor_name: row.doctor_name,
        patient_id: parse_uuid(&row.patient_id)?,
        patient_name: row.patient_name,
        center_id: parse_uuid(&row.center_id)?,
        center_name: row.center_name,
        center_code: row.center_code,
        test_type: row.test_type,
        test_description: row.test_description,
        urgency: Urgency::from_str(&row.urgency)?,
        status: TestStatus::from_str(&row.status)?,
        workflow_stage: WorkflowStage::from_str(&row.workflow_stage)?,
        billing: Billing {
            status: BillingStatus::from_str(&row.billing_status)?,
            amount: row.billing_amount,
        },
        review: SuperadminReview {
            status: ReviewStatus::from_str(&row.review_status)?,
            reviewed_by: opt_uuid(row.reviewed_by)?,
            reviewed_at: opt_dt(row.reviewed_at)?,
            notes: row.review_notes,
            additional_tests: row.additional_tests,
            patient_instructions: row.patient_instructions,
            changes_required: row.changes_required,
            approved_for_lab: row.approved_for_lab,
        },
        assigned_lab_staff_id: opt_uuid(row.assigned_lab_staff_id)?,
        assigned_lab_staff_name: row.assigned_lab_staff_name,
        sample_collector_id: opt_uuid(row.sample_collector_id)?,
        sample_collector_name: row.sample_collector_name,
        lab_technician_id: opt_uuid(row.lab_technician_id)?,
        lab_technician_name: row.lab_technician_name,
        sample_collection_status: row
            .sample_collection_status
            .as_deref()
            .map(SampleCollectionStatus::from_str)
            .transpose()?,
        sample_collection_scheduled_date: opt_dt(row.sample_collection_scheduled_date)?,
        sample_collection_actual_date: opt_dt(row.sample_collection_actual_date)?,
        sample_collection_notes: row.sample_collection_notes,
        testing_start_date: opt_dt(row.testing_start_date)?,
        testing_end_date: opt_dt(row.testing_end_date)?,
        report_generated_date: opt_dt(row.report_generated_date)?,
        report_generated_by: opt_uuid(row.report_generated_by)?,
        report_sent_date: opt_dt(row.report_sent_date)?,
        report_sent_by: opt_uuid(row.report_sent_by)?,
        report_file_path: row.report_file_path,
        send_method: row
            .send_method
            .as_deref()
            .map(SendMethod::from_str)
            .transpose()?,
        sent_to: row.sent_to,
        delivery_confirmed: row.delivery_confirmed,
        test_results: row.test_results,
        result_values,
        conclusion: row.conclusion,
        recommendations: row.recommendations,
        notes: row.notes,
        is_active: row.is_active,
        version: row.version,
        created_at: parse_dt(&row.created_at)?,
        updated_at: parse_dt(&row.updated_at)?,
    })
}
