//! Test request workflow engine.
//!
//! Request-scoped and stateless: each operation loads the request,
//! checks role, center scope and transition guards, mutates, and commits
//! through a version-conditional update so racing actors cannot both
//! pass a guard. Notification fan-out runs after the commit and never
//! fails the transition.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::repository::directory::{resolve_center, resolve_doctor, resolve_patient};
use crate::db::repository::test_request::{
    get_test_request, insert_test_request, list_test_requests, update_test_request,
};
use crate::models::directory::StaffUser;
use crate::models::enums::*;
use crate::models::test_request::{ResultValue, TestRequest};
use crate::report::{resolve_report_path, ReportStore};
use crate::workflow::{notify, WorkflowError};

// ─── Operation inputs ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateTestRequest {
    /// Defaults to the authenticated doctor when omitted.
    pub doctor_id: Option<Uuid>,
    pub patient_id: Uuid,
    pub test_type: String,
    pub test_description: Option<String>,
    #[serde(default)]
    pub urgency: Option<Urgency>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateBillInput {
    pub amount: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct MarkBillPaidInput {
    /// `paid` and the legacy `payment_received` are synonyms; any other
    /// value is rejected. Omitting the field means `paid`.
    pub status: Option<BillingStatus>,
}

#[derive(Debug, Deserialize)]
pub struct AssignLabStaffInput {
    pub staff_id: Uuid,
    pub staff_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleCollectionInput {
    pub collector_id: Uuid,
    pub collector_name: String,
    pub scheduled_date: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CollectionStatusInput {
    pub status: SampleCollectionStatus,
    pub actual_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StartTestingInput {
    pub technician_id: Uuid,
    pub technician_name: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteTestingInput {
    pub results: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ResultValue>,
    pub conclusion: Option<String>,
    pub recommendations: Option<String>,
    pub completed_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateReportInput {
    pub report_summary: Option<String>,
    pub clinical_interpretation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendReportInput {
    pub send_method: Option<SendMethod>,
    pub email_subject: Option<String>,
    pub email_message: Option<String>,
    pub sent_to: Option<String>,
    #[serde(default)]
    pub delivery_confirmation: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReviewInput {
    pub action: ReviewAction,
    pub review_notes: Option<String>,
    pub additional_tests: Option<String>,
    pub patient_instructions: Option<String>,
    pub changes_required: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusOverrideInput {
    pub status: TestStatus,
}

#[derive(Debug, Deserialize)]
pub struct CancelInput {
    pub reason: Option<String>,
}

/// Read model for `report-status`.
#[derive(Debug, serde::Serialize)]
pub struct ReportStatusView {
    pub status: TestStatus,
    pub report_available: bool,
    pub file_present: bool,
    pub report_file_path: Option<String>,
    pub report_generated_date: Option<DateTime<Utc>>,
    pub report_sent_date: Option<DateTime<Utc>>,
}

// ─── Engine ───────────────────────────────────────────────────────────────────

pub struct Engine<'a> {
    conn: &'a Connection,
}

impl<'a> Engine<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    // ── Reads ──

    pub fn get(&self, actor: &StaffUser, id: Uuid) -> Result<TestRequest, WorkflowError> {
        let tr = get_test_request(self.conn, id)?;
        ensure_center_scope(actor, &tr)?;
        Ok(tr)
    }

    /// Center-scoped listing; global roles see everything.
    pub fn list(&self, actor: &StaffUser) -> Result<Vec<TestRequest>, WorkflowError> {
        let scope = if actor.role.is_global() {
            None
        } else {
            actor.center_id
        };
        Ok(list_test_requests(self.conn, scope)?)
    }

    // ── Creation ──

    pub fn create(
        &self,
        actor: &StaffUser,
        input: CreateTestRequest,
    ) -> Result<TestRequest, WorkflowError> {
        require_role(actor, &[Role::Doctor, Role::SuperadminDoctor])?;

        let doctor_id = input.doctor_id.unwrap_or(actor.id);
        let doctor = resolve_doctor(self.conn, doctor_id)?;
        let patient = resolve_patient(self.conn, input.patient_id)?;

        let center_id = doctor
            .center_id
            .or(patient.center_id)
            .ok_or_else(|| {
                WorkflowError::Validation(
                    "neither doctor nor patient carries a center affiliation".into(),
                )
            })?;
        let center = resolve_center(self.conn, center_id)?;

        if input.test_type.trim().is_empty() {
            return Err(WorkflowError::Validation("test_type is required".into()));
        }

        let tr = TestRequest::new(
            &doctor,
            &patient,
            &center,
            input.test_type,
            input.test_description,
            input.urgency.unwrap_or(Urgency::Normal),
            input.notes,
        );
        insert_test_request(self.conn, &tr)?;

        notify::on_created(self.conn, &tr);
        Ok(tr)
    }

    // ── Billing ──

    pub fn generate_bill(
        &self,
        actor: &StaffUser,
        id: Uuid,
        input: GenerateBillInput,
    ) -> Result<TestRequest, WorkflowError> {
        require_role(
            actor,
            &[Role::Receptionist, Role::CenterAdmin, Role::Superadmin],
        )?;
        if input.amount <= 0.0 {
            return Err(WorkflowError::Validation("amount must be positive".into()));
        }

        let mut tr = self.load_scoped(actor, id)?;
        ensure_status(&tr, &[TestStatus::BillingPending], "Billing_Pending")?;
        if tr.billing.status != BillingStatus::NotGenerated {
            return Err(invalid(&tr, "billing not yet generated"));
        }

        tr.billing.status = BillingStatus::Generated;
        tr.billing.amount = Some(input.amount);
        tr.set_status(TestStatus::BillingGenerated);
        update_test_request(self.conn, &mut tr)?;
        Ok(tr)
    }

    pub fn mark_bill_paid(
        &self,
        actor: &StaffUser,
        id: Uuid,
        input: MarkBillPaidInput,
    ) -> Result<TestRequest, WorkflowError> {
        require_role(
            actor,
            &[Role::Receptionist, Role::CenterAdmin, Role::Superadmin],
        )?;
        match input.status {
            None | Some(BillingStatus::Paid) | Some(BillingStatus::PaymentReceived) => {}
            Some(other) => {
                return Err(WorkflowError::Validation(format!(
                    "cannot mark a bill {other} through this operation"
                )));
            }
        }

        let mut tr = self.load_scoped(actor, id)?;
        ensure_status(&tr, &[TestStatus::BillingGenerated], "Billing_Generated")?;
        // Payment requires a generated bill with a non-null amount
        let paid_ready = matches!(
            tr.billing.status,
            BillingStatus::Generated | BillingStatus::PaymentReceived
        ) && tr.billing.amount.is_some();
        if !paid_ready {
            return Err(invalid(&tr, "a generated bill with an amount"));
        }

        tr.billing.status = BillingStatus::Paid;
        tr.set_status(TestStatus::BillingPaid);
        update_test_request(self.conn, &mut tr)?;
        Ok(tr)
    }

    // ── Superadmin review ──

    pub fn review(
        &self,
        actor: &StaffUser,
        id: Uuid,
        input: ReviewInput,
    ) -> Result<TestRequest, WorkflowError> {
        require_role(actor, &[Role::SuperadminDoctor, Role::Superadmin])?;

        let mut tr = self.load_scoped(actor, id)?;
        ensure_status(
            &tr,
            &[
                TestStatus::BillingPaid,
                TestStatus::SuperadminReview,
                TestStatus::SuperadminRejected,
            ],
            "Billing_Paid, Superadmin_Review or Superadmin_Rejected",
        )?;

        tr.review.reviewed_by = Some(actor.id);
        tr.review.reviewed_at = Some(Utc::now());
        tr.review.notes = input.review_notes;
        tr.review.additional_tests = input.additional_tests;
        tr.review.patient_instructions = input.patient_instructions;

        match input.action {
            ReviewAction::Approve => {
                if !tr.billing.is_paid() {
                    return Err(invalid(&tr, "a paid bill before approval"));
                }
                tr.review.status = ReviewStatus::Approved;
                tr.review.approved_for_lab = true;
                tr.set_status(TestStatus::SuperadminApproved);
                update_test_request(self.conn, &mut tr)?;
                notify::on_review_approved(self.conn, &tr);
            }
            ReviewAction::Reject => {
                tr.review.status = ReviewStatus::Rejected;
                tr.review.approved_for_lab = false;
                tr.set_status(TestStatus::SuperadminRejected);
                update_test_request(self.conn, &mut tr)?;
                notify::on_review_rejected(self.conn, &tr);
            }
            ReviewAction::RequireChanges => {
                tr.review.status = ReviewStatus::RequiresChanges;
                tr.review.changes_required = input.changes_required;
                // Stays in review until the doctor revises
                tr.set_status(TestStatus::SuperadminReview);
                update_test_request(self.conn, &mut tr)?;
            }
        }
        Ok(tr)
    }

    // ── Lab assignment and sample collection ──

    pub fn assign_lab_staff(
        &self,
        actor: &StaffUser,
        id: Uuid,
        input: AssignLabStaffInput,
    ) -> Result<TestRequest, WorkflowError> {
        require_role(actor, &[Role::LabAdmin, Role::Superadmin])?;

        let mut tr = self.load_scoped(actor, id)?;
        ensure_status(
            &tr,
            &[TestStatus::BillingPaid, TestStatus::SuperadminApproved],
            "Billing_Paid or Superadmin_Approved",
        )?;
        ensure_paid(&tr, "lab staff assignment")?;

        tr.assigned_lab_staff_id = Some(input.staff_id);
        tr.assigned_lab_staff_name = Some(input.staff_name);
        tr.set_status(TestStatus::Assigned);
        update_test_request(self.conn, &mut tr)?;

        notify::on_assigned(self.conn, &tr);
        Ok(tr)
    }

    pub fn schedule_sample_collection(
        &self,
        actor: &StaffUser,
        id: Uuid,
        input: ScheduleCollectionInput,
    ) -> Result<TestRequest, WorkflowError> {
        require_role(actor, &[Role::LabAdmin, Role::Superadmin])?;

        let mut tr = self.load_scoped(actor, id)?;
        ensure_status(&tr, &[TestStatus::Assigned], "Assigned")?;
        ensure_paid(&tr, "sample collection scheduling")?;

        tr.sample_collector_id = Some(input.collector_id);
        tr.sample_collector_name = Some(input.collector_name);
        tr.sample_collection_scheduled_date = Some(input.scheduled_date);
        tr.sample_collection_notes = input.notes;
        tr.sample_collection_status = Some(SampleCollectionStatus::Scheduled);
        tr.set_status(TestStatus::SampleCollectionScheduled);
        update_test_request(self.conn, &mut tr)?;
        Ok(tr)
    }

    /// Billing is not re-checked here: the schedule step already gated it.
    pub fn update_sample_collection_status(
        &self,
        actor: &StaffUser,
        id: Uuid,
        input: CollectionStatusInput,
    ) -> Result<TestRequest, WorkflowError> {
        require_role(actor, &[Role::LabStaff, Role::LabAdmin, Role::Superadmin])?;

        let mut tr = self.load_scoped(actor, id)?;
        ensure_status(
            &tr,
            &[
                TestStatus::SampleCollectionScheduled,
                TestStatus::SampleCollected,
            ],
            "Sample_Collection_Scheduled or Sample_Collected",
        )?;

        tr.sample_collection_status = Some(input.status);
        if let Some(notes) = input.notes {
            match &mut tr.sample_collection_notes {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(&notes);
                }
                None => tr.sample_collection_notes = Some(notes),
            }
        }
        match input.status {
            SampleCollectionStatus::Completed => {
                tr.sample_collection_actual_date = Some(input.actual_date.unwrap_or_else(Utc::now));
                tr.set_status(TestStatus::SampleCollected);
            }
            SampleCollectionStatus::InProgress | SampleCollectionStatus::Scheduled => {
                tr.set_status(TestStatus::SampleCollectionScheduled);
            }
        }
        update_test_request(self.conn, &mut tr)?;
        Ok(tr)
    }

    // ── Lab testing ──

    pub fn start_lab_testing(
        &self,
        actor: &StaffUser,
        id: Uuid,
        input: StartTestingInput,
    ) -> Result<TestRequest, WorkflowError> {
        require_role(actor, &[Role::LabStaff, Role::LabAdmin, Role::Superadmin])?;

        let mut tr = self.load_scoped(actor, id)?;
        ensure_status(&tr, &[TestStatus::SampleCollected], "Sample_Collected")?;
        ensure_paid(&tr, "lab testing")?;

        tr.lab_technician_id = Some(input.technician_id);
        tr.lab_technician_name = Some(input.technician_name);
        tr.testing_start_date = Some(Utc::now());
        if let Some(notes) = input.notes {
            tr.append_note(&notes);
        }
        tr.set_status(TestStatus::InLabTesting);
        update_test_request(self.conn, &mut tr)?;
        Ok(tr)
    }

    pub fn complete_lab_testing(
        &self,
        actor: &StaffUser,
        id: Uuid,
        input: CompleteTestingInput,
    ) -> Result<TestRequest, WorkflowError> {
        require_role(actor, &[Role::LabStaff, Role::LabAdmin, Role::Superadmin])?;

        let mut tr = self.load_scoped(actor, id)?;
        ensure_status(&tr, &[TestStatus::InLabTesting], "In_Lab_Testing")?;
        ensure_paid(&tr, "completing lab testing")?;

        tr.test_results = input.results;
        tr.result_values = input.parameters;
        tr.conclusion = input.conclusion;
        tr.recommendations = input.recommendations;
        // The acting technician comes from the authenticated caller,
        // never from the request body
        tr.lab_technician_id = Some(actor.id);
        tr.lab_technician_name = Some(actor.name.clone());
        tr.testing_end_date = Some(input.completed_date.unwrap_or_else(Utc::now));
        tr.set_status(TestStatus::TestingCompleted);
        update_test_request(self.conn, &mut tr)?;
        Ok(tr)
    }

    // ── Reporting ──

    /// Deliberately unguarded on current status (any-state transition in
    /// the historical behavior, kept explicit; flagged for product review
    /// since it allows rendering before testing completes).
    pub fn generate_report(
        &self,
        actor: &StaffUser,
        id: Uuid,
        input: GenerateReportInput,
        store: &dyn ReportStore,
    ) -> Result<TestRequest, WorkflowError> {
        require_role(actor, &[Role::LabStaff, Role::LabAdmin, Role::Superadmin])?;

        let mut tr = self.load_scoped(actor, id)?;
        let path = store.render(
            &tr,
            input.report_summary.as_deref(),
            input.clinical_interpretation.as_deref(),
        )?;

        tr.report_file_path = Some(path.to_string_lossy().into_owned());
        tr.report_generated_by = Some(actor.id);
        tr.report_generated_date = Some(Utc::now());
        tr.set_status(TestStatus::ReportGenerated);
        update_test_request(self.conn, &mut tr)?;
        Ok(tr)
    }

    pub fn send_report(
        &self,
        actor: &StaffUser,
        id: Uuid,
        input: SendReportInput,
    ) -> Result<TestRequest, WorkflowError> {
        require_role(actor, &[Role::LabStaff, Role::LabAdmin, Role::Superadmin])?;

        let mut tr = self.load_scoped(actor, id)?;
        if tr.report_file_path.is_none() {
            return Err(WorkflowError::Validation(
                "no generated report to send".into(),
            ));
        }

        let method = input.send_method.unwrap_or(SendMethod::Email);
        tr.send_method = Some(method);
        tr.sent_to = input.sent_to;
        tr.delivery_confirmed = input.delivery_confirmation;
        tr.report_sent_by = Some(actor.id);
        tr.report_sent_date = Some(Utc::now());
        if method == SendMethod::Email {
            if let Some(subject) = input.email_subject.as_deref() {
                tr.append_note(&format!("Report emailed: {subject}"));
            }
        }
        tr.set_status(TestStatus::ReportSent);
        update_test_request(self.conn, &mut tr)?;
        Ok(tr)
    }

    pub fn report_status(
        &self,
        actor: &StaffUser,
        id: Uuid,
        reports_dir: &std::path::Path,
    ) -> Result<ReportStatusView, WorkflowError> {
        let tr = self.load_scoped(actor, id)?;
        ensure_report_available(&tr)?;

        let file_present = tr
            .report_file_path
            .as_deref()
            .and_then(|p| resolve_report_path(p, reports_dir))
            .is_some();

        Ok(ReportStatusView {
            status: tr.status,
            report_available: true,
            file_present,
            report_file_path: tr.report_file_path,
            report_generated_date: tr.report_generated_date,
            report_sent_date: tr.report_sent_date,
        })
    }

    /// Resolve the artifact on disk for streaming.
    pub fn download_report(
        &self,
        actor: &StaffUser,
        id: Uuid,
        reports_dir: &std::path::Path,
    ) -> Result<(TestRequest, std::path::PathBuf), WorkflowError> {
        let tr = self.load_scoped(actor, id)?;
        ensure_report_available(&tr)?;

        let stored = tr
            .report_file_path
            .as_deref()
            .ok_or_else(|| WorkflowError::NotFound {
                entity: "report file".into(),
                id: id.to_string(),
            })?;
        let path =
            resolve_report_path(stored, reports_dir).ok_or_else(|| WorkflowError::NotFound {
                entity: "report file".into(),
                id: id.to_string(),
            })?;
        Ok((tr, path))
    }

    // ── Overrides and terminal operations ──

    /// Raw status override. Re-derives the stage label so the two fields
    /// never contradict.
    pub fn update_status(
        &self,
        actor: &StaffUser,
        id: Uuid,
        input: StatusOverrideInput,
    ) -> Result<TestRequest, WorkflowError> {
        let mut tr = self.load_scoped(actor, id)?;
        tr.set_status(input.status);
        update_test_request(self.conn, &mut tr)?;
        Ok(tr)
    }

    /// Deliberately unguarded on current status (any-state transition in
    /// the historical behavior, kept explicit).
    pub fn cancel(
        &self,
        actor: &StaffUser,
        id: Uuid,
        input: CancelInput,
    ) -> Result<TestRequest, WorkflowError> {
        let mut tr = self.load_scoped(actor, id)?;
        let reason = input.reason.unwrap_or_else(|| "no reason given".into());
        tr.append_note(&format!("Cancelled: {reason}"));
        tr.set_status(TestStatus::Cancelled);
        update_test_request(self.conn, &mut tr)?;
        Ok(tr)
    }

    /// Soft delete. The `Pending` guard value is legacy vocabulary the
    /// create path never produces; kept literally (see DESIGN.md).
    pub fn delete(&self, actor: &StaffUser, id: Uuid) -> Result<(), WorkflowError> {
        require_role(actor, &[Role::CenterAdmin, Role::Superadmin])?;

        let mut tr = self.load_scoped(actor, id)?;
        ensure_status(
            &tr,
            &[TestStatus::Pending, TestStatus::Cancelled],
            "Pending or Cancelled",
        )?;

        tr.is_active = false;
        update_test_request(self.conn, &mut tr)?;
        Ok(())
    }

    fn load_scoped(&self, actor: &StaffUser, id: Uuid) -> Result<TestRequest, WorkflowError> {
        let tr = get_test_request(self.conn, id)?;
        ensure_center_scope(actor, &tr)?;
        Ok(tr)
    }
}

// ─── Guard helpers ────────────────────────────────────────────────────────────

fn require_role(actor: &StaffUser, allowed: &[Role]) -> Result<(), WorkflowError> {
    if !actor.is_active {
        return Err(WorkflowError::Forbidden("account is deactivated".into()));
    }
    if allowed.contains(&actor.role) || actor.role == Role::Superadmin {
        Ok(())
    } else {
        Err(WorkflowError::Forbidden(format!(
            "role {} may not perform this operation",
            actor.role
        )))
    }
}

/// Actor center must match the request's center unless the role is global.
fn ensure_center_scope(actor: &StaffUser, tr: &TestRequest) -> Result<(), WorkflowError> {
    if actor.role.is_global() {
        return Ok(());
    }
    if actor.center_id == Some(tr.center_id) {
        Ok(())
    } else {
        Err(WorkflowError::Forbidden(
            "request belongs to a different center".into(),
        ))
    }
}

fn ensure_status(
    tr: &TestRequest,
    allowed: &[TestStatus],
    required: &str,
) -> Result<(), WorkflowError> {
    if allowed.contains(&tr.status) {
        Ok(())
    } else {
        Err(invalid(tr, required))
    }
}

fn ensure_paid(tr: &TestRequest, operation: &str) -> Result<(), WorkflowError> {
    if tr.billing.is_paid() {
        Ok(())
    } else {
        Err(invalid(tr, &format!("a paid bill before {operation}")))
    }
}

fn ensure_report_available(tr: &TestRequest) -> Result<(), WorkflowError> {
    if tr.status.report_available() {
        Ok(())
    } else {
        Err(invalid(
            tr,
            "Report_Generated, Report_Sent, Completed or feedback_sent",
        ))
    }
}

fn invalid(tr: &TestRequest, required: &str) -> WorkflowError {
    WorkflowError::InvalidTransition {
        required: required.to_string(),
        current: tr.status,
        billing: tr.billing.status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::db::repository::directory::{
        insert_center, insert_doctor, insert_patient, insert_user,
    };
    use crate::db::repository::notification::{count_for_test_request, list_for_recipient};
    use crate::models::directory::{Center, Doctor, Patient};
    use crate::report::PdfReportStore;

    struct Fixture {
        conn: Connection,
        center: Center,
        doctor: StaffUser,
        patient: Patient,
        receptionist: StaffUser,
        reviewer: StaffUser,
        lab_admin: StaffUser,
        lab_tech: StaffUser,
    }

    fn staff(name: &str, role: Role, center_id: Option<Uuid>) -> StaffUser {
        StaffUser {
            id: Uuid::new_v4(),
            name: name.into(),
            role,
            center_id,
            is_active: true,
        }
    }

    fn fixture() -> Fixture {
        let conn = open_memory_database().unwrap();
        let center = Center {
            id: Uuid::new_v4(),
            name: "Harbor Allergy Clinic".into(),
            code: "HAC".into(),
        };
        insert_center(&conn, &center).unwrap();

        let doctor = staff("Dr. Reyes", Role::Doctor, Some(center.id));
        insert_user(&conn, &doctor).unwrap();
        insert_doctor(
            &conn,
            &Doctor {
                id: doctor.id,
                name: doctor.name.clone(),
                specialty: Some("Allergy".into()),
                center_id: Some(center.id),
                is_active: true,
            },
        )
        .unwrap();

        let patient = Patient {
            id: Uuid::new_v4(),
            name: "K. Adjei".into(),
            contact: None,
            center_id: Some(center.id),
            is_active: true,
        };
        insert_patient(&conn, &patient).unwrap();

        let receptionist = staff("Front Desk", Role::Receptionist, Some(center.id));
        let reviewer = staff("Dr. Chief", Role::SuperadminDoctor, None);
        let lab_admin = staff("Lab Admin", Role::LabAdmin, Some(center.id));
        let lab_tech = staff("Tech One", Role::LabStaff, Some(center.id));
        for u in [&receptionist, &reviewer, &lab_admin, &lab_tech] {
            insert_user(&conn, u).unwrap();
        }

        Fixture {
            conn,
            center,
            doctor,
            patient,
            receptionist,
            reviewer,
            lab_admin,
            lab_tech,
        }
    }

    fn create(fx: &Fixture, test_type: &str) -> TestRequest {
        Engine::new(&fx.conn)
            .create(
                &fx.doctor,
                CreateTestRequest {
                    doctor_id: None,
                    patient_id: fx.patient.id,
                    test_type: test_type.into(),
                    test_description: None,
                    urgency: Some(Urgency::Normal),
                    notes: None,
                },
            )
            .unwrap()
    }

    fn pay(fx: &Fixture, id: Uuid) -> TestRequest {
        let engine = Engine::new(&fx.conn);
        engine
            .generate_bill(&fx.receptionist, id, GenerateBillInput { amount: 80.0 })
            .unwrap();
        engine
            .mark_bill_paid(&fx.receptionist, id, MarkBillPaidInput::default())
            .unwrap()
    }

    #[test]
    fn create_starts_in_billing_pending() {
        let fx = fixture();
        let tr = create(&fx, "CBC");
        assert_eq!(tr.status, TestStatus::BillingPending);
        assert_eq!(tr.billing.status, BillingStatus::NotGenerated);
        assert_eq!(tr.center_name, "Harbor Allergy Clinic");
        assert_eq!(tr.workflow_stage, WorkflowStage::Billing);
    }

    #[test]
    fn create_fails_for_unknown_patient() {
        let fx = fixture();
        let err = Engine::new(&fx.conn)
            .create(
                &fx.doctor,
                CreateTestRequest {
                    doctor_id: None,
                    patient_id: Uuid::new_v4(),
                    test_type: "CBC".into(),
                    test_description: None,
                    urgency: None,
                    notes: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound { .. }));
    }

    #[test]
    fn happy_path_visits_every_stage_in_order() {
        let fx = fixture();
        let engine = Engine::new(&fx.conn);
        let tr = create(&fx, "CBC");
        let id = tr.id;
        let mut visited = vec![tr.status];

        let tr = engine
            .generate_bill(&fx.receptionist, id, GenerateBillInput { amount: 50.0 })
            .unwrap();
        visited.push(tr.status);
        let tr = engine
            .mark_bill_paid(&fx.receptionist, id, MarkBillPaidInput::default())
            .unwrap();
        visited.push(tr.status);

        let tr = engine
            .review(
                &fx.reviewer,
                id,
                ReviewInput {
                    action: ReviewAction::Approve,
                    review_notes: Some("ok".into()),
                    additional_tests: None,
                    patient_instructions: None,
                    changes_required: None,
                },
            )
            .unwrap();
        visited.push(tr.status);

        let tr = engine
            .assign_lab_staff(
                &fx.lab_admin,
                id,
                AssignLabStaffInput {
                    staff_id: fx.lab_tech.id,
                    staff_name: fx.lab_tech.name.clone(),
                },
            )
            .unwrap();
        visited.push(tr.status);

        let tr = engine
            .schedule_sample_collection(
                &fx.lab_admin,
                id,
                ScheduleCollectionInput {
                    collector_id: fx.lab_tech.id,
                    collector_name: fx.lab_tech.name.clone(),
                    scheduled_date: Utc::now(),
                    notes: None,
                },
            )
            .unwrap();
        visited.push(tr.status);

        let tr = engine
            .update_sample_collection_status(
                &fx.lab_tech,
                id,
                CollectionStatusInput {
                    status: SampleCollectionStatus::Completed,
                    actual_date: None,
                    notes: None,
                },
            )
            .unwrap();
        visited.push(tr.status);

        let tr = engine
            .start_lab_testing(
                &fx.lab_tech,
                id,
                StartTestingInput {
                    technician_id: fx.lab_tech.id,
                    technician_name: fx.lab_tech.name.clone(),
                    notes: None,
                },
            )
            .unwrap();
        visited.push(tr.status);

        let tr = engine
            .complete_lab_testing(
                &fx.lab_tech,
                id,
                CompleteTestingInput {
                    results: Some("unremarkable".into()),
                    parameters: vec![],
                    conclusion: None,
                    recommendations: None,
                    completed_date: None,
                },
            )
            .unwrap();
        visited.push(tr.status);

        let tmp = tempfile::tempdir().unwrap();
        let store = PdfReportStore::new(tmp.path().to_path_buf());
        let tr = engine
            .generate_report(
                &fx.lab_tech,
                id,
                GenerateReportInput {
                    report_summary: Some("All values in range".into()),
                    clinical_interpretation: None,
                },
                &store,
            )
            .unwrap();
        visited.push(tr.status);

        let tr = engine
            .send_report(
                &fx.lab_tech,
                id,
                SendReportInput {
                    send_method: Some(SendMethod::Email),
                    email_subject: Some("Your report".into()),
                    email_message: None,
                    sent_to: Some("dr.reyes@clinic.example".into()),
                    delivery_confirmation: true,
                },
            )
            .unwrap();
        visited.push(tr.status);

        assert_eq!(
            visited,
            vec![
                TestStatus::BillingPending,
                TestStatus::BillingGenerated,
                TestStatus::BillingPaid,
                TestStatus::SuperadminApproved,
                TestStatus::Assigned,
                TestStatus::SampleCollectionScheduled,
                TestStatus::SampleCollected,
                TestStatus::InLabTesting,
                TestStatus::TestingCompleted,
                TestStatus::ReportGenerated,
                TestStatus::ReportSent,
            ]
        );
    }

    #[test]
    fn payment_received_is_a_synonym_for_paid() {
        let fx = fixture();
        let engine = Engine::new(&fx.conn);
        let tr = create(&fx, "CBC");
        engine
            .generate_bill(&fx.receptionist, tr.id, GenerateBillInput { amount: 80.0 })
            .unwrap();

        let tr = engine
            .mark_bill_paid(
                &fx.receptionist,
                tr.id,
                MarkBillPaidInput {
                    status: Some(BillingStatus::PaymentReceived),
                },
            )
            .unwrap();
        assert_eq!(tr.status, TestStatus::BillingPaid);
        assert_eq!(tr.billing.status, BillingStatus::Paid);
    }

    #[test]
    fn non_paid_billing_values_are_rejected_as_payment_input() {
        let fx = fixture();
        let engine = Engine::new(&fx.conn);
        let tr = create(&fx, "CBC");
        engine
            .generate_bill(&fx.receptionist, tr.id, GenerateBillInput { amount: 80.0 })
            .unwrap();

        let err = engine
            .mark_bill_paid(
                &fx.receptionist,
                tr.id,
                MarkBillPaidInput {
                    status: Some(BillingStatus::Generated),
                },
            )
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));

        let after = engine.get(&fx.receptionist, tr.id).unwrap();
        assert_eq!(after.billing.status, BillingStatus::Generated);
    }

    #[test]
    fn create_survives_notification_delivery_failure() {
        let fx = fixture();
        // Break the delivery channel entirely; fan-out is best-effort and
        // must not take the transition down with it
        fx.conn.execute("DROP TABLE notifications", []).unwrap();

        let tr = create(&fx, "CBC");
        assert_eq!(tr.status, TestStatus::BillingPending);
        assert!(Engine::new(&fx.conn).get(&fx.doctor, tr.id).is_ok());
    }

    #[test]
    fn assign_before_payment_fails_and_leaves_status() {
        let fx = fixture();
        let engine = Engine::new(&fx.conn);
        let tr = create(&fx, "CBC");

        let err = engine
            .assign_lab_staff(
                &fx.lab_admin,
                tr.id,
                AssignLabStaffInput {
                    staff_id: fx.lab_tech.id,
                    staff_name: fx.lab_tech.name.clone(),
                },
            )
            .unwrap_err();
        match err {
            WorkflowError::InvalidTransition { current, billing, .. } => {
                assert_eq!(current, TestStatus::BillingPending);
                assert_eq!(billing, BillingStatus::NotGenerated);
            }
            other => panic!("expected InvalidTransition, got {other:?}"),
        }

        let after = engine.get(&fx.lab_admin, tr.id).unwrap();
        assert_eq!(after.status, TestStatus::BillingPending);
    }

    #[test]
    fn assign_twice_fails_from_assigned() {
        let fx = fixture();
        let engine = Engine::new(&fx.conn);
        let tr = create(&fx, "CBC");
        pay(&fx, tr.id);

        let input = || AssignLabStaffInput {
            staff_id: fx.lab_tech.id,
            staff_name: fx.lab_tech.name.clone(),
        };
        engine.assign_lab_staff(&fx.lab_admin, tr.id, input()).unwrap();
        let err = engine
            .assign_lab_staff(&fx.lab_admin, tr.id, input())
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    }

    #[test]
    fn approve_with_unpaid_bill_fails() {
        let fx = fixture();
        let engine = Engine::new(&fx.conn);
        let tr = create(&fx, "CBC");
        // Force the request into review without paying
        engine
            .update_status(
                &fx.reviewer,
                tr.id,
                StatusOverrideInput {
                    status: TestStatus::SuperadminReview,
                },
            )
            .unwrap();

        let err = engine
            .review(
                &fx.reviewer,
                tr.id,
                ReviewInput {
                    action: ReviewAction::Approve,
                    review_notes: None,
                    additional_tests: None,
                    patient_instructions: None,
                    changes_required: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));

        let after = engine.get(&fx.reviewer, tr.id).unwrap();
        assert_ne!(after.status, TestStatus::SuperadminApproved);
    }

    #[test]
    fn reject_returns_to_doctor_and_review_is_reenterable() {
        let fx = fixture();
        let engine = Engine::new(&fx.conn);
        let tr = create(&fx, "CBC");
        pay(&fx, tr.id);

        let tr = engine
            .review(
                &fx.reviewer,
                tr.id,
                ReviewInput {
                    action: ReviewAction::Reject,
                    review_notes: Some("wrong panel".into()),
                    additional_tests: None,
                    patient_instructions: None,
                    changes_required: None,
                },
            )
            .unwrap();
        assert_eq!(tr.status, TestStatus::SuperadminRejected);
        assert_eq!(tr.workflow_stage, WorkflowStage::DoctorRequest);
        assert_eq!(tr.review.status, ReviewStatus::Rejected);

        // Rejected requests re-enter review
        let tr = engine
            .review(
                &fx.reviewer,
                tr.id,
                ReviewInput {
                    action: ReviewAction::Approve,
                    review_notes: Some("revised".into()),
                    additional_tests: None,
                    patient_instructions: None,
                    changes_required: None,
                },
            )
            .unwrap();
        assert_eq!(tr.status, TestStatus::SuperadminApproved);
    }

    #[test]
    fn require_changes_stays_in_review() {
        let fx = fixture();
        let engine = Engine::new(&fx.conn);
        let tr = create(&fx, "CBC");
        pay(&fx, tr.id);

        let tr = engine
            .review(
                &fx.reviewer,
                tr.id,
                ReviewInput {
                    action: ReviewAction::RequireChanges,
                    review_notes: None,
                    additional_tests: None,
                    patient_instructions: None,
                    changes_required: Some("add fasting glucose".into()),
                },
            )
            .unwrap();
        assert_eq!(tr.status, TestStatus::SuperadminReview);
        assert_eq!(tr.review.status, ReviewStatus::RequiresChanges);
        assert_eq!(
            tr.review.changes_required.as_deref(),
            Some("add fasting glucose")
        );
    }

    #[test]
    fn delete_guard_is_literal_pending_or_cancelled() {
        let fx = fixture();
        let engine = Engine::new(&fx.conn);
        let superadmin = staff("Root", Role::Superadmin, None);

        // Fresh requests are Billing_Pending, not Pending: delete is refused
        let tr = create(&fx, "CBC");
        let err = engine.delete(&superadmin, tr.id).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
        assert!(engine.get(&superadmin, tr.id).is_ok());

        // Cancelled requests can be deleted
        engine
            .cancel(&superadmin, tr.id, CancelInput { reason: None })
            .unwrap();
        engine.delete(&superadmin, tr.id).unwrap();
        let err = engine.get(&superadmin, tr.id).unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound { .. }));
    }

    #[test]
    fn cancel_from_sample_collected_appends_reason() {
        let fx = fixture();
        let engine = Engine::new(&fx.conn);
        let mut tr = create(&fx, "CBC");
        tr = pay(&fx, tr.id);
        engine
            .update_status(
                &fx.reviewer,
                tr.id,
                StatusOverrideInput {
                    status: TestStatus::SampleCollected,
                },
            )
            .unwrap();
        // Seed existing notes through the override path
        let mut current = engine.get(&fx.reviewer, tr.id).unwrap();
        current.notes = Some("fasting sample".into());
        crate::db::repository::test_request::update_test_request(&fx.conn, &mut current).unwrap();

        let tr = engine
            .cancel(
                &fx.doctor,
                tr.id,
                CancelInput {
                    reason: Some("patient moved away".into()),
                },
            )
            .unwrap();
        assert_eq!(tr.status, TestStatus::Cancelled);
        assert_eq!(
            tr.notes.as_deref(),
            Some("fasting sample\nCancelled: patient moved away")
        );
    }

    #[test]
    fn complete_testing_preserves_parameter_order_and_actor() {
        let fx = fixture();
        let engine = Engine::new(&fx.conn);
        let tr = create(&fx, "CBC");
        pay(&fx, tr.id);
        engine
            .update_status(
                &fx.reviewer,
                tr.id,
                StatusOverrideInput {
                    status: TestStatus::InLabTesting,
                },
            )
            .unwrap();

        // Legacy payload uses `name` for the parameter key
        let parameters: Vec<ResultValue> = serde_json::from_str(
            r#"[{"name":"WBC","value":"6.1"},
                {"name":"RBC","value":"4.8"},
                {"parameter":"Hemoglobin","value":"13.9"}]"#,
        )
        .unwrap();

        let tr = engine
            .complete_lab_testing(
                &fx.lab_tech,
                tr.id,
                CompleteTestingInput {
                    results: None,
                    parameters,
                    conclusion: Some("normal".into()),
                    recommendations: None,
                    completed_date: None,
                },
            )
            .unwrap();

        assert_eq!(tr.status, TestStatus::TestingCompleted);
        assert_eq!(tr.result_values.len(), 3);
        let names: Vec<&str> = tr.result_values.iter().map(|v| v.parameter.as_str()).collect();
        assert_eq!(names, vec!["WBC", "RBC", "Hemoglobin"]);
        // Technician comes from the authenticated caller
        assert_eq!(tr.lab_technician_id, Some(fx.lab_tech.id));
        assert_eq!(tr.lab_technician_name.as_deref(), Some("Tech One"));
    }

    #[test]
    fn create_fans_out_to_center_receptionists() {
        let fx = fixture();
        // Two more receptionists in the target center, one in another center
        let other_center = Center {
            id: Uuid::new_v4(),
            name: "Other".into(),
            code: "OTH".into(),
        };
        insert_center(&fx.conn, &other_center).unwrap();
        insert_user(&fx.conn, &staff("R2", Role::Receptionist, Some(fx.center.id))).unwrap();
        insert_user(&fx.conn, &staff("R3", Role::Receptionist, Some(fx.center.id))).unwrap();
        insert_user(&fx.conn, &staff("R-other", Role::Receptionist, Some(other_center.id))).unwrap();

        let tr = create(&fx, "CBC");

        // Recipients: reviewer (superadmin doctor) + 3 center receptionists
        assert_eq!(count_for_test_request(&fx.conn, tr.id).unwrap(), 4);
        let for_reviewer = list_for_recipient(&fx.conn, fx.reviewer.id).unwrap();
        assert_eq!(for_reviewer.len(), 1);
        assert_eq!(for_reviewer[0].kind, NotificationKind::TestRequestCreated);
    }

    #[test]
    fn approval_notifies_doctor_and_all_active_lab_staff() {
        let fx = fixture();
        let engine = Engine::new(&fx.conn);
        insert_user(&fx.conn, &staff("Tech Two", Role::LabStaff, Some(fx.center.id))).unwrap();
        let mut inactive = staff("Tech Gone", Role::LabStaff, Some(fx.center.id));
        inactive.is_active = false;
        insert_user(&fx.conn, &inactive).unwrap();

        let tr = create(&fx, "CBC");
        pay(&fx, tr.id);
        let before = count_for_test_request(&fx.conn, tr.id).unwrap();

        engine
            .review(
                &fx.reviewer,
                tr.id,
                ReviewInput {
                    action: ReviewAction::Approve,
                    review_notes: None,
                    additional_tests: None,
                    patient_instructions: None,
                    changes_required: None,
                },
            )
            .unwrap();

        // Doctor + two active lab staff; the inactive one is skipped
        assert_eq!(count_for_test_request(&fx.conn, tr.id).unwrap(), before + 3);
    }

    #[test]
    fn receptionist_may_not_assign_lab_staff() {
        let fx = fixture();
        let engine = Engine::new(&fx.conn);
        let tr = create(&fx, "CBC");
        pay(&fx, tr.id);

        let err = engine
            .assign_lab_staff(
                &fx.receptionist,
                tr.id,
                AssignLabStaffInput {
                    staff_id: fx.lab_tech.id,
                    staff_name: fx.lab_tech.name.clone(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Forbidden(_)));
    }

    #[test]
    fn center_scope_blocks_foreign_lab_admin() {
        let fx = fixture();
        let engine = Engine::new(&fx.conn);
        let other_center = Center {
            id: Uuid::new_v4(),
            name: "Other".into(),
            code: "OT2".into(),
        };
        insert_center(&fx.conn, &other_center).unwrap();
        let foreign_admin = staff("Foreign Admin", Role::LabAdmin, Some(other_center.id));
        insert_user(&fx.conn, &foreign_admin).unwrap();

        let tr = create(&fx, "CBC");
        pay(&fx, tr.id);

        let err = engine
            .assign_lab_staff(
                &foreign_admin,
                tr.id,
                AssignLabStaffInput {
                    staff_id: fx.lab_tech.id,
                    staff_name: fx.lab_tech.name.clone(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Forbidden(_)));
    }

    #[test]
    fn report_access_requires_reporting_state() {
        let fx = fixture();
        let engine = Engine::new(&fx.conn);
        let tmp = tempfile::tempdir().unwrap();
        let tr = create(&fx, "CBC");

        let err = engine
            .report_status(&fx.doctor, tr.id, tmp.path())
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    }

    #[test]
    fn generate_then_download_report() {
        let fx = fixture();
        let engine = Engine::new(&fx.conn);
        let tmp = tempfile::tempdir().unwrap();
        let store = PdfReportStore::new(tmp.path().to_path_buf());
        let tr = create(&fx, "CBC");

        // Unguarded by design: report can be generated from any state
        let tr = engine
            .generate_report(
                &fx.lab_tech,
                tr.id,
                GenerateReportInput {
                    report_summary: None,
                    clinical_interpretation: None,
                },
                &store,
            )
            .unwrap();
        assert_eq!(tr.status, TestStatus::ReportGenerated);

        let view = engine.report_status(&fx.doctor, tr.id, tmp.path()).unwrap();
        assert!(view.report_available);
        assert!(view.file_present);

        let (_, path) = engine.download_report(&fx.doctor, tr.id, tmp.path()).unwrap();
        assert!(path.is_file());
        let bytes = std::fs::read(path).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn send_report_without_artifact_is_rejected() {
        let fx = fixture();
        let engine = Engine::new(&fx.conn);
        let tr = create(&fx, "CBC");

        let err = engine
            .send_report(
                &fx.lab_tech,
                tr.id,
                SendReportInput {
                    send_method: None,
                    email_subject: None,
                    email_message: None,
                    sent_to: None,
                    delivery_confirmation: false,
                },
            )
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn status_override_resyncs_stage() {
        let fx = fixture();
        let engine = Engine::new(&fx.conn);
        let tr = create(&fx, "CBC");

        let tr = engine
            .update_status(
                &fx.doctor,
                tr.id,
                StatusOverrideInput {
                    status: TestStatus::FeedbackSent,
                },
            )
            .unwrap();
        assert_eq!(tr.status, TestStatus::FeedbackSent);
        assert_eq!(tr.workflow_stage, WorkflowStage::Completed);
    }

    #[test]
    fn listing_is_center_scoped_for_local_roles() {
        let fx = fixture();
        let engine = Engine::new(&fx.conn);
        create(&fx, "CBC");
        create(&fx, "IgE Panel");

        assert_eq!(engine.list(&fx.lab_admin).unwrap().len(), 2);
        assert_eq!(engine.list(&fx.reviewer).unwrap().len(), 2);

        let other_center = Center {
            id: Uuid::new_v4(),
            name: "Elsewhere".into(),
            code: "EW".into(),
        };
        insert_center(&fx.conn, &other_center).unwrap();
        let foreign = staff("Elsewhere Admin", Role::LabAdmin, Some(other_center.id));
        assert!(engine.list(&foreign).unwrap().is_empty());
    }
}
