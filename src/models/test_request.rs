use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::directory::{Center, Doctor, Patient};
use super::enums::*;

/// One measured parameter in the result payload. The legacy mobile
/// client sends `name` instead of `parameter`; the alias keeps both
/// accepted on input while output always uses `parameter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultValue {
    #[serde(alias = "name")]
    pub parameter: String,
    pub value: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub normal_range: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Billing sub-state. Gates several top-level transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Billing {
    pub status: BillingStatus,
    pub amount: Option<f64>,
}

impl Billing {
    pub fn is_paid(&self) -> bool {
        self.status == BillingStatus::Paid
    }
}

/// Superadmin doctor review sub-record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuperadminReview {
    pub status: ReviewStatus,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub additional_tests: Option<String>,
    pub patient_instructions: Option<String>,
    pub changes_required: Option<String>,
    pub approved_for_lab: bool,
}

/// The central workflow entity. `status` is authoritative;
/// `workflow_stage` is always re-derived from it on write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRequest {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub doctor_name: String,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub center_id: Uuid,
    pub center_name: String,
    pub center_code: Option<String>,

    pub test_type: String,
    pub test_description: Option<String>,
    pub urgency: Urgency,

    pub status: TestStatus,
    pub workflow_stage: WorkflowStage,
    pub billing: Billing,
    pub review: SuperadminReview,

    pub assigned_lab_staff_id: Option<Uuid>,
    pub assigned_lab_staff_name: Option<String>,
    pub sample_collector_id: Option<Uuid>,
    pub sample_collector_name: Option<String>,
    pub lab_technician_id: Option<Uuid>,
    pub lab_technician_name: Option<String>,

    pub sample_collection_status: Option<SampleCollectionStatus>,
    pub sample_collection_scheduled_date: Option<DateTime<Utc>>,
    pub sample_collection_actual_date: Option<DateTime<Utc>>,
    pub sample_collection_notes: Option<String>,
    pub testing_start_date: Option<DateTime<Utc>>,
    pub testing_end_date: Option<DateTime<Utc>>,
    pub report_generated_date: Option<DateTime<Utc>>,
    pub report_generated_by: Option<Uuid>,
    pub report_sent_date: Option<DateTime<Utc>>,
    pub report_sent_by: Option<Uuid>,

    pub report_file_path: Option<String>,
    pub send_method: Option<SendMethod>,
    pub sent_to: Option<String>,
    pub delivery_confirmed: bool,

    pub test_results: Option<String>,
    pub result_values: Vec<ResultValue>,
    pub conclusion: Option<String>,
    pub recommendations: Option<String>,
    pub notes: Option<String>,

    pub is_active: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TestRequest {
    /// A freshly created request always enters the billing stage.
    pub fn new(
        doctor: &Doctor,
        patient: &Patient,
        center: &Center,
        test_type: String,
        test_description: Option<String>,
        urgency: Urgency,
        notes: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            doctor_id: doctor.id,
            doctor_name: doctor.name.clone(),
            patient_id: patient.id,
            patient_name: patient.name.clone(),
            center_id: center.id,
            center_name: center.name.clone(),
            center_code: Some(center.code.clone()),
            test_type,
            test_description,
            urgency,
            status: TestStatus::BillingPending,
            workflow_stage: TestStatus::BillingPending.stage(),
            billing: Billing {
                status: BillingStatus::NotGenerated,
                amount: None,
            },
            review: SuperadminReview {
                status: ReviewStatus::Pending,
                reviewed_by: None,
                reviewed_at: None,
                notes: None,
                additional_tests: None,
                patient_instructions: None,
                changes_required: None,
                approved_for_lab: false,
            },
            assigned_lab_staff_id: None,
            assigned_lab_staff_name: None,
            sample_collector_id: None,
            sample_collector_name: None,
            lab_technician_id: None,
            lab_technician_name: None,
            sample_collection_status: None,
            sample_collection_scheduled_date: None,
            sample_collection_actual_date: None,
            sample_collection_notes: None,
            testing_start_date: None,
            testing_end_date: None,
            report_generated_date: None,
            report_generated_by: None,
            report_sent_date: None,
            report_sent_by: None,
            report_file_path: None,
            send_method: None,
            sent_to: None,
            delivery_confirmed: false,
            test_results: None,
            result_values: Vec::new(),
            conclusion: None,
            recommendations: None,
            notes,
            is_active: true,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to a new status, re-deriving the stage label.
    pub fn set_status(&mut self, status: TestStatus) {
        self.status = status;
        self.workflow_stage = status.stage();
    }

    /// Append a line to the free-text notes, preserving what was there.
    pub fn append_note(&mut self, line: &str) {
        match &mut self.notes {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(line);
            }
            None => self.notes = Some(line.to_string()),
        }
    }
}
