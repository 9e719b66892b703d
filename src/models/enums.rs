use crate::db::DatabaseError;

/// Macro to generate enum with as_str + FromStr + serde via wire string.
///
/// Serialization goes through `as_str` so the JSON and database forms
/// are identical (several statuses use legacy mixed-case wire values).
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                let s = <String as serde::Deserialize>::deserialize(d)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

str_enum!(TestStatus {
    // Legacy value: referenced only by the delete guard; the create path
    // never produces it. Kept for wire compatibility.
    Pending => "Pending",
    BillingPending => "Billing_Pending",
    BillingGenerated => "Billing_Generated",
    BillingPaid => "Billing_Paid",
    SuperadminReview => "Superadmin_Review",
    SuperadminApproved => "Superadmin_Approved",
    SuperadminRejected => "Superadmin_Rejected",
    Assigned => "Assigned",
    SampleCollectionScheduled => "Sample_Collection_Scheduled",
    SampleCollected => "Sample_Collected",
    InLabTesting => "In_Lab_Testing",
    TestingCompleted => "Testing_Completed",
    ReportGenerated => "Report_Generated",
    ReportSent => "Report_Sent",
    Completed => "Completed",
    FeedbackSent => "feedback_sent",
    Cancelled => "Cancelled",
});

str_enum!(WorkflowStage {
    DoctorRequest => "doctor_request",
    Billing => "billing",
    SuperadminReview => "superadmin_review",
    LabAssignment => "lab_assignment",
    SampleCollection => "sample_collection",
    LabTesting => "lab_testing",
    Reporting => "reporting",
    Completed => "completed",
    Cancelled => "cancelled",
});

str_enum!(BillingStatus {
    NotGenerated => "not_generated",
    Generated => "generated",
    PaymentReceived => "payment_received",
    Paid => "paid",
});

str_enum!(ReviewStatus {
    Pending => "pending",
    RequiresChanges => "requires_changes",
    Approved => "approved",
    Rejected => "rejected",
    Reviewed => "reviewed",
});

str_enum!(Urgency {
    Normal => "Normal",
    Urgent => "Urgent",
    Emergency => "Emergency",
});

str_enum!(SampleCollectionStatus {
    Scheduled => "Scheduled",
    InProgress => "In_Progress",
    Completed => "Completed",
});

str_enum!(SendMethod {
    Email => "email",
    Portal => "portal",
    Print => "print",
});

str_enum!(Role {
    Superadmin => "superadmin",
    SuperadminDoctor => "superadmin_doctor",
    CenterAdmin => "center_admin",
    Doctor => "doctor",
    Receptionist => "receptionist",
    LabAdmin => "lab_admin",
    LabStaff => "lab_staff",
});

str_enum!(ReviewAction {
    Approve => "approve",
    Reject => "reject",
    RequireChanges => "require_changes",
});

str_enum!(NotificationKind {
    TestRequestCreated => "test_request_created",
    LabStaffAssigned => "lab_staff_assigned",
    ReviewApproved => "review_approved",
    ReviewRejected => "review_rejected",
});

impl TestStatus {
    /// The coarse UI grouping label; always derived from status so the
    /// two fields cannot contradict each other.
    pub fn stage(&self) -> WorkflowStage {
        match self {
            Self::Pending | Self::SuperadminRejected => WorkflowStage::DoctorRequest,
            Self::BillingPending | Self::BillingGenerated | Self::BillingPaid => {
                WorkflowStage::Billing
            }
            Self::SuperadminReview => WorkflowStage::SuperadminReview,
            Self::SuperadminApproved | Self::Assigned => WorkflowStage::LabAssignment,
            Self::SampleCollectionScheduled | Self::SampleCollected => {
                WorkflowStage::SampleCollection
            }
            Self::InLabTesting | Self::TestingCompleted => WorkflowStage::LabTesting,
            Self::ReportGenerated | Self::ReportSent => WorkflowStage::Reporting,
            Self::Completed | Self::FeedbackSent => WorkflowStage::Completed,
            Self::Cancelled => WorkflowStage::Cancelled,
        }
    }

    /// Whether a report artifact may be inspected or downloaded.
    pub fn report_available(&self) -> bool {
        matches!(
            self,
            Self::ReportGenerated | Self::ReportSent | Self::Completed | Self::FeedbackSent
        )
    }
}

impl Role {
    /// Global roles are not bound to a single center.
    pub fn is_global(&self) -> bool {
        matches!(self, Self::Superadmin | Self::SuperadminDoctor)
    }
}
