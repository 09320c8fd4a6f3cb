use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of one approver's vote on a withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

impl fmt::Display for ApprovalDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalDecision::Approved => write!(f, "approved"),
            ApprovalDecision::Rejected => write!(f, "rejected"),
        }
    }
}

/// One (transaction, approver) vote. Upserted per approver: a repeat vote
/// replaces the earlier one and never counts twice toward the threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    pub transaction_id: String,
    pub approver: String,
    pub decision: ApprovalDecision,
    pub signature: Option<String>,
    pub note: Option<String>,
    pub decided_at: DateTime<Utc>,
}

impl Approval {
    pub fn is_approved(&self) -> bool {
        self.decision == ApprovalDecision::Approved
    }
}
