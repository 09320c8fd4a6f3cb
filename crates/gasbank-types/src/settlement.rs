use crate::account::AccountId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result class of one resolver poll against a pending withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Succeeded,
    Failed,
    Retry,
    Error,
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttemptStatus::Succeeded => "succeeded",
            AttemptStatus::Failed => "failed",
            AttemptStatus::Retry => "retry",
            AttemptStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Audit record of one settlement attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementAttempt {
    pub transaction_id: String,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub status: AttemptStatus,
    pub message: Option<String>,
}

/// Queue entry for a withdrawal whose settlement attempts ran out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub transaction_id: String,
    pub account_id: AccountId,
    pub reason: String,
    pub last_error: Option<String>,
    pub retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
