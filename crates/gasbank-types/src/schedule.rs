use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trigger row for a future-dated withdrawal. Exists only while the owning
/// transaction is `scheduled`; `next_run_at <= now` makes it due.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalSchedule {
    pub transaction_id: String,
    pub schedule_at: DateTime<Utc>,
    pub next_run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WithdrawalSchedule {
    pub fn new(transaction_id: impl Into<String>, schedule_at: DateTime<Utc>) -> Self {
        WithdrawalSchedule {
            transaction_id: transaction_id.into(),
            schedule_at,
            next_run_at: schedule_at,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_run_at <= now
    }
}
