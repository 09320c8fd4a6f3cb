use crate::account::{AccountId, OwnerId};
use crate::amount::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a ledger transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    Deposit,
    Withdrawal,
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxType::Deposit => write!(f, "deposit"),
            TxType::Withdrawal => write!(f, "withdrawal"),
        }
    }
}

/// Transaction lifecycle state.
///
/// Deposits are created `completed`. Withdrawals move
/// `pending -> completed | failed`, with `awaiting_approval` and `scheduled`
/// as gated entry states and `cancelled` reachable from any reserving state.
/// `dead_letter` parks a withdrawal whose settlement attempts ran out; funds
/// stay reserved until it is retried or deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Completed,
    Pending,
    AwaitingApproval,
    Scheduled,
    Cancelled,
    Failed,
    DeadLetter,
}

impl TxStatus {
    /// Terminal states are immutable.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Completed | TxStatus::Cancelled | TxStatus::Failed)
    }

    /// States whose withdrawal amount is counted in the account's `pending`.
    pub fn reserves_funds(&self) -> bool {
        matches!(
            self,
            TxStatus::Pending | TxStatus::AwaitingApproval | TxStatus::Scheduled | TxStatus::DeadLetter
        )
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TxStatus::Completed => "completed",
            TxStatus::Pending => "pending",
            TxStatus::AwaitingApproval => "awaiting_approval",
            TxStatus::Scheduled => "scheduled",
            TxStatus::Cancelled => "cancelled",
            TxStatus::Failed => "failed",
            TxStatus::DeadLetter => "dead_letter",
        };
        write!(f, "{}", s)
    }
}

/// One deposit or withdrawal attempt against a gas account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub account_id: AccountId,
    pub owner_id: OwnerId,
    pub tx_type: TxType,
    pub amount: Amount,
    pub status: TxStatus,
    pub from_address: String,
    pub to_address: String,
    /// On-chain reference of the deposit that funded this credit.
    pub external_ref: String,
    /// Approval policy captured from the account when the withdrawal was created.
    pub required_approvals: u32,
    pub schedule_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub resolver_attempts: u32,
    pub resolver_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub dead_letter_reason: Option<String>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// New transaction row; the store assigns id, version, and timestamps.
    pub fn new(
        account_id: AccountId,
        owner_id: OwnerId,
        tx_type: TxType,
        amount: Amount,
        status: TxStatus,
    ) -> Self {
        Transaction {
            id: String::new(),
            account_id,
            owner_id,
            tx_type,
            amount,
            status,
            from_address: String::new(),
            to_address: String::new(),
            external_ref: String::new(),
            required_approvals: 0,
            schedule_at: None,
            failure_reason: None,
            resolver_attempts: 0,
            resolver_error: None,
            last_attempt_at: None,
            next_attempt_at: None,
            dead_letter_reason: None,
            version: 0,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
            completed_at: None,
        }
    }

    pub fn is_withdrawal(&self) -> bool {
        self.tx_type == TxType::Withdrawal
    }
}
