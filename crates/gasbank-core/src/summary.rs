use chrono::{DateTime, Utc};
use gasbank_types::{Amount, GasAccount, Transaction, TxStatus, TxType};
use serde::{Deserialize, Serialize};

/// Owner-level rollup of balances and pending withdrawals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub accounts: Vec<AccountSummary>,
    pub pending_withdrawals: usize,
    pub pending_amount: Amount,
    pub total_balance: Amount,
    pub total_available: Amount,
    pub last_deposit: Option<TransactionBrief>,
    pub last_withdrawal: Option<TransactionBrief>,
    pub generated_at: DateTime<Utc>,
}

/// Per-gas-account rollup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSummary {
    pub account: GasAccount,
    pub pending_withdrawals: usize,
    pub pending_amount: Amount,
}

/// High-level transaction information for dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionBrief {
    pub id: String,
    pub tx_type: TxType,
    pub amount: Amount,
    pub status: TxStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub from_address: String,
    pub to_address: String,
    pub failure_reason: Option<String>,
}

impl TransactionBrief {
    pub fn from_transaction(tx: &Transaction) -> Self {
        TransactionBrief {
            id: tx.id.clone(),
            tx_type: tx.tx_type,
            amount: tx.amount,
            status: tx.status,
            created_at: tx.created_at,
            completed_at: tx.completed_at,
            from_address: tx.from_address.clone(),
            to_address: tx.to_address.clone(),
            failure_reason: tx.failure_reason.clone(),
        }
    }
}

/// Keep whichever brief is newer by creation time.
pub(crate) fn latest_brief(
    current: Option<TransactionBrief>,
    tx: &Transaction,
) -> Option<TransactionBrief> {
    let brief = TransactionBrief::from_transaction(tx);
    match current {
        Some(existing) if existing.created_at >= brief.created_at => Some(existing),
        _ => Some(brief),
    }
}
