use crate::amount::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the platform identity that owns gas accounts
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        OwnerId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OwnerId {
    fn from(s: String) -> Self {
        OwnerId(s)
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        OwnerId(s.to_string())
    }
}

/// Identifier of a gas account row
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        AccountId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        AccountId(s)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        AccountId(s.to_string())
    }
}

/// Canonical form of a wallet address: trimmed and lowercased.
/// Wallet uniqueness is always checked against this form.
pub fn normalize_wallet_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// Custodial gas account for one (owner, wallet) pair.
///
/// Invariant after every committed operation: `balance == available + pending`
/// and `available >= 0`. `version` is the optimistic-concurrency token; the
/// store rejects updates whose snapshot version is stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasAccount {
    pub id: AccountId,
    pub owner_id: OwnerId,
    pub wallet_address: String,
    pub balance: Amount,
    pub available: Amount,
    pub pending: Amount,
    /// Floor below which withdrawals are rejected. Zero disables the check.
    pub min_balance: Amount,
    /// Maximum withdrawal volume per UTC calendar day. Zero disables the check.
    pub daily_limit: Amount,
    pub notification_threshold: Amount,
    /// Approvals required before a withdrawal may settle. 0 or 1 means no gating.
    pub required_approvals: u32,
    /// Volume withdrawn within the UTC day of `last_withdrawal_at`.
    pub daily_withdrawn: Amount,
    pub last_withdrawal_at: Option<DateTime<Utc>>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GasAccount {
    /// New zero-balance account with defaulted (disabled) limits.
    /// The store assigns id, version, and timestamps on create.
    pub fn new(owner_id: OwnerId, wallet_address: impl Into<String>) -> Self {
        GasAccount {
            id: AccountId::new(""),
            owner_id,
            wallet_address: wallet_address.into(),
            balance: Amount::ZERO,
            available: Amount::ZERO,
            pending: Amount::ZERO,
            min_balance: Amount::ZERO,
            daily_limit: Amount::ZERO,
            notification_threshold: Amount::ZERO,
            required_approvals: 0,
            daily_withdrawn: Amount::ZERO,
            last_withdrawal_at: None,
            version: 0,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Balance decomposition invariant.
    pub fn is_consistent(&self) -> bool {
        self.balance == self.available + self.pending && !self.available.is_negative()
    }

    /// Whether withdrawals from this account require multi-signer sign-off.
    pub fn requires_approval(&self) -> bool {
        self.required_approvals >= 2
    }
}
