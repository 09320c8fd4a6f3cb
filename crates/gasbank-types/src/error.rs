use crate::amount::Amount;
use crate::transaction::TxStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GasBankError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("cron expressions are not supported; use schedule_at for deferred withdrawals")]
    CronUnsupported,

    #[error("gas account {account} does not belong to {owner}")]
    NotOwner { account: String, owner: String },

    #[error("wallet address {0} already assigned to another account")]
    WalletInUse(String),

    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: Amount, requested: Amount },

    #[error("withdrawal would leave {remaining}, below the minimum balance {min_balance}")]
    MinBalance { remaining: Amount, min_balance: Amount },

    #[error("daily withdrawal limit {limit} exceeded: {used} already withdrawn today, {requested} requested")]
    DailyLimitExceeded {
        used: Amount,
        limit: Amount,
        requested: Amount,
    },

    #[error("transaction {id} is {actual}, expected {expected}")]
    InvalidStatus {
        id: String,
        expected: &'static str,
        actual: TxStatus,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("concurrent update on {kind} {id}")]
    Conflict { kind: &'static str, id: String },

    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, GasBankError>;

/// Coarse error classes, for exhaustive transport mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    WalletConflict,
    Policy,
    State,
    NotFound,
    Concurrency,
    Storage,
}

impl GasBankError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GasBankError::InvalidAmount(_)
            | GasBankError::MissingField(_)
            | GasBankError::CronUnsupported => ErrorKind::Validation,
            GasBankError::NotOwner { .. } => ErrorKind::Authorization,
            GasBankError::WalletInUse(_) => ErrorKind::WalletConflict,
            GasBankError::InsufficientFunds { .. }
            | GasBankError::MinBalance { .. }
            | GasBankError::DailyLimitExceeded { .. } => ErrorKind::Policy,
            GasBankError::InvalidStatus { .. } => ErrorKind::State,
            GasBankError::NotFound { .. } => ErrorKind::NotFound,
            GasBankError::Conflict { .. } => ErrorKind::Concurrency,
            GasBankError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        GasBankError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn conflict(kind: &'static str, id: impl Into<String>) -> Self {
        GasBankError::Conflict {
            kind,
            id: id.into(),
        }
    }
}
