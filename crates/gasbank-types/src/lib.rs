mod account;
mod amount;
mod approval;
mod error;
mod schedule;
mod settlement;
mod transaction;

pub use account::{normalize_wallet_address, AccountId, GasAccount, OwnerId};
pub use amount::Amount;
pub use approval::{Approval, ApprovalDecision};
pub use error::{ErrorKind, GasBankError, Result};
pub use schedule::WithdrawalSchedule;
pub use settlement::{AttemptStatus, DeadLetter, SettlementAttempt};
pub use transaction::{Transaction, TxStatus, TxType};

#[cfg(test)]
mod tests;
