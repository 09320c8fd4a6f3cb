use chrono::{DateTime, Utc};
use gasbank_types::{
    AccountId, Approval, DeadLetter, GasAccount, OwnerId, Result, SettlementAttempt, Transaction,
    WithdrawalSchedule,
};

/// Durable keyed storage for accounts, transactions, approvals, and
/// withdrawal schedules.
///
/// Every method is a single atomic operation. `update_account` and
/// `update_transaction` commit only when the caller's snapshot `version`
/// matches the stored row (compare-and-swap) and fail with a conflict error
/// otherwise; this is the enforcement point for per-account serialization.
/// Implementations assign ids, versions, and timestamps on create.
pub trait GasBankStore: Send + Sync {
    fn create_account(&self, account: GasAccount) -> Result<GasAccount>;
    fn update_account(&self, account: GasAccount) -> Result<GasAccount>;
    fn get_account(&self, id: &AccountId) -> Result<GasAccount>;
    /// Lookup by normalized wallet address.
    fn find_account_by_wallet(&self, wallet: &str) -> Result<Option<GasAccount>>;
    /// All accounts, or one owner's accounts.
    fn list_accounts(&self, owner: Option<&OwnerId>) -> Result<Vec<GasAccount>>;

    fn create_transaction(&self, tx: Transaction) -> Result<Transaction>;
    fn update_transaction(&self, tx: Transaction) -> Result<Transaction>;
    fn get_transaction(&self, id: &str) -> Result<Transaction>;
    /// Transactions for one account, newest first.
    fn list_transactions(&self, account_id: &AccountId, limit: usize) -> Result<Vec<Transaction>>;
    /// Withdrawals currently in `pending` status, across all accounts.
    fn list_pending_withdrawals(&self) -> Result<Vec<Transaction>>;

    /// Insert or replace the vote keyed by (transaction, approver).
    fn upsert_approval(&self, approval: Approval) -> Result<Approval>;
    fn list_approvals(&self, transaction_id: &str) -> Result<Vec<Approval>>;

    fn save_schedule(&self, schedule: WithdrawalSchedule) -> Result<WithdrawalSchedule>;
    fn get_schedule(&self, transaction_id: &str) -> Result<Option<WithdrawalSchedule>>;
    fn delete_schedule(&self, transaction_id: &str) -> Result<()>;
    /// Schedules with `next_run_at <= due_before`, up to `limit`.
    fn list_due_schedules(
        &self,
        due_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<WithdrawalSchedule>>;

    fn record_settlement_attempt(&self, attempt: SettlementAttempt) -> Result<SettlementAttempt>;
    fn list_settlement_attempts(
        &self,
        transaction_id: &str,
        limit: usize,
    ) -> Result<Vec<SettlementAttempt>>;

    fn upsert_dead_letter(&self, entry: DeadLetter) -> Result<DeadLetter>;
    fn get_dead_letter(&self, transaction_id: &str) -> Result<DeadLetter>;
    fn list_dead_letters(&self, account_id: &AccountId, limit: usize) -> Result<Vec<DeadLetter>>;
    fn remove_dead_letter(&self, transaction_id: &str) -> Result<()>;
}
