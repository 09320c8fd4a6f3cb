use chrono::{DateTime, Datelike, Utc};
use gasbank_store::GasBankStore;
use gasbank_types::{
    normalize_wallet_address, AccountId, Amount, Approval, ApprovalDecision, DeadLetter,
    GasAccount, GasBankError, OwnerId, Result, SettlementAttempt, Transaction, TxStatus, TxType,
    WithdrawalSchedule,
};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::summary::{latest_brief, AccountSummary, Summary};

pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 200;

/// Attempts per operation before a compare-and-swap conflict is surfaced.
const CONFLICT_RETRIES: usize = 3;

const DEFAULT_ACTIVATION_BATCH: usize = 50;

/// Optional parameters when ensuring a gas account.
/// Present values (including explicit zero) overwrite the stored setting;
/// absent values leave it untouched.
#[derive(Debug, Clone, Default)]
pub struct EnsureAccountOptions {
    pub wallet_address: Option<String>,
    pub min_balance: Option<Amount>,
    pub daily_limit: Option<Amount>,
    pub notification_threshold: Option<Amount>,
    pub required_approvals: Option<u32>,
}

impl EnsureAccountOptions {
    fn has_settings(&self) -> bool {
        self.min_balance.is_some()
            || self.daily_limit.is_some()
            || self.notification_threshold.is_some()
            || self.required_approvals.is_some()
    }
}

/// Controls how withdrawals are created.
#[derive(Debug, Clone)]
pub struct WithdrawOptions {
    pub amount: Amount,
    pub to_address: String,
    pub schedule_at: Option<DateTime<Utc>>,
    pub cron_expression: Option<String>,
}

/// Business logic for the gas bank ledger: account provisioning, balance
/// arithmetic, the withdrawal state machine, approval gating, limit
/// enforcement, and schedule activation. Stateless over the store; safe to
/// share across request-handling threads.
pub struct GasBankService {
    store: Arc<dyn GasBankStore>,
}

impl GasBankService {
    pub fn new(store: Arc<dyn GasBankStore>) -> Self {
        GasBankService { store }
    }

    pub fn store(&self) -> &Arc<dyn GasBankStore> {
        &self.store
    }

    // ---- account provisioning -------------------------------------------

    /// Retrieve the gas account for (owner, wallet), creating it if missing.
    pub fn ensure_account(&self, owner: &OwnerId, wallet_address: &str) -> Result<GasAccount> {
        self.ensure_account_with_options(owner, wallet_address, EnsureAccountOptions::default())
    }

    /// Idempotent provisioning with optional configuration overrides.
    pub fn ensure_account_with_options(
        &self,
        owner: &OwnerId,
        wallet_address: &str,
        opts: EnsureAccountOptions,
    ) -> Result<GasAccount> {
        if owner.is_empty() {
            return Err(GasBankError::MissingField("owner_id"));
        }
        let wallet = normalize_wallet_address(
            opts.wallet_address.as_deref().unwrap_or(wallet_address),
        );
        if wallet.is_empty() {
            return Err(GasBankError::MissingField("wallet_address"));
        }

        if let Some(existing) = self.store.find_account_by_wallet(&wallet)? {
            if &existing.owner_id != owner {
                return Err(GasBankError::WalletInUse(wallet));
            }
            if !opts.has_settings() {
                return Ok(existing);
            }
            return self.mutate_account(&existing.id, |acct| {
                apply_ensure_options(acct, &opts);
                Ok(())
            });
        }

        let mut account = GasAccount::new(owner.clone(), wallet);
        apply_ensure_options(&mut account, &opts);
        let created = match self.store.create_account(account) {
            Ok(created) => created,
            // Lost a provisioning race; still idempotent when the owner matches.
            Err(GasBankError::WalletInUse(wallet)) => {
                return match self.store.find_account_by_wallet(&wallet)? {
                    Some(existing) if &existing.owner_id == owner => Ok(existing),
                    _ => Err(GasBankError::WalletInUse(wallet)),
                };
            }
            Err(e) => return Err(e),
        };
        info!(
            gas_account_id = %created.id,
            owner_id = %owner,
            wallet = %created.wallet_address,
            "gas account ensured"
        );
        Ok(created)
    }

    // ---- deposits --------------------------------------------------------

    /// Credit the account and record a completed deposit transaction.
    /// Rolls the credit back if the transaction record cannot be written.
    pub fn deposit(
        &self,
        account_id: &AccountId,
        amount: Amount,
        external_ref: &str,
        from_address: &str,
        to_address: &str,
    ) -> Result<(GasAccount, Transaction)> {
        if !amount.is_positive() {
            return Err(GasBankError::InvalidAmount(
                "deposit amount must be positive".to_string(),
            ));
        }

        let updated = self.mutate_account(account_id, |acct| {
            acct.balance = acct.balance.checked_add(amount)?;
            acct.available = acct.available.checked_add(amount)?;
            Ok(())
        })?;

        let mut tx = Transaction::new(
            updated.id.clone(),
            updated.owner_id.clone(),
            TxType::Deposit,
            amount,
            TxStatus::Completed,
        );
        tx.external_ref = external_ref.to_string();
        tx.from_address = from_address.to_string();
        tx.to_address = to_address.to_string();
        tx.completed_at = Some(Utc::now());

        let tx = match self.store.create_transaction(tx) {
            Ok(tx) => tx,
            Err(e) => {
                self.undo_balance_change(account_id, |acct| {
                    acct.balance = acct.balance - amount;
                    acct.available = acct.available - amount;
                });
                return Err(e);
            }
        };

        info!(
            gas_account_id = %updated.id,
            owner_id = %updated.owner_id,
            amount = %amount,
            external_ref = external_ref,
            "gas deposit recorded"
        );
        Ok((updated, tx))
    }

    // ---- withdrawals -----------------------------------------------------

    /// Reserve funds for an immediate withdrawal.
    pub fn withdraw(
        &self,
        owner: &OwnerId,
        account_id: &AccountId,
        amount: Amount,
        to_address: &str,
    ) -> Result<(GasAccount, Transaction)> {
        self.withdraw_with_options(
            owner,
            account_id,
            WithdrawOptions {
                amount,
                to_address: to_address.to_string(),
                schedule_at: None,
                cron_expression: None,
            },
        )
    }

    /// Reserve funds for a withdrawal with scheduling and limit enforcement.
    ///
    /// Limits are evaluated against the account's current `available` before
    /// this reservation. The approval policy is snapshotted onto the
    /// transaction so later gating decisions are unaffected by account
    /// reconfiguration.
    pub fn withdraw_with_options(
        &self,
        owner: &OwnerId,
        account_id: &AccountId,
        opts: WithdrawOptions,
    ) -> Result<(GasAccount, Transaction)> {
        if owner.is_empty() {
            return Err(GasBankError::MissingField("owner_id"));
        }
        let amount = opts.amount;
        if !amount.is_positive() {
            return Err(GasBankError::InvalidAmount(
                "withdrawal amount must be positive".to_string(),
            ));
        }
        if opts
            .cron_expression
            .as_deref()
            .is_some_and(|expr| !expr.trim().is_empty())
        {
            return Err(GasBankError::CronUnsupported);
        }

        let now = Utc::now();
        let schedule_at = opts.schedule_at.filter(|at| *at > now);

        let updated = self.mutate_account(account_id, |acct| {
            if &acct.owner_id != owner {
                return Err(GasBankError::NotOwner {
                    account: acct.id.to_string(),
                    owner: owner.to_string(),
                });
            }
            if acct.available < amount {
                return Err(GasBankError::InsufficientFunds {
                    available: acct.available,
                    requested: amount,
                });
            }
            let remaining = acct.available - amount;
            if acct.min_balance.is_positive() && remaining < acct.min_balance {
                return Err(GasBankError::MinBalance {
                    remaining,
                    min_balance: acct.min_balance,
                });
            }
            let used_today = match acct.last_withdrawal_at {
                Some(last) if same_utc_day(last, now) => acct.daily_withdrawn,
                _ => Amount::ZERO,
            };
            if acct.daily_limit.is_positive() && used_today + amount > acct.daily_limit {
                return Err(GasBankError::DailyLimitExceeded {
                    used: used_today,
                    limit: acct.daily_limit,
                    requested: amount,
                });
            }

            acct.available = remaining;
            acct.pending = acct.pending.checked_add(amount)?;
            acct.daily_withdrawn = used_today + amount;
            acct.last_withdrawal_at = Some(now);
            Ok(())
        })?;

        let status = if schedule_at.is_some() {
            TxStatus::Scheduled
        } else if updated.requires_approval() {
            TxStatus::AwaitingApproval
        } else {
            TxStatus::Pending
        };

        let mut tx = Transaction::new(
            updated.id.clone(),
            updated.owner_id.clone(),
            TxType::Withdrawal,
            amount,
            status,
        );
        tx.to_address = opts.to_address.clone();
        tx.required_approvals = updated.required_approvals;
        tx.schedule_at = schedule_at;

        let tx = match self.store.create_transaction(tx) {
            Ok(tx) => tx,
            Err(e) => {
                self.undo_balance_change(account_id, |acct| {
                    acct.available = acct.available + amount;
                    acct.pending = acct.pending - amount;
                    acct.daily_withdrawn = acct.daily_withdrawn.saturating_sub(amount);
                });
                return Err(e);
            }
        };

        if let Some(at) = schedule_at {
            if let Err(e) = self.store.save_schedule(WithdrawalSchedule::new(&tx.id, at)) {
                warn!(
                    transaction_id = %tx.id,
                    error = %e,
                    "failed to persist withdrawal schedule"
                );
            }
        }

        info!(
            gas_account_id = %updated.id,
            owner_id = %updated.owner_id,
            amount = %amount,
            destination = %opts.to_address,
            status = %tx.status,
            "gas withdrawal requested"
        );
        Ok((updated, tx))
    }

    /// Finalise a pending withdrawal after the settlement attempt.
    /// On success the reserved funds leave the balance; on failure they are
    /// returned to `available`. Terminal transactions are rejected.
    pub fn complete_withdrawal(
        &self,
        transaction_id: &str,
        success: bool,
        failure_reason: &str,
    ) -> Result<(GasAccount, Transaction)> {
        if transaction_id.trim().is_empty() {
            return Err(GasBankError::MissingField("transaction_id"));
        }

        // Claim the status transition first; the versioned update makes the
        // settlement effective at most once even under concurrent pollers.
        let now = Utc::now();
        let tx = self.mutate_transaction(transaction_id, |tx| {
            if !tx.is_withdrawal() || tx.status != TxStatus::Pending {
                return Err(GasBankError::InvalidStatus {
                    id: tx.id.clone(),
                    expected: "pending withdrawal",
                    actual: tx.status,
                });
            }
            if success {
                tx.status = TxStatus::Completed;
                tx.failure_reason = None;
                tx.completed_at = Some(now);
            } else {
                tx.status = TxStatus::Failed;
                tx.failure_reason = Some(failure_reason.to_string());
            }
            tx.next_attempt_at = None;
            Ok(())
        })?;

        let amount = tx.amount;
        let account = self.mutate_account(&tx.account_id, |acct| {
            if acct.pending < amount {
                return Err(GasBankError::Storage(format!(
                    "pending balance {} cannot settle withdrawal of {}",
                    acct.pending, amount
                )));
            }
            acct.pending = acct.pending - amount;
            if success {
                acct.balance = acct.balance - amount;
            } else {
                acct.available = acct.available + amount;
            }
            Ok(())
        });

        let account = match account {
            Ok(account) => account,
            Err(e) => {
                // Put the claim back so a later settlement attempt can retry.
                self.revert_transaction_claim(&tx.id);
                return Err(e);
            }
        };

        info!(
            gas_account_id = %account.id,
            transaction_id = %tx.id,
            owner_id = %account.owner_id,
            success,
            "gas withdrawal settled"
        );
        Ok((account, tx))
    }

    /// Cancel a non-terminal withdrawal, restoring the reserved funds.
    pub fn cancel_withdrawal(
        &self,
        owner: &OwnerId,
        transaction_id: &str,
        reason: &str,
    ) -> Result<(GasAccount, Transaction)> {
        let tx = self.get_withdrawal(owner, transaction_id)?;
        self.cancel_reserved(&tx, reason.to_string())
    }

    // ---- approvals -------------------------------------------------------

    /// Record an approval or rejection vote for a withdrawal awaiting
    /// sign-off. A rejection cancels the withdrawal immediately; enough
    /// approvals promote it to `pending`.
    pub fn submit_approval(
        &self,
        transaction_id: &str,
        approver: &str,
        signature: Option<String>,
        note: Option<String>,
        approved: bool,
    ) -> Result<(GasAccount, Transaction)> {
        if transaction_id.trim().is_empty() {
            return Err(GasBankError::MissingField("transaction_id"));
        }
        let approver = approver.trim();
        if approver.is_empty() {
            return Err(GasBankError::MissingField("approver"));
        }

        let tx = self.store.get_transaction(transaction_id)?;
        if !tx.is_withdrawal() || tx.status != TxStatus::AwaitingApproval {
            return Err(GasBankError::InvalidStatus {
                id: tx.id.clone(),
                expected: "withdrawal awaiting approval",
                actual: tx.status,
            });
        }

        let decision = if approved {
            ApprovalDecision::Approved
        } else {
            ApprovalDecision::Rejected
        };
        self.store.upsert_approval(Approval {
            transaction_id: transaction_id.to_string(),
            approver: approver.to_string(),
            decision,
            signature,
            note,
            decided_at: Utc::now(),
        })?;

        if !approved {
            return self.cancel_reserved(&tx, format!("rejected by {}", approver));
        }

        let votes = self.store.list_approvals(transaction_id)?;
        let approved_count = votes.iter().filter(|v| v.is_approved()).count() as u32;
        let required = tx.required_approvals;

        let tx = if approved_count >= required {
            let promoted = self.mutate_transaction(transaction_id, |tx| {
                if tx.status != TxStatus::AwaitingApproval {
                    return Err(GasBankError::InvalidStatus {
                        id: tx.id.clone(),
                        expected: "withdrawal awaiting approval",
                        actual: tx.status,
                    });
                }
                tx.status = TxStatus::Pending;
                Ok(())
            })?;
            info!(
                transaction_id = %promoted.id,
                approvals = approved_count,
                required,
                "withdrawal fully approved"
            );
            promoted
        } else {
            tx
        };

        let account = self.store.get_account(&tx.account_id)?;
        Ok((account, tx))
    }

    /// Recorded votes for a withdrawal. Read-only.
    pub fn list_approvals(&self, transaction_id: &str) -> Result<Vec<Approval>> {
        if transaction_id.trim().is_empty() {
            return Err(GasBankError::MissingField("transaction_id"));
        }
        self.store.list_approvals(transaction_id)
    }

    // ---- scheduling ------------------------------------------------------

    /// Promote scheduled withdrawals whose trigger time has passed, up to
    /// `limit` per call. Safe to invoke concurrently: the scheduled ->
    /// pending transition is a versioned update, so each schedule activates
    /// at most once.
    pub fn activate_due_schedules(&self, limit: usize) -> Result<()> {
        let limit = if limit == 0 {
            DEFAULT_ACTIVATION_BATCH
        } else {
            limit
        };
        let due = self.store.list_due_schedules(Utc::now(), limit)?;
        for schedule in due {
            if let Err(e) = self.activate_schedule(&schedule) {
                warn!(
                    transaction_id = %schedule.transaction_id,
                    error = %e,
                    "schedule activation failed"
                );
            }
        }
        Ok(())
    }

    fn activate_schedule(&self, schedule: &WithdrawalSchedule) -> Result<()> {
        let tx = match self.store.get_transaction(&schedule.transaction_id) {
            Ok(tx) => tx,
            Err(GasBankError::NotFound { .. }) => {
                self.store.delete_schedule(&schedule.transaction_id)?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if tx.status != TxStatus::Scheduled {
            // Already activated or cancelled; the trigger row is stale.
            self.store.delete_schedule(&tx.id)?;
            return Ok(());
        }

        let next_status = if tx.required_approvals >= 2 {
            TxStatus::AwaitingApproval
        } else {
            TxStatus::Pending
        };
        match self.mutate_transaction(&tx.id, |tx| {
            if tx.status != TxStatus::Scheduled {
                return Err(GasBankError::InvalidStatus {
                    id: tx.id.clone(),
                    expected: "scheduled withdrawal",
                    actual: tx.status,
                });
            }
            tx.status = next_status;
            tx.schedule_at = None;
            Ok(())
        }) {
            Ok(activated) => {
                self.store.delete_schedule(&activated.id)?;
                info!(
                    transaction_id = %activated.id,
                    status = %activated.status,
                    "scheduled withdrawal activated"
                );
                Ok(())
            }
            // A concurrent activator or a cancellation won the race.
            Err(GasBankError::InvalidStatus { .. }) => {
                self.store.delete_schedule(&tx.id)?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    // ---- reads and aggregates -------------------------------------------

    pub fn get_account(&self, id: &AccountId) -> Result<GasAccount> {
        self.store.get_account(id)
    }

    pub fn list_accounts(&self, owner: &OwnerId) -> Result<Vec<GasAccount>> {
        if owner.is_empty() {
            return Err(GasBankError::MissingField("owner_id"));
        }
        self.store.list_accounts(Some(owner))
    }

    /// Ownership-checked read of a withdrawal transaction.
    pub fn get_withdrawal(&self, owner: &OwnerId, transaction_id: &str) -> Result<Transaction> {
        if owner.is_empty() {
            return Err(GasBankError::MissingField("owner_id"));
        }
        if transaction_id.trim().is_empty() {
            return Err(GasBankError::MissingField("transaction_id"));
        }
        let tx = self.store.get_transaction(transaction_id)?;
        if &tx.owner_id != owner {
            return Err(GasBankError::NotOwner {
                account: tx.account_id.to_string(),
                owner: owner.to_string(),
            });
        }
        if !tx.is_withdrawal() {
            return Err(GasBankError::InvalidStatus {
                id: tx.id.clone(),
                expected: "withdrawal",
                actual: tx.status,
            });
        }
        Ok(tx)
    }

    pub fn list_transactions(
        &self,
        account_id: &AccountId,
        limit: usize,
    ) -> Result<Vec<Transaction>> {
        self.list_transactions_filtered(account_id, None, None, limit)
    }

    pub fn list_transactions_filtered(
        &self,
        account_id: &AccountId,
        tx_type: Option<TxType>,
        status: Option<TxStatus>,
        limit: usize,
    ) -> Result<Vec<Transaction>> {
        let clamped = clamp_limit(limit);
        let txs = self.store.list_transactions(account_id, clamped)?;
        Ok(txs
            .into_iter()
            .filter(|tx| tx_type.map_or(true, |t| tx.tx_type == t))
            .filter(|tx| status.map_or(true, |s| tx.status == s))
            .collect())
    }

    /// Aggregate balances and activity across all accounts of an owner.
    pub fn summary(&self, owner: &OwnerId) -> Result<Summary> {
        if owner.is_empty() {
            return Err(GasBankError::MissingField("owner_id"));
        }
        let accounts = self.store.list_accounts(Some(owner))?;

        let mut summary = Summary {
            accounts: Vec::with_capacity(accounts.len()),
            pending_withdrawals: 0,
            pending_amount: Amount::ZERO,
            total_balance: Amount::ZERO,
            total_available: Amount::ZERO,
            last_deposit: None,
            last_withdrawal: None,
            generated_at: Utc::now(),
        };

        for account in accounts {
            let mut account_summary = AccountSummary {
                account: account.clone(),
                pending_withdrawals: 0,
                pending_amount: Amount::ZERO,
            };
            summary.total_balance = summary.total_balance + account.balance;
            summary.total_available = summary.total_available + account.available;

            let txs = self.store.list_transactions(&account.id, DEFAULT_LIST_LIMIT)?;
            for tx in &txs {
                if tx.is_withdrawal() && tx.status.reserves_funds() {
                    summary.pending_withdrawals += 1;
                    summary.pending_amount = summary.pending_amount + tx.amount;
                    account_summary.pending_withdrawals += 1;
                    account_summary.pending_amount = account_summary.pending_amount + tx.amount;
                }
                match tx.tx_type {
                    TxType::Deposit if tx.status == TxStatus::Completed => {
                        summary.last_deposit = latest_brief(summary.last_deposit.take(), tx);
                    }
                    TxType::Withdrawal => {
                        summary.last_withdrawal = latest_brief(summary.last_withdrawal.take(), tx);
                    }
                    _ => {}
                }
            }
            summary.accounts.push(account_summary);
        }

        Ok(summary)
    }

    // ---- settlement bookkeeping and dead letters ------------------------

    /// Ownership-checked read of the resolver attempts for a withdrawal.
    pub fn list_settlement_attempts(
        &self,
        owner: &OwnerId,
        transaction_id: &str,
        limit: usize,
    ) -> Result<Vec<SettlementAttempt>> {
        let tx = self.get_withdrawal(owner, transaction_id)?;
        self.store
            .list_settlement_attempts(&tx.id, clamp_limit(limit))
    }

    /// Park a withdrawal whose settlement attempts ran out. Funds remain
    /// reserved until the entry is retried or deleted.
    pub fn mark_dead_letter(
        &self,
        transaction_id: &str,
        reason: &str,
        last_error: Option<String>,
    ) -> Result<Transaction> {
        let now = Utc::now();
        let reason_owned = reason.to_string();
        let last_error_clone = last_error.clone();
        let tx = self.mutate_transaction(transaction_id, |tx| {
            if !tx.is_withdrawal() || !tx.status.reserves_funds() {
                return Err(GasBankError::InvalidStatus {
                    id: tx.id.clone(),
                    expected: "in-flight withdrawal",
                    actual: tx.status,
                });
            }
            tx.status = TxStatus::DeadLetter;
            tx.dead_letter_reason = Some(reason_owned.clone());
            tx.resolver_error = last_error_clone.clone();
            tx.next_attempt_at = None;
            Ok(())
        })?;

        self.store.upsert_dead_letter(DeadLetter {
            transaction_id: tx.id.clone(),
            account_id: tx.account_id.clone(),
            reason: reason.to_string(),
            last_error,
            retries: tx.resolver_attempts,
            created_at: now,
            updated_at: now,
        })?;
        warn!(
            transaction_id = %tx.id,
            gas_account_id = %tx.account_id,
            reason,
            "withdrawal moved to dead letter queue"
        );
        Ok(tx)
    }

    /// Dead-lettered withdrawals across all accounts of an owner.
    pub fn list_dead_letters(&self, owner: &OwnerId, limit: usize) -> Result<Vec<DeadLetter>> {
        if owner.is_empty() {
            return Err(GasBankError::MissingField("owner_id"));
        }
        let clamped = clamp_limit(limit);
        let mut entries = Vec::new();
        for account in self.store.list_accounts(Some(owner))? {
            entries.extend(self.store.list_dead_letters(&account.id, clamped)?);
            if entries.len() >= clamped {
                entries.truncate(clamped);
                break;
            }
        }
        Ok(entries)
    }

    /// Requeue a dead-lettered withdrawal for settlement, re-applying the
    /// approval gating captured at creation time.
    pub fn retry_dead_letter(
        &self,
        owner: &OwnerId,
        transaction_id: &str,
    ) -> Result<Transaction> {
        let tx = self.get_withdrawal(owner, transaction_id)?;
        self.store.get_dead_letter(&tx.id)?;

        let next_status = if tx.required_approvals >= 2 {
            TxStatus::AwaitingApproval
        } else {
            TxStatus::Pending
        };
        let tx = self.mutate_transaction(&tx.id, |tx| {
            if tx.status != TxStatus::DeadLetter {
                return Err(GasBankError::InvalidStatus {
                    id: tx.id.clone(),
                    expected: "dead-lettered withdrawal",
                    actual: tx.status,
                });
            }
            tx.status = next_status;
            tx.dead_letter_reason = None;
            tx.resolver_attempts = 0;
            tx.resolver_error = None;
            tx.last_attempt_at = None;
            tx.next_attempt_at = None;
            Ok(())
        })?;
        self.store.remove_dead_letter(&tx.id)?;
        info!(
            transaction_id = %tx.id,
            owner_id = %owner,
            status = %tx.status,
            "dead-lettered withdrawal requeued"
        );
        Ok(tx)
    }

    /// Cancel a dead-lettered withdrawal and drop its queue entry.
    pub fn delete_dead_letter(&self, owner: &OwnerId, transaction_id: &str) -> Result<()> {
        let tx = self.get_withdrawal(owner, transaction_id)?;
        self.store.get_dead_letter(&tx.id)?;

        if !tx.status.is_terminal() {
            self.cancel_reserved(&tx, "dead letter cancelled".to_string())?;
        }
        self.store.remove_dead_letter(&tx.id)?;
        info!(
            transaction_id = %tx.id,
            owner_id = %owner,
            "dead-lettered withdrawal removed"
        );
        Ok(())
    }

    // ---- internals -------------------------------------------------------

    /// Read-modify-write an account with bounded retries on a version
    /// conflict. Validation errors from `apply` abort immediately.
    fn mutate_account<F>(&self, id: &AccountId, mut apply: F) -> Result<GasAccount>
    where
        F: FnMut(&mut GasAccount) -> Result<()>,
    {
        let mut last = GasBankError::conflict("gas account", id.as_str());
        for _ in 0..CONFLICT_RETRIES {
            let mut account = self.store.get_account(id)?;
            apply(&mut account)?;
            match self.store.update_account(account) {
                Ok(updated) => return Ok(updated),
                Err(e @ GasBankError::Conflict { .. }) => last = e,
                Err(e) => return Err(e),
            }
        }
        Err(last)
    }

    /// Read-modify-write a transaction with bounded conflict retries.
    fn mutate_transaction<F>(&self, id: &str, mut apply: F) -> Result<Transaction>
    where
        F: FnMut(&mut Transaction) -> Result<()>,
    {
        let mut last = GasBankError::conflict("transaction", id);
        for _ in 0..CONFLICT_RETRIES {
            let mut tx = self.store.get_transaction(id)?;
            apply(&mut tx)?;
            match self.store.update_transaction(tx) {
                Ok(updated) => return Ok(updated),
                Err(e @ GasBankError::Conflict { .. }) => last = e,
                Err(e) => return Err(e),
            }
        }
        Err(last)
    }

    /// Best-effort inverse balance mutation after a failed record write.
    fn undo_balance_change<F>(&self, id: &AccountId, mut apply: F)
    where
        F: FnMut(&mut GasAccount),
    {
        if let Err(e) = self.mutate_account(id, |acct| {
            apply(acct);
            Ok(())
        }) {
            error!(
                gas_account_id = %id,
                error = %e,
                "failed to roll back gas account after record failure"
            );
        }
    }

    /// Best-effort return of a settled transaction to `pending` after the
    /// balance write failed.
    fn revert_transaction_claim(&self, id: &str) {
        let result = self.mutate_transaction(id, |tx| {
            tx.status = TxStatus::Pending;
            tx.failure_reason = None;
            tx.completed_at = None;
            Ok(())
        });
        if let Err(e) = result {
            error!(
                transaction_id = %id,
                error = %e,
                "failed to revert settlement claim after balance failure"
            );
        }
    }

    /// Cancel a fund-reserving withdrawal: claim the status transition, then
    /// return the reservation to `available`.
    fn cancel_reserved(
        &self,
        tx: &Transaction,
        reason: String,
    ) -> Result<(GasAccount, Transaction)> {
        let cancelled = self.mutate_transaction(&tx.id, |tx| {
            if !tx.status.reserves_funds() {
                return Err(GasBankError::InvalidStatus {
                    id: tx.id.clone(),
                    expected: "in-flight withdrawal",
                    actual: tx.status,
                });
            }
            tx.status = TxStatus::Cancelled;
            tx.failure_reason = Some(reason.clone());
            tx.schedule_at = None;
            tx.next_attempt_at = None;
            Ok(())
        })?;

        let amount = cancelled.amount;
        let account = self.mutate_account(&cancelled.account_id, |acct| {
            if acct.pending < amount {
                return Err(GasBankError::Storage(format!(
                    "pending balance {} cannot release withdrawal of {}",
                    acct.pending, amount
                )));
            }
            acct.pending = acct.pending - amount;
            acct.available = acct.available + amount;
            Ok(())
        })?;

        if let Err(e) = self.store.delete_schedule(&cancelled.id) {
            warn!(
                transaction_id = %cancelled.id,
                error = %e,
                "failed to drop schedule for cancelled withdrawal"
            );
        }

        info!(
            transaction_id = %cancelled.id,
            gas_account_id = %account.id,
            reason = %reason,
            "gas withdrawal cancelled"
        );
        Ok((account, cancelled))
    }
}

fn apply_ensure_options(account: &mut GasAccount, opts: &EnsureAccountOptions) {
    if let Some(min_balance) = opts.min_balance {
        account.min_balance = clamp_non_negative(min_balance);
    }
    if let Some(daily_limit) = opts.daily_limit {
        account.daily_limit = clamp_non_negative(daily_limit);
    }
    if let Some(threshold) = opts.notification_threshold {
        account.notification_threshold = clamp_non_negative(threshold);
    }
    if let Some(required) = opts.required_approvals {
        account.required_approvals = required;
    }
}

fn clamp_non_negative(amount: Amount) -> Amount {
    if amount.is_negative() {
        Amount::ZERO
    } else {
        amount
    }
}

fn clamp_limit(limit: usize) -> usize {
    if limit == 0 {
        DEFAULT_LIST_LIMIT
    } else {
        limit.min(MAX_LIST_LIMIT)
    }
}

/// The daily-limit window is the UTC calendar day.
fn same_utc_day(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.year() == b.year() && a.ordinal() == b.ordinal()
}
