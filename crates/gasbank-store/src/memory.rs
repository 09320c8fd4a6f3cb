use chrono::{DateTime, Utc};
use gasbank_types::{
    normalize_wallet_address, AccountId, Approval, DeadLetter, GasAccount, GasBankError, OwnerId,
    Result, SettlementAttempt, Transaction, TxStatus, TxType, WithdrawalSchedule,
};
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::store::GasBankStore;

/// In-memory store implementation
/// Suitable for testing and demo purposes
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    accounts: BTreeMap<String, GasAccount>,
    account_seq: u64,
    wallet_index: BTreeMap<String, String>,
    transactions: BTreeMap<String, Transaction>,
    tx_seq: u64,
    approvals: BTreeMap<String, Vec<Approval>>,
    schedules: BTreeMap<String, WithdrawalSchedule>,
    attempts: BTreeMap<String, Vec<SettlementAttempt>>,
    dead_letters: BTreeMap<String, DeadLetter>,
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned store is unrecoverable in-process state corruption.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl GasBankStore for MemoryStore {
    fn create_account(&self, mut account: GasAccount) -> Result<GasAccount> {
        let mut inner = self.lock();
        let wallet = normalize_wallet_address(&account.wallet_address);
        if !wallet.is_empty() && inner.wallet_index.contains_key(&wallet) {
            return Err(GasBankError::WalletInUse(wallet));
        }
        inner.account_seq += 1;
        let id = format!("gas-{}", inner.account_seq);
        let now = Utc::now();
        account.id = AccountId::new(id.clone());
        account.wallet_address = wallet.clone();
        account.version = 1;
        account.created_at = now;
        account.updated_at = now;
        if !wallet.is_empty() {
            inner.wallet_index.insert(wallet, id.clone());
        }
        inner.accounts.insert(id, account.clone());
        Ok(account)
    }

    fn update_account(&self, mut account: GasAccount) -> Result<GasAccount> {
        let mut inner = self.lock();
        let id = account.id.as_str().to_string();
        let existing = inner
            .accounts
            .get(&id)
            .ok_or_else(|| GasBankError::not_found("gas account", &id))?
            .clone();
        if existing.version != account.version {
            return Err(GasBankError::conflict("gas account", &id));
        }
        let old_wallet = normalize_wallet_address(&existing.wallet_address);
        let new_wallet = normalize_wallet_address(&account.wallet_address);
        if old_wallet != new_wallet {
            if !new_wallet.is_empty() {
                if let Some(other) = inner.wallet_index.get(&new_wallet) {
                    if other != &id {
                        return Err(GasBankError::WalletInUse(new_wallet));
                    }
                }
                inner.wallet_index.insert(new_wallet.clone(), id.clone());
            }
            inner.wallet_index.remove(&old_wallet);
        }
        account.wallet_address = new_wallet;
        account.version += 1;
        account.created_at = existing.created_at;
        account.updated_at = Utc::now();
        inner.accounts.insert(id, account.clone());
        Ok(account)
    }

    fn get_account(&self, id: &AccountId) -> Result<GasAccount> {
        let inner = self.lock();
        inner
            .accounts
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| GasBankError::not_found("gas account", id.as_str()))
    }

    fn find_account_by_wallet(&self, wallet: &str) -> Result<Option<GasAccount>> {
        let inner = self.lock();
        let wallet = normalize_wallet_address(wallet);
        Ok(inner
            .wallet_index
            .get(&wallet)
            .and_then(|id| inner.accounts.get(id))
            .cloned())
    }

    fn list_accounts(&self, owner: Option<&OwnerId>) -> Result<Vec<GasAccount>> {
        let inner = self.lock();
        Ok(inner
            .accounts
            .values()
            .filter(|a| owner.map_or(true, |o| &a.owner_id == o))
            .cloned()
            .collect())
    }

    fn create_transaction(&self, mut tx: Transaction) -> Result<Transaction> {
        let mut inner = self.lock();
        inner.tx_seq += 1;
        let id = format!("tx-{}", inner.tx_seq);
        let now = Utc::now();
        tx.id = id.clone();
        tx.version = 1;
        tx.created_at = now;
        tx.updated_at = now;
        inner.transactions.insert(id, tx.clone());
        Ok(tx)
    }

    fn update_transaction(&self, mut tx: Transaction) -> Result<Transaction> {
        let mut inner = self.lock();
        let existing = inner
            .transactions
            .get(&tx.id)
            .ok_or_else(|| GasBankError::not_found("transaction", &tx.id))?;
        if existing.version != tx.version {
            return Err(GasBankError::conflict("transaction", &tx.id));
        }
        tx.version += 1;
        tx.created_at = existing.created_at;
        tx.updated_at = Utc::now();
        inner.transactions.insert(tx.id.clone(), tx.clone());
        Ok(tx)
    }

    fn get_transaction(&self, id: &str) -> Result<Transaction> {
        let inner = self.lock();
        inner
            .transactions
            .get(id)
            .cloned()
            .ok_or_else(|| GasBankError::not_found("transaction", id))
    }

    fn list_transactions(&self, account_id: &AccountId, limit: usize) -> Result<Vec<Transaction>> {
        let inner = self.lock();
        let mut txs: Vec<Transaction> = inner
            .transactions
            .values()
            .filter(|tx| &tx.account_id == account_id)
            .cloned()
            .collect();
        txs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        if limit > 0 {
            txs.truncate(limit);
        }
        Ok(txs)
    }

    fn list_pending_withdrawals(&self) -> Result<Vec<Transaction>> {
        let inner = self.lock();
        Ok(inner
            .transactions
            .values()
            .filter(|tx| tx.tx_type == TxType::Withdrawal && tx.status == TxStatus::Pending)
            .cloned()
            .collect())
    }

    fn upsert_approval(&self, approval: Approval) -> Result<Approval> {
        let mut inner = self.lock();
        let votes = inner
            .approvals
            .entry(approval.transaction_id.clone())
            .or_default();
        match votes.iter_mut().find(|v| v.approver == approval.approver) {
            Some(existing) => *existing = approval.clone(),
            None => votes.push(approval.clone()),
        }
        Ok(approval)
    }

    fn list_approvals(&self, transaction_id: &str) -> Result<Vec<Approval>> {
        let inner = self.lock();
        Ok(inner
            .approvals
            .get(transaction_id)
            .cloned()
            .unwrap_or_default())
    }

    fn save_schedule(&self, mut schedule: WithdrawalSchedule) -> Result<WithdrawalSchedule> {
        let mut inner = self.lock();
        let now = Utc::now();
        if let Some(existing) = inner.schedules.get(&schedule.transaction_id) {
            schedule.created_at = existing.created_at;
        } else {
            schedule.created_at = now;
        }
        schedule.updated_at = now;
        inner
            .schedules
            .insert(schedule.transaction_id.clone(), schedule.clone());
        Ok(schedule)
    }

    fn get_schedule(&self, transaction_id: &str) -> Result<Option<WithdrawalSchedule>> {
        let inner = self.lock();
        Ok(inner.schedules.get(transaction_id).cloned())
    }

    fn delete_schedule(&self, transaction_id: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.schedules.remove(transaction_id);
        Ok(())
    }

    fn list_due_schedules(
        &self,
        due_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<WithdrawalSchedule>> {
        let inner = self.lock();
        let mut due: Vec<WithdrawalSchedule> = inner
            .schedules
            .values()
            .filter(|s| s.next_run_at <= due_before)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.next_run_at.cmp(&b.next_run_at));
        if limit > 0 {
            due.truncate(limit);
        }
        Ok(due)
    }

    fn record_settlement_attempt(&self, attempt: SettlementAttempt) -> Result<SettlementAttempt> {
        let mut inner = self.lock();
        inner
            .attempts
            .entry(attempt.transaction_id.clone())
            .or_default()
            .push(attempt.clone());
        Ok(attempt)
    }

    fn list_settlement_attempts(
        &self,
        transaction_id: &str,
        limit: usize,
    ) -> Result<Vec<SettlementAttempt>> {
        let inner = self.lock();
        let mut attempts = inner
            .attempts
            .get(transaction_id)
            .cloned()
            .unwrap_or_default();
        if limit > 0 {
            attempts.truncate(limit);
        }
        Ok(attempts)
    }

    fn upsert_dead_letter(&self, mut entry: DeadLetter) -> Result<DeadLetter> {
        let mut inner = self.lock();
        let now = Utc::now();
        if let Some(existing) = inner.dead_letters.get(&entry.transaction_id) {
            entry.created_at = existing.created_at;
        } else {
            entry.created_at = now;
        }
        entry.updated_at = now;
        inner
            .dead_letters
            .insert(entry.transaction_id.clone(), entry.clone());
        Ok(entry)
    }

    fn get_dead_letter(&self, transaction_id: &str) -> Result<DeadLetter> {
        let inner = self.lock();
        inner
            .dead_letters
            .get(transaction_id)
            .cloned()
            .ok_or_else(|| GasBankError::not_found("dead letter", transaction_id))
    }

    fn list_dead_letters(&self, account_id: &AccountId, limit: usize) -> Result<Vec<DeadLetter>> {
        let inner = self.lock();
        let mut entries: Vec<DeadLetter> = inner
            .dead_letters
            .values()
            .filter(|d| &d.account_id == account_id)
            .cloned()
            .collect();
        if limit > 0 {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    fn remove_dead_letter(&self, transaction_id: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.dead_letters.remove(transaction_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gasbank_types::Amount;

    fn account(owner: &str, wallet: &str) -> GasAccount {
        GasAccount::new(OwnerId::new(owner), wallet)
    }

    #[test]
    fn test_create_and_get_account() {
        let store = MemoryStore::new();
        let created = store.create_account(account("owner-1", "0xAAA")).unwrap();
        assert_eq!(created.id.as_str(), "gas-1");
        assert_eq!(created.wallet_address, "0xaaa");
        assert_eq!(created.version, 1);

        let fetched = store.get_account(&created.id).unwrap();
        assert_eq!(fetched, created);
    }

    #[test]
    fn test_wallet_uniqueness() {
        let store = MemoryStore::new();
        store.create_account(account("owner-1", "0xAAA")).unwrap();
        let err = store
            .create_account(account("owner-2", "  0xaaa "))
            .unwrap_err();
        assert!(matches!(err, GasBankError::WalletInUse(_)));
    }

    #[test]
    fn test_version_conflict_on_stale_update() {
        let store = MemoryStore::new();
        let created = store.create_account(account("owner-1", "0xAAA")).unwrap();

        let mut first = created.clone();
        first.balance = Amount::from_units(10);
        first.available = Amount::from_units(10);
        store.update_account(first).unwrap();

        // Second writer still holds version 1.
        let mut stale = created;
        stale.balance = Amount::from_units(99);
        let err = store.update_account(stale).unwrap_err();
        assert!(matches!(err, GasBankError::Conflict { .. }));

        let current = store.find_account_by_wallet("0xaaa").unwrap().unwrap();
        assert_eq!(current.balance, Amount::from_units(10));
        assert_eq!(current.version, 2);
    }

    #[test]
    fn test_upsert_approval_replaces_same_approver() {
        let store = MemoryStore::new();
        let vote = |decision| Approval {
            transaction_id: "tx-1".to_string(),
            approver: "alice".to_string(),
            decision,
            signature: None,
            note: None,
            decided_at: Utc::now(),
        };
        store
            .upsert_approval(vote(gasbank_types::ApprovalDecision::Approved))
            .unwrap();
        store
            .upsert_approval(vote(gasbank_types::ApprovalDecision::Approved))
            .unwrap();
        let votes = store.list_approvals("tx-1").unwrap();
        assert_eq!(votes.len(), 1);
    }

    #[test]
    fn test_due_schedules() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let past = WithdrawalSchedule::new("tx-1", now - chrono::Duration::minutes(5));
        let future = WithdrawalSchedule::new("tx-2", now + chrono::Duration::minutes(5));
        store.save_schedule(past).unwrap();
        store.save_schedule(future).unwrap();

        let due = store.list_due_schedules(now, 10).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].transaction_id, "tx-1");

        store.delete_schedule("tx-1").unwrap();
        assert!(store.get_schedule("tx-1").unwrap().is_none());
    }
}
