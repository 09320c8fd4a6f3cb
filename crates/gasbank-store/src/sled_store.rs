use chrono::{DateTime, Utc};
use gasbank_types::{
    normalize_wallet_address, AccountId, Approval, DeadLetter, GasAccount, GasBankError, OwnerId,
    Result, SettlementAttempt, Transaction, TxStatus, TxType, WithdrawalSchedule,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

use crate::store::GasBankStore;

/// Embedded persistent store backed by sled.
///
/// One tree per row family, JSON-encoded values. Versioned rows are updated
/// through `compare_and_swap` on the full encoded value, so a writer holding
/// a stale snapshot loses the race and gets a conflict error.
pub struct SledStore {
    accounts: sled::Tree,
    wallets: sled::Tree,
    transactions: sled::Tree,
    approvals: sled::Tree,
    schedules: sled::Tree,
    attempts: sled::Tree,
    dead_letters: sled::Tree,
    db: sled::Db,
}

fn storage_err(e: impl std::fmt::Display) -> GasBankError {
    GasBankError::Storage(e.to_string())
}

fn enc<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(storage_err)
}

fn dec<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(storage_err)
}

impl SledStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path).map_err(storage_err)?;
        Ok(SledStore {
            accounts: db.open_tree("accounts").map_err(storage_err)?,
            wallets: db.open_tree("wallets").map_err(storage_err)?,
            transactions: db.open_tree("transactions").map_err(storage_err)?,
            approvals: db.open_tree("approvals").map_err(storage_err)?,
            schedules: db.open_tree("schedules").map_err(storage_err)?,
            attempts: db.open_tree("attempts").map_err(storage_err)?,
            dead_letters: db.open_tree("dead_letters").map_err(storage_err)?,
            db,
        })
    }

    /// Reserve a wallet for an account id. Fails when another account holds it.
    fn claim_wallet(&self, wallet: &str, account_id: &str) -> Result<()> {
        if wallet.is_empty() {
            return Ok(());
        }
        match self
            .wallets
            .compare_and_swap(wallet, None as Option<&[u8]>, Some(account_id.as_bytes()))
            .map_err(storage_err)?
        {
            Ok(()) => Ok(()),
            Err(cas) => {
                let holder = cas.current.as_deref().unwrap_or_default();
                if holder == account_id.as_bytes() {
                    Ok(())
                } else {
                    Err(GasBankError::WalletInUse(wallet.to_string()))
                }
            }
        }
    }

    fn release_wallet(&self, wallet: &str) -> Result<()> {
        if !wallet.is_empty() {
            self.wallets.remove(wallet).map_err(storage_err)?;
        }
        Ok(())
    }
}

impl GasBankStore for SledStore {
    fn create_account(&self, mut account: GasAccount) -> Result<GasAccount> {
        let id = format!("gas-{}", self.db.generate_id().map_err(storage_err)?);
        let wallet = normalize_wallet_address(&account.wallet_address);

        let now = Utc::now();
        account.id = AccountId::new(id.clone());
        account.wallet_address = wallet.clone();
        account.version = 1;
        account.created_at = now;
        account.updated_at = now;
        let bytes = enc(&account)?;

        self.claim_wallet(&wallet, &id)?;
        if let Err(e) = self.accounts.insert(id.as_bytes(), bytes) {
            self.release_wallet(&wallet)?;
            return Err(storage_err(e));
        }
        Ok(account)
    }

    fn update_account(&self, mut account: GasAccount) -> Result<GasAccount> {
        let id = account.id.as_str().to_string();
        let old_bytes = self
            .accounts
            .get(id.as_bytes())
            .map_err(storage_err)?
            .ok_or_else(|| GasBankError::not_found("gas account", &id))?;
        let existing: GasAccount = dec(&old_bytes)?;
        if existing.version != account.version {
            return Err(GasBankError::conflict("gas account", &id));
        }

        let old_wallet = normalize_wallet_address(&existing.wallet_address);
        let new_wallet = normalize_wallet_address(&account.wallet_address);

        account.wallet_address = new_wallet.clone();
        account.version += 1;
        account.created_at = existing.created_at;
        account.updated_at = Utc::now();
        let new_bytes = enc(&account)?;

        if old_wallet != new_wallet {
            self.claim_wallet(&new_wallet, &id)?;
        }

        match self
            .accounts
            .compare_and_swap(id.as_bytes(), Some(&old_bytes[..]), Some(new_bytes))
            .map_err(storage_err)?
        {
            Ok(()) => {
                if old_wallet != new_wallet {
                    self.release_wallet(&old_wallet)?;
                }
                Ok(account)
            }
            Err(_) => {
                if old_wallet != new_wallet {
                    self.release_wallet(&new_wallet)?;
                }
                Err(GasBankError::conflict("gas account", &id))
            }
        }
    }

    fn get_account(&self, id: &AccountId) -> Result<GasAccount> {
        self.accounts
            .get(id.as_str().as_bytes())
            .map_err(storage_err)?
            .map(|bytes| dec(&bytes))
            .transpose()?
            .ok_or_else(|| GasBankError::not_found("gas account", id.as_str()))
    }

    fn find_account_by_wallet(&self, wallet: &str) -> Result<Option<GasAccount>> {
        let wallet = normalize_wallet_address(wallet);
        let Some(id) = self.wallets.get(&wallet).map_err(storage_err)? else {
            return Ok(None);
        };
        self.accounts
            .get(&id)
            .map_err(storage_err)?
            .map(|bytes| dec(&bytes))
            .transpose()
    }

    fn list_accounts(&self, owner: Option<&OwnerId>) -> Result<Vec<GasAccount>> {
        let mut result = Vec::new();
        for item in self.accounts.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let account: GasAccount = dec(&bytes)?;
            if owner.map_or(true, |o| &account.owner_id == o) {
                result.push(account);
            }
        }
        Ok(result)
    }

    fn create_transaction(&self, mut tx: Transaction) -> Result<Transaction> {
        let id = format!("tx-{}", self.db.generate_id().map_err(storage_err)?);
        let now = Utc::now();
        tx.id = id.clone();
        tx.version = 1;
        tx.created_at = now;
        tx.updated_at = now;
        self.transactions
            .insert(id.as_bytes(), enc(&tx)?)
            .map_err(storage_err)?;
        Ok(tx)
    }

    fn update_transaction(&self, mut tx: Transaction) -> Result<Transaction> {
        let old_bytes = self
            .transactions
            .get(tx.id.as_bytes())
            .map_err(storage_err)?
            .ok_or_else(|| GasBankError::not_found("transaction", &tx.id))?;
        let existing: Transaction = dec(&old_bytes)?;
        if existing.version != tx.version {
            return Err(GasBankError::conflict("transaction", &tx.id));
        }
        tx.version += 1;
        tx.created_at = existing.created_at;
        tx.updated_at = Utc::now();
        match self
            .transactions
            .compare_and_swap(tx.id.as_bytes(), Some(&old_bytes[..]), Some(enc(&tx)?))
            .map_err(storage_err)?
        {
            Ok(()) => Ok(tx),
            Err(_) => Err(GasBankError::conflict("transaction", &tx.id)),
        }
    }

    fn get_transaction(&self, id: &str) -> Result<Transaction> {
        self.transactions
            .get(id.as_bytes())
            .map_err(storage_err)?
            .map(|bytes| dec(&bytes))
            .transpose()?
            .ok_or_else(|| GasBankError::not_found("transaction", id))
    }

    fn list_transactions(&self, account_id: &AccountId, limit: usize) -> Result<Vec<Transaction>> {
        let mut txs = Vec::new();
        for item in self.transactions.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let tx: Transaction = dec(&bytes)?;
            if &tx.account_id == account_id {
                txs.push(tx);
            }
        }
        txs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        if limit > 0 {
            txs.truncate(limit);
        }
        Ok(txs)
    }

    fn list_pending_withdrawals(&self) -> Result<Vec<Transaction>> {
        let mut txs = Vec::new();
        for item in self.transactions.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let tx: Transaction = dec(&bytes)?;
            if tx.tx_type == TxType::Withdrawal && tx.status == TxStatus::Pending {
                txs.push(tx);
            }
        }
        Ok(txs)
    }

    fn upsert_approval(&self, approval: Approval) -> Result<Approval> {
        let key = format!("{}\x00{}", approval.transaction_id, approval.approver);
        self.approvals
            .insert(key.as_bytes(), enc(&approval)?)
            .map_err(storage_err)?;
        Ok(approval)
    }

    fn list_approvals(&self, transaction_id: &str) -> Result<Vec<Approval>> {
        let prefix = format!("{}\x00", transaction_id);
        let mut votes = Vec::new();
        for item in self.approvals.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item.map_err(storage_err)?;
            votes.push(dec(&bytes)?);
        }
        Ok(votes)
    }

    fn save_schedule(&self, mut schedule: WithdrawalSchedule) -> Result<WithdrawalSchedule> {
        let now = Utc::now();
        let existing = self.get_schedule(&schedule.transaction_id)?;
        schedule.created_at = existing.map(|s| s.created_at).unwrap_or(now);
        schedule.updated_at = now;
        self.schedules
            .insert(schedule.transaction_id.as_bytes(), enc(&schedule)?)
            .map_err(storage_err)?;
        Ok(schedule)
    }

    fn get_schedule(&self, transaction_id: &str) -> Result<Option<WithdrawalSchedule>> {
        self.schedules
            .get(transaction_id.as_bytes())
            .map_err(storage_err)?
            .map(|bytes| dec(&bytes))
            .transpose()
    }

    fn delete_schedule(&self, transaction_id: &str) -> Result<()> {
        self.schedules
            .remove(transaction_id.as_bytes())
            .map_err(storage_err)?;
        Ok(())
    }

    fn list_due_schedules(
        &self,
        due_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<WithdrawalSchedule>> {
        let mut due = Vec::new();
        for item in self.schedules.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let schedule: WithdrawalSchedule = dec(&bytes)?;
            if schedule.next_run_at <= due_before {
                due.push(schedule);
            }
        }
        due.sort_by(|a, b| a.next_run_at.cmp(&b.next_run_at));
        if limit > 0 {
            due.truncate(limit);
        }
        Ok(due)
    }

    fn record_settlement_attempt(&self, attempt: SettlementAttempt) -> Result<SettlementAttempt> {
        let key = format!("{}\x00{:010}", attempt.transaction_id, attempt.attempt);
        self.attempts
            .insert(key.as_bytes(), enc(&attempt)?)
            .map_err(storage_err)?;
        Ok(attempt)
    }

    fn list_settlement_attempts(
        &self,
        transaction_id: &str,
        limit: usize,
    ) -> Result<Vec<SettlementAttempt>> {
        let prefix = format!("{}\x00", transaction_id);
        let mut attempts = Vec::new();
        for item in self.attempts.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item.map_err(storage_err)?;
            attempts.push(dec(&bytes)?);
            if limit > 0 && attempts.len() >= limit {
                break;
            }
        }
        Ok(attempts)
    }

    fn upsert_dead_letter(&self, mut entry: DeadLetter) -> Result<DeadLetter> {
        let now = Utc::now();
        let existing = self
            .dead_letters
            .get(entry.transaction_id.as_bytes())
            .map_err(storage_err)?;
        entry.created_at = match existing {
            Some(bytes) => dec::<DeadLetter>(&bytes)?.created_at,
            None => now,
        };
        entry.updated_at = now;
        self.dead_letters
            .insert(entry.transaction_id.as_bytes(), enc(&entry)?)
            .map_err(storage_err)?;
        Ok(entry)
    }

    fn get_dead_letter(&self, transaction_id: &str) -> Result<DeadLetter> {
        self.dead_letters
            .get(transaction_id.as_bytes())
            .map_err(storage_err)?
            .map(|bytes| dec(&bytes))
            .transpose()?
            .ok_or_else(|| GasBankError::not_found("dead letter", transaction_id))
    }

    fn list_dead_letters(&self, account_id: &AccountId, limit: usize) -> Result<Vec<DeadLetter>> {
        let mut entries = Vec::new();
        for item in self.dead_letters.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let entry: DeadLetter = dec(&bytes)?;
            if &entry.account_id == account_id {
                entries.push(entry);
                if limit > 0 && entries.len() >= limit {
                    break;
                }
            }
        }
        Ok(entries)
    }

    fn remove_dead_letter(&self, transaction_id: &str) -> Result<()> {
        self.dead_letters
            .remove(transaction_id.as_bytes())
            .map_err(storage_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gasbank_types::Amount;

    #[test]
    fn test_account_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = SledStore::open(dir.path()).unwrap();
            let mut acct = GasAccount::new(OwnerId::new("owner-1"), "0xAAA");
            acct.balance = Amount::from_units(5);
            acct.available = Amount::from_units(5);
            store.create_account(acct).unwrap().id
        };

        let store = SledStore::open(dir.path()).unwrap();
        let acct = store.get_account(&id).unwrap();
        assert_eq!(acct.balance, Amount::from_units(5));
        assert_eq!(acct.wallet_address, "0xaaa");
    }

    #[test]
    fn test_stale_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        let created = store
            .create_account(GasAccount::new(OwnerId::new("owner-1"), "0xAAA"))
            .unwrap();

        let mut fresh = created.clone();
        fresh.balance = Amount::from_units(1);
        fresh.available = Amount::from_units(1);
        store.update_account(fresh).unwrap();

        let mut stale = created;
        stale.balance = Amount::from_units(9);
        let err = store.update_account(stale).unwrap_err();
        assert!(matches!(err, GasBankError::Conflict { .. }));
    }

    #[test]
    fn test_wallet_claim_across_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        store
            .create_account(GasAccount::new(OwnerId::new("owner-1"), "0xAAA"))
            .unwrap();
        let err = store
            .create_account(GasAccount::new(OwnerId::new("owner-2"), "0xaaa"))
            .unwrap_err();
        assert!(matches!(err, GasBankError::WalletInUse(_)));

        let found = store.find_account_by_wallet(" 0xAAA ").unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn test_approvals_scoped_by_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        for (tx, approver) in [("tx-1", "alice"), ("tx-1", "bob"), ("tx-2", "alice")] {
            store
                .upsert_approval(Approval {
                    transaction_id: tx.to_string(),
                    approver: approver.to_string(),
                    decision: gasbank_types::ApprovalDecision::Approved,
                    signature: None,
                    note: None,
                    decided_at: Utc::now(),
                })
                .unwrap();
        }
        assert_eq!(store.list_approvals("tx-1").unwrap().len(), 2);
        assert_eq!(store.list_approvals("tx-2").unwrap().len(), 1);
    }
}
