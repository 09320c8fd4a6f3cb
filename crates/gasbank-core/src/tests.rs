// Crate-level tests for the ledger service

#[cfg(test)]
mod tests {
    use crate::{EnsureAccountOptions, GasBankService, WithdrawOptions};
    use chrono::{DateTime, Duration, Utc};
    use gasbank_store::{GasBankStore, MemoryStore};
    use gasbank_types::{
        AccountId, Amount, Approval, DeadLetter, GasAccount, GasBankError, OwnerId, Result,
        SettlementAttempt, Transaction, TxStatus, TxType, WithdrawalSchedule,
    };
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Store wrapper that can fail transaction creation or inject version
    /// conflicts, for exercising rollback and retry paths.
    struct FlakyStore {
        inner: MemoryStore,
        fail_create_tx: AtomicBool,
        conflicts_to_inject: AtomicUsize,
    }

    impl FlakyStore {
        fn new() -> Self {
            FlakyStore {
                inner: MemoryStore::new(),
                fail_create_tx: AtomicBool::new(false),
                conflicts_to_inject: AtomicUsize::new(0),
            }
        }
    }

    impl GasBankStore for FlakyStore {
        fn create_account(&self, account: GasAccount) -> Result<GasAccount> {
            self.inner.create_account(account)
        }
        fn update_account(&self, account: GasAccount) -> Result<GasAccount> {
            let pending = self.conflicts_to_inject.load(Ordering::SeqCst);
            if pending > 0 {
                self.conflicts_to_inject.store(pending - 1, Ordering::SeqCst);
                return Err(GasBankError::conflict("gas account", account.id.as_str()));
            }
            self.inner.update_account(account)
        }
        fn get_account(&self, id: &AccountId) -> Result<GasAccount> {
            self.inner.get_account(id)
        }
        fn find_account_by_wallet(&self, wallet: &str) -> Result<Option<GasAccount>> {
            self.inner.find_account_by_wallet(wallet)
        }
        fn list_accounts(&self, owner: Option<&OwnerId>) -> Result<Vec<GasAccount>> {
            self.inner.list_accounts(owner)
        }
        fn create_transaction(&self, tx: Transaction) -> Result<Transaction> {
            if self.fail_create_tx.load(Ordering::SeqCst) {
                return Err(GasBankError::Storage(
                    "stub create transaction failure".to_string(),
                ));
            }
            self.inner.create_transaction(tx)
        }
        fn update_transaction(&self, tx: Transaction) -> Result<Transaction> {
            self.inner.update_transaction(tx)
        }
        fn get_transaction(&self, id: &str) -> Result<Transaction> {
            self.inner.get_transaction(id)
        }
        fn list_transactions(
            &self,
            account_id: &AccountId,
            limit: usize,
        ) -> Result<Vec<Transaction>> {
            self.inner.list_transactions(account_id, limit)
        }
        fn list_pending_withdrawals(&self) -> Result<Vec<Transaction>> {
            self.inner.list_pending_withdrawals()
        }
        fn upsert_approval(&self, approval: Approval) -> Result<Approval> {
            self.inner.upsert_approval(approval)
        }
        fn list_approvals(&self, transaction_id: &str) -> Result<Vec<Approval>> {
            self.inner.list_approvals(transaction_id)
        }
        fn save_schedule(&self, schedule: WithdrawalSchedule) -> Result<WithdrawalSchedule> {
            self.inner.save_schedule(schedule)
        }
        fn get_schedule(&self, transaction_id: &str) -> Result<Option<WithdrawalSchedule>> {
            self.inner.get_schedule(transaction_id)
        }
        fn delete_schedule(&self, transaction_id: &str) -> Result<()> {
            self.inner.delete_schedule(transaction_id)
        }
        fn list_due_schedules(
            &self,
            due_before: DateTime<Utc>,
            limit: usize,
        ) -> Result<Vec<WithdrawalSchedule>> {
            self.inner.list_due_schedules(due_before, limit)
        }
        fn record_settlement_attempt(
            &self,
            attempt: SettlementAttempt,
        ) -> Result<SettlementAttempt> {
            self.inner.record_settlement_attempt(attempt)
        }
        fn list_settlement_attempts(
            &self,
            transaction_id: &str,
            limit: usize,
        ) -> Result<Vec<SettlementAttempt>> {
            self.inner.list_settlement_attempts(transaction_id, limit)
        }
        fn upsert_dead_letter(&self, entry: DeadLetter) -> Result<DeadLetter> {
            self.inner.upsert_dead_letter(entry)
        }
        fn get_dead_letter(&self, transaction_id: &str) -> Result<DeadLetter> {
            self.inner.get_dead_letter(transaction_id)
        }
        fn list_dead_letters(
            &self,
            account_id: &AccountId,
            limit: usize,
        ) -> Result<Vec<DeadLetter>> {
            self.inner.list_dead_letters(account_id, limit)
        }
        fn remove_dead_letter(&self, transaction_id: &str) -> Result<()> {
            self.inner.remove_dead_letter(transaction_id)
        }
    }

    fn setup() -> (GasBankService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (GasBankService::new(store.clone()), store)
    }

    fn owner(id: &str) -> OwnerId {
        OwnerId::new(id)
    }

    fn funded_account(service: &GasBankService, owner_id: &OwnerId, units: i64) -> GasAccount {
        let acct = service.ensure_account(owner_id, "0xFunded").unwrap();
        let (acct, _) = service
            .deposit(&acct.id, Amount::from_units(units), "boot-tx", "0xa", "0xb")
            .unwrap();
        acct
    }

    #[test]
    fn test_ensure_account_idempotent() {
        let (service, _) = setup();
        let owner = owner("owner-1");
        let first = service.ensure_account(&owner, "0xAbC").unwrap();
        let second = service.ensure_account(&owner, "  0xabc ").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.wallet_address, "0xabc");
        assert_eq!(service.list_accounts(&owner).unwrap().len(), 1);
    }

    #[test]
    fn test_wallet_in_use_across_owners() {
        let (service, _) = setup();
        service.ensure_account(&owner("owner-a"), "walletX").unwrap();
        let err = service
            .ensure_account(&owner("owner-b"), "WALLETX")
            .unwrap_err();
        assert!(matches!(err, GasBankError::WalletInUse(_)));
    }

    #[test]
    fn test_ensure_account_with_options() {
        let (service, _) = setup();
        let owner = owner("owner-1");
        let acct = service
            .ensure_account_with_options(
                &owner,
                "0xopts",
                EnsureAccountOptions {
                    min_balance: Some(Amount::from_units(3)),
                    daily_limit: Some(Amount::from_units(5)),
                    required_approvals: Some(2),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(acct.min_balance, Amount::from_units(3));
        assert_eq!(acct.daily_limit, Amount::from_units(5));
        assert_eq!(acct.required_approvals, 2);

        // Absent options leave stored values untouched.
        let unchanged = service.ensure_account(&owner, "0xopts").unwrap();
        assert_eq!(unchanged.daily_limit, Amount::from_units(5));

        // An explicit zero resets a limit.
        let reset = service
            .ensure_account_with_options(
                &owner,
                "0xopts",
                EnsureAccountOptions {
                    daily_limit: Some(Amount::ZERO),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(reset.daily_limit, Amount::ZERO);
        assert_eq!(reset.min_balance, Amount::from_units(3));
    }

    #[test]
    fn test_deposit_round_trip() {
        let (service, _) = setup();
        let acct = service.ensure_account(&owner("owner-1"), "0xW").unwrap();
        let (acct, tx) = service
            .deposit(&acct.id, Amount::from_units(10), "tx1", "a", "b")
            .unwrap();
        assert_eq!(acct.available, Amount::from_units(10));
        assert_eq!(acct.balance, Amount::from_units(10));
        assert_eq!(acct.pending, Amount::ZERO);
        assert_eq!(tx.status, TxStatus::Completed);
        assert_eq!(tx.tx_type, TxType::Deposit);
        assert_eq!(tx.external_ref, "tx1");
        assert!(acct.is_consistent());
    }

    #[test]
    fn test_deposit_rejects_non_positive_amount() {
        let (service, _) = setup();
        let acct = service.ensure_account(&owner("owner-1"), "0xW").unwrap();
        for amount in [Amount::ZERO, Amount::from_units(-1)] {
            let err = service.deposit(&acct.id, amount, "tx", "a", "b").unwrap_err();
            assert!(matches!(err, GasBankError::InvalidAmount(_)));
        }
    }

    #[test]
    fn test_withdraw_reserves_and_complete_settles() {
        let (service, _) = setup();
        let owner = owner("owner-1");
        let acct = funded_account(&service, &owner, 20);

        let (acct, tx) = service
            .withdraw(&owner, &acct.id, Amount::from_units(5), "0xdest")
            .unwrap();
        assert_eq!(acct.available, Amount::from_units(15));
        assert_eq!(acct.pending, Amount::from_units(5));
        assert_eq!(acct.balance, Amount::from_units(20));
        assert_eq!(tx.status, TxStatus::Pending);
        assert!(acct.is_consistent());

        let (acct, tx) = service.complete_withdrawal(&tx.id, true, "").unwrap();
        assert_eq!(acct.balance, Amount::from_units(15));
        assert_eq!(acct.pending, Amount::ZERO);
        assert_eq!(acct.available, Amount::from_units(15));
        assert_eq!(tx.status, TxStatus::Completed);
        assert!(tx.completed_at.is_some());
        assert!(acct.is_consistent());
    }

    #[test]
    fn test_failed_settlement_releases_funds() {
        let (service, _) = setup();
        let owner = owner("owner-1");
        let acct = funded_account(&service, &owner, 20);

        let (_, tx) = service
            .withdraw(&owner, &acct.id, Amount::from_units(6), "0xdest")
            .unwrap();
        let (acct, tx) = service
            .complete_withdrawal(&tx.id, false, "chain rejected")
            .unwrap();
        assert_eq!(acct.available, Amount::from_units(20));
        assert_eq!(acct.pending, Amount::ZERO);
        assert_eq!(acct.balance, Amount::from_units(20));
        assert_eq!(tx.status, TxStatus::Failed);
        assert_eq!(tx.failure_reason.as_deref(), Some("chain rejected"));
    }

    #[test]
    fn test_complete_withdrawal_terminal_guard() {
        let (service, _) = setup();
        let owner = owner("owner-1");
        let acct = funded_account(&service, &owner, 20);

        let (_, tx) = service
            .withdraw(&owner, &acct.id, Amount::from_units(5), "0xdest")
            .unwrap();
        service.complete_withdrawal(&tx.id, true, "").unwrap();

        let err = service.complete_withdrawal(&tx.id, true, "").unwrap_err();
        assert!(matches!(err, GasBankError::InvalidStatus { .. }));

        // Balances must not double-mutate.
        let acct = service.get_account(&acct.id).unwrap();
        assert_eq!(acct.balance, Amount::from_units(15));
        assert!(acct.is_consistent());
    }

    #[test]
    fn test_withdraw_rejects_foreign_owner() {
        let (service, _) = setup();
        let owner_a = owner("owner-a");
        let acct = funded_account(&service, &owner_a, 20);

        let err = service
            .withdraw(&owner("owner-b"), &acct.id, Amount::from_units(1), "0xdest")
            .unwrap_err();
        assert!(matches!(err, GasBankError::NotOwner { .. }));

        let acct = service.get_account(&acct.id).unwrap();
        assert_eq!(acct.available, Amount::from_units(20));
        assert_eq!(acct.pending, Amount::ZERO);
    }

    #[test]
    fn test_min_balance_and_daily_limit() {
        let (service, _) = setup();
        let owner = owner("owner-1");
        let acct = service
            .ensure_account_with_options(
                &owner,
                "0xlimits",
                EnsureAccountOptions {
                    min_balance: Some(Amount::from_units(3)),
                    daily_limit: Some(Amount::from_units(5)),
                    ..Default::default()
                },
            )
            .unwrap();
        service
            .deposit(&acct.id, Amount::from_units(10), "tx", "a", "b")
            .unwrap();

        let err = service
            .withdraw(&owner, &acct.id, Amount::from_units(8), "0xdest")
            .unwrap_err();
        assert!(matches!(err, GasBankError::MinBalance { .. }));

        service
            .withdraw(&owner, &acct.id, Amount::from_units(2), "0xdest")
            .unwrap();

        let err = service
            .withdraw(&owner, &acct.id, Amount::from_units(4), "0xdest")
            .unwrap_err();
        assert!(matches!(err, GasBankError::DailyLimitExceeded { .. }));

        let acct = service.get_account(&acct.id).unwrap();
        assert_eq!(acct.available, Amount::from_units(8));
        assert_eq!(acct.pending, Amount::from_units(2));
        assert!(acct.is_consistent());
    }

    #[test]
    fn test_cron_expression_rejected() {
        let (service, _) = setup();
        let owner = owner("owner-1");
        let acct = funded_account(&service, &owner, 20);
        let err = service
            .withdraw_with_options(
                &owner,
                &acct.id,
                WithdrawOptions {
                    amount: Amount::from_units(1),
                    to_address: "0xdest".to_string(),
                    schedule_at: None,
                    cron_expression: Some("*/5 * * * *".to_string()),
                },
            )
            .unwrap_err();
        assert!(matches!(err, GasBankError::CronUnsupported));

        let acct = service.get_account(&acct.id).unwrap();
        assert_eq!(acct.pending, Amount::ZERO);
    }

    #[test]
    fn test_approval_threshold_promotes() {
        let (service, _) = setup();
        let owner = owner("owner-1");
        let acct = service
            .ensure_account_with_options(
                &owner,
                "0xmulti",
                EnsureAccountOptions {
                    required_approvals: Some(2),
                    ..Default::default()
                },
            )
            .unwrap();
        service
            .deposit(&acct.id, Amount::from_units(10), "tx", "a", "b")
            .unwrap();

        let (_, tx) = service
            .withdraw(&owner, &acct.id, Amount::from_units(4), "0xdest")
            .unwrap();
        assert_eq!(tx.status, TxStatus::AwaitingApproval);

        let (_, tx) = service
            .submit_approval(&tx.id, "alice", None, None, true)
            .unwrap();
        assert_eq!(tx.status, TxStatus::AwaitingApproval);

        let (_, tx) = service
            .submit_approval(&tx.id, "bob", None, None, true)
            .unwrap();
        assert_eq!(tx.status, TxStatus::Pending);
        assert_eq!(service.list_approvals(&tx.id).unwrap().len(), 2);
    }

    #[test]
    fn test_duplicate_approver_counts_once() {
        let (service, _) = setup();
        let owner = owner("owner-1");
        let acct = service
            .ensure_account_with_options(
                &owner,
                "0xmulti",
                EnsureAccountOptions {
                    required_approvals: Some(2),
                    ..Default::default()
                },
            )
            .unwrap();
        service
            .deposit(&acct.id, Amount::from_units(10), "tx", "a", "b")
            .unwrap();
        let (_, tx) = service
            .withdraw(&owner, &acct.id, Amount::from_units(4), "0xdest")
            .unwrap();

        service
            .submit_approval(&tx.id, "alice", None, None, true)
            .unwrap();
        let (_, tx) = service
            .submit_approval(&tx.id, "alice", None, None, true)
            .unwrap();
        assert_eq!(tx.status, TxStatus::AwaitingApproval);
        assert_eq!(service.list_approvals(&tx.id).unwrap().len(), 1);
    }

    #[test]
    fn test_rejection_cancels_and_restores() {
        let (service, _) = setup();
        let owner = owner("owner-1");
        let acct = service
            .ensure_account_with_options(
                &owner,
                "0xmulti",
                EnsureAccountOptions {
                    required_approvals: Some(2),
                    ..Default::default()
                },
            )
            .unwrap();
        service
            .deposit(&acct.id, Amount::from_units(10), "tx", "a", "b")
            .unwrap();
        let (_, tx) = service
            .withdraw(&owner, &acct.id, Amount::from_units(4), "0xdest")
            .unwrap();

        let (acct, tx) = service
            .submit_approval(&tx.id, "carol", None, None, false)
            .unwrap();
        assert_eq!(tx.status, TxStatus::Cancelled);
        assert_eq!(tx.failure_reason.as_deref(), Some("rejected by carol"));
        assert_eq!(acct.available, Amount::from_units(10));
        assert_eq!(acct.pending, Amount::ZERO);

        // Further votes hit the state guard.
        let err = service
            .submit_approval(&tx.id, "dave", None, None, true)
            .unwrap_err();
        assert!(matches!(err, GasBankError::InvalidStatus { .. }));
    }

    #[test]
    fn test_approval_requires_awaiting_status() {
        let (service, _) = setup();
        let owner = owner("owner-1");
        let acct = funded_account(&service, &owner, 20);
        let (_, tx) = service
            .withdraw(&owner, &acct.id, Amount::from_units(2), "0xdest")
            .unwrap();
        assert_eq!(tx.status, TxStatus::Pending);
        let err = service
            .submit_approval(&tx.id, "alice", None, None, true)
            .unwrap_err();
        assert!(matches!(err, GasBankError::InvalidStatus { .. }));
    }

    #[test]
    fn test_deposit_rolls_back_on_record_failure() {
        let store = Arc::new(FlakyStore::new());
        let service = GasBankService::new(store.clone());
        let owner = owner("owner-1");
        let acct = service.ensure_account(&owner, "0xW").unwrap();

        store.fail_create_tx.store(true, Ordering::SeqCst);
        let err = service
            .deposit(&acct.id, Amount::from_units(10), "tx", "a", "b")
            .unwrap_err();
        assert!(matches!(err, GasBankError::Storage(_)));

        let acct = service.get_account(&acct.id).unwrap();
        assert_eq!(acct.balance, Amount::ZERO);
        assert_eq!(acct.available, Amount::ZERO);
        assert_eq!(acct.pending, Amount::ZERO);
    }

    #[test]
    fn test_withdraw_rolls_back_on_record_failure() {
        let store = Arc::new(FlakyStore::new());
        let service = GasBankService::new(store.clone());
        let owner = owner("owner-1");
        let acct = service.ensure_account(&owner, "0xW").unwrap();
        service
            .deposit(&acct.id, Amount::from_units(10), "tx", "a", "b")
            .unwrap();

        store.fail_create_tx.store(true, Ordering::SeqCst);
        let err = service
            .withdraw(&owner, &acct.id, Amount::from_units(4), "0xdest")
            .unwrap_err();
        assert!(matches!(err, GasBankError::Storage(_)));

        let acct = service.get_account(&acct.id).unwrap();
        assert_eq!(acct.balance, Amount::from_units(10));
        assert_eq!(acct.available, Amount::from_units(10));
        assert_eq!(acct.pending, Amount::ZERO);
        assert_eq!(acct.daily_withdrawn, Amount::ZERO);
    }

    #[test]
    fn test_conflict_retry_commits() {
        let store = Arc::new(FlakyStore::new());
        let service = GasBankService::new(store.clone());
        let acct = service.ensure_account(&owner("owner-1"), "0xW").unwrap();

        // Two injected conflicts still fit in the retry budget.
        store.conflicts_to_inject.store(2, Ordering::SeqCst);
        let (acct, _) = service
            .deposit(&acct.id, Amount::from_units(3), "tx", "a", "b")
            .unwrap();
        assert_eq!(acct.balance, Amount::from_units(3));
    }

    #[test]
    fn test_scheduled_withdrawal_activation() {
        let (service, store) = setup();
        let owner = owner("owner-1");
        let acct = funded_account(&service, &owner, 20);

        let future = Utc::now() + Duration::hours(1);
        let (acct_after, tx) = service
            .withdraw_with_options(
                &owner,
                &acct.id,
                WithdrawOptions {
                    amount: Amount::from_units(5),
                    to_address: "0xdest".to_string(),
                    schedule_at: Some(future),
                    cron_expression: None,
                },
            )
            .unwrap();
        assert_eq!(tx.status, TxStatus::Scheduled);
        assert_eq!(acct_after.pending, Amount::from_units(5));

        // Not due yet: nothing activates.
        service.activate_due_schedules(10).unwrap();
        assert_eq!(
            service.store().get_transaction(&tx.id).unwrap().status,
            TxStatus::Scheduled
        );

        // Force the trigger into the past.
        let mut schedule = store.get_schedule(&tx.id).unwrap().unwrap();
        schedule.next_run_at = Utc::now() - Duration::minutes(1);
        store.save_schedule(schedule).unwrap();

        service.activate_due_schedules(10).unwrap();
        let tx = service.store().get_transaction(&tx.id).unwrap();
        assert_eq!(tx.status, TxStatus::Pending);
        assert!(store.get_schedule(&tx.id).unwrap().is_none());

        // Repeat runs are a no-op.
        service.activate_due_schedules(10).unwrap();
        let tx = service.store().get_transaction(&tx.id).unwrap();
        assert_eq!(tx.status, TxStatus::Pending);
    }

    #[test]
    fn test_activation_reapplies_approval_gating() {
        let (service, store) = setup();
        let owner = owner("owner-1");
        let acct = service
            .ensure_account_with_options(
                &owner,
                "0xmulti",
                EnsureAccountOptions {
                    required_approvals: Some(2),
                    ..Default::default()
                },
            )
            .unwrap();
        service
            .deposit(&acct.id, Amount::from_units(10), "tx", "a", "b")
            .unwrap();

        let (_, tx) = service
            .withdraw_with_options(
                &owner,
                &acct.id,
                WithdrawOptions {
                    amount: Amount::from_units(5),
                    to_address: "0xdest".to_string(),
                    schedule_at: Some(Utc::now() + Duration::hours(1)),
                    cron_expression: None,
                },
            )
            .unwrap();
        assert_eq!(tx.status, TxStatus::Scheduled);

        let mut schedule = store.get_schedule(&tx.id).unwrap().unwrap();
        schedule.next_run_at = Utc::now() - Duration::minutes(1);
        store.save_schedule(schedule).unwrap();
        service.activate_due_schedules(10).unwrap();

        let tx = service.store().get_transaction(&tx.id).unwrap();
        assert_eq!(tx.status, TxStatus::AwaitingApproval);
    }

    #[test]
    fn test_cancel_withdrawal_restores_reservation() {
        let (service, _) = setup();
        let owner = owner("owner-1");
        let acct = funded_account(&service, &owner, 20);
        let (_, tx) = service
            .withdraw(&owner, &acct.id, Amount::from_units(7), "0xdest")
            .unwrap();

        let (acct, tx) = service
            .cancel_withdrawal(&owner, &tx.id, "user requested")
            .unwrap();
        assert_eq!(tx.status, TxStatus::Cancelled);
        assert_eq!(acct.available, Amount::from_units(20));
        assert_eq!(acct.pending, Amount::ZERO);
        assert!(acct.is_consistent());
    }

    #[test]
    fn test_dead_letter_round_trip() {
        let (service, _) = setup();
        let owner = owner("owner-1");
        let acct = funded_account(&service, &owner, 20);
        let (_, tx) = service
            .withdraw(&owner, &acct.id, Amount::from_units(5), "0xdest")
            .unwrap();

        service
            .mark_dead_letter(&tx.id, "max attempts exceeded", Some("rpc timeout".into()))
            .unwrap();
        let acct_now = service.get_account(&acct.id).unwrap();
        assert_eq!(acct_now.pending, Amount::from_units(5));

        let entries = service.list_dead_letters(&owner, 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reason, "max attempts exceeded");

        let tx = service.retry_dead_letter(&owner, &tx.id).unwrap();
        assert_eq!(tx.status, TxStatus::Pending);
        assert!(service.list_dead_letters(&owner, 10).unwrap().is_empty());

        service
            .mark_dead_letter(&tx.id, "max attempts exceeded", None)
            .unwrap();
        service.delete_dead_letter(&owner, &tx.id).unwrap();
        let tx = service.store().get_transaction(&tx.id).unwrap();
        assert_eq!(tx.status, TxStatus::Cancelled);
        let acct_now = service.get_account(&acct.id).unwrap();
        assert_eq!(acct_now.available, Amount::from_units(20));
        assert_eq!(acct_now.pending, Amount::ZERO);
    }

    #[test]
    fn test_summary_aggregates() {
        let (service, _) = setup();
        let owner = owner("owner-1");
        let acct = service.ensure_account(&owner, "0xone").unwrap();
        service
            .deposit(&acct.id, Amount::from_units(30), "dep-1", "a", "b")
            .unwrap();
        service
            .withdraw(&owner, &acct.id, Amount::from_units(4), "0xdest")
            .unwrap();
        service
            .withdraw(&owner, &acct.id, Amount::from_units(6), "0xdest")
            .unwrap();

        let summary = service.summary(&owner).unwrap();
        assert_eq!(summary.accounts.len(), 1);
        assert_eq!(summary.total_balance, Amount::from_units(30));
        assert_eq!(summary.total_available, Amount::from_units(20));
        assert_eq!(summary.pending_withdrawals, 2);
        assert_eq!(summary.pending_amount, Amount::from_units(10));
        assert_eq!(
            summary.last_deposit.as_ref().map(|b| b.amount),
            Some(Amount::from_units(30))
        );
        assert!(summary.last_withdrawal.is_some());
    }

    #[test]
    fn test_summary_requires_owner() {
        let (service, _) = setup();
        let err = service.summary(&owner("")).unwrap_err();
        assert!(matches!(err, GasBankError::MissingField("owner_id")));
    }

    #[test]
    fn test_list_transactions_filtered() {
        let (service, _) = setup();
        let owner = owner("owner-1");
        let acct = funded_account(&service, &owner, 20);
        service
            .withdraw(&owner, &acct.id, Amount::from_units(1), "0xdest")
            .unwrap();
        service
            .withdraw(&owner, &acct.id, Amount::from_units(2), "0xdest")
            .unwrap();

        let deposits = service
            .list_transactions_filtered(&acct.id, Some(TxType::Deposit), None, 0)
            .unwrap();
        assert_eq!(deposits.len(), 1);

        let pending = service
            .list_transactions_filtered(&acct.id, None, Some(TxStatus::Pending), 0)
            .unwrap();
        assert_eq!(pending.len(), 2);
    }

    #[test]
    fn test_get_withdrawal_ownership() {
        let (service, _) = setup();
        let owner_a = owner("owner-a");
        let acct = funded_account(&service, &owner_a, 20);
        let (_, tx) = service
            .withdraw(&owner_a, &acct.id, Amount::from_units(1), "0xdest")
            .unwrap();

        assert!(service.get_withdrawal(&owner_a, &tx.id).is_ok());
        let err = service.get_withdrawal(&owner("owner-b"), &tx.id).unwrap_err();
        assert!(matches!(err, GasBankError::NotOwner { .. }));
    }
}
