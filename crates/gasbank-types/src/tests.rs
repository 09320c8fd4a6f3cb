// Crate-level tests for domain types

#[cfg(test)]
mod tests {
    use crate::*;
    use proptest::prelude::*;

    #[test]
    fn test_transaction_roundtrip_serialization() {
        let mut tx = Transaction::new(
            AccountId::new("gas-1"),
            OwnerId::new("owner-1"),
            TxType::Withdrawal,
            Amount::from_units(25),
            TxStatus::AwaitingApproval,
        );
        tx.id = "tx-1".to_string();
        tx.to_address = "0xDEST".to_string();
        tx.required_approvals = 2;

        let json = serde_json::to_string(&tx).unwrap();
        let back: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(tx, back);
        assert!(json.contains("\"awaiting_approval\""));
        assert!(json.contains("\"withdrawal\""));
    }

    #[test]
    fn test_status_predicates() {
        assert!(TxStatus::Completed.is_terminal());
        assert!(TxStatus::Cancelled.is_terminal());
        assert!(TxStatus::Failed.is_terminal());
        assert!(!TxStatus::Pending.is_terminal());
        assert!(!TxStatus::DeadLetter.is_terminal());

        assert!(TxStatus::Pending.reserves_funds());
        assert!(TxStatus::AwaitingApproval.reserves_funds());
        assert!(TxStatus::Scheduled.reserves_funds());
        assert!(TxStatus::DeadLetter.reserves_funds());
        assert!(!TxStatus::Completed.reserves_funds());
        assert!(!TxStatus::Failed.reserves_funds());
    }

    #[test]
    fn test_normalize_wallet_address() {
        assert_eq!(normalize_wallet_address("  0xABCdef  "), "0xabcdef");
        assert_eq!(normalize_wallet_address(""), "");
    }

    #[test]
    fn test_account_consistency() {
        let mut acct = GasAccount::new(OwnerId::new("owner-1"), "0xwallet");
        assert!(acct.is_consistent());

        acct.balance = Amount::from_units(10);
        acct.available = Amount::from_units(7);
        acct.pending = Amount::from_units(3);
        assert!(acct.is_consistent());

        acct.pending = Amount::from_units(4);
        assert!(!acct.is_consistent());
    }

    #[test]
    fn test_approval_gating_threshold() {
        let mut acct = GasAccount::new(OwnerId::new("owner-1"), "0xwallet");
        assert!(!acct.requires_approval());
        acct.required_approvals = 1;
        assert!(!acct.requires_approval());
        acct.required_approvals = 2;
        assert!(acct.requires_approval());
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(GasBankError::CronUnsupported.kind(), ErrorKind::Validation);
        assert_eq!(
            GasBankError::WalletInUse("0xw".into()).kind(),
            ErrorKind::WalletConflict
        );
        assert_eq!(
            GasBankError::MinBalance {
                remaining: Amount::ZERO,
                min_balance: Amount::from_units(3),
            }
            .kind(),
            ErrorKind::Policy
        );
        assert_eq!(
            GasBankError::conflict("gas account", "gas-1").kind(),
            ErrorKind::Concurrency
        );
    }

    proptest! {
        #[test]
        fn prop_amount_add_sub_roundtrip(a in -1_000_000_000i64..1_000_000_000, b in -1_000_000_000i64..1_000_000_000) {
            let x = Amount::from_raw(a as i128);
            let y = Amount::from_raw(b as i128);
            prop_assert_eq!(x + y - y, x);
        }

        #[test]
        fn prop_reserve_release_preserves_balance(balance in 0i64..1_000_000, reserve in 0i64..1_000_000) {
            // Reserving then releasing must restore the decomposition exactly.
            let mut acct = GasAccount::new(OwnerId::new("o"), "w");
            acct.balance = Amount::from_raw(balance as i128);
            acct.available = acct.balance;
            prop_assume!(reserve <= balance);

            let amt = Amount::from_raw(reserve as i128);
            acct.available = acct.available - amt;
            acct.pending = acct.pending + amt;
            prop_assert!(acct.is_consistent());

            acct.available = acct.available + amt;
            acct.pending = acct.pending - amt;
            prop_assert!(acct.is_consistent());
            prop_assert_eq!(acct.available, acct.balance);
        }
    }
}
