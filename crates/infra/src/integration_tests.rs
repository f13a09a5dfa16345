//! Integration tests for concurrent ledger traffic.
//!
//! Tests: TransferLedger / BalanceService → LedgerStore under contention
//!
//! Verifies:
//! - Total money is conserved across concurrent transfers
//! - No account ever goes negative
//! - Every committed transfer has exactly one leg on each side

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use bankstream_banking::{TransactionType, TransferRequest};
    use bankstream_core::LedgerError;

    use crate::services::{BalanceService, NewTransaction, TransferLedger};
    use crate::store::{InMemoryLedgerStore, LedgerStore};

    fn shared_store() -> Arc<dyn LedgerStore> {
        Arc::new(InMemoryLedgerStore::new())
    }

    fn request(from: &str, to: &str, amount: i64) -> TransferRequest {
        TransferRequest {
            from_account_number: from.into(),
            to_account_number: to.into(),
            currency: "USD".into(),
            amount: Decimal::from(amount),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_transfers_conserve_money() {
        let store = shared_store();
        let balances = BalanceService::new(store.clone());
        let ledger = Arc::new(TransferLedger::new(store.clone()));

        let numbers = ["A", "B", "C", "D"];
        for n in numbers {
            balances.open_account(n, Decimal::from(100), "USD").await.unwrap();
        }

        let mut tasks = Vec::new();
        for i in 0..200usize {
            let ledger = ledger.clone();
            let from = numbers[i % 4];
            let to = numbers[(i + 1 + i / 4) % 4];
            tasks.push(tokio::spawn(async move {
                if from == to {
                    return None;
                }
                Some(ledger.transfer(&request(from, to, 7)).await)
            }));
        }

        let mut committed = 0usize;
        for task in tasks {
            match task.await.unwrap() {
                Some(Ok(_)) => committed += 1,
                Some(Err(LedgerError::InsufficientFunds { .. }))
                | Some(Err(LedgerError::TransferTransactionPairFailed { .. }))
                | None => {}
                Some(Err(other)) => panic!("unexpected error: {other:?}"),
            }
        }
        assert!(committed > 0);

        let mut total = Decimal::ZERO;
        let mut legs = 0usize;
        for n in numbers {
            let balance = balances.get_balance(n).await.unwrap().amount;
            assert!(!balance.is_sign_negative(), "{n} went negative: {balance}");
            total += balance;
            legs += balances.transactions(n).await.unwrap().len();
        }
        assert_eq!(total, Decimal::from(400));
        assert_eq!(legs, committed * 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_withdrawals_never_overdraw() {
        let store = shared_store();
        let balances = Arc::new(BalanceService::new(store));
        balances.open_account("ACC-1", Decimal::from(100), "USD").await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..50 {
            let balances = balances.clone();
            tasks.push(tokio::spawn(async move {
                balances
                    .post_transaction(
                        "ACC-1",
                        NewTransaction {
                            amount: Decimal::from(3),
                            kind: TransactionType::Out,
                            occurred_at: Utc::now(),
                            notes: String::new(),
                        },
                    )
                    .await
            }));
        }

        let mut ok = 0i64;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                ok += 1;
            }
        }

        // 100 / 3 = 33 withdrawals fit.
        assert_eq!(ok, 33);
        assert_eq!(balances.get_balance("ACC-1").await.unwrap().amount, Decimal::from(1));
    }
}
