use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rust_decimal::Decimal;
use tokio::runtime::Runtime;

use bankstream_banking::{TransactionSummary, TransactionType, TransferRequest};
use bankstream_infra::services::{BalanceService, TransferLedger};
use bankstream_infra::store::{InMemoryLedgerStore, LedgerStore};

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

fn seeded(rt: &Runtime, accounts: usize) -> (Arc<dyn LedgerStore>, Vec<String>) {
    let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedgerStore::new());
    let balances = BalanceService::new(store.clone());
    let numbers: Vec<String> = (0..accounts).map(|i| format!("ACC-{i:04}")).collect();
    rt.block_on(async {
        for n in &numbers {
            balances
                .open_account(n, Decimal::from(1_000_000_000i64), "USD")
                .await
                .unwrap();
        }
    });
    (store, numbers)
}

/// Sequential transfers between two accounts.
fn bench_single_pair_transfers(c: &mut Criterion) {
    let rt = runtime();
    let (store, numbers) = seeded(&rt, 2);
    let ledger = TransferLedger::new(store);
    let request = TransferRequest {
        from_account_number: numbers[0].clone(),
        to_account_number: numbers[1].clone(),
        currency: "USD".into(),
        amount: Decimal::ONE,
    };

    let mut group = c.benchmark_group("transfer_single_pair");
    group.throughput(Throughput::Elements(1));
    group.bench_function("in_memory", |b| {
        b.iter(|| rt.block_on(async { black_box(ledger.transfer(&request).await.unwrap()) }))
    });
    group.finish();
}

/// Concurrent transfers spread over a ring of accounts.
fn bench_concurrent_transfers(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("transfer_concurrent");

    for accounts in [4usize, 32] {
        let (store, numbers) = seeded(&rt, accounts);
        let ledger = Arc::new(TransferLedger::new(store));
        let batch = 64usize;
        group.throughput(Throughput::Elements(batch as u64));

        group.bench_with_input(BenchmarkId::from_parameter(accounts), &accounts, |b, &accounts| {
            b.iter(|| {
                rt.block_on(async {
                    let mut tasks = Vec::with_capacity(batch);
                    for i in 0..batch {
                        let ledger = ledger.clone();
                        let request = TransferRequest {
                            from_account_number: numbers[i % accounts].clone(),
                            to_account_number: numbers[(i + 1) % accounts].clone(),
                            currency: "USD".into(),
                            amount: Decimal::ONE,
                        };
                        tasks.push(tokio::spawn(async move { ledger.transfer(&request).await }));
                    }
                    for t in tasks {
                        black_box(t.await.unwrap().unwrap());
                    }
                })
            })
        });
    }
    group.finish();
}

/// Pure summary folding, the per-message cost of the client stream.
fn bench_summary_fold(c: &mut Criterion) {
    let mut group = c.benchmark_group("summary_fold");
    for n in [100usize, 10_000] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let mut summary = TransactionSummary::new(chrono::Utc::now());
                for i in 0..n {
                    let kind = if i % 3 == 0 { TransactionType::Out } else { TransactionType::In };
                    summary.fold(kind, Decimal::from(i as i64 + 1)).unwrap();
                }
                black_box(summary)
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_single_pair_transfers,
    bench_concurrent_transfers,
    bench_summary_fold
);
criterion_main!(benches);
