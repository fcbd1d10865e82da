use criterion::{Criterion, criterion_group, criterion_main};
use ledger_explorer::app::{paginate, plan_window};
use ledger_explorer::domain::{BlockHeader, TransactionScope};
use ledger_explorer::infra::{BincodePayloadDecoder, HashLedger};
use ledger_explorer::test_utils::block_with_counts;
use std::hint::black_box;

fn bench_plan_window(c: &mut Criterion) {
    let headers: Vec<BlockHeader> = (1..=100_000)
        .map(|id| BlockHeader {
            id,
            tx: id % 7 + 1,
            time: id,
        })
        .collect();

    c.bench_function("plan_window_100k_blocks", |b| {
        b.iter(|| plan_window(black_box(&headers), black_box(250_000), black_box(100)))
    });
}

fn bench_paginate(c: &mut Criterion) {
    let counts: Vec<i64> = (0..2_000).map(|i| i % 9 + 1).collect();
    let blocks = block_with_counts(&counts, 1);
    let scope = TransactionScope::ecosystem(1);

    c.bench_function("paginate_deep_page", |b| {
        b.iter(|| {
            let _ = paginate(
                black_box(&blocks),
                &scope,
                black_box(5_000),
                black_box(50),
                &BincodePayloadDecoder,
            );
        })
    });
}

fn bench_ledger_observe(c: &mut Criterion) {
    let hashes: Vec<String> = (0..10_000).map(|i| format!("{:064x}", i)).collect();

    c.bench_function("ledger_observe_10k", |b| {
        b.iter(|| {
            let ledger = HashLedger::new();
            for (block, hash) in hashes.iter().enumerate() {
                black_box(ledger.observe(hash, block as i64));
            }
        })
    });
}

criterion_group!(benches, bench_plan_window, bench_paginate, bench_ledger_observe);
criterion_main!(benches);
