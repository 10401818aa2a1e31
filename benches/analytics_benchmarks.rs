use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use erc20_transfer_analytics::analytics::{
    duplicate_hashes, mixer_candidates, top_k_by_value, volume_over_time, AnalyticsEngine,
};
use erc20_transfer_analytics::config::{AnalyticsConfig, MixerConfig};
use erc20_transfer_analytics::models::{Block, Transaction, TransferLog};
use erc20_transfer_analytics::pipeline::Normalizer;
use erc20_transfer_analytics::table::RecordTable;

const TOKEN: &str = "0xdac17f958d2ee523a2206206994597c13d831ec7";

fn create_test_table(transaction_count: u64) -> RecordTable {
    let mut blocks = Vec::new();
    let mut transactions = Vec::new();
    let mut transfers = Vec::new();

    for id in 0..transaction_count {
        let block_number = 18_000_000 + id / 100;
        if id % 100 == 0 {
            blocks.push(Block {
                number: block_number,
                hash: format!("0x{:064x}", block_number),
                parent_hash: format!("0x{:064x}", block_number - 1),
                timestamp: 1_700_000_000 + (id / 100) * 12,
                miner: format!("0x{:040x}", 1),
                gas_used: 15_000_000,
                gas_limit: 30_000_000,
                transaction_count: 100,
            });
        }

        let tx = Transaction {
            hash: format!("0x{:064x}", id),
            block_number,
            transaction_index: id % 100,
            from: format!("0x{:040x}", id % 997),
            to: Some(TOKEN.to_string()),
            value_wei: (id as u128 % 13) * 10_u128.pow(17),
            gas_price_wei: 20_000_000_000 + id as u128 % 7,
            effective_gas_price_wei: 20_000_000_000 + id as u128 % 7,
            gas_limit: 100_000,
            gas_used: 50_000 + id % 1_000,
            nonce: id,
        };
        if id % 3 != 0 {
            transfers.push(TransferLog {
                transaction_hash: tx.hash.clone(),
                block_number,
                log_index: id % 100,
                token_contract: TOKEN.to_string(),
                from: tx.from.clone(),
                to: format!("0x{:040x}", (id * 31) % 1_009),
                raw_amount: (id as u128 + 1) * 1_000_000,
            });
        }
        transactions.push(tx);
    }

    Normalizer::new(6).normalize(blocks, &transactions, &transfers).table
}

fn bench_volume_over_time(c: &mut Criterion) {
    let table = create_test_table(50_000);
    let mut group = c.benchmark_group("volume_over_time");

    for partitions in [1, 2, 4, 8].iter() {
        group.bench_with_input(BenchmarkId::new("partitions", partitions), partitions, |b, &partitions| {
            b.iter(|| volume_over_time(black_box(&table), 60, partitions));
        });
    }

    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let table = create_test_table(20_000);
    let mixer = MixerConfig::default();
    let mut group = c.benchmark_group("queries");

    group.bench_function("top_k_by_value", |b| {
        b.iter(|| top_k_by_value(black_box(&table), 10));
    });
    group.bench_function("duplicate_hashes", |b| {
        b.iter(|| duplicate_hashes(black_box(&table)));
    });
    group.bench_function("mixer_candidates", |b| {
        b.iter(|| mixer_candidates(black_box(&table), &mixer, &[]));
    });

    group.finish();
}

fn bench_full_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_analysis");

    for size in [1_000, 10_000].iter() {
        let table = create_test_table(*size);
        let engine = AnalyticsEngine::new(AnalyticsConfig::default());
        group.bench_with_input(BenchmarkId::new("engine_run", size), &table, |b, table| {
            b.iter(|| engine.run(black_box(table)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_volume_over_time, bench_queries, bench_full_analysis);
criterion_main!(benches);
