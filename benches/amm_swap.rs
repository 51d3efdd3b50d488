//! benches/amm_swap.rs
//! Run with:  cargo bench --bench amm_swap
//! HTML:      target/criterion/report/index.html

use agent_market_sim::{
    MarketConfig, MarketMaker, Wallet,
    simulators::amm::compute_swap,
    types::Direction,
};
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;

// ────────────────────────────────────────────────────────────────────────────
//  Parameter grids
// ────────────────────────────────────────────────────────────────────────────
const LIQUIDITY_SOL: &[f64] = &[1_000.0, 10_000.0, 100_000.0];
const SWAPS_PER_BATCH: &[usize] = &[1_000, 10_000];

fn market(liquidity: f64) -> MarketMaker {
    let cfg = MarketConfig {
        initial_liquidity_sol: liquidity,
        ..Default::default()
    };
    MarketMaker::new(&cfg).expect("bench market")
}

/// Pure quote math, no locking beyond the pool snapshot.
pub fn bench_quote(c: &mut Criterion) {
    let amm = market(10_000.0);
    let pool = amm.pool_state();
    c.bench_function("compute_swap_buy_1_sol", |b| {
        b.iter(|| compute_swap(black_box(&pool), black_box(1.0), Direction::SolToToken))
    });
}

/// Alternating buys and sells through the locked swap path.
pub fn bench_swap_batches(c: &mut Criterion) {
    let mut group = c.benchmark_group("amm_swap_batches");

    for &liquidity in LIQUIDITY_SOL {
        for &n in SWAPS_PER_BATCH {
            group.throughput(Throughput::Elements(n as u64));
            let id = BenchmarkId::from_parameter(format!("liq_{liquidity}_swaps_{n}"));
            group.bench_function(id, |b| {
                b.iter_batched(
                    || (market(liquidity), StdRng::seed_from_u64(42)),
                    |(amm, mut rng)| {
                        let mut wallet = Wallet::new(1_000_000.0, 1_000_000_000.0);
                        for i in 0..n {
                            let dir = if i % 2 == 0 {
                                Direction::SolToToken
                            } else {
                                Direction::TokenToSol
                            };
                            let amount = match dir {
                                Direction::SolToToken => rng.gen_range(0.01..1.0),
                                Direction::TokenToSol => rng.gen_range(10.0..1_000.0),
                            };
                            let _ = black_box(amm.swap(7, &mut wallet, amount, dir, 1.0));
                        }
                    },
                    BatchSize::SmallInput,
                );
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_quote, bench_swap_batches);
criterion_main!(benches);
