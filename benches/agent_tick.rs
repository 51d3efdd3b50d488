//! benches/agent_tick.rs
//! Run with:  cargo bench --bench agent_tick

use agent_market_sim::{
    AgentPool, CancelToken, MarketConfig, MarketMaker, MessagingEngine, Phase, SimConfig,
    external::{InMemoryStore, TemplateGenerator},
    types::AgentId,
};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use tokio::runtime::Runtime;

// ────────────────────────────────────────────────────────────────────────────
//  Parameter grids
// ────────────────────────────────────────────────────────────────────────────
const POPULATIONS: &[usize] = &[20, 100, 500];
const CONCURRENCY: &[usize] = &[1, 5, 20];

fn build_pool(agents: usize, max_concurrent: usize) -> (AgentPool, Vec<AgentId>) {
    let config = SimConfig {
        max_agents_per_phase: agents,
        max_concurrent,
        seed: Some(42),
        ..Default::default()
    };
    let store = Arc::new(InMemoryStore::new());
    let amm = Arc::new(MarketMaker::new(&MarketConfig::default()).expect("bench market"));
    let messaging = Arc::new(MessagingEngine::new(
        Arc::new(TemplateGenerator::new()),
        store.clone(),
        config.external.clone(),
        config.sentiment_half_life_messages,
        "$SIM",
    ));
    let pool = AgentPool::new(amm, messaging, store, &config);
    let ids = (0..agents)
        .map(|i| {
            let id = pool.register_agent(agent_market_sim::PersonalityType::ALL[i % 5]);
            pool.deposit(id, 20.0, 20_000.0).expect("deposit");
            id
        })
        .collect();
    (pool, ids)
}

pub fn bench_ticks(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("agent_tick");

    for &n in POPULATIONS {
        for &conc in CONCURRENCY {
            group.throughput(Throughput::Elements(n as u64));
            let (pool, ids) = build_pool(n, conc);
            let mut tick = 0u64;
            for phase in [Phase::MarketAnalysis, Phase::Trade] {
                let id = BenchmarkId::new(format!("{phase}"), format!("agents_{n}_conc_{conc}"));
                group.bench_function(id, |b| {
                    b.iter(|| {
                        tick += 1;
                        let result =
                            rt.block_on(pool.run_tick(phase, &ids, tick, &CancelToken::new()));
                        black_box(result)
                    })
                });
            }
        }
    }

    group.finish();
}

criterion_group!(benches, bench_ticks);
criterion_main!(benches);
