// src/engine/simulation.rs

//! The top-level scheduler: run lifecycle, phase timer and tick driver.

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use super::phase::{Phase, PhaseClock};
use super::status::{Checkpoint, Counters, RunStatus, SimulationRun, StatusSnapshot};
use crate::agents::agent::Agent;
use crate::agents::pool::{AgentPool, CancelToken, SeedPlan, TickResult};
use crate::config::{ConfigPatch, SimConfig, validate_speed};
use crate::error::{Result, SimError};
use crate::external::faucet::{Faucet, SimulatedFaucet};
use crate::external::oracle::{FixedOracle, PriceOracle};
use crate::external::store::{InMemoryStore, Page, PageRequest, Store};
use crate::external::text::{TemplateGenerator, TextGenerator};
use crate::external::call_with_policy;
use crate::sentiment::engine::MessagingEngine;
use crate::simulators::amm::MarketMaker;
use crate::simulators::market_trait::Marketable;
use crate::simulators::pool_state::PoolState;
use crate::types::{Message, RunId, Transaction};

/// Pool price this far from the oracle (relative) is logged as a warning.
pub const ORACLE_DEVIATION_WARN: f64 = 0.10;
/// How long `stop` waits for the driver before aborting it.
pub const STOP_WAIT: Duration = Duration::from_secs(5);

/// The outside world, injected at construction.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn Store>,
    pub generator: Arc<dyn TextGenerator>,
    pub oracle: Arc<dyn PriceOracle>,
    pub faucet: Arc<dyn Faucet>,
}

impl Collaborators {
    /// Everything in-process: memory store, templates, no oracle, bottomless faucet.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemoryStore::new()),
            generator: Arc::new(TemplateGenerator::new()),
            oracle: Arc::new(FixedOracle::new()),
            faucet: Arc::new(SimulatedFaucet::unlimited()),
        }
    }
}

/// Mutable run state. Guarded by a sync mutex that is never held across an await.
struct EngineState {
    status: RunStatus,
    clock: PhaseClock,
    run: Option<SimulationRun>,
    tick: u64,
    counters: Counters,
    cancel: CancelToken,
    last_tick: Option<TickResult>,
    archived: bool,
}

struct Shared {
    config: RwLock<SimConfig>,
    amm: Arc<MarketMaker>,
    messaging: Arc<MessagingEngine>,
    pool: Arc<AgentPool>,
    collab: Collaborators,
    state: Mutex<EngineState>,
    status: RwLock<StatusSnapshot>,
    wake: Notify,
    next_run_id: AtomicU64,
}

pub struct SimulationEngine {
    shared: Arc<Shared>,
    /// Also serialises lifecycle commands.
    driver: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SimulationEngine {
    /// Build the engine and pick up whatever the store remembers.
    pub async fn new(config: SimConfig, collab: Collaborators) -> Result<Self> {
        config.validate()?;
        let amm = Arc::new(MarketMaker::new(&config.market)?);
        let messaging = Arc::new(MessagingEngine::new(
            collab.generator.clone(),
            collab.store.clone(),
            config.external.clone(),
            config.sentiment_half_life_messages,
            config.token.cashtag(),
        ));
        let pool = Arc::new(AgentPool::new(
            amm.clone(),
            messaging.clone(),
            collab.store.clone(),
            &config,
        ));

        let clock = PhaseClock::new(config.scaled_phase_duration());
        let status = StatusSnapshot {
            run_id: None,
            status: RunStatus::Ready,
            phase: clock.phase(),
            phase_progress: 0.0,
            tick: 0,
            speed_multiplier: config.speed_multiplier,
            counters: Counters::default(),
            price: amm.current_price(),
            sentiment: messaging.overall_sentiment(),
            active_agents: 0,
            amm_halted: false,
            last_tick: None,
            updated_at: Utc::now(),
        };

        let shared = Arc::new(Shared {
            config: RwLock::new(config),
            amm,
            messaging,
            pool,
            collab,
            state: Mutex::new(EngineState {
                status: RunStatus::Ready,
                clock,
                run: None,
                tick: 0,
                counters: Counters::default(),
                cancel: CancelToken::new(),
                last_tick: None,
                archived: false,
            }),
            status: RwLock::new(status),
            wake: Notify::new(),
            next_run_id: AtomicU64::new(1),
        });
        let engine = Self {
            shared,
            driver: tokio::sync::Mutex::new(None),
        };
        engine.restore_checkpoint().await;
        Ok(engine)
    }

    /// In-process collaborators throughout.
    pub async fn in_memory(config: SimConfig) -> Result<Self> {
        Self::new(config, Collaborators::in_memory()).await
    }

    /// Seed counters, pool and agents from storage. Failures only log.
    async fn restore_checkpoint(&self) {
        let s = &self.shared;
        let policy = s.config.read().external.clone();
        let store = &s.collab.store;

        match call_with_policy(&policy, "load runs", || store.list_runs()).await {
            Ok(runs) => {
                let next = runs.iter().map(|r| r.id).max().unwrap_or(0) + 1;
                s.next_run_id.store(next, Ordering::SeqCst);
            }
            Err(e) => warn!(error = %e, "could not list runs"),
        }

        match call_with_policy(&policy, "load pool", || store.load_pool_state()).await {
            Ok(Some(pool)) => match s.amm.restore(pool) {
                Ok(restored) => {
                    info!(version = restored.version, price = restored.price(), "pool restored from store")
                }
                Err(e) => warn!(error = %e, "stored pool failed its invariant"),
            },
            Ok(None) => {}
            Err(e) => warn!(error = %e, "could not load pool state"),
        }

        match call_with_policy(&policy, "load agents", || store.load_agents()).await {
            Ok(agents) => {
                let n = agents.len();
                for agent in agents {
                    s.pool.insert(agent);
                }
                if n > 0 {
                    info!(agents = n, "agents restored from store");
                }
            }
            Err(e) => warn!(error = %e, "could not load agents"),
        }

        match call_with_policy(&policy, "load checkpoint", || store.load_checkpoint()).await {
            Ok(Some(cp)) => {
                let mut st = s.state.lock();
                st.counters = cp.counters;
                st.tick = cp.tick;
                st.clock.restore(cp.phase, 0.0);
                info!(run_id = cp.run_id, tick = cp.tick, "counters restored from checkpoint");
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "could not load checkpoint"),
        }
        s.refresh_status();
    }

    // --- Lifecycle ---

    pub async fn start(&self, config: SimConfig) -> Result<RunId> {
        let mut driver = self.driver.lock().await;
        if self.shared.state.lock().status.is_live() {
            return Err(SimError::AlreadyRunning);
        }
        config.validate()?;
        let s = &self.shared;
        if let Some(old) = driver.take() {
            old.abort();
        }

        s.pool.apply_config(&config)?;
        *s.config.write() = config.clone();

        let price = s.launch_price(&config).await;
        s.amm.set_fee_rate(config.market.fee_rate)?;
        s.amm.bootstrap_pool(price, config.market.initial_liquidity_sol)?;

        s.pool.deactivate_all();
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        s.pool
            .seed(
                config.agent_count,
                SeedPlan::from_config(&config, price),
                s.collab.faucet.as_ref(),
                &mut rng,
            )
            .await?;
        s.messaging.reset_sentiment();

        let run_id = s.next_run_id.fetch_add(1, Ordering::SeqCst);
        let run = SimulationRun {
            id: run_id,
            status: RunStatus::Running,
            phase: Phase::MarketAnalysis,
            config: config.clone(),
            started_at: Some(Utc::now()),
            paused_at: None,
            stopped_at: None,
            archived: false,
        };
        s.supersede_runs(run_id).await;
        s.persist_run(&run).await;
        s.persist_pool().await;

        {
            let mut st = s.state.lock();
            st.status = RunStatus::Running;
            st.clock = PhaseClock::new(config.scaled_phase_duration());
            st.run = Some(run);
            st.tick = 0;
            st.counters = Counters::default();
            st.cancel = CancelToken::new();
            st.last_tick = None;
            st.archived = false;
        }

        let opening = format!(
            "Market open: {} at {price:.8} SOL, {} agents",
            config.token.cashtag(),
            config.agent_count
        );
        if let Err(e) = s.messaging.post_system_message(opening).await {
            warn!(error = %e, "opening message not posted");
        }
        s.refresh_status();
        *driver = Some(tokio::spawn(drive(s.clone())));
        info!(run_id, agents = config.agent_count, price, "simulation started");
        Ok(run_id)
    }

    pub async fn pause(&self) -> Result<()> {
        let _guard = self.driver.lock().await;
        let s = &self.shared;
        let run = {
            let mut st = s.state.lock();
            if st.status != RunStatus::Running {
                return Err(SimError::NotRunning);
            }
            st.status = RunStatus::Paused;
            st.clock.pause();
            st.cancel.cancel();
            if let Some(run) = st.run.as_mut() {
                run.status = RunStatus::Paused;
                run.paused_at = Some(Utc::now());
            }
            st.run.clone()
        };
        s.wake.notify_one();
        if let Some(run) = run {
            s.persist_run(&run).await;
        }
        s.refresh_status();
        info!("simulation paused");
        Ok(())
    }

    pub async fn resume(&self) -> Result<()> {
        let _guard = self.driver.lock().await;
        let s = &self.shared;
        let run = {
            let mut st = s.state.lock();
            match st.status {
                RunStatus::Paused => {}
                RunStatus::Running => return Err(SimError::AlreadyRunning),
                RunStatus::Ready | RunStatus::Stopped => return Err(SimError::NotRunning),
            }
            st.status = RunStatus::Running;
            st.clock.resume();
            if let Some(run) = st.run.as_mut() {
                run.status = RunStatus::Running;
                run.paused_at = None;
            }
            st.run.clone()
        };
        s.wake.notify_one();
        if let Some(run) = run {
            s.persist_run(&run).await;
        }
        s.refresh_status();
        info!("simulation resumed");
        Ok(())
    }

    /// Idempotent. Archives the run exactly once.
    pub async fn stop(&self) -> Result<()> {
        let mut driver = self.driver.lock().await;
        let s = &self.shared;
        let run = {
            let mut st = s.state.lock();
            if !st.status.is_live() {
                return Ok(());
            }
            st.status = RunStatus::Stopped;
            st.cancel.cancel();
            st.clock.pause();
            if let Some(run) = st.run.as_mut() {
                run.status = RunStatus::Stopped;
                run.stopped_at = Some(Utc::now());
            }
            st.run.clone()
        };
        s.wake.notify_one();

        if let Some(handle) = driver.take() {
            let abort = handle.abort_handle();
            if timeout(STOP_WAIT, handle).await.is_err() {
                warn!("driver did not stop in time, aborting it");
                abort.abort();
            }
        }

        let archive = {
            let mut st = s.state.lock();
            let first = !st.archived;
            st.archived = true;
            first
        };
        if let Some(run) = run {
            s.persist_run(&run).await;
            s.persist_checkpoint(run.id).await;
            if archive {
                s.archive_run(run.id).await;
            }
            info!(run_id = run.id, "simulation stopped");
        }
        s.refresh_status();
        Ok(())
    }

    /// Multiplier in (0, 10]. Remaining phase time scales, progress is kept.
    pub async fn set_speed(&self, multiplier: f64) -> Result<()> {
        validate_speed(multiplier)?;
        let _guard = self.driver.lock().await;
        let s = &self.shared;
        let phase_len = {
            let mut cfg = s.config.write();
            cfg.speed_multiplier = multiplier;
            cfg.scaled_phase_duration()
        };
        {
            let mut st = s.state.lock();
            st.clock.rescale(phase_len);
            if let Some(run) = st.run.as_mut() {
                run.config.speed_multiplier = multiplier;
            }
        }
        s.wake.notify_one();
        s.refresh_status();
        info!(multiplier, "speed changed");
        Ok(())
    }

    /// Validated partial update, effective from the next tick.
    pub async fn configure(&self, patch: ConfigPatch) -> Result<SimConfig> {
        let _guard = self.driver.lock().await;
        let s = &self.shared;
        let next = patch.apply_to(&s.config.read())?;
        s.pool.apply_config(&next)?;
        *s.config.write() = next.clone();
        {
            let mut st = s.state.lock();
            if patch.phase_duration_ms.is_some() {
                st.clock.rescale(next.scaled_phase_duration());
            }
            if let Some(run) = st.run.as_mut() {
                run.config = next.clone();
            }
        }
        s.wake.notify_one();
        s.refresh_status();
        info!(?patch, "configuration updated");
        Ok(next)
    }

    // --- Observers ---

    /// In-memory snapshot with live phase progress.
    pub fn status(&self) -> StatusSnapshot {
        let mut snapshot = self.shared.status.read().clone();
        snapshot.phase_progress = self.shared.state.lock().clock.progress();
        snapshot
    }

    pub fn config(&self) -> SimConfig {
        self.shared.config.read().clone()
    }

    pub fn pool_state(&self) -> PoolState {
        self.shared.amm.pool_state()
    }

    pub fn amm(&self) -> &Arc<MarketMaker> {
        &self.shared.amm
    }

    pub fn messaging(&self) -> &Arc<MessagingEngine> {
        &self.shared.messaging
    }

    pub fn agent_pool(&self) -> &Arc<AgentPool> {
        &self.shared.pool
    }

    pub fn agents(&self) -> Vec<Agent> {
        self.shared.pool.agents()
    }

    pub fn recent_messages(&self, n: usize) -> Vec<Message> {
        self.shared.messaging.recent_messages(n)
    }

    pub async fn transactions(&self, page: PageRequest) -> Result<Page<Transaction>> {
        self.shared.collab.store.list_transactions(page).await
    }

    pub async fn messages(&self, page: PageRequest) -> Result<Page<Message>> {
        self.shared.collab.store.list_messages(page).await
    }
}

impl Shared {
    fn policy(&self) -> crate::config::ExternalCallPolicy {
        self.config.read().external.clone()
    }

    /// Oracle price when it has a sane one, otherwise the configured price.
    async fn launch_price(&self, config: &SimConfig) -> f64 {
        let oracle = &self.collab.oracle;
        let symbol = config.token.symbol.as_str();
        match call_with_policy(&config.external, "oracle price", || oracle.get_price(symbol)).await {
            Ok(Some(p)) if p > 0.0 && p.is_finite() => {
                info!(price = p, "launch price from oracle");
                p
            }
            Ok(_) => config.market.initial_price,
            Err(e) => {
                warn!(error = %e, "oracle unavailable, using configured price");
                config.market.initial_price
            }
        }
    }

    /// Relative gap between pool and oracle, when the oracle has a price.
    async fn oracle_deviation(&self) -> Option<f64> {
        let policy = self.policy();
        let symbol = self.config.read().token.symbol.clone();
        let oracle = &self.collab.oracle;
        let reference = match call_with_policy(&policy, "oracle price", || oracle.get_price(&symbol)).await {
            Ok(Some(p)) if p > 0.0 => p,
            Ok(_) => return None,
            Err(e) => {
                debug!(error = %e, "oracle cross-check skipped");
                return None;
            }
        };
        let pool_price = self.amm.current_price();
        let deviation = (pool_price - reference).abs() / reference;
        if deviation > ORACLE_DEVIATION_WARN {
            warn!(pool_price, reference, deviation, "pool price drifted from oracle");
        }
        Some(deviation)
    }

    async fn supersede_runs(&self, new_id: RunId) {
        let policy = self.policy();
        let store = &self.collab.store;
        match call_with_policy(&policy, "load active run", || store.load_active_run()).await {
            Ok(Some(old)) if old.id != new_id => self.archive_run(old.id).await,
            Ok(_) => {}
            Err(e) => warn!(error = %e, "could not check for an active run"),
        }
    }

    async fn archive_run(&self, run_id: RunId) {
        let policy = self.policy();
        let store = &self.collab.store;
        match call_with_policy(&policy, "archive run", || store.archive_run(run_id)).await {
            Ok(true) => info!(run_id, "run archived"),
            Ok(false) => debug!(run_id, "run was already archived"),
            Err(e) => warn!(run_id, error = %e, "run not archived"),
        }
    }

    async fn persist_run(&self, run: &SimulationRun) {
        let policy = self.policy();
        let store = &self.collab.store;
        if let Err(e) = call_with_policy(&policy, "save run", || store.save_run(run)).await {
            warn!(run_id = run.id, error = %e, "run not persisted");
        }
    }

    async fn persist_pool(&self) {
        let policy = self.policy();
        let store = &self.collab.store;
        let pool = self.amm.pool_state();
        if let Err(e) = call_with_policy(&policy, "save pool", || store.save_pool_state(&pool)).await {
            warn!(error = %e, "pool state not persisted");
        }
    }

    async fn persist_checkpoint(&self, run_id: RunId) {
        let checkpoint = {
            let st = self.state.lock();
            Checkpoint {
                run_id,
                phase: st.clock.phase(),
                tick: st.tick,
                counters: st.counters,
                saved_at: Utc::now(),
            }
        };
        let policy = self.policy();
        let store = &self.collab.store;
        if let Err(e) = call_with_policy(&policy, "save checkpoint", || {
            store.save_checkpoint(&checkpoint)
        })
        .await
        {
            warn!(run_id, error = %e, "checkpoint not persisted");
        }
    }

    /// Rebuild the observer snapshot. Sole writer of `status`.
    fn refresh_status(&self) {
        let (run_id, status, phase, progress, tick, counters, last_tick) = {
            let st = self.state.lock();
            (
                st.run.as_ref().map(|r| r.id),
                st.status,
                st.clock.phase(),
                st.clock.progress(),
                st.tick,
                st.counters,
                st.last_tick,
            )
        };
        let snapshot = StatusSnapshot {
            run_id,
            status,
            phase,
            phase_progress: progress,
            tick,
            speed_multiplier: self.config.read().speed_multiplier,
            counters,
            price: self.amm.current_price(),
            sentiment: self.messaging.overall_sentiment(),
            active_agents: self.pool.active_ids().len(),
            amm_halted: self.amm.is_halted(),
            last_tick,
            updated_at: Utc::now(),
        };
        *self.status.write() = snapshot;
    }
}

/// What the driver should do next.
enum Step {
    Exit,
    Wait,
    Sleep(Duration),
    Tick,
}

/// Phase timer. One tick at a time; phases never overlap.
async fn drive(s: Arc<Shared>) {
    debug!("driver started");
    loop {
        let step = {
            let st = s.state.lock();
            match st.status {
                RunStatus::Ready | RunStatus::Stopped => Step::Exit,
                RunStatus::Paused => Step::Wait,
                RunStatus::Running => {
                    let remaining = st.clock.remaining();
                    if remaining.is_zero() {
                        Step::Tick
                    } else {
                        Step::Sleep(remaining)
                    }
                }
            }
        };

        match step {
            Step::Exit => break,
            Step::Wait => s.wake.notified().await,
            Step::Sleep(d) => {
                tokio::select! {
                    _ = sleep(d) => {}
                    _ = s.wake.notified() => {}
                }
            }
            Step::Tick => run_one_tick(&s).await,
        }
    }
    debug!("driver finished");
}

async fn run_one_tick(s: &Arc<Shared>) {
    let Some((phase, tick, cancel, run_id)) = ({
        let mut st = s.state.lock();
        if st.status != RunStatus::Running {
            None
        } else {
            st.tick += 1;
            st.cancel = CancelToken::new();
            let run_id = st.run.as_ref().map(|r| r.id).unwrap_or_default();
            Some((st.clock.phase(), st.tick, st.cancel.clone(), run_id))
        }
    }) else {
        return;
    };

    let candidates = s.pool.active_ids();
    let result = s.pool.run_tick(phase, &candidates, tick, &cancel).await;
    let cancelled = cancel.is_cancelled();

    {
        let mut st = s.state.lock();
        st.counters.absorb(&result);
        st.last_tick = Some(result);
        if cancelled {
            // Finish this phase on resume for whoever was not served.
            st.clock.hold_at_end();
        } else {
            let next = st.clock.advance();
            if let Some(run) = st.run.as_mut() {
                run.phase = next;
            }
        }
    }

    if !cancelled {
        s.amm.sync_market_data();
        s.persist_pool().await;
        if phase == Phase::Trade {
            s.oracle_deviation().await;
        }
    }
    if s.amm.is_halted() {
        error!(tick, "market maker is halted; swaps will fail until reset");
    }
    s.persist_checkpoint(run_id).await;
    s.refresh_status();
    info!(
        tick,
        %phase,
        selected = result.agents_selected,
        trades = result.trades_executed,
        messages = result.messages_posted,
        errors = result.errors,
        cancelled,
        "tick complete"
    );
}
