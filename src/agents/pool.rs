// src/agents/pool.rs

//! The agent population and the bounded-concurrency tick loop.

use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info, warn};

use super::agent::Agent;
use super::config::{MOMENTUM_WINDOW, PARAM_JITTER, REACTION_LOOKBACK};
use super::decision::{Decision, MarketContext, decide};
use super::personality::{PersonalityDistribution, PersonalityType};
use crate::analysis::MomentumEstimator;
use crate::config::{ExternalCallPolicy, SimConfig};
use crate::engine::phase::Phase;
use crate::error::{Result, SimError};
use crate::external::call_with_policy;
use crate::external::faucet::Faucet;
use crate::external::store::Store;
use crate::sentiment::engine::MessagingEngine;
use crate::simulators::amm::MarketMaker;
use crate::simulators::market_trait::Marketable;
use crate::types::{AgentId, NewMessage, Wallet};

/// What one tick did. Errors are counted, never propagated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickResult {
    pub agents_selected: usize,
    pub decisions_made: usize,
    pub trades_executed: usize,
    pub failed_trades: usize,
    pub messages_posted: usize,
    pub reactions: usize,
    pub errors: usize,
    /// Selected but skipped because the tick was cancelled.
    pub cancelled: usize,
    /// Most decisions observed in flight at once.
    pub peak_concurrency: usize,
}

impl TickResult {
    fn absorb(&mut self, o: DecisionOutcome) {
        self.decisions_made += o.decided as usize;
        self.trades_executed += o.trades;
        self.failed_trades += o.failed_trades;
        self.messages_posted += o.messages;
        self.reactions += o.reactions;
        self.errors += o.errors;
        self.cancelled += o.cancelled as usize;
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct DecisionOutcome {
    decided: bool,
    cancelled: bool,
    trades: usize,
    failed_trades: usize,
    messages: usize,
    reactions: usize,
    errors: usize,
}

impl DecisionOutcome {
    fn decided() -> Self {
        Self {
            decided: true,
            ..Default::default()
        }
    }

    fn cancelled() -> Self {
        Self {
            cancelled: true,
            ..Default::default()
        }
    }
}

/// Shared stop flag for one tick. Decisions check it after getting a permit.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tracks decisions in flight and the high-water mark.
#[derive(Default)]
struct ConcurrencyGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

struct GaugeSlot(Arc<ConcurrencyGauge>);

impl ConcurrencyGauge {
    fn enter(self: &Arc<Self>) -> GaugeSlot {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        GaugeSlot(self.clone())
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Drop for GaugeSlot {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Tick-loop knobs. Changes apply from the next tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolLimits {
    pub max_concurrent: usize,
    pub max_agents_per_phase: usize,
    pub straggler_timeout: Duration,
    pub default_slippage: f64,
}

impl PoolLimits {
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent,
            max_agents_per_phase: config.max_agents_per_phase,
            straggler_timeout: Duration::from_millis(config.straggler_timeout_ms),
            default_slippage: config.market.default_slippage,
        }
    }
}

/// How a freshly seeded population is funded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeedPlan {
    pub sol_min: f64,
    pub sol_max: f64,
    /// Upper bound of the token grant, valued in SOL.
    pub token_value_sol: f64,
    /// SOL per token used to convert the token grant.
    pub price: f64,
}

impl SeedPlan {
    pub fn from_config(config: &SimConfig, price: f64) -> Self {
        Self {
            sol_min: config.starting_sol_min,
            sol_max: config.starting_sol_max,
            token_value_sol: config.starting_token_value_sol,
            price,
        }
    }
}

/// Everything a decision task needs, cheap to clone into each task.
#[derive(Clone)]
struct DecisionEnv {
    amm: Arc<MarketMaker>,
    messaging: Arc<MessagingEngine>,
    store: Arc<dyn Store>,
    policy: ExternalCallPolicy,
    seed: Option<u64>,
}

/// Rng for one decision. Reproducible when the run has a seed.
pub fn decision_rng(seed: Option<u64>, tick: u64, agent_id: AgentId) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s ^ (tick << 32) ^ agent_id),
        None => StdRng::from_entropy(),
    }
}

impl DecisionEnv {
    async fn execute(
        &self,
        phase: Phase,
        handle: Arc<Mutex<Agent>>,
        ctx: &MarketContext,
    ) -> DecisionOutcome {
        let (decision, agent_id, personality) = {
            let mut agent = handle.lock();
            agent.last_selected_tick = Some(ctx.tick);
            let mut rng = decision_rng(self.seed, ctx.tick, agent.id);
            (decide(phase, &agent, ctx, &mut rng), agent.id, agent.personality)
        };

        match decision {
            Decision::Hold => DecisionOutcome::decided(),
            Decision::Reassess { outlook } => {
                handle.lock().set_outlook(outlook);
                DecisionOutcome::decided()
            }
            Decision::Socialize { post, reactions } => {
                let mut outcome = DecisionOutcome::decided();
                if let Some(mood) = post {
                    let text = self
                        .messaging
                        .generate_message(
                            agent_id,
                            personality,
                            self.messaging.overall_sentiment(),
                            mood,
                            ctx.price,
                        )
                        .await;
                    let message = NewMessage::from_agent(agent_id, text).with_sentiment(mood);
                    match self.messaging.store_message(message).await {
                        Ok(_) => {
                            outcome.messages += 1;
                            handle.lock().messages_posted += 1;
                        }
                        Err(e) => {
                            warn!(agent_id, error = %e, "post failed");
                            outcome.errors += 1;
                        }
                    }
                }
                for (message_id, reaction) in reactions {
                    match self
                        .messaging
                        .react_to_message(message_id, agent_id, reaction)
                        .await
                    {
                        Ok(_) => {
                            outcome.reactions += 1;
                            handle.lock().reactions_given += 1;
                        }
                        Err(e) => {
                            debug!(agent_id, message_id, error = %e, "reaction failed");
                            outcome.errors += 1;
                        }
                    }
                }
                outcome
            }
            Decision::Trade {
                direction,
                amount,
                max_slippage,
            } => {
                // Lock order: agent, then pool (inside swap).
                let (result, snapshot) = {
                    let mut agent = handle.lock();
                    let result = self.amm.swap(
                        agent_id,
                        &mut agent.wallet,
                        amount,
                        direction,
                        max_slippage,
                    );
                    match &result {
                        Ok(_) => agent.trades_executed += 1,
                        Err(_) => agent.failed_trades += 1,
                    }
                    (result, agent.clone())
                };

                let tx = match &result {
                    Ok(receipt) => receipt.transaction.clone(),
                    Err(rejected) => rejected.transaction.clone(),
                };
                if let Err(e) = call_with_policy(&self.policy, "record transaction", || {
                    self.store.record_transaction(&tx)
                })
                .await
                {
                    warn!(tx_id = tx.id, error = %e, "transaction not persisted");
                }

                let mut outcome = DecisionOutcome::decided();
                match result {
                    Ok(_) => {
                        outcome.trades = 1;
                        let pool = self.amm.pool_state();
                        let saved = call_with_policy(&self.policy, "save agent", || {
                            self.store.save_agent(&snapshot)
                        })
                        .await
                        .and(
                            call_with_policy(&self.policy, "save pool", || {
                                self.store.save_pool_state(&pool)
                            })
                            .await,
                        );
                        if let Err(e) = saved {
                            warn!(agent_id, error = %e, "post-trade state not persisted");
                        }
                    }
                    Err(rejected) => {
                        outcome.failed_trades = 1;
                        outcome.errors = 1;
                        if rejected.error.is_fatal() {
                            error!(agent_id, error = %rejected.error, "swap hit a fatal error");
                        } else {
                            debug!(agent_id, error = %rejected.error, "swap rejected");
                        }
                    }
                }
                outcome
            }
        }
    }
}

pub struct AgentPool {
    agents: RwLock<BTreeMap<AgentId, Arc<Mutex<Agent>>>>,
    limits: RwLock<PoolLimits>,
    distribution: RwLock<PersonalityDistribution>,
    next_id: AtomicU64,
    estimator: MomentumEstimator,
    env: RwLock<DecisionEnv>,
}

impl AgentPool {
    pub fn new(
        amm: Arc<MarketMaker>,
        messaging: Arc<MessagingEngine>,
        store: Arc<dyn Store>,
        config: &SimConfig,
    ) -> Self {
        Self {
            agents: RwLock::new(BTreeMap::new()),
            limits: RwLock::new(PoolLimits::from_config(config)),
            distribution: RwLock::new(config.personality_distribution.clone()),
            next_id: AtomicU64::new(1),
            estimator: MomentumEstimator::new(MOMENTUM_WINDOW),
            env: RwLock::new(DecisionEnv {
                amm,
                messaging,
                store,
                policy: config.external.clone(),
                seed: config.seed,
            }),
        }
    }

    // --- Population ---

    /// Add an agent with its personality's stock parameters and an empty wallet.
    pub fn register_agent(&self, personality: PersonalityType) -> AgentId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.insert(Agent::with_profile(id, personality, Wallet::default()));
        id
    }

    /// Take an existing record, e.g. restored from storage.
    /// Parameters are clamped on the way in.
    pub fn insert(&self, agent: Agent) {
        let agent = agent.sanitized();
        self.next_id.fetch_max(agent.id + 1, Ordering::SeqCst);
        self.agents
            .write()
            .insert(agent.id, Arc::new(Mutex::new(agent)));
    }

    /// Create `count` agents drawn from the current distribution and fund them.
    pub async fn seed(
        &self,
        count: usize,
        plan: SeedPlan,
        faucet: &dyn Faucet,
        rng: &mut StdRng,
    ) -> Result<Vec<AgentId>> {
        let distribution = self.distribution.read().clone();
        distribution.validate()?;
        if !(plan.price > 0.0) {
            return Err(SimError::InvalidConfiguration(format!(
                "seed price must be positive, got {}",
                plan.price
            )));
        }
        if !(plan.sol_min >= 0.0 && plan.sol_min <= plan.sol_max && plan.token_value_sol >= 0.0) {
            return Err(SimError::InvalidConfiguration(format!(
                "bad funding range: sol {}..={}, tokens worth {}",
                plan.sol_min, plan.sol_max, plan.token_value_sol
            )));
        }

        let env = self.env.read().clone();
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let personality = distribution.sample(rng)?;
            let profile = personality.profile();
            let params = profile.base.jittered(rng, PARAM_JITTER);
            let sol_wanted = rng.gen_range(plan.sol_min..=plan.sol_max);
            let tokens = rng.gen_range(0.0..=plan.token_value_sol) / plan.price;
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);

            let granted = match call_with_policy(&env.policy, "faucet airdrop", || {
                faucet.airdrop(id, sol_wanted)
            })
            .await
            {
                Ok(sol) => sol,
                Err(e) => {
                    warn!(agent_id = id, error = %e, "airdrop failed, agent starts without SOL");
                    0.0
                }
            };

            let agent = Agent::new(
                id,
                personality,
                params,
                profile.max_position_size,
                Wallet::new(granted, tokens),
            );
            if let Err(e) = call_with_policy(&env.policy, "save agent", || {
                env.store.save_agent(&agent)
            })
            .await
            {
                warn!(agent_id = id, error = %e, "agent not persisted");
            }
            self.insert(agent);
            ids.push(id);
        }
        info!(count = ids.len(), "population seeded");
        Ok(ids)
    }

    fn handle(&self, agent_id: AgentId) -> Result<Arc<Mutex<Agent>>> {
        self.agents
            .read()
            .get(&agent_id)
            .cloned()
            .ok_or_else(|| SimError::NotFound(format!("agent {agent_id}")))
    }

    pub fn deposit(&self, agent_id: AgentId, sol: f64, token: f64) -> Result<Wallet> {
        let handle = self.handle(agent_id)?;
        let mut agent = handle.lock();
        agent.wallet.deposit(sol, token)?;
        Ok(agent.wallet)
    }

    pub fn withdraw(&self, agent_id: AgentId, sol: f64, token: f64) -> Result<Wallet> {
        let handle = self.handle(agent_id)?;
        let mut agent = handle.lock();
        agent.wallet.withdraw(sol, token)?;
        Ok(agent.wallet)
    }

    pub fn deactivate(&self, agent_id: AgentId) -> Result<()> {
        self.handle(agent_id)?.lock().active = false;
        Ok(())
    }

    pub fn activate(&self, agent_id: AgentId) -> Result<()> {
        self.handle(agent_id)?.lock().active = true;
        Ok(())
    }

    pub fn deactivate_all(&self) {
        for handle in self.agents.read().values() {
            handle.lock().active = false;
        }
    }

    pub fn get(&self, agent_id: AgentId) -> Option<Agent> {
        self.agents.read().get(&agent_id).map(|h| h.lock().clone())
    }

    /// Copies of every agent, ordered by id.
    pub fn agents(&self) -> Vec<Agent> {
        self.agents.read().values().map(|h| h.lock().clone()).collect()
    }

    pub fn active_ids(&self) -> Vec<AgentId> {
        self.agents
            .read()
            .values()
            .filter_map(|h| {
                let a = h.lock();
                a.active.then_some(a.id)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // --- Settings ---

    pub fn limits(&self) -> PoolLimits {
        *self.limits.read()
    }

    pub fn set_limits(&self, max_concurrent: usize, max_active_agents: usize) -> Result<()> {
        if max_concurrent == 0 || max_active_agents == 0 {
            return Err(SimError::InvalidConfiguration(format!(
                "limits must be positive, got concurrent={max_concurrent} agents={max_active_agents}"
            )));
        }
        let mut limits = self.limits.write();
        limits.max_concurrent = max_concurrent;
        limits.max_agents_per_phase = max_active_agents;
        Ok(())
    }

    pub fn set_personality_distribution(&self, distribution: PersonalityDistribution) -> Result<()> {
        distribution.validate()?;
        *self.distribution.write() = distribution;
        Ok(())
    }

    pub fn personality_distribution(&self) -> PersonalityDistribution {
        self.distribution.read().clone()
    }

    /// Pick up every tick-loop setting from a validated config.
    pub fn apply_config(&self, config: &SimConfig) -> Result<()> {
        config.validate()?;
        *self.limits.write() = PoolLimits::from_config(config);
        *self.distribution.write() = config.personality_distribution.clone();
        let mut env = self.env.write();
        env.policy = config.external.clone();
        env.seed = config.seed;
        Ok(())
    }

    // --- Tick loop ---

    /// Up to `limit` active candidates, least recently selected first, ties by id.
    fn select(&self, candidates: &[AgentId], limit: usize) -> Vec<Arc<Mutex<Agent>>> {
        let unique: BTreeSet<AgentId> = candidates.iter().copied().collect();
        let agents = self.agents.read();
        let mut eligible: Vec<(Option<u64>, AgentId, Arc<Mutex<Agent>>)> = unique
            .into_iter()
            .filter_map(|id| agents.get(&id))
            .filter_map(|h| {
                let a = h.lock();
                a.active.then(|| (a.last_selected_tick, a.id, h.clone()))
            })
            .collect();
        eligible.sort_by_key(|(last, id, _)| (*last, *id));
        eligible.truncate(limit);
        eligible.into_iter().map(|(_, _, h)| h).collect()
    }

    /// Snapshot every decision in this tick sees.
    pub fn market_context(&self, tick: u64) -> MarketContext {
        let (amm, messaging) = {
            let env = self.env.read();
            (env.amm.clone(), env.messaging.clone())
        };
        MarketContext {
            tick,
            price: amm.current_price(),
            signal: self.estimator.from_market(amm.as_ref()),
            sentiment_score: messaging.score(),
            default_slippage: self.limits.read().default_slippage,
            recent_messages: messaging.recent_messages(REACTION_LOOKBACK),
        }
    }

    /// Run one phase for the selected agents with bounded concurrency.
    pub async fn run_tick(
        &self,
        phase: Phase,
        candidates: &[AgentId],
        tick: u64,
        cancel: &CancelToken,
    ) -> TickResult {
        let limits = self.limits();
        let selected = self.select(candidates, limits.max_agents_per_phase);
        let mut result = TickResult {
            agents_selected: selected.len(),
            ..Default::default()
        };
        if selected.is_empty() {
            return result;
        }

        let ctx = Arc::new(self.market_context(tick));
        let permits = Arc::new(Semaphore::new(limits.max_concurrent));
        let gauge = Arc::new(ConcurrencyGauge::default());
        let mut tasks = JoinSet::new();
        let base_env = self.env.read().clone();

        for handle in selected {
            let env = base_env.clone();
            let ctx = ctx.clone();
            let permits = permits.clone();
            let gauge = gauge.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return DecisionOutcome::cancelled();
                };
                if cancel.is_cancelled() {
                    return DecisionOutcome::cancelled();
                }
                let _slot = gauge.enter();
                env.execute(phase, handle, &ctx).await
            });
        }

        let deadline = Instant::now() + limits.straggler_timeout;
        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok(outcome))) => result.absorb(outcome),
                Ok(Some(Err(e))) => {
                    error!(tick, %phase, error = %e, "decision task panicked");
                    result.errors += 1;
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(tick, %phase, stragglers = tasks.len(), "aborting slow decisions");
                    tasks.abort_all();
                    while let Some(joined) = tasks.join_next().await {
                        match joined {
                            Ok(outcome) => result.absorb(outcome),
                            Err(_) => result.errors += 1,
                        }
                    }
                    break;
                }
            }
        }

        result.peak_concurrency = gauge.peak();
        debug!(
            tick,
            %phase,
            selected = result.agents_selected,
            decisions = result.decisions_made,
            trades = result.trades_executed,
            messages = result.messages_posted,
            errors = result.errors,
            "tick finished"
        );
        result
    }
}
