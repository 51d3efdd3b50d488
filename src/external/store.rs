// src/external/store.rs

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use crate::agents::agent::Agent;
use crate::engine::status::{Checkpoint, RunStatus, SimulationRun};
use crate::error::{Result, SimError};
use crate::simulators::pool_state::PoolState;
use crate::types::{AgentId, Message, MessageId, Reaction, RunId, Transaction};

/// Oldest records are dropped past this many per log.
pub const MAX_STORED_RECORDS: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

impl PageRequest {
    pub fn first(limit: usize) -> Self {
        Self { offset: 0, limit }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first(50)
    }
}

/// A slice of a log, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub offset: usize,
}

/// Persistence seam. Everything the core reads or writes goes through here.
#[async_trait]
pub trait Store: Send + Sync {
    async fn save_agent(&self, agent: &Agent) -> Result<()>;
    async fn load_agents(&self) -> Result<Vec<Agent>>;

    /// Keeps `state` only when its version is newer than the stored one.
    /// Returns whether it was written.
    async fn save_pool_state(&self, state: &PoolState) -> Result<bool>;
    async fn load_pool_state(&self) -> Result<Option<PoolState>>;

    async fn record_transaction(&self, tx: &Transaction) -> Result<()>;
    async fn list_transactions(&self, page: PageRequest) -> Result<Page<Transaction>>;

    async fn save_message(&self, message: &Message) -> Result<()>;
    async fn list_messages(&self, page: PageRequest) -> Result<Page<Message>>;
    async fn save_reaction(&self, reaction: &Reaction) -> Result<()>;
    async fn list_reactions(&self, message_id: MessageId) -> Result<Vec<Reaction>>;

    async fn save_run(&self, run: &SimulationRun) -> Result<()>;
    /// The newest run that is not archived.
    async fn load_active_run(&self) -> Result<Option<SimulationRun>>;
    /// Returns `false` when the run was already archived.
    async fn archive_run(&self, run_id: RunId) -> Result<bool>;
    async fn list_runs(&self) -> Result<Vec<SimulationRun>>;

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()>;
    async fn load_checkpoint(&self) -> Result<Option<Checkpoint>>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StoreData {
    agents: BTreeMap<AgentId, Agent>,
    pool: Option<PoolState>,
    transactions: VecDeque<Transaction>,
    messages: VecDeque<Message>,
    reactions: VecDeque<Reaction>,
    runs: BTreeMap<RunId, SimulationRun>,
    checkpoint: Option<Checkpoint>,
}

fn push_capped<T>(log: &mut VecDeque<T>, item: T) {
    log.push_back(item);
    while log.len() > MAX_STORED_RECORDS {
        log.pop_front();
    }
}

fn page_of<T: Clone>(log: &VecDeque<T>, page: PageRequest) -> Page<T> {
    Page {
        items: log.iter().rev().skip(page.offset).take(page.limit).cloned().collect(),
        total: log.len(),
        offset: page.offset,
    }
}

/// Process-local store with optional JSON snapshots on disk.
///
/// `set_offline` and `set_latency` simulate an unavailable or slow backend.
#[derive(Default)]
pub struct InMemoryStore {
    data: RwLock<StoreData>,
    offline: AtomicBool,
    latency_ms: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    async fn gate(&self) -> Result<()> {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(SimError::External("store is offline".into()));
        }
        Ok(())
    }

    /// Write everything to `path` as JSON via a temp file and rename.
    pub fn save_snapshot<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = {
            let data = self.data.read();
            serde_json::to_string_pretty(&*data)?
        };
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        info!(path = %path.display(), "store snapshot written");
        Ok(())
    }

    pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let mut data: StoreData = serde_json::from_str(&raw)?;
        if let Some(pool) = data.pool.take() {
            data.pool = Some(pool.rehydrated()?);
        }
        info!(
            path = %path.as_ref().display(),
            agents = data.agents.len(),
            transactions = data.transactions.len(),
            "store snapshot loaded"
        );
        Ok(Self {
            data: RwLock::new(data),
            ..Default::default()
        })
    }

    /// Load `path` when it exists, otherwise start empty.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load_snapshot(path)
        } else {
            Ok(Self::new())
        }
    }

    pub fn transaction_count(&self) -> usize {
        self.data.read().transactions.len()
    }

    pub fn archived_runs(&self) -> Vec<RunId> {
        self.data
            .read()
            .runs
            .values()
            .filter(|r| r.archived)
            .map(|r| r.id)
            .collect()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn save_agent(&self, agent: &Agent) -> Result<()> {
        self.gate().await?;
        self.data.write().agents.insert(agent.id, agent.clone());
        Ok(())
    }

    async fn load_agents(&self) -> Result<Vec<Agent>> {
        self.gate().await?;
        Ok(self.data.read().agents.values().cloned().collect())
    }

    async fn save_pool_state(&self, state: &PoolState) -> Result<bool> {
        self.gate().await?;
        let mut data = self.data.write();
        if data.pool.as_ref().is_some_and(|p| p.version >= state.version) {
            debug!(version = state.version, "stale pool state ignored");
            return Ok(false);
        }
        data.pool = Some(state.clone());
        Ok(true)
    }

    async fn load_pool_state(&self) -> Result<Option<PoolState>> {
        self.gate().await?;
        let pool = self.data.read().pool.clone();
        pool.map(PoolState::rehydrated).transpose()
    }

    async fn record_transaction(&self, tx: &Transaction) -> Result<()> {
        self.gate().await?;
        push_capped(&mut self.data.write().transactions, tx.clone());
        Ok(())
    }

    async fn list_transactions(&self, page: PageRequest) -> Result<Page<Transaction>> {
        self.gate().await?;
        Ok(page_of(&self.data.read().transactions, page))
    }

    async fn save_message(&self, message: &Message) -> Result<()> {
        self.gate().await?;
        push_capped(&mut self.data.write().messages, message.clone());
        Ok(())
    }

    async fn list_messages(&self, page: PageRequest) -> Result<Page<Message>> {
        self.gate().await?;
        Ok(page_of(&self.data.read().messages, page))
    }

    async fn save_reaction(&self, reaction: &Reaction) -> Result<()> {
        self.gate().await?;
        push_capped(&mut self.data.write().reactions, reaction.clone());
        Ok(())
    }

    async fn list_reactions(&self, message_id: MessageId) -> Result<Vec<Reaction>> {
        self.gate().await?;
        Ok(self
            .data
            .read()
            .reactions
            .iter()
            .filter(|r| r.message_id == message_id)
            .cloned()
            .collect())
    }

    async fn save_run(&self, run: &SimulationRun) -> Result<()> {
        self.gate().await?;
        let mut data = self.data.write();
        // archival is one-way
        let archived = data.runs.get(&run.id).is_some_and(|r| r.archived);
        let mut run = run.clone();
        run.archived |= archived;
        data.runs.insert(run.id, run);
        Ok(())
    }

    async fn load_active_run(&self) -> Result<Option<SimulationRun>> {
        self.gate().await?;
        Ok(self
            .data
            .read()
            .runs
            .values()
            .rev()
            .find(|r| !r.archived)
            .cloned())
    }

    async fn archive_run(&self, run_id: RunId) -> Result<bool> {
        self.gate().await?;
        let mut data = self.data.write();
        let run = data
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| SimError::NotFound(format!("run {run_id}")))?;
        if run.archived {
            return Ok(false);
        }
        run.archived = true;
        if run.status.is_live() || run.status == RunStatus::Ready {
            run.status = RunStatus::Stopped;
        }
        Ok(true)
    }

    async fn list_runs(&self) -> Result<Vec<SimulationRun>> {
        self.gate().await?;
        Ok(self.data.read().runs.values().cloned().collect())
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.gate().await?;
        self.data.write().checkpoint = Some(checkpoint.clone());
        Ok(())
    }

    async fn load_checkpoint(&self) -> Result<Option<Checkpoint>> {
        self.gate().await?;
        Ok(self.data.read().checkpoint.clone())
    }
}
