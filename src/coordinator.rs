//! Refresh coordinator
//!
//! One tokio task per configured entity drives discovery, fetching and
//! mapping on an interval and publishes the outcome through `watch`
//! channels. Readers always see a whole [`TariffResult`] behind an `Arc`.
//!
//! Within an entity cycles never overlap. A reconfiguration drops the
//! in-flight cycle (its result is never published), clears the cache and
//! starts over immediately. Manual triggers arriving mid-cycle collapse
//! into a single follow-up cycle.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use crate::config::{EntityConfig, RefreshConfig};
use crate::error::{Result, TariffError};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::model::TariffResult;

pub mod pipeline;
pub mod state;

pub use pipeline::{SchemaCache, TariffPipeline, municipality_of};
pub use state::{RefreshState, RefreshStatus};

/// Atomically replaced cache slot
pub type Snapshot = Option<Arc<TariffResult>>;

/// Commands accepted by an entity task
#[derive(Debug, Clone)]
pub enum CoordinatorCommand {
    RefreshNow,
    Reconfigure(EntityConfig),
    Shutdown,
}

/// Handle to a running entity task
pub struct CoordinatorHandle {
    entity_id: String,
    commands_tx: mpsc::UnboundedSender<CoordinatorCommand>,
    snapshot_rx: watch::Receiver<Snapshot>,
    status_rx: watch::Receiver<RefreshStatus>,
    entity_rx: watch::Receiver<EntityConfig>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl CoordinatorHandle {
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Current configuration of the entity
    pub fn entity(&self) -> EntityConfig {
        self.entity_rx.borrow().clone()
    }

    /// Last cached result, if any
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn status(&self) -> RefreshStatus {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot_rx.clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<RefreshStatus> {
        self.status_rx.clone()
    }

    pub fn subscribe_entity(&self) -> watch::Receiver<EntityConfig> {
        self.entity_rx.clone()
    }

    /// Request a refresh now (coalesced with one already in flight)
    pub fn trigger_now(&self) -> Result<()> {
        self.send(CoordinatorCommand::RefreshNow)
    }

    /// Replace the entity configuration; the id must stay the same
    pub fn reconfigure(&self, entity: EntityConfig) -> Result<()> {
        entity.validate()?;
        if entity.id != self.entity_id {
            return Err(TariffError::validation(
                "entities.id".to_string(),
                format!("Cannot rename entity '{}' to '{}'", self.entity_id, entity.id),
            ));
        }
        self.send(CoordinatorCommand::Reconfigure(entity))
    }

    /// Stop the task and wait for it to exit
    pub async fn shutdown(&self) {
        let _ = self.commands_tx.send(CoordinatorCommand::Shutdown);
        if let Some(join) = self.join.lock().await.take() {
            let _ = join.await;
        }
    }

    fn send(&self, cmd: CoordinatorCommand) -> Result<()> {
        self.commands_tx
            .send(cmd)
            .map_err(|_| TariffError::cancelled(format!("Coordinator '{}' has stopped", self.entity_id)))
    }
}

/// Spawn the refresh task for one entity
pub fn spawn(
    entity: EntityConfig,
    pipeline: Arc<TariffPipeline>,
    retry: RefreshConfig,
) -> CoordinatorHandle {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = watch::channel::<Snapshot>(None);
    let (status_tx, status_rx) = watch::channel(RefreshStatus::new(&entity.id));
    let (entity_tx, entity_rx) = watch::channel(entity.clone());

    let entity_id = entity.id.clone();
    let task = EntityTask {
        logger: get_logger_with_context(LogContext::new("coordinator").with_entity(&entity.id)),
        entity,
        pipeline,
        retry,
        schema_cache: None,
        generation: 0,
        snapshot_tx,
        status_tx,
        entity_tx,
    };
    let join = tokio::spawn(task.run(commands_rx));

    CoordinatorHandle {
        entity_id,
        commands_tx,
        snapshot_rx,
        status_rx,
        entity_rx,
        join: Mutex::new(Some(join)),
    }
}

/// Handles for every configured entity, keyed by id
#[derive(Default)]
pub struct CoordinatorRegistry {
    handles: BTreeMap<String, CoordinatorHandle>,
}

impl CoordinatorRegistry {
    /// Spawn one task per entity sharing `pipeline`
    pub fn start(
        entities: &[EntityConfig],
        pipeline: Arc<TariffPipeline>,
        retry: &RefreshConfig,
    ) -> Self {
        let handles = entities
            .iter()
            .map(|e| (e.id.clone(), spawn(e.clone(), pipeline.clone(), retry.clone())))
            .collect();
        Self { handles }
    }

    pub fn get(&self, id: &str) -> Option<&CoordinatorHandle> {
        self.handles.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CoordinatorHandle> {
        self.handles.values()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub async fn shutdown_all(&self) {
        for handle in self.handles.values() {
            handle.shutdown().await;
        }
    }
}

/// How an in-flight cycle ended
enum CycleEnd {
    Completed(Result<TariffResult>),
    Reconfigured(EntityConfig),
    Shutdown,
}

struct EntityTask {
    entity: EntityConfig,
    pipeline: Arc<TariffPipeline>,
    retry: RefreshConfig,
    schema_cache: Option<SchemaCache>,
    generation: u64,
    snapshot_tx: watch::Sender<Snapshot>,
    status_tx: watch::Sender<RefreshStatus>,
    entity_tx: watch::Sender<EntityConfig>,
    logger: StructuredLogger,
}

fn refresh_interval(entity: &EntityConfig) -> tokio::time::Interval {
    let period = Duration::from_secs(u64::from(entity.update_interval_hours.max(1)) * 3600);
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

impl EntityTask {
    async fn run(mut self, mut commands_rx: mpsc::UnboundedReceiver<CoordinatorCommand>) {
        self.logger.info(&format!(
            "Coordinator started (interval_hours={}, year={})",
            self.entity.update_interval_hours, self.entity.year
        ));
        let mut ticker = refresh_interval(&self.entity);
        let mut run_now = true;

        loop {
            if !run_now {
                tokio::select! {
                    _ = ticker.tick() => {}
                    cmd = commands_rx.recv() => match cmd {
                        Some(CoordinatorCommand::RefreshNow) => {}
                        Some(CoordinatorCommand::Reconfigure(entity)) => {
                            self.apply_config(entity);
                            ticker = refresh_interval(&self.entity);
                        }
                        Some(CoordinatorCommand::Shutdown) | None => break,
                    }
                }
            }
            let started_generation = self.generation;
            let (end, follow_up) = self.run_cycle(&mut commands_rx).await;
            run_now = follow_up;
            match end {
                CycleEnd::Completed(outcome) if started_generation == self.generation => {
                    self.publish(outcome);
                }
                CycleEnd::Completed(_) => {
                    self.logger.debug("Discarded result of a superseded cycle");
                }
                CycleEnd::Reconfigured(entity) => {
                    self.apply_config(entity);
                    ticker = refresh_interval(&self.entity);
                    run_now = true;
                }
                CycleEnd::Shutdown => break,
            }
        }

        self.logger.info("Coordinator stopped");
    }

    /// Run one cycle while still listening for commands
    async fn run_cycle(
        &mut self,
        commands_rx: &mut mpsc::UnboundedReceiver<CoordinatorCommand>,
    ) -> (CycleEnd, bool) {
        self.status_tx.send_modify(|s| s.begin(Utc::now()));
        let mut follow_up = false;

        let cycle = run_with_retry(
            &self.pipeline,
            &self.entity,
            &self.retry,
            &mut self.schema_cache,
            &self.logger,
        );
        tokio::pin!(cycle);

        let end = loop {
            tokio::select! {
                outcome = &mut cycle => break CycleEnd::Completed(outcome),
                cmd = commands_rx.recv() => match cmd {
                    Some(CoordinatorCommand::RefreshNow) => follow_up = true,
                    Some(CoordinatorCommand::Reconfigure(entity)) => break CycleEnd::Reconfigured(entity),
                    Some(CoordinatorCommand::Shutdown) | None => break CycleEnd::Shutdown,
                }
            }
        };
        (end, follow_up)
    }

    fn publish(&mut self, outcome: Result<TariffResult>) {
        let now = Utc::now();
        match outcome {
            Ok(result) => {
                self.logger.info(&format!(
                    "Refresh succeeded (components={}, observations={})",
                    result.components.len(),
                    result.raw_observation_ids.len()
                ));
                self.snapshot_tx.send_replace(Some(Arc::new(result)));
                self.status_tx.send_modify(|s| s.succeed(now));
            }
            Err(e) if e.is_no_data() => {
                self.logger.info(&format!("{}; caching empty result", e));
                let empty = TariffResult::empty(municipality_of(&self.entity), self.entity.year, now);
                self.snapshot_tx.send_replace(Some(Arc::new(empty)));
                self.status_tx.send_modify(|s| s.succeed(now));
            }
            Err(e) => {
                let cached = self.snapshot_tx.borrow().is_some();
                self.logger.warn(&format!(
                    "Refresh failed (kind={}, stale_cache={}): {}",
                    e.kind(),
                    cached,
                    e
                ));
                self.status_tx.send_modify(|s| s.fail(&e));
            }
        }
    }

    fn apply_config(&mut self, entity: EntityConfig) {
        self.logger.info(&format!(
            "Reconfigured (year={}, interval_hours={})",
            entity.year, entity.update_interval_hours
        ));
        self.generation += 1;
        self.entity = entity.clone();
        self.schema_cache = None;
        self.snapshot_tx.send_replace(None);
        let generation = self.generation;
        self.status_tx.send_modify(|s| s.reset(generation));
        self.entity_tx.send_replace(entity);
    }
}

/// Retry transport failures with doubling backoff, fail fast on anything else
async fn run_with_retry(
    pipeline: &TariffPipeline,
    entity: &EntityConfig,
    retry: &RefreshConfig,
    cache: &mut Option<SchemaCache>,
    logger: &StructuredLogger,
) -> Result<TariffResult> {
    let mut attempt = 0;
    let mut backoff = Duration::from_millis(retry.retry_backoff_ms);
    loop {
        match pipeline.run(entity, cache).await {
            Err(e) if e.is_transport() && attempt < retry.max_retries => {
                attempt += 1;
                logger.warn(&format!(
                    "Transport failure (attempt {}/{}), retrying in {:?}: {}",
                    attempt, retry.max_retries, backoff, e
                ));
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
            outcome => return outcome,
        }
    }
}
