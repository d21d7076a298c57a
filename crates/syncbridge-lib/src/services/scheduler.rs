// Sync Scheduler
// Per-integration timers plus a coarse tick, with an atomic guard so a single
// integration never runs twice at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::models::{Integration, SyncReport};
use crate::repositories::{Store, SyncOutcome};
use crate::services::activity::ActivityLogger;
use crate::services::connectors::{ConnectorResult, IntegrationExecutor};

/// Scheduler timing knobs
#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    pub tick_interval: Duration,
    /// Used for `next_sync` when an integration has no interval
    pub default_interval_secs: i64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            default_interval_secs: 300,
        }
    }
}

/// Outcome of the most recent execution of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastRun {
    pub success: bool,
    pub items_processed: usize,
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// Snapshot of a registered run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    pub is_running: bool,
    pub next_sync: DateTime<Utc>,
    pub last_result: Option<LastRun>,
}

/// In-memory scheduling state for one integration
struct SyncRun {
    integration: Integration,
    is_running: Arc<AtomicBool>,
    next_sync: DateTime<Utc>,
    last_result: Option<LastRun>,
    timer: Option<JoinHandle<()>>,
    /// Created by a manual sync of an unscheduled integration
    transient: bool,
}

impl SyncRun {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Clears `is_running` when an execution ends, however it ends
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct Inner {
    store: Arc<dyn Store>,
    executor: IntegrationExecutor,
    activity: ActivityLogger,
    settings: SchedulerSettings,
    runs: RwLock<HashMap<String, SyncRun>>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    tick_task: Mutex<Option<JoinHandle<()>>>,
}

/// Cheap to clone; clones share state
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn Store>,
        executor: IntegrationExecutor,
        activity: ActivityLogger,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                executor,
                activity,
                settings,
                runs: RwLock::new(HashMap::new()),
                shutdown_tx: Mutex::new(None),
                tick_task: Mutex::new(None),
            }),
        }
    }

    /// Spawn the tick loop. Calling it twice keeps the first loop.
    pub async fn init(&self) {
        let mut task = self.inner.tick_task.lock().await;
        if task.is_some() {
            log::debug!("[scheduler] Already initialized");
            return;
        }

        let (tx, mut rx) = oneshot::channel::<()>();
        *self.inner.shutdown_tx.lock().await = Some(tx);

        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.settings.tick_interval;
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut rx => break,
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        Scheduler { inner }.tick().await;
                    }
                }
            }
            log::info!("[scheduler] Tick loop stopped");
        }));

        log::info!(
            "[scheduler] Initialized with {}s tick",
            self.inner.settings.tick_interval.as_secs()
        );
    }

    /// Stop the tick loop and every timer. In-flight executions finish.
    pub async fn shutdown(&self) {
        if let Some(tx) = self.inner.shutdown_tx.lock().await.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.inner.tick_task.lock().await.take() {
            let _ = task.await;
        }

        let mut runs = self.inner.runs.write().await;
        for run in runs.values_mut() {
            run.cancel_timer();
        }
        runs.clear();
        log::info!("[scheduler] Shut down");
    }

    /// Register an integration, replacing any earlier registration for the same id
    pub async fn start(&self, integration: Integration) -> DateTime<Utc> {
        let id = integration.id.clone();
        let interval = integration
            .sync_interval_secs
            .unwrap_or(self.inner.settings.default_interval_secs)
            .max(0);
        let next_sync = Utc::now() + chrono::Duration::seconds(interval);

        let timer = integration
            .poll_interval()
            .map(|secs| self.spawn_timer(id.clone(), Duration::from_secs(secs as u64)));

        let mut runs = self.inner.runs.write().await;
        // Keep the old flag so a restart cannot overlap an in-flight execution
        let is_running = match runs.remove(&id) {
            Some(mut previous) => {
                previous.cancel_timer();
                previous.is_running
            }
            None => Arc::new(AtomicBool::new(false)),
        };
        runs.insert(
            id.clone(),
            SyncRun {
                integration,
                is_running,
                next_sync,
                last_result: None,
                timer,
                transient: false,
            },
        );

        log::info!("[scheduler] Started {} (next sync {})", id, next_sync.to_rfc3339());
        next_sync
    }

    /// Unregister an integration. Unknown ids are ignored.
    pub async fn stop(&self, id: &str) {
        if let Some(mut run) = self.inner.runs.write().await.remove(id) {
            run.cancel_timer();
            log::info!("[scheduler] Stopped {}", id);
        }
    }

    /// Execute immediately, ignoring `next_sync`.
    ///
    /// Returns `None` when an execution for the same integration is already running.
    pub async fn manual_sync(&self, integration: Integration) -> Option<ConnectorResult<SyncReport>> {
        let id = integration.id.clone();
        {
            let mut runs = self.inner.runs.write().await;
            runs.entry(id.clone()).or_insert_with(|| SyncRun {
                next_sync: Utc::now(),
                integration,
                is_running: Arc::new(AtomicBool::new(false)),
                last_result: None,
                timer: None,
                transient: true,
            });
        }

        let result = self.execute(&id).await;

        let mut runs = self.inner.runs.write().await;
        let finished_transient = runs
            .get(&id)
            .is_some_and(|run| run.transient && !run.is_running.load(Ordering::SeqCst));
        if finished_transient {
            runs.remove(&id);
        }
        result
    }

    /// Execute every due run that has a positive interval
    pub async fn tick(&self) {
        let now = Utc::now();
        let due: Vec<String> = {
            let runs = self.inner.runs.read().await;
            runs.iter()
                .filter(|(_, run)| {
                    !run.transient
                        && run.integration.poll_interval().is_some()
                        && !run.is_running.load(Ordering::SeqCst)
                        && now >= run.next_sync
                })
                .map(|(id, _)| id.clone())
                .collect()
        };

        for id in due {
            let scheduler = self.clone();
            tokio::spawn(async move {
                scheduler.execute(&id).await;
            });
        }
    }

    pub async fn status(&self, id: &str) -> Option<RunStatus> {
        self.inner.runs.read().await.get(id).map(|run| RunStatus {
            is_running: run.is_running.load(Ordering::SeqCst),
            next_sync: run.next_sync,
            last_result: run.last_result.clone(),
        })
    }

    pub async fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .inner
            .runs
            .read()
            .await
            .iter()
            .filter(|(_, run)| !run.transient)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn spawn_timer(&self, id: String, period: Duration) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                let scheduler = Scheduler { inner };
                let id = id.clone();
                // Detached so stop() never aborts a running execution
                tokio::spawn(async move {
                    scheduler.execute(&id).await;
                });
            }
        })
    }

    async fn execute(&self, id: &str) -> Option<ConnectorResult<SyncReport>> {
        let (flag, cached) = {
            let runs = self.inner.runs.read().await;
            let run = runs.get(id)?;
            (run.is_running.clone(), run.integration.clone())
        };

        if flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("[scheduler] Skipping {}: already running", id);
            return None;
        }
        let _guard = RunningGuard(flag);

        let integration = match self.inner.store.get_integration(id).await {
            Ok(Some(fresh)) => fresh,
            Ok(None) => cached,
            Err(e) => {
                log::warn!("[scheduler] Using cached integration {}: {}", id, e);
                cached
            }
        };

        let started = Instant::now();
        let result = self.inner.executor.execute(&integration).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        let completed_at = Utc::now();

        match &result {
            Ok(report) => log::info!(
                "[scheduler] Synced {} ({} items, {} delivered, {}ms)",
                id,
                report.items_processed,
                report.delivered,
                duration_ms
            ),
            Err(e) => log::error!("[scheduler] Sync failed for {}: {} ({})", id, e, e.code()),
        }

        // Interval comes from the stored row so edits made mid-run apply
        let interval = match self.inner.store.get_integration(id).await {
            Ok(Some(fresh)) => fresh.sync_interval_secs,
            _ => integration.sync_interval_secs,
        };
        let outcome = SyncOutcome {
            completed_at,
            next_sync_at: interval.map(|secs| completed_at + chrono::Duration::seconds(secs.max(0))),
            error: result.as_ref().err().map(|e| e.to_string()),
        };
        match self.inner.store.record_sync(id, &outcome).await {
            Ok(true) => {}
            Ok(false) => log::debug!("[scheduler] Integration {} was deleted during sync", id),
            Err(e) => log::error!("[scheduler] Failed to record sync for {}: {}", id, e),
        }

        let logged = result
            .as_ref()
            .map(|report| {
                serde_json::json!({
                    "itemsProcessed": report.items_processed,
                    "delivered": report.delivered,
                })
            })
            .map_err(|e| e.to_string());
        self.inner
            .activity
            .log_sync(&integration, duration_ms, logged)
            .await;

        let next_sync = completed_at
            + chrono::Duration::seconds(
                interval
                    .unwrap_or(self.inner.settings.default_interval_secs)
                    .max(0),
            );
        if let Some(run) = self.inner.runs.write().await.get_mut(id) {
            run.next_sync = next_sync;
            run.last_result = Some(LastRun {
                success: result.is_ok(),
                items_processed: result.as_ref().map(|r| r.items_processed).unwrap_or(0),
                error: outcome.error.clone(),
                completed_at,
            });
        }

        Some(result)
    }
}
