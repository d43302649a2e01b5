//! Scheduler manager and inference firing.
//!
//! A scheduler binds a deployed version to a recurring inference run. Each
//! firing claims a history record (the oldest `PENDING` one, or a fresh one),
//! commits it as `RUNNING`, and finishes it on a background task once the
//! predictor answers. A scheduler with an execution in flight is skipped, so
//! runs of one scheduler never overlap.

use crate::cancel::CancellationToken;
use crate::config::SchedulerConfig;
use crate::error::{MaioError, Result};
use crate::external::{DatasourceProvider, PredictionRequest, Predictor};
use crate::models::{NewScheduler, Scheduler, TaskStatus, VersionStatus};
use crate::store::{self, time, Store};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct SchedulerManager {
    store: Store,
    datasources: Arc<dyn DatasourceProvider>,
    predictor: Arc<dyn Predictor>,
    default_user_id: i64,
    /// Executions in flight, keyed by history record id.
    running: Arc<Mutex<HashMap<i64, JoinHandle<()>>>>,
}

/// Failure reason given to executions cut off by a restart.
const INTERRUPTED_REASON: &str = "interrupted: the service stopped before the run finished";

/// A history record claimed for execution.
struct Claim {
    scheduler: Scheduler,
    history_id: i64,
    endpoint_ref: String,
}

impl SchedulerManager {
    pub fn new(
        store: Store,
        datasources: Arc<dyn DatasourceProvider>,
        predictor: Arc<dyn Predictor>,
        default_user_id: i64,
    ) -> Self {
        Self {
            store,
            datasources,
            predictor,
            default_user_id,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create an enabled scheduler for a deployed version.
    ///
    /// The scheduler starts with exactly one `PENDING` history record.
    pub async fn create(&self, input: NewScheduler) -> Result<Scheduler> {
        if input.interval_seconds < 0 {
            return Err(MaioError::validation(
                "intervalSeconds",
                "must be zero (run once) or positive",
            ));
        }
        self.store
            .read(|conn| require_deployed(conn, input.version_id))?;
        match self.datasources.get_datasource(input.datasource_id).await? {
            Some(_) => {}
            None => return Err(MaioError::not_found("datasource", input.datasource_id)),
        }

        let created_by = input.created_by.unwrap_or(self.default_user_id);
        let scheduler = self.store.write(|tx| {
            require_deployed(tx, input.version_id)?;
            let now = time::now();
            let mut scheduler = Scheduler {
                id: 0,
                version_id: input.version_id,
                datasource_id: input.datasource_id,
                start_time: input.start_time,
                interval_seconds: input.interval_seconds,
                enabled: true,
                last_fired_at: None,
                created_by,
                created_at: now,
            };
            scheduler.id = store::schedulers::insert(tx, &scheduler)?;
            store::history::append(tx, scheduler.id, TaskStatus::Pending, created_by, &now)?;
            Ok(scheduler)
        })?;

        info!(
            "Created scheduler {} for version {} every {}s",
            scheduler.id, scheduler.version_id, scheduler.interval_seconds
        );
        Ok(scheduler)
    }

    pub fn get(&self, id: i64) -> Result<Scheduler> {
        self.store.read(|conn| load(conn, id))
    }

    pub fn list_by_version(&self, version_id: i64) -> Result<Vec<Scheduler>> {
        self.store.read(|conn| {
            if store::versions::get(conn, version_id)?.is_none() {
                return Err(MaioError::not_found("model version", version_id));
            }
            store::schedulers::list_by_version(conn, version_id)
        })
    }

    /// Delete a scheduler together with its history.
    pub fn delete(&self, id: i64) -> Result<()> {
        self.store.write(|tx| {
            load(tx, id)?;
            store::schedulers::delete(tx, id)?;
            Ok(())
        })?;
        info!("Deleted scheduler {}", id);
        Ok(())
    }

    /// Enable or disable a scheduler. Enabling requires a deployed version.
    pub fn set_enabled(&self, id: i64, enabled: bool) -> Result<Scheduler> {
        let scheduler = self.store.write(|tx| {
            let mut scheduler = load(tx, id)?;
            if enabled {
                require_deployed(tx, scheduler.version_id)?;
            }
            store::schedulers::set_enabled(tx, id, enabled)?;
            scheduler.enabled = enabled;
            Ok(scheduler)
        })?;
        info!(
            "Scheduler {} {}",
            id,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(scheduler)
    }

    /// Fail executions left preparing or running by a previous process.
    ///
    /// Their tasks died with that process, and a scheduler with a record in
    /// flight never fires again. Call before the first [`Self::fire_due`].
    pub fn recover_interrupted(&self) -> Result<usize> {
        let recovered = self.store.write(|tx| {
            store::history::fail_in_flight(tx, INTERRUPTED_REASON, &time::now())
        })?;
        if recovered > 0 {
            warn!(
                "Marked {} interrupted execution(s) as {}",
                recovered,
                TaskStatus::Failed
            );
        }
        Ok(recovered)
    }

    /// Start an execution for every scheduler that is due at `now`.
    ///
    /// Returns the ids of the history records that were started. Failures of
    /// individual schedulers are logged and do not stop the others.
    pub async fn fire_due(&self, now: DateTime<Utc>) -> Result<Vec<i64>> {
        let candidates = self.store.read(store::schedulers::list_enabled)?;
        let mut started = Vec::new();

        for candidate in candidates.into_iter().filter(|s| s.is_due(now)) {
            match self.claim(candidate.id, now) {
                Ok(Some(claim)) => {
                    let history_id = claim.history_id;
                    let this = self.clone();
                    let handle = tokio::spawn(async move {
                        this.execute(claim, now).await;
                    });
                    if let Ok(mut running) = self.running.lock() {
                        running.retain(|_, task| !task.is_finished());
                        running.insert(history_id, handle);
                    }
                    started.push(history_id);
                }
                Ok(None) => {}
                Err(e) => error!("Failed to fire scheduler {}: {}", candidate.id, e),
            }
        }

        if !started.is_empty() {
            debug!("Fired {} scheduler execution(s)", started.len());
        }
        Ok(started)
    }

    fn claim(&self, scheduler_id: i64, now: DateTime<Utc>) -> Result<Option<Claim>> {
        self.store.write(|tx| {
            let Some(scheduler) = store::schedulers::get(tx, scheduler_id)? else {
                return Ok(None);
            };
            if !scheduler.is_due(now) {
                return Ok(None);
            }
            let deployed = store::versions::get(tx, scheduler.version_id)?
                .is_some_and(|v| v.status == VersionStatus::Deployed);
            if !deployed {
                return Ok(None);
            }
            // Deployed but the provider has not answered yet.
            let Some(endpoint_ref) = store::deployments::get(tx, scheduler.version_id)?
                .and_then(|d| d.endpoint_ref)
            else {
                debug!(
                    "Version {} has no endpoint yet, scheduler {} waits",
                    scheduler.version_id, scheduler_id
                );
                return Ok(None);
            };
            if store::history::has_in_flight(tx, scheduler_id)? {
                debug!("Scheduler {} still running, skipping", scheduler_id);
                return Ok(None);
            }

            let history_id = match store::history::oldest_pending(tx, scheduler_id)? {
                Some(id) => id,
                None => store::history::append(
                    tx,
                    scheduler_id,
                    TaskStatus::Pending,
                    scheduler.created_by,
                    &now,
                )?,
            };
            store::history::mark_running(tx, history_id, &now)?;
            store::schedulers::set_last_fired(tx, scheduler_id, &now)?;

            Ok(Some(Claim {
                scheduler,
                history_id,
                endpoint_ref,
            }))
        })
    }

    async fn execute(&self, claim: Claim, started_at: DateTime<Utc>) {
        let scheduler = &claim.scheduler;
        let window_start = started_at - SchedulerConfig::inference_window();

        let result = async {
            let input = self
                .datasources
                .get_tag_entries(scheduler.datasource_id, window_start, started_at)
                .await?;
            self.predictor
                .invoke(&PredictionRequest {
                    version_id: scheduler.version_id,
                    endpoint_ref: Some(claim.endpoint_ref.clone()),
                    input,
                })
                .await
        }
        .await;

        let finished_at = time::now();
        let outcome = self.store.write(|tx| {
            let Some(mut record) = store::history::get(tx, claim.history_id)? else {
                return Ok(None);
            };
            record.end_execution = Some(finished_at);
            record.execution_duration_ms =
                Some((finished_at - started_at).num_milliseconds().max(0));
            match &result {
                Ok(prediction) => {
                    record.status = TaskStatus::Successful;
                    record.successful_run = true;
                    record.anomaly_detected = Some(prediction.anomaly_detected);
                    record.anomaly_count = Some(prediction.anomaly_count);
                }
                Err(e) => {
                    record.status = TaskStatus::Failed;
                    record.successful_run = false;
                    record.failure_reason = Some(e.to_string());
                }
            }
            store::history::save_outcome(tx, &record)?;
            Ok(Some(record))
        });

        match outcome {
            Ok(Some(record)) if record.status == TaskStatus::Successful => info!(
                "Scheduler {} run #{} succeeded ({} anomalies)",
                scheduler.id,
                record.counter,
                record.anomaly_count.unwrap_or(0)
            ),
            Ok(Some(record)) => warn!(
                "Scheduler {} run #{} failed: {}",
                scheduler.id,
                record.counter,
                record.failure_reason.as_deref().unwrap_or("unknown")
            ),
            Ok(None) => debug!(
                "History record {} removed before its run finished",
                claim.history_id
            ),
            Err(e) => error!(
                "Could not record outcome of history record {}: {}",
                claim.history_id, e
            ),
        }
    }

    /// Wait for every execution started so far.
    pub async fn join_running(&self) {
        let handles: Vec<(i64, JoinHandle<()>)> = match self.running.lock() {
            Ok(mut running) => running.drain().collect(),
            Err(_) => return,
        };
        let (ids, tasks): (Vec<i64>, Vec<JoinHandle<()>>) = handles.into_iter().unzip();
        for (history_id, outcome) in ids.into_iter().zip(join_all(tasks).await) {
            if let Err(e) = outcome {
                error!("Execution task for history record {} panicked: {}", history_id, e);
            }
        }
    }

    /// Call [`Self::fire_due`] every `period` until `cancel` fires, then wait
    /// for executions in flight.
    pub async fn run_ticker(&self, period: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Scheduler ticker started ({:?} period)", period);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.fire_due(time::now()).await {
                        error!("Scheduler tick failed: {}", e);
                    }
                }
            }
        }

        self.join_running().await;
        info!("Scheduler ticker stopped");
    }

    /// Records of a scheduler in creation order; used by tests.
    #[cfg(test)]
    fn history(&self, scheduler_id: i64) -> Vec<crate::models::SchedulerHistory> {
        self.store
            .read(|conn| store::history::page_after(conn, scheduler_id, None, usize::MAX))
            .unwrap()
    }
}

fn load(conn: &Connection, id: i64) -> Result<Scheduler> {
    store::schedulers::get(conn, id)?.ok_or_else(|| MaioError::not_found("scheduler", id))
}

fn require_deployed(conn: &Connection, version_id: i64) -> Result<()> {
    let version = store::versions::get(conn, version_id)?
        .ok_or_else(|| MaioError::not_found("model version", version_id))?;
    if version.status != VersionStatus::Deployed {
        return Err(MaioError::VersionNotDeployed {
            version_id,
            status: version.status,
        });
    }
    Ok(())
}
