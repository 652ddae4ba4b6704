//! Scheduler (spec §4.8, component C8): periodic triggering of ingestion
//! and generation, driven by a cron expression carried on each schedulable
//! entity (`StreamSource::schedule`, `EpgSource::schedule`,
//! `StreamProxy::schedule`).
//!
//! One loop polls due entities and pushes jobs onto a bounded queue; a
//! small worker pool drains it (spec §5 "the scheduler work queue is
//! bounded and refuses enqueue when full"). At most one job per owner may
//! be in flight at a time — a second trigger while the first runs is
//! coalesced, not queued twice.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use cron::Schedule;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::ingest::Ingestor;
use crate::models::{Id, OwnerKind, StreamProxy};
use crate::progress::{OperationProgress, ProgressBus};
use crate::repositories::{EpgSourceRepository, Repository, StreamProxyRepository, StreamSourceRepository};
use crate::services::GenerationService;

#[derive(Debug, Clone, Copy)]
enum Job {
    IngestStream(Id),
    IngestEpg(Id),
    GenerateProxy(Id),
}

impl Job {
    fn owner(&self) -> Id {
        match self {
            Job::IngestStream(id) | Job::IngestEpg(id) | Job::GenerateProxy(id) => *id,
        }
    }
}

/// Shared bookkeeping the poll loop and the workers both touch: which
/// owners currently have a job in flight, and which owners are in a
/// post-failure backoff window (spec §4.8 "a backoff is applied before the
/// next attempt").
struct SchedulerState {
    in_flight: Mutex<HashSet<Id>>,
    backoff_until: Mutex<HashMap<Id, Instant>>,
}

impl SchedulerState {
    fn new() -> Arc<Self> {
        Arc::new(Self { in_flight: Mutex::new(HashSet::new()), backoff_until: Mutex::new(HashMap::new()) })
    }

    async fn try_claim(&self, owner: Id) -> bool {
        if let Some(until) = self.backoff_until.lock().await.get(&owner) {
            if Instant::now() < *until {
                return false;
            }
        }
        self.in_flight.lock().await.insert(owner)
    }

    async fn release(&self, owner: Id, failed: bool, backoff: Duration) {
        self.in_flight.lock().await.remove(&owner);
        if failed {
            self.backoff_until.lock().await.insert(owner, Instant::now() + backoff);
        } else {
            self.backoff_until.lock().await.remove(&owner);
        }
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    stream_sources: Arc<dyn StreamSourceRepository>,
    epg_sources: Arc<dyn EpgSourceRepository>,
    proxies: Arc<dyn StreamProxyRepository>,
    ingestor: Arc<Ingestor>,
    generation: Arc<GenerationService>,
    progress: Arc<ProgressBus>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        stream_sources: Arc<dyn StreamSourceRepository>,
        epg_sources: Arc<dyn EpgSourceRepository>,
        proxies: Arc<dyn StreamProxyRepository>,
        ingestor: Arc<Ingestor>,
        generation: Arc<GenerationService>,
        progress: Arc<ProgressBus>,
    ) -> Self {
        Self { config, stream_sources, epg_sources, proxies, ingestor, generation, progress }
    }

    /// Spawns the poll loop and the worker pool; returns immediately. Both
    /// run until the process exits (spec's cancellation model binds this to
    /// process shutdown, not a per-operation token, since the scheduler
    /// itself never completes).
    pub fn spawn(self: Arc<Self>) {
        let (tx, rx) = mpsc::channel::<Job>(self.config.queue_capacity);
        let state = SchedulerState::new();
        let rx = Arc::new(Mutex::new(rx));

        for worker_id in 0..self.config.worker_count.max(1) {
            let scheduler = self.clone();
            let state = state.clone();
            let rx = rx.clone();
            tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else { break };
                    debug!(worker_id, ?job, "scheduler worker picked up job");
                    scheduler.run_job(job, &state).await;
                }
            });
        }

        let scheduler = self.clone();
        tokio::spawn(async move {
            loop {
                scheduler.poll_once(&tx, &state).await;
                tokio::time::sleep(scheduler.config.poll_interval).await;
            }
        });
    }

    async fn poll_once(&self, tx: &mpsc::Sender<Job>, state: &Arc<SchedulerState>) {
        if let Ok(sources) = self.stream_sources.list().await {
            for source in sources {
                if is_due(source.schedule.as_deref(), source.last_ingested_at) {
                    self.try_enqueue(tx, state, Job::IngestStream(source.id)).await;
                }
            }
        }
        if let Ok(sources) = self.epg_sources.list().await {
            for source in sources {
                if is_due(source.schedule.as_deref(), source.last_ingested_at) {
                    self.try_enqueue(tx, state, Job::IngestEpg(source.id)).await;
                }
            }
        }
        if let Ok(proxies) = self.proxies.list().await {
            for proxy in proxies {
                if is_due(proxy.schedule.as_deref(), proxy.last_generated_at) {
                    self.try_enqueue(tx, state, Job::GenerateProxy(proxy.id)).await;
                }
            }
        }
    }

    async fn try_enqueue(&self, tx: &mpsc::Sender<Job>, state: &Arc<SchedulerState>, job: Job) {
        let owner = job.owner();
        if !state.try_claim(owner).await {
            // Already in flight (or backing off); the next poll will retry.
            return;
        }
        if tx.try_send(job).is_err() {
            info!(owner_id = %owner, "scheduler queue full, job coalesced");
            state.in_flight.lock().await.remove(&owner);
        }
    }

    async fn run_job(&self, job: Job, state: &Arc<SchedulerState>) {
        let owner = job.owner();
        let result = match job {
            Job::IngestStream(id) => self.run_ingest_stream(id).await,
            Job::IngestEpg(id) => self.run_ingest_epg(id).await,
            Job::GenerateProxy(id) => self.run_generate_proxy(id).await.map(|()| 0),
        };

        if let Err(err) = &result {
            warn!(owner_id = %owner, error = %err, "scheduled job failed, backing off");
        }
        state.release(owner, result.is_err(), self.config.failure_backoff).await;
    }

    async fn run_ingest_stream(&self, id: Id) -> crate::errors::AppResult<usize> {
        let source = self.stream_sources.get(id).await?;
        let operation_id = self.progress.start_operation(id, OwnerKind::StreamSource, source.name.clone(), "ingest".to_string());
        let progress = OperationProgress::new(self.progress.clone(), operation_id);
        match self.ingestor.ingest_stream_source(id, &progress).await {
            Ok(count) => {
                self.progress.complete(operation_id);
                Ok(count)
            }
            Err(err) => {
                self.progress.fail(operation_id, err.to_string());
                Err(err)
            }
        }
    }

    async fn run_ingest_epg(&self, id: Id) -> crate::errors::AppResult<usize> {
        let source = self.epg_sources.get(id).await?;
        let operation_id = self.progress.start_operation(id, OwnerKind::EpgSource, source.name.clone(), "ingest".to_string());
        let progress = OperationProgress::new(self.progress.clone(), operation_id);
        match self.ingestor.ingest_epg_source(id, &progress).await {
            Ok(count) => {
                self.progress.complete(operation_id);
                Ok(count)
            }
            Err(err) => {
                self.progress.fail(operation_id, err.to_string());
                Err(err)
            }
        }
    }

    async fn run_generate_proxy(&self, id: Id) -> crate::errors::AppResult<()> {
        let proxy: StreamProxy = self.proxies.get(id).await?;
        let operation_id = self.progress.start_operation(id, OwnerKind::Proxy, proxy.name.clone(), "generate".to_string());
        let progress = OperationProgress::new(self.progress.clone(), operation_id);
        match self.generation.generate_proxy(id, &progress).await {
            Ok(()) => {
                self.progress.complete(operation_id);
                Ok(())
            }
            Err(err) => {
                self.progress.fail(operation_id, err.to_string());
                Err(err)
            }
        }
    }
}

/// Whether a cron-scheduled entity is due to run again. `None` schedule
/// means "on demand only" (spec §4.8 "may carry an interval or cron
/// expression"); a parse error is treated as never-due rather than panicking
/// since rejecting bad cron strings is the create-time validator's job.
fn is_due(schedule: Option<&str>, last_run: Option<chrono::DateTime<Utc>>) -> bool {
    let Some(schedule) = schedule else { return false };
    let Ok(parsed) = Schedule::from_str(schedule) else {
        warn!(schedule, "invalid cron expression on schedulable entity, skipping");
        return false;
    };

    let Some(last_run) = last_run else { return true };
    match parsed.after(&last_run).next() {
        Some(next_due) => next_due <= Utc::now(),
        None => false,
    }
}

/// Validates a cron expression at entity-create time so a typo surfaces as
/// a 400 immediately rather than silently never firing (spec §7 InputError).
pub fn validate_schedule(expression: &str) -> Result<(), String> {
    Schedule::from_str(expression).map(|_| ()).map_err(|e| format!("invalid cron expression: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_schedule_is_never_due() {
        assert!(!is_due(None, None));
    }

    #[test]
    fn unscheduled_entity_with_valid_cron_and_no_prior_run_is_due_immediately() {
        assert!(is_due(Some("0 * * * * *"), None));
    }

    #[test]
    fn invalid_cron_is_never_due() {
        assert!(!is_due(Some("not a cron"), None));
    }

    #[test]
    fn due_only_after_next_scheduled_tick_has_passed() {
        let last_run = Utc::now() - chrono::Duration::hours(1);
        assert!(is_due(Some("0 * * * * *"), Some(last_run)));

        let just_ran = Utc::now();
        assert!(!is_due(Some("0 0 0 1 1 * 2099"), Some(just_ran)));
    }
}
