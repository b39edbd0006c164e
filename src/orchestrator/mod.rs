//! The Pipeline Orchestrator (spec §4.5): claim protocol, settle,
//! dedup, and source fan-out are implemented in sibling modules; this
//! module wires them into the worker's programmatic surface and main
//! loop.

mod claim;
mod dedup;
mod settle;
mod source;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use self::claim::{claim_one, ClaimColumns};
use self::settle::settle;
use crate::callback::Callback;
use crate::config::Config;
use crate::election::LeaderElection;
use crate::error::OrchestratorError;
use crate::extractor::Extractor;
use crate::gateway::Gateway;
use crate::model::{RowStatus, Task};
use crate::registry::WorkerRegistry;
use crate::schema::{self, SheetKind};
use crate::signal::CancellationToken;

const SOURCE_ELECTION_NAME: &str = "source_processor";

const TASK_COLS: ClaimColumns = ClaimColumns {
    status: 8,
    assigned_worker: 9,
    claimed_at: 6,
};

pub struct Orchestrator<'g> {
    gateway: &'g Gateway,
    registry: WorkerRegistry<'g>,
    election: LeaderElection<'g>,
    worker_id: Uuid,
    claim_ttl: Duration,
    poll_interval: Duration,
}

impl<'g> Orchestrator<'g> {
    pub fn new(gateway: &'g Gateway, config: &Config) -> Result<Self, OrchestratorError> {
        let registry = WorkerRegistry::register(gateway, config.worker_name.clone(), config.active_window)?;
        let worker_id = registry.worker_id();
        let election = LeaderElection::new(gateway, worker_id, config.lease_ttl);
        gateway.set_active_workers(registry.active_workers()?);
        Ok(Orchestrator {
            gateway,
            registry,
            election,
            worker_id,
            claim_ttl: config.claim_ttl,
            poll_interval: config.poll_interval,
        })
    }

    pub fn worker_id(&self) -> Uuid {
        self.worker_id
    }

    /// Direct access to the election layer, mainly useful for tests that
    /// exercise lease acquisition/expiry independent of fan-out.
    pub fn election(&self) -> &LeaderElection<'g> {
        &self.election
    }

    /// One iteration of the task path (spec §6 programmatic surface).
    /// Returns `true` iff a Task was claimed and processed.
    pub fn process_next_task(&self, callback: &dyn Callback) -> Result<bool, OrchestratorError> {
        let Some((idx, row)) = claim_one(
            self.gateway,
            SheetKind::TasksPending,
            self.worker_id,
            self.claim_ttl,
            TASK_COLS,
        )?
        else {
            return Ok(false);
        };

        let mut task = schema::row_to_task(&row).unwrap_or_else(|| lenient_task_decode(&row, self.worker_id));

        match callback.call(&task.url) {
            Ok(()) => {
                task.status = RowStatus::Done;
                task.completed_at = Some(Utc::now());
                settle(
                    self.gateway,
                    SheetKind::TasksPending,
                    idx,
                    SheetKind::TasksHistory,
                    schema::task_to_row(&task, false),
                )?;
                self.registry.increment_tasks()?;
                info!(task_id = task.id, "task settled DONE");
            }
            Err(message) => {
                task.status = RowStatus::Failed;
                task.completed_at = Some(Utc::now());
                task.error = Some(message);
                settle(
                    self.gateway,
                    SheetKind::TasksPending,
                    idx,
                    SheetKind::TasksDlq,
                    schema::task_to_row(&task, true),
                )?;
                info!(task_id = task.id, "task settled FAILED");
            }
        }
        Ok(true)
    }

    /// One round of leader-only source processing (spec §4.5.4): attempts
    /// to acquire (or renew) the source-processor lease, and if won,
    /// claims and fully processes one Source. Returns `Ok(false)` if the
    /// lease wasn't acquired or there was nothing pending to claim.
    pub fn process_next_source(&self, extractor: &dyn Extractor) -> Result<bool, OrchestratorError> {
        if !self.election.acquire(SOURCE_ELECTION_NAME)? {
            return Ok(false);
        }
        match source::process_one_source(self.gateway, extractor, self.worker_id, self.claim_ttl)? {
            Some(true) => {
                self.registry.increment_sources()?;
                Ok(true)
            }
            Some(false) => Ok(true),
            None => Ok(false),
        }
    }

    pub fn send_heartbeat(&self) -> Result<(), OrchestratorError> {
        self.registry.send_heartbeat()?;
        Ok(())
    }

    /// Idempotent graceful release: mark this worker INACTIVE and
    /// release the source-processor lease if held (spec §4.3, §4.4, §5).
    pub fn shutdown(&self) -> Result<(), OrchestratorError> {
        self.election.release(SOURCE_ELECTION_NAME)?;
        self.registry.shutdown()?;
        Ok(())
    }

    /// The main worker loop (spec §4.5.5). Task work always takes
    /// priority over source fan-out; acquiring the source lease is
    /// attempted fresh every idle iteration, which also serves as the
    /// lease renewal while this worker remains the leader.
    pub fn run(
        &self,
        extractor: &dyn Extractor,
        callback: &dyn Callback,
        cancel: &Arc<CancellationToken>,
    ) -> Result<(), OrchestratorError> {
        while cancel.is_running() {
            self.send_heartbeat()?;
            self.gateway.set_active_workers(self.registry.active_workers()?);

            if self.process_next_task(callback)? {
                continue;
            }

            if self.process_next_source(extractor)? {
                continue;
            }

            std::thread::sleep(self.poll_interval);
        }
        self.shutdown()
    }
}

fn lenient_task_decode(row: &[String], worker_id: Uuid) -> Task {
    tracing::error!(row = ?row, "task row failed to decode cleanly after claim, settling with best-effort fields");
    Task {
        id: row.first().cloned().unwrap_or_default(),
        source_id: Uuid::nil(),
        url: row.get(2).cloned().unwrap_or_default(),
        name: row.get(3).cloned().unwrap_or_default(),
        duration: row.get(4).cloned().unwrap_or_default(),
        created_at: Utc::now(),
        claimed_at: Some(Utc::now()),
        completed_at: None,
        status: RowStatus::Claimed,
        assigned_worker: Some(worker_id),
        error: None,
    }
}
