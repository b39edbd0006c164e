//! Worker Registry: this worker's identity row in the Workers sheet
//! (spec §4.3).

use std::cell::Cell;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::model::{Worker, WorkerStatus};
use crate::schema::{self, SheetKind};

/// How often `active_workers()` is allowed to actually hit the backend;
/// between refreshes it returns the cached count (spec §4.1/§4.3).
const ACTIVE_COUNT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

pub struct WorkerRegistry<'g> {
    gateway: &'g Gateway,
    worker_id: Uuid,
    worker_name: String,
    active_window: Duration,
    last_active_refresh: Cell<Option<Instant>>,
    last_active_count: Cell<usize>,
}

impl<'g> WorkerRegistry<'g> {
    /// Register or recover this worker's row (spec §4.3 Register/Recover).
    pub fn register(
        gateway: &'g Gateway,
        worker_name: impl Into<String>,
        active_window: Duration,
    ) -> Result<Self, GatewayError> {
        let worker_name = worker_name.into();
        let rows = gateway.read_all(SheetKind::Workers)?;
        let existing = rows
            .iter()
            .skip(1)
            .find_map(|row| schema::row_to_worker(row).filter(|w| w.worker_name == worker_name));

        let worker_id = match existing {
            Some(w) => {
                info!(worker_id = %w.worker_id, worker_name, "recovered existing worker row");
                w.worker_id
            }
            None => {
                let id = Uuid::new_v4();
                let worker = Worker {
                    worker_id: id,
                    worker_name: worker_name.clone(),
                    last_heartbeat: Utc::now(),
                    status: WorkerStatus::Active,
                    tasks_processed: 0,
                    sources_processed: 0,
                };
                gateway.append(SheetKind::Workers, schema::worker_to_row(&worker))?;
                info!(worker_id = %id, worker_name, "registered new worker row");
                id
            }
        };

        let registry = WorkerRegistry {
            gateway,
            worker_id,
            worker_name,
            active_window,
            last_active_refresh: Cell::new(None),
            last_active_count: Cell::new(1),
        };
        registry.send_heartbeat()?;
        Ok(registry)
    }

    pub fn worker_id(&self) -> Uuid {
        self.worker_id
    }

    fn find_own_row(&self) -> Result<Option<(usize, Worker)>, GatewayError> {
        let rows = self.gateway.read_all(SheetKind::Workers)?;
        Ok(rows.iter().enumerate().skip(1).find_map(|(idx, row)| {
            schema::row_to_worker(row)
                .filter(|w| w.worker_id == self.worker_id)
                .map(|w| (idx, w))
        }))
    }

    /// Write the current UTC time to this worker's own row (spec §4.3).
    pub fn send_heartbeat(&self) -> Result<(), GatewayError> {
        if let Some((idx, mut worker)) = self.find_own_row()? {
            worker.last_heartbeat = Utc::now();
            self.gateway
                .update_row(SheetKind::Workers, idx, schema::worker_to_row(&worker))?;
        }
        Ok(())
    }

    fn bump_counter(&self, sources: bool) -> Result<(), GatewayError> {
        if let Some((idx, mut worker)) = self.find_own_row()? {
            if sources {
                worker.sources_processed += 1;
            } else {
                worker.tasks_processed += 1;
            }
            self.gateway
                .update_row(SheetKind::Workers, idx, schema::worker_to_row(&worker))?;
        }
        Ok(())
    }

    pub fn increment_tasks(&self) -> Result<(), GatewayError> {
        self.bump_counter(false)
    }

    pub fn increment_sources(&self) -> Result<(), GatewayError> {
        self.bump_counter(true)
    }

    /// Number of ACTIVE workers with a heartbeat inside `active_window`,
    /// refreshed at most once per minute; also pushes the fresh count
    /// into the Gateway's rate-limit jitter sizing.
    pub fn active_workers(&self) -> Result<usize, GatewayError> {
        let needs_refresh = match self.last_active_refresh.get() {
            None => true,
            Some(t) => t.elapsed() >= ACTIVE_COUNT_REFRESH_INTERVAL,
        };
        if !needs_refresh {
            return Ok(self.last_active_count.get());
        }

        let rows = self.gateway.read_all(SheetKind::Workers)?;
        let now = Utc::now();
        let count = rows
            .iter()
            .skip(1)
            .filter_map(|row| schema::row_to_worker(row))
            .filter(|w| {
                w.status == WorkerStatus::Active
                    && now.signed_duration_since(w.last_heartbeat).num_milliseconds()
                        <= self.active_window.as_millis() as i64
            })
            .count();

        self.last_active_count.set(count);
        self.last_active_refresh.set(Some(Instant::now()));
        self.gateway.set_active_workers(count);
        Ok(count)
    }

    /// Graceful shutdown: mark INACTIVE and write a final heartbeat
    /// (spec §4.3, §5).
    pub fn shutdown(&self) -> Result<(), GatewayError> {
        if let Some((idx, mut worker)) = self.find_own_row()? {
            worker.status = WorkerStatus::Inactive;
            worker.last_heartbeat = Utc::now();
            self.gateway
                .update_row(SheetKind::Workers, idx, schema::worker_to_row(&worker))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::backend::MemoryBackend;

    fn gw() -> Gateway {
        let gateway = Gateway::new(Box::new(MemoryBackend::new()), Duration::from_millis(0));
        gateway.ensure_headers().unwrap();
        gateway
    }

    #[test]
    fn register_then_recover_same_row_by_name() {
        let gateway = gw();
        let r1 = WorkerRegistry::register(&gateway, "alpha", Duration::from_secs(120)).unwrap();
        let id1 = r1.worker_id();
        drop(r1);

        let r2 = WorkerRegistry::register(&gateway, "alpha", Duration::from_secs(120)).unwrap();
        assert_eq!(r2.worker_id(), id1);

        let rows = gateway.read_all(SheetKind::Workers).unwrap();
        // header + exactly one worker row, never duplicated.
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn heartbeat_is_monotonic() {
        let gateway = gw();
        let r = WorkerRegistry::register(&gateway, "alpha", Duration::from_secs(120)).unwrap();
        let (_, before) = r.find_own_row().unwrap().unwrap();
        r.send_heartbeat().unwrap();
        let (_, after) = r.find_own_row().unwrap().unwrap();
        assert!(after.last_heartbeat >= before.last_heartbeat);
    }

    #[test]
    fn active_workers_counts_fresh_active_rows_only() {
        let gateway = gw();
        let r1 = WorkerRegistry::register(&gateway, "alpha", Duration::from_secs(120)).unwrap();
        let _r2 = WorkerRegistry::register(&gateway, "beta", Duration::from_secs(120)).unwrap();
        assert_eq!(r1.active_workers().unwrap(), 2);

        // Simulate beta going stale by backdating its heartbeat far outside
        // the active window.
        let rows = gateway.read_all(SheetKind::Workers).unwrap();
        let (idx, mut beta) = rows
            .iter()
            .enumerate()
            .skip(1)
            .find_map(|(i, row)| {
                schema::row_to_worker(row)
                    .filter(|w| w.worker_name == "beta")
                    .map(|w| (i, w))
            })
            .unwrap();
        beta.last_heartbeat = Utc::now() - chrono::Duration::seconds(3600);
        gateway
            .update_row(SheetKind::Workers, idx, schema::worker_to_row(&beta))
            .unwrap();

        // Force a refresh by resetting the cache window.
        r1.last_active_refresh.set(None);
        assert_eq!(r1.active_workers().unwrap(), 1);
    }
}
