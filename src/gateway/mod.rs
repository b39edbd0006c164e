//! The single serialized, rate-limited, retrying mediator over the
//! backend (spec §4.1). Every other layer talks to the backend only
//! through this.

pub mod backend;
pub mod google;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{trace, warn};

use self::backend::{BackendError, SheetBackend};
use crate::error::GatewayError;
use crate::schema::SheetKind;

const MAX_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(32);
const JITTER_CAP_MAX: Duration = Duration::from_secs(2);

struct Throttle {
    base_interval: Duration,
    last_call: Option<Instant>,
}

pub struct Gateway {
    backend: Mutex<Box<dyn SheetBackend>>,
    throttle: Mutex<Throttle>,
    /// Opportunistically refreshed by the Worker Registry (spec §4.3);
    /// read here without going back through the backend, avoiding a
    /// recursive rate-limit calculation.
    active_workers: AtomicUsize,
}

impl Gateway {
    pub fn new(backend: Box<dyn SheetBackend>, base_interval: Duration) -> Self {
        Gateway {
            backend: Mutex::new(backend),
            throttle: Mutex::new(Throttle {
                base_interval,
                last_call: None,
            }),
            active_workers: AtomicUsize::new(1),
        }
    }

    pub fn set_active_workers(&self, n: usize) {
        self.active_workers.store(n.max(1), Ordering::Relaxed);
    }

    fn jitter_cap(&self) -> Duration {
        let active = self.active_workers.load(Ordering::Relaxed);
        let secs = 0.5 * ((active.saturating_sub(1)) as f64);
        Duration::from_secs_f64(secs).min(JITTER_CAP_MAX)
    }

    /// Block until at least `base_interval + jitter` has elapsed since the
    /// previous call completed.
    fn wait_for_slot(&self) {
        let base_interval = {
            let t = self.throttle.lock().unwrap();
            t.base_interval
        };
        let jitter = {
            let cap = self.jitter_cap();
            if cap.is_zero() {
                Duration::ZERO
            } else {
                let millis = rand::thread_rng().gen_range(0..=cap.as_millis() as u64);
                Duration::from_millis(millis)
            }
        };
        let target_gap = base_interval + jitter;

        let sleep_for = {
            let t = self.throttle.lock().unwrap();
            match t.last_call {
                Some(prev) => target_gap.saturating_sub(prev.elapsed()),
                None => Duration::ZERO,
            }
        };
        if !sleep_for.is_zero() {
            std::thread::sleep(sleep_for);
        }
        let mut t = self.throttle.lock().unwrap();
        t.last_call = Some(Instant::now());
    }

    fn call<T>(
        &self,
        op: &str,
        sheet: SheetKind,
        mut f: impl FnMut(&mut dyn SheetBackend) -> Result<T, BackendError>,
    ) -> Result<T, GatewayError> {
        let mut backoff = INITIAL_BACKOFF;
        for attempt in 1..=MAX_ATTEMPTS {
            self.wait_for_slot();
            let result = {
                let mut backend = self.backend.lock().unwrap();
                f(&mut **backend)
            };
            match result {
                Ok(v) => {
                    trace!(op, sheet = sheet.sheet_name(), attempt, "gateway call ok");
                    return Ok(v);
                }
                Err(BackendError::Permanent(kind, message)) => {
                    return Err(GatewayError::permanent(kind, message));
                }
                Err(BackendError::Transient(message)) => {
                    warn!(
                        op,
                        sheet = sheet.sheet_name(),
                        attempt,
                        error = %message,
                        "transient backend error, retrying"
                    );
                    if attempt == MAX_ATTEMPTS {
                        return Err(GatewayError::TransientExhausted);
                    }
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
        unreachable!("loop always returns within MAX_ATTEMPTS")
    }

    pub fn read_all(&self, sheet: SheetKind) -> Result<Vec<Vec<String>>, GatewayError> {
        self.call("read_all", sheet, |b| b.read_all(sheet.sheet_name()))
    }

    pub fn append(&self, sheet: SheetKind, row: Vec<String>) -> Result<(), GatewayError> {
        self.call("append", sheet, |b| b.append(sheet.sheet_name(), &row))
    }

    pub fn update_row(
        &self,
        sheet: SheetKind,
        index: usize,
        row: Vec<String>,
    ) -> Result<(), GatewayError> {
        self.call("update_row", sheet, |b| {
            b.update_row(sheet.sheet_name(), index, &row)
        })
    }

    pub fn delete_row(&self, sheet: SheetKind, index: usize) -> Result<(), GatewayError> {
        self.call("delete_row", sheet, |b| {
            b.delete_row(sheet.sheet_name(), index)
        })
    }

    /// Auto-initialize header rows on empty sheets (spec §4.2). Called
    /// once at startup for every sheet kind.
    pub fn ensure_headers(&self) -> Result<(), GatewayError> {
        for kind in SheetKind::ALL {
            let rows = self.read_all(kind)?;
            if rows.is_empty() {
                let header: Vec<String> = kind.header().into_iter().map(String::from).collect();
                self.append(kind, header)?;
            }
        }
        Ok(())
    }
}
