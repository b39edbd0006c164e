//! Lease-based leader election over the Leader Election sheet (spec
//! §4.4). The backend has no compare-and-set, so every write is
//! confirmed by a jittered read-back.

use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tracing::warn;
use uuid::Uuid;

use crate::error::{ElectionError, GatewayError};
use crate::gateway::Gateway;
use crate::model::Lease;
use crate::schema::{self, SheetKind};

/// Base interval for the jittered read-back confirmation (spec §4.4):
/// actual wait is uniform in `[0.5*base, 1.5*base]`.
const READBACK_BASE: Duration = Duration::from_secs(2);

/// Assumed bound on clock skew between workers (spec §4.4).
const CLOCK_SKEW_BOUND: chrono::Duration = chrono::Duration::seconds(30);

pub struct LeaderElection<'g> {
    gateway: &'g Gateway,
    worker_id: Uuid,
    ttl: Duration,
}

fn jittered_wait(base: Duration) -> Duration {
    let lo = base.mul_f64(0.5).as_millis() as u64;
    let hi = base.mul_f64(1.5).as_millis() as u64;
    let millis = rand::thread_rng().gen_range(lo..=hi);
    Duration::from_millis(millis)
}

impl<'g> LeaderElection<'g> {
    pub fn new(gateway: &'g Gateway, worker_id: Uuid, ttl: Duration) -> Self {
        LeaderElection {
            gateway,
            worker_id,
            ttl,
        }
    }

    fn find_row(&self, election_name: &str) -> Result<Option<(usize, Lease)>, GatewayError> {
        let rows = self.gateway.read_all(SheetKind::LeaderElection)?;
        Ok(rows.iter().enumerate().skip(1).find_map(|(idx, row)| {
            schema::row_to_lease(row)
                .filter(|l| l.election_name == election_name)
                .map(|l| (idx, l))
        }))
    }

    /// Acquire or renew the named lease. Returns `Ok(true)` iff this
    /// worker holds it after the read-back confirms.
    pub fn acquire(&self, election_name: &str) -> Result<bool, ElectionError> {
        let now = Utc::now();
        match self.find_row(election_name)? {
            None => {
                let lease = Lease {
                    election_name: election_name.to_string(),
                    holder: self.worker_id,
                    expires_at: now + self.ttl,
                };
                self.gateway
                    .append(SheetKind::LeaderElection, schema::lease_to_row(&lease))?;
                self.confirm(election_name, &lease)
            }
            Some((idx, existing)) => {
                // Expired (strict: expires_at <= now is not valid, spec §8
                // boundary behavior), or we already hold it (renewal).
                if !existing.is_valid_at(now) || existing.holder == self.worker_id {
                    let lease = Lease {
                        election_name: election_name.to_string(),
                        holder: self.worker_id,
                        expires_at: now + self.ttl,
                    };
                    self.gateway
                        .update_row(SheetKind::LeaderElection, idx, schema::lease_to_row(&lease))?;
                    self.confirm(election_name, &lease)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Renewal is the acquire procedure with `holder == self` as the
    /// expected precondition (spec §4.4) — the same code path handles it.
    pub fn renew(&self, election_name: &str) -> Result<bool, ElectionError> {
        self.acquire(election_name)
    }

    fn confirm(&self, election_name: &str, written: &Lease) -> Result<bool, ElectionError> {
        std::thread::sleep(jittered_wait(READBACK_BASE));
        match self.find_row(election_name)? {
            Some((_, lease)) if lease.holder == self.worker_id => {
                // `drift` is positive when the freshly-read `expires_at` is
                // earlier than what we just wrote. A few milliseconds of
                // that is normal serialization jitter; more than the skew
                // bound means the clock moved under us between the write
                // and this read-back.
                let drift = written.expires_at - lease.expires_at;
                if drift > CLOCK_SKEW_BOUND {
                    warn!(
                        election_name,
                        drift_ms = drift.num_milliseconds(),
                        "possible clock warp detected on lease read-back"
                    );
                    return Ok(false);
                }
                Ok(true)
            }
            _ => Err(ElectionError::LostRace(election_name.to_string())),
        }
    }

    /// Release by backdating `expires_at`. Non-critical: a crashed
    /// holder's lease expires naturally (spec §4.4).
    pub fn release(&self, election_name: &str) -> Result<(), ElectionError> {
        if let Some((idx, existing)) = self.find_row(election_name)? {
            if existing.holder == self.worker_id {
                let released = Lease {
                    expires_at: Utc::now() - chrono::Duration::seconds(1),
                    ..existing
                };
                self.gateway.update_row(
                    SheetKind::LeaderElection,
                    idx,
                    schema::lease_to_row(&released),
                )?;
            }
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
    fn acquire_on_empty_sheet_succeeds() {
        let gateway = gw();
        let election = LeaderElection::new(&gateway, Uuid::new_v4(), Duration::from_secs(300));
        assert!(election.acquire("source_processor").unwrap());
    }

    #[test]
    fn second_worker_cannot_acquire_a_live_lease() {
        let gateway = gw();
        let w1 = Uuid::new_v4();
        let w2 = Uuid::new_v4();
        let e1 = LeaderElection::new(&gateway, w1, Duration::from_secs(300));
        let e2 = LeaderElection::new(&gateway, w2, Duration::from_secs(300));
        assert!(e1.acquire("source_processor").unwrap());
        assert!(!e2.acquire("source_processor").unwrap());
    }

    #[test]
    fn expired_lease_can_be_taken_over() {
        let gateway = gw();
        let w1 = Uuid::new_v4();
        let w2 = Uuid::new_v4();
        // Negative TTL: the lease we write is already expired.
        let e1 = LeaderElection::new(&gateway, w1, Duration::from_secs(0));
        assert!(e1.acquire("source_processor").unwrap());
        std::thread::sleep(Duration::from_millis(5));

        let e2 = LeaderElection::new(&gateway, w2, Duration::from_secs(300));
        assert!(e2.acquire("source_processor").unwrap());
    }

    #[test]
    fn holder_can_renew_its_own_lease() {
        let gateway = gw();
        let w1 = Uuid::new_v4();
        let election = LeaderElection::new(&gateway, w1, Duration::from_secs(300));
        assert!(election.acquire("source_processor").unwrap());
        assert!(election.renew("source_processor").unwrap());
    }

    #[test]
    fn clock_warp_drift_beyond_bound_fails_confirmation() {
        let gateway = gw();
        let w1 = Uuid::new_v4();
        let election = LeaderElection::new(&gateway, w1, Duration::from_secs(300));
        let written = Lease {
            election_name: "source_processor".to_string(),
            holder: w1,
            expires_at: Utc::now() + chrono::Duration::seconds(300),
        };
        gateway
            .append(SheetKind::LeaderElection, schema::lease_to_row(&written))
            .unwrap();

        // Simulate a read-back landing on a value far earlier than what was
        // just written, as if the clock jumped backward in between.
        let (idx, _) = election.find_row("source_processor").unwrap().unwrap();
        let warped = Lease {
            expires_at: written.expires_at - CLOCK_SKEW_BOUND - chrono::Duration::seconds(1),
            ..written.clone()
        };
        gateway
            .update_row(SheetKind::LeaderElection, idx, schema::lease_to_row(&warped))
            .unwrap();

        assert!(!election.confirm("source_processor", &written).unwrap());
    }

    #[test]
    fn release_allows_immediate_reacquisition_by_another_worker() {
        let gateway = gw();
        let w1 = Uuid::new_v4();
        let w2 = Uuid::new_v4();
        let e1 = LeaderElection::new(&gateway, w1, Duration::from_secs(300));
        let e2 = LeaderElection::new(&gateway, w2, Duration::from_secs(300));
        assert!(e1.acquire("source_processor").unwrap());
        e1.release("source_processor").unwrap();
        assert!(e2.acquire("source_processor").unwrap());
    }
}
