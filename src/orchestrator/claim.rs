//! The generic claim protocol (spec §4.5.1), shared verbatim by both
//! Source claiming (leader-only) and Task claiming (anyone). The
//! sheet's column layout differs between Sources and Tasks, so the
//! three columns this protocol touches are passed as indices rather
//! than baked into a single record type.

use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::model::RowStatus;
use crate::schema::SheetKind;

/// Base for the claim read-back wait: uniform in `[0.5s, 1.5s]` (spec
/// §4.5.1 — a different, smaller base than lease read-back's 2s).
const READBACK_BASE: Duration = Duration::from_secs(1);

fn jittered_wait(base: Duration) -> Duration {
    let lo = base.mul_f64(0.5).as_millis() as u64;
    let hi = base.mul_f64(1.5).as_millis() as u64;
    let millis = rand::thread_rng().gen_range(lo..=hi);
    Duration::from_millis(millis)
}

fn ensure_len(row: &mut Vec<String>, len: usize) {
    while row.len() < len {
        row.push(String::new());
    }
}

fn is_stale(row: &[String], claimed_at_idx: usize, claim_ttl: Duration, now: chrono::DateTime<Utc>) -> bool {
    let Some(cell) = row.get(claimed_at_idx) else {
        return false;
    };
    let Ok(claimed_at) = chrono::DateTime::parse_from_rfc3339(cell) else {
        return false;
    };
    let age = now.signed_duration_since(claimed_at.with_timezone(&Utc));
    age > chrono::Duration::from_std(claim_ttl).unwrap_or(chrono::Duration::zero())
}

/// Column indices this protocol needs within a sheet's row layout.
#[derive(Debug, Clone, Copy)]
pub struct ClaimColumns {
    pub status: usize,
    pub assigned_worker: usize,
    pub claimed_at: usize,
}

/// Attempt to claim exactly one row from `sheet`: PENDING-and-unassigned
/// rows, and CLAIMED rows whose `claimed_at` has aged past `claim_ttl`
/// (stale-claim recovery, spec §7), are both eligible candidates, tried
/// in sheet order. Returns the winning row's index and full content, or
/// `None` if nothing could be claimed.
pub fn claim_one(
    gateway: &Gateway,
    sheet: SheetKind,
    worker_id: Uuid,
    claim_ttl: Duration,
    cols: ClaimColumns,
) -> Result<Option<(usize, Vec<String>)>, GatewayError> {
    let now = Utc::now();
    let rows = gateway.read_all(sheet)?;

    for (idx, row) in rows.iter().enumerate().skip(1) {
        let status = row.get(cols.status).map(String::as_str).unwrap_or("");
        let assigned = row.get(cols.assigned_worker).map(String::as_str).unwrap_or("");

        let is_pending = status == RowStatus::Pending.as_str() && assigned.is_empty();
        let is_stale_claim =
            status == RowStatus::Claimed.as_str() && is_stale(row, cols.claimed_at, claim_ttl, now);
        if !is_pending && !is_stale_claim {
            continue;
        }

        let mut candidate = row.clone();
        let min_len = [cols.status, cols.assigned_worker, cols.claimed_at]
            .into_iter()
            .max()
            .unwrap()
            + 1;
        ensure_len(&mut candidate, min_len);
        candidate[cols.status] = RowStatus::Claimed.as_str().to_string();
        candidate[cols.assigned_worker] = worker_id.to_string();
        candidate[cols.claimed_at] = now.to_rfc3339();

        gateway.update_row(sheet, idx, candidate)?;
        std::thread::sleep(jittered_wait(READBACK_BASE));

        let rows_after = gateway.read_all(sheet)?;
        if let Some(confirmed) = rows_after.get(idx) {
            if confirmed.get(cols.assigned_worker).map(String::as_str) == Some(worker_id.to_string().as_str())
            {
                return Ok(Some((idx, confirmed.clone())));
            }
        }
        // Lost the read-back race; try the next candidate.
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::backend::MemoryBackend;

    const TASK_COLS: ClaimColumns = ClaimColumns {
        status: 8,
        assigned_worker: 9,
        claimed_at: 6,
    };

    fn gw() -> Gateway {
        Gateway::new(Box::new(MemoryBackend::new()), Duration::from_millis(0))
    }

    fn pending_task_row(id: &str) -> Vec<String> {
        vec![
            id.into(),
            Uuid::new_v4().to_string(),
            format!("https://youtube.com/watch?v={id}"),
            "title".into(),
            "120".into(),
            Utc::now().to_rfc3339(),
            String::new(),
            String::new(),
            RowStatus::Pending.as_str().into(),
            String::new(),
        ]
    }

    #[test]
    fn empty_sheet_returns_nothing() {
        let gateway = gw();
        let result = claim_one(
            &gateway,
            SheetKind::TasksPending,
            Uuid::new_v4(),
            Duration::from_secs(900),
            TASK_COLS,
        )
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn claims_first_pending_row() {
        let gateway = gw();
        gateway
            .append(SheetKind::TasksPending, SheetKind::TasksPending.header().into_iter().map(String::from).collect())
            .unwrap();
        gateway
            .append(SheetKind::TasksPending, pending_task_row("vvvvvvvvvvv"))
            .unwrap();

        let worker = Uuid::new_v4();
        let (idx, row) = claim_one(
            &gateway,
            SheetKind::TasksPending,
            worker,
            Duration::from_secs(900),
            TASK_COLS,
        )
        .unwrap()
        .unwrap();
        assert_eq!(idx, 1);
        assert_eq!(row[8], RowStatus::Claimed.as_str());
        assert_eq!(row[9], worker.to_string());
    }

    #[test]
    fn all_claimed_by_others_returns_nothing() {
        let gateway = gw();
        gateway
            .append(SheetKind::TasksPending, SheetKind::TasksPending.header().into_iter().map(String::from).collect())
            .unwrap();
        let mut row = pending_task_row("vvvvvvvvvvv");
        row[8] = RowStatus::Claimed.as_str().into();
        row[6] = Utc::now().to_rfc3339();
        row[9] = Uuid::new_v4().to_string();
        gateway.append(SheetKind::TasksPending, row).unwrap();

        let result = claim_one(
            &gateway,
            SheetKind::TasksPending,
            Uuid::new_v4(),
            Duration::from_secs(900),
            TASK_COLS,
        )
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn stale_claimed_row_is_recovered() {
        let gateway = gw();
        gateway
            .append(SheetKind::TasksPending, SheetKind::TasksPending.header().into_iter().map(String::from).collect())
            .unwrap();
        let mut row = pending_task_row("vvvvvvvvvvv");
        row[8] = RowStatus::Claimed.as_str().into();
        row[9] = Uuid::new_v4().to_string();
        row[6] = (Utc::now() - chrono::Duration::minutes(20)).to_rfc3339();
        gateway.append(SheetKind::TasksPending, row).unwrap();

        let worker = Uuid::new_v4();
        let (_, claimed) = claim_one(
            &gateway,
            SheetKind::TasksPending,
            worker,
            Duration::from_secs(900),
            TASK_COLS,
        )
        .unwrap()
        .unwrap();
        assert_eq!(claimed[9], worker.to_string());
    }
}
