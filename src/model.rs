//! Typed records for every sheet, independent of their row encoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status shared by Sources and Tasks.
///
/// `Unknown` is the decode-time sentinel for an unrecognized cell value
/// (spec §4.2): such a row is neither claimable nor a dedup hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowStatus {
    Pending,
    Claimed,
    Done,
    Failed,
    Unknown,
}

impl RowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowStatus::Pending => "PENDING",
            RowStatus::Claimed => "CLAIMED",
            RowStatus::Done => "DONE",
            RowStatus::Failed => "FAILED",
            RowStatus::Unknown => "UNKNOWN",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "PENDING" => RowStatus::Pending,
            "CLAIMED" => RowStatus::Claimed,
            "DONE" => RowStatus::Done,
            "FAILED" => RowStatus::Failed,
            _ => RowStatus::Unknown,
        }
    }
}

/// `Worker.status`: ACTIVE / INACTIVE only (never UNKNOWN — a worker row
/// with a garbled status cell is still this worker's own row).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerStatus {
    Active,
    Inactive,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Active => "ACTIVE",
            WorkerStatus::Inactive => "INACTIVE",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "ACTIVE" => WorkerStatus::Active,
            _ => WorkerStatus::Inactive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub worker_id: Uuid,
    pub worker_name: String,
    pub last_heartbeat: DateTime<Utc>,
    pub status: WorkerStatus,
    pub tasks_processed: u64,
    pub sources_processed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Empty until the leader assigns one on claim.
    pub id: Option<Uuid>,
    pub url: String,
    pub name: String,
    pub video_count: Option<u64>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RowStatus,
    pub assigned_worker: Option<Uuid>,
    /// Trailing DLQ-only cell.
    pub error: Option<String>,
}

impl Source {
    pub fn pending(url: impl Into<String>) -> Self {
        Source {
            id: None,
            url: url.into(),
            name: String::new(),
            video_count: None,
            claimed_at: None,
            completed_at: None,
            status: RowStatus::Pending,
            assigned_worker: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// YouTube video id, 11 canonical characters.
    pub id: String,
    pub source_id: Uuid,
    pub url: String,
    pub name: String,
    pub duration: String,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RowStatus,
    pub assigned_worker: Option<Uuid>,
    pub error: Option<String>,
}

/// Canonical YouTube video id length (spec §3, §8 boundary behavior).
pub const TASK_ID_LEN: usize = 11;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub election_name: String,
    pub holder: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}
