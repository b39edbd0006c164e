//! Fixed column orders and positional row encode/decode for every sheet.
//!
//! Column order is part of the external contract (spec §6): these lists
//! are never reordered, only appended to (e.g. the DLQ `error` trailing
//! cell). Decoding is positional and padding-tolerant — a short row is
//! treated as having empty trailing cells, and a long row's extra cells
//! are preserved where the DLQ variants expect them.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::{Lease, RowStatus, Source, Task, Worker, WorkerStatus};

/// Identifies one of the eight sheets this system reads/writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SheetKind {
    Workers,
    SourcesPending,
    SourcesHistory,
    SourcesDlq,
    TasksPending,
    TasksHistory,
    TasksDlq,
    LeaderElection,
}

impl SheetKind {
    pub const ALL: [SheetKind; 8] = [
        SheetKind::Workers,
        SheetKind::SourcesPending,
        SheetKind::SourcesHistory,
        SheetKind::SourcesDlq,
        SheetKind::TasksPending,
        SheetKind::TasksHistory,
        SheetKind::TasksDlq,
        SheetKind::LeaderElection,
    ];

    /// The sheet/tab name used against the backend.
    pub fn sheet_name(&self) -> &'static str {
        match self {
            SheetKind::Workers => "Workers",
            SheetKind::SourcesPending => "Sources.Pending",
            SheetKind::SourcesHistory => "Sources.History",
            SheetKind::SourcesDlq => "Sources.DLQ",
            SheetKind::TasksPending => "Tasks.Pending",
            SheetKind::TasksHistory => "Tasks.History",
            SheetKind::TasksDlq => "Tasks.DLQ",
            SheetKind::LeaderElection => "LeaderElection",
        }
    }

    pub fn is_dlq(&self) -> bool {
        matches!(self, SheetKind::SourcesDlq | SheetKind::TasksDlq)
    }

    /// Header row written when a sheet is first touched empty.
    pub fn header(&self) -> Vec<&'static str> {
        match self {
            SheetKind::Workers => vec![
                "worker_id",
                "worker_name",
                "last_heartbeat",
                "status",
                "tasks_processed",
                "sources_processed",
            ],
            SheetKind::SourcesPending | SheetKind::SourcesHistory => vec![
                "id",
                "url",
                "name",
                "video_count",
                "claimed_at",
                "completed_at",
                "status",
                "assigned_worker",
            ],
            SheetKind::SourcesDlq => vec![
                "id",
                "url",
                "name",
                "video_count",
                "claimed_at",
                "completed_at",
                "status",
                "assigned_worker",
                "error",
            ],
            SheetKind::TasksPending | SheetKind::TasksHistory => vec![
                "id",
                "source_id",
                "url",
                "name",
                "duration",
                "created_at",
                "claimed_at",
                "completed_at",
                "status",
                "assigned_worker",
            ],
            SheetKind::TasksDlq => vec![
                "id",
                "source_id",
                "url",
                "name",
                "duration",
                "created_at",
                "claimed_at",
                "completed_at",
                "status",
                "assigned_worker",
                "error",
            ],
            SheetKind::LeaderElection => vec!["election_name", "holder", "expires_at"],
        }
    }
}

fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(String::as_str).unwrap_or("")
}

fn parse_uuid(s: &str) -> Option<Uuid> {
    if s.is_empty() {
        None
    } else {
        Uuid::parse_str(s).ok()
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        None
    } else {
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

fn parse_u64(s: &str) -> Option<u64> {
    if s.is_empty() {
        None
    } else {
        s.parse().ok()
    }
}

fn fmt_ts(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.to_rfc3339()).unwrap_or_default()
}

fn fmt_opt<T: ToString>(v: Option<T>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

// ---------------------------------------------------------------- Worker

pub fn worker_to_row(w: &Worker) -> Vec<String> {
    vec![
        w.worker_id.to_string(),
        w.worker_name.clone(),
        w.last_heartbeat.to_rfc3339(),
        w.status.as_str().to_string(),
        w.tasks_processed.to_string(),
        w.sources_processed.to_string(),
    ]
}

pub fn row_to_worker(row: &[String]) -> Option<Worker> {
    Some(Worker {
        worker_id: parse_uuid(cell(row, 0))?,
        worker_name: cell(row, 1).to_string(),
        last_heartbeat: parse_timestamp(cell(row, 2)).unwrap_or_else(Utc::now),
        status: WorkerStatus::parse(cell(row, 3)),
        tasks_processed: parse_u64(cell(row, 4)).unwrap_or(0),
        sources_processed: parse_u64(cell(row, 5)).unwrap_or(0),
    })
}

// ---------------------------------------------------------------- Source

pub fn source_to_row(s: &Source, with_error: bool) -> Vec<String> {
    let mut row = vec![
        fmt_opt(s.id),
        s.url.clone(),
        s.name.clone(),
        fmt_opt(s.video_count),
        fmt_ts(s.claimed_at),
        fmt_ts(s.completed_at),
        s.status.as_str().to_string(),
        fmt_opt(s.assigned_worker),
    ];
    if with_error {
        row.push(s.error.clone().unwrap_or_default());
    }
    row
}

pub fn row_to_source(row: &[String]) -> Source {
    let error = cell(row, 8);
    Source {
        id: parse_uuid(cell(row, 0)),
        url: cell(row, 1).to_string(),
        name: cell(row, 2).to_string(),
        video_count: parse_u64(cell(row, 3)),
        claimed_at: parse_timestamp(cell(row, 4)),
        completed_at: parse_timestamp(cell(row, 5)),
        status: RowStatus::parse(cell(row, 6)),
        assigned_worker: parse_uuid(cell(row, 7)),
        error: if error.is_empty() {
            None
        } else {
            Some(error.to_string())
        },
    }
}

// ------------------------------------------------------------------ Task

pub fn task_to_row(t: &Task, with_error: bool) -> Vec<String> {
    let mut row = vec![
        t.id.clone(),
        t.source_id.to_string(),
        t.url.clone(),
        t.name.clone(),
        t.duration.clone(),
        t.created_at.to_rfc3339(),
        fmt_ts(t.claimed_at),
        fmt_ts(t.completed_at),
        t.status.as_str().to_string(),
        fmt_opt(t.assigned_worker),
    ];
    if with_error {
        row.push(t.error.clone().unwrap_or_default());
    }
    row
}

pub fn row_to_task(row: &[String]) -> Option<Task> {
    let error = cell(row, 10);
    Some(Task {
        id: cell(row, 0).to_string(),
        source_id: parse_uuid(cell(row, 1))?,
        url: cell(row, 2).to_string(),
        name: cell(row, 3).to_string(),
        duration: cell(row, 4).to_string(),
        created_at: parse_timestamp(cell(row, 5)).unwrap_or_else(Utc::now),
        claimed_at: parse_timestamp(cell(row, 6)),
        completed_at: parse_timestamp(cell(row, 7)),
        status: RowStatus::parse(cell(row, 8)),
        assigned_worker: parse_uuid(cell(row, 9)),
        error: if error.is_empty() {
            None
        } else {
            Some(error.to_string())
        },
    })
}

// ----------------------------------------------------------------- Lease

pub fn lease_to_row(l: &Lease) -> Vec<String> {
    vec![
        l.election_name.clone(),
        l.holder.to_string(),
        l.expires_at.to_rfc3339(),
    ]
}

pub fn row_to_lease(row: &[String]) -> Option<Lease> {
    Some(Lease {
        election_name: cell(row, 0).to_string(),
        holder: parse_uuid(cell(row, 1))?,
        expires_at: parse_timestamp(cell(row, 2))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn worker_round_trips() {
        let w = Worker {
            worker_id: Uuid::new_v4(),
            worker_name: "alpha".into(),
            last_heartbeat: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            status: WorkerStatus::Active,
            tasks_processed: 3,
            sources_processed: 1,
        };
        let row = worker_to_row(&w);
        assert_eq!(row_to_worker(&row).unwrap(), w);
    }

    #[test]
    fn source_round_trips_with_and_without_error() {
        let mut s = Source::pending("https://youtube.com/watch?v=x");
        s.id = Some(Uuid::new_v4());
        s.status = RowStatus::Failed;
        s.error = Some("boom".into());

        let row = source_to_row(&s, true);
        assert_eq!(row_to_source(&row), s);

        let row_no_err = source_to_row(&s, false);
        let decoded = row_to_source(&row_no_err);
        assert_eq!(decoded.error, None);
    }

    #[test]
    fn short_row_pads_missing_trailing_columns() {
        let row = vec!["id-missing".to_string()];
        let s = row_to_source(&row);
        assert_eq!(s.status, RowStatus::Unknown);
        assert_eq!(s.error, None);
    }

    #[test]
    fn unknown_status_decodes_to_sentinel() {
        let row = vec![
            "".into(),
            "u".into(),
            "n".into(),
            "".into(),
            "".into(),
            "".into(),
            "WEIRD".into(),
            "".into(),
        ];
        let s = row_to_source(&row);
        assert_eq!(s.status, RowStatus::Unknown);
    }

    #[test]
    fn lease_round_trips() {
        let l = Lease {
            election_name: "source_processor".into(),
            holder: Uuid::new_v4(),
            expires_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 5, 0).unwrap(),
        };
        let row = lease_to_row(&l);
        assert_eq!(row_to_lease(&row).unwrap(), l);
    }
}
