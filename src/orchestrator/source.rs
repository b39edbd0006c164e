//! Source processing (leader-only), spec §4.5.4: claim one Source,
//! assign it an id if it doesn't have one, run the extractor, fan out
//! into deduplicated Task rows, then settle.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use super::claim::{claim_one, ClaimColumns};
use super::dedup::existing_task_ids;
use super::settle::settle;
use crate::error::OrchestratorError;
use crate::extractor::Extractor;
use crate::gateway::Gateway;
use crate::model::{RowStatus, Task, TASK_ID_LEN};
use crate::schema::{self, SheetKind};

const SOURCE_COLS: ClaimColumns = ClaimColumns {
    status: 6,
    assigned_worker: 7,
    claimed_at: 4,
};

/// Claim and fully process one Source. Returns `Ok(None)` if there was
/// nothing pending to claim, `Ok(Some(true))` if a Source was claimed and
/// settled successfully (History), `Ok(Some(false))` if it was claimed
/// but extraction failed (DLQ).
pub fn process_one_source(
    gateway: &Gateway,
    extractor: &dyn Extractor,
    worker_id: Uuid,
    claim_ttl: std::time::Duration,
) -> Result<Option<bool>, OrchestratorError> {
    let Some((idx, row)) = claim_one(gateway, SheetKind::SourcesPending, worker_id, claim_ttl, SOURCE_COLS)?
    else {
        return Ok(None);
    };

    let mut source = schema::row_to_source(&row);

    if source.id.is_none() {
        source.id = Some(Uuid::new_v4());
        gateway.update_row(
            SheetKind::SourcesPending,
            idx,
            schema::source_to_row(&source, false),
        )?;
    }
    let source_id = source.id.expect("just assigned above");

    match extractor.extract(&source.url) {
        Ok(extracted) => {
            let mut seen = existing_task_ids(gateway)?;
            let mut appended = 0usize;
            for video in &extracted.videos {
                if video.id.len() != TASK_ID_LEN {
                    warn!(
                        source_id = %source_id,
                        video_id = video.id,
                        "extractor yielded a non-canonical video id, skipping this entry"
                    );
                    continue;
                }
                if !seen.insert(video.id.clone()) {
                    continue;
                }
                let task = Task {
                    id: video.id.clone(),
                    source_id,
                    url: video.url.clone(),
                    name: video.title.clone(),
                    duration: video.duration.clone(),
                    created_at: Utc::now(),
                    claimed_at: None,
                    completed_at: None,
                    status: RowStatus::Pending,
                    assigned_worker: None,
                    error: None,
                };
                gateway.append(SheetKind::TasksPending, schema::task_to_row(&task, false))?;
                appended += 1;
            }

            source.name = extracted.name;
            source.video_count = Some(appended as u64);
            source.completed_at = Some(Utc::now());
            source.status = RowStatus::Done;
            info!(source_id = %source_id, appended, "source fan-out complete");

            settle(
                gateway,
                SheetKind::SourcesPending,
                idx,
                SheetKind::SourcesHistory,
                schema::source_to_row(&source, false),
            )?;
            Ok(Some(true))
        }
        Err(message) => {
            warn!(source_id = %source_id, error = %message, "extractor failed, routing source to DLQ");
            source.completed_at = Some(Utc::now());
            source.status = RowStatus::Failed;
            source.error = Some(message);
            settle(
                gateway,
                SheetKind::SourcesPending,
                idx,
                SheetKind::SourcesDlq,
                schema::source_to_row(&source, true),
            )?;
            Ok(Some(false))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{ExtractedVideo, StubExtractor};
    use crate::gateway::backend::MemoryBackend;
    use crate::model::Source;
    use std::time::Duration;

    fn gw() -> Gateway {
        let gateway = Gateway::new(Box::new(MemoryBackend::new()), Duration::from_millis(0));
        gateway.ensure_headers().unwrap();
        gateway
    }

    fn seed_pending_source(gateway: &Gateway, url: &str) {
        gateway
            .append(SheetKind::SourcesPending, schema::source_to_row(&Source::pending(url), false))
            .unwrap();
    }

    #[test]
    fn fan_out_creates_distinct_tasks_and_settles_source() {
        let gateway = gw();
        seed_pending_source(&gateway, "https://youtube.com/playlist?list=X");
        let extractor = StubExtractor::ok(
            "X",
            vec![
                ExtractedVideo {
                    id: "aaaaaaaaaaa".into(),
                    url: "https://youtube.com/watch?v=aaaaaaaaaaa".into(),
                    title: "A".into(),
                    duration: "10".into(),
                },
                ExtractedVideo {
                    id: "bbbbbbbbbbb".into(),
                    url: "https://youtube.com/watch?v=bbbbbbbbbbb".into(),
                    title: "B".into(),
                    duration: "20".into(),
                },
                ExtractedVideo {
                    id: "ccccccccccc".into(),
                    url: "https://youtube.com/watch?v=ccccccccccc".into(),
                    title: "C".into(),
                    duration: "30".into(),
                },
            ],
        );

        let outcome = process_one_source(&gateway, &extractor, Uuid::new_v4(), Duration::from_secs(900)).unwrap();
        assert_eq!(outcome, Some(true));

        let pending = gateway.read_all(SheetKind::SourcesPending).unwrap();
        assert_eq!(pending.len(), 1); // header only

        let history = gateway.read_all(SheetKind::SourcesHistory).unwrap();
        assert_eq!(history.len(), 2); // header + 1
        let settled = schema::row_to_source(&history[1]);
        assert_eq!(settled.status, RowStatus::Done);
        assert_eq!(settled.video_count, Some(3));

        let tasks = gateway.read_all(SheetKind::TasksPending).unwrap();
        assert_eq!(tasks.len(), 4); // header + 3
    }

    #[test]
    fn extractor_failure_routes_source_to_dlq() {
        let gateway = gw();
        seed_pending_source(&gateway, "https://youtube.com/playlist?list=bad");
        let extractor = StubExtractor::err("network down");

        let outcome = process_one_source(&gateway, &extractor, Uuid::new_v4(), Duration::from_secs(900)).unwrap();
        assert_eq!(outcome, Some(false));

        let dlq = gateway.read_all(SheetKind::SourcesDlq).unwrap();
        assert_eq!(dlq.len(), 2); // header + 1
        let settled = schema::row_to_source(&dlq[1]);
        assert_eq!(settled.status, RowStatus::Failed);
        assert_eq!(settled.error.as_deref(), Some("network down"));
    }

    #[test]
    fn rerunning_extraction_on_same_source_is_idempotent() {
        // Simulates crash-and-retry: fan-out runs, then we manually re-seed
        // a claimed source row with the same id and rerun extraction; the
        // dedup check must skip all three already-created task ids.
        let gateway = gw();
        seed_pending_source(&gateway, "https://youtube.com/playlist?list=X");
        let extractor = StubExtractor::ok(
            "X",
            vec![ExtractedVideo {
                id: "aaaaaaaaaaa".into(),
                url: "u".into(),
                title: "A".into(),
                duration: "1".into(),
            }],
        );
        process_one_source(&gateway, &extractor, Uuid::new_v4(), Duration::from_secs(900)).unwrap();
        assert_eq!(gateway.read_all(SheetKind::TasksPending).unwrap().len(), 2); // header + 1

        // Re-seed the same source as pending again and rerun.
        seed_pending_source(&gateway, "https://youtube.com/playlist?list=X");
        process_one_source(&gateway, &extractor, Uuid::new_v4(), Duration::from_secs(900)).unwrap();

        // No new task row: the id was already present.
        assert_eq!(gateway.read_all(SheetKind::TasksPending).unwrap().len(), 2);
    }

    #[test]
    fn non_canonical_video_id_is_skipped_not_fatal() {
        let gateway = gw();
        seed_pending_source(&gateway, "https://youtube.com/playlist?list=X");
        let extractor = StubExtractor::ok(
            "X",
            vec![
                ExtractedVideo {
                    id: "short".into(),
                    url: "u".into(),
                    title: "bad".into(),
                    duration: "1".into(),
                },
                ExtractedVideo {
                    id: "aaaaaaaaaaa".into(),
                    url: "u".into(),
                    title: "good".into(),
                    duration: "1".into(),
                },
            ],
        );
        let outcome = process_one_source(&gateway, &extractor, Uuid::new_v4(), Duration::from_secs(900)).unwrap();
        assert_eq!(outcome, Some(true));
        assert_eq!(gateway.read_all(SheetKind::TasksPending).unwrap().len(), 2); // header + 1

        let history = gateway.read_all(SheetKind::SourcesHistory).unwrap();
        let settled = schema::row_to_source(&history[1]);
        assert_eq!(settled.status, RowStatus::Done);
        assert_eq!(settled.video_count, Some(1));
    }
}
