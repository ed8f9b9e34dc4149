#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio_util::sync::CancellationToken;

use super::test_helpers::{RecordingProcessor, drain_events, harness};
use super::{join_remote, list_local_dir};
use crate::types::{Direction, Event};

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

#[tokio::test]
async fn download_transfers_file_and_keeps_remote_by_default() {
    let processor = Arc::new(RecordingProcessor::default());
    let h = harness(Direction::Download, processor.clone(), |_| {});
    h.remote.put_file("/outbox/a.txt", b"payload");

    h.pipeline.tick(&CancellationToken::new()).await.unwrap();

    let local = h.local_dir.join("a.txt");
    assert_eq!(std::fs::read(&local).unwrap(), b"payload");
    assert!(
        h.remote.has_file("/outbox/a.txt"),
        "remote copy must survive when delete_after_download is off"
    );
    assert_eq!(processor.after_download_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn download_deletes_remote_when_configured() {
    let processor = Arc::new(RecordingProcessor::default());
    let h = harness(Direction::Download, processor, |server| {
        server.delete_after_download = true;
    });
    h.remote.put_file("/outbox/a.txt", b"payload");

    h.pipeline.tick(&CancellationToken::new()).await.unwrap();

    assert!(h.local_dir.join("a.txt").exists());
    assert!(!h.remote.has_file("/outbox/a.txt"), "remote copy must be deleted");
}

#[tokio::test]
async fn download_failure_is_isolated_to_the_failing_candidate() {
    let processor = Arc::new(RecordingProcessor {
        fail_after_download_containing: Some("bad".into()),
        ..RecordingProcessor::default()
    });
    let h = harness(Direction::Download, processor.clone(), |_| {});
    h.remote.put_file("/outbox/good.txt", b"ok");
    h.remote.put_file("/outbox/bad.txt", b"nope");

    let mut events = h.events.resubscribe();
    h.pipeline.tick(&CancellationToken::new()).await.unwrap();

    assert!(h.local_dir.join("good.txt").exists());
    assert!(
        h.remote.has_file("/outbox/bad.txt"),
        "failed candidate's source must stay in place"
    );
    // 1 call for good + 3 retried attempts for bad
    assert_eq!(processor.after_download_calls.load(Ordering::SeqCst), 4);

    let drained = drain_events(&mut events);
    assert!(drained.iter().any(|e| matches!(
        e,
        Event::CandidateFailed { name, .. } if name == "bad.txt"
    )));
    assert!(drained.iter().any(|e| matches!(
        e,
        Event::CandidateCompleted { name, .. } if name == "good.txt"
    )));
    assert!(drained.iter().any(|e| matches!(
        e,
        Event::TickCompleted { listed: 2, accepted: 2, failed: 1, .. }
    )));
}

#[tokio::test]
async fn dedup_accepts_the_same_identity_only_once_across_ticks() {
    let processor = Arc::new(RecordingProcessor::default());
    let h = harness(Direction::Download, processor.clone(), |server| {
        server.enable_metadata_store = true;
    });
    h.remote.put_file("/outbox/a.txt", b"first");

    let cancel = CancellationToken::new();
    h.pipeline.tick(&cancel).await.unwrap();
    // The same identity reappears (rewritten) before the next tick.
    h.remote.put_file("/outbox/a.txt", b"second");
    h.pipeline.tick(&cancel).await.unwrap();

    assert_eq!(
        processor.after_download_calls.load(Ordering::SeqCst),
        1,
        "only one candidate may be accepted across all ticks"
    );
    assert_eq!(std::fs::read(h.local_dir.join("a.txt")).unwrap(), b"first");
}

#[tokio::test]
async fn pattern_and_size_filters_gate_remote_candidates() {
    let processor = Arc::new(RecordingProcessor::default());
    let h = harness(Direction::Download, processor.clone(), |server| {
        server.file_pattern = Some(r".*\.csv".into());
        server.min_file_size = Some(4);
    });
    h.remote.put_file("/outbox/keep.csv", b"12345");
    h.remote.put_file("/outbox/small.csv", b"12");
    h.remote.put_file("/outbox/skip.txt", b"12345");

    h.pipeline.tick(&CancellationToken::new()).await.unwrap();

    assert!(h.local_dir.join("keep.csv").exists());
    assert!(!h.local_dir.join("small.csv").exists());
    assert!(!h.local_dir.join("skip.txt").exists());
    assert_eq!(processor.after_download_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn empty_listing_completes_a_tick_with_zero_counts() {
    let h = harness(
        Direction::Download,
        Arc::new(RecordingProcessor::default()),
        |_| {},
    );
    let mut events = h.events.resubscribe();

    h.pipeline.tick(&CancellationToken::new()).await.unwrap();

    let drained = drain_events(&mut events);
    assert!(drained.iter().any(|e| matches!(
        e,
        Event::TickCompleted { listed: 0, accepted: 0, failed: 0, .. }
    )));
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upload_runs_hook_then_transfers_to_remote_target() {
    let processor = Arc::new(RecordingProcessor::default());
    let h = harness(Direction::Upload, processor.clone(), |_| {});
    std::fs::write(h.local_dir.join("data.bin"), b"bytes").unwrap();

    h.pipeline.tick(&CancellationToken::new()).await.unwrap();

    assert_eq!(h.remote.file("/inbox/data.bin").unwrap(), b"bytes");
    assert_eq!(processor.before_upload_calls.load(Ordering::SeqCst), 1);
    assert!(
        h.local_dir.join("data.bin").exists(),
        "local file is not consumed by a successful upload"
    );
}

#[tokio::test]
async fn upload_hook_exhaustion_leaves_local_file_and_no_remote_copy() {
    let processor = Arc::new(RecordingProcessor {
        fail_before_upload: true,
        ..RecordingProcessor::default()
    });
    let h = harness(Direction::Upload, processor.clone(), |_| {});
    std::fs::write(h.local_dir.join("data.bin"), b"bytes").unwrap();

    let mut events = h.events.resubscribe();
    h.pipeline.tick(&CancellationToken::new()).await.unwrap();

    assert_eq!(
        processor.before_upload_calls.load(Ordering::SeqCst),
        3,
        "max_attempts=3 means exactly 3 attempts"
    );
    assert!(h.local_dir.join("data.bin").exists(), "local file must remain");
    assert!(
        !h.remote.has_file("/inbox/data.bin"),
        "no remote file may be created"
    );
    let drained = drain_events(&mut events);
    assert!(drained.iter().any(|e| matches!(
        e,
        Event::CandidateFailed { error, .. } if error.contains("3 attempts")
    )));
}

#[tokio::test]
async fn upload_hook_flakiness_is_absorbed_by_retries() {
    let processor = Arc::new(RecordingProcessor {
        fail_before_upload_times: Some(2),
        ..RecordingProcessor::default()
    });
    let h = harness(Direction::Upload, processor.clone(), |_| {});
    std::fs::write(h.local_dir.join("data.bin"), b"bytes").unwrap();

    h.pipeline.tick(&CancellationToken::new()).await.unwrap();

    assert_eq!(processor.before_upload_calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.remote.file("/inbox/data.bin").unwrap(), b"bytes");
}

// ---------------------------------------------------------------------------
// Archive
// ---------------------------------------------------------------------------

#[tokio::test]
async fn archive_moves_remote_file_to_proposed_destination() {
    let processor = Arc::new(RecordingProcessor::default());
    let h = harness(Direction::Archive, processor.clone(), |_| {});
    h.remote.put_file("/outbox/report.pdf", b"doc");
    std::fs::write(h.local_dir.join("report.pdf"), b"").unwrap();

    h.pipeline.tick(&CancellationToken::new()).await.unwrap();

    assert!(!h.remote.has_file("/outbox/report.pdf"));
    assert_eq!(h.remote.file("/archive/report.pdf").unwrap(), b"doc");
    assert_eq!(processor.before_archive_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        processor.archived_to.lock().unwrap().as_slice(),
        ["/archive/report.pdf"]
    );
}

#[tokio::test]
async fn archive_skip_leaves_remote_untouched_and_never_runs_post_hook() {
    let processor = Arc::new(RecordingProcessor {
        skip_archive: true,
        ..RecordingProcessor::default()
    });
    let h = harness(Direction::Archive, processor.clone(), |_| {});
    h.remote.put_file("/outbox/report.pdf", b"doc");
    std::fs::write(h.local_dir.join("report.pdf"), b"").unwrap();

    let mut events = h.events.resubscribe();
    h.pipeline.tick(&CancellationToken::new()).await.unwrap();

    assert!(
        h.remote.has_file("/outbox/report.pdf"),
        "skipped candidate's remote file must not move"
    );
    assert!(!h.remote.has_file("/archive/report.pdf"));
    assert_eq!(
        processor.after_archive_calls.load(Ordering::SeqCst),
        0,
        "after_archive must never run for a skipped candidate"
    );
    let drained = drain_events(&mut events);
    assert!(drained.iter().any(|e| matches!(
        e,
        Event::CandidateSkipped { name, .. } if name == "report.pdf"
    )));
}

#[tokio::test]
async fn archive_rename_failure_fails_only_that_candidate() {
    let processor = Arc::new(RecordingProcessor::default());
    let h = harness(Direction::Archive, processor.clone(), |_| {});
    // Trigger names a remote file that exists and one that does not.
    h.remote.put_file("/outbox/present.txt", b"doc");
    std::fs::write(h.local_dir.join("present.txt"), b"").unwrap();
    std::fs::write(h.local_dir.join("missing.txt"), b"").unwrap();

    let mut events = h.events.resubscribe();
    h.pipeline.tick(&CancellationToken::new()).await.unwrap();

    assert!(h.remote.has_file("/archive/present.txt"));
    let drained = drain_events(&mut events);
    assert!(drained.iter().any(|e| matches!(
        e,
        Event::CandidateFailed { name, .. } if name == "missing.txt"
    )));
    // Transfer errors are not retried: exactly one pre-hook call each.
    assert_eq!(processor.before_archive_calls.load(Ordering::SeqCst), 2);
}

// ---------------------------------------------------------------------------
// Scheduler loop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn idle_run_loop_responds_to_cancellation_without_ticking() {
    // The harness trigger is a 1h fixed delay: the loop must sit idle and
    // exit promptly on cancel, never reaching a tick. Trigger-driven ticking
    // with a fast poller is covered by the registry tests.
    let processor = Arc::new(RecordingProcessor::default());
    let h = harness(Direction::Download, processor.clone(), |_| {});
    h.remote.put_file("/outbox/a.txt", b"payload");

    let cancel = CancellationToken::new();
    let pipeline = Arc::clone(&h.pipeline);
    let task = tokio::spawn(pipeline.run(cancel.clone()));

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    cancel.cancel();
    task.await.unwrap();

    assert_eq!(processor.after_download_calls.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Local helpers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_local_dir_returns_plain_files_only() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("a.txt"), b"12345").unwrap();
    std::fs::create_dir(tmp.path().join("subdir")).unwrap();

    let mut candidates = list_local_dir(tmp.path()).await.unwrap();
    candidates.sort_by(|a, b| a.name.cmp(&b.name));

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].name, "a.txt");
    assert_eq!(candidates[0].size, 5);
    assert!(candidates[0].modified.is_some());
}

#[test]
fn join_remote_collapses_trailing_separators() {
    assert_eq!(join_remote("/inbox", "a.txt"), "/inbox/a.txt");
    assert_eq!(join_remote("/inbox/", "a.txt"), "/inbox/a.txt");
}
