//! Shared fakes for pipeline tests: an in-memory remote namespace and a
//! recording processor with failure/skip knobs.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use super::{PipelineSpec, TransferPipeline};
use crate::config::{RetryConfig, ServerChannelConfig, WorkerPoolConfig};
use crate::error::{Error, Result, TransferError};
use crate::hooks::FileProcessor;
use crate::session::{RemoteSession, SessionFactory, SessionPool};
use crate::store::InMemorySeenStore;
use crate::transaction::NoopTransaction;
use crate::trigger::PollTrigger;
use crate::types::{Direction, Event, FileCandidate};
use crate::worker::WorkerPool;

#[derive(Default)]
struct RemoteState {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
}

/// Shared in-memory remote namespace; every session sees the same state
#[derive(Clone, Default)]
pub(crate) struct MemoryRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl MemoryRemote {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn put_file(&self, path: &str, contents: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.files.insert(path.to_owned(), contents.to_vec());
    }

    pub(crate) fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub(crate) fn has_file(&self, path: &str) -> bool {
        self.state.lock().unwrap().files.contains_key(path)
    }

    pub(crate) fn factory(&self) -> Arc<dyn SessionFactory> {
        Arc::new(MemoryRemoteFactory {
            remote: self.clone(),
        })
    }
}

struct MemoryRemoteFactory {
    remote: MemoryRemote,
}

#[async_trait]
impl SessionFactory for MemoryRemoteFactory {
    async fn connect(&self) -> Result<Box<dyn RemoteSession>> {
        Ok(Box::new(MemorySession {
            remote: self.remote.clone(),
        }))
    }
}

struct MemorySession {
    remote: MemoryRemote,
}

#[async_trait]
impl RemoteSession for MemorySession {
    async fn list(&self, dir: &str) -> Result<Vec<FileCandidate>> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let state = self.remote.state.lock().unwrap();
        Ok(state
            .files
            .iter()
            .filter_map(|(path, contents)| {
                let rest = path.strip_prefix(&prefix)?;
                if rest.is_empty() || rest.contains('/') {
                    return None;
                }
                Some(FileCandidate {
                    name: rest.to_owned(),
                    path: path.clone(),
                    size: contents.len() as u64,
                    modified: None,
                })
            })
            .collect())
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<()> {
        let contents = self.remote.file(remote).ok_or_else(|| {
            Error::Transfer(TransferError::DownloadFailed {
                path: remote.to_owned(),
                reason: "no such file".into(),
            })
        })?;
        tokio::fs::write(local, contents).await?;
        Ok(())
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        let contents = tokio::fs::read(local).await?;
        self.remote.put_file(remote, &contents);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let mut state = self.remote.state.lock().unwrap();
        if state.files.remove(path).is_none() {
            return Err(Error::Transfer(TransferError::DeleteFailed {
                path: path.to_owned(),
                reason: "no such file".into(),
            }));
        }
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut state = self.remote.state.lock().unwrap();
        match state.files.remove(from) {
            Some(contents) => {
                state.files.insert(to.to_owned(), contents);
                Ok(())
            }
            None => Err(Error::Transfer(TransferError::RenameFailed {
                from: from.to_owned(),
                to: to.to_owned(),
                reason: "no such file".into(),
            })),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let state = self.remote.state.lock().unwrap();
        Ok(state.files.contains_key(path)
            || state.dirs.contains(path)
            || state.files.keys().any(|k| k.starts_with(&prefix)))
    }

    async fn mkdir(&self, dir: &str) -> Result<()> {
        let mut state = self.remote.state.lock().unwrap();
        state.dirs.insert(dir.to_owned());
        Ok(())
    }
}

/// Processor that counts every hook call and misbehaves on demand
#[derive(Default)]
pub(crate) struct RecordingProcessor {
    pub after_download_calls: AtomicUsize,
    pub before_upload_calls: AtomicUsize,
    pub before_archive_calls: AtomicUsize,
    pub after_archive_calls: AtomicUsize,
    /// Fail `before_upload` unconditionally
    pub fail_before_upload: bool,
    /// Fail `before_upload` for the first N calls, then succeed
    pub fail_before_upload_times: Option<usize>,
    /// Fail `after_download` when the file name contains this substring
    pub fail_after_download_containing: Option<String>,
    /// Make `before_archive` return `None` (skip)
    pub skip_archive: bool,
    /// Destinations `after_archive` was called with
    pub archived_to: Mutex<Vec<String>>,
}

#[async_trait]
impl FileProcessor for RecordingProcessor {
    async fn after_download(&self, file: &Path, _server: &str) -> Result<()> {
        self.after_download_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = &self.fail_after_download_containing
            && file.to_string_lossy().contains(marker.as_str())
        {
            return Err(Error::Hook(format!("refusing {}", file.display())));
        }
        Ok(())
    }

    async fn before_upload(&self, _file: &Path, _server: &str) -> Result<()> {
        let call = self.before_upload_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_before_upload {
            return Err(Error::Hook("upload validation failed".into()));
        }
        if let Some(times) = self.fail_before_upload_times
            && call < times
        {
            return Err(Error::Hook("not ready yet".into()));
        }
        Ok(())
    }

    async fn before_archive(&self, destination: &str, _server: &str) -> Result<Option<String>> {
        self.before_archive_calls.fetch_add(1, Ordering::SeqCst);
        if self.skip_archive {
            return Ok(None);
        }
        Ok(Some(destination.to_owned()))
    }

    async fn after_archive(&self, destination: &str, _server: &str) -> Result<()> {
        self.after_archive_calls.fetch_add(1, Ordering::SeqCst);
        self.archived_to.lock().unwrap().push(destination.to_owned());
        Ok(())
    }
}

/// A pipeline wired to an in-memory remote and a temp local directory
pub(crate) struct Harness {
    pub pipeline: Arc<TransferPipeline>,
    pub remote: MemoryRemote,
    pub local_dir: PathBuf,
    pub events: broadcast::Receiver<Event>,
    _tmp: tempfile::TempDir,
}

/// Retry policy small enough for tests to exhaust quickly
pub(crate) fn quick_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_interval: std::time::Duration::from_millis(10),
        multiplier: 2.0,
        max_interval: std::time::Duration::from_millis(50),
    }
}

/// Build a pipeline for one direction against a fresh in-memory remote
///
/// The server starts with `from=/outbox`, `to=/inbox`, `archive=/archive`
/// and a 3-attempt quick retry policy; `configure` may adjust it.
pub(crate) fn harness(
    direction: Direction,
    processor: Arc<dyn FileProcessor>,
    configure: impl FnOnce(&mut ServerChannelConfig),
) -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let remote = MemoryRemote::new();

    let mut server = ServerChannelConfig::new("alpha", "files.example.com");
    server.from = Some("/outbox".into());
    server.to = Some("/inbox".into());
    server.archive = Some("/archive".into());
    configure(&mut server);
    let server = Arc::new(server);

    let (event_tx, events) = broadcast::channel(64);
    let spec = PipelineSpec {
        server: Arc::clone(&server),
        direction,
        trigger: PollTrigger::FixedDelay {
            interval: std::time::Duration::from_secs(3600),
        },
        retry: quick_retry(3),
        local_root: tmp.path().to_path_buf(),
        sessions: SessionPool::new(server.name.clone(), remote.factory(), server.cache_size),
        processor,
        tx_boundary: Arc::new(NoopTransaction),
        workers: WorkerPool::new(&WorkerPoolConfig::default()),
        metadata_store: Arc::new(InMemorySeenStore::new()),
        event_tx,
    };

    let pipeline = TransferPipeline::new(spec).unwrap();
    let local_dir = pipeline.local_dir().to_path_buf();
    Harness {
        pipeline,
        remote,
        local_dir,
        events,
        _tmp: tmp,
    }
}

/// Drain every event currently buffered on the receiver
pub(crate) fn drain_events(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
