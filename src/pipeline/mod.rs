//! Per-server, per-direction transfer pipelines
//!
//! A [`TransferPipeline`] owns one scheduler loop. Each firing of its
//! trigger runs one tick: list the source directory, run the filter chain,
//! then push every accepted candidate through the remaining phases
//! (transfer, hook, commit) on the shared worker pool. Ticks of one
//! pipeline are strictly serialized — the loop awaits the whole tick before
//! asking the trigger for the next instant — while pipelines of different
//! servers and directions overlap freely.
//!
//! Failure is isolated per candidate: a candidate that fails its transfer
//! or exhausts its hook retries is logged and dropped for this tick, its
//! source artifact left where it was, and its siblings continue.
//!
//! Direction-specific listing and processing live in the `download`,
//! `upload`, and `archive` submodules.

mod archive;
mod download;
mod upload;

#[cfg(test)]
pub(crate) mod test_helpers;
#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::{RetryConfig, ServerChannelConfig};
use crate::error::{Error, Result};
use crate::filter::{FilterChain, build_chain};
use crate::hooks::FileProcessor;
use crate::retry::{RetryContext, run_with_retry};
use crate::session::SessionPool;
use crate::store::{InMemorySeenStore, SeenStore};
use crate::transaction::TransactionBoundary;
use crate::trigger::PollTrigger;
use crate::types::{CandidateOutcome, Direction, Event, FileCandidate, TickPhase};
use crate::worker::WorkerPool;

/// Everything a pipeline needs, resolved once by the registry
pub(crate) struct PipelineSpec {
    /// Owning server configuration
    pub server: Arc<ServerChannelConfig>,
    /// Pipeline direction
    pub direction: Direction,
    /// Scheduling trigger
    pub trigger: PollTrigger,
    /// Effective retry policy (per-server override or global default)
    pub retry: RetryConfig,
    /// Base directory for local staging/trigger directories
    pub local_root: PathBuf,
    /// Session pool for the owning server
    pub sessions: Arc<SessionPool>,
    /// Processor resolved for the owning server
    pub processor: Arc<dyn FileProcessor>,
    /// Transaction boundary wrapped around hook execution
    pub tx_boundary: Arc<dyn TransactionBoundary>,
    /// Shared worker pool
    pub workers: Arc<WorkerPool>,
    /// Durable seen store for the remote identity space (download dedup)
    pub metadata_store: Arc<dyn SeenStore>,
    /// Engine event channel
    pub event_tx: broadcast::Sender<Event>,
}

/// One per-server, per-direction transfer pipeline
pub struct TransferPipeline {
    flow_id: String,
    direction: Direction,
    server: Arc<ServerChannelConfig>,
    trigger: PollTrigger,
    retry: RetryConfig,
    filter: Option<FilterChain>,
    sessions: Arc<SessionPool>,
    processor: Arc<dyn FileProcessor>,
    tx_boundary: Arc<dyn TransactionBoundary>,
    workers: Arc<WorkerPool>,
    local_dir: PathBuf,
    event_tx: broadcast::Sender<Event>,
}

impl TransferPipeline {
    /// Build a pipeline, creating its local directory on demand
    ///
    /// Directory creation failure returns [`Error::DirectoryCreation`]; the
    /// registry treats it as fatal for this pipeline only — it never runs a
    /// tick, the rest of the configuration still registers.
    pub(crate) fn new(spec: PipelineSpec) -> Result<Arc<Self>> {
        let flow_id = spec.direction.flow_id(&spec.server.name);

        // Download dedup lives in the durable remote-identity store; upload
        // and archive each get a private in-memory local-identity store.
        let seen_store: Arc<dyn SeenStore> = match spec.direction {
            Direction::Download => spec.metadata_store,
            Direction::Upload | Direction::Archive => Arc::new(InMemorySeenStore::new()),
        };
        let filter = build_chain(&spec.server, &flow_id, seen_store)?;

        let local_dir = resolve_local_dir(&spec.server, &spec.local_root, spec.direction);
        std::fs::create_dir_all(&local_dir).map_err(|source| Error::DirectoryCreation {
            path: local_dir.clone(),
            source,
        })?;

        tracing::info!(
            flow_id = %flow_id,
            server = %spec.server.name,
            direction = %spec.direction,
            trigger = %spec.trigger,
            local_dir = %local_dir.display(),
            "registering transfer pipeline"
        );

        Ok(Arc::new(Self {
            flow_id,
            direction: spec.direction,
            server: spec.server,
            trigger: spec.trigger,
            retry: spec.retry,
            filter,
            sessions: spec.sessions,
            processor: spec.processor,
            tx_boundary: spec.tx_boundary,
            workers: spec.workers,
            local_dir,
            event_tx: spec.event_tx,
        }))
    }

    /// Unique flow identifier (`direction-server`)
    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    /// Pipeline direction
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Local staging/trigger directory this pipeline works against
    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }

    /// Scheduler loop: sleep until the trigger's next instant, run one tick,
    /// repeat until cancelled
    pub(crate) async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!(flow_id = %self.flow_id, "pipeline started");
        self.emit(Event::PipelineStarted {
            flow_id: self.flow_id.clone(),
        });

        let mut last_actual: Option<DateTime<Utc>> = None;
        loop {
            let now = Utc::now();
            let next = self.trigger.next_execution(now, last_actual);
            let delay = (next - now).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => break,
            }

            last_actual = Some(Utc::now());
            if let Err(e) = self.tick(&cancel).await {
                tracing::error!(flow_id = %self.flow_id, error = %e, "tick failed");
            }

            if cancel.is_cancelled() {
                break;
            }
        }

        tracing::info!(flow_id = %self.flow_id, "pipeline stopped");
        self.emit(Event::PipelineStopped {
            flow_id: self.flow_id.clone(),
        });
    }

    /// One listing pass plus the processing of every accepted candidate
    pub(crate) async fn tick(self: &Arc<Self>, cancel: &CancellationToken) -> Result<()> {
        tracing::debug!(flow_id = %self.flow_id, phase = %TickPhase::Listing, "tick started");
        let candidates = match self.direction {
            Direction::Download => self.list_download().await?,
            Direction::Upload | Direction::Archive => list_local_dir(&self.local_dir).await?,
        };
        let listed = candidates.len();

        tracing::debug!(
            flow_id = %self.flow_id,
            phase = %TickPhase::Filtering,
            listed,
            "filtering candidates"
        );
        let mut accepted = Vec::new();
        for candidate in candidates {
            if self.accept(&candidate).await? {
                accepted.push(candidate);
            } else {
                tracing::trace!(
                    flow_id = %self.flow_id,
                    name = %candidate.name,
                    "candidate rejected by filter chain"
                );
            }
        }

        let accepted_count = accepted.len();
        let mut failed = 0usize;
        let mut inflight = tokio::task::JoinSet::new();
        for candidate in accepted {
            match self.workers.acquire(&self.flow_id).await {
                Ok(permit) => {
                    let pipeline = Arc::clone(self);
                    let candidate_cancel = cancel.child_token();
                    inflight.spawn(async move {
                        let _permit = permit;
                        let name = candidate.name.clone();
                        let result = pipeline.process_candidate(candidate, &candidate_cancel).await;
                        (name, result)
                    });
                }
                Err(e) => {
                    failed += 1;
                    tracing::warn!(
                        flow_id = %self.flow_id,
                        name = %candidate.name,
                        error = %e,
                        "candidate rejected by worker pool for this tick"
                    );
                    self.emit(Event::CandidateFailed {
                        flow_id: self.flow_id.clone(),
                        name: candidate.name,
                        error: e.to_string(),
                    });
                }
            }
        }

        while let Some(joined) = inflight.join_next().await {
            match joined {
                Ok((name, Ok(CandidateOutcome::Completed))) => {
                    tracing::debug!(
                        flow_id = %self.flow_id,
                        name = %name,
                        phase = %TickPhase::Commit,
                        "candidate completed"
                    );
                    self.emit(Event::CandidateCompleted {
                        flow_id: self.flow_id.clone(),
                        name,
                    });
                }
                Ok((name, Ok(CandidateOutcome::Skipped))) => {
                    tracing::debug!(
                        flow_id = %self.flow_id,
                        name = %name,
                        "candidate skipped by hook"
                    );
                    self.emit(Event::CandidateSkipped {
                        flow_id: self.flow_id.clone(),
                        name,
                    });
                }
                Ok((name, Err(e))) => {
                    failed += 1;
                    tracing::warn!(
                        flow_id = %self.flow_id,
                        name = %name,
                        phase = %TickPhase::Failed,
                        error = %e,
                        "candidate failed, source artifact left in place"
                    );
                    self.emit(Event::CandidateFailed {
                        flow_id: self.flow_id.clone(),
                        name,
                        error: e.to_string(),
                    });
                }
                Err(join_error) => {
                    failed += 1;
                    tracing::error!(
                        flow_id = %self.flow_id,
                        error = %join_error,
                        "candidate worker panicked or was aborted"
                    );
                }
            }
        }

        tracing::debug!(
            flow_id = %self.flow_id,
            phase = %TickPhase::Idle,
            listed,
            accepted = accepted_count,
            failed,
            "tick finished"
        );
        self.emit(Event::TickCompleted {
            flow_id: self.flow_id.clone(),
            listed,
            accepted: accepted_count,
            failed,
        });
        Ok(())
    }

    async fn process_candidate(
        self: &Arc<Self>,
        candidate: FileCandidate,
        cancel: &CancellationToken,
    ) -> Result<CandidateOutcome> {
        match self.direction {
            Direction::Download => self.process_download(candidate, cancel).await,
            Direction::Upload => self.process_upload(candidate, cancel).await,
            Direction::Archive => self.process_archive(candidate, cancel).await,
        }
    }

    async fn accept(&self, candidate: &FileCandidate) -> Result<bool> {
        match &self.filter {
            Some(chain) => chain.accept(candidate).await,
            // No filter installed: every candidate passes.
            None => Ok(true),
        }
    }

    /// Run one hook invocation inside the transaction boundary, wrapped by
    /// the retry executor
    ///
    /// The boundary scopes the whole retry loop: begin once, commit when the
    /// hook finally succeeds, roll back when it gives up. Rollback failures
    /// are logged; the hook error wins.
    pub(crate) async fn run_hook<F, Fut, T>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.tx_boundary.begin().await?;
        let result = run_with_retry(
            &self.retry,
            RetryContext {
                server: &self.server.name,
                operation,
            },
            cancel,
            op,
        )
        .await;

        match result {
            Ok(value) => {
                self.tx_boundary.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self.tx_boundary.rollback().await {
                    tracing::warn!(
                        flow_id = %self.flow_id,
                        error = %rollback_err,
                        "rollback failed after hook error"
                    );
                }
                Err(e)
            }
        }
    }

    fn emit(&self, event: Event) {
        // Best effort: nobody listening is fine.
        let _ = self.event_tx.send(event);
    }
}

/// Effective local directory for a pipeline: the per-server override, or
/// `{local_root}/{direction}/{server}`
fn resolve_local_dir(
    server: &ServerChannelConfig,
    local_root: &Path,
    direction: Direction,
) -> PathBuf {
    let override_dir = match direction {
        Direction::Download => &server.local_download_dir,
        Direction::Upload => &server.local_upload_dir,
        Direction::Archive => &server.local_archive_dir,
    };
    match override_dir {
        Some(dir) => dir.clone(),
        None => local_root.join(direction.as_str()).join(&server.name),
    }
}

/// List the plain files directly inside a local directory
pub(crate) async fn list_local_dir(dir: &Path) -> Result<Vec<FileCandidate>> {
    let mut candidates = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        candidates.push(FileCandidate {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.path().to_string_lossy().into_owned(),
            size: metadata.len(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        });
    }
    Ok(candidates)
}

/// Join a remote directory and a file name with a single separator
pub(crate) fn join_remote(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}
