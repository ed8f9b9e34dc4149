//! Core types and events for fileferry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transfer direction of a pipeline
///
/// Each configured server may run up to three pipelines, one per direction.
/// A direction is enabled by the presence of the corresponding remote path
/// in the server configuration (`from`, `to`, `archive`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Remote `from` directory → local staging directory
    Download,
    /// Local staging directory → remote `to` directory
    Upload,
    /// Remote file moved into the remote `archive` directory, driven by a
    /// local trigger directory
    Archive,
}

impl Direction {
    /// All directions, in registration order
    pub const ALL: [Direction; 3] = [Direction::Download, Direction::Upload, Direction::Archive];

    /// Short lowercase label, also used as the local staging sub-directory name
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Download => "download",
            Direction::Upload => "upload",
            Direction::Archive => "archive",
        }
    }

    /// Unique flow identifier for a (server, direction) pipeline
    pub fn flow_id(&self, server: &str) -> String {
        format!("{}-{}", self.as_str(), server)
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file discovered during a listing pass
///
/// Candidates are recreated on every tick and never outlive the tick that
/// produced them. `path` is the full path in the namespace the candidate was
/// listed from (remote for download, local for upload/archive); `name` is the
/// final path component used for pattern matching and destination naming.
#[derive(Clone, Debug, PartialEq)]
pub struct FileCandidate {
    /// File name (final path component)
    pub name: String,
    /// Full path in the source namespace
    pub path: String,
    /// Size in bytes
    pub size: u64,
    /// Last modification time, when the lister knows it
    pub modified: Option<DateTime<Utc>>,
}

/// Phase of the per-candidate pipeline state machine, used in structured logs
///
/// A tick moves `Idle → Listing → Filtering`, then each accepted candidate
/// independently walks `Transferring → Hook → Commit`, exiting via `Failed`
/// (back to idle, no commit) when the transfer or the hook gives up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickPhase {
    /// Waiting for the next trigger
    Idle,
    /// Listing source candidates
    Listing,
    /// Running the filter chain
    Filtering,
    /// Moving bytes
    Transferring,
    /// Invoking the processing hook (transaction + retry)
    Hook,
    /// Candidate finished, side effects committed
    Commit,
    /// Candidate aborted, source artifact left in place
    Failed,
}

impl std::fmt::Display for TickPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TickPhase::Idle => "idle",
            TickPhase::Listing => "listing",
            TickPhase::Filtering => "filtering",
            TickPhase::Transferring => "transferring",
            TickPhase::Hook => "hook",
            TickPhase::Commit => "commit",
            TickPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Outcome of processing one accepted candidate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CandidateOutcome {
    /// Candidate fully processed and committed
    Completed,
    /// Candidate dropped by a hook (archive pre-hook skip); nothing was moved
    Skipped,
}

/// Events emitted by the engine
///
/// Consumers subscribe via [`crate::registry::PipelineRegistry::subscribe`];
/// no polling is required. Events are broadcast best-effort: slow receivers
/// may observe lagged gaps, never blocked pipelines.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A pipeline scheduler loop started
    PipelineStarted {
        /// Flow identifier (`direction-server`)
        flow_id: String,
    },
    /// A pipeline scheduler loop exited
    PipelineStopped {
        /// Flow identifier
        flow_id: String,
    },
    /// One listing pass finished, with per-tick counts
    TickCompleted {
        /// Flow identifier
        flow_id: String,
        /// Candidates returned by the listing
        listed: usize,
        /// Candidates accepted by the filter chain
        accepted: usize,
        /// Accepted candidates that failed processing
        failed: usize,
    },
    /// One candidate was fully processed
    CandidateCompleted {
        /// Flow identifier
        flow_id: String,
        /// Candidate file name
        name: String,
    },
    /// One candidate was dropped by a skip-signalling hook
    CandidateSkipped {
        /// Flow identifier
        flow_id: String,
        /// Candidate file name
        name: String,
    },
    /// One candidate failed; its siblings in the same tick are unaffected
    CandidateFailed {
        /// Flow identifier
        flow_id: String,
        /// Candidate file name
        name: String,
        /// Rendered error
        error: String,
    },
}
