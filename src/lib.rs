//! # fileferry
//!
//! Scheduled file-transfer pipeline library for remote file servers.
//!
//! fileferry periodically moves files between a local filesystem and a set
//! of independently configured remote servers, running up to three
//! directional pipelines per server — download, upload, archive — each
//! gated by a poll trigger, a filter chain, and a retryable processing
//! hook.
//!
//! ## Design Philosophy
//!
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Transport-agnostic** - The remote side is a trait; bring your own
//!   SFTP/FTPS/object-store session implementation
//! - **Event-driven** - Consumers subscribe to engine events, no polling
//! - **Failure-isolated** - One candidate failing never takes down its
//!   tick, pipeline, or siblings
//!
//! ## Quick Start
//!
//! ```no_run
//! use fileferry::{
//!     Config, PipelineRegistry, ProcessorRegistry, ServerChannelConfig,
//!     SessionRegistry, run_with_shutdown,
//! };
//! use fileferry::transaction::NoopTransaction;
//! use std::sync::Arc;
//!
//! # fn sftp_factory() -> Arc<dyn fileferry::SessionFactory> { unimplemented!() }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = ServerChannelConfig::new("alpha", "files.example.com");
//!     server.from = Some("/outbox".to_string());
//!     server.enable_metadata_store = true;
//!
//!     let config = Config {
//!         servers: vec![server],
//!         ..Default::default()
//!     };
//!
//!     let mut sessions = SessionRegistry::new();
//!     sessions.register("alpha", sftp_factory(), 10);
//!
//!     let mut registry = PipelineRegistry::new(
//!         config,
//!         sessions,
//!         ProcessorRegistry::default(),
//!         Arc::new(NoopTransaction),
//!     )
//!     .await?;
//!
//!     registry.start_all();
//!     run_with_shutdown(registry).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types and validation
pub mod config;
/// Error types
pub mod error;
/// Candidate filter chain
pub mod filter;
/// Processing hooks
pub mod hooks;
/// Transfer pipelines
pub mod pipeline;
/// Pipeline registry (root orchestrator)
pub mod registry;
/// Retry executor with exponential backoff
pub mod retry;
/// Remote session abstraction and pooling
pub mod session;
/// Seen-identity stores for dedup
pub mod store;
/// Transaction boundary around hooks
pub mod transaction;
/// Poll triggers (fixed delay, time window)
pub mod trigger;
/// Core types and events
pub mod types;
/// Shared bounded worker pool
pub mod worker;

// Re-export commonly used types
pub use config::{
    Config, OverflowPolicy, PersistenceConfig, PollerConfig, PollerKind, RetryConfig,
    ServerChannelConfig, Violation, WorkerPoolConfig,
};
pub use error::{DatabaseError, Error, Result, TransferError};
pub use hooks::{FileProcessor, NoopFileProcessor, ProcessorRegistry};
pub use pipeline::TransferPipeline;
pub use registry::{PipelineHandle, PipelineRegistry};
pub use session::{PooledSession, RemoteSession, SessionFactory, SessionPool, SessionRegistry};
pub use store::{InMemorySeenStore, MetadataStore, SeenStore};
pub use transaction::{NoopTransaction, TransactionBoundary};
pub use trigger::PollTrigger;
pub use types::{CandidateOutcome, Direction, Event, FileCandidate, TickPhase};

/// Run the registry until a termination signal arrives, then shut down.
///
/// - **Unix:** listens for SIGTERM and SIGINT, falling back to
///   `tokio::signal::ctrl_c()` if registration fails.
/// - **Windows/other:** listens for Ctrl+C.
pub async fn run_with_shutdown(registry: registry::PipelineRegistry) -> Result<()> {
    wait_for_signal().await;
    registry.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration can fail in restricted environments (containers,
    // tests); degrade to ctrl_c rather than refusing to run.
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                _ = sigint.recv() => tracing::info!("received SIGINT"),
            }
        }
        _ => {
            tracing::warn!("could not register signal handlers, waiting for Ctrl+C");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received Ctrl+C"),
        Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl+C"),
    }
}
