//! Pipeline registry: the root orchestrator
//!
//! Owns one [`TransferPipeline`] per (server, enabled direction) plus the
//! resources they share: the session-pool arena, the durable metadata store,
//! the bounded worker pool, and the event broadcast channel. Registration
//! happens once, after the configuration passes its validation pass;
//! pipelines are then started and stopped by `(server, direction)` key.
//!
//! # Example
//!
//! ```no_run
//! use fileferry::config::Config;
//! use fileferry::hooks::ProcessorRegistry;
//! use fileferry::registry::PipelineRegistry;
//! use fileferry::session::SessionRegistry;
//! use fileferry::transaction::NoopTransaction;
//! use std::sync::Arc;
//!
//! # async fn example(sessions: SessionRegistry) -> fileferry::Result<()> {
//! let config = Config::default();
//! let mut registry = PipelineRegistry::new(
//!     config,
//!     sessions,
//!     ProcessorRegistry::default(),
//!     Arc::new(NoopTransaction),
//! )
//! .await?;
//!
//! registry.start_all();
//! // ... later ...
//! registry.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::hooks::ProcessorRegistry;
use crate::pipeline::{PipelineSpec, TransferPipeline};
use crate::session::SessionRegistry;
use crate::store::MetadataStore;
use crate::transaction::TransactionBoundary;
use crate::trigger::PollTrigger;
use crate::types::{Direction, Event};
use crate::worker::WorkerPool;

/// Event channel capacity; laggy subscribers drop old events, never block
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Runtime registration of one pipeline
#[derive(Clone, Debug)]
pub struct PipelineHandle {
    /// Flow identifier (`direction-server`)
    pub flow_id: String,
    /// Owning server name
    pub server: String,
    /// Pipeline direction
    pub direction: Direction,
    /// Whether the scheduler loop is currently running
    pub running: bool,
}

struct RunningPipeline {
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

struct PipelineEntry {
    pipeline: Arc<TransferPipeline>,
    running: Option<RunningPipeline>,
}

/// Owns every registered pipeline and the resources they share
pub struct PipelineRegistry {
    config: Arc<Config>,
    store: Arc<MetadataStore>,
    event_tx: broadcast::Sender<Event>,
    entries: HashMap<(String, Direction), PipelineEntry>,
}

impl std::fmt::Debug for PipelineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRegistry")
            .field("entries", &self.entries.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl PipelineRegistry {
    /// Validate the configuration and register a pipeline per (server,
    /// enabled direction)
    ///
    /// Fails fast on validation violations and on servers without a
    /// registered session factory. A pipeline whose local directory cannot
    /// be created is halted (logged, never ticks) without affecting its
    /// siblings.
    pub async fn new(
        config: Config,
        sessions: SessionRegistry,
        processors: ProcessorRegistry,
        tx_boundary: Arc<dyn TransactionBoundary>,
    ) -> Result<Self> {
        let config = Arc::new(config.validated()?);
        let store = Arc::new(MetadataStore::new(&config.persistence.database_path).await?);
        let workers = WorkerPool::new(&config.throughput);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let mut entries = HashMap::new();
        for server_config in &config.servers {
            let server = Arc::new(server_config.clone());
            let pool = sessions.pool(&server.name).ok_or_else(|| Error::Config {
                message: format!(
                    "no session factory registered for server {}",
                    server.name
                ),
                key: Some("servers".into()),
            })?;
            let processor = processors.processor_for(&server.name);
            let trigger =
                PollTrigger::from_config(server.poller.as_ref().or(Some(&config.default_poller)));
            let retry = server
                .retry
                .clone()
                .unwrap_or_else(|| config.default_retry.clone());

            for direction in server.enabled_directions() {
                let spec = PipelineSpec {
                    server: Arc::clone(&server),
                    direction,
                    trigger: trigger.clone(),
                    retry: retry.clone(),
                    local_root: config.local_dir.clone(),
                    sessions: Arc::clone(&pool),
                    processor: Arc::clone(&processor),
                    tx_boundary: Arc::clone(&tx_boundary),
                    workers: Arc::clone(&workers),
                    metadata_store: store.clone(),
                    event_tx: event_tx.clone(),
                };
                match TransferPipeline::new(spec) {
                    Ok(pipeline) => {
                        entries.insert(
                            (server.name.clone(), direction),
                            PipelineEntry {
                                pipeline,
                                running: None,
                            },
                        );
                    }
                    Err(e @ Error::DirectoryCreation { .. }) => {
                        tracing::error!(
                            server = %server.name,
                            direction = %direction,
                            error = %e,
                            "pipeline halted: local directory could not be created"
                        );
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(Self {
            config,
            store,
            event_tx,
            entries,
        })
    }

    /// The validated configuration this registry was built from
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Handles for every registered pipeline
    pub fn handles(&self) -> Vec<PipelineHandle> {
        self.entries
            .iter()
            .map(|((server, direction), entry)| PipelineHandle {
                flow_id: entry.pipeline.flow_id().to_owned(),
                server: server.clone(),
                direction: *direction,
                running: entry.running.is_some(),
            })
            .collect()
    }

    /// Whether the scheduler loop for a pipeline is currently running
    pub fn is_running(&self, server: &str, direction: Direction) -> bool {
        self.entries
            .get(&(server.to_owned(), direction))
            .is_some_and(|entry| entry.running.is_some())
    }

    /// Start one pipeline's scheduler loop; a no-op if already running
    pub fn start(&mut self, server: &str, direction: Direction) -> Result<()> {
        let entry = self
            .entries
            .get_mut(&(server.to_owned(), direction))
            .ok_or_else(|| {
                Error::Other(format!(
                    "no pipeline registered for {}",
                    direction.flow_id(server)
                ))
            })?;
        if entry.running.is_some() {
            return Ok(());
        }
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&entry.pipeline).run(cancel.clone()));
        entry.running = Some(RunningPipeline { cancel, task });
        Ok(())
    }

    /// Start every registered pipeline
    pub fn start_all(&mut self) {
        let keys: Vec<_> = self.entries.keys().cloned().collect();
        for (server, direction) in keys {
            // Keys come from the map itself, so start cannot miss.
            let _ = self.start(&server, direction);
        }
    }

    /// Stop one pipeline: cancel its loop and await the task
    pub async fn stop(&mut self, server: &str, direction: Direction) -> Result<()> {
        let entry = self
            .entries
            .get_mut(&(server.to_owned(), direction))
            .ok_or_else(|| {
                Error::Other(format!(
                    "no pipeline registered for {}",
                    direction.flow_id(server)
                ))
            })?;
        if let Some(running) = entry.running.take() {
            running.cancel.cancel();
            if let Err(e) = running.task.await {
                tracing::warn!(
                    server = %server,
                    direction = %direction,
                    error = %e,
                    "pipeline task did not join cleanly"
                );
            }
        }
        Ok(())
    }

    /// Stop every running pipeline
    pub async fn stop_all(&mut self) {
        let keys: Vec<_> = self.entries.keys().cloned().collect();
        for (server, direction) in keys {
            let _ = self.stop(&server, direction).await;
        }
    }

    /// Stop everything and close the metadata store
    pub async fn shutdown(mut self) -> Result<()> {
        tracing::info!("shutting down pipeline registry");
        self.stop_all().await;
        self.store.close().await;
        Ok(())
    }
}
