//! Processing hooks invoked at pipeline checkpoints
//!
//! Embedding applications implement [`FileProcessor`] to run custom logic
//! after a download lands, before a file is uploaded, and around an archive
//! move. Every method defaults to a no-op, so implementations override only
//! the checkpoints they care about.
//!
//! Hook failures are retried per the pipeline's retry policy and run inside
//! the configured transaction boundary; see
//! [`crate::pipeline::TransferPipeline`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;

/// Per-checkpoint callbacks for one or more servers
#[async_trait]
pub trait FileProcessor: Send + Sync {
    /// Called after a file has been downloaded into the local staging
    /// directory (and after the optional remote delete)
    async fn after_download(&self, _file: &Path, _server: &str) -> Result<()> {
        Ok(())
    }

    /// Called before a local file is uploaded to the remote target
    async fn before_upload(&self, _file: &Path, _server: &str) -> Result<()> {
        Ok(())
    }

    /// Called before a remote file is archived
    ///
    /// Receives the proposed destination (`{archive}/{name}`) and returns
    /// the destination to actually move to, or `None` to skip the candidate
    /// entirely — nothing is moved and [`FileProcessor::after_archive`] is
    /// never invoked. The default keeps the proposed destination.
    async fn before_archive(&self, destination: &str, _server: &str) -> Result<Option<String>> {
        Ok(Some(destination.to_owned()))
    }

    /// Called after a remote file has been moved to its archive destination
    async fn after_archive(&self, _destination: &str, _server: &str) -> Result<()> {
        Ok(())
    }
}

/// Processor that keeps every default no-op
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopFileProcessor;

#[async_trait]
impl FileProcessor for NoopFileProcessor {}

/// Resolves the processor for a server at pipeline-construction time
///
/// A server without a dedicated registration gets the global default.
/// Resolution happens once per pipeline, not per call.
pub struct ProcessorRegistry {
    default: Arc<dyn FileProcessor>,
    by_server: HashMap<String, Arc<dyn FileProcessor>>,
}

impl ProcessorRegistry {
    /// Registry whose global default is the given processor
    pub fn new(default: Arc<dyn FileProcessor>) -> Self {
        Self {
            default,
            by_server: HashMap::new(),
        }
    }

    /// Register a processor for one server
    pub fn register(&mut self, server: impl Into<String>, processor: Arc<dyn FileProcessor>) {
        self.by_server.insert(server.into(), processor);
    }

    /// The processor for a server, falling back to the global default
    pub fn processor_for(&self, server: &str) -> Arc<dyn FileProcessor> {
        self.by_server
            .get(server)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.default))
    }
}

impl Default for ProcessorRegistry {
    /// Registry whose global default is [`NoopFileProcessor`]
    fn default() -> Self {
        Self::new(Arc::new(NoopFileProcessor))
    }
}
