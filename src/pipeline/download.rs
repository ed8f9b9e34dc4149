//! Download direction: remote `from` directory → local staging directory

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::TransferPipeline;
use crate::error::{Error, Result};
use crate::types::{CandidateOutcome, FileCandidate, TickPhase};

impl TransferPipeline {
    /// List the remote source directory
    pub(crate) async fn list_download(&self) -> Result<Vec<FileCandidate>> {
        let from = self.remote_from()?;
        let session = self.sessions.acquire().await?;
        session.list(from).await
    }

    /// Transfer one accepted candidate into local staging, optionally delete
    /// the remote source, then run the `after_download` hook
    pub(crate) async fn process_download(
        &self,
        candidate: FileCandidate,
        cancel: &CancellationToken,
    ) -> Result<CandidateOutcome> {
        let local_path = self.local_dir().join(&candidate.name);

        tracing::debug!(
            flow_id = %self.flow_id(),
            name = %candidate.name,
            phase = %TickPhase::Transferring,
            local = %local_path.display(),
            "downloading"
        );
        {
            let session = self.sessions.acquire().await?;
            session.download(&candidate.path, &local_path).await?;
            if self.server.delete_after_download {
                session.delete(&candidate.path).await?;
            }
        }

        tracing::debug!(
            flow_id = %self.flow_id(),
            name = %candidate.name,
            phase = %TickPhase::Hook,
            "running after_download hook"
        );
        let processor = Arc::clone(&self.processor);
        let server = self.server.name.clone();
        let path = local_path.clone();
        self.run_hook("after_download", cancel, move || {
            let processor = Arc::clone(&processor);
            let server = server.clone();
            let path = path.clone();
            async move { processor.after_download(&path, &server).await }
        })
        .await?;

        Ok(CandidateOutcome::Completed)
    }

    pub(crate) fn remote_from(&self) -> Result<&str> {
        self.server.from.as_deref().ok_or_else(|| Error::Config {
            message: format!("server {} has no 'from' directory", self.server.name),
            key: Some("from".into()),
        })
    }
}
