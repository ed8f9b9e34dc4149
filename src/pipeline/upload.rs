//! Upload direction: local staging directory → remote `to` directory

use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{TransferPipeline, join_remote};
use crate::error::{Error, Result};
use crate::types::{CandidateOutcome, FileCandidate, TickPhase};

impl TransferPipeline {
    /// Run the `before_upload` hook, then transfer one accepted candidate to
    /// the remote target directory (created on demand)
    ///
    /// The local file is left in place after a successful upload; the dedup
    /// filter, when enabled, is what prevents it from being picked up again.
    pub(crate) async fn process_upload(
        &self,
        candidate: FileCandidate,
        cancel: &CancellationToken,
    ) -> Result<CandidateOutcome> {
        let to = self.remote_to()?;
        let local_path = PathBuf::from(&candidate.path);

        tracing::debug!(
            flow_id = %self.flow_id(),
            name = %candidate.name,
            phase = %TickPhase::Hook,
            "running before_upload hook"
        );
        let processor = Arc::clone(&self.processor);
        let server = self.server.name.clone();
        let path = local_path.clone();
        self.run_hook("before_upload", cancel, move || {
            let processor = Arc::clone(&processor);
            let server = server.clone();
            let path = path.clone();
            async move { processor.before_upload(&path, &server).await }
        })
        .await?;

        let remote_path = join_remote(to, &candidate.name);
        tracing::debug!(
            flow_id = %self.flow_id(),
            name = %candidate.name,
            phase = %TickPhase::Transferring,
            remote = %remote_path,
            "uploading"
        );
        let session = self.sessions.acquire().await?;
        if !session.exists(to).await? {
            session.mkdir(to).await?;
        }
        session.upload(&local_path, &remote_path).await?;

        Ok(CandidateOutcome::Completed)
    }

    fn remote_to(&self) -> Result<&str> {
        self.server.to.as_deref().ok_or_else(|| Error::Config {
            message: format!("server {} has no 'to' directory", self.server.name),
            key: Some("to".into()),
        })
    }
}
