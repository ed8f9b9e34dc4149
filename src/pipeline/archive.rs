//! Archive direction: remote file moved into the remote `archive` directory
//!
//! The pipeline polls a local trigger directory; each trigger file's name
//! names a remote file in the server's `from` directory. The `before_archive`
//! hook sees the proposed destination `{archive}/{name}` and may rewrite it
//! or veto the move entirely by returning `None`, in which case nothing is
//! moved and `after_archive` never runs. Trigger files are not consumed on
//! success; the dedup filter, when enabled, keeps them from re-firing.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{TransferPipeline, join_remote};
use crate::error::{Error, Result};
use crate::types::{CandidateOutcome, FileCandidate, TickPhase};

impl TransferPipeline {
    /// Run the archive hooks around a remote rename for one accepted trigger
    pub(crate) async fn process_archive(
        &self,
        candidate: FileCandidate,
        cancel: &CancellationToken,
    ) -> Result<CandidateOutcome> {
        let archive = self.remote_archive()?;
        let source = join_remote(self.remote_from()?, &candidate.name);
        let proposed = join_remote(archive, &candidate.name);

        tracing::debug!(
            flow_id = %self.flow_id(),
            name = %candidate.name,
            phase = %TickPhase::Hook,
            proposed = %proposed,
            "running before_archive hook"
        );
        let processor = Arc::clone(&self.processor);
        let server = self.server.name.clone();
        let hook_dest = proposed.clone();
        let destination = self
            .run_hook("before_archive", cancel, move || {
                let processor = Arc::clone(&processor);
                let server = server.clone();
                let dest = hook_dest.clone();
                async move { processor.before_archive(&dest, &server).await }
            })
            .await?;

        let Some(destination) = destination else {
            tracing::debug!(
                flow_id = %self.flow_id(),
                name = %candidate.name,
                "before_archive signalled skip, dropping candidate"
            );
            return Ok(CandidateOutcome::Skipped);
        };

        tracing::debug!(
            flow_id = %self.flow_id(),
            name = %candidate.name,
            phase = %TickPhase::Transferring,
            source = %source,
            destination = %destination,
            "archiving remote file"
        );
        {
            let session = self.sessions.acquire().await?;
            session.rename(&source, &destination).await?;
        }

        tracing::debug!(
            flow_id = %self.flow_id(),
            name = %candidate.name,
            phase = %TickPhase::Hook,
            "running after_archive hook"
        );
        let processor = Arc::clone(&self.processor);
        let server = self.server.name.clone();
        let dest = destination.clone();
        self.run_hook("after_archive", cancel, move || {
            let processor = Arc::clone(&processor);
            let server = server.clone();
            let dest = dest.clone();
            async move { processor.after_archive(&dest, &server).await }
        })
        .await?;

        Ok(CandidateOutcome::Completed)
    }

    fn remote_archive(&self) -> Result<&str> {
        self.server.archive.as_deref().ok_or_else(|| Error::Config {
            message: format!("server {} has no 'archive' directory", self.server.name),
            key: Some("archive".into()),
        })
    }
}
