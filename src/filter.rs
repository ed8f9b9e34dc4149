//! Candidate filter chain
//!
//! A [`FilterChain`] is a logical AND of the sub-filters the server
//! configuration asks for: a dedup filter when `enable_metadata_store` is
//! set, a regex pattern filter when `file_pattern` is set, and a size filter
//! when either size bound is set. When no sub-filter is configured the chain
//! is absent and every candidate passes unconditionally.
//!
//! The dedup filter marks an identity as seen at the moment it accepts it,
//! before any later filter or processing step runs. A candidate that fails a
//! later step has already burned its one acceptance and will not be retried
//! automatically.

use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;

use crate::config::ServerChannelConfig;
use crate::error::{Error, Result};
use crate::store::SeenStore;
use crate::types::FileCandidate;

/// Accept/reject predicate over listing candidates
#[async_trait]
pub trait CandidateFilter: Send + Sync {
    /// Whether the candidate should be processed
    async fn accept(&self, candidate: &FileCandidate) -> Result<bool>;
}

/// Accepts each identity exactly once, marking it seen on acceptance
pub struct DedupFilter {
    store: Arc<dyn SeenStore>,
    prefix: String,
}

impl DedupFilter {
    /// Create a dedup filter whose keys are namespaced by `prefix`
    /// (the owning flow id, so pipelines never collide in a shared store)
    pub fn new(store: Arc<dyn SeenStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    fn key(&self, candidate: &FileCandidate) -> String {
        format!("{}:{}", self.prefix, candidate.path)
    }
}

#[async_trait]
impl CandidateFilter for DedupFilter {
    async fn accept(&self, candidate: &FileCandidate) -> Result<bool> {
        let key = self.key(candidate);
        if self.store.seen(&key).await? {
            return Ok(false);
        }
        self.store.mark_seen(&key).await?;
        Ok(true)
    }
}

/// Accepts candidates whose name matches a configured regex
#[derive(Debug)]
pub struct PatternFilter {
    pattern: Regex,
}

impl PatternFilter {
    /// Compile the pattern; an invalid regex is a configuration error
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| Error::Config {
            message: format!("invalid file pattern: {e}"),
            key: Some("file_pattern".into()),
        })?;
        Ok(Self { pattern })
    }
}

#[async_trait]
impl CandidateFilter for PatternFilter {
    async fn accept(&self, candidate: &FileCandidate) -> Result<bool> {
        Ok(self.pattern.is_match(&candidate.name))
    }
}

/// Accepts candidates whose size is within `[min, max]`, both bounds
/// inclusive and each optional
pub struct SizeFilter {
    min: Option<u64>,
    max: Option<u64>,
}

impl SizeFilter {
    /// Create a size filter; an absent bound is unbounded on that side
    pub fn new(min: Option<u64>, max: Option<u64>) -> Self {
        Self { min, max }
    }
}

#[async_trait]
impl CandidateFilter for SizeFilter {
    async fn accept(&self, candidate: &FileCandidate) -> Result<bool> {
        if let Some(min) = self.min
            && candidate.size < min
        {
            return Ok(false);
        }
        if let Some(max) = self.max
            && candidate.size > max
        {
            return Ok(false);
        }
        Ok(true)
    }
}

/// AND-composition of installed sub-filters
pub struct FilterChain {
    filters: Vec<Box<dyn CandidateFilter>>,
}

impl FilterChain {
    /// Compose a chain from sub-filters
    pub fn new(filters: Vec<Box<dyn CandidateFilter>>) -> Self {
        Self { filters }
    }

    /// Accept only candidates every sub-filter accepts
    pub async fn accept(&self, candidate: &FileCandidate) -> Result<bool> {
        for filter in &self.filters {
            if !filter.accept(candidate).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Build the filter chain a server configuration asks for
///
/// `seen_store` is the identity space for this pipeline's dedup filter —
/// the shared durable store for download, a pipeline-private in-memory
/// store for upload/archive. Returns `None` when no sub-filter is
/// configured, in which case every candidate is accepted.
pub fn build_chain(
    server: &ServerChannelConfig,
    flow_id: &str,
    seen_store: Arc<dyn SeenStore>,
) -> Result<Option<FilterChain>> {
    let mut filters: Vec<Box<dyn CandidateFilter>> = Vec::new();

    if server.enable_metadata_store {
        filters.push(Box::new(DedupFilter::new(seen_store, flow_id)));
    }
    if let Some(pattern) = &server.file_pattern {
        filters.push(Box::new(PatternFilter::new(pattern)?));
    }
    if server.min_file_size.is_some() || server.max_file_size.is_some() {
        filters.push(Box::new(SizeFilter::new(
            server.min_file_size,
            server.max_file_size,
        )));
    }

    if filters.is_empty() {
        Ok(None)
    } else {
        Ok(Some(FilterChain::new(filters)))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemorySeenStore;

    fn candidate(name: &str, size: u64) -> FileCandidate {
        FileCandidate {
            name: name.to_owned(),
            path: format!("/in/{name}"),
            size,
            modified: None,
        }
    }

    #[tokio::test]
    async fn empty_chain_accepts_every_candidate() {
        let chain = FilterChain::new(Vec::new());
        assert!(chain.accept(&candidate("anything.bin", 0)).await.unwrap());
        assert!(chain.accept(&candidate("x", u64::MAX)).await.unwrap());
    }

    #[tokio::test]
    async fn pattern_and_size_chain_matches_spec_examples() {
        let chain = FilterChain::new(vec![
            Box::new(PatternFilter::new(r".*\.csv").unwrap()),
            Box::new(SizeFilter::new(Some(100), Some(1000))),
        ]);

        assert!(chain.accept(&candidate("data.csv", 500)).await.unwrap());
        assert!(!chain.accept(&candidate("data.csv", 50)).await.unwrap());
        assert!(!chain.accept(&candidate("data.txt", 500)).await.unwrap());
    }

    #[tokio::test]
    async fn size_bounds_are_inclusive() {
        let filter = SizeFilter::new(Some(100), Some(1000));
        assert!(filter.accept(&candidate("a", 100)).await.unwrap());
        assert!(filter.accept(&candidate("a", 1000)).await.unwrap());
        assert!(!filter.accept(&candidate("a", 99)).await.unwrap());
        assert!(!filter.accept(&candidate("a", 1001)).await.unwrap());
    }

    #[tokio::test]
    async fn absent_size_bound_is_unbounded_on_that_side() {
        let min_only = SizeFilter::new(Some(10), None);
        assert!(min_only.accept(&candidate("a", u64::MAX)).await.unwrap());
        assert!(!min_only.accept(&candidate("a", 9)).await.unwrap());

        let max_only = SizeFilter::new(None, Some(10));
        assert!(max_only.accept(&candidate("a", 0)).await.unwrap());
        assert!(!max_only.accept(&candidate("a", 11)).await.unwrap());
    }

    #[tokio::test]
    async fn dedup_accepts_a_new_identity_exactly_once() {
        let filter = DedupFilter::new(Arc::new(InMemorySeenStore::new()), "download-alpha");
        let c = candidate("a.txt", 1);

        assert!(filter.accept(&c).await.unwrap());
        assert!(!filter.accept(&c).await.unwrap());
        assert!(!filter.accept(&c).await.unwrap());
    }

    #[tokio::test]
    async fn dedup_keys_are_namespaced_by_flow_id() {
        let store: Arc<dyn SeenStore> = Arc::new(InMemorySeenStore::new());
        let download = DedupFilter::new(store.clone(), "download-alpha");
        let upload = DedupFilter::new(store, "upload-alpha");
        let c = candidate("a.txt", 1);

        assert!(download.accept(&c).await.unwrap());
        // Same identity, different flow prefix: still fresh.
        assert!(upload.accept(&c).await.unwrap());
    }

    #[tokio::test]
    async fn dedup_marks_even_when_a_later_filter_rejects() {
        // The dedup filter runs first and marks on acceptance; a pattern
        // rejection afterwards does not unmark the identity.
        let store = Arc::new(InMemorySeenStore::new());
        let chain = FilterChain::new(vec![
            Box::new(DedupFilter::new(store.clone(), "download-alpha")),
            Box::new(PatternFilter::new(r".*\.csv").unwrap()),
        ]);
        let c = candidate("a.txt", 1);

        assert!(!chain.accept(&c).await.unwrap());
        assert!(store.seen("download-alpha:/in/a.txt").await.unwrap());
    }

    #[test]
    fn build_chain_is_absent_without_any_filter_config() {
        let mut server = ServerChannelConfig::new("alpha", "files.example.com");
        server.from = Some("/in".into());
        let chain = build_chain(&server, "download-alpha", Arc::new(InMemorySeenStore::new()))
            .unwrap();
        assert!(chain.is_none());
    }

    #[tokio::test]
    async fn build_chain_installs_configured_filters() {
        let mut server = ServerChannelConfig::new("alpha", "files.example.com");
        server.from = Some("/in".into());
        server.enable_metadata_store = true;
        server.file_pattern = Some(r".*\.csv".into());
        server.min_file_size = Some(100);

        let chain = build_chain(&server, "download-alpha", Arc::new(InMemorySeenStore::new()))
            .unwrap()
            .expect("chain should be installed");

        assert!(chain.accept(&candidate("a.csv", 200)).await.unwrap());
        // Seen now, so the same identity is rejected.
        assert!(!chain.accept(&candidate("a.csv", 200)).await.unwrap());
        // Wrong pattern and too small are both rejected.
        assert!(!chain.accept(&candidate("b.txt", 200)).await.unwrap());
        assert!(!chain.accept(&candidate("c.csv", 50)).await.unwrap());
    }

    #[test]
    fn pattern_filter_rejects_invalid_regex() {
        let err = PatternFilter::new("([unclosed").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
