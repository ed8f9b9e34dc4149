//! Remote session abstraction and per-server session pooling
//!
//! The engine never talks to a wire protocol directly. Everything it needs
//! from a remote namespace is behind [`RemoteSession`]; a transport crate
//! (SFTP, FTPS, a cloud bucket) implements it plus a [`SessionFactory`],
//! and [`SessionPool`] caches up to `cache_size` live sessions per server
//! behind a semaphore so worker threads across pipelines can share them.
//!
//! Pools live in a [`SessionRegistry`] keyed by server name, owned by the
//! root [`crate::registry::PipelineRegistry`] — an explicit arena, not
//! global state.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{Result, TransferError};
use crate::types::FileCandidate;

/// One live connection to a remote file namespace
///
/// `mkdir` must be idempotent: creating a directory that already exists is
/// success. All paths are remote-namespace strings; local files are
/// [`Path`]s.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// List the files directly inside `dir`
    async fn list(&self, dir: &str) -> Result<Vec<FileCandidate>>;

    /// Copy a remote file to a local path
    async fn download(&self, remote: &str, local: &Path) -> Result<()>;

    /// Copy a local file to a remote path
    async fn upload(&self, local: &Path, remote: &str) -> Result<()>;

    /// Delete a remote file
    async fn delete(&self, path: &str) -> Result<()>;

    /// Move/rename a remote file
    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Whether a remote path exists
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Create a remote directory (idempotent)
    async fn mkdir(&self, dir: &str) -> Result<()>;
}

/// Produces sessions for one server
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Open a new session
    async fn connect(&self) -> Result<Box<dyn RemoteSession>>;
}

/// Bounded cache of live sessions for one server
///
/// At most `cache_size` sessions exist at once; acquiring beyond that waits
/// until a checked-out session is returned. Returned sessions go back to the
/// idle list for reuse rather than being torn down.
pub struct SessionPool {
    server: String,
    factory: Arc<dyn SessionFactory>,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<Box<dyn RemoteSession>>>,
}

impl SessionPool {
    /// Create a pool bounded at `cache_size` concurrent sessions
    pub fn new(
        server: impl Into<String>,
        factory: Arc<dyn SessionFactory>,
        cache_size: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            server: server.into(),
            factory,
            permits: Arc::new(Semaphore::new(cache_size.max(1))),
            idle: Mutex::new(Vec::new()),
        })
    }

    /// Server this pool belongs to
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Check out a session, reusing an idle one when available
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledSession> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransferError::SessionUnavailable {
                server: self.server.clone(),
                reason: "session pool closed".into(),
            })?;

        let cached = {
            let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
            idle.pop()
        };

        let session = match cached {
            Some(session) => session,
            None => self.factory.connect().await?,
        };

        Ok(PooledSession {
            pool: Arc::clone(self),
            session: Some(session),
            _permit: permit,
        })
    }
}

/// RAII guard around a checked-out session; returns it to the pool on drop
pub struct PooledSession {
    pool: Arc<SessionPool>,
    session: Option<Box<dyn RemoteSession>>,
    _permit: OwnedSemaphorePermit,
}

impl std::ops::Deref for PooledSession {
    type Target = dyn RemoteSession;

    fn deref(&self) -> &Self::Target {
        match &self.session {
            Some(session) => session.as_ref(),
            // Invariant: `session` is Some for the guard's whole lifetime.
            None => unreachable!("session already returned to pool"),
        }
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            let mut idle = self.pool.idle.lock().unwrap_or_else(|e| e.into_inner());
            idle.push(session);
        }
    }
}

/// Arena of session pools keyed by server name
#[derive(Default)]
pub struct SessionRegistry {
    pools: HashMap<String, Arc<SessionPool>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for a server, replacing any previous registration
    pub fn register(
        &mut self,
        server: impl Into<String>,
        factory: Arc<dyn SessionFactory>,
        cache_size: usize,
    ) {
        let server = server.into();
        let pool = SessionPool::new(server.clone(), factory, cache_size);
        self.pools.insert(server, pool);
    }

    /// The pool for a server, if one is registered
    pub fn pool(&self, server: &str) -> Option<Arc<SessionPool>> {
        self.pools.get(server).cloned()
    }
}
