//! Transaction boundary around processing hooks
//!
//! The boundary scopes exactly one hook invocation (including all of its
//! retry attempts): `begin` once, `commit` when the hook finally succeeds,
//! `rollback` when the retry policy gives up. It does not cover the
//! transfer step — a successful transfer followed by a failing hook cannot
//! be rolled back at this layer.
//!
//! Embedders with real transactional resources (a database the hooks write
//! to, a message broker) implement [`TransactionBoundary`] against them;
//! the default [`NoopTransaction`] makes every operation a successful
//! no-op.

use async_trait::async_trait;

use crate::error::Result;

/// Scoped begin/commit/rollback wrapper for hook execution
#[async_trait]
pub trait TransactionBoundary: Send + Sync {
    /// Open the scope
    async fn begin(&self) -> Result<()>;

    /// Make the scope's effects durable
    async fn commit(&self) -> Result<()>;

    /// Discard the scope's effects
    async fn rollback(&self) -> Result<()>;
}

/// Transaction boundary that does nothing, successfully
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTransaction;

#[async_trait]
impl TransactionBoundary for NoopTransaction {
    async fn begin(&self) -> Result<()> {
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        Ok(())
    }
}
