//! Bounded pool of expensive remote sessions
//!
//! [`ConnectionPool`] keeps between `min_size` and `max_size` sessions alive
//! and lends them out as [`Lease`]s. When every session is borrowed, callers
//! queue and are served strictly in arrival order: a released session goes
//! straight to the longest waiter instead of back to the idle list.
//!
//! Sessions come from a [`SessionFactory`]. Creation errors are handed to
//! the caller unretried; wrap acquisition in a retry policy if that is wanted.
//!
//! ```text
//!   acquire ──► idle? ──yes──► Lease
//!                │no
//!                ▼
//!          total < max? ──yes──► factory.create() ──► Lease
//!                │no
//!                ▼
//!          FIFO waiters ◄── release() hands off to the head waiter
//! ```
//!
//! A background task evicts sessions that sat idle longer than
//! `idle_timeout`, never dropping the pool below `min_size`.

mod config;
mod core;
mod lease;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use self::config::{PoolConfig, PoolConfigBuilder};
pub use self::core::{ConnectionPool, PoolMetrics};
pub use self::lease::Lease;

/// Creates, checks and tears down pooled sessions.
#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    /// Session handed out inside a [`Lease`].
    type Session: Send + Sync + 'static;
    /// Error produced when a session cannot be established.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Establish a new session.
    async fn create(&self) -> Result<Self::Session, Self::Error>;

    /// Report whether a released session is still usable.
    async fn validate(&self, session: &Self::Session) -> bool {
        let _ = session;
        true
    }

    /// Dispose of a session leaving the pool.
    fn destroy(&self, session: Self::Session) {
        drop(session);
    }
}

/// Errors returned by [`ConnectionPool::acquire`].
#[derive(Debug, Error)]
pub enum PoolError<E>
where
    E: std::error::Error + 'static,
{
    /// No session became available before the timeout.
    #[error("Timed out after {waited:?} waiting for a pooled session ({pending} still queued)")]
    AcquireTimeout { waited: Duration, pending: usize },

    /// The pool has been shut down.
    #[error("Connection pool is shut down")]
    Closed,

    /// The factory failed to establish a session.
    #[error("Failed to establish session: {source}")]
    Create {
        #[source]
        source: E,
    },
}
