//! Common types and utilities shared across sieve crates.
//!
//! This crate defines the record model, the fetcher boundary, the per-run
//! logging context, observability helpers, and the shared error type used
//! throughout the sieve workspace. It is intentionally lightweight so that
//! every crate can depend on it without introducing heavy transitive costs.
//!
//! # Overview
//!
//! - [`model`]: [`Record`], [`FetchOutcome`], [`RunStatistics`],
//!   [`SearchCriteria`] and friends
//! - [`text`]: tag extraction and context excerpts
//! - [`observability`]: Centralised tracing/logging initialisation
//! - [`RunContext`]: explicit logging handle passed to collectors and engines
//! - [`Fetcher`]: boundary trait implemented by source fetchers
//! - [`SieveError`] and [`Result`]: Shared error handling
//!
//! # Examples
//!
//! Building a record and a criteria set:
//!
//! ```rust
//! use sieve_common::{Record, SearchCriteria};
//!
//! let record = Record::new("chan/1", "chan", "Release notes #rust by @ferris")
//!     .with_views(1_200);
//! assert_eq!(record.hashtags, vec!["rust".to_string()]);
//! assert_eq!(record.mentions, vec!["ferris".to_string()]);
//!
//! let criteria = SearchCriteria::new(["release"]).with_min_views(1_000);
//! assert_eq!(criteria.min_views, Some(1_000));
//! ```
use std::time::Duration;

use tracing::Span;
use uuid::Uuid;

pub mod model;
pub mod observability;
pub mod text;

pub use model::{
    FailureReason, FetchOutcome, RankedResult, Record, RunStatistics, SearchCriteria,
    SearchSummary, SourceFailure,
};

/// Boundary to whatever actually retrieves records for one source.
///
/// Implementations own their retry and backoff policy. Expected per-source
/// problems are reported as [`FetchOutcome::Failure`], never as a panic.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, source_id: &str, timeout: Duration) -> FetchOutcome;
}

/// Per-invocation logging handle.
///
/// Collectors and search engines receive one of these at construction and emit
/// all of their events inside its span, so concurrent runs in one process stay
/// distinguishable by `run_id`.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: Uuid,
    span: Span,
}

impl RunContext {
    pub fn new() -> Self {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("sieve.run", run_id = %run_id);
        Self { run_id, span }
    }

    /// Attach to a caller-supplied span instead of creating a fresh one.
    pub fn with_span(span: Span) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            span,
        }
    }

    /// A context whose span records nothing.
    pub fn disabled() -> Self {
        Self::with_span(Span::none())
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Error types used across the sieve system.
#[derive(thiserror::Error, Debug)]
pub enum SieveError {
    /// Call-time input was structurally invalid; raised before any work starts.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An internal actor stopped before answering.
    #[error("Actor error: {0}")]
    Actor(String),
}

/// Convenient alias for results that use [`SieveError`].
pub type Result<T> = std::result::Result<T, SieveError>;
