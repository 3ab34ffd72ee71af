//! Small tokio actor runtime plus the actors the collector and fetchers share.
//!
//! - [`actor`]: the `Actor` trait, bounded mailboxes and spawn helpers
//! - [`rate`]: token-bucket rate limiter keyed by upstream host
//! - [`stats`]: run statistics aggregator behind a single-consumer mailbox
//! - [`system`]: task tracking and broadcast shutdown
pub mod actor;
pub mod rate;
pub mod stats;
pub mod system;

pub use stats::{StatsActor, StatsCollector, StatsHandle, StatsMsg};
