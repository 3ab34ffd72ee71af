//! Run statistics aggregation.
//!
//! [`StatsCollector`] is the plain state. [`StatsActor`] owns one behind a
//! bounded mailbox so orchestrator tasks never share mutable counters, and
//! [`StatsHandle`] is the cloneable async facade callers hold.
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use sieve_common::{FailureReason, Record, RunStatistics, SieveError, SourceFailure};
use tokio::sync::oneshot;

use crate::actor::{self, Actor, ActorHandle, Addr, Context};

/// Counters for one collection run.
#[derive(Debug, Default)]
pub struct StatsCollector {
    attempted: usize,
    succeeded: usize,
    failed: usize,
    failures: Vec<SourceFailure>,
    records_per_source: BTreeMap<String, usize>,
    fetched_records: usize,
    seen_ids: HashSet<String>,
    total_views: u64,
    total_reactions: u64,
    authors: HashSet<String>,
    hashtags: HashSet<String>,
    mentions: HashSet<String>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare how many sources the run submitted.
    pub fn set_attempted(&mut self, n: usize) {
        self.attempted = n;
    }

    /// `record_count` is the raw count the fetcher reported, before dedup.
    pub fn record_success(&mut self, source_id: &str, record_count: usize) {
        self.succeeded += 1;
        self.fetched_records += record_count;
        *self
            .records_per_source
            .entry(source_id.to_string())
            .or_default() += record_count;
    }

    pub fn record_failure(&mut self, source_id: &str, reason: FailureReason) {
        self.failed += 1;
        self.failures.push(SourceFailure {
            source_id: source_id.to_string(),
            reason,
            at: Utc::now(),
        });
    }

    /// Fold one record into the engagement sums and distinct sets.
    ///
    /// A record id already counted is ignored, so sums never double-count.
    pub fn record_metrics(&mut self, record: &Record) {
        if !self.seen_ids.insert(record.id.clone()) {
            return;
        }
        self.total_views += record.views;
        self.total_reactions += record.reactions;
        if let Some(author) = &record.author {
            self.authors.insert(author.clone());
        }
        self.hashtags
            .extend(record.hashtags.iter().map(|t| t.to_lowercase()));
        self.mentions
            .extend(record.mentions.iter().map(|m| m.to_lowercase()));
    }

    /// Deep copy of the counters with `duration` set to `elapsed`.
    pub fn snapshot(&self, elapsed: Duration) -> RunStatistics {
        RunStatistics {
            sources_attempted: self.attempted.max(self.succeeded + self.failed),
            sources_succeeded: self.succeeded,
            sources_failed: self.failed,
            failures: self.failures.clone(),
            records_per_source: self.records_per_source.clone(),
            fetched_records: self.fetched_records,
            total_records: self.seen_ids.len(),
            total_views: self.total_views,
            total_reactions: self.total_reactions,
            distinct_authors: self.authors.len(),
            distinct_hashtags: self.hashtags.len(),
            distinct_mentions: self.mentions.len(),
            duration: elapsed,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug)]
pub enum StatsMsg {
    Attempted(usize),
    Success {
        source_id: String,
        record_count: usize,
    },
    Failure {
        source_id: String,
        reason: FailureReason,
    },
    Metrics(Vec<Record>),
    Snapshot {
        elapsed: Duration,
        reply: oneshot::Sender<RunStatistics>,
    },
    Reset,
}

/// Single consumer of stats updates.
#[derive(Default)]
pub struct StatsActor {
    stats: StatsCollector,
}

impl StatsActor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Actor for StatsActor {
    type Msg = StatsMsg;

    async fn handle(&mut self, msg: Self::Msg, _ctx: &mut Context<Self>) -> Result<()> {
        match msg {
            StatsMsg::Attempted(n) => self.stats.set_attempted(n),
            StatsMsg::Success {
                source_id,
                record_count,
            } => self.stats.record_success(&source_id, record_count),
            StatsMsg::Failure { source_id, reason } => {
                tracing::debug!(source_id = %source_id, reason = %reason, "stats.failure");
                self.stats.record_failure(&source_id, reason)
            }
            StatsMsg::Metrics(records) => {
                for record in &records {
                    self.stats.record_metrics(record);
                }
            }
            StatsMsg::Snapshot { elapsed, reply } => {
                let _ = reply.send(self.stats.snapshot(elapsed));
            }
            StatsMsg::Reset => self.stats.reset(),
        }
        Ok(())
    }
}

/// Cloneable async front for a running [`StatsActor`].
///
/// ```
/// use std::time::Duration;
/// use sieve_actors::StatsHandle;
///
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// rt.block_on(async {
///     let (stats, _task) = StatsHandle::spawn(16);
///     stats.record_success("alpha", 3).await.unwrap();
///     let snap = stats.snapshot(Duration::ZERO).await.unwrap();
///     assert_eq!(snap.sources_succeeded, 1);
///     assert_eq!(snap.fetched_records, 3);
/// });
/// ```
#[derive(Clone)]
pub struct StatsHandle {
    addr: Addr<StatsActor>,
}

impl StatsHandle {
    /// Spawn a fresh aggregator. The task ends once every handle is dropped.
    pub fn spawn(capacity: usize) -> (Self, tokio::task::JoinHandle<Result<()>>) {
        let ActorHandle { addr, task } = actor::spawn_actor(StatsActor::new(), capacity);
        (Self { addr }, task)
    }

    pub fn from_addr(addr: Addr<StatsActor>) -> Self {
        Self { addr }
    }

    async fn send(&self, msg: StatsMsg) -> sieve_common::Result<()> {
        self.addr
            .send(msg)
            .await
            .map_err(|_| SieveError::Actor("stats actor stopped".into()))
    }

    pub async fn set_attempted(&self, n: usize) -> sieve_common::Result<()> {
        self.send(StatsMsg::Attempted(n)).await
    }

    pub async fn record_success(
        &self,
        source_id: &str,
        record_count: usize,
    ) -> sieve_common::Result<()> {
        self.send(StatsMsg::Success {
            source_id: source_id.to_string(),
            record_count,
        })
        .await
    }

    pub async fn record_failure(
        &self,
        source_id: &str,
        reason: FailureReason,
    ) -> sieve_common::Result<()> {
        self.send(StatsMsg::Failure {
            source_id: source_id.to_string(),
            reason,
        })
        .await
    }

    pub async fn record_metrics(&self, records: Vec<Record>) -> sieve_common::Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.send(StatsMsg::Metrics(records)).await
    }

    pub async fn snapshot(&self, elapsed: Duration) -> sieve_common::Result<RunStatistics> {
        let (reply, rx) = oneshot::channel();
        self.send(StatsMsg::Snapshot { elapsed, reply }).await?;
        rx.await
            .map_err(|_| SieveError::Actor("stats actor dropped snapshot reply".into()))
    }

    pub async fn reset(&self) -> sieve_common::Result<()> {
        self.send(StatsMsg::Reset).await
    }
}
