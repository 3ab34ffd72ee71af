//! Concurrent collection over a batch of sources.
//!
//! A fixed pool of `min(max_concurrency, sources)` workers pulls sources from a
//! shared queue. Outcomes come back over one channel and are merged by a single
//! consumer, which owns the per-source buffers and feeds the deduplicator and
//! the stats actor.
use std::any::Any;
use std::collections::{HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use sieve_actors::StatsHandle;
use sieve_common::{
    FailureReason, FetchOutcome, Fetcher, Record, RunContext, RunStatistics, SieveError,
};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::dedup::Deduplicator;

#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub max_concurrency: usize,
    /// Upper bound for a single fetch.
    pub task_timeout: Duration,
    /// Upper bound for the whole run. Sources still pending are cancelled.
    pub run_timeout: Option<Duration>,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            task_timeout: Duration::from_secs(10),
            run_timeout: None,
        }
    }
}

/// Emitted after each source settles. `completed` only ever grows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub completed: usize,
    pub total: usize,
    pub source_id: String,
    pub succeeded: bool,
}

type ProgressFn = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Deduplicated records plus the final statistics of one run.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub records: Vec<Record>,
    pub stats: RunStatistics,
}

pub struct Collector {
    fetcher: Arc<dyn Fetcher>,
    ctx: RunContext,
    on_progress: Option<ProgressFn>,
}

impl Collector {
    pub fn new(fetcher: Arc<dyn Fetcher>, ctx: RunContext) -> Self {
        Self {
            fetcher,
            ctx,
            on_progress: None,
        }
    }

    pub fn on_progress(mut self, f: impl Fn(&ProgressEvent) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(f));
        self
    }

    /// Fetch every source and merge the results.
    ///
    /// Only structurally invalid input is an error. Individual sources that
    /// fail, time out or are cancelled show up in `stats.failures`. A fetcher
    /// that panics fails only the source it was fetching.
    pub async fn run(
        &self,
        source_ids: &[String],
        opts: &CollectOptions,
    ) -> sieve_common::Result<Collection> {
        if source_ids.is_empty() {
            return Err(SieveError::InvalidInput(
                "at least one source required".into(),
            ));
        }
        if opts.max_concurrency == 0 {
            return Err(SieveError::InvalidInput(
                "max_concurrency must be at least 1".into(),
            ));
        }
        self.run_pool(source_ids, opts)
            .instrument(self.ctx.span().clone())
            .await
    }

    async fn run_pool(
        &self,
        source_ids: &[String],
        opts: &CollectOptions,
    ) -> sieve_common::Result<Collection> {
        let started = Instant::now();
        let total = source_ids.len();
        let workers = opts.max_concurrency.min(total);
        tracing::info!(sources = total, workers, "collector.start");

        let (stats, stats_task) = StatsHandle::spawn(workers * 4 + 16);
        stats.set_attempted(total).await?;
        let dedup = Deduplicator::new();
        let cancel = CancellationToken::new();

        let queue: Arc<Mutex<VecDeque<(usize, String)>>> = Arc::new(Mutex::new(
            source_ids.iter().cloned().enumerate().collect(),
        ));
        let (out_tx, mut out_rx) = mpsc::channel::<(usize, FetchOutcome)>(workers);

        let mut pool = JoinSet::new();
        for worker in 0..workers {
            let queue = queue.clone();
            let fetcher = self.fetcher.clone();
            let out_tx = out_tx.clone();
            let cancel = cancel.clone();
            let task_timeout = opts.task_timeout;
            let span = tracing::debug_span!(parent: self.ctx.span(), "sieve.worker", worker);
            pool.spawn(
                async move {
                    loop {
                        let next = queue.lock().await.pop_front();
                        let Some((idx, source_id)) = next else { break };
                        let fetch = AssertUnwindSafe(fetcher.fetch(&source_id, task_timeout)).catch_unwind();
                        let outcome = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            res = tokio::time::timeout(task_timeout, fetch) => match res {
                                Ok(Ok(outcome)) => outcome,
                                Ok(Err(payload)) => {
                                    let msg = panic_message(payload.as_ref());
                                    tracing::error!(source_id = %source_id, panic = %msg, "collector.fetch_panicked");
                                    FetchOutcome::failure(
                                        &source_id,
                                        FailureReason::Fetch(format!("fetcher panicked: {msg}")),
                                    )
                                }
                                Err(_) => FetchOutcome::failure(&source_id, FailureReason::Timeout),
                            },
                        };
                        if out_tx.send((idx, outcome)).await.is_err() {
                            break;
                        }
                    }
                }
                .instrument(span),
            );
        }
        drop(out_tx);

        let deadline = opts.run_timeout.map(|d| started + d);
        let mut settled = vec![false; total];
        let mut buffers: Vec<Vec<Record>> = vec![Vec::new(); total];
        let mut completed = 0usize;

        // After the deadline only outcomes already queued are taken.
        let mut timed_out = false;
        loop {
            let next = if timed_out {
                out_rx.try_recv().ok()
            } else {
                match deadline {
                    Some(deadline) => tokio::select! {
                        biased;
                        msg = out_rx.recv() => msg,
                        _ = tokio::time::sleep_until(deadline) => {
                            tracing::warn!(completed, total, "collector.run_timeout");
                            timed_out = true;
                            cancel.cancel();
                            continue;
                        }
                    },
                    None => out_rx.recv().await,
                }
            };
            let Some((idx, outcome)) = next else { break };
            if std::mem::replace(&mut settled[idx], true) {
                continue;
            }
            completed += 1;
            let source_id = &source_ids[idx];

            let succeeded = match outcome {
                FetchOutcome::Success { records, .. } => {
                    let raw = records.len();
                    let kept = admit(&dedup, records);
                    tracing::debug!(source_id = %source_id, raw, kept = kept.len(), "collector.source_ok");
                    stats.record_success(source_id, raw).await?;
                    stats.record_metrics(kept.clone()).await?;
                    buffers[idx] = kept;
                    true
                }
                FetchOutcome::Failure { reason, .. } => {
                    tracing::warn!(source_id = %source_id, reason = %reason, "collector.source_failed");
                    stats.record_failure(source_id, reason).await?;
                    false
                }
            };

            if let Some(cb) = &self.on_progress {
                cb(&ProgressEvent {
                    completed,
                    total,
                    source_id: source_id.clone(),
                    succeeded,
                });
            }
        }

        if timed_out {
            pool.abort_all();
        }
        while let Some(res) = pool.join_next().await {
            if let Err(e) = res {
                if e.is_panic() {
                    tracing::error!(error = %e, "collector.worker_panicked");
                }
            }
        }

        // Anything still unsettled was cut off by the run timeout or lost with a worker.
        for (idx, done) in settled.iter().enumerate() {
            if !done {
                let reason = if timed_out {
                    FailureReason::Cancelled
                } else {
                    FailureReason::Fetch("fetch task ended without reporting".into())
                };
                stats.record_failure(&source_ids[idx], reason).await?;
            }
        }

        let snapshot = stats.snapshot(started.elapsed()).await?;
        drop(stats);
        if let Ok(Err(e)) = stats_task.await {
            tracing::warn!(error = ?e, "collector.stats_actor_error");
        }

        let records: Vec<Record> = buffers.into_iter().flatten().collect();
        tracing::info!(
            succeeded = snapshot.sources_succeeded,
            failed = snapshot.sources_failed,
            records = records.len(),
            elapsed_ms = snapshot.duration.as_millis() as u64,
            "collector.done"
        );
        Ok(Collection {
            records,
            stats: snapshot,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Keep the records whose id the deduplicator admits, first occurrence only.
fn admit(dedup: &Deduplicator, records: Vec<Record>) -> Vec<Record> {
    let mut fresh: HashSet<String> = dedup
        .filter_new(records.iter().map(|r| r.id.as_str()))
        .into_iter()
        .collect();
    records
        .into_iter()
        .filter(|r| fresh.remove(&r.id))
        .collect()
}
