//! Collection and ranking core.
//!
//! [`collector::Collector`] fetches a batch of sources concurrently and merges
//! their records through a [`dedup::Deduplicator`]; [`search::SearchEngine`]
//! filters and ranks the merged set. [`collect_and_search`] runs both.
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sieve_common::{Fetcher, Record, RunContext, RunStatistics, SearchCriteria, SearchSummary};

pub mod collector;
pub mod dedup;
pub mod search;

pub use collector::{CollectOptions, Collection, Collector, ProgressEvent};
pub use dedup::Deduplicator;
pub use search::{SearchEngine, TrendMetric};

/// Owned copy of a ranked result, for reports that outlive the record slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub record: Record,
    pub matched_keywords: Vec<String>,
    pub score: f64,
    pub context: String,
}

/// Everything one invocation produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    pub records: Vec<Record>,
    pub results: Vec<ScoredRecord>,
    pub summary: SearchSummary,
    pub stats: RunStatistics,
}

/// Search tuning that does not belong to the criteria themselves.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub case_sensitive: bool,
    pub context_words: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            context_words: 5,
        }
    }
}

/// Collect `source_ids`, then rank the merged records against `criteria`.
///
/// Sources and criteria are both validated before anything is fetched.
pub async fn collect_and_search(
    fetcher: Arc<dyn Fetcher>,
    source_ids: &[String],
    criteria: &SearchCriteria,
    opts: &CollectOptions,
    search_opts: &SearchOptions,
    ctx: RunContext,
) -> sieve_common::Result<Report> {
    criteria.validate()?;
    let collection = Collector::new(fetcher, ctx.clone())
        .run(source_ids, opts)
        .await?;

    let engine = SearchEngine::new(ctx)
        .case_sensitive(search_opts.case_sensitive)
        .context_words(search_opts.context_words);
    let ranked = engine.search(&collection.records, criteria)?;
    let summary = search::summarize(&ranked);
    let results = ranked
        .into_iter()
        .map(|r| ScoredRecord {
            record: r.record.clone(),
            matched_keywords: r.matched_keywords,
            score: r.score,
            context: r.context,
        })
        .collect();

    Ok(Report {
        records: collection.records,
        results,
        summary,
        stats: collection.stats,
    })
}
