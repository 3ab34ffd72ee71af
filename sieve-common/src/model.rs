//! Plain data passed between fetchers, the collector, and the search engine.
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::text;

/// One unit of fetched text content.
///
/// Built once at the fetcher boundary and never mutated after it enters an
/// aggregate set. Tag sets are derived from `text` by [`Record::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub source_id: String,
    #[serde(default)]
    pub author: Option<String>,
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub reactions: u64,
    #[serde(default)]
    pub mentions: Vec<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub edited: bool,
    #[serde(default)]
    pub pinned: bool,
}

impl Record {
    pub fn new(id: impl Into<String>, source_id: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            id: id.into(),
            source_id: source_id.into(),
            author: None,
            mentions: text::extract_mentions(&text),
            hashtags: text::extract_hashtags(&text),
            urls: text::extract_urls(&text),
            text,
            timestamp: None,
            views: 0,
            reactions: 0,
            edited: false,
            pinned: false,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }

    pub fn with_views(mut self, views: u64) -> Self {
        self.views = views;
        self
    }

    pub fn with_reactions(mut self, reactions: u64) -> Self {
        self.reactions = reactions;
        self
    }

    pub fn with_edited(mut self, edited: bool) -> Self {
        self.edited = edited;
        self
    }

    pub fn with_pinned(mut self, pinned: bool) -> Self {
        self.pinned = pinned;
        self
    }
}

/// Why a source produced no records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// The per-task deadline elapsed.
    Timeout,
    /// The run-level deadline elapsed before this source settled.
    Cancelled,
    Fetch(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout => f.write_str("timed out"),
            FailureReason::Cancelled => f.write_str("cancelled by run timeout"),
            FailureReason::Fetch(msg) => f.write_str(msg),
        }
    }
}

/// Result of fetching a single source. Consumed exactly once by the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FetchOutcome {
    Success {
        source_id: String,
        records: Vec<Record>,
    },
    Failure {
        source_id: String,
        reason: FailureReason,
    },
}

impl FetchOutcome {
    pub fn success(source_id: impl Into<String>, records: Vec<Record>) -> Self {
        Self::Success {
            source_id: source_id.into(),
            records,
        }
    }

    pub fn failure(source_id: impl Into<String>, reason: FailureReason) -> Self {
        Self::Failure {
            source_id: source_id.into(),
            reason,
        }
    }

    pub fn source_id(&self) -> &str {
        match self {
            FetchOutcome::Success { source_id, .. } | FetchOutcome::Failure { source_id, .. } => {
                source_id
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source_id: String,
    pub reason: FailureReason,
    pub at: DateTime<Utc>,
}

/// Point-in-time copy of run counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub sources_attempted: usize,
    pub sources_succeeded: usize,
    pub sources_failed: usize,
    pub failures: Vec<SourceFailure>,
    pub records_per_source: BTreeMap<String, usize>,
    /// Records reported by fetchers, duplicates included.
    pub fetched_records: usize,
    /// Unique records; equals the size of the aggregate set.
    pub total_records: usize,
    pub total_views: u64,
    pub total_reactions: u64,
    pub distinct_authors: usize,
    pub distinct_hashtags: usize,
    pub distinct_mentions: usize,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

impl RunStatistics {
    /// Percentage of settled sources that succeeded; 0 when nothing was attempted.
    pub fn success_rate(&self) -> f64 {
        let settled = self.sources_succeeded + self.sources_failed;
        if settled == 0 {
            return 0.0;
        }
        self.sources_succeeded as f64 / settled as f64 * 100.0
    }

    pub fn avg_views(&self) -> f64 {
        if self.total_records == 0 {
            return 0.0;
        }
        self.total_views as f64 / self.total_records as f64
    }

    pub fn avg_reactions(&self) -> f64 {
        if self.total_records == 0 {
            return 0.0;
        }
        self.total_reactions as f64 / self.total_records as f64
    }

    pub fn records_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.total_records as f64 / secs
        } else {
            0.0
        }
    }

    /// Sources ordered by reported record count, highest first. Ties keep name order.
    pub fn top_sources(&self, limit: usize) -> Vec<(&str, usize)> {
        let mut ranked: Vec<(&str, usize)> = self
            .records_per_source
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(limit);
        ranked
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Typed replacement for free-form filter arguments.
///
/// `keywords` is required; every other field is an optional filter that is only
/// applied when set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub keywords: Vec<String>,
    #[serde(default)]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub hashtags: Option<Vec<String>>,
    #[serde(default)]
    pub mentions: Option<Vec<String>>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub min_views: Option<u64>,
    #[serde(default)]
    pub has_url: Option<bool>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl SearchCriteria {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_date_range(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    pub fn with_hashtags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hashtags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_mentions<I, S>(mut self, mentions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mentions = Some(mentions.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_min_views(mut self, min_views: u64) -> Self {
        self.min_views = Some(min_views);
        self
    }

    pub fn with_has_url(mut self, has_url: bool) -> Self {
        self.has_url = Some(has_url);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Reject an empty keyword list or blank keywords.
    pub fn validate(&self) -> crate::Result<()> {
        if self.keywords.is_empty() {
            return Err(crate::SieveError::InvalidInput(
                "at least one keyword required".into(),
            ));
        }
        if self.keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(crate::SieveError::InvalidInput(
                "keywords cannot be empty or whitespace".into(),
            ));
        }
        Ok(())
    }
}

/// A matched record with its score. Borrows the record it ranks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult<'a> {
    pub record: &'a Record,
    pub matched_keywords: Vec<String>,
    pub score: f64,
    pub context: String,
}

/// Aggregates over a result list after filtering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSummary {
    pub total_results: usize,
    pub avg_score: f64,
    pub total_views: u64,
    pub total_reactions: u64,
    pub avg_views: f64,
    pub avg_reactions: f64,
}
