//! Structural filters plus keyword relevance ranking over a collected record set.
//!
//! Filters run first, in a fixed order, and only when the matching criteria
//! field is set: date range, hashtags, mentions, author, minimum views, URL
//! presence. Survivors that contain at least one keyword are scored and
//! stably sorted by descending score.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sieve_common::{text, RankedResult, Record, RunContext, SearchCriteria, SearchSummary};

const DEFAULT_CONTEXT_WORDS: usize = 5;

const FREQUENCY_PER_HIT: f64 = 10.0;
const FREQUENCY_CAP: f64 = 40.0;
const POSITION_MAX: f64 = 20.0;
const POSITION_SLOPE: f64 = 10.0;
const VIEWS_PER_POINT: f64 = 1000.0;
const VIEWS_CAP: f64 = 20.0;
const REACTION_WEIGHT: f64 = 2.0;
const REACTIONS_CAP: f64 = 20.0;
const SCORE_MAX: f64 = 100.0;

pub struct SearchEngine {
    ctx: RunContext,
    case_sensitive: bool,
    context_words: usize,
}

impl SearchEngine {
    pub fn new(ctx: RunContext) -> Self {
        Self {
            ctx,
            case_sensitive: false,
            context_words: DEFAULT_CONTEXT_WORDS,
        }
    }

    pub fn case_sensitive(mut self, yes: bool) -> Self {
        self.case_sensitive = yes;
        self
    }

    /// Words kept either side of the first match in each result's excerpt.
    pub fn context_words(mut self, n: usize) -> Self {
        self.context_words = n;
        self
    }

    /// Filter, score and rank `records` against `criteria`.
    ///
    /// Fails only when the keyword list is empty or holds a blank entry.
    /// An empty record slice yields an empty result list.
    ///
    /// ```
    /// use sieve_common::{Record, RunContext, SearchCriteria};
    /// use sieve_engine::search::SearchEngine;
    ///
    /// let records = vec![
    ///     Record::new("1", "chan", "rust async runtime"),
    ///     Record::new("2", "chan", "nothing relevant"),
    /// ];
    /// let engine = SearchEngine::new(RunContext::disabled());
    /// let results = engine.search(&records, &SearchCriteria::new(["Rust"])).unwrap();
    /// assert_eq!(results.len(), 1);
    /// assert_eq!(results[0].record.id, "1");
    /// assert_eq!(results[0].matched_keywords, vec!["Rust".to_string()]);
    /// ```
    pub fn search<'a>(
        &self,
        records: &'a [Record],
        criteria: &SearchCriteria,
    ) -> sieve_common::Result<Vec<RankedResult<'a>>> {
        criteria.validate()?;
        let _enter = self.ctx.span().enter();

        let keywords: Vec<String> = criteria
            .keywords
            .iter()
            .map(|k| self.fold(k.trim()))
            .collect();

        let mut results: Vec<RankedResult<'a>> = records
            .iter()
            .filter(|r| passes_filters(r, criteria))
            .filter_map(|r| self.rank(r, criteria, &keywords))
            .collect();

        // Vec::sort_by is stable, so equal scores keep input order.
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        if let Some(limit) = criteria.limit {
            results.truncate(limit);
        }

        tracing::debug!(
            records = records.len(),
            results = results.len(),
            keywords = criteria.keywords.len(),
            "search.done"
        );
        Ok(results)
    }

    fn fold(&self, s: &str) -> String {
        if self.case_sensitive {
            s.to_string()
        } else {
            s.to_lowercase()
        }
    }

    fn rank<'a>(
        &self,
        record: &'a Record,
        criteria: &SearchCriteria,
        folded_keywords: &[String],
    ) -> Option<RankedResult<'a>> {
        let haystack = self.fold(&record.text);
        let matched: Vec<usize> = folded_keywords
            .iter()
            .enumerate()
            .filter(|(_, k)| haystack.contains(k.as_str()))
            .map(|(i, _)| i)
            .collect();
        let first = *matched.first()?;

        let score = relevance_score(&haystack, folded_keywords, record.views, record.reactions);
        let context = text::context_excerpt(
            &record.text,
            criteria.keywords[first].trim(),
            self.context_words,
        )
        .unwrap_or_default();

        Some(RankedResult {
            record,
            matched_keywords: matched
                .into_iter()
                .map(|i| criteria.keywords[i].clone())
                .collect(),
            score,
            context,
        })
    }
}

/// Relevance of an already case-folded `text` for `keywords`, in `[0, 100]`.
///
/// - frequency: 10 per non-overlapping occurrence of any keyword, capped at 40
/// - position: per keyword found, `20 - 10 * first_index / len` in chars, floored at 0
/// - engagement: `views / 1000` capped at 20, plus `reactions * 2` capped at 20
pub fn relevance_score(text: &str, keywords: &[String], views: u64, reactions: u64) -> f64 {
    let char_len = text.chars().count();

    let occurrences: usize = keywords
        .iter()
        .filter(|k| !k.is_empty())
        .map(|k| text.matches(k.as_str()).count())
        .sum();
    let frequency = (FREQUENCY_PER_HIT * occurrences as f64).min(FREQUENCY_CAP);

    let mut position = 0.0;
    if char_len > 0 {
        for keyword in keywords.iter().filter(|k| !k.is_empty()) {
            if let Some(byte_idx) = text.find(keyword.as_str()) {
                let char_idx = text[..byte_idx].chars().count();
                let term = POSITION_MAX - POSITION_SLOPE * char_idx as f64 / char_len as f64;
                position += term.max(0.0);
            }
        }
    }

    let engagement = (views as f64 / VIEWS_PER_POINT).min(VIEWS_CAP)
        + (reactions as f64 * REACTION_WEIGHT).min(REACTIONS_CAP);

    (frequency + position + engagement).clamp(0.0, SCORE_MAX)
}

fn passes_filters(record: &Record, criteria: &SearchCriteria) -> bool {
    if (criteria.date_from.is_some() || criteria.date_to.is_some())
        && !in_date_range(record, criteria.date_from, criteria.date_to)
    {
        return false;
    }
    if let Some(tags) = criteria.hashtags.as_deref().filter(|t| !t.is_empty()) {
        if !has_any_hashtag(record, tags) {
            return false;
        }
    }
    if let Some(mentions) = criteria.mentions.as_deref().filter(|m| !m.is_empty()) {
        if !has_any_mention(record, mentions) {
            return false;
        }
    }
    if let Some(author) = &criteria.author {
        if !author_contains(record, author) {
            return false;
        }
    }
    if let Some(min) = criteria.min_views {
        if record.views < min {
            return false;
        }
    }
    if let Some(has_url) = criteria.has_url {
        if record.urls.is_empty() == has_url {
            return false;
        }
    }
    true
}

fn in_date_range(record: &Record, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
    let Some(ts) = record.timestamp else {
        return false;
    };
    from.map_or(true, |f| ts >= f) && to.map_or(true, |t| ts <= t)
}

fn strip_prefix_fold(tag: &str, prefix: char) -> String {
    tag.trim().trim_start_matches(prefix).to_lowercase()
}

fn has_any_hashtag(record: &Record, wanted: &[String]) -> bool {
    let wanted: Vec<String> = wanted.iter().map(|t| strip_prefix_fold(t, '#')).collect();
    record
        .hashtags
        .iter()
        .any(|t| wanted.contains(&t.to_lowercase()))
}

fn has_any_mention(record: &Record, wanted: &[String]) -> bool {
    let wanted: Vec<String> = wanted.iter().map(|m| strip_prefix_fold(m, '@')).collect();
    record
        .mentions
        .iter()
        .any(|m| wanted.contains(&m.to_lowercase()))
}

fn author_contains(record: &Record, needle: &str) -> bool {
    record
        .author
        .as_deref()
        .is_some_and(|a| a.to_lowercase().contains(&needle.to_lowercase()))
}

/// Records with a timestamp inside `[from, to]`. Records without one are dropped.
pub fn filter_by_date(
    records: &[Record],
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Vec<&Record> {
    records
        .iter()
        .filter(|r| in_date_range(r, from, to))
        .collect()
}

/// Records carrying at least one of `tags` (`#` optional, case-insensitive).
pub fn filter_by_hashtag<'a>(records: &'a [Record], tags: &[String]) -> Vec<&'a Record> {
    records.iter().filter(|r| has_any_hashtag(r, tags)).collect()
}

/// Records mentioning at least one of `mentions` (`@` optional, case-insensitive).
pub fn filter_by_mention<'a>(records: &'a [Record], mentions: &[String]) -> Vec<&'a Record> {
    records
        .iter()
        .filter(|r| has_any_mention(r, mentions))
        .collect()
}

pub fn filter_by_author<'a>(records: &'a [Record], author: &str) -> Vec<&'a Record> {
    records
        .iter()
        .filter(|r| author_contains(r, author))
        .collect()
}

pub fn filter_by_min_views(records: &[Record], min_views: u64) -> Vec<&Record> {
    records.iter().filter(|r| r.views >= min_views).collect()
}

pub fn filter_by_url(records: &[Record], has_url: bool) -> Vec<&Record> {
    records
        .iter()
        .filter(|r| r.urls.is_empty() != has_url)
        .collect()
}

pub fn by_source<'a>(records: &'a [Record], source_id: &str) -> Vec<&'a Record> {
    records.iter().filter(|r| r.source_id == source_id).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendMetric {
    #[default]
    Views,
    Reactions,
}

/// Top `limit` records by `metric`, highest first; ties keep input order.
pub fn trending(records: &[Record], limit: usize, metric: TrendMetric) -> Vec<&Record> {
    let mut ranked: Vec<&Record> = records.iter().collect();
    match metric {
        TrendMetric::Views => ranked.sort_by(|a, b| b.views.cmp(&a.views)),
        TrendMetric::Reactions => ranked.sort_by(|a, b| b.reactions.cmp(&a.reactions)),
    }
    ranked.truncate(limit);
    ranked
}

/// Aggregates over a result list, after filtering and truncation.
pub fn summarize(results: &[RankedResult<'_>]) -> SearchSummary {
    if results.is_empty() {
        return SearchSummary::default();
    }
    let n = results.len() as f64;
    let total_views: u64 = results.iter().map(|r| r.record.views).sum();
    let total_reactions: u64 = results.iter().map(|r| r.record.reactions).sum();
    SearchSummary {
        total_results: results.len(),
        avg_score: results.iter().map(|r| r.score).sum::<f64>() / n,
        total_views,
        total_reactions,
        avg_views: total_views as f64 / n,
        avg_reactions: total_reactions as f64 / n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn engine() -> SearchEngine {
        SearchEngine::new(RunContext::disabled())
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn repeated_keywords_outrank_single_hits() {
        let records = vec![
            Record::new("once", "c", "test keyword once"),
            Record::new("twice", "c", "test test keyword keyword"),
        ];
        let results = engine()
            .search(&records, &SearchCriteria::new(["test", "keyword"]))
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].record.id, "twice");
        assert!(results[0].score >= results[1].score);
    }

    #[test]
    fn score_matches_formula() {
        // "test keyword once": 2 hits -> 20; test@0 -> 20; keyword@5/17 -> 20 - 50/17
        let kws = vec!["test".to_string(), "keyword".to_string()];
        let score = relevance_score("test keyword once", &kws, 0, 0);
        let expected = 20.0 + 20.0 + (20.0 - 50.0 / 17.0);
        assert!((score - expected).abs() < 1e-9);

        // 5_000 views -> 5, 3 reactions -> 6
        let with_engagement = relevance_score("test keyword once", &kws, 5_000, 3);
        assert!((with_engagement - (expected + 11.0)).abs() < 1e-9);
    }

    #[test]
    fn score_is_clamped_to_100() {
        let kws = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let score = relevance_score("a b c a b c", &kws, 1_000_000, 1_000);
        assert_eq!(score, 100.0);
    }

    #[test]
    fn empty_records_give_empty_results() {
        let results = engine().search(&[], &SearchCriteria::new(["x"])).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn empty_keywords_are_invalid_input() {
        let err = engine()
            .search(&[], &SearchCriteria::new(Vec::<String>::new()))
            .unwrap_err();
        assert!(matches!(err, sieve_common::SieveError::InvalidInput(_)));
    }

    #[test]
    fn case_sensitivity_is_configurable() {
        let records = vec![Record::new("1", "c", "Rust rocks")];
        let criteria = SearchCriteria::new(["rust"]);
        assert_eq!(engine().search(&records, &criteria).unwrap().len(), 1);
        assert!(engine()
            .case_sensitive(true)
            .search(&records, &criteria)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn filters_apply_only_when_set() {
        let records = vec![
            Record::new("1", "c", "rust #News @Alice https://a.io")
                .with_author("Alice Smith")
                .with_timestamp(at(5))
                .with_views(2_000),
            Record::new("2", "c", "rust #misc").with_views(10),
            Record::new("3", "c", "rust @bob")
                .with_author("Bob")
                .with_timestamp(at(20))
                .with_views(5_000),
        ];
        let base = SearchCriteria::new(["rust"]);
        let ids = |c: &SearchCriteria| -> Vec<String> {
            let mut v: Vec<String> = engine()
                .search(&records, c)
                .unwrap()
                .iter()
                .map(|r| r.record.id.clone())
                .collect();
            v.sort();
            v
        };

        assert_eq!(ids(&base), vec!["1", "2", "3"]);
        assert_eq!(ids(&base.clone().with_date_range(Some(at(1)), Some(at(10)))), vec!["1"]);
        assert_eq!(ids(&base.clone().with_date_range(Some(at(5)), None)), vec!["1", "3"]);
        assert_eq!(ids(&base.clone().with_hashtags(["#news", "other"])), vec!["1"]);
        assert_eq!(ids(&base.clone().with_mentions(["BOB"])), vec!["3"]);
        assert_eq!(ids(&base.clone().with_author("smith")), vec!["1"]);
        assert_eq!(ids(&base.clone().with_min_views(2_000)), vec!["1", "3"]);
        assert_eq!(ids(&base.clone().with_has_url(true)), vec!["1"]);
        assert_eq!(ids(&base.clone().with_has_url(false)), vec!["2", "3"]);
    }

    #[test]
    fn limit_truncates_after_sorting() {
        let records = vec![
            Record::new("low", "c", "zzz zzz zzz key"),
            Record::new("high", "c", "key key key key"),
            Record::new("mid", "c", "key key"),
        ];
        let results = engine()
            .search(&records, &SearchCriteria::new(["key"]).with_limit(2))
            .unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.record.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid"]);
    }

    #[test]
    fn equal_scores_keep_input_order() {
        let records = vec![
            Record::new("first", "c", "same text here"),
            Record::new("second", "c", "same text here"),
        ];
        let results = engine()
            .search(&records, &SearchCriteria::new(["text"]))
            .unwrap();
        assert_eq!(results[0].record.id, "first");
        assert_eq!(results[1].record.id, "second");
    }

    #[test]
    fn context_centers_on_first_matched_keyword() {
        let records = vec![Record::new(
            "1",
            "c",
            "one two three four five six seven eight nine ten eleven twelve",
        )];
        let results = engine()
            .context_words(2)
            .search(&records, &SearchCriteria::new(["missing", "SEVEN", "two"]))
            .unwrap();
        assert_eq!(results[0].matched_keywords, vec!["SEVEN", "two"]);
        assert_eq!(results[0].context, "...five six seven eight nine...");
    }

    #[test]
    fn standalone_helpers() {
        let records = vec![
            Record::new("1", "a", "x").with_views(5).with_reactions(9),
            Record::new("2", "b", "x").with_views(50).with_reactions(1),
            Record::new("3", "a", "x").with_views(20).with_reactions(9),
        ];
        let ids = |v: Vec<&Record>| v.iter().map(|r| r.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(by_source(&records, "a")), vec!["1", "3"]);
        assert_eq!(ids(trending(&records, 2, TrendMetric::Views)), vec!["2", "3"]);
        assert_eq!(ids(trending(&records, 3, TrendMetric::Reactions)), vec!["1", "3", "2"]);
        assert_eq!(ids(filter_by_min_views(&records, 20)), vec!["2", "3"]);
        assert!(filter_by_date(&records, Some(at(1)), None).is_empty());
    }

    #[test]
    fn summary_averages_results() {
        let records = vec![
            Record::new("1", "c", "k").with_views(100).with_reactions(2),
            Record::new("2", "c", "k").with_views(300).with_reactions(4),
        ];
        let results = engine().search(&records, &SearchCriteria::new(["k"])).unwrap();
        let summary = summarize(&results);
        assert_eq!(summary.total_results, 2);
        assert_eq!(summary.total_views, 400);
        assert!((summary.avg_views - 200.0).abs() < 1e-9);
        assert!((summary.avg_reactions - 3.0).abs() < 1e-9);
        assert_eq!(summarize(&[]), SearchSummary::default());
    }
}
