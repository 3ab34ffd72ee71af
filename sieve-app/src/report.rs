//! Human-readable output: the result table and the end-of-run report.
use std::fmt;

use sieve_common::SearchCriteria;
use sieve_engine::Report;

const MAX_ERRORS_SHOWN: usize = 10;
const TOP_SOURCES: usize = 5;
const RULE: &str = "============================================================";

/// Multi-section text report for one run.
pub struct TextReport<'a> {
    pub report: &'a Report,
    pub criteria: &'a SearchCriteria,
}

impl fmt::Display for TextReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = &self.report.stats;
        let summary = &self.report.summary;

        writeln!(f, "{RULE}")?;
        writeln!(f, "SIEVE RUN REPORT")?;
        writeln!(f, "{RULE}")?;

        writeln!(f, "\nSUMMARY")?;
        writeln!(f, "  Sources attempted:   {}", stats.sources_attempted)?;
        writeln!(f, "  Sources succeeded:   {}", stats.sources_succeeded)?;
        writeln!(f, "  Sources failed:      {}", stats.sources_failed)?;
        writeln!(f, "  Success rate:        {:.1}%", stats.success_rate())?;

        writeln!(f, "\nMESSAGES")?;
        writeln!(f, "  Fetched:             {}", stats.fetched_records)?;
        writeln!(f, "  Unique:              {}", stats.total_records)?;
        writeln!(f, "  Keywords:            {}", self.criteria.keywords.join(", "))?;
        writeln!(f, "  Matching results:    {}", summary.total_results)?;
        writeln!(f, "  Average score:       {:.1}", summary.avg_score)?;

        writeln!(f, "\nCONTENT ANALYSIS")?;
        writeln!(f, "  Distinct authors:    {}", stats.distinct_authors)?;
        writeln!(f, "  Distinct hashtags:   {}", stats.distinct_hashtags)?;
        writeln!(f, "  Distinct mentions:   {}", stats.distinct_mentions)?;
        writeln!(f, "  Total views:         {}", stats.total_views)?;
        writeln!(f, "  Total reactions:     {}", stats.total_reactions)?;
        writeln!(f, "  Avg views/message:   {:.1}", stats.avg_views())?;

        writeln!(f, "\nPERFORMANCE")?;
        writeln!(f, "  Duration:            {:.2}s", stats.duration.as_secs_f64())?;
        writeln!(f, "  Messages/second:     {:.1}", stats.records_per_second())?;

        let top = stats.top_sources(TOP_SOURCES);
        if !top.is_empty() {
            writeln!(f, "\nTOP SOURCES")?;
            for (i, (source, count)) in top.iter().enumerate() {
                writeln!(f, "  {}. {source}: {count} messages", i + 1)?;
            }
        }

        if !stats.failures.is_empty() {
            writeln!(f, "\nERRORS")?;
            for failure in stats.failures.iter().take(MAX_ERRORS_SHOWN) {
                writeln!(f, "  - {}: {}", failure.source_id, failure.reason)?;
            }
            let hidden = stats.failures.len().saturating_sub(MAX_ERRORS_SHOWN);
            if hidden > 0 {
                writeln!(f, "  ... and {hidden} more")?;
            }
        }

        write!(f, "{RULE}")
    }
}

/// One line per result: rank, score, source, views, excerpt.
pub fn results_table(report: &Report) -> String {
    if report.results.is_empty() {
        return "No matching messages.".to_string();
    }
    let mut out = format!(
        "{:>4}  {:>6}  {:<24}  {:>8}  {}\n",
        "#", "score", "source", "views", "context"
    );
    for (i, r) in report.results.iter().enumerate() {
        out.push_str(&format!(
            "{:>4}  {:>6.1}  {:<24}  {:>8}  {}\n",
            i + 1,
            r.score,
            truncate(&r.record.source_id, 24),
            r.record.views,
            r.context
        ));
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut t: String = s.chars().take(max.saturating_sub(1)).collect();
    t.push('…');
    t
}
