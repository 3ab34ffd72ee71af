use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sieve_common::{FailureReason, FetchOutcome, Fetcher, Record, RunContext, SearchCriteria};
use sieve_engine::{
    collect_and_search, CollectOptions, Collector, SearchEngine, SearchOptions,
};

/// Fetcher driven by the source id: `fail-*` fails, `slow-*` sleeps past any
/// sane timeout, everything else returns records shaped by `records_for`.
struct ScriptedFetcher {
    in_flight: AtomicUsize,
    high_water: AtomicUsize,
    delay: Duration,
}

impl ScriptedFetcher {
    fn new(delay: Duration) -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
            delay,
        }
    }
}

fn records_for(source_id: &str) -> Vec<Record> {
    vec![
        Record::new(format!("{source_id}/1"), source_id, "rust release notes").with_views(1_500),
        Record::new(format!("{source_id}/2"), source_id, "weekly digest"),
        // every source repeats this one
        Record::new("shared/1", source_id, "rust shared announcement"),
    ]
}

#[async_trait::async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, source_id: &str, _timeout: Duration) -> FetchOutcome {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(now, Ordering::SeqCst);

        if source_id.starts_with("slow-") {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        } else if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if source_id.starts_with("fail-") {
            FetchOutcome::failure(source_id, FailureReason::Fetch("HTTP 404".into()))
        } else {
            FetchOutcome::success(source_id, records_for(source_id))
        }
    }
}

fn sources(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn ten_sources_three_failing() {
    let fetcher = Arc::new(ScriptedFetcher::new(Duration::ZERO));
    let ids: Vec<String> = (0..10)
        .map(|i| if i % 3 == 0 && i > 0 { format!("fail-{i}") } else { format!("ok-{i}") })
        .collect();
    assert_eq!(ids.iter().filter(|s| s.starts_with("fail-")).count(), 3);

    let out = Collector::new(fetcher, RunContext::disabled())
        .run(&ids, &CollectOptions::default())
        .await
        .unwrap();

    assert_eq!(out.stats.sources_attempted, 10);
    assert_eq!(out.stats.sources_succeeded, 7);
    assert_eq!(out.stats.sources_failed, 3);
    assert!((out.stats.success_rate() - 70.0).abs() < 1e-9);
    assert_eq!(out.stats.failures.len(), 3);
}

#[tokio::test]
async fn shared_ids_appear_once() {
    let fetcher = Arc::new(ScriptedFetcher::new(Duration::ZERO));
    let out = Collector::new(fetcher, RunContext::disabled())
        .run(&sources(&["alpha", "beta", "gamma"]), &CollectOptions::default())
        .await
        .unwrap();

    let unique: HashSet<&str> = out.records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(unique.len(), out.records.len());
    assert_eq!(out.records.iter().filter(|r| r.id == "shared/1").count(), 1);
    assert_eq!(out.stats.total_records, out.records.len());
    assert_eq!(out.stats.total_records, 7);
    assert_eq!(out.stats.fetched_records, 9);
}

#[tokio::test]
async fn all_sources_failing_is_not_an_error() {
    let fetcher = Arc::new(ScriptedFetcher::new(Duration::ZERO));
    let out = Collector::new(fetcher, RunContext::disabled())
        .run(&sources(&["fail-a", "fail-b"]), &CollectOptions::default())
        .await
        .unwrap();
    assert!(out.records.is_empty());
    assert_eq!(out.stats.sources_failed, 2);
    assert_eq!(out.stats.success_rate(), 0.0);
}

#[tokio::test(start_paused = true)]
async fn slow_source_times_out() {
    let fetcher = Arc::new(ScriptedFetcher::new(Duration::ZERO));
    let opts = CollectOptions {
        max_concurrency: 2,
        task_timeout: Duration::from_secs(5),
        run_timeout: None,
    };
    let out = Collector::new(fetcher, RunContext::disabled())
        .run(&sources(&["ok-a", "slow-b", "ok-c"]), &opts)
        .await
        .unwrap();

    assert_eq!(out.stats.sources_succeeded, 2);
    assert_eq!(out.stats.sources_failed, 1);
    assert_eq!(out.stats.failures[0].source_id, "slow-b");
    assert_eq!(out.stats.failures[0].reason, FailureReason::Timeout);
}

#[tokio::test(start_paused = true)]
async fn run_timeout_cancels_pending_sources() {
    let fetcher = Arc::new(ScriptedFetcher::new(Duration::ZERO));
    let opts = CollectOptions {
        max_concurrency: 1,
        task_timeout: Duration::from_secs(7200),
        run_timeout: Some(Duration::from_secs(60)),
    };
    let out = Collector::new(fetcher, RunContext::disabled())
        .run(&sources(&["ok-a", "slow-b", "ok-c"]), &opts)
        .await
        .unwrap();

    assert_eq!(out.stats.sources_attempted, 3);
    assert_eq!(out.stats.sources_succeeded, 1);
    assert_eq!(out.stats.sources_failed, 2);
    let cancelled: Vec<&str> = out
        .stats
        .failures
        .iter()
        .filter(|f| f.reason == FailureReason::Cancelled)
        .map(|f| f.source_id.as_str())
        .collect();
    assert_eq!(cancelled, vec!["slow-b", "ok-c"]);
    // records from the source that finished in time are kept
    assert_eq!(out.records.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn concurrency_never_exceeds_limit() {
    let fetcher = Arc::new(ScriptedFetcher::new(Duration::from_millis(50)));
    let ids: Vec<String> = (0..12).map(|i| format!("src-{i}")).collect();
    let opts = CollectOptions {
        max_concurrency: 3,
        ..Default::default()
    };
    let out = Collector::new(fetcher.clone(), RunContext::disabled())
        .run(&ids, &opts)
        .await
        .unwrap();

    assert_eq!(out.stats.sources_succeeded, 12);
    let peak = fetcher.high_water.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency {peak}");
    assert!(peak >= 2, "pool never ran in parallel");
}

#[tokio::test]
async fn attempted_equals_successes_plus_failures() {
    for n in 1..6 {
        let fetcher = Arc::new(ScriptedFetcher::new(Duration::ZERO));
        let ids: Vec<String> = (0..n)
            .map(|i| if i % 2 == 0 { format!("ok-{i}") } else { format!("fail-{i}") })
            .collect();
        let opts = CollectOptions {
            max_concurrency: 2,
            ..Default::default()
        };
        let out = Collector::new(fetcher, RunContext::disabled())
            .run(&ids, &opts)
            .await
            .unwrap();
        assert_eq!(out.stats.sources_attempted, n);
        assert_eq!(
            out.stats.sources_succeeded + out.stats.sources_failed,
            out.stats.sources_attempted
        );
    }
}

#[tokio::test]
async fn collect_and_search_ranks_the_merged_set() {
    let fetcher = Arc::new(ScriptedFetcher::new(Duration::ZERO));
    let criteria = SearchCriteria::new(["rust"]);
    let report = collect_and_search(
        fetcher,
        &sources(&["alpha", "fail-beta"]),
        &criteria,
        &CollectOptions::default(),
        &SearchOptions::default(),
        RunContext::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.records.len(), 3);
    assert_eq!(report.results.len(), 2);
    assert!(report
        .results
        .iter()
        .all(|r| r.matched_keywords == vec!["rust".to_string()]));
    assert!(report.results.iter().all(|r| (0.0..=100.0).contains(&r.score)));
    assert_eq!(report.results[0].record.id, "alpha/1");
    assert_eq!(report.summary.total_results, 2);
    assert_eq!(report.stats.sources_failed, 1);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["results"].as_array().map(|a| a.len()), Some(2));
}

#[tokio::test]
async fn collect_and_search_validates_before_fetching() {
    let fetcher = Arc::new(ScriptedFetcher::new(Duration::ZERO));
    let err = collect_and_search(
        fetcher.clone(),
        &sources(&["alpha"]),
        &SearchCriteria::new(Vec::<String>::new()),
        &CollectOptions::default(),
        &SearchOptions::default(),
        RunContext::disabled(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, sieve_common::SieveError::InvalidInput(_)));
    assert_eq!(fetcher.high_water.load(Ordering::SeqCst), 0);
}

#[test]
fn search_is_idempotent_and_bounded() {
    let records: Vec<Record> = (0..20)
        .map(|i| {
            Record::new(
                format!("r{i}"),
                "c",
                format!("{} rust {} async", "word ".repeat(i % 5), "tail ".repeat(i % 3)),
            )
            .with_views((i as u64) * 700)
            .with_reactions(i as u64)
        })
        .chain(std::iter::once(Record::new("none", "c", "no match here")))
        .collect();
    let engine = SearchEngine::new(RunContext::disabled());
    let criteria = SearchCriteria::new(["rust", "async"]);

    let first = engine.search(&records, &criteria).unwrap();
    let second = engine.search(&records, &criteria).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 20);
    assert!(first.iter().all(|r| r.record.id != "none"));
    assert!(first.iter().all(|r| (0.0..=100.0).contains(&r.score)));
    assert!(first.windows(2).all(|w| w[0].score >= w[1].score));
}
