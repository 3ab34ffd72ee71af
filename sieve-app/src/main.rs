use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use clap::{Args, Parser, Subcommand};
use sieve_common::observability::{LogConfig, init_logging};
use sieve_common::{RunContext, SearchCriteria};
use sieve_config::{CollectorConfig, SearchConfig, SieveConfig, SieveConfigLoader, default_config_path};
use sieve_engine::{CollectOptions, SearchOptions, collect_and_search};
use sieve_runtime::SieveRuntime;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tether::Tether;

mod export;
mod report;
mod tether;

const LOCAL_CONFIG: &str = "sieve.yaml";

#[derive(Debug, Parser)]
#[command(name = "sieve", version, about = "Collect and rank posts from public Telegram channels")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch channels and rank their posts against keywords.
    Search(SearchArgs),
}

#[derive(Debug, Args)]
struct SearchArgs {
    /// Channels: name, @name, t.me/name or https://t.me/s/name.
    #[arg(long, required = true, num_args = 1..)]
    sources: Vec<String>,
    #[arg(long, required = true, num_args = 1..)]
    keywords: Vec<String>,
    /// YAML config file. Defaults to ./sieve.yaml, then the user config dir.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    max_workers: Option<usize>,
    /// Per-channel timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,
    /// Whole-run timeout in seconds.
    #[arg(long)]
    run_timeout: Option<u64>,
    #[arg(long)]
    max_messages: Option<usize>,
    /// Inclusive, YYYY-MM-DD.
    #[arg(long)]
    date_from: Option<NaiveDate>,
    /// Inclusive, YYYY-MM-DD.
    #[arg(long)]
    date_to: Option<NaiveDate>,
    #[arg(long, num_args = 1..)]
    hashtag: Vec<String>,
    #[arg(long, num_args = 1..)]
    mention: Vec<String>,
    #[arg(long)]
    author: Option<String>,
    #[arg(long)]
    min_views: Option<u64>,
    #[arg(long, conflicts_with = "without_urls")]
    with_urls: bool,
    #[arg(long)]
    without_urls: bool,
    #[arg(long)]
    limit: Option<usize>,
    #[arg(long)]
    case_sensitive: bool,
    /// Write the full report as JSON; `-` for stdout.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Print the run report after the result table.
    #[arg(long)]
    report: bool,
}

impl SearchArgs {
    fn criteria(&self) -> Result<SearchCriteria> {
        let from = self.date_from.map(|d| Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN)));
        let to = self
            .date_to
            .and_then(|d| d.and_hms_opt(23, 59, 59))
            .map(|dt| Utc.from_utc_datetime(&dt));
        if let (Some(f), Some(t)) = (from, to) {
            if f > t {
                bail!("--date-from must not be after --date-to");
            }
        }

        let mut criteria = SearchCriteria::new(self.keywords.iter().cloned()).with_date_range(from, to);
        if !self.hashtag.is_empty() {
            criteria = criteria.with_hashtags(self.hashtag.iter().cloned());
        }
        if !self.mention.is_empty() {
            criteria = criteria.with_mentions(self.mention.iter().cloned());
        }
        if let Some(author) = &self.author {
            criteria = criteria.with_author(author.clone());
        }
        if let Some(min) = self.min_views {
            criteria = criteria.with_min_views(min);
        }
        if self.with_urls {
            criteria = criteria.with_has_url(true);
        } else if self.without_urls {
            criteria = criteria.with_has_url(false);
        }
        if let Some(limit) = self.limit {
            criteria = criteria.with_limit(limit);
        }
        criteria.validate()?;
        Ok(criteria)
    }

    fn collect_options(&self, cfg: &CollectorConfig) -> CollectOptions {
        CollectOptions {
            max_concurrency: self.max_workers.unwrap_or(cfg.max_concurrency),
            task_timeout: self
                .timeout
                .map(Duration::from_secs)
                .unwrap_or_else(|| cfg.task_timeout()),
            run_timeout: self.run_timeout.map(Duration::from_secs).or(cfg.run_timeout()),
        }
    }

    fn search_options(&self, cfg: &SearchConfig) -> SearchOptions {
        SearchOptions {
            case_sensitive: self.case_sensitive || cfg.case_sensitive,
            context_words: cfg.context_words,
        }
    }
}

fn load_config(explicit: Option<&Path>) -> Result<SieveConfig> {
    let loader = match explicit {
        Some(path) => SieveConfigLoader::new().with_file(path),
        None if Path::new(LOCAL_CONFIG).exists() => SieveConfigLoader::new().with_file(LOCAL_CONFIG),
        None => match default_config_path() {
            Some(path) => SieveConfigLoader::new().with_optional_file(path),
            None => SieveConfigLoader::new(),
        },
    };
    loader.load().context("failed to load configuration")
}

fn run_search(args: SearchArgs) -> Result<()> {
    let cfg = load_config(args.config.as_deref())?;
    let log_path = init_logging(LogConfig {
        log_dir: cfg.logging.dir.clone(),
        emit_stderr: cfg.logging.emit_stderr,
        format: cfg.logging.format,
        ..Default::default()
    })?;

    let criteria = args.criteria()?;
    let opts = args.collect_options(&cfg.collector);
    let search_opts = args.search_options(&cfg.search);
    tracing::info!(
        sources = args.sources.len(),
        keywords = ?criteria.keywords,
        max_concurrency = opts.max_concurrency,
        log = %log_path.display(),
        "sieve.search.start"
    );

    let runtime = SieveRuntime::build("sieve-worker", None)?;
    runtime.cancel_on_ctrl_c();

    let outcome = runtime.run_until_cancelled(async {
        let tether = Tether::from_config(&cfg, args.max_messages).await?;
        let ctx = RunContext::new();
        let report = collect_and_search(
            tether.fetcher(),
            &args.sources,
            &criteria,
            &opts,
            &search_opts,
            ctx,
        )
        .await;
        tether.shutdown().await?;
        Ok::<_, anyhow::Error>(report?)
    });
    runtime.shutdown(Duration::from_secs(1));

    let Some(report) = outcome else {
        bail!("interrupted");
    };
    let report = report?;

    println!("{}", report::results_table(&report));
    if args.report {
        println!(
            "{}",
            report::TextReport {
                report: &report,
                criteria: &criteria,
            }
        );
    }
    if let Some(path) = &args.output {
        export::write_json(&report, path)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    match Cli::parse().command {
        Command::Search(args) => run_search(args),
    }
}
