//! Loader for sieve configuration with YAML + environment overlays.
//!
//! Sources merge in the order they are added; `SIEVE_`-prefixed environment
//! variables (nested keys joined by `__`, e.g. `SIEVE_COLLECTOR__MAX_CONCURRENCY`)
//! are always applied. After merging, `${VAR}` placeholders in string values
//! are expanded from the process environment. Every section is optional.
//!
//! ```yaml
//! version: "1"
//! collector: { max_concurrency: 4, task_timeout_secs: 10, run_timeout_secs: 120 }
//! fetcher:   { kind: telegram, base_url: "https://t.me", max_messages: 50, qps: 2.0, burst: 4 }
//! search:    { case_sensitive: false, context_words: 5 }
//! logging:   { format: text, emit_stderr: true, dir: "~/.local/share/sieve" }
//! ```
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use sieve_common::observability::LogFormat;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;
const CONFIG_FILE_NAME: &str = "sieve.yaml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SieveConfig {
    pub version: Option<String>,
    pub collector: CollectorConfig,
    pub fetcher: FetcherConfig,
    pub search: SearchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub max_concurrency: usize,
    pub task_timeout_secs: u64,
    pub run_timeout_secs: Option<u64>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            task_timeout_secs: 10,
            run_timeout_secs: None,
        }
    }
}

impl CollectorConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}

/// The tag is `kind`; the remaining keys belong to that fetcher.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FetcherConfig {
    Telegram(TelegramConfig),
}

impl Default for FetcherConfig {
    fn default() -> Self {
        FetcherConfig::Telegram(TelegramConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub base_url: String,
    pub max_messages: usize,
    /// Requests per second shared by all workers.
    pub qps: f64,
    pub burst: u32,
    pub retries: usize,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            base_url: "https://t.me".into(),
            max_messages: 50,
            qps: 2.0,
            burst: 4,
            retries: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub case_sensitive: bool,
    pub context_words: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            context_words: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub emit_stderr: bool,
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            emit_stderr: true,
            dir: None,
        }
    }
}

/// `<config dir>/sieve/sieve.yaml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sieve").join(CONFIG_FILE_NAME))
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct SieveConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
    env: Environment,
}

impl Default for SieveConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SieveConfigLoader {
    /// Start with no files; `SIEVE_` env overrides are applied last.
    ///
    /// ```
    /// use sieve_config::SieveConfigLoader;
    ///
    /// let config = SieveConfigLoader::new()
    ///     .with_yaml_str("version: '1'\ncollector:\n  max_concurrency: 8")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.version.as_deref(), Some("1"));
    /// assert_eq!(config.collector.max_concurrency, 8);
    /// assert_eq!(config.search.context_words, 5);
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
            env: Environment::with_prefix("SIEVE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        }
    }

    /// Attach a YAML/TOML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Like [`SieveConfigLoader::with_file`], but a missing file is skipped.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Merge an inline YAML snippet.
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources.
    ///
    /// ```
    /// use sieve_config::{FetcherConfig, SieveConfigLoader};
    ///
    /// unsafe { std::env::set_var("SIEVE_DOC_TG_BASE", "http://127.0.0.1:8080"); }
    ///
    /// let config = SieveConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// fetcher:
    ///   kind: telegram
    ///   base_url: "${SIEVE_DOC_TG_BASE}"
    ///   qps: 0.5
    /// "#)
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// let FetcherConfig::Telegram(tg) = &config.fetcher;
    /// assert_eq!(tg.base_url, "http://127.0.0.1:8080");
    /// assert_eq!(tg.qps, 0.5);
    /// assert_eq!(tg.max_messages, 50);
    ///
    /// unsafe { std::env::remove_var("SIEVE_DOC_TG_BASE"); }
    /// ```
    pub fn load(self) -> Result<SieveConfig, ConfigError> {
        let cfg = self.builder.add_source(self.env).build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: SieveConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(typed)
    }
}
