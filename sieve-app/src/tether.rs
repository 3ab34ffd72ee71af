use anyhow::{Result, anyhow};
use sieve_actors::{
    actor::{ActorHandle, spawn_actor_with_shutdown},
    rate::{RateKey, RateLimiter, RateMsg},
    system::ActorSystem,
};
use sieve_common::Fetcher;
use sieve_config::{FetcherConfig, SieveConfig};
use sieve_http::HttpClient;
use sieve_social::telegram::TelegramFetcher;
use std::sync::Arc;

const DEFAULT_MAILBOX: usize = 1024;

/// Long-lived actors plus the fetcher wired to them.
pub struct Tether {
    system: ActorSystem,
    fetcher: Arc<dyn Fetcher>,
}

fn host_rate_key(kind: &str, host: &str) -> RateKey {
    RateKey(format!("{kind}:{host}"))
}

impl Tether {
    /// Start the rate limiter and build the configured fetcher.
    ///
    /// `max_messages` overrides the fetcher's configured page cap.
    pub async fn from_config(cfg: &SieveConfig, max_messages: Option<usize>) -> Result<Self> {
        let mut system = ActorSystem::new();
        let ActorHandle { addr: rate, task } = spawn_actor_with_shutdown(
            RateLimiter::new(),
            DEFAULT_MAILBOX,
            Some(system.shutdown_notifier()),
        );
        system.track(async move { task.await? });

        let fetcher: Arc<dyn Fetcher> = match &cfg.fetcher {
            FetcherConfig::Telegram(tg) => {
                let http = HttpClient::new(&tg.base_url)?.with_retries(tg.retries);
                let key = host_rate_key("telegram", http.base().host_str().unwrap_or("t.me"));
                rate.send(RateMsg::Upsert {
                    key: key.clone(),
                    qps: tg.qps,
                    burst: tg.burst,
                })
                .await
                .map_err(|_| anyhow!("rate limiter stopped before provisioning"))?;
                tracing::info!(key = %key.0, qps = tg.qps, burst = tg.burst, "tether.rate_provisioned");

                let fetcher = TelegramFetcher::from_http(http)
                    .with_max_messages(max_messages.unwrap_or(tg.max_messages))
                    .with_rate_limiter(rate, key);
                Arc::new(fetcher)
            }
        };

        Ok(Self { system, fetcher })
    }

    pub fn fetcher(&self) -> Arc<dyn Fetcher> {
        self.fetcher.clone()
    }

    /// Stop the actors and wait for them.
    pub async fn shutdown(self) -> Result<()> {
        drop(self.fetcher);
        self.system.graceful_shutdown().await
    }
}
