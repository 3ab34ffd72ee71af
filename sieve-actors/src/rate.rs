use crate::actor::{Actor, Addr, Context};
use anyhow::{anyhow, Result};
use std::{collections::HashMap, time::Duration};
use tokio::{
    sync::oneshot,
    time::{sleep, Instant},
};

/// Lowest refill rate accepted; smaller values would make waits unbounded.
const MIN_QPS: f64 = 0.001;

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct RateKey(pub String);

#[derive(Debug)]
pub enum RateMsg {
    /// Insert/update bucket config.
    Upsert { key: RateKey, qps: f64, burst: u32 },
    /// Acquire `cost` tokens; replies when allowed.
    Acquire {
        key: RateKey,
        cost: u32,
        reply: oneshot::Sender<RatePermit>,
    },
}

#[derive(Debug)]
pub struct RatePermit;

/// Token-bucket rate limiter as an actor.
///
/// - `Upsert` creates or updates the bucket for a `RateKey`.
/// - `Acquire` waits (off-actor) until `cost` tokens are available, then replies.
///   Unknown keys get a 1 qps / burst 1 bucket.
///
/// Fetchers use one key per upstream host so concurrent workers share a
/// single politeness budget.
#[derive(Clone, Copy, Debug)]
struct BucketCfg {
    qps: f64,
    burst: f64,
}

#[derive(Debug)]
struct BucketState {
    cfg: BucketCfg,
    tokens: f64,
    last: Instant,
}

impl BucketState {
    fn new(cfg: BucketCfg, now: Instant) -> Self {
        Self {
            cfg,
            tokens: cfg.burst,
            last: now,
        }
    }

    /// Time to wait before `need` tokens are available (0 if ready).
    fn needed_wait(&mut self, need: f64, now: Instant) -> Duration {
        let dt = now.saturating_duration_since(self.last).as_secs_f64();
        self.last = now;
        self.tokens = (self.tokens + dt * self.cfg.qps).min(self.cfg.burst);

        if self.tokens >= need {
            self.tokens -= need;
            Duration::ZERO
        } else {
            let deficit = need - self.tokens;
            // reserve now so callers queued behind us wait their own turn
            self.tokens -= need;
            Duration::from_secs_f64(deficit / self.cfg.qps)
        }
    }
}

pub struct RateLimiter {
    buckets: HashMap<RateKey, BucketState>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: HashMap::new(),
        }
    }

    fn upsert(&mut self, key: RateKey, qps: f64, burst: u32, now: Instant) {
        let cfg = BucketCfg {
            qps: qps.max(MIN_QPS),
            burst: f64::from(burst.max(1)),
        };
        self.buckets
            .entry(key)
            .and_modify(|b| b.cfg = cfg)
            .or_insert_with(|| BucketState::new(cfg, now));
    }

    fn reserve(&mut self, key: RateKey, cost: u32, now: Instant) -> Duration {
        self.buckets
            .entry(key)
            .or_insert_with(|| {
                BucketState::new(
                    BucketCfg {
                        qps: 1.0,
                        burst: 1.0,
                    },
                    now,
                )
            })
            .needed_wait(f64::from(cost), now)
    }
}

#[async_trait::async_trait]
impl Actor for RateLimiter {
    type Msg = RateMsg;

    async fn handle(&mut self, msg: Self::Msg, _ctx: &mut Context<Self>) -> Result<()> {
        match msg {
            RateMsg::Upsert { key, qps, burst } => {
                tracing::debug!(key = %key.0, qps, burst, "rate.upsert");
                self.upsert(key, qps, burst, Instant::now());
            }
            RateMsg::Acquire { key, cost, reply } => {
                let wait = self.reserve(key, cost, Instant::now());
                // Do not block the mailbox; the caller is released from a detached task.
                tokio::spawn(async move {
                    if !wait.is_zero() {
                        sleep(wait).await;
                    }
                    let _ = reply.send(RatePermit);
                });
            }
        }
        Ok(())
    }
}

/// Ask `limiter` for `cost` tokens under `key` and wait for the permit.
pub async fn acquire(limiter: &Addr<RateLimiter>, key: &RateKey, cost: u32) -> Result<()> {
    let (reply, permit) = oneshot::channel();
    limiter
        .send(RateMsg::Acquire {
            key: key.clone(),
            cost,
            reply,
        })
        .await
        .map_err(|_| anyhow!("rate limiter actor dropped"))?;
    permit
        .await
        .map_err(|_| anyhow!("failed to receive rate permit from limiter"))?;
    Ok(())
}
