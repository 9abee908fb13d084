//! HTTP transport helpers for inter-node calls.
//!
//! Every outbound request is retried with exponential backoff and jitter.
//! Two policies exist: a short one for intra-cluster storage hops, and a
//! broker-grade one (1s doubling to a 30s cap) for queue operations, where a
//! remote node may legitimately be restarting.

use anyhow::Result;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Storage-hop policy: fail fast, the caller has fallbacks (backup reads,
    /// anti-entropy).
    pub fn interconnect() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(150),
            max_backoff: Duration::from_millis(1200),
        }
    }

    /// Broker policy: reconnect semantics. Backoff starts at 1s and doubles
    /// to a 30s cap; the attempt ceiling bounds total effort.
    pub fn broker() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let base = self
            .initial_backoff
            .saturating_mul(1u32 << attempt.min(16) as u32)
            .min(self.max_backoff);
        let jitter = Duration::from_millis(rand::random::<u64>() % 50);
        base + jitter
    }
}

pub async fn post_json_with_retry<T: serde::Serialize>(
    client: &reqwest::Client,
    url: &str,
    payload: &T,
    timeout: Duration,
    policy: &RetryPolicy,
) -> Result<reqwest::Response> {
    for attempt in 0..policy.max_attempts {
        let response = client
            .post(url)
            .json(payload)
            .timeout(timeout)
            .send()
            .await;

        match response {
            Ok(resp) => return Ok(resp),
            Err(e) => {
                if attempt + 1 == policy.max_attempts {
                    return Err(anyhow::anyhow!(e));
                }
                let delay = policy.backoff(attempt);
                tracing::debug!("POST {} failed ({}), retrying in {:?}", url, e, delay);
                tokio::time::sleep(delay).await;
            }
        }
    }
    Err(anyhow::anyhow!("retry attempts exhausted for {}", url))
}

pub async fn get_with_retry(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    policy: &RetryPolicy,
) -> Result<reqwest::Response> {
    for attempt in 0..policy.max_attempts {
        let response = client.get(url).timeout(timeout).send().await;

        match response {
            Ok(resp) => return Ok(resp),
            Err(e) => {
                if attempt + 1 == policy.max_attempts {
                    return Err(anyhow::anyhow!(e));
                }
                let delay = policy.backoff(attempt);
                tracing::debug!("GET {} failed ({}), retrying in {:?}", url, e, delay);
                tokio::time::sleep(delay).await;
            }
        }
    }
    Err(anyhow::anyhow!("retry attempts exhausted for {}", url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interconnect_backoff_doubles_and_caps() {
        let policy = RetryPolicy::interconnect();
        let first = policy.backoff(0);
        let second = policy.backoff(1);
        assert!(first >= Duration::from_millis(150));
        assert!(second >= Duration::from_millis(300));
        // Deep attempts stay under cap + jitter.
        assert!(policy.backoff(12) <= Duration::from_millis(1250));
    }

    #[test]
    fn broker_backoff_caps_at_thirty_seconds() {
        let policy = RetryPolicy::broker();
        assert!(policy.backoff(0) >= Duration::from_secs(1));
        assert!(policy.backoff(5) >= Duration::from_secs(30));
        assert!(policy.backoff(9) <= Duration::from_secs(30) + Duration::from_millis(50));
    }
}
