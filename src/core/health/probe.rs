use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Lightweight reachability check. Never errors: anything that is not a
/// response within `timeout` is `false`.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn ping(&self, url: &str, timeout: Duration) -> bool;
}

/// Sends a HEAD request. Any HTTP response, whatever the status, counts as
/// reachable since many backends reject HEAD or unauthenticated calls.
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpProber {
    fn default() -> Self {
        Self::new()
    }
}

/// Only absolute http(s) URLs are probed.
pub(crate) fn probe_target(raw: &str) -> Option<url::Url> {
    let parsed = url::Url::parse(raw.trim()).ok()?;
    matches!(parsed.scheme(), "http" | "https").then_some(parsed)
}

#[async_trait]
impl Prober for HttpProber {
    async fn ping(&self, url: &str, timeout: Duration) -> bool {
        let Some(target) = probe_target(url) else {
            debug!("Not probing invalid endpoint '{}'", url);
            return false;
        };
        let request = self.client.head(target).timeout(timeout).send();
        match tokio::time::timeout(timeout, request).await {
            Ok(Ok(resp)) => {
                debug!("Probe {} answered {}", url, resp.status());
                true
            }
            Ok(Err(e)) => {
                debug!("Probe {} failed: {}", url, e);
                false
            }
            Err(_) => {
                debug!("Probe {} timed out after {:?}", url, timeout);
                false
            }
        }
    }
}
