//! Readiness polling against the driver's status endpoint

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use spectral_common::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Delay between the end of one check and the start of the next
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on a single status request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// One readiness check against a driver
#[async_trait]
pub trait StatusProbe: Send + Sync {
    /// `true` only when the driver reports itself ready; failures are `false`
    async fn is_ready(&self) -> bool;
}

/// Probe for the WebDriver `GET /status` endpoint
pub struct HttpStatusProbe {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    value: Option<StatusValue>,
}

#[derive(Debug, Deserialize)]
struct StatusValue {
    #[serde(default)]
    ready: Value,
}

impl HttpStatusProbe {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn fetch(&self) -> reqwest::Result<StatusResponse> {
        self.client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json::<StatusResponse>()
            .await
    }
}

#[async_trait]
impl StatusProbe for HttpStatusProbe {
    async fn is_ready(&self) -> bool {
        match self.fetch().await {
            Ok(status) => status.value.map(|v| is_truthy(&v.ready)).unwrap_or(false),
            Err(e) => {
                // Connection refused is expected while the driver boots
                if !e.is_connect() {
                    debug!(url = %self.url, error = %e, "Status check failed");
                }
                false
            }
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Drives one start's readiness determination
pub struct HealthPoller {
    probe: Arc<dyn StatusProbe>,
    timeout: Duration,
}

impl HealthPoller {
    pub fn new(probe: Arc<dyn StatusProbe>, timeout: Duration) -> Self {
        Self { probe, timeout }
    }

    /// Poll until ready, until `timeout` elapses, or until `stopped` fires
    pub async fn wait_until_ready(&self, stopped: &CancellationToken) -> Result<()> {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;

            let ready = tokio::select! {
                biased;
                _ = stopped.cancelled() => false,
                ready = self.probe.is_ready() => ready,
                _ = sleep_until(deadline) => false,
            };

            if stopped.is_cancelled() {
                warn!(attempts, "Driver stopped before becoming ready");
                return Err(Error::StoppedDuringStart);
            }

            if ready {
                info!(attempts, elapsed_ms = millis(started.elapsed()), "Driver is ready");
                return Ok(());
            }

            if started.elapsed() >= self.timeout {
                warn!(
                    attempts,
                    timeout_ms = millis(self.timeout),
                    "Driver did not become ready in time"
                );
                return Err(Error::StartTimeout {
                    timeout_ms: millis(self.timeout),
                });
            }

            if attempts == 1 {
                info!("Waiting for driver to start...");
            }

            tokio::select! {
                _ = stopped.cancelled() => {
                    warn!(attempts, "Driver stopped before becoming ready");
                    return Err(Error::StoppedDuringStart);
                }
                _ = sleep(POLL_INTERVAL) => {}
            }
        }
    }
}
