//! Startup readiness gate.
//!
//! Sleeps an initial grace period, then probes on a fixed cadence until the
//! probe succeeds, the overall deadline passes, or a periodic liveness check
//! finds the server gone. Dying and being slow are reported separately
//! because they call for different fixes.

use crate::stream::Console;
use crate::supervisor::Liveness;
use std::future::Future;
use std::time::Duration;
use sweep_common::SweepError;
use sweep_common::config::TimeoutsSection;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default wait before the first probe.
const DEFAULT_STARTUP_GRACE: Duration = Duration::from_secs(10);

/// Default time between probes.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default overall startup budget, grace included.
const DEFAULT_OVERALL_TIMEOUT: Duration = Duration::from_secs(300);

/// Default number of failed polls between liveness checks.
const DEFAULT_LIVENESS_EVERY: u32 = 6;

#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub startup_grace: Duration,
    pub poll_interval: Duration,
    /// Measured from the call to [`HealthGate::wait`], grace included.
    pub overall_timeout: Duration,
    /// Liveness is checked right after the grace period and then after every
    /// this many failed probes.
    pub liveness_every: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            startup_grace: DEFAULT_STARTUP_GRACE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            overall_timeout: DEFAULT_OVERALL_TIMEOUT,
            liveness_every: DEFAULT_LIVENESS_EVERY,
        }
    }
}

impl From<&TimeoutsSection> for HealthConfig {
    fn from(timeouts: &TimeoutsSection) -> Self {
        Self {
            startup_grace: timeouts.startup_grace(),
            poll_interval: timeouts.poll_interval(),
            overall_timeout: timeouts.startup(),
            liveness_every: timeouts.liveness_every(),
        }
    }
}

/// A readiness check. Any failure (refused, timeout, non-2xx) is `false`.
pub trait ReadinessProbe {
    fn probe(&self) -> impl Future<Output = bool> + Send;
}

/// HTTP GET against the server's health endpoint; 2xx means ready.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, probe_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(probe_timeout)
            .no_proxy()
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ReadinessProbe for HttpProbe {
    async fn probe(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(url = %self.url, error = %e, "Health probe failed");
                false
            }
        }
    }
}

/// A probe backed by a closure, for servers with a non-HTTP readiness signal
/// (a marker file, a port check).
pub struct FnProbe<F>(pub F);

impl<F> ReadinessProbe for FnProbe<F>
where
    F: Fn() -> bool + Sync,
{
    async fn probe(&self) -> bool {
        (self.0)()
    }
}

/// Result of waiting for a server to become ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Ready { elapsed: Duration },
    TimedOut { elapsed: Duration },
    ProcessDied { elapsed: Duration },
}

impl HealthStatus {
    pub fn elapsed(&self) -> Duration {
        match self {
            Self::Ready { elapsed } | Self::TimedOut { elapsed } | Self::ProcessDied { elapsed } => {
                *elapsed
            }
        }
    }

    /// `Ok` when ready, otherwise the matching startup failure.
    pub fn into_result(self, overall_timeout: Duration) -> Result<Duration, SweepError> {
        match self {
            Self::Ready { elapsed } => Ok(elapsed),
            Self::TimedOut { .. } => Err(SweepError::StartupTimedOut(overall_timeout)),
            Self::ProcessDied { elapsed } => Err(SweepError::ServerDiedDuringStartup { elapsed }),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HealthGate {
    config: HealthConfig,
}

impl HealthGate {
    pub fn new(config: HealthConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Block until `target` is ready, dead, or out of time. Forwarded output
    /// is printed while waiting.
    pub async fn wait<L, P>(&self, target: &mut L, probe: &P, console: &mut Console) -> HealthStatus
    where
        L: Liveness,
        P: ReadinessProbe,
    {
        let cfg = &self.config;
        let started = Instant::now();
        let deadline = started + cfg.overall_timeout;
        let every = cfg.liveness_every.max(1);

        info!(
            timeout_secs = cfg.overall_timeout.as_secs(),
            "Waiting for server to become ready"
        );
        console.idle_until((started + cfg.startup_grace).min(deadline)).await;

        let mut failed_polls: u32 = 0;
        loop {
            if failed_polls % every == 0 {
                if !target.is_alive() {
                    let elapsed = started.elapsed();
                    warn!(elapsed_ms = elapsed.as_millis() as u64, "Server died during startup");
                    return HealthStatus::ProcessDied { elapsed };
                }
                if failed_polls > 0 {
                    info!(elapsed_secs = started.elapsed().as_secs(), "Still waiting for server");
                }
            }

            if Instant::now() >= deadline {
                break;
            }

            if probe.probe().await {
                let elapsed = started.elapsed();
                info!(elapsed_ms = elapsed.as_millis() as u64, "Server is ready");
                console.drain();
                return HealthStatus::Ready { elapsed };
            }
            failed_polls = failed_polls.saturating_add(1);

            let next = Instant::now() + cfg.poll_interval;
            if next >= deadline {
                console.idle_until(deadline).await;
                break;
            }
            console.idle_until(next).await;
        }

        let elapsed = started.elapsed();
        warn!(
            elapsed_ms = elapsed.as_millis() as u64,
            "Server not ready before startup deadline"
        );
        HealthStatus::TimedOut { elapsed }
    }
}
