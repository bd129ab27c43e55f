use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use md_dhcp::InitError;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Uptime after which a service counts as healthy again.
const HEALTHY_AFTER: Duration = Duration::from_secs(60);

/// Restart policy of a supervised service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServicePriority {
    /// Restarted quickly, without limit
    Critical,
    /// Restarted with backoff, up to 10 times
    Background,
}

impl ServicePriority {
    fn max_retries(self) -> u32 {
        match self {
            Self::Critical => u32::MAX,
            Self::Background => 10,
        }
    }

    fn backoff(self, retry: u32) -> Duration {
        match self {
            Self::Critical => Duration::from_millis(100 * u64::from(retry.min(50))),
            Self::Background => Duration::from_secs(u64::from(retry)),
        }
    }
}

/// Startup failures (bad pool, port in use, missing privilege) repeat
/// identically on every restart.
fn is_retryable(err: &anyhow::Error) -> bool {
    !err.chain().any(|cause| cause.is::<InitError>())
}

/// Run a service in its own task, restarting it after errors or panics.
///
/// The handle resolves to `Ok` on a clean exit and to the last error once the
/// service fails with an [`InitError`] or runs out of retries. The retry
/// counter resets once the service has stayed up for [`HEALTHY_AFTER`].
pub fn spawn_supervised<F, Fut>(
    name: &'static str,
    priority: ServicePriority,
    factory: F,
) -> JoinHandle<anyhow::Result<()>>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let factory = Arc::new(factory);
    tokio::spawn(async move {
        let max_retries = priority.max_retries();
        let mut retries: u32 = 0;

        loop {
            if retries == 0 {
                info!("[supervisor] Starting service: {name}");
            } else {
                info!("[supervisor] Restarting service: {name}");
            }
            let started = Instant::now();

            let f = Arc::clone(&factory);
            let err = match tokio::spawn(async move { f().await }).await {
                Ok(Ok(())) => {
                    info!("[supervisor] {name} exited cleanly");
                    return Ok(());
                }
                Ok(Err(e)) if !is_retryable(&e) => {
                    error!("[supervisor] {name} cannot start: {e:#}");
                    return Err(e);
                }
                Ok(Err(e)) => {
                    error!("[supervisor] {name} failed: {e:#}");
                    e
                }
                Err(join_error) => {
                    error!("[supervisor] {name} task panicked: {join_error}");
                    anyhow!("{name} panicked: {join_error}")
                }
            };

            if started.elapsed() > HEALTHY_AFTER {
                retries = 0;
            }
            retries = retries.saturating_add(1);

            if retries > max_retries {
                error!("[supervisor] {name} exceeded max retries ({max_retries}), giving up");
                return Err(err.context(format!("{name} gave up after {max_retries} retries")));
            }

            let backoff = priority.backoff(retries);
            warn!("[supervisor] {name} restarting in {backoff:?} (attempt {retries})");
            tokio::time::sleep(backoff).await;
        }
    })
}
