//! Fixed-interval "available" presence while the session is connected.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use kai_transport::MessagingTransport;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const DEFAULT_PRESENCE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub struct PresenceRefreshHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<u64>>,
}

impl PresenceRefreshHandle {
    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Stops the loop and returns how many refreshes were attempted.
    pub async fn shutdown(&mut self) -> u64 {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        match self.task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => 0,
        }
    }
}

impl Drop for PresenceRefreshHandle {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

/// Spawns the refresh loop. The first refresh fires immediately.
pub fn start_presence_refresh(
    transport: Arc<dyn MessagingTransport>,
    interval: Duration,
) -> Result<PresenceRefreshHandle> {
    if interval.is_zero() {
        bail!("presence refresh interval must be greater than zero");
    }
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(run_presence_loop(transport, interval, shutdown_rx));
    tracing::debug!(
        interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
        "presence refresh started"
    );
    Ok(PresenceRefreshHandle {
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}

async fn run_presence_loop(
    transport: Arc<dyn MessagingTransport>,
    interval: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> u64 {
    let mut ticks = 0_u64;
    let mut interval = tokio::time::interval(interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                ticks = ticks.saturating_add(1);
                if let Err(error) = transport.send_presence_available().await {
                    tracing::warn!(error = %error, "presence refresh failed");
                }
            }
            _ = &mut shutdown_rx => {
                tracing::debug!(ticks, "presence refresh stopped");
                return ticks;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use kai_transport::memory::InMemoryTransport;

    use super::start_presence_refresh;

    #[tokio::test(start_paused = true)]
    async fn functional_refresh_ticks_until_shutdown() {
        let transport = Arc::new(InMemoryTransport::new());
        let mut handle =
            start_presence_refresh(transport.clone(), Duration::from_secs(30)).expect("start");
        assert!(handle.is_running());
        tokio::time::sleep(Duration::from_secs(65)).await;
        let ticks = handle.shutdown().await;
        assert_eq!(ticks, 3);
        assert_eq!(transport.presence_updates(), 3);
        assert!(!handle.is_running());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.presence_updates(), 3);
    }

    #[tokio::test]
    async fn regression_zero_interval_is_rejected() {
        let error = start_presence_refresh(Arc::new(InMemoryTransport::new()), Duration::ZERO)
            .expect_err("zero interval");
        assert!(error.to_string().contains("greater than zero"));
    }
}
