// ── Connection watchdog ──
//
// Two-tier liveness check. A long periodic tick looks at the connectivity
// flag; if it is down, a short grace timer starts (at most one at a time).
// When the grace timer fires with the flag still down, exactly one
// reconnect request goes out. Recovery during grace cancels the timer.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WatchdogConfig;

/// Why the engine should re-initialize the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectRequest {
    /// The watchdog confirmed an outage.
    ConnectionLost,
    /// An out-of-band authorization flow finished.
    AuthorizationCompleted,
}

/// Observable watchdog state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WatchdogPhase {
    Unarmed,
    Armed,
    Grace,
}

/// A running watchdog. Dropping it without [`disarm`](Self::disarm) still
/// stops the task through the cancellation token.
pub struct Watchdog {
    cancel: CancellationToken,
    phase: watch::Receiver<WatchdogPhase>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Start the periodic check.
    ///
    /// `parent` is the engine's run token; the watchdog stops with it.
    pub fn arm(
        config: WatchdogConfig,
        connected: watch::Receiver<bool>,
        reconnect: mpsc::Sender<ReconnectRequest>,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let (phase_tx, phase) = watch::channel(WatchdogPhase::Armed);
        let handle = tokio::spawn(watchdog_task(
            config,
            connected,
            reconnect,
            phase_tx,
            cancel.clone(),
        ));
        debug!(
            interval_secs = config.check_interval.as_secs(),
            grace_secs = config.grace_period.as_secs(),
            "watchdog armed"
        );
        Self {
            cancel,
            phase,
            handle: Some(handle),
        }
    }

    pub fn phase(&self) -> WatchdogPhase {
        *self.phase.borrow()
    }

    /// Cancel both timers and wait for the task to finish.
    pub async fn disarm(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "watchdog task ended abnormally");
            }
        }
        debug!("watchdog disarmed");
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn watchdog_task(
    config: WatchdogConfig,
    mut connected: watch::Receiver<bool>,
    reconnect: mpsc::Sender<ReconnectRequest>,
    phase: watch::Sender<WatchdogPhase>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(config.check_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick

    let grace = tokio::time::sleep(config.grace_period);
    tokio::pin!(grace);
    let mut in_grace = false;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = &mut grace, if in_grace => {
                in_grace = false;
                if *connected.borrow() {
                    info!("hub connection recovered during grace period");
                } else {
                    warn!("hub still disconnected after grace period, requesting reconnect");
                    if reconnect.send(ReconnectRequest::ConnectionLost).await.is_err() {
                        break;
                    }
                }
                phase.send_replace(WatchdogPhase::Armed);
            }
            changed = connected.changed(), if in_grace => {
                if changed.is_err() {
                    break;
                }
                if *connected.borrow_and_update() {
                    in_grace = false;
                    info!("hub connection recovered, grace timer cancelled");
                    phase.send_replace(WatchdogPhase::Armed);
                }
            }
            _ = interval.tick() => {
                if !*connected.borrow_and_update() && !in_grace {
                    debug!(grace_secs = config.grace_period.as_secs(), "hub disconnected, starting grace timer");
                    in_grace = true;
                    grace.as_mut().reset(Instant::now() + config.grace_period);
                    phase.send_replace(WatchdogPhase::Grace);
                }
            }
        }
    }

    phase.send_replace(WatchdogPhase::Unarmed);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> WatchdogConfig {
        WatchdogConfig {
            check_interval: Duration::from_secs(300),
            grace_period: Duration::from_secs(30),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connected_hub_never_enters_grace() {
        let (_conn_tx, conn_rx) = watch::channel(true);
        let (tx, mut rx) = mpsc::channel(4);
        let root = CancellationToken::new();
        let wd = Watchdog::arm(config(), conn_rx, tx, &root);

        tokio::time::sleep(Duration::from_secs(1000)).await;
        assert_eq!(wd.phase(), WatchdogPhase::Armed);
        assert!(rx.try_recv().is_err());
        wd.disarm().await;
    }

    #[tokio::test(start_paused = true)]
    async fn grace_starts_at_tick_and_is_not_restarted() {
        let (_conn_tx, conn_rx) = watch::channel(false);
        let (tx, mut rx) = mpsc::channel(4);
        let root = CancellationToken::new();
        let wd = Watchdog::arm(config(), conn_rx, tx, &root);

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(wd.phase(), WatchdogPhase::Armed);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(wd.phase(), WatchdogPhase::Grace);
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(rx.try_recv().unwrap(), ReconnectRequest::ConnectionLost);
        assert!(rx.try_recv().is_err());
        assert_eq!(wd.phase(), WatchdogPhase::Armed);
        wd.disarm().await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_the_parent_stops_the_task() {
        let (_conn_tx, conn_rx) = watch::channel(false);
        let (tx, mut rx) = mpsc::channel(4);
        let root = CancellationToken::new();
        let wd = Watchdog::arm(config(), conn_rx, tx, &root);

        root.cancel();
        tokio::time::sleep(Duration::from_secs(400)).await;
        assert_eq!(wd.phase(), WatchdogPhase::Unarmed);
        assert!(rx.try_recv().is_err());
    }
}
