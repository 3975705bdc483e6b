//! Background status polling, one task per printer address.
//!
//! The printer never pushes anything, so liveness and display state both come
//! from periodic `GET /inquiry` calls. Each result, or a timeout, is reported
//! as a [`HeartbeatEvent`].

use std::sync::Arc;

use minilink_client::PrinterApi;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::config::HeartbeatConfig;

/// Poller lifecycle. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerMode {
    Polling,
    Suspended,
    Stopped,
}

/// Outcome of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Heartbeat {
    /// Raw `/inquiry` body.
    Response(String),
    /// No answer in time, or any transport failure.
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatEvent {
    pub address: String,
    pub beat: Heartbeat,
}

/// Cloneable handle for suspending, resuming and stopping a poller.
#[derive(Debug, Clone)]
pub struct PollerControl {
    mode: Arc<watch::Sender<PollerMode>>,
}

impl PollerControl {
    pub(crate) fn new() -> (Self, watch::Receiver<PollerMode>) {
        let (tx, rx) = watch::channel(PollerMode::Polling);
        (Self { mode: Arc::new(tx) }, rx)
    }

    /// Skips polls until [`resume`](Self::resume). No effect once stopped.
    pub fn suspend(&self) {
        self.mode.send_if_modified(|mode| {
            if *mode == PollerMode::Polling {
                *mode = PollerMode::Suspended;
                true
            } else {
                false
            }
        });
    }

    /// Polling restarts at the next interval tick. No effect once stopped.
    pub fn resume(&self) {
        self.mode.send_if_modified(|mode| {
            if *mode == PollerMode::Suspended {
                *mode = PollerMode::Polling;
                true
            } else {
                false
            }
        });
    }

    pub fn stop(&self) {
        self.mode.send_if_modified(|mode| {
            if *mode == PollerMode::Stopped {
                false
            } else {
                *mode = PollerMode::Stopped;
                true
            }
        });
    }

    pub fn mode(&self) -> PollerMode {
        *self.mode.borrow()
    }
}

/// A running poller. Dropping it stops the task.
pub struct HeartbeatPoller {
    address: String,
    control: PollerControl,
    handle: JoinHandle<()>,
}

impl HeartbeatPoller {
    /// Spawns the polling task. The first poll happens immediately.
    pub fn spawn(
        api: Arc<dyn PrinterApi>,
        config: HeartbeatConfig,
        events_tx: mpsc::Sender<HeartbeatEvent>,
    ) -> Self {
        let address = api.address().to_string();
        let (control, mode_rx) = PollerControl::new();
        debug!(address = %address, "starting heartbeat");
        let handle = tokio::spawn(poll_loop(api, config, mode_rx, events_tx));
        Self {
            address,
            control,
            handle,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn control(&self) -> PollerControl {
        self.control.clone()
    }

    pub fn suspend(&self) {
        self.control.suspend();
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    pub fn stop(&self) {
        self.control.stop();
    }

    pub fn mode(&self) -> PollerMode {
        self.control.mode()
    }

    /// True once the task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for HeartbeatPoller {
    fn drop(&mut self) {
        self.control.stop();
    }
}

async fn poll_loop(
    api: Arc<dyn PrinterApi>,
    config: HeartbeatConfig,
    mut mode_rx: watch::Receiver<PollerMode>,
    events_tx: mpsc::Sender<HeartbeatEvent>,
) {
    let address = api.address().to_string();
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = mode_rx.changed() => {
                if changed.is_err() || *mode_rx.borrow() == PollerMode::Stopped {
                    break;
                }
                continue;
            }
        }

        let mode = *mode_rx.borrow_and_update();
        match mode {
            PollerMode::Stopped => break,
            PollerMode::Suspended => {
                trace!(address = %address, "heartbeat suspended, skipping poll");
                continue;
            }
            PollerMode::Polling => {}
        }

        let query = tokio::time::timeout(config.timeout, api.query_status());
        let beat = tokio::select! {
            result = query => match result {
                Ok(Ok(body)) => Heartbeat::Response(body),
                Ok(Err(e)) => {
                    trace!(address = %address, error = %e, "heartbeat failed");
                    Heartbeat::Timeout
                }
                Err(_) => {
                    trace!(address = %address, "heartbeat timed out");
                    Heartbeat::Timeout
                }
            },
            () = stopped(&mut mode_rx) => break,
        };

        let event = HeartbeatEvent {
            address: address.clone(),
            beat,
        };
        if events_tx.send(event).await.is_err() {
            break;
        }
    }

    debug!(address = %address, "heartbeat stopped");
}

/// Resolves once the poller is stopped or its control handle is gone.
async fn stopped(mode_rx: &mut watch::Receiver<PollerMode>) {
    loop {
        if *mode_rx.borrow_and_update() == PollerMode::Stopped {
            return;
        }
        if mode_rx.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use minilink_client::ApiError;

    use crate::test_support::{IDLE, MockApi};

    fn config() -> HeartbeatConfig {
        HeartbeatConfig::default()
    }

    #[tokio::test(start_paused = true)]
    async fn polls_immediately_then_every_interval() {
        let api = MockApi::new("10.0.0.5");
        let (tx, mut rx) = mpsc::channel(16);
        let _poller = HeartbeatPoller::spawn(api.clone(), config(), tx);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.address, "10.0.0.5");
        assert_eq!(first.beat, Heartbeat::Response(IDLE.to_string()));

        let start = tokio::time::Instant::now();
        rx.recv().await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(2100), "{elapsed:?}");
        assert_eq!(api.status_queries(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_reported_as_timeouts() {
        let api = MockApi::new("10.0.0.5");
        api.set_status(Err(ApiError::Unreachable("refused".into())));
        let (tx, mut rx) = mpsc::channel(16);
        let _poller = HeartbeatPoller::spawn(api, config(), tx);

        assert_eq!(rx.recv().await.unwrap().beat, Heartbeat::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn suspended_poller_issues_no_queries() {
        let api = MockApi::new("10.0.0.5");
        let (tx, mut rx) = mpsc::channel(16);
        let poller = HeartbeatPoller::spawn(api.clone(), config(), tx);

        rx.recv().await.unwrap();
        poller.suspend();
        assert_eq!(poller.mode(), PollerMode::Suspended);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(api.status_queries(), 1);
        assert!(rx.try_recv().is_err());

        poller.resume();
        let start = tokio::time::Instant::now();
        rx.recv().await.unwrap();
        assert!(start.elapsed() <= Duration::from_secs(2));
        assert_eq!(api.status_queries(), 2);

        rx.recv().await.unwrap();
        assert_eq!(api.status_queries(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_poller_cannot_resume() {
        let api = MockApi::new("10.0.0.5");
        let (tx, mut rx) = mpsc::channel(16);
        let poller = HeartbeatPoller::spawn(api.clone(), config(), tx);
        rx.recv().await.unwrap();

        poller.stop();
        poller.resume();
        assert_eq!(poller.mode(), PollerMode::Stopped);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(poller.is_finished());
        assert_eq!(api.status_queries(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_poller_stops_it() {
        let api = MockApi::new("10.0.0.5");
        let (tx, mut rx) = mpsc::channel(16);
        let poller = HeartbeatPoller::spawn(api.clone(), config(), tx);
        rx.recv().await.unwrap();
        drop(poller);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(api.status_queries(), 1);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn control_transitions() {
        let (control, _rx) = PollerControl::new();
        control.resume();
        assert_eq!(control.mode(), PollerMode::Polling);
        control.suspend();
        assert_eq!(control.mode(), PollerMode::Suspended);
        control.resume();
        assert_eq!(control.mode(), PollerMode::Polling);
        control.stop();
        control.suspend();
        assert_eq!(control.mode(), PollerMode::Stopped);
    }
}
