//! Broker connection supervisor.
//!
//! Owns the single outbound broker connection of the process. A background
//! task walks `Disconnected -> Connecting -> Connected` and falls back to
//! `Disconnected` on any failure, retrying after a fixed delay forever.
//! Readers get a [`BrokerHandle`] that snapshots the current link without
//! ever waiting on broker I/O.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::transport::{BrokerConnector, SharedChannel};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// State plus channel, always replaced as a whole. `channel` is `Some` iff
/// `state` is `Connected`.
#[derive(Clone)]
struct Link {
    state: ConnectionState,
    channel: Option<SharedChannel>,
}

impl Link {
    fn disconnected() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            channel: None,
        }
    }

    fn connecting() -> Self {
        Self {
            state: ConnectionState::Connecting,
            channel: None,
        }
    }

    fn connected(channel: SharedChannel) -> Self {
        Self {
            state: ConnectionState::Connected,
            channel: Some(channel),
        }
    }
}

/// Read side of the supervisor. Cheap to clone.
#[derive(Clone)]
pub struct BrokerHandle {
    link: watch::Receiver<Link>,
}

impl BrokerHandle {
    /// A handle pinned to one link, for wiring a gateway without a
    /// supervisor behind it.
    pub fn fixed(channel: Option<SharedChannel>) -> Self {
        let link = match channel {
            Some(c) => Link::connected(c),
            None => Link::disconnected(),
        };
        let (_tx, rx) = watch::channel(link);
        Self { link: rx }
    }

    /// The usable channel, or `None` when not connected. Callers re-check
    /// on every publish.
    pub fn current_channel(&self) -> Option<SharedChannel> {
        self.link.borrow().channel.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.link.borrow().state
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Fixed delay between a failure and the next connect attempt.
    pub reconnect_delay: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

pub struct Supervisor {
    handle: BrokerHandle,
    shutdown: CancellationToken,
    join: JoinHandle<()>,
}

impl Supervisor {
    /// Spawn the supervision task. The first connect attempt starts
    /// immediately.
    pub fn start(connector: Arc<dyn BrokerConnector>, cfg: SupervisorConfig) -> Self {
        let (link_tx, link_rx) = watch::channel(Link::disconnected());
        let shutdown = CancellationToken::new();

        let join = tokio::spawn(run(connector, cfg, link_tx, shutdown.clone()));

        Self {
            handle: BrokerHandle { link: link_rx },
            shutdown,
            join,
        }
    }

    pub fn handle(&self) -> BrokerHandle {
        self.handle.clone()
    }

    /// Cancel the task, close a live channel and wait for the task to end.
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.join.await {
            warn!("broker supervisor task ended abnormally: {e}");
        }
    }
}

async fn run(
    connector: Arc<dyn BrokerConnector>,
    cfg: SupervisorConfig,
    link: watch::Sender<Link>,
    shutdown: CancellationToken,
) {
    let mut attempt: u64 = 0;

    loop {
        attempt += 1;
        link.send_replace(Link::connecting());
        info!(attempt, "connecting to broker");

        let result = tokio::select! {
            _ = shutdown.cancelled() => break,
            r = connector.connect() => r,
        };

        match result {
            Ok(channel) => {
                link.send_replace(Link::connected(channel.clone()));
                info!(attempt, "broker connected and queue declared");
                attempt = 0;

                tokio::select! {
                    _ = shutdown.cancelled() => {
                        link.send_replace(Link::disconnected());
                        channel.close().await;
                        break;
                    }
                    _ = channel.closed() => {
                        link.send_replace(Link::disconnected());
                        warn!("broker channel lost");
                    }
                }
            }
            Err(e) => {
                link.send_replace(Link::disconnected());
                warn!(attempt, "failed to connect to broker: {e}");
            }
        }

        info!(delay = ?cfg.reconnect_delay, "retrying broker connection");
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(cfg.reconnect_delay) => {}
        }
    }

    link.send_replace(Link::disconnected());
    info!("broker supervisor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{BrokerChannel, BrokerError};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    struct FakeChannel {
        lost: CancellationToken,
        closed_by_us: AtomicBool,
    }

    impl FakeChannel {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                lost: CancellationToken::new(),
                closed_by_us: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl BrokerChannel for FakeChannel {
        async fn publish(&self, _queue: &str, _payload: &[u8]) -> Result<(), BrokerError> {
            Ok(())
        }
        async fn closed(&self) {
            self.lost.cancelled().await
        }
        async fn close(&self) {
            self.closed_by_us.store(true, Ordering::SeqCst);
        }
    }

    enum Outcome {
        Fail,
        DeclareFail,
        Succeed(Arc<FakeChannel>),
    }

    /// Plays back a fixed script of outcomes and reports when each attempt
    /// happened. Once the script is exhausted every attempt fails.
    struct ScriptedConnector {
        script: Mutex<VecDeque<Outcome>>,
        attempts: mpsc::UnboundedSender<Instant>,
    }

    impl ScriptedConnector {
        fn new(script: Vec<Outcome>) -> (Arc<Self>, mpsc::UnboundedReceiver<Instant>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let c = Arc::new(Self {
                script: Mutex::new(script.into()),
                attempts: tx,
            });
            (c, rx)
        }
    }

    #[async_trait]
    impl BrokerConnector for ScriptedConnector {
        async fn connect(&self) -> Result<SharedChannel, BrokerError> {
            let _ = self.attempts.send(Instant::now());
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Outcome::Succeed(ch)) => Ok(ch as SharedChannel),
                Some(Outcome::DeclareFail) => Err(BrokerError::Declare {
                    queue: "activity_events".into(),
                    source: "PRECONDITION_FAILED".into(),
                }),
                Some(Outcome::Fail) | None => Err(BrokerError::Connect("connection refused".into())),
            }
        }
    }

    async fn wait_for_state(handle: &BrokerHandle, state: ConnectionState) {
        while handle.state() != state {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_after_n_failures_at_fixed_delay() {
        const N: usize = 3;
        let channel = FakeChannel::new();
        let mut script: Vec<Outcome> = (0..N).map(|_| Outcome::Fail).collect();
        script.push(Outcome::Succeed(channel));

        let (connector, mut attempts) = ScriptedConnector::new(script);
        let sup = Supervisor::start(connector, SupervisorConfig::default());
        let handle = sup.handle();

        let mut seen = Vec::new();
        for _ in 0..N {
            seen.push(attempts.recv().await.unwrap());
            assert!(handle.current_channel().is_none());
            assert_ne!(handle.state(), ConnectionState::Connected);
        }
        seen.push(attempts.recv().await.unwrap());

        wait_for_state(&handle, ConnectionState::Connected).await;
        assert!(handle.current_channel().is_some());
        assert_eq!(seen.len(), N + 1);
        for pair in seen.windows(2) {
            assert!(pair[1] - pair[0] >= DEFAULT_RECONNECT_DELAY);
        }
        assert!(attempts.try_recv().is_err());

        sup.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn declare_failure_is_a_failed_attempt() {
        let channel = FakeChannel::new();
        let (connector, mut attempts) =
            ScriptedConnector::new(vec![Outcome::DeclareFail, Outcome::Succeed(channel)]);
        let cfg = SupervisorConfig {
            reconnect_delay: Duration::from_secs(2),
        };
        let sup = Supervisor::start(connector, cfg);
        let handle = sup.handle();

        let first = attempts.recv().await.unwrap();
        assert!(handle.current_channel().is_none());
        let second = attempts.recv().await.unwrap();
        assert!(second - first >= Duration::from_secs(2));

        wait_for_state(&handle, ConnectionState::Connected).await;
        sup.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn channel_loss_goes_through_disconnected_and_reconnects() {
        let first = FakeChannel::new();
        let second = FakeChannel::new();
        let (connector, mut attempts) = ScriptedConnector::new(vec![
            Outcome::Succeed(first.clone()),
            Outcome::Succeed(second.clone()),
        ]);
        let sup = Supervisor::start(connector, SupervisorConfig::default());
        let handle = sup.handle();

        attempts.recv().await.unwrap();
        wait_for_state(&handle, ConnectionState::Connected).await;

        let lost_at = Instant::now();
        first.lost.cancel();
        wait_for_state(&handle, ConnectionState::Disconnected).await;
        assert!(handle.current_channel().is_none());

        let retry_at = attempts.recv().await.unwrap();
        assert!(retry_at - lost_at >= DEFAULT_RECONNECT_DELAY);
        wait_for_state(&handle, ConnectionState::Connected).await;

        sup.stop().await;
        assert!(second.closed_by_us.load(Ordering::SeqCst));
        assert!(!first.closed_by_us.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_leaves_handle_disconnected() {
        let (connector, _attempts) = ScriptedConnector::new(vec![]);
        let sup = Supervisor::start(connector, SupervisorConfig::default());
        let handle = sup.handle();

        tokio::time::sleep(Duration::from_secs(12)).await;
        sup.stop().await;

        assert_eq!(handle.state(), ConnectionState::Disconnected);
        assert!(handle.current_channel().is_none());
    }

    #[test]
    fn fixed_handle_reflects_channel() {
        let connected = BrokerHandle::fixed(Some(FakeChannel::new()));
        assert_eq!(connected.state(), ConnectionState::Connected);
        assert!(connected.current_channel().is_some());

        let down = BrokerHandle::fixed(None);
        assert_eq!(down.state(), ConnectionState::Disconnected);
        assert_eq!(down.state().to_string(), "disconnected");
    }
}
