// Privacy Guard — Notification Socket Bridge
//
// Daemon side: accepts subscribers on a Unix socket and forwards every bus
// event to each of them. Client side: connects to that socket and yields the
// decoded events. A subscriber that cannot keep up or goes away is dropped
// without affecting the others.

use std::io::{self, Cursor, Read};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::UnixListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

use super::bus::{BusSubscription, InMemoryBus};
use super::{EventSource, EventSubscriber, NotifyError, PolicyEvent};

/// Written by the daemon once a subscriber is registered on the bus.
const SUBSCRIBE_ACK: u8 = 0x06;

/// How long `connect` waits for the daemon to register the subscriber.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Daemon Side ─────────────────────────────────────────────────────────────

pub struct NotificationServer {
    socket_path: PathBuf,
    listener: UnixListener,
    bus: Arc<InMemoryBus>,
}

impl NotificationServer {
    pub fn bind(socket_path: &Path, bus: Arc<InMemoryBus>, mode: u32) -> io::Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if socket_path.exists() {
            std::fs::remove_file(socket_path)?;
        }

        let listener = UnixListener::bind(socket_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(mode))?;
        }

        tracing::info!(socket = %socket_path.display(), "Notification socket listening");
        Ok(Self {
            socket_path: socket_path.to_path_buf(),
            listener,
            bus,
        })
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> io::Result<()> {
        let mut tasks = JoinSet::new();

        if !*shutdown.borrow() {
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    accepted = self.listener.accept() => {
                        match accepted {
                            Ok((stream, _addr)) => {
                                // Subscribe before acknowledging: once the client
                                // sees the ack, every later event reaches it.
                                let subscription = self.bus.subscribe_channel();
                                tasks.spawn(forward_events(stream, subscription, shutdown.clone()));
                            }
                            Err(e) => tracing::warn!(error = %e, "Subscriber accept failed"),
                        }
                    }
                    Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
                }
            }
        }

        while tasks.join_next().await.is_some() {}

        drop(self.listener);
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(error = %e, "Failed to remove notification socket");
            }
        }
        tracing::info!("Notification socket stopped");
        Ok(())
    }
}

async fn forward_events(
    mut stream: tokio::net::UnixStream,
    mut subscription: BusSubscription,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::debug!("Notification subscriber connected");
    if let Err(e) = stream.write_all(&[SUBSCRIBE_ACK]).await {
        tracing::debug!(error = %e, "Notification subscriber gone before ack");
        return;
    }
    loop {
        let event = tokio::select! {
            _ = shutdown.changed() => break,
            event = subscription.recv() => event,
        };
        let event = match event {
            Ok(event) => event,
            Err(_) => break,
        };

        let mut frame = Vec::new();
        if let Err(e) = event.encode(&mut frame) {
            tracing::warn!(error = %e, "Failed to encode event");
            continue;
        }
        if let Err(e) = stream.write_all(&frame).await {
            tracing::debug!(error = %e, "Notification subscriber gone");
            break;
        }
    }
    if let Err(e) = stream.shutdown().await {
        tracing::debug!(error = %e, "Notification stream shutdown failed");
    }
}

// ─── Client Side ─────────────────────────────────────────────────────────────

/// Subscribes to the daemon's notification socket.
#[derive(Debug, Clone)]
pub struct SocketNotifier {
    path: PathBuf,
    handshake_timeout: Duration,
}

impl SocketNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout.max(Duration::from_millis(1));
        self
    }

    /// Connect and wait until the daemon has registered this subscriber.
    /// Every event published after this returns is delivered.
    pub fn connect(&self) -> Result<SocketSubscription, NotifyError> {
        let mut stream = UnixStream::connect(&self.path)?;
        stream.set_read_timeout(Some(self.handshake_timeout))?;

        let mut ack = [0u8; 1];
        match stream.read_exact(&mut ack) {
            Ok(()) if ack[0] == SUBSCRIBE_ACK => {}
            Ok(()) => {
                return Err(NotifyError::Handshake(format!(
                    "unexpected ack byte {:#04x}",
                    ack[0]
                )))
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(NotifyError::Closed),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                return Err(NotifyError::Handshake(format!(
                    "no ack within {:?}",
                    self.handshake_timeout
                )))
            }
            Err(e) => return Err(e.into()),
        }
        stream.set_read_timeout(None)?;

        tracing::debug!(socket = %self.path.display(), "Subscribed to notifications");
        Ok(SocketSubscription { stream })
    }
}

impl EventSubscriber for SocketNotifier {
    fn subscribe(&self) -> Result<Box<dyn EventSource>, NotifyError> {
        Ok(Box::new(self.connect()?))
    }
}

pub struct SocketSubscription {
    stream: UnixStream,
}

impl EventSource for SocketSubscription {
    fn next_event(&mut self, timeout: Duration) -> Result<Option<PolicyEvent>, NotifyError> {
        // Only the wait for the first byte is bounded. Once an event has
        // started arriving it is read to the end, so a timeout can never
        // leave the stream mid-frame.
        self.stream.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
        let mut first = [0u8; 1];
        let n = match self.stream.read(&mut first) {
            Ok(n) => n,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                return Ok(None)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if n == 0 {
            return Err(NotifyError::Closed);
        }

        self.stream.set_read_timeout(None)?;
        let mut reader = Cursor::new(first).chain(&self.stream);
        PolicyEvent::decode(&mut reader).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::EventPublisher;

    #[tokio::test]
    async fn test_events_reach_socket_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notify.sock");
        let bus = Arc::new(InMemoryBus::new());
        let server = NotificationServer::bind(&path, Arc::clone(&bus), 0o600).unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(server.run(rx));

        let notifier = SocketNotifier::new(&path);
        let mut subscription = tokio::task::spawn_blocking(move || notifier.connect())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bus.subscriber_count(), 1);

        let event = PolicyEvent::PackageRemoved {
            package: "app.gone".to_string(),
        };
        assert_eq!(bus.publish(event.clone()), 1);

        let received = tokio::task::spawn_blocking(move || {
            let first = subscription.next_event(Duration::from_secs(2)).unwrap();
            let idle = subscription.next_event(Duration::from_millis(20)).unwrap();
            (first, idle)
        })
        .await
        .unwrap();
        assert_eq!(received.0, Some(event));
        assert_eq!(received.1, None);

        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_shutdown_closes_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notify.sock");
        let bus = Arc::new(InMemoryBus::new());
        let server = NotificationServer::bind(&path, Arc::clone(&bus), 0o600).unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(server.run(rx));

        let notifier = SocketNotifier::new(&path);
        let mut subscription = tokio::task::spawn_blocking(move || notifier.connect())
            .await
            .unwrap()
            .unwrap();

        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        let result = tokio::task::spawn_blocking(move || {
            subscription.next_event(Duration::from_secs(2))
        })
        .await
        .unwrap();
        assert!(matches!(result, Err(NotifyError::Closed)));
    }

    #[tokio::test]
    async fn test_connect_waits_for_registration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notify.sock");
        let bus = Arc::new(InMemoryBus::new());
        let server = NotificationServer::bind(&path, Arc::clone(&bus), 0o600).unwrap();

        // Nothing accepts yet, so the connection sits in the backlog.
        let notifier = SocketNotifier::new(&path);
        let pending = tokio::task::spawn_blocking(move || notifier.subscribe());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pending.is_finished());
        assert_eq!(bus.subscriber_count(), 0);

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(server.run(rx));
        let mut subscription = pending.await.unwrap().unwrap();

        let event = PolicyEvent::CategoryChanged {
            package: "app.a".to_string(),
            category: "http://tizen.org/privacy/location".to_string(),
        };
        assert_eq!(bus.publish(event.clone()), 1);
        let received = tokio::task::spawn_blocking(move || {
            subscription.next_event(Duration::from_secs(2)).unwrap()
        })
        .await
        .unwrap();
        assert_eq!(received, Some(event));

        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[test]
    fn test_handshake_times_out_without_accept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notify.sock");
        let _listener = std::os::unix::net::UnixListener::bind(&path).unwrap();

        let notifier = SocketNotifier::new(&path).with_handshake_timeout(Duration::from_millis(30));
        assert!(matches!(notifier.connect(), Err(NotifyError::Handshake(_))));
    }

    #[test]
    fn test_connect_without_daemon_fails() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = SocketNotifier::new(dir.path().join("absent.sock"));
        assert!(notifier.subscribe().is_err());
    }
}
