// Privacy Guard — Unix Domain Socket Server
//
// Listens on a Unix domain socket and serves one request per connection.
// Each accepted connection is handed to the blocking pool (handlers talk to
// the synchronous store) and tracked in a JoinSet plus a connection
// registry, so shutdown can force-close every open socket and then wait for
// every handler to return.

use std::collections::HashMap;
use std::io;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::net::UnixListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

use super::caller::PeerInfo;
use super::dispatch::{Connection, ServiceRegistry};

/// Default socket path for the policy service.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/privacy_guard_server";

/// Open connections, kept so shutdown can unblock handlers stuck in a read.
#[derive(Default)]
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    open: Mutex<HashMap<u64, StdUnixStream>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a clone of `stream` until the returned guard is dropped.
    pub fn register(self: &Arc<Self>, stream: &StdUnixStream) -> io::Result<ConnectionGuard> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let clone = stream.try_clone()?;
        self.lock().insert(id, clone);
        Ok(ConnectionGuard {
            id,
            registry: Arc::clone(self),
        })
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shut down every tracked socket in both directions.
    pub fn close_all(&self) -> usize {
        let open = self.lock();
        for stream in open.values() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        open.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, StdUnixStream>> {
        self.open.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Removes its connection from the registry when dropped.
pub struct ConnectionGuard {
    id: u64,
    registry: Arc<ConnectionRegistry>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.id);
    }
}

/// Unix Domain Socket server for one service registry.
pub struct UdsServer {
    socket_path: PathBuf,
    listener: UnixListener,
    registry: Arc<ServiceRegistry>,
    connections: Arc<ConnectionRegistry>,
}

impl UdsServer {
    /// Bind the socket: create the parent directory, remove a stale socket
    /// file, bind, then apply `mode` to the socket file.
    pub fn bind(socket_path: &Path, registry: Arc<ServiceRegistry>, mode: u32) -> io::Result<Self> {
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
            let perms = std::fs::Permissions::from_mode(mode);
            std::fs::set_permissions(socket_path, perms)?;
        }

        tracing::info!(
            socket = %socket_path.display(),
            methods = registry.method_count(),
            "Privacy Guard server listening"
        );

        Ok(Self {
            socket_path: socket_path.to_path_buf(),
            listener,
            registry,
            connections: Arc::new(ConnectionRegistry::new()),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn connections(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.connections)
    }

    /// Accept connections until `shutdown` turns true (or its sender is
    /// dropped). On exit, every open connection is force-closed and every
    /// handler awaited before the socket file is removed.
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
                            Ok((stream, _addr)) => self.spawn_connection(&mut tasks, stream),
                            Err(e) => tracing::warn!(error = %e, "Accept failed"),
                        }
                    }
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                        if let Err(e) = joined {
                            tracing::error!(error = %e, "Connection task panicked");
                        }
                    }
                }
            }
        }

        let closed = self.connections.close_all();
        tracing::info!(open_connections = closed, "Server shutting down");

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Connection task panicked");
            }
        }

        drop(self.listener);
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(error = %e, "Failed to remove socket file");
            }
        }
        tracing::info!(socket = %self.socket_path.display(), "Server stopped");
        Ok(())
    }

    fn spawn_connection(&self, tasks: &mut JoinSet<()>, stream: tokio::net::UnixStream) {
        let peer = PeerInfo::from_stream(&stream).ok();

        let stream = match stream.into_std().and_then(|s| {
            s.set_nonblocking(false)?;
            Ok(s)
        }) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to prepare connection");
                return;
            }
        };

        let guard = match self.connections.register(&stream) {
            Ok(guard) => guard,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to track connection");
                return;
            }
        };

        let registry = Arc::clone(&self.registry);
        tasks.spawn_blocking(move || {
            let _guard = guard;
            handle_connection(stream, &registry, peer);
        });
    }
}

/// Serve exactly one request on `stream`, then close it.
fn handle_connection(stream: StdUnixStream, registry: &ServiceRegistry, peer: Option<PeerInfo>) {
    if let Some(ref info) = peer {
        tracing::debug!(%info, "Client connected");
    }

    let mut conn = match Connection::new(stream, peer) {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to set up connection");
            return;
        }
    };

    if let Err(e) = registry.dispatch(&mut conn) {
        let actor = conn
            .peer()
            .map(|p| p.actor_string())
            .unwrap_or_else(|| "unknown".to_string());
        tracing::warn!(error = %e, %actor, "Request failed");
    }
    conn.close();
}

// ─── Tests ───────────────────────────────────────────────────────────────────
