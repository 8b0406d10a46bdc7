// Privacy Guard — Daemon
//
// Owns the process-wide objects (database, event bus, access monitor) and
// runs the RPC server, the notification socket and the ingestion pipeline
// until stopped.

use std::io;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::GuardConfig;
use crate::error::{GuardError, Result};
use crate::gateway::{ServiceRegistry, UdsServer};
use crate::ingest::{IngestStats, IngestionPipeline, QueueMonitor};
use crate::notify::{InMemoryBus, NotificationServer};
use crate::service::PrivacyInfoService;
use crate::store::{Database, SqlitePolicyStore};

struct Running {
    shutdown: watch::Sender<bool>,
    server: JoinHandle<io::Result<()>>,
    notifier: JoinHandle<io::Result<()>>,
    pipeline: IngestionPipeline,
}

pub struct PrivacyGuardDaemon {
    config: GuardConfig,
    store: Arc<SqlitePolicyStore>,
    bus: Arc<InMemoryBus>,
    monitor: Arc<QueueMonitor>,
    running: Option<Running>,
    stopped: bool,
}

impl PrivacyGuardDaemon {
    /// Validate the configuration and open the database.
    pub fn new(config: GuardConfig) -> Result<Self> {
        config.validate()?;
        let db = Database::open(&config.db_path)?;
        tracing::info!(db = %config.db_path.display(), "Database opened");

        let monitor = Arc::new(QueueMonitor::new(config.monitor.buffer_size));
        Ok(Self {
            store: Arc::new(SqlitePolicyStore::new(Arc::new(db))),
            bus: Arc::new(InMemoryBus::new()),
            monitor,
            config,
            running: None,
            stopped: false,
        })
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<SqlitePolicyStore> {
        Arc::clone(&self.store)
    }

    pub fn bus(&self) -> Arc<InMemoryBus> {
        Arc::clone(&self.bus)
    }

    /// Feed for access decisions from the access-control layer.
    pub fn access_monitor(&self) -> Arc<QueueMonitor> {
        Arc::clone(&self.monitor)
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Bind both sockets and start serving. Must be called inside a Tokio
    /// runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Err(GuardError::Internal("daemon already started".to_string()));
        }
        if self.stopped {
            return Err(GuardError::Internal("daemon cannot be restarted".to_string()));
        }

        let mut registry = ServiceRegistry::new();
        let service = Arc::new(PrivacyInfoService::new(self.store.clone(), self.bus.clone()));
        service.register(&mut registry)?;

        let server = UdsServer::bind(
            &self.config.socket_path,
            Arc::new(registry),
            self.config.socket_mode,
        )?;
        let notifier = NotificationServer::bind(
            &self.config.notify_socket_path,
            Arc::clone(&self.bus),
            self.config.socket_mode,
        )?;
        let pipeline = IngestionPipeline::start(
            self.monitor.clone(),
            self.store.clone(),
            Arc::new(self.config.privacy_mapper()),
            &self.config.monitor,
        )?;

        let (shutdown, rx) = watch::channel(false);
        self.running = Some(Running {
            shutdown,
            server: tokio::spawn(server.run(rx.clone())),
            notifier: tokio::spawn(notifier.run(rx)),
            pipeline,
        });
        tracing::info!("Privacy Guard daemon started");
        Ok(())
    }

    /// Stop serving, wait for every connection to finish and drain the
    /// ingestion pipeline. The access monitor is finished, so a stopped
    /// daemon cannot be started again. A no-op if not running.
    pub async fn stop(&mut self) -> Result<Option<IngestStats>> {
        let Some(running) = self.running.take() else {
            return Ok(None);
        };
        self.stopped = true;
        // Receivers may already be gone if a server task failed.
        let _ = running.shutdown.send(true);

        for (name, task) in [("server", running.server), ("notifier", running.notifier)] {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(task = name, error = %e, "Task failed"),
                Err(e) => tracing::error!(task = name, error = %e, "Task panicked"),
            }
        }

        let pipeline = running.pipeline;
        let stats = tokio::task::spawn_blocking(move || pipeline.stop())
            .await
            .map_err(|e| GuardError::Internal(format!("ingestion shutdown failed: {}", e)))?;

        tracing::info!("Privacy Guard daemon stopped");
        Ok(Some(stats))
    }

    /// Start, wait for SIGINT or SIGTERM, then stop.
    pub async fn run_until_signal(mut self) -> Result<()> {
        self.start()?;
        wait_for_signal().await?;
        tracing::info!("Shutdown signal received");
        self.stop().await?;
        Ok(())
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn config(dir: &Path) -> GuardConfig {
        GuardConfig {
            socket_path: dir.join("server.sock"),
            notify_socket_path: dir.join("notify.sock"),
            db_path: dir.join("guard.db"),
            socket_mode: 0o600,
            ..GuardConfig::default()
        }
    }

    #[tokio::test]
    async fn test_start_and_stop_cleans_up_sockets() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let mut daemon = PrivacyGuardDaemon::new(config.clone()).unwrap();

        daemon.start().unwrap();
        assert!(daemon.is_running());
        assert!(config.socket_path.exists());
        assert!(config.notify_socket_path.exists());
        assert!(daemon.start().is_err());

        let stats = daemon.stop().await.unwrap();
        assert!(stats.is_some());
        assert!(!daemon.is_running());
        assert!(!config.socket_path.exists());
        assert!(!config.notify_socket_path.exists());

        assert!(daemon.stop().await.unwrap().is_none());
        assert!(daemon.start().is_err());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.notify_socket_path = config.socket_path.clone();
        assert!(PrivacyGuardDaemon::new(config).is_err());
    }
}
