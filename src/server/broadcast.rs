use super::routes::{RouteContext, build_routes};
use super::session::{BroadcastStatsSnapshot, SessionRegistry};
use super::{ServerError, StatsPublisher};
use crate::app::config::ServerConfig;
use crate::domain::BufferStats;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use warp::Reply;
use warp::filters::BoxedFilter;

#[cfg(feature = "metrics")]
use crate::metrics::PrometheusExporter;

enum ServerState {
    Idle,
    Running {
        local_addr: SocketAddr,
        handle: JoinHandle<()>,
    },
    Stopped,
}

/// Fans snapshots out to every connected `/stats` subscriber.
pub struct BroadcastServer {
    config: ServerConfig,
    sessions: Arc<SessionRegistry>,
    started_at: Instant,
    shutdown: CancellationToken,
    state: Mutex<ServerState>,
    #[cfg(feature = "metrics")]
    exporter: Option<PrometheusExporter>,
}

impl BroadcastServer {
    pub fn new(config: ServerConfig) -> Self {
        #[cfg(feature = "metrics")]
        let exporter = match PrometheusExporter::new() {
            Ok(exporter) => Some(exporter),
            Err(e) => {
                warn!(error = %e, "Prometheus exporter unavailable, /metrics disabled");
                None
            }
        };

        Self {
            sessions: Arc::new(SessionRegistry::new(config.max_sessions)),
            config,
            started_at: Instant::now(),
            shutdown: CancellationToken::new(),
            state: Mutex::new(ServerState::Idle),
            #[cfg(feature = "metrics")]
            exporter,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn stats(&self) -> BroadcastStatsSnapshot {
        self.sessions.stats().snapshot()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.state.lock() {
            ServerState::Running { local_addr, .. } => Some(*local_addr),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(&*self.state.lock(), ServerState::Running { .. })
    }

    /// The full route tree, usable without binding a socket.
    pub fn routes(&self) -> BoxedFilter<(Box<dyn Reply>,)> {
        build_routes(RouteContext {
            sessions: self.sessions.clone(),
            shutdown: self.shutdown.clone(),
            ping_interval: self.config.ping_interval,
            started_at: self.started_at,
            static_dir: self.config.static_dir.clone(),
            #[cfg(feature = "metrics")]
            exporter: self.exporter.clone(),
        })
    }

    /// Binds the configured address and starts serving. May be called once.
    pub fn start(&self) -> Result<SocketAddr, ServerError> {
        let mut state = self.state.lock();
        match &*state {
            ServerState::Running { .. } => return Err(ServerError::AlreadyRunning),
            ServerState::Stopped => return Err(ServerError::Stopped),
            ServerState::Idle => {}
        }

        let addr = SocketAddr::new(self.config.bind_address, self.config.port);
        let signal = self.shutdown.clone().cancelled_owned();
        let (local_addr, server) =
            warp::serve(self.routes()).try_bind_with_graceful_shutdown(addr, signal)?;

        let handle = tokio::spawn(server);
        *state = ServerState::Running { local_addr, handle };
        info!(%local_addr, max_sessions = self.config.max_sessions, "Broadcast server listening");
        Ok(local_addr)
    }

    /// Pushes one snapshot to every live session; see [`SessionRegistry::send_update`].
    pub fn send_update(&self, stats: Option<&BufferStats>) -> usize {
        self.sessions.send_update(stats)
    }

    /// Closes every session and shuts the listener down.
    ///
    /// Waits up to the graceful period for warp to finish, then aborts it and
    /// waits until the hard cutoff for session pumps to exit.
    pub async fn stop(&self) -> Result<(), ServerError> {
        let handle = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, ServerState::Stopped) {
                ServerState::Running { handle, .. } => handle,
                ServerState::Idle => {
                    *state = ServerState::Idle;
                    return Err(ServerError::NotRunning);
                }
                ServerState::Stopped => return Err(ServerError::NotRunning),
            }
        };

        let deadline = Instant::now() + self.config.hard_shutdown;
        info!(sessions = self.sessions.len(), "Stopping broadcast server");
        self.sessions.close_all();
        self.shutdown.cancel();

        let mut handle = handle;
        match tokio::time::timeout(self.config.graceful_shutdown, &mut handle).await {
            Ok(Ok(())) => debug!("Server shut down gracefully"),
            Ok(Err(e)) => warn!(error = %e, "Server task ended abnormally"),
            Err(_) => {
                warn!(
                    grace_ms = self.config.graceful_shutdown.as_millis() as u64,
                    "Graceful shutdown timed out, aborting server"
                );
                handle.abort();
            }
        }

        while !self.sessions.is_empty() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let lingering = self.sessions.len();
        if lingering > 0 {
            warn!(lingering, "Dropping sessions that outlived the hard cutoff");
        }
        self.sessions.clear();
        info!(stats = ?self.stats(), "Broadcast server stopped");
        Ok(())
    }
}

impl StatsPublisher for BroadcastServer {
    fn publish(&self, stats: Option<&BufferStats>) -> usize {
        self.observe(stats);
        self.send_update(stats)
    }
}

impl BroadcastServer {
    #[cfg(feature = "metrics")]
    fn observe(&self, stats: Option<&BufferStats>) {
        if let (Some(exporter), Some(stats)) = (&self.exporter, stats) {
            exporter.observe_snapshot(stats);
        }
    }

    #[cfg(not(feature = "metrics"))]
    fn observe(&self, _stats: Option<&BufferStats>) {}
}

impl std::fmt::Debug for BroadcastServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastServer")
            .field("config", &self.config)
            .field("sessions", &self.sessions.len())
            .field("running", &self.is_running())
            .finish()
    }
}
