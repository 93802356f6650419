use super::session::SessionRegistry;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use warp::filters::BoxedFilter;
use warp::ws::{Message, WebSocket, Ws};
use warp::{Filter, Reply};

#[cfg(feature = "metrics")]
use crate::metrics::PrometheusExporter;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub sessions: usize,
    pub uptime_secs: u64,
    pub timestamp: String,
}

/// State the route handlers share with the owning server.
#[derive(Clone)]
pub struct RouteContext {
    pub sessions: Arc<SessionRegistry>,
    pub shutdown: CancellationToken,
    pub ping_interval: Duration,
    pub started_at: Instant,
    pub static_dir: PathBuf,
    #[cfg(feature = "metrics")]
    pub exporter: Option<PrometheusExporter>,
}

/// `/stats` (WebSocket), `/health`, `/metrics`, then static files under `/`.
pub fn build_routes(ctx: RouteContext) -> BoxedFilter<(Box<dyn Reply>,)> {
    let routes = stats_route(ctx.clone()).or(health_route(ctx.clone())).unify();

    #[cfg(feature = "metrics")]
    let routes = routes.or(metrics_route(ctx.clone())).unify();

    routes
        .or(warp::fs::dir(ctx.static_dir)
            .map(|file: warp::fs::File| Box::new(file) as Box<dyn Reply>))
        .unify()
        .boxed()
}

fn stats_route(ctx: RouteContext) -> BoxedFilter<(Box<dyn Reply>,)> {
    warp::path("stats")
        .and(warp::path::end())
        .and(warp::ws())
        .map(move |ws: Ws| {
            let ctx = ctx.clone();
            Box::new(ws.on_upgrade(move |socket| serve_session(socket, ctx))) as Box<dyn Reply>
        })
        .boxed()
}

fn health_route(ctx: RouteContext) -> BoxedFilter<(Box<dyn Reply>,)> {
    warp::path!("health")
        .and(warp::get())
        .map(move || {
            let report = HealthReport {
                status: "ok",
                sessions: ctx.sessions.len(),
                uptime_secs: ctx.started_at.elapsed().as_secs(),
                timestamp: Utc::now().to_rfc3339(),
            };
            Box::new(warp::reply::json(&report)) as Box<dyn Reply>
        })
        .boxed()
}

#[cfg(feature = "metrics")]
fn metrics_route(ctx: RouteContext) -> BoxedFilter<(Box<dyn Reply>,)> {
    warp::path!("metrics")
        .and(warp::get())
        .map(move || {
            let Some(exporter) = &ctx.exporter else {
                return Box::new(warp::reply::with_status(
                    "Metrics disabled",
                    warp::http::StatusCode::NOT_FOUND,
                )) as Box<dyn Reply>;
            };

            exporter.observe_sessions(ctx.sessions.len());
            match exporter.export() {
                Ok(metrics_text) => Box::new(warp::reply::with_header(
                    metrics_text,
                    "content-type",
                    "text/plain; version=0.0.4",
                )) as Box<dyn Reply>,
                Err(e) => {
                    warn!(error = %e, "Failed to export metrics");
                    Box::new(warp::reply::with_status(
                        "Internal Server Error",
                        warp::http::StatusCode::INTERNAL_SERVER_ERROR,
                    )) as Box<dyn Reply>
                }
            }
        })
        .boxed()
}

/// Pumps one subscriber connection until either side goes away.
async fn serve_session(socket: WebSocket, ctx: RouteContext) {
    let Some((session_id, mut outbound)) = ctx.sessions.register() else {
        if let Err(e) = socket.close().await {
            debug!(error = %e, "Failed to close refused session");
        }
        return;
    };

    info!(%session_id, sessions = ctx.sessions.len(), "Session opened");
    ctx.sessions.broadcast_session_count();

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut ping = tokio::time::interval(ctx.ping_interval);
    ping.tick().await;

    loop {
        tokio::select! {
            queued = outbound.recv() => {
                let Some(message) = queued else {
                    debug!(%session_id, "Session dropped from registry");
                    break;
                };
                let closing = message.is_close();
                if let Err(e) = ws_tx.send(message).await {
                    debug!(%session_id, error = %e, "Failed to send message");
                    break;
                }
                if closing {
                    break;
                }
            }
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(message)) if message.is_close() => {
                        debug!(%session_id, "Client requested close");
                        break;
                    }
                    Some(Ok(message)) => {
                        if let Ok(text) = message.to_str() {
                            debug!(%session_id, text, "Received client message");
                        }
                    }
                    Some(Err(e)) => {
                        debug!(%session_id, error = %e, "WebSocket error");
                        break;
                    }
                    None => {
                        debug!(%session_id, "Connection closed");
                        break;
                    }
                }
            }
            _ = ping.tick() => {
                if let Err(e) = ws_tx.send(Message::ping(Vec::new())).await {
                    debug!(%session_id, error = %e, "Failed to send ping");
                    break;
                }
            }
            _ = ctx.shutdown.cancelled() => {
                let _ = ws_tx.send(Message::close()).await;
                break;
            }
        }
    }

    ctx.sessions.remove(session_id);
    let remaining = ctx.sessions.broadcast_session_count();
    info!(%session_id, remaining, "Session closed");
}
