use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal as unix_signal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Cancels a token when the process receives SIGINT or SIGTERM.
#[derive(Debug)]
pub struct SignalHandler {
    token: CancellationToken,
    listener: JoinHandle<()>,
}

impl SignalHandler {
    pub fn install(token: CancellationToken) -> Self {
        let listener = tokio::spawn({
            let token = token.clone();
            async move {
                tokio::select! {
                    received = wait_for_signal() => {
                        if let Some(name) = received {
                            info!("Received {}, initiating graceful shutdown", name);
                            token.cancel();
                        }
                    }
                    _ = token.cancelled() => {}
                }
            }
        });

        Self { token, listener }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub async fn wait(&self) {
        self.token.cancelled().await;
    }
}

impl Drop for SignalHandler {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> Option<&'static str> {
    let mut sigterm = match unix_signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(err) => {
            error!("Failed to create SIGTERM handler: {}", err);
            return ctrl_c().await;
        }
    };

    tokio::select! {
        received = ctrl_c() => received,
        _ = sigterm.recv() => Some("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Option<&'static str> {
    ctrl_c().await
}

async fn ctrl_c() -> Option<&'static str> {
    match signal::ctrl_c().await {
        Ok(()) => Some("SIGINT (Ctrl+C)"),
        Err(err) => {
            error!("Failed to listen for SIGINT: {}", err);
            std::future::pending().await
        }
    }
}
