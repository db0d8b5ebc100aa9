use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal as unix_signal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Cancel `token` on SIGINT (Ctrl+C) or SIGTERM.
pub fn spawn_signal_listener(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            received = wait_for_signal() => {
                if received {
                    info!("Shutdown signal received, draining pipeline");
                    token.cancel();
                }
            }
            () = token.cancelled() => {}
        }
    })
}

/// Returns false when no handler could be installed.
async fn wait_for_signal() -> bool {
    #[cfg(unix)]
    {
        let mut sigterm = match unix_signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                return ctrl_c().await;
            }
        };
        tokio::select! {
            received = ctrl_c() => received,
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
                true
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await
    }
}

async fn ctrl_c() -> bool {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received SIGINT (Ctrl+C)");
            true
        }
        Err(e) => {
            error!(error = %e, "Failed to listen for SIGINT");
            false
        }
    }
}
