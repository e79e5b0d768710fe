//! Cooperative shutdown. The corpus loop checks the flag between markets so
//! that a market already being committed runs to completion.

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, warn};

/// Sender/receiver pair; `true` means stop after the current market
pub fn channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Flip `tx` once Ctrl+C or SIGTERM arrives
pub fn spawn_signal_listener(tx: watch::Sender<bool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown requested, finishing current market");
        let _ = tx.send(true);
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
