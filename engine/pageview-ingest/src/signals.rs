//! Signal handling for graceful shutdown

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Shutdown trigger fed by Ctrl+C and, on Unix, SIGTERM
pub struct ShutdownSignal {
    rx: mpsc::Receiver<&'static str>,
}

impl ShutdownSignal {
    /// Wait for the first signal; returns its name
    pub async fn recv(mut self) -> &'static str {
        self.rx.recv().await.unwrap_or("channel closed")
    }
}

/// Setup signal handlers for graceful shutdown
pub fn setup_signal_handlers() -> Result<ShutdownSignal> {
    let (shutdown_tx, shutdown_rx) = mpsc::channel(2);

    // Handle Ctrl+C (SIGINT)
    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C signal: {}", e);
            return;
        }

        info!("Ctrl+C signal received");
        let _ = ctrl_c_tx.send("SIGINT").await;
    });

    // Cloud Run sends SIGTERM before stopping an instance
    #[cfg(unix)]
    {
        use signal_hook::consts::SIGTERM;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let shutdown_flag = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGTERM, shutdown_flag.clone())?;

        tokio::spawn(async move {
            loop {
                if shutdown_flag.load(Ordering::Relaxed) {
                    info!("SIGTERM signal received");
                    let _ = shutdown_tx.send("SIGTERM").await;
                    break;
                }
                tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            }
        });
    }

    Ok(ShutdownSignal { rx: shutdown_rx })
}
