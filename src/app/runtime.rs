use super::{MotioncamApp, ShutdownReason};
use crate::error::{MotioncamError, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

impl MotioncamApp {
    /// Run until a signal or the quit key, then shut down gracefully
    pub async fn run(&mut self) -> Result<i32> {
        info!("Motioncam is running");

        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| MotioncamError::system("Shutdown sender already taken"))?;
        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| MotioncamError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers(shutdown_sender);

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| MotioncamError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown().await?;

        info!("Motioncam shutdown complete");
        Ok(exit_code)
    }

    /// Forward SIGTERM, SIGINT and the app's own shutdown token to `shutdown_sender`
    fn setup_signal_handlers(&self, shutdown_sender: oneshot::Sender<ShutdownReason>) {
        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

        #[cfg(unix)]
        {
            let sender = Arc::clone(&shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate())
                {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        error!("Failed to register SIGTERM handler: {}", e);
                        return;
                    }
                };
                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM signal");
                    send_reason(&sender, ShutdownReason::Signal("SIGTERM".to_string())).await;
                }
            });
        }

        let sender = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("Received SIGINT signal (Ctrl+C)");
                send_reason(&sender, ShutdownReason::Signal("SIGINT".to_string())).await;
            }
        });

        let sender = Arc::clone(&shutdown_sender);
        let token: CancellationToken = self.cancellation_token.clone();
        tokio::spawn(async move {
            token.cancelled().await;
            send_reason(&sender, ShutdownReason::UserRequest).await;
        });
    }
}

async fn send_reason(
    sender: &Mutex<Option<oneshot::Sender<ShutdownReason>>>,
    reason: ShutdownReason,
) {
    if let Some(sender) = sender.lock().await.take() {
        let _ = sender.send(reason);
    }
}
