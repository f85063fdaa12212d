use super::{ComponentState, MotioncamApp};
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Longest a disarm may take to close its segment
const DISARM_TIMEOUT: Duration = Duration::from_secs(15);
const NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(10);

impl MotioncamApp {
    /// Stop components in reverse start order, returning the process exit code
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");
        self.cancellation_token.cancel();

        let mut exit_code = 0;

        if let Some(handler) = self.keyboard_handler.take() {
            self.set_component_state("keyboard", ComponentState::Stopping)
                .await;
            if let Err(e) = handler.stop().await {
                error!("Error stopping keyboard: {}", e);
                exit_code = 1;
            }
            self.set_component_state("keyboard", ComponentState::Stopped)
                .await;
        }

        if let Some(controller) = self.controller.take() {
            self.set_component_state("controller", ComponentState::Stopping)
                .await;
            let disarming = Arc::clone(&controller);
            let disarm = tokio::task::spawn_blocking(move || disarming.disarm());
            match timeout(DISARM_TIMEOUT, disarm).await {
                Ok(Ok(_)) => {
                    self.set_component_state("controller", ComponentState::Stopped)
                        .await;
                }
                Ok(Err(e)) => {
                    error!("Disarm task failed: {}", e);
                    self.set_component_state("controller", ComponentState::Failed)
                        .await;
                    exit_code = 1;
                }
                Err(_) => {
                    error!("Controller disarm timed out");
                    self.set_component_state("controller", ComponentState::Failed)
                        .await;
                    exit_code = 1;
                }
            }
        }

        if let Some(service) = self.notifications.take() {
            self.set_component_state("notification", ComponentState::Stopping)
                .await;
            if timeout(NOTIFICATION_TIMEOUT, service.shutdown()).await.is_err() {
                warn!("Notification worker did not stop in time");
                exit_code = 1;
            }
            self.set_component_state("notification", ComponentState::Stopped)
                .await;
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }
}
