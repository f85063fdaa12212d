use super::{ComponentState, MotioncamApp};
use crate::controller::ArmingController;
use crate::error::{MotioncamError, Result};
use crate::keyboard_input::KeyboardInputHandler;
use crate::notify::{mailer_from_config, NotificationService};
use crate::recorder::ArtifactNamer;
use std::sync::Arc;
use tracing::{error, info};

impl MotioncamApp {
    /// Register components before starting
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing motioncam components");

        let mut states = self.component_states.lock().await;
        states.insert("notification".to_string(), ComponentState::Stopped);
        states.insert("controller".to_string(), ComponentState::Stopped);
        if self.keyboard_enabled {
            states.insert("keyboard".to_string(), ComponentState::Stopped);
        }
        drop(states);

        Ok(())
    }

    /// Start the notification worker, the controller and the keyboard surface
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting motioncam on {} camera", self.camera.name());

        let mut controller = ArmingController::new(
            self.config.clone(),
            Arc::clone(&self.camera),
            self.event_bus.clone(),
        );

        if self.config.notification.enabled {
            self.set_component_state("notification", ComponentState::Starting)
                .await;
            let service = NotificationService::start(
                &self.config.notification,
                Arc::clone(&self.camera),
                mailer_from_config(&self.config.notification),
                ArtifactNamer::new(&self.config.system.timezone)?,
                self.event_bus.clone(),
            );
            controller = controller.with_dispatcher(service.dispatcher());
            self.notifications = Some(service);
            self.set_component_state("notification", ComponentState::Running)
                .await;
        } else {
            info!("Notifications disabled");
        }

        let controller = Arc::new(controller);
        self.controller = Some(Arc::clone(&controller));
        self.set_component_state("controller", ComponentState::Running)
            .await;

        if self.start_armed {
            let arming = Arc::clone(&controller);
            let armed = tokio::task::spawn_blocking(move || arming.arm())
                .await
                .map_err(|e| MotioncamError::system(format!("Arm task failed: {}", e)))?;
            if let Err(e) = armed {
                error!("Failed to arm camera: {}", e);
                self.set_component_state("controller", ComponentState::Failed)
                    .await;
                return Err(e);
            }
        } else {
            info!("Starting disarmed");
        }

        if self.keyboard_enabled {
            self.set_component_state("keyboard", ComponentState::Starting)
                .await;
            let handler =
                KeyboardInputHandler::new(Arc::clone(&controller), self.cancellation_token.clone());
            handler.start().await?;
            self.keyboard_handler = Some(handler);
            self.set_component_state("keyboard", ComponentState::Running)
                .await;
        }

        info!("Motioncam started");
        Ok(())
    }
}
