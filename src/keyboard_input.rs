use crate::controller::ArmingController;
use crate::error::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a key press asks the controller to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    Arm,
    Disarm,
    Status,
    Quit,
}

impl KeyCommand {
    pub fn from_key(code: KeyCode) -> Option<Self> {
        match code {
            KeyCode::Char('a') | KeyCode::Char('A') => Some(KeyCommand::Arm),
            KeyCode::Char('d') | KeyCode::Char('D') => Some(KeyCommand::Disarm),
            KeyCode::Char('s') | KeyCode::Char('S') => Some(KeyCommand::Status),
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Some(KeyCommand::Quit),
            _ => None,
        }
    }
}

/// Terminal control surface: arm, disarm, status and quit from the keyboard
pub struct KeyboardInputHandler {
    controller: Arc<ArmingController>,
    shutdown: CancellationToken,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    /// `shutdown` is cancelled when the operator presses the quit key
    pub fn new(controller: Arc<ArmingController>, shutdown: CancellationToken) -> Self {
        Self {
            controller,
            shutdown,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start listening for keyboard input
    pub async fn start(&self) -> Result<()> {
        info!("Keyboard control active: [a]rm, [d]isarm, [s]tatus, [q]uit");

        let controller = Arc::clone(&self.controller);
        let shutdown = self.shutdown.clone();
        let cancellation_token = self.cancellation_token.clone();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            while !cancellation_token.is_cancelled() {
                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }

                        match KeyCommand::from_key(key_event.code) {
                            Some(KeyCommand::Quit) => {
                                info!("Quit key pressed - requesting shutdown");
                                shutdown.cancel();
                                break;
                            }
                            Some(command) => apply(&controller, command),
                            None => debug!("Key pressed: {:?}", key_event.code),
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }
            debug!("Keyboard input handler task exited");
        });

        Ok(())
    }

    /// Stop the keyboard input handler
    pub async fn stop(&self) -> Result<()> {
        self.cancellation_token.cancel();

        // Let the task notice and restore the terminal
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();

        Ok(())
    }
}

/// Carry out a non-quit command; blocks while a disarm closes its segment
fn apply(controller: &ArmingController, command: KeyCommand) {
    match command {
        KeyCommand::Arm => match controller.arm() {
            Ok(true) => info!("Armed from keyboard"),
            Ok(false) => info!("Already armed"),
            Err(e) => error!("Failed to arm: {}", e),
        },
        KeyCommand::Disarm => {
            if !controller.disarm() {
                info!("Already disarmed");
            }
        }
        KeyCommand::Status => {
            let status = controller.status();
            info!(
                "armed={} recording={} episodes={} segments={} notifications={}",
                status.armed,
                status.recording,
                status.episodes,
                status.segments,
                status.notifications
            );
        }
        KeyCommand::Quit => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraDevice, SyntheticCamera};
    use crate::config::MotioncamConfig;
    use crate::events::EventBus;

    fn controller() -> Arc<ArmingController> {
        let mut config = MotioncamConfig::default();
        config.camera.main_resolution = (64, 48);
        config.camera.analysis_resolution = (64, 48);
        let camera: Arc<dyn CameraDevice> = Arc::new(
            SyntheticCamera::builder()
                .frame_interval(Duration::from_millis(5))
                .build(),
        );
        Arc::new(ArmingController::new(config, camera, EventBus::new(16)))
    }

    #[test]
    fn test_key_mapping() {
        assert_eq!(KeyCommand::from_key(KeyCode::Char('a')), Some(KeyCommand::Arm));
        assert_eq!(KeyCommand::from_key(KeyCode::Char('D')), Some(KeyCommand::Disarm));
        assert_eq!(KeyCommand::from_key(KeyCode::Char('s')), Some(KeyCommand::Status));
        assert_eq!(KeyCommand::from_key(KeyCode::Esc), Some(KeyCommand::Quit));
        assert_eq!(KeyCommand::from_key(KeyCode::Char(' ')), None);
    }

    #[test]
    fn test_commands_drive_controller() {
        let controller = controller();

        apply(&controller, KeyCommand::Arm);
        assert!(controller.is_armed());
        apply(&controller, KeyCommand::Arm);
        apply(&controller, KeyCommand::Status);

        apply(&controller, KeyCommand::Disarm);
        assert!(!controller.is_armed());
        apply(&controller, KeyCommand::Disarm);
    }

    #[tokio::test]
    async fn test_keyboard_handler_stop() {
        let handler = KeyboardInputHandler::new(controller(), CancellationToken::new());

        handler.stop().await.unwrap();
        assert!(handler.cancellation_token.is_cancelled());
        assert!(!handler.shutdown.is_cancelled());
    }
}
