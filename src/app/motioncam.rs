use super::types::{ComponentState, ShutdownReason};
use crate::camera::CameraDevice;
use crate::config::MotioncamConfig;
use crate::controller::ArmingController;
use crate::error::Result;
use crate::events::EventBus;
use crate::keyboard_input::KeyboardInputHandler;
use crate::notify::NotificationService;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

/// Wires the camera, controller and notification worker together and owns
/// their lifecycle
pub struct MotioncamApp {
    pub(super) config: MotioncamConfig,
    pub(super) event_bus: EventBus,
    pub(super) camera: Arc<dyn CameraDevice>,

    // Components
    pub(super) controller: Option<Arc<ArmingController>>,
    pub(super) notifications: Option<NotificationService>,
    pub(super) keyboard_handler: Option<KeyboardInputHandler>,
    pub(super) keyboard_enabled: bool,
    pub(super) start_armed: bool,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl MotioncamApp {
    /// Create the application around an already constructed camera
    pub fn new(config: MotioncamConfig, camera: Arc<dyn CameraDevice>) -> Result<Self> {
        config.validate()?;

        let event_bus = EventBus::new(config.system.event_bus_capacity);
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();
        let start_armed = config.system.start_armed;

        Ok(Self {
            config,
            event_bus,
            camera,
            controller: None,
            notifications: None,
            keyboard_handler: None,
            keyboard_enabled: false,
            start_armed,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Enable or disable the keyboard control surface
    pub fn set_keyboard_enabled(&mut self, enabled: bool) {
        self.keyboard_enabled = enabled;
    }

    /// Override `system.start_armed`
    pub fn set_start_armed(&mut self, armed: bool) {
        self.start_armed = armed;
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// The controller, available once the app has started
    pub fn controller(&self) -> Option<Arc<ArmingController>> {
        self.controller.clone()
    }

    /// Token that, when cancelled, asks a running app to shut down
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }
}
