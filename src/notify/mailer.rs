use crate::config::NotificationConfig;
use crate::error::NotificationError;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, info};

/// Boundary to whatever delivers the still image to the operator.
///
/// Called from a blocking worker thread, never from the processing loop.
pub trait Mailer: Send + Sync {
    fn name(&self) -> &'static str;

    fn send(&self, image: &Path) -> Result<(), NotificationError>;
}

/// Runs an external program as `command <subject> <sender> <recipient> <image>`
#[derive(Debug, Clone)]
pub struct CommandMailer {
    program: String,
    subject: String,
    sender: String,
    recipient: String,
}

impl CommandMailer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            subject: String::new(),
            sender: String::new(),
            recipient: String::new(),
        }
    }

    pub fn from_config(config: &NotificationConfig) -> Self {
        Self {
            program: config.command.trim().to_string(),
            subject: config.subject.clone(),
            sender: config.sender.clone(),
            recipient: config.recipient.clone(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn with_addresses(mut self, sender: impl Into<String>, recipient: impl Into<String>) -> Self {
        self.sender = sender.into();
        self.recipient = recipient.into();
        self
    }
}

impl Mailer for CommandMailer {
    fn name(&self) -> &'static str {
        "command"
    }

    fn send(&self, image: &Path) -> Result<(), NotificationError> {
        debug!("Running mailer {} for {}", self.program, image.display());

        let output = Command::new(&self.program)
            .arg(&self.subject)
            .arg(&self.sender)
            .arg(&self.recipient)
            .arg(image)
            .output()
            .map_err(|e| NotificationError::Delivery {
                details: format!("Failed to run {}: {}", self.program, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NotificationError::Delivery {
                details: format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    stderr.trim()
                ),
            });
        }

        info!("Mailed {} to {}", image.display(), self.recipient);
        Ok(())
    }
}

/// Logs the still instead of mailing it
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn name(&self) -> &'static str {
        "log"
    }

    fn send(&self, image: &Path) -> Result<(), NotificationError> {
        info!("Motion still ready at {} (no mailer configured)", image.display());
        Ok(())
    }
}

/// `CommandMailer` when a program is configured, `LogMailer` otherwise
pub fn mailer_from_config(config: &NotificationConfig) -> Arc<dyn Mailer> {
    if config.command.trim().is_empty() {
        Arc::new(LogMailer)
    } else {
        Arc::new(CommandMailer::from_config(config))
    }
}
