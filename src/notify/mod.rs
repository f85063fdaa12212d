mod dispatcher;
mod mailer;
#[cfg(test)]
mod tests;

pub use dispatcher::{NotificationDispatcher, NotificationRequest, NotificationService};
pub use mailer::{mailer_from_config, CommandMailer, LogMailer, Mailer};
