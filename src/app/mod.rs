mod motioncam;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;

#[cfg(test)]
mod tests;

pub use motioncam::MotioncamApp;
pub use types::{ComponentState, ShutdownReason};
