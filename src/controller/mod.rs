mod arming;
mod processing;
#[cfg(test)]
mod tests;

pub use arming::{ArmingController, ControllerStatus};
pub use processing::LoopCommand;
