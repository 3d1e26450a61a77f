//! Per-host decision logic: reading smoothing and the fan-mode state machine.

pub mod hysteresis;
pub mod window;

pub use hysteresis::{ControllerSettings, Decision, HysteresisController};
pub use window::RollingWindow;
