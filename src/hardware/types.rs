//! Fan mode shared by the controller, actuator and logs.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanMode {
    /// Firmware fan curve.
    Automatic,
    /// Fixed operator speed.
    Manual,
}

impl fmt::Display for FanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FanMode::Automatic => write!(f, "Automatic"),
            FanMode::Manual => write!(f, "Manual"),
        }
    }
}
