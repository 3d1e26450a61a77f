//! ipmitool-backed reading source and fan actuator.

pub mod actuator;
pub mod client;
pub mod commands;
pub mod temperature;
