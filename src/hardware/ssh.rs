//! lm-sensors readings over a multiplexed OpenSSH session.

pub mod lm_sensors;
pub mod session;
