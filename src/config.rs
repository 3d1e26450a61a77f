//! Configuration types and file loading.

pub mod persistence;
pub mod types;
