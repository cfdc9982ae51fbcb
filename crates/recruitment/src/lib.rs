pub mod access;
pub mod config;
pub mod documents;
pub mod error;
pub mod memory;
pub mod recruitment;
pub mod telemetry;
