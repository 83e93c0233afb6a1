//! Shared utilities

pub mod config;
pub mod hash;
pub mod process;
pub mod sysconfig;

pub use config::DiscoveryConfig;
pub use process::{CommandRunner, ProcessOutput, SystemRunner};
