//! cellxgene Core Library
//!
//! This crate provides configuration, shared constants, and the hosted
//! deployment config renderer used by the other cellxgene crates.

pub mod config;
pub mod constants;
pub mod deployment;

// Re-export commonly used types
pub use config::{LocatorConfig, RegionSetting};
pub use deployment::{render_hosted_config, DeploymentEnv, HostedUrls};
