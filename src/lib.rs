//! Build, deploy and smoke-test a two-service application on an ephemeral
//! k3s cluster driven through a container engine CLI.

pub mod cluster;
pub mod config;
pub mod error;
pub mod exec;
pub mod image;
pub mod manifest;
pub mod pipeline;
pub mod probe;
pub mod rollout;
pub mod scaffold;

pub use error::{Error, ProbeFailure, Result};
