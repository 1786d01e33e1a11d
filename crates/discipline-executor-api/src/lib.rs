//! Privileged executor trait interfaces for disciplined
//!
//! This crate defines the call contract between the reconciliation core
//! and whatever obtains elevated rights on the device. It contains no
//! platform code itself: implementations only need to run a shell command
//! and report readiness, and the package-manager operations are built on
//! top of that.

mod commands;
mod mock;
mod traits;

pub use commands::*;
pub use mock::*;
pub use traits::*;
