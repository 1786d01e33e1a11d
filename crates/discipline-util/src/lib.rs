//! Shared utilities for discipline
//!
//! This crate provides:
//! - ID types (PolicyId, GroupId, PackageName, ProfileId, ClientId)
//! - Wall-clock utilities (mock-able `now()`, time of day, weekday sets)
//! - Default paths for socket, config, and data directories

mod ids;
mod paths;
mod time;

pub use ids::*;
pub use paths::*;
pub use time::*;
