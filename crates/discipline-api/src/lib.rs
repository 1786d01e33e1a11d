//! Document and protocol types for discipline
//!
//! This crate defines the stable shapes shared by the daemon, the store,
//! and clients:
//! - Policy and group documents (the persisted and transmitted form)
//! - Commands (requests from clients) and responses
//! - Events (daemon -> clients)
//! - Versioning

mod commands;
mod documents;
mod events;
mod types;

pub use commands::*;
pub use documents::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
