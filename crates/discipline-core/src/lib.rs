//! Reconciliation core for disciplined
//!
//! This crate is the heart of disciplined, containing:
//! - Schedule evaluation (is a policy's window active, should it restrict)
//! - Scope resolution with the protected-package guardrail
//! - The reconciler (desired vs. actual package state, corrective commands)
//! - Global override settings
//! - The scheduler driver (periodic alarm tiers, immediate runs, change notices)
//! - The policy manager facade used by the IPC layer

mod driver;
mod error;
mod events;
mod manager;
mod reconciler;
mod schedule;
mod scope;
mod settings;
mod state;

pub use driver::*;
pub use error::*;
pub use events::*;
pub use manager::*;
pub use reconciler::*;
pub use schedule::*;
pub use scope::*;
pub use settings::*;
pub use state::*;
