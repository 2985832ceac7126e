//! Core identifiers and error handling for tripwire.
//!
//! This crate holds the pieces shared by the scheduling library and the
//! server: typed IDs and the rootcause-backed `Result` alias.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ParseIdError, TriggerEventId, TriggerId};
