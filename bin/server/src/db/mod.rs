//! Database repositories for tripwire.
//!
//! This module provides the PostgreSQL implementation of
//! [`tripwire_scheduler::TriggerRepository`] covering triggers and their
//! firing events.

pub mod trigger;

pub use trigger::PgTriggerRepository;
