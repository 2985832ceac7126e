//! Trigger scheduling for tripwire.
//!
//! This crate provides:
//! - Trigger and firing-event types with the lifecycle state machine
//! - The `TriggerRepository` storage seam and an in-memory implementation
//! - `EventLogger`, which records firings atomically
//! - `TriggerScheduler`, the minute-aligned polling loop
//! - `RetentionSweeper`, the two-stage archive-then-remove policy
//! - NATS publisher and subscriber for fan-out of firings

pub mod dispatch;
pub mod error;
pub mod event;
pub mod logger;
pub mod memory;
pub mod nats;
pub mod poller;
pub mod publisher;
pub mod repository;
pub mod retention;
pub mod trigger;

pub use dispatch::{Dispatcher, Disposition, FiringRecorder, RetryPolicy};
pub use error::{LogError, PublishError, RetentionError, StoreError, SubscribeError};
pub use event::{EventFilter, EventStatus, Firing, NextState, TriggerEvent};
pub use logger::EventLogger;
pub use memory::{InMemoryTriggerRepository, RecordingPublisher};
pub use nats::{NatsConfig, NatsEventPublisher, NatsEventSubscriber};
pub use poller::{CycleReport, TriggerScheduler};
pub use publisher::EventPublisher;
pub use repository::TriggerRepository;
pub use retention::{RetentionPolicy, RetentionSweeper, SweepOutcome};
pub use trigger::{
    MAX_INTERVAL_MINUTES, NewTrigger, Trigger, TriggerConditions, TriggerFilter, TriggerKind,
    TriggerPatch, TriggerStatus, add_minutes, next_minute_boundary, truncate_to_minute,
};
