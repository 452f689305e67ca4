//! # adjacency-core
//!
//! Core state-tracking logic for the adjacency proximity engine: pairwise
//! distance between a fixed anchor entity and a set of tracked targets, with
//! hysteresis, debouncing, movement filtering and nearest-target aggregation.
//!
//! This crate provides:
//! - Coordinate extraction from loosely structured location observations
//! - Per-pair hysteresis state machines with enter/leave/update events
//! - Trailing-edge debouncing of bursty observation input
//! - Speed, resynchronisation and reliability filtering of fixes
//! - A nearest-target aggregate across all pairs of one anchor
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`engine`] - Observation intake, timers and the subscriber surface
//! - [`pair`] - Per-pair hysteresis machine and snapshot assembly
//! - [`aggregate`] - Nearest-target and any-proximity derivation
//! - [`sample`] - Coordinate and accuracy extraction from observations
//! - [`motion`] - Speed estimation, jump filtering and resync handling
//! - [`debounce`] - Generation-counted trailing-edge timers
//! - [`geo`] - Haversine distance, bearing, buckets and display formatting
//! - [`event`] - Transition events and subscriber fan-out
//! - [`config`] - Configuration loading, saving, and validation
//! - [`entity`] - Entity identifier validation and parsing
//! - [`clock`] - Time source abstraction for testable timers
//! - [`error`] - Unified error types for the crate
//!
//! The core is sans-I/O: it never sleeps, spawns or reads the wall clock on
//! its own. An embedding shell feeds it observations, waits until
//! [`AdjacencyEngine::next_deadline`] and calls
//! [`AdjacencyEngine::run_due_timers`].

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod aggregate;
pub mod clock;
pub mod config;
pub mod debounce;
pub mod engine;
pub mod entity;
pub mod error;
pub mod event;
pub mod geo;
pub mod motion;
pub mod pair;
pub mod sample;

// Re-export primary types for convenience
pub use aggregate::{AggregateSnapshot, NearestAggregator};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{AdjacencyEngine, RefreshRequester};
pub use entity::{is_valid_entity_id, EntityId};
pub use error::{AdjacencyError, Result, SampleError, Side};
pub use event::{Event, EventBus, EventSink, SubscriptionId};
pub use geo::{display_distance, format_duration, haversine_m, initial_bearing_deg, BucketTable};
pub use pair::{classify_proximity, PairSnapshot, PairState};
pub use sample::{CoordinateSample, Observation};
