#![forbid(unsafe_code)]

//! Core domain model and business logic for the liftlog fitness tracker.
//!
//! This crate provides:
//! - Domain types (workouts, exercises, sets, body metrics, widgets)
//! - Entity state containers and the optimistic mutation coordinator
//! - Persistence (local JSON files, hosted REST backend)
//! - Derived statistics and dashboard summaries
//! - CSV export

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod state;
pub mod mutation;
pub mod notify;
pub mod store;
pub mod sample;
pub mod workouts;
pub mod metrics;
pub mod widgets;
pub mod stats;
pub mod session;
pub mod tracker;
pub mod export;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use mutation::MutationOutcome;
pub use notify::{ChannelNotifier, Notification, NotificationLevel, Notifier, TracingNotifier};
pub use store::{DataStore, LocalStore, RemoteAck, RestStore};
pub use session::{SessionProvider, StaticSession};
pub use tracker::Tracker;
pub use workouts::{NewExercise, NewSet, NewWorkout, WorkoutLog, WorkoutPatch};
pub use metrics::MetricsLog;
pub use widgets::{Dashboard, Direction};
