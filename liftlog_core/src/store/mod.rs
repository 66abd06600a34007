//! Persistence backends.
//!
//! Both backends implement [`DataStore`]. One of them is selected per
//! session: [`RestStore`] when a user is signed in, [`LocalStore`] otherwise.

pub mod local;
pub mod remote;

pub use local::LocalStore;
pub use remote::RestStore;

use crate::{
    BodyMetrics, Exercise, Goal, MetricEntry, MetricKind, Result, WidgetConfig, Workout,
    WorkoutSet,
};
use async_trait::async_trait;
use std::collections::HashMap;

/// Acknowledgement of a successful store call
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemoteAck {
    /// Authoritative id of the entity the call created
    pub id: Option<String>,
    /// Ids assigned to entities created alongside it, keyed by placeholder
    pub nested: HashMap<String, String>,
}

impl RemoteAck {
    /// Success without any new identifiers
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn created(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            nested: HashMap::new(),
        }
    }

    pub fn with_nested(mut self, placeholder: impl Into<String>, id: impl Into<String>) -> Self {
        self.nested.insert(placeholder.into(), id.into());
        self
    }

    pub fn assigns_ids(&self) -> bool {
        self.id.is_some() || !self.nested.is_empty()
    }

    /// Final id for an entity created with `placeholder`
    pub fn assigned<'a>(&'a self, placeholder: &'a str) -> &'a str {
        self.nested
            .get(placeholder)
            .map(String::as_str)
            .unwrap_or(placeholder)
    }
}

/// CRUD contract shared by the local and remote backends
///
/// Top-level entities are scoped to the session's user by the
/// implementation. Calls that create entities return the ids the backend
/// assigned in the [`RemoteAck`].
#[async_trait]
pub trait DataStore: Send + Sync {
    fn name(&self) -> &str;

    async fn list_workouts(&self) -> Result<Vec<Workout>>;
    /// Insert a workout together with its exercises and sets
    async fn insert_workout(&self, workout: &Workout) -> Result<RemoteAck>;
    /// Update date, program and phase
    async fn update_workout(&self, workout: &Workout) -> Result<RemoteAck>;
    async fn delete_workout(&self, workout_id: &str) -> Result<RemoteAck>;

    async fn insert_exercise(&self, workout_id: &str, exercise: &Exercise) -> Result<RemoteAck>;
    async fn update_exercise(&self, workout_id: &str, exercise: &Exercise) -> Result<RemoteAck>;
    async fn delete_exercise(&self, workout_id: &str, exercise_id: &str) -> Result<RemoteAck>;

    async fn insert_set(
        &self,
        workout_id: &str,
        exercise_id: &str,
        set: &WorkoutSet,
    ) -> Result<RemoteAck>;
    async fn update_set(
        &self,
        workout_id: &str,
        exercise_id: &str,
        set: &WorkoutSet,
    ) -> Result<RemoteAck>;
    async fn delete_set(&self, workout_id: &str, exercise_id: &str, set_id: &str)
        -> Result<RemoteAck>;

    async fn load_metrics(&self) -> Result<BodyMetrics>;
    /// Insert or replace the reading for `entry.date`
    async fn upsert_metric_entry(&self, kind: MetricKind, entry: &MetricEntry) -> Result<RemoteAck>;
    /// Update an existing reading by id
    async fn update_metric_entry(&self, kind: MetricKind, entry: &MetricEntry) -> Result<RemoteAck>;
    async fn delete_metric_entry(&self, kind: MetricKind, entry_id: &str) -> Result<RemoteAck>;
    async fn upsert_goal(&self, kind: MetricKind, goal: &Goal) -> Result<RemoteAck>;
    async fn delete_goal(&self, kind: MetricKind) -> Result<RemoteAck>;

    async fn list_widgets(&self) -> Result<Vec<WidgetConfig>>;
    /// Replace the stored layout with `widgets`
    async fn save_widgets(&self, widgets: &[WidgetConfig]) -> Result<RemoteAck>;
}
