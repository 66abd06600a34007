//! Scripted data store for unit tests.

use crate::store::{DataStore, RemoteAck};
use crate::{
    BodyMetrics, Error, Exercise, Goal, MetricEntry, MetricKind, Result, WidgetConfig, Workout,
    WorkoutSet,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// How the scripted store answers mutating calls
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Succeed without assigning ids
    Accept,
    /// Fail every call
    Fail,
    /// Succeed and assign `srv-N` ids to everything created
    AssignIds,
}

pub struct ScriptedStore {
    mode: Mutex<Mode>,
    delay: Option<Duration>,
    counter: AtomicUsize,
    calls: Mutex<Vec<String>>,
    pub workouts: Vec<Workout>,
    pub metrics: BodyMetrics,
    pub widgets: Vec<WidgetConfig>,
}

impl ScriptedStore {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode: Mutex::new(mode),
            delay: None,
            counter: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            workouts: Vec::new(),
            metrics: BodyMetrics::default(),
            widgets: crate::widgets::default_layout().to_vec(),
        }
    }

    /// Answer every mutating call only after `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn next_id(&self) -> String {
        format!("srv-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn assign_exercise(&self, ack: RemoteAck, exercise: &Exercise) -> RemoteAck {
        let mut ack = ack;
        for set in &exercise.sets {
            ack = ack.with_nested(&set.id, self.next_id());
        }
        ack
    }

    async fn respond<F>(&self, call: &str, assign: F) -> Result<RemoteAck>
    where
        F: FnOnce(&Self) -> RemoteAck + Send,
    {
        self.calls.lock().unwrap().push(call.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mode = *self.mode.lock().unwrap();
        match mode {
            Mode::Fail => Err(Error::Remote(format!("simulated outage during {}", call))),
            Mode::Accept => Ok(RemoteAck::ok()),
            Mode::AssignIds => Ok(assign(self)),
        }
    }
}

#[async_trait]
impl DataStore for ScriptedStore {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn list_workouts(&self) -> Result<Vec<Workout>> {
        Ok(self.workouts.clone())
    }

    async fn insert_workout(&self, workout: &Workout) -> Result<RemoteAck> {
        self.respond("insert_workout", |s| {
            let mut ack = RemoteAck::created(s.next_id());
            for exercise in &workout.exercises {
                ack = ack.with_nested(&exercise.id, s.next_id());
                ack = s.assign_exercise(ack, exercise);
            }
            ack
        })
        .await
    }

    async fn update_workout(&self, _workout: &Workout) -> Result<RemoteAck> {
        self.respond("update_workout", |_| RemoteAck::ok()).await
    }

    async fn delete_workout(&self, _workout_id: &str) -> Result<RemoteAck> {
        self.respond("delete_workout", |_| RemoteAck::ok()).await
    }

    async fn insert_exercise(&self, _workout_id: &str, exercise: &Exercise) -> Result<RemoteAck> {
        self.respond("insert_exercise", |s| {
            let ack = RemoteAck::created(s.next_id());
            s.assign_exercise(ack, exercise)
        })
        .await
    }

    async fn update_exercise(&self, _workout_id: &str, _exercise: &Exercise) -> Result<RemoteAck> {
        self.respond("update_exercise", |_| RemoteAck::ok()).await
    }

    async fn delete_exercise(&self, _workout_id: &str, _exercise_id: &str) -> Result<RemoteAck> {
        self.respond("delete_exercise", |_| RemoteAck::ok()).await
    }

    async fn insert_set(
        &self,
        _workout_id: &str,
        _exercise_id: &str,
        _set: &WorkoutSet,
    ) -> Result<RemoteAck> {
        self.respond("insert_set", |s| RemoteAck::created(s.next_id()))
            .await
    }

    async fn update_set(
        &self,
        _workout_id: &str,
        _exercise_id: &str,
        _set: &WorkoutSet,
    ) -> Result<RemoteAck> {
        self.respond("update_set", |_| RemoteAck::ok()).await
    }

    async fn delete_set(
        &self,
        _workout_id: &str,
        _exercise_id: &str,
        _set_id: &str,
    ) -> Result<RemoteAck> {
        self.respond("delete_set", |_| RemoteAck::ok()).await
    }

    async fn load_metrics(&self) -> Result<BodyMetrics> {
        Ok(self.metrics.clone())
    }

    async fn upsert_metric_entry(&self, _kind: MetricKind, _entry: &MetricEntry) -> Result<RemoteAck> {
        self.respond("upsert_metric_entry", |s| RemoteAck::created(s.next_id()))
            .await
    }

    async fn update_metric_entry(&self, _kind: MetricKind, _entry: &MetricEntry) -> Result<RemoteAck> {
        self.respond("update_metric_entry", |_| RemoteAck::ok()).await
    }

    async fn delete_metric_entry(&self, _kind: MetricKind, _entry_id: &str) -> Result<RemoteAck> {
        self.respond("delete_metric_entry", |_| RemoteAck::ok()).await
    }

    async fn upsert_goal(&self, _kind: MetricKind, _goal: &Goal) -> Result<RemoteAck> {
        self.respond("upsert_goal", |_| RemoteAck::ok()).await
    }

    async fn delete_goal(&self, _kind: MetricKind) -> Result<RemoteAck> {
        self.respond("delete_goal", |_| RemoteAck::ok()).await
    }

    async fn list_widgets(&self) -> Result<Vec<WidgetConfig>> {
        Ok(self.widgets.clone())
    }

    async fn save_widgets(&self, _widgets: &[WidgetConfig]) -> Result<RemoteAck> {
        self.respond("save_widgets", |_| RemoteAck::ok()).await
    }
}
