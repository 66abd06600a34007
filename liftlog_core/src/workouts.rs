//! Workout log: optimistic CRUD over workouts, exercises and sets.
//!
//! Each workout is one aggregate. Mutations touching the same workout (or
//! anything inside it) are serialized; mutations on different workouts run
//! independently.

use crate::mutation::{no_reconcile, Coordinator, IdAliases, Intent, MutationOutcome};
use crate::notify::Notifier;
use crate::state::StateContainer;
use crate::store::{DataStore, RemoteAck};
use crate::{local_id, Error, Exercise, Result, Workout, WorkoutSet};
use chrono::NaiveDate;
use std::sync::Arc;

/// Order workouts newest date first, keeping insertion order for ties
pub fn sort_newest_first(workouts: &mut [Workout]) {
    workouts.sort_by(|a, b| b.date.cmp(&a.date));
}

/// Input for a new set; weight in canonical pounds
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NewSet {
    pub reps: u32,
    pub weight: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewExercise {
    pub name: String,
    pub sets: Vec<NewSet>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewWorkout {
    pub date: NaiveDate,
    pub program: String,
    pub phase: String,
    pub exercises: Vec<NewExercise>,
}

/// Fields of a workout that can be edited in place
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkoutPatch {
    pub date: Option<NaiveDate>,
    pub program: Option<String>,
    pub phase: Option<String>,
}

/// Reject sets a user could not have performed
pub fn validate_set(set: &NewSet) -> Result<()> {
    if set.reps == 0 {
        return Err(Error::Validation("reps must be greater than zero".into()));
    }
    if !set.weight.is_finite() || set.weight < 0.0 {
        return Err(Error::Validation(format!(
            "weight must be a non-negative number, got {}",
            set.weight
        )));
    }
    Ok(())
}

impl NewSet {
    fn build(&self) -> Result<WorkoutSet> {
        validate_set(self)?;
        Ok(WorkoutSet {
            id: local_id(),
            reps: self.reps,
            weight: self.weight,
        })
    }
}

impl NewExercise {
    fn build(&self, id: String) -> Result<Exercise> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::Validation("exercise name is empty".into()));
        }
        Ok(Exercise {
            id,
            name: name.to_string(),
            sets: self.sets.iter().map(NewSet::build).collect::<Result<_>>()?,
        })
    }
}

fn find_workout<'a>(ws: &'a mut [Workout], workout_id: &str) -> Result<&'a mut Workout> {
    ws.iter_mut()
        .find(|w| w.id == workout_id)
        .ok_or_else(|| Error::not_found("workout", workout_id))
}

fn find_exercise<'a>(
    ws: &'a mut [Workout],
    workout_id: &str,
    exercise_id: &str,
) -> Result<&'a mut Exercise> {
    find_workout(ws, workout_id)?
        .exercise_mut(exercise_id)
        .ok_or_else(|| Error::not_found("exercise", exercise_id))
}

/// Replace placeholder ids with the ones in `ack`
///
/// `placeholder` is the id of the entity the call created; nested
/// assignments cover its children. Only exact id matches are touched.
fn apply_assigned_ids(ws: &mut [Workout], placeholder: &str, ack: &RemoteAck) {
    let rename = |id: &mut String| {
        let next = match &ack.id {
            Some(assigned) if id.as_str() == placeholder => assigned.clone(),
            _ => ack.assigned(id).to_string(),
        };
        *id = next;
    };

    for workout in ws.iter_mut() {
        rename(&mut workout.id);
        for exercise in workout.exercises.iter_mut() {
            rename(&mut exercise.id);
            for set in exercise.sets.iter_mut() {
                rename(&mut set.id);
            }
        }
    }
}

/// Workouts of the active session
#[derive(Clone)]
pub struct WorkoutLog {
    coordinator: Arc<Coordinator<Vec<Workout>>>,
    store: Arc<dyn DataStore>,
}

impl WorkoutLog {
    pub fn new(
        mut initial: Vec<Workout>,
        store: Arc<dyn DataStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        sort_newest_first(&mut initial);
        let state = Arc::new(StateContainer::new(initial));
        Self {
            coordinator: Arc::new(Coordinator::new(state, notifier)),
            store,
        }
    }

    /// Current workouts, newest first
    pub fn workouts(&self) -> Arc<Vec<Workout>> {
        self.coordinator.state().current()
    }

    pub fn state(&self) -> &Arc<StateContainer<Vec<Workout>>> {
        self.coordinator.state()
    }

    /// Replace the in-memory workouts with the store's
    pub async fn reload(&self) -> Result<()> {
        let mut workouts = self.store.list_workouts().await?;
        sort_newest_first(&mut workouts);
        tracing::info!("Loaded {} workouts from {} store", workouts.len(), self.store.name());
        self.state().replace(workouts);
        Ok(())
    }

    pub async fn add_workout(&self, new: NewWorkout) -> MutationOutcome {
        let placeholder = local_id();
        let description = format!("{} ({}) on {}", new.program, new.phase, new.date);
        let store = Arc::clone(&self.store);
        let id = placeholder.clone();

        self.coordinator
            .run(
                Intent::new(placeholder.clone(), "Workout added", "Could not add workout", description)
                    .creating(placeholder.clone()),
                move |ws: &Vec<Workout>, _: &IdAliases| {
                    let workout = Workout {
                        id,
                        date: new.date,
                        program: new.program.trim().to_string(),
                        phase: new.phase.trim().to_string(),
                        exercises: new
                            .exercises
                            .iter()
                            .map(|e| e.build(local_id()))
                            .collect::<Result<_>>()?,
                    };
                    let mut next = ws.clone();
                    next.push(workout.clone());
                    sort_newest_first(&mut next);
                    Ok((next, workout))
                },
                move |workout: Workout| async move { store.insert_workout(&workout).await },
                move |ws: &mut Vec<Workout>, ack: &RemoteAck| {
                    apply_assigned_ids(ws, &placeholder, ack)
                },
            )
            .await
    }

    pub async fn update_workout(&self, workout_id: &str, patch: WorkoutPatch) -> MutationOutcome {
        let store = Arc::clone(&self.store);
        let target = workout_id.to_string();

        self.coordinator
            .run(
                Intent::new(
                    target.clone(),
                    "Workout updated",
                    "Could not update workout",
                    format!("workout {}", target),
                ),
                move |ws: &Vec<Workout>, aliases: &IdAliases| {
                    let mut next = ws.clone();
                    let workout = find_workout(&mut next, &aliases.resolve(&target))?;
                    if let Some(date) = patch.date {
                        workout.date = date;
                    }
                    if let Some(program) = patch.program {
                        workout.program = program.trim().to_string();
                    }
                    if let Some(phase) = patch.phase {
                        workout.phase = phase.trim().to_string();
                    }
                    let updated = workout.clone();
                    sort_newest_first(&mut next);
                    Ok((next, updated))
                },
                move |workout: Workout| async move { store.update_workout(&workout).await },
                no_reconcile,
            )
            .await
    }

    /// Delete a workout with all of its exercises and sets
    pub async fn delete_workout(&self, workout_id: &str) -> MutationOutcome {
        let store = Arc::clone(&self.store);
        let target = workout_id.to_string();

        self.coordinator
            .run(
                Intent::new(
                    target.clone(),
                    "Workout deleted",
                    "Could not delete workout",
                    format!("workout {}", target),
                ),
                move |ws: &Vec<Workout>, aliases: &IdAliases| {
                    let id = aliases.resolve(&target);
                    if !ws.iter().any(|w| w.id == id) {
                        return Err(Error::not_found("workout", id));
                    }
                    let next = ws.iter().filter(|w| w.id != id).cloned().collect();
                    Ok((next, id))
                },
                move |id: String| async move { store.delete_workout(&id).await },
                no_reconcile,
            )
            .await
    }

    pub async fn add_exercise(&self, workout_id: &str, new: NewExercise) -> MutationOutcome {
        let store = Arc::clone(&self.store);
        let target = workout_id.to_string();
        let description = format!("{} in workout {}", new.name.trim(), target);
        let placeholder = local_id();
        let id = placeholder.clone();

        self.coordinator
            .run(
                Intent::new(target.clone(), "Exercise added", "Could not add exercise", description)
                    .creating(placeholder.clone()),
                move |ws: &Vec<Workout>, aliases: &IdAliases| {
                    let exercise = new.build(id)?;
                    let mut next = ws.clone();
                    let workout_id = aliases.resolve(&target);
                    find_workout(&mut next, &workout_id)?
                        .exercises
                        .push(exercise.clone());
                    Ok((next, (workout_id, exercise)))
                },
                move |(workout_id, exercise): (String, Exercise)| async move {
                    store.insert_exercise(&workout_id, &exercise).await
                },
                move |ws: &mut Vec<Workout>, ack: &RemoteAck| {
                    apply_assigned_ids(ws, &placeholder, ack)
                },
            )
            .await
    }

    pub async fn rename_exercise(
        &self,
        workout_id: &str,
        exercise_id: &str,
        name: &str,
    ) -> MutationOutcome {
        let store = Arc::clone(&self.store);
        let target = workout_id.to_string();
        let exercise_id = exercise_id.to_string();
        let name = name.trim().to_string();

        self.coordinator
            .run(
                Intent::new(
                    target.clone(),
                    "Exercise renamed",
                    "Could not rename exercise",
                    format!("renamed to {}", name),
                ),
                move |ws: &Vec<Workout>, aliases: &IdAliases| {
                    if name.is_empty() {
                        return Err(Error::Validation("exercise name is empty".into()));
                    }
                    let mut next = ws.clone();
                    let workout_id = aliases.resolve(&target);
                    let exercise =
                        find_exercise(&mut next, &workout_id, &aliases.resolve(&exercise_id))?;
                    exercise.name = name;
                    let updated = exercise.clone();
                    Ok((next, (workout_id, updated)))
                },
                move |(workout_id, exercise): (String, Exercise)| async move {
                    store.update_exercise(&workout_id, &exercise).await
                },
                no_reconcile,
            )
            .await
    }

    pub async fn delete_exercise(&self, workout_id: &str, exercise_id: &str) -> MutationOutcome {
        let store = Arc::clone(&self.store);
        let target = workout_id.to_string();
        let exercise_id = exercise_id.to_string();

        self.coordinator
            .run(
                Intent::new(
                    target.clone(),
                    "Exercise deleted",
                    "Could not delete exercise",
                    format!("exercise {}", exercise_id),
                ),
                move |ws: &Vec<Workout>, aliases: &IdAliases| {
                    let mut next = ws.clone();
                    let workout_id = aliases.resolve(&target);
                    let exercise_id = aliases.resolve(&exercise_id);
                    let workout = find_workout(&mut next, &workout_id)?;
                    if workout.exercise(&exercise_id).is_none() {
                        return Err(Error::not_found("exercise", exercise_id));
                    }
                    workout.exercises.retain(|e| e.id != exercise_id);
                    Ok((next, (workout_id, exercise_id)))
                },
                move |(workout_id, exercise_id): (String, String)| async move {
                    store.delete_exercise(&workout_id, &exercise_id).await
                },
                no_reconcile,
            )
            .await
    }

    pub async fn add_set(&self, workout_id: &str, exercise_id: &str, new: NewSet) -> MutationOutcome {
        let store = Arc::clone(&self.store);
        let target = workout_id.to_string();
        let exercise_id = exercise_id.to_string();
        let placeholder = local_id();
        let id = placeholder.clone();

        self.coordinator
            .run(
                Intent::new(
                    target.clone(),
                    "Set added",
                    "Could not add set",
                    format!("{} reps at {:.1} lbs", new.reps, new.weight),
                )
                .creating(placeholder.clone()),
                move |ws: &Vec<Workout>, aliases: &IdAliases| {
                    let mut set = new.build()?;
                    set.id = id;
                    let mut next = ws.clone();
                    let workout_id = aliases.resolve(&target);
                    let exercise_id = aliases.resolve(&exercise_id);
                    find_exercise(&mut next, &workout_id, &exercise_id)?
                        .sets
                        .push(set.clone());
                    Ok((next, (workout_id, exercise_id, set)))
                },
                move |(workout_id, exercise_id, set): (String, String, WorkoutSet)| async move {
                    store.insert_set(&workout_id, &exercise_id, &set).await
                },
                move |ws: &mut Vec<Workout>, ack: &RemoteAck| {
                    apply_assigned_ids(ws, &placeholder, ack)
                },
            )
            .await
    }

    pub async fn update_set(
        &self,
        workout_id: &str,
        exercise_id: &str,
        set_id: &str,
        values: NewSet,
    ) -> MutationOutcome {
        let store = Arc::clone(&self.store);
        let target = workout_id.to_string();
        let exercise_id = exercise_id.to_string();
        let set_id = set_id.to_string();

        self.coordinator
            .run(
                Intent::new(
                    target.clone(),
                    "Set updated",
                    "Could not update set",
                    format!("{} reps at {:.1} lbs", values.reps, values.weight),
                ),
                move |ws: &Vec<Workout>, aliases: &IdAliases| {
                    validate_set(&values)?;
                    let mut next = ws.clone();
                    let workout_id = aliases.resolve(&target);
                    let exercise_id = aliases.resolve(&exercise_id);
                    let set_id = aliases.resolve(&set_id);
                    let set = find_exercise(&mut next, &workout_id, &exercise_id)?
                        .sets
                        .iter_mut()
                        .find(|s| s.id == set_id)
                        .ok_or_else(|| Error::not_found("set", set_id.clone()))?;
                    set.reps = values.reps;
                    set.weight = values.weight;
                    let updated = set.clone();
                    Ok((next, (workout_id, exercise_id, updated)))
                },
                move |(workout_id, exercise_id, set): (String, String, WorkoutSet)| async move {
                    store.update_set(&workout_id, &exercise_id, &set).await
                },
                no_reconcile,
            )
            .await
    }

    pub async fn delete_set(&self, workout_id: &str, exercise_id: &str, set_id: &str) -> MutationOutcome {
        let store = Arc::clone(&self.store);
        let target = workout_id.to_string();
        let exercise_id = exercise_id.to_string();
        let set_id = set_id.to_string();

        self.coordinator
            .run(
                Intent::new(
                    target.clone(),
                    "Set deleted",
                    "Could not delete set",
                    format!("set {}", set_id),
                ),
                move |ws: &Vec<Workout>, aliases: &IdAliases| {
                    let mut next = ws.clone();
                    let workout_id = aliases.resolve(&target);
                    let exercise_id = aliases.resolve(&exercise_id);
                    let set_id = aliases.resolve(&set_id);
                    let exercise = find_exercise(&mut next, &workout_id, &exercise_id)?;
                    if !exercise.sets.iter().any(|s| s.id == set_id) {
                        return Err(Error::not_found("set", set_id));
                    }
                    exercise.sets.retain(|s| s.id != set_id);
                    Ok((next, (workout_id, exercise_id, set_id)))
                },
                move |(workout_id, exercise_id, set_id): (String, String, String)| async move {
                    store.delete_set(&workout_id, &exercise_id, &set_id).await
                },
                no_reconcile,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{ChannelNotifier, Notification};
    use crate::test_support::{Mode, ScriptedStore};
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn log_with(
        store: ScriptedStore,
    ) -> (WorkoutLog, Arc<ScriptedStore>, UnboundedReceiver<Notification>) {
        crate::logging::init_test();
        let (notifier, rx) = ChannelNotifier::new();
        let store = Arc::new(store);
        let initial = crate::sample::sample_workouts(day(10));
        let log = WorkoutLog::new(initial, store.clone(), Arc::new(notifier));
        (log, store, rx)
    }

    fn ids(ws: &[Workout]) -> Vec<String> {
        let mut out = Vec::new();
        for w in ws {
            out.push(w.id.clone());
            for e in &w.exercises {
                out.push(e.id.clone());
                out.extend(e.sets.iter().map(|s| s.id.clone()));
            }
        }
        out
    }

    fn new_workout() -> NewWorkout {
        NewWorkout {
            date: day(11),
            program: "Strength Foundations".into(),
            phase: "Week 2".into(),
            exercises: vec![NewExercise {
                name: "Squat".into(),
                sets: vec![NewSet { reps: 5, weight: 215.0 }],
            }],
        }
    }

    #[tokio::test]
    async fn test_set_count_tracks_adds_and_removes() {
        let (log, _store, _rx) = log_with(ScriptedStore::new(Mode::Accept));
        let (wid, eid) = ("sample-workout-3", "sample-exercise-3b");
        let start = log.workouts()[0].exercises[1].sets.len();

        let mut added = Vec::new();
        for reps in 1..=6 {
            let outcome = log.add_set(wid, eid, NewSet { reps, weight: 80.0 }).await;
            added.push(outcome.id().unwrap().to_string());
        }
        for id in added.iter().take(2) {
            assert!(log.delete_set(wid, eid, id).await.is_committed());
        }

        let ws = log.workouts();
        let sets = &ws[0].exercises[1].sets;
        assert_eq!(sets.len(), start + 6 - 2);
        let unique: HashSet<_> = sets.iter().map(|s| &s.id).collect();
        assert_eq!(unique.len(), sets.len());
    }

    #[tokio::test]
    async fn test_every_mutation_rolls_back_on_failure() {
        let (log, _store, mut rx) = log_with(ScriptedStore::new(Mode::Fail));
        let before = log.workouts();
        let (wid, eid, sid) = ("sample-workout-2", "sample-exercise-2b", "sample-set-2b1");
        let set = NewSet { reps: 3, weight: 155.0 };

        let outcomes = vec![
            log.add_workout(new_workout()).await,
            log.update_workout(wid, WorkoutPatch { program: Some("GZCL".into()), ..Default::default() }).await,
            log.delete_workout(wid).await,
            log.add_exercise(wid, NewExercise { name: "Row".into(), sets: vec![] }).await,
            log.rename_exercise(wid, eid, "Paused Bench").await,
            log.delete_exercise(wid, eid).await,
            log.add_set(wid, eid, set).await,
            log.update_set(wid, eid, sid, set).await,
            log.delete_set(wid, eid, sid).await,
        ];

        for outcome in &outcomes {
            assert!(matches!(outcome, MutationOutcome::RolledBack { .. }), "{:?}", outcome);
        }
        assert_eq!(*log.workouts(), *before);

        let mut failures = 0;
        while let Ok(note) = rx.try_recv() {
            assert!(note.is_error());
            failures += 1;
        }
        assert_eq!(failures, outcomes.len());
    }

    #[tokio::test]
    async fn test_reconcile_changes_exactly_one_id() {
        let (log, _store, _rx) = log_with(ScriptedStore::new(Mode::AssignIds));
        let before = ids(&log.workouts());

        let outcome = log
            .add_set("sample-workout-1", "sample-exercise-1a", NewSet { reps: 5, weight: 195.0 })
            .await;
        assert_eq!(outcome.id(), Some("srv-1"));

        let after = ids(&log.workouts());
        assert_eq!(after.len(), before.len() + 1);
        let new_ids: Vec<_> = after.iter().filter(|id| !before.contains(id)).collect();
        assert_eq!(new_ids, vec!["srv-1"]);
        assert!(!after.iter().any(|id| crate::is_local_id(id)));
    }

    #[tokio::test]
    async fn test_new_workout_children_are_reconciled() {
        let (log, _store, _rx) = log_with(ScriptedStore::new(Mode::AssignIds));
        let outcome = log.add_workout(new_workout()).await;
        assert_eq!(outcome.id(), Some("srv-1"));

        let ws = log.workouts();
        assert_eq!(ws[0].id, "srv-1");
        assert_eq!(ws[0].exercises[0].id, "srv-2");
        assert_eq!(ws[0].exercises[0].sets[0].id, "srv-3");
    }

    #[tokio::test]
    async fn test_missing_targets_are_rejected_without_store_calls() {
        let (log, store, mut rx) = log_with(ScriptedStore::new(Mode::Accept));
        let before = log.workouts();

        let outcome = log.delete_set("sample-workout-1", "sample-exercise-1a", "nope").await;
        assert!(matches!(outcome, MutationOutcome::Rejected { .. }));
        let outcome = log.delete_workout("nope").await;
        assert!(matches!(outcome, MutationOutcome::Rejected { .. }));

        assert_eq!(*log.workouts(), *before);
        assert!(store.calls().is_empty());
        assert!(rx.try_recv().unwrap().is_error());
    }

    #[tokio::test]
    async fn test_non_positive_reps_are_rejected() {
        let (log, store, _rx) = log_with(ScriptedStore::new(Mode::Accept));
        let outcome = log
            .add_set("sample-workout-1", "sample-exercise-1a", NewSet { reps: 0, weight: 100.0 })
            .await;
        assert!(matches!(outcome, MutationOutcome::Rejected { .. }));
        let outcome = log
            .add_set("sample-workout-1", "sample-exercise-1a", NewSet { reps: 5, weight: -1.0 })
            .await;
        assert!(matches!(outcome, MutationOutcome::Rejected { .. }));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_keeps_newest_first_order() {
        let (log, _store, _rx) = log_with(ScriptedStore::new(Mode::Accept));
        let patch = WorkoutPatch {
            date: Some(day(20)),
            ..Default::default()
        };
        assert!(log.update_workout("sample-workout-1", patch).await.is_committed());
        assert_eq!(log.workouts()[0].id, "sample-workout-1");
    }

    #[tokio::test]
    async fn test_mutation_queued_behind_create_follows_new_id() {
        let store = ScriptedStore::new(Mode::AssignIds).with_delay(Duration::from_millis(50));
        let (log, _store, _rx) = log_with(store);

        let creating = {
            let log = log.clone();
            tokio::spawn(async move { log.add_workout(new_workout()).await })
        };

        // Grab the placeholder from the optimistic state
        let placeholder = loop {
            if let Some(w) = log.workouts().iter().find(|w| crate::is_local_id(&w.id)) {
                break w.id.clone();
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        };

        let adding = log
            .add_exercise(&placeholder, NewExercise { name: "Lunge".into(), sets: vec![] })
            .await;
        assert!(adding.is_committed(), "{:?}", adding);
        assert!(creating.await.unwrap().is_committed());

        let ws = log.workouts();
        let workout = ws.iter().find(|w| w.id == "srv-1").unwrap();
        assert_eq!(workout.exercises.len(), 2);
        assert!(!ws.iter().any(|w| w.id == placeholder));
    }

    #[tokio::test]
    async fn test_reload_replaces_state() {
        let mut store = ScriptedStore::new(Mode::Accept);
        store.workouts = crate::sample::sample_workouts(day(3));
        store.workouts.truncate(1);
        let (log, _store, _rx) = log_with(store);

        log.reload().await.unwrap();
        assert_eq!(log.workouts().len(), 1);
    }
}
