//! Local JSON persistence with file locking.
//!
//! Used when no user session exists. Each collection lives in its own file
//! named after a fixed key (`workouts.json`, `bodyMetrics.json`,
//! `widgets.json`) and is rewritten wholesale on every change.

use super::{DataStore, RemoteAck};
use crate::{
    sample, widgets, workouts, BodyMetrics, Error, Exercise, Goal, MetricEntry, MetricKind,
    Result, WidgetConfig, Workout, WorkoutSet,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const WORKOUTS_KEY: &str = "workouts";
pub const METRICS_KEY: &str = "bodyMetrics";
pub const WIDGETS_KEY: &str = "widgets";

/// Load a collection with shared locking
///
/// Returns `None` if the file doesn't exist or can't be used. A file that
/// exists but fails to parse is moved aside to `<name>.corrupt` and logged.
pub fn load_collection<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        tracing::debug!("No stored collection at {:?}", path);
        return None;
    }

    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!("Unable to open {:?}: {}. Ignoring stored data.", path, e);
            return None;
        }
    };

    if let Err(e) = file.lock_shared() {
        tracing::warn!("Unable to lock {:?}: {}. Ignoring stored data.", path, e);
        return None;
    }

    let mut contents = String::new();
    let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
    let _ = file.unlock();
    if let Err(e) = read {
        tracing::warn!("Failed to read {:?}: {}. Ignoring stored data.", path, e);
        return None;
    }

    if contents.trim().is_empty() {
        tracing::info!("Stored collection {:?} is empty", path);
        return None;
    }

    match serde_json::from_str::<T>(&contents) {
        Ok(value) => {
            tracing::debug!("Loaded collection from {:?}", path);
            Some(value)
        }
        Err(e) => {
            tracing::warn!("Failed to parse {:?}: {}. Falling back to defaults.", path, e);
            let backup = path.with_extension("json.corrupt");
            if let Err(e) = std::fs::rename(path, &backup) {
                tracing::warn!("Could not move corrupt file aside: {}", e);
            }
            None
        }
    }
}

/// Save a collection with exclusive locking
///
/// Atomically writes by:
/// 1. Writing to a temp file in the same directory
/// 2. Syncing to disk
/// 3. Renaming over the original
pub fn save_collection<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Other(format!("{:?} has no parent directory", path)))?;
    std::fs::create_dir_all(parent)?;

    let temp = NamedTempFile::new_in(parent)?;
    temp.as_file().lock_exclusive()?;

    {
        let mut writer = std::io::BufWriter::new(temp.as_file());
        let contents = serde_json::to_string(value)?;
        writer.write_all(contents.as_bytes())?;
        writer.flush()?;
    }

    temp.as_file().sync_all()?;
    temp.as_file().unlock()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;

    tracing::debug!("Saved collection to {:?}", path);
    Ok(())
}

/// Load (or seed), modify and save a collection
///
/// The whole read-modify-write runs under an exclusive lock on
/// `<name>.lock`, so concurrent processes never lose each other's writes.
pub fn update_collection<T, S, F>(path: &Path, seed: S, f: F) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    S: FnOnce() -> T,
    F: FnOnce(&mut T) -> Result<()>,
{
    let lock = File::options()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path.with_extension("lock"))?;
    lock.lock_exclusive()?;

    let result = (|| -> Result<T> {
        let mut value = load_collection(path).unwrap_or_else(seed);
        f(&mut value)?;
        save_collection(path, &value)?;
        Ok(value)
    })();

    let _ = lock.unlock();
    result
}

async fn blocking<F, R>(f: F) -> Result<R>
where
    F: FnOnce() -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Other(format!("storage task failed: {}", e)))?
}

/// File-backed fallback store
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
    seed_date: NaiveDate,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seed_date: chrono::Local::now().date_naive(),
        }
    }

    /// Anchor the sample workouts on `date` instead of today
    pub fn with_seed_date(mut self, date: NaiveDate) -> Self {
        self.seed_date = date;
        self
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    async fn edit_workouts<F>(&self, f: F) -> Result<RemoteAck>
    where
        F: FnOnce(&mut Vec<Workout>) -> Result<()> + Send + 'static,
    {
        let path = self.path_for(WORKOUTS_KEY);
        let seed_date = self.seed_date;
        blocking(move || {
            update_collection(&path, || sample::sample_workouts(seed_date), f)?;
            Ok(RemoteAck::ok())
        })
        .await
    }

    async fn edit_exercise<F>(&self, workout_id: &str, exercise_id: &str, f: F) -> Result<RemoteAck>
    where
        F: FnOnce(&mut Exercise) -> Result<()> + Send + 'static,
    {
        let workout_id = workout_id.to_string();
        let exercise_id = exercise_id.to_string();
        self.edit_workouts(move |ws| {
            let exercise = find_workout(ws, &workout_id)?
                .exercise_mut(&exercise_id)
                .ok_or_else(|| Error::not_found("exercise", exercise_id.clone()))?;
            f(exercise)
        })
        .await
    }

    async fn edit_metrics<F>(&self, f: F) -> Result<RemoteAck>
    where
        F: FnOnce(&mut BodyMetrics) -> Result<()> + Send + 'static,
    {
        let path = self.path_for(METRICS_KEY);
        blocking(move || {
            update_collection(&path, BodyMetrics::default, f)?;
            Ok(RemoteAck::ok())
        })
        .await
    }
}

fn find_workout<'a>(ws: &'a mut [Workout], workout_id: &str) -> Result<&'a mut Workout> {
    ws.iter_mut()
        .find(|w| w.id == workout_id)
        .ok_or_else(|| Error::not_found("workout", workout_id))
}

#[async_trait]
impl DataStore for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn list_workouts(&self) -> Result<Vec<Workout>> {
        let path = self.path_for(WORKOUTS_KEY);
        let seed_date = self.seed_date;
        blocking(move || match load_collection::<Vec<Workout>>(&path) {
            Some(ws) => Ok(ws),
            None => {
                tracing::info!("Seeding {:?} with sample workouts", path);
                let seeded = sample::sample_workouts(seed_date);
                save_collection(&path, &seeded)?;
                Ok(seeded)
            }
        })
        .await
    }

    async fn insert_workout(&self, workout: &Workout) -> Result<RemoteAck> {
        let workout = workout.clone();
        self.edit_workouts(move |ws| {
            ws.retain(|w| w.id != workout.id);
            ws.push(workout);
            workouts::sort_newest_first(ws);
            Ok(())
        })
        .await
    }

    async fn update_workout(&self, workout: &Workout) -> Result<RemoteAck> {
        let updated = workout.clone();
        self.edit_workouts(move |ws| {
            let existing = find_workout(ws, &updated.id)?;
            existing.date = updated.date;
            existing.program = updated.program;
            existing.phase = updated.phase;
            workouts::sort_newest_first(ws);
            Ok(())
        })
        .await
    }

    async fn delete_workout(&self, workout_id: &str) -> Result<RemoteAck> {
        let workout_id = workout_id.to_string();
        self.edit_workouts(move |ws| {
            let before = ws.len();
            ws.retain(|w| w.id != workout_id);
            if ws.len() == before {
                return Err(Error::not_found("workout", workout_id));
            }
            Ok(())
        })
        .await
    }

    async fn insert_exercise(&self, workout_id: &str, exercise: &Exercise) -> Result<RemoteAck> {
        let workout_id = workout_id.to_string();
        let exercise = exercise.clone();
        self.edit_workouts(move |ws| {
            find_workout(ws, &workout_id)?.exercises.push(exercise);
            Ok(())
        })
        .await
    }

    async fn update_exercise(&self, workout_id: &str, exercise: &Exercise) -> Result<RemoteAck> {
        let name = exercise.name.clone();
        self.edit_exercise(workout_id, &exercise.id, move |e| {
            e.name = name;
            Ok(())
        })
        .await
    }

    async fn delete_exercise(&self, workout_id: &str, exercise_id: &str) -> Result<RemoteAck> {
        let workout_id = workout_id.to_string();
        let exercise_id = exercise_id.to_string();
        self.edit_workouts(move |ws| {
            let workout = find_workout(ws, &workout_id)?;
            let before = workout.exercises.len();
            workout.exercises.retain(|e| e.id != exercise_id);
            if workout.exercises.len() == before {
                return Err(Error::not_found("exercise", exercise_id));
            }
            Ok(())
        })
        .await
    }

    async fn insert_set(
        &self,
        workout_id: &str,
        exercise_id: &str,
        set: &WorkoutSet,
    ) -> Result<RemoteAck> {
        let set = set.clone();
        self.edit_exercise(workout_id, exercise_id, move |e| {
            e.sets.push(set);
            Ok(())
        })
        .await
    }

    async fn update_set(
        &self,
        workout_id: &str,
        exercise_id: &str,
        set: &WorkoutSet,
    ) -> Result<RemoteAck> {
        let updated = set.clone();
        self.edit_exercise(workout_id, exercise_id, move |e| {
            let existing = e
                .sets
                .iter_mut()
                .find(|s| s.id == updated.id)
                .ok_or_else(|| Error::not_found("set", updated.id.clone()))?;
            *existing = updated;
            Ok(())
        })
        .await
    }

    async fn delete_set(
        &self,
        workout_id: &str,
        exercise_id: &str,
        set_id: &str,
    ) -> Result<RemoteAck> {
        let set_id = set_id.to_string();
        self.edit_exercise(workout_id, exercise_id, move |e| {
            let before = e.sets.len();
            e.sets.retain(|s| s.id != set_id);
            if e.sets.len() == before {
                return Err(Error::not_found("set", set_id));
            }
            Ok(())
        })
        .await
    }

    async fn load_metrics(&self) -> Result<BodyMetrics> {
        let path = self.path_for(METRICS_KEY);
        blocking(move || Ok(load_collection(&path).unwrap_or_default())).await
    }

    async fn upsert_metric_entry(&self, kind: MetricKind, entry: &MetricEntry) -> Result<RemoteAck> {
        let entry = entry.clone();
        self.edit_metrics(move |metrics| {
            let series = metrics.series_mut(kind);
            series.entries.retain(|e| e.date != entry.date);
            series.entries.push(entry);
            series.sort_entries();
            Ok(())
        })
        .await
    }

    async fn update_metric_entry(&self, kind: MetricKind, entry: &MetricEntry) -> Result<RemoteAck> {
        let updated = entry.clone();
        self.edit_metrics(move |metrics| {
            let series = metrics.series_mut(kind);
            let existing = series
                .entries
                .iter_mut()
                .find(|e| e.id == updated.id)
                .ok_or_else(|| Error::not_found("metric entry", updated.id.clone()))?;
            *existing = updated;
            series.sort_entries();
            Ok(())
        })
        .await
    }

    async fn delete_metric_entry(&self, kind: MetricKind, entry_id: &str) -> Result<RemoteAck> {
        let entry_id = entry_id.to_string();
        self.edit_metrics(move |metrics| {
            let series = metrics.series_mut(kind);
            let before = series.entries.len();
            series.entries.retain(|e| e.id != entry_id);
            if series.entries.len() == before {
                return Err(Error::not_found("metric entry", entry_id));
            }
            Ok(())
        })
        .await
    }

    async fn upsert_goal(&self, kind: MetricKind, goal: &Goal) -> Result<RemoteAck> {
        let goal = goal.clone();
        self.edit_metrics(move |metrics| {
            metrics.series_mut(kind).goal = Some(goal);
            Ok(())
        })
        .await
    }

    async fn delete_goal(&self, kind: MetricKind) -> Result<RemoteAck> {
        self.edit_metrics(move |metrics| {
            metrics.series_mut(kind).goal = None;
            Ok(())
        })
        .await
    }

    async fn list_widgets(&self) -> Result<Vec<WidgetConfig>> {
        let path = self.path_for(WIDGETS_KEY);
        blocking(move || {
            Ok(load_collection(&path).unwrap_or_else(|| widgets::default_layout().to_vec()))
        })
        .await
    }

    async fn save_widgets(&self, layout: &[WidgetConfig]) -> Result<RemoteAck> {
        let path = self.path_for(WIDGETS_KEY);
        let layout = layout.to_vec();
        blocking(move || {
            save_collection(&path, &layout)?;
            Ok(RemoteAck::ok())
        })
        .await
    }
}
