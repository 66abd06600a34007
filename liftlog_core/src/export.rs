//! CSV export of workouts and body metrics.

use crate::{lbs_to_kg, BodyMetrics, MetricKind, Result, Workout};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// One performed set
#[derive(Debug, serde::Serialize)]
struct SetRow<'a> {
    date: String,
    program: &'a str,
    phase: &'a str,
    exercise: &'a str,
    set_number: usize,
    reps: u32,
    weight_lb: f64,
    weight_kg: f64,
    volume: f64,
}

#[derive(Debug, serde::Serialize)]
struct MetricRow<'a> {
    kind: &'a str,
    date: String,
    value: f64,
    unit: &'a str,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Write rows to `path` atomically: temp file, fsync, rename
fn write_csv<W>(path: &Path, write: W) -> Result<usize>
where
    W: FnOnce(&mut csv::Writer<&mut NamedTempFile>) -> Result<usize>,
{
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    let rows = {
        let mut writer = csv::Writer::from_writer(&mut temp);
        let rows = write(&mut writer)?;
        writer.flush()?;
        rows
    };
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(rows)
}

/// Export one row per set, oldest workout first
pub fn export_workouts(workouts: &[Workout], path: &Path) -> Result<usize> {
    let mut ordered: Vec<&Workout> = workouts.iter().collect();
    ordered.sort_by_key(|w| w.date);

    let rows = write_csv(path, |writer| {
        let mut rows = 0;
        for workout in &ordered {
            let date = workout.date.to_string();
            for exercise in &workout.exercises {
                for (idx, set) in exercise.sets.iter().enumerate() {
                    writer.serialize(SetRow {
                        date: date.clone(),
                        program: &workout.program,
                        phase: &workout.phase,
                        exercise: &exercise.name,
                        set_number: idx + 1,
                        reps: set.reps,
                        weight_lb: set.weight,
                        weight_kg: round2(lbs_to_kg(set.weight)),
                        volume: set.volume(),
                    })?;
                    rows += 1;
                }
            }
        }
        Ok(rows)
    })?;

    tracing::info!("Exported {} sets to {:?}", rows, path);
    Ok(rows)
}

/// Export every reading of every metric kind
pub fn export_metrics(metrics: &BodyMetrics, path: &Path) -> Result<usize> {
    let rows = write_csv(path, |writer| {
        let mut rows = 0;
        for kind in MetricKind::ALL {
            let series = metrics.series(kind);
            for entry in &series.entries {
                writer.serialize(MetricRow {
                    kind: kind.as_str(),
                    date: entry.date.to_string(),
                    value: entry.value,
                    unit: &series.unit,
                })?;
                rows += 1;
            }
        }
        Ok(rows)
    })?;

    tracing::info!("Exported {} metric readings to {:?}", rows, path);
    Ok(rows)
}

/// Export both collections into `dir` as `workouts.csv` and `metrics.csv`
pub fn export_all(workouts: &[Workout], metrics: &BodyMetrics, dir: &Path) -> Result<(PathBuf, PathBuf)> {
    let workouts_path = dir.join("workouts.csv");
    let metrics_path = dir.join("metrics.csv");
    export_workouts(workouts, &workouts_path)?;
    export_metrics(metrics, &metrics_path)?;
    Ok((workouts_path, metrics_path))
}
