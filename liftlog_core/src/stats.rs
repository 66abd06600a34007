//! Derived statistics over workouts and body metrics.
//!
//! Everything here is a pure function of its inputs and is recomputed on
//! every call; nothing is cached alongside the collections.

use crate::{BodyMetricSeries, Workout};
use chrono::NaiveDate;
use std::collections::HashMap;

/// Collection-wide totals
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Summary {
    pub workouts: usize,
    pub exercises: usize,
    pub sets: usize,
    pub volume: f64,
}

/// One session of a single exercise
#[derive(Clone, Debug, PartialEq)]
pub struct ExerciseSession {
    pub date: NaiveDate,
    pub max_weight: f64,
    pub volume: f64,
}

pub fn summarize(workouts: &[Workout]) -> Summary {
    workouts.iter().fold(Summary::default(), |mut acc, w| {
        acc.workouts += 1;
        acc.exercises += w.exercises.len();
        acc.sets += w.set_count();
        acc.volume += w.volume();
        acc
    })
}

/// Exercise name that appears most often; ties go to the first seen
pub fn most_frequent_exercise(workouts: &[Workout]) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();

    for exercise in workouts.iter().flat_map(|w| w.exercises.iter()) {
        let count = counts.entry(exercise.name.as_str()).or_insert(0);
        if *count == 0 {
            order.push(exercise.name.as_str());
        }
        *count += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for name in order {
        let count = counts[name];
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((name, count));
        }
    }
    best.map(|(name, _)| name.to_string())
}

/// Chronological sessions of `exercise` (name matched case-insensitively)
///
/// Several occurrences in one workout are merged into a single session.
pub fn exercise_history(workouts: &[Workout], exercise: &str) -> Vec<ExerciseSession> {
    let wanted = exercise.trim().to_lowercase();
    let mut sessions: Vec<(usize, ExerciseSession)> = Vec::new();

    for (idx, workout) in workouts.iter().enumerate() {
        let matching: Vec<_> = workout
            .exercises
            .iter()
            .filter(|e| e.name.trim().to_lowercase() == wanted)
            .collect();
        if matching.is_empty() {
            continue;
        }
        sessions.push((
            idx,
            ExerciseSession {
                date: workout.date,
                max_weight: matching.iter().map(|e| e.max_weight()).fold(0.0, f64::max),
                volume: matching.iter().map(|e| e.volume()).sum(),
            },
        ));
    }

    // Workouts are stored newest first; equal dates keep the later-listed one earlier
    sessions.sort_by(|(ia, a), (ib, b)| a.date.cmp(&b.date).then(ib.cmp(ia)));
    sessions.into_iter().map(|(_, s)| s).collect()
}

/// Whether the latest session of `exercise` beat the session before it
pub fn is_personal_record(workouts: &[Workout], exercise: &str) -> bool {
    let history = exercise_history(workouts, exercise);
    match history.as_slice() {
        [.., previous, latest] => latest.max_weight > previous.max_weight,
        _ => false,
    }
}

/// Exercises whose latest session is a personal record, in first-seen order
pub fn personal_records(workouts: &[Workout]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for exercise in workouts.iter().flat_map(|w| w.exercises.iter()) {
        let key = exercise.name.trim().to_lowercase();
        if !seen.iter().any(|s| s.trim().to_lowercase() == key) {
            seen.push(exercise.name.clone());
        }
    }
    seen.into_iter()
        .filter(|name| is_personal_record(workouts, name))
        .collect()
}

/// Workout counts per program, in first-seen order
pub fn workouts_by_program(workouts: &[Workout]) -> Vec<(String, usize)> {
    let mut groups: Vec<(String, usize)> = Vec::new();
    for workout in workouts {
        match groups.iter_mut().find(|(p, _)| *p == workout.program) {
            Some((_, count)) => *count += 1,
            None => groups.push((workout.program.clone(), 1)),
        }
    }
    groups
}

/// Total volume per calendar day, oldest first
pub fn volume_by_date(workouts: &[Workout]) -> Vec<(NaiveDate, f64)> {
    let mut days: Vec<(NaiveDate, f64)> = Vec::new();
    for workout in workouts {
        match days.iter_mut().find(|(d, _)| *d == workout.date) {
            Some((_, volume)) => *volume += workout.volume(),
            None => days.push((workout.date, workout.volume())),
        }
    }
    days.sort_by(|a, b| a.0.cmp(&b.0));
    days
}

/// Percentage of the way from the first reading to the goal, in `[0, 100]`
pub fn goal_progress(series: &BodyMetricSeries) -> Option<f64> {
    let goal = series.goal.as_ref()?;
    let start = series.entries.iter().min_by_key(|e| e.date)?.value;
    let latest = series.latest()?.value;

    let span = start - goal.target;
    if span == 0.0 {
        return None;
    }
    Some(((start - latest) / span * 100.0).clamp(0.0, 100.0))
}

/// Latest reading and its change versus the one before it
pub fn latest_change(series: &BodyMetricSeries) -> Option<(f64, Option<f64>)> {
    let latest = series.latest()?;
    let previous = series
        .entries
        .iter()
        .filter(|e| e.date < latest.date)
        .max_by_key(|e| e.date);
    Some((latest.value, previous.map(|p| latest.value - p.value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Exercise, Goal, MetricEntry, MetricKind, WorkoutSet};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn workout(id: &str, d: u32, program: &str, exercises: Vec<(&str, Vec<(u32, f64)>)>) -> Workout {
        Workout {
            id: id.into(),
            date: day(d),
            program: program.into(),
            phase: "Base".into(),
            exercises: exercises
                .into_iter()
                .enumerate()
                .map(|(i, (name, sets))| Exercise {
                    id: format!("{}-e{}", id, i),
                    name: name.into(),
                    sets: sets
                        .into_iter()
                        .enumerate()
                        .map(|(j, (reps, weight))| WorkoutSet {
                            id: format!("{}-e{}-s{}", id, i, j),
                            reps,
                            weight,
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    fn series(values: &[(u32, f64)], target: Option<f64>) -> BodyMetricSeries {
        let mut s = BodyMetricSeries::empty(MetricKind::Weight);
        s.entries = values
            .iter()
            .map(|(d, v)| MetricEntry {
                id: format!("m{}", d),
                date: day(*d),
                value: *v,
            })
            .collect();
        s.goal = target.map(|target| Goal {
            target,
            deadline: None,
        });
        s
    }

    #[test]
    fn test_summary_counts() {
        let ws = vec![
            workout("b", 5, "P", vec![("Squat", vec![(5, 100.0), (5, 110.0)])]),
            workout("a", 1, "P", vec![("Squat", vec![(5, 100.0)]), ("Row", vec![(10, 50.0)])]),
        ];
        let s = summarize(&ws);
        assert_eq!(s.workouts, 2);
        assert_eq!(s.exercises, 3);
        assert_eq!(s.sets, 4);
        assert_eq!(s.volume, 500.0 + 550.0 + 500.0 + 500.0);
        assert_eq!(summarize(&[]), Summary::default());
    }

    #[test]
    fn test_personal_record_cases() {
        let prior = workout("a", 1, "P", vec![("Bench", vec![(5, 100.0)])]);
        let beat = workout("b", 8, "P", vec![("Bench", vec![(3, 110.0)])]);
        let missed = workout("b", 8, "P", vec![("Bench", vec![(3, 90.0)])]);

        assert!(is_personal_record(&[beat.clone(), prior.clone()], "Bench"));
        assert!(!is_personal_record(&[missed, prior.clone()], "Bench"));
        assert!(!is_personal_record(&[prior.clone()], "Bench"));
        assert!(!is_personal_record(&[prior], "Deadlift"));
    }

    #[test]
    fn test_personal_record_compares_with_most_recent_prior_only() {
        let ws = vec![
            workout("c", 10, "P", vec![("bench", vec![(5, 105.0)])]),
            workout("b", 5, "P", vec![("Bench", vec![(5, 100.0)])]),
            workout("a", 1, "P", vec![("Bench", vec![(5, 120.0)])]),
        ];
        assert!(is_personal_record(&ws, "BENCH"));
        assert_eq!(personal_records(&ws), vec!["bench".to_string()]);
    }

    #[test]
    fn test_most_frequent_tie_break_is_first_seen() {
        let ws = vec![
            workout("b", 5, "P", vec![("Row", vec![]), ("Squat", vec![])]),
            workout("a", 1, "P", vec![("Squat", vec![]), ("Row", vec![])]),
        ];
        assert_eq!(most_frequent_exercise(&ws), Some("Row".to_string()));
        assert_eq!(most_frequent_exercise(&[]), None);
    }

    #[test]
    fn test_exercise_history_is_chronological() {
        let ws = vec![
            workout("b", 8, "P", vec![("Squat", vec![(5, 120.0), (3, 130.0)])]),
            workout("a", 1, "P", vec![("Squat", vec![(5, 100.0)])]),
        ];
        let history = exercise_history(&ws, "squat");
        assert_eq!(
            history,
            vec![
                ExerciseSession {
                    date: day(1),
                    max_weight: 100.0,
                    volume: 500.0
                },
                ExerciseSession {
                    date: day(8),
                    max_weight: 130.0,
                    volume: 990.0
                },
            ]
        );
    }

    #[test]
    fn test_statistics_are_idempotent() {
        let ws = crate::sample::sample_workouts(day(20));
        assert_eq!(summarize(&ws), summarize(&ws));
        assert_eq!(most_frequent_exercise(&ws), most_frequent_exercise(&ws));
        assert_eq!(exercise_history(&ws, "Squat"), exercise_history(&ws, "Squat"));
        assert_eq!(personal_records(&ws), personal_records(&ws));
    }

    #[test]
    fn test_groupings() {
        let ws = vec![
            workout("c", 8, "Hypertrophy", vec![("Row", vec![(10, 50.0)])]),
            workout("b", 8, "Strength", vec![("Squat", vec![(5, 100.0)])]),
            workout("a", 1, "Strength", vec![("Squat", vec![(5, 90.0)])]),
        ];
        assert_eq!(
            workouts_by_program(&ws),
            vec![("Hypertrophy".to_string(), 1), ("Strength".to_string(), 2)]
        );
        assert_eq!(volume_by_date(&ws), vec![(day(1), 450.0), (day(8), 1000.0)]);
    }

    #[test]
    fn test_goal_progress() {
        assert_eq!(goal_progress(&series(&[(1, 100.0), (8, 95.0)], Some(90.0))), Some(50.0));
        assert_eq!(goal_progress(&series(&[(1, 100.0), (8, 104.0)], Some(90.0))), Some(0.0));
        assert_eq!(goal_progress(&series(&[(1, 100.0), (8, 85.0)], Some(90.0))), Some(100.0));
        assert_eq!(goal_progress(&series(&[(1, 100.0)], None)), None);
        assert_eq!(goal_progress(&series(&[], Some(90.0))), None);
        assert_eq!(goal_progress(&series(&[(1, 90.0)], Some(90.0))), None);
    }

    #[test]
    fn test_latest_change() {
        assert_eq!(
            latest_change(&series(&[(1, 100.0), (8, 97.5)], None)),
            Some((97.5, Some(-2.5)))
        );
        assert_eq!(latest_change(&series(&[(1, 100.0)], None)), Some((100.0, None)));
        assert_eq!(latest_change(&series(&[], None)), None);
    }
}
