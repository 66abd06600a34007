//! Sample data shown on first run.
//!
//! Three workouts spread over the week ending on the anchor date, so the
//! dashboard has something to show before anything has been logged.

use crate::{Exercise, Workout, WorkoutSet};
use chrono::{Duration, NaiveDate};

fn set(id: &str, reps: u32, weight: f64) -> WorkoutSet {
    WorkoutSet {
        id: id.into(),
        reps,
        weight,
    }
}

fn exercise(id: &str, name: &str, sets: Vec<WorkoutSet>) -> Exercise {
    Exercise {
        id: id.into(),
        name: name.into(),
        sets,
    }
}

/// The fixed sample workouts, newest first, anchored on `today`
pub fn sample_workouts(today: NaiveDate) -> Vec<Workout> {
    vec![
        Workout {
            id: "sample-workout-3".into(),
            date: today,
            program: "Strength Foundations".into(),
            phase: "Week 1".into(),
            exercises: vec![
                exercise(
                    "sample-exercise-3a",
                    "Squat",
                    vec![
                        set("sample-set-3a1", 5, 185.0),
                        set("sample-set-3a2", 5, 195.0),
                        set("sample-set-3a3", 5, 205.0),
                    ],
                ),
                exercise(
                    "sample-exercise-3b",
                    "Overhead Press",
                    vec![
                        set("sample-set-3b1", 8, 75.0),
                        set("sample-set-3b2", 8, 75.0),
                    ],
                ),
            ],
        },
        Workout {
            id: "sample-workout-2".into(),
            date: today - Duration::days(3),
            program: "Strength Foundations".into(),
            phase: "Week 1".into(),
            exercises: vec![
                exercise(
                    "sample-exercise-2a",
                    "Deadlift",
                    vec![
                        set("sample-set-2a1", 5, 225.0),
                        set("sample-set-2a2", 5, 245.0),
                    ],
                ),
                exercise(
                    "sample-exercise-2b",
                    "Bench Press",
                    vec![
                        set("sample-set-2b1", 8, 135.0),
                        set("sample-set-2b2", 6, 145.0),
                    ],
                ),
            ],
        },
        Workout {
            id: "sample-workout-1".into(),
            date: today - Duration::days(6),
            program: "Strength Foundations".into(),
            phase: "Week 1".into(),
            exercises: vec![
                exercise(
                    "sample-exercise-1a",
                    "Squat",
                    vec![
                        set("sample-set-1a1", 5, 175.0),
                        set("sample-set-1a2", 5, 185.0),
                    ],
                ),
                exercise(
                    "sample-exercise-1b",
                    "Bench Press",
                    vec![
                        set("sample-set-1b1", 8, 125.0),
                        set("sample-set-1b2", 8, 135.0),
                    ],
                ),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_spans_a_week() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let ws = sample_workouts(today);
        assert_eq!(ws.len(), 3);
        assert_eq!(ws[0].date, today);
        assert_eq!(ws[2].date, today - Duration::days(6));
        assert!(ws.iter().all(|w| !w.exercises.is_empty()));
    }
}
