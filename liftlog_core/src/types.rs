//! Core domain types for liftlog.
//!
//! This module defines the entities the tracker keeps in memory and persists:
//! - Workouts, their exercises and sets
//! - Body metric series with optional goals
//! - Dashboard widget configuration
//! - The authenticated user session

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Pounds per kilogram, used for every weight conversion.
pub const LBS_PER_KG: f64 = 2.20462;

/// Prefix for identifiers generated before the store has assigned one.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Generate a placeholder identifier for a freshly created entity
pub fn local_id() -> String {
    format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4())
}

/// Whether an identifier is still a local placeholder
pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

pub fn lbs_to_kg(lbs: f64) -> f64 {
    lbs / LBS_PER_KG
}

pub fn kg_to_lbs(kg: f64) -> f64 {
    kg * LBS_PER_KG
}

// ============================================================================
// Workout Types
// ============================================================================

/// One unit of repetitions at a given weight
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkoutSet {
    pub id: String,
    pub reps: u32,
    /// Canonical weight in pounds
    pub weight: f64,
}

impl WorkoutSet {
    pub fn volume(&self) -> f64 {
        f64::from(self.reps) * self.weight
    }
}

/// A named movement performed within a workout
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Exercise {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sets: Vec<WorkoutSet>,
}

impl Exercise {
    /// Heaviest set weight, 0 when the exercise has no sets
    pub fn max_weight(&self) -> f64 {
        self.sets.iter().map(|s| s.weight).fold(0.0, f64::max)
    }

    pub fn volume(&self) -> f64 {
        self.sets.iter().map(WorkoutSet::volume).sum()
    }
}

/// A logged training session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Workout {
    pub id: String,
    pub date: NaiveDate,
    pub program: String,
    pub phase: String,
    #[serde(default)]
    pub exercises: Vec<Exercise>,
}

impl Workout {
    pub fn exercise(&self, exercise_id: &str) -> Option<&Exercise> {
        self.exercises.iter().find(|e| e.id == exercise_id)
    }

    pub fn exercise_mut(&mut self, exercise_id: &str) -> Option<&mut Exercise> {
        self.exercises.iter_mut().find(|e| e.id == exercise_id)
    }

    pub fn set_count(&self) -> usize {
        self.exercises.iter().map(|e| e.sets.len()).sum()
    }

    pub fn volume(&self) -> f64 {
        self.exercises.iter().map(Exercise::volume).sum()
    }
}

// ============================================================================
// Body Metric Types
// ============================================================================

/// Kind of tracked body metric
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum MetricKind {
    Weight,
    BodyFat,
    MuscleMass,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [MetricKind::Weight, MetricKind::BodyFat, MetricKind::MuscleMass];

    pub fn default_unit(self) -> &'static str {
        match self {
            MetricKind::Weight => "kg",
            MetricKind::BodyFat | MetricKind::MuscleMass => "%",
        }
    }

    /// Stable name used in storage and on the wire
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Weight => "weight",
            MetricKind::BodyFat => "body_fat",
            MetricKind::MuscleMass => "muscle_mass",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "weight" => Ok(MetricKind::Weight),
            "body_fat" | "bodyfat" | "fat" => Ok(MetricKind::BodyFat),
            "muscle_mass" | "musclemass" | "muscle" => Ok(MetricKind::MuscleMass),
            other => Err(crate::Error::Validation(format!(
                "unknown metric kind '{}'",
                other
            ))),
        }
    }
}

/// A single dated reading
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MetricEntry {
    pub id: String,
    pub date: NaiveDate,
    pub value: f64,
}

/// Target for a metric series
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Goal {
    pub target: f64,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
}

/// All readings for one metric kind, sorted ascending by date
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BodyMetricSeries {
    pub kind: MetricKind,
    #[serde(default)]
    pub entries: Vec<MetricEntry>,
    #[serde(default)]
    pub goal: Option<Goal>,
    pub unit: String,
}

impl BodyMetricSeries {
    pub fn empty(kind: MetricKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
            goal: None,
            unit: kind.default_unit().to_string(),
        }
    }

    /// Restore date order; stable so same-date entries keep insertion order
    pub fn sort_entries(&mut self) {
        self.entries.sort_by_key(|e| e.date);
    }

    pub fn latest(&self) -> Option<&MetricEntry> {
        self.entries.last()
    }

    /// Unit the weight readings are stored in; `None` for percentage series
    fn stored_weight_unit(&self) -> Option<WeightUnit> {
        match self.kind {
            MetricKind::Weight => self.unit.parse().ok(),
            MetricKind::BodyFat | MetricKind::MuscleMass => None,
        }
    }

    /// Label for values shown in `display`
    pub fn display_label(&self, display: WeightUnit) -> &str {
        match self.stored_weight_unit() {
            Some(_) => display.label(),
            None => &self.unit,
        }
    }

    /// Convert a stored value (reading, change or target) into `display`
    pub fn to_display(&self, value: f64, display: WeightUnit) -> f64 {
        match self.stored_weight_unit() {
            Some(stored) => display.from_lbs(stored.to_lbs(value)),
            None => value,
        }
    }

    /// Convert a value entered in `display` into the stored unit
    pub fn from_display(&self, value: f64, display: WeightUnit) -> f64 {
        match self.stored_weight_unit() {
            Some(stored) => stored.from_lbs(display.to_lbs(value)),
            None => value,
        }
    }
}

/// The three metric series of one user
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BodyMetrics {
    pub weight: BodyMetricSeries,
    pub body_fat: BodyMetricSeries,
    pub muscle_mass: BodyMetricSeries,
}

impl Default for BodyMetrics {
    fn default() -> Self {
        Self {
            weight: BodyMetricSeries::empty(MetricKind::Weight),
            body_fat: BodyMetricSeries::empty(MetricKind::BodyFat),
            muscle_mass: BodyMetricSeries::empty(MetricKind::MuscleMass),
        }
    }
}

impl BodyMetrics {
    pub fn series(&self, kind: MetricKind) -> &BodyMetricSeries {
        match kind {
            MetricKind::Weight => &self.weight,
            MetricKind::BodyFat => &self.body_fat,
            MetricKind::MuscleMass => &self.muscle_mass,
        }
    }

    pub fn series_mut(&mut self, kind: MetricKind) -> &mut BodyMetricSeries {
        match kind {
            MetricKind::Weight => &mut self.weight,
            MetricKind::BodyFat => &mut self.body_fat,
            MetricKind::MuscleMass => &mut self.muscle_mass,
        }
    }
}

// ============================================================================
// Dashboard Types
// ============================================================================

/// Summary cards that can be shown on the dashboard
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WidgetType {
    TotalWorkouts,
    TotalExercises,
    TotalSets,
    TotalVolume,
    FavoriteExercise,
    RecentWorkouts,
    PersonalRecords,
    BodyWeight,
    BodyFat,
    MuscleMass,
}

impl WidgetType {
    pub const ALL: [WidgetType; 10] = [
        WidgetType::TotalWorkouts,
        WidgetType::TotalExercises,
        WidgetType::TotalSets,
        WidgetType::TotalVolume,
        WidgetType::FavoriteExercise,
        WidgetType::RecentWorkouts,
        WidgetType::PersonalRecords,
        WidgetType::BodyWeight,
        WidgetType::BodyFat,
        WidgetType::MuscleMass,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WidgetType::TotalWorkouts => "total_workouts",
            WidgetType::TotalExercises => "total_exercises",
            WidgetType::TotalSets => "total_sets",
            WidgetType::TotalVolume => "total_volume",
            WidgetType::FavoriteExercise => "favorite_exercise",
            WidgetType::RecentWorkouts => "recent_workouts",
            WidgetType::PersonalRecords => "personal_records",
            WidgetType::BodyWeight => "body_weight",
            WidgetType::BodyFat => "body_fat",
            WidgetType::MuscleMass => "muscle_mass",
        }
    }
}

impl fmt::Display for WidgetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WidgetType {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let normalized = s.to_lowercase().replace('-', "_");
        WidgetType::ALL
            .into_iter()
            .find(|w| w.as_str() == normalized)
            .ok_or_else(|| crate::Error::Validation(format!("unknown widget '{}'", s)))
    }
}

/// Placement of one dashboard widget
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WidgetConfig {
    pub id: String,
    pub widget_type: WidgetType,
    pub position: i32,
    pub visible: bool,
}

// ============================================================================
// Session Types
// ============================================================================

/// An authenticated user of the hosted backend
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserSession {
    pub user_id: String,
    pub access_token: String,
}

/// Display unit for set weights
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WeightUnit {
    #[default]
    Kg,
    Lbs,
}

impl WeightUnit {
    /// Convert a canonical pound value into this unit
    pub fn from_lbs(self, lbs: f64) -> f64 {
        match self {
            WeightUnit::Kg => lbs_to_kg(lbs),
            WeightUnit::Lbs => lbs,
        }
    }

    /// Convert a value in this unit into canonical pounds
    pub fn to_lbs(self, value: f64) -> f64 {
        match self {
            WeightUnit::Kg => kg_to_lbs(value),
            WeightUnit::Lbs => value,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            WeightUnit::Kg => "kg",
            WeightUnit::Lbs => "lbs",
        }
    }
}

impl FromStr for WeightUnit {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_lowercase().as_str() {
            "kg" | "kgs" => Ok(WeightUnit::Kg),
            "lb" | "lbs" => Ok(WeightUnit::Lbs),
            other => Err(crate::Error::Validation(format!("unknown unit '{}'", other))),
        }
    }
}
