//! Entry point tying a session to its store and collections.

use crate::config::Config;
use crate::metrics::MetricsLog;
use crate::notify::Notifier;
use crate::session::{select_store, SessionProvider};
use crate::store::DataStore;
use crate::widgets::{self, Dashboard};
use crate::workouts::WorkoutLog;
use crate::{Result, WeightUnit, WidgetType};
use std::sync::Arc;

/// The three collections of one session, all backed by the same store
pub struct Tracker {
    store: Arc<dyn DataStore>,
    workouts: WorkoutLog,
    metrics: MetricsLog,
    dashboard: Dashboard,
    unit: WeightUnit,
}

impl Tracker {
    /// Select the store for the current session and load every collection
    pub async fn open(
        config: &Config,
        sessions: &dyn SessionProvider,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let store = select_store(config, sessions.current())?;
        let mut tracker = Self::with_store(store, notifier).await?;
        tracker.unit = config.display.weight_unit;
        Ok(tracker)
    }

    /// Load every collection from an already chosen store
    pub async fn with_store(store: Arc<dyn DataStore>, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let (workouts, metrics, layout) = tokio::try_join!(
            store.list_workouts(),
            store.load_metrics(),
            store.list_widgets()
        )?;
        tracing::info!(
            "Opened {} store: {} workouts, {} widgets",
            store.name(),
            workouts.len(),
            layout.len()
        );

        Ok(Self {
            workouts: WorkoutLog::new(workouts, Arc::clone(&store), Arc::clone(&notifier)),
            metrics: MetricsLog::new(metrics, Arc::clone(&store), Arc::clone(&notifier)),
            dashboard: Dashboard::new(layout, Arc::clone(&store), notifier),
            store,
            unit: WeightUnit::default(),
        })
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    pub fn workouts(&self) -> &WorkoutLog {
        &self.workouts
    }

    pub fn metrics(&self) -> &MetricsLog {
        &self.metrics
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    pub fn weight_unit(&self) -> WeightUnit {
        self.unit
    }

    /// Render every visible widget from the current collections
    pub fn dashboard_lines(&self) -> Vec<(WidgetType, String)> {
        let workouts = self.workouts.workouts();
        let metrics = self.metrics.metrics();
        self.dashboard
            .visible_widgets()
            .into_iter()
            .map(|w| {
                let line = widgets::render(w.widget_type, &workouts, &metrics, self.unit);
                (w.widget_type, line)
            })
            .collect()
    }
}
