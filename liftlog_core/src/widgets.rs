//! Dashboard widget layout and per-widget summaries.

use crate::mutation::{no_reconcile, Coordinator, IdAliases, Intent, MutationOutcome};
use crate::notify::Notifier;
use crate::state::{Aggregates, StateContainer};
use crate::store::DataStore;
use crate::{stats, BodyMetrics, Error, MetricKind, Result, WeightUnit, WidgetConfig, WidgetType, Workout};
use once_cell::sync::Lazy;
use std::sync::Arc;

static DEFAULT_LAYOUT: Lazy<Vec<WidgetConfig>> = Lazy::new(|| {
    WidgetType::ALL
        .iter()
        .enumerate()
        .map(|(position, widget_type)| WidgetConfig {
            id: format!("default-{}", widget_type.as_str()),
            widget_type: *widget_type,
            position: position as i32,
            visible: true,
        })
        .collect()
});

/// Every widget, visible, in declaration order
pub fn default_layout() -> &'static [WidgetConfig] {
    &DEFAULT_LAYOUT
}

/// Keep one config per widget type (the last one listed) and order by position
pub fn normalize(widgets: Vec<WidgetConfig>) -> Vec<WidgetConfig> {
    let mut out: Vec<WidgetConfig> = Vec::with_capacity(widgets.len());
    for widget in widgets {
        match out.iter_mut().find(|w| w.widget_type == widget.widget_type) {
            Some(existing) => *existing = widget,
            None => out.push(widget),
        }
    }
    out.sort_by_key(|w| w.position);
    out
}

impl Aggregates for Vec<WidgetConfig> {
    /// The layout is saved as a whole, so it is a single aggregate
    type Key = ();
    type Part = Vec<WidgetConfig>;

    fn extract(&self, _key: &()) -> Vec<WidgetConfig> {
        self.clone()
    }

    fn restore(&mut self, _key: &(), part: Vec<WidgetConfig>) {
        *self = part;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// The dashboard layout of the active session
#[derive(Clone)]
pub struct Dashboard {
    coordinator: Arc<Coordinator<Vec<WidgetConfig>>>,
    store: Arc<dyn DataStore>,
}

impl Dashboard {
    pub fn new(
        initial: Vec<WidgetConfig>,
        store: Arc<dyn DataStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let state = Arc::new(StateContainer::new(normalize(initial)));
        Self {
            coordinator: Arc::new(Coordinator::new(state, notifier)),
            store,
        }
    }

    pub fn layout(&self) -> Arc<Vec<WidgetConfig>> {
        self.coordinator.state().current()
    }

    pub fn state(&self) -> &Arc<StateContainer<Vec<WidgetConfig>>> {
        self.coordinator.state()
    }

    /// Widgets to render, in order
    pub fn visible_widgets(&self) -> Vec<WidgetConfig> {
        self.layout().iter().filter(|w| w.visible).cloned().collect()
    }

    pub async fn reload(&self) -> Result<()> {
        let widgets = self.store.list_widgets().await?;
        tracing::info!("Loaded {} widgets from {} store", widgets.len(), self.store.name());
        self.state().replace(normalize(widgets));
        Ok(())
    }

    pub async fn toggle(&self, widget_type: WidgetType) -> MutationOutcome {
        self.edit("Widget updated", format!("Toggled {}", widget_type), move |layout| {
            let widget = find(layout, widget_type)?;
            widget.visible = !widget.visible;
            Ok(())
        })
        .await
    }

    pub async fn set_visible(&self, widget_type: WidgetType, visible: bool) -> MutationOutcome {
        let verb = if visible { "Showed" } else { "Hid" };
        self.edit("Widget updated", format!("{} {}", verb, widget_type), move |layout| {
            find(layout, widget_type)?.visible = visible;
            Ok(())
        })
        .await
    }

    /// Swap a widget's position with its neighbour
    pub async fn move_widget(&self, widget_type: WidgetType, direction: Direction) -> MutationOutcome {
        self.edit(
            "Widget moved",
            format!("Moved {} {:?}", widget_type, direction),
            move |layout| {
                let idx = layout
                    .iter()
                    .position(|w| w.widget_type == widget_type)
                    .ok_or_else(|| Error::not_found("widget", widget_type.to_string()))?;
                let neighbour = match direction {
                    Direction::Up => idx.checked_sub(1),
                    Direction::Down => Some(idx + 1).filter(|n| *n < layout.len()),
                }
                .ok_or_else(|| {
                    Error::Validation(format!("{} cannot move further {:?}", widget_type, direction))
                })?;

                let position = layout[idx].position;
                layout[idx].position = layout[neighbour].position;
                layout[neighbour].position = position;
                layout.swap(idx, neighbour);
                Ok(())
            },
        )
        .await
    }

    pub async fn reset(&self) -> MutationOutcome {
        self.edit("Dashboard reset", "Restored the default layout".to_string(), |layout| {
            *layout = default_layout().to_vec();
            Ok(())
        })
        .await
    }

    async fn edit<F>(&self, success_title: &'static str, description: String, f: F) -> MutationOutcome
    where
        F: FnOnce(&mut Vec<WidgetConfig>) -> Result<()> + Send,
    {
        let store = Arc::clone(&self.store);
        self.coordinator
            .run(
                Intent::new((), success_title, "Could not update dashboard", description),
                move |layout: &Vec<WidgetConfig>, _: &IdAliases| {
                    let mut next = layout.clone();
                    f(&mut next)?;
                    let next = normalize(next);
                    Ok((next.clone(), next))
                },
                move |layout: Vec<WidgetConfig>| async move { store.save_widgets(&layout).await },
                no_reconcile,
            )
            .await
    }
}

fn find(layout: &mut [WidgetConfig], widget_type: WidgetType) -> Result<&mut WidgetConfig> {
    layout
        .iter_mut()
        .find(|w| w.widget_type == widget_type)
        .ok_or_else(|| Error::not_found("widget", widget_type.to_string()))
}

fn metric_line(label: &str, metrics: &BodyMetrics, kind: MetricKind, unit: WeightUnit) -> String {
    let series = metrics.series(kind);
    match stats::latest_change(series) {
        None => format!("{}: no readings", label),
        Some((latest, change)) => {
            let mut line = format!(
                "{}: {:.1} {}",
                label,
                series.to_display(latest, unit),
                series.display_label(unit)
            );
            if let Some(change) = change {
                line.push_str(&format!(" ({:+.1})", series.to_display(change, unit)));
            }
            if let Some(progress) = stats::goal_progress(series) {
                line.push_str(&format!(", {:.0}% to goal", progress));
            }
            line
        }
    }
}

/// One-line summary of a widget
pub fn render(
    widget_type: WidgetType,
    workouts: &[Workout],
    metrics: &BodyMetrics,
    unit: WeightUnit,
) -> String {
    let summary = stats::summarize(workouts);
    match widget_type {
        WidgetType::TotalWorkouts => format!("Workouts: {}", summary.workouts),
        WidgetType::TotalExercises => format!("Exercises: {}", summary.exercises),
        WidgetType::TotalSets => format!("Sets: {}", summary.sets),
        WidgetType::TotalVolume => format!(
            "Volume: {:.0} {}",
            unit.from_lbs(summary.volume),
            unit.label()
        ),
        WidgetType::FavoriteExercise => match stats::most_frequent_exercise(workouts) {
            Some(name) => format!("Favorite exercise: {}", name),
            None => "Favorite exercise: none yet".to_string(),
        },
        WidgetType::RecentWorkouts => {
            let recent: Vec<String> = workouts
                .iter()
                .take(3)
                .map(|w| format!("{} {}", w.date, w.program))
                .collect();
            if recent.is_empty() {
                "Recent workouts: none".to_string()
            } else {
                format!("Recent workouts: {}", recent.join(", "))
            }
        }
        WidgetType::PersonalRecords => {
            let records = stats::personal_records(workouts);
            if records.is_empty() {
                "Personal records: none in latest sessions".to_string()
            } else {
                format!("Personal records: {}", records.join(", "))
            }
        }
        WidgetType::BodyWeight => metric_line("Body weight", metrics, MetricKind::Weight, unit),
        WidgetType::BodyFat => metric_line("Body fat", metrics, MetricKind::BodyFat, unit),
        WidgetType::MuscleMass => metric_line("Muscle mass", metrics, MetricKind::MuscleMass, unit),
    }
}
