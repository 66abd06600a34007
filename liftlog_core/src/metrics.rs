//! Body metrics log: optimistic CRUD over readings and goals.
//!
//! Each metric kind's series is one aggregate.

use crate::mutation::{no_reconcile, Coordinator, IdAliases, Intent, MutationOutcome};
use crate::notify::Notifier;
use crate::state::{Aggregates, StateContainer};
use crate::store::{DataStore, RemoteAck};
use crate::{local_id, BodyMetricSeries, BodyMetrics, Error, Goal, MetricEntry, MetricKind, Result};
use chrono::NaiveDate;
use std::sync::Arc;

impl Aggregates for BodyMetrics {
    type Key = MetricKind;
    type Part = BodyMetricSeries;

    fn extract(&self, key: &MetricKind) -> BodyMetricSeries {
        self.series(*key).clone()
    }

    fn restore(&mut self, key: &MetricKind, part: BodyMetricSeries) {
        *self.series_mut(*key) = part;
    }
}

fn validate_value(value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::Validation(format!(
            "metric value must be a non-negative number, got {}",
            value
        )));
    }
    Ok(())
}

/// Metric series of the active session
#[derive(Clone)]
pub struct MetricsLog {
    coordinator: Arc<Coordinator<BodyMetrics>>,
    store: Arc<dyn DataStore>,
}

impl MetricsLog {
    pub fn new(
        mut initial: BodyMetrics,
        store: Arc<dyn DataStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        for kind in MetricKind::ALL {
            initial.series_mut(kind).sort_entries();
        }
        let state = Arc::new(StateContainer::new(initial));
        Self {
            coordinator: Arc::new(Coordinator::new(state, notifier)),
            store,
        }
    }

    pub fn metrics(&self) -> Arc<BodyMetrics> {
        self.coordinator.state().current()
    }

    pub fn state(&self) -> &Arc<StateContainer<BodyMetrics>> {
        self.coordinator.state()
    }

    pub async fn reload(&self) -> Result<()> {
        let mut metrics = self.store.load_metrics().await?;
        for kind in MetricKind::ALL {
            metrics.series_mut(kind).sort_entries();
        }
        tracing::info!("Loaded body metrics from {} store", self.store.name());
        self.state().replace(metrics);
        Ok(())
    }

    /// Record a reading; a reading already present on `date` is replaced
    pub async fn add_entry(&self, kind: MetricKind, date: NaiveDate, value: f64) -> MutationOutcome {
        let store = Arc::clone(&self.store);
        let placeholder = local_id();
        let id = placeholder.clone();

        let outcome = self
            .coordinator
            .run(
                Intent::new(
                    kind,
                    "Measurement saved",
                    "Could not save measurement",
                    format!("{} {} on {}", kind, value, date),
                )
                .creating(placeholder),
                move |metrics: &BodyMetrics, _: &IdAliases| {
                    validate_value(value)?;
                    let mut next = metrics.clone();
                    let series = next.series_mut(kind);
                    let entry = match series.entries.iter_mut().find(|e| e.date == date) {
                        Some(existing) => {
                            existing.value = value;
                            existing.clone()
                        }
                        None => {
                            let entry = MetricEntry { id, date, value };
                            series.entries.push(entry.clone());
                            entry
                        }
                    };
                    series.sort_entries();
                    Ok((next, entry))
                },
                move |entry: MetricEntry| async move {
                    store.upsert_metric_entry(kind, &entry).await
                },
                // Readings are unique per date, so the date identifies the entry
                move |metrics: &mut BodyMetrics, ack: &RemoteAck| {
                    if let Some(assigned) = &ack.id {
                        if let Some(entry) = metrics
                            .series_mut(kind)
                            .entries
                            .iter_mut()
                            .find(|e| e.date == date)
                        {
                            entry.id = assigned.clone();
                        }
                    }
                },
            )
            .await;

        match outcome {
            // A replaced reading keeps its earlier id rather than the placeholder
            MutationOutcome::Committed { .. } => MutationOutcome::Committed {
                id: self
                    .metrics()
                    .series(kind)
                    .entries
                    .iter()
                    .find(|e| e.date == date)
                    .map(|e| e.id.clone()),
            },
            other => other,
        }
    }

    pub async fn update_entry(
        &self,
        kind: MetricKind,
        entry_id: &str,
        date: Option<NaiveDate>,
        value: Option<f64>,
    ) -> MutationOutcome {
        let store = Arc::clone(&self.store);
        let entry_id = entry_id.to_string();

        self.coordinator
            .run(
                Intent::new(
                    kind,
                    "Measurement updated",
                    "Could not update measurement",
                    format!("{} entry {}", kind, entry_id),
                ),
                move |metrics: &BodyMetrics, aliases: &IdAliases| {
                    let entry_id = aliases.resolve(&entry_id);
                    let mut next = metrics.clone();
                    let series = next.series_mut(kind);
                    if let Some(date) = date {
                        if series.entries.iter().any(|e| e.date == date && e.id != entry_id) {
                            return Err(Error::Validation(format!(
                                "a {} reading already exists on {}",
                                kind, date
                            )));
                        }
                    }
                    let entry = series
                        .entries
                        .iter_mut()
                        .find(|e| e.id == entry_id)
                        .ok_or_else(|| Error::not_found("metric entry", entry_id.clone()))?;
                    if let Some(value) = value {
                        validate_value(value)?;
                        entry.value = value;
                    }
                    if let Some(date) = date {
                        entry.date = date;
                    }
                    let updated = entry.clone();
                    series.sort_entries();
                    Ok((next, updated))
                },
                move |entry: MetricEntry| async move {
                    store.update_metric_entry(kind, &entry).await
                },
                no_reconcile,
            )
            .await
    }

    pub async fn delete_entry(&self, kind: MetricKind, entry_id: &str) -> MutationOutcome {
        let store = Arc::clone(&self.store);
        let entry_id = entry_id.to_string();

        self.coordinator
            .run(
                Intent::new(
                    kind,
                    "Measurement deleted",
                    "Could not delete measurement",
                    format!("{} entry {}", kind, entry_id),
                ),
                move |metrics: &BodyMetrics, aliases: &IdAliases| {
                    let entry_id = aliases.resolve(&entry_id);
                    let mut next = metrics.clone();
                    let series = next.series_mut(kind);
                    if !series.entries.iter().any(|e| e.id == entry_id) {
                        return Err(Error::not_found("metric entry", entry_id));
                    }
                    series.entries.retain(|e| e.id != entry_id);
                    Ok((next, entry_id))
                },
                move |entry_id: String| async move {
                    store.delete_metric_entry(kind, &entry_id).await
                },
                no_reconcile,
            )
            .await
    }

    pub async fn set_goal(
        &self,
        kind: MetricKind,
        target: f64,
        deadline: Option<NaiveDate>,
    ) -> MutationOutcome {
        let store = Arc::clone(&self.store);

        self.coordinator
            .run(
                Intent::new(
                    kind,
                    "Goal saved",
                    "Could not save goal",
                    format!("{} target {}", kind, target),
                ),
                move |metrics: &BodyMetrics, _: &IdAliases| {
                    validate_value(target)?;
                    let goal = Goal { target, deadline };
                    let mut next = metrics.clone();
                    next.series_mut(kind).goal = Some(goal.clone());
                    Ok((next, goal))
                },
                move |goal: Goal| async move { store.upsert_goal(kind, &goal).await },
                no_reconcile,
            )
            .await
    }

    pub async fn clear_goal(&self, kind: MetricKind) -> MutationOutcome {
        let store = Arc::clone(&self.store);

        self.coordinator
            .run(
                Intent::new(
                    kind,
                    "Goal removed",
                    "Could not remove goal",
                    format!("{} goal", kind),
                ),
                move |metrics: &BodyMetrics, _: &IdAliases| {
                    if metrics.series(kind).goal.is_none() {
                        return Err(Error::not_found("goal", kind.to_string()));
                    }
                    let mut next = metrics.clone();
                    next.series_mut(kind).goal = None;
                    Ok((next, ()))
                },
                move |()| async move { store.delete_goal(kind).await },
                no_reconcile,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ChannelNotifier;
    use crate::test_support::{Mode, ScriptedStore};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, d).unwrap()
    }

    fn entry(id: &str, d: u32, value: f64) -> MetricEntry {
        MetricEntry {
            id: id.into(),
            date: day(d),
            value,
        }
    }

    fn log_with(mode: Mode) -> (MetricsLog, Arc<ScriptedStore>) {
        crate::logging::init_test();
        let (notifier, _rx) = ChannelNotifier::new();
        let store = Arc::new(ScriptedStore::new(mode));
        let mut initial = BodyMetrics::default();
        initial.weight.entries = vec![entry("w1", 1, 100.0), entry("w2", 8, 97.0)];
        initial.weight.goal = Some(Goal {
            target: 90.0,
            deadline: None,
        });
        (MetricsLog::new(initial, store.clone(), Arc::new(notifier)), store)
    }

    fn dates(series: &BodyMetricSeries) -> Vec<NaiveDate> {
        series.entries.iter().map(|e| e.date).collect()
    }

    #[tokio::test]
    async fn test_entries_stay_sorted_by_date() {
        let (log, _store) = log_with(Mode::Accept);
        assert!(log.add_entry(MetricKind::Weight, day(4), 98.5).await.is_committed());
        assert!(log.add_entry(MetricKind::Weight, day(12), 96.0).await.is_committed());
        assert!(log
            .update_entry(MetricKind::Weight, "w1", Some(day(10)), None)
            .await
            .is_committed());

        let metrics = log.metrics();
        assert_eq!(dates(&metrics.weight), vec![day(4), day(8), day(10), day(12)]);
    }

    #[tokio::test]
    async fn test_same_date_reading_is_replaced() {
        let (log, _store) = log_with(Mode::Accept);
        assert!(log.add_entry(MetricKind::Weight, day(8), 96.5).await.is_committed());

        let metrics = log.metrics();
        assert_eq!(metrics.weight.entries.len(), 2);
        assert_eq!(metrics.weight.entries[1].id, "w2");
        assert_eq!(metrics.weight.entries[1].value, 96.5);
    }

    #[tokio::test]
    async fn test_same_date_reading_reports_the_kept_id() {
        let (log, _store) = log_with(Mode::Accept);
        let outcome = log.add_entry(MetricKind::Weight, day(8), 96.5).await;
        assert_eq!(outcome.id(), Some("w2"));

        let reported = outcome.id().unwrap().to_string();
        assert!(log.metrics().weight.entries.iter().any(|e| e.id == reported));
        assert!(log.delete_entry(MetricKind::Weight, &reported).await.is_committed());
        assert_eq!(dates(&log.metrics().weight), vec![day(1)]);
    }

    #[tokio::test]
    async fn test_new_reading_reports_its_placeholder_without_server_ids() {
        let (log, _store) = log_with(Mode::Accept);
        let outcome = log.add_entry(MetricKind::Weight, day(15), 95.0).await;
        let reported = outcome.id().expect("created id").to_string();
        assert!(crate::is_local_id(&reported));
        assert!(log.metrics().weight.entries.iter().any(|e| e.id == reported));
    }

    #[tokio::test]
    async fn test_reconcile_matches_entry_by_date() {
        let (log, _store) = log_with(Mode::AssignIds);
        let outcome = log.add_entry(MetricKind::Weight, day(15), 95.0).await;
        assert_eq!(outcome.id(), Some("srv-1"));

        let metrics = log.metrics();
        let ids: Vec<_> = metrics.weight.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["w1", "w2", "srv-1"]);
    }

    #[tokio::test]
    async fn test_every_mutation_rolls_back_on_failure() {
        let (log, _store) = log_with(Mode::Fail);
        let before = log.metrics();

        let outcomes = vec![
            log.add_entry(MetricKind::Weight, day(20), 94.0).await,
            log.add_entry(MetricKind::BodyFat, day(20), 18.0).await,
            log.update_entry(MetricKind::Weight, "w2", None, Some(96.0)).await,
            log.delete_entry(MetricKind::Weight, "w1").await,
            log.set_goal(MetricKind::MuscleMass, 42.0, Some(day(30))).await,
            log.clear_goal(MetricKind::Weight).await,
        ];

        for outcome in outcomes {
            assert!(matches!(outcome, MutationOutcome::RolledBack { .. }), "{:?}", outcome);
        }
        assert_eq!(*log.metrics(), *before);
    }

    #[tokio::test]
    async fn test_invalid_requests_are_rejected() {
        let (log, store) = log_with(Mode::Accept);

        let outcome = log.clear_goal(MetricKind::BodyFat).await;
        assert!(matches!(outcome, MutationOutcome::Rejected { .. }));
        let outcome = log.add_entry(MetricKind::Weight, day(3), f64::NAN).await;
        assert!(matches!(outcome, MutationOutcome::Rejected { .. }));
        let outcome = log.update_entry(MetricKind::Weight, "w1", Some(day(8)), None).await;
        assert!(matches!(outcome, MutationOutcome::Rejected { .. }));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_goal_set_and_clear() {
        let (log, store) = log_with(Mode::Accept);
        assert!(log.set_goal(MetricKind::BodyFat, 15.0, Some(day(30))).await.is_committed());
        assert_eq!(log.metrics().body_fat.goal.as_ref().map(|g| g.target), Some(15.0));

        assert!(log.clear_goal(MetricKind::BodyFat).await.is_committed());
        assert!(log.metrics().body_fat.goal.is_none());
        assert_eq!(store.calls(), vec!["upsert_goal", "delete_goal"]);
    }
}
