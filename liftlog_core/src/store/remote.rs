//! Hosted backend client speaking the PostgREST table protocol.
//!
//! Tables: `workouts`, `exercises`, `sets`, `body_metrics`, `goals` and
//! `widget_configs`. Top-level rows carry the session's `user_id`; children
//! reference their parent by id. Ids are always assigned by the server.

use super::{DataStore, RemoteAck};
use crate::{
    widgets, BodyMetrics, Error, Exercise, Goal, MetricEntry, MetricKind, Result, UserSession,
    WidgetConfig, WidgetType, Workout, WorkoutSet,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

const BODY_PREVIEW_LIMIT: usize = 256;
const WORKOUT_SELECT: &str = "id,date,program,phase,exercises(id,name,sets(id,reps,weight))";

fn preview_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }
    let mut out: String = trimmed.chars().take(BODY_PREVIEW_LIMIT).collect();
    if trimmed.chars().count() > BODY_PREVIEW_LIMIT {
        out.push_str("...");
    }
    out
}

/// Accept both text and numeric primary keys
fn de_id<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("unexpected id {}", other))),
    }
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{}", value)
}

// ============================================================================
// Rows
// ============================================================================

#[derive(Deserialize)]
struct IdRow {
    #[serde(deserialize_with = "de_id")]
    id: String,
}

#[derive(Deserialize)]
struct SetRow {
    #[serde(deserialize_with = "de_id")]
    id: String,
    reps: u32,
    weight: f64,
}

#[derive(Deserialize)]
struct ExerciseRow {
    #[serde(deserialize_with = "de_id")]
    id: String,
    name: String,
    #[serde(default)]
    sets: Vec<SetRow>,
}

#[derive(Deserialize)]
struct WorkoutRow {
    #[serde(deserialize_with = "de_id")]
    id: String,
    date: NaiveDate,
    #[serde(default)]
    program: Option<String>,
    #[serde(default)]
    phase: Option<String>,
    #[serde(default)]
    exercises: Vec<ExerciseRow>,
}

impl From<WorkoutRow> for Workout {
    fn from(row: WorkoutRow) -> Self {
        Workout {
            id: row.id,
            date: row.date,
            program: row.program.unwrap_or_default(),
            phase: row.phase.unwrap_or_default(),
            exercises: row
                .exercises
                .into_iter()
                .map(|e| Exercise {
                    id: e.id,
                    name: e.name,
                    sets: e
                        .sets
                        .into_iter()
                        .map(|s| WorkoutSet {
                            id: s.id,
                            reps: s.reps,
                            weight: s.weight,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct MetricRow {
    #[serde(deserialize_with = "de_id")]
    id: String,
    kind: String,
    date: NaiveDate,
    value: f64,
}

#[derive(Deserialize)]
struct GoalRow {
    kind: String,
    target: f64,
    #[serde(default)]
    deadline: Option<NaiveDate>,
}

#[derive(Deserialize)]
struct WidgetRow {
    #[serde(deserialize_with = "de_id")]
    id: String,
    widget_type: String,
    position: i32,
    visible: bool,
}

#[derive(Serialize)]
struct NewSetRow<'a> {
    exercise_id: &'a str,
    reps: u32,
    weight: f64,
}

// ============================================================================
// Client
// ============================================================================

/// Store backed by the hosted REST API, scoped to one signed-in user
pub struct RestStore {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    session: UserSession,
}

impl RestStore {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        session: UserSession,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            session,
        })
    }

    pub fn session(&self) -> &UserSession {
        &self.session
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/rest/v1/{}", self.base_url, table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.session.access_token)
    }

    /// Send and return the body of a successful response
    async fn send(&self, req: RequestBuilder, what: &str) -> Result<String> {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            tracing::warn!("{} failed with {}", what, status);
            return Err(Error::Remote(format!(
                "{} failed with status {}: {}",
                what,
                status.as_u16(),
                preview_body(&body)
            )));
        }
        tracing::debug!("{} -> {}", what, status);
        Ok(body)
    }

    async fn send_rows<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<Vec<T>> {
        let body = self.send(req, what).await?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<T>> {
        let req = self.request(Method::GET, table).query(query);
        self.send_rows(req, &format!("select from {}", table)).await
    }

    async fn insert<B: Serialize + ?Sized>(&self, table: &str, body: &B) -> Result<Vec<IdRow>> {
        let req = self
            .request(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(body);
        self.send_rows(req, &format!("insert into {}", table)).await
    }

    async fn upsert<B: Serialize + ?Sized>(
        &self,
        table: &str,
        on_conflict: &str,
        body: &B,
    ) -> Result<Vec<IdRow>> {
        let req = self
            .request(Method::POST, table)
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(body);
        self.send_rows(req, &format!("upsert into {}", table)).await
    }

    /// Patch rows matching `filter`; no matching row is a not-found error
    async fn update(
        &self,
        table: &str,
        entity: &'static str,
        filter: &[(&str, String)],
        body: Value,
    ) -> Result<()> {
        let req = self
            .request(Method::PATCH, table)
            .query(filter)
            .header("Prefer", "return=representation")
            .json(&body);
        let rows: Vec<IdRow> = self.send_rows(req, &format!("update {}", table)).await?;
        if rows.is_empty() {
            let id = filter.first().map(|(_, v)| v.trim_start_matches("eq.")).unwrap_or_default();
            return Err(Error::not_found(entity, id));
        }
        Ok(())
    }

    async fn delete(&self, table: &str, filter: &[(&str, String)]) -> Result<()> {
        let req = self.request(Method::DELETE, table).query(filter);
        self.send(req, &format!("delete from {}", table)).await?;
        Ok(())
    }

    /// Remove rows created earlier in a nested insert that later failed
    ///
    /// Returns the original error. A failing cleanup is only logged.
    async fn discard(&self, table: &str, ids: &[String], cause: Error) -> Error {
        if ids.is_empty() {
            return cause;
        }
        let filter = [("id", format!("in.({})", ids.join(",")))];
        match self.delete(table, &filter).await {
            Ok(()) => tracing::info!("Removed {} partial row(s) from {}", ids.len(), table),
            Err(e) => tracing::error!("Could not remove partial rows from {}: {}", table, e),
        }
        cause
    }

    fn single_id(rows: Vec<IdRow>, table: &str) -> Result<String> {
        rows.into_iter()
            .next()
            .map(|row| row.id)
            .ok_or_else(|| Error::Remote(format!("insert into {} returned no rows", table)))
    }

    /// Bulk-insert sets for already-stored exercises, mapping placeholders to ids
    async fn insert_sets(&self, sets: &[(String, &WorkoutSet)], mut ack: RemoteAck) -> Result<RemoteAck> {
        if sets.is_empty() {
            return Ok(ack);
        }
        let rows: Vec<NewSetRow<'_>> = sets
            .iter()
            .map(|(exercise_id, set)| NewSetRow {
                exercise_id: exercise_id.as_str(),
                reps: set.reps,
                weight: set.weight,
            })
            .collect();
        let ids = self.insert("sets", &rows).await?;
        if ids.len() != sets.len() {
            let err = Error::Remote(format!(
                "insert into sets returned {} rows for {} sets",
                ids.len(),
                sets.len()
            ));
            let stored: Vec<String> = ids.into_iter().map(|row| row.id).collect();
            return Err(self.discard("sets", &stored, err).await);
        }
        for ((_, set), row) in sets.iter().zip(ids) {
            ack = ack.with_nested(&set.id, row.id);
        }
        Ok(ack)
    }

    /// Insert exercises (and their sets) under a stored workout
    async fn insert_exercises(
        &self,
        workout_id: &str,
        exercises: &[Exercise],
        mut ack: RemoteAck,
    ) -> Result<RemoteAck> {
        if exercises.is_empty() {
            return Ok(ack);
        }
        let rows: Vec<Value> = exercises
            .iter()
            .map(|e| json!({ "workout_id": workout_id, "name": e.name }))
            .collect();
        let ids: Vec<String> = self
            .insert("exercises", &rows)
            .await?
            .into_iter()
            .map(|row| row.id)
            .collect();
        if ids.len() != exercises.len() {
            let err = Error::Remote(format!(
                "insert into exercises returned {} rows for {} exercises",
                ids.len(),
                exercises.len()
            ));
            return Err(self.discard("exercises", &ids, err).await);
        }

        let mut sets = Vec::new();
        for (exercise, id) in exercises.iter().zip(&ids) {
            sets.extend(exercise.sets.iter().map(|s| (id.clone(), s)));
            ack = ack.with_nested(&exercise.id, id.as_str());
        }
        match self.insert_sets(&sets, ack).await {
            Ok(ack) => Ok(ack),
            Err(e) => Err(self.discard("exercises", &ids, e).await),
        }
    }
}

#[async_trait]
impl DataStore for RestStore {
    fn name(&self) -> &str {
        "remote"
    }

    async fn list_workouts(&self) -> Result<Vec<Workout>> {
        let rows: Vec<WorkoutRow> = self
            .select(
                "workouts",
                &[
                    ("select", WORKOUT_SELECT.to_string()),
                    ("user_id", eq(&self.session.user_id)),
                    ("order", "date.desc".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().map(Workout::from).collect())
    }

    async fn insert_workout(&self, workout: &Workout) -> Result<RemoteAck> {
        let body = json!({
            "user_id": self.session.user_id,
            "date": workout.date,
            "program": workout.program,
            "phase": workout.phase,
        });
        let id = Self::single_id(self.insert("workouts", &body).await?, "workouts")?;
        tracing::info!("Stored workout {} as {}", workout.id, id);
        match self
            .insert_exercises(&id, &workout.exercises, RemoteAck::created(id.clone()))
            .await
        {
            Ok(ack) => Ok(ack),
            // Leave no half-stored workout behind for the next listing
            Err(e) => Err(self.discard("workouts", std::slice::from_ref(&id), e).await),
        }
    }

    async fn update_workout(&self, workout: &Workout) -> Result<RemoteAck> {
        let body = json!({
            "date": workout.date,
            "program": workout.program,
            "phase": workout.phase,
        });
        self.update("workouts", "workout", &[("id", eq(&workout.id))], body)
            .await?;
        Ok(RemoteAck::ok())
    }

    async fn delete_workout(&self, workout_id: &str) -> Result<RemoteAck> {
        self.delete("workouts", &[("id", eq(workout_id))]).await?;
        Ok(RemoteAck::ok())
    }

    async fn insert_exercise(&self, workout_id: &str, exercise: &Exercise) -> Result<RemoteAck> {
        let mut ack = self
            .insert_exercises(workout_id, std::slice::from_ref(exercise), RemoteAck::ok())
            .await?;
        ack.id = ack.nested.remove(&exercise.id);
        Ok(ack)
    }

    async fn update_exercise(&self, workout_id: &str, exercise: &Exercise) -> Result<RemoteAck> {
        self.update(
            "exercises",
            "exercise",
            &[("id", eq(&exercise.id)), ("workout_id", eq(workout_id))],
            json!({ "name": exercise.name }),
        )
        .await?;
        Ok(RemoteAck::ok())
    }

    async fn delete_exercise(&self, workout_id: &str, exercise_id: &str) -> Result<RemoteAck> {
        self.delete(
            "exercises",
            &[("id", eq(exercise_id)), ("workout_id", eq(workout_id))],
        )
        .await?;
        Ok(RemoteAck::ok())
    }

    async fn insert_set(
        &self,
        _workout_id: &str,
        exercise_id: &str,
        set: &WorkoutSet,
    ) -> Result<RemoteAck> {
        let mut ack = self
            .insert_sets(&[(exercise_id.to_string(), set)], RemoteAck::ok())
            .await?;
        ack.id = ack.nested.remove(&set.id);
        Ok(ack)
    }

    async fn update_set(
        &self,
        _workout_id: &str,
        exercise_id: &str,
        set: &WorkoutSet,
    ) -> Result<RemoteAck> {
        self.update(
            "sets",
            "set",
            &[("id", eq(&set.id)), ("exercise_id", eq(exercise_id))],
            json!({ "reps": set.reps, "weight": set.weight }),
        )
        .await?;
        Ok(RemoteAck::ok())
    }

    async fn delete_set(
        &self,
        _workout_id: &str,
        exercise_id: &str,
        set_id: &str,
    ) -> Result<RemoteAck> {
        self.delete("sets", &[("id", eq(set_id)), ("exercise_id", eq(exercise_id))])
            .await?;
        Ok(RemoteAck::ok())
    }

    async fn load_metrics(&self) -> Result<BodyMetrics> {
        let user = [("user_id", eq(&self.session.user_id))];
        let entries: Vec<MetricRow> = self
            .select(
                "body_metrics",
                &[
                    ("user_id", eq(&self.session.user_id)),
                    ("order", "date.asc".to_string()),
                ],
            )
            .await?;
        let goals: Vec<GoalRow> = self.select("goals", &user).await?;

        let mut metrics = BodyMetrics::default();
        for row in entries {
            match row.kind.parse::<MetricKind>() {
                Ok(kind) => metrics.series_mut(kind).entries.push(MetricEntry {
                    id: row.id,
                    date: row.date,
                    value: row.value,
                }),
                Err(_) => tracing::warn!("Skipping metric row {} of unknown kind '{}'", row.id, row.kind),
            }
        }
        for row in goals {
            match row.kind.parse::<MetricKind>() {
                Ok(kind) => {
                    metrics.series_mut(kind).goal = Some(Goal {
                        target: row.target,
                        deadline: row.deadline,
                    })
                }
                Err(_) => tracing::warn!("Skipping goal of unknown kind '{}'", row.kind),
            }
        }
        for kind in MetricKind::ALL {
            metrics.series_mut(kind).sort_entries();
        }
        Ok(metrics)
    }

    async fn upsert_metric_entry(&self, kind: MetricKind, entry: &MetricEntry) -> Result<RemoteAck> {
        let body = json!({
            "user_id": self.session.user_id,
            "kind": kind.as_str(),
            "date": entry.date,
            "value": entry.value,
        });
        let rows = self.upsert("body_metrics", "user_id,kind,date", &body).await?;
        Ok(RemoteAck::created(Self::single_id(rows, "body_metrics")?))
    }

    async fn update_metric_entry(&self, kind: MetricKind, entry: &MetricEntry) -> Result<RemoteAck> {
        self.update(
            "body_metrics",
            "metric entry",
            &[("id", eq(&entry.id)), ("kind", eq(kind.as_str()))],
            json!({ "date": entry.date, "value": entry.value }),
        )
        .await?;
        Ok(RemoteAck::ok())
    }

    async fn delete_metric_entry(&self, kind: MetricKind, entry_id: &str) -> Result<RemoteAck> {
        self.delete(
            "body_metrics",
            &[("id", eq(entry_id)), ("kind", eq(kind.as_str()))],
        )
        .await?;
        Ok(RemoteAck::ok())
    }

    async fn upsert_goal(&self, kind: MetricKind, goal: &Goal) -> Result<RemoteAck> {
        let body = json!({
            "user_id": self.session.user_id,
            "kind": kind.as_str(),
            "target": goal.target,
            "deadline": goal.deadline,
        });
        self.upsert("goals", "user_id,kind", &body).await?;
        Ok(RemoteAck::ok())
    }

    async fn delete_goal(&self, kind: MetricKind) -> Result<RemoteAck> {
        self.delete(
            "goals",
            &[("user_id", eq(&self.session.user_id)), ("kind", eq(kind.as_str()))],
        )
        .await?;
        Ok(RemoteAck::ok())
    }

    async fn list_widgets(&self) -> Result<Vec<WidgetConfig>> {
        let rows: Vec<WidgetRow> = self
            .select(
                "widget_configs",
                &[
                    ("user_id", eq(&self.session.user_id)),
                    ("order", "position.asc".to_string()),
                ],
            )
            .await?;
        if rows.is_empty() {
            return Ok(widgets::default_layout().to_vec());
        }

        let mut layout = Vec::with_capacity(rows.len());
        for row in rows {
            match row.widget_type.parse::<WidgetType>() {
                Ok(widget_type) => layout.push(WidgetConfig {
                    id: row.id,
                    widget_type,
                    position: row.position,
                    visible: row.visible,
                }),
                Err(_) => tracing::warn!("Skipping unknown widget type '{}'", row.widget_type),
            }
        }
        Ok(layout)
    }

    async fn save_widgets(&self, layout: &[WidgetConfig]) -> Result<RemoteAck> {
        let rows: Vec<Value> = layout
            .iter()
            .map(|w| {
                json!({
                    "user_id": self.session.user_id,
                    "widget_type": w.widget_type.as_str(),
                    "position": w.position,
                    "visible": w.visible,
                })
            })
            .collect();
        self.upsert("widget_configs", "user_id,widget_type", &rows).await?;
        Ok(RemoteAck::ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn session() -> UserSession {
        UserSession {
            user_id: "user-1".into(),
            access_token: "token-abc".into(),
        }
    }

    fn client(server: &Server) -> RestStore {
        RestStore::new(&server.url(), "anon-key", session(), Duration::from_millis(2_000)).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_preview_body() {
        assert_eq!(preview_body("  "), "<empty body>");
        let long = "x".repeat(BODY_PREVIEW_LIMIT + 5);
        assert!(preview_body(&long).ends_with("..."));
    }

    #[tokio::test]
    async fn test_list_workouts_uses_nested_select() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/rest/v1/workouts")
            .match_header("apikey", "anon-key")
            .match_header("authorization", "Bearer token-abc")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("select".into(), WORKOUT_SELECT.into()),
                Matcher::UrlEncoded("user_id".into(), "eq.user-1".into()),
                Matcher::UrlEncoded("order".into(), "date.desc".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"id":7,"date":"2024-03-05","program":"Base","phase":null,
                    "exercises":[{"id":"e1","name":"Squat","sets":[{"id":"s1","reps":5,"weight":225.0}]}]}]"#,
            )
            .create_async()
            .await;

        let workouts = client(&server).list_workouts().await.unwrap();
        m.assert_async().await;
        assert_eq!(workouts.len(), 1);
        assert_eq!(workouts[0].id, "7");
        assert_eq!(workouts[0].phase, "");
        assert_eq!(workouts[0].exercises[0].sets[0].weight, 225.0);
    }

    #[tokio::test]
    async fn test_insert_workout_maps_nested_ids() {
        let mut server = Server::new_async().await;
        let workout_mock = server
            .mock("POST", "/rest/v1/workouts")
            .match_header("prefer", "return=representation")
            .match_body(Matcher::PartialJson(json!({"user_id": "user-1", "program": "Base"})))
            .with_status(201)
            .with_body(r#"[{"id":"w-100"}]"#)
            .create_async()
            .await;
        let exercise_mock = server
            .mock("POST", "/rest/v1/exercises")
            .match_body(Matcher::Json(json!([{"workout_id": "w-100", "name": "Squat"}])))
            .with_status(201)
            .with_body(r#"[{"id":"e-100"}]"#)
            .create_async()
            .await;
        let set_mock = server
            .mock("POST", "/rest/v1/sets")
            .match_body(Matcher::Json(json!([
                {"exercise_id": "e-100", "reps": 5, "weight": 185.0},
                {"exercise_id": "e-100", "reps": 3, "weight": 205.0}
            ])))
            .with_status(201)
            .with_body(r#"[{"id":"s-1"},{"id":"s-2"}]"#)
            .create_async()
            .await;

        let workout = Workout {
            id: "local-w".into(),
            date: day(5),
            program: "Base".into(),
            phase: "Week 1".into(),
            exercises: vec![Exercise {
                id: "local-e".into(),
                name: "Squat".into(),
                sets: vec![
                    WorkoutSet { id: "local-s1".into(), reps: 5, weight: 185.0 },
                    WorkoutSet { id: "local-s2".into(), reps: 3, weight: 205.0 },
                ],
            }],
        };
        let ack = client(&server).insert_workout(&workout).await.unwrap();

        workout_mock.assert_async().await;
        exercise_mock.assert_async().await;
        set_mock.assert_async().await;
        assert_eq!(ack.id.as_deref(), Some("w-100"));
        assert_eq!(ack.assigned("local-e"), "e-100");
        assert_eq!(ack.assigned("local-s2"), "s-2");
    }

    fn squat_workout() -> Workout {
        Workout {
            id: "local-w".into(),
            date: day(6),
            program: "Base".into(),
            phase: String::new(),
            exercises: vec![Exercise {
                id: "local-e".into(),
                name: "Squat".into(),
                sets: vec![WorkoutSet { id: "local-s".into(), reps: 5, weight: 185.0 }],
            }],
        }
    }

    #[tokio::test]
    async fn test_failed_exercise_insert_removes_the_workout_row() {
        let mut server = Server::new_async().await;
        let workout_mock = server
            .mock("POST", "/rest/v1/workouts")
            .with_status(201)
            .with_body(r#"[{"id":"w-1"}]"#)
            .create_async()
            .await;
        let _exercises = server
            .mock("POST", "/rest/v1/exercises")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;
        let cleanup = server
            .mock("DELETE", "/rest/v1/workouts")
            .match_query(Matcher::UrlEncoded("id".into(), "in.(w-1)".into()))
            .with_status(204)
            .expect(1)
            .create_async()
            .await;

        let err = client(&server).insert_workout(&squat_workout()).await.unwrap_err();
        workout_mock.assert_async().await;
        cleanup.assert_async().await;
        match err {
            Error::Remote(msg) => assert!(msg.contains("insert into exercises failed with status 500")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_set_insert_removes_exercises_and_workout() {
        let mut server = Server::new_async().await;
        let _workouts = server
            .mock("POST", "/rest/v1/workouts")
            .with_status(201)
            .with_body(r#"[{"id":"w-2"}]"#)
            .create_async()
            .await;
        let _exercises = server
            .mock("POST", "/rest/v1/exercises")
            .with_status(201)
            .with_body(r#"[{"id":"e-2"}]"#)
            .create_async()
            .await;
        let _sets = server
            .mock("POST", "/rest/v1/sets")
            .with_status(409)
            .with_body("conflict")
            .create_async()
            .await;
        let exercise_cleanup = server
            .mock("DELETE", "/rest/v1/exercises")
            .match_query(Matcher::UrlEncoded("id".into(), "in.(e-2)".into()))
            .with_status(204)
            .expect(1)
            .create_async()
            .await;
        let workout_cleanup = server
            .mock("DELETE", "/rest/v1/workouts")
            .match_query(Matcher::UrlEncoded("id".into(), "in.(w-2)".into()))
            .with_status(204)
            .expect(1)
            .create_async()
            .await;

        let err = client(&server).insert_workout(&squat_workout()).await.unwrap_err();
        exercise_cleanup.assert_async().await;
        workout_cleanup.assert_async().await;
        assert!(matches!(err, Error::Remote(msg) if msg.contains("409")));
    }

    #[tokio::test]
    async fn test_error_status_becomes_remote_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("DELETE", "/rest/v1/workouts")
            .match_query(Matcher::UrlEncoded("id".into(), "eq.w1".into()))
            .with_status(503)
            .with_body("service unavailable")
            .create_async()
            .await;

        let err = client(&server).delete_workout("w1").await.unwrap_err();
        match err {
            Error::Remote(msg) => {
                assert!(msg.contains("503"));
                assert!(msg.contains("service unavailable"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_of_missing_row_is_not_found() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("PATCH", "/rest/v1/sets")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let set = WorkoutSet { id: "s9".into(), reps: 5, weight: 100.0 };
        let err = client(&server).update_set("w1", "e1", &set).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "set", .. }));
    }

    #[tokio::test]
    async fn test_metric_upsert_and_load() {
        let mut server = Server::new_async().await;
        let upsert = server
            .mock("POST", "/rest/v1/body_metrics")
            .match_query(Matcher::UrlEncoded("on_conflict".into(), "user_id,kind,date".into()))
            .match_header("prefer", "resolution=merge-duplicates,return=representation")
            .match_body(Matcher::PartialJson(json!({"kind": "body_fat", "date": "2024-03-02"})))
            .with_status(201)
            .with_body(r#"[{"id":"m-9"}]"#)
            .create_async()
            .await;
        let _entries = server
            .mock("GET", "/rest/v1/body_metrics")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"[{"id":"m-2","kind":"weight","date":"2024-03-09","value":97.0},
                    {"id":"m-1","kind":"weight","date":"2024-03-01","value":100.0},
                    {"id":"m-9","kind":"body_fat","date":"2024-03-02","value":18.5}]"#,
            )
            .create_async()
            .await;
        let _goals = server
            .mock("GET", "/rest/v1/goals")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"[{"kind":"weight","target":90.0,"deadline":null}]"#)
            .create_async()
            .await;

        let store = client(&server);
        let entry = MetricEntry { id: "local-m".into(), date: day(2), value: 18.5 };
        let ack = store.upsert_metric_entry(MetricKind::BodyFat, &entry).await.unwrap();
        upsert.assert_async().await;
        assert_eq!(ack.id.as_deref(), Some("m-9"));

        let metrics = store.load_metrics().await.unwrap();
        let ids: Vec<_> = metrics.weight.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["m-1", "m-2"]);
        assert_eq!(metrics.weight.goal.as_ref().map(|g| g.target), Some(90.0));
        assert_eq!(metrics.body_fat.entries.len(), 1);
        assert!(metrics.muscle_mass.entries.is_empty());
    }

    #[tokio::test]
    async fn test_empty_widget_table_yields_default_layout() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/rest/v1/widget_configs")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let layout = client(&server).list_widgets().await.unwrap();
        assert_eq!(layout, widgets::default_layout().to_vec());
    }
}
