//! Optimistic mutation coordinator.
//!
//! Every create/update/delete runs through [`Coordinator::run`]:
//!
//! 1. Wait for the aggregate's lane (one mutation per aggregate at a time)
//! 2. Apply the change to the in-memory state and commit it immediately
//! 3. Call the data store
//! 4. On success, reconcile server-assigned ids into the state
//! 5. On failure, roll the state back
//!
//! Exactly one notification is emitted per call and the returned
//! [`MutationOutcome`] is always a value, never an error.

use crate::notify::{Notification, Notifier};
use crate::state::{AggregateKey, Aggregates, Snapshot, StateContainer};
use crate::store::RemoteAck;
use crate::Result;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// Placeholder → server id mappings learned from reconciled creates
#[derive(Debug, Default)]
pub struct IdAliases {
    map: Mutex<HashMap<String, String>>,
}

impl IdAliases {
    /// Current form of `id`, following reconciled placeholders
    pub fn resolve(&self, id: &str) -> String {
        let map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        let mut current = id;
        // Bounded walk; a chain longer than the map implies a cycle
        for _ in 0..=map.len() {
            match map.get(current) {
                Some(next) => current = next,
                None => break,
            }
        }
        current.to_string()
    }

    pub fn record(&self, placeholder: &str, assigned: &str) {
        if placeholder == assigned {
            return;
        }
        let mut map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(placeholder.to_string(), assigned.to_string());
    }

    pub fn len(&self) -> usize {
        self.map.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&self) {
        self.map.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// Per-aggregate single-flight queues
struct Lanes<K> {
    lanes: Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>,
}

impl<K: AggregateKey> Lanes<K> {
    fn new() -> Self {
        Self {
            lanes: Mutex::new(HashMap::new()),
        }
    }

    async fn acquire(&self, key: &K) -> OwnedMutexGuard<()> {
        let lane = {
            let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
            // Idle lanes are only referenced by the map itself
            lanes.retain(|_, lane| Arc::strong_count(lane) > 1);
            Arc::clone(lanes.entry(key.clone()).or_default())
        };
        lane.lock_owned().await
    }

    /// Forget all aliases once no mutation holds or waits for a lane
    ///
    /// Only queued mutations can still carry a reconciled placeholder.
    fn forget_aliases_if_idle(&self, aliases: &IdAliases) {
        let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
        lanes.retain(|_, lane| Arc::strong_count(lane) > 1);
        if lanes.is_empty() {
            aliases.clear();
        }
    }
}

/// A held lane; releasing it may prune the alias map
struct LaneTicket<'a, K: AggregateKey> {
    guard: Option<OwnedMutexGuard<()>>,
    lanes: &'a Lanes<K>,
    aliases: &'a IdAliases,
}

impl<K: AggregateKey> Drop for LaneTicket<'_, K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.lanes.forget_aliases_if_idle(self.aliases);
    }
}

/// Describes a mutation for logging and notifications
#[derive(Clone, Debug)]
pub struct Intent<K> {
    /// Aggregate the mutation touches
    pub key: K,
    pub success_title: &'static str,
    pub failure_title: &'static str,
    pub description: String,
    /// Placeholder id of the entity being created, if any
    pub created: Option<String>,
}

impl<K> Intent<K> {
    pub fn new(
        key: K,
        success_title: &'static str,
        failure_title: &'static str,
        description: impl Into<String>,
    ) -> Self {
        Self {
            key,
            success_title,
            failure_title,
            description: description.into(),
            created: None,
        }
    }

    pub fn creating(mut self, placeholder: impl Into<String>) -> Self {
        self.created = Some(placeholder.into());
        self
    }
}

/// Final, resolved result of a mutation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The store accepted the change; `id` is the created entity's final id
    Committed { id: Option<String> },
    /// The store failed and the state was rolled back
    RolledBack { reason: String },
    /// The change could not be applied locally; nothing was sent
    Rejected { reason: String },
}

impl MutationOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, MutationOutcome::Committed { .. })
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            MutationOutcome::Committed { id } => id.as_deref(),
            _ => None,
        }
    }
}

/// Runs optimistic mutations against one state container
pub struct Coordinator<T: Aggregates> {
    state: Arc<StateContainer<T>>,
    notifier: Arc<dyn Notifier>,
    lanes: Lanes<T::Key>,
    aliases: IdAliases,
}

impl<T: Aggregates> Coordinator<T> {
    pub fn new(state: Arc<StateContainer<T>>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            state,
            notifier,
            lanes: Lanes::new(),
            aliases: IdAliases::default(),
        }
    }

    pub fn state(&self) -> &Arc<StateContainer<T>> {
        &self.state
    }

    pub fn aliases(&self) -> &IdAliases {
        &self.aliases
    }

    /// Run one optimistic mutation
    ///
    /// * `apply` derives the next state from the current one and returns the
    ///   payload for the store call. An error here rejects the mutation
    ///   without touching state or store.
    /// * `remote` performs the store call with that payload.
    /// * `reconcile` writes server-assigned ids from the ack into the state.
    pub async fn run<P, A, R, Fut, C>(
        &self,
        intent: Intent<T::Key>,
        apply: A,
        remote: R,
        reconcile: C,
    ) -> MutationOutcome
    where
        A: FnOnce(&T, &IdAliases) -> Result<(T, P)> + Send,
        R: FnOnce(P) -> Fut + Send,
        Fut: Future<Output = Result<RemoteAck>> + Send,
        C: FnOnce(&mut T, &RemoteAck) + Send,
        P: Send,
    {
        let lane_key = intent.key.resolve(&self.aliases);
        let _lane = LaneTicket {
            guard: Some(self.lanes.acquire(&lane_key).await),
            lanes: &self.lanes,
            aliases: &self.aliases,
        };
        // A create queued ahead of us may have been reconciled while we waited
        let key = lane_key.resolve(&self.aliases);

        let applied = self.state.apply(|current| {
            let part = current.extract(&key);
            let (next, payload) = apply(current, &self.aliases)?;
            Ok((next, (part, payload)))
        });

        let (before, revision, (part, payload)) = match applied {
            Ok(applied) => applied,
            Err(e) => {
                tracing::warn!(
                    "Rejected mutation on {:?} ({}): {}",
                    key,
                    intent.description,
                    e
                );
                self.notifier
                    .notify(Notification::error(intent.failure_title, e.to_string()));
                return MutationOutcome::Rejected {
                    reason: e.to_string(),
                };
            }
        };

        tracing::debug!("Optimistically applied mutation on {:?} at revision {}", key, revision);

        match remote(payload).await {
            Ok(ack) => {
                if ack.assigns_ids() {
                    self.record_aliases(&intent, &ack);
                    self.state.modify(|value| reconcile(value, &ack));
                }
                let id = ack.id.clone().or_else(|| intent.created.clone());
                tracing::debug!("Committed mutation on {:?}", key);
                self.notifier.notify(Notification::success(
                    intent.success_title,
                    intent.description.clone(),
                ));
                MutationOutcome::Committed { id }
            }
            Err(e) => {
                tracing::warn!("Store rejected mutation on {:?}: {}. Rolling back.", key, e);
                self.rollback(&key, &before, revision, part);
                self.notifier
                    .notify(Notification::error(intent.failure_title, e.to_string()));
                MutationOutcome::RolledBack {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn record_aliases(&self, intent: &Intent<T::Key>, ack: &RemoteAck) {
        if let (Some(placeholder), Some(id)) = (&intent.created, &ack.id) {
            self.aliases.record(placeholder, id);
        }
        for (placeholder, id) in &ack.nested {
            self.aliases.record(placeholder, id);
        }
    }

    /// Undo an applied mutation
    ///
    /// The full snapshot is restored only if nothing else committed since
    /// our apply. Otherwise only our aggregate is put back, leaving other
    /// aggregates' newer commits alone.
    fn rollback(&self, key: &T::Key, before: &Snapshot<T>, revision: u64, part: T::Part) {
        if self.state.restore_if_current(before, revision) {
            tracing::debug!("Restored snapshot at revision {}", before.revision);
            return;
        }

        tracing::info!(
            "State moved past revision {} during the call; restoring aggregate {:?} only",
            revision,
            key
        );
        self.state.modify(|value| value.restore(key, part));
    }
}

/// Reconciler for mutations that never create entities
pub fn no_reconcile<T>(_: &mut T, _: &RemoteAck) {}
