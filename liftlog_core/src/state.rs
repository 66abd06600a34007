//! In-memory entity state with revision tracking.
//!
//! A [`StateContainer`] holds the current known-good collection for a
//! session. Every change replaces the whole value: mutators receive the
//! current value by reference and return a new one, so a [`Snapshot`] taken
//! before a mutation stays valid for rollback no matter what happens later.

use crate::mutation::IdAliases;
use crate::{Result, Workout};
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;

/// Key of an independently mutated part of a collection
pub trait AggregateKey: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Map a key that may name a reconciled placeholder onto its current form
    fn resolve(&self, _aliases: &IdAliases) -> Self {
        self.clone()
    }
}

impl AggregateKey for String {
    fn resolve(&self, aliases: &IdAliases) -> Self {
        aliases.resolve(self)
    }
}

impl AggregateKey for crate::MetricKind {}

impl AggregateKey for () {}

/// A collection made of aggregates that can be restored one at a time
///
/// Used when a rollback has to undo a single aggregate without discarding
/// commits made to other aggregates in the meantime.
pub trait Aggregates: Clone + Send + Sync + 'static {
    type Key: AggregateKey;
    type Part: Clone + Send + Sync + 'static;

    /// Copy out the aggregate identified by `key` (or its absence)
    fn extract(&self, key: &Self::Key) -> Self::Part;

    /// Put back a previously extracted aggregate
    fn restore(&mut self, key: &Self::Key, part: Self::Part);
}

impl Aggregates for Vec<Workout> {
    type Key = String;
    /// Position and content, `None` when the workout did not exist
    type Part = Option<(usize, Workout)>;

    fn extract(&self, key: &String) -> Self::Part {
        self.iter()
            .position(|w| &w.id == key)
            .map(|idx| (idx, self[idx].clone()))
    }

    fn restore(&mut self, key: &String, part: Self::Part) {
        self.retain(|w| &w.id != key);
        if let Some((idx, workout)) = part {
            let idx = idx.min(self.len());
            self.insert(idx, workout);
        }
    }
}

/// Immutable view of the container at one revision
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub value: Arc<T>,
    pub revision: u64,
}

/// Authoritative in-memory collection for the active session
pub struct StateContainer<T> {
    inner: RwLock<Snapshot<T>>,
    changes: watch::Sender<u64>,
}

impl<T: Clone> StateContainer<T> {
    pub fn new(initial: T) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: RwLock::new(Snapshot {
                value: Arc::new(initial),
                revision: 0,
            }),
            changes,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Snapshot<T>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Snapshot<T>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// The full current collection
    pub fn current(&self) -> Arc<T> {
        Arc::clone(&self.read().value)
    }

    pub fn snapshot(&self) -> Snapshot<T> {
        self.read().clone()
    }

    pub fn revision(&self) -> u64 {
        self.read().revision
    }

    /// Receive the revision number after every change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn commit(&self, guard: &mut Snapshot<T>, next: T) -> u64 {
        guard.value = Arc::new(next);
        guard.revision += 1;
        self.changes.send_replace(guard.revision);
        guard.revision
    }

    /// Replace the whole collection, returning the new revision
    pub fn replace(&self, next: T) -> u64 {
        let mut guard = self.write();
        self.commit(&mut guard, next)
    }

    /// Derive the next collection from the current one and commit it
    ///
    /// Runs under the write lock, so no other commit can slip in between
    /// reading the current value and installing the result. Returns the
    /// pre-mutation snapshot, the committed revision and whatever extra
    /// output `f` produced. On error nothing is committed.
    pub fn apply<F, R>(&self, f: F) -> Result<(Snapshot<T>, u64, R)>
    where
        F: FnOnce(&T) -> Result<(T, R)>,
    {
        let mut guard = self.write();
        let before = guard.clone();
        let (next, output) = f(&before.value)?;
        let revision = self.commit(&mut guard, next);
        Ok((before, revision, output))
    }

    /// Restore `snapshot` only if the container is still at `expected`
    pub fn restore_if_current(&self, snapshot: &Snapshot<T>, expected: u64) -> bool {
        let mut guard = self.write();
        if guard.revision != expected {
            return false;
        }
        self.commit(&mut guard, (*snapshot.value).clone());
        true
    }

    /// Edit a private copy of the current value and commit it
    pub fn modify<F>(&self, f: F) -> u64
    where
        F: FnOnce(&mut T),
    {
        let mut guard = self.write();
        let mut next = (*guard.value).clone();
        f(&mut next);
        self.commit(&mut guard, next)
    }
}
