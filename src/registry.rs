//! Id-keyed registry shared by connections and shell sessions.
//!
//! Creating an entry usually needs an await (opening a transport or a
//! channel) between the duplicate check and the insert. The id is reserved
//! under the write lock first, so two concurrent creators of the same id can
//! never both pass the check. A reservation that is dropped without being
//! committed frees the id again, including when the creating future is
//! cancelled.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{EntityKind, HubError};
use crate::Result;

enum Slot<T> {
    Reserved,
    Ready(Arc<T>),
}

/// Thread-safe map from caller-chosen ids to shared entries.
pub(crate) struct Registry<T> {
    kind: EntityKind,
    entries: RwLock<HashMap<String, Slot<T>>>,
}

impl<T> Registry<T> {
    pub(crate) fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Claim `id` for a new entry.
    pub(crate) fn reserve(&self, id: &str) -> Result<Reservation<'_, T>> {
        let mut entries = self.entries.write().map_err(|_| HubError::LockPoisoned)?;
        if entries.contains_key(id) {
            return Err(HubError::already_exists(self.kind, id));
        }
        entries.insert(id.to_string(), Slot::Reserved);
        Ok(Reservation {
            registry: self,
            id: id.to_string(),
            committed: false,
        })
    }

    /// Look up a committed entry.
    pub(crate) fn get(&self, id: &str) -> Result<Arc<T>> {
        let entries = self.entries.read().map_err(|_| HubError::LockPoisoned)?;
        match entries.get(id) {
            Some(Slot::Ready(entry)) => Ok(Arc::clone(entry)),
            _ => Err(HubError::not_found(self.kind, id)),
        }
    }

    pub(crate) fn contains(&self, id: &str) -> Result<bool> {
        let entries = self.entries.read().map_err(|_| HubError::LockPoisoned)?;
        Ok(matches!(entries.get(id), Some(Slot::Ready(_))))
    }

    /// Remove a committed entry. Reserved ids are reported as absent.
    pub(crate) fn remove(&self, id: &str) -> Result<Arc<T>> {
        let mut entries = self.entries.write().map_err(|_| HubError::LockPoisoned)?;
        match entries.get(id) {
            Some(Slot::Ready(_)) => match entries.remove(id) {
                Some(Slot::Ready(entry)) => Ok(entry),
                _ => Err(HubError::not_found(self.kind, id)),
            },
            _ => Err(HubError::not_found(self.kind, id)),
        }
    }

    /// Snapshot of all committed entries, sorted by id.
    pub(crate) fn snapshot(&self) -> Result<Vec<(String, Arc<T>)>> {
        let entries = self.entries.read().map_err(|_| HubError::LockPoisoned)?;
        let mut items: Vec<_> = entries
            .iter()
            .filter_map(|(id, slot)| match slot {
                Slot::Ready(entry) => Some((id.clone(), Arc::clone(entry))),
                Slot::Reserved => None,
            })
            .collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(items)
    }

    /// Remove and return every committed entry.
    pub(crate) fn drain(&self) -> Result<Vec<(String, Arc<T>)>> {
        let mut entries = self.entries.write().map_err(|_| HubError::LockPoisoned)?;
        let ids: Vec<String> = entries
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Ready(_)))
            .map(|(id, _)| id.clone())
            .collect();

        let mut drained = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(Slot::Ready(entry)) = entries.remove(&id) {
                drained.push((id, entry));
            }
        }
        drained.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(drained)
    }

    pub(crate) fn count(&self) -> usize {
        self.entries
            .read()
            .map(|e| e.values().filter(|s| matches!(s, Slot::Ready(_))).count())
            .unwrap_or(0)
    }
}

/// A claimed id that has not been filled yet.
pub(crate) struct Reservation<'a, T> {
    registry: &'a Registry<T>,
    id: String,
    committed: bool,
}

impl<T> Reservation<'_, T> {
    /// Fill the reserved slot.
    pub(crate) fn commit(mut self, entry: T) -> Result<Arc<T>> {
        let entry = Arc::new(entry);
        let mut entries = self
            .registry
            .entries
            .write()
            .map_err(|_| HubError::LockPoisoned)?;
        entries.insert(self.id.clone(), Slot::Ready(Arc::clone(&entry)));
        self.committed = true;
        Ok(entry)
    }
}

impl<T> Drop for Reservation<'_, T> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Ok(mut entries) = self.registry.entries.write() {
            if matches!(entries.get(&self.id), Some(Slot::Reserved)) {
                entries.remove(&self.id);
            }
        }
    }
}
