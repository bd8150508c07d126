//! In-process record store backed by sharded maps.

use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::store::{Record, StoreError, UpdateOutcome, VersionedStore};

/// A [`VersionedStore`] kept in memory.
///
/// Lock order is records then unique keys. `insert` and `delete` never hold
/// both at once.
pub struct MemoryStore<R: Record> {
    records: DashMap<i64, R>,
    unique: DashMap<String, i64>,
    next_id: AtomicI64,
}

impl<R: Record> MemoryStore<R> {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            unique: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<R: Record> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> VersionedStore<R> for MemoryStore<R> {
    fn insert(&self, new: R::New) -> Result<R, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let record = R::create(id, new);

        if let Some(key) = record.unique_key() {
            match self.unique.entry(key) {
                Entry::Occupied(existing) => return Err(StoreError::Duplicate(existing.key().clone())),
                Entry::Vacant(slot) => {
                    slot.insert(id);
                }
            }
        }

        self.records.insert(id, record.clone());
        Ok(record)
    }

    fn get(&self, id: i64) -> Option<R> {
        self.records.get(&id).map(|record| record.clone())
    }

    fn conditional_update(
        &self,
        id: i64,
        expected_version: i32,
        changes: R::Changes,
    ) -> Result<UpdateOutcome<R>, StoreError> {
        let Some(mut stored) = self.records.get_mut(&id) else {
            return Ok(UpdateOutcome::NotMatched);
        };
        if stored.version() != expected_version {
            return Ok(UpdateOutcome::NotMatched);
        }

        let mut updated = stored.clone();
        updated.apply(changes);
        updated.set_version(expected_version + 1);

        let old_key = stored.unique_key();
        let new_key = updated.unique_key();
        if old_key != new_key {
            if let Some(key) = new_key {
                match self.unique.entry(key) {
                    Entry::Occupied(owner) if *owner.get() != id => {
                        return Err(StoreError::Duplicate(owner.key().clone()));
                    }
                    Entry::Occupied(_) => {}
                    Entry::Vacant(slot) => {
                        slot.insert(id);
                    }
                }
            }
            if let Some(key) = old_key {
                self.unique.remove(&key);
            }
        }

        *stored = updated.clone();
        Ok(UpdateOutcome::Applied(updated))
    }

    fn delete(&self, id: i64) -> bool {
        match self.records.remove(&id) {
            Some((_, record)) => {
                if let Some(key) = record.unique_key() {
                    self.unique.remove(&key);
                }
                true
            }
            None => false,
        }
    }

    fn list(&self) -> Vec<R> {
        let mut records: Vec<R> = self.records.iter().map(|entry| entry.value().clone()).collect();
        records.sort_by_key(|record| record.id());
        records
    }
}
