//! Versioned record storage.
//!
//! # Data Flow
//! ```text
//! handler
//!     → concurrency.rs (read version, conditional update, conflict detection)
//!     → VersionedStore (atomic compare-and-set on id + version)
//!     → memory.rs (sharded in-process map)
//! ```
//!
//! No lock is held between a writer's read and its conditional update.
//! Correctness rests entirely on the store's atomic check of the version.

pub mod concurrency;
pub mod memory;

pub use concurrency::{retry_on_conflict, update_versioned, MutationError};
pub use memory::MemoryStore;

/// An entity with an identifier and a version that every successful
/// mutation advances by exactly one.
pub trait Record: Clone + Send + Sync + 'static {
    /// Input for creating a record.
    type New: Send;
    /// A set of field changes applied by a conditional update.
    type Changes: Send;

    fn id(&self) -> i64;
    fn version(&self) -> i32;
    fn set_version(&mut self, version: i32);

    /// Build the stored record. The store assigns `id`; the version starts at 1.
    fn create(id: i64, new: Self::New) -> Self;

    fn apply(&mut self, changes: Self::Changes);

    /// A value that must be unique across all stored records, if any.
    fn unique_key(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("a record with key `{0}` already exists")]
    Duplicate(String),
}

/// Result of a conditional update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome<R> {
    /// The stored version matched; this is the record as written.
    Applied(R),
    /// No record matched both the id and the expected version.
    NotMatched,
}

impl<R: Record> UpdateOutcome<R> {
    pub fn is_matched(&self) -> bool {
        matches!(self, UpdateOutcome::Applied(_))
    }

    pub fn new_version(&self) -> Option<i32> {
        match self {
            UpdateOutcome::Applied(record) => Some(record.version()),
            UpdateOutcome::NotMatched => None,
        }
    }
}

/// The storage contract the optimistic concurrency protocol is written
/// against.
pub trait VersionedStore<R: Record>: Send + Sync {
    fn insert(&self, new: R::New) -> Result<R, StoreError>;

    fn get(&self, id: i64) -> Option<R>;

    /// Apply `changes` to record `id` only if its stored version still equals
    /// `expected_version`, setting the version to `expected_version + 1`.
    /// The check and the write are atomic.
    fn conditional_update(
        &self,
        id: i64,
        expected_version: i32,
        changes: R::Changes,
    ) -> Result<UpdateOutcome<R>, StoreError>;

    fn delete(&self, id: i64) -> bool;

    /// All records ordered by id.
    fn list(&self) -> Vec<R>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Record;

    /// Minimal record used by store tests.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Counter {
        pub id: i64,
        pub version: i32,
        pub name: String,
        pub value: i64,
    }

    pub enum CounterChange {
        Add(i64),
        Rename(String),
    }

    impl Record for Counter {
        type New = String;
        type Changes = CounterChange;

        fn id(&self) -> i64 {
            self.id
        }

        fn version(&self) -> i32 {
            self.version
        }

        fn set_version(&mut self, version: i32) {
            self.version = version;
        }

        fn create(id: i64, name: String) -> Self {
            Counter {
                id,
                version: 1,
                name,
                value: 0,
            }
        }

        fn apply(&mut self, changes: CounterChange) {
            match changes {
                CounterChange::Add(n) => self.value += n,
                CounterChange::Rename(name) => self.name = name,
            }
        }

        fn unique_key(&self) -> Option<String> {
            Some(self.name.to_lowercase())
        }
    }
}
