//! Optimistic concurrency control over a [`VersionedStore`].
//!
//! A writer reads version `V`, builds its changes, and asks the store to
//! apply them only if the stored version is still `V`. Among writers that
//! read the same `V` at most one succeeds; the rest see
//! [`MutationError::Conflict`] and may re-read and retry.

use crate::observability::metrics;
use crate::resilience::RetryPolicy;
use crate::store::{Record, StoreError, UpdateOutcome, VersionedStore};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    /// The record still exists but its version moved past `expected_version`.
    #[error("record {id} was modified concurrently (expected version {expected_version})")]
    Conflict { id: i64, expected_version: i32 },

    #[error("record {0} not found")]
    NotFound(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Issue one conditional update against `expected_version`.
///
/// A miss is followed by an existence check so a concurrent delete reports
/// `NotFound` rather than `Conflict`.
pub fn update_versioned<R, S>(
    store: &S,
    id: i64,
    expected_version: i32,
    changes: R::Changes,
) -> Result<R, MutationError>
where
    R: Record,
    S: VersionedStore<R> + ?Sized,
{
    match store.conditional_update(id, expected_version, changes)? {
        UpdateOutcome::Applied(record) => Ok(record),
        UpdateOutcome::NotMatched => {
            if store.get(id).is_none() {
                return Err(MutationError::NotFound(id));
            }
            metrics::record_edit_conflict();
            tracing::debug!(id, expected_version, "conditional update lost to a concurrent writer");
            Err(MutationError::Conflict {
                id,
                expected_version,
            })
        }
    }
}

/// Re-read, rebuild and re-apply until the update lands or the policy's
/// attempts run out. Only conflicts are retried; every other error returns
/// immediately, including errors produced by `make_changes`.
pub async fn retry_on_conflict<R, S, F, E>(
    store: &S,
    id: i64,
    policy: RetryPolicy,
    mut make_changes: F,
) -> Result<R, E>
where
    R: Record,
    S: VersionedStore<R> + ?Sized,
    F: FnMut(&R) -> Result<R::Changes, E>,
    E: From<MutationError>,
{
    let mut attempt = 0;
    loop {
        let current = store.get(id).ok_or(MutationError::NotFound(id))?;
        let changes = make_changes(&current)?;

        match update_versioned(store, id, current.version(), changes) {
            Err(MutationError::Conflict { .. }) if attempt + 1 < policy.max_attempts => {
                attempt += 1;
                tokio::time::sleep(policy.delay_for(attempt)).await;
            }
            result => return result.map_err(E::from),
        }
    }
}
