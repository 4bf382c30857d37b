// Chain reconstruction: materialize the exact text content at any record
// by walking back to the nearest snapshot and replaying diffs forward.
//
// The walk is iterative — an explicit list of collected diffs — so long
// chains never grow the call stack. Read-only: runs in parallel with
// appends, operating on the immutable chain prefix visible when it starts.

use log::{error, warn};

use crate::diff::codec::{self, Delta, DiffLimits};
use crate::error::HistoryError;
use crate::identity::ResourceIdentity;
use crate::record::{HistoryRecord, Payload};
use crate::store::HistoryStore;

/// Shape of the chain behind a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainStats {
    /// Sequence of the snapshot the chain is anchored on.
    pub snapshot_sequence: u64,
    /// Diff records between the snapshot (exclusive) and the target
    /// (inclusive).
    pub diffs_since_snapshot: usize,
}

/// Read-side reconstruction over a [`HistoryStore`].
pub struct Reconstructor<'a, S: HistoryStore + ?Sized> {
    store: &'a S,
    limits: DiffLimits,
}

impl<'a, S: HistoryStore + ?Sized> Reconstructor<'a, S> {
    pub fn new(store: &'a S, limits: DiffLimits) -> Self {
        Self { store, limits }
    }

    /// Reconstruct the exact text content at `sequence`.
    ///
    /// Idempotent over an unchanged store: two calls return identical
    /// text. Reconstruction errors are always surfaced; a partial result
    /// is never returned.
    pub fn materialize(&self, sequence: u64) -> Result<String, HistoryError> {
        let target = self.store.get(sequence)?;
        self.materialize_record(&target)
    }

    /// Like [`Reconstructor::materialize`], after checking the record
    /// belongs to `cluster`.
    pub fn materialize_scoped(&self, cluster: &str, sequence: u64) -> Result<String, HistoryError> {
        let target = self.store.get_scoped(cluster, sequence)?;
        self.materialize_record(&target)
    }

    /// Materialize an already-fetched record.
    pub fn materialize_record(&self, target: &HistoryRecord) -> Result<String, HistoryError> {
        let (_, snapshot_text, pending) = self.walk(target)?;
        let mut text = snapshot_text;
        // Replay oldest to newest; `pending` was collected newest-first.
        for (sequence, delta) in pending.iter().rev() {
            text = codec::decode(&text, delta, &self.limits).map_err(|err| {
                warn!(
                    "replaying record {sequence} for {} failed: {err}",
                    target.identity
                );
                err
            })?;
        }
        Ok(text)
    }

    /// Shape of the chain behind `sequence`. Used by the write path's
    /// re-snapshot policy.
    ///
    /// Counts diffs without accumulating their payloads, so sizing a chain
    /// stays cheap on every write.
    pub fn chain_stats(&self, sequence: u64) -> Result<ChainStats, HistoryError> {
        let mut current = self.store.get(sequence)?;
        let mut diffs_since_snapshot = 0;
        while matches!(current.payload, Payload::Diff(_)) {
            diffs_since_snapshot += 1;
            match self.base_of(&current.identity, current.sequence, current.parent)? {
                Some(prev) => current = prev,
                None => {
                    error!(
                        "no snapshot behind record {sequence} for {}",
                        current.identity
                    );
                    return Err(HistoryError::BrokenChain {
                        sequence,
                        identity: current.identity,
                    });
                }
            }
        }
        Ok(ChainStats {
            snapshot_sequence: current.sequence,
            diffs_since_snapshot,
        })
    }

    // Walk backward until a snapshot, collecting (sequence, delta) pairs
    // newest-first. Running out of records without a snapshot is a
    // data-integrity defect.
    fn walk(
        &self,
        target: &HistoryRecord,
    ) -> Result<(u64, String, Vec<(u64, Delta)>), HistoryError> {
        let mut pending = Vec::new();
        let mut current = target.clone();
        loop {
            match current.payload {
                Payload::Snapshot(text) => return Ok((current.sequence, text, pending)),
                Payload::Diff(delta) => {
                    let sequence = current.sequence;
                    pending.push((sequence, delta));
                    match self.base_of(&current.identity, sequence, current.parent)? {
                        Some(prev) => current = prev,
                        None => {
                            error!(
                                "no snapshot behind record {} for {}",
                                target.sequence, target.identity
                            );
                            return Err(HistoryError::BrokenChain {
                                sequence: target.sequence,
                                identity: target.identity.clone(),
                            });
                        }
                    }
                }
            }
        }
    }

    // Resolve a diff record's base: its `parent` when set, the sequence
    // predecessor otherwise. A valid base always has a strictly smaller
    // sequence, which makes every backward walk terminate; a `parent` at or
    // above the record itself (a cycle in corrupt or hostile data), naming a
    // foreign identity, or missing entirely resolves to `None` and becomes
    // `BrokenChain` at the caller.
    fn base_of(
        &self,
        identity: &ResourceIdentity,
        sequence: u64,
        parent: Option<u64>,
    ) -> Result<Option<HistoryRecord>, HistoryError> {
        match parent {
            Some(parent) if parent >= sequence => {
                error!("record {sequence} names base {parent} at or above itself");
                Ok(None)
            }
            Some(parent) => match self.store.get(parent) {
                Ok(record) if record.identity == *identity => Ok(Some(record)),
                Ok(record) => {
                    error!(
                        "record {sequence} names base {parent} of foreign identity {}",
                        record.identity
                    );
                    Ok(None)
                }
                Err(HistoryError::NotFound { .. }) => {
                    error!("record {sequence} names missing base {parent}");
                    Ok(None)
                }
                Err(err) => Err(err),
            },
            None => self.store.predecessor_of(identity, sequence),
        }
    }
}
