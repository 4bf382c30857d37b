// Append-only record store.
//
// `HistoryStore` is the persistence seam: one append-only collection of
// history records keyed by global sequence, indexed per identity for
// predecessor lookups. `MemoryStore` is the reference implementation;
// database-backed stores plug in behind the same trait and delegate
// sequence assignment to their native atomic auto-increment.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::HistoryError;
use crate::identity::ResourceIdentity;
use crate::record::{HistoryRecord, Operation, Payload, RecordMeta};

/// A record as submitted for appending. The store assigns `sequence` and
/// `created_at`.
#[derive(Debug, Clone)]
pub struct RecordDraft {
    pub identity: ResourceIdentity,
    pub operation: Operation,
    pub payload: Payload,
    /// Diff base sequence; `None` for snapshot payloads.
    pub parent: Option<u64>,
    pub success: bool,
    pub error: Option<String>,
    pub operator: String,
}

/// One page of a metadata listing, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPage {
    pub records: Vec<RecordMeta>,
    /// Total records for the identity across all pages.
    pub total: u64,
}

/// Append-only persistence for history records.
///
/// Sequence assignment in `append` is the single serialization point:
/// concurrent appends from any identities receive distinct, strictly
/// increasing sequence numbers. Everything else may run in parallel.
pub trait HistoryStore: Send + Sync {
    /// Persist a record atomically, assigning the next global sequence.
    fn append(&self, draft: RecordDraft) -> Result<HistoryRecord, HistoryError>;

    /// The record with the largest sequence strictly below `before` for
    /// the given identity, or `None` if no such record exists.
    fn predecessor_of(
        &self,
        identity: &ResourceIdentity,
        before: u64,
    ) -> Result<Option<HistoryRecord>, HistoryError>;

    /// Paginated, newest-first metadata listing. `page` is 1-based;
    /// payloads are never loaded.
    fn list_metadata(
        &self,
        identity: &ResourceIdentity,
        page: usize,
        page_size: usize,
    ) -> Result<HistoryPage, HistoryError>;

    /// Fetch one full record, payload included.
    fn get(&self, sequence: u64) -> Result<HistoryRecord, HistoryError>;

    /// Fetch one full record, treating a cluster mismatch as `NotFound` so
    /// callers cannot read history across cluster scopes.
    fn get_scoped(&self, cluster: &str, sequence: u64) -> Result<HistoryRecord, HistoryError> {
        let record = self.get(sequence)?;
        if record.identity.cluster != cluster {
            return Err(HistoryError::NotFound { sequence });
        }
        Ok(record)
    }

    /// The most recent record for an identity, if any.
    fn latest(&self, identity: &ResourceIdentity) -> Result<Option<HistoryRecord>, HistoryError> {
        self.predecessor_of(identity, u64::MAX)
    }
}

impl<S: HistoryStore + ?Sized> HistoryStore for &S {
    fn append(&self, draft: RecordDraft) -> Result<HistoryRecord, HistoryError> {
        (**self).append(draft)
    }

    fn predecessor_of(
        &self,
        identity: &ResourceIdentity,
        before: u64,
    ) -> Result<Option<HistoryRecord>, HistoryError> {
        (**self).predecessor_of(identity, before)
    }

    fn list_metadata(
        &self,
        identity: &ResourceIdentity,
        page: usize,
        page_size: usize,
    ) -> Result<HistoryPage, HistoryError> {
        (**self).list_metadata(identity, page, page_size)
    }

    fn get(&self, sequence: u64) -> Result<HistoryRecord, HistoryError> {
        (**self).get(sequence)
    }
}

impl<S: HistoryStore + ?Sized> HistoryStore for Arc<S> {
    fn append(&self, draft: RecordDraft) -> Result<HistoryRecord, HistoryError> {
        (**self).append(draft)
    }

    fn predecessor_of(
        &self,
        identity: &ResourceIdentity,
        before: u64,
    ) -> Result<Option<HistoryRecord>, HistoryError> {
        (**self).predecessor_of(identity, before)
    }

    fn list_metadata(
        &self,
        identity: &ResourceIdentity,
        page: usize,
        page_size: usize,
    ) -> Result<HistoryPage, HistoryError> {
        (**self).list_metadata(identity, page, page_size)
    }

    fn get(&self, sequence: u64) -> Result<HistoryRecord, HistoryError> {
        (**self).get(sequence)
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// In-memory `HistoryStore` behind a single mutex.
///
/// Sequences start at 1 and never repeat. Appends serialize on the mutex;
/// reads clone records out and hold the lock only for the lookup.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    records: BTreeMap<u64, HistoryRecord>,
    /// Per-identity sequences, ascending by construction.
    chains: HashMap<ResourceIdentity, Vec<u64>>,
    last_sequence: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records across all identities.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HistoryStore for MemoryStore {
    fn append(&self, draft: RecordDraft) -> Result<HistoryRecord, HistoryError> {
        let mut inner = self.inner.lock().map_err(poisoned)?;
        inner.last_sequence += 1;
        let sequence = inner.last_sequence;
        let record = HistoryRecord {
            sequence,
            identity: draft.identity,
            operation: draft.operation,
            payload: draft.payload,
            parent: draft.parent,
            success: draft.success,
            error: draft.error,
            operator: draft.operator,
            created_at: OffsetDateTime::now_utc(),
        };
        inner
            .chains
            .entry(record.identity.clone())
            .or_default()
            .push(sequence);
        inner.records.insert(sequence, record.clone());
        Ok(record)
    }

    fn predecessor_of(
        &self,
        identity: &ResourceIdentity,
        before: u64,
    ) -> Result<Option<HistoryRecord>, HistoryError> {
        let inner = self.inner.lock().map_err(poisoned)?;
        let Some(chain) = inner.chains.get(identity) else {
            return Ok(None);
        };
        let Some(sequence) = chain.iter().rev().find(|&&s| s < before) else {
            return Ok(None);
        };
        Ok(inner.records.get(sequence).cloned())
    }

    fn list_metadata(
        &self,
        identity: &ResourceIdentity,
        page: usize,
        page_size: usize,
    ) -> Result<HistoryPage, HistoryError> {
        let inner = self.inner.lock().map_err(poisoned)?;
        let chain = inner.chains.get(identity).map(Vec::as_slice).unwrap_or(&[]);
        let start = page.max(1).saturating_sub(1).saturating_mul(page_size);
        let records = chain
            .iter()
            .rev()
            .skip(start)
            .take(page_size)
            .filter_map(|sequence| inner.records.get(sequence))
            .map(HistoryRecord::meta)
            .collect();
        Ok(HistoryPage {
            records,
            total: chain.len() as u64,
        })
    }

    fn get(&self, sequence: u64) -> Result<HistoryRecord, HistoryError> {
        let inner = self.inner.lock().map_err(poisoned)?;
        inner
            .records
            .get(&sequence)
            .cloned()
            .ok_or(HistoryError::NotFound { sequence })
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> HistoryError {
    HistoryError::Store("memory store mutex poisoned".into())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
