// History record types.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::diff::codec::Delta;
use crate::identity::ResourceIdentity;

/// The kind of mutating operation a history record captures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Create,
    Update,
    Patch,
    Apply,
    /// A named action routed through a resource's action endpoint, e.g.
    /// `scale`, `restart`, `suspend`, `resume` or `rollback`.
    CustomAction(String),
}

impl Operation {
    /// Operations that establish a fresh baseline; the write path stores
    /// them as full snapshots regardless of chain state.
    pub fn is_baseline(&self) -> bool {
        matches!(self, Operation::Create | Operation::Apply)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => f.write_str("create"),
            Operation::Update => f.write_str("update"),
            Operation::Patch => f.write_str("patch"),
            Operation::Apply => f.write_str("apply"),
            Operation::CustomAction(action) => f.write_str(action),
        }
    }
}

/// Record payload: full content, or a delta against the materialized
/// content of the immediately preceding record for the same identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Complete materialized content at this point in history.
    Snapshot(String),
    /// Content expressed relative to the predecessor's materialized
    /// content.
    Diff(Delta),
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Snapshot(_) => PayloadKind::Snapshot,
            Payload::Diff(_) => PayloadKind::Diff,
        }
    }
}

/// Payload discriminant carried by metadata listings so UIs can badge
/// entries without loading content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Snapshot,
    Diff,
}

/// One immutable record of a mutating operation.
///
/// Records are append-only: `sequence` is assigned once by the store and
/// is the sole ordering authority. `created_at` is advisory wall-clock
/// metadata and never participates in chain ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Globally unique, strictly monotonically increasing ordering key.
    pub sequence: u64,
    pub identity: ResourceIdentity,
    pub operation: Operation,
    pub payload: Payload,
    /// For `Diff` payloads, the sequence of the record whose materialized
    /// content the delta was computed against. Normally the sequence
    /// predecessor; under a same-identity append race, the shared
    /// predecessor both racers read. `None` for snapshots.
    pub parent: Option<u64>,
    /// Whether the recorded mutation itself succeeded. Failed operations
    /// are recorded too and do not break the diff chain.
    pub success: bool,
    /// Message accompanying a failed operation.
    pub error: Option<String>,
    /// Actor who performed the operation.
    pub operator: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl HistoryRecord {
    /// Metadata view without the potentially large payload.
    pub fn meta(&self) -> RecordMeta {
        RecordMeta {
            sequence: self.sequence,
            identity: self.identity.clone(),
            operation: self.operation.clone(),
            payload_kind: self.payload.kind(),
            success: self.success,
            error: self.error.clone(),
            operator: self.operator.clone(),
            created_at: self.created_at,
        }
    }
}

/// Record metadata for paginated history listings; excludes the payload to
/// bound response size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub sequence: u64,
    pub identity: ResourceIdentity,
    pub operation: Operation,
    pub payload_kind: PayloadKind,
    pub success: bool,
    pub error: Option<String>,
    pub operator: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
