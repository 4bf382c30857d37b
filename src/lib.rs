//! Reslog: versioned resource audit log.
//!
//! Records every mutating operation performed on a cluster resource and
//! reconstructs the exact serialized state at any recorded point in time,
//! without storing a full copy on every write.
//!
//! The crate provides:
//! - A pure diff codec (`diff`) with size and time guards
//! - An append-only record store seam (`store`) with a global sequence
//! - A chain reconstructor (`chain`) replaying diffs from the nearest
//!   snapshot
//! - A write path (`writer`) deciding snapshot-vs-diff encoding and
//!   keeping chains short via periodic re-snapshotting
//!
//! # Quick Start
//!
//! ```
//! use reslog::{
//!     HistoryWriter, MemoryStore, MutationOutcome, Operation, Reconstructor, ResourceIdentity,
//! };
//!
//! let store = MemoryStore::new();
//! let writer = HistoryWriter::new(&store);
//! let identity = ResourceIdentity::namespaced("prod", "deployment", "web", "default");
//!
//! let first = writer
//!     .record_mutation(MutationOutcome {
//!         identity: identity.clone(),
//!         operation: Operation::Create,
//!         previous: None,
//!         current: b"replicas: 1\n",
//!         success: true,
//!         error: None,
//!         operator: "alice",
//!     })
//!     .unwrap();
//!
//! let reconstructor = Reconstructor::new(&store, Default::default());
//! assert_eq!(reconstructor.materialize(first).unwrap(), "replicas: 1\n");
//! ```

pub mod chain;
pub mod diff;
pub mod error;
pub mod identity;
pub mod record;
pub mod store;
pub mod writer;

pub use chain::{ChainStats, Reconstructor};
pub use diff::{Delta, DiffLimits, Edit, decode, encode, render};
pub use error::HistoryError;
pub use identity::ResourceIdentity;
pub use record::{HistoryRecord, Operation, Payload, PayloadKind, RecordMeta};
pub use store::{HistoryPage, HistoryStore, MemoryStore, RecordDraft};
pub use writer::{HistoryWriter, MutationOutcome, WritePolicy};
