// End-to-end tests over writer + store + reconstructor, including the
// concurrency and corruption scenarios.

use std::sync::Barrier;

use reslog::{
    Delta, DiffLimits, Edit, HistoryError, HistoryRecord, HistoryStore, HistoryWriter,
    MemoryStore, MutationOutcome, Operation, Payload, PayloadKind, Reconstructor, RecordDraft,
    ResourceIdentity, WritePolicy,
};

fn identity(name: &str) -> ResourceIdentity {
    ResourceIdentity::namespaced("prod", "deployment", name, "default")
}

fn outcome<'a>(name: &str, operation: Operation, current: &'a [u8]) -> MutationOutcome<'a> {
    MutationOutcome {
        identity: identity(name),
        operation,
        previous: None,
        current,
        success: true,
        error: None,
        operator: "alice",
    }
}

fn snapshot_draft(id: &ResourceIdentity, text: &str) -> RecordDraft {
    RecordDraft {
        identity: id.clone(),
        operation: Operation::Create,
        payload: Payload::Snapshot(text.to_owned()),
        parent: None,
        success: true,
        error: None,
        operator: "alice".into(),
    }
}

fn diff_draft(id: &ResourceIdentity, old: &str, new: &str, parent: u64) -> RecordDraft {
    RecordDraft {
        identity: id.clone(),
        operation: Operation::Update,
        payload: Payload::Diff(reslog::encode(old, new, &DiffLimits::default())),
        parent: Some(parent),
        success: true,
        error: None,
        operator: "alice".into(),
    }
}

#[test]
fn scenario_first_record_snapshot_and_materialize() {
    // Identity with no records: a create lands as a snapshot holding the
    // exact text.
    let store = MemoryStore::new();
    let writer = HistoryWriter::new(&store);
    let seq = writer
        .record_mutation(outcome("x", Operation::Create, b"replicas: 1"))
        .unwrap();

    let record = store.get(seq).unwrap();
    assert_eq!(record.payload, Payload::Snapshot("replicas: 1".into()));

    let reconstructor = Reconstructor::new(&store, DiffLimits::default());
    assert_eq!(reconstructor.materialize(seq).unwrap(), "replicas: 1");
}

#[test]
fn scenario_update_diffs_and_history_stays_intact() {
    let store = MemoryStore::new();
    let writer = HistoryWriter::new(&store);
    let first = writer
        .record_mutation(outcome("x", Operation::Create, b"replicas: 1"))
        .unwrap();
    let second = writer
        .record_mutation(outcome("x", Operation::Update, b"replicas: 3"))
        .unwrap();

    assert_eq!(store.get(second).unwrap().payload.kind(), PayloadKind::Diff);

    let reconstructor = Reconstructor::new(&store, DiffLimits::default());
    assert_eq!(reconstructor.materialize(second).unwrap(), "replicas: 3");
    // Earlier history is untouched by later writes.
    assert_eq!(reconstructor.materialize(first).unwrap(), "replicas: 1");
}

#[test]
fn first_record_per_identity_is_always_a_snapshot() {
    let store = MemoryStore::new();
    let writer = HistoryWriter::new(&store);
    for name in ["web", "api", "worker"] {
        // Even a plain update opens with a snapshot when no history exists.
        writer
            .record_mutation(outcome(name, Operation::Update, b"v1\n"))
            .unwrap();
        writer
            .record_mutation(outcome(name, Operation::Update, b"v2\n"))
            .unwrap();
    }
    for name in ["web", "api", "worker"] {
        let page = store.list_metadata(&identity(name), 1, 10).unwrap();
        let oldest = page.records.last().unwrap();
        assert_eq!(oldest.payload_kind, PayloadKind::Snapshot, "{name}");
    }
}

#[test]
fn interleaved_identities_keep_separate_chains() {
    let store = MemoryStore::new();
    let writer = HistoryWriter::new(&store);
    for i in 0..5 {
        for name in ["web", "api"] {
            let text = format!("{name} revision {i}\n");
            writer
                .record_mutation(outcome(name, Operation::Update, text.as_bytes()))
                .unwrap();
        }
    }
    let reconstructor = Reconstructor::new(&store, DiffLimits::default());
    for name in ["web", "api"] {
        let page = store.list_metadata(&identity(name), 1, 10).unwrap();
        assert_eq!(page.total, 5);
        // Every record of this identity materializes to its own text, never
        // a neighbor's.
        for meta in &page.records {
            let text = reconstructor.materialize(meta.sequence).unwrap();
            assert!(text.starts_with(name), "{name}: got {text:?}");
        }
        // Predecessor lookups never cross identities.
        let tip = page.records.first().unwrap().sequence;
        let prev = store.predecessor_of(&identity(name), tip).unwrap().unwrap();
        assert_eq!(prev.identity, identity(name));
    }
}

// ---------------------------------------------------------------------------
// Corruption (scenario: a damaged payload mid-chain)
// ---------------------------------------------------------------------------

/// Store wrapper that hands out a damaged payload for one record,
/// simulating corruption in the underlying storage.
struct CorruptingStore {
    inner: MemoryStore,
    damaged: u64,
}

impl CorruptingStore {
    fn damage(&self, record: HistoryRecord) -> HistoryRecord {
        if record.sequence == self.damaged {
            HistoryRecord {
                payload: Payload::Diff(Delta::Edits(vec![Edit::Delete(vec![
                    "#corrupted#\n".into(),
                ])])),
                ..record
            }
        } else {
            record
        }
    }
}

impl HistoryStore for CorruptingStore {
    fn append(&self, draft: RecordDraft) -> Result<HistoryRecord, HistoryError> {
        self.inner.append(draft)
    }

    fn predecessor_of(
        &self,
        identity: &ResourceIdentity,
        before: u64,
    ) -> Result<Option<HistoryRecord>, HistoryError> {
        Ok(self
            .inner
            .predecessor_of(identity, before)?
            .map(|r| self.damage(r)))
    }

    fn list_metadata(
        &self,
        identity: &ResourceIdentity,
        page: usize,
        page_size: usize,
    ) -> Result<reslog::HistoryPage, HistoryError> {
        self.inner.list_metadata(identity, page, page_size)
    }

    fn get(&self, sequence: u64) -> Result<HistoryRecord, HistoryError> {
        self.inner.get(sequence).map(|r| self.damage(r))
    }
}

#[test]
fn corrupted_mid_chain_payload_fails_later_records_only() {
    let store = MemoryStore::new();
    let writer = HistoryWriter::with_options(
        &store,
        DiffLimits::default(),
        WritePolicy {
            snapshot_interval: 0,
        },
    );
    // One snapshot followed by five diffs.
    let mut sequences = Vec::new();
    for i in 0..6 {
        let text = format!("revision: {i}\n");
        sequences.push(
            writer
                .record_mutation(outcome("x", Operation::Update, text.as_bytes()))
                .unwrap(),
        );
    }

    let corrupted = CorruptingStore {
        inner: store,
        damaged: sequences[2],
    };
    let reconstructor = Reconstructor::new(&corrupted, DiffLimits::default());

    // Records behind the damage still materialize.
    assert_eq!(
        reconstructor.materialize(sequences[1]).unwrap(),
        "revision: 1\n"
    );
    // Records past the damage surface the failure instead of returning
    // truncated content.
    for &seq in &sequences[2..] {
        assert!(
            matches!(
                reconstructor.materialize(seq),
                Err(HistoryError::PartialApplyFailure { .. })
            ),
            "record {seq} should fail"
        );
    }
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn racing_same_identity_appends_share_a_base_and_both_reconstruct() {
    // Both appends read the same predecessor before either commits: each
    // record is a valid diff against that shared base.
    let store = MemoryStore::new();
    let id = identity("x");
    let limits = DiffLimits::default();

    let base = store.append(snapshot_draft(&id, "replicas: 1\n")).unwrap();
    let base_seq = base.sequence;

    let barrier = Barrier::new(2);
    let (a, b) = std::thread::scope(|scope| {
        let winner = scope.spawn(|| {
            barrier.wait();
            store
                .append(diff_draft(&id, "replicas: 1\n", "replicas: 2\n", base_seq))
                .unwrap()
                .sequence
        });
        let loser = scope.spawn(|| {
            barrier.wait();
            store
                .append(diff_draft(&id, "replicas: 1\n", "replicas: 8\n", base_seq))
                .unwrap()
                .sequence
        });
        (winner.join().unwrap(), loser.join().unwrap())
    });

    assert_ne!(a, b);
    let reconstructor = Reconstructor::new(&store, limits);
    assert_eq!(reconstructor.materialize(a).unwrap(), "replicas: 2\n");
    assert_eq!(reconstructor.materialize(b).unwrap(), "replicas: 8\n");
}

#[test]
fn concurrent_appends_across_identities_never_collide() {
    let store = MemoryStore::new();
    let writer = HistoryWriter::new(&store);
    let names: Vec<String> = (0..4).map(|i| format!("app-{i}")).collect();

    std::thread::scope(|scope| {
        for name in &names {
            let writer = &writer;
            scope.spawn(move || {
                for i in 0..25 {
                    let text = format!("{name} revision {i}\n");
                    writer
                        .record_mutation(outcome(name, Operation::Update, text.as_bytes()))
                        .unwrap();
                }
            });
        }
    });

    assert_eq!(store.len(), 100);
    let reconstructor = Reconstructor::new(&store, DiffLimits::default());
    let mut seen = std::collections::HashSet::new();
    for name in &names {
        let page = store.list_metadata(&identity(name), 1, 25).unwrap();
        assert_eq!(page.total, 25);
        for meta in &page.records {
            assert!(seen.insert(meta.sequence), "sequence reused");
            assert_eq!(meta.identity, identity(name.as_str()));
        }
        // The newest record replays to the last write despite interleaving.
        assert_eq!(
            reconstructor
                .materialize(page.records[0].sequence)
                .unwrap(),
            format!("{name} revision 24\n")
        );
    }
}
