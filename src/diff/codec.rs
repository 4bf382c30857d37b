// Line-based delta codec.
//
// `encode` computes a shortest-edit-script delta between two texts;
// `decode` reapplies it to reconstruct the second text from the first.
// Both are pure. Guards keep the codec safe under oversized or adversarial
// input:
//   - inputs over `max_input` degrade to the `TooLarge` sentinel
//   - scripts over `max_delta` degrade to the `TooLarge` sentinel
//   - search past `budget` degrades to a whole-text `Replace`
//
// Deletes carry the expected base lines, so `decode` detects a drifted or
// corrupted base instead of silently emitting wrong text.

use std::time::{Duration, Instant};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::HistoryError;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Size and time guards for diff computation.
#[derive(Debug, Clone)]
pub struct DiffLimits {
    /// Maximum size of either input text, in bytes.
    pub max_input: usize,
    /// Maximum carried size of a computed delta, in bytes.
    pub max_delta: usize,
    /// Computation budget for the edit-script search.
    pub budget: Duration,
}

impl Default for DiffLimits {
    fn default() -> Self {
        Self {
            max_input: 2 * 1024 * 1024, // 2 MiB per side
            max_delta: 5 * 1024 * 1024, // 5 MiB
            budget: Duration::from_secs(2),
        }
    }
}

// ---------------------------------------------------------------------------
// Delta types
// ---------------------------------------------------------------------------

/// One step of a line-based edit script.
///
/// Lines are newline-inclusive slices of the input, so applying a script is
/// plain concatenation and there is no trailing-newline ambiguity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Edit {
    /// Copy the next `n` base lines unchanged.
    Keep(usize),
    /// Remove these lines from the base. The expected text is carried so
    /// apply can verify the base has not drifted.
    Delete(Vec<String>),
    /// Insert these lines.
    Insert(Vec<String>),
}

/// A serializable delta between two text blobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delta {
    /// Line-based edit script relative to the base text.
    Edits(Vec<Edit>),
    /// Whole-text replacement, produced when the edit-script search ran
    /// out of budget. Decodes without consulting the base.
    Replace(String),
    /// Size-guard sentinel: nothing was stored because an input or the
    /// computed script was `len` bytes, over the configured limit.
    TooLarge { len: usize },
}

impl Delta {
    /// Bytes of carried line text plus a small per-edit overhead.
    pub fn carried_size(&self) -> usize {
        match self {
            Delta::Edits(edits) => edits.iter().map(edit_size).sum(),
            Delta::Replace(text) => text.len(),
            Delta::TooLarge { .. } => 0,
        }
    }

    /// True if this delta is the degraded size-guard sentinel.
    pub fn is_too_large(&self) -> bool {
        matches!(self, Delta::TooLarge { .. })
    }
}

const EDIT_OVERHEAD: usize = 8;

fn edit_size(edit: &Edit) -> usize {
    match edit {
        Edit::Keep(_) => EDIT_OVERHEAD,
        Edit::Delete(lines) | Edit::Insert(lines) => {
            EDIT_OVERHEAD + lines.iter().map(String::len).sum::<usize>()
        }
    }
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Compute a delta such that `decode(old, &encode(old, new, limits), limits)`
/// reconstructs `new` exactly.
///
/// Never fails: guard trips return the [`Delta::TooLarge`] sentinel and
/// budget exhaustion returns [`Delta::Replace`], both logged. Two calls
/// with identical inputs decode to the same `new`.
pub fn encode(old: &str, new: &str, limits: &DiffLimits) -> Delta {
    if old.len() > limits.max_input || new.len() > limits.max_input {
        warn!(
            "text too large to diff: old={} new={} max={}",
            old.len(),
            new.len(),
            limits.max_input
        );
        return Delta::TooLarge {
            len: old.len().max(new.len()),
        };
    }

    let old_lines = split_lines(old);
    let new_lines = split_lines(new);
    let deadline = Instant::now() + limits.budget;

    let delta = match diff_lines(&old_lines, &new_lines, deadline) {
        Some(edits) => Delta::Edits(edits),
        None => {
            warn!(
                "diff budget exhausted after {:?}, degrading to whole-text replace",
                limits.budget
            );
            Delta::Replace(new.to_owned())
        }
    };

    let size = delta.carried_size();
    if size > limits.max_delta {
        warn!(
            "computed delta too large: {size} bytes exceeds {}",
            limits.max_delta
        );
        return Delta::TooLarge { len: size };
    }
    delta
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Reapply a delta to its base text.
///
/// Any edit that does not land cleanly on the base — wrong line content,
/// out-of-bounds copy, leftover base lines — fails with
/// [`HistoryError::PartialApplyFailure`] instead of returning truncated
/// text. Decoding a [`Delta::TooLarge`] sentinel fails with
/// [`HistoryError::PayloadTooLarge`].
pub fn decode(old: &str, delta: &Delta, limits: &DiffLimits) -> Result<String, HistoryError> {
    if old.len() > limits.max_input {
        return Err(HistoryError::PayloadTooLarge {
            len: old.len(),
            max: limits.max_input,
        });
    }
    match delta {
        Delta::Replace(text) => Ok(text.clone()),
        Delta::TooLarge { len } => Err(HistoryError::PayloadTooLarge {
            len: *len,
            max: limits.max_delta,
        }),
        Delta::Edits(edits) => apply_edits(old, edits),
    }
}

fn apply_edits(old: &str, edits: &[Edit]) -> Result<String, HistoryError> {
    let lines = split_lines(old);
    let mut pos = 0usize;
    let mut out = String::with_capacity(old.len());

    for edit in edits {
        match edit {
            Edit::Keep(n) => {
                let end = pos.checked_add(*n).filter(|&end| end <= lines.len());
                let Some(end) = end else {
                    return Err(apply_failure(format!(
                        "keep of {n} lines at line {pos} runs past base ({} lines)",
                        lines.len()
                    )));
                };
                for line in &lines[pos..end] {
                    out.push_str(line);
                }
                pos = end;
            }
            Edit::Delete(expected) => {
                for want in expected {
                    let Some(got) = lines.get(pos) else {
                        return Err(apply_failure(format!(
                            "delete at line {pos} runs past base ({} lines)",
                            lines.len()
                        )));
                    };
                    if got != want {
                        return Err(apply_failure(format!(
                            "base drifted at line {pos}: expected {want:?}, found {got:?}"
                        )));
                    }
                    pos += 1;
                }
            }
            Edit::Insert(added) => {
                for line in added {
                    out.push_str(line);
                }
            }
        }
    }

    if pos != lines.len() {
        return Err(apply_failure(format!(
            "{} base lines left unconsumed after final edit",
            lines.len() - pos
        )));
    }
    Ok(out)
}

fn apply_failure(detail: String) -> HistoryError {
    HistoryError::PartialApplyFailure { detail }
}

// ---------------------------------------------------------------------------
// Line diff (Myers shortest edit script)
// ---------------------------------------------------------------------------

/// Split into newline-inclusive line slices; concatenating the slices
/// reproduces the input exactly.
pub(crate) fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

/// Line diff between `old` and `new`. Returns `None` if `deadline` passes
/// (or the search frontier would allocate unreasonably) before a script is
/// found; callers degrade to a whole-text replace.
pub(crate) fn diff_lines(old: &[&str], new: &[&str], deadline: Instant) -> Option<Vec<Edit>> {
    // Trim the common prefix and suffix first; the typical resource edit
    // touches a handful of lines, which keeps the quadratic search tiny.
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let mut suffix = 0;
    while suffix < old.len() - prefix
        && suffix < new.len() - prefix
        && old[old.len() - 1 - suffix] == new[new.len() - 1 - suffix]
    {
        suffix += 1;
    }

    let mid_old = &old[prefix..old.len() - suffix];
    let mid_new = &new[prefix..new.len() - suffix];

    let mut edits = EditBuilder::default();
    edits.keep(prefix);
    for op in myers(mid_old, mid_new, deadline)? {
        match op {
            RawOp::Keep => edits.keep(1),
            RawOp::Delete(i) => edits.delete(mid_old[i]),
            RawOp::Insert(j) => edits.insert(mid_new[j]),
        }
    }
    edits.keep(suffix);
    Some(edits.finish())
}

/// Per-line diff op over the trimmed middle, indexed into old/new.
enum RawOp {
    Keep,
    Delete(usize),
    Insert(usize),
}

/// Accumulates per-line ops into coalesced `Edit` runs.
#[derive(Default)]
struct EditBuilder {
    edits: Vec<Edit>,
}

impl EditBuilder {
    fn keep(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        match self.edits.last_mut() {
            Some(Edit::Keep(run)) => *run += n,
            _ => self.edits.push(Edit::Keep(n)),
        }
    }

    fn delete(&mut self, line: &str) {
        match self.edits.last_mut() {
            Some(Edit::Delete(lines)) => lines.push(line.to_owned()),
            _ => self.edits.push(Edit::Delete(vec![line.to_owned()])),
        }
    }

    fn insert(&mut self, line: &str) {
        match self.edits.last_mut() {
            Some(Edit::Insert(lines)) => lines.push(line.to_owned()),
            _ => self.edits.push(Edit::Insert(vec![line.to_owned()])),
        }
    }

    fn finish(self) -> Vec<Edit> {
        self.edits
    }
}

/// Cap on total search-frontier cells kept for backtracking (~256 MiB).
const MAX_SEARCH_CELLS: usize = 1 << 25;

/// Greedy O(ND) shortest-edit-script search with full backtrack trace.
///
/// Returns per-line ops in forward order, or `None` when the deadline or
/// the frontier memory cap is hit.
fn myers(a: &[&str], b: &[&str], deadline: Instant) -> Option<Vec<RawOp>> {
    if a.is_empty() {
        return Some((0..b.len()).map(RawOp::Insert).collect());
    }
    if b.is_empty() {
        return Some((0..a.len()).map(RawOp::Delete).collect());
    }

    let n = a.len() as isize;
    let m = b.len() as isize;
    let offset = n + m;
    let width = 2 * offset as usize + 1;

    let mut v = vec![0isize; width];
    let mut trace: Vec<Vec<isize>> = Vec::new();

    // Forward search: furthest-reaching x per diagonal k, one frontier
    // snapshot per edit distance d for the backtrack.
    let mut found = false;
    'search: for d in 0..=offset {
        if Instant::now() >= deadline || (trace.len() + 1) * width > MAX_SEARCH_CELLS {
            return None;
        }
        trace.push(v.clone());
        let mut k = -d;
        while k <= d {
            let idx = (k + offset) as usize;
            let mut x = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
                v[idx + 1]
            } else {
                v[idx - 1] + 1
            };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[idx] = x;
            if x >= n && y >= m {
                found = true;
                break 'search;
            }
            k += 2;
        }
    }
    if !found {
        // d is bounded by n + m, so the break above always fires first;
        // degrade rather than panic if that invariant ever breaks.
        return None;
    }

    // Backtrack from (n, m) through the snapshots, emitting ops newest
    // first.
    let mut ops = Vec::new();
    let (mut x, mut y) = (n, m);
    for (d, v) in trace.iter().enumerate().rev() {
        let d = d as isize;
        let k = x - y;
        let idx = (k + offset) as usize;
        let prev_k = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = v[(prev_k + offset) as usize];
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            ops.push(RawOp::Keep);
            x -= 1;
            y -= 1;
        }
        if d > 0 {
            if x == prev_x {
                ops.push(RawOp::Insert((y - 1) as usize));
                y -= 1;
            } else {
                ops.push(RawOp::Delete((x - 1) as usize));
                x -= 1;
            }
        }
        x = prev_x;
        y = prev_y;
    }

    ops.reverse();
    Some(ops)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
