// Human-readable unified diff rendering.
//
// Display-only: the output is never used as a reconstruction payload.
// Equal runs are collapsed to a few context lines around each change, and
// oversized input or output is replaced with a placeholder comment line.

use std::time::Instant;

use crate::diff::codec::{DiffLimits, Edit, diff_lines, split_lines};

/// Context lines shown on each side of a change.
const CONTEXT_LINES: usize = 3;

/// Maximum label length after sanitizing.
const MAX_LABEL_LEN: usize = 100;

/// Render a truncated, context-windowed unified diff between `old` and
/// `new` for UI display.
///
/// Labels are sanitized (control characters stripped, length capped) before
/// they reach the `---`/`+++` header. Oversized inputs, oversized output
/// and identical inputs each produce a single placeholder comment line.
pub fn render(old: &str, new: &str, old_label: &str, new_label: &str, limits: &DiffLimits) -> String {
    if old.len() > limits.max_input || new.len() > limits.max_input {
        return "# content too large to diff\n".to_owned();
    }
    if old == new {
        return "# no changes\n".to_owned();
    }

    let mut out = String::new();
    out.push_str("--- ");
    out.push_str(&sanitize_label(old_label));
    out.push_str("\n+++ ");
    out.push_str(&sanitize_label(new_label));
    out.push('\n');

    let old_lines = split_lines(old);
    let new_lines = split_lines(new);
    let deadline = Instant::now() + limits.budget;
    let edits = match diff_lines(&old_lines, &new_lines, deadline) {
        Some(edits) => edits,
        // Budget gone: show the whole change as remove-all/insert-all.
        None => vec![
            Edit::Delete(old_lines.iter().map(|l| (*l).to_owned()).collect()),
            Edit::Insert(new_lines.iter().map(|l| (*l).to_owned()).collect()),
        ],
    };

    let mut pos = 0usize;
    for edit in &edits {
        match edit {
            Edit::Keep(n) => {
                let run = &old_lines[pos..pos + n];
                pos += n;
                if run.len() > 2 * CONTEXT_LINES {
                    for line in &run[..CONTEXT_LINES] {
                        push_line(&mut out, ' ', line);
                    }
                    out.push_str("...\n");
                    for line in &run[run.len() - CONTEXT_LINES..] {
                        push_line(&mut out, ' ', line);
                    }
                } else {
                    for line in run {
                        push_line(&mut out, ' ', line);
                    }
                }
            }
            Edit::Delete(lines) => {
                for line in lines {
                    push_line(&mut out, '-', line);
                }
                pos += lines.len();
            }
            Edit::Insert(lines) => {
                for line in lines {
                    push_line(&mut out, '+', line);
                }
            }
        }
    }

    if out.len() > limits.max_delta {
        return "# diff too large to display\n".to_owned();
    }
    out
}

fn push_line(out: &mut String, prefix: char, line: &str) {
    out.push(prefix);
    out.push_str(line.strip_suffix('\n').unwrap_or(line));
    out.push('\n');
}

/// Strip control characters and cap length so labels cannot inject into
/// the rendered header.
fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_LABEL_LEN)
        .collect();
    if cleaned.is_empty() {
        "untitled".to_owned()
    } else {
        cleaned
    }
}
