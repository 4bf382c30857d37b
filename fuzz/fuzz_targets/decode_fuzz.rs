#![no_main]
use libfuzzer_sys::fuzz_target;
use reslog::{Delta, DiffLimits};

// Decode must never panic: arbitrary (possibly hostile) deltas against an
// arbitrary base either apply cleanly or fail with an explicit error.
fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let split = (data[0] as usize).min(data.len() - 1);
    let (base_bytes, delta_bytes) = data[1..].split_at(split.min(data.len() - 1));

    let base = String::from_utf8_lossy(base_bytes);
    let Ok(delta) = serde_json::from_slice::<Delta>(delta_bytes) else {
        return;
    };

    let limits = DiffLimits::default();
    let _ = reslog::decode(&base, &delta, &limits);
});
