#![no_main]
use libfuzzer_sys::fuzz_target;
use reslog::DiffLimits;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    // First byte picks the split between "old" and "new".
    let split = (data[0] as usize * data.len()) / 256;
    let payload = &data[1..];
    let split = split.min(payload.len());
    let old = String::from_utf8_lossy(&payload[..split]);
    let new = String::from_utf8_lossy(&payload[split..]);

    let limits = DiffLimits::default();
    let delta = reslog::encode(&old, &new, &limits);
    let decoded = reslog::decode(&old, &delta, &limits).unwrap();
    assert_eq!(decoded, new);
});
