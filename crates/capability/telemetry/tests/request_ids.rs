use devsim_telemetry::{metrics, new_request_ids, record_scheduler_tick, record_transmission_attempt};

#[test]
fn request_ids_non_empty() {
    let ids = new_request_ids();
    assert!(!ids.request_id.is_empty());
    assert!(!ids.trace_id.is_empty());
    assert_ne!(ids.request_id, ids.trace_id);
}

#[test]
fn counters_accumulate() {
    let before = metrics().snapshot();
    record_transmission_attempt(true);
    record_transmission_attempt(false);
    record_scheduler_tick();
    let after = metrics().snapshot();
    assert!(after.automatic_transmissions > before.automatic_transmissions);
    assert!(after.manual_transmissions > before.manual_transmissions);
    assert!(after.scheduler_ticks > before.scheduler_ticks);
}
