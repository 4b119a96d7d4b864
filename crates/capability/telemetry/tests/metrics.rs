use gw_telemetry::{
    GatewayMetrics, metrics, record_read_fresh, record_read_stale, record_readings_pushed,
};

#[test]
fn counters_accumulate() {
    let before = metrics().snapshot();
    record_readings_pushed(4);
    record_read_fresh();
    record_read_stale();
    let after = metrics().snapshot();

    assert!(after.readings_pushed >= before.readings_pushed + 4);
    assert!(after.reads_fresh > before.reads_fresh);
    assert!(after.reads_stale > before.reads_stale);
}

#[test]
fn snapshot_serializes_to_json() {
    let snapshot = GatewayMetrics::new().snapshot();
    let json = snapshot.to_json();
    assert!(json.contains("\"polls\":0"));
    assert!(json.contains("\"coarse_ticks\":0"));
}
