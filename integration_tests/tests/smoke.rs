mod common;

use overlay_core::{build_overlay_app, run_tick, OverlayMetrics, SimTick};

#[test]
fn app_initializes() {
    common::ensure_test_config();
    let mut app = build_overlay_app();
    // run a single update tick to ensure the schedule executes without panic
    app.update();
}

#[test]
fn ticks_advance_and_metrics_follow() {
    common::ensure_test_config();
    let mut app = build_overlay_app();
    for _ in 0..3 {
        run_tick(&mut app);
    }
    assert_eq!(app.world.resource::<SimTick>().tick, 3);

    let metrics = app.world.resource::<OverlayMetrics>();
    assert_eq!(metrics.tick, 3);
    assert_eq!(metrics.map_count, 0);
    assert_eq!(metrics.domain_count, 0);
}

#[test]
fn metrics_resource_serializes() {
    common::ensure_test_config();
    let mut app = build_overlay_app();
    run_tick(&mut app);

    let metrics = app.world.resource::<OverlayMetrics>();
    let json = serde_json::to_value(metrics).expect("metrics serialize");
    assert!(json.get("total_conduits").is_some());
    assert!(json.get("dirty_domains").is_some());
}
