mod common;

use bevy::math::UVec2;
use overlay_core::{
    build_overlay_app, ensure_interactive_current, run_tick, DefRef, DomainCache, MapId, OnMap,
    OverlayHosts, Placed, RebuildError, RenderFrame,
};

const MAP: MapId = MapId(0);

fn generation(app: &bevy::prelude::App) -> u64 {
    app.world
        .resource::<OverlayHosts>()
        .get(MAP)
        .unwrap()
        .power_cache()
        .unwrap()
        .generation()
}

fn mark_power_dirty(app: &mut bevy::prelude::App) {
    app.world
        .resource_mut::<OverlayHosts>()
        .get_mut(MAP)
        .unwrap()
        .mark_domain_dirty("power");
}

#[test]
fn interactive_query_rebuilds_a_dirty_cache_immediately() {
    common::ensure_test_config();
    let mut app = build_overlay_app();
    common::register_map(&mut app.world, MAP, UVec2::new(8, 8));
    let cable = common::register_cable_def(&mut app.world);
    app.world.spawn((
        OnMap(MAP),
        Placed {
            cell: UVec2::new(3, 3),
        },
        DefRef(cable),
    ));
    run_tick(&mut app);
    assert_eq!(generation(&app), 1);

    mark_power_dirty(&mut app);
    ensure_interactive_current(&mut app.world, MAP).expect("interactive rebuild");
    assert_eq!(generation(&app), 2);
}

#[test]
fn interactive_rebuilds_are_rate_limited_per_frame() {
    common::ensure_test_config();
    let mut app = build_overlay_app();
    common::register_map(&mut app.world, MAP, UVec2::new(8, 8));
    run_tick(&mut app);

    mark_power_dirty(&mut app);
    ensure_interactive_current(&mut app.world, MAP).unwrap();
    assert_eq!(generation(&app), 2);

    // Dirty again inside the 30-frame fixture window: the query is served
    // from the stale snapshot instead of rebuilding.
    mark_power_dirty(&mut app);
    app.world.resource_mut::<RenderFrame>().frame += 10;
    ensure_interactive_current(&mut app.world, MAP).unwrap();
    assert_eq!(generation(&app), 2);

    // Past the window the rebuild happens.
    app.world.resource_mut::<RenderFrame>().frame += 30;
    ensure_interactive_current(&mut app.world, MAP).unwrap();
    assert_eq!(generation(&app), 3);
}

#[test]
fn interactive_query_for_unknown_map_fails() {
    common::ensure_test_config();
    let mut app = build_overlay_app();
    run_tick(&mut app);

    let err = ensure_interactive_current(&mut app.world, MapId(42)).unwrap_err();
    assert!(matches!(err, RebuildError::UnknownMap(MapId(42))));
}
