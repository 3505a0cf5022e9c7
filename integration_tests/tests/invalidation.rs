mod common;

use bevy::{math::UVec2, prelude::*};
use overlay_core::{
    build_overlay_app, run_tick, DefRef, DomainCache, InvalidationKind, MapId, OnMap, OverlayHosts,
    OverlayInvalidationEvent, Placed,
};

const MAP: MapId = MapId(0);

fn send_invalidation(world: &mut World, entity: Entity, kind: InvalidationKind) {
    world
        .resource_mut::<Events<OverlayInvalidationEvent>>()
        .send(OverlayInvalidationEvent {
            map: MAP,
            entity,
            kind,
        });
}

fn generation(app: &App) -> u64 {
    app.world
        .resource::<OverlayHosts>()
        .get(MAP)
        .unwrap()
        .power_cache()
        .unwrap()
        .generation()
}

fn conduit_count(app: &App) -> usize {
    app.world
        .resource::<OverlayHosts>()
        .get(MAP)
        .unwrap()
        .power_cache()
        .unwrap()
        .conduit_count()
}

#[test]
fn unreported_changes_wait_for_the_periodic_interval() {
    common::ensure_test_config();
    let mut app = build_overlay_app();
    common::register_map(&mut app.world, MAP, UVec2::new(8, 8));
    let cable = common::register_cable_def(&mut app.world);
    app.world.spawn((
        OnMap(MAP),
        Placed {
            cell: UVec2::new(0, 0),
        },
        DefRef(cable),
    ));
    run_tick(&mut app);
    assert_eq!(generation(&app), 1);
    assert_eq!(conduit_count(&app), 1);

    // Spawn a second conduit but tell nobody.
    app.world.spawn((
        OnMap(MAP),
        Placed {
            cell: UVec2::new(1, 0),
        },
        DefRef(cable),
    ));
    run_tick(&mut app);
    assert_eq!(generation(&app), 1);
    assert_eq!(conduit_count(&app), 1);

    // The fixture interval is five ticks; the periodic rebuild catches up.
    for _ in 0..5 {
        run_tick(&mut app);
    }
    assert_eq!(generation(&app), 2);
    assert_eq!(conduit_count(&app), 2);
}

#[test]
fn reported_spawn_rebuilds_on_the_next_tick() {
    common::ensure_test_config();
    let mut app = build_overlay_app();
    common::register_map(&mut app.world, MAP, UVec2::new(8, 8));
    let cable = common::register_cable_def(&mut app.world);
    app.world.spawn((
        OnMap(MAP),
        Placed {
            cell: UVec2::new(0, 0),
        },
        DefRef(cable),
    ));
    run_tick(&mut app);

    let added = app
        .world
        .spawn((
            OnMap(MAP),
            Placed {
                cell: UVec2::new(1, 0),
            },
            DefRef(cable),
        ))
        .id();
    send_invalidation(&mut app.world, added, InvalidationKind::Spawned);
    run_tick(&mut app);

    assert_eq!(generation(&app), 2);
    assert_eq!(conduit_count(&app), 2);
}

#[test]
fn irrelevant_entity_does_not_trigger_a_rebuild() {
    common::ensure_test_config();
    let mut app = build_overlay_app();
    common::register_map(&mut app.world, MAP, UVec2::new(8, 8));
    let cable = common::register_cable_def(&mut app.world);
    app.world.spawn((
        OnMap(MAP),
        Placed {
            cell: UVec2::new(0, 0),
        },
        DefRef(cable),
    ));
    run_tick(&mut app);

    // A placed entity with no power-relevant components.
    let bystander = app
        .world
        .spawn((
            OnMap(MAP),
            Placed {
                cell: UVec2::new(4, 4),
            },
        ))
        .id();
    send_invalidation(&mut app.world, bystander, InvalidationKind::Spawned);
    run_tick(&mut app);

    assert_eq!(generation(&app), 1);
}

#[test]
fn despawn_reported_late_still_invalidates() {
    common::ensure_test_config();
    let mut app = build_overlay_app();
    common::register_map(&mut app.world, MAP, UVec2::new(8, 8));
    let cable = common::register_cable_def(&mut app.world);
    let doomed = app
        .world
        .spawn((
            OnMap(MAP),
            Placed {
                cell: UVec2::new(0, 0),
            },
            DefRef(cable),
        ))
        .id();
    app.world.spawn((
        OnMap(MAP),
        Placed {
            cell: UVec2::new(2, 2),
        },
        DefRef(cable),
    ));
    run_tick(&mut app);
    assert_eq!(conduit_count(&app), 2);

    // The entity is already gone when the event is drained; the host cannot
    // classify it and dirties every domain instead.
    send_invalidation(&mut app.world, doomed, InvalidationKind::Despawned);
    app.world.despawn(doomed);
    run_tick(&mut app);

    assert_eq!(generation(&app), 2);
    assert_eq!(conduit_count(&app), 1);
}

#[test]
fn invalidation_for_unregistered_map_is_dropped() {
    common::ensure_test_config();
    let mut app = build_overlay_app();
    common::register_map(&mut app.world, MAP, UVec2::new(8, 8));
    run_tick(&mut app);

    let stray = app.world.spawn_empty().id();
    app.world
        .resource_mut::<Events<OverlayInvalidationEvent>>()
        .send(OverlayInvalidationEvent {
            map: MapId(99),
            entity: stray,
            kind: InvalidationKind::Spawned,
        });
    // Must not panic or disturb the registered map.
    run_tick(&mut app);
    assert_eq!(generation(&app), 1);
}
