use bevy::{math::UVec2, prelude::*};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use overlay_core::{
    ConduitKind, DefCatalog, DefRef, DomainProvider, EntityDef, MapGrid, MapId, OnMap, Placed,
    PowerDomainProvider, PowerTrader,
};

struct Layout {
    world: World,
    map: MapGrid,
}

/// Conduit trunk lines every fourth row with consumers scattered alongside,
/// roughly the density of a built-out colony map.
fn grid_layout(size: u32) -> Layout {
    let mut world = World::new();
    let mut catalog = DefCatalog::default();
    let cable = catalog.register_def(EntityDef::conduit("cable", Some(ConduitKind::Standard)));
    world.insert_resource(catalog);

    let map_id = MapId(0);
    let map = MapGrid::new(UVec2::new(size, size));

    for y in (0..size).step_by(4) {
        for x in 0..size {
            world.spawn((
                OnMap(map_id),
                Placed {
                    cell: UVec2::new(x, y),
                },
                DefRef(cable),
            ));
        }
        for x in (1..size).step_by(5) {
            if y + 1 < size {
                world.spawn((
                    OnMap(map_id),
                    Placed {
                        cell: UVec2::new(x, y + 1),
                    },
                    PowerTrader {
                        power_output: 0.0,
                        base_consumption: 60.0,
                        idle_draw: 0.0,
                        powered_on: true,
                    },
                ));
            }
        }
    }

    Layout { world, map }
}

/// Single serpentine conduit covering most of the map: one huge network,
/// worst case for the flood fill.
fn serpentine_layout(size: u32) -> Layout {
    let mut world = World::new();
    let mut catalog = DefCatalog::default();
    let cable = catalog.register_def(EntityDef::conduit("cable", Some(ConduitKind::Standard)));
    world.insert_resource(catalog);

    let map_id = MapId(0);
    let map = MapGrid::new(UVec2::new(size, size));

    for y in 0..size {
        let cells: Vec<u32> = if y % 2 == 0 {
            (0..size).collect()
        } else {
            vec![if (y / 2) % 2 == 0 { size - 1 } else { 0 }]
        };
        for x in cells {
            world.spawn((
                OnMap(map_id),
                Placed {
                    cell: UVec2::new(x, y),
                },
                DefRef(cable),
            ));
        }
    }

    Layout { world, map }
}

fn run_rebuild(layout: &mut Layout) {
    let provider = PowerDomainProvider::new(250);
    let mut cache = provider.create_cache(&layout.map);
    provider
        .rebuild(&layout.world, &layout.map, MapId(0), cache.as_mut())
        .expect("rebuild");
}

fn bench_rebuild(c: &mut Criterion) {
    overlay_core::init_tracing();
    let mut group = c.benchmark_group("overlay_rebuild");

    for size in [32u32, 64, 128] {
        group.bench_with_input(BenchmarkId::new("trunk_grid", size), &size, |b, &size| {
            b.iter_batched(
                || grid_layout(size),
                |mut layout| run_rebuild(&mut layout),
                BatchSize::SmallInput,
            );
        });

        group.bench_with_input(BenchmarkId::new("serpentine", size), &size, |b, &size| {
            b.iter_batched(
                || serpentine_layout(size),
                |mut layout| run_rebuild(&mut layout),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(rebuild_benches, bench_rebuild);
criterion_main!(rebuild_benches);
