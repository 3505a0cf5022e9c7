//! Aggregate overlay health counters, refreshed once per tick, plus a
//! JSON-friendly per-cache export for external debug tooling.

use bevy::prelude::*;
use serde::Serialize;

use crate::{
    cache::{DomainCache, PowerDomainCache},
    classify::{NodeCoreState, NodeIdentity},
    grids::ConduitKind,
    host::OverlayHosts,
    map::MapTable,
    net_state::NetState,
    resources::SimTick,
};

/// Snapshot of overlay state across every map, cheap enough to publish each
/// tick and serialize for external inspection.
#[derive(Resource, Debug, Default, Clone, Serialize)]
pub struct OverlayMetrics {
    pub tick: u64,
    pub map_count: usize,
    pub domain_count: usize,
    pub total_conduits: usize,
    pub total_users: usize,
    pub total_net_groups: usize,
    pub dirty_domains: usize,
    /// Slowest rebuild observed across all live slots.
    pub last_rebuild_micros: u64,
}

pub fn collect_metrics(
    tick: Res<SimTick>,
    maps: Res<MapTable>,
    hosts: Res<OverlayHosts>,
    mut metrics: ResMut<OverlayMetrics>,
) {
    let mut out = OverlayMetrics {
        tick: tick.tick,
        map_count: maps.len(),
        ..OverlayMetrics::default()
    };

    for host in hosts.iter() {
        for status in host.domains() {
            out.domain_count += 1;
            out.total_conduits += status.primary_count;
            out.total_users += status.secondary_count;
            if status.dirty {
                out.dirty_domains += 1;
            }
            if let Some(elapsed) = status.last_rebuild {
                out.last_rebuild_micros = out.last_rebuild_micros.max(elapsed.as_micros() as u64);
            }
        }
        if let Some(power) = host.power_cache() {
            out.total_net_groups += power.net_groups().len();
        }
    }

    *metrics = out;
}

/// One labeled network, flattened for export.
#[derive(Debug, Clone, Serialize)]
pub struct NetGroupExport {
    pub net_id: u32,
    pub cell_count: u32,
    pub color_seed: u32,
    pub state: NetState,
}

/// One power user marker, minus its entity id.
#[derive(Debug, Clone, Serialize)]
pub struct UserExport {
    pub identity: NodeIdentity,
    pub core_state: NodeCoreState,
    pub value01: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConduitKindCount {
    pub kind: ConduitKind,
    pub count: usize,
}

/// Serializable snapshot of one map's published power cache.
#[derive(Debug, Clone, Serialize)]
pub struct PowerCacheExport {
    pub generation: u64,
    pub conduit_count: usize,
    pub user_count: usize,
    pub conduit_kinds: Vec<ConduitKindCount>,
    pub nets: Vec<NetGroupExport>,
    pub users: Vec<UserExport>,
}

pub fn export_power_cache(cache: &PowerDomainCache) -> PowerCacheExport {
    let mut conduit_kinds: Vec<ConduitKindCount> = Vec::new();
    for record in cache.conduits() {
        match conduit_kinds.iter_mut().find(|entry| entry.kind == record.kind) {
            Some(entry) => entry.count += 1,
            None => conduit_kinds.push(ConduitKindCount {
                kind: record.kind,
                count: 1,
            }),
        }
    }

    PowerCacheExport {
        generation: cache.generation(),
        conduit_count: cache.conduit_count(),
        user_count: cache.user_count(),
        conduit_kinds,
        nets: cache
            .net_groups()
            .iter()
            .map(|group| NetGroupExport {
                net_id: group.net_id,
                cell_count: group.cell_count,
                color_seed: group.color_seed,
                state: group.state,
            })
            .collect(),
        users: cache
            .users()
            .iter()
            .map(|marker| UserExport {
                identity: marker.identity,
                core_state: marker.core_state,
                value01: marker.value01,
            })
            .collect(),
    }
}
