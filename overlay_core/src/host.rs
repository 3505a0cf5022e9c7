//! Per-map overlay hosts and the ECS systems that drive them.
//!
//! Each registered map owns a [`MapOverlayHost`] holding one slot per domain
//! provider. Hosts react to map lifecycle events and invalidation events, and
//! a per-tick step system rebuilds whichever slots are due. A failed rebuild
//! quarantines the slot: the error is logged and remembered, the cache keeps
//! serving its last published snapshot, and the slot stays dirty so the next
//! scheduled pass retries.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use bevy::{math::UVec2, prelude::*};
use tracing::{debug, info, warn};

use crate::{
    cache::{DomainCache, PowerDomainCache},
    map::{MapGrid, MapId, MapTable},
    provider::{DomainProvider, DomainRegistry, RebuildError},
    resources::{DefCatalog, OverlayConfig, RenderFrame, SimTick},
};

/// Map registration and teardown, published by the embedding simulation.
#[derive(Event, Debug, Clone, PartialEq, Eq)]
pub enum MapLifecycleEvent {
    Registered { map: MapId, size: UVec2 },
    Removed { map: MapId },
}

/// What changed about an entity. Only used for diagnostics; every kind
/// invalidates the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationKind {
    Spawned,
    /// Must be sent before the entity is actually despawned; a host that can
    /// no longer inspect the entity falls back to dirtying every domain.
    Despawned,
    CapabilityChanged,
    SwitchToggled,
    DemandChanged,
}

#[derive(Event, Debug, Clone)]
pub struct OverlayInvalidationEvent {
    pub map: MapId,
    pub entity: Entity,
    pub kind: InvalidationKind,
}

/// One domain's cache plus its scheduling state.
struct DomainSlot {
    provider: Arc<dyn DomainProvider>,
    cache: Box<dyn DomainCache>,
    last_built_tick: Option<u64>,
    last_interactive_frame: Option<u64>,
    last_rebuild: Option<Duration>,
    last_error: Option<String>,
}

impl DomainSlot {
    fn new(provider: Arc<dyn DomainProvider>, map: &MapGrid) -> Self {
        let cache = provider.create_cache(map);
        Self {
            provider,
            cache,
            last_built_tick: None,
            last_interactive_frame: None,
            last_rebuild: None,
            last_error: None,
        }
    }

    fn should_rebuild(&self, now_tick: u64) -> bool {
        if self.cache.dirty() {
            return true;
        }
        match self.last_built_tick {
            None => true,
            Some(built) => {
                now_tick.saturating_sub(built) >= self.provider.rebuild_interval_ticks()
            }
        }
    }

    fn rebuild(&mut self, world: &World, map: &MapGrid, map_id: MapId, now_tick: u64) {
        let started = Instant::now();
        match self
            .provider
            .rebuild(world, map, map_id, self.cache.as_mut())
        {
            Ok(()) => {
                self.last_rebuild = Some(started.elapsed());
                self.last_built_tick = Some(now_tick);
                self.last_error = None;
                debug!(
                    map = map_id.0,
                    domain = self.provider.domain_id(),
                    generation = self.cache.generation(),
                    elapsed_us = self.last_rebuild.map(|d| d.as_micros() as u64),
                    "overlay rebuilt"
                );
            }
            Err(err) => {
                warn!(
                    map = map_id.0,
                    domain = self.provider.domain_id(),
                    error = %err,
                    "overlay rebuild failed, serving stale snapshot"
                );
                self.last_error = Some(err.to_string());
                self.cache.set_dirty(true);
            }
        }
    }
}

/// Read-only view of a slot, for diagnostics and metrics.
pub struct DomainStatus<'a> {
    pub domain_id: &'static str,
    pub dirty: bool,
    pub generation: u64,
    pub primary_count: usize,
    pub secondary_count: usize,
    pub last_rebuild: Option<Duration>,
    pub last_error: Option<&'a str>,
}

/// All overlay domain caches for a single map.
pub struct MapOverlayHost {
    map_id: MapId,
    slots: Vec<DomainSlot>,
}

impl MapOverlayHost {
    pub fn new(map_id: MapId, map: &MapGrid, registry: &DomainRegistry) -> Self {
        let slots = registry
            .providers()
            .iter()
            .map(|provider| DomainSlot::new(Arc::clone(provider), map))
            .collect();
        Self { map_id, slots }
    }

    pub fn map_id(&self) -> MapId {
        self.map_id
    }

    /// Rebuild every slot that is dirty or past its periodic interval.
    pub fn step(&mut self, world: &World, map: &MapGrid, now_tick: u64) {
        for slot in &mut self.slots {
            if slot.should_rebuild(now_tick) {
                slot.rebuild(world, map, self.map_id, now_tick);
            }
        }
    }

    /// Rebuild dirty slots immediately for an interactive consumer, rate
    /// limited per render frame so a repeatedly-invalidated overlay cannot
    /// trigger a rebuild every frame.
    pub fn ensure_interactive_current(
        &mut self,
        world: &World,
        map: &MapGrid,
        now_tick: u64,
        frame: u64,
        min_frame_interval: u64,
    ) -> Result<(), RebuildError> {
        let mut first_error = None;
        for slot in &mut self.slots {
            if !slot.cache.dirty() {
                continue;
            }
            let throttled = slot
                .last_interactive_frame
                .is_some_and(|last| frame.saturating_sub(last) < min_frame_interval);
            if throttled {
                continue;
            }
            slot.last_interactive_frame = Some(frame);
            slot.rebuild(world, map, self.map_id, now_tick);
            if let Some(message) = &slot.last_error {
                if first_error.is_none() {
                    first_error = Some(RebuildError::Provider(message.clone()));
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn mark_domain_dirty(&mut self, domain: &str) -> bool {
        let mut found = false;
        for slot in &mut self.slots {
            if slot.provider.domain_id().eq_ignore_ascii_case(domain) {
                slot.cache.set_dirty(true);
                found = true;
            }
        }
        found
    }

    pub fn mark_all_dirty(&mut self) {
        for slot in &mut self.slots {
            slot.cache.set_dirty(true);
        }
    }

    /// Dirty exactly the domains that consider `entity` relevant. An entity
    /// the world no longer knows about dirties everything, since there is
    /// nothing left to classify.
    pub fn mark_dirty_for_entity(&mut self, world: &World, entity: Entity, catalog: &DefCatalog) {
        if world.get_entity(entity).is_none() {
            self.mark_all_dirty();
            return;
        }
        for slot in &mut self.slots {
            if slot.provider.is_entity_relevant(world, entity, catalog) {
                slot.cache.set_dirty(true);
            }
        }
    }

    pub fn cache(&self, domain: &str) -> Option<&dyn DomainCache> {
        self.slots
            .iter()
            .find(|slot| slot.provider.domain_id().eq_ignore_ascii_case(domain))
            .map(|slot| slot.cache.as_ref())
    }

    /// Typed access to the power cache, the common case for consumers.
    pub fn power_cache(&self) -> Option<&PowerDomainCache> {
        self.cache(crate::classify::POWER_DOMAIN_ID)
            .and_then(|cache| cache.as_any().downcast_ref::<PowerDomainCache>())
    }

    pub fn domains(&self) -> impl Iterator<Item = DomainStatus<'_>> {
        self.slots.iter().map(|slot| DomainStatus {
            domain_id: slot.provider.domain_id(),
            dirty: slot.cache.dirty(),
            generation: slot.cache.generation(),
            primary_count: slot.cache.primary_count(),
            secondary_count: slot.cache.secondary_count(),
            last_rebuild: slot.last_rebuild,
            last_error: slot.last_error.as_deref(),
        })
    }
}

/// Host table, one entry per registered map.
#[derive(Resource, Default)]
pub struct OverlayHosts {
    hosts: HashMap<MapId, MapOverlayHost>,
}

impl OverlayHosts {
    pub fn get(&self, map: MapId) -> Option<&MapOverlayHost> {
        self.hosts.get(&map)
    }

    pub fn get_mut(&mut self, map: MapId) -> Option<&mut MapOverlayHost> {
        self.hosts.get_mut(&map)
    }

    pub fn insert(&mut self, host: MapOverlayHost) {
        self.hosts.insert(host.map_id(), host);
    }

    pub fn remove(&mut self, map: MapId) -> Option<MapOverlayHost> {
        self.hosts.remove(&map)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MapOverlayHost> {
        self.hosts.values()
    }
}

/// Registers and tears down hosts as maps come and go.
pub fn apply_map_lifecycle(world: &mut World) {
    let events: Vec<MapLifecycleEvent> = world
        .resource_mut::<Events<MapLifecycleEvent>>()
        .drain()
        .collect();
    if events.is_empty() {
        return;
    }

    let registry = world.resource::<DomainRegistry>().clone();
    for event in events {
        match event {
            MapLifecycleEvent::Registered { map, size } => {
                let grid = MapGrid::new(size);
                let host = MapOverlayHost::new(map, &grid, &registry);
                world.resource_mut::<MapTable>().insert(map, grid);
                world.resource_mut::<OverlayHosts>().insert(host);
                info!(map = map.0, width = size.x, height = size.y, "map registered");
            }
            MapLifecycleEvent::Removed { map } => {
                world.resource_mut::<MapTable>().remove(map);
                world.resource_mut::<OverlayHosts>().remove(map);
                info!(map = map.0, "map removed");
            }
        }
    }
}

/// Routes invalidation events to the affected map's host, dirtying only the
/// domains that classify the entity as relevant.
pub fn drain_invalidation_events(world: &mut World) {
    let events: Vec<OverlayInvalidationEvent> = world
        .resource_mut::<Events<OverlayInvalidationEvent>>()
        .drain()
        .collect();
    if events.is_empty() {
        return;
    }

    world.resource_scope(|world, mut hosts: Mut<OverlayHosts>| {
        world.resource_scope(|world, catalog: Mut<DefCatalog>| {
            for event in events {
                let Some(host) = hosts.get_mut(event.map) else {
                    debug!(map = event.map.0, "invalidation for unregistered map dropped");
                    continue;
                };
                host.mark_dirty_for_entity(world, event.entity, &catalog);
            }
        });
    });
}

/// Per-tick driver: rebuild due slots on every host, and emit a periodic
/// proof-of-life summary.
pub fn step_hosts(world: &mut World) {
    let now_tick = world.resource::<SimTick>().tick;
    let proof_interval = world.resource::<OverlayConfig>().proof_log_interval_ticks;

    world.resource_scope(|world, mut hosts: Mut<OverlayHosts>| {
        let table = world.resource::<MapTable>().clone();
        for (map_id, grid) in table.iter() {
            if let Some(host) = hosts.get_mut(*map_id) {
                host.step(world, grid, now_tick);
            }
        }
    });

    if proof_interval > 0 && now_tick % proof_interval == 0 {
        let hosts = world.resource::<OverlayHosts>();
        for host in hosts.iter() {
            for status in host.domains() {
                info!(
                    tick = now_tick,
                    map = host.map_id().0,
                    domain = status.domain_id,
                    generation = status.generation,
                    conduits = status.primary_count,
                    users = status.secondary_count,
                    dirty = status.dirty,
                    "overlay status"
                );
            }
        }
    }
}

/// Bring every dirty domain on `map` up to date before an interactive query,
/// honoring the configured per-frame rate limit.
pub fn ensure_interactive_current(world: &mut World, map: MapId) -> Result<(), RebuildError> {
    let now_tick = world.resource::<SimTick>().tick;
    let frame = world.resource::<RenderFrame>().frame;
    let min_interval = world
        .resource::<OverlayConfig>()
        .interactive_rebuild_frame_interval;
    let grid = world
        .resource::<MapTable>()
        .get(map)
        .cloned()
        .ok_or(RebuildError::UnknownMap(map))?;

    world.resource_scope(|world, mut hosts: Mut<OverlayHosts>| {
        let host = hosts.get_mut(map).ok_or(RebuildError::UnknownMap(map))?;
        host.ensure_interactive_current(world, &grid, now_tick, frame, min_interval)
    })
}
