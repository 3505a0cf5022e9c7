//! Domain providers and the immutable provider registry.
//!
//! A provider is the stateless strategy object for one overlay domain: it
//! knows how to create a cache for a map and how to rebuild it from the live
//! world. The registry is assembled once at startup and never mutated
//! afterwards, so hosts can hold provider handles without re-validating them.

use std::sync::Arc;

use bevy::prelude::*;
use thiserror::Error;

use crate::{
    cache::{DomainCache, PowerDomainCache},
    classify::{build_node_marker, classify_power_entity, POWER_DOMAIN_ID},
    grids::ConduitKind,
    map::{MapGrid, MapId},
    net_state::resolve_net_states,
    resources::{DefCatalog, OverlayConfig},
};

#[derive(Debug, Error)]
pub enum RebuildError {
    /// The cache handed to a provider was created by a different provider.
    #[error("cache type mismatch for domain {domain:?}")]
    CacheTypeMismatch { domain: String },
    #[error("no registered map {0:?}")]
    UnknownMap(MapId),
    /// Domain-specific failure; the host quarantines the slot and retries on
    /// the next scheduled pass.
    #[error("rebuild failed: {0}")]
    Provider(String),
}

/// Strategy for one overlay domain.
pub trait DomainProvider: Send + Sync + 'static {
    /// Stable identifier, unique across the registry. Compared
    /// case-insensitively everywhere.
    fn domain_id(&self) -> &'static str;

    /// Ticks between periodic background rebuilds of a clean cache.
    fn rebuild_interval_ticks(&self) -> u64;

    fn create_cache(&self, map: &MapGrid) -> Box<dyn DomainCache>;

    /// Repopulate `cache` from the world. Must leave the cache published
    /// and clean on success, and untouched-or-dirty on failure.
    fn rebuild(
        &self,
        world: &World,
        map: &MapGrid,
        map_id: MapId,
        cache: &mut dyn DomainCache,
    ) -> Result<(), RebuildError>;

    /// Whether a change to `entity` can affect this domain's cache. Used to
    /// scope invalidation to the domains that actually care.
    fn is_entity_relevant(&self, world: &World, entity: Entity, catalog: &DefCatalog) -> bool;
}

/// The built-in power network provider.
#[derive(Debug, Clone)]
pub struct PowerDomainProvider {
    rebuild_interval_ticks: u64,
}

impl PowerDomainProvider {
    pub fn new(rebuild_interval_ticks: u64) -> Self {
        Self {
            rebuild_interval_ticks,
        }
    }
}

impl DomainProvider for PowerDomainProvider {
    fn domain_id(&self) -> &'static str {
        POWER_DOMAIN_ID
    }

    fn rebuild_interval_ticks(&self) -> u64 {
        self.rebuild_interval_ticks
    }

    fn create_cache(&self, map: &MapGrid) -> Box<dyn DomainCache> {
        Box::new(PowerDomainCache::new(map))
    }

    fn rebuild(
        &self,
        world: &World,
        map: &MapGrid,
        map_id: MapId,
        cache: &mut dyn DomainCache,
    ) -> Result<(), RebuildError> {
        let cache = cache
            .as_any_mut()
            .downcast_mut::<PowerDomainCache>()
            .ok_or_else(|| RebuildError::CacheTypeMismatch {
                domain: self.domain_id().to_owned(),
            })?;

        let fallback_catalog = DefCatalog::default();
        let catalog = world
            .get_resource::<DefCatalog>()
            .unwrap_or(&fallback_catalog);

        cache.prepare(map);
        for entity_ref in world.iter_entities() {
            let entity = entity_ref.id();
            let Some(on_map) = entity_ref.get::<crate::components::OnMap>() else {
                continue;
            };
            if on_map.0 != map_id {
                continue;
            }
            let Some(placed) = entity_ref.get::<crate::components::Placed>() else {
                continue;
            };

            let class = classify_power_entity(world, entity, catalog);
            if !class.is_overlay_relevant {
                continue;
            }
            if class.is_conduit {
                let kind = class.conduit_kind.unwrap_or(ConduitKind::Standard);
                cache.add_conduit(entity, placed.cell, kind);
            }
            if class.is_user {
                if let Some(marker) = build_node_marker(world, entity) {
                    cache.add_user(marker);
                }
            }
        }

        cache.rebuild_neighbor_masks();
        cache.rebuild_net_groups();
        resolve_net_states(world, map_id, cache);
        cache.finalize();
        Ok(())
    }

    fn is_entity_relevant(&self, world: &World, entity: Entity, catalog: &DefCatalog) -> bool {
        classify_power_entity(world, entity, catalog).is_overlay_relevant
    }
}

/// Frozen set of domain providers, assembled once at startup.
#[derive(Resource, Clone)]
pub struct DomainRegistry {
    providers: Vec<Arc<dyn DomainProvider>>,
}

impl DomainRegistry {
    pub fn new(providers: Vec<Arc<dyn DomainProvider>>) -> Self {
        Self { providers }
    }

    /// The default registry: just the power domain, paced by config.
    pub fn standard(config: &OverlayConfig) -> Self {
        Self::new(vec![Arc::new(PowerDomainProvider::new(
            config.rebuild_interval_ticks,
        ))])
    }

    pub fn providers(&self) -> &[Arc<dyn DomainProvider>] {
        &self.providers
    }

    pub fn get(&self, domain: &str) -> Option<&Arc<dyn DomainProvider>> {
        self.providers
            .iter()
            .find(|provider| provider.domain_id().eq_ignore_ascii_case(domain))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::math::UVec2;

    use crate::{
        components::{OnMap, Placed, PowerTrader},
        resources::{DefId, EntityDef},
    };

    fn world_with_catalog() -> (World, DefId) {
        let mut world = World::new();
        let mut catalog = DefCatalog::default();
        let conduit_def = catalog.register_def(EntityDef::conduit("cable", Some(ConduitKind::Standard)));
        world.insert_resource(catalog);
        (world, conduit_def)
    }

    #[test]
    fn registry_lookup_is_case_insensitive() {
        let registry = DomainRegistry::standard(&OverlayConfig::default());
        assert_eq!(registry.len(), 1);
        assert!(registry.get("power").is_some());
        assert!(registry.get("POWER").is_some());
        assert!(registry.get("heat").is_none());
    }

    #[test]
    fn rebuild_collects_conduits_and_users_for_the_map() {
        let (mut world, conduit_def) = world_with_catalog();
        let map = MapGrid::new(UVec2::new(4, 4));
        let map_id = MapId(1);

        world.spawn((
            OnMap(map_id),
            Placed {
                cell: UVec2::new(0, 0),
            },
            crate::components::DefRef(conduit_def),
        ));
        world.spawn((
            OnMap(map_id),
            Placed {
                cell: UVec2::new(1, 0),
            },
            crate::components::DefRef(conduit_def),
        ));
        world.spawn((
            OnMap(map_id),
            Placed {
                cell: UVec2::new(2, 2),
            },
            PowerTrader {
                power_output: 0.0,
                base_consumption: 5.0,
                idle_draw: 0.0,
                powered_on: true,
            },
        ));
        // Same components, wrong map: must not be collected.
        world.spawn((
            OnMap(MapId(9)),
            Placed {
                cell: UVec2::new(3, 3),
            },
            crate::components::DefRef(conduit_def),
        ));

        let provider = PowerDomainProvider::new(250);
        let mut cache = provider.create_cache(&map);
        provider
            .rebuild(&world, &map, map_id, cache.as_mut())
            .unwrap();

        let cache = cache.as_any().downcast_ref::<PowerDomainCache>().unwrap();
        assert_eq!(cache.conduit_count(), 2);
        assert_eq!(cache.user_count(), 1);
        assert!(cache.has_conduit_at(UVec2::new(1, 0)));
        assert!(!cache.has_conduit_at(UVec2::new(3, 3)));
        assert_eq!(cache.net_groups().len(), 1);
    }

    #[test]
    fn rebuild_rejects_foreign_cache() {
        #[derive(Default)]
        struct OtherCache {
            dirty: bool,
        }
        impl DomainCache for OtherCache {
            fn dirty(&self) -> bool {
                self.dirty
            }
            fn set_dirty(&mut self, dirty: bool) {
                self.dirty = dirty;
            }
            fn generation(&self) -> u64 {
                0
            }
            fn primary_count(&self) -> usize {
                0
            }
            fn secondary_count(&self) -> usize {
                0
            }
            fn primary_label(&self) -> &'static str {
                "none"
            }
            fn secondary_label(&self) -> &'static str {
                "none"
            }
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
            fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
                self
            }
        }

        let world = World::new();
        let map = MapGrid::new(UVec2::new(2, 2));
        let provider = PowerDomainProvider::new(250);
        let mut cache = OtherCache::default();
        let err = provider
            .rebuild(&world, &map, MapId(0), &mut cache)
            .unwrap_err();
        assert!(matches!(err, RebuildError::CacheTypeMismatch { .. }));
    }
}
