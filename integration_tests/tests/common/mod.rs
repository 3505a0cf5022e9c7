use std::path::PathBuf;
use std::sync::Once;

use bevy::{math::UVec2, prelude::*};
use overlay_core::{
    ConduitKind, DefCatalog, DefId, EntityDef, MapId, MapLifecycleEvent, OVERLAY_CONFIG_ENV,
};

static INIT: Once = Once::new();

pub fn ensure_test_config() {
    INIT.call_once(|| {
        overlay_core::init_tracing();

        let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("test_overlay_config.json");

        debug_assert!(
            config_path.exists(),
            "missing test overlay config at {}",
            config_path.display()
        );

        std::env::set_var(OVERLAY_CONFIG_ENV, &config_path);
    });
}

/// Register a def for a plain transmission cable and return its id.
#[allow(dead_code)]
pub fn register_cable_def(world: &mut World) -> DefId {
    let mut catalog = world.resource_mut::<DefCatalog>();
    catalog.register_def(EntityDef::conduit("power_cable", Some(ConduitKind::Standard)))
}

#[allow(dead_code)]
pub fn register_map(world: &mut World, map: MapId, size: UVec2) {
    world
        .resource_mut::<Events<MapLifecycleEvent>>()
        .send(MapLifecycleEvent::Registered { map, size });
}
