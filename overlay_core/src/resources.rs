//! Configuration, clocks, and the static definition catalog.

use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

use bevy::prelude::*;
use serde::Deserialize;
use thiserror::Error;

use crate::grids::ConduitKind;

/// Environment variable naming an optional JSON config file.
pub const OVERLAY_CONFIG_ENV: &str = "OVERLAY_CONFIG_PATH";

/// Tunables for rebuild scheduling and diagnostics.
#[derive(Resource, Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Ticks between periodic rebuilds when nothing marks a domain dirty.
    pub rebuild_interval_ticks: u64,
    /// Minimum render frames between rebuilds triggered by interactive
    /// queries while the simulation clock is frozen.
    pub interactive_rebuild_frame_interval: u64,
    /// Ticks between periodic debug summaries of cache contents. Zero
    /// disables the log.
    pub proof_log_interval_ticks: u64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            rebuild_interval_ticks: 250,
            interactive_rebuild_frame_interval: 30,
            proof_log_interval_ticks: 300,
        }
    }
}

impl OverlayConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, OverlayConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| OverlayConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let config = OverlayConfig::from_json_str(&contents)?;
        Ok(config)
    }

    /// Load from the path named by [`OVERLAY_CONFIG_ENV`], falling back to
    /// defaults when the variable is unset or the file cannot be used.
    pub fn load_or_default() -> Self {
        let Ok(path) = env::var(OVERLAY_CONFIG_ENV) else {
            return Self::default();
        };
        match Self::from_file(Path::new(&path)) {
            Ok(config) => {
                tracing::info!(path, "loaded overlay config");
                config
            }
            Err(error) => {
                tracing::warn!(path, %error, "falling back to default overlay config");
                Self::default()
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum OverlayConfigError {
    #[error("failed to parse overlay config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read overlay config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Handle into [`DefCatalog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DefId(pub u32);

/// Static per-definition flags, immutable once registered.
#[derive(Debug, Clone)]
pub struct EntityDef {
    pub name: String,
    pub is_conduit: bool,
    pub conduit_kind: Option<ConduitKind>,
}

impl EntityDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_conduit: false,
            conduit_kind: None,
        }
    }

    pub fn conduit(name: impl Into<String>, kind: Option<ConduitKind>) -> Self {
        Self {
            name: name.into(),
            is_conduit: true,
            conduit_kind: kind,
        }
    }
}

/// Descriptor-table override keyed by definition name: lets deployments
/// reclassify a definition without touching entity logic.
#[derive(Debug, Clone)]
pub struct OverlayDescriptor {
    pub domain: Option<String>,
    pub relevant: bool,
    pub conduit: bool,
    pub user: bool,
    pub conduit_kind: Option<ConduitKind>,
}

impl Default for OverlayDescriptor {
    fn default() -> Self {
        Self {
            domain: None,
            relevant: true,
            conduit: false,
            user: false,
            conduit_kind: None,
        }
    }
}

/// Catalog of static definitions plus the descriptor override table.
#[derive(Resource, Debug, Default, Clone)]
pub struct DefCatalog {
    defs: Vec<EntityDef>,
    descriptors: HashMap<String, OverlayDescriptor>,
}

impl DefCatalog {
    pub fn register_def(&mut self, def: EntityDef) -> DefId {
        let id = DefId(self.defs.len() as u32);
        self.defs.push(def);
        id
    }

    pub fn def(&self, id: DefId) -> Option<&EntityDef> {
        self.defs.get(id.0 as usize)
    }

    pub fn set_descriptor(&mut self, target_def_name: impl Into<String>, descriptor: OverlayDescriptor) {
        self.descriptors.insert(target_def_name.into(), descriptor);
    }

    pub fn descriptor_for(&self, def_name: &str) -> Option<&OverlayDescriptor> {
        self.descriptors.get(def_name)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

/// The simulation clock, advanced once per update.
#[derive(Resource, Debug, Default, Clone, Copy)]
pub struct SimTick {
    pub tick: u64,
}

/// Render-frame counter, advanced by the embedding renderer. Interactive
/// rebuild pacing keys off this rather than the (possibly frozen) sim clock.
#[derive(Resource, Debug, Default, Clone, Copy)]
pub struct RenderFrame {
    pub frame: u64,
}

pub fn advance_tick(mut tick: ResMut<SimTick>) {
    tick.tick += 1;
}
