//! Whole-world persistence: every object's blob plus the parent links of the
//! transform graph, written as one JSON document.

use super::{Component, EcsError, Entity, GameObjectData, TypedComponent, World};
use crate::scene::NodeComponent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SAVE_FORMAT_VERSION: &str = "1.0.0";

pub type ComponentFactory = fn() -> Box<dyn Component>;

fn make_default<T: TypedComponent + Default>() -> Box<dyn Component> {
    Box::new(T::default())
}

/// Maps component tags to constructors so a save can be rebuilt without
/// knowing concrete types up front.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    factories: HashMap<String, ComponentFactory>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the engine's own components.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry
            .register::<NodeComponent>()
            .register::<crate::engine::lighting::DayNightCycle>();
        registry
    }

    pub fn register<T: TypedComponent + Default>(&mut self) -> &mut Self {
        self.factories
            .insert(T::TAG.to_string(), make_default::<T> as ComponentFactory);
        self
    }

    pub fn register_factory(&mut self, tag: &str, factory: ComponentFactory) -> &mut Self {
        self.factories.insert(tag.to_string(), factory);
        self
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    pub fn create(&self, tag: &str) -> Option<Box<dyn Component>> {
        self.factories.get(tag).map(|factory| factory())
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentLink {
    pub child: String,
    pub parent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldSave {
    pub version: String,
    pub saved_at: DateTime<Utc>,
    pub objects: Vec<GameObjectData>,
    #[serde(default)]
    pub hierarchy: Vec<ParentLink>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct LoadReport {
    pub spawned: Vec<Entity>,
    pub unknown_components: Vec<String>,
    pub component_failures: usize,
    pub broken_links: Vec<ParentLink>,
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("failed to access save file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed save data: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Ecs(#[from] EcsError),
}

impl WorldSave {
    pub fn write_json(&self, path: &Path) -> Result<(), SaveError> {
        let encoded = serde_json::to_string_pretty(self)?;
        fs::write(path, encoded).map_err(|source| SaveError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn read_json(path: &Path) -> Result<Self, SaveError> {
        let raw = fs::read_to_string(path).map_err(|source| SaveError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }
}

impl World {
    pub fn save(&self) -> WorldSave {
        let hierarchy = self
            .objects()
            .filter_map(|(entity, object)| {
                let parent = self.parent_of(entity)?;
                let parent = self.get(parent)?;
                Some(ParentLink {
                    child: object.id().to_string(),
                    parent: parent.id().to_string(),
                })
            })
            .collect();
        WorldSave {
            version: SAVE_FORMAT_VERSION.to_string(),
            saved_at: Utc::now(),
            objects: self.serialize_all(),
            hierarchy,
        }
    }

    /// Spawns every saved object into this world and restores parent links.
    ///
    /// Tags without a registered factory are skipped and listed in the report.
    /// A duplicate id aborts the load.
    pub fn load(
        &mut self,
        save: &WorldSave,
        registry: &ComponentRegistry,
    ) -> Result<LoadReport, SaveError> {
        let mut report = LoadReport::default();
        for data in &save.objects {
            let entity = self.spawn_with_id(&data.object_type, data.id.clone())?;
            let Some(object) = self.get_mut(entity) else {
                continue;
            };
            for tag in data.components.keys() {
                match registry.create(tag) {
                    Some(component) => {
                        let _ = object.add_boxed(component);
                    }
                    None => {
                        log::warn!("[save] no factory for component '{tag}' on {}", data.id);
                        report.unknown_components.push(tag.clone());
                    }
                }
            }
            let restored = object.deserialize(data);
            report.component_failures += restored.failed.len();
            report.spawned.push(entity);
        }

        for link in &save.hierarchy {
            let resolved = self.find(&link.child).zip(self.find(&link.parent));
            let linked = match resolved {
                Some((child, parent)) => self.set_parent(child, Some(parent)).map_err(|err| {
                    log::warn!("[save] cannot restore {} -> {}: {err}", link.child, link.parent);
                }),
                None => Err(()),
            };
            if linked.is_err() {
                report.broken_links.push(link.clone());
            }
        }

        log::info!(
            "[save] loaded {} objects ({} unknown components, {} broken links)",
            report.spawned.len(),
            report.unknown_components.len(),
            report.broken_links.len()
        );
        Ok(report)
    }
}
