use super::Entity;
use crate::render::RenderAdapter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use thiserror::Error;

/// Network snapshot slot a component reports into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotRole {
    Position,
    Health,
    State,
}

#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("failed to serialize component '{tag}': {source}")]
    Serialize {
        tag: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to deserialize component '{tag}': {source}")]
    Deserialize {
        tag: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("component '{tag}' rejected state: {reason}")]
    InvalidState { tag: String, reason: String },
}

/// Behaviour attached to a game object.
///
/// Every hook except the tag, the `Any` accessors and the blob round-trip has a
/// no-op default so plain data components stay small.
pub trait Component: Send + Sync + 'static {
    fn type_tag(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Called once when the component is added to `owner`.
    fn on_attach(&mut self, _owner: Entity) {}

    fn update(&mut self, _delta_seconds: f32) {}

    /// Snapshots interpolated state at the end of a simulation tick.
    fn commit_tick(&mut self) {}

    /// Pushes render-facing state; `alpha` blends the last two ticks.
    fn present(&self, _owner: Entity, _alpha: f32, _renderer: &mut dyn RenderAdapter) {}

    fn dispose(&mut self) {}

    fn serialize(&self) -> Result<Value, ComponentError>;

    fn deserialize(&mut self, blob: &Value) -> Result<(), ComponentError>;

    fn snapshot_role(&self) -> Option<SnapshotRole> {
        None
    }

    fn snapshot(&self) -> Result<Value, ComponentError> {
        self.serialize()
    }

    fn apply_snapshot(&mut self, blob: &Value) -> Result<(), ComponentError> {
        self.deserialize(blob)
    }
}

/// Components with a statically known tag, used for typed lookups.
pub trait TypedComponent: Component + Sized {
    const TAG: &'static str;
}

pub fn to_blob<T: Serialize>(tag: &str, value: &T) -> Result<Value, ComponentError> {
    serde_json::to_value(value).map_err(|source| ComponentError::Serialize {
        tag: tag.to_string(),
        source,
    })
}

pub fn from_blob<T: DeserializeOwned>(tag: &str, blob: &Value) -> Result<T, ComponentError> {
    T::deserialize(blob).map_err(|source| ComponentError::Deserialize {
        tag: tag.to_string(),
        source,
    })
}
