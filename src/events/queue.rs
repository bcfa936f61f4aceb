use crate::ecs::{EcsError, World};
use crate::scene::SceneError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Typed command queued for processing during a simulation tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl GameEvent {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, GameEventError> {
        T::deserialize(&self.payload).map_err(|source| GameEventError::Payload {
            kind: self.kind.clone(),
            source,
        })
    }
}

#[derive(Debug, Error)]
pub enum GameEventError {
    #[error("no handler registered for game event '{0}'")]
    Unhandled(String),
    #[error("invalid payload for game event '{kind}': {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("game event '{kind}' rejected: {reason}")]
    Rejected { kind: String, reason: String },
    #[error(transparent)]
    Ecs(#[from] EcsError),
    #[error(transparent)]
    Scene(#[from] SceneError),
}

pub type GameEventHandler =
    Box<dyn FnMut(&mut World, &GameEvent) -> Result<(), GameEventError> + Send>;

/// Routes game events to the handler registered for their kind.
#[derive(Default)]
pub struct GameEventDispatcher {
    handlers: HashMap<String, GameEventHandler>,
}

impl GameEventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `kind`; returns `true` if it replaced one.
    pub fn register<F>(&mut self, kind: &str, handler: F) -> bool
    where
        F: FnMut(&mut World, &GameEvent) -> Result<(), GameEventError> + Send + 'static,
    {
        let replaced = self
            .handlers
            .insert(kind.to_string(), Box::new(handler))
            .is_some();
        if replaced {
            log::warn!("[events] handler for '{kind}' replaced");
        }
        replaced
    }

    pub fn handles(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    pub fn dispatch(&mut self, world: &mut World, event: &GameEvent) -> Result<(), GameEventError> {
        let handler = self
            .handlers
            .get_mut(&event.kind)
            .ok_or_else(|| GameEventError::Unhandled(event.kind.clone()))?;
        handler(world, event)
    }
}
