use crate::ecs::{Component, ComponentError, SnapshotRole, TypedComponent, from_blob, to_blob};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;

pub const HEALTH_TAG: &str = "health";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Health {
    current: f32,
    max: f32,
}

impl Default for Health {
    fn default() -> Self {
        Self::new(100.0)
    }
}

impl Health {
    pub fn new(max: f32) -> Self {
        let max = max.max(0.0);
        Self { current: max, max }
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn is_alive(&self) -> bool {
        self.current > 0.0
    }

    /// Applies `amount` damage. Returns `true` only on the hit that kills.
    pub fn damage(&mut self, amount: f32) -> bool {
        if !self.is_alive() {
            return false;
        }
        self.current = (self.current - amount.max(0.0)).max(0.0);
        !self.is_alive()
    }

    pub fn heal(&mut self, amount: f32) {
        self.current = (self.current + amount.max(0.0)).min(self.max);
    }
}

impl Component for Health {
    fn type_tag(&self) -> &'static str {
        HEALTH_TAG
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn serialize(&self) -> Result<Value, ComponentError> {
        to_blob(HEALTH_TAG, self)
    }

    fn deserialize(&mut self, blob: &Value) -> Result<(), ComponentError> {
        let state: Health = from_blob(HEALTH_TAG, blob)?;
        if state.max < 0.0 || state.current > state.max {
            return Err(ComponentError::InvalidState {
                tag: HEALTH_TAG.into(),
                reason: format!("current {} outside 0..={}", state.current, state.max),
            });
        }
        *self = Self {
            current: state.current.max(0.0),
            max: state.max,
        };
        Ok(())
    }

    fn snapshot_role(&self) -> Option<SnapshotRole> {
        Some(SnapshotRole::Health)
    }
}

impl TypedComponent for Health {
    const TAG: &'static str = HEALTH_TAG;
}
