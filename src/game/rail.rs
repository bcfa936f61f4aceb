use crate::ecs::{Component, ComponentError, SnapshotRole, TypedComponent, from_blob, to_blob};
use crate::scene::Vec3;
use crate::scene::transform::LOCAL_FORWARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;

pub const RAIL_MOVEMENT_TAG: &str = "railMovement";

const DEFAULT_RAIL_LENGTH: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RailState {
    rail_length: f32,
    speed: f32,
    progress: f32,
    #[serde(default)]
    origin: Vec3,
    #[serde(default)]
    arrival_reported: bool,
}

/// Progress along a straight rail, stored as a fraction in `[0, 1]`.
///
/// Each update moves `speed * dt / rail_length` along the rail.
#[derive(Debug, Clone, PartialEq)]
pub struct RailMovement {
    state: RailState,
}

impl Default for RailMovement {
    fn default() -> Self {
        Self::new(DEFAULT_RAIL_LENGTH, 1.0)
    }
}

impl RailMovement {
    pub fn new(rail_length: f32, speed: f32) -> Self {
        Self {
            state: RailState {
                rail_length: rail_length.max(f32::EPSILON),
                speed,
                progress: 0.0,
                origin: Vec3::ZERO,
                arrival_reported: false,
            },
        }
    }

    pub fn with_progress(mut self, progress: f32) -> Self {
        self.set_progress(progress);
        self
    }

    /// Places the start of the rail. The rail runs along local forward.
    pub fn with_origin(mut self, origin: Vec3) -> Self {
        self.state.origin = origin;
        self
    }

    pub fn progress(&self) -> f32 {
        self.state.progress
    }

    pub fn set_progress(&mut self, progress: f32) {
        self.state.progress = progress.clamp(0.0, 1.0);
    }

    pub fn speed(&self) -> f32 {
        self.state.speed
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.state.speed = speed;
    }

    pub fn rail_length(&self) -> f32 {
        self.state.rail_length
    }

    /// Moves along the rail and returns the progress actually gained.
    pub fn advance(&mut self, delta_seconds: f32) -> f32 {
        let before = self.state.progress;
        self.set_progress(before + self.state.speed * delta_seconds / self.state.rail_length);
        self.state.progress - before
    }

    pub fn position_on_rail(&self) -> Vec3 {
        let travelled = self.state.progress * self.state.rail_length;
        self.state.origin + LOCAL_FORWARD * travelled
    }

    pub fn has_arrived(&self) -> bool {
        self.state.progress >= 1.0
    }

    pub fn arrival_reported(&self) -> bool {
        self.state.arrival_reported
    }

    /// Returns `true` the first time it is called after arriving.
    pub fn take_arrival(&mut self) -> bool {
        if self.has_arrived() && !self.state.arrival_reported {
            self.state.arrival_reported = true;
            return true;
        }
        false
    }
}

impl Component for RailMovement {
    fn type_tag(&self) -> &'static str {
        RAIL_MOVEMENT_TAG
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn update(&mut self, delta_seconds: f32) {
        self.advance(delta_seconds);
    }

    fn serialize(&self) -> Result<Value, ComponentError> {
        to_blob(RAIL_MOVEMENT_TAG, &self.state)
    }

    fn deserialize(&mut self, blob: &Value) -> Result<(), ComponentError> {
        let state: RailState = from_blob(RAIL_MOVEMENT_TAG, blob)?;
        if state.rail_length.is_nan() || state.rail_length <= 0.0 {
            return Err(ComponentError::InvalidState {
                tag: RAIL_MOVEMENT_TAG.into(),
                reason: format!("rail length {} must be positive", state.rail_length),
            });
        }
        self.state = state;
        self.set_progress(state.progress);
        Ok(())
    }

    fn snapshot_role(&self) -> Option<SnapshotRole> {
        Some(SnapshotRole::State)
    }
}

impl TypedComponent for RailMovement {
    const TAG: &'static str = RAIL_MOVEMENT_TAG;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn progress_delta_matches_speed_over_length() {
        let mut rail = RailMovement::new(50.0, 1.0).with_progress(0.4);
        let dt = 1.0 / 60.0;

        let gained = rail.advance(dt);

        assert!((gained - rail.speed() * dt / 50.0).abs() < 1e-6);
        assert!((rail.progress() - (0.4 + dt / 50.0)).abs() < 1e-6);
    }

    #[test]
    fn progress_is_clamped() {
        let mut rail = RailMovement::new(10.0, 4.0).with_progress(0.9);
        let gained = rail.advance(1.0);
        assert!((gained - 0.1).abs() < 1e-6);
        assert_eq!(rail.progress(), 1.0);

        rail.set_speed(-100.0);
        rail.advance(1.0);
        assert_eq!(rail.progress(), 0.0);
    }

    #[test]
    fn arrival_is_taken_once() {
        let mut rail = RailMovement::new(1.0, 2.0);
        assert!(!rail.take_arrival());
        rail.advance(1.0);
        assert!(rail.take_arrival());
        assert!(!rail.take_arrival());
        assert!(rail.arrival_reported());
    }

    #[test]
    fn position_follows_forward_from_origin() {
        let rail = RailMovement::new(20.0, 1.0)
            .with_origin(Vec3::X)
            .with_progress(0.5);
        assert_eq!(rail.position_on_rail(), Vec3::new(1.0, 0.0, 10.0));
    }

    #[test]
    fn blob_round_trip_clamps_and_validates() {
        let mut rail = RailMovement::default();
        rail.deserialize(&json!({ "railLength": 8.0, "speed": 2.0, "progress": 3.0 }))
            .unwrap();
        assert_eq!(rail.progress(), 1.0);
        assert_eq!(rail.rail_length(), 8.0);

        let err = rail
            .deserialize(&json!({ "railLength": 0.0, "speed": 1.0, "progress": 0.0 }))
            .unwrap_err();
        assert!(matches!(err, ComponentError::InvalidState { .. }));
        assert_eq!(rail.rail_length(), 8.0);

        let err = rail
            .deserialize(&json!({ "railLength": -4.0, "speed": 1.0, "progress": 0.0 }))
            .unwrap_err();
        assert!(matches!(err, ComponentError::InvalidState { .. }));
        assert_eq!(rail.rail_length(), 8.0);
    }

    #[test]
    fn origin_round_trips_as_array() {
        let rail = RailMovement::new(5.0, 1.0).with_origin(Vec3::new(2.0, 0.0, -1.0));
        let blob = rail.serialize().unwrap();
        assert_eq!(blob["origin"], json!([2.0, 0.0, -1.0]));

        let mut restored = RailMovement::default();
        restored.deserialize(&blob).unwrap();
        assert_eq!(restored, rail);
    }
}
