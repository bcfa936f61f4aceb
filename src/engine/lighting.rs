//! Day/night cycle driving the scene's sun light.

use super::config::DEFAULT_DAY_LENGTH_SECONDS;
use super::interpolation::{Interpolated, Lerp, lerp_f32};
use crate::ecs::{
    Component, ComponentError, Entity, SnapshotRole, TypedComponent, from_blob, to_blob,
};
use crate::render::RenderAdapter;
use crate::scene::Vec3;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::f32::consts::TAU;

pub const DAY_NIGHT_TAG: &str = "dayNightCycle";

const HOURS_PER_DAY: f32 = 24.0;
const NIGHT_INTENSITY: f32 = 0.08;
const NOON_COLOR: Vec3 = Vec3::new(1.0, 0.97, 0.9);
const HORIZON_COLOR: Vec3 = Vec3::new(1.0, 0.55, 0.3);
const MOON_COLOR: Vec3 = Vec3::new(0.35, 0.4, 0.65);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SunState {
    /// Direction the light travels, pointing away from the sun.
    pub direction: Vec3,
    pub intensity: f32,
    pub color: Vec3,
}

impl SunState {
    /// Sun placement for `hour` in `[0, 24)`: rising at 6, overhead at 12,
    /// setting at 18.
    pub fn at_hour(hour: f32) -> Self {
        let angle = (hour - 6.0) / HOURS_PER_DAY * TAU;
        let elevation = angle.sin();
        let direction = Vec3::new(-angle.cos(), -elevation, 0.25).normalize();
        if elevation <= 0.0 {
            return Self {
                direction,
                intensity: NIGHT_INTENSITY,
                color: MOON_COLOR,
            };
        }
        Self {
            direction,
            intensity: NIGHT_INTENSITY + (1.0 - NIGHT_INTENSITY) * elevation,
            color: Lerp::lerp(&HORIZON_COLOR, &NOON_COLOR, elevation),
        }
    }
}

impl Lerp for SunState {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            direction: Lerp::lerp(&self.direction, &other.direction, t).normalize_or_zero(),
            intensity: lerp_f32(self.intensity, other.intensity, t),
            color: Lerp::lerp(&self.color, &other.color, t),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CycleState {
    time_of_day: f32,
    day_length_seconds: f32,
}

/// Advances the time of day each update and presents the sun to the renderer.
pub struct DayNightCycle {
    time_of_day: f32,
    day_length_seconds: f32,
    sun: Interpolated<SunState>,
}

impl Default for DayNightCycle {
    fn default() -> Self {
        Self::new(12.0, DEFAULT_DAY_LENGTH_SECONDS)
    }
}

impl DayNightCycle {
    pub fn new(start_hour: f32, day_length_seconds: f32) -> Self {
        let time_of_day = start_hour.rem_euclid(HOURS_PER_DAY);
        Self {
            time_of_day,
            day_length_seconds: day_length_seconds.max(f32::EPSILON),
            sun: Interpolated::new(SunState::at_hour(time_of_day)),
        }
    }

    pub fn time_of_day(&self) -> f32 {
        self.time_of_day
    }

    pub fn day_length_seconds(&self) -> f32 {
        self.day_length_seconds
    }

    pub fn set_time_of_day(&mut self, hour: f32) {
        self.time_of_day = hour.rem_euclid(HOURS_PER_DAY);
        self.sun.teleport(SunState::at_hour(self.time_of_day));
    }

    pub fn is_daytime(&self) -> bool {
        (6.0..18.0).contains(&self.time_of_day)
    }

    pub fn sun(&self) -> &SunState {
        self.sun.current()
    }

    pub fn sample_sun(&self, alpha: f32) -> SunState {
        self.sun.sample(alpha)
    }
}

impl Component for DayNightCycle {
    fn type_tag(&self) -> &'static str {
        DAY_NIGHT_TAG
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn update(&mut self, delta_seconds: f32) {
        let advanced = self.time_of_day + delta_seconds / self.day_length_seconds * HOURS_PER_DAY;
        self.time_of_day = advanced.rem_euclid(HOURS_PER_DAY);
        self.sun.set(SunState::at_hour(self.time_of_day));
    }

    fn commit_tick(&mut self) {
        self.sun.commit();
    }

    fn present(&self, _owner: Entity, alpha: f32, renderer: &mut dyn RenderAdapter) {
        renderer.set_lighting(&self.sample_sun(alpha));
    }

    fn serialize(&self) -> Result<Value, ComponentError> {
        to_blob(
            DAY_NIGHT_TAG,
            &CycleState {
                time_of_day: self.time_of_day,
                day_length_seconds: self.day_length_seconds,
            },
        )
    }

    fn deserialize(&mut self, blob: &Value) -> Result<(), ComponentError> {
        let state: CycleState = from_blob(DAY_NIGHT_TAG, blob)?;
        if state.day_length_seconds.is_nan() || state.day_length_seconds <= 0.0 {
            return Err(ComponentError::InvalidState {
                tag: DAY_NIGHT_TAG.into(),
                reason: format!("day length {} must be positive", state.day_length_seconds),
            });
        }
        self.day_length_seconds = state.day_length_seconds;
        self.set_time_of_day(state.time_of_day);
        Ok(())
    }

    fn snapshot_role(&self) -> Option<SnapshotRole> {
        Some(SnapshotRole::State)
    }
}

impl TypedComponent for DayNightCycle {
    const TAG: &'static str = DAY_NIGHT_TAG;
}
