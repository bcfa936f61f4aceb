use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Linear blend between two values of the same type.
pub trait Lerp {
    fn lerp(&self, other: &Self, t: f32) -> Self;
}

/// `a * (1 - t) + b * t`, which lands exactly on `a` at 0 and `b` at 1.
pub fn lerp_f32(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

impl Lerp for f32 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        lerp_f32(*self, *other, t)
    }
}

impl Lerp for f64 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        let t = f64::from(t);
        self * (1.0 - t) + other * t
    }
}

impl Lerp for Vec3 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        *self * (1.0 - t) + *other * t
    }
}

/// A quantity tracked across simulation ticks.
///
/// `current` is what the simulation reads and writes; `previous` is the value
/// at the end of the prior tick. Renderers sample between the two so motion
/// stays smooth when frames and ticks do not line up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interpolated<T> {
    previous: T,
    current: T,
}

impl<T: Clone> Interpolated<T> {
    pub fn new(value: T) -> Self {
        Self {
            previous: value.clone(),
            current: value,
        }
    }

    pub fn current(&self) -> &T {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut T {
        &mut self.current
    }

    pub fn previous(&self) -> &T {
        &self.previous
    }

    pub fn set(&mut self, value: T) {
        self.current = value;
    }

    /// Overwrites both slots so the next frames do not blend from the old value.
    pub fn teleport(&mut self, value: T) {
        self.previous = value.clone();
        self.current = value;
    }

    /// Called at the start of each tick, before any system writes `current`.
    pub fn commit(&mut self) {
        self.previous = self.current.clone();
    }
}

impl<T: Clone + Lerp> Interpolated<T> {
    pub fn sample(&self, alpha: f32) -> T {
        if alpha <= 0.0 {
            self.previous.clone()
        } else if alpha >= 1.0 {
            self.current.clone()
        } else {
            self.previous.lerp(&self.current, alpha)
        }
    }
}

impl<T: Clone + Default> Default for Interpolated<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Fraction of a tick the accumulator holds, clamped to `[0, 1]`.
pub fn interpolation_alpha(accumulator: Duration, tick_interval: Duration) -> f32 {
    if tick_interval.is_zero() {
        return 1.0;
    }
    let alpha = accumulator.as_secs_f64() / tick_interval.as_secs_f64();
    alpha.clamp(0.0, 1.0) as f32
}
