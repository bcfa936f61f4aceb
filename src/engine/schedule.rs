use super::interpolation::{Interpolated, interpolation_alpha};
use crate::ecs::World;
use crate::events::{
    DrainReport, EventStackHandle, GameEvent, GameEventDispatcher, GameEventError,
};
use std::time::{Duration, Instant};
use thiserror::Error;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(16);
pub const DEFAULT_MAX_TICKS_PER_FRAME: u32 = 8;
pub const TIME_SPEED_PRESETS: [f32; 4] = [1.0, 4.0, 8.0, 16.0];

const SLOW_SYSTEM_THRESHOLD_MS: f32 = 4.0;
const SLOW_TICK_THRESHOLD_MS: f32 = 12.0;

/// Per-tick information handed to every system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickInfo {
    pub index: u64,
    /// Tick interval in seconds scaled by the time speed.
    pub delta_seconds: f32,
    pub time_speed: f32,
    pub simulated_seconds: f64,
}

pub trait System: Send {
    fn run(&mut self, world: &mut World, tick: &TickInfo);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Runs once, before the first simulation tick.
    Startup,
    Simulation,
}

impl Stage {
    pub const fn ordered() -> [Stage; 2] {
        [Stage::Startup, Stage::Simulation]
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Startup => "Startup",
            Stage::Simulation => "Simulation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    Accumulating,
    Ticking,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScheduleError {
    #[error("time speed must be a positive finite number, got {0}")]
    InvalidTimeSpeed(f32),
    #[error("tick interval must be greater than zero")]
    ZeroInterval,
}

#[derive(Debug, Clone)]
pub struct SystemProfile {
    pub name: &'static str,
    pub stage: Stage,
    pub duration: Duration,
}

impl SystemProfile {
    pub fn duration_ms(&self) -> f32 {
        self.duration.as_secs_f64() as f32 * 1000.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct TickProfile {
    pub tick: u64,
    pub total: Duration,
    pub systems: Vec<SystemProfile>,
    pub drain: DrainReport,
}

impl TickProfile {
    pub fn total_ms(&self) -> f32 {
        self.total.as_secs_f64() as f32 * 1000.0
    }

    pub fn system(&self, name: &str) -> Option<&SystemProfile> {
        self.systems.iter().find(|profile| profile.name == name)
    }
}

/// What one call to [`Scheduler::advance`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameAdvance {
    pub ticks: u32,
    /// Whole intervals discarded because the frame fell too far behind.
    pub dropped_ticks: u32,
    pub alpha: f32,
}

struct SystemEntry {
    name: &'static str,
    system: Box<dyn System>,
}

struct StageBucket {
    stage: Stage,
    systems: Vec<SystemEntry>,
}

impl StageBucket {
    fn new(stage: Stage) -> Self {
        Self {
            stage,
            systems: Vec::new(),
        }
    }
}

/// Fixed-interval simulation driver.
///
/// Frame time is fed in through [`advance`](Self::advance) and accumulated;
/// each whole tick interval runs one tick: commit interpolation state, run
/// simulation systems in registration order, drain the game event queue once,
/// then advance the tick index and simulation clock. The time speed scales
/// the `delta_seconds` systems see, never the tick cadence.
pub struct Scheduler {
    world: World,
    events: EventStackHandle,
    dispatcher: GameEventDispatcher,
    buckets: Vec<StageBucket>,
    startup_complete: bool,
    tick_interval: Duration,
    time_speed: f32,
    max_ticks_per_frame: u32,
    accumulator: Duration,
    tick_index: u64,
    clock: Interpolated<f64>,
    phase: SchedulerPhase,
    last_profile: TickProfile,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(World::default())
    }
}

impl Scheduler {
    /// Wraps `world`, reusing its event stack or attaching a fresh one.
    pub fn new(mut world: World) -> Self {
        let events = match world.event_stack() {
            Some(events) => events.clone(),
            None => {
                let events = EventStackHandle::default();
                world.attach_event_stack(events.clone());
                events
            }
        };
        let buckets = Stage::ordered().into_iter().map(StageBucket::new).collect();
        Self {
            world,
            events,
            dispatcher: GameEventDispatcher::new(),
            buckets,
            startup_complete: false,
            tick_interval: DEFAULT_TICK_INTERVAL,
            time_speed: 1.0,
            max_ticks_per_frame: DEFAULT_MAX_TICKS_PER_FRAME,
            accumulator: Duration::ZERO,
            tick_index: 0,
            clock: Interpolated::new(0.0),
            phase: SchedulerPhase::Idle,
            last_profile: TickProfile::default(),
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn events(&self) -> &EventStackHandle {
        &self.events
    }

    pub fn dispatcher_mut(&mut self) -> &mut GameEventDispatcher {
        &mut self.dispatcher
    }

    pub fn last_profile(&self) -> &TickProfile {
        &self.last_profile
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    pub fn tick_index(&self) -> u64 {
        self.tick_index
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn set_tick_interval(&mut self, interval: Duration) -> Result<(), ScheduleError> {
        if interval.is_zero() {
            return Err(ScheduleError::ZeroInterval);
        }
        self.tick_interval = interval;
        Ok(())
    }

    pub fn max_ticks_per_frame(&self) -> u32 {
        self.max_ticks_per_frame
    }

    pub fn set_max_ticks_per_frame(&mut self, ticks: u32) {
        self.max_ticks_per_frame = ticks.max(1);
    }

    pub fn time_speed(&self) -> f32 {
        self.time_speed
    }

    pub fn set_time_speed(&mut self, speed: f32) -> Result<(), ScheduleError> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(ScheduleError::InvalidTimeSpeed(speed));
        }
        self.time_speed = speed;
        log::info!("[scheduler] time speed set to {speed}x");
        Ok(())
    }

    /// Steps through [`TIME_SPEED_PRESETS`], wrapping back to 1x. A custom
    /// speed moves to the next preset above it.
    pub fn cycle_time_speed(&mut self) -> f32 {
        let next = TIME_SPEED_PRESETS
            .iter()
            .copied()
            .find(|preset| *preset > self.time_speed)
            .unwrap_or(TIME_SPEED_PRESETS[0]);
        self.time_speed = next;
        log::info!("[scheduler] time speed cycled to {next}x");
        next
    }

    /// Interpolation factor between the last two ticks.
    pub fn alpha(&self) -> f32 {
        interpolation_alpha(self.accumulator, self.tick_interval)
    }

    pub fn accumulated(&self) -> Duration {
        self.accumulator
    }

    pub fn simulated_seconds(&self) -> f64 {
        *self.clock.current()
    }

    pub fn simulation_clock(&self) -> &Interpolated<f64> {
        &self.clock
    }

    pub fn add_system<S>(&mut self, stage: Stage, name: &'static str, system: S)
    where
        S: System + 'static,
    {
        let bucket = self.bucket_mut(stage);
        bucket.systems.push(SystemEntry {
            name,
            system: Box::new(system),
        });
    }

    pub fn add_system_fn<F>(&mut self, stage: Stage, name: &'static str, func: F)
    where
        F: FnMut(&mut World, &TickInfo) + Send + 'static,
    {
        self.add_system(stage, name, FnSystem { func });
    }

    pub fn register_event_handler<F>(&mut self, kind: &str, handler: F) -> bool
    where
        F: FnMut(&mut World, &GameEvent) -> Result<(), GameEventError> + Send + 'static,
    {
        self.dispatcher.register(kind, handler)
    }

    pub fn push_event(&self, event: GameEvent) {
        self.events.push_game_event(event);
    }

    /// Adds `elapsed` frame time and runs every whole tick it covers, capped
    /// at `max_ticks_per_frame`. Remaining whole intervals past the cap are
    /// dropped so a stalled frame cannot snowball.
    pub fn advance(&mut self, elapsed: Duration) -> FrameAdvance {
        self.phase = SchedulerPhase::Accumulating;
        self.accumulator += elapsed;
        let interval = self.tick_interval;
        let mut ticks = 0;
        let mut dropped_ticks = 0;

        while self.accumulator >= interval {
            if ticks >= self.max_ticks_per_frame {
                let behind = (self.accumulator.as_nanos() / interval.as_nanos()) as u32;
                self.accumulator -= interval * behind;
                dropped_ticks = behind;
                log::warn!(
                    "[scheduler] frame fell behind; dropped {behind} tick(s) after running {ticks}"
                );
                break;
            }
            self.phase = SchedulerPhase::Ticking;
            self.run_tick();
            self.accumulator -= interval;
            ticks += 1;
        }

        self.phase = SchedulerPhase::Idle;
        FrameAdvance {
            ticks,
            dropped_ticks,
            alpha: self.alpha(),
        }
    }

    /// Runs exactly one tick regardless of accumulated time.
    pub fn step(&mut self) -> &TickProfile {
        self.phase = SchedulerPhase::Ticking;
        self.run_tick();
        self.phase = SchedulerPhase::Idle;
        &self.last_profile
    }

    fn run_tick(&mut self) {
        let tick_start = Instant::now();
        self.world.commit_interpolation();
        self.clock.commit();

        let info = TickInfo {
            index: self.tick_index,
            delta_seconds: self.tick_interval.as_secs_f32() * self.time_speed,
            time_speed: self.time_speed,
            simulated_seconds: *self.clock.current(),
        };

        let mut profiles = Vec::new();
        for bucket in &mut self.buckets {
            if bucket.stage == Stage::Startup && self.startup_complete {
                continue;
            }
            for entry in &mut bucket.systems {
                log::trace!("[scheduler::{:?}] running system {}", bucket.stage, entry.name);
                let system_start = Instant::now();
                entry.system.run(&mut self.world, &info);
                let duration = system_start.elapsed();
                if duration.as_secs_f32() * 1000.0 > SLOW_SYSTEM_THRESHOLD_MS {
                    log::warn!(
                        "[scheduler::{:?}] system {} took {:.3} ms",
                        bucket.stage,
                        entry.name,
                        duration.as_secs_f64() * 1000.0,
                    );
                }
                profiles.push(SystemProfile {
                    name: entry.name,
                    stage: bucket.stage,
                    duration,
                });
            }
        }
        self.startup_complete = true;

        let drain = self
            .events
            .process_game_events(&mut self.world, &mut self.dispatcher);

        self.tick_index += 1;
        let advanced = *self.clock.current() + f64::from(info.delta_seconds);
        self.clock.set(advanced);

        let total = tick_start.elapsed();
        if total.as_secs_f32() * 1000.0 > SLOW_TICK_THRESHOLD_MS {
            log::warn!(
                "[scheduler] tick {} took {:.3} ms",
                info.index,
                total.as_secs_f64() * 1000.0
            );
        }
        self.last_profile = TickProfile {
            tick: info.index,
            total,
            systems: profiles,
            drain,
        };
    }

    fn bucket_mut(&mut self, stage: Stage) -> &mut StageBucket {
        let index = Stage::ordered()
            .iter()
            .position(|candidate| *candidate == stage)
            .unwrap_or(0);
        &mut self.buckets[index]
    }
}

struct FnSystem<F: FnMut(&mut World, &TickInfo) + Send + 'static> {
    func: F,
}

impl<F> System for FnSystem<F>
where
    F: FnMut(&mut World, &TickInfo) + Send + 'static,
{
    fn run(&mut self, world: &mut World, tick: &TickInfo) {
        (self.func)(world, tick);
    }
}
