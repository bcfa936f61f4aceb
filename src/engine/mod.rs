pub mod clock;
pub mod config;
pub mod interpolation;
pub mod lighting;
pub mod schedule;

use self::clock::{FrameClock, MonotonicClock};
use self::config::{ConfigError, DEFAULT_MAX_FRAMES, EngineConfig};
use self::lighting::DayNightCycle;
use self::schedule::{FrameAdvance, ScheduleError, Scheduler, Stage, System, TickInfo};
use crate::ecs::{Entity, World};
use crate::events::{EventStackHandle, GameEvent, GameEventError};
use crate::render::{RenderAdapter, RenderHandle, present_world};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);
const ENVIRONMENT_TYPE: &str = "environment";

/// Rolling frame diagnostics kept by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    pub frames: u64,
    pub ticks: u64,
    pub dropped_ticks: u64,
    pub total_frame_time: Duration,
    pub average_frame_seconds: f32,
    pub last_alpha: f32,
}

impl FrameStats {
    fn record(&mut self, elapsed: Duration, advance: &FrameAdvance) {
        self.frames += 1;
        self.ticks += u64::from(advance.ticks);
        self.dropped_ticks += u64::from(advance.dropped_ticks);
        self.total_frame_time += elapsed;
        self.average_frame_seconds = self.total_frame_time.as_secs_f32() / self.frames as f32;
        self.last_alpha = advance.alpha;
    }
}

/// Handle that stops [`Engine::run`] after the current frame.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Owns the scheduler, the presentation adapter and the frame clock.
///
/// Each frame reads the clock once, feeds the elapsed time to the
/// scheduler, then presents the world at the resulting alpha.
pub struct Engine {
    scheduler: Scheduler,
    renderer: RenderHandle,
    clock: Box<dyn FrameClock>,
    last_frame: Option<Duration>,
    frame_interval: Duration,
    max_frames: u32,
    stop: StopHandle,
    environment: Entity,
    stats: FrameStats,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        let events = EventStackHandle::default();
        Self::assemble(
            World::with_event_stack(events),
            DayNightCycle::default(),
            DEFAULT_FRAME_INTERVAL,
            DEFAULT_MAX_FRAMES,
        )
    }

    pub fn with_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let events = EventStackHandle::new(config.events.clone());
        let mut engine = Self::assemble(
            World::with_event_stack(events),
            DayNightCycle::new(12.0, config.day_length_seconds),
            config.frame_interval(),
            config.max_frames,
        );
        let scheduler = &mut engine.scheduler;
        scheduler
            .set_tick_interval(config.tick_interval())
            .map_err(invalid_schedule)?;
        scheduler
            .set_time_speed(config.time_speed)
            .map_err(invalid_schedule)?;
        scheduler.set_max_ticks_per_frame(config.max_ticks_per_frame);
        Ok(engine)
    }

    pub fn with_renderer(mut self, adapter: impl RenderAdapter + 'static) -> Self {
        let renderer = RenderHandle::new(adapter);
        log::info!("[engine] renderer set to {}", renderer.label());
        self.scheduler.world_mut().attach_renderer(renderer.clone());
        self.renderer = renderer;
        self
    }

    pub fn with_clock(mut self, clock: impl FrameClock + 'static) -> Self {
        self.clock = Box::new(clock);
        self.last_frame = None;
        self
    }

    fn assemble(
        world: World,
        cycle: DayNightCycle,
        frame_interval: Duration,
        max_frames: u32,
    ) -> Self {
        let renderer = RenderHandle::default();
        let mut scheduler = Scheduler::new(world);
        scheduler.world_mut().attach_renderer(renderer.clone());
        let environment = {
            let world = scheduler.world_mut();
            let entity = world.spawn(ENVIRONMENT_TYPE);
            if let Err(err) = world.insert(entity, cycle) {
                log::error!("[engine] failed to attach day/night cycle: {err}");
            }
            entity
        };
        scheduler.add_system_fn(Stage::Simulation, "update_objects", |world, tick| {
            world.update_objects(tick.delta_seconds);
        });

        Self {
            scheduler,
            renderer,
            clock: Box::new(MonotonicClock::default()),
            last_frame: None,
            frame_interval,
            max_frames: max_frames.max(1),
            stop: StopHandle::default(),
            environment,
            stats: FrameStats::default(),
        }
    }

    pub fn add_system<S>(&mut self, stage: Stage, name: &'static str, system: S)
    where
        S: System + 'static,
    {
        self.scheduler.add_system(stage, name, system);
    }

    pub fn add_system_fn<F>(&mut self, stage: Stage, name: &'static str, func: F)
    where
        F: FnMut(&mut World, &TickInfo) + Send + 'static,
    {
        self.scheduler.add_system_fn(stage, name, func);
    }

    pub fn register_event_handler<F>(&mut self, kind: &str, handler: F) -> bool
    where
        F: FnMut(&mut World, &GameEvent) -> Result<(), GameEventError> + Send + 'static,
    {
        self.scheduler.register_event_handler(kind, handler)
    }

    pub fn push_event(&self, event: GameEvent) {
        self.scheduler.push_event(event);
    }

    pub fn configure_max_frames(&mut self, frames: u32) {
        self.max_frames = frames.max(1);
    }

    pub fn max_frames(&self) -> u32 {
        self.max_frames
    }

    /// Runs a single frame: one clock read, fixed ticks, then presentation.
    ///
    /// The first frame after construction or a clock swap only establishes
    /// the baseline and runs no ticks.
    pub fn run_frame(&mut self) -> FrameAdvance {
        let now = self.clock.now();
        let elapsed = self
            .last_frame
            .map(|last| now.saturating_sub(last))
            .unwrap_or_default();
        self.last_frame = Some(now);

        let advance = self.scheduler.advance(elapsed);
        present_world(self.scheduler.world(), advance.alpha, &self.renderer);
        self.stats.record(elapsed, &advance);
        log::debug!(
            "[engine] frame {} ran {} tick(s), alpha {:.3}",
            self.stats.frames,
            advance.ticks,
            advance.alpha
        );
        advance
    }

    /// Runs up to `max_frames` frames, sleeping out the rest of each frame
    /// interval. Returns the number of frames run.
    pub fn run(&mut self) -> u32 {
        self.stop.reset();
        let mut frames = 0;
        while frames < self.max_frames && !self.stop.is_stopped() {
            let started = std::time::Instant::now();
            self.run_frame();
            frames += 1;
            let spent = started.elapsed();
            if spent < self.frame_interval && frames < self.max_frames {
                std::thread::sleep(self.frame_interval - spent);
            }
        }
        log::info!(
            "[engine] stopped after {frames} frame(s), {} tick(s) total",
            self.stats.ticks
        );
        frames
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn world(&self) -> &World {
        self.scheduler.world()
    }

    pub fn world_mut(&mut self) -> &mut World {
        self.scheduler.world_mut()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub fn events(&self) -> &EventStackHandle {
        self.scheduler.events()
    }

    pub fn renderer(&self) -> &RenderHandle {
        &self.renderer
    }

    /// Entity carrying the [`DayNightCycle`].
    pub fn environment(&self) -> Entity {
        self.environment
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }
}

fn invalid_schedule(err: ScheduleError) -> ConfigError {
    ConfigError::Invalid(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::clock::ManualClock;
    use crate::events::LogLevel;
    use crate::render::RecordingRenderAdapter;
    use crate::scene::{NodeComponent, Vec3};

    fn manual_engine() -> (Engine, ManualClock, RecordingRenderAdapter) {
        let clock = ManualClock::new();
        let recorder = RecordingRenderAdapter::default();
        let engine = Engine::new()
            .with_clock(clock.clone())
            .with_renderer(recorder.clone());
        (engine, clock, recorder)
    }

    #[test]
    fn first_frame_only_sets_baseline() {
        let (mut engine, clock, _) = manual_engine();
        clock.advance(Duration::from_secs(5));

        let advance = engine.run_frame();

        assert_eq!(advance.ticks, 0);
        assert_eq!(engine.scheduler().tick_index(), 0);
    }

    #[test]
    fn frames_tick_and_present_interpolated_state() {
        let (mut engine, clock, recorder) = manual_engine();
        let cart = {
            let world = engine.world_mut();
            let cart = world.spawn("cart");
            world.insert(cart, NodeComponent::at(Vec3::ZERO)).unwrap();
            cart
        };
        engine.add_system_fn(Stage::Simulation, "push_cart", move |world, _| {
            if let Some(node) = world.node_mut(cart) {
                let mut position = node.local().position;
                position.x += 1.0;
                node.set_position(position);
            }
        });
        engine.run_frame();

        clock.advance(Duration::from_millis(24));
        let advance = engine.run_frame();

        assert_eq!(advance.ticks, 1);
        assert!((advance.alpha - 0.5).abs() < 1e-6);
        let presented = recorder.last_transform(cart).unwrap();
        assert!((presented.position.x - 0.5).abs() < 1e-6);
        assert!(recorder.last_lighting().is_some());
        assert_eq!(engine.stats().ticks, 1);
        assert_eq!(engine.stats().frames, 2);
    }

    #[test]
    fn environment_cycle_advances_with_ticks() {
        let (mut engine, clock, _) = manual_engine();
        let start = engine
            .world()
            .component::<DayNightCycle>(engine.environment())
            .unwrap()
            .time_of_day();
        engine.run_frame();
        clock.advance(Duration::from_millis(160));
        engine.run_frame();

        let now = engine
            .world()
            .component::<DayNightCycle>(engine.environment())
            .unwrap()
            .time_of_day();
        assert!(now > start);
    }

    #[test]
    fn config_is_applied() {
        let mut config = EngineConfig::default();
        config.tick_interval_ms = 20;
        config.time_speed = 8.0;
        config.max_frames = 7;
        config.events.min_level = LogLevel::Warn;

        let engine = Engine::with_config(&config).unwrap();

        assert_eq!(engine.scheduler().tick_interval(), Duration::from_millis(20));
        assert_eq!(engine.scheduler().time_speed(), 8.0);
        assert_eq!(engine.max_frames(), 7);
        assert_eq!(engine.events().lock().config().min_level, LogLevel::Warn);

        config.time_speed = 0.0;
        assert!(Engine::with_config(&config).is_err());
    }

    struct SteppingClock(Duration);

    impl FrameClock for SteppingClock {
        fn now(&mut self) -> Duration {
            self.0 += DEFAULT_FRAME_INTERVAL;
            self.0
        }
    }

    #[test]
    fn stop_handle_ends_run_early() {
        let mut engine = Engine::new().with_clock(SteppingClock(Duration::ZERO));
        engine.configure_max_frames(50);
        let stop = engine.stop_handle();
        engine.add_system_fn(Stage::Simulation, "stop_after_three", move |_, tick| {
            if tick.index == 2 {
                stop.stop();
            }
        });

        let frames = engine.run();

        assert_eq!(frames, 4);
        assert_eq!(engine.scheduler().tick_index(), 3);
        assert!(engine.stop_handle().is_stopped());
    }
}
