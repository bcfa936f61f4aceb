use railyard_engine::engine::Engine;
use railyard_engine::engine::clock::ManualClock;
use railyard_engine::engine::interpolation::Interpolated;
use railyard_engine::engine::schedule::{Scheduler, Stage};
use railyard_engine::events::{EventCategory, GameEvent};
use railyard_engine::game::{self, RailMovement};
use railyard_engine::render::RecordingRenderAdapter;
use railyard_engine::scene::{NodeComponent, Vec3};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn rail_progress_delta_is_speed_times_dt_over_length() {
    init_logging();
    let mut scheduler = Scheduler::default();
    scheduler.add_system_fn(Stage::Simulation, "update_objects", |world, tick| {
        world.update_objects(tick.delta_seconds);
    });
    game::install(&mut scheduler);
    let train = game::spawn_train(scheduler.world_mut(), 50.0, 1.0).unwrap();
    scheduler
        .world_mut()
        .component_mut::<RailMovement>(train)
        .unwrap()
        .set_progress(0.4);

    scheduler.step();

    let world = scheduler.world();
    assert_eq!(world.get(train).unwrap().id(), "train_1");
    assert_eq!(
        world.get(train).unwrap().component_tags().collect::<Vec<_>>(),
        vec!["position", "railMovement"]
    );
    let rail = world.component::<RailMovement>(train).unwrap();
    let dt = Duration::from_millis(16).as_secs_f32();
    let delta = rail.progress() - 0.4;
    assert!((rail.speed() * dt / 50.0 - delta).abs() < 1e-6);
    assert!((0.0..=1.0).contains(&rail.progress()));
}

#[test]
fn events_from_a_tick_apply_before_the_tick_ends() {
    init_logging();
    let mut scheduler = Scheduler::default();
    let trace = Arc::new(Mutex::new(Vec::new()));

    let sink = trace.clone();
    scheduler.register_event_handler("score", move |_, event| {
        sink.lock().unwrap().push(format!("handled {}", event.payload));
        Ok(())
    });
    let sink = trace.clone();
    scheduler.add_system_fn(Stage::Simulation, "emitter", move |world, tick| {
        if let Some(events) = world.event_stack() {
            events.push_game_event(GameEvent::new("score", json!(tick.index)));
        }
        sink.lock().unwrap().push(format!("queued {}", tick.index));
    });
    let sink = trace.clone();
    scheduler.add_system_fn(Stage::Simulation, "observer", move |_, tick| {
        sink.lock().unwrap().push(format!("observed {}", tick.index));
    });

    scheduler.step();
    scheduler.step();

    assert_eq!(
        *trace.lock().unwrap(),
        vec![
            "queued 0",
            "observed 0",
            "handled 0",
            "queued 1",
            "observed 1",
            "handled 1",
        ]
    );
}

#[test]
fn interpolation_endpoints_are_exact() {
    let mut value = Interpolated::new(0.0_f32);
    value.set(10.0);

    assert_eq!(value.sample(0.0), 0.0);
    assert_eq!(value.sample(1.0), 10.0);
    assert_eq!(value.sample(0.5), 5.0);
    assert_eq!(value.sample(-2.0), 0.0);
    assert_eq!(value.sample(3.0), 10.0);
}

#[test]
fn engine_frames_present_between_ticks() {
    init_logging();
    let clock = ManualClock::new();
    let recorder = RecordingRenderAdapter::default();
    let mut engine = Engine::new()
        .with_clock(clock.clone())
        .with_renderer(recorder.clone());
    game::install(engine.scheduler_mut());
    let train = game::spawn_train(engine.world_mut(), 16.0, 100.0).unwrap();

    engine.run_frame();
    clock.advance(Duration::from_millis(16));
    engine.run_frame();
    let after_tick = engine.world().node(train).unwrap().local().position;

    clock.advance(Duration::from_millis(8));
    let advance = engine.run_frame();

    assert_eq!(advance.ticks, 0);
    let presented = recorder.last_transform(train).unwrap();
    let previous = engine.world().node(train).unwrap().previous_local().position;
    assert_eq!(previous, Vec3::ZERO);
    assert!((presented.position.z - after_tick.z * 0.5).abs() < 1e-5);
}

#[test]
fn time_speed_scales_rail_travel() {
    let mut normal = Engine::new();
    let mut fast = Engine::new();
    fast.scheduler_mut().set_time_speed(16.0).unwrap();
    let mut trains = Vec::new();
    for engine in [&mut normal, &mut fast] {
        game::install(engine.scheduler_mut());
        trains.push(game::spawn_train(engine.world_mut(), 1000.0, 1.0).unwrap());
    }

    for _ in 0..10 {
        normal.scheduler_mut().step();
        fast.scheduler_mut().step();
    }

    let slow = normal.world().component::<RailMovement>(trains[0]).unwrap().progress();
    let quick = fast.world().component::<RailMovement>(trains[1]).unwrap().progress();
    assert!((quick - slow * 16.0).abs() < 1e-5);
    assert_eq!(normal.scheduler().tick_index(), fast.scheduler().tick_index());
}

#[test]
fn arrival_reaches_station_log_and_subscribers() {
    let mut engine = Engine::new();
    game::install(engine.scheduler_mut());
    game::spawn_train(engine.world_mut(), 0.01, 1.0).unwrap();
    let heard = Arc::new(Mutex::new(Vec::new()));
    let sink = heard.clone();
    engine
        .events()
        .lock()
        .subscribe(game::EVENT_TRAIN_ARRIVED, move |event| {
            sink.lock().unwrap().push(event.payload.clone());
        });

    engine.scheduler_mut().step();

    assert_eq!(*heard.lock().unwrap(), vec![json!({ "target": "train_2" })]);
    let station = engine
        .events()
        .lock()
        .events_by_category(EventCategory::Station)
        .len();
    assert_eq!(station, 1);
}

#[test]
fn nodes_without_updates_stay_put() {
    let mut scheduler = Scheduler::default();
    let depot = scheduler.world_mut().spawn("depot");
    scheduler
        .world_mut()
        .insert(depot, NodeComponent::at(Vec3::new(3.0, 0.0, 0.0)))
        .unwrap();
    scheduler.step();
    let node = scheduler.world().node(depot).unwrap();
    assert_eq!(node.interpolated(0.25).position, Vec3::new(3.0, 0.0, 0.0));
}
