pub mod ecs;
pub mod engine;
pub mod events;
pub mod game;
pub mod render;
pub mod scene;

/// Runs the default engine with the gameplay systems installed.
pub fn run() {
    let mut engine = engine::Engine::default();
    game::install(engine.scheduler_mut());
    engine.run();
}
