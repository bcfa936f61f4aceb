use railyard_engine::engine::Engine;
use railyard_engine::engine::config::EngineConfig;
use railyard_engine::game;
use railyard_engine::render::RecordingRenderAdapter;
use std::env;
use std::path::PathBuf;

const DEFAULT_FRAMES: u32 = 120;

fn main() {
    if let Err(err) = run() {
        eprintln!("[headless] error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let config = match args.next() {
        Some(path) => EngineConfig::load(&PathBuf::from(path))?,
        None => EngineConfig {
            max_frames: DEFAULT_FRAMES,
            ..EngineConfig::default()
        },
    };
    let log_path = args.next().map(PathBuf::from);

    let recorder = RecordingRenderAdapter::default();
    let mut engine = Engine::with_config(&config)?.with_renderer(recorder.clone());
    game::install(engine.scheduler_mut());
    for (length, speed) in [(2.0, 1.0), (4.0, 2.5), (12.0, 3.0)] {
        game::spawn_train(engine.world_mut(), length, speed)?;
    }

    let frames = engine.run();
    let stats = engine.stats();
    println!(
        "[headless] {frames} frame(s), {} tick(s), {} dropped, {} render call(s)",
        stats.ticks,
        stats.dropped_ticks,
        recorder.calls().len()
    );

    let events = engine.events().lock();
    match log_path {
        Some(path) => {
            events.write_export(&path)?;
            println!("[headless] event log written to {}", path.display());
        }
        None => println!("{}", events.export_text()),
    }
    Ok(())
}
