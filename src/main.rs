use feedplay::cli::Args;
use feedplay::core::engine::{AccessLogEntry, EngineStatus, ItemStatus, MediaItem, TimeRange};
use feedplay::core::events::EventKind;
use feedplay::core::player::{ControllerConfig, PlaybackController};
use feedplay::core::registry::ControllerRegistry;
use feedplay::core::view::{Container, Rect};
use feedplay::feed::{FeedCell, FeedSync};
use feedplay::paths;
use feedplay::settings::{SETTINGS_FILE, Settings};
use feedplay::sim::{RecordingView, SimEngine, SimItem};
use feedplay::utils::format_mmss;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const ROW_HEIGHT: f64 = 300.0;
const VIEWPORT: (f64, f64) = (375.0, 600.0);

const SAMPLE_FEED: [&str; 5] = [
    "https://cdn.example/feed/0001.mp4",
    "https://cdn.example/feed/0002.mp4",
    "https://cdn.example/feed/0003.mp4",
    "https://cdn.example/feed/0004.mp4",
    "https://cdn.example/feed/0005.mp4",
];

/// Simulated collaborators behind one controller
struct SimSession {
    engine: Arc<SimEngine>,
    item: Arc<SimItem>,
    view: Arc<RecordingView>,
}

type Sessions = Arc<Mutex<HashMap<String, SimSession>>>;

fn init_logging(args: &Args, path_config: &paths::PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .clone()
            .unwrap_or_else(|| paths::data_file("feedplay.log", path_config));
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Respects RUST_LOG if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

/// Drive an attached session: load, play, rebuffer once, scrub to the middle.
fn exercise(controller: &PlaybackController, sim: &SimSession) {
    sim.engine.set_status(EngineStatus::ReadyToPlay, None);
    sim.item.set_status(ItemStatus::ReadyToPlay, None);
    sim.item.set_keep_up(true);
    sim.item.set_loaded_ranges(vec![TimeRange::new(0.0, sim.item.duration() * 0.4)]);
    sim.item.push_access_log(AccessLogEntry {
        uri: Some(controller.url().to_string()),
        indicated_bitrate: 2_500_000.0,
        observed_bitrate: 1_800_000.0,
        ..Default::default()
    });

    sim.engine.tick(1.0);

    // Rebuffer
    sim.item.set_keep_up(false);
    sim.item.stall();
    sim.item.set_keep_up(true);

    controller.begin_scrub();
    controller.scrub(0.5);
    controller.end_scrub();
    sim.engine.tick(0.5);
}

fn main() -> Result<()> {
    let args = Args::parse();

    let path_config = paths::PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = paths::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {:#}", e);
    }

    init_logging(&args, &path_config)?;

    info!("feedplay starting...");
    debug!("Command-line args: {:?}", args);

    let mut settings = Settings::load(&path_config);
    if !paths::config_file(SETTINGS_FILE, &path_config).exists()
        && let Err(e) = settings.save(&path_config)
    {
        warn!("Could not write default settings: {:#}", e);
    }
    if let Some(capacity) = args.capacity {
        settings.registry_capacity = capacity;
    }
    let config = ControllerConfig::from(&settings);

    let urls: Vec<String> = if args.urls.is_empty() {
        SAMPLE_FEED.iter().map(|s| s.to_string()).collect()
    } else {
        args.urls.clone()
    };

    let registry = Arc::new(ControllerRegistry::new(settings.registry_capacity));
    let sessions: Sessions = Arc::new(Mutex::new(HashMap::new()));
    let stalls = Arc::new(AtomicUsize::new(0));

    let factory_sessions = Arc::clone(&sessions);
    let factory_stalls = Arc::clone(&stalls);
    let mut feed = FeedSync::new(Arc::clone(&registry), move |url: &str| {
        // Stable pseudo-duration per URL: 20..80 s
        let duration = 20.0 + (url.bytes().map(u64::from).sum::<u64>() % 60) as f64;
        let item = SimItem::new(duration);
        let engine = SimEngine::with_item(item.clone());
        let view = RecordingView::new(VIEWPORT.0 - 32.0);

        let controller = PlaybackController::new(url, engine.clone(), item.clone(), view.clone(), config);
        let counter = Arc::clone(&factory_stalls);
        controller.subscribe(EventKind::Stalled, false, move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        factory_sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), SimSession { engine, item, view });
        controller
    });

    let cells: Vec<FeedCell> = urls
        .iter()
        .enumerate()
        .map(|(row, url)| {
            let bounds = Rect::new(0.0, row as f64 * ROW_HEIGHT, VIEWPORT.0, ROW_HEIGHT);
            FeedCell::new(url.clone(), Container::new(row as u64, bounds))
        })
        .collect();

    feed.will_appear();
    for cell in &cells {
        feed.bind_cell(cell);
    }
    feed.did_appear(&cells, Rect::new(0.0, 0.0, VIEWPORT.0, VIEWPORT.1));

    for step in 0..args.scroll_steps {
        let viewport = Rect::new(0.0, step as f64 * ROW_HEIGHT, VIEWPORT.0, VIEWPORT.1);
        let attached = feed.on_scroll(&cells, viewport);
        info!("Scroll step {} at y={}: {} attached", step, viewport.y, attached.len());

        for url in &attached {
            let Some(controller) = registry.get(url) else {
                continue;
            };
            let sessions = sessions.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(sim) = sessions.get(url) {
                exercise(&controller, sim);
                println!(
                    "[{}] {}  {}  buffered {:.0}%",
                    step,
                    url,
                    sim.view.labels(),
                    controller.buffered_fraction() * 100.0
                );
            }
        }
    }

    feed.will_disappear(&cells);
    feed.did_disappear();

    let stats = registry.stats();
    println!(
        "sessions: {}  hits: {}  misses: {} ({:.0}% hit)  evictions: {}  stalls: {}",
        registry.len(),
        stats.hits(),
        stats.misses(),
        stats.hit_rate() * 100.0,
        stats.evictions(),
        stalls.load(Ordering::Relaxed)
    );
    for url in &urls {
        if let Some(controller) = registry.get(url) {
            if let Some(fault) = controller.last_fault() {
                println!("{}: {}", url, fault);
            }
            debug!("{} ended at {}", url, format_mmss(controller.position()));
        }
    }

    registry.clear();
    info!("feedplay done");
    Ok(())
}
