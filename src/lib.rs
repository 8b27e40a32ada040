pub mod actions;
pub mod bot;
pub mod browser;
pub mod config;
pub mod error;
pub mod frontier;
pub mod grid;
pub mod hints;
pub mod ops;
pub mod pathfinder;
pub mod solver;
pub mod vision;

/// dimensional analysis types
pub type Coordinate = i32;
pub type Confidence = f32;
pub type Priority = f32;
pub type Density = f32;
pub type Tick = u64;

/// a cell address in the unbounded grid frame
pub type Point = (Coordinate, Coordinate);

// canvas geometry parameters
pub const CELL_SIZE: usize = 24;
pub const CELL_BORDER: usize = 1;
pub const PATCH_MARGIN: usize = 2;

// recognition thresholds
pub const COLOR_THRESHOLD: Confidence = 0.8;
pub const TEMPLATE_THRESHOLD: Confidence = 0.7;
pub const VARIANCE_EMPTY: f32 = 100.0;
pub const VARIANCE_MINE: f32 = 2000.0;

// frontier scoring weights, summing to one
pub const NEIGHBOR_WEIGHT: f32 = 0.4;
pub const DISTANCE_WEIGHT: f32 = 0.3;
pub const CONFIDENCE_WEIGHT: f32 = 0.3;

// csp solver parameters
pub const MAX_SOLUTIONS: usize = 8;
pub const MIN_ZONE_SIZE: usize = 1;
pub const MAX_ZONE_SIZE: usize = 50;
pub const MAX_MINE_RATIO: f32 = 0.3;

// scheduling parameters
pub const CLUSTER_RADIUS: f32 = 30.0;
pub const MAX_QUEUE_SIZE: usize = 200;
pub const MAX_RETRIES: usize = 3;

/// trait for random generation, mainly (strictly?) for testing
pub trait Arbitrary {
    fn random() -> Self;
}

/// progress bar
pub fn progress(n: usize) -> indicatif::ProgressBar {
    let tick = std::time::Duration::from_secs(60);
    let style = "{spinner:.cyan} {elapsed} ~ {percent:>3}% {wide_bar:.cyan}";
    let style = indicatif::ProgressStyle::with_template(style).unwrap();
    let progress = indicatif::ProgressBar::new(n as u64);
    progress.set_style(style);
    progress.enable_steady_tick(tick);
    progress
}

/// initialize logging to terminal and a timestamped file under logs/
pub fn init() {
    std::fs::create_dir_all("logs").expect("create logs directory");
    let config = simplelog::ConfigBuilder::new()
        .set_location_level(log::LevelFilter::Off)
        .set_target_level(log::LevelFilter::Off)
        .set_thread_level(log::LevelFilter::Off)
        .build();
    let time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time moves slow")
        .as_secs();
    let file = simplelog::WriteLogger::new(
        log::LevelFilter::Debug,
        config.clone(),
        std::fs::File::create(format!("logs/{}.log", time)).expect("create log file"),
    );
    let term = simplelog::TermLogger::new(
        log::LevelFilter::Info,
        config.clone(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );
    simplelog::CombinedLogger::init(vec![term, file]).expect("initialize logger");
}

/// chebyshev-adjacency over the 8 neighbors of a cell
pub fn neighbors(at: Point) -> [Point; 8] {
    let (x, y) = at;
    [
        (x - 1, y - 1),
        (x, y - 1),
        (x + 1, y - 1),
        (x - 1, y),
        (x + 1, y),
        (x - 1, y + 1),
        (x, y + 1),
        (x + 1, y + 1),
    ]
}

/// euclidean distance between two cells
pub fn distance(a: Point, b: Point) -> f32 {
    let dx = (a.0 - b.0) as f32;
    let dy = (a.1 - b.1) as f32;
    (dx * dx + dy * dy).sqrt()
}
