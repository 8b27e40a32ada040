//! Headless run of the agent against the simulated minefield.
//!
//! Options: --ticks, --seed, --density, --config, --trace-dir

use clap::Parser;
use robosweeper::bot::Bot;
use robosweeper::browser::convert::CoordinateConverter;
use robosweeper::browser::driver::BrowserDriver;
use robosweeper::browser::simulated::SimulatedDriver;
use robosweeper::config::Config;
use robosweeper::ops::trace::DiskSink;
use robosweeper::ops::trace::NullSink;
use robosweeper::ops::trace::TraceSink;
use robosweeper::vision::template::SyntheticTemplates;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "sweep", about = "drive the solver over a simulated infinite minefield")]
struct Args {
    /// perception-decision-action cycles to run
    #[arg(long, default_value_t = 100)]
    ticks: u64,
    /// minefield seed
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// mine probability per cell
    #[arg(long, default_value_t = 0.12)]
    density: f32,
    /// viewport width and height, in cells
    #[arg(long, default_value_t = 16)]
    viewport: usize,
    /// json config file overriding the defaults
    #[arg(long)]
    config: Option<std::path::PathBuf>,
    /// directory receiving session traces and tick snapshots
    #[arg(long)]
    trace_dir: Option<std::path::PathBuf>,
    /// keep every nth tick snapshot
    #[arg(long, default_value_t = 10)]
    snapshot_stride: u64,
    /// verify reveals against the store after settling
    #[arg(long, default_value_t = false)]
    verify: bool,
}

fn main() -> anyhow::Result<()> {
    robosweeper::init();
    let args = Args::parse();
    let mut config = match args.config.as_deref() {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.executor.verification = args.verify;

    let driver = Arc::new(SimulatedDriver::new(
        args.seed,
        args.density,
        args.viewport,
        args.viewport,
    ));
    // the opening move is host orchestration, not the core's
    let center = args.viewport as i32 / 2;
    driver.click_cell(center, center)?;

    let sink: Arc<dyn TraceSink> = match args.trace_dir.as_ref() {
        Some(dir) => Arc::new(DiskSink::new(dir.clone(), args.snapshot_stride)?),
        None => Arc::new(NullSink),
    };
    let convert = CoordinateConverter {
        cell_border: 0.0,
        ..CoordinateConverter::default()
    };
    let mut bot = Bot::new(driver.clone(), convert, &SyntheticTemplates, sink, config);

    let progress = robosweeper::progress(args.ticks as usize);
    for _ in 0..args.ticks {
        bot.tick()?;
        progress.inc(1);
    }
    progress.finish();

    log::info!(
        "session done: {} cells revealed, {} detonations, queue {:?}",
        driver.revealed_count(),
        driver.detonations(),
        bot.queue().queue_status(),
    );
    for (layer, metrics) in bot.metrics().summary() {
        log::info!(
            "{:?}: {} ops, {:.1}% ok, {:.1} ms avg",
            layer,
            metrics.operations,
            metrics.success_rate() * 100.0,
            metrics.average_latency * 1000.0,
        );
    }
    Ok(())
}
