use crate::actions::executor::ActionExecutor;
use crate::actions::queue::ActionQueue;
use crate::browser::convert::CoordinateConverter;
use crate::browser::driver::BrowserDriver;
use crate::config::Config;
use crate::error::SweepError;
use crate::frontier::extractor::FrontierExtractor;
use crate::grid::bounds::Bounds;
use crate::grid::raster::Raster;
use crate::grid::tensor::RegionWrite;
use crate::grid::tensor::TensorGrid;
use crate::hints::cache::HintCache;
use crate::ops::logger::AsyncLogger;
use crate::ops::metrics::Layer;
use crate::ops::metrics::MetricsCollector;
use crate::ops::metrics::Observability;
use crate::ops::snapshot::TickSnapshot;
use crate::ops::trace::SessionMeta;
use crate::ops::trace::TraceEvent;
use crate::ops::trace::TraceKind;
use crate::ops::trace::TraceSink;
use crate::pathfinder::density::DensityAnalyzer;
use crate::pathfinder::planner::PathPlanner;
use crate::pathfinder::scheduler::ViewportScheduler;
use crate::solver::engine::CspEngine;
use crate::solver::hybrid::HybridSolver;
use crate::solver::segmentation::TensorFrontier;
use crate::vision::matcher::TemplateMatcher;
use crate::vision::matcher::Tier;
use crate::vision::segmenter::PatchSegmenter;
use crate::vision::template::TemplateSource;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

/// how many actions one tick will drive at most
const ACTIONS_PER_TICK: usize = 16;

/// what one perception-decision-action cycle accomplished
#[derive(Debug, Default, Clone)]
pub struct TickReport {
    pub tick: u64,
    pub patches: usize,
    pub recognized: usize,
    pub frontier_cells: usize,
    pub zones: usize,
    pub actions_emitted: usize,
    pub actions_executed: usize,
    pub actions_succeeded: usize,
    pub moved: Option<(i32, i32)>,
    pub elapsed: Duration,
}

/// the assembled pipeline. one tick: capture, slice, recognize, store,
/// extract frontier, solve, queue, execute, analyze density, move the
/// viewport if there is nothing left to do where we are.
pub struct Bot {
    driver: Arc<dyn BrowserDriver>,
    convert: CoordinateConverter,
    grid: Arc<TensorGrid>,
    hints: HintCache,
    segmenter: PatchSegmenter,
    matcher: TemplateMatcher,
    extractor: FrontierExtractor,
    solver: HybridSolver,
    queue: ActionQueue,
    executor: ActionExecutor,
    analyzer: DensityAnalyzer,
    planner: PathPlanner,
    scheduler: ViewportScheduler,
    metrics: Arc<MetricsCollector>,
    sink: Arc<dyn TraceSink>,
    logger: AsyncLogger,
    tick: u64,
}

impl Bot {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        convert: CoordinateConverter,
        templates: &dyn TemplateSource,
        sink: Arc<dyn TraceSink>,
        config: Config,
    ) -> Self {
        let grid = Arc::new(match config.grid.initial_bounds {
            Some(bounds) => TensorGrid::with_bounds(bounds),
            None => TensorGrid::new(),
        });
        let hints = HintCache::new(
            config.hints.max_hints,
            config.hints.max_clusters,
            Duration::from_secs(config.hints.ttl_secs),
            Duration::from_secs(config.hints.cleanup_interval_secs),
        );
        let segmenter = PatchSegmenter::new(config.recognizer.cell_size, config.recognizer.patch_margin);
        let matcher = TemplateMatcher::new(templates, &config.recognizer);
        let extractor = FrontierExtractor::new(config.frontier.clone());
        let solver = HybridSolver::new(
            CspEngine::new(config.csp.max_solutions),
            TensorFrontier::new(config.csp.min_zone_size, config.csp.max_zone_size),
            config.csp.strategy,
            Duration::from_secs(config.csp.timeout_secs),
        );
        let queue = ActionQueue::new(config.queue.clone());
        let executor = ActionExecutor::new(driver.clone(), grid.clone(), config.executor.clone());
        let analyzer = DensityAnalyzer::new(config.density.clone());
        let planner = PathPlanner::new(config.path.clone());
        let scheduler = ViewportScheduler::default();
        let metrics = Arc::new(MetricsCollector::default());
        let logger = AsyncLogger::new(10_000, 100, Duration::from_secs(1));
        let session = SessionMeta {
            session_id: format!("session-{:x}", std::process::id()),
            started_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            tick_count: 0,
            config_hash: config.hash(),
        };
        sink.session(&session);
        Self {
            driver,
            convert,
            grid,
            hints,
            segmenter,
            matcher,
            extractor,
            solver,
            queue,
            executor,
            analyzer,
            planner,
            scheduler,
            metrics,
            sink,
            logger,
            tick: 0,
        }
    }

    pub fn grid(&self) -> &TensorGrid {
        &self.grid
    }
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }
    pub fn queue(&self) -> &ActionQueue {
        &self.queue
    }

    /// one full cycle; soft failures inside stages degrade to empty
    /// results, so the loop itself only fails on driver loss
    pub fn tick(&mut self) -> Result<TickReport, SweepError> {
        let start = Instant::now();
        self.tick += 1;
        let mut report = TickReport {
            tick: self.tick,
            ..TickReport::default()
        };

        // capture
        let captured = Instant::now();
        let viewport = self.viewport()?;
        let screenshot = self.driver.take_screenshot()?;
        self.scheduler.note_capture();
        self.metrics
            .record_operation(Layer::Capture, "screenshot", captured.elapsed(), true);

        // slice and classify
        let recognizing = Instant::now();
        let patches = match self.segmenter.segment(&screenshot, viewport, None) {
            Ok(patches) => patches,
            Err(e) => {
                self.logger.warn("capture", format!("segmentation failed: {}", e));
                Vec::new()
            }
        };
        report.patches = patches.len();
        let matches = self.matcher.recognize_batch(&patches);
        report.recognized = matches.iter().filter(|m| m.tier != Tier::None).count();
        self.metrics.record_operation(
            Layer::Recognition,
            "batch",
            recognizing.elapsed(),
            report.recognized > 0 || report.patches == 0,
        );

        // fold recognition into the store; unrecognized patches keep
        // whatever the store already believed
        let previous = self.grid.get_region(viewport);
        let mut symbols = previous.symbols.clone();
        let mut confidence = previous.confidence.clone();
        let mut dirty = Raster::<bool>::new(viewport.width(), viewport.height());
        for (patch, matched) in patches.iter().zip(matches.iter()) {
            if matched.tier == Tier::None {
                continue;
            }
            let x = (patch.cell.0 - viewport.x_min) as usize;
            let y = (patch.cell.1 - viewport.y_min) as usize;
            symbols.set(x, y, matched.symbol);
            confidence.set(x, y, matched.confidence);
            dirty.set(x, y, true);
        }
        self.grid.update_region(
            viewport,
            RegionWrite {
                symbols: Some(symbols),
                confidence: Some(confidence),
                frontier: None,
                dirty_mask: Some(dirty),
            },
        )?;

        // frontier
        let view = self.grid.solver_view();
        let frontier = self.extractor.extract(&view, viewport, &self.grid, &self.hints);
        report.frontier_cells = frontier.cells.len();

        // solve on a fresh snapshot that includes the frontier mask
        let solving = Instant::now();
        let view = self.grid.solver_view();
        let solved = self.solver.solve(&view, Some(viewport), &self.hints);
        report.zones = solved.zones;
        report.actions_emitted = solved.actions.len();
        self.metrics
            .record_operation(Layer::Solver, "solve", solving.elapsed(), !solved.timed_out);
        self.sink.event(&TraceEvent {
            tick: self.tick,
            kind: TraceKind::Solver,
            data: serde_json::json!({
                "zones": solved.zones,
                "actions": solved.actions.len(),
                "timed_out": solved.timed_out,
            }),
        });

        // queue and execute
        self.queue.enqueue(solved.actions, &view);
        let batch = self.queue.next_actions(ACTIONS_PER_TICK);
        report.actions_executed = batch.len();
        for queued in batch.iter() {
            self.queue.mark_executing(queued.id);
            let executing = Instant::now();
            let outcome = self.executor.execute(&queued.action);
            self.metrics
                .record_operation(Layer::Actions, "execute", executing.elapsed(), outcome.ok());
            self.logger.debug(
                "executor",
                format!("{} -> {:?} after {} attempts", queued.action, outcome.result, outcome.attempts),
            );
            self.sink.event(&TraceEvent {
                tick: self.tick,
                kind: TraceKind::Action,
                data: serde_json::json!({
                    "at": [queued.action.at.0, queued.action.at.1],
                    "kind": format!("{:?}", queued.action.kind),
                    "result": format!("{:?}", outcome.result),
                }),
            });
            if outcome.ok() {
                report.actions_succeeded += 1;
            }
            self.queue.complete(queued.id, outcome.ok());
        }
        if report.actions_executed > 0 {
            let success_rate = report.actions_succeeded as f32 / report.actions_executed as f32;
            self.matcher.feedback(success_rate);
            self.hints.solver_feedback(viewport, success_rate);
        }

        // density and movement: relocate only when the neighborhood
        // has stopped paying out
        let planning = Instant::now();
        let view = self.grid.solver_view();
        let map = self.analyzer.analyze(&view, None);
        let requests = self.scheduler.update(&map, viewport);
        for request in requests.iter() {
            self.logger
                .debug("scheduler", format!("capture wanted at {} ({:?})", request.bounds, request.trigger));
        }
        if report.actions_executed == 0 {
            if let Some(vector) = self.planner.plan(&map, viewport.center()) {
                self.driver.scroll_to(vector.dx, vector.dy)?;
                report.moved = Some((vector.dx, vector.dy));
                self.sink.event(&TraceEvent {
                    tick: self.tick,
                    kind: TraceKind::ViewportChange,
                    data: serde_json::json!({
                        "dx": vector.dx,
                        "dy": vector.dy,
                        "reasoning": vector.reasoning,
                    }),
                });
            }
        }
        self.metrics
            .record_operation(Layer::Pathfinder, "plan", planning.elapsed(), true);

        // announce and drain this tick's dirty regions
        for dirty in self.grid.dirty_regions(None) {
            self.hints.publish(crate::hints::hint::Hint::new(
                crate::hints::hint::HintKind::DirtyRegion,
                dirty.bounds,
                0.2,
            ));
        }
        self.grid.clear_dirty();

        // trace the tick
        self.sink.tick(&TickSnapshot {
            tick: self.tick,
            view: (*self.grid.solver_view()).clone(),
        });
        self.metrics.increment_counter("ticks", 1.0);
        self.metrics
            .set_gauge("queue_depth", self.queue.queue_status().queued as f64);
        report.elapsed = start.elapsed();
        Ok(report)
    }

    /// run `ticks` cycles, stopping early only on driver loss
    pub fn run(&mut self, ticks: u64) -> Result<Vec<TickReport>, SweepError> {
        let mut reports = Vec::with_capacity(ticks as usize);
        for _ in 0..ticks {
            let report = self.tick()?;
            log::info!(
                "tick {}: {} patches, {} frontier, {} zones, {}/{} actions{}",
                report.tick,
                report.patches,
                report.frontier_cells,
                report.zones,
                report.actions_succeeded,
                report.actions_executed,
                match report.moved {
                    Some((dx, dy)) => format!(", moved ({}, {})", dx, dy),
                    None => String::new(),
                },
            );
            reports.push(report);
        }
        Ok(reports)
    }

    /// current viewport in grid coordinates
    fn viewport(&self) -> Result<Bounds, SweepError> {
        let vp = self.driver.current_viewport()?;
        let (x0, y0) = self.convert.to_cell(vp.x, vp.y);
        let (x1, y1) = self
            .convert
            .to_cell(vp.x + vp.width - 1.0, vp.y + vp.height - 1.0);
        Ok(Bounds::new(x0, y0, x1, y1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::simulated::SimulatedDriver;
    use crate::grid::symbol::Symbol;
    use crate::ops::trace::NullSink;
    use crate::solver::hybrid::Strategy;
    use crate::vision::template::SyntheticTemplates;

    fn headless_config() -> Config {
        let mut config = Config::default();
        // certainties only, so the audit below can demand perfection
        config.csp.strategy = Strategy::CspOnly;
        // the store lags the driver by a tick, so in-loop settling
        // verification would always fail; the audit happens here
        config.executor.verification = false;
        config.executor.settling_delay_ms = 0;
        config
    }

    fn sim_converter() -> CoordinateConverter {
        CoordinateConverter {
            cell_border: 0.0,
            ..CoordinateConverter::default()
        }
    }

    fn bot_over(driver: Arc<SimulatedDriver>) -> Bot {
        Bot::new(
            driver,
            sim_converter(),
            &SyntheticTemplates,
            Arc::new(NullSink),
            headless_config(),
        )
    }

    #[test]
    fn pipeline_reveals_and_never_detonates() {
        let driver = Arc::new(SimulatedDriver::new(11, 0.12, 12, 12));
        // opening move is the host's job, not the core's
        driver.click_cell(6, 6).unwrap();
        let opened = driver.revealed_count();
        assert!(opened > 0);
        let mut bot = bot_over(driver.clone());
        for _ in 0..6 {
            bot.tick().unwrap();
        }
        assert!(driver.detonations() == 0);
        assert!(driver.revealed_count() >= opened);
    }

    #[test]
    fn flags_placed_are_true_mines() {
        let driver = Arc::new(SimulatedDriver::new(23, 0.14, 12, 12));
        driver.click_cell(6, 6).unwrap();
        let mut bot = bot_over(driver.clone());
        for _ in 0..6 {
            bot.tick().unwrap();
        }
        let view = bot.grid().solver_view();
        let Some(bounds) = view.bounds() else {
            return;
        };
        let mut flags = 0;
        for at in bounds.cells() {
            if view.symbol(at) == Symbol::Flagged {
                flags += 1;
                assert!(driver.is_mine(at), "flag at ({}, {})", at.0, at.1);
            }
        }
        let _ = flags;
    }

    #[test]
    fn grid_mirrors_the_simulated_board() {
        let driver = Arc::new(SimulatedDriver::new(5, 0.10, 10, 10));
        driver.click_cell(5, 5).unwrap();
        let mut bot = bot_over(driver.clone());
        bot.tick().unwrap();
        let view = bot.grid().solver_view();
        // every cell the driver shows revealed must have been
        // recognized as its true symbol
        for at in driver.visible().cells() {
            let truth = driver.is_mine(at);
            match view.symbol(at) {
                Symbol::Number(_) | Symbol::Empty => assert!(!truth),
                _ => {}
            }
        }
    }

    #[test]
    fn ticks_report_progress() {
        let driver = Arc::new(SimulatedDriver::new(3, 0.12, 10, 10));
        driver.click_cell(5, 5).unwrap();
        let mut bot = bot_over(driver);
        let report = bot.tick().unwrap();
        assert!(report.tick == 1);
        assert!(report.patches == 100);
        assert!(report.recognized > 0);
        assert!(bot.metrics().counter("ticks") == 1.0);
    }
}
