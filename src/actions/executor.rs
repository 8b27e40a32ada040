use super::report::ExecutionReport;
use super::report::ExecutionResult;
use crate::browser::driver::BrowserDriver;
use crate::config::ExecutorConfig;
use crate::grid::symbol::Symbol;
use crate::grid::tensor::TensorGrid;
use crate::solver::action::ActionKind;
use crate::solver::action::SolverAction;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

#[derive(Debug, Default, Clone)]
pub struct ExecutorStats {
    pub executed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub verification_failures: u64,
    pub timeouts: u64,
    pub retries: u64,
}

/// drives solver conclusions into the browser and audits the result.
///
/// dispatch is bounds-checked against the store first; a coordinate the
/// grid has never covered means the conclusion is stale and is not
/// worth a driver round-trip, let alone a retry. driver faults and
/// failed verifications retry with exponential backoff; flags write
/// straight back into the store so downstream sees them immediately.
pub struct ActionExecutor {
    driver: Arc<dyn BrowserDriver>,
    grid: Arc<TensorGrid>,
    config: ExecutorConfig,
    stats: Mutex<ExecutorStats>,
}

impl ActionExecutor {
    pub fn new(driver: Arc<dyn BrowserDriver>, grid: Arc<TensorGrid>, config: ExecutorConfig) -> Self {
        Self {
            driver,
            grid,
            config,
            stats: Mutex::new(ExecutorStats::default()),
        }
    }

    pub fn execute(&self, action: &SolverAction) -> ExecutionReport {
        let start = Instant::now();
        self.bump(|s| s.executed += 1);
        if !self
            .grid
            .bounds()
            .map(|b| b.contains(action.at))
            .unwrap_or(false)
        {
            self.bump(|s| s.failed += 1);
            return ExecutionReport {
                result: ExecutionResult::InvalidCoordinates,
                elapsed: start.elapsed(),
                attempts: 0,
                message: Some(format!("({}, {}) outside store", action.at.0, action.at.1)),
            };
        }
        let mut attempts = 0;
        let mut last = ExecutionResult::Failed;
        let mut message = None;
        while attempts <= self.config.max_retries {
            if attempts > 0 {
                self.bump(|s| s.retries += 1);
                std::thread::sleep(Duration::from_millis(100 * (1 << (attempts - 1))));
            }
            attempts += 1;
            let (result, note) = self.attempt(action);
            last = result;
            message = note;
            match result {
                ExecutionResult::Success => break,
                r if !r.retryable() => break,
                _ => continue,
            }
        }
        match last {
            ExecutionResult::Success => self.bump(|s| s.succeeded += 1),
            ExecutionResult::VerificationFailed => self.bump(|s| s.verification_failures += 1),
            ExecutionResult::Timeout => self.bump(|s| s.timeouts += 1),
            _ => self.bump(|s| s.failed += 1),
        }
        ExecutionReport {
            result: last,
            elapsed: start.elapsed(),
            attempts,
            message,
        }
    }

    /// small worker pool over a batch. actions at the same coordinate
    /// land in the same lane so the driver never sees them interleave.
    pub fn execute_batch(&self, actions: &[SolverAction]) -> Vec<ExecutionReport> {
        let lanes = self.config.pool_size.clamp(1, num_cpus::get()).min(actions.len().max(1));
        if lanes <= 1 {
            return actions.iter().map(|a| self.execute(a)).collect();
        }
        let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); lanes];
        for (i, action) in actions.iter().enumerate() {
            let lane = (action.at.0.unsigned_abs() as usize ^ (action.at.1.unsigned_abs() as usize) << 1) % lanes;
            buckets[lane].push(i);
        }
        let reports: Vec<Mutex<Option<ExecutionReport>>> =
            actions.iter().map(|_| Mutex::new(None)).collect();
        let slots = &reports;
        std::thread::scope(|scope| {
            for bucket in buckets.iter().filter(|b| !b.is_empty()) {
                scope.spawn(move || {
                    for &i in bucket.iter() {
                        let report = self.execute(&actions[i]);
                        *slots[i].lock().expect("report slot") = Some(report);
                    }
                });
            }
        });
        reports
            .into_iter()
            .map(|slot| slot.into_inner().expect("report slot").expect("lane ran"))
            .collect()
    }

    pub fn stats(&self) -> ExecutorStats {
        self.stats.lock().expect("executor stats").clone()
    }

    /// one dispatch + settle + audit round
    fn attempt(&self, action: &SolverAction) -> (ExecutionResult, Option<String>) {
        let budget = Duration::from_millis(self.config.execution_timeout_ms);
        let started = Instant::now();
        let outcome = match action.kind {
            ActionKind::Reveal | ActionKind::Guess => self.driver.click_cell(action.at.0, action.at.1),
            ActionKind::Flag => self.driver.flag_cell(action.at.0, action.at.1),
        };
        match outcome {
            Err(e) => return (ExecutionResult::Failed, Some(e.to_string())),
            Ok(false) => return (ExecutionResult::Failed, Some("driver declined".into())),
            Ok(true) => {}
        }
        if started.elapsed() > budget {
            return (ExecutionResult::Timeout, Some("driver call overran budget".into()));
        }
        if action.kind == ActionKind::Flag {
            // downstream must treat the cell as flagged regardless of
            // when the next capture lands
            if let Err(e) = self.grid.set_cell(action.at, Symbol::Flagged, 1.0, false) {
                return (ExecutionResult::Failed, Some(e.to_string()));
            }
            return (ExecutionResult::Success, None);
        }
        std::thread::sleep(Duration::from_millis(self.config.settling_delay_ms));
        if self.config.verification {
            let (symbol, ..) = self.grid.get_cell(action.at);
            if symbol.is_unrevealed() {
                return (
                    ExecutionResult::VerificationFailed,
                    Some("cell still unrevealed after settling".into()),
                );
            }
        }
        (ExecutionResult::Success, None)
    }

    fn bump(&self, f: impl FnOnce(&mut ExecutorStats)) {
        f(&mut self.stats.lock().expect("executor stats"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::driver::NullDriver;
    use crate::browser::driver::Viewport;
    use crate::error::SweepError;
    use crate::vision::pixel::Pixmap;

    fn fast_config() -> ExecutorConfig {
        ExecutorConfig {
            settling_delay_ms: 0,
            ..ExecutorConfig::default()
        }
    }

    fn grid_with_unknown(at: crate::Point) -> Arc<TensorGrid> {
        let grid = Arc::new(TensorGrid::new());
        grid.set_cell(at, Symbol::Unknown, 0.0, false).unwrap();
        grid
    }

    #[test]
    fn out_of_store_coordinates_fail_fast() {
        let executor = ActionExecutor::new(
            Arc::new(NullDriver),
            Arc::new(TensorGrid::new()),
            fast_config(),
        );
        let report = executor.execute(&SolverAction::reveal((3, 4), "r"));
        assert!(report.result == ExecutionResult::InvalidCoordinates);
        assert!(report.attempts == 0);
    }

    #[test]
    fn flags_write_back_into_the_store() {
        let grid = grid_with_unknown((2, 2));
        let executor = ActionExecutor::new(Arc::new(NullDriver), grid.clone(), fast_config());
        let report = executor.execute(&SolverAction::flag((2, 2), "mine"));
        assert!(report.ok());
        let (symbol, confidence, ..) = grid.get_cell((2, 2));
        assert!(symbol == Symbol::Flagged);
        assert!(confidence == 1.0);
    }

    #[test]
    fn unverified_reveals_report_and_retry() {
        // the driver accepts the click but nothing ever updates the
        // store, so settling always finds the cell unrevealed
        let grid = grid_with_unknown((3, 4));
        let executor = ActionExecutor::new(
            Arc::new(NullDriver),
            grid,
            ExecutorConfig {
                settling_delay_ms: 0,
                max_retries: 2,
                ..ExecutorConfig::default()
            },
        );
        let report = executor.execute(&SolverAction::reveal((3, 4), "r"));
        assert!(report.result == ExecutionResult::VerificationFailed);
        assert!(report.attempts == 3);
    }

    #[test]
    fn verification_can_be_disabled() {
        let grid = grid_with_unknown((1, 1));
        let executor = ActionExecutor::new(
            Arc::new(NullDriver),
            grid,
            ExecutorConfig {
                settling_delay_ms: 0,
                verification: false,
                ..ExecutorConfig::default()
            },
        );
        let report = executor.execute(&SolverAction::reveal((1, 1), "r"));
        assert!(report.ok());
        assert!(report.attempts == 1);
    }

    /// a driver that always errors, for the retry path
    struct BrokenDriver;
    impl BrowserDriver for BrokenDriver {
        fn click_cell(&self, _: i32, _: i32) -> Result<bool, SweepError> {
            Err(SweepError::Driver("socket closed".into()))
        }
        fn flag_cell(&self, _: i32, _: i32) -> Result<bool, SweepError> {
            Err(SweepError::Driver("socket closed".into()))
        }
        fn double_click_cell(&self, _: i32, _: i32) -> Result<bool, SweepError> {
            Err(SweepError::Driver("socket closed".into()))
        }
        fn scroll_to(&self, _: i32, _: i32) -> Result<bool, SweepError> {
            Err(SweepError::Driver("socket closed".into()))
        }
        fn current_viewport(&self) -> Result<Viewport, SweepError> {
            Err(SweepError::Driver("socket closed".into()))
        }
        fn take_screenshot(&self) -> Result<Pixmap, SweepError> {
            Err(SweepError::Driver("socket closed".into()))
        }
    }

    #[test]
    fn driver_faults_exhaust_retries() {
        let grid = grid_with_unknown((0, 0));
        let executor = ActionExecutor::new(
            Arc::new(BrokenDriver),
            grid,
            ExecutorConfig {
                settling_delay_ms: 0,
                max_retries: 1,
                ..ExecutorConfig::default()
            },
        );
        let report = executor.execute(&SolverAction::flag((0, 0), "f"));
        assert!(report.result == ExecutionResult::Failed);
        assert!(report.attempts == 2);
        assert!(executor.stats().retries == 1);
    }

    #[test]
    fn batch_reports_line_up_with_actions() {
        let grid = Arc::new(TensorGrid::new());
        for i in 0..4 {
            grid.set_cell((i, 0), Symbol::Unknown, 0.0, false).unwrap();
        }
        let executor = ActionExecutor::new(
            Arc::new(NullDriver),
            grid,
            ExecutorConfig {
                settling_delay_ms: 0,
                verification: false,
                ..ExecutorConfig::default()
            },
        );
        let actions = (0..4)
            .map(|i| SolverAction::flag((i, 0), "f"))
            .collect::<Vec<_>>();
        let reports = executor.execute_batch(&actions);
        assert!(reports.len() == 4);
        assert!(reports.iter().all(|r| r.ok()));
    }
}
