use super::density::DensityMap;
use crate::grid::bounds::Bounds;
use crate::Priority;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

/// why a capture got requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTrigger {
    DensitySpike,
    FrontierExpansion,
    CriticalZone,
    Timeout,
    Manual,
}

/// task lifecycle; Ready means every dependency completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Ready,
    InProgress,
    Completed,
    Failed,
    Expired,
}

/// an off-screen region worth revisiting
#[derive(Debug, Clone)]
pub struct ViewportTask {
    pub id: u64,
    pub bounds: Bounds,
    pub priority: Priority,
    pub status: TaskStatus,
    pub trigger: CaptureTrigger,
    pub created_at: Instant,
    pub depends_on: Vec<u64>,
    pub retries: usize,
}

/// an immediate request for an extra capture this tick
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub id: u64,
    pub bounds: Bounds,
    pub trigger: CaptureTrigger,
    pub priority: Priority,
}

#[derive(Debug, Default, Clone)]
pub struct SchedulerStats {
    pub tasks_created: u64,
    pub tasks_merged: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_expired: u64,
    pub captures_triggered: u64,
}

/// watches the density surface between ticks and decides when the
/// agent needs to look somewhere else: sudden density or frontier
/// jumps, strong regions outside the viewport, or plain staleness,
/// which sends the viewport along an exploratory spiral.
pub struct ViewportScheduler {
    max_pending: usize,
    task_timeout: Duration,
    capture_timeout: Duration,
    state: Mutex<State>,
}

struct State {
    tasks: Vec<ViewportTask>,
    last_max_density: f32,
    last_frontier_ratio: f32,
    last_capture: Instant,
    spiral_turn: u32,
    next_id: u64,
    stats: SchedulerStats,
}

impl Default for ViewportScheduler {
    fn default() -> Self {
        Self::new(20, Duration::from_secs(30), Duration::from_secs(15))
    }
}

impl ViewportScheduler {
    pub fn new(max_pending: usize, task_timeout: Duration, capture_timeout: Duration) -> Self {
        Self {
            max_pending,
            task_timeout,
            capture_timeout,
            state: Mutex::new(State {
                tasks: Vec::new(),
                last_max_density: 0.0,
                last_frontier_ratio: 0.0,
                last_capture: Instant::now(),
                spiral_turn: 0,
                next_id: 0,
                stats: SchedulerStats::default(),
            }),
        }
    }

    /// per-tick detection pass; returns the capture requests this tick
    /// earned. also expires overdue tasks and promotes unblocked ones.
    pub fn update(&self, map: &DensityMap, viewport: Bounds) -> Vec<CaptureRequest> {
        let mut state = self.state.lock().expect("scheduler lock");
        let mut requests = Vec::new();
        if map.max - state.last_max_density > 0.3 {
            let bounds = Self::peak_region(map).unwrap_or(viewport);
            requests.push(state.request(bounds, CaptureTrigger::DensitySpike, 0.8));
        }
        if map.frontier_ratio - state.last_frontier_ratio > 0.2 {
            requests.push(state.request(viewport.inflate(10), CaptureTrigger::FrontierExpansion, 0.7));
        }
        for region in map.regions.iter() {
            if region.priority > 0.7 && !region.bounds.intersects(&viewport) {
                requests.push(state.request(region.bounds, CaptureTrigger::CriticalZone, 0.9));
            }
        }
        if state.last_capture.elapsed() > self.capture_timeout {
            let bounds = Self::spiral(viewport, state.spiral_turn);
            state.spiral_turn += 1;
            requests.push(state.request(bounds, CaptureTrigger::Timeout, 0.4));
        }
        state.last_max_density = map.max;
        state.last_frontier_ratio = map.frontier_ratio;
        let timeout = self.task_timeout;
        for task in state.tasks.iter_mut() {
            if matches!(task.status, TaskStatus::Pending | TaskStatus::Ready)
                && task.created_at.elapsed() > timeout
            {
                task.status = TaskStatus::Expired;
            }
        }
        state.stats.tasks_expired += state
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Expired)
            .count() as u64;
        state.tasks.retain(|t| t.status != TaskStatus::Expired);
        state.promote();
        for request in requests.iter() {
            state.schedule(
                request.bounds,
                request.priority,
                request.trigger,
                Vec::new(),
                self.max_pending,
            );
        }
        state.stats.captures_triggered += requests.len() as u64;
        requests
    }

    /// enqueue a revisit; overlapping pending tasks merge instead of
    /// piling up
    pub fn schedule_visit(
        &self,
        bounds: Bounds,
        priority: Priority,
        depends_on: Vec<u64>,
    ) -> u64 {
        let mut state = self.state.lock().expect("scheduler lock");
        state.schedule(bounds, priority, CaptureTrigger::Manual, depends_on, self.max_pending)
    }

    /// pop the best ready task and mark it in progress
    pub fn next_task(&self) -> Option<ViewportTask> {
        let mut state = self.state.lock().expect("scheduler lock");
        state.promote();
        let best = state
            .tasks
            .iter_mut()
            .filter(|t| t.status == TaskStatus::Ready)
            .max_by(|a, b| a.priority.total_cmp(&b.priority).then(b.id.cmp(&a.id)))?;
        best.status = TaskStatus::InProgress;
        Some(best.clone())
    }

    /// settle an in-progress task; failures retry three times at a
    /// reduced priority
    pub fn complete_task(&self, id: u64, success: bool) {
        let mut state = self.state.lock().expect("scheduler lock");
        let Some(task) = state.tasks.iter_mut().find(|t| t.id == id) else {
            return;
        };
        if success {
            task.status = TaskStatus::Completed;
            state.stats.tasks_completed += 1;
        } else if task.retries < 3 {
            task.retries += 1;
            task.priority *= 0.7;
            task.status = TaskStatus::Pending;
        } else {
            task.status = TaskStatus::Failed;
            state.stats.tasks_failed += 1;
        }
        state.promote();
    }

    /// reset the staleness clock after any successful capture
    pub fn note_capture(&self) {
        self.state.lock().expect("scheduler lock").last_capture = Instant::now();
    }

    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .expect("scheduler lock")
            .tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::Ready))
            .count()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.state.lock().expect("scheduler lock").stats.clone()
    }

    /// a window around the densest cell
    fn peak_region(map: &DensityMap) -> Option<Bounds> {
        map.hotspots
            .first()
            .map(|spot| Bounds::cell(spot.at).inflate(10))
    }

    /// square spiral of viewport-sized hops: right, down, left, left,
    /// up, up, right, right, right...
    fn spiral(viewport: Bounds, turn: u32) -> Bounds {
        let step_x = viewport.width() as i32;
        let step_y = viewport.height() as i32;
        let (mut x, mut y) = (0i32, 0i32);
        let mut leg = 1i32;
        let mut remaining = turn as i32 + 1;
        let directions = [(1, 0), (0, 1), (-1, 0), (0, -1)];
        let mut d = 0;
        'walk: loop {
            for _ in 0..2 {
                for _ in 0..leg {
                    if remaining == 0 {
                        break 'walk;
                    }
                    x += directions[d].0;
                    y += directions[d].1;
                    remaining -= 1;
                }
                d = (d + 1) % 4;
            }
            leg += 1;
        }
        Bounds::new(
            viewport.x_min + x * step_x,
            viewport.y_min + y * step_y,
            viewport.x_max + x * step_x,
            viewport.y_max + y * step_y,
        )
    }
}

impl State {
    fn request(&mut self, bounds: Bounds, trigger: CaptureTrigger, priority: Priority) -> CaptureRequest {
        let id = self.next_id;
        self.next_id += 1;
        CaptureRequest {
            id,
            bounds,
            trigger,
            priority,
        }
    }

    fn schedule(
        &mut self,
        bounds: Bounds,
        priority: Priority,
        trigger: CaptureTrigger,
        depends_on: Vec<u64>,
        max_pending: usize,
    ) -> u64 {
        if let Some(existing) = self.tasks.iter_mut().find(|t| {
            matches!(t.status, TaskStatus::Pending | TaskStatus::Ready)
                && t.bounds.intersects(&bounds)
        }) {
            existing.priority = existing.priority.max(priority);
            self.stats.tasks_merged += 1;
            return existing.id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.tasks.push(ViewportTask {
            id,
            bounds,
            priority,
            status: TaskStatus::Pending,
            trigger,
            created_at: Instant::now(),
            depends_on,
            retries: 0,
        });
        self.stats.tasks_created += 1;
        let pending = self
            .tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::Ready))
            .count();
        if pending > max_pending {
            // shed the weakest pending task
            let weakest = self
                .tasks
                .iter()
                .filter(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::Ready))
                .min_by(|a, b| a.priority.total_cmp(&b.priority))
                .map(|t| t.id);
            if let Some(weakest) = weakest {
                self.tasks.retain(|t| t.id != weakest);
            }
        }
        self.promote();
        id
    }

    /// Pending -> Ready once every parent completed
    fn promote(&mut self) {
        let done = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.id)
            .collect::<std::collections::HashSet<_>>();
        for task in self.tasks.iter_mut() {
            if task.status == TaskStatus::Pending
                && task.depends_on.iter().all(|d| done.contains(d))
            {
                task.status = TaskStatus::Ready;
            }
        }
    }
}
