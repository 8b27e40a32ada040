use super::bounds::Bounds;
use super::dirty::Change;
use super::dirty::DirtyRegion;
use super::raster::Raster;
use super::symbol::Symbol;
use super::view::SolverView;
use crate::error::SweepError;
use crate::Confidence;
use crate::Point;
use crate::Tick;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Instant;

/// optional per-array payloads for a region write. absent arrays are
/// left untouched; the dirty mask selects which cells get their age
/// bumped (all of them when absent).
#[derive(Debug, Default, Clone)]
pub struct RegionWrite {
    pub symbols: Option<Raster<Symbol>>,
    pub confidence: Option<Raster<Confidence>>,
    pub frontier: Option<Raster<bool>>,
    pub dirty_mask: Option<Raster<bool>>,
}

impl RegionWrite {
    pub fn symbols(symbols: Raster<Symbol>, confidence: Raster<Confidence>) -> Self {
        Self {
            symbols: Some(symbols),
            confidence: Some(confidence),
            ..Self::default()
        }
    }
    pub fn frontier(frontier: Raster<bool>) -> Self {
        Self {
            frontier: Some(frontier),
            ..Self::default()
        }
    }
    fn change(&self) -> Change {
        match (&self.symbols, &self.confidence, &self.frontier) {
            (Some(_), None, None) => Change::Symbols,
            (None, Some(_), None) => Change::Confidence,
            (None, None, Some(_)) => Change::Frontier,
            _ => Change::Mixed,
        }
    }
}

/// independent copies of the four arrays over one region
#[derive(Debug, Clone)]
pub struct RegionData {
    pub symbols: Raster<Symbol>,
    pub confidence: Raster<Confidence>,
    pub age: Raster<Tick>,
    pub frontier: Raster<bool>,
}

#[derive(Debug, Default, Clone)]
pub struct GridStats {
    pub writes: u64,
    pub growths: u64,
    pub view_rebuilds: u64,
}

/// the shared store of everything the agent knows about the board.
///
/// four same-shape dense arrays behind one lock, with an origin offset
/// mapping local (0,0) to a global coordinate. the allocation grows
/// monotonically by union-rectangle reallocation whenever a write falls
/// outside; growth over-allocates by the old dimension on the growing
/// side so repeated edge writes amortize.
pub struct TensorGrid {
    state: Mutex<State>,
}

struct State {
    symbols: Raster<Symbol>,
    confidence: Raster<Confidence>,
    age: Raster<Tick>,
    frontier: Raster<bool>,
    origin: Point,
    written: Option<Bounds>,
    dirty: Vec<DirtyRegion>,
    clock: Tick,
    view: Option<Arc<SolverView>>,
    stats: GridStats,
}

impl Default for TensorGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl TensorGrid {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                symbols: Raster::new(0, 0),
                confidence: Raster::new(0, 0),
                age: Raster::new(0, 0),
                frontier: Raster::new(0, 0),
                origin: (0, 0),
                written: None,
                dirty: Vec::new(),
                clock: 0,
                view: None,
                stats: GridStats::default(),
            }),
        }
    }

    /// pre-size the allocation so early writes skip reallocation
    pub fn with_bounds(bounds: Bounds) -> Self {
        let this = Self::new();
        this.state.lock().expect("grid lock").grow(&bounds);
        this
    }

    /// write the provided sub-arrays at `bounds`, extending the store if
    /// needed. fails only when a supplied array disagrees with the
    /// region's shape.
    pub fn update_region(&self, bounds: Bounds, write: RegionWrite) -> Result<(), SweepError> {
        let shape = (bounds.width(), bounds.height());
        for supplied in [
            write.symbols.as_ref().map(|r| r.shape()),
            write.confidence.as_ref().map(|r| r.shape()),
            write.frontier.as_ref().map(|r| r.shape()),
            write.dirty_mask.as_ref().map(|r| r.shape()),
        ]
        .into_iter()
        .flatten()
        {
            if supplied != shape {
                return Err(SweepError::ShapeMismatch {
                    expected: shape,
                    found: supplied,
                });
            }
        }
        let mut state = self.state.lock().expect("grid lock");
        state.grow(&bounds);
        state.clock += 1;
        let clock = state.clock;
        let (ox, oy) = state.local_corner(&bounds);
        if let Some(ref symbols) = write.symbols {
            state.symbols.blit(ox, oy, symbols);
        }
        if let Some(ref confidence) = write.confidence {
            state.confidence.blit(ox, oy, confidence);
        }
        if let Some(ref frontier) = write.frontier {
            state.frontier.blit(ox, oy, frontier);
        }
        for y in 0..bounds.height() {
            for x in 0..bounds.width() {
                let touched = write
                    .dirty_mask
                    .as_ref()
                    .map(|m| *m.get(x, y))
                    .unwrap_or(true);
                if touched {
                    state
                        .age
                        .set((ox as usize) + x, (oy as usize) + y, clock);
                }
            }
        }
        let change = write.change();
        state.dirty.push(DirtyRegion::new(bounds, change));
        state.written = Some(match state.written {
            Some(ref w) => w.union(&bounds),
            None => bounds,
        });
        state.view = None;
        state.stats.writes += 1;
        Ok(())
    }

    /// independent copies of all four arrays over `bounds`; cells the
    /// store has never covered come back as defaults
    pub fn get_region(&self, bounds: Bounds) -> RegionData {
        let state = self.state.lock().expect("grid lock");
        let width = bounds.width();
        let height = bounds.height();
        let mut out = RegionData {
            symbols: Raster::new(width, height),
            confidence: Raster::new(width, height),
            age: Raster::new(width, height),
            frontier: Raster::new(width, height),
        };
        for y in 0..height {
            for x in 0..width {
                let gx = (bounds.x_min + x as i32 - state.origin.0) as isize;
                let gy = (bounds.y_min + y as i32 - state.origin.1) as isize;
                if let Some(&s) = state.symbols.at(gx, gy) {
                    out.symbols.set(x, y, s);
                    out.confidence.set(x, y, *state.confidence.at(gx, gy).expect("same shape"));
                    out.age.set(x, y, *state.age.at(gx, gy).expect("same shape"));
                    out.frontier.set(x, y, *state.frontier.at(gx, gy).expect("same shape"));
                }
            }
        }
        out
    }

    /// a consistent snapshot for the solver side. cached until the next
    /// write; copy-on-read so callers never hold the grid lock.
    pub fn solver_view(&self) -> Arc<SolverView> {
        let mut state = self.state.lock().expect("grid lock");
        if state.view.is_none() {
            state.stats.view_rebuilds += 1;
            state.view = Some(Arc::new(SolverView {
                symbols: state.symbols.clone(),
                confidence: state.confidence.clone(),
                age: state.age.clone(),
                frontier: state.frontier.clone(),
                origin: state.origin,
                last_update: state.clock,
            }));
        }
        state.view.as_ref().expect("just rebuilt").clone()
    }

    pub fn get_cell(&self, at: Point) -> (Symbol, Confidence, Tick, bool) {
        let state = self.state.lock().expect("grid lock");
        let x = (at.0 - state.origin.0) as isize;
        let y = (at.1 - state.origin.1) as isize;
        match state.symbols.at(x, y) {
            Some(&s) => (
                s,
                *state.confidence.at(x, y).expect("same shape"),
                *state.age.at(x, y).expect("same shape"),
                *state.frontier.at(x, y).expect("same shape"),
            ),
            None => (Symbol::Unknown, 0.0, 0, false),
        }
    }

    pub fn set_cell(
        &self,
        at: Point,
        symbol: Symbol,
        confidence: Confidence,
        frontier: bool,
    ) -> Result<(), SweepError> {
        self.update_region(
            Bounds::cell(at),
            RegionWrite {
                symbols: Some(Raster::filled(1, 1, symbol)),
                confidence: Some(Raster::filled(1, 1, confidence)),
                frontier: Some(Raster::filled(1, 1, frontier)),
                dirty_mask: None,
            },
        )
    }

    /// the minimal rectangle covering every coordinate ever written
    pub fn bounds(&self) -> Option<Bounds> {
        self.state.lock().expect("grid lock").written
    }

    pub fn dirty_regions(&self, since: Option<Instant>) -> Vec<DirtyRegion> {
        let state = self.state.lock().expect("grid lock");
        state
            .dirty
            .iter()
            .filter(|d| since.map(|s| d.at >= s).unwrap_or(true))
            .cloned()
            .collect()
    }

    pub fn clear_dirty(&self) {
        self.state.lock().expect("grid lock").dirty.clear();
    }

    pub fn stats(&self) -> GridStats {
        self.state.lock().expect("grid lock").stats.clone()
    }
}

impl State {
    fn allocation(&self) -> Option<Bounds> {
        match self.symbols.shape() {
            (0, _) | (_, 0) => None,
            (w, h) => Some(Bounds::new(
                self.origin.0,
                self.origin.1,
                self.origin.0 + w as i32 - 1,
                self.origin.1 + h as i32 - 1,
            )),
        }
    }

    fn local_corner(&self, bounds: &Bounds) -> (isize, isize) {
        (
            (bounds.x_min - self.origin.0) as isize,
            (bounds.y_min - self.origin.1) as isize,
        )
    }

    /// reallocate so the allocation covers `target`. each side that has
    /// to move gets an extra pad of the old dimension, so a run of
    /// adjacent writes reallocates O(log n) times rather than O(n).
    fn grow(&mut self, target: &Bounds) {
        let alloc = match self.allocation() {
            None => {
                self.origin = (target.x_min, target.y_min);
                self.symbols = Raster::filled(target.width(), target.height(), Symbol::Unknown);
                self.confidence = Raster::new(target.width(), target.height());
                self.age = Raster::new(target.width(), target.height());
                self.frontier = Raster::new(target.width(), target.height());
                self.view = None;
                return;
            }
            Some(alloc) if alloc.contains((target.x_min, target.y_min))
                && alloc.contains((target.x_max, target.y_max)) =>
            {
                return;
            }
            Some(alloc) => alloc,
        };
        let pad_x = alloc.width() as i32;
        let pad_y = alloc.height() as i32;
        let union = alloc.union(target);
        let grown = Bounds::new(
            if union.x_min < alloc.x_min { union.x_min - pad_x } else { union.x_min },
            if union.y_min < alloc.y_min { union.y_min - pad_y } else { union.y_min },
            if union.x_max > alloc.x_max { union.x_max + pad_x } else { union.x_max },
            if union.y_max > alloc.y_max { union.y_max + pad_y } else { union.y_max },
        );
        let mut symbols = Raster::filled(grown.width(), grown.height(), Symbol::Unknown);
        let mut confidence = Raster::new(grown.width(), grown.height());
        let mut age = Raster::new(grown.width(), grown.height());
        let mut frontier = Raster::new(grown.width(), grown.height());
        let dx = (alloc.x_min - grown.x_min) as isize;
        let dy = (alloc.y_min - grown.y_min) as isize;
        symbols.blit(dx, dy, &self.symbols);
        confidence.blit(dx, dy, &self.confidence);
        age.blit(dx, dy, &self.age);
        frontier.blit(dx, dy, &self.frontier);
        self.symbols = symbols;
        self.confidence = confidence;
        self.age = age;
        self.frontier = frontier;
        self.origin = (grown.x_min, grown.y_min);
        self.view = None;
        self.stats.growths += 1;
    }
}
