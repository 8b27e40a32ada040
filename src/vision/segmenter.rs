use super::patch::Patch;
use super::patch::PatchKind;
use super::patch::PixelRect;
use crate::error::SweepError;
use crate::grid::bounds::Bounds;
use crate::grid::raster::Raster;
use crate::vision::pixel::Pixmap;
use crate::CELL_SIZE;
use crate::PATCH_MARGIN;

#[derive(Debug, Default, Clone)]
pub struct SegmenterStats {
    pub patches: u64,
    pub masked: u64,
    pub clipped: u64,
}

/// slices a screenshot into per-cell patches aligned with grid
/// coordinates. the screenshot is laid out with the viewport's top-left
/// cell at pixel (0, 0), one cell every `cell_size` pixels; the margin
/// trims the cell border away from each patch.
pub struct PatchSegmenter {
    cell_size: usize,
    margin: usize,
    counter: std::sync::atomic::AtomicU64,
    stats: std::sync::Mutex<SegmenterStats>,
}

impl Default for PatchSegmenter {
    fn default() -> Self {
        Self::new(CELL_SIZE, PATCH_MARGIN)
    }
}

impl PatchSegmenter {
    pub fn new(cell_size: usize, margin: usize) -> Self {
        Self {
            cell_size,
            margin,
            counter: std::sync::atomic::AtomicU64::new(0),
            stats: std::sync::Mutex::new(SegmenterStats::default()),
        }
    }

    /// one patch per viewport cell. cells whose pixels fall outside the
    /// screenshot are clipped; cells masked at any of the patch's four
    /// corners (interface chrome) are skipped.
    pub fn segment<'a>(
        &self,
        screenshot: &'a Pixmap,
        viewport: Bounds,
        interface_mask: Option<&Raster<bool>>,
    ) -> Result<Vec<Patch<'a>>, SweepError> {
        self.slice(screenshot, viewport, interface_mask, None)
    }

    /// like `segment`, but yields only cells flagged in the viewport-
    /// local frontier mask
    pub fn segment_frontier<'a>(
        &self,
        screenshot: &'a Pixmap,
        viewport: Bounds,
        interface_mask: Option<&Raster<bool>>,
        frontier: &Raster<bool>,
    ) -> Result<Vec<Patch<'a>>, SweepError> {
        if frontier.shape() != (viewport.width(), viewport.height()) {
            return Err(SweepError::ShapeMismatch {
                expected: (viewport.width(), viewport.height()),
                found: frontier.shape(),
            });
        }
        self.slice(screenshot, viewport, interface_mask, Some(frontier))
    }

    fn slice<'a>(
        &self,
        screenshot: &'a Pixmap,
        viewport: Bounds,
        interface_mask: Option<&Raster<bool>>,
        frontier: Option<&Raster<bool>>,
    ) -> Result<Vec<Patch<'a>>, SweepError> {
        if screenshot.is_empty() {
            return Err(SweepError::InvalidInput("empty screenshot".into()));
        }
        if let Some(mask) = interface_mask {
            if mask.shape() != screenshot.shape() {
                return Err(SweepError::InvalidInput("mask shape disagrees with screenshot".into()));
            }
        }
        let side = self.cell_size - 2 * self.margin;
        let mut patches = Vec::with_capacity(viewport.area());
        let mut stats = self.stats.lock().expect("segmenter lock");
        for (row, y) in (viewport.y_min..=viewport.y_max).enumerate() {
            for (col, x) in (viewport.x_min..=viewport.x_max).enumerate() {
                if let Some(frontier) = frontier {
                    if !*frontier.get(col, row) {
                        continue;
                    }
                }
                let rect = PixelRect::new(
                    col * self.cell_size + self.margin,
                    row * self.cell_size + self.margin,
                    side,
                    side,
                );
                let inside = rect.x + rect.width <= screenshot.width()
                    && rect.y + rect.height <= screenshot.height();
                if !inside {
                    stats.clipped += 1;
                    continue;
                }
                if let Some(mask) = interface_mask {
                    if rect.corners().iter().any(|&(cx, cy)| *mask.get(cx, cy)) {
                        stats.masked += 1;
                        continue;
                    }
                }
                let kind = match frontier {
                    Some(_) => PatchKind::FrontierCell,
                    None => PatchKind::Cell,
                };
                let patch = Patch {
                    id: self
                        .counter
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed),
                    kind,
                    source: screenshot,
                    rect,
                    cell: (x, y),
                    confidence: 0.0,
                };
                let confidence = (patch.variance() / 2000.0).min(1.0);
                patches.push(Patch { confidence, ..patch });
                stats.patches += 1;
            }
        }
        Ok(patches)
    }

    pub fn stats(&self) -> SegmenterStats {
        self.stats.lock().expect("segmenter lock").clone()
    }
}
