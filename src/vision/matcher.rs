use super::edges;
use super::patch::Patch;
use super::signature::ColorSignature;
use super::template::CellTemplate;
use super::template::TemplateSource;
use crate::grid::symbol::Symbol;
use crate::vision::pixel::Pixmap;
use crate::Confidence;
use crate::CELL_SIZE;
use crate::COLOR_THRESHOLD;
use crate::TEMPLATE_THRESHOLD;
use crate::VARIANCE_EMPTY;
use crate::VARIANCE_MINE;
use rayon::iter::IntoParallelRefIterator;
use rayon::iter::ParallelIterator;
use std::sync::Mutex;
use std::sync::RwLock;
use std::time::Duration;
use std::time::Instant;

/// which level of the hierarchy produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Color,
    Variance,
    Template,
    None,
}

/// the outcome of classifying one patch
#[derive(Debug, Clone, Copy)]
pub struct TemplateMatch {
    pub symbol: Symbol,
    pub confidence: Confidence,
    pub tier: Tier,
    pub elapsed: Duration,
}

impl TemplateMatch {
    fn miss(elapsed: Duration) -> Self {
        Self {
            symbol: Symbol::Unknown,
            confidence: 0.0,
            tier: Tier::None,
            elapsed,
        }
    }
}

/// tier acceptance thresholds, adapted at runtime by solver feedback
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub color: Confidence,
    pub template: Confidence,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            color: COLOR_THRESHOLD,
            template: TEMPLATE_THRESHOLD,
        }
    }
}

impl Thresholds {
    /// loosen when recognition keeps failing downstream, tighten when
    /// it is cruising; clamped to the documented bands
    fn adapt(&mut self, success_rate: f32) {
        let factor = match success_rate {
            s if s < 0.6 => 0.9,
            s if s > 0.9 => 1.05,
            _ => return,
        };
        self.color = (self.color * factor).clamp(0.5, 0.95);
        self.template = (self.template * factor).clamp(0.4, 0.9);
    }
}

#[derive(Debug, Default, Clone)]
pub struct MatcherStats {
    pub color_matches: u64,
    pub variance_matches: u64,
    pub template_matches: u64,
    pub misses: u64,
    pub adaptations: u64,
}

/// the hierarchical cell recognizer. three tiers attempted in order;
/// the first acceptance wins and reports itself in the match.
///
/// templates are read-mostly behind an rwlock so batch recognition can
/// fan out across threads; threshold adaptation takes a short lock.
pub struct TemplateMatcher {
    templates: RwLock<Vec<CellTemplate>>,
    thresholds: Mutex<Thresholds>,
    adaptive: bool,
    stats: Mutex<MatcherStats>,
}

impl TemplateMatcher {
    pub fn new(source: &dyn TemplateSource, config: &crate::config::RecognizerConfig) -> Self {
        let templates = source
            .templates()
            .into_iter()
            .map(|(symbol, pixels)| CellTemplate::new(symbol, pixels))
            .collect();
        Self {
            templates: RwLock::new(templates),
            thresholds: Mutex::new(Thresholds {
                color: config.color_threshold,
                template: config.template_threshold,
            }),
            adaptive: config.adaptive_thresholds,
            stats: Mutex::new(MatcherStats::default()),
        }
    }

    /// a matcher with no templates at all; recognizes nothing, which is
    /// the documented degraded mode
    pub fn degraded() -> Self {
        Self {
            templates: RwLock::new(Vec::new()),
            thresholds: Mutex::new(Thresholds::default()),
            adaptive: false,
            stats: Mutex::new(MatcherStats::default()),
        }
    }

    /// accept a runtime template, deriving its artifacts
    pub fn add_template(&self, symbol: Symbol, pixels: Pixmap) {
        self.templates
            .write()
            .expect("template lock")
            .push(CellTemplate::new(symbol, pixels));
    }

    pub fn recognize(&self, patch: &Patch) -> TemplateMatch {
        let start = Instant::now();
        let templates = self.templates.read().expect("template lock");
        if templates.is_empty() {
            self.bump(|s| s.misses += 1);
            return TemplateMatch::miss(start.elapsed());
        }
        let thresholds = *self.thresholds.lock().expect("threshold lock");
        if let Some(symbol) = self.by_color(patch, &templates, thresholds.color) {
            self.bump(|s| s.color_matches += 1);
            return TemplateMatch {
                symbol,
                confidence: 0.9,
                tier: Tier::Color,
                elapsed: start.elapsed(),
            };
        }
        if let Some(symbol) = self.by_variance(patch) {
            self.bump(|s| s.variance_matches += 1);
            return TemplateMatch {
                symbol,
                confidence: 0.8,
                tier: Tier::Variance,
                elapsed: start.elapsed(),
            };
        }
        if let Some((symbol, confidence)) = self.by_template(patch, &templates, thresholds.template)
        {
            self.bump(|s| s.template_matches += 1);
            return TemplateMatch {
                symbol,
                confidence,
                tier: Tier::Template,
                elapsed: start.elapsed(),
            };
        }
        self.bump(|s| s.misses += 1);
        TemplateMatch::miss(start.elapsed())
    }

    /// classify a whole capture in parallel, one result per patch
    pub fn recognize_batch(&self, patches: &[Patch]) -> Vec<TemplateMatch> {
        patches.par_iter().map(|p| self.recognize(p)).collect()
    }

    /// adaptive threshold hook fed by downstream success rates
    pub fn feedback(&self, success_rate: f32) {
        if !self.adaptive {
            return;
        }
        self.thresholds
            .lock()
            .expect("threshold lock")
            .adapt(success_rate);
        self.bump(|s| s.adaptations += 1);
    }

    pub fn thresholds(&self) -> Thresholds {
        *self.thresholds.lock().expect("threshold lock")
    }
    pub fn stats(&self) -> MatcherStats {
        self.stats.lock().expect("stats lock").clone()
    }

    /// tier 1: signature similarity against every template
    fn by_color(
        &self,
        patch: &Patch,
        templates: &[CellTemplate],
        threshold: Confidence,
    ) -> Option<Symbol> {
        let signature = ColorSignature::from(patch);
        templates
            .iter()
            .map(|t| (t.symbol, signature.score(&t.signature)))
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .filter(|&(_, score)| score >= threshold)
            .map(|(symbol, _)| symbol)
    }

    /// tier 2: coarse variance split. only the extremes are decidable
    /// here; everything in between falls through to correlation.
    fn by_variance(&self, patch: &Patch) -> Option<Symbol> {
        match patch.variance() {
            v if v < VARIANCE_EMPTY => Some(Symbol::Empty),
            v if v > VARIANCE_MINE => Some(Symbol::Mine),
            _ => None,
        }
    }

    /// tier 3: edge-map cross-correlation at the canonical cell size
    fn by_template(
        &self,
        patch: &Patch,
        templates: &[CellTemplate],
        threshold: Confidence,
    ) -> Option<(Symbol, Confidence)> {
        let pixels = patch.pixels();
        let pixels = match pixels.shape() {
            (w, h) if w == CELL_SIZE && h == CELL_SIZE => pixels,
            _ => pixels.resize_nearest(CELL_SIZE, CELL_SIZE),
        };
        let map = edges::edge_map(&pixels);
        templates
            .iter()
            .map(|t| (t.symbol, edges::correlation(&map, &t.edges)))
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .filter(|&(_, score)| score >= threshold)
    }

    fn bump(&self, f: impl FnOnce(&mut MatcherStats)) {
        f(&mut self.stats.lock().expect("stats lock"));
    }
}
