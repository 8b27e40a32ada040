use super::edges;
use super::pixel::Pixmap;
use super::pixel::Rgb;
use super::signature::ColorSignature;
use crate::grid::raster::Raster;
use crate::grid::symbol::Symbol;
use crate::CELL_SIZE;

/// a reference appearance for one symbol: canonical pixels plus the
/// precomputed artifacts each recognition tier compares against
#[derive(Debug, Clone)]
pub struct CellTemplate {
    pub symbol: Symbol,
    pub pixels: Pixmap,
    pub signature: ColorSignature,
    pub edges: Raster<bool>,
}

impl CellTemplate {
    /// derive the per-tier artifacts from raw pixels. the signature is
    /// shape-independent so the pixels stay as provided; the edge map
    /// lives at the canonical matching size.
    pub fn new(symbol: Symbol, pixels: Pixmap) -> Self {
        let canonical = match pixels.shape() {
            (w, h) if w == CELL_SIZE && h == CELL_SIZE => pixels.clone(),
            _ => pixels.resize_nearest(CELL_SIZE, CELL_SIZE),
        };
        let signature = ColorSignature::from(&pixels);
        let edges = edges::edge_map(&canonical);
        Self {
            symbol,
            pixels,
            signature,
            edges,
        }
    }
}

/// where bootstrap templates come from. the host wires a real source
/// once it has calibrated the game's skin; the synthetic source below
/// matches the simulated driver's renderer.
pub trait TemplateSource: Send + Sync {
    fn templates(&self) -> Vec<(Symbol, Pixmap)>;
}

/// the flat-shaded skin shared by the synthetic template source and the
/// simulated driver, so recognition round-trips in headless runs
pub fn palette(symbol: Symbol) -> Rgb {
    match symbol {
        Symbol::Unknown => Rgb::new(160, 160, 160),
        Symbol::Unrevealed => Rgb::new(160, 160, 160),
        Symbol::Empty => Rgb::new(222, 222, 222),
        Symbol::Number(1) => Rgb::new(40, 70, 200),
        Symbol::Number(2) => Rgb::new(40, 140, 60),
        Symbol::Number(3) => Rgb::new(200, 50, 50),
        Symbol::Number(4) => Rgb::new(30, 30, 130),
        Symbol::Number(5) => Rgb::new(130, 40, 30),
        Symbol::Number(6) => Rgb::new(40, 140, 140),
        Symbol::Number(7) => Rgb::new(20, 20, 20),
        Symbol::Number(_) => Rgb::new(120, 120, 120),
        Symbol::Mine => Rgb::new(10, 10, 10),
        Symbol::Flagged => Rgb::new(220, 40, 40),
    }
}

/// paint one canonical cell: flat background, and for digits a centered
/// square glyph sized by the digit so every symbol is separable by
/// color alone
pub fn render_cell(symbol: Symbol) -> Pixmap {
    let background = match symbol {
        Symbol::Number(_) => palette(Symbol::Empty),
        other => palette(other),
    };
    let mut pixels = Pixmap::filled(CELL_SIZE, CELL_SIZE, background);
    if let Symbol::Number(n) = symbol {
        let half = 3 + n as usize;
        let lo = CELL_SIZE / 2 - half / 2;
        let hi = lo + half;
        for y in lo..hi {
            for x in lo..hi {
                pixels.set(x, y, palette(symbol));
            }
        }
    }
    if symbol == Symbol::Flagged || symbol == Symbol::Mine {
        // small dark pole so flags and mines carry edge structure
        for y in 4..CELL_SIZE - 4 {
            pixels.set(CELL_SIZE / 2, y, Rgb::new(0, 0, 0));
        }
    }
    pixels
}

/// the same cell as the segmenter will slice it: border margin cropped
pub fn render_patch(symbol: Symbol) -> Pixmap {
    let side = CELL_SIZE - 2 * crate::PATCH_MARGIN;
    render_cell(symbol).crop(crate::PATCH_MARGIN, crate::PATCH_MARGIN, side, side)
}

/// bootstrap source rendering the synthetic skin for empty, unknown,
/// and every digit
#[derive(Debug, Default)]
pub struct SyntheticTemplates;

impl TemplateSource for SyntheticTemplates {
    fn templates(&self) -> Vec<(Symbol, Pixmap)> {
        let mut symbols = vec![Symbol::Empty, Symbol::Unknown, Symbol::Flagged, Symbol::Mine];
        symbols.extend((1..=8).map(Symbol::Number));
        symbols
            .into_iter()
            .map(|s| (s, render_patch(s)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_cover_digits() {
        let templates = SyntheticTemplates.templates();
        for n in 1..=8 {
            assert!(templates.iter().any(|(s, _)| *s == Symbol::Number(n)));
        }
        assert!(templates.iter().any(|(s, _)| *s == Symbol::Empty));
    }

    #[test]
    fn digits_render_distinctly() {
        let one = render_cell(Symbol::Number(1));
        let eight = render_cell(Symbol::Number(8));
        let a = ColorSignature::from(&one);
        let b = ColorSignature::from(&eight);
        assert!(a.score(&b) < a.score(&ColorSignature::from(&one)));
    }

    #[test]
    fn template_precomputes_canonical_edges() {
        let t = CellTemplate::new(Symbol::Number(3), Pixmap::filled(30, 30, Rgb::new(1, 1, 1)));
        assert!(t.pixels.shape() == (30, 30));
        assert!(t.edges.shape() == (CELL_SIZE, CELL_SIZE));
    }
}
