use super::pixel::Pixmap;
use crate::grid::raster::Raster;

pub const LOW_THRESHOLD: f32 = 50.0;
pub const HIGH_THRESHOLD: f32 = 150.0;

/// binary edge map via sobel gradients and double thresholding. a weak
/// edge survives only next to a strong one, which is the part of canny
/// that matters for glyph outlines.
pub fn edge_map(pixels: &Pixmap) -> Raster<bool> {
    let luma = pixels.luma_plane();
    let width = luma.width();
    let height = luma.height();
    let mut magnitude = Raster::<f32>::new(width, height);
    for y in 1..height.saturating_sub(1) {
        for x in 1..width.saturating_sub(1) {
            let p = |dx: isize, dy: isize| {
                *luma
                    .at(x as isize + dx, y as isize + dy)
                    .expect("interior pixel")
            };
            let gx = p(1, -1) + 2.0 * p(1, 0) + p(1, 1) - p(-1, -1) - 2.0 * p(-1, 0) - p(-1, 1);
            let gy = p(-1, 1) + 2.0 * p(0, 1) + p(1, 1) - p(-1, -1) - 2.0 * p(0, -1) - p(1, -1);
            magnitude.set(x, y, (gx * gx + gy * gy).sqrt());
        }
    }
    let strong = magnitude.map(|&m| m >= HIGH_THRESHOLD);
    let mut edges = strong.clone();
    for y in 0..height {
        for x in 0..width {
            let weak = *magnitude.get(x, y) >= LOW_THRESHOLD && !*strong.get(x, y);
            if weak {
                let anchored = (-1..=1).any(|dy: isize| {
                    (-1..=1).any(|dx: isize| {
                        strong.at(x as isize + dx, y as isize + dy).copied().unwrap_or(false)
                    })
                });
                if anchored {
                    edges.set(x, y, true);
                }
            }
        }
    }
    edges
}

/// normalized cross-correlation between two same-shape edge maps,
/// in [0, 1]. both maps empty counts as a perfect match of nothing.
pub fn correlation(a: &Raster<bool>, b: &Raster<bool>) -> f32 {
    assert!(a.shape() == b.shape(), "edge map shapes");
    let fa = a.map(|&v| if v { 1.0f32 } else { 0.0 });
    let fb = b.map(|&v| if v { 1.0f32 } else { 0.0 });
    let ma = fa.mean();
    let mb = fb.mean();
    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (x, y) in fa.values().iter().zip(fb.values().iter()) {
        cov += (x - ma) * (y - mb);
        va += (x - ma) * (x - ma);
        vb += (y - mb) * (y - mb);
    }
    match va * vb {
        product if product > 0.0 => ((cov / product.sqrt()) + 1.0) / 2.0,
        _ if a.count() == 0 && b.count() == 0 => 1.0,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::pixel::Rgb;

    fn striped() -> Pixmap {
        let mut pix = Pixmap::new(12, 12);
        for y in 0..12 {
            for x in 0..12 {
                let v = if x < 6 { 0 } else { 255 };
                pix.set(x, y, Rgb::new(v, v, v));
            }
        }
        pix
    }

    #[test]
    fn flat_field_has_no_edges() {
        let edges = edge_map(&Pixmap::filled(12, 12, Rgb::new(80, 80, 80)));
        assert!(edges.count() == 0);
    }

    #[test]
    fn step_edge_is_detected() {
        let edges = edge_map(&striped());
        assert!(edges.count() > 0);
    }

    #[test]
    fn self_correlation_is_maximal() {
        let edges = edge_map(&striped());
        assert!(correlation(&edges, &edges) > 0.99);
    }

    #[test]
    fn empty_maps_match() {
        let a = Raster::<bool>::new(4, 4);
        let b = Raster::<bool>::new(4, 4);
        assert!(correlation(&a, &b) == 1.0);
    }
}
