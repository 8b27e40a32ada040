use super::patch::Patch;
use super::pixel::Pixmap;
use super::pixel::Rgb;
use crate::Confidence;

const BINS: usize = 8;
const HIST: usize = BINS * BINS * BINS;

/// mean color, luma variance, and a normalized 8x8x8 rgb histogram.
/// cheap to compare, which is what makes tier-one recognition fast.
#[derive(Debug, Clone)]
pub struct ColorSignature {
    pub mean: [f32; 3],
    pub variance: f32,
    pub histogram: Box<[f32; HIST]>,
}

impl ColorSignature {
    fn accumulate<I: Iterator<Item = Rgb>>(pixels: I) -> Self {
        let mut histogram = Box::new([0.0f32; HIST]);
        let mut sum = [0.0f32; 3];
        let mut lumas = Vec::new();
        let mut n = 0usize;
        for p in pixels {
            sum[0] += p.r as f32;
            sum[1] += p.g as f32;
            sum[2] += p.b as f32;
            lumas.push(p.luma());
            let bin = (p.r as usize * BINS / 256) * BINS * BINS
                + (p.g as usize * BINS / 256) * BINS
                + (p.b as usize * BINS / 256);
            histogram[bin] += 1.0;
            n += 1;
        }
        let n = n.max(1) as f32;
        for bin in histogram.iter_mut() {
            *bin /= n;
        }
        let mean_luma = lumas.iter().sum::<f32>() / n;
        let variance = lumas.iter().map(|l| (l - mean_luma) * (l - mean_luma)).sum::<f32>() / n;
        Self {
            mean: [sum[0] / n, sum[1] / n, sum[2] / n],
            variance,
            histogram,
        }
    }

    /// combined similarity in [0, 1]:
    /// 0.4 color distance + 0.3 variance difference + 0.3 histogram correlation
    pub fn score(&self, other: &Self) -> Confidence {
        let color = {
            let d = self
                .mean
                .iter()
                .zip(other.mean.iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f32>()
                .sqrt();
            (1.0 - d / 100.0).max(0.0)
        };
        let variance = (1.0 - (self.variance - other.variance).abs() / 500.0).max(0.0);
        let histogram = self.correlation(other).max(0.0);
        0.4 * color + 0.3 * variance + 0.3 * histogram
    }

    /// pearson correlation between the two histograms
    fn correlation(&self, other: &Self) -> f32 {
        let n = HIST as f32;
        let ma = self.histogram.iter().sum::<f32>() / n;
        let mb = other.histogram.iter().sum::<f32>() / n;
        let mut cov = 0.0;
        let mut va = 0.0;
        let mut vb = 0.0;
        for (a, b) in self.histogram.iter().zip(other.histogram.iter()) {
            cov += (a - ma) * (b - mb);
            va += (a - ma) * (a - ma);
            vb += (b - mb) * (b - mb);
        }
        match va * vb {
            product if product > 0.0 => cov / product.sqrt(),
            _ => 0.0,
        }
    }
}

impl From<&Pixmap> for ColorSignature {
    fn from(pixels: &Pixmap) -> Self {
        Self::accumulate(pixels.values().iter().copied())
    }
}

impl<'a> From<&Patch<'a>> for ColorSignature {
    fn from(patch: &Patch<'a>) -> Self {
        Self::accumulate(patch.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_pixmaps_score_one() {
        let pix = Pixmap::filled(8, 8, Rgb::new(200, 30, 30));
        let a = ColorSignature::from(&pix);
        let b = ColorSignature::from(&pix);
        assert!(a.score(&b) > 0.99);
    }

    #[test]
    fn distant_colors_score_low() {
        let red = ColorSignature::from(&Pixmap::filled(8, 8, Rgb::new(255, 0, 0)));
        let blue = ColorSignature::from(&Pixmap::filled(8, 8, Rgb::new(0, 0, 255)));
        assert!(red.score(&blue) < 0.5);
    }

    #[test]
    fn score_is_symmetric() {
        let a = ColorSignature::from(&Pixmap::filled(4, 4, Rgb::new(10, 20, 30)));
        let b = ColorSignature::from(&Pixmap::filled(4, 4, Rgb::new(40, 20, 10)));
        assert!((a.score(&b) - b.score(&a)).abs() < 1e-6);
    }
}
