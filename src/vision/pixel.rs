use crate::grid::raster::Raster;

/// one screen pixel, 8-bit rgb
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
    /// rec. 601 luma
    pub fn luma(&self) -> f32 {
        0.299 * self.r as f32 + 0.587 * self.g as f32 + 0.114 * self.b as f32
    }
}

impl From<(u8, u8, u8)> for Rgb {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Self::new(r, g, b)
    }
}

/// a screenshot or any other rectangular pixel buffer
pub type Pixmap = Raster<Rgb>;

impl Pixmap {
    pub fn luma_plane(&self) -> Raster<f32> {
        self.map(|p| p.luma())
    }

    pub fn mean_rgb(&self) -> [f32; 3] {
        let n = self.len().max(1) as f32;
        let sum = self.values().iter().fold([0.0f32; 3], |acc, p| {
            [acc[0] + p.r as f32, acc[1] + p.g as f32, acc[2] + p.b as f32]
        });
        [sum[0] / n, sum[1] / n, sum[2] / n]
    }

    /// variance of the luma plane
    pub fn variance(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let luma = self.luma_plane();
        let mean = luma.mean();
        luma.values().iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / luma.len() as f32
    }

    /// nearest-neighbor resize to the canonical matching shape
    pub fn resize_nearest(&self, width: usize, height: usize) -> Self {
        let mut out = Self::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let sx = x * self.width() / width;
                let sy = y * self.height() / height;
                out.set(x, y, *self.get(sx, sy));
            }
        }
        out
    }
}
