//! Deterministic fallback face descriptor.
//!
//! Used when no learned embedding model is configured. The face region is
//! resampled bilinearly to a canonical square, reduced to 8-bit luma and
//! split into a `grid x grid` mesh of cells. Each cell contributes four
//! statistics:
//!
//! - mean intensity
//! - intensity standard deviation (population)
//! - mean Sobel gradient magnitude
//! - max Sobel gradient magnitude
//!
//! Cells are emitted in row-major order, so the descriptor has
//! `grid * grid * 4` components. Gradients never look outside their own
//! cell: border neighbours are reflected back into the cell.

use image::{DynamicImage, GrayImage, ImageBuffer, Pixel};

use crate::embedding::Embedding;
use crate::error::DescriptorError;

pub const CANONICAL_SIZE: u32 = 128;
pub const GRID: u32 = 8;
pub const STATS_PER_CELL: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorConfig {
    canonical_size: u32,
    grid: u32,
}

impl Default for DescriptorConfig {
    fn default() -> Self {
        Self {
            canonical_size: CANONICAL_SIZE,
            grid: GRID,
        }
    }
}

impl DescriptorConfig {
    pub fn new(canonical_size: u32, grid: u32) -> Result<Self, DescriptorError> {
        if grid == 0 || canonical_size == 0 || canonical_size % grid != 0 {
            return Err(DescriptorError::InvalidGeometry {
                canonical_size,
                grid,
            });
        }
        Ok(Self {
            canonical_size,
            grid,
        })
    }

    pub fn canonical_size(&self) -> u32 {
        self.canonical_size
    }

    pub fn grid(&self) -> u32 {
        self.grid
    }

    pub fn cell_size(&self) -> u32 {
        self.canonical_size / self.grid
    }

    /// Number of components in every descriptor this config produces.
    pub fn descriptor_len(&self) -> usize {
        (self.grid as usize).pow(2) * STATS_PER_CELL
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureDescriptor {
    config: DescriptorConfig,
}

impl FeatureDescriptor {
    pub fn new(config: DescriptorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DescriptorConfig {
        &self.config
    }

    pub fn extract(&self, face: &DynamicImage) -> Result<Embedding, DescriptorError> {
        if face.width() == 0 || face.height() == 0 {
            return Err(DescriptorError::EmptyImage {
                width: face.width(),
                height: face.height(),
            });
        }

        let size = self.config.canonical_size;
        let gray = if face.color().channel_count() <= 2 {
            resize_bilinear(&face.to_luma8(), size)
        } else {
            luma_bt601(&resize_bilinear(&face.to_rgb8(), size))
        };

        let grid = self.config.grid;
        let cell = self.config.cell_size() as usize;
        let mut features = Vec::with_capacity(self.config.descriptor_len());
        let mut pixels = vec![0.0f64; cell * cell];

        for gy in 0..grid {
            for gx in 0..grid {
                let x0 = gx * self.config.cell_size();
                let y0 = gy * self.config.cell_size();
                for y in 0..cell {
                    for x in 0..cell {
                        let p = gray.get_pixel(x0 + x as u32, y0 + y as u32)[0];
                        pixels[y * cell + x] = f64::from(p);
                    }
                }
                let stats = cell_stats(&pixels, cell);
                features.extend(stats.iter().map(|&v| v as f32));
            }
        }

        Ok(Embedding::new(features))
    }
}

/// Extract a descriptor with the default 128px / 8x8 geometry.
pub fn extract_features(face: &DynamicImage) -> Result<Embedding, DescriptorError> {
    FeatureDescriptor::default().extract(face)
}

/// Resample to `size x size` from the 2x2 neighbourhood of each target
/// pixel centre. Downscaling does not average over the source area.
fn resize_bilinear<P>(src: &ImageBuffer<P, Vec<u8>>, size: u32) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let (w, h) = src.dimensions();
    let scale_x = f64::from(w) / f64::from(size);
    let scale_y = f64::from(h) / f64::from(size);

    ImageBuffer::from_fn(size, size, |x, y| {
        let (x0, x1, fx) = source_span(x, scale_x, w);
        let (y0, y1, fy) = source_span(y, scale_y, h);
        let (tl, tr) = (src.get_pixel(x0, y0), src.get_pixel(x1, y0));
        let (bl, br) = (src.get_pixel(x0, y1), src.get_pixel(x1, y1));

        let mut out = *tl;
        for (c, v) in out.channels_mut().iter_mut().enumerate() {
            let at = |p: &P| f64::from(p.channels()[c]);
            let top = at(tl) + (at(tr) - at(tl)) * fx;
            let bottom = at(bl) + (at(br) - at(bl)) * fx;
            *v = (top + (bottom - top) * fy).round().clamp(0.0, 255.0) as u8;
        }
        out
    })
}

/// Source indices and blend weight for one target coordinate.
fn source_span(dst: u32, scale: f64, len: u32) -> (u32, u32, f64) {
    let src = ((f64::from(dst) + 0.5) * scale - 0.5).max(0.0);
    let i0 = (src.floor() as u32).min(len - 1);
    let i1 = (i0 + 1).min(len - 1);
    (i0, i1, src - f64::from(i0))
}

/// BT.601 luma rounded to 8 bits.
fn luma_bt601(rgb: &image::RgbImage) -> GrayImage {
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = 0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b);
        image::Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
}

/// `[mean, std, mean |grad|, max |grad|]` of one square cell.
fn cell_stats(pixels: &[f64], side: usize) -> [f64; STATS_PER_CELL] {
    let count = pixels.len() as f64;
    let mean = pixels.iter().sum::<f64>() / count;
    let variance = pixels.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / count;

    let at = |x: isize, y: isize| pixels[reflect(y, side) * side + reflect(x, side)];

    let mut mag_sum = 0.0;
    let mut mag_max = 0.0f64;
    for y in 0..side as isize {
        for x in 0..side as isize {
            let gx = (at(x + 1, y - 1) + 2.0 * at(x + 1, y) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x - 1, y) + at(x - 1, y + 1));
            let gy = (at(x - 1, y + 1) + 2.0 * at(x, y + 1) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x, y - 1) + at(x + 1, y - 1));
            let mag = (gx * gx + gy * gy).sqrt();
            mag_sum += mag;
            mag_max = mag_max.max(mag);
        }
    }

    [mean, variance.sqrt(), mag_sum / count, mag_max]
}

/// Mirror an out-of-range index back into `0..len` without repeating the
/// edge sample (`-1 -> 1`, `len -> len - 2`).
fn reflect(i: isize, len: usize) -> usize {
    let len = len as isize;
    if len == 1 {
        return 0;
    }
    let i = if i < 0 { -i } else { i };
    let i = if i >= len { 2 * (len - 1) - i } else { i };
    i as usize
}
