//! Edge-energy analysis of the source photograph
//!
//! The photograph is reduced to a bounded-size luminance raster, run through a
//! 3x3 Sobel operator and normalized to `[0, 1]`. The resulting
//! [`EnergyField`] is a proxy for visual busyness: low values are negative
//! space where overlays can sit, high values are product detail.

use image::imageops::{self, FilterType};
use image::DynamicImage;
use ndarray::{s, Array2};
use tracing::debug;

use crate::geometry::BBox;

/// Longest raster side used when none is configured
pub const DEFAULT_MAX_SIDE: u32 = 1280;

/// Value returned by [`EnergyField::window_mean`] for an empty pixel window.
///
/// It means "unknown", not "busy": scorers must treat it as unusable.
pub const WINDOW_SENTINEL: f64 = 1.0;

const SUBJECT_EPSILON: f64 = 1e-6;

const KX: [[f32; 3]; 3] = [[1.0, 0.0, -1.0], [2.0, 0.0, -2.0], [1.0, 0.0, -1.0]];
const KY: [[f32; 3]; 3] = [[1.0, 2.0, 1.0], [0.0, 0.0, 0.0], [-1.0, -2.0, -1.0]];

/// Convert to luminance in `[0, 1]` and downsample so the longest side is at
/// most `max_side` pixels.
#[must_use]
pub fn to_grayscale_and_downsample(img: &DynamicImage, max_side: u32) -> Array2<f32> {
    let mut gray = img.to_luma8();
    let (w, h) = gray.dimensions();
    let longest = w.max(h);
    if max_side > 0 && longest > max_side {
        let scale = f64::from(max_side) / f64::from(longest);
        let nw = ((f64::from(w) * scale).round() as u32).max(1);
        let nh = ((f64::from(h) * scale).round() as u32).max(1);
        debug!("Downsampling {}x{} -> {}x{}", w, h, nw, nh);
        gray = imageops::resize(&gray, nw, nh, FilterType::CatmullRom);
    }
    let (w, h) = gray.dimensions();
    Array2::from_shape_fn((h as usize, w as usize), |(r, c)| {
        f32::from(gray.get_pixel(c as u32, r as u32)[0]) / 255.0
    })
}

/// Sobel gradient magnitude with edge padding, normalized by its maximum.
///
/// A uniform raster yields an all-zero field.
#[must_use]
pub fn sobel_energy(gray: &Array2<f32>) -> EnergyField {
    let (rows, cols) = gray.dim();
    if rows == 0 || cols == 0 {
        return EnergyField::from_array(Array2::zeros((rows, cols)));
    }
    let at = |r: isize, c: isize| -> f32 {
        let r = r.clamp(0, rows as isize - 1) as usize;
        let c = c.clamp(0, cols as isize - 1) as usize;
        gray[[r, c]]
    };

    let mut mag = Array2::<f32>::zeros((rows, cols));
    let mut max = 0.0f32;
    for r in 0..rows {
        for c in 0..cols {
            let mut sx = 0.0f32;
            let mut sy = 0.0f32;
            for (i, (kx_row, ky_row)) in KX.iter().zip(KY.iter()).enumerate() {
                for j in 0..3 {
                    let v = at(r as isize + i as isize - 1, c as isize + j as isize - 1);
                    sx += kx_row[j] * v;
                    sy += ky_row[j] * v;
                }
            }
            let m = sx.hypot(sy);
            mag[[r, c]] = m;
            max = max.max(m);
        }
    }
    if max > 0.0 {
        mag.mapv_inplace(|v| v / max);
    }
    EnergyField::from_array(mag)
}

/// Per-pixel edge strength in `[0, 1]`, immutable once built
#[derive(Debug, Clone)]
pub struct EnergyField {
    data: Array2<f32>,
}

impl EnergyField {
    /// Full analysis: grayscale, downsample, Sobel
    #[must_use]
    pub fn from_image(img: &DynamicImage, max_side: u32) -> Self {
        sobel_energy(&to_grayscale_and_downsample(img, max_side))
    }

    /// Wrap a precomputed field; values are clamped into `[0, 1]`
    #[must_use]
    pub fn from_array(mut data: Array2<f32>) -> Self {
        data.mapv_inplace(|v| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) });
        Self { data }
    }

    /// `(rows, cols)`
    #[inline]
    #[must_use]
    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True when no pixel carries any energy
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.data.iter().all(|&v| v <= 0.0)
    }

    #[must_use]
    pub fn as_array(&self) -> &Array2<f32> {
        &self.data
    }

    /// Pixel window `(x0, x1, y0, y1)` for a normalized box, `None` if empty
    fn window(&self, b: &BBox) -> Option<(usize, usize, usize, usize)> {
        let (rows, cols) = self.dim();
        if rows == 0 || cols == 0 {
            return None;
        }
        let to_px = |v: f64, n: usize, hi: usize| -> usize {
            let p = (v * n as f64).round();
            if p <= 0.0 {
                0
            } else {
                (p as usize).min(hi)
            }
        };
        let x0 = to_px(b.x(), cols, cols - 1);
        let x1 = to_px(b.right(), cols, cols);
        let y0 = to_px(b.y(), rows, rows - 1);
        let y1 = to_px(b.bottom(), rows, rows);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0, x1, y0, y1))
    }

    /// Mean energy under `b`, or `None` when the pixel window is empty
    #[must_use]
    pub fn try_window_mean(&self, b: &BBox) -> Option<f64> {
        let (x0, x1, y0, y1) = self.window(b)?;
        let sub = self.data.slice(s![y0..y1, x0..x1]);
        let sum: f64 = sub.iter().map(|&v| f64::from(v)).sum();
        Some(sum / sub.len() as f64)
    }

    /// Mean energy under `b`; [`WINDOW_SENTINEL`] when the window is empty
    #[must_use]
    pub fn window_mean(&self, b: &BBox) -> f64 {
        self.try_window_mean(b).unwrap_or(WINDOW_SENTINEL)
    }

    /// Estimate where the product sits from the spread of edge energy.
    ///
    /// The field (plus a small epsilon, so a flat image still has mass) is
    /// treated as a probability distribution. Each axis is handled on its own
    /// marginal CDF; the box spans the `[q_low, q_high]` quantiles with a floor
    /// of two pixels per side.
    #[must_use]
    pub fn estimate_subject_bbox(&self, q_low: f64, q_high: f64) -> BBox {
        let (rows, cols) = self.dim();
        if rows == 0 || cols == 0 {
            return BBox::new(0.25, 0.25, 0.5, 0.5);
        }
        let mut col_mass = vec![0.0f64; cols];
        let mut row_mass = vec![0.0f64; rows];
        for ((r, c), &v) in self.data.indexed_iter() {
            let m = f64::from(v) + SUBJECT_EPSILON;
            col_mass[c] += m;
            row_mass[r] += m;
        }
        let (x_lo, x_hi) = quantile_span(&col_mass, q_low, q_high);
        let (y_lo, y_hi) = quantile_span(&row_mass, q_low, q_high);

        let (wf, hf) = (cols as f64, rows as f64);
        let w = (2.0 / wf).max((x_hi as f64 - x_lo as f64) / wf);
        let h = (2.0 / hf).max((y_hi as f64 - y_lo as f64) / hf);
        BBox::new(x_lo as f64 / wf, y_lo as f64 / hf, w, h)
    }
}

/// First indices where the normalized cumulative mass reaches each quantile
fn quantile_span(mass: &[f64], q_low: f64, q_high: f64) -> (usize, usize) {
    let total: f64 = mass.iter().sum();
    let last = mass.len().saturating_sub(1);
    if total <= 0.0 {
        return (0, last);
    }
    let index_of = |q: f64| -> usize {
        let mut acc = 0.0;
        for (i, m) in mass.iter().enumerate() {
            acc += m / total;
            if acc >= q {
                return i;
            }
        }
        last
    };
    (index_of(q_low), index_of(q_high))
}
