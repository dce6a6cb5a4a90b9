//! Image-adaptive fallback placement
//!
//! When no proposal of a kind survives validation, a box of a target size is
//! searched for on the energy field: low edge energy and little overlap with
//! what must stay visible (the subject, an already placed headline).

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{FallbackConfig, Rules};
use crate::energy::EnergyField;
use crate::geometry::BBox;

/// Approximate headline size, from the copy that will be rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextHint {
    pub approx_chars: usize,
    pub lines: usize,
}

/// Desired logo footprint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogoHint {
    pub target_area: Option<f64>,
    pub aspect_ratio: Option<f64>,
}

pub const DEFAULT_TEXT_AREA: f64 = 0.06;
pub const DEFAULT_LOGO_AREA: f64 = 0.05;
pub const DEFAULT_LOGO_ASPECT: f64 = 2.2;
const TEXT_ASPECT_FLOOR: f64 = 2.2;

/// Parameters of one low-energy window search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSearch {
    pub w: f64,
    pub h: f64,
    pub margin: f64,
    pub stride: f64,
    pub min_samples: usize,
    pub overlap_weight: f64,
    pub seed: u64,
}

/// Target text area from a hint: grows with characters and extra lines
#[must_use]
pub fn text_area_from_hint(hint: &TextHint) -> f64 {
    let lines = hint.lines.max(1);
    let area = 0.06 * (hint.approx_chars as f64 / 14.0) + 0.03 * (lines - 1) as f64;
    area.clamp(0.02, 0.20)
}

#[must_use]
pub fn logo_area_from_hint(hint: &LogoHint) -> f64 {
    hint.target_area
        .filter(|a| a.is_finite())
        .unwrap_or(DEFAULT_LOGO_AREA)
        .clamp(0.01, 0.12)
}

#[must_use]
pub fn logo_aspect_from_hint(hint: &LogoHint) -> f64 {
    hint.aspect_ratio
        .filter(|a| a.is_finite())
        .unwrap_or(DEFAULT_LOGO_ASPECT)
        .clamp(0.6, 3.5)
}

/// `start, start + step, ...` strictly below `end`
fn arange(start: f64, end: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 || end.is_nan() || end <= start {
        return Vec::new();
    }
    let n = ((end - start) / step).ceil() as usize;
    (0..n).map(|i| start + i as f64 * step).collect()
}

/// Lowest `energy + overlap_weight * Σ iou(avoid)` window of size `w × h`.
///
/// Candidate top-left corners lie on a `stride` lattice inside the margin
/// band. Each axis is shuffled with a seeded RNG and truncated to
/// `max(min_samples, 1 / stride)` values, so the search is bounded and
/// identical inputs give identical output. When no lattice position fits,
/// the box is pinned to the top-left margin corner.
#[must_use]
pub fn search_low_energy_window(field: &EnergyField, avoid: &[BBox], search: &WindowSearch) -> BBox {
    let WindowSearch {
        w,
        h,
        margin,
        stride,
        min_samples,
        overlap_weight,
        seed,
    } = *search;
    let mut xs = arange(margin, 1.0 - margin - w + 1e-6, stride);
    let mut ys = arange(margin, 1.0 - margin - h + 1e-6, stride);
    if xs.is_empty() || ys.is_empty() {
        return BBox::new(margin, margin, w, h);
    }

    let take = min_samples.max((1.0 / stride) as usize);
    let mut rng = StdRng::seed_from_u64(seed);
    xs.shuffle(&mut rng);
    ys.shuffle(&mut rng);
    xs.truncate(take);
    ys.truncate(take);

    let mut best: Option<(BBox, f64)> = None;
    for &x in &xs {
        for &y in &ys {
            let b = BBox::new(x, y, w, h);
            let energy = field.try_window_mean(&b).unwrap_or(f64::MAX);
            let penalty: f64 = avoid.iter().map(|a| overlap_weight * b.iou(a)).sum();
            let score = energy + penalty;
            if best.map_or(true, |(_, s)| score < s) {
                best = Some((b, score));
            }
        }
    }
    match best {
        Some((b, score)) => {
            debug!("Fallback window {:?} score {:.4}", b.to_array(), score);
            b
        }
        None => BBox::new(margin, margin, w, h),
    }
}

/// Relaxed copy of `rules` for boxes synthesized after every proposal was
/// dropped
#[must_use]
pub fn relaxed_rules(rules: &Rules) -> (Rules, Rules) {
    let mut text = rules.clone();
    text.min_aspect_text = (0.8 * rules.min_aspect_text).max(1.4);
    text.min_margin = (0.8 * rules.min_margin).max(0.015);

    let mut logo = rules.clone();
    let (lo, hi) = rules.logo_aspect_range;
    logo.logo_aspect_range = (lo.min(0.7), hi.max(3.2));
    logo.min_margin = (0.9 * rules.min_margin).max(0.015);
    (text, logo)
}

/// Synthesize a headline box
#[must_use]
pub fn fallback_text(
    field: &EnergyField,
    subject: Option<&BBox>,
    rules: &Rules,
    config: &FallbackConfig,
    hint: Option<&TextHint>,
) -> BBox {
    let area = hint.map_or(DEFAULT_TEXT_AREA, text_area_from_hint);
    let aspect = rules.min_aspect_text.max(TEXT_ASPECT_FLOOR);
    let mut h = (area / aspect).sqrt();
    let w = (aspect * h).min(1.0 - 2.0 * rules.min_margin);
    h = h.min(config.text_max_h);
    let avoid: Vec<BBox> = subject.copied().into_iter().collect();
    search_low_energy_window(
        field,
        &avoid,
        &WindowSearch {
            w,
            h,
            margin: rules.min_margin,
            stride: config.stride,
            min_samples: config.min_samples,
            overlap_weight: config.overlap_weight,
            seed: config.seed,
        },
    )
}

/// Synthesize a logo box, avoiding the subject and the headline
#[must_use]
pub fn fallback_logo(
    field: &EnergyField,
    subject: Option<&BBox>,
    text: Option<&BBox>,
    rules: &Rules,
    config: &FallbackConfig,
    hint: Option<&LogoHint>,
) -> BBox {
    let area = hint.map_or(DEFAULT_LOGO_AREA, logo_area_from_hint);
    let aspect = hint.map_or(DEFAULT_LOGO_ASPECT, logo_aspect_from_hint);
    let w = area.sqrt().min(1.0 - 2.0 * rules.min_margin);
    let h = (w / aspect).max(config.logo_min_h).min(config.logo_max_h);
    let avoid: Vec<BBox> = subject.into_iter().chain(text).copied().collect();
    search_low_energy_window(
        field,
        &avoid,
        &WindowSearch {
            w,
            h,
            margin: rules.min_margin,
            stride: config.stride,
            min_samples: config.min_samples,
            overlap_weight: config.overlap_weight,
            seed: config.seed.wrapping_add(config.logo_seed_offset),
        },
    )
}
