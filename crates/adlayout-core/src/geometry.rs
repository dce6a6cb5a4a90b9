//! Normalized bounding boxes and the geometric primitives built on them
//!
//! Every coordinate lives in `[0, 1]` relative to the image width/height with
//! the origin at the top-left corner. [`BBox`] keeps its invariant by clipping
//! on construction, so a `BBox` value can never extend past the unit square.
//!
//! All functions here are total over finite *and* non-finite input: `NaN` and
//! `-inf` clamp to 0, `+inf` clamps to 1. Nothing panics and nothing divides by
//! zero.

use serde::{Deserialize, Serialize};

/// Clamp to `[0, 1]`, mapping `NaN` to 0
#[inline]
#[must_use]
pub fn clamp01(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// Round to a fixed number of decimals (used for reports and reason lines)
#[inline]
#[must_use]
pub fn round_to(v: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (v * factor).round() / factor
}

/// Axis-aligned box `(x, y, w, h)` normalized to the unit square.
///
/// Serializes as the `[x, y, w, h]` array used by the layout JSON schema;
/// deserializing clips, exactly like [`BBox::new`].
///
/// # Examples
///
/// ```
/// use adlayout_core::BBox;
///
/// let b = BBox::new(0.8, 0.9, 0.5, 0.5);
/// assert_eq!(b.to_array(), [0.8, 0.9, 0.19999999999999996, 0.09999999999999998]);
/// assert!(b.right() <= 1.0 && b.bottom() <= 1.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BBox {
    x: f64,
    y: f64,
    w: f64,
    h: f64,
}

impl BBox {
    /// Build a box and clip it into the unit square.
    ///
    /// Each coordinate is clamped to `[0, 1]` first; then `w`/`h` shrink so the
    /// box ends inside the square. Position is never moved to make room, the
    /// size absorbs the reduction.
    #[must_use]
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        let x = clamp01(x);
        let y = clamp01(y);
        let mut w = clamp01(w);
        let mut h = clamp01(h);
        if x + w > 1.0 {
            w = (1.0 - x).max(0.0);
        }
        if y + h > 1.0 {
            h = (1.0 - y).max(0.0);
        }
        Self { x, y, w, h }
    }

    /// Re-clip an existing box (identity for any constructed `BBox`)
    #[inline]
    #[must_use]
    pub fn clip(self) -> Self {
        Self::new(self.x, self.y, self.w, self.h)
    }

    /// Box from a center point and size, clipped
    #[must_use]
    pub fn from_center(cx: f64, cy: f64, w: f64, h: f64) -> Self {
        let x = clamp01(cx - w / 2.0);
        let y = clamp01(cy - h / 2.0);
        Self::new(x, y, w, h)
    }

    #[inline]
    #[must_use]
    pub const fn x(&self) -> f64 {
        self.x
    }

    #[inline]
    #[must_use]
    pub const fn y(&self) -> f64 {
        self.y
    }

    #[inline]
    #[must_use]
    pub const fn w(&self) -> f64 {
        self.w
    }

    #[inline]
    #[must_use]
    pub const fn h(&self) -> f64 {
        self.h
    }

    #[inline]
    #[must_use]
    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    #[inline]
    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    #[inline]
    #[must_use]
    pub fn area(&self) -> f64 {
        (self.w * self.h).max(0.0)
    }

    /// True when the box has no usable extent; every consumer rejects these
    #[inline]
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.w <= 0.0 || self.h <= 0.0
    }

    /// Width over height, 0 for a flat box
    #[inline]
    #[must_use]
    pub fn aspect(&self) -> f64 {
        if self.h <= 0.0 {
            0.0
        } else {
            self.w / self.h
        }
    }

    #[inline]
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    #[must_use]
    pub fn intersection_area(&self, other: &Self) -> f64 {
        let x_overlap = (self.right().min(other.right()) - self.x.max(other.x)).max(0.0);
        let y_overlap = (self.bottom().min(other.bottom()) - self.y.max(other.y)).max(0.0);
        x_overlap * y_overlap
    }

    /// Intersection-over-union; 0 when either box is degenerate
    #[must_use]
    pub fn iou(&self, other: &Self) -> f64 {
        if self.is_degenerate() || other.is_degenerate() {
            return 0.0;
        }
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            return 0.0;
        }
        (inter / union).clamp(0.0, 1.0)
    }

    /// True when every edge keeps at least `margin` from the image border
    #[must_use]
    pub fn is_within_margin(&self, margin: f64) -> bool {
        self.x >= margin
            && self.y >= margin
            && self.right() <= 1.0 - margin
            && self.bottom() <= 1.0 - margin
    }

    /// Pull the box inside the margin band.
    ///
    /// Position moves first; width/height shrink only when the box is larger
    /// than the margin-free area. Size never grows. A margin outside
    /// `[0, 0.5]` is clamped into that range.
    #[must_use]
    pub fn fit_within_margin(&self, margin: f64) -> Self {
        let m = clamp01(margin).min(0.5);
        let avail = (1.0 - 2.0 * m).max(0.0);
        let w = self.w.min(avail);
        let h = self.h.min(avail);
        let x = self.x.min(1.0 - m - w).max(m);
        let y = self.y.min(1.0 - m - h).max(m);
        Self::new(x, y, w, h)
    }

    /// Shift the center by `(dx, dy)`, keeping the box inside `margin`.
    ///
    /// The size is kept; the top-left corner is clamped against the margin band
    /// after the move.
    #[must_use]
    pub fn translate_center(&self, dx: f64, dy: f64, margin: f64) -> Self {
        let (cx, cy) = self.center();
        let cx = clamp01(cx + dx);
        let cy = clamp01(cy + dy);
        let x = (cx - self.w / 2.0).min(1.0 - margin - self.w).max(margin);
        let y = (cy - self.h / 2.0).min(1.0 - margin - self.h).max(margin);
        Self::new(x, y, self.w, self.h)
    }

    /// Same center, size multiplied by `factor`
    #[must_use]
    pub fn scale_about_center(&self, factor: f64) -> Self {
        let (cx, cy) = self.center();
        Self::from_center(cx, cy, self.w * factor, self.h * factor)
    }

    /// Grow by `pad` on every side, clipped
    #[must_use]
    pub fn padded(&self, pad: f64) -> Self {
        Self::new(
            self.x - pad,
            self.y - pad,
            self.w + 2.0 * pad,
            self.h + 2.0 * pad,
        )
    }

    #[inline]
    #[must_use]
    pub const fn to_array(&self) -> [f64; 4] {
        [self.x, self.y, self.w, self.h]
    }

    /// Coordinates rounded for human-readable output
    #[must_use]
    pub fn rounded(&self, decimals: i32) -> [f64; 4] {
        self.to_array().map(|v| round_to(v, decimals))
    }
}

impl From<[f64; 4]> for BBox {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f64; 4] {
    fn from(b: BBox) -> Self {
        b.to_array()
    }
}

/// IoU over optional boxes: 0 if either side is absent
#[must_use]
pub fn iou(a: Option<&BBox>, b: Option<&BBox>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => a.iou(b),
        _ => 0.0,
    }
}

/// Unit vector pointing from `from` to `to`; `None` when the points coincide
#[must_use]
pub fn unit_vector(from: (f64, f64), to: (f64, f64)) -> Option<(f64, f64)> {
    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    let n = dx.hypot(dy);
    if !n.is_finite() || n < 1e-6 {
        return None;
    }
    Some((dx / n, dy / n))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_clip_shrinks_size_not_position() {
        let b = BBox::new(0.9, 0.5, 0.3, 0.2);
        assert!((b.x() - 0.9).abs() < EPS);
        assert!((b.w() - 0.1).abs() < EPS);
        assert!((b.h() - 0.2).abs() < EPS);
    }

    #[test]
    fn test_non_finite_clamps_to_boundaries() {
        let b = BBox::new(f64::NAN, f64::NEG_INFINITY, f64::INFINITY, 0.5);
        assert_eq!(b.x(), 0.0);
        assert_eq!(b.y(), 0.0);
        assert_eq!(b.w(), 1.0);
        assert_eq!(b.h(), 0.5);
    }

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = BBox::new(0.1, 0.1, 0.2, 0.2);
        let b = BBox::new(0.6, 0.6, 0.2, 0.2);
        assert!((a.iou(&a) - 1.0).abs() < EPS);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = BBox::new(0.0, 0.0, 0.2, 0.2);
        let b = BBox::new(0.1, 0.0, 0.2, 0.2);
        // inter 0.02, union 0.06
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_iou_degenerate_is_zero() {
        let a = BBox::new(0.1, 0.1, 0.0, 0.3);
        let b = BBox::new(0.1, 0.1, 0.3, 0.3);
        assert_eq!(a.iou(&b), 0.0);
        assert_eq!(iou(None, Some(&b)), 0.0);
    }

    #[test]
    fn test_aspect_of_flat_box_is_zero() {
        assert_eq!(BBox::new(0.1, 0.1, 0.3, 0.0).aspect(), 0.0);
        assert!((BBox::new(0.1, 0.1, 0.4, 0.2).aspect() - 2.0).abs() < EPS);
    }

    #[test]
    fn test_fit_within_margin_moves_before_shrinking() {
        let b = BBox::new(0.01, 0.9, 0.3, 0.1).fit_within_margin(0.05);
        assert!((b.w() - 0.3).abs() < EPS);
        assert!((b.x() - 0.05).abs() < EPS);
        assert!((b.bottom() - 0.95).abs() < EPS);
    }

    #[test]
    fn test_fit_within_margin_shrinks_oversized() {
        let b = BBox::new(0.0, 0.0, 1.0, 0.2).fit_within_margin(0.1);
        assert!((b.w() - 0.8).abs() < EPS);
        assert!(b.is_within_margin(0.1 - EPS));
    }

    #[test]
    fn test_from_center_round_trip() {
        let b = BBox::new(0.2, 0.3, 0.4, 0.2);
        let (cx, cy) = b.center();
        let c = BBox::from_center(cx, cy, b.w(), b.h());
        for (p, q) in b.to_array().iter().zip(c.to_array()) {
            assert!((p - q).abs() < EPS);
        }
    }

    #[test]
    fn test_translate_respects_margin() {
        let b = BBox::new(0.6, 0.6, 0.3, 0.3).translate_center(0.2, 0.2, 0.05);
        assert!((b.x() - 0.65).abs() < EPS);
        assert!((b.y() - 0.65).abs() < EPS);
    }

    #[test]
    fn test_unit_vector() {
        let (ux, uy) = unit_vector((0.0, 0.0), (3.0, 4.0)).unwrap();
        assert!((ux - 0.6).abs() < EPS && (uy - 0.8).abs() < EPS);
        assert!(unit_vector((0.5, 0.5), (0.5, 0.5)).is_none());
    }

    #[test]
    fn test_serde_array_form() {
        let b: BBox = serde_json::from_str("[0.5, 0.5, 0.8, 0.1]").unwrap();
        assert!((b.w() - 0.5).abs() < EPS);
        let s = serde_json::to_string(&BBox::new(0.25, 0.5, 0.25, 0.125)).unwrap();
        assert_eq!(s, "[0.25,0.5,0.25,0.125]");
    }
}
