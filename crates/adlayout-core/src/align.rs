//! Guide-line snapping

use crate::config::AlignmentConfig;
use crate::geometry::BBox;

/// Nearest guide to `v` and its distance; `None` for an empty guide list
fn nearest_guide(v: f64, guides: &[f64]) -> Option<(f64, f64)> {
    guides
        .iter()
        .map(|&g| (g, (g - v).abs()))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

fn snap_axis(v: f64, guides: &[f64], tol: f64) -> f64 {
    match nearest_guide(v, guides) {
        Some((g, d)) if d <= tol => g,
        _ => v,
    }
}

/// Snap each axis of the box center to the nearest guide within `tol`.
///
/// Axes are handled independently. The box is rebuilt around the new center
/// and fitted back into the margin band.
#[must_use]
pub fn snap(b: &BBox, guides: &[f64], tol: f64, margin: f64) -> BBox {
    snap_axes(b, guides, tol, margin, true, true)
}

/// [`snap`] restricted to the chosen axes.
///
/// The snapped center is kept far enough from the edges that the box moves
/// instead of being clipped; only margin fitting may shrink it.
#[must_use]
pub fn snap_axes(b: &BBox, guides: &[f64], tol: f64, margin: f64, x: bool, y: bool) -> BBox {
    let (mut cx, mut cy) = b.center();
    if x {
        cx = snap_axis(cx, guides, tol).clamp(b.w() / 2.0, 1.0 - b.w() / 2.0);
    }
    if y {
        cy = snap_axis(cy, guides, tol).clamp(b.h() / 2.0, 1.0 - b.h() / 2.0);
    }
    BBox::from_center(cx, cy, b.w(), b.h()).fit_within_margin(margin)
}

/// True when the center lies on a guide (within `tol`) on at least one axis
#[must_use]
pub fn is_aligned(b: &BBox, guides: &[f64], tol: f64) -> bool {
    let (cx, cy) = b.center();
    let on = |v: f64| nearest_guide(v, guides).is_some_and(|(_, d)| d <= tol);
    on(cx) || on(cy)
}

/// Fraction of `boxes` that are aligned; `None` for no boxes
#[must_use]
pub fn alignment_score(boxes: &[BBox], config: &AlignmentConfig) -> Option<f64> {
    if boxes.is_empty() {
        return None;
    }
    let aligned = boxes
        .iter()
        .filter(|b| is_aligned(b, &config.guides, config.tolerance + 1e-9))
        .count();
    Some(aligned as f64 / boxes.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUIDES: [f64; 3] = [0.1, 0.5, 0.9];

    #[test]
    fn test_snaps_within_tolerance() {
        // center (0.52, 0.85)
        let b = BBox::new(0.42, 0.8, 0.2, 0.1);
        let s = snap(&b, &GUIDES, 0.03, 0.03);
        let (cx, cy) = s.center();
        assert!((cx - 0.5).abs() < 1e-9);
        assert!((cy - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_axes_snap_independently() {
        // center (0.88, 0.12): both within tolerance
        let b = BBox::new(0.83, 0.07, 0.1, 0.1);
        let (cx, cy) = snap(&b, &GUIDES, 0.03, 0.0).center();
        assert!((cx - 0.9).abs() < 1e-9);
        assert!((cy - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_margin_wins_over_guide() {
        // snapping to 0.1 would push the box past a 0.08 margin
        let b = BBox::new(0.02, 0.4, 0.2, 0.2);
        let s = snap(&b, &GUIDES, 0.03, 0.08);
        assert!(s.x() >= 0.08 - 1e-12);
    }

    #[test]
    fn test_wide_tolerance_moves_instead_of_shrinking() {
        // center (0.82, 0.45) snaps toward 0.9, which would run past the edge
        let b = BBox::new(0.67, 0.4, 0.3, 0.1);
        let s = snap(&b, &GUIDES, 0.1, 0.03);
        assert!((s.w() - 0.3).abs() < 1e-9);
        assert!((s.h() - 0.1).abs() < 1e-9);
        assert!(s.is_within_margin(0.03 - 1e-12));
    }

    #[test]
    fn test_snap_single_axis() {
        // center (0.52, 0.88): both within tolerance, only y requested
        let b = BBox::new(0.42, 0.83, 0.2, 0.1);
        let (cx, cy) = snap_axes(&b, &GUIDES, 0.03, 0.0, false, true).center();
        assert!((cx - 0.52).abs() < 1e-9);
        assert!((cy - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_alignment_score() {
        let config = AlignmentConfig::default();
        let on = BBox::new(0.4, 0.6, 0.2, 0.1);
        let off = BBox::new(0.2, 0.25, 0.1, 0.1);
        assert_eq!(alignment_score(&[on, off], &config), Some(0.5));
        assert_eq!(alignment_score(&[], &config), None);
    }
}
