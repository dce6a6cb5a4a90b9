//! Rule validation in two policies
//!
//! * **Strict** ([`classify_strict`]): every element is either accepted,
//!   rejected with a reasons-log entry, or ignored. Nothing is modified. Used
//!   for evaluation where each rejection must be explainable.
//! * **Repair** ([`repair_text`], [`repair_logo`], [`repair`]): the box is
//!   bent into compliance (aspect, area, margin, subject overlap) and never
//!   dropped. Used when finalizing a layout for rendering.

use tracing::debug;

use crate::config::{Rules, SeparationConfig, StrictConfig};
use crate::diagnostics::{Diagnostics, ElementArray, FailedCheck, Rejection};
use crate::geometry::{iou, BBox};
use crate::kind::{is_ignored_tag, LayoutElementKind};
use crate::layout::LayoutElement;
use crate::separate::{separate_from_fixed, Separation};

/// Why strict selection skipped an element without checking it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    IgnoredTag,
    /// Underlays and subject markers are never candidates
    NotACandidate,
    NoBox,
    OtherKind,
}

/// Strict-mode outcome for one element
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted(BBox),
    Rejected(Vec<FailedCheck>),
    Ignored(IgnoreReason),
}

/// Strict classification of one element array against a wanted kind
#[derive(Debug, Clone, PartialEq)]
pub struct StrictSelection {
    /// One verdict per input element, same order
    pub verdicts: Vec<Verdict>,
    /// First accepted element of the wanted kind, or of any kind when
    /// cross-kind fallback is enabled
    pub selected: Option<usize>,
}

impl StrictSelection {
    /// Indices of accepted elements whose kind is `kind`
    #[must_use]
    pub fn accepted_of<'a>(
        &'a self,
        elements: &'a [LayoutElement],
        kind: &'a LayoutElementKind,
    ) -> impl Iterator<Item = usize> + 'a {
        self.verdicts
            .iter()
            .zip(elements)
            .enumerate()
            .filter(move |(_, (v, e))| matches!(v, Verdict::Accepted(_)) && &e.kind == kind)
            .map(|(i, _)| i)
    }

    #[must_use]
    pub fn count(&self, pred: impl Fn(&Verdict) -> bool) -> usize {
        self.verdicts.iter().filter(|v| pred(v)).count()
    }
}

/// Size checks that `b` fails, in check order
#[must_use]
pub fn failed_checks(b: &BBox, strict: &StrictConfig) -> Vec<FailedCheck> {
    let mut failed = Vec::new();
    if b.w() < strict.min_w {
        failed.push(FailedCheck::WidthBelowMin);
    }
    if b.h() < strict.min_h {
        failed.push(FailedCheck::HeightBelowMin);
    }
    if b.area() < strict.min_area {
        failed.push(FailedCheck::AreaBelowMin);
    }
    failed
}

/// Classify every element of one array exactly once.
///
/// Rejections are logged into `diag` (one entry each); ignored and accepted
/// counts are added to it as well.
pub fn classify_strict(
    elements: &[LayoutElement],
    array: ElementArray,
    want: &LayoutElementKind,
    strict: &StrictConfig,
    diag: &mut Diagnostics,
) -> StrictSelection {
    let mut verdicts = Vec::with_capacity(elements.len());
    for (index, e) in elements.iter().enumerate() {
        let verdict = if is_ignored_tag(&e.raw_type, &strict.ignore_tags) {
            Verdict::Ignored(IgnoreReason::IgnoredTag)
        } else if matches!(
            e.kind,
            LayoutElementKind::Underlay | LayoutElementKind::Subject
        ) {
            Verdict::Ignored(IgnoreReason::NotACandidate)
        } else if &e.kind != want && !strict.allow_cross_kind_fallback {
            Verdict::Ignored(IgnoreReason::OtherKind)
        } else if let Some(b) = e.bbox {
            let failed = failed_checks(&b, strict);
            if failed.is_empty() {
                Verdict::Accepted(b)
            } else {
                diag.record_rejection(Rejection {
                    kind: e.kind.clone(),
                    array,
                    index,
                    failed: failed.clone(),
                    bbox: b,
                });
                Verdict::Rejected(failed)
            }
        } else {
            Verdict::Ignored(IgnoreReason::NoBox)
        };
        verdicts.push(verdict);
    }

    let accepted_at = |pred: &dyn Fn(&LayoutElement) -> bool| {
        verdicts
            .iter()
            .zip(elements)
            .position(|(v, e)| matches!(v, Verdict::Accepted(_)) && pred(e))
    };
    let mut selected = accepted_at(&|e| &e.kind == want);
    if selected.is_none() && strict.allow_cross_kind_fallback {
        selected = accepted_at(&|_| true);
        if let Some(i) = selected {
            debug!(
                "No {} passed strict checks, substituting {} at index {}",
                want, elements[i].kind, i
            );
        }
    }

    let selection = StrictSelection { verdicts, selected };
    diag.accepted += selection.count(|v| matches!(v, Verdict::Accepted(_)));
    diag.ignored += selection.count(|v| matches!(v, Verdict::Ignored(_)));
    selection
}

/// Greedy non-maximum suppression by descending confidence.
///
/// Returns indices into `elements`; entries without a box are skipped.
/// Ties keep input order.
#[must_use]
pub fn nms(elements: &[LayoutElement], candidates: &[usize], iou_threshold: f64) -> Vec<usize> {
    let mut order: Vec<usize> = candidates
        .iter()
        .copied()
        .filter(|&i| elements[i].bbox.is_some())
        .collect();
    order.sort_by(|&a, &b| elements[b].confidence.total_cmp(&elements[a].confidence));

    let mut kept: Vec<usize> = Vec::new();
    for i in order {
        let b = elements[i].bbox.as_ref();
        if kept
            .iter()
            .all(|&k| iou(b, elements[k].bbox.as_ref()) < iou_threshold)
        {
            kept.push(i);
        }
    }
    kept
}

/// Ranking score for a headline candidate
#[must_use]
pub fn text_rank(e: &LayoutElement, subject: Option<&BBox>) -> f64 {
    let Some(b) = e.bbox else {
        return f64::NEG_INFINITY;
    };
    let ar = b.w() / b.h().max(1e-6);
    e.confidence + 0.1 * (ar / 3.0).min(1.0) + 0.03 * b.area() - 0.6 * iou(Some(&b), subject)
}

/// Ranking score for a logo candidate, given the chosen text box
#[must_use]
pub fn logo_rank(e: &LayoutElement, subject: Option<&BBox>, text: Option<&BBox>) -> f64 {
    let Some(b) = e.bbox else {
        return f64::NEG_INFINITY;
    };
    e.confidence + 0.05 * b.area() - 0.6 * iou(Some(&b), subject) - 0.4 * iou(Some(&b), text)
}

/// Highest-scoring index; the earliest wins a tie
#[must_use]
pub fn pick_best(candidates: &[usize], score: impl Fn(usize) -> f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for &i in candidates {
        let s = score(i);
        if best.map_or(true, |(_, bs)| s > bs) {
            best = Some((i, s));
        }
    }
    best.map(|(i, _)| i)
}

/// Place a resized box around `(cx, cy)`, shifting it to stay in the unit square
fn resize_around(cx: f64, cy: f64, w: f64, h: f64) -> BBox {
    let x = (cx - w / 2.0).min(1.0 - w).max(0.0);
    let y = (cy - h / 2.0).min(1.0 - h).max(0.0);
    BBox::new(x, y, w, h)
}

/// Widen a text box to the minimum aspect, cap its area, then fit the margin
#[must_use]
pub fn repair_text(b: BBox, rules: &Rules) -> BBox {
    let b = b.clip();
    let m = rules.min_margin;
    let avail = (1.0 - 2.0 * m).max(0.0);
    let (cx, cy) = b.center();
    let (mut w, mut h) = (b.w().min(avail), b.h().min(avail));

    if h > 0.0 && w / h < rules.min_aspect_text {
        w = h * rules.min_aspect_text;
        if w > avail {
            w = avail;
            h = w / rules.min_aspect_text;
        }
    }
    let out = cap_area(resize_around(cx, cy, w, h), rules.max_area_text);
    out.fit_within_margin(m)
}

/// Constrain a logo's width into the aspect band, cap its area, fit the margin
#[must_use]
pub fn repair_logo(b: BBox, rules: &Rules) -> BBox {
    let b = b.clip();
    let m = rules.min_margin;
    let avail = (1.0 - 2.0 * m).max(0.0);
    let (lo, hi) = rules.logo_aspect_range;
    let (cx, cy) = b.center();
    let (mut w, mut h) = (b.w(), b.h());
    let mut resized = false;
    if h > 0.0 {
        let ar = b.aspect();
        if ar < lo || ar > hi {
            w = ar.clamp(lo, hi) * h;
            resized = true;
        }
        if w > avail || h > avail {
            let scale = (avail / w).min(avail / h);
            w *= scale;
            h *= scale;
            resized = true;
        }
    }
    let out = if resized {
        resize_around(cx, cy, w, h)
    } else {
        b
    };
    cap_area(out, rules.max_area_logo).fit_within_margin(m)
}

fn cap_area(b: BBox, max_area: f64) -> BBox {
    let area = b.area();
    if area > max_area && area > 0.0 {
        b.scale_about_center((max_area / area).sqrt())
    } else {
        b
    }
}

/// Result of a full repair pass
#[derive(Debug, Clone, PartialEq)]
pub struct Repaired {
    pub bbox: BBox,
    /// Present when a subject was known and the box overlapped it too much
    pub subject_separation: Option<Separation>,
}

/// Repair by kind, then push away from the (fixed) subject if needed
#[must_use]
pub fn repair(
    kind: &LayoutElementKind,
    b: BBox,
    subject: Option<&BBox>,
    rules: &Rules,
    sep: &SeparationConfig,
) -> Repaired {
    let bbox = match kind {
        LayoutElementKind::Logo => repair_logo(b, rules),
        _ => repair_text(b, rules),
    };
    match subject {
        Some(s) if bbox.iou(s) > rules.max_iou_with_subject => {
            let separation = separate_from_fixed(
                bbox,
                s,
                rules.max_iou_with_subject,
                sep.step,
                sep.max_iters,
                rules.min_margin,
            );
            Repaired {
                bbox: separation.a,
                subject_separation: Some(separation),
            }
        }
        _ => Repaired {
            bbox,
            subject_separation: None,
        },
    }
}
