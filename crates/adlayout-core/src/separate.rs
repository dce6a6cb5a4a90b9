//! Pairwise repulsion of overlapping boxes
//!
//! Best effort: two boxes that together are larger than the margin-free area
//! can never separate. Such runs come back [`LoopOutcome::Exhausted`] with
//! `infeasible` set, and the caller records them instead of failing.

use serde::Serialize;
use tracing::debug;

use crate::bounded::{iterate_bounded, LoopOutcome};
use crate::geometry::{unit_vector, BBox};

/// Push direction used when both centers coincide
const TIE_BREAK: (f64, f64) = (1.0, 0.0);

/// Outcome of a separation run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Separation {
    pub a: BBox,
    /// Second box; equals the input for [`separate_from_fixed`]
    pub b: BBox,
    pub initial_iou: f64,
    pub final_iou: f64,
    pub outcome: LoopOutcome,
    pub infeasible: bool,
}

impl Separation {
    #[must_use]
    pub const fn is_converged(&self) -> bool {
        self.outcome.is_converged()
    }
}

struct State {
    a: BBox,
    b: BBox,
    best: (BBox, BBox, f64),
}

impl State {
    fn new(a: BBox, b: BBox) -> Self {
        Self {
            a,
            b,
            best: (a, b, a.iou(&b)),
        }
    }

    fn iou(&self) -> f64 {
        self.a.iou(&self.b)
    }

    fn remember(&mut self) {
        let v = self.iou();
        if v < self.best.2 {
            self.best = (self.a, self.b, v);
        }
    }
}

/// True when the pair cannot sit side by side on either axis
#[must_use]
pub fn pair_is_infeasible(a: &BBox, b: &BBox, margin: f64) -> bool {
    let avail = 1.0 - 2.0 * margin;
    a.w() + b.w() > avail && a.h() + b.h() > avail
}

fn push_direction(from: &BBox, to: &BBox) -> (f64, f64) {
    unit_vector(from.center(), to.center()).unwrap_or(TIE_BREAK)
}

/// Move `a` and `b` apart in equal, opposite steps until their IoU is at most
/// `threshold` or `max_iters` steps have run.
///
/// The returned pair is the lowest-IoU state seen, so the IoU never ends up
/// higher than it started.
#[must_use]
pub fn separate(
    a: BBox,
    b: BBox,
    threshold: f64,
    step: f64,
    max_iters: usize,
    margin: f64,
) -> Separation {
    let mut state = State::new(a, b);
    let initial_iou = state.best.2;
    let outcome = iterate_bounded(
        &mut state,
        max_iters,
        |s| s.iou() <= threshold,
        |s| {
            let (dx, dy) = push_direction(&s.b, &s.a);
            s.a = s.a.translate_center(dx * step, dy * step, margin);
            s.b = s.b.translate_center(-dx * step, -dy * step, margin);
            s.remember();
        },
    );
    let (a, b, final_iou) = state.best;
    if !outcome.is_converged() {
        debug!(
            "Separation exhausted after {} steps: iou {:.4} -> {:.4} (threshold {})",
            outcome.iterations(),
            initial_iou,
            final_iou,
            threshold
        );
    }
    Separation {
        a,
        b,
        initial_iou,
        final_iou,
        outcome,
        infeasible: !outcome.is_converged() && pair_is_infeasible(&a, &b, margin),
    }
}

/// Move only `a` away from a box that stays put (the subject)
#[must_use]
pub fn separate_from_fixed(
    a: BBox,
    fixed: &BBox,
    threshold: f64,
    step: f64,
    max_iters: usize,
    margin: f64,
) -> Separation {
    let mut state = State::new(a, *fixed);
    let initial_iou = state.best.2;
    let outcome = iterate_bounded(
        &mut state,
        max_iters,
        |s| s.iou() <= threshold,
        |s| {
            let (dx, dy) = push_direction(&s.b, &s.a);
            s.a = s.a.translate_center(dx * step, dy * step, margin);
            s.remember();
        },
    );
    let (a, _, final_iou) = state.best;
    Separation {
        a,
        b: *fixed,
        initial_iou,
        final_iou,
        outcome,
        infeasible: !outcome.is_converged() && pair_is_infeasible(&a, fixed, margin),
    }
}
