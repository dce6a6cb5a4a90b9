//! Bounded iteration with an explicit outcome
//!
//! Every retry loop in the engine goes through [`iterate_bounded`] so a caller
//! can tell "fixed" apart from "gave up after the cap".

use serde::Serialize;

/// How a bounded loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoopOutcome {
    /// The goal held after `iterations` steps (0 means it already held)
    Converged { iterations: usize },
    /// The step budget ran out with the goal still unmet
    Exhausted { iterations: usize },
}

impl LoopOutcome {
    #[inline]
    #[must_use]
    pub const fn is_converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }

    #[inline]
    #[must_use]
    pub const fn iterations(&self) -> usize {
        match self {
            Self::Converged { iterations } | Self::Exhausted { iterations } => *iterations,
        }
    }
}

/// Apply `step` to `state` until `done` holds or `max_iters` steps have run.
///
/// `done` is checked before every step, including the first.
pub fn iterate_bounded<S>(
    state: &mut S,
    max_iters: usize,
    mut done: impl FnMut(&S) -> bool,
    mut step: impl FnMut(&mut S),
) -> LoopOutcome {
    for iterations in 0..max_iters {
        if done(state) {
            return LoopOutcome::Converged { iterations };
        }
        step(state);
    }
    if done(state) {
        LoopOutcome::Converged {
            iterations: max_iters,
        }
    } else {
        LoopOutcome::Exhausted {
            iterations: max_iters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_done() {
        let mut n = 5;
        let out = iterate_bounded(&mut n, 10, |n| *n >= 5, |n| *n += 1);
        assert_eq!(out, LoopOutcome::Converged { iterations: 0 });
        assert_eq!(n, 5);
    }

    #[test]
    fn test_converges_on_last_step() {
        let mut n = 0;
        let out = iterate_bounded(&mut n, 3, |n| *n >= 3, |n| *n += 1);
        assert_eq!(out, LoopOutcome::Converged { iterations: 3 });
    }

    #[test]
    fn test_exhausted() {
        let mut n = 0;
        let out = iterate_bounded(&mut n, 4, |_| false, |n| *n += 1);
        assert_eq!(out, LoopOutcome::Exhausted { iterations: 4 });
        assert!(!out.is_converged());
        assert_eq!(out.iterations(), 4);
        assert_eq!(n, 4);
    }

    #[test]
    fn test_zero_budget() {
        let mut n = 0;
        assert!(!iterate_bounded(&mut n, 0, |n| *n > 0, |n| *n += 1).is_converged());
    }
}
