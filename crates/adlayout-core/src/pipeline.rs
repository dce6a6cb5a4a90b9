//! Per-image placement pipeline
//!
//! ```text
//! proposal JSON ─▶ strict validation ─▶ NMS + ranking ─▶ repair
//!                        │ (nothing accepted)                │
//!                        └──────▶ fallback search ───────────┤
//!                                                            ▼
//!            scoring ◀─ underlays ◀─ snapping ◀─ separation (text/logo, subject)
//! ```
//!
//! [`LayoutEngine::place`] always returns a layout. Problems are reported in
//! the attached [`Diagnostics`]; a separation that could not reach its
//! threshold turns the result [`PlacementState::Unplaceable`].

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::align::{alignment_score, snap_axes};
use crate::bounded::{iterate_bounded, LoopOutcome};
use crate::config::{PlacementConfig, Rules};
use crate::diagnostics::{ConflictPair, Diagnostics, ElementArray, Unsatisfiable};
use crate::energy::EnergyField;
use crate::error::Result;
use crate::fallback::{fallback_logo, fallback_text, relaxed_rules, LogoHint, TextHint};
use crate::geometry::BBox;
use crate::kind::LayoutElementKind;
use crate::layout::{Layout, LayoutDocument, LayoutElement};
use crate::score::{resolve_subject, Evaluation, EvaluationRow, Measured};
use crate::separate::{pair_is_infeasible, separate, separate_from_fixed, Separation};
use crate::validate::{
    classify_strict, logo_rank, nms, pick_best, repair, text_rank, StrictSelection,
};

/// Rounds of text/logo separation plus subject pushes before giving up
const CONFLICT_ROUNDS: usize = 3;

/// Confidence given to synthesized elements
const FALLBACK_CONFIDENCE: f64 = 0.6;

/// Model name used in the score row when the caller gives none
pub const DEFAULT_MODEL: &str = "engine";

/// Optional per-image inputs
#[derive(Debug, Clone, Default)]
pub struct PlacementRequest {
    pub image: String,
    pub model: Option<String>,
    pub text_hint: Option<TextHint>,
    pub logo_hint: Option<LogoHint>,
    /// Overrides `fallback.seed`
    pub seed: Option<u64>,
}

/// Terminal state of one image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementState {
    Scored,
    /// A separation ran out of iterations with overlap left
    Unplaceable,
}

#[derive(Debug, Clone)]
pub struct PlacementResult {
    /// Output document: input keys plus the resolved `layout`
    pub document: Value,
    pub layout: Layout,
    pub diagnostics: Diagnostics,
    pub row: EvaluationRow,
    pub state: PlacementState,
}

/// Placement engine bound to one validated configuration.
///
/// Holds no per-image state: one engine can be shared by reference across
/// worker threads.
#[derive(Debug, Clone)]
pub struct LayoutEngine {
    config: PlacementConfig,
}

impl LayoutEngine {
    /// Validate `config` and build an engine
    pub fn new(config: PlacementConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    /// Run the full pipeline for one image
    #[must_use]
    pub fn place(&self, doc: &Value, field: &EnergyField, request: &PlacementRequest) -> PlacementResult {
        let config = &self.config;
        let mut diag = Diagnostics::new();
        diag.energy_degenerate = field.is_degenerate();

        let parsed = LayoutDocument::from_value(doc, &mut diag);
        let subject = resolve_subject(&parsed.layout, field, config);

        let head_sel = classify_strict(
            &parsed.layout.texts,
            ElementArray::Texts,
            &LayoutElementKind::Headline,
            &config.strict,
            &mut diag,
        );
        let logo_sel = classify_strict(
            &parsed.layout.graphics,
            ElementArray::Graphics,
            &LayoutElementKind::Logo,
            &config.strict,
            &mut diag,
        );

        let head_pick = self.pick(&parsed.layout.texts, &head_sel, &LayoutElementKind::Headline, |e| {
            text_rank(e, Some(&subject))
        });
        let head_proposed = head_pick.and_then(|i| parsed.layout.texts[i].bbox);
        let logo_pick = self.pick(&parsed.layout.graphics, &logo_sel, &LayoutElementKind::Logo, |e| {
            logo_rank(e, Some(&subject), head_proposed.as_ref())
        });

        let all_dropped = head_pick.is_none() && logo_pick.is_none();
        let (text_rules, logo_rules) = if all_dropped && config.fallback.relax_if_all_dropped {
            debug!("Every proposal dropped, relaxing rules for synthesized boxes");
            relaxed_rules(&config.rules)
        } else {
            (config.rules.clone(), config.rules.clone())
        };
        let mut fallback = config.fallback.clone();
        if let Some(seed) = request.seed {
            fallback.seed = seed;
        }

        let mut headline = match head_pick {
            Some(i) => parsed.layout.texts[i].clone(),
            None => {
                let b = fallback_text(
                    field,
                    Some(&subject),
                    &text_rules,
                    &fallback,
                    request.text_hint.as_ref(),
                );
                diag.fallback.push(LayoutElementKind::Headline);
                synthesized(LayoutElementKind::Headline, b)
            }
        };
        headline.kind = LayoutElementKind::Headline;
        let text_box = self.repair_box(
            &mut diag,
            &LayoutElementKind::Headline,
            placed_box(&headline, &text_rules),
            &subject,
            &text_rules,
        );

        let mut logo = match logo_pick {
            Some(i) => parsed.layout.graphics[i].clone(),
            None => {
                let b = fallback_logo(
                    field,
                    Some(&subject),
                    Some(&text_box),
                    &logo_rules,
                    &fallback,
                    request.logo_hint.as_ref(),
                );
                diag.fallback.push(LayoutElementKind::Logo);
                synthesized(LayoutElementKind::Logo, b)
            }
        };
        logo.kind = LayoutElementKind::Logo;
        let logo_box = self.repair_box(
            &mut diag,
            &LayoutElementKind::Logo,
            placed_box(&logo, &logo_rules),
            &subject,
            &logo_rules,
        );

        let (text_box, logo_box) = self.finalize(
            &mut diag,
            text_box,
            logo_box,
            &subject,
            (text_rules.min_margin, logo_rules.min_margin),
        );

        headline.bbox = Some(text_box);
        logo.bbox = Some(logo_box);
        let mut graphics = vec![logo];
        if config.underlay.enabled {
            graphics.push(self.underlay_for(&headline, 0));
        }
        let layout = Layout {
            subject: Some(subject),
            texts: vec![headline],
            graphics,
        };

        let row = EvaluationRow::measure(
            request.image.clone(),
            request.model.as_deref().unwrap_or(DEFAULT_MODEL),
            &Measured {
                json_ok: parsed.has_layout,
                headline: Some(&text_box),
                logo: Some(&logo_box),
                subject: Some(&subject),
                prompt_len: parsed.prompt_len,
            },
            field,
            config,
        );
        let state = if diag.is_unplaceable() {
            PlacementState::Unplaceable
        } else {
            PlacementState::Scored
        };
        info!(
            "Placed {}: score {:.4}, {} rejected, {} synthesized, {:?}",
            request.image,
            row.composite_score,
            diag.rejections.len(),
            diag.fallback.len(),
            state
        );

        PlacementResult {
            document: parsed.to_value(&layout),
            layout,
            diagnostics: diag,
            row,
            state,
        }
    }

    /// Deduplicate the accepted candidates of `kind` and pick the best ranked.
    ///
    /// A cross-kind substitute from strict selection is used only when no
    /// candidate of `kind` was accepted.
    fn pick(
        &self,
        elements: &[LayoutElement],
        sel: &StrictSelection,
        kind: &LayoutElementKind,
        rank: impl Fn(&LayoutElement) -> f64,
    ) -> Option<usize> {
        let accepted: Vec<usize> = sel.accepted_of(elements, kind).collect();
        if accepted.is_empty() {
            return sel.selected;
        }
        let kept = nms(elements, &accepted, self.config.strict.nms_iou);
        pick_best(&kept, |i| rank(&elements[i]))
    }

    /// Strict evaluation of a proposal.
    ///
    /// With `post_fix`, the strict picks are repaired, pulled apart and
    /// snapped the way [`place`](Self::place) finalizes its boxes before they
    /// are measured. Nothing is synthesized for a kind without a pick.
    #[must_use]
    pub fn evaluate(
        &self,
        doc: &Value,
        image: &str,
        model: &str,
        field: &EnergyField,
        post_fix: bool,
    ) -> Evaluation {
        let mut eval = crate::score::evaluate(doc, image, model, field, &self.config);
        if !post_fix {
            return eval;
        }
        let rules = &self.config.rules;
        let subject = eval.subject;
        let diag = &mut eval.diagnostics;
        let headline = eval
            .headline
            .map(|b| self.repair_box(diag, &LayoutElementKind::Headline, b, &subject, rules));
        let logo = eval
            .logo
            .map(|b| self.repair_box(diag, &LayoutElementKind::Logo, b, &subject, rules));
        let (headline, logo) = match (headline, logo) {
            (Some(t), Some(l)) => {
                let (t, l) = self.finalize(diag, t, l, &subject, (rules.min_margin, rules.min_margin));
                (Some(t), Some(l))
            }
            (t, l) => {
                let alone = |b: BBox| {
                    self.snap_guarded(&b, rules.min_margin, &[(subject, rules.max_iou_with_subject)])
                };
                let (t, l) = (t.map(alone), l.map(alone));
                let placed: Vec<BBox> = t.iter().chain(l.iter()).copied().collect();
                diag.alignment_score = alignment_score(&placed, &self.config.alignment);
                (t, l)
            }
        };
        debug!("Post-fixed {} for {}", image, model);

        let json_ok = eval.row.json_ok == 1;
        let prompt_len = eval.row.prompt_len;
        eval.row = EvaluationRow::measure(
            image,
            model,
            &Measured {
                json_ok,
                headline: headline.as_ref(),
                logo: logo.as_ref(),
                subject: Some(&subject),
                prompt_len,
            },
            field,
            &self.config,
        );
        eval.headline = headline;
        eval.logo = logo;
        eval
    }

    fn repair_box(
        &self,
        diag: &mut Diagnostics,
        kind: &LayoutElementKind,
        b: BBox,
        subject: &BBox,
        rules: &Rules,
    ) -> BBox {
        let repaired = repair(kind, b, Some(subject), rules, &self.config.separation);
        if let Some(sep) = &repaired.subject_separation {
            settle(diag, subject_pair(kind), sep, rules.max_iou_with_subject);
        }
        repaired.bbox
    }

    /// Resolve overlaps, snap to guides without breaking an overlap limit,
    /// then make the unsatisfiable records describe the final boxes
    fn finalize(
        &self,
        diag: &mut Diagnostics,
        text: BBox,
        logo: BBox,
        subject: &BBox,
        margins: (f64, f64),
    ) -> (BBox, BBox) {
        let rules = &self.config.rules;
        let (text, logo, outcome) = self.resolve_conflicts(diag, text, logo, subject);
        let text = self.snap_guarded(
            &text,
            margins.0,
            &[(logo, rules.max_iou_text_logo), (*subject, rules.max_iou_with_subject)],
        );
        let logo = self.snap_guarded(
            &logo,
            margins.1,
            &[(text, rules.max_iou_text_logo), (*subject, rules.max_iou_with_subject)],
        );
        self.audit(diag, &text, &logo, subject, outcome);
        diag.alignment_score = alignment_score(&[text, logo], &self.config.alignment);
        (text, logo)
    }

    /// Current overlap of every constrained pair with its limit
    fn overlaps(&self, text: &BBox, logo: &BBox, subject: &BBox) -> [(ConflictPair, f64, f64); 3] {
        let rules = &self.config.rules;
        [
            (ConflictPair::TextLogo, text.iou(logo), rules.max_iou_text_logo),
            (ConflictPair::TextSubject, text.iou(subject), rules.max_iou_with_subject),
            (ConflictPair::LogoSubject, logo.iou(subject), rules.max_iou_with_subject),
        ]
    }

    /// Alternate text/logo separation and subject pushes until every pair is
    /// within its limit or the round budget runs out
    fn resolve_conflicts(
        &self,
        diag: &mut Diagnostics,
        text: BBox,
        logo: BBox,
        subject: &BBox,
    ) -> (BBox, BBox, LoopOutcome) {
        let mut boxes = (text, logo);
        let outcome = iterate_bounded(
            &mut boxes,
            CONFLICT_ROUNDS,
            |b: &(BBox, BBox)| {
                self.overlaps(&b.0, &b.1, subject)
                    .iter()
                    .all(|&(_, iou, limit)| iou <= limit)
            },
            |b: &mut (BBox, BBox)| *b = self.conflict_round(diag, b.0, b.1, subject),
        );
        if !outcome.is_converged() {
            debug!("Overlaps still open after {} rounds", outcome.iterations());
        }
        (boxes.0, boxes.1, outcome)
    }

    /// Pull the headline and logo apart, then push both off the subject
    fn conflict_round(
        &self,
        diag: &mut Diagnostics,
        text: BBox,
        logo: BBox,
        subject: &BBox,
    ) -> (BBox, BBox) {
        let rules = &self.config.rules;
        let sep_cfg = &self.config.separation;
        let (mut text, mut logo) = (text, logo);

        if text.iou(&logo) > rules.max_iou_text_logo {
            let sep = separate(
                text,
                logo,
                rules.max_iou_text_logo,
                sep_cfg.step,
                sep_cfg.max_iters,
                rules.min_margin,
            );
            settle(diag, ConflictPair::TextLogo, &sep, rules.max_iou_text_logo);
            text = sep.a;
            logo = sep.b;
        }

        for (kind, b) in [
            (LayoutElementKind::Headline, &mut text),
            (LayoutElementKind::Logo, &mut logo),
        ] {
            if b.iou(subject) > rules.max_iou_with_subject {
                let sep = separate_from_fixed(
                    *b,
                    subject,
                    rules.max_iou_with_subject,
                    sep_cfg.step,
                    sep_cfg.max_iters,
                    rules.min_margin,
                );
                settle(diag, subject_pair(&kind), &sep, rules.max_iou_with_subject);
                *b = sep.a;
            }
        }
        (text, logo)
    }

    /// Snap `b` to the guides. An axis whose snap would push an overlap with
    /// one of `others` past its limit is left where it was.
    fn snap_guarded(&self, b: &BBox, margin: f64, others: &[(BBox, f64)]) -> BBox {
        let a = &self.config.alignment;
        if !a.enabled {
            return *b;
        }
        let within_limits = |c: &BBox| {
            others
                .iter()
                .all(|(o, limit)| c.iou(o) <= (*limit).max(b.iou(o)))
        };
        [(true, true), (true, false), (false, true)]
            .into_iter()
            .map(|(x, y)| snap_axes(b, &a.guides, a.tolerance, margin, x, y))
            .find(within_limits)
            .unwrap_or(*b)
    }

    /// Keep an unsatisfiable record exactly for each pair still over its limit
    fn audit(
        &self,
        diag: &mut Diagnostics,
        text: &BBox,
        logo: &BBox,
        subject: &BBox,
        outcome: LoopOutcome,
    ) {
        let margin = self.config.rules.min_margin;
        for (pair, iou, threshold) in self.overlaps(text, logo, subject) {
            if iou <= threshold {
                diag.unsatisfiable.retain(|u| u.pair != pair);
                continue;
            }
            if let Some(u) = diag.unsatisfiable.iter_mut().find(|u| u.pair == pair) {
                u.final_iou = iou;
                continue;
            }
            let (a, b) = match pair {
                ConflictPair::TextLogo => (text, logo),
                ConflictPair::TextSubject => (text, subject),
                ConflictPair::LogoSubject => (logo, subject),
            };
            diag.record_unsatisfiable(Unsatisfiable {
                pair,
                final_iou: iou,
                threshold,
                outcome,
                infeasible: pair_is_infeasible(a, b, margin),
            });
        }
    }

    fn underlay_for(&self, text: &LayoutElement, index: usize) -> LayoutElement {
        let u = &self.config.underlay;
        let b = text.bbox.map_or_else(|| BBox::new(0.0, 0.0, 0.0, 0.0), |b| b.padded(u.pad));
        let mut underlay = LayoutElement::new(
            LayoutElementKind::Underlay,
            b,
            (text.confidence + 0.1).min(0.9),
        );
        underlay.for_ref = Some(format!("{}#{}", text.kind, index));
        underlay.style = Some(json!({
            "shape": u.shape,
            "radius": u.radius,
            "opacity": u.opacity,
        }));
        underlay
    }
}

/// Box of a picked or synthesized element; both always carry one
fn placed_box(element: &LayoutElement, rules: &Rules) -> BBox {
    element
        .bbox
        .unwrap_or_else(|| BBox::new(rules.min_margin, rules.min_margin, 0.0, 0.0))
}

fn synthesized(kind: LayoutElementKind, b: BBox) -> LayoutElement {
    LayoutElement::new(kind, b, FALLBACK_CONFIDENCE)
}

fn subject_pair(kind: &LayoutElementKind) -> ConflictPair {
    match kind {
        LayoutElementKind::Logo => ConflictPair::LogoSubject,
        _ => ConflictPair::TextSubject,
    }
}

/// Replace any earlier record for `pair` with the outcome of `sep`
fn settle(diag: &mut Diagnostics, pair: ConflictPair, sep: &Separation, threshold: f64) {
    diag.unsatisfiable.retain(|u| u.pair != pair);
    if !sep.is_converged() {
        diag.record_unsatisfiable(Unsatisfiable {
            pair,
            final_iou: sep.final_iou,
            threshold,
            outcome: sep.outcome,
            infeasible: sep.infeasible,
        });
    }
}
