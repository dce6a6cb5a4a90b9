//! Composite quality score and per-image evaluation rows
//!
//! [`evaluate`] is the strict-mode audit of one proposal: it picks at most one
//! headline and one logo without repairing anything, measures them against the
//! rules and the energy field, and condenses the measurements into
//! [`EvaluationRow::composite_score`]. The same measurement feeds the final
//! score of a placed layout.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{PlacementConfig, Rules, ScoringConfig};
use crate::diagnostics::{Diagnostics, ElementArray};
use crate::energy::EnergyField;
use crate::geometry::{iou, round_to, BBox};
use crate::kind::LayoutElementKind;
use crate::layout::{Layout, LayoutDocument};
use crate::validate::{classify_strict, StrictSelection, Verdict};

/// Energy value recorded when a box is absent or its window is unusable
pub const ENERGY_UNKNOWN: f64 = -1.0;

/// One `(image, model)` line of the comparison report.
///
/// Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRow {
    pub image: String,
    pub model: String,
    pub json_ok: u8,
    pub have_headline: u8,
    pub have_logo: u8,
    pub margin_ok_text: u8,
    pub margin_ok_logo: u8,
    pub ar_text: f64,
    pub ar_logo: f64,
    pub area_text: f64,
    pub area_logo: f64,
    pub iou_subject_text: f64,
    pub iou_subject_logo: f64,
    pub iou_text_logo: f64,
    pub energy_text: f64,
    pub energy_logo: f64,
    pub negspace_compliance: u8,
    pub composite_score: f64,
    #[serde(skip)]
    pub prompt_len: usize,
}

/// Column names of the report, in order
pub const CSV_COLUMNS: [&str; 18] = [
    "image",
    "model",
    "json_ok",
    "have_headline",
    "have_logo",
    "margin_ok_text",
    "margin_ok_logo",
    "ar_text",
    "ar_logo",
    "area_text",
    "area_logo",
    "iou_subject_text",
    "iou_subject_logo",
    "iou_text_logo",
    "energy_text",
    "energy_logo",
    "negspace_compliance",
    "composite_score",
];

/// What gets measured for one layout
#[derive(Debug, Clone, Copy, Default)]
pub struct Measured<'a> {
    pub json_ok: bool,
    pub headline: Option<&'a BBox>,
    pub logo: Option<&'a BBox>,
    pub subject: Option<&'a BBox>,
    pub prompt_len: usize,
}

fn flag(v: bool) -> u8 {
    u8::from(v)
}

fn energy_of(field: &EnergyField, b: Option<&BBox>) -> f64 {
    b.and_then(|b| field.try_window_mean(b))
        .map_or(ENERGY_UNKNOWN, |e| round_to(e, 4))
}

impl EvaluationRow {
    /// Measure a resolved headline/logo pair and compute its score
    #[must_use]
    pub fn measure(
        image: impl Into<String>,
        model: impl Into<String>,
        m: &Measured<'_>,
        field: &EnergyField,
        config: &PlacementConfig,
    ) -> Self {
        let rules = &config.rules;
        let margin_ok = |b: Option<&BBox>| flag(b.is_some_and(|b| b.is_within_margin(rules.min_margin)));
        let ar = |b: Option<&BBox>| b.map_or(0.0, |b| round_to(b.aspect(), 4));
        let area = |b: Option<&BBox>| b.map_or(0.0, |b| round_to(b.area(), 6));
        let iou_subject_text = round_to(iou(m.headline, m.subject), 4);
        let energy_text = energy_of(field, m.headline);

        let mut row = Self {
            image: image.into(),
            model: model.into(),
            json_ok: flag(m.json_ok),
            have_headline: flag(m.headline.is_some()),
            have_logo: flag(m.logo.is_some()),
            margin_ok_text: margin_ok(m.headline),
            margin_ok_logo: margin_ok(m.logo),
            ar_text: ar(m.headline),
            ar_logo: ar(m.logo),
            area_text: area(m.headline),
            area_logo: area(m.logo),
            iou_subject_text,
            iou_subject_logo: round_to(iou(m.logo, m.subject), 4),
            iou_text_logo: round_to(iou(m.headline, m.logo), 4),
            energy_text,
            energy_logo: energy_of(field, m.logo),
            negspace_compliance: flag(
                (0.0..=rules.energy_ok_text).contains(&energy_text)
                    && iou_subject_text <= rules.max_iou_with_subject,
            ),
            composite_score: 0.0,
            prompt_len: m.prompt_len,
        };
        row.composite_score = composite_score(&row, rules, &config.scoring);
        row
    }

    #[must_use]
    pub const fn has_any(&self) -> bool {
        self.have_headline == 1 || self.have_logo == 1
    }

    #[must_use]
    pub const fn has_both(&self) -> bool {
        self.have_headline == 1 && self.have_logo == 1
    }
}

/// Fixed linear combination of a row's measurements, rounded to 4 decimals
#[must_use]
pub fn composite_score(row: &EvaluationRow, rules: &Rules, w: &ScoringConfig) -> f64 {
    let in_band = |v: f64, (lo, hi): (f64, f64)| (lo..=hi).contains(&v);
    let mut s = 0.0;

    s += w.w_headline * f64::from(row.have_headline) + w.w_logo * f64::from(row.have_logo);
    s += w.w_margin_text * f64::from(row.margin_ok_text)
        + w.w_margin_logo * f64::from(row.margin_ok_logo);

    if row.ar_text > 0.0 {
        s += w.w_aspect_text * (row.ar_text / w.aspect_text_cap).min(1.0);
    }
    if row.ar_logo > 0.0 && in_band(row.ar_logo, rules.logo_aspect_range) {
        s += w.w_aspect_logo;
    }

    if in_band(row.area_text, w.text_area_band) {
        s += w.w_text_area;
    }
    if in_band(row.area_logo, w.logo_area_band) {
        s += w.w_logo_area;
    }

    s -= w.penalty_subject_text * row.iou_subject_text;
    s -= w.penalty_subject_logo * row.iou_subject_logo;
    s -= w.penalty_text_logo * row.iou_text_logo;

    if row.energy_text >= 0.0 {
        s += w.w_energy_text * (rules.energy_ok_text - row.energy_text).max(0.0);
    }
    if row.energy_logo >= 0.0 {
        s += w.w_energy_logo * (rules.energy_ok_logo - row.energy_logo).max(0.0);
    }

    if row.prompt_len > 0 {
        if (w.prompt_band.0..=w.prompt_band.1).contains(&row.prompt_len) {
            s += w.w_prompt;
        } else if row.prompt_len < w.prompt_short {
            s -= w.penalty_prompt_short;
        }
    }
    round_to(s, 4)
}

/// Strict-mode audit of one proposal
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub row: EvaluationRow,
    pub diagnostics: Diagnostics,
    pub subject: BBox,
    pub headline: Option<BBox>,
    pub logo: Option<BBox>,
}

fn selected_box(sel: &StrictSelection) -> Option<BBox> {
    sel.selected.and_then(|i| match sel.verdicts[i] {
        Verdict::Accepted(b) => Some(b),
        _ => None,
    })
}

/// Subject from the proposal, else estimated from the energy field
pub(crate) fn resolve_subject(layout: &Layout, field: &EnergyField, config: &PlacementConfig) -> BBox {
    layout.subject.unwrap_or_else(|| {
        field.estimate_subject_bbox(config.energy.subject_q_low, config.energy.subject_q_high)
    })
}

/// Evaluate a raw proposal document against an energy field
#[must_use]
pub fn evaluate(
    doc: &Value,
    image: &str,
    model: &str,
    field: &EnergyField,
    config: &PlacementConfig,
) -> Evaluation {
    let mut diagnostics = Diagnostics::new();
    diagnostics.energy_degenerate = field.is_degenerate();
    let parsed = LayoutDocument::from_value(doc, &mut diagnostics);
    let layout = &parsed.layout;
    let subject = resolve_subject(layout, field, config);

    let head_sel = classify_strict(
        &layout.texts,
        ElementArray::Texts,
        &LayoutElementKind::Headline,
        &config.strict,
        &mut diagnostics,
    );
    let logo_sel = classify_strict(
        &layout.graphics,
        ElementArray::Graphics,
        &LayoutElementKind::Logo,
        &config.strict,
        &mut diagnostics,
    );
    let headline = selected_box(&head_sel);
    let logo = selected_box(&logo_sel);

    let row = EvaluationRow::measure(
        image,
        model,
        &Measured {
            json_ok: parsed.has_layout,
            headline: headline.as_ref(),
            logo: logo.as_ref(),
            subject: Some(&subject),
            prompt_len: parsed.prompt_len,
        },
        field,
        config,
    );
    Evaluation {
        row,
        diagnostics,
        subject,
        headline,
        logo,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use serde_json::json;

    fn blank_row() -> EvaluationRow {
        EvaluationRow {
            image: "a.png".into(),
            model: "base".into(),
            json_ok: 1,
            have_headline: 0,
            have_logo: 0,
            margin_ok_text: 0,
            margin_ok_logo: 0,
            ar_text: 0.0,
            ar_logo: 0.0,
            area_text: 0.0,
            area_logo: 0.0,
            iou_subject_text: 0.0,
            iou_subject_logo: 0.0,
            iou_text_logo: 0.0,
            energy_text: ENERGY_UNKNOWN,
            energy_logo: ENERGY_UNKNOWN,
            negspace_compliance: 0,
            composite_score: 0.0,
            prompt_len: 0,
        }
    }

    #[test]
    fn test_empty_row_scores_zero() {
        let config = PlacementConfig::default();
        assert_eq!(composite_score(&blank_row(), &config.rules, &config.scoring), 0.0);
    }

    #[test]
    fn test_prompt_band() {
        let config = PlacementConfig::default();
        let mut row = blank_row();
        row.prompt_len = 300;
        assert_eq!(composite_score(&row, &config.rules, &config.scoring), 0.3);
        row.prompt_len = 30;
        assert_eq!(composite_score(&row, &config.rules, &config.scoring), -0.1);
        row.prompt_len = 90;
        assert_eq!(composite_score(&row, &config.rules, &config.scoring), 0.0);
    }

    #[test]
    fn test_overlap_penalties_weighted() {
        let config = PlacementConfig::default();
        let mut subject_text = blank_row();
        subject_text.iou_subject_text = 0.5;
        let mut text_logo = blank_row();
        text_logo.iou_text_logo = 0.5;
        let a = composite_score(&subject_text, &config.rules, &config.scoring);
        let b = composite_score(&text_logo, &config.rules, &config.scoring);
        assert!(a < b);
    }

    #[test]
    fn test_evaluate_strict_pick() {
        let field = EnergyField::from_array(Array2::zeros((40, 40)));
        let doc = json!({"layout": {
            "subject_layout": {"center": [0.5, 0.4], "ratio": [0.4, 0.4]},
            "nongraphic_layout": [
                {"type": "headline", "bbox": [0.1, 0.1, 0.01, 0.01]},
                {"type": "title", "bbox": [0.1, 0.75, 0.8, 0.12]}
            ],
            "graphic_layout": [{"type": "brand", "bbox": [0.8, 0.05, 0.12, 0.06]}]
        }});
        let eval = evaluate(&doc, "img.png", "lora", &field, &PlacementConfig::default());
        assert_eq!(eval.row.have_headline, 1);
        assert_eq!(eval.row.have_logo, 1);
        assert_eq!(eval.row.json_ok, 1);
        assert_eq!(eval.diagnostics.proposed_headlines, 2);
        assert_eq!(eval.diagnostics.proposed_logos, 1);
        assert_eq!(eval.diagnostics.reasons().len(), 1);
        assert_eq!(eval.row.energy_text, 0.0);
        assert_eq!(eval.row.negspace_compliance, 1);
        assert_eq!(eval.headline, Some(BBox::new(0.1, 0.75, 0.8, 0.12)));
    }

    #[test]
    fn test_evaluate_without_layout() {
        let field = EnergyField::from_array(Array2::zeros((40, 40)));
        let eval = evaluate(&json!({"raw": "oops"}), "img.png", "base", &field, &PlacementConfig::default());
        assert_eq!(eval.row.json_ok, 0);
        assert!(!eval.row.has_any());
        assert_eq!(eval.row.energy_text, ENERGY_UNKNOWN);
        assert_eq!(eval.row.composite_score, 0.0);
    }

    #[test]
    fn test_csv_header_matches_columns() {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.serialize(blank_row()).unwrap();
        let out = String::from_utf8(wtr.into_inner().unwrap()).unwrap();
        let header = out.lines().next().unwrap();
        assert_eq!(header, CSV_COLUMNS.join(","));
    }
}
