//! Configuration for the placement engine
//!
//! Every threshold, weight and band the engine uses lives here, grouped by
//! stage. A TOML file may override any subset; missing sections and keys fall
//! back to the defaults below. [`PlacementConfig::validate`] is the only gate:
//! once a config passes it, nothing in the per-image path can fail on it.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PlacementError, Result};
use crate::kind::DEFAULT_IGNORE_TAGS;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    pub rules: Rules,
    pub strict: StrictConfig,
    pub separation: SeparationConfig,
    pub alignment: AlignmentConfig,
    pub fallback: FallbackConfig,
    pub underlay: UnderlayConfig,
    pub scoring: ScoringConfig,
    pub energy: EnergyConfig,
}

/// Design constraints shared by repair, separation and scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rules {
    pub min_margin: f64,
    pub min_aspect_text: f64,
    pub max_area_text: f64,
    pub max_area_logo: f64,
    /// Inclusive `(min, max)` width/height band for logos
    pub logo_aspect_range: (f64, f64),
    pub max_iou_with_subject: f64,
    pub max_iou_text_logo: f64,
    /// Mean energy at or below which a text region counts as negative space
    pub energy_ok_text: f64,
    pub energy_ok_logo: f64,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            min_margin: 0.03,
            min_aspect_text: 1.6,
            max_area_text: 0.20,
            max_area_logo: 0.12,
            logo_aspect_range: (0.6, 3.0),
            max_iou_with_subject: 0.20,
            max_iou_text_logo: 0.25,
            energy_ok_text: 0.35,
            energy_ok_logo: 0.55,
        }
    }
}

/// Minimum sizes and candidate policy for strict validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrictConfig {
    pub min_w: f64,
    pub min_h: f64,
    pub min_area: f64,
    /// Accept a box of another kind when none of the wanted kind pass
    pub allow_cross_kind_fallback: bool,
    pub ignore_tags: Vec<String>,
    /// IoU above which a lower-confidence duplicate is suppressed
    pub nms_iou: f64,
}

impl Default for StrictConfig {
    fn default() -> Self {
        Self {
            min_w: 0.02,
            min_h: 0.04,
            min_area: 1e-3,
            allow_cross_kind_fallback: false,
            ignore_tags: DEFAULT_IGNORE_TAGS.iter().map(|s| (*s).to_string()).collect(),
            nms_iou: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparationConfig {
    pub step: f64,
    pub max_iters: usize,
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            step: 0.01,
            max_iters: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    pub enabled: bool,
    pub guides: Vec<f64>,
    pub tolerance: f64,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            guides: vec![0.1, 0.5, 0.9],
            tolerance: 0.03,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub seed: u64,
    pub stride: f64,
    /// Lower bound on sampled coordinates per axis
    pub min_samples: usize,
    pub overlap_weight: f64,
    /// Added to `seed` for the logo search
    pub logo_seed_offset: u64,
    pub text_max_h: f64,
    pub logo_min_h: f64,
    pub logo_max_h: f64,
    /// Loosen aspect/margin rules for synthesized boxes when no proposal survived
    pub relax_if_all_dropped: bool,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            seed: 1234,
            stride: 0.02,
            min_samples: 30,
            overlap_weight: 0.8,
            logo_seed_offset: 7,
            text_max_h: 0.22,
            logo_min_h: 0.04,
            logo_max_h: 0.15,
            relax_if_all_dropped: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnderlayConfig {
    pub enabled: bool,
    pub pad: f64,
    pub shape: String,
    pub radius: f64,
    pub opacity: f64,
}

impl Default for UnderlayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pad: 0.015,
            shape: "rounded".to_string(),
            radius: 0.08,
            opacity: 0.6,
        }
    }
}

/// Weights and bands of the composite score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub w_headline: f64,
    pub w_logo: f64,
    pub w_margin_text: f64,
    pub w_margin_logo: f64,
    pub w_aspect_text: f64,
    /// Text aspect at which the aspect reward saturates
    pub aspect_text_cap: f64,
    pub w_aspect_logo: f64,
    pub text_area_band: (f64, f64),
    pub w_text_area: f64,
    pub logo_area_band: (f64, f64),
    pub w_logo_area: f64,
    pub penalty_subject_text: f64,
    pub penalty_subject_logo: f64,
    pub penalty_text_logo: f64,
    pub w_energy_text: f64,
    pub w_energy_logo: f64,
    pub prompt_band: (usize, usize),
    pub w_prompt: f64,
    pub prompt_short: usize,
    pub penalty_prompt_short: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            w_headline: 1.2,
            w_logo: 1.0,
            w_margin_text: 0.6,
            w_margin_logo: 0.4,
            w_aspect_text: 0.5,
            aspect_text_cap: 3.0,
            w_aspect_logo: 0.3,
            text_area_band: (0.04, 0.12),
            w_text_area: 0.4,
            logo_area_band: (0.015, 0.06),
            w_logo_area: 0.25,
            penalty_subject_text: 0.7,
            penalty_subject_logo: 0.5,
            penalty_text_logo: 0.2,
            w_energy_text: 0.6,
            w_energy_logo: 0.2,
            prompt_band: (120, 1200),
            w_prompt: 0.3,
            prompt_short: 60,
            penalty_prompt_short: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyConfig {
    pub max_side: u32,
    pub subject_q_low: f64,
    pub subject_q_high: f64,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            max_side: crate::energy::DEFAULT_MAX_SIDE,
            subject_q_low: 0.15,
            subject_q_high: 0.85,
        }
    }
}

impl PlacementConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Reject configurations the engine cannot honour.
    ///
    /// Runs once at startup. Per-image processing assumes a validated config.
    pub fn validate(&self) -> Result<()> {
        let r = &self.rules;
        ensure_unit("rules.min_margin", r.min_margin)?;
        if r.min_margin >= 0.5 {
            return Err(PlacementError::config(format!(
                "rules.min_margin must be below 0.5, got {}",
                r.min_margin
            )));
        }
        ensure_positive("rules.min_aspect_text", r.min_aspect_text)?;
        ensure_positive("rules.max_area_text", r.max_area_text)?;
        ensure_positive("rules.max_area_logo", r.max_area_logo)?;
        ensure_unit("rules.max_area_text", r.max_area_text)?;
        ensure_unit("rules.max_area_logo", r.max_area_logo)?;
        ensure_positive("rules.logo_aspect_range.0", r.logo_aspect_range.0)?;
        ensure_ordered("rules.logo_aspect_range", r.logo_aspect_range)?;
        ensure_unit("rules.max_iou_with_subject", r.max_iou_with_subject)?;
        ensure_unit("rules.max_iou_text_logo", r.max_iou_text_logo)?;
        ensure_unit("rules.energy_ok_text", r.energy_ok_text)?;
        ensure_unit("rules.energy_ok_logo", r.energy_ok_logo)?;

        let s = &self.strict;
        ensure_unit("strict.min_w", s.min_w)?;
        ensure_unit("strict.min_h", s.min_h)?;
        ensure_unit("strict.min_area", s.min_area)?;
        ensure_unit("strict.nms_iou", s.nms_iou)?;

        ensure_positive("separation.step", self.separation.step)?;
        if self.separation.max_iters == 0 {
            return Err(PlacementError::config("separation.max_iters must be positive"));
        }

        let a = &self.alignment;
        if a.guides.is_empty() {
            return Err(PlacementError::config("alignment.guides must not be empty"));
        }
        for g in &a.guides {
            ensure_unit("alignment.guides", *g)?;
        }
        ensure_unit("alignment.tolerance", a.tolerance)?;

        let f = &self.fallback;
        ensure_positive("fallback.stride", f.stride)?;
        ensure_unit("fallback.stride", f.stride)?;
        ensure_finite("fallback.overlap_weight", f.overlap_weight)?;
        ensure_positive("fallback.text_max_h", f.text_max_h)?;
        ensure_positive("fallback.logo_min_h", f.logo_min_h)?;
        ensure_ordered("fallback.logo_h", (f.logo_min_h, f.logo_max_h))?;
        ensure_unit("fallback.logo_max_h", f.logo_max_h)?;

        let u = &self.underlay;
        ensure_unit("underlay.pad", u.pad)?;
        ensure_unit("underlay.opacity", u.opacity)?;
        ensure_finite("underlay.radius", u.radius)?;

        let sc = &self.scoring;
        for (name, v) in [
            ("scoring.w_headline", sc.w_headline),
            ("scoring.w_logo", sc.w_logo),
            ("scoring.w_margin_text", sc.w_margin_text),
            ("scoring.w_margin_logo", sc.w_margin_logo),
            ("scoring.w_aspect_text", sc.w_aspect_text),
            ("scoring.w_aspect_logo", sc.w_aspect_logo),
            ("scoring.w_text_area", sc.w_text_area),
            ("scoring.w_logo_area", sc.w_logo_area),
            ("scoring.penalty_subject_text", sc.penalty_subject_text),
            ("scoring.penalty_subject_logo", sc.penalty_subject_logo),
            ("scoring.penalty_text_logo", sc.penalty_text_logo),
            ("scoring.w_energy_text", sc.w_energy_text),
            ("scoring.w_energy_logo", sc.w_energy_logo),
            ("scoring.w_prompt", sc.w_prompt),
            ("scoring.penalty_prompt_short", sc.penalty_prompt_short),
        ] {
            ensure_finite(name, v)?;
        }
        ensure_positive("scoring.aspect_text_cap", sc.aspect_text_cap)?;
        ensure_ordered("scoring.text_area_band", sc.text_area_band)?;
        ensure_ordered("scoring.logo_area_band", sc.logo_area_band)?;
        if sc.prompt_band.0 > sc.prompt_band.1 {
            return Err(PlacementError::config("scoring.prompt_band is inverted"));
        }

        let e = &self.energy;
        if e.max_side == 0 {
            return Err(PlacementError::config("energy.max_side must be positive"));
        }
        ensure_unit("energy.subject_q_low", e.subject_q_low)?;
        ensure_unit("energy.subject_q_high", e.subject_q_high)?;
        if e.subject_q_low >= e.subject_q_high {
            return Err(PlacementError::config(
                "energy.subject_q_low must be below energy.subject_q_high",
            ));
        }
        Ok(())
    }
}

fn ensure_finite(name: &str, v: f64) -> Result<()> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(PlacementError::config(format!("{name} must be finite, got {v}")))
    }
}

fn ensure_unit(name: &str, v: f64) -> Result<()> {
    ensure_finite(name, v)?;
    if (0.0..=1.0).contains(&v) {
        Ok(())
    } else {
        Err(PlacementError::config(format!(
            "{name} must be within [0, 1], got {v}"
        )))
    }
}

fn ensure_positive(name: &str, v: f64) -> Result<()> {
    ensure_finite(name, v)?;
    if v > 0.0 {
        Ok(())
    } else {
        Err(PlacementError::config(format!("{name} must be positive, got {v}")))
    }
}

fn ensure_ordered(name: &str, (lo, hi): (f64, f64)) -> Result<()> {
    ensure_finite(name, lo)?;
    ensure_finite(name, hi)?;
    if lo <= hi {
        Ok(())
    } else {
        Err(PlacementError::config(format!(
            "{name} is inverted: ({lo}, {hi})"
        )))
    }
}
