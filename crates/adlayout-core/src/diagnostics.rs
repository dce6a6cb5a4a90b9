//! Per-image diagnostics bundle
//!
//! Nothing in the per-image path is fatal. Malformed proposals, strict-mode
//! rejections and separations that ran out of iterations end up here and
//! travel with the best-effort layout.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::bounded::LoopOutcome;
use crate::error::{ElementParseError, Result};
use crate::geometry::{round_to, BBox};
use crate::kind::LayoutElementKind;

/// Which proposal array an entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ElementArray {
    #[serde(rename = "nongraphic_layout")]
    Texts,
    #[serde(rename = "graphic_layout")]
    Graphics,
    #[serde(rename = "subject_layout")]
    Subject,
}

impl ElementArray {
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::Texts => "nongraphic_layout",
            Self::Graphics => "graphic_layout",
            Self::Subject => "subject_layout",
        }
    }
}

/// An entry that could not be read; the element is treated as boxless
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MalformedInput {
    pub array: ElementArray,
    pub index: usize,
    #[serde(serialize_with = "serialize_display")]
    pub error: ElementParseError,
}

fn serialize_display<T: fmt::Display, S: serde::Serializer>(
    v: &T,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.collect_str(v)
}

/// A strict-mode size check that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedCheck {
    WidthBelowMin,
    HeightBelowMin,
    AreaBelowMin,
}

impl fmt::Display for FailedCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::WidthBelowMin => "w<min",
            Self::HeightBelowMin => "h<min",
            Self::AreaBelowMin => "area<min",
        })
    }
}

/// One strict-mode rejection; renders as a single reasons-log line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub kind: LayoutElementKind,
    pub array: ElementArray,
    pub index: usize,
    pub failed: Vec<FailedCheck>,
    pub bbox: BBox,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let checks: Vec<String> = self.failed.iter().map(ToString::to_string).collect();
        let coords: Vec<String> = self
            .bbox
            .to_array()
            .iter()
            .map(|v| round_to(*v, 4).to_string())
            .collect();
        write!(
            f,
            "{} rejected [{}] -> bbox=[{}]",
            self.kind,
            checks.join(", "),
            coords.join(", ")
        )
    }
}

/// The two boxes a separation tried to pull apart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPair {
    TextLogo,
    TextSubject,
    LogoSubject,
}

/// A separation that ended with the overlap still above threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Unsatisfiable {
    pub pair: ConflictPair,
    pub final_iou: f64,
    pub threshold: f64,
    pub outcome: LoopOutcome,
    /// The two boxes cannot fit side by side inside the margin band at all
    pub infeasible: bool,
}

/// Everything the engine noticed about one image
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    pub malformed: Vec<MalformedInput>,
    pub rejections: Vec<Rejection>,
    pub unsatisfiable: Vec<Unsatisfiable>,
    /// Entries skipped by strict selection (ignore-set tags, underlays, boxless)
    pub ignored: usize,
    pub accepted: usize,
    /// Boxed headline entries in the proposal, before any validation
    pub proposed_headlines: usize,
    /// Boxed logo entries in the proposal, before any validation
    pub proposed_logos: usize,
    /// Kinds synthesized by the fallback placer
    pub fallback: Vec<LayoutElementKind>,
    pub energy_degenerate: bool,
    /// Share of placed boxes whose center sits on a guide line
    pub alignment_score: Option<f64>,
}

impl Diagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_malformed(&mut self, array: ElementArray, index: usize, error: ElementParseError) {
        debug!("Malformed {}[{}]: {}", array.key(), index, error);
        self.malformed.push(MalformedInput {
            array,
            index,
            error,
        });
    }

    pub fn record_rejection(&mut self, rejection: Rejection) {
        debug!("{}", rejection);
        self.rejections.push(rejection);
    }

    pub fn record_unsatisfiable(&mut self, record: Unsatisfiable) {
        self.unsatisfiable.push(record);
    }

    /// Reasons-log lines, one per rejection
    #[must_use]
    pub fn reasons(&self) -> Vec<String> {
        self.rejections.iter().map(ToString::to_string).collect()
    }

    /// True when a separation gave up with overlap left
    #[must_use]
    pub fn is_unplaceable(&self) -> bool {
        !self.unsatisfiable.is_empty()
    }

    /// Write `<dir>/<stem>.txt` with one reason per line.
    ///
    /// Nothing is written when there were no rejections; returns the path
    /// written, if any.
    pub fn write_reasons_file(&self, dir: &Path, stem: &str) -> Result<Option<PathBuf>> {
        if self.rejections.is_empty() {
            return Ok(None);
        }
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{stem}.txt"));
        std::fs::write(&path, self.reasons().join("\n"))?;
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejection() -> Rejection {
        Rejection {
            kind: LayoutElementKind::Headline,
            array: ElementArray::Texts,
            index: 0,
            failed: vec![FailedCheck::WidthBelowMin, FailedCheck::AreaBelowMin],
            bbox: BBox::new(0.123456, 0.5, 0.01, 0.05),
        }
    }

    #[test]
    fn test_reason_line_format() {
        assert_eq!(
            rejection().to_string(),
            "headline rejected [w<min, area<min] -> bbox=[0.1235, 0.5, 0.01, 0.05]"
        );
    }

    #[test]
    fn test_no_reasons_file_without_rejections() {
        let dir = tempfile::tempdir().unwrap();
        let diag = Diagnostics::new();
        assert_eq!(diag.write_reasons_file(dir.path(), "img").unwrap(), None);
        assert!(!dir.path().join("img.txt").exists());
    }

    #[test]
    fn test_reasons_file_one_line_per_rejection() {
        let dir = tempfile::tempdir().unwrap();
        let mut diag = Diagnostics::new();
        diag.record_rejection(rejection());
        diag.record_rejection(rejection());
        let path = diag
            .write_reasons_file(&dir.path().join("reasons"), "img")
            .unwrap()
            .unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_unplaceable_flag() {
        let mut diag = Diagnostics::new();
        assert!(!diag.is_unplaceable());
        diag.record_unsatisfiable(Unsatisfiable {
            pair: ConflictPair::TextLogo,
            final_iou: 0.4,
            threshold: 0.15,
            outcome: LoopOutcome::Exhausted { iterations: 60 },
            infeasible: true,
        });
        assert!(diag.is_unplaceable());
    }
}
