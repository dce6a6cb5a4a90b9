//! Dataset-level summaries of evaluation rows
//!
//! Rows from all workers are collected first, then reduced here: per-model
//! means and rates, and a win/tie/loss table between every pair of models on
//! the images both evaluated.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::geometry::round_to;
use crate::score::{EvaluationRow, CSV_COLUMNS};

/// Per-model aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub model: String,
    pub count: usize,
    /// Mean of every numeric report column, keyed by column name
    pub means: BTreeMap<String, f64>,
    /// Share of rows with both a headline and a logo
    pub both_rate: f64,
    /// Share of rows with a headline or a logo
    pub any_rate: f64,
    /// Mean composite over rows that have any element
    pub comp_valid: f64,
}

/// Head-to-head on shared images; "wins" compare `composite_score`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pairwise {
    pub a: String,
    pub b: String,
    pub a_wins: usize,
    pub ties: usize,
    pub b_wins: usize,
}

impl Pairwise {
    #[must_use]
    pub const fn compared(&self) -> usize {
        self.a_wins + self.ties + self.b_wins
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub groups: Vec<GroupSummary>,
    pub pairwise: Vec<Pairwise>,
}

type Column = (&'static str, fn(&EvaluationRow) -> f64);

const NUMERIC_COLUMNS: [Column; 16] = [
    ("json_ok", |r| f64::from(r.json_ok)),
    ("have_headline", |r| f64::from(r.have_headline)),
    ("have_logo", |r| f64::from(r.have_logo)),
    ("margin_ok_text", |r| f64::from(r.margin_ok_text)),
    ("margin_ok_logo", |r| f64::from(r.margin_ok_logo)),
    ("ar_text", |r| r.ar_text),
    ("ar_logo", |r| r.ar_logo),
    ("area_text", |r| r.area_text),
    ("area_logo", |r| r.area_logo),
    ("iou_subject_text", |r| r.iou_subject_text),
    ("iou_subject_logo", |r| r.iou_subject_logo),
    ("iou_text_logo", |r| r.iou_text_logo),
    ("energy_text", |r| r.energy_text),
    ("energy_logo", |r| r.energy_logo),
    ("negspace_compliance", |r| f64::from(r.negspace_compliance)),
    ("composite_score", |r| r.composite_score),
];

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        round_to(sum / n as f64, 4)
    }
}

fn rate(hits: usize, n: usize) -> f64 {
    if n == 0 {
        0.0
    } else {
        round_to(hits as f64 / n as f64, 4)
    }
}

fn summarize_group(model: &str, rows: &[&EvaluationRow]) -> GroupSummary {
    let means = NUMERIC_COLUMNS
        .iter()
        .map(|(name, get)| ((*name).to_string(), mean(rows.iter().map(|r| get(r)))))
        .collect();
    let n = rows.len();
    GroupSummary {
        model: model.to_string(),
        count: n,
        means,
        both_rate: rate(rows.iter().filter(|r| r.has_both()).count(), n),
        any_rate: rate(rows.iter().filter(|r| r.has_any()).count(), n),
        comp_valid: mean(
            rows.iter()
                .filter(|r| r.has_any())
                .map(|r| r.composite_score),
        ),
    }
}

fn compare(a: &str, b: &str, by_model: &BTreeMap<&str, BTreeMap<&str, f64>>) -> Pairwise {
    let mut result = Pairwise {
        a: a.to_string(),
        b: b.to_string(),
        a_wins: 0,
        ties: 0,
        b_wins: 0,
    };
    let (Some(ra), Some(rb)) = (by_model.get(a), by_model.get(b)) else {
        return result;
    };
    for (image, sa) in ra {
        let Some(sb) = rb.get(image) else {
            continue;
        };
        if sa > sb {
            result.a_wins += 1;
        } else if sa < sb {
            result.b_wins += 1;
        } else {
            result.ties += 1;
        }
    }
    result
}

/// Group rows by model and compute means, rates and the pairwise table.
///
/// Groups and pairs come out in model-name order. When a model has several
/// rows for one image, the first one is used for the pairwise join.
#[must_use]
pub fn aggregate(rows: &[EvaluationRow]) -> Summary {
    let mut grouped: BTreeMap<&str, Vec<&EvaluationRow>> = BTreeMap::new();
    for row in rows {
        grouped.entry(row.model.as_str()).or_default().push(row);
    }
    let groups = grouped
        .iter()
        .map(|(model, rs)| summarize_group(model, rs))
        .collect();

    let mut by_model: BTreeMap<&str, BTreeMap<&str, f64>> = BTreeMap::new();
    for row in rows {
        by_model
            .entry(row.model.as_str())
            .or_default()
            .entry(row.image.as_str())
            .or_insert(row.composite_score);
    }
    let models: BTreeSet<&str> = by_model.keys().copied().collect();
    let models: Vec<&str> = models.into_iter().collect();
    let mut pairwise = Vec::new();
    for (i, a) in models.iter().enumerate() {
        for b in &models[i + 1..] {
            pairwise.push(compare(a, b, &by_model));
        }
    }
    Summary { groups, pairwise }
}

/// Write the comparison report with its fixed header
pub fn write_report_csv(path: &Path, rows: &[EvaluationRow]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    if rows.is_empty() {
        wtr.write_record(CSV_COLUMNS)?;
    }
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

pub fn read_report_csv(path: &Path) -> Result<Vec<EvaluationRow>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for record in rdr.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

pub fn write_summary_json(path: &Path, summary: &Summary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json)?;
    Ok(())
}
