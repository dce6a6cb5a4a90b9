//! Evaluate mode - strict scoring of model proposals, one worker per image

use std::path::{Path, PathBuf};
use std::time::Instant;

use adlayout_core::aggregate::{write_report_csv, write_summary_json};
use adlayout_core::{aggregate, EvaluationRow, LayoutEngine};
use anyhow::{Context as _, Result};
use clap::Args;
use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{image_stem, load_config, load_energy, read_json};

pub const REPORT_FILE: &str = "compare_report.csv";
pub const SUMMARY_FILE: &str = "aggregate.json";

#[derive(Args)]
pub struct EvaluateCommand {
    /// Images to evaluate
    #[arg(long, num_args = 1.., required = true)]
    images: Vec<PathBuf>,

    /// Model proposals as MODEL=DIR; DIR holds `<image-file-name>*.json`
    #[arg(long, value_parser = parse_prediction, required = true)]
    predictions: Vec<(String, PathBuf)>,

    /// Directory for the report, summary and rejection logs
    #[arg(long)]
    out_dir: PathBuf,

    /// Rules TOML; missing keys use defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Repair, separate and snap the strict picks before measuring them
    #[arg(long)]
    post_fix: bool,
}

fn parse_prediction(s: &str) -> std::result::Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((model, dir)) if !model.trim().is_empty() && !dir.is_empty() => {
            Ok((model.trim().to_string(), PathBuf::from(dir)))
        }
        _ => Err(format!("expected MODEL=DIR, got '{s}'")),
    }
}

/// First `.json` in `dir` whose name starts with the image's file name
fn find_prediction(dir: &Path, image_name: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut hits: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(image_name) && n.ends_with(".json"))
        })
        .collect();
    hits.sort();
    hits.into_iter().next()
}

/// Proposal for one (image, model); unreadable or missing files count as no layout
fn load_prediction(dir: &Path, image_name: &str, model: &str) -> Value {
    let Some(path) = find_prediction(dir, image_name) else {
        warn!("[{}] no prediction for {}", model, image_name);
        return Value::Null;
    };
    match read_json(&path) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("[{}] {:#}", model, e);
            Value::Null
        }
    }
}

impl EvaluateCommand {
    fn evaluate_image(
        &self,
        image: &Path,
        engine: &LayoutEngine,
        reasons_root: &Path,
    ) -> Result<Vec<EvaluationRow>> {
        let field = match load_energy(image, engine.config()) {
            Ok(f) => f,
            Err(e) => {
                warn!("Skipping {}: {:#}", image.display(), e);
                return Ok(Vec::new());
            }
        };
        let name = image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = image_stem(image);

        let mut rows = Vec::with_capacity(self.predictions.len());
        for (model, dir) in &self.predictions {
            let doc = load_prediction(dir, &name, model);
            let evaluation = engine.evaluate(&doc, &name, model, &field, self.post_fix);
            evaluation
                .diagnostics
                .write_reasons_file(&reasons_root.join(model), &stem)
                .with_context(|| format!("Failed to write rejection log for {name}"))?;
            debug!(
                "[{}] {}: score {:.4}, {} headline / {} logo proposed",
                model,
                name,
                evaluation.row.composite_score,
                evaluation.diagnostics.proposed_headlines,
                evaluation.diagnostics.proposed_logos
            );
            rows.push(evaluation.row);
        }
        Ok(rows)
    }

    pub fn execute(self) -> Result<()> {
        let engine = LayoutEngine::new(load_config(self.config.as_deref())?)?;
        std::fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("Failed to create {}", self.out_dir.display()))?;
        let reasons_root = self.out_dir.join("reasons");

        let mut images = self.images.clone();
        images.sort();
        images.dedup();
        info!(
            "Evaluating {} images x {} models{}",
            images.len(),
            self.predictions.len(),
            if self.post_fix { " (post-fix)" } else { "" }
        );

        let start = Instant::now();
        let per_image: Vec<Vec<EvaluationRow>> = images
            .par_iter()
            .map(|image| self.evaluate_image(image, &engine, &reasons_root))
            .collect::<Result<_>>()?;

        // model-major order, images in sorted order within a model
        let mut rows: Vec<EvaluationRow> = Vec::new();
        for (model, _) in &self.predictions {
            rows.extend(
                per_image
                    .iter()
                    .flatten()
                    .filter(|r| &r.model == model)
                    .cloned(),
            );
        }
        info!(
            "Scored {} rows in {:.2}s",
            rows.len(),
            start.elapsed().as_secs_f64()
        );

        write_report_csv(&self.out_dir.join(REPORT_FILE), &rows)?;
        let summary = aggregate(&rows);
        write_summary_json(&self.out_dir.join(SUMMARY_FILE), &summary)?;
        for g in &summary.groups {
            info!(
                "{}: n={} comp_valid={:.4} both={:.4} any={:.4}",
                g.model, g.count, g.comp_valid, g.both_rate, g.any_rate
            );
        }
        for p in &summary.pairwise {
            info!(
                "{} vs {}: {}/{}/{} (win/tie/loss)",
                p.a, p.b, p.a_wins, p.ties, p.b_wins
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adlayout_core::aggregate::read_report_csv;

    #[test]
    fn test_parse_prediction() {
        assert_eq!(
            parse_prediction("lora=out/lora").unwrap(),
            ("lora".to_string(), PathBuf::from("out/lora"))
        );
        assert!(parse_prediction("out/lora").is_err());
        assert!(parse_prediction("=out").is_err());
    }

    #[test]
    fn test_find_prediction_matches_image_prefix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("shoe.png.lora.json"), "{}").unwrap();
        std::fs::write(dir.path().join("hat.png.lora.json"), "{}").unwrap();
        std::fs::write(dir.path().join("shoe.png.txt"), "").unwrap();
        let hit = find_prediction(dir.path(), "shoe.png").unwrap();
        assert!(hit.ends_with("shoe.png.lora.json"));
        assert!(find_prediction(dir.path(), "bag.png").is_none());
    }

    #[test]
    fn test_evaluate_writes_report_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("imgs");
        let base = dir.path().join("base");
        let lora = dir.path().join("lora");
        for d in [&images, &base, &lora] {
            std::fs::create_dir_all(d).unwrap();
        }
        let image = images.join("shoe.png");
        image::GrayImage::from_fn(64, 64, |x, y| image::Luma([((x * y) % 256) as u8]))
            .save(&image)
            .unwrap();
        std::fs::write(
            base.join("shoe.png.base.json"),
            r#"{"layout": {"nongraphic_layout": [
                {"type": "headline", "bbox": [0.1, 0.8, 0.5, 0.1]},
                {"type": "headline", "bbox": [0.1, 0.1, 0.001, 0.5]}
            ]}}"#,
        )
        .unwrap();

        let out = dir.path().join("report");
        let cmd = EvaluateCommand {
            images: vec![image],
            predictions: vec![("base".into(), base), ("lora".into(), lora)],
            out_dir: out.clone(),
            config: None,
            post_fix: false,
        };
        cmd.execute().unwrap();

        let rows = read_report_csv(&out.join(REPORT_FILE)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].model.as_str(), rows[0].json_ok, rows[0].have_headline), ("base", 1, 1));
        assert_eq!((rows[1].model.as_str(), rows[1].json_ok), ("lora", 0));
        assert!(out.join(SUMMARY_FILE).exists());
        let log = std::fs::read_to_string(out.join("reasons/base/shoe.txt")).unwrap();
        assert_eq!(log.lines().count(), 1);
        assert!(!out.join("reasons/lora/shoe.txt").exists());
    }

    #[test]
    fn test_post_fix_repairs_before_measuring() {
        let dir = tempfile::tempdir().unwrap();
        let preds = dir.path().join("lora");
        std::fs::create_dir_all(&preds).unwrap();
        let image = dir.path().join("cup.png");
        image::GrayImage::from_pixel(64, 64, image::Luma([128])).save(&image).unwrap();
        // headline flush against the bottom edge
        std::fs::write(
            preds.join("cup.png.json"),
            r#"{"layout": {"nongraphic_layout": [
                {"type": "headline", "bbox": [0.0, 0.9, 0.5, 0.1]}
            ]}}"#,
        )
        .unwrap();

        let run = |post_fix: bool, out: PathBuf| {
            EvaluateCommand {
                images: vec![image.clone()],
                predictions: vec![("lora".into(), preds.clone())],
                out_dir: out.clone(),
                config: None,
                post_fix,
            }
            .execute()
            .unwrap();
            read_report_csv(&out.join(REPORT_FILE)).unwrap().remove(0)
        };
        let raw = run(false, dir.path().join("raw"));
        let fixed = run(true, dir.path().join("fixed"));
        assert_eq!((raw.have_headline, raw.margin_ok_text), (1, 0));
        assert_eq!((fixed.have_headline, fixed.margin_ok_text), (1, 1));
        assert_eq!(fixed.have_logo, 0);
        assert!(fixed.composite_score > raw.composite_score);
    }
}
