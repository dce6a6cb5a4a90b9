//! Place mode - full pipeline for a single image

use std::path::PathBuf;

use adlayout_core::{LayoutEngine, LogoHint, PlacementRequest, PlacementState, TextHint};
use anyhow::{Context as _, Result};
use clap::Args;
use serde_json::json;
use tracing::{info, warn};

use super::{image_stem, load_config, load_energy, read_json};

#[derive(Args)]
pub struct PlaceCommand {
    /// Photo the layout is placed on
    #[arg(long)]
    image: PathBuf,

    /// Proposal JSON (may be empty or partial)
    #[arg(long)]
    layout: PathBuf,

    /// Rules TOML; missing keys use defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Approximate headline length, used when a headline has to be synthesized
    #[arg(long)]
    text_chars: Option<usize>,

    /// Headline line count for synthesis
    #[arg(long, default_value = "1", requires = "text_chars")]
    text_lines: usize,

    /// Target logo area (fraction of the image) for synthesis
    #[arg(long)]
    logo_area: Option<f64>,

    /// Target logo aspect ratio (w/h) for synthesis
    #[arg(long)]
    logo_aspect: Option<f64>,

    /// Seed for the fallback search (overrides the config)
    #[arg(long)]
    seed: Option<u64>,

    /// Output JSON path (stdout when omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Directory for the rejection log of this image
    #[arg(long)]
    reasons_dir: Option<PathBuf>,

    /// Also write placement diagnostics next to the output
    #[arg(long)]
    diagnostics: bool,
}

impl PlaceCommand {
    fn request(&self) -> PlacementRequest {
        let logo_hint = (self.logo_area.is_some() || self.logo_aspect.is_some()).then_some(LogoHint {
            target_area: self.logo_area,
            aspect_ratio: self.logo_aspect,
        });
        PlacementRequest {
            image: self
                .image
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            model: None,
            text_hint: self.text_chars.map(|approx_chars| TextHint {
                approx_chars,
                lines: self.text_lines,
            }),
            logo_hint,
            seed: self.seed,
        }
    }

    pub fn execute(self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;
        let engine = LayoutEngine::new(config).context("Invalid placement config")?;
        let field = load_energy(&self.image, engine.config())?;
        let doc = read_json(&self.layout)?;

        let result = engine.place(&doc, &field, &self.request());

        if result.state == PlacementState::Unplaceable {
            for u in &result.diagnostics.unsatisfiable {
                warn!(
                    "{:?} overlap left at {:.4} (threshold {}){}",
                    u.pair,
                    u.final_iou,
                    u.threshold,
                    if u.infeasible { ", boxes too large to separate" } else { "" }
                );
            }
        }

        let output = serde_json::to_string_pretty(&result.document)?;
        match &self.out {
            Some(path) => {
                std::fs::write(path, &output)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Wrote layout to {}", path.display());
                if self.diagnostics {
                    let diag_path = path.with_extension("diagnostics.json");
                    let report = json!({
                        "state": result.state,
                        "diagnostics": result.diagnostics,
                        "row": result.row,
                    });
                    std::fs::write(&diag_path, serde_json::to_string_pretty(&report)?)
                        .with_context(|| format!("Failed to write {}", diag_path.display()))?;
                }
            }
            None => println!("{output}"),
        }

        if let Some(dir) = &self.reasons_dir {
            if let Some(path) = result
                .diagnostics
                .write_reasons_file(dir, &image_stem(&self.image))
                .context("Failed to write rejection log")?
            {
                info!("Rejection log: {}", path.display());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        place: PlaceCommand,
    }

    fn parse(args: &[&str]) -> PlaceCommand {
        let mut argv = vec!["place"];
        argv.extend_from_slice(args);
        Wrapper::parse_from(argv).place
    }

    #[test]
    fn test_request_carries_hints() {
        let cmd = parse(&[
            "--image", "dir/shoe.png", "--layout", "shoe.json", "--text-chars", "28",
            "--text-lines", "2", "--logo-aspect", "1.5", "--seed", "9",
        ]);
        let req = cmd.request();
        assert_eq!(req.image, "shoe.png");
        assert_eq!(req.text_hint, Some(TextHint { approx_chars: 28, lines: 2 }));
        assert_eq!(
            req.logo_hint,
            Some(LogoHint { target_area: None, aspect_ratio: Some(1.5) })
        );
        assert_eq!(req.seed, Some(9));
    }

    #[test]
    fn test_no_hints_by_default() {
        let req = parse(&["--image", "a.png", "--layout", "a.json"]).request();
        assert!(req.text_hint.is_none() && req.logo_hint.is_none());
    }

    #[test]
    fn test_place_writes_layout_and_reasons() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("shoe.png");
        image::GrayImage::from_fn(64, 48, |x, _| image::Luma([(x * 4) as u8]))
            .save(&image)
            .unwrap();
        let layout = dir.path().join("shoe.json");
        std::fs::write(
            &layout,
            r#"{"product": "runner", "layout": {"nongraphic_layout": [
                {"type": "headline", "bbox": [0.1, 0.1, 0.001, 0.001]}
            ]}}"#,
        )
        .unwrap();
        let out = dir.path().join("shoe.out.json");
        let reasons = dir.path().join("reasons");

        let cmd = parse(&[
            "--image", image.to_str().unwrap(),
            "--layout", layout.to_str().unwrap(),
            "--out", out.to_str().unwrap(),
            "--reasons-dir", reasons.to_str().unwrap(),
            "--diagnostics",
        ]);
        cmd.execute().unwrap();

        let written = read_json(&out).unwrap();
        assert_eq!(written["product"], "runner");
        assert!(written["layout"]["nongraphic_layout"].as_array().is_some());
        let log = std::fs::read_to_string(reasons.join("shoe.txt")).unwrap();
        assert_eq!(log.lines().count(), 1);
        let sidecar = read_json(&dir.path().join("shoe.out.diagnostics.json")).unwrap();
        assert_eq!(sidecar["diagnostics"]["proposed_headlines"], 1);
        assert_eq!(sidecar["diagnostics"]["proposed_logos"], 0);
    }
}
