pub mod aggregate;
pub mod evaluate;
pub mod place;

use std::path::Path;

use adlayout_core::{EnergyField, PlacementConfig};
use anyhow::{Context as _, Result};
use serde_json::Value;
use tracing::debug;

/// Config from `path`, or the built-in defaults when no path was given
pub fn load_config(path: Option<&Path>) -> Result<PlacementConfig> {
    match path {
        Some(p) => PlacementConfig::load(p)
            .with_context(|| format!("Failed to load config {}", p.display())),
        None => Ok(PlacementConfig::default()),
    }
}

/// Decode an image and compute its energy field
pub fn load_energy(path: &Path, config: &PlacementConfig) -> Result<EnergyField> {
    let img = image::open(path).with_context(|| format!("Failed to open image {}", path.display()))?;
    let field = EnergyField::from_image(&img, config.energy.max_side);
    let (h, w) = field.dim();
    debug!("Energy field for {}: {}x{}", path.display(), w, h);
    Ok(field)
}

pub fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// File stem used for per-image artifacts
pub fn image_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}
