//! Overlay placement for product photographs
//!
//! Places a headline, a logo and their underlay panels onto a photo without
//! covering the product. Proposals arrive as loosely-typed JSON from an
//! upstream generator. They are validated, deduplicated, repaired, pulled
//! apart, snapped to guide lines and scored. When nothing usable was
//! proposed, a box is synthesized from the photo's own low-energy regions.
//!
//! # Example
//!
//! ```
//! use adlayout_core::{EnergyField, LayoutEngine, PlacementConfig, PlacementRequest};
//! use ndarray::Array2;
//! use serde_json::json;
//!
//! let engine = LayoutEngine::new(PlacementConfig::default()).unwrap();
//! let field = EnergyField::from_array(Array2::zeros((64, 64)));
//! let proposal = json!({"layout": {
//!     "nongraphic_layout": [{"type": "title", "bbox": [0.1, 0.78, 0.6, 0.12]}]
//! }});
//! let result = engine.place(&proposal, &field, &PlacementRequest::default());
//! assert_eq!(result.row.have_headline, 1);
//! ```

pub mod aggregate;
pub mod align;
pub mod bounded;
pub mod config;
pub mod diagnostics;
pub mod energy;
pub mod error;
pub mod fallback;
pub mod geometry;
pub mod kind;
pub mod layout;
pub mod pipeline;
pub mod score;
pub mod separate;
pub mod validate;

pub use aggregate::{aggregate, GroupSummary, Pairwise, Summary};
pub use bounded::{iterate_bounded, LoopOutcome};
pub use config::PlacementConfig;
pub use diagnostics::Diagnostics;
pub use energy::EnergyField;
pub use error::{ElementParseError, PlacementError, Result};
pub use fallback::{search_low_energy_window, LogoHint, TextHint, WindowSearch};
pub use geometry::BBox;
pub use kind::LayoutElementKind;
pub use layout::{Layout, LayoutDocument, LayoutElement};
pub use pipeline::{LayoutEngine, PlacementRequest, PlacementResult, PlacementState};
pub use score::{composite_score, evaluate, Evaluation, EvaluationRow};
pub use separate::{separate, Separation};
