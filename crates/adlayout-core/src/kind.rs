//! Element type tags and their normalization
//!
//! Upstream proposers are free-text about element types ("title", "Tagline",
//! "brand ", ...). [`LayoutElementKind::resolve`] maps every tag onto a closed
//! set; tags it does not know survive as [`LayoutElementKind::Unknown`].

use std::fmt;

use serde::{Deserialize, Serialize};

const HEADLINE_ALIASES: &[&str] = &[
    "headline",
    "title",
    "tagline",
    "heading",
    "main_text",
    "copy",
    "text",
];
const LOGO_ALIASES: &[&str] = &["logo", "brand", "badge", "icon", "mark", "logotype"];
const UNDERLAY_ALIASES: &[&str] = &["underlay", "shadow", "panel"];
const SUBJECT_ALIASES: &[&str] = &["subject", "product"];

/// Tags excluded from candidate selection when none are configured
pub const DEFAULT_IGNORE_TAGS: &[&str] = &["mask", "guide", "grid", "ruler"];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutElementKind {
    Headline,
    Logo,
    Underlay,
    Subject,
    /// Unrecognized tag, normalized (trimmed, lowercased)
    Unknown(String),
}

impl LayoutElementKind {
    /// Resolve a raw tag through the alias table
    #[must_use]
    pub fn resolve(raw: &str) -> Self {
        let tag = normalize_tag(raw);
        let t = tag.as_str();
        if HEADLINE_ALIASES.contains(&t) {
            Self::Headline
        } else if LOGO_ALIASES.contains(&t) {
            Self::Logo
        } else if UNDERLAY_ALIASES.contains(&t) {
            Self::Underlay
        } else if SUBJECT_ALIASES.contains(&t) {
            Self::Subject
        } else {
            Self::Unknown(tag)
        }
    }

    /// Canonical tag written back to output JSON
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Headline => "headline",
            Self::Logo => "logo",
            Self::Underlay => "underlay",
            Self::Subject => "subject",
            Self::Unknown(tag) => tag,
        }
    }
}

impl fmt::Display for LayoutElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trim and lowercase a raw tag
#[must_use]
pub fn normalize_tag(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// True when `raw` is in `ignore` after normalization
#[must_use]
pub fn is_ignored_tag(raw: &str, ignore: &[String]) -> bool {
    let tag = normalize_tag(raw);
    ignore.iter().any(|i| normalize_tag(i) == tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_resolution() {
        assert_eq!(LayoutElementKind::resolve("Title"), LayoutElementKind::Headline);
        assert_eq!(LayoutElementKind::resolve(" tagline "), LayoutElementKind::Headline);
        assert_eq!(LayoutElementKind::resolve("BRAND"), LayoutElementKind::Logo);
        assert_eq!(LayoutElementKind::resolve("badge"), LayoutElementKind::Logo);
        assert_eq!(LayoutElementKind::resolve("panel"), LayoutElementKind::Underlay);
        assert_eq!(LayoutElementKind::resolve("product"), LayoutElementKind::Subject);
    }

    #[test]
    fn test_unknown_keeps_normalized_tag() {
        let k = LayoutElementKind::resolve("  Sticker ");
        assert_eq!(k, LayoutElementKind::Unknown("sticker".to_string()));
        assert_eq!(k.to_string(), "sticker");
    }

    #[test]
    fn test_ignore_set_is_case_insensitive() {
        let ignore: Vec<String> = DEFAULT_IGNORE_TAGS.iter().map(|s| s.to_string()).collect();
        assert!(is_ignored_tag("Guide", &ignore));
        assert!(!is_ignored_tag("headline", &ignore));
    }
}
