//! Generation options

// Options are a flat set of feature toggles
#![allow(clippy::struct_excessive_bools)]

use serde::{Deserialize, Serialize};

/// Instruction characters that mark a field as "real field syntax" rather
/// than a bare placeholder name.
pub const DEFAULT_MISSING_FIELD_MARKERS: [&str; 3] = ["\\", "\"", "="];

/// Options consumed by a single generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateOptions {
    /// Remove placeholders without a value silently instead of failing
    ///
    /// Fields whose instruction carries field syntax are always left alone.
    pub ignore_missing_value: bool,

    /// Produce the structural shell instead of failing when no pages are given
    pub ignore_missing_data_pages: bool,

    /// Accept templates whose declared version or document kind is not the
    /// plain, supported one
    pub ignore_version_mismatch: bool,

    /// Embed linked images whose bytes can be read locally
    pub embed_external_images: bool,

    /// Insert a hard page break between generated pages
    pub insert_hard_page_breaks: bool,

    /// Emit `DrawingML` pictures instead of legacy VML (DOCX only)
    pub prefer_modern_picture_element: bool,

    /// Instruction markers identifying unrelated field codes; a missing key
    /// whose instruction contains one of these is left alone
    pub missing_field_markers: Vec<String>,

    /// Maximum number of interception re-entries per placeholder (None = unbounded)
    pub max_interception_rounds: Option<usize>,
}

impl Default for TemplateOptions {
    fn default() -> Self {
        Self {
            ignore_missing_value: false,
            ignore_missing_data_pages: false,
            ignore_version_mismatch: false,
            embed_external_images: false,
            insert_hard_page_breaks: true,
            prefer_modern_picture_element: true,
            missing_field_markers: DEFAULT_MISSING_FIELD_MARKERS
                .iter()
                .map(|m| (*m).to_string())
                .collect(),
            max_interception_rounds: None,
        }
    }
}

impl TemplateOptions {
    /// Create options with missing-value tolerance configured
    #[inline]
    #[must_use = "returns options with missing value policy configured"]
    pub const fn with_ignore_missing_value(mut self, ignore: bool) -> Self {
        self.ignore_missing_value = ignore;
        self
    }

    /// Create options with missing-pages tolerance configured
    #[inline]
    #[must_use = "returns options with missing pages policy configured"]
    pub const fn with_ignore_missing_data_pages(mut self, ignore: bool) -> Self {
        self.ignore_missing_data_pages = ignore;
        self
    }

    /// Create options with version-mismatch tolerance configured
    #[inline]
    #[must_use = "returns options with version check configured"]
    pub const fn with_ignore_version_mismatch(mut self, ignore: bool) -> Self {
        self.ignore_version_mismatch = ignore;
        self
    }

    /// Create options with external image embedding configured
    #[inline]
    #[must_use = "returns options with external image embedding configured"]
    pub const fn with_embed_external_images(mut self, embed: bool) -> Self {
        self.embed_external_images = embed;
        self
    }

    /// Create options with page break insertion configured
    #[inline]
    #[must_use = "returns options with page break insertion configured"]
    pub const fn with_hard_page_breaks(mut self, insert: bool) -> Self {
        self.insert_hard_page_breaks = insert;
        self
    }

    /// Create options with the picture element flavour configured
    #[inline]
    #[must_use = "returns options with picture element configured"]
    pub const fn with_modern_picture_element(mut self, prefer: bool) -> Self {
        self.prefer_modern_picture_element = prefer;
        self
    }

    /// Cap interception re-entries per placeholder
    #[inline]
    #[must_use = "returns options with interception cap configured"]
    pub const fn with_max_interception_rounds(mut self, rounds: Option<usize>) -> Self {
        self.max_interception_rounds = rounds;
        self
    }

    /// Whether `instruction` looks like unrelated field syntax
    #[must_use]
    pub fn has_field_syntax(&self, instruction: &str) -> bool {
        self.missing_field_markers
            .iter()
            .any(|marker| !marker.is_empty() && instruction.contains(marker.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = TemplateOptions::default();
        assert!(!opts.ignore_missing_value);
        assert!(opts.insert_hard_page_breaks);
        assert!(opts.prefer_modern_picture_element);
        assert_eq!(opts.missing_field_markers.len(), 3);
        assert_eq!(opts.max_interception_rounds, None);
    }

    #[test]
    fn test_field_syntax_heuristic() {
        let opts = TemplateOptions::default();
        assert!(opts.has_field_syntax(r" PAGE \* MERGEFORMAT "));
        assert!(opts.has_field_syntax(r#" DATE \@ "dd.MM.yyyy" "#));
        assert!(!opts.has_field_syntax(" MERGEFIELD CUSTOMER "));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let opts: TemplateOptions =
            serde_json::from_str(r#"{"ignore_missing_value": true}"#).unwrap();
        assert!(opts.ignore_missing_value);
        assert!(opts.insert_hard_page_breaks);
    }
}
