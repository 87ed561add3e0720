//! Export configuration.

use serde::{Deserialize, Serialize};

/// Controls what the export closure of a root object includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Recurse into nested references found in the body.
    #[serde(default = "default_true")]
    pub append_nested: bool,
    /// Rewrite navigation-link blocks into type-agnostic custom links.
    #[serde(default)]
    pub resolve_menus: bool,
    /// Recurse into sibling translations local to the exporting node.
    #[serde(default)]
    pub translations: bool,
    /// Export all terms of the relevant taxonomies instead of only the
    /// assigned ones.
    #[serde(default)]
    pub all_terms: bool,
}

fn default_true() -> bool {
    true
}

impl ExportConfig {
    /// Enables or disables nested-reference recursion.
    pub fn with_append_nested(mut self, append_nested: bool) -> Self {
        self.append_nested = append_nested;
        self
    }

    /// Enables or disables menu normalization.
    pub fn with_resolve_menus(mut self, resolve_menus: bool) -> Self {
        self.resolve_menus = resolve_menus;
        self
    }

    /// Enables or disables translation recursion.
    pub fn with_translations(mut self, translations: bool) -> Self {
        self.translations = translations;
        self
    }

    /// Enables or disables whole-taxonomy term export.
    pub fn with_all_terms(mut self, all_terms: bool) -> Self {
        self.all_terms = all_terms;
        self
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            append_nested: true,
            resolve_menus: false,
            translations: false,
            all_terms: false,
        }
    }
}
