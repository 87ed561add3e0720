//! Dynamic-string placeholders.
//!
//! Export replaces every occurrence of a node's own base URLs (plain,
//! URL-encoded and double-URL-encoded) and theme path with named
//! tokens; import substitutes the destination node's values back in.
//! This is what lets one export replay on a node with a different
//! domain.

use contentsync_store::NodeSettings;
use regex::Regex;
use std::collections::BTreeMap;

/// The substitution table of one node.
#[derive(Debug, Clone)]
pub struct DynamicStrings {
    /// `(value, token)` pairs in externalization order: uploads before
    /// site (the uploads URL contains the site URL), encoded forms
    /// before plain ones.
    pairs: Vec<(String, String)>,
}

impl DynamicStrings {
    /// Builds the table for a node.
    pub fn for_node(settings: &NodeSettings) -> Self {
        let mut pairs = Vec::new();

        for (value, token) in [
            (settings.uploads_url.as_str(), "uploads_url"),
            (settings.site_url.as_str(), "site_url"),
        ] {
            let encoded = urlencoding::encode(value).into_owned();
            let double_encoded = urlencoding::encode(&encoded).into_owned();
            pairs.push((double_encoded, format!("{{{{{token}_enc2}}}}")));
            pairs.push((encoded, format!("{{{{{token}_enc}}}}")));
            pairs.push((value.to_string(), format!("{{{{{token}}}}}")));
        }

        // The theme name only inside theme paths; a bare theme name is
        // too ambiguous to rewrite.
        pairs.push((
            format!("themes/{}", settings.theme),
            "themes/{{theme}}".to_string(),
        ));

        Self { pairs }
    }

    /// Replaces this node's dynamic strings with tokens.
    pub fn externalize(&self, text: &str) -> String {
        let mut result = text.to_string();
        for (value, token) in &self.pairs {
            result = result.replace(value.as_str(), token.as_str());
        }
        result
    }

    /// Replaces tokens with this node's values.
    pub fn internalize(&self, text: &str) -> String {
        let mut result = text.to_string();
        for (value, token) in &self.pairs {
            result = result.replace(token.as_str(), value.as_str());
        }
        result
    }
}

/// Resolves id placeholders left by reference extraction.
///
/// `{{n}}` resolves through `content_map` and `{{term:n}}` through
/// `term_map`; placeholders with no mapping yet are left untouched so a
/// later pass can finish them.
pub fn resolve_id_placeholders(
    text: &str,
    content_map: &BTreeMap<u64, u64>,
    term_map: &BTreeMap<u64, u64>,
) -> String {
    let pattern = placeholder_pattern();
    pattern
        .replace_all(text, |captures: &regex::Captures<'_>| {
            let id: u64 = captures["id"].parse().unwrap_or(0);
            let is_term = captures.name("term").is_some();
            let mapped = if is_term {
                term_map.get(&id)
            } else {
                content_map.get(&id)
            };
            match mapped {
                Some(new_id) => new_id.to_string(),
                None => captures[0].to_string(),
            }
        })
        .into_owned()
}

/// Returns true if the text still carries unresolved id placeholders.
pub fn has_unresolved_placeholders(text: &str) -> bool {
    placeholder_pattern().is_match(text)
}

fn placeholder_pattern() -> Regex {
    Regex::new(r"\{\{(?P<term>term:)?(?P<id>\d+)\}\}").expect("static pattern compiles")
}

#[cfg(test)]
mod tests {
    use super::*;
    use contentsync_store::NodeId;

    fn settings() -> NodeSettings {
        NodeSettings::new(NodeId::new(1), "https://one.example").with_theme("aurora")
    }

    #[test]
    fn externalize_internalize_roundtrip() {
        let dynamic = DynamicStrings::for_node(&settings());
        let body = "see https://one.example/about and https://one.example/media/a.png \
                    plus themes/aurora/style.css";

        let externalized = dynamic.externalize(body);
        assert!(!externalized.contains("one.example"));
        assert!(externalized.contains("{{site_url}}/about"));
        assert!(externalized.contains("{{uploads_url}}/a.png"));
        assert!(externalized.contains("themes/{{theme}}/style.css"));

        assert_eq!(dynamic.internalize(&externalized), body);
    }

    #[test]
    fn encoded_forms_get_their_own_tokens() {
        let dynamic = DynamicStrings::for_node(&settings());
        let encoded = urlencoding::encode("https://one.example").into_owned();
        let double = urlencoding::encode(&encoded).into_owned();
        let body = format!("a {encoded} b {double} c");

        let externalized = dynamic.externalize(&body);
        assert!(externalized.contains("{{site_url_enc}}"));
        assert!(externalized.contains("{{site_url_enc2}}"));

        assert_eq!(dynamic.internalize(&externalized), body);
    }

    #[test]
    fn internalize_on_other_node_swaps_domains() {
        let source = DynamicStrings::for_node(&settings());
        let dest =
            DynamicStrings::for_node(&NodeSettings::new(NodeId::new(2), "https://two.example"));

        let externalized = source.externalize("https://one.example/media/a.png");
        assert_eq!(
            dest.internalize(&externalized),
            "https://two.example/media/a.png"
        );
    }

    #[test]
    fn placeholder_resolution_uses_both_maps() {
        let mut content_map = BTreeMap::new();
        content_map.insert(7, 37);
        let mut term_map = BTreeMap::new();
        term_map.insert(3, 13);

        let text = r#"a {{7}} b {{term:3}} c {{9}}"#;
        let resolved = resolve_id_placeholders(text, &content_map, &term_map);
        assert_eq!(resolved, "a 37 b 13 c {{9}}");
        assert!(has_unresolved_placeholders(&resolved));

        content_map.insert(9, 99);
        let finished = resolve_id_placeholders(&resolved, &content_map, &term_map);
        assert_eq!(finished, "a 37 b 13 c 99");
        assert!(!has_unresolved_placeholders(&finished));
    }
}
