//! Nested-reference rules.
//!
//! A rule is a search pattern over body text plus the object type it
//! references. The preparer runs every registered rule, resolves each
//! match against the store, and rewrites resolved ids to the
//! placeholder form `{{id}}` (content) or `{{term:id}}` (terms).
//! Unresolved matches are logged and left untouched; they are never
//! fatal.

use crate::error::{SyncError, SyncResult};
use contentsync_store::NodeSettings;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

/// What a rule's matches refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// Content objects.
    Content,
    /// Taxonomy terms.
    Term,
}

/// One registered search rule.
///
/// Patterns carry a named capture `id` (numeric reference) and may
/// carry `slug` as a fallback resolved by `(name, referenced type)`.
#[derive(Debug, Clone)]
pub struct NestedReferenceRule {
    name: String,
    pattern: Regex,
    referenced_type: String,
    kind: RefKind,
}

impl NestedReferenceRule {
    /// Compiles a rule.
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        referenced_type: impl Into<String>,
        kind: RefKind,
    ) -> SyncResult<Self> {
        let name = name.into();
        let pattern = Regex::new(pattern).map_err(|e| SyncError::InvalidRule {
            name: name.clone(),
            message: e.to_string(),
        })?;
        Ok(Self {
            name,
            pattern,
            referenced_type: referenced_type.into(),
            kind,
        })
    }

    /// Returns the rule name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the referenced object type (empty means any).
    pub fn referenced_type(&self) -> &str {
        &self.referenced_type
    }

    /// Returns what matches refer to.
    pub fn kind(&self) -> RefKind {
        self.kind
    }

    fn placeholder(&self, id: u64) -> String {
        match self.kind {
            RefKind::Content => format!("{{{{{id}}}}}"),
            RefKind::Term => format!("{{{{term:{id}}}}}"),
        }
    }

    /// Runs the rule over `body`.
    ///
    /// `resolve` receives the captured id (if numeric) and slug (if
    /// any) and returns the resolved id, or `None` when the reference
    /// does not resolve. Resolved matches are rewritten in place;
    /// unresolved ones stay as they were. Returns the rewritten body
    /// and the resolved ids in match order.
    pub fn apply(
        &self,
        body: &str,
        mut resolve: impl FnMut(Option<u64>, Option<&str>) -> Option<u64>,
    ) -> (String, Vec<u64>) {
        let mut output = String::with_capacity(body.len());
        let mut resolved_ids = Vec::new();
        let mut last_end = 0;

        for captures in self.pattern.captures_iter(body) {
            let whole = captures.get(0).expect("match has a whole-match group");
            let id = captures
                .name("id")
                .and_then(|m| m.as_str().parse::<u64>().ok());
            let slug = captures.name("slug").map(|m| m.as_str());

            output.push_str(&body[last_end..whole.start()]);
            last_end = whole.end();

            match resolve(id, slug) {
                Some(resolved) => {
                    // Rewrite the capture span inside the match, keeping
                    // the surrounding text of the match intact.
                    let span = captures
                        .name("id")
                        .or_else(|| captures.name("slug"))
                        .unwrap_or(whole);
                    let mut rewritten = String::new();
                    rewritten.push_str(&body[whole.start()..span.start()]);
                    rewritten.push_str(&self.placeholder(resolved));
                    rewritten.push_str(&body[span.end()..whole.end()]);
                    output.push_str(&rewritten);
                    resolved_ids.push(resolved);
                }
                None => {
                    warn!(
                        rule = %self.name,
                        reference = %whole.as_str(),
                        "nested reference did not resolve, leaving original text"
                    );
                    output.push_str(whole.as_str());
                }
            }
        }

        output.push_str(&body[last_end..]);
        (output, resolved_ids)
    }
}

/// The registered rule lists of one node.
#[derive(Debug, Clone, Default)]
pub struct ReferenceRuleSet {
    content_rules: Vec<NestedReferenceRule>,
    term_rules: Vec<NestedReferenceRule>,
}

impl ReferenceRuleSet {
    /// Creates an empty rule set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates the standard rule set for a node.
    ///
    /// Covers embedded content blocks, media class markers, links to
    /// the node's own content, and term markers.
    pub fn standard(settings: &NodeSettings) -> SyncResult<Self> {
        let mut set = Self::empty();
        set.push_content_rule(NestedReferenceRule::new(
            "embed-block",
            r#"<!--\s*embed\s+id="(?P<id>\d+)"\s*-->"#,
            "",
            RefKind::Content,
        )?);
        set.push_content_rule(NestedReferenceRule::new(
            "media-class",
            r#"class="media-(?P<id>\d+)""#,
            "attachment",
            RefKind::Content,
        )?);
        set.push_content_rule(NestedReferenceRule::new(
            "content-link",
            &format!(
                r#"href="{}/\?p=(?P<id>\d+)""#,
                regex::escape(&settings.site_url)
            ),
            "",
            RefKind::Content,
        )?);
        set.push_term_rule(NestedReferenceRule::new(
            "term-marker",
            r#"data-term="(?P<id>\d+)""#,
            "",
            RefKind::Term,
        )?);
        Ok(set)
    }

    /// Registers a content rule.
    pub fn push_content_rule(&mut self, rule: NestedReferenceRule) {
        self.content_rules.push(rule);
    }

    /// Registers a term rule.
    pub fn push_term_rule(&mut self, rule: NestedReferenceRule) {
        self.term_rules.push(rule);
    }

    /// Returns the content rules.
    pub fn content_rules(&self) -> &[NestedReferenceRule] {
        &self.content_rules
    }

    /// Returns the term rules.
    pub fn term_rules(&self) -> &[NestedReferenceRule] {
        &self.term_rules
    }
}

/// Rewrites embedded filter expressions.
///
/// Filter expressions are inline JSON fragments in `query` comment
/// blocks whose `include` arrays carry content ids and whose `terms`
/// arrays carry term ids. Resolved ids become placeholder strings; a
/// fragment that fails to parse is left untouched.
pub fn extract_filter_expressions(
    body: &str,
    mut resolve_content: impl FnMut(u64) -> Option<u64>,
    mut resolve_term: impl FnMut(u64) -> Option<u64>,
) -> (String, Vec<u64>, Vec<u64>) {
    let pattern = query_block_pattern();
    let mut content_ids = Vec::new();
    let mut term_ids = Vec::new();
    let mut output = String::with_capacity(body.len());
    let mut last_end = 0;

    for captures in pattern.captures_iter(body) {
        let whole = captures.get(0).expect("match has a whole-match group");
        let fragment = captures.get(1).expect("query block has a json group");

        output.push_str(&body[last_end..whole.start()]);
        last_end = whole.end();

        let rewritten = match serde_json::from_str::<Value>(fragment.as_str()) {
            Ok(Value::Object(mut map)) => {
                if let Some(Value::Array(include)) = map.get_mut("include") {
                    for slot in include.iter_mut() {
                        if let Some(id) = slot.as_u64() {
                            if let Some(resolved) = resolve_content(id) {
                                *slot = Value::String(format!("{{{{{resolved}}}}}"));
                                content_ids.push(resolved);
                            } else {
                                warn!(id, "filter expression content id did not resolve");
                            }
                        }
                    }
                }
                if let Some(Value::Array(terms)) = map.get_mut("terms") {
                    for slot in terms.iter_mut() {
                        if let Some(id) = slot.as_u64() {
                            if let Some(resolved) = resolve_term(id) {
                                *slot = Value::String(format!("{{{{term:{resolved}}}}}"));
                                term_ids.push(resolved);
                            } else {
                                warn!(id, "filter expression term id did not resolve");
                            }
                        }
                    }
                }
                serde_json::to_string(&Value::Object(map)).ok()
            }
            _ => {
                warn!(fragment = %fragment.as_str(), "unparseable filter expression left untouched");
                None
            }
        };

        match rewritten {
            Some(json) => output.push_str(&format!("<!-- query {json} -->")),
            None => output.push_str(whole.as_str()),
        }
    }

    output.push_str(&body[last_end..]);
    (output, content_ids, term_ids)
}

/// Rewrites navigation-link blocks into type-agnostic custom links.
///
/// A nav block referencing a content id/type is reduced to label + URL
/// so imported navigation never dangles on an id that does not exist
/// at the destination. Returns the rewritten body and how many blocks
/// were normalized.
pub fn normalize_nav_blocks(body: &str) -> (String, usize) {
    let pattern = nav_block_pattern();
    let mut normalized = 0;
    let mut output = String::with_capacity(body.len());
    let mut last_end = 0;

    for captures in pattern.captures_iter(body) {
        let whole = captures.get(0).expect("match has a whole-match group");
        let fragment = captures.get(1).expect("nav block has a json group");

        output.push_str(&body[last_end..whole.start()]);
        last_end = whole.end();

        match serde_json::from_str::<Value>(fragment.as_str()) {
            Ok(Value::Object(map)) if map.contains_key("id") => {
                let mut custom = serde_json::Map::new();
                custom.insert("kind".into(), Value::String("custom".into()));
                if let Some(label) = map.get("label") {
                    custom.insert("label".into(), label.clone());
                }
                if let Some(url) = map.get("url") {
                    custom.insert("url".into(), url.clone());
                }
                match serde_json::to_string(&Value::Object(custom)) {
                    Ok(json) => {
                        output.push_str(&format!("<!-- nav {json} -->"));
                        normalized += 1;
                    }
                    Err(_) => output.push_str(whole.as_str()),
                }
            }
            _ => output.push_str(whole.as_str()),
        }
    }

    output.push_str(&body[last_end..]);
    (output, normalized)
}

fn query_block_pattern() -> Regex {
    Regex::new(r"<!--\s*query\s+(\{.*?\})\s*-->").expect("static pattern compiles")
}

fn nav_block_pattern() -> Regex {
    Regex::new(r"<!--\s*nav\s+(\{.*?\})\s*-->").expect("static pattern compiles")
}
