//! Pattern matcher: existence-only signature matching over text blobs.
//!
//! A blob is any string worth scanning: a script `src` plus its inline body,
//! a request URL, the full page HTML. Matching is case-insensitive (patterns
//! are compiled that way) and short-circuits per tool on the first pattern
//! that hits. Results come back as a `BTreeSet` so reports are sorted.

use std::collections::BTreeSet;

use crate::registry::{Category, CompiledPattern, SignatureRegistry};

/// Which patterns of a rule take part in a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternScope {
    /// Every pattern.
    All,
    /// Only patterns shaped like hosts or paths. Used for request URLs.
    UrlLike,
    /// Only `window.*` global patterns. Used against raw HTML as a cheap
    /// proxy for inline global declarations.
    GlobalObject,
}

impl PatternScope {
    fn admits(self, pattern: &CompiledPattern) -> bool {
        match self {
            PatternScope::All => true,
            PatternScope::UrlLike => pattern.is_url_like(),
            PatternScope::GlobalObject => pattern.is_global_object(),
        }
    }
}

/// Borrowing view over a registry that runs matches.
#[derive(Debug, Clone, Copy)]
pub struct Matcher<'r> {
    registry: &'r SignatureRegistry,
}

impl<'r> Matcher<'r> {
    pub fn new(registry: &'r SignatureRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'r SignatureRegistry {
        self.registry
    }

    /// Tool names of `category` with at least one pattern matching `text`.
    pub fn match_text(&self, category: Category, text: &str, scope: PatternScope) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        self.match_into(category, text, scope, &mut found);
        found
    }

    /// Same as [`Matcher::match_text`], accumulating into `found`. Tools already
    /// present are not re-tested.
    pub fn match_into(
        &self,
        category: Category,
        text: &str,
        scope: PatternScope,
        found: &mut BTreeSet<String>,
    ) {
        if text.trim().is_empty() {
            return;
        }
        for rule in self.registry.rules(category) {
            if found.contains(&rule.tool_name) {
                continue;
            }
            let hit = rule
                .patterns
                .iter()
                .filter(|p| scope.admits(p))
                .any(|p| p.regex().is_match(text));
            if hit {
                tracing::trace!(category = %category, tool = %rule.tool_name, "signature matched");
                found.insert(rule.tool_name.clone());
            }
        }
    }

    /// Match every URL of a request log using URL-shaped patterns only.
    pub fn match_urls<'a, I>(&self, category: Category, urls: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut found = BTreeSet::new();
        for url in urls {
            self.match_into(category, url, PatternScope::UrlLike, &mut found);
        }
        found
    }

    /// Whether any rule of `category` matches `text`.
    pub fn matches_any(&self, category: Category, text: &str) -> bool {
        self.registry
            .rules(category)
            .flat_map(|r| r.patterns.iter())
            .any(|p| p.regex().is_match(text))
    }

    /// Labels for every pattern hit. When the pattern captures a first group
    /// the label is `"<tool>: <group>"`, otherwise just the tool name.
    pub fn capture_labels(&self, category: Category, text: &str) -> BTreeSet<String> {
        let mut labels = BTreeSet::new();
        for rule in self.registry.rules(category) {
            for pattern in &rule.patterns {
                let Some(caps) = pattern.regex().captures(text) else {
                    continue;
                };
                match caps.get(1).map(|m| m.as_str()).filter(|s| !s.is_empty()) {
                    Some(group) => labels.insert(format!("{}: {group}", rule.tool_name)),
                    None => labels.insert(rule.tool_name.clone()),
                };
            }
        }
        labels
    }
}
