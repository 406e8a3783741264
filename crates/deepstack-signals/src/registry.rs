//! Signature registry: the category → tool → pattern table, compiled once.
//!
//! The default table ships inside the binary (`signatures.json`, embedded with
//! `include_str!`) and can be swapped for an operator-supplied file of the same
//! shape. Patterns are compiled case-insensitively at load time. A pattern that
//! fails to compile is recorded in [`SignatureRegistry::rejected`] and left out
//! of matching; it never aborts loading and never reaches the matcher.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::SignatureError;

/// Raw JSON of the built-in signature table.
const BUILTIN_SIGNATURES: &str = include_str!("signatures.json");

/// Signature categories. Each category is matched independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    MarTech,
    CookieConsent,
    Cdn,
    FeatureFlag,
    ConversionEvent,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::MarTech,
        Category::CookieConsent,
        Category::Cdn,
        Category::FeatureFlag,
        Category::ConversionEvent,
    ];

    /// Key used for this category in the signature JSON.
    pub fn key(self) -> &'static str {
        match self {
            Category::MarTech => "martech",
            Category::CookieConsent => "cookie_consent",
            Category::Cdn => "cdn",
            Category::FeatureFlag => "feature_flag",
            Category::ConversionEvent => "conversion_event",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// One uncompiled rule: a tool and the text patterns that reveal it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRule {
    pub category: Category,
    pub tool_name: String,
    pub patterns: Vec<String>,
}

/// A pattern after compilation, with the scope flags the matcher filters on.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    source: String,
    regex: Regex,
    url_like: bool,
    global_object: bool,
}

impl CompiledPattern {
    fn compile(source: &str) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(source).case_insensitive(true).build()?;
        let lower = source.to_lowercase();
        Ok(Self {
            source: source.to_string(),
            regex,
            url_like: source.contains("\\.") || source.contains('/') || lower.contains("http"),
            global_object: lower.starts_with("window.") || lower.starts_with("window\\."),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Pattern looks like a host or path fragment, so it is meaningful
    /// against request URLs.
    pub fn is_url_like(&self) -> bool {
        self.url_like
    }

    /// Pattern names a `window.*` global.
    pub fn is_global_object(&self) -> bool {
        self.global_object
    }
}

/// A tool with its compiled patterns, in declaration order.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub category: Category,
    pub tool_name: String,
    pub patterns: Vec<CompiledPattern>,
}

/// A pattern that failed to compile at load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedPattern {
    pub category: Category,
    pub tool_name: String,
    pub pattern: String,
    pub reason: String,
}

/// On-disk shape of a signature table.
#[derive(Debug, Default, Deserialize)]
struct SignatureFile {
    #[serde(default)]
    martech: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    cookie_consent: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    cdn: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    feature_flag: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    conversion_event: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    ab_testing_tools: Vec<String>,
    #[serde(default)]
    advanced_martech: BTreeMap<String, String>,
}

impl SignatureFile {
    fn into_rules(self) -> (Vec<SignatureRule>, BTreeSet<String>, BTreeMap<String, String>) {
        let mut rules = Vec::new();
        let tables = [
            (Category::MarTech, self.martech),
            (Category::CookieConsent, self.cookie_consent),
            (Category::Cdn, self.cdn),
            (Category::FeatureFlag, self.feature_flag),
            (Category::ConversionEvent, self.conversion_event),
        ];
        for (category, table) in tables {
            for (tool_name, patterns) in table {
                rules.push(SignatureRule {
                    category,
                    tool_name,
                    patterns,
                });
            }
        }
        (
            rules,
            self.ab_testing_tools.into_iter().collect(),
            self.advanced_martech,
        )
    }
}

/// Immutable, compiled signature table. Build once at startup and share by
/// reference.
#[derive(Debug, Clone, Default)]
pub struct SignatureRegistry {
    rules: Vec<CompiledRule>,
    rejected: Vec<RejectedPattern>,
    ab_testing_tools: BTreeSet<String>,
    advanced_martech: BTreeMap<String, String>,
}

impl SignatureRegistry {
    /// Load the table embedded in the binary.
    pub fn builtin() -> Result<Self, SignatureError> {
        Self::from_json(BUILTIN_SIGNATURES)
    }

    /// Load a table from a JSON file on disk.
    pub fn from_path(path: &Path) -> Result<Self, SignatureError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SignatureError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Parse and compile a JSON signature table.
    pub fn from_json(json: &str) -> Result<Self, SignatureError> {
        let file: SignatureFile = serde_json::from_str(json)?;
        let (rules, ab_testing_tools, advanced_martech) = file.into_rules();
        let mut registry = Self::from_rules(rules);
        registry.ab_testing_tools = ab_testing_tools;
        registry.advanced_martech = advanced_martech;
        Ok(registry)
    }

    /// Compile a list of rules. Invalid patterns are set aside, never fatal.
    pub fn from_rules(rules: Vec<SignatureRule>) -> Self {
        let mut compiled = Vec::with_capacity(rules.len());
        let mut rejected = Vec::new();

        for rule in rules {
            let mut patterns = Vec::with_capacity(rule.patterns.len());
            for source in &rule.patterns {
                match CompiledPattern::compile(source) {
                    Ok(p) => patterns.push(p),
                    Err(e) => {
                        tracing::warn!(
                            category = %rule.category,
                            tool = %rule.tool_name,
                            pattern = %source,
                            "rejecting invalid signature pattern: {e}"
                        );
                        rejected.push(RejectedPattern {
                            category: rule.category,
                            tool_name: rule.tool_name.clone(),
                            pattern: source.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
            compiled.push(CompiledRule {
                category: rule.category,
                tool_name: rule.tool_name,
                patterns,
            });
        }

        Self {
            rules: compiled,
            rejected,
            ab_testing_tools: BTreeSet::new(),
            advanced_martech: BTreeMap::new(),
        }
    }

    /// Replace the experimentation-tool subset.
    pub fn with_ab_testing_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ab_testing_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the advanced-MarTech label table (tool name → report label).
    pub fn with_advanced_martech<I, K, V>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.advanced_martech = labels
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Rules of one category, in load order.
    pub fn rules(&self, category: Category) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter().filter(move |r| r.category == category)
    }

    /// Patterns that failed to compile.
    pub fn rejected(&self) -> &[RejectedPattern] {
        &self.rejected
    }

    /// MarTech tools that are experimentation platforms.
    pub fn ab_testing_tools(&self) -> &BTreeSet<String> {
        &self.ab_testing_tools
    }

    /// Report label for a MarTech tool considered "advanced" (e.g. a CDP).
    pub fn advanced_label(&self, tool_name: &str) -> Option<&str> {
        self.advanced_martech.get(tool_name).map(String::as_str)
    }

    /// Number of compiled tool rules in a category.
    pub fn tool_count(&self, category: Category) -> usize {
        self.rules(category).count()
    }
}
