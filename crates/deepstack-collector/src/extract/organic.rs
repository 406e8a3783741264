//! Organic presence and content signals, read from static markup.

use deepstack_signals::{DomSnapshot, HreflangTag, OrganicPresence};
use serde_json::{json, Value};

use crate::error::ExtractError;

/// Parse one JSON-LD block, keeping unparseable ones as an error entry.
pub fn parse_json_ld(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| {
        json!({
            "error": "Invalid JSON",
            "content": raw.trim(),
        })
    })
}

pub fn extract(dom: &DomSnapshot) -> Result<OrganicPresence, ExtractError> {
    let canonical_url = dom
        .links
        .iter()
        .find(|l| l.has_rel("canonical"))
        .and_then(|l| l.href.clone());

    let hreflang_tags = dom
        .links
        .iter()
        .filter(|l| l.has_rel("alternate"))
        .filter_map(|l| match (&l.hreflang, &l.href) {
            (Some(lang), Some(href)) if !href.is_empty() => Some(HreflangTag {
                lang: lang.clone(),
                href: href.clone(),
            }),
            _ => None,
        })
        .collect();

    Ok(OrganicPresence {
        meta_title: dom.title.clone(),
        meta_description: dom.meta("description"),
        meta_keywords: dom.meta("keywords"),
        canonical_url,
        h1_tags: dom.h1.clone(),
        h2_tags: dom.h2.clone(),
        json_ld_scripts: dom.json_ld_blocks().map(parse_json_ld).collect(),
        robots_meta: dom.meta("robots"),
        hreflang_tags,
    })
}
