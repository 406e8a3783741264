//! Marketing technology and data foundation.

use std::collections::BTreeSet;

use deepstack_signals::{
    Category, DataLayerSummary, MarTechDataFoundation, Matcher, PatternScope, PushShape,
};
use serde::Deserialize;

use crate::error::ExtractError;
use crate::navigator::PageSession;

/// Summarize `window.dataLayer` inside the page. Only push shapes leave the
/// browser, never payload values. Any non-array object, including the
/// `arguments` object a `gtag()` call pushes, reports its sorted keys.
pub fn datalayer_script(sample_limit: usize) -> String {
    format!(
        r#"(() => {{
            const dl = window.dataLayer;
            if (!Array.isArray(dl) || dl.length === 0) {{
                return {{ exists: false, total_pushes: 0, sample: [] }};
            }}
            const typeName = (v) => {{
                if (v === null) return 'null';
                if (Array.isArray(v)) return 'array';
                return typeof v;
            }};
            const sample = dl.slice(0, {sample_limit}).map((item, i) => {{
                const type = typeName(item);
                if (type === 'object') {{
                    return {{ push: i + 1, keys: Object.keys(item).sort() }};
                }}
                return {{ push: i + 1, type }};
            }});
            return {{ exists: true, total_pushes: dl.length, sample }};
        }})()"#
    )
}

#[derive(Debug, Deserialize)]
struct RawDataLayer {
    exists: bool,
    #[serde(default)]
    total_pushes: u64,
    #[serde(default)]
    sample: Vec<PushShape>,
}

/// Summarize the page's `dataLayer`. Evaluation failures are reported inside
/// the summary rather than failing the section.
pub async fn summarize_datalayer(session: &PageSession, sample_limit: usize) -> DataLayerSummary {
    let raw = match session.context().execute_js(&datalayer_script(sample_limit)).await {
        Ok(v) if v.is_null() => {
            return DataLayerSummary::default();
        }
        Ok(v) => v,
        Err(e) => {
            return DataLayerSummary {
                error: Some(format!("Could not evaluate dataLayer: {e:#}")),
                ..Default::default()
            }
        }
    };
    match serde_json::from_value::<RawDataLayer>(raw) {
        Ok(dl) if dl.exists => DataLayerSummary {
            exists: true,
            total_pushes: Some(dl.total_pushes),
            sample_pushes_structure: Some(dl.sample),
            error: None,
        },
        Ok(_) => DataLayerSummary::default(),
        Err(e) => DataLayerSummary {
            error: Some(format!("Unexpected dataLayer summary: {e}")),
            ..Default::default()
        },
    }
}

/// MarTech tools seen in script tags or request URLs.
pub fn identify_martech(session: &PageSession, matcher: &Matcher<'_>) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    for script in &session.dom.scripts {
        matcher.match_into(Category::MarTech, &script.blob(), PatternScope::All, &mut found);
    }
    found.extend(matcher.match_urls(Category::MarTech, session.requests.iter().map(String::as_str)));
    found
}

/// Consent managers seen in scripts, request URLs, or anywhere in the markup.
pub fn identify_consent_tools(session: &PageSession, matcher: &Matcher<'_>) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    for script in &session.dom.scripts {
        matcher.match_into(Category::CookieConsent, &script.blob(), PatternScope::All, &mut found);
    }
    found.extend(matcher.match_urls(
        Category::CookieConsent,
        session.requests.iter().map(String::as_str),
    ));
    // Banners are often injected without a script tag of their own.
    matcher.match_into(Category::CookieConsent, &session.html, PatternScope::All, &mut found);
    found
}

pub async fn extract(
    session: &PageSession,
    matcher: &Matcher<'_>,
    sample_limit: usize,
) -> Result<MarTechDataFoundation, ExtractError> {
    let martech_identified = identify_martech(session, matcher);
    let data_layer_summary = summarize_datalayer(session, sample_limit).await;
    let cookie_consent_tools_identified = identify_consent_tools(session, matcher);
    tracing::debug!(
        tools = martech_identified.len(),
        consent = cookie_consent_tools_identified.len(),
        datalayer = data_layer_summary.exists,
        "martech extracted"
    );
    Ok(MarTechDataFoundation {
        martech_identified,
        data_layer_summary,
        cookie_consent_tools_identified,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::test_support::session;
    use crate::renderer::scripted::ScriptedPage;
    use deepstack_signals::SignatureRegistry;
    use serde_json::json;

    const PAGE: &str = r#"<html><head><title>Acme</title>
        <script src="https://www.googletagmanager.com/gtm.js?id=GTM-ABC1234"></script>
        <script>window.dataLayer = window.dataLayer || [];</script>
        </head><body><div id="onetrust-banner-sdk"></div></body></html>"#;

    #[tokio::test]
    async fn test_scripts_requests_and_markup() {
        let registry = SignatureRegistry::builtin().unwrap();
        let matcher = Matcher::new(&registry);
        let page = ScriptedPage::new(PAGE).with_requests([
            "https://connect.facebook.net/en_US/fbevents.js",
            "https://consent.cookiebot.com/uc.js",
        ]);
        let session = session(page).await;
        let out = extract(&session, &matcher, 5).await.unwrap();
        assert!(out.martech_identified.contains("GoogleTagManager"));
        assert!(out.martech_identified.contains("MetaPixel"));
        assert!(out.cookie_consent_tools_identified.contains("OneTrust"));
        assert!(out.cookie_consent_tools_identified.contains("Cookiebot"));
        assert!(!out.data_layer_summary.exists);
    }

    #[tokio::test]
    async fn test_datalayer_summary_from_runtime() {
        let registry = SignatureRegistry::builtin().unwrap();
        let matcher = Matcher::new(&registry);
        let page = ScriptedPage::new(PAGE).with_script(
            &datalayer_script(5),
            json!({
                "exists": true,
                "total_pushes": 7,
                "sample": [
                    {"push": 1, "keys": ["event", "gtm.start"]},
                    {"push": 2, "keys": ["0", "1", "2"]},
                    {"push": 3, "type": "function"}
                ]
            }),
        );
        let session = session(page).await;
        let out = extract(&session, &matcher, 5).await.unwrap();
        let dl = out.data_layer_summary;
        assert!(dl.exists);
        assert_eq!(dl.total_pushes, Some(7));
        assert_eq!(dl.sample_pushes_structure.unwrap().len(), 3);
        assert!(dl.error.is_none());
    }

    #[test]
    fn test_gtag_arguments_push_is_keyed() {
        let script = datalayer_script(5);
        assert!(!script.contains("'arguments'"));
        assert!(script.contains("if (type === 'object')"));
        assert!(script.contains("Object.keys(item).sort()"));
    }

    #[tokio::test]
    async fn test_datalayer_error_stays_inside_summary() {
        let registry = SignatureRegistry::builtin().unwrap();
        let matcher = Matcher::new(&registry);
        let page = ScriptedPage::new(PAGE)
            .with_script_error(&datalayer_script(5), "Execution context was destroyed");
        let session = session(page).await;
        let out = extract(&session, &matcher, 5).await.unwrap();
        let error = out.data_layer_summary.error.unwrap();
        assert!(error.contains("Execution context was destroyed"));
        assert!(out.martech_identified.contains("GoogleTagManager"));
    }
}
