//! Competitive posture: experimentation, feature flags, advanced MarTech.

use std::collections::BTreeSet;

use deepstack_signals::{Category, CompetitiveStrategic, Matcher, PatternScope};

use crate::error::ExtractError;
use crate::navigator::PageSession;

/// Feature-flag systems seen in scripts, request URLs, or `window.*` globals
/// in the markup.
pub fn feature_flag_systems(session: &PageSession, matcher: &Matcher<'_>) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    for script in &session.dom.scripts {
        let blob = script.blob().to_lowercase();
        if blob.trim().is_empty() {
            continue;
        }
        matcher.match_into(Category::FeatureFlag, &blob, PatternScope::All, &mut found);
    }

    let requests: Vec<String> = session.requests.iter().map(|u| u.to_lowercase()).collect();
    found.extend(matcher.match_urls(Category::FeatureFlag, requests.iter().map(String::as_str)));

    matcher.match_into(
        Category::FeatureFlag,
        &session.html.to_lowercase(),
        PatternScope::GlobalObject,
        &mut found,
    );
    found
}

pub fn extract(
    session: &PageSession,
    matcher: &Matcher<'_>,
    known_martech: &BTreeSet<String>,
) -> Result<CompetitiveStrategic, ExtractError> {
    let registry = matcher.registry();
    let ab_testing_tools_present = known_martech
        .intersection(registry.ab_testing_tools())
        .cloned()
        .collect();
    let advanced_martech_indicators = known_martech
        .iter()
        .filter_map(|tool| registry.advanced_label(tool))
        .map(str::to_string)
        .collect();

    Ok(CompetitiveStrategic {
        ab_testing_tools_present,
        feature_flags_systems_identified: feature_flag_systems(session, matcher),
        advanced_martech_indicators,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::test_support::session;
    use crate::renderer::scripted::ScriptedPage;
    use deepstack_signals::SignatureRegistry;

    fn tools(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_ab_and_advanced_from_martech() {
        let registry = SignatureRegistry::builtin().unwrap();
        let session = session(ScriptedPage::new("<html><body></body></html>")).await;
        let out = extract(
            &session,
            &Matcher::new(&registry),
            &tools(&["GoogleAnalytics", "Optimizely", "Segment"]),
        )
        .unwrap();
        assert_eq!(out.ab_testing_tools_present, tools(&["Optimizely"]));
        assert_eq!(out.advanced_martech_indicators, vec!["Segment (CDP)"]);
        assert!(out.feature_flags_systems_identified.is_empty());
    }

    #[tokio::test]
    async fn test_feature_flags_from_each_source() {
        let registry = SignatureRegistry::builtin().unwrap();
        let page = ScriptedPage::new(
            r#"<html><head><title>Acme</title>
            <script src="https://cdn.test/sdk.js"></script>
            <script>const client = LDClient.initialize('key');</script>
            </head><body><div data-x="window.Flagsmith"></div></body></html>"#,
        )
        .with_requests(["https://CDN.SPLIT.IO/sdk/splitio.js"]);
        let session = session(page).await;
        let out = extract(&session, &Matcher::new(&registry), &BTreeSet::new()).unwrap();
        assert_eq!(
            out.feature_flags_systems_identified,
            tools(&["Flagsmith", "LaunchDarkly", "SplitIO"])
        );
        assert!(out.ab_testing_tools_present.is_empty());
    }

    #[tokio::test]
    async fn test_failed_martech_contributes_nothing() {
        let registry = SignatureRegistry::builtin().unwrap();
        let session = session(ScriptedPage::new("<html><body></body></html>")).await;
        let out = extract(&session, &Matcher::new(&registry), &BTreeSet::new()).unwrap();
        assert!(out.ab_testing_tools_present.is_empty());
        assert!(out.advanced_martech_indicators.is_empty());
    }
}
