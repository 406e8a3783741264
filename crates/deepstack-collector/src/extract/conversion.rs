//! Conversion funnel: tracking calls in inline scripts and lead-capture forms.

use std::collections::BTreeSet;

use deepstack_signals::{Category, ConversionFunnel, DomSnapshot, Matcher};

use crate::error::ExtractError;
use crate::extract::forms;
use crate::navigator::PageSession;

/// Conversion calls found in inline scripts, labelled `"<tool>: <event>"`
/// when the signature captures the event name.
pub fn conversion_events(dom: &DomSnapshot, matcher: &Matcher<'_>) -> BTreeSet<String> {
    dom.inline_scripts()
        .flat_map(|body| matcher.capture_labels(Category::ConversionEvent, body))
        .collect()
}

/// A failed main-document form walk is recorded in `forms_analysis_error`;
/// frames are still walked and conversion events still reported.
pub async fn extract(
    session: &PageSession,
    matcher: &Matcher<'_>,
) -> Result<ConversionFunnel, ExtractError> {
    let identified_conversion_events = conversion_events(&session.dom, matcher);

    let (mut forms_analysis, forms_analysis_error) = match forms::main_document_forms(session).await {
        Ok(forms) => (forms, None),
        Err(e) => {
            tracing::warn!(url = %session.target, "form analysis failed: {e}");
            (Vec::new(), Some(format!("Form analysis failed: {e}")))
        }
    };
    forms_analysis.extend(forms::frame_forms(session).await);

    tracing::debug!(
        events = identified_conversion_events.len(),
        forms = forms_analysis.len(),
        "conversion funnel extracted"
    );
    Ok(ConversionFunnel {
        identified_conversion_events,
        forms_analysis,
        forms_analysis_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::forms::FORM_WALK_SCRIPT;
    use crate::extract::test_support::session;
    use crate::renderer::scripted::{ScriptedFrame, ScriptedPage};
    use deepstack_signals::SignatureRegistry;
    use serde_json::json;

    const PAGE: &str = r#"<html><head><title>Acme</title>
        <script>fbq('track', 'Lead');</script>
        <script>gtag('event', 'sign_up', {method: 'email'});</script>
        <script>twq('event', 'tw-abc12-def34', {});</script>
        <script type="application/ld+json">{"note": "fbq('track', 'Purchase')"}</script>
        <script src="https://cdn.test/fbq.js"></script>
        </head><body></body></html>"#;

    #[test]
    fn test_event_labels() {
        let registry = SignatureRegistry::builtin().unwrap();
        let events = conversion_events(&DomSnapshot::parse(PAGE), &Matcher::new(&registry));
        let events: Vec<_> = events.into_iter().collect();
        assert_eq!(
            events,
            vec![
                "Google_Conversion: sign_up",
                "MetaPixel_Conversion: Lead",
                "Twitter_Conversion",
            ]
        );
    }

    #[tokio::test]
    async fn test_forms_from_document_and_frames() {
        let registry = SignatureRegistry::builtin().unwrap();
        let form = json!({
            "form_id": null,
            "form_name": null,
            "form_classes": [],
            "form_action": null,
            "form_method": "GET",
            "handler_attributes": {},
            "input_fields_summary": []
        });
        let page = ScriptedPage::new(PAGE)
            .with_script(FORM_WALK_SCRIPT, json!([form.clone()]))
            .with_frame(
                ScriptedFrame::new("f1", "https://forms.test/", None)
                    .with_script(FORM_WALK_SCRIPT, json!([form])),
            );
        let session = session(page).await;
        let out = extract(&session, &Matcher::new(&registry)).await.unwrap();
        assert_eq!(out.forms_analysis.len(), 2);
        assert!(!out.forms_analysis[0].found_in_iframe);
        assert!(out.forms_analysis[1].found_in_iframe);
        assert!(out.forms_analysis[1].iframe_name.is_none());
    }

    #[tokio::test]
    async fn test_main_document_failure_keeps_events_and_frames() {
        let registry = SignatureRegistry::builtin().unwrap();
        let frame_form = json!({
            "form_id": "lead",
            "form_name": null,
            "form_classes": [],
            "form_action": "https://forms.test/submit",
            "form_method": "POST",
            "handler_attributes": {},
            "input_fields_summary": []
        });
        let page = ScriptedPage::new(PAGE)
            .with_script_error(FORM_WALK_SCRIPT, "context destroyed")
            .with_frame(
                ScriptedFrame::new("f1", "https://forms.test/embed", Some("lead-frame"))
                    .with_script(FORM_WALK_SCRIPT, json!([frame_form])),
            );
        let session = session(page).await;
        let out = extract(&session, &Matcher::new(&registry)).await.unwrap();
        assert!(out.identified_conversion_events.contains("MetaPixel_Conversion: Lead"));
        assert_eq!(out.forms_analysis.len(), 1);
        assert!(out.forms_analysis[0].found_in_iframe);
        let error = out.forms_analysis_error.as_deref().unwrap();
        assert!(error.contains("context destroyed"));
    }

    #[tokio::test]
    async fn test_shadowed_form_keeps_section() {
        let registry = SignatureRegistry::builtin().unwrap();
        let shadowed = json!({
            "form_id": {},
            "form_name": null,
            "form_classes": [],
            "form_action": {},
            "form_method": "POST",
            "handler_attributes": {},
            "input_fields_summary": [
                {"name": "action", "type": "hidden", "id": null, "value": "contact_submit", "placeholder": null}
            ]
        });
        let page = ScriptedPage::new(PAGE).with_script(FORM_WALK_SCRIPT, json!([shadowed]));
        let session = session(page).await;
        let out = extract(&session, &Matcher::new(&registry)).await.unwrap();
        assert!(out.identified_conversion_events.contains("MetaPixel_Conversion: Lead"));
        assert!(out.forms_analysis.is_empty());
        assert!(out.forms_analysis_error.is_none());
    }

    #[tokio::test]
    async fn test_no_forms() {
        let registry = SignatureRegistry::builtin().unwrap();
        let session = session(ScriptedPage::new(PAGE)).await;
        let out = extract(&session, &Matcher::new(&registry)).await.unwrap();
        assert!(out.forms_analysis.is_empty());
        assert!(out.forms_analysis_error.is_none());
    }
}
