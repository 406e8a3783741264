//! Human-readable run summary printed after the report is written.

use std::collections::BTreeSet;
use std::fmt::{self, Write};

use deepstack_signals::{
    CollectionReport, CompetitiveStrategic, ConversionFunnel, MarTechDataFoundation,
    OrganicPresence, PushShape, Section, SignalBundle, UrlResult, UxPerformance,
};

const DESCRIPTION_PREVIEW: usize = 100;

fn list(items: &BTreeSet<String>) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
    }
}

fn or_missing(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("not found")
}

fn preview(text: &str) -> String {
    if text.chars().count() > DESCRIPTION_PREVIEW {
        let head: String = text.chars().take(DESCRIPTION_PREVIEW).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

/// Render one section, or its error marker.
fn section<T>(
    out: &mut String,
    heading: &str,
    section: &Section<T>,
    body: impl FnOnce(&mut String, &T) -> fmt::Result,
) -> fmt::Result {
    writeln!(out, "  {heading}:")?;
    match section {
        Section::Ok(value) => body(out, value),
        Section::Failed { error } => writeln!(out, "    Error: {error}"),
    }
}

fn martech(out: &mut String, m: &MarTechDataFoundation) -> fmt::Result {
    writeln!(out, "    MarTech identified: {}", list(&m.martech_identified))?;
    let dl = &m.data_layer_summary;
    writeln!(out, "    dataLayer exists: {}", dl.exists)?;
    if let Some(error) = &dl.error {
        writeln!(out, "    dataLayer error: {error}")?;
    } else if dl.exists {
        if let Some(total) = dl.total_pushes {
            writeln!(out, "    dataLayer pushes: {total}")?;
        }
        for push in dl.sample_pushes_structure.iter().flatten() {
            match push {
                PushShape::Keys { push, keys } => {
                    writeln!(out, "      push {push}: keys [{}]", keys.join(", "))?
                }
                PushShape::Primitive { push, type_name } => {
                    writeln!(out, "      push {push}: {type_name}")?
                }
            }
        }
    }
    writeln!(
        out,
        "    Cookie consent tools: {}",
        list(&m.cookie_consent_tools_identified)
    )
}

fn organic(out: &mut String, o: &OrganicPresence) -> fmt::Result {
    writeln!(out, "    Meta title: {}", or_missing(&o.meta_title))?;
    let description = o.meta_description.as_deref().map(preview);
    writeln!(out, "    Meta description: {}", or_missing(&description))?;
    writeln!(out, "    Meta keywords: {}", or_missing(&o.meta_keywords))?;
    writeln!(out, "    Canonical URL: {}", or_missing(&o.canonical_url))?;
    writeln!(out, "    Robots meta: {}", or_missing(&o.robots_meta))?;
    writeln!(out, "    H1 tags: {:?}", o.h1_tags)?;
    writeln!(out, "    H2 tags: {}", o.h2_tags.len())?;
    writeln!(out, "    JSON-LD scripts: {}", o.json_ld_scripts.len())?;
    writeln!(out, "    Hreflang tags: {}", o.hreflang_tags.len())
}

fn ux(out: &mut String, u: &UxPerformance) -> fmt::Result {
    writeln!(out, "    Viewport: {}", or_missing(&u.viewport_meta_content))?;
    writeln!(out, "    CDN domains: {}", list(&u.identified_cdn_domains))?;
    writeln!(
        out,
        "    Lazy-loaded images: {} of {} sampled",
        u.lazy_loading_images.with_lazy_loading, u.lazy_loading_images.sampled_images
    )?;
    writeln!(
        out,
        "    Images with alt: {} of {} sampled",
        u.alt_text_images.with_alt_text, u.alt_text_images.sampled_images
    )
}

fn conversion(out: &mut String, c: &ConversionFunnel) -> fmt::Result {
    writeln!(
        out,
        "    Conversion events: {}",
        list(&c.identified_conversion_events)
    )?;
    let in_frames = c.forms_analysis.iter().filter(|f| f.found_in_iframe).count();
    writeln!(
        out,
        "    Forms: {} ({in_frames} in iframes)",
        c.forms_analysis.len()
    )?;
    if let Some(error) = &c.forms_analysis_error {
        writeln!(out, "    Form analysis error: {error}")?;
    }
    Ok(())
}

fn competitive(out: &mut String, c: &CompetitiveStrategic) -> fmt::Result {
    writeln!(out, "    A/B testing tools: {}", list(&c.ab_testing_tools_present))?;
    writeln!(
        out,
        "    Feature flag systems: {}",
        list(&c.feature_flags_systems_identified)
    )?;
    let advanced = if c.advanced_martech_indicators.is_empty() {
        "none".to_string()
    } else {
        c.advanced_martech_indicators.join(", ")
    };
    writeln!(out, "    Advanced MarTech: {advanced}")
}

fn bundle(out: &mut String, data: &SignalBundle) -> fmt::Result {
    section(
        out,
        "Marketing technology & data foundation",
        &data.marketing_technology_data_foundation,
        martech,
    )?;
    section(
        out,
        "Organic presence & content signals",
        &data.organic_presence_content_signals,
        organic,
    )?;
    section(
        out,
        "User experience & performance clues",
        &data.user_experience_performance_clues,
        ux,
    )?;
    section(
        out,
        "Conversion funnel",
        &data.conversion_funnel_effectiveness,
        conversion,
    )?;
    section(
        out,
        "Competitive posture & strategic tests",
        &data.competitive_posture_strategic_tests,
        competitive,
    )
}

fn url_result(out: &mut String, result: &UrlResult) -> fmt::Result {
    writeln!(out, "\n{}", result.url)?;
    if let Some(error) = &result.error_details {
        return writeln!(out, "  Error: {error}");
    }
    writeln!(out, "  Page title: {}", or_missing(&result.page_title))?;
    match &result.data {
        Some(data) => bundle(out, data),
        None => writeln!(out, "  No data collected"),
    }
}

/// Render the whole report summary.
pub fn render(report: &CollectionReport) -> String {
    let mut out = String::new();
    let meta = &report.collection_metadata;
    // Writing into a String cannot fail.
    let _ = writeln!(
        out,
        "Processed {} URL(s): {} succeeded, {} failed",
        meta.total_urls_processed, meta.total_urls_successful, meta.total_urls_failed
    );
    for result in report.results() {
        let _ = url_result(&mut out, result);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use deepstack_signals::{AltTextSample, DataLayerSummary, LazyLoadingSample};

    fn sample_bundle() -> SignalBundle {
        SignalBundle {
            marketing_technology_data_foundation: Section::Ok(MarTechDataFoundation {
                martech_identified: ["GoogleTagManager".to_string()].into(),
                data_layer_summary: DataLayerSummary {
                    exists: true,
                    total_pushes: Some(3),
                    sample_pushes_structure: Some(vec![PushShape::Keys {
                        push: 1,
                        keys: vec!["event".into()],
                    }]),
                    error: None,
                },
                cookie_consent_tools_identified: BTreeSet::new(),
            }),
            organic_presence_content_signals: Section::Ok(OrganicPresence {
                meta_title: Some("Acme".into()),
                meta_description: Some("x".repeat(150)),
                meta_keywords: None,
                canonical_url: None,
                h1_tags: vec!["Widgets".into()],
                h2_tags: Vec::new(),
                json_ld_scripts: Vec::new(),
                robots_meta: None,
                hreflang_tags: Vec::new(),
            }),
            user_experience_performance_clues: Section::Ok(UxPerformance {
                viewport_meta_content: None,
                identified_cdn_domains: BTreeSet::new(),
                lazy_loading_images: LazyLoadingSample {
                    sampled_images: 4,
                    with_lazy_loading: 1,
                },
                alt_text_images: AltTextSample {
                    sampled_images: 4,
                    with_alt_text: 2,
                },
            }),
            conversion_funnel_effectiveness: Section::Failed {
                error: "runtime evaluation failed: gone".into(),
            },
            competitive_posture_strategic_tests: Section::Ok(CompetitiveStrategic::default()),
        }
    }

    #[test]
    fn test_render_success_and_failure() {
        let report = CollectionReport::new(
            "1.0.0",
            Utc::now(),
            vec![
                UrlResult::success("https://acme.test", Utc::now(), Some("Acme".into()), sample_bundle()),
                UrlResult::failure("https://down.test", Utc::now(), "navigation failed: refused"),
            ],
        );
        let text = render(&report);
        assert!(text.starts_with("Processed 2 URL(s): 1 succeeded, 1 failed"));
        assert!(text.contains("    MarTech identified: GoogleTagManager"));
        assert!(text.contains("      push 1: keys [event]"));
        assert!(text.contains(&format!("    Meta description: {}...", "x".repeat(100))));
        assert!(text.contains("  Conversion funnel:\n    Error: runtime evaluation failed: gone"));
        assert!(text.contains("    Feature flag systems: none"));
        assert!(text.contains("https://down.test\n  Error: navigation failed: refused"));
    }
}
