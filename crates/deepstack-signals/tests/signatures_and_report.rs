//! Integration tests for deepstack-signals: operator signature tables and the
//! persisted report shape.

use chrono::{TimeZone, Utc};
use serde_json::Value;

use deepstack_signals::*;

// ─────────────────────── helpers ───────────────────────

fn write_table(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("signatures.json");
    std::fs::write(&path, body).unwrap();
    path
}

// ─────────────────────── signature tables ───────────────────────

#[test]
fn operator_table_replaces_builtin() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_table(
        &dir,
        r#"{
            "martech": {"Acme Pixel": ["pixel\\.acme\\.test", "AcmePixel\\("]},
            "feature_flag": {"Broken": ["[unterminated"]}
        }"#,
    );
    let registry = SignatureRegistry::from_path(&path).unwrap();
    assert_eq!(registry.tool_count(Category::MarTech), 1);
    assert_eq!(registry.rejected().len(), 1);
    assert_eq!(registry.rejected()[0].tool_name, "Broken");

    let matcher = Matcher::new(&registry);
    let found = matcher.match_text(
        Category::MarTech,
        "<script>acmepixel('init')</script>",
        PatternScope::All,
    );
    assert!(found.contains("Acme Pixel"));
    // A rejected pattern never matches anything.
    assert!(matcher
        .match_text(Category::FeatureFlag, "[unterminated", PatternScope::All)
        .is_empty());
}

#[test]
fn malformed_table_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_table(&dir, r#"{"martech": ["not", "a", "map"]}"#);
    assert!(matches!(
        SignatureRegistry::from_path(&path),
        Err(SignatureError::Parse(_))
    ));
}

// ─────────────────────── report shape ───────────────────────

#[test]
fn report_json_uses_wire_field_names() {
    let ts = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let mut martech = MarTechDataFoundation::default();
    martech.martech_identified.insert("Segment".into());
    martech.martech_identified.insert("GoogleTagManager".into());

    let bundle = SignalBundle {
        marketing_technology_data_foundation: Section::Ok(martech),
        organic_presence_content_signals: Section::Ok(OrganicPresence::default()),
        user_experience_performance_clues: Section::Ok(UxPerformance::default()),
        conversion_funnel_effectiveness: Section::Ok(ConversionFunnel::default()),
        competitive_posture_strategic_tests: Section::Failed {
            error: "runtime evaluation failed".into(),
        },
    };
    let report = CollectionReport::new(
        "1.0.0",
        ts,
        vec![
            UrlResult::success("https://acme.test", ts, Some("Acme".into()), bundle),
            UrlResult::failure("https://down.test", ts, "net::ERR_CONNECTION_REFUSED"),
        ],
    );

    let v: Value = serde_json::to_value(&report).unwrap();
    let meta = &v["collection_metadata"];
    assert_eq!(meta["collector_version"], "1.0.0");
    assert_eq!(meta["collection_timestamp_utc"], "2026-03-01T12:00:00.000000+00:00");
    assert_eq!(meta["total_urls_processed"], 2);
    assert_eq!(meta["total_urls_successful"], 1);
    assert_eq!(meta["total_urls_failed"], 1);

    let ok = &v["url_analysis_results"][0];
    assert_eq!(ok["fetch_status"], "success");
    assert!(ok["error_details"].is_null());
    assert_eq!(
        ok["data"]["marketing_technology_data_foundation"]["martech_identified"],
        serde_json::json!(["GoogleTagManager", "Segment"])
    );
    assert_eq!(
        ok["data"]["competitive_posture_strategic_tests"]["error"],
        "runtime evaluation failed"
    );

    let failed = &v["url_analysis_results"][1];
    assert_eq!(failed["fetch_status"], "error");
    assert!(failed["data"].is_null());

    let back: CollectionReport = serde_json::from_value(v).unwrap();
    assert_eq!(back, report);
}

#[test]
fn every_result_has_exactly_one_of_data_or_error() {
    let ts = Utc::now();
    let results = [
        UrlResult::failure("https://a.test", ts, "timeout"),
        UrlResult::success(
            "https://b.test",
            ts,
            None,
            SignalBundle {
                marketing_technology_data_foundation: Section::Ok(Default::default()),
                organic_presence_content_signals: Section::Ok(Default::default()),
                user_experience_performance_clues: Section::Ok(Default::default()),
                conversion_funnel_effectiveness: Section::Ok(Default::default()),
                competitive_posture_strategic_tests: Section::Ok(Default::default()),
            },
        ),
    ];
    for r in &results {
        assert_ne!(r.data.is_some(), r.error_details.is_some());
        assert_eq!(r.is_success(), r.data.is_some());
    }
}
