//! Collection report data model.
//!
//! This is the wire contract downstream consumers (report orchestration,
//! dashboards) read, so field names are fixed by `serde` attributes and
//! absent optionals serialize as `null` rather than disappearing.

use std::collections::BTreeSet;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One extractor's output, or the error that replaced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Section<T> {
    Failed { error: String },
    Ok(T),
}

impl<T> Section<T> {
    pub fn as_ok(&self) -> Option<&T> {
        match self {
            Section::Ok(v) => Some(v),
            Section::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Section::Ok(_) => None,
            Section::Failed { error } => Some(error),
        }
    }
}

// ── MarTech & data foundation ───────────────────────────────────────────────

/// Shape of one sampled `dataLayer` push. Payload values are never kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PushShape {
    Keys { push: u32, keys: Vec<String> },
    Primitive {
        push: u32,
        #[serde(rename = "type")]
        type_name: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataLayerSummary {
    pub exists: bool,
    pub total_pushes: Option<u64>,
    pub sample_pushes_structure: Option<Vec<PushShape>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarTechDataFoundation {
    pub martech_identified: BTreeSet<String>,
    #[serde(rename = "dataLayer_summary")]
    pub data_layer_summary: DataLayerSummary,
    pub cookie_consent_tools_identified: BTreeSet<String>,
}

// ── Organic presence ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HreflangTag {
    pub lang: String,
    pub href: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganicPresence {
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
    pub canonical_url: Option<String>,
    pub h1_tags: Vec<String>,
    pub h2_tags: Vec<String>,
    /// Parsed JSON-LD blocks; unparseable blocks appear as
    /// `{"error": "Invalid JSON", "content": <raw>}`.
    pub json_ld_scripts: Vec<Value>,
    pub robots_meta: Option<String>,
    pub hreflang_tags: Vec<HreflangTag>,
}

// ── UX & performance ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LazyLoadingSample {
    pub sampled_images: usize,
    pub with_lazy_loading: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AltTextSample {
    pub sampled_images: usize,
    pub with_alt_text: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UxPerformance {
    pub viewport_meta_content: Option<String>,
    pub identified_cdn_domains: BTreeSet<String>,
    pub lazy_loading_images: LazyLoadingSample,
    pub alt_text_images: AltTextSample,
}

// ── Conversion funnel ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netlify_form: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hubspot_form_indicator: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marketo_form_id: Option<String>,
}

/// One classified form control.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputField {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub field_type: String,
    pub id: Option<String>,
    pub value: Option<String>,
    pub placeholder: Option<String>,
    /// Visible label of buttons and submit controls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// A form found in the main document or in a child frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormDescriptor {
    pub form_id: Option<String>,
    pub form_name: Option<String>,
    #[serde(default)]
    pub form_classes: Vec<String>,
    /// Absolute URL as resolved by the browser.
    pub form_action: Option<String>,
    pub form_method: String,
    #[serde(default)]
    pub handler_attributes: HandlerAttributes,
    #[serde(default)]
    pub input_fields_summary: Vec<InputField>,
    #[serde(default)]
    pub found_in_iframe: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iframe_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iframe_name: Option<String>,
}

impl FormDescriptor {
    /// Tag a descriptor with the frame it came from.
    pub fn in_frame(mut self, url: &str, name: Option<&str>) -> Self {
        self.found_in_iframe = true;
        self.iframe_url = Some(url.to_string());
        self.iframe_name = name.filter(|n| !n.is_empty()).map(str::to_string);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionFunnel {
    pub identified_conversion_events: BTreeSet<String>,
    pub forms_analysis: Vec<FormDescriptor>,
    /// Set when the main-document form walk failed; frame forms and
    /// conversion events are still reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forms_analysis_error: Option<String>,
}

// ── Competitive & strategic ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitiveStrategic {
    pub ab_testing_tools_present: BTreeSet<String>,
    pub feature_flags_systems_identified: BTreeSet<String>,
    pub advanced_martech_indicators: Vec<String>,
}

// ── Bundle, per-URL result, report ──────────────────────────────────────────

/// The five-category output for one successfully fetched URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalBundle {
    pub marketing_technology_data_foundation: Section<MarTechDataFoundation>,
    pub organic_presence_content_signals: Section<OrganicPresence>,
    pub user_experience_performance_clues: Section<UxPerformance>,
    pub conversion_funnel_effectiveness: Section<ConversionFunnel>,
    pub competitive_posture_strategic_tests: Section<CompetitiveStrategic>,
}

impl SignalBundle {
    /// Names of sections that degraded to an error marker.
    pub fn failed_sections(&self) -> Vec<&'static str> {
        let mut failed = Vec::new();
        if self.marketing_technology_data_foundation.error().is_some() {
            failed.push("marketing_technology_data_foundation");
        }
        if self.organic_presence_content_signals.error().is_some() {
            failed.push("organic_presence_content_signals");
        }
        if self.user_experience_performance_clues.error().is_some() {
            failed.push("user_experience_performance_clues");
        }
        if self.conversion_funnel_effectiveness.error().is_some() {
            failed.push("conversion_funnel_effectiveness");
        }
        if self.competitive_posture_strategic_tests.error().is_some() {
            failed.push("competitive_posture_strategic_tests");
        }
        failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Success,
    Error,
}

/// Outcome for one target URL. Built only through [`UrlResult::success`] and
/// [`UrlResult::failure`], so `data` and `error_details` are never both set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlResult {
    pub url: String,
    pub fetch_status: FetchStatus,
    pub error_details: Option<String>,
    #[serde(with = "utc_iso")]
    pub fetch_timestamp_utc: DateTime<Utc>,
    pub page_title: Option<String>,
    pub data: Option<SignalBundle>,
}

impl UrlResult {
    pub fn success(
        url: impl Into<String>,
        fetched_at: DateTime<Utc>,
        page_title: Option<String>,
        bundle: SignalBundle,
    ) -> Self {
        Self {
            url: url.into(),
            fetch_status: FetchStatus::Success,
            error_details: None,
            fetch_timestamp_utc: fetched_at,
            page_title,
            data: Some(bundle),
        }
    }

    pub fn failure(url: impl Into<String>, fetched_at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            fetch_status: FetchStatus::Error,
            error_details: Some(error.into()),
            fetch_timestamp_utc: fetched_at,
            page_title: None,
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.fetch_status == FetchStatus::Success
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    pub collector_version: String,
    #[serde(with = "utc_iso")]
    pub collection_timestamp_utc: DateTime<Utc>,
    pub total_urls_processed: usize,
    pub total_urls_successful: usize,
    pub total_urls_failed: usize,
}

/// The persisted artifact of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionReport {
    pub collection_metadata: CollectionMetadata,
    pub url_analysis_results: Vec<UrlResult>,
}

impl CollectionReport {
    /// Assemble a report; the totals are derived from `results`.
    pub fn new(collector_version: impl Into<String>, started_at: DateTime<Utc>, results: Vec<UrlResult>) -> Self {
        let successful = results.iter().filter(|r| r.is_success()).count();
        Self {
            collection_metadata: CollectionMetadata {
                collector_version: collector_version.into(),
                collection_timestamp_utc: started_at,
                total_urls_processed: results.len(),
                total_urls_successful: successful,
                total_urls_failed: results.len() - successful,
            },
            url_analysis_results: results,
        }
    }

    pub fn results(&self) -> &[UrlResult] {
        &self.url_analysis_results
    }
}

/// RFC 3339 timestamps with microsecond precision and an explicit `+00:00`.
mod utc_iso {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, false))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
