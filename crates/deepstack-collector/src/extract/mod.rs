//! Signal extractors.
//!
//! Each extractor reads a [`PageSession`] and produces one section of the
//! [`SignalBundle`]. Extractors never navigate or mutate browser state.
//! [`collect_bundle`] runs all five and isolates their failures: an error or
//! a panic in one extractor turns that section into `{"error": ...}` and
//! leaves the others alone.

pub mod competitive;
pub mod conversion;
pub mod forms;
pub mod martech;
pub mod organic;
pub mod ux;

use std::any::Any;
use std::collections::BTreeSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use deepstack_signals::{Matcher, Section, SignalBundle};
use futures::FutureExt;

use crate::config::CollectorConfig;
use crate::error::ExtractError;
use crate::navigator::PageSession;

/// Run one extractor, converting errors and panics into an error marker.
pub async fn guarded<T, F>(section: &'static str, extractor: F) -> Section<T>
where
    F: Future<Output = Result<T, ExtractError>>,
{
    let outcome = match AssertUnwindSafe(extractor).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(ExtractError::Panicked(panic_message(payload.as_ref()))),
    };
    match outcome {
        Ok(value) => Section::Ok(value),
        Err(e) => {
            tracing::warn!(section, "extractor failed: {e}");
            Section::Failed {
                error: e.to_string(),
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run every extractor against one page.
pub async fn collect_bundle(
    session: &PageSession,
    matcher: &Matcher<'_>,
    config: &CollectorConfig,
) -> SignalBundle {
    let martech = guarded(
        "marketing_technology_data_foundation",
        martech::extract(session, matcher, config.datalayer_sample_limit),
    )
    .await;
    let organic = guarded("organic_presence_content_signals", async {
        organic::extract(&session.dom)
    })
    .await;
    let ux = guarded("user_experience_performance_clues", async {
        ux::extract(&session.dom, matcher, config.image_sample_limit)
    })
    .await;
    let conversion = guarded(
        "conversion_funnel_effectiveness",
        conversion::extract(session, matcher),
    )
    .await;

    // Competitive posture builds on the MarTech set; a failed MarTech section
    // contributes nothing.
    let empty = BTreeSet::new();
    let known_martech = martech
        .as_ok()
        .map(|m| &m.martech_identified)
        .unwrap_or(&empty);
    let competitive = guarded("competitive_posture_strategic_tests", async {
        competitive::extract(session, matcher, known_martech)
    })
    .await;

    SignalBundle {
        marketing_technology_data_foundation: martech,
        organic_presence_content_signals: organic,
        user_experience_performance_clues: ux,
        conversion_funnel_effectiveness: conversion,
        competitive_posture_strategic_tests: competitive,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guarded_passes_value_through() {
        let section = guarded("s", async { Ok::<_, ExtractError>(7) }).await;
        assert_eq!(section.as_ok(), Some(&7));
    }

    #[tokio::test]
    async fn test_guarded_converts_error() {
        let section: Section<u8> =
            guarded("s", async { Err(ExtractError::Runtime("boom".into())) }).await;
        assert_eq!(section.error(), Some("runtime evaluation failed: boom"));
    }

    #[tokio::test]
    async fn test_guarded_catches_panic() {
        let section: Section<u8> = guarded("s", async {
            let v: Vec<u8> = Vec::new();
            Ok(v[3])
        })
        .await;
        let error = section.error().unwrap();
        assert!(error.starts_with("extractor panicked:"), "{error}");
    }
}
