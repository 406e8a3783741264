//! Batch runner: targets are processed one at a time against a shared
//! renderer, each in its own context, and every outcome becomes exactly one
//! [`UrlResult`] in input order.

use std::fmt;

use chrono::Utc;
use deepstack_signals::{CollectionReport, Matcher, SignatureRegistry, UrlResult};

use crate::config::{CollectorConfig, COLLECTOR_VERSION};
use crate::extract::collect_bundle;
use crate::navigator::Navigator;
use crate::renderer::Renderer;

/// Lifecycle of one target. `Extracting` can only end in `Succeeded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlState {
    Pending,
    Fetching,
    Extracting,
    Succeeded,
    Failed,
}

impl fmt::Display for UrlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UrlState::Pending => "pending",
            UrlState::Fetching => "fetching",
            UrlState::Extracting => "extracting",
            UrlState::Succeeded => "succeeded",
            UrlState::Failed => "failed",
        };
        f.write_str(s)
    }
}

pub struct BatchRunner<'a> {
    renderer: &'a dyn Renderer,
    registry: &'a SignatureRegistry,
    config: &'a CollectorConfig,
}

impl<'a> BatchRunner<'a> {
    pub fn new(
        renderer: &'a dyn Renderer,
        registry: &'a SignatureRegistry,
        config: &'a CollectorConfig,
    ) -> Self {
        Self {
            renderer,
            registry,
            config,
        }
    }

    /// Collect every target and assemble the report. Per-target failures are
    /// recorded in the report; this never fails.
    pub async fn run(&self, targets: &[String]) -> CollectionReport {
        let started = Utc::now();
        let mut results = Vec::with_capacity(targets.len());

        for (i, target) in targets.iter().enumerate() {
            if i > 0 {
                let pause = self.config.delay.sample();
                if !pause.is_zero() {
                    tracing::debug!(ms = pause.as_millis() as u64, "pausing before next target");
                    tokio::time::sleep(pause).await;
                }
            }
            tracing::info!(url = %target, index = i + 1, total = targets.len(), "processing target");
            results.push(self.collect_one(target).await);
        }

        let report = CollectionReport::new(COLLECTOR_VERSION, started, results);
        let meta = &report.collection_metadata;
        tracing::info!(
            processed = meta.total_urls_processed,
            successful = meta.total_urls_successful,
            failed = meta.total_urls_failed,
            "collection finished"
        );
        report
    }

    /// Fetch and extract a single target. The timestamp is taken once the
    /// fetch has settled.
    pub async fn collect_one(&self, target: &str) -> UrlResult {
        transition(target, UrlState::Pending, UrlState::Fetching);

        let opened = Navigator::new(self.renderer, self.config).open(target).await;
        let fetched_at = Utc::now();
        let session = match opened {
            Ok(session) => session,
            Err(e) => {
                transition(target, UrlState::Fetching, UrlState::Failed);
                tracing::warn!(url = %target, "fetch failed: {e}");
                return UrlResult::failure(target, fetched_at, e.to_string());
            }
        };

        transition(target, UrlState::Fetching, UrlState::Extracting);
        if session.challenge.was_challenged() {
            tracing::info!(url = %target, outcome = ?session.challenge, "challenge cleared");
        }

        let matcher = Matcher::new(self.registry);
        let bundle = collect_bundle(&session, &matcher, self.config).await;
        let failed = bundle.failed_sections();
        if !failed.is_empty() {
            tracing::warn!(url = %target, sections = ?failed, "some sections degraded");
        }

        let title = session.title.clone();
        if let Err(e) = session.close().await {
            tracing::warn!(url = %target, "failed to close page: {e:#}");
        }

        transition(target, UrlState::Extracting, UrlState::Succeeded);
        UrlResult::success(target, fetched_at, title, bundle)
    }
}

fn transition(target: &str, from: UrlState, to: UrlState) {
    tracing::debug!(url = %target, %from, %to, "state change");
}
