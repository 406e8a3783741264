//! Anti-bot interstitial detection and wait-out.
//!
//! After navigation the resolver looks at the title and markup. A page that
//! looks like a challenge is polled until the title moves off every indicator
//! phrase and real content shows up, then given a short settle delay. If that
//! fails, one last pause-and-recheck of the title decides between a late
//! success and a hard failure. Pages that do not look like a challenge only
//! need a `<body>`.
//!
//! Probes read the serialized DOM rather than running page scripts, so a
//! probe never depends on what the page has done to its own globals.

use std::future::Future;
use std::time::Duration;

use scraper::{Html, Selector};
use tokio::time::Instant;

use crate::config::ChallengeConfig;
use crate::error::CollectError;
use crate::renderer::RenderContext;

/// Elements that count as real page content once a challenge clears.
pub const CONTENT_SELECTOR: &str = "h1, h2, p, main, article, [role='main']";

/// How the resolver got past (or around) a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeOutcome {
    /// No challenge detected; fast path.
    NotDetected,
    /// Challenge detected and waited out.
    Resolved,
    /// The wait failed, but the final title re-check showed the page had moved on.
    ResolvedAfterRecheck,
}

impl ChallengeOutcome {
    pub fn was_challenged(self) -> bool {
        !matches!(self, ChallengeOutcome::NotDetected)
    }
}

/// Poll `probe` every `interval` until it returns true or `timeout` elapses.
/// The probe always runs at least once.
pub async fn poll_until<F, Fut>(timeout: Duration, interval: Duration, mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if probe().await {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

/// Facts about the serialized DOM the resolver cares about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ContentProbe {
    has_semantic_content: bool,
    text_length: usize,
}

impl ContentProbe {
    fn read(html: &str) -> Self {
        let document = Html::parse_document(html);
        let has_semantic_content = Selector::parse(CONTENT_SELECTOR)
            .map(|sel| document.select(&sel).next().is_some())
            .unwrap_or(false);
        let text_length = Selector::parse("body")
            .ok()
            .and_then(|sel| document.select(&sel).next())
            .map(|body| body.text().collect::<String>().trim().chars().count())
            .unwrap_or(0);
        Self {
            has_semantic_content,
            text_length,
        }
    }
}

/// Detects and waits out challenge pages for one render context.
pub struct ChallengeResolver<'a> {
    config: &'a ChallengeConfig,
}

impl<'a> ChallengeResolver<'a> {
    pub fn new(config: &'a ChallengeConfig) -> Self {
        Self { config }
    }

    /// Whether a title contains any challenge indicator phrase.
    pub fn is_challenge_title(&self, title: &str) -> bool {
        self.config
            .title_indicators
            .iter()
            .any(|indicator| title.contains(indicator.as_str()))
    }

    /// Run detection and, if needed, the wait-out sequence.
    pub async fn resolve(&self, ctx: &dyn RenderContext) -> Result<ChallengeOutcome, CollectError> {
        let initial_title = ctx.title().await.unwrap_or_default();
        let html = ctx.get_html().await.unwrap_or_default();
        let detected =
            self.is_challenge_title(&initial_title) || html.contains(self.config.body_marker.as_str());

        if !detected {
            return self.await_body(ctx).await.map(|_| ChallengeOutcome::NotDetected);
        }

        tracing::info!(title = %initial_title, "challenge page detected, waiting for it to clear");
        match self.wait_out(ctx).await {
            Ok(()) => {
                tracing::info!("challenge resolved");
                Ok(ChallengeOutcome::Resolved)
            }
            Err(reason) => {
                tracing::warn!("challenge wait failed: {reason}; re-checking after pause");
                tokio::time::sleep(self.config.recheck_delay).await;
                let final_title = ctx.title().await.unwrap_or_default();
                if final_title != initial_title && !self.is_challenge_title(&final_title) {
                    tracing::info!(title = %final_title, "title changed, continuing");
                    Ok(ChallengeOutcome::ResolvedAfterRecheck)
                } else {
                    Err(CollectError::ChallengeUnresolved {
                        title: final_title,
                        reason,
                    })
                }
            }
        }
    }

    async fn wait_out(&self, ctx: &dyn RenderContext) -> Result<(), String> {
        let cfg = self.config;

        let title_cleared = poll_until(cfg.title_timeout, cfg.poll_interval, || async move {
            match ctx.title().await {
                Ok(title) => !self.is_challenge_title(&title),
                Err(_) => false,
            }
        })
        .await;
        if !title_cleared {
            return Err(format!(
                "title still matched a challenge indicator after {}ms",
                cfg.title_timeout.as_millis()
            ));
        }

        let has_content = poll_until(cfg.content_timeout, cfg.poll_interval, || async move {
            probe(ctx).await.has_semantic_content
        })
        .await;
        if !has_content {
            tracing::debug!("no semantic content element, waiting for body text instead");
            let min = cfg.min_text_length;
            let has_text = poll_until(cfg.content_timeout, cfg.poll_interval, || async move {
                probe(ctx).await.text_length > min
            })
            .await;
            if !has_text {
                return Err(format!(
                    "no page content appeared within {}ms",
                    cfg.content_timeout.as_millis() * 2
                ));
            }
        }

        tokio::time::sleep(cfg.settle_delay).await;
        Ok(())
    }

    async fn await_body(&self, ctx: &dyn RenderContext) -> Result<(), CollectError> {
        let ready = poll_until(self.config.body_timeout, self.config.poll_interval, || async move {
            ctx.get_html()
                .await
                .map(|html| html.to_ascii_lowercase().contains("<body"))
                .unwrap_or(false)
        })
        .await;
        if ready {
            Ok(())
        } else {
            Err(CollectError::NotReady(format!(
                "no <body> within {}ms",
                self.config.body_timeout.as_millis()
            )))
        }
    }
}

async fn probe(ctx: &dyn RenderContext) -> ContentProbe {
    match ctx.get_html().await {
        Ok(html) => ContentProbe::read(&html),
        Err(_) => ContentProbe::default(),
    }
}
