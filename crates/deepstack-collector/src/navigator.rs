//! Page navigator: one isolated browser context per target, fully
//! materialized into a [`PageSession`] or cleanly torn down.

use std::time::Duration;

use deepstack_signals::DomSnapshot;

use crate::challenge::{ChallengeOutcome, ChallengeResolver};
use crate::config::CollectorConfig;
use crate::error::CollectError;
use crate::renderer::{RenderContext, Renderer};

/// In-page network-idle heuristic: resolves once `document.readyState` is
/// complete and the resource-timing count has been stable for `idle_ms`.
fn network_idle_script(idle_ms: u128, timeout_ms: u128) -> String {
    format!(
        r#"(async () => {{
            const timeoutMs = {timeout_ms};
            const idleMs = {idle_ms};
            const interval = 100;
            const start = Date.now();
            const count = () => {{ try {{ return performance.getEntriesByType('resource').length; }} catch (_) {{ return 0; }} }};
            let last = count();
            let stable = 0;
            while (Date.now() - start < timeoutMs) {{
                await new Promise(r => setTimeout(r, interval));
                const cur = count();
                if (document.readyState === 'complete' && cur === last) {{
                    stable += interval;
                    if (stable >= idleMs) {{
                        return {{ ok: true, resources: cur, waitedMs: Date.now() - start }};
                    }}
                }} else {{
                    stable = 0;
                }}
                last = cur;
            }}
            return {{ ok: false, resources: last, waitedMs: Date.now() - start }};
        }})()"#
    )
}

/// A fully materialized page. Owns its render context; call
/// [`PageSession::close`] when done with it.
pub struct PageSession {
    context: Box<dyn RenderContext>,
    pub target: String,
    pub final_url: String,
    pub title: Option<String>,
    pub challenge: ChallengeOutcome,
    /// Serialized DOM after any challenge cleared.
    pub html: String,
    pub dom: DomSnapshot,
    /// Outbound request URLs observed up to materialization.
    pub requests: Vec<String>,
    pub load_time_ms: u64,
}

impl std::fmt::Debug for PageSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageSession")
            .field("target", &self.target)
            .field("final_url", &self.final_url)
            .field("title", &self.title)
            .field("challenge", &self.challenge)
            .field("requests", &self.requests.len())
            .finish_non_exhaustive()
    }
}

impl PageSession {
    /// Runtime handle for evaluating expressions in the page and its frames.
    pub fn context(&self) -> &dyn RenderContext {
        self.context.as_ref()
    }

    /// Close the underlying browser context.
    pub async fn close(self) -> anyhow::Result<()> {
        self.context.close().await
    }
}

/// Everything gathered from a context before it is wrapped in a session.
struct Materialized {
    final_url: String,
    title: Option<String>,
    challenge: ChallengeOutcome,
    html: String,
    requests: Vec<String>,
    load_time_ms: u64,
}

/// Opens targets against a shared renderer.
pub struct Navigator<'a> {
    renderer: &'a dyn Renderer,
    config: &'a CollectorConfig,
}

impl<'a> Navigator<'a> {
    pub fn new(renderer: &'a dyn Renderer, config: &'a CollectorConfig) -> Self {
        Self { renderer, config }
    }

    /// Navigate to `target` in a fresh context and materialize the page.
    ///
    /// On failure the context is closed before returning; a failure while
    /// closing is logged and never replaces the original error.
    pub async fn open(&self, target: &str) -> Result<PageSession, CollectError> {
        let mut context = self
            .renderer
            .new_context()
            .await
            .map_err(|e| CollectError::Context(format!("{e:#}")))?;

        match self.materialize(context.as_mut(), target).await {
            Ok(m) => {
                let dom = DomSnapshot::parse(&m.html);
                Ok(PageSession {
                    context,
                    target: target.to_string(),
                    final_url: m.final_url,
                    title: m.title,
                    challenge: m.challenge,
                    html: m.html,
                    dom,
                    requests: m.requests,
                    load_time_ms: m.load_time_ms,
                })
            }
            Err(e) => {
                if let Err(close_err) = context.close().await {
                    tracing::warn!(url = %target, "failed to close context after error: {close_err:#}");
                }
                Err(e)
            }
        }
    }

    async fn materialize(
        &self,
        ctx: &mut dyn RenderContext,
        target: &str,
    ) -> Result<Materialized, CollectError> {
        let timeout = self.config.navigation_timeout;
        let timeout_ms = timeout.as_millis() as u64;

        tracing::debug!(url = %target, "navigating");
        let nav = match tokio::time::timeout(
            timeout + Duration::from_secs(5),
            ctx.navigate(target, timeout_ms),
        )
        .await
        {
            Ok(Ok(nav)) => nav,
            Ok(Err(e)) => return Err(CollectError::Navigation(format!("{e:#}"))),
            Err(_) => return Err(CollectError::Timeout(timeout_ms)),
        };
        tracing::debug!(url = %target, final_url = %nav.final_url, ms = nav.load_time_ms, "navigation completed");

        self.wait_for_network_idle(&*ctx).await;

        let challenge = ChallengeResolver::new(&self.config.challenge)
            .resolve(&*ctx)
            .await?;

        let html = ctx
            .get_html()
            .await
            .map_err(|e| CollectError::Navigation(format!("failed to read page content: {e:#}")))?;
        let title = ctx
            .title()
            .await
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let final_url = ctx.get_url().await.unwrap_or(nav.final_url);

        Ok(Materialized {
            final_url,
            title,
            challenge,
            html,
            requests: ctx.requests(),
            load_time_ms: nav.load_time_ms,
        })
    }

    /// Best effort; a page that never goes quiet is still processed.
    async fn wait_for_network_idle(&self, ctx: &dyn RenderContext) {
        let script = network_idle_script(
            self.config.network_idle.as_millis(),
            self.config.network_idle_timeout.as_millis(),
        );
        match ctx.execute_js(&script).await {
            Ok(info) => {
                let ok = info.get("ok").and_then(|v| v.as_bool()).unwrap_or(false);
                let waited = info.get("waitedMs").and_then(|v| v.as_u64()).unwrap_or(0);
                if ok {
                    tracing::debug!(waited_ms = waited, "network idle");
                } else {
                    tracing::debug!(waited_ms = waited, "network never went idle");
                }
            }
            Err(e) => tracing::warn!("network-idle heuristic failed: {e:#}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::scripted::{ScriptedPage, ScriptedRenderer};

    fn config() -> CollectorConfig {
        let mut config = CollectorConfig::default();
        config.challenge.body_timeout = Duration::from_millis(20);
        config.challenge.poll_interval = Duration::from_millis(5);
        config
    }

    #[tokio::test]
    async fn test_open_materializes_page() {
        let renderer = ScriptedRenderer::new().with_page(
            "https://acme.test",
            ScriptedPage::new("<html><head><title>Acme</title></head><body><h1>Hi</h1></body></html>")
                .with_requests(["https://acme.test/app.js"])
                .with_final_url("https://www.acme.test/"),
        );
        let config = config();
        let session = Navigator::new(&renderer, &config)
            .open("https://acme.test")
            .await
            .unwrap();
        assert_eq!(session.title.as_deref(), Some("Acme"));
        assert_eq!(session.final_url, "https://www.acme.test/");
        assert_eq!(session.requests, vec!["https://acme.test/app.js"]);
        assert_eq!(session.dom.h1, vec!["Hi"]);
        assert_eq!(session.challenge, ChallengeOutcome::NotDetected);
        assert_eq!(renderer.active_contexts(), 1);
        session.close().await.unwrap();
        assert_eq!(renderer.active_contexts(), 0);
    }

    #[tokio::test]
    async fn test_failed_navigation_closes_context() {
        let renderer = ScriptedRenderer::new();
        let config = config();
        let err = Navigator::new(&renderer, &config)
            .open("https://down.test")
            .await
            .unwrap_err();
        assert!(matches!(err, CollectError::Navigation(_)));
        assert!(err.to_string().contains("ERR_CONNECTION_REFUSED"));
        assert_eq!(renderer.contexts_opened(), 1);
        assert_eq!(renderer.active_contexts(), 0);
    }

    #[tokio::test]
    async fn test_close_failure_keeps_navigation_error() {
        let renderer = ScriptedRenderer::new().with_page(
            "https://down.test",
            ScriptedPage::new("<title>Down</title>")
                .with_navigation_error("net::ERR_CONNECTION_REFUSED")
                .with_close_error("Target closed"),
        );
        let config = config();
        let err = Navigator::new(&renderer, &config)
            .open("https://down.test")
            .await
            .unwrap_err();
        match err {
            CollectError::Navigation(message) => {
                assert!(message.contains("ERR_CONNECTION_REFUSED"));
                assert!(!message.contains("Target closed"));
            }
            other => panic!("expected navigation error, got {other:?}"),
        }
        assert_eq!(renderer.active_contexts(), 0);
    }

    #[test]
    fn test_network_idle_script_embeds_budgets() {
        let script = network_idle_script(500, 10_000);
        assert!(script.contains("const timeoutMs = 10000;"));
        assert!(script.contains("const idleMs = 500;"));
    }
}
