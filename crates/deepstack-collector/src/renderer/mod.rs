//! Renderer abstraction for browser-based page rendering.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over the
//! browser engine. Chromium (via chromiumoxide) backs real runs; the scripted
//! renderer backs fixtures and tests.

pub mod chromium;
pub mod scripted;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// A nested browsing context of the current page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameInfo {
    pub id: String,
    pub url: String,
    pub name: Option<String>,
}

/// A browser engine that can create isolated rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new isolated browser context with one page.
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently active contexts.
    fn active_contexts(&self) -> usize;
}

/// A single isolated browser context holding one page.
///
/// Outbound requests are recorded from the moment the context exists, so the
/// log covers everything the first navigation triggers.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Current document title.
    async fn title(&self) -> Result<String>;
    /// Execute JavaScript in the main frame and return the result by value.
    /// Promises are awaited.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Get the full page HTML.
    async fn get_html(&self) -> Result<String>;
    /// Get the current URL.
    async fn get_url(&self) -> Result<String>;
    /// Every attached descendant frame of the main frame.
    async fn child_frames(&self) -> Result<Vec<FrameInfo>>;
    /// Execute JavaScript inside one child frame's document.
    async fn execute_js_in_frame(&self, frame_id: &str, script: &str) -> Result<serde_json::Value>;
    /// URLs of every request the page has sent so far.
    fn requests(&self) -> Vec<String>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A renderer with no browser behind it. Every target fails to open a
/// context, which still yields a well-formed report.
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        Err(anyhow::anyhow!("browser not available"))
    }
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
    fn active_contexts(&self) -> usize {
        0
    }
}
