//! Chromium-based renderer using chromiumoxide.

use super::{FrameInfo, NavigationResult, RenderContext, Renderer};
use crate::config::BrowserSettings;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetLocaleOverrideParams, SetTimezoneOverrideParams,
    SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::{self, EventRequestWillBeSent};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CreateIsolatedWorldParams, FrameId, FrameTree,
    GetFrameTreeParams,
};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::cdp::js_protocol::runtime::{EvaluateParams, ExecutionContextId};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

type SharedBrowser = Arc<tokio::sync::Mutex<Browser>>;

/// Hides the automation flags bot walls look at first.
const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
window.chrome = window.chrome || { runtime: {} };
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
"#;

/// Find the Chromium binary path.
pub fn find_chromium(explicit: Option<&PathBuf>) -> Option<PathBuf> {
    // 1. --chromium flag
    if let Some(path) = explicit {
        if path.exists() {
            return Some(path.clone());
        }
        tracing::warn!(path = %path.display(), "configured Chromium path does not exist");
    }

    // 2. DEEPSTACK_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("DEEPSTACK_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 3. ~/.deepstack/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".deepstack/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".deepstack/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".deepstack/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".deepstack/chromium/chrome-linux64/chrome"),
                home.join(".deepstack/chromium/chrome"),
            ]
        };
        if let Some(found) = candidates.into_iter().find(|c| c.exists()) {
            return Some(found);
        }
    }

    // 4. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 5. Stock macOS install
    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Chromium-based renderer. One browser process, one CDP browser context per
/// rendering context.
pub struct ChromiumRenderer {
    browser: SharedBrowser,
    handler_task: JoinHandle<()>,
    settings: BrowserSettings,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch Chromium with the given settings.
    pub async fn launch(settings: BrowserSettings) -> Result<Self> {
        let chrome_path = find_chromium(settings.chromium_path.as_ref()).context(
            "Chromium not found. Install Chrome/Chromium, pass --chromium, or set DEEPSTACK_CHROMIUM_PATH.",
        )?;
        tracing::debug!(path = %chrome_path.display(), "launching Chromium");

        let (width, height) = settings.viewport;
        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(width, height)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-blink-features=AutomationControlled")
            // Keep cross-origin iframes in-process so their DOM is reachable.
            .arg("--disable-features=IsolateOrigins,site-per-process")
            .arg("--disable-site-isolation-trials");
        if settings.headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!("chromium handler event error: {e}");
                }
            }
        });

        Ok(Self {
            browser: Arc::new(tokio::sync::Mutex::new(browser)),
            handler_task,
            settings,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }

    async fn open_page(&self, context_id: BrowserContextId) -> Result<Page> {
        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id)
            .build()
            .map_err(|e| anyhow!("invalid target params: {e}"))?;
        let page = self
            .browser
            .lock()
            .await
            .new_page(target)
            .await
            .context("failed to create new page")?;

        let ua = SetUserAgentOverrideParams::builder()
            .user_agent(self.settings.user_agent.clone())
            .accept_language(self.settings.accept_language.clone())
            .build()
            .map_err(|e| anyhow!("invalid user agent params: {e}"))?;
        page.execute(ua).await.context("failed to set user agent")?;

        let (width, height) = self.settings.viewport;
        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(width),
            i64::from(height),
            1.0,
            false,
        ))
        .await
        .context("failed to set viewport")?;

        page.execute(
            SetLocaleOverrideParams::builder()
                .locale(self.settings.locale.clone())
                .build(),
        )
        .await
        .context("failed to set locale")?;
        page.execute(SetTimezoneOverrideParams::new(self.settings.timezone.clone()))
            .await
            .context("failed to set timezone")?;

        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await
            .context("failed to inject stealth script")?;

        Ok(page)
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let context_id = self
            .browser
            .lock()
            .await
            .execute(CreateBrowserContextParams::default())
            .await
            .context("failed to create browser context")?
            .result
            .browser_context_id;

        let page = match self.open_page(context_id.clone()).await {
            Ok(page) => page,
            Err(e) => {
                dispose_context(&self.browser, context_id).await;
                return Err(e);
            }
        };

        let requests = Arc::new(Mutex::new(Vec::new()));
        let listener = match start_request_log(&page, Arc::clone(&requests)).await {
            Ok(task) => task,
            Err(e) => {
                let _ = page.close().await;
                dispose_context(&self.browser, context_id).await;
                return Err(e);
            }
        };

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            browser: Arc::clone(&self.browser),
            context_id,
            active_count: Arc::clone(&self.active_count),
            requests,
            listener,
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        browser.close().await.context("failed to close Chromium")?;
        let _ = browser.wait().await;
        self.handler_task.abort();
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

async fn dispose_context(browser: &SharedBrowser, id: BrowserContextId) {
    let result = browser
        .lock()
        .await
        .execute(DisposeBrowserContextParams::new(id))
        .await;
    if let Err(e) = result {
        tracing::warn!("failed to dispose browser context: {e}");
    }
}

/// Record every outbound request URL into `log` until the page goes away.
async fn start_request_log(page: &Page, log: Arc<Mutex<Vec<String>>>) -> Result<JoinHandle<()>> {
    page.execute(network::EnableParams::default())
        .await
        .context("failed to enable network domain")?;
    let mut events = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .context("failed to subscribe to network requests")?;
    Ok(tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if let Ok(mut log) = log.lock() {
                log.push(event.request.url.clone());
            }
        }
    }))
}

/// A single Chromium page inside its own browser context.
pub struct ChromiumContext {
    page: Page,
    browser: SharedBrowser,
    context_id: BrowserContextId,
    active_count: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
    listener: JoinHandle<()>,
}

impl ChromiumContext {
    async fn evaluate(&self, script: &str, context: Option<ExecutionContextId>) -> Result<serde_json::Value> {
        let mut params = EvaluateParams::builder()
            .expression(script)
            .return_by_value(true)
            .await_promise(true);
        if let Some(id) = context {
            params = params.context_id(id);
        }
        let params = params
            .build()
            .map_err(|e| anyhow!("invalid evaluate params: {e}"))?;

        let result = self
            .page
            .evaluate_expression(params)
            .await
            .context("JS execution failed")?;

        result
            .into_value()
            .map_err(|e| anyhow!("failed to convert JS result: {e:?}"))
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();

        let result = tokio::time::timeout(Duration::from_millis(timeout_ms), self.page.goto(url)).await;

        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_)) => {
                let final_url = self.get_url().await.unwrap_or_else(|_| url.to_string());
                // Chromium reports some network failures by landing on its own error page.
                if final_url.starts_with("chrome-error://") {
                    bail!("navigation failed: browser error page for {url}");
                }
                Ok(NavigationResult {
                    final_url,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }
    }

    async fn title(&self) -> Result<String> {
        Ok(self
            .page
            .get_title()
            .await
            .context("failed to read title")?
            .unwrap_or_default())
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        self.evaluate(script, None).await
    }

    async fn get_html(&self) -> Result<String> {
        let html = self
            .evaluate("document.documentElement.outerHTML", None)
            .await
            .context("failed to get HTML")?;
        Ok(html.as_str().unwrap_or_default().to_string())
    }

    async fn get_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(url)
    }

    async fn child_frames(&self) -> Result<Vec<FrameInfo>> {
        let tree = self
            .page
            .execute(GetFrameTreeParams::default())
            .await
            .context("failed to read frame tree")?
            .result
            .frame_tree;
        let mut frames = Vec::new();
        collect_frames(&tree, &mut frames);
        Ok(frames)
    }

    async fn execute_js_in_frame(&self, frame_id: &str, script: &str) -> Result<serde_json::Value> {
        let world = self
            .page
            .execute(
                CreateIsolatedWorldParams::builder()
                    .frame_id(FrameId::new(frame_id))
                    .world_name("deepstack")
                    .build()
                    .map_err(|e| anyhow!("invalid isolated world params: {e}"))?,
            )
            .await
            .with_context(|| format!("failed to enter frame {frame_id}"))?;
        self.evaluate(script, Some(world.result.execution_context_id))
            .await
    }

    fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.active_count.fetch_sub(1, Ordering::Relaxed);
        this.listener.abort();
        let page_closed = this.page.close().await;
        dispose_context(&this.browser, this.context_id).await;
        page_closed.context("failed to close page")?;
        Ok(())
    }
}

/// Flatten the frame tree below the main frame.
fn collect_frames(tree: &FrameTree, out: &mut Vec<FrameInfo>) {
    for child in tree.child_frames.iter().flatten() {
        out.push(FrameInfo {
            id: child.frame.id.inner().clone(),
            url: child.frame.url.clone(),
            name: child.frame.name.clone(),
        });
        collect_frames(child, out);
    }
}
