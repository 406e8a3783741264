//! Deterministic in-memory renderer.
//!
//! Pages are registered per URL. Each page is a sequence of states (title +
//! HTML); every `title()` read moves the page one state forward and the last
//! state sticks, which is how challenge pages that clear after a few polls
//! are modelled. Runtime evaluation answers come from a table keyed by the
//! exact script text.

use super::{FrameInfo, NavigationResult, RenderContext, Renderer};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One observable state of a page.
#[derive(Debug, Clone)]
pub struct PageState {
    pub title: String,
    pub html: String,
}

type ScriptTable = Vec<(String, std::result::Result<Value, String>)>;

/// A child frame of a scripted page.
#[derive(Debug, Clone)]
pub struct ScriptedFrame {
    pub info: FrameInfo,
    scripts: ScriptTable,
}

impl ScriptedFrame {
    pub fn new(id: &str, url: &str, name: Option<&str>) -> Self {
        Self {
            info: FrameInfo {
                id: id.to_string(),
                url: url.to_string(),
                name: name.map(str::to_string),
            },
            scripts: Vec::new(),
        }
    }

    /// Answer `script` with `value` inside this frame.
    pub fn with_script(mut self, script: &str, value: Value) -> Self {
        self.scripts.push((script.to_string(), Ok(value)));
        self
    }

    /// Make `script` throw inside this frame.
    pub fn with_script_error(mut self, script: &str, message: &str) -> Self {
        self.scripts.push((script.to_string(), Err(message.to_string())));
        self
    }
}

/// A page served by [`ScriptedRenderer`].
#[derive(Debug, Clone)]
pub struct ScriptedPage {
    states: Vec<PageState>,
    requests: Vec<String>,
    scripts: ScriptTable,
    frames: Vec<ScriptedFrame>,
    final_url: Option<String>,
    navigation_error: Option<String>,
    close_error: Option<String>,
}

impl ScriptedPage {
    /// A page whose single state has the given HTML; the title is read from it.
    pub fn new(html: &str) -> Self {
        Self {
            states: vec![PageState {
                title: title_of(html),
                html: html.to_string(),
            }],
            requests: Vec::new(),
            scripts: Vec::new(),
            frames: Vec::new(),
            final_url: None,
            navigation_error: None,
            close_error: None,
        }
    }

    /// A page that moves through `states`, one per title read.
    pub fn with_states(states: Vec<PageState>) -> Self {
        let mut page = Self::new("");
        if !states.is_empty() {
            page.states = states;
        }
        page
    }

    pub fn with_requests<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requests.extend(urls.into_iter().map(Into::into));
        self
    }

    pub fn with_script(mut self, script: &str, value: Value) -> Self {
        self.scripts.push((script.to_string(), Ok(value)));
        self
    }

    pub fn with_script_error(mut self, script: &str, message: &str) -> Self {
        self.scripts.push((script.to_string(), Err(message.to_string())));
        self
    }

    pub fn with_frame(mut self, frame: ScriptedFrame) -> Self {
        self.frames.push(frame);
        self
    }

    /// Report a different URL after navigation, as a redirect would.
    pub fn with_final_url(mut self, url: &str) -> Self {
        self.final_url = Some(url.to_string());
        self
    }

    /// Fail navigation with `message`.
    pub fn with_navigation_error(mut self, message: &str) -> Self {
        self.navigation_error = Some(message.to_string());
        self
    }

    /// Make closing the context fail with `message` once this page was visited.
    pub fn with_close_error(mut self, message: &str) -> Self {
        self.close_error = Some(message.to_string());
        self
    }
}

fn title_of(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let Some(start) = lower.find("<title>") else {
        return String::new();
    };
    let rest = &html[start + "<title>".len()..];
    let end = rest.to_ascii_lowercase().find("</title>").unwrap_or(rest.len());
    rest[..end].trim().to_string()
}

fn answer(table: &ScriptTable, script: &str) -> Result<Value> {
    match table.iter().find(|(s, _)| s == script) {
        Some((_, Ok(v))) => Ok(v.clone()),
        Some((_, Err(msg))) => Err(anyhow!("{msg}")),
        None => Ok(Value::Null),
    }
}

/// Renderer over a fixed set of scripted pages. Unknown URLs fail the way a
/// refused connection does.
#[derive(Default)]
pub struct ScriptedRenderer {
    pages: HashMap<String, ScriptedPage>,
    active_count: Arc<AtomicUsize>,
    opened: Arc<AtomicUsize>,
}

impl ScriptedRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, page: ScriptedPage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    /// Total contexts ever handed out.
    pub fn contexts_opened(&self) -> usize {
        self.opened.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        self.active_count.fetch_add(1, Ordering::Relaxed);
        self.opened.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(ScriptedContext {
            pages: self.pages.clone(),
            current: None,
            close_error: None,
            cursor: Mutex::new(Cursor::default()),
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
struct Cursor {
    observed: usize,
    next: usize,
}

/// Context handed out by [`ScriptedRenderer`].
pub struct ScriptedContext {
    pages: HashMap<String, ScriptedPage>,
    current: Option<(String, ScriptedPage)>,
    close_error: Option<String>,
    cursor: Mutex<Cursor>,
    active_count: Arc<AtomicUsize>,
}

impl ScriptedContext {
    fn page(&self) -> Result<&ScriptedPage> {
        self.current
            .as_ref()
            .map(|(_, p)| p)
            .ok_or_else(|| anyhow!("no page loaded"))
    }

    fn observed_state(&self) -> Result<&PageState> {
        let page = self.page()?;
        let idx = self.cursor.lock().map(|c| c.observed).unwrap_or(0);
        page.states
            .get(idx.min(page.states.len().saturating_sub(1)))
            .ok_or_else(|| anyhow!("page has no states"))
    }
}

#[async_trait]
impl RenderContext for ScriptedContext {
    async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
        let Some(page) = self.pages.get(url).cloned() else {
            bail!("net::ERR_CONNECTION_REFUSED at {url}");
        };
        self.close_error = page.close_error.clone();
        if let Some(message) = &page.navigation_error {
            bail!("{message} at {url}");
        }
        let final_url = page.final_url.clone().unwrap_or_else(|| url.to_string());
        self.current = Some((final_url.clone(), page));
        if let Ok(mut cursor) = self.cursor.lock() {
            *cursor = Cursor::default();
        }
        Ok(NavigationResult {
            final_url,
            load_time_ms: 0,
        })
    }

    async fn title(&self) -> Result<String> {
        let page = self.page()?;
        let mut cursor = self
            .cursor
            .lock()
            .map_err(|_| anyhow!("cursor poisoned"))?;
        let idx = cursor.next.min(page.states.len().saturating_sub(1));
        cursor.observed = idx;
        cursor.next = idx + 1;
        Ok(page.states[idx].title.clone())
    }

    async fn execute_js(&self, script: &str) -> Result<Value> {
        answer(&self.page()?.scripts, script)
    }

    async fn get_html(&self) -> Result<String> {
        Ok(self.observed_state()?.html.clone())
    }

    async fn get_url(&self) -> Result<String> {
        Ok(self
            .current
            .as_ref()
            .map(|(url, _)| url.clone())
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn child_frames(&self) -> Result<Vec<FrameInfo>> {
        Ok(self.page()?.frames.iter().map(|f| f.info.clone()).collect())
    }

    async fn execute_js_in_frame(&self, frame_id: &str, script: &str) -> Result<Value> {
        let frame = self
            .page()?
            .frames
            .iter()
            .find(|f| f.info.id == frame_id)
            .ok_or_else(|| anyhow!("frame {frame_id} detached"))?;
        answer(&frame.scripts, script)
    }

    fn requests(&self) -> Vec<String> {
        self.current
            .as_ref()
            .map(|(_, p)| p.requests.clone())
            .unwrap_or_default()
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        match self.close_error {
            Some(message) => Err(anyhow!("{message}")),
            None => Ok(()),
        }
    }
}
