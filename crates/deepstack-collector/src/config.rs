//! Collector configuration and path resolution.

use std::path::PathBuf;
use std::time::Duration;

use deepstack_signals::DEFAULT_TARGETS_FILE;

/// Version string stamped into every report.
pub const COLLECTOR_VERSION: &str = "1.0.0";

/// Tool name used in output file names.
pub const TOOL_NAME: &str = "deepstack";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Browser launch and per-context emulation settings.
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub headless: bool,
    /// Explicit Chromium binary; discovered when `None`.
    pub chromium_path: Option<PathBuf>,
    pub user_agent: String,
    pub accept_language: String,
    pub viewport: (u32, u32),
    pub locale: String,
    pub timezone: String,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            chromium_path: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            viewport: (1920, 1080),
            locale: "en-US".to_string(),
            timezone: "America/New_York".to_string(),
        }
    }
}

/// Budgets for the challenge resolver.
#[derive(Debug, Clone)]
pub struct ChallengeConfig {
    /// Title phrases that mark an interstitial.
    pub title_indicators: Vec<String>,
    /// Markup marker that reveals a challenge regardless of title.
    pub body_marker: String,
    /// Wait for the title to move off every indicator.
    pub title_timeout: Duration,
    /// Wait for a semantic content element, then for enough visible text.
    pub content_timeout: Duration,
    pub min_text_length: usize,
    pub settle_delay: Duration,
    /// Pause before the final title re-check.
    pub recheck_delay: Duration,
    /// Fast-path wait for a `<body>` when no challenge is seen.
    pub body_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            title_indicators: [
                "Just a moment...",
                "Checking your browser",
                "Please wait",
                "One more step",
                "Verifying you are human",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            body_marker: "cf-browser-verification".to_string(),
            title_timeout: Duration::from_secs(45),
            content_timeout: Duration::from_secs(15),
            min_text_length: 100,
            settle_delay: Duration::from_secs(2),
            recheck_delay: Duration::from_secs(5),
            body_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Randomized pause between consecutive targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub const NONE: DelayRange = DelayRange {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    /// Draw a delay uniformly from `[min, max]`.
    pub fn sample(&self) -> Duration {
        use rand::Rng;
        if self.max <= self.min {
            return self.min;
        }
        let ms = rand::thread_rng().gen_range(self.min.as_millis()..=self.max.as_millis());
        Duration::from_millis(ms as u64)
    }
}

impl Default for DelayRange {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(2),
            max: Duration::from_secs(5),
        }
    }
}

/// Every tunable of a collection run.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub navigation_timeout: Duration,
    /// Quiet window that counts as network idle.
    pub network_idle: Duration,
    /// Upper bound on the network-idle wait.
    pub network_idle_timeout: Duration,
    pub challenge: ChallengeConfig,
    pub delay: DelayRange,
    pub browser: BrowserSettings,
    /// Maximum number of `<img>` elements inspected for UX clues.
    pub image_sample_limit: usize,
    /// Maximum number of `dataLayer` pushes summarized.
    pub datalayer_sample_limit: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(90),
            network_idle: Duration::from_millis(500),
            network_idle_timeout: Duration::from_secs(10),
            challenge: ChallengeConfig::default(),
            delay: DelayRange::default(),
            browser: BrowserSettings::default(),
            image_sample_limit: 20,
            datalayer_sample_limit: 5,
        }
    }
}

/// Resolve the target list path: explicit, `DEEPSTACK_TARGETS`, then
/// `urls_to_analyze.txt` in the working directory.
pub fn resolve_targets_path(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }
    if let Ok(env_path) = std::env::var("DEEPSTACK_TARGETS") {
        return PathBuf::from(env_path);
    }
    PathBuf::from(DEFAULT_TARGETS_FILE)
}

/// Resolve the report directory: explicit, `DEEPSTACK_OUTPUT_DIR`, then `output`.
pub fn resolve_output_dir(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }
    if let Ok(env_path) = std::env::var("DEEPSTACK_OUTPUT_DIR") {
        return PathBuf::from(env_path);
    }
    PathBuf::from("output")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CollectorConfig::default();
        assert_eq!(config.navigation_timeout, Duration::from_secs(90));
        assert_eq!(config.challenge.title_timeout, Duration::from_secs(45));
        assert_eq!(config.challenge.title_indicators.len(), 5);
        assert_eq!(config.browser.viewport, (1920, 1080));
        assert_eq!(config.image_sample_limit, 20);
    }

    #[test]
    fn test_delay_sample_in_range() {
        let range = DelayRange::default();
        for _ in 0..50 {
            let d = range.sample();
            assert!(d >= range.min && d <= range.max);
        }
        assert_eq!(DelayRange::NONE.sample(), Duration::ZERO);
    }

    #[test]
    fn test_explicit_paths_win() {
        assert_eq!(resolve_targets_path(Some("t.txt")), PathBuf::from("t.txt"));
        assert_eq!(resolve_output_dir(Some("/tmp/out")), PathBuf::from("/tmp/out"));
    }
}
