//! `deepstack [--url <url>]`: collect signals for one URL or the target list.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use deepstack_signals::{load_targets, normalize_target, LoadedTargets, SignatureRegistry};

use crate::batch::BatchRunner;
use crate::cli::summary;
use crate::config::{resolve_output_dir, resolve_targets_path, CollectorConfig, DelayRange};
use crate::error::CollectError;
use crate::output::{report_path, write_report};
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::Renderer;

/// Options of a collection run, as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct CollectArgs {
    pub url: Option<String>,
    pub targets: Option<String>,
    pub output_dir: Option<String>,
    pub signatures: Option<String>,
    pub chromium: Option<String>,
    pub headful: bool,
    /// Navigation timeout in seconds.
    pub nav_timeout: Option<u64>,
    pub no_delay: bool,
    pub quiet: bool,
}

/// Everything a run needs before a browser is started.
pub struct CollectPlan {
    pub targets: Vec<String>,
    /// Set when a single URL was given; selects the per-domain report name.
    pub single_target: Option<String>,
    pub registry: SignatureRegistry,
    pub config: CollectorConfig,
    pub output_dir: PathBuf,
    pub quiet: bool,
}

impl CollectArgs {
    fn config(&self) -> CollectorConfig {
        let mut config = CollectorConfig::default();
        if let Some(secs) = self.nav_timeout {
            config.navigation_timeout = Duration::from_secs(secs);
        }
        if self.no_delay {
            config.delay = DelayRange::NONE;
        }
        config.browser.headless = !self.headful;
        config.browser.chromium_path = self.chromium.as_ref().map(PathBuf::from);
        config
    }

    fn registry(&self) -> Result<SignatureRegistry> {
        let registry = match &self.signatures {
            Some(path) => SignatureRegistry::from_path(Path::new(path))
                .with_context(|| format!("failed to load signatures from {path}"))?,
            None => SignatureRegistry::builtin().context("built-in signatures are invalid")?,
        };
        if !registry.rejected().is_empty() {
            tracing::warn!(
                rejected = registry.rejected().len(),
                "some signature patterns were rejected and will not match"
            );
        }
        Ok(registry)
    }

    /// Resolve targets, signatures, and configuration. `None` means there is
    /// nothing to do: the target file was just created as a template, or it
    /// lists no URLs.
    pub fn plan(&self) -> Result<Option<CollectPlan>> {
        let registry = self.registry()?;

        let (targets, single_target) = match &self.url {
            Some(url) => {
                let target = normalize_target(url);
                (vec![target.clone()], Some(target))
            }
            None => {
                let path = resolve_targets_path(self.targets.as_deref());
                match load_targets(&path)? {
                    LoadedTargets::TemplateCreated => {
                        if !self.quiet {
                            println!(
                                "Created {}. Add URLs to it, one per line, and run again.",
                                path.display()
                            );
                        }
                        return Ok(None);
                    }
                    LoadedTargets::Targets(targets) if targets.is_empty() => {
                        if !self.quiet {
                            println!("No URLs found in {}.", path.display());
                        }
                        return Ok(None);
                    }
                    LoadedTargets::Targets(targets) => (targets, None),
                }
            }
        };

        Ok(Some(CollectPlan {
            targets,
            single_target,
            registry,
            config: self.config(),
            output_dir: resolve_output_dir(self.output_dir.as_deref()),
            quiet: self.quiet,
        }))
    }
}

/// Run a plan against an already started renderer and write the report.
/// Returns the report path.
pub async fn collect(plan: &CollectPlan, renderer: &dyn Renderer) -> Result<PathBuf> {
    if !plan.quiet {
        println!("Collecting signals for {} URL(s)...", plan.targets.len());
    }
    let report = BatchRunner::new(renderer, &plan.registry, &plan.config)
        .run(&plan.targets)
        .await;

    let path = report_path(&plan.output_dir, plan.single_target.as_deref());
    write_report(&report, &path)?;

    if !plan.quiet {
        print!("{}", summary::render(&report));
        println!("\nResults saved to {}", path.display());
    }
    Ok(path)
}

/// Run the collect command end to end with Chromium.
pub async fn run(args: CollectArgs) -> Result<()> {
    let Some(plan) = args.plan()? else {
        return Ok(());
    };

    let renderer = ChromiumRenderer::launch(plan.config.browser.clone())
        .await
        .map_err(|e| CollectError::Launch(format!("{e:#}")))?;
    tracing::info!("Chromium renderer initialized");

    let outcome = collect(&plan, &renderer).await;
    if let Err(e) = renderer.shutdown().await {
        tracing::warn!("failed to shut down browser: {e:#}");
    }
    outcome.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_url_plan() {
        let args = CollectArgs {
            url: Some("www.acme.test".into()),
            output_dir: Some("out".into()),
            nav_timeout: Some(30),
            no_delay: true,
            headful: true,
            quiet: true,
            ..Default::default()
        };
        let plan = args.plan().unwrap().unwrap();
        assert_eq!(plan.targets, vec!["https://www.acme.test"]);
        assert_eq!(plan.single_target.as_deref(), Some("https://www.acme.test"));
        assert_eq!(plan.output_dir, PathBuf::from("out"));
        assert_eq!(plan.config.navigation_timeout, Duration::from_secs(30));
        assert_eq!(plan.config.delay, DelayRange::NONE);
        assert!(!plan.config.browser.headless);
    }

    #[test]
    fn test_missing_target_file_creates_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.txt");
        let args = CollectArgs {
            targets: Some(path.display().to_string()),
            quiet: true,
            ..Default::default()
        };
        assert!(args.plan().unwrap().is_none());
        assert!(path.exists());
        // Template only holds a comment, so a second run still has nothing to do.
        assert!(args.plan().unwrap().is_none());
    }

    #[test]
    fn test_target_file_plan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.txt");
        std::fs::write(&path, "# list\nacme.test\n\nhttp://b.test\n").unwrap();
        let args = CollectArgs {
            targets: Some(path.display().to_string()),
            quiet: true,
            ..Default::default()
        };
        let plan = args.plan().unwrap().unwrap();
        assert_eq!(plan.targets, vec!["https://acme.test", "http://b.test"]);
        assert!(plan.single_target.is_none());
    }

    #[test]
    fn test_bad_signature_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sig.json");
        std::fs::write(&path, "{ not json").unwrap();
        let args = CollectArgs {
            url: Some("acme.test".into()),
            signatures: Some(path.display().to_string()),
            ..Default::default()
        };
        assert!(args.plan().is_err());
    }
}
