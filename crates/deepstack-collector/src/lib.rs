//! DeepStack collector — drives a real browser through anti-bot challenges
//! and extracts a five-category technical fingerprint for each target URL.
//!
//! The pipeline is [`navigator::Navigator`] (one isolated browser context
//! per target) → [`extract::collect_bundle`] (five isolated extractors) →
//! [`batch::BatchRunner`] (serial, throttled, failure-isolating) →
//! [`output::write_report`].

pub mod batch;
pub mod challenge;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod navigator;
pub mod output;
pub mod renderer;

pub use batch::{BatchRunner, UrlState};
pub use config::{CollectorConfig, DelayRange, COLLECTOR_VERSION};
pub use error::{CollectError, ExtractError};
pub use navigator::{Navigator, PageSession};
