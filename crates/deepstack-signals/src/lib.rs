//! DeepStack signals — technology signatures, pattern matching, DOM snapshots, and the collection report model.

pub mod dom;
pub mod domain;
pub mod error;
pub mod matcher;
pub mod registry;
pub mod targets;
pub mod types;

pub use dom::{normalize_whitespace, DomSnapshot};
pub use domain::{extract_domain, normalize_target};
pub use error::{SignatureError, TargetsError};
pub use matcher::{Matcher, PatternScope};
pub use registry::{Category, SignatureRegistry, SignatureRule};
pub use targets::{load_targets, parse_targets, LoadedTargets, DEFAULT_TARGETS_FILE};
pub use types::*;
