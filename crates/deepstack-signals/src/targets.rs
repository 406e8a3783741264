//! Target list file: newline-delimited URLs, `#` comments, blank lines.

use std::path::Path;

use crate::domain::normalize_target;
use crate::error::TargetsError;

/// Default name of the target list.
pub const DEFAULT_TARGETS_FILE: &str = "urls_to_analyze.txt";

const TEMPLATE: &str = "# Add URLs here, one per line (e.g., https://www.example.com)\n";

/// Result of reading the target list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadedTargets {
    /// Normalized URLs in file order.
    Targets(Vec<String>),
    /// The file was missing and an empty template was written in its place.
    TemplateCreated,
}

/// Parse target-list text into normalized URLs.
pub fn parse_targets(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(normalize_target)
        .collect()
}

/// Read the target list at `path`, creating a template if it does not exist.
pub fn load_targets(path: &Path) -> Result<LoadedTargets, TargetsError> {
    if !path.exists() {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| TargetsError::CreateTemplate {
                path: path.display().to_string(),
                source,
            })?;
        }
        std::fs::write(path, TEMPLATE).map_err(|source| TargetsError::CreateTemplate {
            path: path.display().to_string(),
            source,
        })?;
        tracing::info!(path = %path.display(), "target file not found, created template");
        return Ok(LoadedTargets::TemplateCreated);
    }

    let contents = std::fs::read_to_string(path).map_err(|source| TargetsError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Ok(LoadedTargets::Targets(parse_targets(&contents)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let targets = parse_targets("# header\n\nexample.com\n  https://a.test/x  \n#skip.test\n");
        assert_eq!(targets, vec!["https://example.com", "https://a.test/x"]);
    }

    #[test]
    fn test_missing_file_creates_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(DEFAULT_TARGETS_FILE);
        assert_eq!(load_targets(&path).unwrap(), LoadedTargets::TemplateCreated);
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# Add URLs here"));
        // The template itself holds no targets.
        assert_eq!(
            load_targets(&path).unwrap(),
            LoadedTargets::Targets(Vec::new())
        );
    }

    #[test]
    fn test_existing_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_TARGETS_FILE);
        std::fs::write(&path, "acme.test\nhttp://plain.test\n").unwrap();
        assert_eq!(
            load_targets(&path).unwrap(),
            LoadedTargets::Targets(vec![
                "https://acme.test".to_string(),
                "http://plain.test".to_string()
            ])
        );
    }
}
