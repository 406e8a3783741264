//! Error types for the signal library.

/// Failures while loading a signature table.
#[derive(thiserror::Error, Debug)]
pub enum SignatureError {
    #[error("failed to read signature file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid signature table: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failures while reading the target list.
#[derive(thiserror::Error, Debug)]
pub enum TargetsError {
    #[error("could not read target file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not create target file template {path}: {source}")]
    CreateTemplate {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
