//! Error types for bundle resolution.

use std::time::Duration;

/// Result type alias for resolution operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving a bundle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Resolution Errors
    // =========================================================================
    /// No strategy was satisfied by the archive contents.
    #[error("resolution could not be performed: no strategy was satisfied")]
    NoResolution,

    /// The caller-specified Dockerfile never appeared in the archive.
    #[error("specified dockerfile could not be resolved: {0}")]
    SpecifiedDockerfileNotFound(String),

    /// A strategy was asked to resolve without a usable candidate.
    #[error("resolve called on '{0}' without a satisfied candidate")]
    NotSatisfied(String),

    // =========================================================================
    // Template Errors
    // =========================================================================
    /// A template references a variable that cannot be resolved.
    #[error("template variable '{name}' is not defined")]
    TemplateVariable { name: String },

    /// A template file is not valid UTF-8.
    #[error("template '{file}' is not valid UTF-8")]
    TemplateEncoding { file: String },

    // =========================================================================
    // Manifest Errors
    // =========================================================================
    /// The manifest could not be parsed.
    #[error("{file}: {source}")]
    ManifestParse {
        file: String,
        #[source]
        source: serde_json::Error,
    },

    /// The manifest parsed but has the wrong shape.
    #[error("{file}: {reason}")]
    ManifestInvalid { file: String, reason: String },

    // =========================================================================
    // Version Catalog Errors
    // =========================================================================
    /// No cataloged runtime version matches the requested range.
    #[error("couldn't satisfy node version '{range}' for device type '{device_type}'")]
    VersionNotSatisfiable { device_type: String, range: String },

    /// A version range could not be parsed.
    #[error("invalid version range '{range}': {reason}")]
    InvalidVersionRange { range: String, reason: String },

    /// The version catalog could not be queried.
    #[error("failed to query versions for '{device_type}': {reason}")]
    VersionCatalog { device_type: String, reason: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    // =========================================================================
    // Archive Errors
    // =========================================================================
    /// An entry that must be buffered exceeds the configured limit.
    #[error("entry '{name}' is too large to buffer: {size} > {limit} bytes")]
    EntryTooLarge { name: String, size: u64, limit: u64 },

    /// Generic I/O error from the input or output stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // =========================================================================
    // Hook Errors
    // =========================================================================
    /// The Dockerfile hook reported a failure.
    #[error("dockerfile hook failed: {0}")]
    Hook(#[source] anyhow::Error),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if the error came from the underlying streams rather
    /// than from the resolution logic.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
