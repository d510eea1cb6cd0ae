//! Plain `Dockerfile` projects.
//!
//! No processing is applied: the collected Dockerfile is used exactly as
//! found. This strategy is also the fallback for a caller-specified file
//! that no other strategy recognizes.

use crate::bundle::Target;
use crate::constants::{DOCKERFILE, STANDARD_DOCKERFILE_NAME, STANDARD_DOCKERFILE_PRIORITY};
use crate::error::{Error, Result};
use crate::path::{basename, is_top_level};
use crate::strategy::{FileInfo, Strategy};
use async_trait::async_trait;
use tracing::debug;

/// Resolves projects containing a plain `Dockerfile`.
#[derive(Debug, Default)]
pub struct DockerfileStrategy {
    dockerfile: Option<FileInfo>,
    contents: Option<String>,
}

impl DockerfileStrategy {
    /// Creates a new strategy.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Strategy for DockerfileStrategy {
    fn name(&self) -> &'static str {
        STANDARD_DOCKERFILE_NAME
    }

    fn priority(&self) -> i32 {
        STANDARD_DOCKERFILE_PRIORITY
    }

    fn needs_entry(&self, path: &str) -> bool {
        basename(path) == DOCKERFILE
    }

    fn entry(&mut self, file: FileInfo) {
        // A root-level Dockerfile wins over nested ones; otherwise first seen.
        let replace = match &self.dockerfile {
            None => true,
            Some(current) => !is_top_level(current.name()) && is_top_level(file.name()),
        };
        if replace {
            debug!("Dockerfile candidate: {}", file.name());
            self.dockerfile = Some(file);
        }
    }

    fn is_satisfied(&self, _target: &Target) -> bool {
        self.dockerfile.is_some()
    }

    async fn resolve(&mut self, _target: &Target, specified: Option<&str>) -> Result<Vec<FileInfo>> {
        let file = self
            .dockerfile
            .as_ref()
            .ok_or_else(|| Error::NotSatisfied(self.name().to_string()))?;
        self.contents = Some(file.text());

        let output = match specified {
            Some(path) => vec![FileInfo::new(self.canonical_name(path), file.contents().clone())],
            // The root Dockerfile already passes through the archive unchanged.
            None if file.name() == DOCKERFILE => Vec::new(),
            None => vec![FileInfo::new(DOCKERFILE, file.contents().clone())],
        };
        Ok(output)
    }

    fn dockerfile_contents(&self) -> Option<&str> {
        self.contents.as_deref()
    }

    fn canonical_name(&self, specified: &str) -> String {
        specified.to_string()
    }
}
