//! Architecture and device-type specific Dockerfiles.
//!
//! A project may ship `Dockerfile.<arch>` and `Dockerfile.<device-type>`
//! variants side by side. The variant whose extension equals the target's
//! device type wins; failing that, the one matching the architecture. The
//! chosen file is always template-processed, even without a `.template`
//! suffix.
//!
//! Variants whose extension matches neither identifier (`Dockerfile.bak`,
//! `Dockerfile.dev`) are collected but never chosen.

use crate::bundle::Target;
use crate::constants::{
    ARCH_DOCKERFILE_NAME, ARCH_DOCKERFILE_PRIORITY, DOCKERFILE, DOCKERFILE_VARIANT_PREFIX,
    TEMPLATE_EXTENSION,
};
use crate::error::{Error, Result};
use crate::path::{basename, extension, is_top_level, remove_extension};
use crate::strategy::{FileInfo, Strategy};
use crate::template;
use async_trait::async_trait;
use tracing::debug;

/// A collected variant and its extension.
#[derive(Debug, Clone)]
struct Variant {
    extension: String,
    file: FileInfo,
}

/// Resolves projects containing `Dockerfile.<arch>` or
/// `Dockerfile.<device-type>` files.
#[derive(Debug, Default)]
pub struct ArchDockerfileStrategy {
    variants: Vec<Variant>,
    contents: Option<String>,
}

impl ArchDockerfileStrategy {
    /// Creates a new strategy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the variant to use for `target`, if any.
    ///
    /// Device type beats architecture; within a kind a root-level file beats
    /// a nested one, then arrival order decides.
    fn select(&self, target: &Target) -> Option<&Variant> {
        self.best_match(&target.device_type)
            .or_else(|| self.best_match(&target.architecture))
    }

    fn best_match(&self, identifier: &str) -> Option<&Variant> {
        if identifier.is_empty() {
            return None;
        }
        let mut matches = self.variants.iter().filter(|v| v.extension == identifier);
        let first = matches.next()?;
        if is_top_level(first.file.name()) {
            return Some(first);
        }
        matches
            .find(|v| is_top_level(v.file.name()))
            .or(Some(first))
    }
}

#[async_trait]
impl Strategy for ArchDockerfileStrategy {
    fn name(&self) -> &'static str {
        ARCH_DOCKERFILE_NAME
    }

    fn priority(&self) -> i32 {
        ARCH_DOCKERFILE_PRIORITY
    }

    fn needs_entry(&self, path: &str) -> bool {
        let base = basename(path);
        base.starts_with(DOCKERFILE_VARIANT_PREFIX) && extension(base) != Some(TEMPLATE_EXTENSION)
    }

    fn entry(&mut self, file: FileInfo) {
        let Some(ext) = extension(file.name()) else {
            return;
        };
        debug!("Collected Dockerfile variant '{}' ({})", ext, file.name());
        self.variants.push(Variant {
            extension: ext.to_string(),
            file,
        });
    }

    fn is_satisfied(&self, target: &Target) -> bool {
        self.select(target).is_some()
    }

    async fn resolve(&mut self, target: &Target, specified: Option<&str>) -> Result<Vec<FileInfo>> {
        let (file, name) = match specified {
            // A pinned file is used as-is, whatever its extension.
            Some(path) => {
                let variant = self
                    .variants
                    .iter()
                    .find(|v| v.file.name() == path)
                    .or_else(|| self.variants.first())
                    .ok_or_else(|| Error::NotSatisfied(self.name().to_string()))?;
                (&variant.file, self.canonical_name(path))
            }
            None => {
                let variant = self
                    .select(target)
                    .ok_or_else(|| Error::NotSatisfied(self.name().to_string()))?;
                (&variant.file, DOCKERFILE.to_string())
            }
        };

        debug!("Using {} as {}", file.name(), name);
        let rendered = template::render(file.name(), file.contents(), target)?;
        let output = FileInfo::new(name, rendered.clone().into_bytes());
        self.contents = Some(rendered);
        Ok(vec![output])
    }

    fn dockerfile_contents(&self) -> Option<&str> {
        self.contents.as_deref()
    }

    fn canonical_name(&self, specified: &str) -> String {
        remove_extension(specified)
    }
}
