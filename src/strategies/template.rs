//! `Dockerfile.template` projects.
//!
//! The template is rendered with the target's device type and architecture
//! (see [`crate::template`]) and written out as a plain Dockerfile.

use crate::bundle::Target;
use crate::constants::{
    DOCKERFILE, DOCKERFILE_TEMPLATE, TEMPLATE_DOCKERFILE_NAME, TEMPLATE_DOCKERFILE_PRIORITY,
};
use crate::error::{Error, Result};
use crate::path::{basename, is_top_level, remove_extension};
use crate::strategy::{FileInfo, Strategy};
use crate::template;
use async_trait::async_trait;
use tracing::debug;

/// Resolves projects containing a `Dockerfile.template`.
#[derive(Debug, Default)]
pub struct TemplateStrategy {
    template: Option<FileInfo>,
    contents: Option<String>,
}

impl TemplateStrategy {
    /// Creates a new strategy.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Strategy for TemplateStrategy {
    fn name(&self) -> &'static str {
        TEMPLATE_DOCKERFILE_NAME
    }

    fn priority(&self) -> i32 {
        TEMPLATE_DOCKERFILE_PRIORITY
    }

    fn needs_entry(&self, path: &str) -> bool {
        basename(path) == DOCKERFILE_TEMPLATE
    }

    fn entry(&mut self, file: FileInfo) {
        let replace = match &self.template {
            None => true,
            Some(current) => !is_top_level(current.name()) && is_top_level(file.name()),
        };
        if replace {
            self.template = Some(file);
        }
    }

    fn is_satisfied(&self, _target: &Target) -> bool {
        self.template.is_some()
    }

    async fn resolve(&mut self, target: &Target, specified: Option<&str>) -> Result<Vec<FileInfo>> {
        let file = self
            .template
            .as_ref()
            .ok_or_else(|| Error::NotSatisfied(self.name().to_string()))?;

        let rendered = template::render(file.name(), file.contents(), target)?;
        let name = match specified {
            Some(path) => self.canonical_name(path),
            None => DOCKERFILE.to_string(),
        };
        debug!("Rendered {} into {}", file.name(), name);

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
