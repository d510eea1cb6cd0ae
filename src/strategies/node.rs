//! npm projects without a Dockerfile.
//!
//! A root `package.json` is enough to synthesize a Dockerfile on top of the
//! device's node base image. The image tag comes from `engines.node` when
//! the manifest pins one.
//!
//! Projects with install-time scripts (or native build files) need the full
//! source tree before `npm install`; the rest copy only the manifest first so
//! the dependency layer is reused across source changes.

use crate::bundle::Target;
use crate::constants::{
    BASE_IMAGE_NAMESPACE, DOCKERFILE, GYP_EXTENSION, INSTALL_SCRIPT_KEYS, NODE_RESOLVER_NAME,
    NODE_RESOLVER_PRIORITY, PACKAGE_JSON, WSCRIPT,
};
use crate::error::{Error, Result};
use crate::path::basename;
use crate::strategy::{FileInfo, Strategy};
use crate::versions::{self, VersionCatalog};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Resolves npm projects from their `package.json`.
pub struct NodeStrategy {
    catalog: Arc<dyn VersionCatalog>,
    manifest: Option<FileInfo>,
    has_build_scripts: bool,
    contents: Option<String>,
}

impl NodeStrategy {
    /// Creates a strategy backed by the shared Docker Hub catalog.
    pub fn new() -> Self {
        Self::with_catalog(versions::shared_catalog())
    }

    /// Creates a strategy resolving `engines.node` through `catalog`.
    pub fn with_catalog(catalog: Arc<dyn VersionCatalog>) -> Self {
        Self {
            catalog,
            manifest: None,
            has_build_scripts: false,
            contents: None,
        }
    }

    async fn base_image(&self, target: &Target, manifest: &Value) -> Result<String> {
        let image = format!("{}/{}-node", BASE_IMAGE_NAMESPACE, target.device_type);

        let Some(range) = manifest
            .get("engines")
            .and_then(|engines| engines.get("node"))
            .and_then(Value::as_str)
        else {
            return Ok(image);
        };

        let version =
            versions::resolve_version(self.catalog.as_ref(), &target.device_type, range).await?;
        info!("Resolved node '{}' to {} for {}", range, version, target.device_type);
        Ok(format!("{image}:{version}"))
    }
}

impl Default for NodeStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NodeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeStrategy")
            .field("manifest", &self.manifest.as_ref().map(FileInfo::name))
            .field("has_build_scripts", &self.has_build_scripts)
            .finish_non_exhaustive()
    }
}

/// Returns true if the manifest declares an install lifecycle script.
fn has_install_scripts(manifest: &Value) -> bool {
    manifest
        .get("scripts")
        .and_then(Value::as_object)
        .is_some_and(|scripts| INSTALL_SCRIPT_KEYS.iter().any(|key| scripts.contains_key(*key)))
}

fn dockerfile(image: &str, has_scripts: bool) -> String {
    if has_scripts {
        format!(
            "FROM {image}\n\
             WORKDIR /usr/src/app\n\
             RUN ln -s /usr/src/app /app\n\
             COPY . /usr/src/app\n\
             RUN DEBIAN_FRONTEND=noninteractive JOBS=MAX npm install --unsafe-perm\n\
             CMD [ \"npm\", \"start\" ]\n"
        )
    } else {
        format!(
            "FROM {image}\n\
             WORKDIR /usr/src/app\n\
             RUN ln -s /usr/src/app /app\n\
             \n\
             COPY package.json .\n\
             RUN DEBIAN_FRONTEND=noninteractive JOBS=MAX npm install --unsafe-perm\n\
             \n\
             COPY . ./\n\
             CMD [\"npm\", \"start\"]\n"
        )
    }
}

#[async_trait]
impl Strategy for NodeStrategy {
    fn name(&self) -> &'static str {
        NODE_RESOLVER_NAME
    }

    fn priority(&self) -> i32 {
        NODE_RESOLVER_PRIORITY
    }

    fn allow_specified_dockerfile(&self) -> bool {
        false
    }

    fn notice(&mut self, path: &str) {
        let base = basename(path);
        if base == WSCRIPT || base.ends_with(GYP_EXTENSION) {
            debug!("Native build file found: {}", path);
            self.has_build_scripts = true;
        }
    }

    fn needs_entry(&self, path: &str) -> bool {
        path == PACKAGE_JSON
    }

    fn entry(&mut self, file: FileInfo) {
        self.manifest = Some(file);
    }

    fn is_satisfied(&self, _target: &Target) -> bool {
        self.manifest.is_some()
    }

    async fn resolve(&mut self, target: &Target, _specified: Option<&str>) -> Result<Vec<FileInfo>> {
        let file = self
            .manifest
            .as_ref()
            .ok_or_else(|| Error::NotSatisfied(self.name().to_string()))?;

        let manifest: Value =
            serde_json::from_slice(file.contents()).map_err(|source| Error::ManifestParse {
                file: PACKAGE_JSON.to_string(),
                source,
            })?;
        if !manifest.is_object() {
            return Err(Error::ManifestInvalid {
                file: PACKAGE_JSON.to_string(),
                reason: "must be a JSON object".to_string(),
            });
        }

        let has_scripts = self.has_build_scripts || has_install_scripts(&manifest);
        let image = self.base_image(target, &manifest).await?;
        debug!("Synthesizing node Dockerfile from {} (scripts: {})", image, has_scripts);

        let contents = dockerfile(&image, has_scripts);
        let output = FileInfo::new(DOCKERFILE, contents.clone().into_bytes());
        self.contents = Some(contents);
        Ok(vec![output])
    }

    fn dockerfile_contents(&self) -> Option<&str> {
        self.contents.as_deref()
    }

    fn canonical_name(&self, _specified: &str) -> String {
        DOCKERFILE.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::versions::StaticCatalog;

    fn strategy() -> NodeStrategy {
        NodeStrategy::with_catalog(Arc::new(StaticCatalog::new(["6.14.4", "8.1.0", "8.11.3"])))
    }

    fn with_manifest(manifest: &'static str) -> NodeStrategy {
        let mut strategy = strategy();
        strategy.entry(FileInfo::new(PACKAGE_JSON, manifest.as_bytes()));
        strategy
    }

    #[test]
    fn test_needs_only_root_manifest() {
        let strategy = strategy();
        assert!(strategy.needs_entry("package.json"));
        assert!(!strategy.needs_entry("lib/package.json"));
        assert!(!strategy.needs_entry("binding.gyp"));
        assert!(!strategy.allow_specified_dockerfile());
    }

    #[tokio::test]
    async fn test_without_scripts_copies_manifest_first() {
        let target = Target::new("raspberrypi3", "armv7hf");
        let mut strategy = with_manifest(r#"{"name": "app", "scripts": {"start": "node ."}}"#);

        assert!(strategy.is_satisfied(&target));
        let files = strategy.resolve(&target, None).await.unwrap();
        assert_eq!(files[0].name(), "Dockerfile");

        let text = files[0].text();
        assert!(text.starts_with("FROM resin/raspberrypi3-node\n"));
        assert!(text.contains("COPY package.json .\n"));
        assert!(text.contains("CMD [\"npm\", \"start\"]"));
    }

    #[tokio::test]
    async fn test_install_script_copies_tree() {
        let target = Target::new("raspberrypi3", "armv7hf");
        let mut strategy = with_manifest(r#"{"scripts": {"postinstall": "make"}}"#);

        strategy.resolve(&target, None).await.unwrap();
        let text = strategy.dockerfile_contents().unwrap();
        assert!(text.contains("COPY . /usr/src/app\n"));
        assert!(!text.contains("COPY package.json"));
    }

    #[tokio::test]
    async fn test_build_marker_copies_tree() {
        let target = Target::new("intel-nuc", "amd64");
        let mut strategy = with_manifest("{}");
        strategy.notice("src/binding.gyp");

        strategy.resolve(&target, None).await.unwrap();
        assert!(strategy.dockerfile_contents().unwrap().contains("CMD [ \"npm\", \"start\" ]"));
    }

    #[tokio::test]
    async fn test_engines_node_pins_tag() {
        let target = Target::new("raspberrypi3", "armv7hf");
        let mut strategy = with_manifest(r#"{"engines": {"node": "^8.1.0"}}"#);

        strategy.resolve(&target, None).await.unwrap();
        assert!(
            strategy
                .dockerfile_contents()
                .unwrap()
                .starts_with("FROM resin/raspberrypi3-node:8.11.3\n")
        );
    }

    #[tokio::test]
    async fn test_engines_node_unsatisfiable() {
        let mut strategy = with_manifest(r#"{"engines": {"node": ">=20"}}"#);
        let err = strategy.resolve(&Target::new("dt", "arch"), None).await.unwrap_err();
        assert!(matches!(err, Error::VersionNotSatisfiable { .. }));
    }

    #[tokio::test]
    async fn test_invalid_manifest() {
        let mut strategy = with_manifest("{ not json");
        let err = strategy.resolve(&Target::default(), None).await.unwrap_err();
        assert!(matches!(err, Error::ManifestParse { .. }));
        assert!(err.to_string().starts_with("package.json: "));

        let mut strategy = with_manifest("[1, 2]");
        let err = strategy.resolve(&Target::default(), None).await.unwrap_err();
        assert_eq!(err.to_string(), "package.json: must be a JSON object");
    }
}
