//! Resolution bundles.
//!
//! A [`Bundle`] is everything the engine needs for one run: the input
//! archive, the [`Target`] it is being resolved for, and an optional hook
//! that observes the final Dockerfile. Bundles are single-use; the archive
//! is consumed by [`crate::engine::resolve_input`].

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::io::Read;
use tokio::io::AsyncRead;
use tokio_util::io::SyncIoBridge;

/// Asynchronous callback receiving the final Dockerfile text.
///
/// Invoked exactly once per successful resolution. The engine waits for the
/// returned future before finishing the output archive.
pub type DockerfileHook = Box<dyn FnOnce(String) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// The device type and architecture a bundle is resolved for.
///
/// Both values are opaque: they are substituted into templates and compared
/// against Dockerfile extensions, never validated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    /// Device type slug (e.g. `raspberrypi3`).
    pub device_type: String,
    /// Architecture slug (e.g. `armv7hf`).
    pub architecture: String,
}

impl Target {
    /// Creates a target.
    pub fn new(device_type: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            device_type: device_type.into(),
            architecture: architecture.into(),
        }
    }
}

/// Input for a single resolution run.
pub struct Bundle {
    archive: Box<dyn Read + Send>,
    target: Target,
    hook: Option<DockerfileHook>,
}

impl Bundle {
    /// Creates a bundle from a blocking reader over a tar (or gzipped tar)
    /// archive.
    pub fn new(
        archive: impl Read + Send + 'static,
        device_type: impl Into<String>,
        architecture: impl Into<String>,
    ) -> Self {
        Self {
            archive: Box::new(archive),
            target: Target::new(device_type, architecture),
            hook: None,
        }
    }

    /// Creates a bundle from an asynchronous reader.
    ///
    /// The reader is bridged onto the engine's blocking worker, so it is
    /// still consumed exactly once, front to back.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn from_async_reader(
        archive: impl AsyncRead + Unpin + Send + 'static,
        device_type: impl Into<String>,
        architecture: impl Into<String>,
    ) -> Self {
        Self::new(SyncIoBridge::new(archive), device_type, architecture)
    }

    /// Creates a bundle over an in-memory archive.
    pub fn from_bytes(
        archive: impl Into<Vec<u8>>,
        device_type: impl Into<String>,
        architecture: impl Into<String>,
    ) -> Self {
        Self::new(std::io::Cursor::new(archive.into()), device_type, architecture)
    }

    /// Sets the hook called with the final Dockerfile.
    pub fn with_dockerfile_hook<F, Fut>(mut self, hook: F) -> Self
    where
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.hook = Some(Box::new(move |contents| Box::pin(hook(contents))));
        self
    }

    /// Returns the resolution target.
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Returns the device type.
    pub fn device_type(&self) -> &str {
        &self.target.device_type
    }

    /// Returns the architecture.
    pub fn architecture(&self) -> &str {
        &self.target.architecture
    }

    /// Returns true if a Dockerfile hook is installed.
    pub fn has_hook(&self) -> bool {
        self.hook.is_some()
    }

    /// Splits the bundle into the parts the engine owns separately.
    pub(crate) fn into_parts(self) -> (Box<dyn Read + Send>, Target, Option<DockerfileHook>) {
        (self.archive, self.target, self.hook)
    }
}

impl fmt::Debug for Bundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bundle")
            .field("target", &self.target)
            .field("hook", &self.hook.is_some())
            .finish_non_exhaustive()
    }
}
