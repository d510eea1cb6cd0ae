//! # bundle-resolve
//!
//! **Streaming Build-Context Resolution**
//!
//! Turns a project archive into a Docker-compatible build context for one
//! device. The archive is streamed through a set of pluggable strategies,
//! each recognizing one kind of project; the winner produces the Dockerfile
//! and the archive is re-packed with it, entry by entry.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          bundle-resolve                             │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  Bundle (tar / tar.gz reader, Target, Dockerfile hook)              │
//! │                              │                                      │
//! │  ┌───────────────────────────▼─────────────────────────────────┐    │
//! │  │                    Resolution Engine                        │    │
//! │  │   normalize → notice → needs_entry → entry → decide → emit  │    │
//! │  └───────────────────────────┬─────────────────────────────────┘    │
//! │                              │                                      │
//! │  ┌───────────────────────────▼─────────────────────────────────┐    │
//! │  │                     Strategy Trait                          │    │
//! │  │  is_satisfied(target) → resolve(target, specified)          │    │
//! │  └─────────────────────────────────────────────────────────────┘    │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                        Built-in Strategies                          │
//! │  ┌────────────┐ ┌─────────────────────┐ ┌──────────────┐ ┌────────┐ │
//! │  │ Dockerfile │ │ Dockerfile.template │ │ Dockerfile.  │ │ NodeJS │ │
//! │  │ (prio 0)   │ │ (prio 2)            │ │ <arch|device>│ │(prio 0)│ │
//! │  │            │ │ %%VAR%% substitution│ │ (prio 3)     │ │ semver │ │
//! │  └────────────┘ └─────────────────────┘ └──────────────┘ └────────┘ │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modes
//!
//! Without a specified Dockerfile every entry is offered to every strategy
//! and the highest-priority satisfied one wins once the archive ends. With a
//! specified path (docker-compose `dockerfile:`) only that entry decides, the
//! moment it is read.
//!
//! # Template Variables
//!
//! | Variable | Value |
//! |----------|-------|
//! | `%%RESIN_ARCH%%`, `%%BALENA_ARCH%%` | Target architecture |
//! | `%%RESIN_MACHINE_NAME%%`, `%%BALENA_MACHINE_NAME%%` | Target device type |
//!
//! # Example
//!
//! ```rust,ignore
//! use bundle_resolve::{Bundle, ResolveOptions, default_strategies, resolve_to_vec};
//!
//! #[tokio::main]
//! async fn main() -> bundle_resolve::Result<()> {
//!     let archive = std::fs::File::open("project.tar")?;
//!     let bundle = Bundle::new(archive, "raspberrypi3", "armv7hf")
//!         .with_dockerfile_hook(|dockerfile| async move {
//!             println!("{dockerfile}");
//!             Ok(())
//!         });
//!
//!     let (context, resolution) =
//!         resolve_to_vec(bundle, default_strategies(), ResolveOptions::default()).await?;
//!     println!("{} ({} bytes)", resolution.resolver, context.len());
//!     Ok(())
//! }
//! ```

pub mod bundle;
pub mod constants;
pub mod engine;
pub mod error;
pub mod path;
pub mod strategies;
pub mod strategy;
pub mod template;
pub mod versions;

// Re-exports
pub use bundle::{Bundle, DockerfileHook, Target};
pub use constants::*;
pub use engine::{
    Completion, OutputStream, Resolution, ResolveEvent, ResolveHandle, ResolveOptions,
    resolve_input, resolve_to_vec,
};
pub use error::{Error, Result};
pub use path::normalize_tar_entry;
pub use strategies::{ArchDockerfileStrategy, DockerfileStrategy, NodeStrategy, TemplateStrategy};
pub use strategy::{FileInfo, Strategy};
pub use versions::{
    CachedCatalog, DockerHubCatalog, StaticCatalog, VersionCatalog, VersionRange, resolve_version,
    shared_catalog,
};

/// Returns a fresh set of the built-in strategies, in tie-break order.
///
/// Standard, Template, Architecture-specific, NodeJS. The NodeJS strategy
/// uses the shared Docker Hub catalog.
pub fn default_strategies() -> Vec<Box<dyn Strategy>> {
    vec![
        Box::new(DockerfileStrategy::new()),
        Box::new(TemplateStrategy::new()),
        Box::new(ArchDockerfileStrategy::new()),
        Box::new(NodeStrategy::new()),
    ]
}
