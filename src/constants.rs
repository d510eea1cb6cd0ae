//! # Resolution Constants
//!
//! Strategy names, priorities, template variables, size limits, and network
//! settings used throughout the crate. These constants are the single source
//! of truth for values that callers observe (strategy names in events) and
//! for bounds that protect the pipeline from oversized inputs.
//!
//! ## Cross-References
//!
//! - [`crate::strategies`]: Uses names, priorities and file names
//! - [`crate::template`]: Uses the template variable names
//! - [`crate::engine`]: Uses the buffering and channel limits
//! - [`crate::versions`]: Uses cache and catalog settings

use std::time::Duration;

// =============================================================================
// Strategy Identity
// =============================================================================
//
// Names are surfaced to callers through `ResolveEvent::Resolver` and must stay
// stable. Priorities decide the winner when several strategies are satisfied;
// higher wins, equal priorities fall back to list order.
// =============================================================================

/// Name of the plain Dockerfile strategy.
pub const STANDARD_DOCKERFILE_NAME: &str = "Standard Dockerfile";

/// Name of the `Dockerfile.template` strategy.
pub const TEMPLATE_DOCKERFILE_NAME: &str = "Dockerfile.template";

/// Name of the architecture/device-type specific strategy.
pub const ARCH_DOCKERFILE_NAME: &str = "Architecture-specific Dockerfile";

/// Name of the `package.json` strategy.
pub const NODE_RESOLVER_NAME: &str = "NodeJS";

/// Priority of the plain Dockerfile strategy.
pub const STANDARD_DOCKERFILE_PRIORITY: i32 = 0;

/// Priority of the `Dockerfile.template` strategy.
pub const TEMPLATE_DOCKERFILE_PRIORITY: i32 = 2;

/// Priority of the architecture-specific strategy.
///
/// Ranked above the template strategy so that a file written for one
/// architecture or device always beats the generic template.
pub const ARCH_DOCKERFILE_PRIORITY: i32 = 3;

/// Priority of the `package.json` strategy.
pub const NODE_RESOLVER_PRIORITY: i32 = 0;

// =============================================================================
// File Names
// =============================================================================

/// Canonical name of a resolved Dockerfile.
pub const DOCKERFILE: &str = "Dockerfile";

/// Base name of a Dockerfile template.
pub const DOCKERFILE_TEMPLATE: &str = "Dockerfile.template";

/// Prefix shared by every Dockerfile variant (`Dockerfile.<ext>`).
pub const DOCKERFILE_VARIANT_PREFIX: &str = "Dockerfile.";

/// Extension of template files.
pub const TEMPLATE_EXTENSION: &str = "template";

/// Package manifest read by the NodeJS strategy.
pub const PACKAGE_JSON: &str = "package.json";

/// Native build marker (node-waf).
pub const WSCRIPT: &str = "wscript";

/// Extension of node-gyp build files.
pub const GYP_EXTENSION: &str = ".gyp";

/// npm lifecycle scripts that require the full source tree at install time.
pub const INSTALL_SCRIPT_KEYS: [&str; 3] = ["preinstall", "install", "postinstall"];

// =============================================================================
// Template Variables
// =============================================================================
//
// Two naming schemes exist for historical reasons. Both map to the same two
// values taken from the bundle target.
// =============================================================================

/// Legacy architecture variable.
pub const RESIN_ARCH: &str = "RESIN_ARCH";

/// Legacy device type variable.
pub const RESIN_MACHINE_NAME: &str = "RESIN_MACHINE_NAME";

/// Current architecture variable.
pub const BALENA_ARCH: &str = "BALENA_ARCH";

/// Current device type variable.
pub const BALENA_MACHINE_NAME: &str = "BALENA_MACHINE_NAME";

// =============================================================================
// Pipeline Limits
// =============================================================================

/// Maximum size of a single entry that a strategy asks to buffer (16 MiB).
///
/// **Security**: Interesting entries are read fully into memory. Dockerfiles
/// and manifests are small; anything larger is rejected instead of buffered.
pub const MAX_BUFFERED_ENTRY_SIZE: u64 = 16 * 1024 * 1024;

/// Number of output chunks that may be queued before the pipeline blocks.
///
/// Bounds memory when the consumer reads slower than the archive is produced.
pub const OUTPUT_CHANNEL_CAPACITY: usize = 32;

/// Size of the buffer in front of the output channel (64 KiB).
///
/// Tar headers and small entries are coalesced into chunks of this size
/// before being handed to the consumer.
pub const OUTPUT_CHUNK_SIZE: usize = 64 * 1024;

/// File mode of entries synthesized by the pipeline.
pub const SYNTHESIZED_FILE_MODE: u32 = 0o644;

/// Gzip magic bytes, used to detect compressed input archives.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

// =============================================================================
// Version Catalog
// =============================================================================

/// How long cached catalog lookups remain valid (1 hour).
pub const VERSION_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Maximum number of device types kept in the version cache.
pub const VERSION_CACHE_CAPACITY: usize = 64;

/// Docker Hub repository API used to list node base image tags.
pub const DOCKER_HUB_REPOSITORIES_URL: &str = "https://hub.docker.com/v2/repositories";

/// Image namespace of the node base images.
pub const BASE_IMAGE_NAMESPACE: &str = "resin";

/// Page size requested from Docker Hub.
pub const TAGS_PAGE_SIZE: usize = 100;

/// Upper bound on pages followed for a single repository.
///
/// **Security**: A misbehaving registry returning endless `next` links
/// cannot keep a resolution running forever.
pub const MAX_TAG_PAGES: usize = 50;

/// Timeout for a single catalog request.
pub const CATALOG_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for connecting to the catalog.
pub const CATALOG_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// User agent sent to the catalog.
pub const CATALOG_USER_AGENT: &str = concat!("bundle-resolve/", env!("CARGO_PKG_VERSION"));
