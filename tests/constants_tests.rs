//! Tests for constants module.
//!
//! Strategy names are observable by callers and must not drift; limits
//! must stay within sane bounds.

use bundle_resolve::*;
use std::time::Duration;

// =============================================================================
// Strategy Identity Tests
// =============================================================================

#[test]
fn test_strategy_names_are_stable() {
    assert_eq!(STANDARD_DOCKERFILE_NAME, "Standard Dockerfile");
    assert_eq!(TEMPLATE_DOCKERFILE_NAME, "Dockerfile.template");
    assert_eq!(ARCH_DOCKERFILE_NAME, "Architecture-specific Dockerfile");
    assert_eq!(NODE_RESOLVER_NAME, "NodeJS");
}

#[test]
fn test_priority_ordering() {
    // A file written for one target beats the generic template, which beats
    // the plain Dockerfile.
    assert!(ARCH_DOCKERFILE_PRIORITY > TEMPLATE_DOCKERFILE_PRIORITY);
    assert!(TEMPLATE_DOCKERFILE_PRIORITY > STANDARD_DOCKERFILE_PRIORITY);
    assert_eq!(STANDARD_DOCKERFILE_PRIORITY, NODE_RESOLVER_PRIORITY);
}

#[test]
fn test_default_strategies_order_and_names() {
    let names: Vec<&str> = default_strategies().iter().map(|s| s.name()).collect();
    assert_eq!(
        names,
        vec![
            STANDARD_DOCKERFILE_NAME,
            TEMPLATE_DOCKERFILE_NAME,
            ARCH_DOCKERFILE_NAME,
            NODE_RESOLVER_NAME
        ]
    );
}

#[test]
fn test_only_node_refuses_specified_files() {
    let allowed: Vec<bool> = default_strategies()
        .iter()
        .map(|s| s.allow_specified_dockerfile())
        .collect();
    assert_eq!(allowed, vec![true, true, true, false]);
}

// =============================================================================
// Limit Tests
// =============================================================================

#[test]
fn test_buffered_entry_size_reasonable() {
    assert!(MAX_BUFFERED_ENTRY_SIZE >= 1024 * 1024, "too restrictive for manifests");
    assert!(MAX_BUFFERED_ENTRY_SIZE <= 256 * 1024 * 1024, "too permissive");
}

#[test]
fn test_output_limits_nonzero() {
    assert!(OUTPUT_CHANNEL_CAPACITY > 0);
    assert!(OUTPUT_CHUNK_SIZE >= 512, "chunk must hold a tar header");
}

#[test]
fn test_catalog_timeouts_ordered() {
    assert!(CATALOG_CONNECT_TIMEOUT <= CATALOG_REQUEST_TIMEOUT);
    assert!(VERSION_CACHE_TTL >= Duration::from_secs(60));
    assert!(MAX_TAG_PAGES > 0);
}

#[test]
fn test_gzip_magic() {
    assert_eq!(GZIP_MAGIC, [0x1f, 0x8b]);
}
