//! Tests for error types.
//!
//! Validates display formatting and source chaining. Messages are surfaced
//! verbatim through `ResolveEvent::Error` and the output stream.

use bundle_resolve::Error;
use std::error::Error as _;
use std::time::Duration;

// =============================================================================
// Resolution Error Tests
// =============================================================================

#[test]
fn test_no_resolution_display() {
    let msg = Error::NoResolution.to_string();
    assert!(msg.contains("resolution could not be performed"));
}

#[test]
fn test_specified_not_found_display() {
    let err = Error::SpecifiedDockerfileNotFound("services/api/Dockerfile".to_string());
    let msg = format!("{}", err);

    assert!(msg.contains("services/api/Dockerfile"), "should include path");
    assert!(msg.contains("could not be resolved"));
}

#[test]
fn test_not_satisfied_display() {
    let err = Error::NotSatisfied("Dockerfile.template".to_string());
    assert!(err.to_string().contains("Dockerfile.template"));
}

// =============================================================================
// Template & Manifest Error Tests
// =============================================================================

#[test]
fn test_template_variable_display() {
    let err = Error::TemplateVariable {
        name: "RESIN_NOPE".to_string(),
    };
    let msg = err.to_string();

    assert!(msg.contains("RESIN_NOPE"), "should include variable name");
    assert!(msg.contains("not defined"));
}

#[test]
fn test_manifest_parse_keeps_source() {
    let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err = Error::ManifestParse {
        file: "package.json".to_string(),
        source,
    };

    assert!(err.to_string().starts_with("package.json: "));
    assert!(err.source().is_some(), "should chain the JSON error");
}

#[test]
fn test_manifest_invalid_display() {
    let err = Error::ManifestInvalid {
        file: "package.json".to_string(),
        reason: "must be a JSON object".to_string(),
    };
    assert_eq!(err.to_string(), "package.json: must be a JSON object");
}

// =============================================================================
// Catalog Error Tests
// =============================================================================

#[test]
fn test_version_not_satisfiable_display() {
    let err = Error::VersionNotSatisfiable {
        device_type: "raspberrypi3".to_string(),
        range: ">=20".to_string(),
    };
    let msg = err.to_string();

    assert!(msg.contains("raspberrypi3"));
    assert!(msg.contains(">=20"));
}

#[test]
fn test_timeout_display() {
    let err = Error::Timeout {
        operation: "list tags".to_string(),
        duration: Duration::from_secs(30),
    };
    let msg = err.to_string();

    assert!(msg.contains("timed out"));
    assert!(msg.contains("30s"));
    assert!(msg.contains("list tags"));
}

// =============================================================================
// Archive & Hook Error Tests
// =============================================================================

#[test]
fn test_entry_too_large_display() {
    let err = Error::EntryTooLarge {
        name: "package.json".to_string(),
        size: 20,
        limit: 10,
    };
    let msg = err.to_string();

    assert!(msg.contains("package.json"));
    assert!(msg.contains("20 > 10"));
}

#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated archive");
    let err: Error = io.into();

    assert!(err.is_io());
    assert!(err.to_string().contains("truncated archive"));
    assert!(!Error::NoResolution.is_io());
}

#[test]
fn test_hook_error_chains_source() {
    let err = Error::Hook(anyhow::anyhow!("upload failed"));

    assert!(err.to_string().contains("upload failed"));
    assert!(err.source().is_some());
}
