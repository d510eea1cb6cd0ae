//! # Runtime Version Catalog
//!
//! The NodeJS strategy pins its base image to the newest node version that
//! satisfies the manifest's `engines.node` range. Which versions exist for a
//! device type is answered by a [`VersionCatalog`].
//!
//! ## Components
//!
//! | Type | Role |
//! |------|------|
//! | [`VersionCatalog`] | Lists available versions for a device type |
//! | [`VersionRange`] | npm-style range (`>=8 <10`, `^10 \|\| ^12`, `8.x`) |
//! | [`CachedCatalog`] | Time-bounded LRU wrapper around any catalog |
//! | [`DockerHubCatalog`] | Reads `X.Y.Z` tags of `resin/<device>-node` |
//!
//! ## Caching
//!
//! Lookups are cached per device type for [`VERSION_CACHE_TTL`]. Two
//! concurrent misses for the same key may both fetch; the later store wins
//! and both results are equivalent.
//!
//! [`VERSION_CACHE_TTL`]: crate::constants::VERSION_CACHE_TTL

use crate::constants::{
    BASE_IMAGE_NAMESPACE, CATALOG_CONNECT_TIMEOUT, CATALOG_REQUEST_TIMEOUT, CATALOG_USER_AGENT,
    DOCKER_HUB_REPOSITORIES_URL, MAX_TAG_PAGES, TAGS_PAGE_SIZE, VERSION_CACHE_CAPACITY,
    VERSION_CACHE_TTL,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use reqwest::Client;
use semver::{Version, VersionReq};
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// =============================================================================
// Catalog Trait
// =============================================================================

/// Source of runtime versions available for a device type.
#[async_trait]
pub trait VersionCatalog: Send + Sync {
    /// Lists every version available for `device_type`, in any order.
    async fn versions(&self, device_type: &str) -> Result<Vec<Version>>;
}

/// Resolves `range` to the newest cataloged version for `device_type`.
///
/// # Errors
///
/// - [`Error::InvalidVersionRange`]: the range cannot be parsed
/// - [`Error::VersionNotSatisfiable`]: no cataloged version matches
/// - Any error returned by the catalog itself
pub async fn resolve_version(
    catalog: &dyn VersionCatalog,
    device_type: &str,
    range: &str,
) -> Result<Version> {
    let parsed = VersionRange::parse(range)?;
    let versions = catalog.versions(device_type).await?;

    versions
        .into_iter()
        .filter(|v| parsed.matches(v))
        .max()
        .ok_or_else(|| Error::VersionNotSatisfiable {
            device_type: device_type.to_string(),
            range: range.to_string(),
        })
}

// =============================================================================
// npm Ranges
// =============================================================================

/// An npm-style version range.
///
/// Supports `||` alternatives, whitespace-separated comparator sets,
/// hyphen ranges (`1.2.3 - 2.0.0`), wildcards (`8.x`, `*`), partial
/// versions (`8`, `8.1`) and a leading `v`. A bare full version (`8.1.0`)
/// means exactly that version.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionRange {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl VersionRange {
    /// Parses an npm range.
    pub fn parse(range: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidVersionRange {
            range: range.to_string(),
            reason,
        };

        let mut alternatives = Vec::new();
        for alternative in range.split("||") {
            let translated = translate_comparator_set(alternative.trim());
            let req = VersionReq::parse(&translated).map_err(|e| invalid(e.to_string()))?;
            alternatives.push(req);
        }

        Ok(Self {
            raw: range.to_string(),
            alternatives,
        })
    }

    /// Returns true if `version` satisfies any alternative.
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

    /// The range as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Translates one npm comparator set into `semver` crate syntax.
fn translate_comparator_set(set: &str) -> String {
    if set.is_empty() || set == "*" || set.eq_ignore_ascii_case("x") || set == "latest" {
        return "*".to_string();
    }

    let tokens: Vec<&str> = set.split_whitespace().collect();
    if tokens.len() == 3 && tokens[1] == "-" {
        return format!(
            ">={}, <={}",
            normalize_version(tokens[0]),
            normalize_version(tokens[2])
        );
    }

    // Re-attach operators written with a space (`>= 8`).
    let mut comparators: Vec<String> = Vec::new();
    let mut pending_op: Option<&str> = None;
    for token in tokens {
        if token.chars().all(|c| "<>=~^".contains(c)) {
            pending_op = Some(token);
            continue;
        }
        let op_len = token
            .find(|c: char| !"<>=~^".contains(c))
            .unwrap_or(token.len());
        let (op, version) = token.split_at(op_len);
        let op = pending_op.take().unwrap_or(op);
        comparators.push(translate_comparator(op, version));
    }

    comparators.join(", ")
}

fn translate_comparator(op: &str, version: &str) -> String {
    let version = normalize_version(version);
    if !op.is_empty() {
        return format!("{op}{version}");
    }
    let parts = version.split('.').count();
    if parts >= 3 && !version.contains('*') {
        format!("={version}")
    } else if parts < 3 && !version.contains('*') {
        format!("{version}.*")
    } else {
        version
    }
}

fn normalize_version(version: &str) -> String {
    let version = version.strip_prefix(['v', '=']).unwrap_or(version);
    version
        .split('.')
        .map(|part| if part.eq_ignore_ascii_case("x") { "*" } else { part })
        .collect::<Vec<_>>()
        .join(".")
}

// =============================================================================
// Cache
// =============================================================================

struct CacheEntry {
    fetched_at: Instant,
    versions: Arc<Vec<Version>>,
}

/// Caches another catalog's answers per device type with an expiry.
pub struct CachedCatalog<C> {
    inner: C,
    ttl: Duration,
    cache: Mutex<LruCache<String, CacheEntry>>,
}

impl<C: VersionCatalog> CachedCatalog<C> {
    /// Wraps `inner` with the default TTL and capacity.
    pub fn new(inner: C) -> Self {
        Self::with_ttl(inner, VERSION_CACHE_TTL, VERSION_CACHE_CAPACITY)
    }

    /// Wraps `inner` with a custom TTL and capacity.
    pub fn with_ttl(inner: C, ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            ttl,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns a cached, unexpired answer.
    fn lookup(&self, device_type: &str) -> Option<Arc<Vec<Version>>> {
        let mut cache = self.cache.lock();
        let expired = match cache.get(device_type) {
            Some(entry) if entry.fetched_at.elapsed() < self.ttl => {
                return Some(Arc::clone(&entry.versions));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            cache.pop(device_type);
        }
        None
    }

    /// Number of cached device types, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    /// Drops every cached answer.
    pub fn clear(&self) {
        self.cache.lock().clear();
    }
}

#[async_trait]
impl<C: VersionCatalog> VersionCatalog for CachedCatalog<C> {
    async fn versions(&self, device_type: &str) -> Result<Vec<Version>> {
        if let Some(versions) = self.lookup(device_type) {
            debug!("Version cache hit for {}", device_type);
            return Ok(versions.as_ref().clone());
        }

        let versions = self.inner.versions(device_type).await?;
        self.cache.lock().put(
            device_type.to_string(),
            CacheEntry {
                fetched_at: Instant::now(),
                versions: Arc::new(versions.clone()),
            },
        );
        Ok(versions)
    }
}

// =============================================================================
// Docker Hub Catalog
// =============================================================================

#[derive(Debug, Deserialize)]
struct TagPage {
    next: Option<String>,
    #[serde(default)]
    results: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

/// Lists node versions from the tags of `resin/<device-type>-node`.
///
/// Only plain `X.Y.Z` tags are versions; variant tags such as `slim` or
/// `8.1.0-onbuild` are skipped.
pub struct DockerHubCatalog {
    client: Client,
    base_url: String,
}

impl DockerHubCatalog {
    /// Creates a catalog against Docker Hub.
    pub fn new() -> Result<Self> {
        Self::with_base_url(DOCKER_HUB_REPOSITORIES_URL)
    }

    /// Creates a catalog against another repositories endpoint.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(CATALOG_USER_AGENT)
            .timeout(CATALOG_REQUEST_TIMEOUT)
            .connect_timeout(CATALOG_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// URL of the first tag page for a device type.
    pub fn tags_url(&self, device_type: &str) -> String {
        format!(
            "{}/{}/{}-node/tags/?page_size={}",
            self.base_url, BASE_IMAGE_NAMESPACE, device_type, TAGS_PAGE_SIZE
        )
    }

    async fn fetch_page(&self, device_type: &str, url: &str) -> Result<TagPage> {
        let catalog_error = |reason: String| Error::VersionCatalog {
            device_type: device_type.to_string(),
            reason,
        };

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    operation: format!("list tags at {url}"),
                    duration: CATALOG_REQUEST_TIMEOUT,
                }
            } else {
                catalog_error(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(catalog_error(format!("{} returned {}", url, response.status())));
        }

        response
            .json()
            .await
            .map_err(|e| catalog_error(format!("failed to parse tag page: {e}")))
    }
}

#[async_trait]
impl VersionCatalog for DockerHubCatalog {
    async fn versions(&self, device_type: &str) -> Result<Vec<Version>> {
        let mut versions = Vec::new();
        let mut next = Some(self.tags_url(device_type));
        let mut pages = 0;

        while let Some(url) = next {
            if pages == MAX_TAG_PAGES {
                warn!("Stopped listing tags for {} after {} pages", device_type, pages);
                break;
            }
            pages += 1;

            let page = self.fetch_page(device_type, &url).await?;
            versions.extend(page.results.iter().filter_map(|tag| parse_plain_version(&tag.name)));
            next = page.next;
        }

        info!("Found {} node versions for {}", versions.len(), device_type);
        Ok(versions)
    }
}

/// Parses tags of the exact form `X.Y.Z`.
fn parse_plain_version(tag: &str) -> Option<Version> {
    let mut parts = tag.split('.');
    let plain = parts.clone().count() == 3
        && parts.all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
    if plain { Version::parse(tag).ok() } else { None }
}

// =============================================================================
// Shared Catalog
// =============================================================================

static SHARED_CATALOG: LazyLock<Arc<dyn VersionCatalog>> = LazyLock::new(|| {
    let catalog: Arc<dyn VersionCatalog> = match DockerHubCatalog::new() {
        Ok(catalog) => Arc::new(CachedCatalog::new(catalog)),
        Err(e) => {
            warn!("Version catalog unavailable: {}", e);
            Arc::new(UnavailableCatalog(e.to_string()))
        }
    };
    catalog
});

/// Returns the process-wide cached Docker Hub catalog.
pub fn shared_catalog() -> Arc<dyn VersionCatalog> {
    Arc::clone(&SHARED_CATALOG)
}

/// Catalog used when the HTTP client could not be built.
struct UnavailableCatalog(String);

#[async_trait]
impl VersionCatalog for UnavailableCatalog {
    async fn versions(&self, device_type: &str) -> Result<Vec<Version>> {
        Err(Error::VersionCatalog {
            device_type: device_type.to_string(),
            reason: self.0.clone(),
        })
    }
}

// =============================================================================
// Static Catalog
// =============================================================================

/// A fixed catalog, for offline use and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    versions: Vec<Version>,
}

impl StaticCatalog {
    /// Creates a catalog answering every device type with `versions`.
    ///
    /// Unparseable entries are skipped.
    pub fn new<I, S>(versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            versions: versions
                .into_iter()
                .filter_map(|v| Version::parse(v.as_ref()).ok())
                .collect(),
        }
    }
}

#[async_trait]
impl VersionCatalog for StaticCatalog {
    async fn versions(&self, _device_type: &str) -> Result<Vec<Version>> {
        Ok(self.versions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCatalog {
        calls: AtomicUsize,
        inner: StaticCatalog,
    }

    impl CountingCatalog {
        fn new(versions: &[&str]) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                inner: StaticCatalog::new(versions.iter().copied()),
            }
        }
    }

    #[async_trait]
    impl VersionCatalog for CountingCatalog {
        async fn versions(&self, device_type: &str) -> Result<Vec<Version>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.versions(device_type).await
        }
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_range_exact_version() {
        let range = VersionRange::parse("8.1.0").unwrap();
        assert!(range.matches(&v("8.1.0")));
        assert!(!range.matches(&v("8.1.1")));
    }

    #[test]
    fn test_range_partial_and_wildcards() {
        let range = VersionRange::parse("8").unwrap();
        assert!(range.matches(&v("8.9.4")));
        assert!(!range.matches(&v("9.0.0")));

        let range = VersionRange::parse("8.1.x").unwrap();
        assert!(range.matches(&v("8.1.7")));
        assert!(!range.matches(&v("8.2.0")));

        let range = VersionRange::parse("6.1").unwrap();
        assert!(range.matches(&v("6.1.3")));
        assert!(!range.matches(&v("6.2.0")));

        assert!(VersionRange::parse("*").unwrap().matches(&v("0.10.22")));
    }

    #[test]
    fn test_range_comparator_sets() {
        let range = VersionRange::parse(">=8 <10").unwrap();
        assert!(range.matches(&v("9.11.1")));
        assert!(!range.matches(&v("10.0.0")));
        assert!(!range.matches(&v("7.10.0")));

        let range = VersionRange::parse(">= 6.0.0").unwrap();
        assert!(range.matches(&v("6.0.0")));
    }

    #[test]
    fn test_range_alternatives_and_hyphen() {
        let range = VersionRange::parse("^6.0.0 || ^10.0.0").unwrap();
        assert!(range.matches(&v("6.14.4")));
        assert!(range.matches(&v("10.1.0")));
        assert!(!range.matches(&v("8.0.0")));

        let range = VersionRange::parse("4.0.0 - 6.2.0").unwrap();
        assert!(range.matches(&v("5.5.5")));
        assert!(range.matches(&v("6.2.0")));
        assert!(!range.matches(&v("6.2.1")));
    }

    #[test]
    fn test_range_invalid() {
        let err = VersionRange::parse("not a range").unwrap_err();
        assert!(matches!(err, Error::InvalidVersionRange { .. }));
    }

    #[test]
    fn test_parse_plain_version() {
        assert_eq!(parse_plain_version("8.1.0"), Some(v("8.1.0")));
        assert_eq!(parse_plain_version("8.1.0-onbuild"), None);
        assert_eq!(parse_plain_version("slim"), None);
        assert_eq!(parse_plain_version("8.1"), None);
    }

    #[tokio::test]
    async fn test_resolve_version_picks_max() {
        let catalog = StaticCatalog::new(["6.9.0", "8.1.0", "8.11.3", "10.0.0"]);
        let version = resolve_version(&catalog, "raspberrypi3", "^8").await.unwrap();
        assert_eq!(version, v("8.11.3"));
    }

    #[tokio::test]
    async fn test_resolve_version_not_satisfiable() {
        let catalog = StaticCatalog::new(["6.9.0"]);
        let err = resolve_version(&catalog, "raspberrypi3", ">=12").await.unwrap_err();
        assert!(matches!(err, Error::VersionNotSatisfiable { .. }));
    }

    #[tokio::test]
    async fn test_cached_catalog_reuses_answers() {
        let cached = CachedCatalog::new(CountingCatalog::new(&["8.1.0"]));

        cached.versions("raspberrypi3").await.unwrap();
        cached.versions("raspberrypi3").await.unwrap();
        cached.versions("intel-nuc").await.unwrap();

        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cached.len(), 2);
    }

    #[tokio::test]
    async fn test_cached_catalog_expires() {
        let cached =
            CachedCatalog::with_ttl(CountingCatalog::new(&["8.1.0"]), Duration::ZERO, 4);

        cached.versions("raspberrypi3").await.unwrap();
        cached.versions("raspberrypi3").await.unwrap();

        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_tags_url() {
        let catalog = DockerHubCatalog::with_base_url("https://hub.example.com/v2/repositories/").unwrap();
        assert_eq!(
            catalog.tags_url("raspberrypi3"),
            "https://hub.example.com/v2/repositories/resin/raspberrypi3-node/tags/?page_size=100"
        );
    }
}
