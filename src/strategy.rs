//! Strategy trait - the contract between the engine and a project type.
//!
//! A strategy recognizes one kind of project (plain Dockerfile, template,
//! architecture-specific Dockerfile, npm package) and knows how to turn the
//! files it collected into a Dockerfile. The engine only talks to strategies
//! through this trait:
//!
//! ```text
//! notice(path) → needs_entry(path) → entry(file)* → is_satisfied(target)
//!                                                  → resolve(target, specified)
//!                                                  → dockerfile_contents()
//! ```
//!
//! # Single Use
//!
//! Strategies accumulate state while the archive streams past. An instance
//! belongs to exactly one run; build a fresh set (see
//! [`crate::default_strategies`]) for every bundle.

use crate::bundle::Target;
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;

// =============================================================================
// File Info
// =============================================================================

/// In-memory snapshot of one archive entry.
///
/// The size is derived from the contents, so the two always agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    name: String,
    contents: Bytes,
}

impl FileInfo {
    /// Creates a file snapshot.
    pub fn new(name: impl Into<String>, contents: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }

    /// Normalized path of the entry.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of the contents in bytes.
    pub fn size(&self) -> u64 {
        self.contents.len() as u64
    }

    /// Entry contents.
    pub fn contents(&self) -> &Bytes {
        &self.contents
    }

    /// Returns the contents decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.contents).into_owned()
    }
}

// =============================================================================
// Strategy Trait
// =============================================================================

/// A pluggable project resolver.
///
/// # Implementations
///
/// - `DockerfileStrategy`: plain `Dockerfile`
/// - `TemplateStrategy`: `Dockerfile.template` with variable substitution
/// - `ArchDockerfileStrategy`: `Dockerfile.<arch>` / `Dockerfile.<device>`
/// - `NodeStrategy`: synthesizes a Dockerfile from `package.json`
#[async_trait]
pub trait Strategy: Send {
    /// Stable, human-readable name reported to callers.
    fn name(&self) -> &'static str;

    /// Ranking among satisfied strategies; higher wins.
    fn priority(&self) -> i32;

    /// Whether this strategy may resolve a caller-specified file.
    fn allow_specified_dockerfile(&self) -> bool {
        true
    }

    /// Called with every entry name before `needs_entry`, in auto mode.
    ///
    /// Lets a strategy record facts that only depend on a file's presence
    /// without having its contents buffered.
    fn notice(&mut self, path: &str) {
        let _ = path;
    }

    /// Returns true if `entry` should be called with this file's contents.
    ///
    /// Must only inspect the path.
    fn needs_entry(&self, path: &str) -> bool;

    /// Receives the contents of an entry requested through `needs_entry`.
    ///
    /// May be called several times; implementations accumulate.
    fn entry(&mut self, file: FileInfo);

    /// Returns true if enough was collected to produce a Dockerfile.
    ///
    /// Pure with respect to the strategy state; safe to call repeatedly.
    fn is_satisfied(&self, target: &Target) -> bool;

    /// Produces the files to add to the output archive.
    ///
    /// # Arguments
    ///
    /// * `target` - Device type and architecture being resolved for
    /// * `specified` - Normalized caller-specified path, if any
    ///
    /// After a successful call, [`Strategy::dockerfile_contents`] returns
    /// the final Dockerfile text.
    async fn resolve(&mut self, target: &Target, specified: Option<&str>) -> Result<Vec<FileInfo>>;

    /// Final Dockerfile text, available once `resolve` succeeded.
    fn dockerfile_contents(&self) -> Option<&str>;

    /// Output path of the Dockerfile resolved from a specified path.
    fn canonical_name(&self, specified: &str) -> String;
}

/// Picks the highest-priority strategy out of `candidates`.
///
/// Ties go to the candidate that appears first, which makes the caller's
/// list order the tie-breaker.
pub fn highest_priority<'a, I>(candidates: I) -> Option<usize>
where
    I: IntoIterator<Item = (usize, &'a dyn Strategy)>,
{
    let mut best: Option<(usize, i32)> = None;
    for (idx, strategy) in candidates {
        let priority = strategy.priority();
        match best {
            Some((_, current)) if current >= priority => {}
            _ => best = Some((idx, priority)),
        }
    }
    best.map(|(idx, _)| idx)
}
