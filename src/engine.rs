//! # Resolution Engine
//!
//! Streams an input tar archive through the strategies and re-packs it as a
//! Docker-compatible build context.
//!
//! ## Pipeline
//!
//! ```text
//! input ──► gzip? ──► tar::Archive ──► per entry ──► tar::Builder ──► OutputStream
//!                                       │                ▲
//!                                       ▼                │
//!                              needs_entry? ── buffer ──► strategies
//!                                                            │
//!                                       end of input ──► decide ──► resolve
//!                                                                     │
//!                                                            hook ◄───┘
//! ```
//!
//! ## Modes
//!
//! | Mode | Trigger | Decision |
//! |------|---------|----------|
//! | Auto-detect | `ResolveOptions::dockerfile` is `None` | After the last entry, highest-priority satisfied strategy |
//! | Specified | `ResolveOptions::dockerfile` is `Some(path)` | When the entry at `path` arrives |
//!
//! ## Ordering
//!
//! The Dockerfile hook completes before the archive trailer is written and
//! before [`ResolveEvent::End`] is sent. Once the output stream reaches EOF
//! the hook has run.
//!
//! ## Failure
//!
//! A failed run reports the same error three times: as the completion
//! result, as a [`ResolveEvent::Error`], and as the final item of the output
//! stream. A failed archive is never finalized, so consumers cannot mistake
//! a truncated stream for a complete one. A panic in a strategy or in the
//! hook is reported the same way, as [`Error::Internal`].

use crate::bundle::{Bundle, DockerfileHook, Target};
use crate::constants::{
    DOCKERFILE, GZIP_MAGIC, MAX_BUFFERED_ENTRY_SIZE, OUTPUT_CHANNEL_CAPACITY, OUTPUT_CHUNK_SIZE,
    SYNTHESIZED_FILE_MODE,
};
use crate::error::{Error, Result};
use crate::path::normalize_tar_entry;
use crate::strategies::DockerfileStrategy;
use crate::strategy::{FileInfo, Strategy, highest_priority};
use bytes::Bytes;
use flate2::read::GzDecoder;
use futures::Stream;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::any::Any;
use std::future::Future;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use tar::{Archive, Builder, Entry, EntryType, Header};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};

// =============================================================================
// Options
// =============================================================================

/// Per-run configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResolveOptions {
    /// Caller-specified Dockerfile path; switches to specified mode.
    pub dockerfile: Option<String>,
    /// Largest entry a strategy may ask to buffer, in bytes.
    pub max_entry_size: u64,
    /// Output chunks queued before the pipeline waits for the consumer.
    pub output_buffer: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            dockerfile: None,
            max_entry_size: MAX_BUFFERED_ENTRY_SIZE,
            output_buffer: OUTPUT_CHANNEL_CAPACITY,
        }
    }
}

impl ResolveOptions {
    /// Pins resolution to the Dockerfile at `path`.
    pub fn with_dockerfile(mut self, path: impl Into<String>) -> Self {
        self.dockerfile = Some(path.into());
        self
    }

    /// Sets the per-entry buffering limit.
    pub fn with_max_entry_size(mut self, limit: u64) -> Self {
        self.max_entry_size = limit;
        self
    }
}

// =============================================================================
// Events & Results
// =============================================================================

/// Lifecycle notifications of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveEvent {
    /// Name of the winning strategy.
    Resolver(String),
    /// Output path of the Dockerfile (specified mode only).
    ResolvedName(String),
    /// The run failed with this message.
    Error(String),
    /// The output archive is complete.
    End,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    /// Name of the winning strategy.
    pub resolver: String,
    /// Path of the resolved Dockerfile in the output archive.
    pub dockerfile_name: String,
    /// Final Dockerfile text.
    pub dockerfile: String,
    /// `sha256:<hex>` digest of the Dockerfile text.
    pub digest: String,
}

impl Resolution {
    fn from_strategy(strategy: &dyn Strategy, dockerfile_name: String) -> Result<Self> {
        let dockerfile = strategy
            .dockerfile_contents()
            .ok_or_else(|| {
                Error::Internal(format!("{} resolved without Dockerfile contents", strategy.name()))
            })?
            .to_string();
        let digest = format!("sha256:{}", hex::encode(Sha256::digest(dockerfile.as_bytes())));

        Ok(Self {
            resolver: strategy.name().to_string(),
            dockerfile_name,
            dockerfile,
            digest,
        })
    }
}

// =============================================================================
// Handle
// =============================================================================

/// The resolved archive as a stream of byte chunks.
///
/// Ends with an `Err` item if the run fails.
#[derive(Debug)]
pub struct OutputStream {
    rx: mpsc::Receiver<io::Result<Bytes>>,
}

impl OutputStream {
    /// Adapts the stream into an [`tokio::io::AsyncRead`].
    pub fn into_async_read(self) -> StreamReader<Self, Bytes> {
        StreamReader::new(self)
    }

    /// Reads the whole archive into memory.
    pub async fn read_to_end(mut self) -> io::Result<Vec<u8>> {
        let mut data = Vec::new();
        while let Some(chunk) = self.rx.recv().await {
            data.extend_from_slice(&chunk?);
        }
        Ok(data)
    }
}

impl Stream for OutputStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Resolves to the outcome of a run.
#[derive(Debug)]
pub struct Completion {
    task: JoinHandle<Result<Resolution>>,
}

impl Future for Completion {
    type Output = Result<Resolution>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.task).poll(cx).map(|joined| {
            joined.unwrap_or_else(|e| Err(Error::Internal(format!("resolution task failed: {e}"))))
        })
    }
}

/// Everything a caller receives from [`resolve_input`].
///
/// The output must be consumed for the run to make progress; awaiting only
/// the completion stalls once the output buffer is full.
#[derive(Debug)]
pub struct ResolveHandle {
    /// The resolved archive.
    pub output: OutputStream,
    /// Lifecycle events.
    pub events: mpsc::UnboundedReceiver<ResolveEvent>,
    /// Final outcome.
    pub completion: Completion,
}

// =============================================================================
// Entry Points
// =============================================================================

/// Starts resolving `bundle` with `strategies`, in list order.
///
/// Returns immediately; the archive is processed on a blocking worker of the
/// current Tokio runtime.
///
/// # Panics
///
/// Panics if called outside a Tokio runtime.
pub fn resolve_input(
    bundle: Bundle,
    strategies: Vec<Box<dyn Strategy>>,
    options: ResolveOptions,
) -> ResolveHandle {
    let runtime = Handle::current();
    let (tx, rx) = mpsc::channel(options.output_buffer.max(1));
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (archive, target, hook) = bundle.into_parts();

    let pipeline = Pipeline {
        runtime: runtime.clone(),
        target,
        hook,
        strategies,
        options,
        events: events_tx,
    };
    let task = runtime.spawn_blocking(move || pipeline.execute(archive, tx));

    ResolveHandle {
        output: OutputStream { rx },
        events: events_rx,
        completion: Completion { task },
    }
}

/// Resolves `bundle` and collects the whole output archive.
pub async fn resolve_to_vec(
    bundle: Bundle,
    strategies: Vec<Box<dyn Strategy>>,
    options: ResolveOptions,
) -> Result<(Vec<u8>, Resolution)> {
    let ResolveHandle {
        output, completion, ..
    } = resolve_input(bundle, strategies, options);

    let (archive, resolution) = tokio::join!(output.read_to_end(), completion);
    let resolution = resolution?;
    Ok((archive?, resolution))
}

// =============================================================================
// Output Archive
// =============================================================================

/// Blocking writer feeding the output channel.
struct ChannelWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
    closed: Arc<AtomicBool>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Set once a run failed; the builder's drop must not append a trailer.
        if self.closed.load(Ordering::Acquire) {
            return Err(io::Error::other("output archive aborted"));
        }
        self.tx
            .blocking_send(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "output stream dropped"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct OutputArchive {
    builder: Builder<BufWriter<ChannelWriter>>,
    closed: Arc<AtomicBool>,
    tx: mpsc::Sender<io::Result<Bytes>>,
}

impl OutputArchive {
    fn new(tx: mpsc::Sender<io::Result<Bytes>>) -> Self {
        let closed = Arc::new(AtomicBool::new(false));
        let writer = ChannelWriter {
            tx: tx.clone(),
            closed: Arc::clone(&closed),
        };
        Self {
            builder: Builder::new(BufWriter::with_capacity(OUTPUT_CHUNK_SIZE, writer)),
            closed,
            tx,
        }
    }

    /// Copies an input entry under its normalized name.
    fn append_entry<R: Read>(&mut self, header: &Header, name: &str, data: R) -> io::Result<()> {
        let mut header = header.clone();
        self.builder.append_data(&mut header, name, data)
    }

    fn append_link(&mut self, header: &Header, name: &str, target: &Path) -> io::Result<()> {
        let mut header = header.clone();
        self.builder.append_link(&mut header, name, target)
    }

    /// Appends a strategy-produced file with a deterministic header.
    fn append_file(&mut self, file: &FileInfo) -> io::Result<()> {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(file.size());
        header.set_mode(SYNTHESIZED_FILE_MODE);
        header.set_mtime(0);
        self.builder.append_data(&mut header, file.name(), file.contents().as_ref())
    }

    /// Writes the trailer and flushes the remaining bytes.
    fn finish(&mut self) -> io::Result<()> {
        self.builder.finish()?;
        self.builder.get_mut().flush()
    }

    /// Terminates the stream with `message` instead of a trailer.
    fn abort(self, message: &str) {
        self.closed.store(true, Ordering::Release);
        let _ = self.tx.blocking_send(Err(io::Error::other(message.to_string())));
    }
}

/// Copies a passthrough entry, keeping link targets intact.
fn pass_through<R: Read>(
    output: &mut OutputArchive,
    entry: &mut Entry<'_, R>,
    header: &Header,
    name: &str,
) -> Result<()> {
    let kind = header.entry_type();
    if (kind.is_symlink() || kind.is_hard_link())
        && let Some(target) = entry.link_name()?
    {
        output.append_link(header, name, &target)?;
        return Ok(());
    }
    output.append_entry(header, name, entry)?;
    Ok(())
}

// =============================================================================
// Input Archive
// =============================================================================

/// Transparently inflates gzip-compressed input.
fn open_input(archive: Box<dyn Read + Send>) -> io::Result<Box<dyn Read + Send>> {
    let mut reader = BufReader::new(archive);
    if reader.fill_buf()?.starts_with(&GZIP_MAGIC) {
        debug!("Input archive is gzip-compressed");
        Ok(Box::new(GzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

/// Reads an entry fully, refusing anything above `limit` bytes.
fn buffer_entry<R: Read>(entry: &mut Entry<'_, R>, name: &str, limit: u64) -> Result<FileInfo> {
    let too_large = |size: u64| Error::EntryTooLarge {
        name: name.to_string(),
        size,
        limit,
    };

    let declared = entry.size();
    if declared > limit {
        return Err(too_large(declared));
    }

    let mut data = Vec::with_capacity(declared as usize);
    entry.by_ref().take(limit.saturating_add(1)).read_to_end(&mut data)?;
    if data.len() as u64 > limit {
        return Err(too_large(data.len() as u64));
    }
    Ok(FileInfo::new(name, data))
}

// =============================================================================
// Pipeline
// =============================================================================

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause");
    format!("resolution panicked: {detail}")
}

struct Pipeline {
    runtime: Handle,
    target: Target,
    hook: Option<DockerfileHook>,
    strategies: Vec<Box<dyn Strategy>>,
    options: ResolveOptions,
    events: mpsc::UnboundedSender<ResolveEvent>,
}

impl Pipeline {
    fn execute(mut self, archive: Box<dyn Read + Send>, tx: mpsc::Sender<io::Result<Bytes>>) -> Result<Resolution> {
        let mut output = OutputArchive::new(tx);

        // Strategies and the hook are caller code; a panic must still fail
        // the output stream rather than end it early.
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.run(archive, &mut output)))
            .unwrap_or_else(|payload| Err(Error::Internal(panic_message(payload.as_ref()))))
            .and_then(|resolution| {
                output.finish()?;
                Ok(resolution)
            });

        match result {
            Ok(resolution) => {
                info!(
                    "Resolved {} with {} ({})",
                    resolution.dockerfile_name, resolution.resolver, resolution.digest
                );
                self.emit(ResolveEvent::End);
                Ok(resolution)
            }
            Err(e) => {
                warn!("Resolution failed: {}", e);
                let message = e.to_string();
                output.abort(&message);
                self.emit(ResolveEvent::Error(message));
                Err(e)
            }
        }
    }

    fn run(&mut self, archive: Box<dyn Read + Send>, output: &mut OutputArchive) -> Result<Resolution> {
        let mut archive = Archive::new(open_input(archive)?);

        let specified = self.options.dockerfile.as_deref().map(normalize_tar_entry);
        match specified {
            None => {
                info!(
                    "Resolving bundle for {} ({}) with {} strategies",
                    self.target.device_type,
                    self.target.architecture,
                    self.strategies.len()
                );
                self.run_auto(&mut archive, output)
            }
            Some(path) => {
                info!(
                    "Resolving specified Dockerfile {} for {} ({})",
                    path, self.target.device_type, self.target.architecture
                );
                self.run_specified(&mut archive, output, &path)
            }
        }
    }

    fn run_auto<R: Read>(&mut self, archive: &mut Archive<R>, output: &mut OutputArchive) -> Result<Resolution> {
        for entry in archive.entries()? {
            let mut entry = entry?;
            let header = entry.header().clone();
            let name = normalize_tar_entry(&entry.path()?.to_string_lossy());

            if name.is_empty() {
                io::copy(&mut entry, &mut io::sink())?;
                continue;
            }

            for strategy in &mut self.strategies {
                strategy.notice(&name);
            }

            let interested: Vec<usize> = if header.entry_type().is_file() {
                self.strategies
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.needs_entry(&name))
                    .map(|(idx, _)| idx)
                    .collect()
            } else {
                Vec::new()
            };

            if interested.is_empty() {
                pass_through(output, &mut entry, &header, &name)?;
                continue;
            }

            debug!("Buffering {} for {} strategies", name, interested.len());
            let file = buffer_entry(&mut entry, &name, self.options.max_entry_size)?;
            for idx in interested {
                self.strategies[idx].entry(file.clone());
            }
            output.append_entry(&header, &name, file.contents().as_ref())?;
        }

        // Deciding
        let target = &self.target;
        let winner = highest_priority(
            self.strategies
                .iter()
                .enumerate()
                .filter(|(_, s)| s.is_satisfied(target))
                .map(|(idx, s)| (idx, &**s)),
        )
        .ok_or(Error::NoResolution)?;

        // Emitting
        let strategy = &mut self.strategies[winner];
        debug!("Selected strategy {}", strategy.name());
        let files = self.runtime.block_on(strategy.resolve(&self.target, None))?;
        for file in &files {
            output.append_file(file)?;
        }

        let resolution = Resolution::from_strategy(&**strategy, DOCKERFILE.to_string())?;
        self.emit(ResolveEvent::Resolver(resolution.resolver.clone()));
        self.call_hook(&resolution.dockerfile)?;
        Ok(resolution)
    }

    fn run_specified<R: Read>(
        &mut self,
        archive: &mut Archive<R>,
        output: &mut OutputArchive,
        path: &str,
    ) -> Result<Resolution> {
        let mut committed: Option<Box<dyn Strategy>> = None;

        for entry in archive.entries()? {
            let mut entry = entry?;
            let header = entry.header().clone();
            let name = normalize_tar_entry(&entry.path()?.to_string_lossy());

            if name.is_empty() {
                io::copy(&mut entry, &mut io::sink())?;
                continue;
            }

            if committed.is_some() || name != path {
                pass_through(output, &mut entry, &header, &name)?;
                continue;
            }

            if !header.entry_type().is_file() {
                warn!("Specified Dockerfile {} is not a regular file", name);
                pass_through(output, &mut entry, &header, &name)?;
                continue;
            }

            let file = buffer_entry(&mut entry, &name, self.options.max_entry_size)?;
            let mut strategy = self.take_specified_strategy(path);
            debug!("Specified Dockerfile {} handled by {}", path, strategy.name());

            strategy.entry(file.clone());
            let produced = self.runtime.block_on(strategy.resolve(&self.target, Some(path)))?;
            for produced_file in &produced {
                output.append_file(produced_file)?;
            }
            if produced.iter().any(|f| f.name() == name) {
                debug!("{} replaced by resolved output", name);
            } else {
                output.append_entry(&header, &name, file.contents().as_ref())?;
            }

            committed = Some(strategy);
        }

        let strategy =
            committed.ok_or_else(|| Error::SpecifiedDockerfileNotFound(path.to_string()))?;
        let resolution = Resolution::from_strategy(&*strategy, strategy.canonical_name(path))?;

        self.emit(ResolveEvent::Resolver(resolution.resolver.clone()));
        self.emit(ResolveEvent::ResolvedName(resolution.dockerfile_name.clone()));
        self.call_hook(&resolution.dockerfile)?;
        Ok(resolution)
    }

    /// Removes the strategy that will own a specified file from the list.
    ///
    /// Falls back to a fresh plain Dockerfile strategy.
    fn take_specified_strategy(&mut self, path: &str) -> Box<dyn Strategy> {
        let candidates = self
            .strategies
            .iter()
            .enumerate()
            .filter(|(_, s)| s.allow_specified_dockerfile() && s.needs_entry(path))
            .map(|(idx, s)| (idx, &**s));

        match highest_priority(candidates) {
            Some(idx) => self.strategies.remove(idx),
            None => {
                debug!("No strategy recognizes {}, treating it as a plain Dockerfile", path);
                Box::new(DockerfileStrategy::new())
            }
        }
    }

    fn call_hook(&mut self, dockerfile: &str) -> Result<()> {
        if let Some(hook) = self.hook.take() {
            debug!("Calling Dockerfile hook");
            self.runtime
                .block_on(hook(dockerfile.to_string()))
                .map_err(Error::Hook)?;
        }
        Ok(())
    }

    fn emit(&self, event: ResolveEvent) {
        // The caller may have dropped the receiver.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tar_with(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = Builder::new(Vec::new());
        for (name, data) in files {
            let mut header = Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_options_defaults_and_serde() {
        let options = ResolveOptions::default();
        assert_eq!(options.dockerfile, None);
        assert_eq!(options.max_entry_size, MAX_BUFFERED_ENTRY_SIZE);
        assert_eq!(options.output_buffer, OUTPUT_CHANNEL_CAPACITY);

        let parsed: ResolveOptions = serde_json::from_str(r#"{"dockerfile": "test/Dockerfile"}"#).unwrap();
        assert_eq!(parsed, ResolveOptions::default().with_dockerfile("test/Dockerfile"));
    }

    #[test]
    fn test_open_input_detects_gzip() {
        let plain = tar_with(&[("Dockerfile", &b"FROM x\n"[..])]);
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&plain).unwrap();
        let gzipped = encoder.finish().unwrap();

        let mut inflated = Vec::new();
        open_input(Box::new(io::Cursor::new(gzipped)))
            .unwrap()
            .read_to_end(&mut inflated)
            .unwrap();
        assert_eq!(inflated, plain);

        let mut passed = Vec::new();
        open_input(Box::new(io::Cursor::new(plain.clone())))
            .unwrap()
            .read_to_end(&mut passed)
            .unwrap();
        assert_eq!(passed, plain);
    }

    #[test]
    fn test_buffer_entry_limit() {
        let data = tar_with(&[("package.json", &b"0123456789"[..])]);
        let mut archive = Archive::new(io::Cursor::new(data));
        let mut entry = archive.entries().unwrap().next().unwrap().unwrap();

        let err = buffer_entry(&mut entry, "package.json", 4).unwrap_err();
        assert!(matches!(err, Error::EntryTooLarge { size: 10, limit: 4, .. }));
    }

    #[test]
    fn test_resolution_digest() {
        let mut strategy = DockerfileStrategy::new();
        strategy.entry(FileInfo::new("Dockerfile", &b"FROM x\n"[..]));
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(strategy.resolve(&Target::default(), None)).unwrap();

        let resolution = Resolution::from_strategy(&strategy, DOCKERFILE.to_string()).unwrap();
        assert_eq!(resolution.resolver, "Standard Dockerfile");
        assert_eq!(
            resolution.digest,
            format!("sha256:{}", hex::encode(Sha256::digest(b"FROM x\n")))
        );
    }

    #[test]
    fn test_resolution_requires_contents() {
        let strategy = DockerfileStrategy::new();
        let err = Resolution::from_strategy(&strategy, DOCKERFILE.to_string()).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn test_panic_message_payloads() {
        let borrowed = panic::catch_unwind(|| panic!("hook blew up")).unwrap_err();
        assert_eq!(panic_message(borrowed.as_ref()), "resolution panicked: hook blew up");

        let detail = String::from("state");
        let owned = panic::catch_unwind(move || panic!("bad {detail}")).unwrap_err();
        assert_eq!(panic_message(owned.as_ref()), "resolution panicked: bad state");

        let opaque = panic::catch_unwind(|| std::panic::panic_any(7u8)).unwrap_err();
        assert_eq!(panic_message(opaque.as_ref()), "resolution panicked: unknown cause");
    }
}
