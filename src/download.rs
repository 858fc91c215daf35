//! Resumable, chunked transfer of media and caption files to disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::RANGE;
use reqwest::StatusCode;
use tokio::io::AsyncWriteExt;

use crate::config::{ClientConfig, DownloadConfig};
use crate::error::{Error, Result};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::media::{CaptionFile, MediaFile};
use crate::session::download_headers;
use crate::stats::{DownloadStatsTracker, FileStats};

/// Trait for receiving download progress updates.
///
/// All methods have default no-op implementations for convenience.
pub trait DownloadProgress: Send + Sync {
    /// Called when a transfer starts. `already` bytes are on disk from a
    /// previous run.
    fn on_file_start(&self, _name: &str, _size: u64, _already: u64) {}

    /// Called after every chunk written, with its size.
    fn on_progress(&self, _name: &str, _bytes_delta: u64, _speed: u64) {}

    /// Called when a transfer completes successfully.
    fn on_file_complete(&self, _name: &str, _stats: &FileStats) {}

    /// Called when a transfer fails.
    fn on_error(&self, _name: &str, _error: &str) {}

    /// Called when a partial file from a previous run is picked up.
    fn on_partial_detected(&self, _name: &str, _existing_size: u64, _expected_size: u64) {}
}

/// A null progress implementation that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl DownloadProgress for NoProgress {}

/// A remote file that can be downloaded.
pub trait DownloadTarget: Send + Sync {
    /// Where to fetch the file from.
    fn url(&self) -> &str;

    /// Size announced by the server, in bytes.
    fn size(&self) -> u64;

    /// Chunk size to use when none is given explicitly.
    fn default_chunk_size(&self, config: &DownloadConfig) -> usize;
}

impl DownloadTarget for MediaFile {
    fn url(&self) -> &str {
        &self.url
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn default_chunk_size(&self, config: &DownloadConfig) -> usize {
        config.media_chunk_size
    }
}

impl DownloadTarget for CaptionFile {
    fn url(&self) -> &str {
        &self.url
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn default_chunk_size(&self, config: &DownloadConfig) -> usize {
        config.caption_chunk_size
    }
}

/// Options for a single transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Bytes per write; the target's default when `None`.
    pub chunk_size: Option<usize>,
    /// Continue a partial file instead of starting over.
    pub resume: bool,
    /// Report progress.
    pub show_progress: bool,
    /// Suppress all progress output, whatever `show_progress` says.
    pub quiet: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            chunk_size: None,
            resume: false,
            show_progress: true,
            quiet: false,
        }
    }
}

impl DownloadOptions {
    /// Options matching the `resume` and `show_progress` settings of `config`.
    #[must_use]
    pub const fn from_config(config: &DownloadConfig) -> Self {
        Self {
            chunk_size: None,
            resume: config.resume,
            show_progress: config.show_progress,
            quiet: false,
        }
    }

    /// Sets the chunk size in bytes.
    #[must_use]
    pub const fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = Some(bytes);
        self
    }

    /// Sets whether to resume a partial file.
    #[must_use]
    pub const fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    /// Sets whether to report progress.
    #[must_use]
    pub const fn with_show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Sets quiet mode.
    #[must_use]
    pub const fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    const fn reports_progress(&self) -> bool {
        self.show_progress && !self.quiet
    }
}

/// An opened response body.
pub struct ByteStream {
    /// Whether the server honoured the requested range.
    pub partial: bool,
    /// Body chunks as they arrive.
    pub body: BoxStream<'static, Result<Bytes>>,
}

/// Opens remote files for reading.
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Starts a GET for `url`, asking for the bytes from `range_start` on
    /// when it is set.
    ///
    /// The range applies to this request only.
    async fn open(&self, url: &str, range_start: Option<u64>) -> Result<ByteStream>;
}

/// [`ByteSource`] over HTTP, sending the headers the file servers expect.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    /// Creates a source for the host in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        // No overall timeout for transfers.
        let client = reqwest::Client::builder()
            .default_headers(download_headers(config))
            .connect_timeout(config.timeout())
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ByteSource for HttpSource {
    async fn open(&self, url: &str, range_start: Option<u64>) -> Result<ByteStream> {
        let mut request = self.client.get(url);
        if let Some(start) = range_start {
            request = request.header(RANGE, format!("bytes={start}-"));
        }
        log::debug!("GET {url} (range start: {range_start:?})");
        let response = request.send().await?.error_for_status()?;
        Ok(ByteStream {
            partial: response.status() == StatusCode::PARTIAL_CONTENT,
            body: response
                .bytes_stream()
                .map(|chunk| chunk.map_err(Error::from))
                .boxed(),
        })
    }
}

/// Downloads single files, optionally resuming partial ones.
pub struct Downloader<B: ByteSource = HttpSource, F: FileSystem = TokioFileSystem> {
    source: B,
    config: DownloadConfig,
    fs: F,
}

impl<B: ByteSource> Downloader<B, TokioFileSystem> {
    /// Creates a new downloader with the default file system.
    #[must_use]
    pub const fn new(source: B, config: DownloadConfig) -> Self {
        Self {
            source,
            config,
            fs: TokioFileSystem,
        }
    }
}

impl<B: ByteSource, F: FileSystem> Downloader<B, F> {
    /// Creates a new downloader with a custom file system implementation.
    #[must_use]
    pub const fn with_fs(source: B, config: DownloadConfig, fs: F) -> Self {
        Self { source, config, fs }
    }

    /// Returns a reference to the download configuration.
    #[must_use]
    pub const fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Downloads `target` to `destination` and returns the path.
    ///
    /// # Errors
    ///
    /// See [`run_with_stats`](Self::run_with_stats).
    pub async fn run<T: DownloadTarget + ?Sized>(
        &self,
        target: &T,
        destination: &Path,
        options: &DownloadOptions,
        progress: &dyn DownloadProgress,
    ) -> Result<PathBuf> {
        self.run_with_stats(target, destination, options, progress)
            .await
            .map(|(path, _)| path)
    }

    /// Downloads a media file with the configured options.
    ///
    /// # Errors
    ///
    /// See [`run_with_stats`](Self::run_with_stats).
    pub async fn download_media(
        &self,
        file: &MediaFile,
        destination: &Path,
        progress: &dyn DownloadProgress,
    ) -> Result<(PathBuf, FileStats)> {
        let options = DownloadOptions::from_config(&self.config);
        self.run_with_stats(file, destination, &options, progress).await
    }

    /// Downloads a caption file with the configured options. Captions are
    /// small, so they are always fetched whole.
    ///
    /// # Errors
    ///
    /// See [`run_with_stats`](Self::run_with_stats).
    pub async fn download_caption(
        &self,
        file: &CaptionFile,
        destination: &Path,
        progress: &dyn DownloadProgress,
    ) -> Result<(PathBuf, FileStats)> {
        let options = DownloadOptions::from_config(&self.config).with_resume(false);
        self.run_with_stats(file, destination, &options, progress).await
    }

    /// Ensures the parent directory exists for a file path.
    async fn ensure_parent_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.fs.create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Bytes to resume from, after checking the partial file.
    async fn resume_offset<T: DownloadTarget + ?Sized>(
        &self,
        target: &T,
        destination: &Path,
    ) -> Result<u64> {
        let existing = self
            .fs
            .file_size(destination)
            .await
            .ok_or_else(|| Error::FileNotFound {
                path: destination.to_path_buf(),
            })?;
        let expected = target.size();
        if existing == expected {
            return Err(Error::AlreadyComplete {
                path: destination.to_path_buf(),
            });
        }
        if expected > 0 && existing > expected {
            return Err(Error::Download(format!(
                "'{}' holds {existing} bytes, more than the {expected} expected",
                destination.display()
            )));
        }
        Ok(existing)
    }

    /// Downloads `target` to `destination`.
    ///
    /// Chunks are written in the order they arrive. If the body fails
    /// midway, whatever was received is written out first, so a later
    /// `resume` continues from the true on-disk size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileNotFound`] or [`Error::AlreadyComplete`] when
    /// resuming is impossible or pointless, [`Error::Http`] for non-2xx
    /// responses, and I/O or transport errors otherwise.
    pub async fn run_with_stats<T: DownloadTarget + ?Sized>(
        &self,
        target: &T,
        destination: &Path,
        options: &DownloadOptions,
        progress: &dyn DownloadProgress,
    ) -> Result<(PathBuf, FileStats)> {
        let name = destination
            .file_name()
            .map_or_else(|| destination.display().to_string(), |n| n.to_string_lossy().into_owned());
        let report = options.reports_progress();
        let chunk_size = options
            .chunk_size
            .unwrap_or_else(|| target.default_chunk_size(&self.config))
            .max(1);

        let mut offset = if options.resume {
            let offset = self.resume_offset(target, destination).await?;
            if report {
                progress.on_partial_detected(&name, offset, target.size());
            }
            offset
        } else {
            self.ensure_parent_dir(destination).await?;
            0
        };

        log::info!(
            "Downloading '{name}' ({} bytes, resume: {}) to {}",
            target.size(),
            options.resume,
            destination.display()
        );
        let stream = self
            .source
            .open(target.url(), options.resume.then_some(offset))
            .await?;
        if offset > 0 && !stream.partial {
            log::warn!("Server ignored the range request for '{name}'; starting over from the first byte");
            offset = 0;
        }

        let mut file = if offset > 0 {
            self.fs.open_append(destination).await?
        } else {
            self.fs.create_file(destination).await?
        };

        let mut tracker = DownloadStatsTracker::new(offset);
        if report {
            progress.on_file_start(&name, target.size(), offset);
        }

        let mut body = stream.body;
        let mut buffer = BytesMut::with_capacity(chunk_size);
        let mut failure = None;
        let mut write_error = None;
        'transfer: while let Some(next) = body.next().await {
            let bytes = match next {
                Ok(bytes) => bytes,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };
            buffer.extend_from_slice(&bytes);
            while buffer.len() >= chunk_size {
                let chunk = buffer.split_to(chunk_size);
                if let Err(e) = file.write_all(&chunk).await {
                    write_error = Some(e);
                    break 'transfer;
                }
                let speed = tracker.record_bytes(chunk.len() as u64);
                if report {
                    progress.on_progress(&name, chunk.len() as u64, speed);
                }
            }
        }
        // Bytes received before a transport error still reach the disk.
        if write_error.is_none() && !buffer.is_empty() {
            match file.write_all(&buffer).await {
                Ok(()) => {
                    let speed = tracker.record_bytes(buffer.len() as u64);
                    if report {
                        progress.on_progress(&name, buffer.len() as u64, speed);
                    }
                }
                Err(e) => write_error = Some(e),
            }
        }
        if let Err(e) = file.flush().await {
            write_error.get_or_insert(e);
        }

        if let Some(e) = failure.or_else(|| write_error.map(Error::from)) {
            log::error!(
                "Transfer of '{name}' failed after {} bytes: {e}",
                offset + tracker.downloaded()
            );
            if report {
                progress.on_error(&name, &e.to_string());
            }
            return Err(e);
        }

        let stats = tracker.into_file_stats();
        if target.size() > 0 && stats.final_size() != target.size() {
            log::warn!(
                "'{name}' is {} bytes on disk but {} were expected",
                stats.final_size(),
                target.size()
            );
        }
        if report {
            progress.on_file_complete(&name, &stats);
        }
        Ok((destination.to_path_buf(), stats))
    }
}
