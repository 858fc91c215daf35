//! moviebox-dl - A client library for the MovieBox streaming aggregator.
//!
//! The library searches the catalogue, reads item pages (whose data is
//! embedded as an indexed JSON graph), lists the media and caption files of
//! movies and episodes, and downloads them with resume support. It is
//! abstracted from any specific UI; the `cli` feature adds the terminal
//! front end used by the `moviebox` binary.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use moviebox_dl::provider::ContentProvider;
//! use moviebox_dl::{
//!     AcceptFirst, AppConfig, Downloader, HttpSource, NoProgress, Search, Session, search_and_select,
//! };
//!
//! # async fn example() -> moviebox_dl::Result<()> {
//! let config = AppConfig::load()?;
//! let session = Arc::new(Session::new(config.client.clone())?);
//!
//! // Find the first match released in 2009
//! let search = Search::new(Arc::clone(&session), "Avatar");
//! let item = search_and_select(search, &mut AcceptFirst, Some(2009)).await?;
//!
//! // List its files and download the best variant
//! let files = Search::new(Arc::clone(&session), "Avatar")
//!     .downloadable_files(&item)
//!     .content_model()
//!     .await?;
//! let media = files.best_media_file().ok_or(moviebox_dl::Error::NoMediaFiles)?;
//!
//! let downloader = Downloader::new(HttpSource::new(&config.client)?, config.download.clone());
//! let (path, stats) = downloader
//!     .download_media(media, Path::new("Avatar (2009).mp4"), &NoProgress)
//!     .await?;
//! println!("{} bytes written to {}", stats.size, path.display());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod extractor;
pub mod format;
pub mod fs;
pub mod media;
pub mod models;
pub mod provider;
pub mod resolver;
pub mod search;
pub mod session;
pub mod stats;

// Re-export main types for convenience
pub use config::{AppConfig, ClientConfig, DownloadConfig, MIRROR_HOSTS, PathConfig};
pub use download::{
    ByteSource, DownloadOptions, DownloadProgress, DownloadTarget, Downloader, HttpSource,
    NoProgress,
};
pub use error::{Error, Result};
pub use extractor::{ItemDetailsModel, JsonDetailsExtractor};
pub use format::{format_bytes, format_duration};
pub use fs::{FileSystem, TokioFileSystem};
pub use media::{CaptionFile, DownloadableFilesMetadata, MediaFile, Resolution, StreamFilesMetadata};
pub use models::{SearchResults, SearchResultsItem, SubjectType};
pub use provider::{
    ContentProvider, DownloadableFilesDetail, Homepage, ItemDetails, PopularSearch,
    StreamFilesDetail,
};
pub use resolver::{DereferencedDocument, resolve, resolve_all};
pub use search::{AcceptFirst, Search, SearchState, SelectionPolicy, search_and_select};
pub use session::{ApiSession, Session};
pub use stats::{DownloadStatsTracker, FileStats, SessionStats, SessionStatsBuilder};
