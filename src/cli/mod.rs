//! CLI mode for moviebox: searching, browsing and downloading from the
//! command line.

mod progress;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use console::Term;
use serde::Serialize;

use crate::config::{AppConfig, MIRROR_HOSTS};
use crate::download::{DownloadOptions, DownloadTarget, Downloader, HttpSource};
use crate::extractor::Season;
use crate::format::{caption_filename, episode_stem, media_filename, movie_stem, sanitize_filename};
use crate::media::{CaptionFile, DownloadableFilesMetadata, MediaFile, Resolution};
use crate::models::{SearchResultsItem, SubjectType};
use crate::provider::{ContentProvider, Homepage, PopularSearch};
use crate::search::{AcceptFirst, Search, SelectionPolicy, search_and_select};
use crate::session::Session;
use crate::{DownloadProgress, Error, NoProgress, Result, SessionStats, SessionStatsBuilder};

use progress::{
    BarProgress, print_categories, print_file_list, print_popular, print_search_results,
    print_summary,
};

/// Which media variant to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    /// Highest resolution available.
    #[default]
    Best,
    /// Lowest resolution available.
    Worst,
    /// Exactly this resolution.
    Exact(Resolution),
}

impl Quality {
    /// Picks the matching variant from `files`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMediaFiles`] when nothing matches.
    pub fn select(self, files: &DownloadableFilesMetadata) -> Result<&MediaFile> {
        let file = match self {
            Self::Best => files.best_media_file(),
            Self::Worst => files.worst_media_file(),
            Self::Exact(resolution) => files.media_file_by_resolution(resolution),
        };
        file.ok_or(Error::NoMediaFiles)
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().trim_end_matches('p') {
            "best" => Ok(Self::Best),
            "worst" => Ok(Self::Worst),
            height => height
                .parse::<u32>()
                .ok()
                .and_then(|h| Resolution::try_from(h).ok())
                .map(Self::Exact)
                .ok_or_else(|| {
                    format!("unknown quality '{s}' (expected best, worst, 360, 480, 720 or 1080)")
                }),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Best => f.write_str("best"),
            Self::Worst => f.write_str("worst"),
            Self::Exact(resolution) => write!(f, "{resolution}"),
        }
    }
}

/// What to do about captions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptionMode {
    /// Media plus the caption track, when there is one.
    #[default]
    Include,
    /// Media only.
    Skip,
    /// Caption track only; a missing track is an error.
    Only,
}

/// Everything a download command needs to know.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub title: String,
    pub year: Option<i32>,
    pub quality: Quality,
    pub directory: Option<PathBuf>,
    pub caption_mode: CaptionMode,
    pub language: String,
    pub yes: bool,
    pub resume: bool,
    pub quiet: bool,
}

impl DownloadRequest {
    /// A request for `title` with default options.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            year: None,
            quality: Quality::Best,
            directory: None,
            caption_mode: CaptionMode::Include,
            language: "English".to_string(),
            yes: false,
            resume: false,
            quiet: false,
        }
    }
}

/// Episodes of a series to download: `limit` episodes of `season`, starting
/// at `episode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeRange {
    pub season: u32,
    pub episode: u32,
    pub limit: usize,
}

impl EpisodeRange {
    /// Episode numbers to fetch, taken from the season listing when the
    /// page provides one.
    fn episodes(&self, season: Option<&Season>) -> Vec<u32> {
        season.map_or_else(
            || {
                let limit = u32::try_from(self.limit).unwrap_or(u32::MAX);
                (self.episode..self.episode.saturating_add(limit)).collect()
            },
            |season| {
                season
                    .episodes()
                    .into_iter()
                    .filter(|ep| *ep >= self.episode)
                    .take(self.limit)
                    .collect()
            },
        )
    }
}

/// Asks on the terminal whether each candidate is the one wanted.
pub struct ConsolePrompt {
    term: Term,
}

impl ConsolePrompt {
    #[must_use]
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
        }
    }
}

impl Default for ConsolePrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionPolicy for ConsolePrompt {
    fn accept(&mut self, item: &SearchResultsItem, position: usize, total: usize) -> bool {
        let year = item
            .release_year()
            .map_or_else(String::new, |y| format!(" ({y})"));
        let question = format!(
            "[{position}/{total}] {}{year} - {} - download? [y/N] ",
            item.title,
            item.genre.join(", ")
        );
        if let Err(e) = self.term.write_str(&question) {
            log::warn!("Cannot prompt on the terminal: {e}");
            return false;
        }
        match self.term.read_line() {
            Ok(answer) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Err(e) => {
                log::warn!("Cannot read the answer: {e}");
                false
            }
        }
    }
}

/// Finds the item a download request refers to.
async fn find_item(
    session: &Arc<Session>,
    request: &DownloadRequest,
    subject_type: SubjectType,
) -> Result<SearchResultsItem> {
    let search = Search::new(Arc::clone(session), &request.title).with_subject_type(subject_type);
    let item = if request.yes {
        search_and_select(search, &mut AcceptFirst, request.year).await?
    } else {
        search_and_select(search, &mut ConsolePrompt::new(), request.year).await?
    };
    log::info!(
        "Selected '{}' ({})",
        item.title,
        item.release_year()
            .map_or_else(|| "unknown year".to_string(), |y| y.to_string())
    );
    Ok(item)
}

/// One file queued for download.
struct Planned<'a> {
    target: &'a dyn DownloadTarget,
    path: PathBuf,
}

/// Queues the media and caption files of one title according to `request`.
fn plan_files<'a>(
    files: &'a DownloadableFilesMetadata,
    request: &DownloadRequest,
    directory: &Path,
    stem: &str,
) -> Result<Vec<Planned<'a>>> {
    let mut planned = Vec::new();
    if request.caption_mode != CaptionMode::Only {
        let media = request.quality.select(files)?;
        planned.push(Planned {
            target: media,
            path: directory.join(media_filename(stem, media)),
        });
    }
    let caption: Option<&CaptionFile> = match request.caption_mode {
        CaptionMode::Skip => None,
        CaptionMode::Only => Some(files.caption_or_error(&request.language)?),
        CaptionMode::Include => match files.caption_or_error(&request.language) {
            Ok(caption) => Some(caption),
            Err(e) => {
                log::warn!("{e}; continuing without captions");
                None
            }
        },
    };
    if let Some(caption) = caption {
        planned.push(Planned {
            target: caption,
            path: directory.join(caption_filename(stem, caption)),
        });
    }
    Ok(planned)
}

/// Downloads the planned files one after another.
async fn fetch_all(
    downloader: &Downloader,
    planned: &[Planned<'_>],
    request: &DownloadRequest,
    progress: &dyn DownloadProgress,
    builder: &mut SessionStatsBuilder,
) -> Result<()> {
    for file in planned {
        let existing = tokio::fs::metadata(&file.path)
            .await
            .ok()
            .filter(std::fs::Metadata::is_file)
            .map(|m| m.len());
        if !request.resume && existing == Some(file.target.size()) {
            println!("  {} already downloaded, skipping", file.path.display());
            builder.add_skipped();
            continue;
        }
        let options = DownloadOptions::from_config(downloader.config())
            .with_resume(request.resume && existing.is_some())
            .with_quiet(request.quiet);
        match downloader
            .run_with_stats(file.target, &file.path, &options, progress)
            .await
        {
            Ok((_, stats)) => builder.add_download(&stats),
            Err(Error::AlreadyComplete { path }) => {
                println!("  {} already downloaded, skipping", path.display());
                builder.add_skipped();
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn make_downloader(config: &AppConfig) -> Result<Downloader> {
    Ok(Downloader::new(
        HttpSource::new(&config.client)?,
        config.download.clone(),
    ))
}

fn progress_for(request: &DownloadRequest) -> Box<dyn DownloadProgress> {
    if request.quiet {
        Box::new(NoProgress)
    } else {
        Box::new(BarProgress::new())
    }
}

fn announce(planned: &[Planned<'_>], quiet: bool) {
    if quiet {
        return;
    }
    let listing: Vec<(String, u64)> = planned
        .iter()
        .map(|file| (file.path.display().to_string(), file.target.size()))
        .collect();
    print_file_list(&listing);
}

/// Searches for a movie and downloads it.
///
/// # Errors
///
/// Returns an error if no item is selected, the metadata cannot be fetched,
/// or a transfer fails.
pub async fn download_movie(config: &AppConfig, request: &DownloadRequest) -> Result<SessionStats> {
    let session = Arc::new(Session::new(config.client.clone())?);
    let item = find_item(&session, request, SubjectType::Movies).await?;
    let files = Search::new(Arc::clone(&session), &request.title)
        .downloadable_files(&item)
        .content_model()
        .await?;

    let directory = request
        .directory
        .clone()
        .unwrap_or_else(|| config.paths.download_dir.clone());
    let stem = movie_stem(&item.title, item.release_year());
    let planned = plan_files(&files, request, &directory, &stem)?;
    announce(&planned, request.quiet);

    let downloader = make_downloader(config)?;
    let progress = progress_for(request);
    let mut builder = SessionStatsBuilder::new();
    fetch_all(&downloader, &planned, request, progress.as_ref(), &mut builder).await?;

    let stats = builder.build();
    if !request.quiet {
        print_summary(&stats);
    }
    Ok(stats)
}

/// Searches for a series and downloads a range of its episodes.
///
/// # Errors
///
/// Returns an error if no item is selected, the metadata cannot be fetched,
/// or a transfer fails.
pub async fn download_series(
    config: &AppConfig,
    request: &DownloadRequest,
    range: EpisodeRange,
) -> Result<SessionStats> {
    let session = Arc::new(Session::new(config.client.clone())?);
    let item = find_item(&session, request, SubjectType::TvSeries).await?;
    let search = Search::new(Arc::clone(&session), &request.title);

    let details = search.item_details(&item)?.content_model().await?;
    let episodes = range.episodes(details.res_data.season(range.season));
    if episodes.is_empty() {
        println!(
            "No episodes of season {} from episode {} on.",
            range.season, range.episode
        );
        return Ok(SessionStats::new());
    }

    let directory = request
        .directory
        .clone()
        .unwrap_or_else(|| config.paths.download_dir.clone())
        .join(sanitize_filename(&item.title));
    let downloader = make_downloader(config)?;
    let progress = progress_for(request);
    let mut builder = SessionStatsBuilder::new();

    for episode in episodes {
        log::info!("Fetching S{:02}E{episode:02} of '{}'", range.season, item.title);
        let files = search
            .downloadable_files(&item)
            .with_episode(range.season, episode)
            .content_model()
            .await?;
        let stem = episode_stem(&item.title, range.season, episode);
        let planned = plan_files(&files, request, &directory, &stem)?;
        announce(&planned, request.quiet);
        fetch_all(&downloader, &planned, request, progress.as_ref(), &mut builder).await?;
    }

    let stats = builder.build();
    if !request.quiet {
        print_summary(&stats);
    }
    Ok(stats)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Prints one page of search results.
///
/// # Errors
///
/// Returns an error if the search request fails.
pub async fn search(
    config: &AppConfig,
    keyword: &str,
    subject_type: SubjectType,
    page: u32,
    json: bool,
) -> Result<()> {
    let session = Arc::new(Session::new(config.client.clone())?);
    let mut search = Search::new(session, keyword)
        .with_subject_type(subject_type)
        .with_page(page);
    let results = search.fetch(false).await?;
    if json {
        print_json(&results)
    } else {
        print_search_results(keyword, &results);
        Ok(())
    }
}

/// Prints the homepage listings, optionally only the categories whose title
/// contains `title`.
///
/// # Errors
///
/// Returns an error if the homepage request fails.
pub async fn homepage(config: &AppConfig, title: Option<&str>, json: bool) -> Result<()> {
    let session = Arc::new(Session::new(config.client.clone())?);
    let content = Homepage::new(session).content_model().await?;
    let needle = title.map(str::to_lowercase);
    let categories: Vec<_> = content
        .operating_list
        .iter()
        .filter(|c| {
            needle
                .as_deref()
                .is_none_or(|n| c.title.to_lowercase().contains(n))
        })
        .collect();
    if json {
        print_json(&categories)
    } else {
        print_categories(&categories);
        Ok(())
    }
}

/// Prints what everyone is searching for.
///
/// # Errors
///
/// Returns an error if the request fails.
pub async fn popular(config: &AppConfig, json: bool) -> Result<()> {
    let session = Arc::new(Session::new(config.client.clone())?);
    let items = PopularSearch::new(session).content_model().await?;
    if json {
        print_json(&items)
    } else {
        print_popular(&items);
        Ok(())
    }
}

/// Prints the known mirror hosts, marking the one in use.
///
/// # Errors
///
/// Returns an error if JSON output cannot be written.
pub fn mirror_hosts(config: &AppConfig, json: bool) -> Result<()> {
    if json {
        return print_json(&MIRROR_HOSTS);
    }
    for host in MIRROR_HOSTS {
        let marker = if host == config.client.host { "*" } else { " " };
        println!("{marker} {host}");
    }
    Ok(())
}
