//! Formatting helpers: human-readable sizes and durations, and the names
//! downloaded files are saved under.

use std::time::Duration;

use crate::media::{CaptionFile, MediaFile};

/// Characters that are not allowed in file names on common platforms.
const RESERVED_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Formats a byte count as a human-readable string (B, KB, MB, GB).
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Formats a duration as a human-readable string (e.g. "5.0s", "1m 05s", "1h 01m 05s").
#[must_use]
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!(
            "{}h {:02}m {:02}s",
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60
        )
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}.{:01}s", secs, d.subsec_millis() / 100)
    }
}

/// Replaces characters that cannot appear in file names and trims the
/// result.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if RESERVED_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    cleaned.trim().trim_end_matches('.').trim().to_string()
}

/// Base name for a movie: `Title (Year)`, or just `Title` when the year is
/// unknown.
#[must_use]
pub fn movie_stem(title: &str, year: Option<i32>) -> String {
    match year {
        Some(year) => format!("{} ({year})", sanitize_filename(title)),
        None => sanitize_filename(title),
    }
}

/// Base name for a series episode: `Title S01E02`.
#[must_use]
pub fn episode_stem(title: &str, season: u32, episode: u32) -> String {
    format!("{} S{season:02}E{episode:02}", sanitize_filename(title))
}

/// Extension of the file a URL points at, if it looks like one.
fn url_extension(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let last_segment = path.rsplit('/').next().unwrap_or_default();
    let (_, extension) = last_segment.rsplit_once('.')?;
    (1..=4)
        .contains(&extension.len())
        .then_some(extension)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// File name for a media variant: `{stem} - 1080P.mp4`.
#[must_use]
pub fn media_filename(stem: &str, file: &MediaFile) -> String {
    let extension = url_extension(&file.url).unwrap_or("mp4");
    format!("{stem} - {}.{extension}", file.resolution)
}

/// File name for a caption track: `{stem} - English.srt`.
#[must_use]
pub fn caption_filename(stem: &str, caption: &CaptionFile) -> String {
    let extension = url_extension(&caption.url).unwrap_or("srt");
    format!(
        "{stem} - {}.{extension}",
        sanitize_filename(&caption.language_name)
    )
}
