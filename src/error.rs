//! Error types for the moviebox-dl library.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::{Pager, SubjectType};

/// Errors that can occur while searching, extracting or downloading.
#[derive(Error, Debug)]
pub enum Error {
    /// The item page did not contain the expected embedded JSON, or its
    /// shape was not what the resolver expects (e.g. a block page).
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// The API answered with an envelope whose `code`/`message` signal failure.
    #[error("Unsuccessful response from the server: {envelope}")]
    UnsuccessfulResponse {
        /// The whole `{code, message, data}` envelope as received.
        envelope: serde_json::Value,
    },

    /// `next_page` was requested after the last page of results.
    #[error("Already at the last page of the search results (page {})", .pager.page)]
    ExhaustedSearchResults {
        /// Pager of the last fetched page.
        pager: Pager,
    },

    /// A pager announced more results without pointing past its own page.
    #[error(
        "The server reported more results after page {} but gave page {} as the next one",
        .pager.page,
        .pager.next_page
    )]
    StalledPagination {
        /// Pager of the last fetched page.
        pager: Pager,
    },

    /// `previous_page` was requested from the first page.
    #[error("Unable to navigate to the previous page from page {page}; try the next one instead")]
    NavigationBoundary {
        /// Page the navigation was attempted from.
        page: u32,
    },

    /// Search-and-select walked every page without a match.
    #[error(
        "All items in the search results for '{keyword}' are exhausted. Try a different keyword{}",
        year_hint(.year)
    )]
    ResultsExhausted {
        /// Keyword that was searched.
        keyword: String,
        /// Release-year filter that was applied, if any.
        year: Option<i32>,
    },

    /// A results page had no items.
    #[error("The search returned no results")]
    EmptyResults,

    /// No caption track matches the requested language.
    #[error(
        "There is no caption file for the language '{language}'. Choose from available ones - {}",
        .available.join(", ")
    )]
    CaptionNotFound {
        /// Requested language code or name.
        language: String,
        /// Names of the languages that are available.
        available: Vec<String>,
    },

    /// The download metadata lists no media variant.
    #[error("No downloadable media file is available")]
    NoMediaFiles,

    /// Details were requested for a subject type that has no item page.
    #[error("Only movies and TV series are supported, not {0:?}")]
    UnsupportedSubject(SubjectType),

    /// An item page URL is not on a known path.
    #[error("Invalid item page URL: {0}")]
    InvalidUrl(String),

    /// Resume was requested but there is no partial file to resume.
    #[error("File not found in path - '{}'", .path.display())]
    FileNotFound {
        /// Destination that was expected to exist.
        path: PathBuf,
    },

    /// Resume was requested but the local file is already complete.
    #[error("Download completed for the file in path - '{}'", .path.display())]
    AlreadyComplete {
        /// Destination that is already complete.
        path: PathBuf,
    },

    /// Download operation failed.
    #[error("Download failed: {0}")]
    Download(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request error, including non-2xx statuses.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be parsed.
    #[error("Config error: {0}")]
    Toml(#[from] toml::de::Error),
}

const fn year_hint(year: &Option<i32>) -> &'static str {
    if year.is_some() {
        " or a different year filter"
    } else {
        ""
    }
}

/// A specialized `Result` type for moviebox-dl operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_exhausted_mentions_year_filter_only_when_set() {
        let without = Error::ResultsExhausted {
            keyword: "avatar".into(),
            year: None,
        };
        let with = Error::ResultsExhausted {
            keyword: "avatar".into(),
            year: Some(2009),
        };
        assert!(without.to_string().contains("'avatar'"));
        assert!(!without.to_string().contains("year"));
        assert!(with.to_string().ends_with("or a different year filter"));
    }

    #[test]
    fn caption_not_found_lists_choices() {
        let err = Error::CaptionNotFound {
            language: "xx".into(),
            available: vec!["English".into(), "French".into()],
        };
        assert!(err.to_string().ends_with("English, French"));
    }
}
