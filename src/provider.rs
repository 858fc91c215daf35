//! Content accessors: each one fetches a single kind of content and models it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::extractor::{ItemDetailsModel, JsonDetailsExtractor};
use crate::media::{DownloadableFilesMetadata, StreamFilesMetadata};
use crate::models::{HomepageContent, PopularSearchItem, SearchResultsItem, SubjectType};
use crate::session::{ApiSession, Session};

const HOMEPAGE_PATH: &str = "/wefeed-h5-bff/web/home";
const POPULAR_SEARCH_PATH: &str = "/wefeed-h5-bff/web/subject/everyone-search";
const DOWNLOAD_PATH: &str = "/wefeed-h5-bff/web/subject/download";
const STREAM_PATH: &str = "/wefeed-h5-bff/web/subject/play";
const ITEM_PAGE_PREFIX: &str = "/detail/";

/// Something that fetches raw content and can model it.
#[async_trait]
pub trait ContentProvider: Send {
    /// Typed form of the content.
    type Model: DeserializeOwned + Send;

    /// Fetches the content as plain JSON.
    async fn content(&mut self) -> Result<Value>;

    /// Fetches the content and deserializes it into [`Self::Model`].
    async fn content_model(&mut self) -> Result<Self::Model> {
        Ok(serde_json::from_value(self.content().await?)?)
    }
}

/// Listings of the landing page.
pub struct Homepage<S: ApiSession = Session> {
    session: Arc<S>,
}

impl<S: ApiSession> Homepage<S> {
    /// Creates the accessor.
    pub const fn new(session: Arc<S>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl<S: ApiSession> ContentProvider for Homepage<S> {
    type Model = HomepageContent;

    async fn content(&mut self) -> Result<Value> {
        let url = self.session.config().absolute_url(HOMEPAGE_PATH);
        self.session.get_from_api(&url, &[], &[]).await
    }
}

/// Titles other users are searching for.
pub struct PopularSearch<S: ApiSession = Session> {
    session: Arc<S>,
}

impl<S: ApiSession> PopularSearch<S> {
    /// Creates the accessor.
    pub const fn new(session: Arc<S>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl<S: ApiSession> ContentProvider for PopularSearch<S> {
    type Model = Vec<PopularSearchItem>;

    async fn content(&mut self) -> Result<Value> {
        let url = self.session.config().absolute_url(POPULAR_SEARCH_PATH);
        let mut content = self
            .session
            .get_with_cookies_from_api(&url, &[], &[])
            .await?;
        Ok(content
            .get_mut("everyoneSearch")
            .map_or_else(|| Value::Array(Vec::new()), Value::take))
    }
}

/// Checks that `url` points at an item page and returns it relative to the
/// host.
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] for anything that is not `/detail/...`.
pub fn validate_item_page_url(url: &str) -> Result<String> {
    let relative = match url.find("://") {
        Some(scheme_end) => {
            let rest = &url[scheme_end + 3..];
            rest.find('/').map_or("", |at| &rest[at..])
        }
        None => url,
    };
    let slug = relative
        .strip_prefix(ITEM_PAGE_PREFIX)
        .map(|rest| rest.split(['?', '#']).next().unwrap_or_default())
        .unwrap_or_default();
    if slug.is_empty() {
        return Err(Error::InvalidUrl(url.to_string()));
    }
    Ok(relative.to_string())
}

/// Details of one movie or series, taken from its item page.
///
/// The page is fetched once and kept; pass `reuse = false` to refetch.
pub struct ItemDetails<S: ApiSession = Session> {
    session: Arc<S>,
    page_url: String,
    referer: String,
    html: Option<String>,
}

impl<S: ApiSession> ItemDetails<S> {
    /// Accessor for a search result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedSubject`] unless the item is a movie or a
    /// TV series.
    pub fn new(session: Arc<S>, item: &SearchResultsItem) -> Result<Self> {
        match item.subject_type {
            SubjectType::Movies | SubjectType::TvSeries => Ok(Self {
                referer: session.config().absolute_url(&item.referer_path()),
                page_url: item.page_url(),
                session,
                html: None,
            }),
            other => Err(Error::UnsupportedSubject(other)),
        }
    }

    /// Accessor for an item page URL, absolute or relative to the host.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] when `url` is not an item page.
    pub fn from_url(session: Arc<S>, url: &str) -> Result<Self> {
        let page_url = validate_item_page_url(url)?;
        let detail_path = page_url
            .trim_start_matches(ITEM_PAGE_PREFIX)
            .split(['?', '#'])
            .next()
            .unwrap_or_default();
        Ok(Self {
            referer: session
                .config()
                .absolute_url(&format!("/movies/{detail_path}")),
            page_url,
            session,
            html: None,
        })
    }

    /// Item page URL relative to the host.
    #[must_use]
    pub fn page_url(&self) -> &str {
        &self.page_url
    }

    /// The page HTML, from the cache when `reuse` is set and a copy is held.
    ///
    /// # Errors
    ///
    /// Returns an error if the page request fails.
    pub async fn html_content(&mut self, reuse: bool) -> Result<&str> {
        if !reuse || self.html.is_none() {
            let url = self.session.config().absolute_url(&self.page_url);
            let html = self
                .session
                .get_with_cookies(&url, &[], &[("Referer", self.referer.clone())])
                .await?;
            self.html = Some(html);
        }
        Ok(self.html.as_deref().unwrap_or_default())
    }

    /// Extractor over the (possibly cached) page.
    ///
    /// # Errors
    ///
    /// Returns an error if the page request fails or the page has no
    /// resolvable embedded JSON.
    pub async fn json_extractor(&mut self, reuse: bool) -> Result<JsonDetailsExtractor> {
        JsonDetailsExtractor::from_html(self.html_content(reuse).await?)
    }
}

#[async_trait]
impl<S: ApiSession> ContentProvider for ItemDetails<S> {
    type Model = ItemDetailsModel;

    async fn content(&mut self) -> Result<Value> {
        let extractor = self.json_extractor(true).await?;
        Ok(Value::Object(extractor.details().clone()))
    }

    async fn content_model(&mut self) -> Result<Self::Model> {
        self.json_extractor(true).await?.into_model()
    }
}

/// Identifies one movie, or one episode of a series, for the file metadata
/// endpoints.
#[derive(Debug, Clone)]
struct EpisodeQuery {
    subject_id: String,
    referer: String,
    season: u32,
    episode: u32,
}

impl EpisodeQuery {
    fn new(config: &ClientConfig, item: &SearchResultsItem) -> Self {
        Self {
            subject_id: item.subject_id.clone(),
            referer: config.absolute_url(&item.referer_path()),
            season: 0,
            episode: 0,
        }
    }

    async fn fetch<S: ApiSession>(&self, session: &S, path: &str) -> Result<Value> {
        let url = session.config().absolute_url(path);
        let query = [
            ("subjectId", self.subject_id.clone()),
            ("se", self.season.to_string()),
            ("ep", self.episode.to_string()),
        ];
        // Without the referer the server answers with an empty listing.
        session
            .get_with_cookies_from_api(&url, &query, &[("Referer", self.referer.clone())])
            .await
    }
}

/// Media and caption files offered for download.
///
/// Targets the movie itself (season and episode `0`) unless
/// [`with_episode`](Self::with_episode) picks a series episode.
pub struct DownloadableFilesDetail<S: ApiSession = Session> {
    session: Arc<S>,
    query: EpisodeQuery,
}

impl<S: ApiSession> DownloadableFilesDetail<S> {
    /// Creates the accessor for `item`.
    pub fn new(session: Arc<S>, item: &SearchResultsItem) -> Self {
        let query = EpisodeQuery::new(session.config(), item);
        Self { session, query }
    }

    /// Targets the given season and episode.
    #[must_use]
    pub const fn with_episode(mut self, season: u32, episode: u32) -> Self {
        self.query.season = season;
        self.query.episode = episode;
        self
    }

    /// Season and episode currently targeted.
    #[must_use]
    pub const fn episode(&self) -> (u32, u32) {
        (self.query.season, self.query.episode)
    }
}

#[async_trait]
impl<S: ApiSession> ContentProvider for DownloadableFilesDetail<S> {
    type Model = DownloadableFilesMetadata;

    async fn content(&mut self) -> Result<Value> {
        self.query.fetch(self.session.as_ref(), DOWNLOAD_PATH).await
    }
}

/// Files offered for streaming.
pub struct StreamFilesDetail<S: ApiSession = Session> {
    session: Arc<S>,
    query: EpisodeQuery,
}

impl<S: ApiSession> StreamFilesDetail<S> {
    /// Creates the accessor for `item`.
    pub fn new(session: Arc<S>, item: &SearchResultsItem) -> Self {
        let query = EpisodeQuery::new(session.config(), item);
        Self { session, query }
    }

    /// Targets the given season and episode.
    #[must_use]
    pub const fn with_episode(mut self, season: u32, episode: u32) -> Self {
        self.query.season = season;
        self.query.episode = episode;
        self
    }
}

#[async_trait]
impl<S: ApiSession> ContentProvider for StreamFilesDetail<S> {
    type Model = StreamFilesMetadata;

    async fn content(&mut self) -> Result<Value> {
        self.query.fetch(self.session.as_ref(), STREAM_PATH).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::fixtures::page_html;
    use crate::session::mock::MockSession;
    use serde_json::json;

    fn item(subject_type: u8) -> SearchResultsItem {
        serde_json::from_value(json!({
            "subjectId": "42",
            "subjectType": subject_type,
            "title": "Avatar",
            "detailPath": "avatar-WLDIi21IUBa"
        }))
        .unwrap()
    }

    #[test]
    fn item_page_urls_are_validated() {
        assert_eq!(
            validate_item_page_url("https://moviebox.ng/detail/avatar-x?id=1").unwrap(),
            "/detail/avatar-x?id=1"
        );
        assert_eq!(validate_item_page_url("/detail/avatar-x").unwrap(), "/detail/avatar-x");
        assert!(matches!(validate_item_page_url("/movies/avatar-x"), Err(Error::InvalidUrl(_))));
        assert!(matches!(validate_item_page_url("/detail/?id=1"), Err(Error::InvalidUrl(_))));
        assert!(matches!(validate_item_page_url("https://moviebox.ng"), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn music_has_no_item_details() {
        let session = Arc::new(MockSession::new(|_| Ok(String::new())));
        assert!(matches!(
            ItemDetails::new(session, &item(6)),
            Err(Error::UnsupportedSubject(SubjectType::Music))
        ));
    }

    #[tokio::test]
    async fn homepage_is_modelled() {
        let session = Arc::new(MockSession::new(|request| {
            assert!(request.url.ends_with("/wefeed-h5-bff/web/home"));
            Ok(MockSession::envelope(&json!({
                "operatingList": [{"type": "BANNER", "title": "Top", "banner": {"items": [{"title": "A", "subjectType": 1}]}}]
            })))
        }));
        let homepage = Homepage::new(session).content_model().await.unwrap();
        assert_eq!(homepage.contents()[0].title, "A");
    }

    #[tokio::test]
    async fn popular_search_unwraps_list() {
        let session = Arc::new(MockSession::new(|_| {
            Ok(MockSession::envelope(&json!({"everyoneSearch": [{"title": "Squid Game"}, {"title": "Avatar"}]})))
        }));
        let items = PopularSearch::new(session).content_model().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].title, "Avatar");
    }

    #[tokio::test]
    async fn item_page_is_cached_until_refetched() {
        let html = page_html(&json!({"resData": {"subject": {
            "subjectId": "42", "subjectType": 1, "title": "Avatar", "detailPath": "avatar-WLDIi21IUBa"
        }}}));
        let session = Arc::new(MockSession::new(move |_| Ok(html.clone())));
        let mut details = ItemDetails::new(Arc::clone(&session), &item(1)).unwrap();

        let model = details.content_model().await.unwrap();
        assert_eq!(model.res_data.subject.title, "Avatar");
        details.content().await.unwrap();
        assert_eq!(session.requests().len(), 1);

        details.html_content(false).await.unwrap();
        assert_eq!(session.requests().len(), 2);

        let request = &session.requests()[0];
        assert_eq!(request.url, "https://moviebox.ng/detail/avatar-WLDIi21IUBa?id=42");
        assert_eq!(request.header("referer"), Some("https://moviebox.ng/movies/avatar-WLDIi21IUBa"));
    }

    #[tokio::test]
    async fn item_details_from_url_derive_referer() {
        let session = Arc::new(MockSession::new(|_| Ok("<html></html>".into())));
        let mut details =
            ItemDetails::from_url(Arc::clone(&session), "https://moviebox.ng/detail/merlin-abc?id=7").unwrap();
        assert!(matches!(details.json_extractor(true).await, Err(Error::Extraction(_))));
        assert_eq!(
            session.requests()[0].header("referer"),
            Some("https://moviebox.ng/movies/merlin-abc")
        );
    }

    #[tokio::test]
    async fn download_metadata_targets_movie_or_episode() {
        let session = Arc::new(MockSession::new(|_| {
            Ok(MockSession::envelope(&json!({
                "downloads": [{"id": "1", "url": "https://cdn/1.mp4", "resolution": 1080, "size": 100}],
                "captions": [],
                "hasResource": true
            })))
        }));

        let mut movie = DownloadableFilesDetail::new(Arc::clone(&session), &item(1));
        let meta = movie.content_model().await.unwrap();
        assert_eq!(meta.best_media_file().unwrap().size, 100);

        let mut episode = DownloadableFilesDetail::new(Arc::clone(&session), &item(2)).with_episode(2, 5);
        assert_eq!(episode.episode(), (2, 5));
        episode.content_model().await.unwrap();

        let requests = session.requests();
        assert!(requests[0].url.ends_with("/wefeed-h5-bff/web/subject/download"));
        assert_eq!(requests[0].query_value("subjectId"), Some("42"));
        assert_eq!(requests[0].query_value("se"), Some("0"));
        assert_eq!(requests[0].query_value("ep"), Some("0"));
        assert_eq!(requests[1].query_value("se"), Some("2"));
        assert_eq!(requests[1].query_value("ep"), Some("5"));
        assert_eq!(
            requests[1].header("Referer"),
            Some("https://moviebox.ng/movies/avatar-WLDIi21IUBa")
        );
    }

    #[tokio::test]
    async fn stream_metadata_uses_play_endpoint() {
        let session = Arc::new(MockSession::new(|_| {
            Ok(MockSession::envelope(&json!({
                "streams": [{"id": "s", "format": "MP4", "url": "https://cdn/s.mp4", "resolutions": "720", "size": "10"}],
                "freeNum": 3
            })))
        }));
        let mut streams = StreamFilesDetail::new(Arc::clone(&session), &item(2)).with_episode(1, 1);
        let meta = streams.content_model().await.unwrap();
        assert_eq!(meta.default_stream().unwrap().size, 10);
        assert!(session.requests()[0].url.ends_with("/wefeed-h5-bff/web/subject/play"));
    }

    #[tokio::test]
    async fn failed_envelope_surfaces() {
        let session = Arc::new(MockSession::new(|_| {
            Ok(json!({"code": 1, "message": "fail", "data": null}).to_string())
        }));
        let result = DownloadableFilesDetail::new(session, &item(1)).content().await;
        assert!(matches!(result, Err(Error::UnsuccessfulResponse { .. })));
    }
}
