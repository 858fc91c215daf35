//! Keyword search over movies and series, with page navigation.
//!
//! A [`Search`] is bound to one page. Navigating returns a fresh instance
//! for the neighbouring page and leaves the current one as it was, apart
//! from being marked [`SearchState::Exhausted`] when asked to go past the
//! last page.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::models::{SearchResults, SearchResultsItem, SubjectType};
use crate::provider::{ContentProvider, DownloadableFilesDetail, ItemDetails};
use crate::session::{ApiSession, Session};

const SEARCH_PATH: &str = "/wefeed-h5-bff/web/subject/search";

/// Items requested per page unless told otherwise.
pub const DEFAULT_PER_PAGE: u32 = 24;

/// Where a [`Search`] instance stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    /// Nothing fetched yet.
    Idle,
    /// The given page was fetched and modelled.
    Fetched { page: u32 },
    /// Navigation past the last page was attempted.
    Exhausted,
}

/// Search for a keyword, bound to one results page.
pub struct Search<S: ApiSession = Session> {
    session: Arc<S>,
    keyword: String,
    subject_type: SubjectType,
    page: u32,
    per_page: u32,
    state: SearchState,
    last: Option<SearchResults>,
}

impl<S: ApiSession> Search<S> {
    /// Searches every subject type for `keyword`, starting at page 1.
    pub fn new(session: Arc<S>, keyword: impl Into<String>) -> Self {
        Self {
            session,
            keyword: keyword.into(),
            subject_type: SubjectType::All,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            state: SearchState::Idle,
            last: None,
        }
    }

    /// Restricts results to one subject type.
    #[must_use]
    pub const fn with_subject_type(mut self, subject_type: SubjectType) -> Self {
        self.subject_type = subject_type;
        self
    }

    /// Sets the page number.
    #[must_use]
    pub const fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    /// Sets the number of items per page.
    #[must_use]
    pub const fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    #[must_use]
    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    #[must_use]
    pub const fn subject_type(&self) -> SubjectType {
        self.subject_type
    }

    #[must_use]
    pub const fn page(&self) -> u32 {
        self.page
    }

    #[must_use]
    pub const fn per_page(&self) -> u32 {
        self.per_page
    }

    #[must_use]
    pub const fn state(&self) -> SearchState {
        self.state
    }

    /// Results of the last successful fetch.
    #[must_use]
    pub const fn last_results(&self) -> Option<&SearchResults> {
        self.last.as_ref()
    }

    /// Body posted to the search endpoint.
    #[must_use]
    pub fn payload(&self) -> Value {
        json!({
            "keyword": self.keyword,
            "page": self.page,
            "perPage": self.per_page,
            "subjectType": self.subject_type.code(),
        })
    }

    /// Fetches this page. With `reuse_last` set, a previously fetched page
    /// is returned without another request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the envelope signals failure,
    /// or the data cannot be modelled.
    pub async fn fetch(&mut self, reuse_last: bool) -> Result<SearchResults> {
        if reuse_last {
            if let Some(results) = &self.last {
                return Ok(results.clone());
            }
        }
        let url = self.session.config().absolute_url(SEARCH_PATH);
        let data = self.session.post_to_api(&url, &self.payload()).await?;
        let results: SearchResults = serde_json::from_value(data)?;
        log::debug!(
            "Search '{}' page {} returned {} items",
            self.keyword,
            results.pager.page,
            results.items.len()
        );
        self.state = SearchState::Fetched { page: self.page };
        self.last = Some(results.clone());
        Ok(results)
    }

    /// Same search, another page.
    fn at_page(&self, page: u32) -> Self {
        Self {
            session: Arc::clone(&self.session),
            keyword: self.keyword.clone(),
            subject_type: self.subject_type,
            page,
            per_page: self.per_page,
            state: SearchState::Idle,
            last: None,
        }
    }

    /// Search for the page following `last`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExhaustedSearchResults`] when `last` has no more
    /// pages, or [`Error::StalledPagination`] when it claims more but its
    /// next page is not past its own. Either way this instance is then
    /// marked [`SearchState::Exhausted`].
    pub fn next_page(&mut self, last: &SearchResults) -> Result<Self> {
        let pager = last.pager;
        if !pager.has_more {
            self.state = SearchState::Exhausted;
            return Err(Error::ExhaustedSearchResults { pager });
        }
        if pager.next_page <= pager.page {
            log::warn!(
                "Search pager claims more results after page {} but points to page {}",
                pager.page,
                pager.next_page
            );
            self.state = SearchState::Exhausted;
            return Err(Error::StalledPagination { pager });
        }
        Ok(self.at_page(pager.next_page))
    }

    /// Search for the page preceding `last`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NavigationBoundary`] when `last` is the first page.
    pub fn previous_page(&self, last: &SearchResults) -> Result<Self> {
        if last.pager.page < 2 {
            return Err(Error::NavigationBoundary {
                page: last.pager.page,
            });
        }
        Ok(self.at_page(last.pager.page - 1))
    }

    /// Details accessor for a result of this search.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedSubject`] for anything but movies and
    /// series.
    pub fn item_details(&self, item: &SearchResultsItem) -> Result<ItemDetails<S>> {
        ItemDetails::new(Arc::clone(&self.session), item)
    }

    /// Downloadable files accessor for a result of this search.
    #[must_use]
    pub fn downloadable_files(&self, item: &SearchResultsItem) -> DownloadableFilesDetail<S> {
        DownloadableFilesDetail::new(Arc::clone(&self.session), item)
    }
}

#[async_trait]
impl<S: ApiSession> ContentProvider for Search<S> {
    type Model = SearchResults;

    async fn content(&mut self) -> Result<Value> {
        Ok(serde_json::to_value(self.fetch(false).await?)?)
    }

    async fn content_model(&mut self) -> Result<Self::Model> {
        self.fetch(false).await
    }
}

/// Decides whether a search result is the one wanted.
pub trait SelectionPolicy: Send {
    /// `position` is 1-based among the `total` candidates of the page.
    fn accept(&mut self, item: &SearchResultsItem, position: usize, total: usize) -> bool;
}

/// Takes the first candidate without asking.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptFirst;

impl SelectionPolicy for AcceptFirst {
    fn accept(&mut self, _item: &SearchResultsItem, _position: usize, _total: usize) -> bool {
        true
    }
}

impl<F> SelectionPolicy for F
where
    F: FnMut(&SearchResultsItem, usize, usize) -> bool + Send,
{
    fn accept(&mut self, item: &SearchResultsItem, position: usize, total: usize) -> bool {
        self(item, position, total)
    }
}

/// Walks the pages of `search` until `policy` accepts an item released in
/// `year` (any year when `None`).
///
/// # Errors
///
/// Returns [`Error::ResultsExhausted`] when no page is left, or any error
/// raised while fetching a page.
pub async fn search_and_select<S, P>(
    mut search: Search<S>,
    policy: &mut P,
    year: Option<i32>,
) -> Result<SearchResultsItem>
where
    S: ApiSession,
    P: SelectionPolicy + ?Sized,
{
    loop {
        let results = search.fetch(false).await?;
        log::info!(
            "Query '{}' yielded {}{} {}.",
            search.keyword(),
            if results.pager.has_more { "over " } else { "" },
            results.items.len(),
            search.subject_type().label()
        );

        let candidates: Vec<&SearchResultsItem> = results
            .items
            .iter()
            .filter(|item| year.is_none_or(|year| item.release_year() == Some(year)))
            .collect();
        let total = candidates.len();
        for (index, item) in candidates.into_iter().enumerate() {
            if policy.accept(item, index + 1, total) {
                return Ok(item.clone());
            }
        }

        if !results.pager.has_more {
            return Err(Error::ResultsExhausted {
                keyword: search.keyword().to_string(),
                year,
            });
        }
        search = search.next_page(&results)?;
        log::info!(
            "Navigating to the search results of page number {}",
            search.page()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Pager;
    use crate::session::mock::MockSession;
    use proptest::prelude::*;

    fn item(title: &str, release: &str) -> Value {
        json!({
            "subjectId": format!("{title}-id"),
            "subjectType": 1,
            "title": title,
            "releaseDate": release,
            "detailPath": format!("{}-path", title.to_lowercase())
        })
    }

    /// A session serving `pages` (1-based) of search results.
    fn paged_session(pages: Vec<Vec<Value>>) -> Arc<MockSession> {
        Arc::new(MockSession::new(move |request| {
            let payload = request.payload.as_ref().expect("search posts a payload");
            let page = payload["page"].as_u64().unwrap() as usize;
            let items = pages.get(page - 1).cloned().unwrap_or_default();
            let has_more = page < pages.len();
            Ok(MockSession::envelope(&json!({
                "pager": {
                    "page": page,
                    "perPage": payload["perPage"],
                    "totalCount": pages.iter().map(Vec::len).sum::<usize>(),
                    "hasMore": has_more,
                    "nextPage": if has_more { page + 1 } else { page }
                },
                "items": items
            })))
        }))
    }

    fn results_at(page: u32, has_more: bool) -> SearchResults {
        SearchResults {
            pager: Pager {
                page,
                per_page: DEFAULT_PER_PAGE,
                total_count: 0,
                has_more,
                next_page: if has_more { page + 1 } else { page },
            },
            items: vec![],
        }
    }

    #[tokio::test]
    async fn fetch_posts_payload_and_records_state() {
        let session = paged_session(vec![vec![item("Avatar", "2009-12-18")]]);
        let mut search = Search::new(Arc::clone(&session), "avatar").with_subject_type(SubjectType::Movies);
        assert_eq!(search.state(), SearchState::Idle);

        let results = search.fetch(false).await.unwrap();
        assert_eq!(results.first_item().unwrap().title, "Avatar");
        assert_eq!(search.state(), SearchState::Fetched { page: 1 });

        let request = &session.requests()[0];
        assert!(request.url.ends_with("/wefeed-h5-bff/web/subject/search"));
        assert_eq!(
            request.payload,
            Some(json!({"keyword": "avatar", "page": 1, "perPage": 24, "subjectType": 1}))
        );
    }

    #[tokio::test]
    async fn reuse_last_skips_the_network() {
        let session = paged_session(vec![vec![item("Avatar", "2009-12-18")]]);
        let mut search = Search::new(Arc::clone(&session), "avatar");
        search.fetch(true).await.unwrap();
        search.fetch(true).await.unwrap();
        assert_eq!(session.requests().len(), 1);
        search.fetch(false).await.unwrap();
        assert_eq!(session.requests().len(), 2);
    }

    #[test]
    fn next_page_past_the_end_exhausts() {
        let session = paged_session(vec![]);
        let mut search = Search::new(session, "x").with_page(3);
        let last = results_at(3, false);
        match search.next_page(&last) {
            Err(Error::ExhaustedSearchResults { pager }) => assert_eq!(pager, last.pager),
            other => panic!("unexpected {:?}", other.map(|s| s.page())),
        }
        assert_eq!(search.state(), SearchState::Exhausted);
        assert_eq!(search.page(), 3);
    }

    #[test]
    fn previous_page_from_first_fails() {
        let search = Search::new(paged_session(vec![]), "x");
        assert!(matches!(
            search.previous_page(&results_at(1, true)),
            Err(Error::NavigationBoundary { page: 1 })
        ));
    }

    #[test]
    fn navigation_keeps_parameters() {
        let mut search = Search::new(paged_session(vec![]), "merlin")
            .with_subject_type(SubjectType::TvSeries)
            .with_per_page(10);
        let next = search.next_page(&results_at(1, true)).unwrap();
        assert_eq!(next.page(), 2);
        assert_eq!(next.keyword(), "merlin");
        assert_eq!(next.subject_type(), SubjectType::TvSeries);
        assert_eq!(next.per_page(), 10);
        assert_eq!(next.state(), SearchState::Idle);
        assert_eq!(search.page(), 1);
    }

    proptest! {
        #[test]
        fn next_then_previous_returns_to_origin(page in 1u32..10_000) {
            let mut search = Search::new(paged_session(vec![]), "x").with_page(page);
            let next = search.next_page(&results_at(page, true)).unwrap();
            prop_assert_eq!(next.page(), page + 1);
            let back = next.previous_page(&results_at(next.page(), true)).unwrap();
            prop_assert_eq!(back.page(), page);
        }

        #[test]
        fn next_without_more_always_fails(page in 1u32..10_000) {
            let mut search = Search::new(paged_session(vec![]), "x").with_page(page);
            let is_exhausted = matches!(
                search.next_page(&results_at(page, false)),
                Err(Error::ExhaustedSearchResults { .. })
            );
            prop_assert!(is_exhausted);
        }
    }

    #[tokio::test]
    async fn wire_pagers_keep_has_more_consistent() {
        let session = paged_session(vec![
            vec![item("A", "2001-01-01")],
            vec![item("B", "2002-01-01")],
            vec![item("C", "2003-01-01")],
        ]);
        let mut search = Search::new(session, "x");
        loop {
            let results = search.fetch(false).await.unwrap();
            assert_eq!(results.pager.has_more, results.pager.next_page > results.pager.page);
            match search.next_page(&results) {
                Ok(next) => search = next,
                Err(Error::ExhaustedSearchResults { .. }) => break,
                Err(e) => panic!("unexpected {e}"),
            }
        }
        assert_eq!(search.state(), SearchState::Exhausted);
    }

    #[test]
    fn next_page_not_past_the_current_one_is_refused() {
        let mut search = Search::new(paged_session(vec![]), "x").with_page(4);
        let mut last = results_at(4, true);
        last.pager.next_page = 0;
        match search.next_page(&last) {
            Err(Error::StalledPagination { pager }) => assert_eq!(pager, last.pager),
            other => panic!("unexpected {:?}", other.map(|s| s.page())),
        }
        assert_eq!(search.state(), SearchState::Exhausted);

        last.pager.next_page = 4;
        assert!(matches!(
            search.next_page(&last),
            Err(Error::StalledPagination { .. })
        ));
    }

    #[tokio::test]
    async fn selection_stops_when_the_server_never_advances() {
        // Every page claims more results but carries no `nextPage`.
        let session = Arc::new(MockSession::new(|request| {
            let payload = request.payload.as_ref().expect("search posts a payload");
            Ok(MockSession::envelope(&json!({
                "pager": {"page": payload["page"], "perPage": 24, "hasMore": true},
                "items": [item("Avatar", "2009-12-18")]
            })))
        }));
        let result = search_and_select(
            Search::new(Arc::clone(&session), "avatar"),
            &mut |_: &SearchResultsItem, _: usize, _: usize| false,
            None,
        )
        .await;
        assert!(matches!(result, Err(Error::StalledPagination { .. })));
        assert_eq!(session.requests().len(), 1);
    }

    #[tokio::test]
    async fn accept_first_takes_first_item() {
        let session = paged_session(vec![vec![item("Avatar", "2009-12-18"), item("Avatar 2", "2022-12-16")]]);
        let chosen = search_and_select(Search::new(session, "avatar"), &mut AcceptFirst, None)
            .await
            .unwrap();
        assert_eq!(chosen.title, "Avatar");
    }

    #[tokio::test]
    async fn year_filter_follows_next_pages() {
        let session = paged_session(vec![
            vec![item("Avatar", "2009-12-18")],
            vec![item("Avatar 2", "2022-12-16")],
        ]);
        let chosen = search_and_select(Search::new(Arc::clone(&session), "avatar"), &mut AcceptFirst, Some(2022))
            .await
            .unwrap();
        assert_eq!(chosen.title, "Avatar 2");
        assert_eq!(session.requests().len(), 2);
    }

    #[tokio::test]
    async fn policy_sees_positions_among_candidates() {
        let session = paged_session(vec![vec![
            item("One", "2001-01-01"),
            item("Two", "2002-01-01"),
            item("Three", "2003-01-01"),
        ]]);
        let mut seen = Vec::new();
        let mut policy = |item: &SearchResultsItem, position: usize, total: usize| {
            seen.push((position, total));
            item.title == "Three"
        };
        let chosen = search_and_select(Search::new(session, "x"), &mut policy, None)
            .await
            .unwrap();
        assert_eq!(chosen.title, "Three");
        assert_eq!(seen, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[tokio::test]
    async fn rejecting_everything_exhausts_results() {
        let session = paged_session(vec![
            vec![item("A", "2001-01-01")],
            vec![item("B", "2002-01-01")],
        ]);
        let mut reject = |_: &SearchResultsItem, _: usize, _: usize| false;
        let result = search_and_select(Search::new(Arc::clone(&session), "abc"), &mut reject, Some(1990)).await;
        match result {
            Err(Error::ResultsExhausted { keyword, year }) => {
                assert_eq!(keyword, "abc");
                assert_eq!(year, Some(1990));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(session.requests().len(), 2);
    }

    #[test]
    fn item_details_reject_music() {
        let search = Search::new(paged_session(vec![]), "x");
        let mut music: SearchResultsItem = serde_json::from_value(item("Song", "2020-01-01")).unwrap();
        music.subject_type = SubjectType::Music;
        assert!(matches!(
            search.item_details(&music),
            Err(Error::UnsupportedSubject(SubjectType::Music))
        ));
    }
}
