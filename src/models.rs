//! Records served by the MovieBox API: subjects, search results, homepage
//! listings and the app info returned by the cookie bootstrap.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Content types mapped to their integer codes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SubjectType {
    /// Movies, series and music.
    #[default]
    All,
    /// Movies only.
    Movies,
    /// TV series only.
    TvSeries,
    /// Music only.
    Music,
}

impl SubjectType {
    /// Integer code used by the API.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::All => 0,
            Self::Movies => 1,
            Self::TvSeries => 2,
            Self::Music => 6,
        }
    }

    /// Human readable, plural name ("movies", "tv series").
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::All => "items",
            Self::Movies => "movies",
            Self::TvSeries => "tv series",
            Self::Music => "music",
        }
    }
}

impl TryFrom<u8> for SubjectType {
    type Error = String;

    fn try_from(code: u8) -> std::result::Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::All),
            1 => Ok(Self::Movies),
            2 => Ok(Self::TvSeries),
            6 => Ok(Self::Music),
            other => Err(format!("unknown subject type code {other}")),
        }
    }
}

impl From<SubjectType> for u8 {
    fn from(value: SubjectType) -> Self {
        value.code()
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::All => "ALL",
            Self::Movies => "MOVIES",
            Self::TvSeries => "TV_SERIES",
            Self::Music => "MUSIC",
        };
        f.write_str(name)
    }
}

/// Cover or poster image.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentImage {
    pub url: String,
    pub width: u32,
    pub height: u32,
    #[serde(deserialize_with = "de::u64_lenient")]
    pub size: u64,
    pub format: String,
    pub thumbnail: String,
    pub blur_hash: String,
    pub avg_hue_light: String,
    pub avg_hue_dark: String,
    pub id: String,
}

/// A single movie or TV series as listed in search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultsItem {
    pub subject_id: String,
    pub subject_type: SubjectType,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "de::date_lenient")]
    pub release_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "de::u64_lenient")]
    pub duration: u64,
    #[serde(default, deserialize_with = "de::comma_list")]
    pub genre: Vec<String>,
    #[serde(default)]
    pub country_name: String,
    #[serde(default, deserialize_with = "de::f32_lenient")]
    pub imdb_rating_value: f32,
    #[serde(default)]
    pub cover: Option<ContentImage>,
    pub detail_path: String,
    #[serde(default)]
    pub has_resource: bool,
    #[serde(default)]
    pub subtitles: String,
}

impl SearchResultsItem {
    /// Relative URL of the item's detail page.
    #[must_use]
    pub fn page_url(&self) -> String {
        format!("/detail/{}?id={}", self.detail_path, self.subject_id)
    }

    /// Relative path the API expects as `Referer` for this item.
    #[must_use]
    pub fn referer_path(&self) -> String {
        format!("/movies/{}", self.detail_path)
    }

    /// Release year, when the release date is known.
    #[must_use]
    pub fn release_year(&self) -> Option<i32> {
        self.release_date.map(|d| d.year())
    }
}

/// Pagination info accompanying a results page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pager {
    #[serde(deserialize_with = "de::u32_lenient")]
    pub page: u32,
    #[serde(deserialize_with = "de::u32_lenient")]
    pub per_page: u32,
    #[serde(default, deserialize_with = "de::u32_lenient")]
    pub total_count: u32,
    pub has_more: bool,
    #[serde(default, deserialize_with = "de::u32_lenient")]
    pub next_page: u32,
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub pager: Pager,
    #[serde(default)]
    pub items: Vec<SearchResultsItem>,
}

impl SearchResults {
    /// The first item of the page.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyResults`] when the page has no items.
    pub fn first_item(&self) -> Result<&SearchResultsItem> {
        self.items.first().ok_or(Error::EmptyResults)
    }
}

/// Item popular among other users' searches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularSearchItem {
    pub title: String,
    #[serde(default)]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub subject_type: Option<SubjectType>,
    #[serde(default)]
    pub detail_path: Option<String>,
}

/// Banner of a homepage category.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryBanner {
    pub items: Vec<BannerItem>,
}

/// A movie or series promoted on a homepage banner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerItem {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub image: Option<ContentImage>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub subject_id: String,
    pub subject_type: SubjectType,
    #[serde(default)]
    pub subject: Option<SearchResultsItem>,
}

/// A homepage section ("operating list" on the wire).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentCategory {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub position: i64,
    pub title: String,
    #[serde(default)]
    pub subjects: Vec<SearchResultsItem>,
    #[serde(default)]
    pub banner: Option<CategoryBanner>,
    #[serde(default)]
    pub op_id: String,
    #[serde(default)]
    pub url: String,
}

/// Platform a title is also available on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Platform {
    pub name: String,
    #[serde(default)]
    pub upload_by: String,
}

/// Landing page contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomepageContent {
    #[serde(default)]
    pub top_pick_list: Vec<serde_json::Value>,
    #[serde(default)]
    pub home_list: Vec<serde_json::Value>,
    #[serde(default)]
    pub platform_list: Vec<Platform>,
    #[serde(default)]
    pub operating_list: Vec<ContentCategory>,
}

impl HomepageContent {
    /// Movies and series from every category banner, in listing order.
    #[must_use]
    pub fn contents(&self) -> Vec<&BannerItem> {
        self.operating_list
            .iter()
            .filter_map(|category| category.banner.as_ref())
            .flat_map(|banner| banner.items.iter())
            .collect()
    }
}

/// Latest app package details, served by the cookie bootstrap endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppInfo {
    pub channel_type: String,
    pub pkg_name: String,
    pub url: String,
    pub version_code: String,
    pub version_name: String,
}

/// Lenient deserializers for fields the API sends as numbers or strings.
pub(crate) mod de {
    use super::{Deserialize, Deserializer, NaiveDate};
    use serde::de::Error as _;
    use serde_json::Value;

    fn to_u64(value: &Value) -> Option<u64> {
        match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) if s.is_empty() => Some(0),
            Value::String(s) => s.trim().parse().ok(),
            Value::Null => Some(0),
            _ => None,
        }
    }

    pub fn u64_lenient<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let value = Value::deserialize(deserializer)?;
        to_u64(&value).ok_or_else(|| D::Error::custom(format!("expected an unsigned integer, got {value}")))
    }

    pub fn u32_lenient<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        let value = u64_lenient(deserializer)?;
        u32::try_from(value).map_err(D::Error::custom)
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn f32_lenient<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Number(n) => Ok(n.as_f64().unwrap_or_default() as f32),
            Value::String(s) if s.trim().is_empty() => Ok(0.0),
            Value::String(s) => s.trim().parse().map_err(D::Error::custom),
            Value::Null => Ok(0.0),
            other => Err(D::Error::custom(format!("expected a number, got {other}"))),
        }
    }

    pub fn comma_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(s
                .split(',')
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(String::from)
                .collect()),
            Value::Array(items) => Ok(items
                .into_iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()),
            Value::Null => Ok(Vec::new()),
            other => Err(D::Error::custom(format!("expected a genre list, got {other}"))),
        }
    }

    /// Treats `null` like a missing field.
    pub fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Default + Deserialize<'de>,
    {
        Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
    }

    pub fn date_lenient<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDate>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) if !s.trim().is_empty() => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(Some)
                .map_err(D::Error::custom),
            _ => Ok(None),
        }
    }
}
