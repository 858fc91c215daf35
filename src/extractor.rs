//! Typed access to the details of a movie or series page.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::media::Resolution;
use crate::models::{de, Pager, SearchResultsItem};
use crate::resolver::DereferencedDocument;

/// Key of the section holding the page's data proper.
const RES_DATA: &str = "resData";

/// Accessors over the resolved item page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonDetailsExtractor {
    document: DereferencedDocument,
}

impl JsonDetailsExtractor {
    /// Wraps an already resolved document.
    #[must_use]
    pub const fn new(document: DereferencedDocument) -> Self {
        Self { document }
    }

    /// Resolves the embedded JSON of `html`.
    ///
    /// # Errors
    ///
    /// See [`DereferencedDocument::from_html`].
    pub fn from_html(html: &str) -> Result<Self> {
        DereferencedDocument::from_html(html).map(Self::new)
    }

    /// Everything under `details`.
    #[must_use]
    pub const fn details(&self) -> &Map<String, Value> {
        self.document.details()
    }

    /// The `resData` section.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Extraction`] when the section is missing.
    pub fn data(&self) -> Result<&Map<String, Value>> {
        self.details()
            .get(RES_DATA)
            .and_then(Value::as_object)
            .ok_or_else(|| missing(RES_DATA))
    }

    fn section(&self, key: &str) -> Result<&Value> {
        self.data()?
            .get(key)
            .filter(|value| !value.is_null())
            .ok_or_else(|| missing(&format!("{RES_DATA}.{key}")))
    }

    /// `resData.subject`: the movie or series itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Extraction`] when the section is missing.
    pub fn subject(&self) -> Result<&Value> {
        self.section("subject")
    }

    /// `resData.metadata`: page title, description and keywords.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Extraction`] when the section is missing.
    pub fn metadata(&self) -> Result<&Value> {
        self.section("metadata")
    }

    /// `resData.resource`: seasons and upload source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Extraction`] when the section is missing.
    pub fn resource(&self) -> Result<&Value> {
        self.section("resource")
    }

    /// `resData.resource.seasons`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Extraction`] when the section is missing.
    pub fn seasons(&self) -> Result<&Vec<Value>> {
        self.resource()?
            .get("seasons")
            .and_then(Value::as_array)
            .ok_or_else(|| missing("resData.resource.seasons"))
    }

    /// `resData.stars`: cast and crew.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Extraction`] when the section is missing.
    pub fn stars(&self) -> Result<&Vec<Value>> {
        self.section("stars")?
            .as_array()
            .ok_or_else(|| missing("resData.stars"))
    }

    /// `resData.postList.items`: user reviews.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Extraction`] when the section is missing.
    pub fn reviews(&self) -> Result<&Vec<Value>> {
        self.section("postList")?
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| missing("resData.postList.items"))
    }

    /// Page level entries, i.e. everything in `details` except `resData`.
    #[must_use]
    pub fn page_details(&self) -> Map<String, Value> {
        self.details()
            .iter()
            .filter(|(key, _)| key.as_str() != RES_DATA)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Deserializes the details into their typed form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] when the details do not fit the model.
    pub fn into_model(self) -> Result<ItemDetailsModel> {
        Ok(serde_json::from_value(Value::Object(
            self.document.into_details(),
        ))?)
    }
}

fn missing(key: &str) -> Error {
    Error::Extraction(format!("item details have no '{key}' section"))
}

/// Typed item page details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDetailsModel {
    pub res_data: ResData,
    /// Remaining page level entries, kept untyped.
    #[serde(flatten)]
    pub page: Map<String, Value>,
}

/// The `resData` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResData {
    pub subject: SearchResultsItem,
    #[serde(default, deserialize_with = "de::null_default")]
    pub metadata: PageMetadata,
    #[serde(default, deserialize_with = "de::null_default")]
    pub resource: Resource,
    #[serde(default, deserialize_with = "de::null_default")]
    pub stars: Vec<Star>,
    #[serde(default, deserialize_with = "de::null_default")]
    pub post_list: PostList,
    #[serde(default, deserialize_with = "de::null_default")]
    pub referer: String,
    #[serde(default, deserialize_with = "de::null_default")]
    pub url: String,
}

impl ResData {
    /// Season by number.
    #[must_use]
    pub fn season(&self, number: u32) -> Option<&Season> {
        self.resource.seasons.iter().find(|season| season.se == number)
    }
}

/// Page title, description and keywords.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageMetadata {
    #[serde(deserialize_with = "de::null_default")]
    pub title: String,
    #[serde(deserialize_with = "de::null_default")]
    pub description: String,
    #[serde(deserialize_with = "de::null_default")]
    pub keywords: String,
    #[serde(deserialize_with = "de::null_default")]
    pub image: String,
    #[serde(deserialize_with = "de::null_default")]
    pub url: String,
    #[serde(deserialize_with = "de::null_default")]
    pub referer: String,
}

/// Seasons of a series; movies list a single season `0`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Resource {
    #[serde(deserialize_with = "de::null_default")]
    pub seasons: Vec<Season>,
    #[serde(deserialize_with = "de::null_default")]
    pub source: String,
    #[serde(deserialize_with = "de::null_default")]
    pub upload_by: String,
}

/// One season and the resolutions its episodes come in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Season {
    #[serde(deserialize_with = "de::u32_lenient")]
    pub se: u32,
    #[serde(default, deserialize_with = "de::u32_lenient")]
    pub max_ep: u32,
    /// Comma separated episode numbers, when the site lists them.
    #[serde(default, deserialize_with = "de::null_default")]
    pub all_ep: String,
    #[serde(default, deserialize_with = "de::null_default")]
    pub resolutions: Vec<SeasonResolution>,
}

impl Season {
    /// Episode numbers available in this season.
    #[must_use]
    pub fn episodes(&self) -> Vec<u32> {
        let listed: Vec<u32> = self
            .all_ep
            .split(',')
            .filter_map(|ep| ep.trim().parse().ok())
            .collect();
        if listed.is_empty() {
            (1..=self.max_ep).collect()
        } else {
            listed
        }
    }
}

/// Resolution offered for the episodes of a season.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonResolution {
    #[serde(default, deserialize_with = "de::u32_lenient")]
    pub ep_num: u32,
    pub resolution: Resolution,
}

/// Cast or crew member.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Star {
    #[serde(deserialize_with = "de::null_default")]
    pub name: String,
    #[serde(deserialize_with = "de::null_default")]
    pub character: String,
    #[serde(deserialize_with = "de::null_default")]
    pub avatar_url: String,
    #[serde(deserialize_with = "de::null_default")]
    pub detail_path: String,
    #[serde(deserialize_with = "de::null_default")]
    pub staff_id: String,
    #[serde(deserialize_with = "de::null_default")]
    pub staff_type: i64,
}

/// Reviews posted about the item.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PostList {
    #[serde(deserialize_with = "de::null_default")]
    pub items: Vec<Review>,
    pub pager: Option<Pager>,
}

/// A user review.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Review {
    #[serde(deserialize_with = "de::null_default")]
    pub post_id: String,
    #[serde(deserialize_with = "de::null_default")]
    pub title: String,
    #[serde(deserialize_with = "de::null_default")]
    pub content: String,
    #[serde(deserialize_with = "de::null_default")]
    pub created_at: String,
    pub user: Option<ReviewAuthor>,
}

/// Author of a review.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReviewAuthor {
    #[serde(deserialize_with = "de::null_default")]
    pub user_id: String,
    #[serde(deserialize_with = "de::null_default")]
    pub nickname: String,
    #[serde(deserialize_with = "de::null_default")]
    pub avatar: String,
}


#[cfg(test)]
mod tests {
    use super::fixtures::page_html;
    use super::*;
    use crate::models::SubjectType;
    use serde_json::json;

    fn sample_details() -> Value {
        json!({
            "resData": {
                "subject": {
                    "subjectId": "123",
                    "subjectType": 2,
                    "title": "Merlin",
                    "releaseDate": "2008-09-20",
                    "genre": "Drama,Fantasy",
                    "detailPath": "merlin-sMxCiIO6fZ9"
                },
                "metadata": {"title": "Merlin", "description": "A young warlock", "keywords": "merlin"},
                "resource": {
                    "seasons": [
                        {"se": 1, "maxEp": 13, "allEp": "", "resolutions": [{"epNum": 13, "resolution": 720}]},
                        {"se": 2, "maxEp": 3, "allEp": "1,2,3", "resolutions": []}
                    ],
                    "source": "",
                    "uploadBy": ""
                },
                "stars": [{"name": "Colin Morgan", "character": "Merlin", "staffType": 1}],
                "postList": {
                    "items": [{"postId": "p1", "title": "Great", "content": "Loved it", "user": {"nickname": "kim"}}],
                    "pager": {"page": "1", "perPage": 10, "totalCount": 1, "hasMore": false, "nextPage": "2"}
                }
            },
            "utmSource": "",
            "showNotFound": false
        })
    }

    #[test]
    fn sections_are_reachable() {
        let extractor = JsonDetailsExtractor::from_html(&page_html(&sample_details())).unwrap();
        assert_eq!(extractor.subject().unwrap()["title"], "Merlin");
        assert_eq!(extractor.metadata().unwrap()["keywords"], "merlin");
        assert_eq!(extractor.seasons().unwrap().len(), 2);
        assert_eq!(extractor.stars().unwrap()[0]["name"], "Colin Morgan");
        assert_eq!(extractor.reviews().unwrap()[0]["content"], "Loved it");
        let page = extractor.page_details();
        assert!(page.contains_key("utmSource"));
        assert!(!page.contains_key("resData"));
    }

    #[test]
    fn typed_model() {
        let model = JsonDetailsExtractor::from_html(&page_html(&sample_details()))
            .unwrap()
            .into_model()
            .unwrap();
        let data = &model.res_data;
        assert_eq!(data.subject.subject_type, SubjectType::TvSeries);
        assert_eq!(data.season(1).unwrap().episodes().len(), 13);
        assert_eq!(data.season(2).unwrap().episodes(), vec![1, 2, 3]);
        assert_eq!(data.season(1).unwrap().resolutions[0].resolution, Resolution::P720);
        assert_eq!(data.stars[0].character, "Merlin");
        assert_eq!(data.post_list.items[0].user.as_ref().unwrap().nickname, "kim");
        assert_eq!(data.post_list.pager.unwrap().next_page, 2);
        assert_eq!(model.page["showNotFound"], false);
    }

    #[test]
    fn missing_section_names_the_key() {
        let extractor = JsonDetailsExtractor::from_html(&page_html(&json!({"resData": {"metadata": {}}}))).unwrap();
        match extractor.resource() {
            Err(Error::Extraction(message)) => assert!(message.contains("resData.resource")),
            other => panic!("unexpected {other:?}"),
        }
        let extractor = JsonDetailsExtractor::from_html(&page_html(&json!({"other": 1}))).unwrap();
        assert!(matches!(extractor.data(), Err(Error::Extraction(_))));
    }
}
