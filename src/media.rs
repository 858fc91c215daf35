//! Downloadable and streamable file metadata, and the queries used to pick a
//! media variant or caption track out of it.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::de;

/// Vertical resolution of a media variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Resolution {
    P360,
    P480,
    P720,
    P1080,
}

impl Resolution {
    /// All resolutions, lowest first.
    pub const ALL: [Self; 4] = [Self::P360, Self::P480, Self::P720, Self::P1080];

    /// Height in pixels.
    #[must_use]
    pub const fn height(self) -> u32 {
        match self {
            Self::P360 => 360,
            Self::P480 => 480,
            Self::P720 => 720,
            Self::P1080 => 1080,
        }
    }
}

impl TryFrom<u32> for Resolution {
    type Error = String;

    fn try_from(height: u32) -> std::result::Result<Self, Self::Error> {
        match height {
            360 => Ok(Self::P360),
            480 => Ok(Self::P480),
            720 => Ok(Self::P720),
            1080 => Ok(Self::P1080),
            other => Err(format!("unsupported resolution {other}")),
        }
    }
}

impl From<Resolution> for u32 {
    fn from(value: Resolution) -> Self {
        value.height()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}P", self.height())
    }
}

/// A downloadable media variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFile {
    pub id: String,
    pub url: String,
    pub resolution: Resolution,
    #[serde(deserialize_with = "de::u64_lenient")]
    pub size: u64,
}

/// A downloadable caption (subtitle) track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionFile {
    pub id: String,
    /// Short language code, e.g. `en`.
    #[serde(rename = "lan")]
    pub language_code: String,
    /// Full language name, e.g. `English`.
    #[serde(rename = "lanName")]
    pub language_name: String,
    pub url: String,
    #[serde(default, deserialize_with = "de::u64_lenient")]
    pub size: u64,
    /// Display offset in milliseconds.
    #[serde(rename = "delay", default, deserialize_with = "de::u64_lenient")]
    pub delay_ms: u64,
}

/// Media and caption files offered for one movie or episode.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DownloadableFilesMetadata {
    pub downloads: Vec<MediaFile>,
    pub captions: Vec<CaptionFile>,
    pub limited: bool,
    pub limited_code: String,
    pub has_resource: bool,
}

/// Orders variants by resolution, then size. Equal variants compare equal so
/// that `max_by`/`min_by` callers can decide which occurrence wins.
fn compare_variants(a: &MediaFile, b: &MediaFile) -> Ordering {
    a.resolution
        .cmp(&b.resolution)
        .then_with(|| a.size.cmp(&b.size))
}

impl DownloadableFilesMetadata {
    /// Highest resolution variant; ties go to the larger file, then to the
    /// first one listed.
    #[must_use]
    pub fn best_media_file(&self) -> Option<&MediaFile> {
        // `max_by` keeps the last of equal elements, so walk backwards.
        self.downloads.iter().rev().max_by(|a, b| compare_variants(a, b))
    }

    /// Lowest resolution variant; ties go to the larger file, then to the
    /// first one listed.
    #[must_use]
    pub fn worst_media_file(&self) -> Option<&MediaFile> {
        self.downloads.iter().min_by(|a, b| {
            a.resolution
                .cmp(&b.resolution)
                .then_with(|| b.size.cmp(&a.size))
        })
    }

    /// Variant with exactly the given resolution (the largest one if several).
    #[must_use]
    pub fn media_file_by_resolution(&self, resolution: Resolution) -> Option<&MediaFile> {
        self.downloads
            .iter()
            .rev()
            .filter(|file| file.resolution == resolution)
            .max_by_key(|file| file.size)
    }

    /// Variants ordered from best to worst.
    #[must_use]
    pub fn sorted_media_files(&self) -> Vec<&MediaFile> {
        let mut files: Vec<_> = self.downloads.iter().collect();
        // Stable sort keeps listing order among equal variants.
        files.sort_by(|a, b| compare_variants(b, a));
        files
    }

    /// Caption track whose language code or name equals `language`,
    /// ignoring case.
    #[must_use]
    pub fn caption_by_language(&self, language: &str) -> Option<&CaptionFile> {
        self.captions.iter().find(|caption| {
            caption.language_code.eq_ignore_ascii_case(language)
                || caption.language_name.eq_ignore_ascii_case(language)
        })
    }

    /// The English caption track, if any.
    #[must_use]
    pub fn english_caption(&self) -> Option<&CaptionFile> {
        self.caption_by_language("English")
    }

    /// Caption tracks keyed by full language name.
    #[must_use]
    pub fn language_caption_map(&self) -> BTreeMap<&str, &CaptionFile> {
        self.captions
            .iter()
            .map(|caption| (caption.language_name.as_str(), caption))
            .collect()
    }

    /// Caption tracks keyed by short language code.
    #[must_use]
    pub fn language_short_caption_map(&self) -> BTreeMap<&str, &CaptionFile> {
        self.captions
            .iter()
            .map(|caption| (caption.language_code.as_str(), caption))
            .collect()
    }

    /// Caption track for `language`, escalating a miss into an error listing
    /// every available language name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CaptionNotFound`] when no track matches.
    pub fn caption_or_error(&self, language: &str) -> Result<&CaptionFile> {
        self.caption_by_language(language).ok_or_else(|| {
            Error::CaptionNotFound {
                language: language.to_string(),
                available: self
                    .language_caption_map()
                    .into_keys()
                    .map(String::from)
                    .collect(),
            }
        })
    }
}

/// A streamable media variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamFile {
    pub id: String,
    #[serde(default)]
    pub format: String,
    pub url: String,
    #[serde(default)]
    pub resolutions: String,
    #[serde(default, deserialize_with = "de::u64_lenient")]
    pub size: u64,
    #[serde(default, deserialize_with = "de::u64_lenient")]
    pub duration: u64,
    #[serde(default)]
    pub codec_name: String,
}

/// Streamable files offered for one movie or episode.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamFilesMetadata {
    pub streams: Vec<StreamFile>,
    pub free_num: u32,
    pub limited: bool,
    pub limited_code: String,
    pub has_resource: bool,
}

impl StreamFilesMetadata {
    /// First listed stream, which the site plays by default.
    #[must_use]
    pub fn default_stream(&self) -> Option<&StreamFile> {
        self.streams.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn media(id: &str, resolution: Resolution, size: u64) -> MediaFile {
        MediaFile {
            id: id.into(),
            url: format!("https://cdn.example/{id}.mp4"),
            resolution,
            size,
        }
    }

    fn caption(code: &str, name: &str) -> CaptionFile {
        CaptionFile {
            id: code.into(),
            language_code: code.into(),
            language_name: name.into(),
            url: format!("https://cdn.example/{code}.srt"),
            size: 100,
            delay_ms: 0,
        }
    }

    fn metadata(downloads: Vec<MediaFile>, captions: Vec<CaptionFile>) -> DownloadableFilesMetadata {
        DownloadableFilesMetadata {
            has_resource: !downloads.is_empty(),
            downloads,
            captions,
            ..Default::default()
        }
    }

    #[test]
    fn best_and_worst_by_resolution() {
        let meta = metadata(
            vec![
                media("b", Resolution::P480, 40),
                media("d", Resolution::P1080, 90),
                media("a", Resolution::P360, 30),
                media("c", Resolution::P720, 70),
            ],
            vec![],
        );
        assert_eq!(meta.best_media_file().unwrap().resolution, Resolution::P1080);
        assert_eq!(meta.worst_media_file().unwrap().resolution, Resolution::P360);
    }

    #[test]
    fn best_breaks_ties_by_size() {
        let meta = metadata(
            vec![media("small", Resolution::P1080, 100), media("big", Resolution::P1080, 200)],
            vec![],
        );
        assert_eq!(meta.best_media_file().unwrap().size, 200);
    }

    #[test]
    fn full_ties_keep_first_seen() {
        let meta = metadata(
            vec![
                media("first", Resolution::P720, 100),
                media("second", Resolution::P720, 100),
            ],
            vec![],
        );
        assert_eq!(meta.best_media_file().unwrap().id, "first");
        assert_eq!(meta.worst_media_file().unwrap().id, "first");
        assert_eq!(meta.sorted_media_files()[0].id, "first");
    }

    #[test]
    fn no_downloads_no_selection() {
        let meta = metadata(vec![], vec![]);
        assert!(meta.best_media_file().is_none());
        assert!(meta.worst_media_file().is_none());
    }

    #[test]
    fn caption_lookup_by_code_or_name() {
        let meta = metadata(vec![], vec![caption("en", "English"), caption("fr", "Français")]);
        assert_eq!(meta.caption_by_language("en").unwrap().language_name, "English");
        assert_eq!(meta.caption_by_language("English").unwrap().language_code, "en");
        assert_eq!(meta.caption_by_language("ENGLISH").unwrap().language_code, "en");
        assert!(meta.caption_by_language("de").is_none());
    }

    #[test]
    fn caption_miss_lists_every_language_name() {
        let meta = metadata(vec![], vec![caption("en", "English"), caption("fr", "French")]);
        match meta.caption_or_error("German") {
            Err(Error::CaptionNotFound { available, .. }) => {
                assert_eq!(available, vec!["English", "French"]);
            }
            other => panic!("unexpected {other:?}"),
        }
        match meta.caption_or_error("de") {
            Err(Error::CaptionNotFound { available, .. }) => {
                assert_eq!(available, vec!["English", "French"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn caption_maps_are_keyed_by_name_and_code() {
        let meta = metadata(vec![], vec![caption("fr", "French"), caption("en", "English")]);
        let names: Vec<_> = meta.language_caption_map().into_keys().collect();
        let codes: Vec<_> = meta.language_short_caption_map().into_keys().collect();
        assert_eq!(names, vec!["English", "French"]);
        assert_eq!(codes, vec!["en", "fr"]);
        assert_eq!(meta.english_caption().unwrap().language_code, "en");
    }

    #[test]
    fn metadata_from_wire() {
        let meta: DownloadableFilesMetadata = serde_json::from_value(json!({
            "downloads": [
                {"id": "1", "url": "https://cdn.example/1.mp4", "resolution": 720, "size": "52428800"}
            ],
            "captions": [
                {"id": "9", "lan": "en", "lanName": "English", "url": "https://cdn.example/en.srt", "size": "2048", "delay": 0}
            ],
            "limited": false,
            "limitedCode": "",
            "hasResource": true
        }))
        .unwrap();
        assert_eq!(meta.downloads[0].size, 52_428_800);
        assert_eq!(meta.downloads[0].resolution, Resolution::P720);
        assert_eq!(meta.captions[0].size, 2048);
        assert!(meta.has_resource);
    }

    #[test]
    fn unknown_resolution_is_rejected() {
        let parsed: std::result::Result<MediaFile, _> = serde_json::from_value(json!({
            "id": "1", "url": "u", "resolution": 144, "size": 1
        }));
        assert!(parsed.is_err());
    }
}
