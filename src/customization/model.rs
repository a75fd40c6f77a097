use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::global::error::{ApiError, ParseEnumError};

// ========================================================================
// Identifiers
// ========================================================================

/// Opaque media identifier.
///
/// The backend sends catalog ids either as strings or as numbers; both are
/// normalised to the string form used as map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MediaId(String);

impl MediaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MediaId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MediaId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for MediaId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for MediaId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Unsigned(u64),
            Signed(i64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => MediaId(s),
            RawId::Unsigned(n) => MediaId(n.to_string()),
            RawId::Signed(n) => MediaId(n.to_string()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
    Anime,
    Manga,
}

impl MediaType {
    pub const ALL: &'static [&'static str] = &["movie", "tv", "anime", "manga"];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
            MediaType::Anime => "anime",
            MediaType::Manga => "manga",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "movie" | "movies" => Ok(MediaType::Movie),
            "tv" | "series" => Ok(MediaType::Tv),
            "anime" => Ok(MediaType::Anime),
            "manga" => Ok(MediaType::Manga),
            _ => Err(ParseEnumError {
                enum_name: "MediaType",
                value: s.to_string(),
                expected: Self::ALL,
            }),
        }
    }
}

// ========================================================================
// Customization entries
// ========================================================================

/// Absolute http(s) URL or a server-relative upload path
static IMAGE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://[^\s/$.?#][^\s]*|/[^\s]+)$").expect("image reference pattern is valid")
});

/// Artwork overrides for one media item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomizationEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_poster: Option<String>,
}

impl CustomizationEntry {
    pub fn new(custom_background: Option<String>, custom_poster: Option<String>) -> Self {
        Self {
            custom_background,
            custom_poster,
        }
    }

    pub fn with_background(mut self, url: impl Into<String>) -> Self {
        self.custom_background = Some(url.into());
        self
    }

    pub fn with_poster(mut self, url: impl Into<String>) -> Self {
        self.custom_poster = Some(url.into());
        self
    }

    /// An entry without overrides renders exactly like no entry at all
    pub fn is_empty(&self) -> bool {
        self.background().is_none() && self.poster().is_none()
    }

    pub fn background(&self) -> Option<&str> {
        self.custom_background.as_deref().filter(|s| !s.is_empty())
    }

    pub fn poster(&self) -> Option<&str> {
        self.custom_poster.as_deref().filter(|s| !s.is_empty())
    }

    /// Reject references the backend would refuse anyway
    pub fn validate(&self) -> Result<(), ApiError> {
        for (field, value) in [("customBackground", self.background()), ("customPoster", self.poster())] {
            if let Some(reference) = value {
                if !IMAGE_REFERENCE.is_match(reference) {
                    return Err(ApiError::Validation(format!(
                        "{} is not a valid image reference: '{}'",
                        field, reference
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Body of `PUT /customization/{mediaId}`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveCustomizationRequest<'a> {
    #[serde(rename = "type")]
    pub media_type: MediaType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_background: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_poster: Option<&'a str>,
}

impl<'a> SaveCustomizationRequest<'a> {
    pub fn new(media_type: MediaType, entry: &'a CustomizationEntry) -> Self {
        Self {
            media_type,
            custom_background: entry.background(),
            custom_poster: entry.poster(),
        }
    }
}

/// Artwork actually displayed for a media item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artwork {
    pub background: Option<String>,
    pub poster: Option<String>,
    pub background_overridden: bool,
    pub poster_overridden: bool,
}

impl Artwork {
    /// Pick each override when present, otherwise the catalog default
    pub fn resolve(
        entry: Option<&CustomizationEntry>,
        default_background: Option<&str>,
        default_poster: Option<&str>,
    ) -> Self {
        let background = entry.and_then(CustomizationEntry::background);
        let poster = entry.and_then(CustomizationEntry::poster);

        Self {
            background_overridden: background.is_some(),
            poster_overridden: poster.is_some(),
            background: background.or(default_background).map(str::to_string),
            poster: poster.or(default_poster).map(str::to_string),
        }
    }
}
