use serde::{Deserialize, Serialize};

use crate::global::error::ConfigError;

/// Static description of an achievement category, supplied by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryInfo {
    pub key: String,
    pub label: String,
    /// What one unit of progress counts, e.g. "episodes"
    pub unit: String,
    #[serde(default)]
    pub icon: String,
}

impl CategoryInfo {
    pub fn new(
        key: impl Into<String>,
        label: impl Into<String>,
        unit: impl Into<String>,
        icon: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            unit: unit.into(),
            icon: icon.into(),
        }
    }
}

/// Ordered category table. Its order is the order unlock events are
/// emitted across categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTable {
    entries: Vec<CategoryInfo>,
}

impl CategoryTable {
    pub fn new(entries: Vec<CategoryInfo>) -> Result<Self, ConfigError> {
        for (i, info) in entries.iter().enumerate() {
            if info.key.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "achievement category #{} has an empty key",
                    i + 1
                )));
            }
            if entries[..i].iter().any(|other| other.key == info.key) {
                return Err(ConfigError::Invalid(format!(
                    "achievement category '{}' listed more than once",
                    info.key
                )));
            }
        }

        Ok(Self { entries })
    }

    /// Table with just the given keys, label and unit left equal to the key
    pub fn from_keys<I, S>(keys: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = keys
            .into_iter()
            .map(|key| {
                let key = key.into();
                CategoryInfo::new(key.clone(), key.clone(), key, "")
            })
            .collect();
        Self::new(entries)
    }

    pub fn get(&self, key: &str) -> Option<&CategoryInfo> {
        self.entries.iter().find(|info| info.key == key)
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|info| info.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryInfo> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self {
            entries: vec![
                CategoryInfo::new("anime", "Anime", "episodes", "tv"),
                CategoryInfo::new("movies", "Movies", "movies", "film"),
                CategoryInfo::new("tv", "TV Shows", "episodes", "monitor"),
                CategoryInfo::new("manga", "Manga", "chapters", "book-open"),
            ],
        }
    }
}
