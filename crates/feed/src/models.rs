// ABOUTME: Output models of the Torznab decoder.
// ABOUTME: NormalizedItem is one feed <item>; AttributeMap is its case-insensitive attribute passthrough.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Name/value attribute pairs keyed case-insensitively.
/// The first value seen for a name is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeMap(BTreeMap<String, String>);

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a pair unless the name is already present. Returns true if inserted.
    pub fn insert(&mut self, name: &str, value: &str) -> bool {
        let key = name.trim().to_ascii_lowercase();
        if key.is_empty() || self.0.contains_key(&key) {
            return false;
        }
        self.0.insert(key, value.trim().to_string());
        true
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// First present value among several names.
    pub fn get_any(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|name| self.get(name))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A single release decoded from one feed `<item>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedItem {
    /// Never empty.
    pub guid: String,
    pub title: String,
    pub link: Option<String>,
    /// Enclosure URL when present, otherwise `link`.
    pub download_url: Option<String>,
    pub published_at_unix: Option<i64>,
    pub size_bytes: Option<u64>,
    pub seeders: Option<u32>,
    pub leechers: Option<u32>,
    pub grabs: Option<u32>,
    pub info_hash: Option<String>,
    /// Raw ids in first-seen order, without duplicates.
    pub category_ids: Vec<i64>,
    pub primary_standard_category_id: Option<i64>,
    pub primary_specific_category_id: Option<i64>,
    /// Display category: specific, then standard, then the first raw id.
    pub category_id: Option<i64>,
    pub attributes: AttributeMap,
}
