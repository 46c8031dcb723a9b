//! Page-keyed snapshot storage.
//!
//! Entries are never evicted. A provider that visits many distinct
//! `(page, per_page)` combinations grows its cache without bound.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ProviderSnapshot;

/// Cache key for one page at one page size.
///
/// Renders as `"{page}-{per_page}"`, which is also its serialized form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PageKey {
    pub page: u32,
    pub per_page: u32,
}

impl PageKey {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self { page, per_page }
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.page, self.per_page)
    }
}

#[derive(Debug, Error)]
#[error("Invalid page key '{0}', expected '<page>-<per_page>'")]
pub struct PageKeyParseError(String);

impl FromStr for PageKey {
    type Err = PageKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (page, per_page) = s
            .split_once('-')
            .ok_or_else(|| PageKeyParseError(s.to_string()))?;
        let page = page.parse().map_err(|_| PageKeyParseError(s.to_string()))?;
        let per_page = per_page
            .parse()
            .map_err(|_| PageKeyParseError(s.to_string()))?;
        Ok(Self { page, per_page })
    }
}

impl From<PageKey> for String {
    fn from(key: PageKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for PageKey {
    type Error = PageKeyParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Fetched pages of one provider, keyed by [`PageKey`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageCache<T> {
    entries: HashMap<PageKey, ProviderSnapshot<T>>,
}

impl<T> Default for PageCache<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T> PageCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the page at `(page, per_page)` has been fetched before.
    pub fn has(&self, page: u32, per_page: u32) -> bool {
        self.entries.contains_key(&PageKey::new(page, per_page))
    }

    pub fn get(&self, page: u32, per_page: u32) -> Option<&ProviderSnapshot<T>> {
        self.entries.get(&PageKey::new(page, per_page))
    }

    /// Store a snapshot under its own page and page size, replacing any
    /// previous entry for that key.
    pub fn put(&mut self, snapshot: ProviderSnapshot<T>) {
        self.entries.insert(snapshot.key(), snapshot);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached keys in ascending `(page, per_page)` order.
    pub fn keys(&self) -> Vec<PageKey> {
        let mut keys: Vec<PageKey> = self.entries.keys().copied().collect();
        keys.sort();
        keys
    }
}
