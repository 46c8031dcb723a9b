//! Paginated view state.
//!
//! A [`Provider`] is one view over paginated data: the current page, the page
//! size, the total item count, the items of the current page and a cache of
//! every page fetched so far.

mod cache;

pub use cache::{PageCache, PageKey, PageKeyParseError};

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PER_PAGE: u32 = 10;

/// One mapped page, as returned by a response mapper and stored in a
/// [`PageCache`].
///
/// Deserializes from the common response shapes: `page`, `currentPage` or
/// `current_page` for the page number and `per_page` or `perPage` for the page
/// size. Page numbers may arrive as numeric strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSnapshot<T> {
    #[serde(
        alias = "currentPage",
        alias = "current_page",
        deserialize_with = "lenient_u32"
    )]
    pub page: u32,
    #[serde(alias = "perPage", deserialize_with = "lenient_u32")]
    pub per_page: u32,
    #[serde(default)]
    pub total: u64,
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

impl<T> ProviderSnapshot<T> {
    pub fn key(&self) -> PageKey {
        PageKey::new(self.page, self.per_page)
    }
}

/// Caller-supplied starting values; absent or zero fields take the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialProvider<T> {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub total: Option<u64>,
    pub data: Option<Vec<T>>,
}

impl<T> Default for PartialProvider<T> {
    fn default() -> Self {
        Self {
            page: None,
            per_page: None,
            total: None,
            data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider<T> {
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub data: Vec<T>,
    /// Set once a fetched page has been merged in.
    #[serde(default)]
    pub loaded: bool,
    #[serde(default = "PageCache::new")]
    pub cache: PageCache<T>,
}

impl<T> Default for Provider<T> {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            per_page: DEFAULT_PER_PAGE,
            total: 0,
            data: Vec::new(),
            loaded: false,
            cache: PageCache::default(),
        }
    }
}

impl<T> Provider<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_partial(partial: PartialProvider<T>) -> Self {
        Self {
            page: partial.page.filter(|p| *p > 0).unwrap_or(DEFAULT_PAGE),
            per_page: partial
                .per_page
                .filter(|p| *p > 0)
                .unwrap_or(DEFAULT_PER_PAGE),
            total: partial.total.unwrap_or(0),
            data: partial.data.unwrap_or_default(),
            loaded: false,
            cache: PageCache::default(),
        }
    }

    pub fn key(&self) -> PageKey {
        PageKey::new(self.page, self.per_page)
    }

    pub fn total_pages(&self) -> u64 {
        if self.per_page == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.per_page))
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.page) < self.total_pages()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }
}

impl<T: Clone> Provider<T> {
    /// Move to `(page, per_page)`. If that page is cached, `data` and `total`
    /// are taken from the cached snapshot; otherwise `data` is emptied until
    /// the page is fetched.
    pub fn goto(&mut self, page: u32, per_page: u32) {
        self.page = page;
        self.per_page = per_page;
        match self.cache.get(page, per_page) {
            Some(cached) => {
                self.total = cached.total;
                self.data = cached.data.clone();
            }
            None => self.data.clear(),
        }
    }

    /// Replace the current page with a fetched snapshot. The cache is left
    /// alone.
    pub fn merge(&mut self, snapshot: ProviderSnapshot<T>) {
        self.page = snapshot.page;
        self.per_page = snapshot.per_page;
        self.total = snapshot.total;
        self.data = snapshot.data;
    }

    /// Merge a snapshot and record it in the cache.
    pub fn merge_cached(&mut self, snapshot: ProviderSnapshot<T>) {
        self.cache.put(snapshot.clone());
        self.merge(snapshot);
        self.loaded = true;
    }

    pub fn snapshot(&self) -> ProviderSnapshot<T> {
        ProviderSnapshot {
            page: self.page,
            per_page: self.per_page,
            total: self.total,
            data: self.data.clone(),
        }
    }

    /// A copy of this provider with `data` cut down to at most `per_page`
    /// items.
    pub fn truncated(&self) -> Self {
        let mut copy = self.clone();
        copy.data.truncate(self.per_page as usize);
        copy
    }
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u32),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("expected a page number, got '{}'", s))),
    }
}
