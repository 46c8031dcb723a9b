use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

/// Settings for one paginated view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Instance identifier used as the persistence key.
    #[serde(default = "default_id")]
    pub id: String,
    /// Endpoint passed to the transport (e.g., "/api/users").
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Load state on creation and save it on teardown.
    #[serde(default)]
    pub persisted: bool,
    /// Loader flag name for browse fetches.
    #[serde(default = "default_loader")]
    pub loader: String,
    /// Loader flag name for search fetches. Derived from `loader` when unset.
    #[serde(default)]
    pub search_loader: Option<String>,
    /// Query parameter that carries the search term.
    #[serde(default = "default_search_key")]
    pub search_key: String,
    /// Debounce delay for search input in milliseconds (default: 500).
    #[serde(default = "default_search_typing_timeout_ms")]
    pub search_typing_timeout_ms: u64,
    /// Initial page size (default: 10).
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

/// HTTP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Base URL that endpoints are joined onto.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Request timeout in seconds (default: 30).
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u32,
    /// Connection timeout in seconds (default: 5).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u32,
}

/// Where persisted view state is written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_id() -> String {
    "default".to_string()
}

fn default_endpoint() -> String {
    "/".to_string()
}

fn default_loader() -> String {
    "isLoading".to_string()
}

fn default_search_key() -> String {
    "search".to_string()
}

fn default_search_typing_timeout_ms() -> u64 {
    500
}

fn default_per_page() -> u32 {
    10
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_timeout_seconds() -> u32 {
    30
}

fn default_connect_timeout() -> u32 {
    5
}

impl CoordinatorConfig {
    /// The search loader name: explicit, or `search` followed by the browse
    /// loader name with its first letter capitalized ("isLoading" becomes
    /// "searchIsLoading").
    pub fn search_loader_name(&self) -> String {
        if let Some(name) = &self.search_loader {
            return name.clone();
        }
        let mut chars = self.loader.chars();
        match chars.next() {
            Some(first) => format!("search{}{}", first.to_uppercase(), chars.as_str()),
            None => "search".to_string(),
        }
    }
}

impl PersistenceConfig {
    /// Configured directory, or `paginationable/state` under the platform
    /// data directory.
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("paginationable")
                .join("state")
        })
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            id: default_id(),
            endpoint: default_endpoint(),
            persisted: false,
            loader: default_loader(),
            search_loader: None,
            search_key: default_search_key(),
            search_typing_timeout_ms: default_search_typing_timeout_ms(),
            per_page: default_per_page(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout_seconds(),
            connect_timeout_seconds: default_connect_timeout(),
        }
    }
}
