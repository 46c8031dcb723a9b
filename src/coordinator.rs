//! Paginated-fetch orchestration.
//!
//! [`PaginationCoordinator`] owns a browse provider and a search provider. The
//! mode is derived from the search term at the moment an action runs: an
//! empty term means browse, anything else means search.
//!
//! - Browse page changes are served from the browse provider's page cache
//!   when possible, otherwise fetched through the browse loader's gate.
//! - Search fetches always go to the transport through the search loader's
//!   gate and never touch the browse cache.
//! - Search input is debounced; clearing the term rebuilds the search
//!   provider from the browse provider locally.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;

use crate::config::{ConfigError, CoordinatorConfig};
use crate::debounce::SearchDebouncer;
use crate::gate::{GateOutcome, PendingGate};
use crate::params::QueryParams;
use crate::provider::{
    PageKey, PartialProvider, Provider, ProviderSnapshot, DEFAULT_PAGE, DEFAULT_PER_PAGE,
};
use crate::store::{PersistedState, StateStore, StoreError};
use crate::transport::{Transport, TransportError};

/// Maps a raw response body to a page snapshot.
pub type MapResponse<T> =
    Arc<dyn Fn(&Value) -> Result<ProviderSnapshot<T>, serde_json::Error> + Send + Sync>;

/// Rewrites request parameters before dispatch.
pub type ParamsHook = Arc<dyn Fn(QueryParams) -> QueryParams + Send + Sync>;

/// Mapper that deserializes the response body straight into a
/// [`ProviderSnapshot`].
pub fn json_mapper<T: DeserializeOwned>() -> MapResponse<T> {
    Arc::new(|response: &Value| ProviderSnapshot::<T>::deserialize(response))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Browse,
    Search,
}

impl Mode {
    pub fn from_term(term: &str) -> Self {
        if term.is_empty() {
            Mode::Browse
        } else {
            Mode::Search
        }
    }
}

/// Caller overrides for one fetch. A zero `page` or `per_page` counts as
/// not set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchRequest {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub extra: QueryParams,
}

impl FetchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = Some(per_page);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key, value);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Served from the browse page cache without a request.
    Cached { key: PageKey },
    /// A request completed and its response was merged.
    Fetched { response: Value },
    /// Absorbed by a request already in flight for the same loader.
    Coalesced,
    /// The coordinator was torn down while the request was in flight; the
    /// response was dropped.
    Discarded,
    /// The search term was cleared and the search provider was rebuilt from
    /// the browse provider.
    Local,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to map response: {source}")]
    Mapping {
        #[source]
        source: serde_json::Error,
        response: Value,
    },
}

impl FetchError {
    /// The raw response that accompanied the error, if any.
    pub fn response(&self) -> Option<&Value> {
        match self {
            FetchError::Transport(err) => err.response(),
            FetchError::Mapping { response, .. } => Some(response),
        }
    }
}

struct ViewState<T> {
    browse: Provider<T>,
    search: Provider<T>,
    /// Bumped by teardown so responses to earlier requests are not merged
    /// into the reset state.
    epoch: u64,
}

struct Inner<T> {
    config: CoordinatorConfig,
    instance_id: String,
    transport: Arc<dyn Transport>,
    map_response: MapResponse<T>,
    before_fetch: ParamsHook,
    before_search: ParamsHook,
    store: Option<Arc<dyn StateStore<T>>>,
    initial: PersistedState<T>,
    state: Mutex<ViewState<T>>,
    debouncer: SearchDebouncer,
    browse_gate: PendingGate<QueryParams>,
    search_gate: PendingGate<QueryParams>,
}

/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct PaginationCoordinator<T> {
    inner: Arc<Inner<T>>,
}

pub struct CoordinatorBuilder<T> {
    config: CoordinatorConfig,
    transport: Arc<dyn Transport>,
    map_response: Option<MapResponse<T>>,
    before_fetch: Option<ParamsHook>,
    before_search: Option<ParamsHook>,
    initial_provider: PartialProvider<T>,
    initial_search_provider: PartialProvider<T>,
    initial_search_term: String,
    store: Option<Arc<dyn StateStore<T>>>,
    instance_id: Option<String>,
}

impl<T> CoordinatorBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn map_response<F>(mut self, map: F) -> Self
    where
        F: Fn(&Value) -> Result<ProviderSnapshot<T>, serde_json::Error> + Send + Sync + 'static,
    {
        self.map_response = Some(Arc::new(map));
        self
    }

    pub fn before_fetch<F>(mut self, hook: F) -> Self
    where
        F: Fn(QueryParams) -> QueryParams + Send + Sync + 'static,
    {
        self.before_fetch = Some(Arc::new(hook));
        self
    }

    pub fn before_search<F>(mut self, hook: F) -> Self
    where
        F: Fn(QueryParams) -> QueryParams + Send + Sync + 'static,
    {
        self.before_search = Some(Arc::new(hook));
        self
    }

    pub fn initial_provider(mut self, partial: PartialProvider<T>) -> Self {
        self.initial_provider = partial;
        self
    }

    pub fn initial_search_provider(mut self, partial: PartialProvider<T>) -> Self {
        self.initial_search_provider = partial;
        self
    }

    pub fn initial_search_term(mut self, term: impl Into<String>) -> Self {
        self.initial_search_term = term.into();
        self
    }

    pub fn store(mut self, store: Arc<dyn StateStore<T>>) -> Self {
        self.store = Some(store);
        self
    }

    /// Persistence key. Defaults to the configured `id`.
    pub fn instance_id(mut self, id: impl Into<String>) -> Self {
        self.instance_id = Some(id.into());
        self
    }

    /// Validate the configuration and build the coordinator.
    ///
    /// When persistence is enabled the store is read here, once. A failed
    /// read is logged and the coordinator starts from its initial state.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` for an invalid configuration, a
    /// missing response mapper, or persistence enabled without a store.
    pub fn build(self) -> Result<PaginationCoordinator<T>, ConfigError> {
        self.config.validate()?;

        let map_response = self.map_response.ok_or_else(|| ConfigError::ValidationError {
            message: "A response mapper is required".to_string(),
        })?;

        if self.config.persisted && self.store.is_none() {
            return Err(ConfigError::ValidationError {
                message: "Persistence is enabled but no state store was provided".to_string(),
            });
        }

        let instance_id = self.instance_id.unwrap_or_else(|| self.config.id.clone());
        let initial = PersistedState {
            browse: provider_from(self.initial_provider, self.config.per_page),
            search: provider_from(self.initial_search_provider, self.config.per_page),
            search_term: self.initial_search_term,
        };

        let mut resumed = initial.clone();
        if self.config.persisted {
            if let Some(store) = &self.store {
                match store.load(&instance_id) {
                    Ok(Some(state)) => {
                        tracing::info!(id = %instance_id, "Resumed persisted state");
                        resumed = state;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(id = %instance_id, error = %e, "Failed to load persisted state");
                    }
                }
            }
        }

        let debouncer = SearchDebouncer::new(
            Duration::from_millis(self.config.search_typing_timeout_ms),
            resumed.search_term,
        );
        let browse_gate = PendingGate::new(self.config.loader.clone());
        let search_gate = PendingGate::new(self.config.search_loader_name());

        let identity: ParamsHook = Arc::new(|params: QueryParams| params);
        let inner = Inner {
            instance_id,
            transport: self.transport,
            map_response,
            before_fetch: self.before_fetch.unwrap_or_else(|| identity.clone()),
            before_search: self.before_search.unwrap_or(identity),
            store: self.store,
            initial,
            state: Mutex::new(ViewState {
                browse: resumed.browse,
                search: resumed.search,
                epoch: 0,
            }),
            debouncer,
            browse_gate,
            search_gate,
            config: self.config,
        };

        Ok(PaginationCoordinator {
            inner: Arc::new(inner),
        })
    }
}

impl<T> CoordinatorBuilder<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Use [`json_mapper`] as the response mapper.
    pub fn with_json_mapper(mut self) -> Self {
        self.map_response = Some(json_mapper());
        self
    }
}

fn provider_from<T>(mut partial: PartialProvider<T>, per_page: u32) -> Provider<T> {
    if partial.per_page.is_none() {
        partial.per_page = Some(per_page);
    }
    Provider::from_partial(partial)
}

impl<T> PaginationCoordinator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn builder(config: CoordinatorConfig, transport: Arc<dyn Transport>) -> CoordinatorBuilder<T> {
        CoordinatorBuilder {
            config,
            transport,
            map_response: None,
            before_fetch: None,
            before_search: None,
            initial_provider: PartialProvider::default(),
            initial_search_provider: PartialProvider::default(),
            initial_search_term: String::new(),
            store: None,
            instance_id: None,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    pub fn instance_id(&self) -> &str {
        &self.inner.instance_id
    }

    pub fn mode(&self) -> Mode {
        Mode::from_term(&self.inner.debouncer.term())
    }

    /// The provider for the current mode.
    pub fn provider(&self) -> Provider<T> {
        let state = self.inner.state.lock();
        match self.mode() {
            Mode::Browse => state.browse.clone(),
            Mode::Search => state.search.clone(),
        }
    }

    pub fn browse_provider(&self) -> Provider<T> {
        self.inner.state.lock().browse.clone()
    }

    pub fn search_provider(&self) -> Provider<T> {
        self.inner.state.lock().search.clone()
    }

    /// Merge a snapshot into the current mode's provider and its cache.
    pub fn set_provider(&self, snapshot: ProviderSnapshot<T>) {
        let mode = self.mode();
        let mut state = self.inner.state.lock();
        let provider = match mode {
            Mode::Browse => &mut state.browse,
            Mode::Search => &mut state.search,
        };
        provider.cache.put(snapshot.clone());
        provider.merge(snapshot);
    }

    pub fn search_term(&self) -> String {
        self.inner.debouncer.term()
    }

    /// Change the search term. The mode switches right away; the fetch (or
    /// the local rebuild when the term is empty) runs once the input has
    /// been quiet for the configured delay.
    ///
    /// Must be called from within a tokio runtime.
    pub fn set_search_term(&self, term: impl Into<String>) {
        let weak: Weak<Inner<T>> = Arc::downgrade(&self.inner);
        self.inner.debouncer.on_term_change(term, move |term| async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let coordinator = PaginationCoordinator { inner };
            if let Err(e) = coordinator.settle_search(&term).await {
                tracing::warn!(term = %term, error = %e, "Debounced search failed");
            }
        });
    }

    /// Change the search term and act on it immediately, skipping the
    /// debounce delay.
    pub async fn commit_search_term(&self, term: impl Into<String>) -> Result<FetchOutcome, FetchError> {
        let term = term.into();
        self.inner.debouncer.set_term_now(term.clone());
        self.settle_search(&term).await
    }

    pub fn is_search_pending(&self) -> bool {
        self.inner.debouncer.is_pending()
    }

    async fn settle_search(&self, term: &str) -> Result<FetchOutcome, FetchError> {
        if !term.is_empty() {
            return self.fetch(FetchRequest::new().page(1)).await;
        }

        let mut state = self.inner.state.lock();
        state.search = state.browse.truncated();
        tracing::debug!(per_page = state.search.per_page, "Search cleared, rebuilt from browse data");
        Ok(FetchOutcome::Local)
    }

    /// Fetch a page for the current mode.
    ///
    /// In browse mode a cached `(page, per_page)` is served instantly. Every
    /// other request goes through the mode's loader gate, so concurrent calls
    /// coalesce into at most one follow-up request carrying the latest
    /// parameters.
    ///
    /// # Errors
    /// Transport and mapping failures are returned as `FetchError` and leave
    /// both providers untouched.
    pub async fn fetch(&self, mut request: FetchRequest) -> Result<FetchOutcome, FetchError> {
        request.page = request.page.filter(|page| *page > 0);
        request.per_page = request.per_page.filter(|per_page| *per_page > 0);

        let term = self.inner.debouncer.term();
        let mode = Mode::from_term(&term);

        if mode == Mode::Browse {
            let mut state = self.inner.state.lock();
            let page = request.page.unwrap_or(state.browse.page);
            let per_page = request.per_page.unwrap_or(state.browse.per_page);
            if state.browse.cache.has(page, per_page) {
                state.browse.goto(page, per_page);
                tracing::debug!(page, per_page, "Served page from cache");
                return Ok(FetchOutcome::Cached {
                    key: PageKey::new(page, per_page),
                });
            }
        }

        let params = self.build_params(mode, &term, request);
        let outcome = self
            .loader(mode)
            .run(params, move |params| self.execute(mode, params))
            .await;

        match outcome {
            GateOutcome::Completed(result) => result,
            GateOutcome::Queued | GateOutcome::Duplicate => Ok(FetchOutcome::Coalesced),
        }
    }

    fn build_params(&self, mode: Mode, term: &str, request: FetchRequest) -> QueryParams {
        let (page, per_page) = {
            let state = self.inner.state.lock();
            match mode {
                Mode::Browse => (state.browse.page, state.browse.per_page),
                Mode::Search => (1, state.search.per_page),
            }
        };

        let mut params = QueryParams::new()
            .with(self.inner.config.search_key.clone(), term)
            .with("per_page", per_page)
            .with("page", page);
        params.extend(request.extra);
        if let Some(page) = request.page {
            params.insert("page", page);
        }
        if let Some(per_page) = request.per_page {
            params.insert("per_page", per_page);
        }

        let hook = match mode {
            Mode::Browse => &self.inner.before_fetch,
            Mode::Search => &self.inner.before_search,
        };
        hook(params).omit_empties()
    }

    async fn execute(&self, mode: Mode, params: QueryParams) -> Result<FetchOutcome, FetchError> {
        let epoch = self.inner.state.lock().epoch;
        let endpoint = &self.inner.config.endpoint;
        let response = match self.inner.transport.perform_request(endpoint, &params).await {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(
                    endpoint = %endpoint,
                    params = %params,
                    error = %error,
                    "Fetch failed"
                );
                return Err(FetchError::Transport(error));
            }
        };

        let mut snapshot = match (self.inner.map_response)(&response) {
            Ok(snapshot) => snapshot,
            Err(source) => {
                tracing::warn!(
                    endpoint = %endpoint,
                    params = %params,
                    error = %source,
                    "Response did not map to a page"
                );
                return Err(FetchError::Mapping { source, response });
            }
        };

        if snapshot.page == 0 {
            snapshot.page = DEFAULT_PAGE;
        }
        if snapshot.per_page == 0 {
            snapshot.per_page = DEFAULT_PER_PAGE;
        }

        let key = snapshot.key();
        {
            let mut state = self.inner.state.lock();
            if state.epoch != epoch {
                tracing::debug!(endpoint = %endpoint, key = %key, "Dropping response that outlived teardown");
                return Ok(FetchOutcome::Discarded);
            }
            match mode {
                Mode::Search => {
                    // Keep browse on the same page so leaving search lands
                    // somewhere sensible. The browse cache is not written.
                    let per_page = state.browse.per_page;
                    state.browse.goto(snapshot.page, per_page);
                    state.search.merge(snapshot);
                }
                Mode::Browse => state.browse.merge_cached(snapshot),
            }
        }
        tracing::debug!(loader = %self.loader(mode).name(), key = %key, "Merged response");

        Ok(FetchOutcome::Fetched { response })
    }

    /// The gate backing `mode`'s loader.
    pub fn loader(&self, mode: Mode) -> &PendingGate<QueryParams> {
        match mode {
            Mode::Browse => &self.inner.browse_gate,
            Mode::Search => &self.inner.search_gate,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.inner.browse_gate.is_busy()
    }

    pub fn is_search_loading(&self) -> bool {
        self.inner.search_gate.is_busy()
    }

    /// Loader flag by configured name.
    pub fn loader_flag(&self, name: &str) -> Option<bool> {
        self.gate_named(name).map(PendingGate::is_busy)
    }

    pub fn watch_loader(&self, name: &str) -> Option<watch::Receiver<bool>> {
        self.gate_named(name).map(PendingGate::subscribe)
    }

    fn gate_named(&self, name: &str) -> Option<&PendingGate<QueryParams>> {
        [&self.inner.browse_gate, &self.inner.search_gate]
            .into_iter()
            .find(|gate| gate.name() == name)
    }

    /// Current state in persistable form.
    pub fn persisted_state(&self) -> PersistedState<T> {
        let state = self.inner.state.lock();
        PersistedState {
            browse: state.browse.clone(),
            search: state.search.clone(),
            search_term: self.inner.debouncer.term(),
        }
    }

    /// Cancel any pending search, save state when persistence is enabled,
    /// and reset to the initial state.
    ///
    /// The reset happens even when saving fails. Requests still in flight
    /// complete with [`FetchOutcome::Discarded`].
    pub fn teardown(&self) -> Result<(), StoreError> {
        self.inner.debouncer.cancel();

        let mut result = Ok(());
        if self.inner.config.persisted {
            if let Some(store) = &self.inner.store {
                let snapshot = self.persisted_state();
                result = store.save(&self.inner.instance_id, &snapshot);
                match &result {
                    Ok(()) => tracing::info!(id = %self.inner.instance_id, "Persisted state"),
                    Err(e) => {
                        tracing::error!(id = %self.inner.instance_id, error = %e, "Failed to persist state")
                    }
                }
            }
        }

        let initial = &self.inner.initial;
        {
            let mut state = self.inner.state.lock();
            state.browse = initial.browse.clone();
            state.search = initial.search.clone();
            state.epoch += 1;
        }
        self.inner.debouncer.set_term_now(initial.search_term.clone());

        result
    }
}
