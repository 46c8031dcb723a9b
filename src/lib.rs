//! Paginated-fetch coordination.
//!
//! Coalesces concurrent fetches per loader, caches fetched pages by
//! `(page, per_page)` and debounces search input, switching between a
//! browse provider and a search provider.

pub mod config;
pub mod coordinator;
pub mod debounce;
pub mod gate;
pub mod logging;
pub mod params;
pub mod provider;
pub mod store;
pub mod transport;

pub use coordinator::{
    CoordinatorBuilder, FetchError, FetchOutcome, FetchRequest, Mode, PaginationCoordinator,
};
pub use gate::{GateOutcome, PendingGate};
pub use params::QueryParams;
pub use provider::{PageCache, PageKey, PartialProvider, Provider, ProviderSnapshot};
pub use store::{FileStateStore, MemoryStateStore, PersistedState, StateStore, StoreError};
pub use transport::{HttpTransport, Transport, TransportError};
