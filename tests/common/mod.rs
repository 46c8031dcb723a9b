//! Shared test utilities and mock infrastructure.

#![allow(dead_code, unused_imports)]

pub mod mock_backend;

use async_trait::async_trait;
use paginationable::config::CoordinatorConfig;
use paginationable::{PaginationCoordinator, QueryParams, Transport, TransportError};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

/// Find an available port for testing.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to free port");
    listener.local_addr().unwrap().port()
}

// -- Mock transport -----------------------------------------------------------

/// In-process transport that records every request.
///
/// Queued responses are returned first. Once the queue is empty, a page is
/// synthesized from the request's `page`, `per_page` and `search` params over
/// a collection of `total` items.
pub struct MockTransport {
    calls: Mutex<Vec<(String, QueryParams)>>,
    responses: Mutex<VecDeque<Result<Value, TransportError>>>,
    delay: Duration,
    total: u64,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            total: 25,
        }
    }

    /// Every request sleeps for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total = total;
        self
    }

    pub fn enqueue(&self, response: Result<Value, TransportError>) {
        self.responses.lock().push_back(response);
    }

    pub fn calls(&self) -> Vec<(String, QueryParams)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// The `page` param of every request, in order.
    pub fn requested_pages(&self) -> Vec<u64> {
        self.calls
            .lock()
            .iter()
            .filter_map(|(_, params)| params.get("page").and_then(Value::as_u64))
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn perform_request(
        &self,
        endpoint: &str,
        params: &QueryParams,
    ) -> Result<Value, TransportError> {
        self.calls.lock().push((endpoint.to_string(), params.clone()));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(response) = self.responses.lock().pop_front() {
            return response;
        }
        Ok(page_response(params, self.total))
    }
}

/// A page of `total` items named `{prefix}-{index}`, where the prefix is the
/// search term or `item`.
pub fn page_response(params: &QueryParams, total: u64) -> Value {
    let page = params.get("page").and_then(Value::as_u64).unwrap_or(1);
    let per_page = params.get("per_page").and_then(Value::as_u64).unwrap_or(10);
    let prefix = params
        .get("search")
        .and_then(Value::as_str)
        .unwrap_or("item")
        .to_string();

    let start = (page - 1) * per_page;
    let end = (start + per_page).min(total);
    let data: Vec<String> = (start..end).map(|i| format!("{}-{}", prefix, i)).collect();

    json!({
        "page": page,
        "per_page": per_page,
        "total": total,
        "data": data,
    })
}

// -- Coordinator helpers ------------------------------------------------------

pub fn coordinator_config() -> CoordinatorConfig {
    CoordinatorConfig {
        id: "items".to_string(),
        endpoint: "/api/items".to_string(),
        ..CoordinatorConfig::default()
    }
}

pub fn make_coordinator(transport: Arc<MockTransport>) -> PaginationCoordinator<String> {
    PaginationCoordinator::builder(coordinator_config(), transport)
        .with_json_mapper()
        .build()
        .expect("coordinator")
}

/// Let spawned tasks run and timers elapse under a paused clock.
pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
