use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tokio::time::timeout;

use crate::config::TransportConfig;
use crate::params::QueryParams;

use super::{Transport, TransportError};

/// [`Transport`] over HTTP GET, with parameters sent as a query string.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(u64::from(config.connect_timeout_seconds)))
            .build()
            .map_err(|e| TransportError::Connection {
                url: config.base_url.clone(),
                source: e,
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(u64::from(config.timeout_seconds)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    async fn do_request(&self, url: String, params: &QueryParams) -> Result<Value, TransportError> {
        let query = query_pairs(params);
        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| TransportError::Connection {
                url: url.clone(),
                source: e,
            })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Decode(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: serde_json::from_slice(&bytes).ok(),
            });
        }

        serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn perform_request(
        &self,
        endpoint: &str,
        params: &QueryParams,
    ) -> Result<Value, TransportError> {
        let url = self.url_for(endpoint);
        tracing::debug!(url = %url, params = %params, "Sending request");

        match timeout(self.request_timeout, self.do_request(url, params)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                duration: self.request_timeout.as_secs(),
            }),
        }
    }
}

/// Flatten params into query pairs. Arrays become repeated keys and nested
/// objects are sent as JSON text.
fn query_pairs(params: &QueryParams) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(params.len());
    for (key, value) in params.iter() {
        match value {
            Value::Array(items) => {
                for item in items {
                    pairs.push((key.clone(), scalar_text(item)));
                }
            }
            other => pairs.push((key.clone(), scalar_text(other))),
        }
    }
    pairs
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
