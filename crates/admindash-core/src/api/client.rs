//! HTTP client for the dashboard REST API.
//!
//! Every real network call goes through [`HttpClient::execute`]: request
//! interceptors run first, the JSON payload is returned on success, and every
//! failure leaves as a normalized [`ApiError`] after the error interceptors
//! have seen it.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client, Method};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::interceptors::{ErrorInterceptor, OutgoingRequest, RequestInterceptor};
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// API client for the dashboard backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling,
/// and the interceptor chains are shared.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    error_interceptors: Vec<Arc<dyn ErrorInterceptor>>,
}

impl HttpClient {
    /// Create a client for `base_url` with the default timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        default_headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(default_headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_interceptors: Vec::new(),
            error_interceptors: Vec::new(),
        })
    }

    /// Append a request interceptor; interceptors run in the order added.
    pub fn with_request_interceptor(mut self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.request_interceptors.push(Arc::new(interceptor));
        self
    }

    /// Append an error interceptor; interceptors run in the order added.
    pub fn with_error_interceptor(mut self, interceptor: impl ErrorInterceptor + 'static) -> Self {
        self.error_interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute(OutgoingRequest::new(Method::GET, path)).await
    }

    /// GET with `params` flattened into the query string.
    pub async fn get_with_query<T: DeserializeOwned, Q: Serialize>(
        &self,
        path: &str,
        params: &Q,
    ) -> Result<T, ApiError> {
        let mut request = OutgoingRequest::new(Method::GET, path);
        request.query = query_pairs(params).map_err(|e| self.fail(e))?;
        self.execute(request).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let mut request = OutgoingRequest::new(Method::POST, path);
        request.body = Some(serde_json::to_value(body).map_err(|e| self.fail(e.into()))?);
        self.execute(request).await
    }

    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute(OutgoingRequest::new(Method::POST, path)).await
    }

    /// Run the full pipeline for one request.
    pub async fn execute<T: DeserializeOwned>(&self, mut request: OutgoingRequest) -> Result<T, ApiError> {
        for interceptor in &self.request_interceptors {
            interceptor.on_request(&mut request).map_err(|e| self.fail(e))?;
        }

        let url = format!("{}{}", self.base_url, request.path);
        debug!(method = %request.method, url = %url, "Sending request");

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(request.headers);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| self.fail(e.into()))?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.fail(ApiError::from_status(status, &body)));
        }

        let bytes = response.bytes().await.map_err(|e| self.fail(e.into()))?;
        let payload = if bytes.iter().all(u8::is_ascii_whitespace) {
            serde_json::from_slice(b"null")
        } else {
            serde_json::from_slice(&bytes)
        };
        payload.map_err(|e| self.fail(e.into()))
    }

    /// Hand a normalized error to the error interceptors and return it.
    fn fail(&self, error: ApiError) -> ApiError {
        warn!(
            status = ?error.status_code,
            kind = ?error.kind,
            error = %error,
            "Request failed"
        );
        for interceptor in &self.error_interceptors {
            interceptor.on_error(&error);
        }
        error
    }
}

/// Flatten a serializable struct into query pairs, skipping nulls.
fn query_pairs<Q: Serialize>(params: &Q) -> Result<Vec<(String, String)>, ApiError> {
    match serde_json::to_value(params)? {
        serde_json::Value::Object(map) => Ok(map
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => (k, s),
                other => (k, other.to_string()),
            })
            .collect()),
        serde_json::Value::Null => Ok(Vec::new()),
        _ => Err(ApiError::validation("Query parameters must be an object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SortOrder, UserFilters, UserRole};

    #[test]
    fn test_query_pairs_from_filters() {
        let filters = UserFilters::default()
            .page(2)
            .page_size(25)
            .role(UserRole::Admin)
            .sort("email", SortOrder::Desc);
        let pairs = query_pairs(&filters).unwrap();
        assert!(pairs.contains(&("page".to_string(), "2".to_string())));
        assert!(pairs.contains(&("pageSize".to_string(), "25".to_string())));
        assert!(pairs.contains(&("role".to_string(), "ADMIN".to_string())));
        assert!(pairs.contains(&("sortOrder".to_string(), "desc".to_string())));
        assert!(!pairs.iter().any(|(k, _)| k == "search"));
    }

    #[test]
    fn test_query_pairs_rejects_scalars() {
        assert!(query_pairs(&5).is_err());
        assert!(query_pairs(&()).unwrap().is_empty());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = HttpClient::new("http://localhost:9000/api/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:9000/api");
    }
}
