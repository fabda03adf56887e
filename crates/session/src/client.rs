//! Authenticated requests against the exam console backend
//!
//! Every request carries the latest stored access token. A 401 answer is
//! recovered from at most once per call: the client asks the
//! [`RefreshCoordinator`] for a new token and resends the identical request.
//! If no token can be obtained, or the resend is rejected as well, the stored
//! tokens are dropped and the [`SessionGuard`] sends the user to the login
//! page.

use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::constants::DEFAULT_LOGIN_PATH;
use crate::error::ApiError;
use crate::guard::{MemoryNavigator, Navigator, SessionGuard};
use crate::refresh::RefreshCoordinator;
use crate::storage::{CredentialStore, MemoryCredentialStore};

/// One request: method, path, optional JSON body and per-call overrides
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<Value>,
    base_url: Option<String>,
    token: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            base_url: None,
            token: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PATCH, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Sends this request to another origin than the client's
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Uses this token for the first send instead of the stored one
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Shared HTTP client that authenticates, refreshes and retries
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn CredentialStore>,
    refresher: Arc<RefreshCoordinator>,
    guard: Arc<SessionGuard>,
}

impl ApiClient {
    pub fn builder(base_url: impl Into<String>) -> ApiClientBuilder {
        ApiClientBuilder::new(base_url)
    }

    /// Builds a client from the workspace configuration
    pub fn from_config(
        config: &common::Config,
        store: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        let mut builder = Self::builder(config.api.base_url.clone())
            .store(store)
            .navigator(navigator)
            .login_path(config.auth.login_path.clone())
            .max_refresh_attempts(config.auth.max_refresh_attempts);
        if let Some(time_zone) = &config.auth.time_zone {
            builder = builder.time_zone(time_zone.clone());
        }
        if let Some(secs) = config.api.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        builder.build()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn refresher(&self) -> &Arc<RefreshCoordinator> {
        &self.refresher
    }

    pub fn guard(&self) -> &Arc<SessionGuard> {
        &self.guard
    }

    /// Runs a request and returns its JSON body, `Value::Null` for non-JSON
    /// success responses.
    pub async fn execute(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        let url = self.resolve_url(request);
        let token = request
            .token
            .clone()
            .or_else(|| self.store.access_token());

        let response = self.send(request, &url, token.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return self.finish(request, &url, response).await;
        }
        let rejected = status_error(request, &url, response).await;

        // Another caller may have refreshed while this request was in flight.
        let retry_token = match self.store.access_token() {
            Some(stored) if token.as_deref() != Some(stored.as_str()) => {
                debug!("{} {} answered 401, retrying with the newer stored token", request.method, url);
                stored
            }
            _ => {
                debug!("{} {} answered 401, refreshing access token", request.method, url);
                match self.refresher.refresh().await {
                    Some(new_token) => new_token,
                    None => return Err(self.end_session(rejected)),
                }
            }
        };

        let retried = self.send(request, &url, Some(&retry_token)).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            warn!("{} {} rejected the refreshed token", request.method, url);
            let rejected = status_error(request, &url, retried).await;
            return Err(self.end_session(rejected));
        }
        self.finish(request, &url, retried).await
    }

    /// Runs a request and decodes its body into `T`
    pub async fn execute_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ApiError> {
        let url = self.resolve_url(request);
        let body = self.execute(request).await?;
        serde_json::from_value(body).map_err(|source| ApiError::Decode {
            method: request.method.clone(),
            url,
            source,
        })
    }

    fn resolve_url(&self, request: &ApiRequest) -> String {
        let base = request.base_url.as_deref().unwrap_or(&self.base_url);
        format!("{}{}", base.trim_end_matches('/'), request.path)
    }

    async fn send(
        &self,
        request: &ApiRequest,
        url: &str,
        token: Option<&str>,
    ) -> Result<Response, ApiError> {
        let parsed = reqwest::Url::parse(url).map_err(|_| ApiError::InvalidUrl(url.to_string()))?;

        let mut builder = self.http.request(request.method.clone(), parsed);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        builder.send().await.map_err(|source| ApiError::Transport {
            method: request.method.clone(),
            url: url.to_string(),
            source,
        })
    }

    async fn finish(
        &self,
        request: &ApiRequest,
        url: &str,
        response: Response,
    ) -> Result<Value, ApiError> {
        if !response.status().is_success() {
            return Err(status_error(request, url, response).await);
        }

        if !is_json(response.headers().get(CONTENT_TYPE)) {
            return Ok(Value::Null);
        }

        let text = response.text().await.map_err(|source| ApiError::Transport {
            method: request.method.clone(),
            url: url.to_string(),
            source,
        })?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|source| ApiError::Decode {
            method: request.method.clone(),
            url: url.to_string(),
            source,
        })
    }

    /// Terminal 401: forget the dead tokens, then let the guard redirect
    fn end_session(&self, rejected: ApiError) -> ApiError {
        self.store.clear();
        self.guard.enforce_authenticated();
        rejected
    }
}

fn is_json(content_type: Option<&HeaderValue>) -> bool {
    content_type
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_ascii_lowercase().contains("json"))
        .unwrap_or(false)
}

async fn status_error(request: &ApiRequest, url: &str, response: Response) -> ApiError {
    let status = response.status();
    let body = response.text().await.ok().filter(|text| !text.is_empty());
    ApiError::Status {
        method: request.method.clone(),
        url: url.to_string(),
        status,
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        body,
    }
}

/// Assembles an [`ApiClient`] and its collaborators
pub struct ApiClientBuilder {
    base_url: String,
    store: Option<Arc<dyn CredentialStore>>,
    navigator: Option<Arc<dyn Navigator>>,
    http: Option<reqwest::Client>,
    timeout: Option<Duration>,
    login_path: String,
    max_refresh_attempts: Option<u32>,
    time_zone: Option<String>,
}

impl ApiClientBuilder {
    fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            store: None,
            navigator: None,
            http: None,
            timeout: None,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            max_refresh_attempts: None,
            time_zone: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Uses a preconfigured HTTP client; `timeout` is then ignored
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn login_path(mut self, login_path: impl Into<String>) -> Self {
        self.login_path = login_path.into();
        self
    }

    pub fn max_refresh_attempts(mut self, attempts: u32) -> Self {
        self.max_refresh_attempts = Some(attempts);
        self
    }

    pub fn time_zone(mut self, time_zone: impl Into<String>) -> Self {
        self.time_zone = Some(time_zone.into());
        self
    }

    /// Defaults: in-memory credentials and a navigator parked at `/`.
    pub fn build(self) -> Result<ApiClient, ApiError> {
        let base_url = self.base_url.trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url).map_err(|_| ApiError::InvalidUrl(base_url.clone()))?;

        let http = match self.http {
            Some(http) => http,
            None => {
                let mut builder = reqwest::Client::builder();
                if let Some(timeout) = self.timeout {
                    builder = builder.timeout(timeout);
                }
                builder.build().map_err(ApiError::Client)?
            }
        };

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new()) as Arc<dyn CredentialStore>);
        let navigator = self
            .navigator
            .unwrap_or_else(|| Arc::new(MemoryNavigator::new("/")) as Arc<dyn Navigator>);

        let mut refresher = RefreshCoordinator::new(http.clone(), &base_url, store.clone());
        if let Some(attempts) = self.max_refresh_attempts {
            refresher = refresher.with_max_attempts(attempts);
        }
        if let Some(time_zone) = self.time_zone {
            refresher = refresher.with_time_zone(time_zone);
        }

        let guard = SessionGuard::new(store.clone(), navigator, self.login_path);

        Ok(ApiClient {
            http,
            base_url,
            store,
            refresher: Arc::new(refresher),
            guard: Arc::new(guard),
        })
    }
}
