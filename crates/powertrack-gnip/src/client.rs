//! GNIP REST client (historical + search endpoints)

use anyhow::Context;
use powertrack_core::{HttpConfig, SHARED_RUNTIME, StreamError, build_client};
use reqwest::{Method, Url};
use serde_json::Value;

/// Account credentials and endpoint roots
#[derive(Clone, Default)]
pub struct ApiConfig {
    pub account: String,
    pub username: String,
    pub password: String,
    /// Search stream label (`prod`, `dev`, ...)
    pub label: String,
    /// Override for the historical root, mostly for tests
    pub historical_url: Option<String>,
    /// Override for the search root
    pub search_url: Option<String>,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("account", &self.account)
            .field("username", &self.username)
            .field("password", &"***")
            .field("label", &self.label)
            .field("historical_url", &self.historical_url)
            .field("search_url", &self.search_url)
            .finish()
    }
}

impl ApiConfig {
    pub fn historical_root(&self) -> String {
        with_slash(self.historical_url.clone().unwrap_or_else(|| {
            format!("https://historical.gnip.com/accounts/{}/", self.account)
        }))
    }

    pub fn search_root(&self) -> String {
        with_slash(
            self.search_url
                .clone()
                .unwrap_or_else(|| format!("https://search.gnip.com/accounts/{}/", self.account)),
        )
    }
}

fn with_slash(mut root: String) -> String {
    if !root.ends_with('/') {
        root.push('/');
    }
    root
}

/// Status and decoded body of an API call
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    /// JSON body; a non-JSON body is kept as a string value
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Provider's `error.message`, falling back to the raw status
    pub fn error_message(&self) -> String {
        if let Some(msg) = self.body.pointer("/error/message").and_then(Value::as_str) {
            return msg.to_string();
        }
        match &self.body {
            Value::String(text) if !text.is_empty() => {
                let snippet: String = text.chars().take(200).collect();
                format!("HTTP {}: {snippet}", self.status)
            }
            _ => format!("HTTP {}", self.status),
        }
    }

    pub fn into_result(self) -> anyhow::Result<Value> {
        if self.is_success() {
            Ok(self.body)
        } else {
            anyhow::bail!("{} (status {})", self.error_message(), self.status)
        }
    }
}

/// Authenticated client for one GNIP account
#[derive(Debug, Clone)]
pub struct PowerTrack {
    config: ApiConfig,
    client: reqwest::Client,
}

impl PowerTrack {
    pub fn new(config: ApiConfig, http: &HttpConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(!config.account.is_empty(), "GNIP account name is not set");
        let client = build_client(http).context("Cannot build HTTP client")?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Resolve `path` against the historical root; absolute URLs pass through
    pub fn historical_url(&self, path: &str) -> anyhow::Result<String> {
        join_url(&self.config.historical_root(), path)
    }

    pub fn search_url(&self, path: &str) -> anyhow::Result<String> {
        join_url(&self.config.search_root(), path)
    }

    pub fn get(&self, url: &str) -> anyhow::Result<Value> {
        self.request(Method::GET, url, None)?.into_result()
    }

    pub fn post(&self, url: &str, body: &Value) -> anyhow::Result<Value> {
        self.request(Method::POST, url, Some(body))?.into_result()
    }

    pub fn put(&self, url: &str, body: &Value) -> anyhow::Result<Value> {
        self.request(Method::PUT, url, Some(body))?.into_result()
    }

    /// Send one request. Only transport failures are errors; any status is returned.
    pub fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> anyhow::Result<ApiResponse> {
        log::debug!("{method} {url}");
        let verb = method.clone();
        let result: Result<(u16, String), reqwest::Error> = SHARED_RUNTIME.handle().block_on(async {
            let mut req = self
                .client
                .request(method, url)
                .basic_auth(&self.config.username, Some(&self.config.password));
            if let Some(body) = body {
                req = req.json(body);
            }
            let resp = req.send().await?;
            let status = resp.status().as_u16();
            Ok((status, resp.text().await?))
        });

        let (status, text) = result
            .map_err(StreamError::from_reqwest)
            .with_context(|| format!("{verb} request failed"))?;
        Ok(ApiResponse {
            status,
            body: decode_body(text),
        })
    }
}

fn join_url(root: &str, path: &str) -> anyhow::Result<String> {
    let base = Url::parse(root).with_context(|| format!("Invalid API root '{root}'"))?;
    let url = base
        .join(path)
        .with_context(|| format!("Invalid API path '{path}'"))?;
    Ok(url.into())
}

fn decode_body(text: String) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}
