//! HTTP session used to talk to the MovieBox API.
//!
//! Every API response is wrapped in a `{code, message, data}` envelope; the
//! `*_from_api` / `post_to_api` helpers strip it and return `data`, or fail
//! with [`Error::UnsuccessfulResponse`] carrying the whole envelope.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::models::AppInfo;

/// Path of the endpoint that hands out the session cookies.
const APP_INFO_PATH: &str = "/wefeed-h5-bff/app/get-latest-app-pkgs?app_name=moviebox";

/// Query parameters or extra headers, as name/value pairs.
pub type Pairs<'a> = &'a [(&'a str, String)];

/// Extracts `data` from a successful envelope.
///
/// # Errors
///
/// Returns [`Error::UnsuccessfulResponse`] unless `code == 0` and
/// `message == "ok"`.
pub fn process_api_response(mut envelope: Value) -> Result<Value> {
    let ok = envelope.get("code").and_then(Value::as_i64) == Some(0)
        && envelope.get("message").and_then(Value::as_str) == Some("ok");
    if ok {
        return Ok(envelope
            .get_mut("data")
            .map(Value::take)
            .unwrap_or(Value::Null));
    }
    log::debug!("Unsuccessful response received from server - {envelope}");
    Err(Error::UnsuccessfulResponse { envelope })
}

/// The request surface the rest of the crate depends on.
///
/// [`Session`] is the real implementation; tests substitute their own.
#[async_trait]
pub trait ApiSession: Send + Sync {
    /// Client configuration (host, timeouts).
    fn config(&self) -> &ClientConfig;

    /// GET without any server-assigned cookies. Returns the raw body.
    async fn get(&self, url: &str, query: Pairs<'_>, headers: Pairs<'_>) -> Result<String>;

    /// GET with the session cookies, following redirects. Returns the raw body.
    async fn get_with_cookies(
        &self,
        url: &str,
        query: Pairs<'_>,
        headers: Pairs<'_>,
    ) -> Result<String>;

    /// POST a JSON payload with the session cookies. Returns the raw body.
    async fn post(&self, url: &str, payload: &Value) -> Result<String>;

    /// [`get`](Self::get), then unwrap the envelope.
    async fn get_from_api(&self, url: &str, query: Pairs<'_>, headers: Pairs<'_>) -> Result<Value> {
        let body = self.get(url, query, headers).await?;
        process_api_response(serde_json::from_str(&body)?)
    }

    /// [`get_with_cookies`](Self::get_with_cookies), then unwrap the envelope.
    async fn get_with_cookies_from_api(
        &self,
        url: &str,
        query: Pairs<'_>,
        headers: Pairs<'_>,
    ) -> Result<Value> {
        let body = self.get_with_cookies(url, query, headers).await?;
        process_api_response(serde_json::from_str(&body)?)
    }

    /// [`post`](Self::post), then unwrap the envelope.
    async fn post_to_api(&self, url: &str, payload: &Value) -> Result<Value> {
        let body = self.post(url, payload).await?;
        process_api_response(serde_json::from_str(&body)?)
    }
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(HeaderName::from_static(name), value);
        }
        Err(e) => log::warn!("Skipping invalid {name} header: {e}"),
    }
}

/// Headers sent with every API request.
#[must_use]
pub fn default_headers(config: &ClientConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert_header(
        &mut headers,
        "x-client-info",
        &format!("{{\"timezone\":\"{}\"}}", config.timezone),
    );
    insert_header(&mut headers, "accept-language", "en-US,en;q=0.5");
    insert_header(&mut headers, "accept", "application/json");
    insert_header(&mut headers, "user-agent", &config.user_agent);
    insert_header(&mut headers, "referer", &config.host_url());
    headers
}

/// Headers sent with media and caption file requests.
#[must_use]
pub fn download_headers(config: &ClientConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert_header(&mut headers, "accept", "*/*");
    insert_header(&mut headers, "user-agent", &config.user_agent);
    insert_header(&mut headers, "origin", &config.host);
    insert_header(&mut headers, "referer", &config.host_url());
    headers
}

fn build_http_client(config: &ClientConfig, cookies: bool) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .default_headers(default_headers(config))
        .cookie_store(cookies)
        .timeout(config.timeout())
        .pool_idle_timeout(Duration::from_secs(60))
        .tcp_keepalive(Duration::from_secs(30))
        .build()
}

fn apply_headers(mut request: reqwest::RequestBuilder, headers: Pairs<'_>) -> reqwest::RequestBuilder {
    for (name, value) in headers {
        request = request.header(*name, value);
    }
    request
}

/// reqwest-backed [`ApiSession`].
///
/// Cookies are bootstrapped lazily, once, on the first request that needs
/// them.
pub struct Session {
    config: ClientConfig,
    client: reqwest::Client,
    cookieless: reqwest::Client,
    app_info: OnceCell<AppInfo>,
}

impl Session {
    /// Creates a session for the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP clients cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        log::info!("Using host url - {}", config.host_url());
        Ok(Self {
            client: build_http_client(&config, true)?,
            cookieless: build_http_client(&config, false)?,
            config,
            app_info: OnceCell::new(),
        })
    }

    /// App info fetched during the cookie bootstrap, if it happened already.
    #[must_use]
    pub fn app_info(&self) -> Option<&AppInfo> {
        self.app_info.get()
    }

    /// Fetches the session cookies if that has not happened yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the bootstrap request fails.
    pub async fn ensure_cookies_are_assigned(&self) -> Result<&AppInfo> {
        self.app_info
            .get_or_try_init(|| async {
                let url = self.config.absolute_url(APP_INFO_PATH);
                log::debug!("Fetching session cookies from {url}");
                let body = self
                    .client
                    .get(&url)
                    .send()
                    .await?
                    .error_for_status()?
                    .text()
                    .await?;
                parse_app_info(&body)
            })
            .await
    }
}

/// Reads the package details out of a cookie bootstrap response.
///
/// Details that do not match [`AppInfo`] are logged and replaced by the
/// default; only the cookies matter to the session.
fn parse_app_info(body: &str) -> Result<AppInfo> {
    // The endpoint answers with either one package or a list of them.
    let info = match process_api_response(serde_json::from_str(body)?)? {
        Value::Array(mut list) if !list.is_empty() => list.swap_remove(0),
        other => other,
    };
    Ok(serde_json::from_value(info)
        .inspect_err(|e| log::debug!("Ignoring malformed app info: {e}"))
        .unwrap_or_default())
}

#[async_trait]
impl ApiSession for Session {
    fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn get(&self, url: &str, query: Pairs<'_>, headers: Pairs<'_>) -> Result<String> {
        log::debug!("GET {url}");
        let request = apply_headers(self.cookieless.get(url).query(query), headers);
        Ok(request.send().await?.error_for_status()?.text().await?)
    }

    async fn get_with_cookies(
        &self,
        url: &str,
        query: Pairs<'_>,
        headers: Pairs<'_>,
    ) -> Result<String> {
        self.ensure_cookies_are_assigned().await?;
        log::debug!("GET {url} (with cookies)");
        let request = apply_headers(self.client.get(url).query(query), headers);
        Ok(request.send().await?.error_for_status()?.text().await?)
    }

    async fn post(&self, url: &str, payload: &Value) -> Result<String> {
        self.ensure_cookies_are_assigned().await?;
        log::debug!("POST {url} {payload}");
        let response = self.client.post(url).json(payload).send().await?;
        Ok(response.error_for_status()?.text().await?)
    }
}
