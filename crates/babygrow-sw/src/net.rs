//! The network seam.
//!
//! The controller never talks to the network directly; it goes through a
//! [`Fetcher`]. [`HttpFetcher`] is the reqwest-backed implementation used in
//! production and by the smoke harness.

use std::sync::Arc;

use http::Method;
use reqwest::cookie::Jar;
use reqwest::redirect::Policy;
use reqwest::Client;
use tracing::{debug, info, trace};

use crate::error::SwError;
use crate::request::{Request, Response};

/// Performs network fetches on behalf of the controller.
///
/// A transport failure is an `Err`. Any HTTP status, including 3xx, 4xx and
/// 5xx, is an `Ok(Response)`.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, SwError>;
}

/// Default User-Agent for [`HttpFetcher`].
pub const DEFAULT_USER_AGENT: &str = "BabyGrow-SW/0.1";

/// Configuration for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub user_agent: String,
    /// Redirects followed for sub-resource GETs.
    pub max_redirects: usize,
    pub cookies_enabled: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_redirects: 10,
            cookies_enabled: true,
        }
    }
}

/// Fetcher backed by reqwest.
///
/// Navigations and non-GET requests never follow redirects: the 3xx itself
/// comes back to the caller. Sub-resource GETs follow up to
/// `max_redirects`. Both clients share one cookie jar, so a session set by
/// one is sent by the other.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    follow: Client,
    manual: Client,
}

impl HttpFetcher {
    /// Create a fetcher with the given User-Agent and default settings.
    ///
    /// No request timeout is set: a hung fetch stays pending until the
    /// transport gives up.
    pub fn new(user_agent: &str) -> Result<Self, SwError> {
        Self::with_config(FetcherConfig {
            user_agent: user_agent.to_string(),
            ..Default::default()
        })
    }

    pub fn with_config(config: FetcherConfig) -> Result<Self, SwError> {
        let jar = Arc::new(Jar::default());
        let build = |policy: Policy| {
            let mut builder = Client::builder()
                .user_agent(config.user_agent.as_str())
                .redirect(policy);
            if config.cookies_enabled {
                builder = builder.cookie_provider(Arc::clone(&jar));
            }
            builder.build()
        };

        let follow = build(Policy::limited(config.max_redirects))?;
        let manual = build(Policy::none())?;

        info!(
            user_agent = %config.user_agent,
            max_redirects = config.max_redirects,
            cookies = config.cookies_enabled,
            "HttpFetcher initialized"
        );
        Ok(Self { follow, manual })
    }

    fn client_for(&self, request: &Request) -> &Client {
        if request.is_navigation() || request.method != Method::GET {
            &self.manual
        } else {
            &self.follow
        }
    }

    async fn execute(&self, request: &Request) -> Result<Response, SwError> {
        debug!(url = %request.url, method = %request.method, "Fetching from network");

        let mut builder = self
            .client_for(request)
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());

        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?;

        trace!(url = %url, status = %status, body_len = body.len(), "Response received");

        Ok(Response {
            url,
            status,
            headers,
            body,
            from_cache: false,
        })
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, SwError> {
        self.execute(request).await
    }
}
