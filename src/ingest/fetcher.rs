/// Retrying GET client for the remote time-series API.
///
/// Every attempt that fails with a transport or HTTP error is retried after a
/// flat delay, with a freshly acquired bearer token. The token refresh itself
/// is a single shot: if it fails, the fetch fails immediately instead of
/// nesting another retry loop inside this one.
///
/// The HTTP layer, the token endpoint and the sleep are all behind small
/// traits so the retry schedule can be driven deterministically in tests.

use std::time::Duration;

use serde::Deserialize;

use crate::config::{Credentials, ServiceConfig};
use crate::logging::{self, DataSource};
use crate::model::{FetchError, ReportError};

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Bearer token for the `Authorization` header.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(pub String);

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccessToken(***)")
    }
}

/// Issues one authenticated GET and returns the response body.
pub trait Transport {
    fn get(&self, url: &str, token: &AccessToken) -> Result<String, FetchError>;
}

/// Acquires an access token with a client-credentials grant.
pub trait TokenSource {
    fn acquire(&self, credentials: &Credentials) -> Result<AccessToken, FetchError>;
}

/// Blocks the calling thread between attempts.
pub trait Pause {
    fn pause(&self, delay: Duration);
}

/// `Pause` backed by `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleep;

impl Pause for ThreadSleep {
    fn pause(&self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves like one.
    pub max_retries: u32,
    /// Constant delay between attempts; there is no backoff growth.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            delay: Duration::from_millis(4000),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            max_retries: config.retry.max_retries,
            delay: config.retry_delay(),
        }
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

pub struct ResilientFetcher<T, S, P = ThreadSleep> {
    transport: T,
    tokens: S,
    pause: P,
    policy: RetryPolicy,
}

impl<T: Transport, S: TokenSource> ResilientFetcher<T, S, ThreadSleep> {
    pub fn new(transport: T, tokens: S, policy: RetryPolicy) -> Self {
        Self::with_pause(transport, tokens, ThreadSleep, policy)
    }
}

impl<T: Transport, S: TokenSource, P: Pause> ResilientFetcher<T, S, P> {
    pub fn with_pause(transport: T, tokens: S, pause: P, policy: RetryPolicy) -> Self {
        Self {
            transport,
            tokens,
            pause,
            policy,
        }
    }

    /// Acquires a token without retrying.
    pub fn acquire_token(&self, credentials: &Credentials) -> Result<AccessToken, ReportError> {
        self.tokens.acquire(credentials).map_err(ReportError::TokenRefresh)
    }

    /// GETs `url`, retrying transient failures.
    ///
    /// The caller's `token` is used for the first attempt. Refreshed tokens
    /// stay local to this call; nothing is cached between fetches.
    pub fn fetch(
        &self,
        url: &str,
        token: &AccessToken,
        credentials: &Credentials,
    ) -> Result<String, ReportError> {
        let max_attempts = self.policy.max_retries.max(1);
        let mut token = token.clone();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match self.transport.get(url, &token) {
                Ok(body) => return Ok(body),
                Err(err) => err,
            };

            logging::warn(
                DataSource::Iow,
                None,
                &format!("Request failed (attempt {}/{}): {}", attempt, max_attempts, err),
            );
            if attempt >= max_attempts {
                return Err(ReportError::FetchExhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            logging::info(
                DataSource::Iow,
                None,
                &format!(
                    "Retry {} of {} in {} ms",
                    attempt,
                    max_attempts - 1,
                    self.policy.delay.as_millis()
                ),
            );
            self.pause.pause(self.policy.delay);
            token = self.tokens.acquire(credentials).map_err(|e| {
                logging::error(DataSource::Token, None, &format!("Token refresh failed: {}", e));
                ReportError::TokenRefresh(e)
            })?;
        }
    }
}

// ---------------------------------------------------------------------------
// reqwest implementations
// ---------------------------------------------------------------------------

/// Blocking HTTP transport sending `Accept: application/json` and a bearer
/// token on every request.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str, token: &AccessToken) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .bearer_auth(&token.0)
            .send()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Http(response.status().as_u16()));
        }

        response.text().map_err(|e| FetchError::Network(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// OAuth2 client-credentials token endpoint.
pub struct OAuthTokenSource {
    client: reqwest::blocking::Client,
    token_url: String,
}

impl OAuthTokenSource {
    pub fn new(client: reqwest::blocking::Client, token_url: impl Into<String>) -> Self {
        Self {
            client,
            token_url: token_url.into(),
        }
    }
}

impl TokenSource for OAuthTokenSource {
    fn acquire(&self, credentials: &Credentials) -> Result<AccessToken, FetchError> {
        let form = [
            ("grant_type", credentials.grant_type.as_str()),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
        ];
        let response = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Http(response.status().as_u16()));
        }

        let body = response.text().map_err(|e| FetchError::Network(e.to_string()))?;
        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| FetchError::Network(format!("unreadable token response: {}", e)))?;
        logging::debug(DataSource::Token, None, "access token acquired");
        Ok(AccessToken(parsed.access_token))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
