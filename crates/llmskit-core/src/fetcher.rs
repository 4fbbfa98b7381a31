//! Infrastructure-aware HTTP fetching of llms.txt manifests.
//!
//! The [`Fetcher`] owns the toolkit's shared HTTP client and turns every
//! network outcome into a [`FetchResult`] value: HTTP-level failures are
//! classified into one of seven [`FetchStatus`] categories (never raised),
//! 403 responses are fingerprinted against known WAF vendors, 429 responses
//! carry a parsed `Retry-After`, and transient failures retry with jittered
//! exponential backoff.
//!
//! The same client (and therefore the same connection pool, User-Agent, and
//! timeout discipline) backs the context generator's linked-content fetches
//! via [`Fetcher::fetch_content`] and the validator's HEAD probes via
//! [`Fetcher::probe_head`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use llmskit_core::{FetchStatus, Fetcher};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> llmskit_core::Result<()> {
//! let fetcher = Fetcher::new()?;
//! let result = fetcher.fetch("example.com", &CancellationToken::new()).await?;
//!
//! match result.status {
//!     FetchStatus::Success => println!("parsed {} sections", result.document.map_or(0, |d| d.sections.len())),
//!     FetchStatus::NotFound => println!("no llms.txt published"),
//!     other => println!("fetch ended as {other:?}"),
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use reqwest::header::ACCEPT;
use reqwest::{Client, Response, StatusCode, redirect};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::{Document, Error, LlmsParser, Result};

/// Default per-attempt timeout in seconds.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default number of additional attempts beyond the first.
const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default base delay for exponential backoff.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Default ceiling on response body size (5 MiB).
const DEFAULT_MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024;

/// Default `Accept` header: prefer Markdown, tolerate anything.
const DEFAULT_ACCEPT: &str = "text/markdown, text/plain;q=0.9, text/html;q=0.5, */*;q=0.1";

/// Configuration for the [`Fetcher`].
///
/// Plain option values passed at construction; there is no ambient or
/// process-global configuration.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// `User-Agent` sent with every request. The default identifies the
    /// toolkit honestly; overrides must not impersonate a browser.
    pub user_agent: String,
    /// Per-attempt wall-clock bound.
    pub timeout: Duration,
    /// Additional attempts beyond the first for transient failures.
    pub max_retries: u32,
    /// Base delay for exponential backoff between attempts.
    pub retry_delay: Duration,
    /// Optional override of the `Accept` header.
    pub accept_header: Option<String>,
    /// Hard ceiling on response body bytes read into memory.
    pub max_response_size: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("llmskit/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            accept_header: None,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
        }
    }
}

/// Category of a completed fetch.
///
/// These seven categories are the only outcome vocabulary exposed; callers
/// branch on them and never on raw HTTP status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchStatus {
    /// 2xx response; `document` is populated.
    Success,
    /// HTTP 404: the domain does not publish an llms.txt.
    NotFound,
    /// HTTP 403: access denied, possibly by a WAF (see `block_reason`).
    Blocked,
    /// HTTP 429: rate limited (see `retry_after`).
    RateLimited,
    /// The host could not be resolved.
    DnsFailure,
    /// The per-attempt deadline elapsed before response headers arrived.
    Timeout,
    /// Any other failure: HTTP 5xx, unexpected 4xx, transport errors,
    /// oversize bodies.
    Error,
}

/// The complete outcome of [`Fetcher::fetch`].
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Outcome category.
    pub status: FetchStatus,
    /// Parsed document; present iff `status` is [`FetchStatus::Success`].
    pub document: Option<Document>,
    /// Raw response body, when one was read.
    pub raw_content: Option<String>,
    /// HTTP status code; absent for DNS failures and timeouts.
    pub http_status: Option<u16>,
    /// Response headers with lowercased names.
    pub headers: BTreeMap<String, String>,
    /// Identified block vendor, present iff `status` is
    /// [`FetchStatus::Blocked`].
    pub block_reason: Option<String>,
    /// Parsed `Retry-After`, present iff `status` is
    /// [`FetchStatus::RateLimited`] and the header was parseable.
    pub retry_after: Option<Duration>,
    /// Human-readable failure description for non-success outcomes.
    pub error_message: Option<String>,
    /// Total wall-clock time across all attempts.
    pub duration: Duration,
    /// The domain this result describes.
    pub domain: String,
}

impl FetchResult {
    fn bare(status: FetchStatus, domain: &str) -> Self {
        Self {
            status,
            document: None,
            raw_content: None,
            http_status: None,
            headers: BTreeMap::new(),
            block_reason: None,
            retry_after: None,
            error_message: None,
            duration: Duration::ZERO,
            domain: domain.to_string(),
        }
    }
}

/// Metadata from a redirect-disabled HEAD probe.
#[derive(Debug, Clone)]
pub struct HeadProbe {
    /// Raw HTTP status code (3xx is observable; redirects are not followed).
    pub status: u16,
    /// Parsed `Last-Modified` header, if present.
    pub last_modified: Option<DateTime<Utc>>,
}

/// HTTP client for fetching llms.txt manifests and their linked content.
///
/// Owns the single shared `reqwest::Client` (and its connection pool) used
/// by every network-touching component, plus a redirect-disabled sibling for
/// HEAD probes. Construct once and share.
pub struct Fetcher {
    client: Client,
    probe_client: Client,
    config: FetcherConfig,
    parser: LlmsParser,
}

/// Per-attempt outcome: either final, or worth retrying with the carried
/// result as the answer if retries run out.
enum Attempt {
    Done(FetchResult),
    Retry(FetchResult),
}

impl Fetcher {
    /// Creates a fetcher with default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(FetcherConfig::default())
    }

    /// Creates a fetcher with custom configuration.
    pub fn with_config(config: FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(Error::Network)?;

        // reqwest fixes redirect policy at construction, and the validator's
        // redirect rule must observe raw 3xx responses.
        let probe_client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(Error::Network)?;

        let parser = LlmsParser::with_max_input_size(config.max_response_size);

        Ok(Self {
            client,
            probe_client,
            config,
            parser,
        })
    }

    /// Borrow the shared pooled HTTP client.
    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }

    /// Borrow the active configuration.
    #[must_use]
    pub const fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Fetch and parse `https://{domain}/llms.txt`.
    ///
    /// The URL is constructed literally from the domain with no scheme
    /// inference or path normalization (loopback domains are served over
    /// plain http so local test harnesses can terminate the request).
    ///
    /// Always returns a [`FetchResult`] for network-level outcomes. The only
    /// `Err` returns are programmer errors (empty domain) and cancellation.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidDomain`] for an empty or whitespace domain;
    /// [`Error::Cancelled`] when the token fires.
    #[instrument(skip_all, fields(domain = %domain))]
    pub async fn fetch(&self, domain: &str, cancel: &CancellationToken) -> Result<FetchResult> {
        if domain.trim().is_empty() {
            return Err(Error::InvalidDomain(
                "domain must be a non-empty host label".to_string(),
            ));
        }

        // http for loopback (test harnesses), https for everything else
        let scheme = if domain.starts_with("127.0.0.1") || domain.starts_with("localhost") {
            "http"
        } else {
            "https"
        };
        let url = format!("{scheme}://{domain}/llms.txt");
        let started = Instant::now();
        let mut attempt_no = 0u32;

        loop {
            attempt_no += 1;
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            match self.attempt(&url, domain, cancel).await? {
                Attempt::Done(mut result) => {
                    result.duration = started.elapsed();
                    debug!(status = ?result.status, elapsed_ms = result.duration.as_millis() as u64, "fetch complete");
                    return Ok(result);
                },
                Attempt::Retry(mut result) => {
                    if attempt_no > self.config.max_retries {
                        result.duration = started.elapsed();
                        debug!(status = ?result.status, attempts = attempt_no, "retries exhausted");
                        return Ok(result);
                    }
                    let delay = backoff_delay(attempt_no, self.config.retry_delay);
                    debug!(
                        attempt = attempt_no,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure, backing off"
                    );
                    self.sleep_cancellable(delay, cancel).await?;
                },
            }
        }
    }

    /// One request/classification cycle against `url`.
    async fn attempt(
        &self,
        url: &str,
        domain: &str,
        cancel: &CancellationToken,
    ) -> Result<Attempt> {
        let accept = self
            .config
            .accept_header
            .as_deref()
            .unwrap_or(DEFAULT_ACCEPT);
        let request = self.client.get(url).header(ACCEPT, accept);

        let sent = tokio::select! {
            () = cancel.cancelled() => return Err(Error::Cancelled),
            sent = request.send() => sent,
        };

        let response = match sent {
            Ok(response) => response,
            Err(e) => return Ok(classify_transport_error(&e, domain)),
        };

        let http_status = response.status();
        let headers = lowercase_headers(&response);

        let (body, truncated) = match self.read_capped_body(response, cancel).await {
            Ok(read) => read,
            Err(ReadFailure::Cancelled) => return Err(Error::Cancelled),
            Err(ReadFailure::Transport(e)) => return Ok(classify_transport_error(&e, domain)),
        };

        if truncated {
            let mut result = FetchResult::bare(FetchStatus::Error, domain);
            result.http_status = Some(http_status.as_u16());
            result.headers = headers;
            result.raw_content = Some(body);
            result.error_message = Some(format!(
                "Response body exceeded the {} byte limit and was truncated",
                self.config.max_response_size
            ));
            return Ok(Attempt::Done(result));
        }

        let mut result = FetchResult::bare(FetchStatus::Error, domain);
        result.http_status = Some(http_status.as_u16());
        result.headers = headers;

        if http_status.is_success() {
            result.status = FetchStatus::Success;
            result.document = Some(self.parser.parse(&body));
            result.raw_content = Some(body);
            return Ok(Attempt::Done(result));
        }

        result.raw_content = Some(body);

        match http_status {
            StatusCode::NOT_FOUND => {
                result.status = FetchStatus::NotFound;
                result.error_message = Some(format!("No llms.txt found at {url}"));
                Ok(Attempt::Done(result))
            },
            StatusCode::FORBIDDEN => {
                result.status = FetchStatus::Blocked;
                let vendor = detect_waf(&result.headers, result.raw_content.as_deref().unwrap_or(""));
                if let Some(ref reason) = vendor {
                    warn!(domain, reason = %reason, "llms.txt fetch blocked");
                }
                result.block_reason =
                    Some(vendor.unwrap_or_else(|| "HTTP 403 Forbidden".to_string()));
                result.error_message.clone_from(&result.block_reason);
                Ok(Attempt::Done(result))
            },
            StatusCode::TOO_MANY_REQUESTS => {
                result.status = FetchStatus::RateLimited;
                result.retry_after = result
                    .headers
                    .get("retry-after")
                    .and_then(|v| parse_retry_after(v));
                result.error_message = Some(format!("Rate limited by {domain}"));
                Ok(Attempt::Done(result))
            },
            s if s.is_server_error() => {
                result.error_message = Some(format!("HTTP {} from {domain}", s.as_u16()));
                Ok(Attempt::Retry(result))
            },
            s => {
                result.error_message = Some(format!("Unexpected HTTP {} from {domain}", s.as_u16()));
                Ok(Attempt::Done(result))
            },
        }
    }

    /// Fetch the body of a linked content URL with the same retry, timeout,
    /// and size discipline as the primary fetch.
    ///
    /// Unlike [`fetch`](Self::fetch), failures are `Err` values: the caller
    /// (the context generator) records them per-entry rather than branching
    /// on a status enum.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn fetch_content(&self, url: &str, cancel: &CancellationToken) -> Result<String> {
        let mut attempt_no = 0u32;

        loop {
            attempt_no += 1;
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let sent = tokio::select! {
                () = cancel.cancelled() => return Err(Error::Cancelled),
                sent = self.client.get(url).header(ACCEPT, DEFAULT_ACCEPT).send() => sent,
            };

            match sent {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let (body, truncated) = match self.read_capped_body(response, cancel).await
                        {
                            Ok(read) => read,
                            Err(ReadFailure::Cancelled) => return Err(Error::Cancelled),
                            Err(ReadFailure::Transport(e)) => return Err(Error::Network(e)),
                        };
                        if truncated {
                            return Err(Error::ResourceLimited(format!(
                                "response from {url} exceeded the {} byte limit",
                                self.config.max_response_size
                            )));
                        }
                        return Ok(body);
                    }

                    if status.is_server_error() && attempt_no <= self.config.max_retries {
                        let delay = backoff_delay(attempt_no, self.config.retry_delay);
                        self.sleep_cancellable(delay, cancel).await?;
                        continue;
                    }

                    return Err(Error::Other(format!(
                        "HTTP {} fetching {url}",
                        status.as_u16()
                    )));
                },
                Err(e) => {
                    let transient = e.is_timeout() || (e.is_connect() && !is_dns_error(&e));
                    if transient && attempt_no <= self.config.max_retries {
                        let delay = backoff_delay(attempt_no, self.config.retry_delay);
                        self.sleep_cancellable(delay, cancel).await?;
                        continue;
                    }
                    if e.is_timeout() {
                        return Err(Error::Timeout(format!("deadline exceeded fetching {url}")));
                    }
                    return Err(Error::Network(e));
                },
            }
        }
    }

    /// HEAD probe with redirects disabled, for link validation.
    ///
    /// A 3xx status is returned as-is so callers can distinguish redirects
    /// from reachability.
    pub async fn probe_head(
        &self,
        url: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<HeadProbe> {
        let request = self.probe_client.head(url).timeout(timeout);

        let sent = tokio::select! {
            () = cancel.cancelled() => return Err(Error::Cancelled),
            sent = request.send() => sent,
        };

        let response = match sent {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Err(Error::Timeout(format!("HEAD probe of {url} timed out")));
            },
            Err(e) => return Err(Error::Network(e)),
        };

        let last_modified = response
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date);

        Ok(HeadProbe {
            status: response.status().as_u16(),
            last_modified,
        })
    }

    /// Read a response body into memory, stopping at the configured cap.
    ///
    /// Returns the body (possibly truncated) and whether truncation occurred.
    async fn read_capped_body(
        &self,
        mut response: Response,
        cancel: &CancellationToken,
    ) -> std::result::Result<(String, bool), ReadFailure> {
        let cap = self.config.max_response_size;
        let mut buf: Vec<u8> = Vec::new();
        let mut truncated = false;

        loop {
            let chunk = tokio::select! {
                () = cancel.cancelled() => return Err(ReadFailure::Cancelled),
                chunk = response.chunk() => chunk,
            };
            match chunk {
                Ok(Some(bytes)) => {
                    if buf.len() + bytes.len() > cap {
                        let room = cap - buf.len();
                        buf.extend_from_slice(&bytes[..room]);
                        truncated = true;
                        break;
                    }
                    buf.extend_from_slice(&bytes);
                },
                Ok(None) => break,
                Err(e) => return Err(ReadFailure::Transport(e)),
            }
        }

        Ok((String::from_utf8_lossy(&buf).into_owned(), truncated))
    }

    async fn sleep_cancellable(&self, delay: Duration, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            () = cancel.cancelled() => Err(Error::Cancelled),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

enum ReadFailure {
    Cancelled,
    Transport(reqwest::Error),
}

/// Classify a transport-layer error into a terminal or retriable outcome.
fn classify_transport_error(e: &reqwest::Error, domain: &str) -> Attempt {
    if e.is_timeout() {
        let mut result = FetchResult::bare(FetchStatus::Timeout, domain);
        result.error_message = Some(format!("Request to {domain} timed out"));
        return Attempt::Retry(result);
    }
    if is_dns_error(e) {
        let mut result = FetchResult::bare(FetchStatus::DnsFailure, domain);
        result.error_message = Some(format!("Could not resolve host {domain}"));
        return Attempt::Done(result);
    }
    let mut result = FetchResult::bare(FetchStatus::Error, domain);
    result.error_message = Some(e.to_string());
    Attempt::Retry(result)
}

/// Walk the error source chain looking for a resolver failure.
///
/// reqwest does not expose DNS failures as a distinct kind, but the resolver
/// error text is stable across platforms ("dns error" from hyper, plus the
/// libc message).
fn is_dns_error(err: &reqwest::Error) -> bool {
    if !err.is_connect() {
        return false;
    }
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        let msg = inner.to_string().to_lowercase();
        if msg.contains("dns error")
            || msg.contains("failed to lookup address")
            || msg.contains("name or service not known")
            || msg.contains("nodename nor servname provided")
        {
            return true;
        }
        source = std::error::Error::source(inner);
    }
    false
}

/// Delay before retry attempt `n` (1-based): `base * 2^(n-1)` plus uniform
/// jitter in `[0, base)`.
fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    let exp = base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
    let jitter = base.mul_f64(rand::random::<f64>());
    exp + jitter
}

/// Lowercase all response header names into an ordered map.
fn lowercase_headers(response: &Response) -> BTreeMap<String, String> {
    response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

/// Parse a `Retry-After` header value: delta-seconds or HTTP-date.
fn parse_retry_after(value: &str) -> Option<Duration> {
    let trimmed = value.trim();
    if let Ok(secs) = trimmed.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let when = parse_http_date(trimmed)?;
    (when - Utc::now()).to_std().ok()
}

/// Parse an RFC 1123 / RFC 2822 HTTP date.
fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Identify the blocking vendor from 403 response fingerprints.
fn detect_waf(headers: &BTreeMap<String, String>, body: &str) -> Option<String> {
    let server = headers.get("server").map(String::as_str).unwrap_or("");

    if headers.contains_key("cf-ray")
        || server.eq_ignore_ascii_case("cloudflare")
        || body.contains("cf-browser-verification")
        || body.contains("challenge-platform")
        || body.contains("Attention Required! | Cloudflare")
    {
        return Some("Blocked by Cloudflare".to_string());
    }

    if server.eq_ignore_ascii_case("CloudFront")
        || headers.contains_key("x-amz-cf-id")
        || headers.contains_key("x-amzn-waf-action")
    {
        return Some("Blocked by AWS CloudFront/WAF".to_string());
    }

    if server.eq_ignore_ascii_case("AkamaiGHost") || headers.contains_key("x-akamai-transformed") {
        return Some("Blocked by Akamai".to_string());
    }

    None
}
