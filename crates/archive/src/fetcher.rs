// ABOUTME: HTTP fetching with retry and jittered exponential backoff behind the Fetcher trait.
// ABOUTME: Responses keep status, headers and the sent request headers for the capture sink.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER, USER_AGENT};
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::error::ArchiveError;
use crate::options::Options;

/// Statuses retried by [`HttpFetcher`] before giving up.
pub const RETRY_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

/// Result of a successful GET.
#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    pub status: u16,
    pub url: String,
    pub final_url: String,
    pub content_type: Option<String>,
    /// Response headers in arrival order.
    pub headers: Vec<(String, String)>,
    /// Headers sent with the final request attempt.
    pub request_headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl FetchResponse {
    /// First response header with the given (case-insensitive) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Decode the body as UTF-8 text, using charset hints from the content-type header.
    pub fn text_utf8(&self) -> String {
        decode_body(&self.body, self.content_type.as_deref())
    }
}

/// Reliable GET/HEAD used by every stage of the pipeline.
///
/// Implementations retry transient failures themselves; callers see success or a terminal error.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url` with extra request headers. Non-2xx statuses are errors.
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<FetchResponse, ArchiveError>;

    /// Single HEAD request returning the status code.
    async fn head(&self, url: &str) -> Result<u16, ArchiveError>;
}

/// reqwest-backed [`Fetcher`].
pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: String,
    headers: HashMap<String, String>,
    max_retries: u32,
    backoff_base: Duration,
}

impl HttpFetcher {
    pub fn new(opts: &Options) -> Self {
        let client = opts.http_client.clone().unwrap_or_else(|| {
            reqwest::Client::builder()
                .user_agent(&opts.user_agent)
                .timeout(opts.timeout)
                .gzip(true)
                .brotli(true)
                .deflate(true)
                .build()
                .expect("failed to build HTTP client")
        });

        Self {
            client,
            user_agent: opts.user_agent.clone(),
            headers: opts.headers.clone(),
            max_retries: opts.max_retries,
            backoff_base: opts.backoff_base,
        }
    }

    fn request_headers(&self, extra: &[(String, String)]) -> Vec<(String, String)> {
        let mut headers = vec![(USER_AGENT.as_str().to_string(), self.user_agent.clone())];
        for (k, v) in self.headers.iter().chain(extra.iter().map(|(k, v)| (k, v))) {
            match headers.iter_mut().find(|(name, _)| name.eq_ignore_ascii_case(k)) {
                Some(existing) => existing.1 = v.clone(),
                None => headers.push((k.clone(), v.clone())),
            }
        }
        headers
    }

    fn backoff(&self, attempt: u32) -> Duration {
        backoff_delay(self.backoff_base, attempt)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<FetchResponse, ArchiveError> {
        let parsed = url::Url::parse(url).map_err(|e| {
            ArchiveError::invalid_url(url, "Fetch", Some(anyhow::anyhow!("invalid URL: {}", e)))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ArchiveError::invalid_url(
                url,
                "Fetch",
                Some(anyhow::anyhow!("scheme must be http or https")),
            ));
        }

        let sent = self.request_headers(headers);
        let mut attempt: u32 = 0;
        loop {
            let mut request = self.client.get(parsed.clone());
            for (key, value) in &sent {
                request = request.header(key.as_str(), value.as_str());
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    let transient = e.is_connect() || e.is_timeout();
                    if transient && attempt < self.max_retries {
                        let delay = self.backoff(attempt);
                        warn!(url, attempt, ?delay, error = %e, "request failed, retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(if e.is_timeout() {
                        ArchiveError::timeout(url, "Fetch", Some(anyhow::Error::new(e)))
                    } else {
                        ArchiveError::fetch(url, "Fetch", Some(anyhow::Error::new(e)))
                    });
                }
            };

            let status = response.status();
            if RETRY_STATUSES.contains(&status.as_u16()) && attempt < self.max_retries {
                let delay =
                    parse_retry_after(response.headers()).unwrap_or_else(|| self.backoff(attempt));
                warn!(url, status = status.as_u16(), attempt, ?delay, "transient status, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }
            if !status.is_success() {
                return Err(ArchiveError::status(url, "Fetch", status.as_u16()));
            }

            let final_url = response.url().to_string();
            let response_headers: Vec<(String, String)> = response
                .headers()
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
                .collect();
            let content_type = response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_lowercase());

            let body = response.bytes().await.map_err(|e| {
                ArchiveError::fetch(
                    url,
                    "Fetch",
                    Some(anyhow::anyhow!("failed to read body: {}", e)),
                )
            })?;
            debug!(url, status = status.as_u16(), bytes = body.len(), "fetched");

            return Ok(FetchResponse {
                status: status.as_u16(),
                url: url.to_string(),
                final_url,
                content_type,
                headers: response_headers,
                request_headers: sent,
                body,
            });
        }
    }

    async fn head(&self, url: &str) -> Result<u16, ArchiveError> {
        let mut request = self.client.head(url);
        for (key, value) in self.request_headers(&[]) {
            request = request.header(key, value);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ArchiveError::fetch(url, "Head", Some(anyhow::Error::new(e))))?;
        Ok(response.status().as_u16())
    }
}

/// `base * 2^attempt` plus up to `base` of random jitter.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponential = base.saturating_mul(2u32.saturating_pow(attempt.min(16)));
    let jitter_ms = base.as_millis().min(u128::from(u64::MAX)) as u64;
    let jitter = if jitter_ms == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    };
    exponential + jitter
}

/// Numeric `Retry-After` in seconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Reason phrase for a status line, `Unknown` for unregistered codes.
pub fn reason_phrase(status: u16) -> &'static str {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown")
}

/// Decode body bytes to a String using charset from content-type header or detection.
pub fn decode_body(body: &[u8], content_type: Option<&str>) -> String {
    if let Some(ct) = content_type {
        if let Some(charset) = extract_charset(ct) {
            if let Some(encoding) = encoding_rs::Encoding::for_label(charset.as_bytes()) {
                let (decoded, _, _) = encoding.decode(body);
                return decoded.into_owned();
            }
        }
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(body, true);
    let encoding = detector.guess(None, true);
    let (decoded, _, _) = encoding.decode(body);
    decoded.into_owned()
}

fn extract_charset(content_type: &str) -> Option<String> {
    content_type
        .to_lowercase()
        .split(';')
        .find_map(|part| part.trim().strip_prefix("charset=").map(str::to_string))
        .map(|c| c.trim_matches(|ch| ch == '"' || ch == '\'').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use httpmock::Method::HEAD;

    fn fetcher(retries: u32) -> HttpFetcher {
        let opts = Options {
            max_retries: retries,
            backoff_base: Duration::from_millis(1),
            user_agent: "rssdump-test".to_string(),
            ..Options::default()
        };
        HttpFetcher::new(&opts)
    }

    #[tokio::test]
    async fn get_sends_user_agent_and_referer() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/a.png")
                .header("user-agent", "rssdump-test")
                .header("referer", "https://example.com/post");
            then.status(200).header("content-type", "image/png").body("png");
        });

        let resp = fetcher(0)
            .get(
                &server.url("/a.png"),
                &[("Referer".to_string(), "https://example.com/post".to_string())],
            )
            .await
            .unwrap();

        mock.assert();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body.as_ref(), b"png");
        assert_eq!(resp.header("Content-Type"), Some("image/png"));
        assert!(resp
            .request_headers
            .iter()
            .any(|(k, v)| k == "Referer" && v == "https://example.com/post"));
    }

    #[tokio::test]
    async fn retries_transient_status_then_fails() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/busy");
            then.status(503);
        });

        let err = fetcher(2).get(&server.url("/busy"), &[]).await.unwrap_err();

        assert_eq!(mock.hits(), 3);
        assert!(err.is_status());
        assert_eq!(err.status, Some(503));
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/gone");
            then.status(404);
        });

        let err = fetcher(3).get(&server.url("/gone"), &[]).await.unwrap_err();

        assert_eq!(mock.hits(), 1);
        assert_eq!(err.status, Some(404));
    }

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        let err = fetcher(0).get("ftp://example.com/a", &[]).await.unwrap_err();
        assert!(err.is_invalid_url());
    }

    #[tokio::test]
    async fn head_reports_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(HEAD).path("/favicon.ico");
            then.status(200);
        });
        assert_eq!(fetcher(0).head(&server.url("/favicon.ico")).await.unwrap(), 200);
        assert_eq!(fetcher(0).head(&server.url("/missing")).await.unwrap(), 404);
    }

    #[test]
    fn backoff_grows_with_bounded_jitter() {
        let base = Duration::from_millis(100);
        for attempt in 0..4 {
            let d = backoff_delay(base, attempt);
            let floor = base * 2u32.pow(attempt);
            assert!(d >= floor && d <= floor + base, "attempt {}: {:?}", attempt, d);
        }
    }

    #[test]
    fn decodes_declared_charset() {
        let body = b"caf\xe9";
        assert_eq!(decode_body(body, Some("text/html; charset=iso-8859-1")), "café");
        assert_eq!(decode_body("héllo".as_bytes(), Some("text/html")), "héllo");
    }
}
