use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::USER_AGENT;
use std::time::Duration;
use thiserror::Error;

/// Upper bound for one whole request: connect, headers and body.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

const MAX_BODY_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Some news sites reject the default client identifier outright.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.3";

/// Errors that can occur while retrieving a feed or an article page.
///
/// No retries happen at this layer; the ingestion scheduler decides
/// whether and when to try again.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URL could not be parsed or is not http(s)
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// Network-level error (DNS, connection, TLS, body read)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the 60-second bound
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
}

/// Build the HTTP client shared by the scheduler and the enrichment worker.
pub fn build_client() -> Result<reqwest::Client, FetchError> {
    let client = reqwest::Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .timeout(FETCH_TIMEOUT)
        .build()?;
    Ok(client)
}

/// Retrieve the raw body at `url`.
///
/// The whole exchange is bounded by [`FETCH_TIMEOUT`]. Any non-2xx status,
/// transport error or body read error is returned as a [`FetchError`].
pub async fn fetch(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, FetchError> {
    fetch_with_timeout(client, url, FETCH_TIMEOUT).await
}

/// Where the ingestion scheduler gets the raw feed body from.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn pull(&self) -> Result<Vec<u8>, FetchError>;

    /// Shown in logs.
    fn location(&self) -> &str;
}

/// A feed served over HTTP, retrieved with [`fetch`].
pub struct HttpFeedSource {
    client: reqwest::Client,
    url: String,
}

impl HttpFeedSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn pull(&self) -> Result<Vec<u8>, FetchError> {
        fetch(&self.client, &self.url).await
    }

    fn location(&self) -> &str {
        &self.url
    }
}

pub(crate) async fn fetch_with_timeout(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<Vec<u8>, FetchError> {
    let parsed = url::Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(FetchError::InvalidUrl(format!(
                "unsupported scheme: {scheme}"
            )))
        }
    }

    tokio::time::timeout(timeout, send_and_read(client, parsed))
        .await
        .map_err(|_| FetchError::Timeout)?
}

async fn send_and_read(client: &reqwest::Client, url: url::Url) -> Result<Vec<u8>, FetchError> {
    let response = client
        .get(url)
        .header(USER_AGENT, BROWSER_USER_AGENT)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    read_limited_bytes(response, MAX_BODY_SIZE).await
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_success_sends_browser_agent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<rss></rss>"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let body = fetch(&client, &format!("{}/feed", mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(body, b"<rss></rss>");

        // header() matchers split on commas, and the agent string has one
        let requests = mock_server.received_requests().await.unwrap();
        let agents: Vec<_> = requests[0]
            .headers
            .get_all("user-agent")
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(agents, vec![BROWSER_USER_AGENT.to_string()]);
    }

    #[tokio::test]
    async fn test_fetch_404_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        match fetch(&client, &format!("{}/feed", mock_server.uri())).await {
            Err(FetchError::HttpStatus(404)) => {}
            other => panic!("Expected HttpStatus(404), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_500_is_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result = fetch(&client, &format!("{}/feed", mock_server.uri())).await;
        assert!(matches!(result, Err(FetchError::HttpStatus(500))));
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result = fetch_with_timeout(
            &client,
            &format!("{}/feed", mock_server.uri()),
            Duration::from_millis(100),
        )
        .await;
        assert!(matches!(result, Err(FetchError::Timeout)));
    }

    #[tokio::test]
    async fn test_invalid_urls_rejected() {
        let client = reqwest::Client::new();
        assert!(matches!(
            fetch(&client, "").await,
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(matches!(
            fetch(&client, "error").await,
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(matches!(
            fetch(&client, "file:///etc/passwd").await,
            Err(FetchError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let client = reqwest::Client::new();
        let result = fetch(&client, "http://127.0.0.1:1/invalid").await;
        assert!(matches!(result, Err(FetchError::Network(_))));
    }
}
