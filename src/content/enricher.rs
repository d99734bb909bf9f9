use async_trait::async_trait;

use super::extractor::{Enrichment, ExtractorRegistry};
use crate::feed::{fetch, FetchError};

/// Produces enrichment fields for the page at a link.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, link: &str) -> Result<Enrichment, FetchError>;
}

/// Fetches the linked page over HTTP and runs the extractor registry on it.
///
/// The page fetch is independent of the feed fetch but uses the same
/// timeout and identification header.
#[derive(Debug, Clone)]
pub struct HttpEnricher {
    client: reqwest::Client,
    registry: ExtractorRegistry,
}

impl HttpEnricher {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_registry(client, ExtractorRegistry::default())
    }

    pub fn with_registry(client: reqwest::Client, registry: ExtractorRegistry) -> Self {
        Self { client, registry }
    }
}

#[async_trait]
impl Enricher for HttpEnricher {
    async fn enrich(&self, link: &str) -> Result<Enrichment, FetchError> {
        let body = fetch(&self.client, link).await?;
        // Pages are not always valid UTF-8; the patterns only need ASCII markup
        let html = String::from_utf8_lossy(&body);
        Ok(self.registry.extract(&html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{DESCRIPTION, IMAGE};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_enrich_from_page() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/article"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><head>
                <meta name="description" content="What happened today">
                <meta property="og:image" content="https://img.example.com/today.jpg">
                </head></html>"#,
            ))
            .mount(&mock_server)
            .await;

        let enricher = HttpEnricher::new(reqwest::Client::new());
        let fields = enricher
            .enrich(&format!("{}/article", mock_server.uri()))
            .await
            .unwrap();

        assert_eq!(fields.get(DESCRIPTION).map(String::as_str), Some("What happened today"));
        assert_eq!(
            fields.get(IMAGE).map(String::as_str),
            Some("https://img.example.com/today.jpg")
        );
    }

    #[tokio::test]
    async fn test_enrich_page_without_meta_is_empty() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xff, 0xfe, b'<', b'p']))
            .mount(&mock_server)
            .await;

        let enricher = HttpEnricher::new(reqwest::Client::new());
        let fields = enricher.enrich(&mock_server.uri()).await.unwrap();
        assert!(fields.is_empty());
    }

    #[tokio::test]
    async fn test_enrich_http_error_is_reported() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let enricher = HttpEnricher::new(reqwest::Client::new());
        let result = enricher.enrich(&mock_server.uri()).await;
        assert!(matches!(result, Err(FetchError::HttpStatus(503))));
    }
}
