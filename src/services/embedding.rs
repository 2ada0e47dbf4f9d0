//! Embedding provider for turning record text into vectors.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{AppError, ConfigError, EmbeddingError};
use crate::models::{EmbeddingConfig, OPENAI_API_KEY_ENV};
use crate::utils::retry::{RetryConfig, RetryResult, with_retry};

/// Converts text into a fixed-length vector.
///
/// Implementations own their retry policy; a returned error is final for
/// that text.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Model identifier sent with each request.
    fn model(&self) -> &str;

    /// Dimensionality of the vectors this provider produces.
    fn dimension(&self) -> usize;
}

/// Request body for the /embeddings endpoint.
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    input: &'a str,
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

/// Response from the /embeddings endpoint.
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// Client for OpenAI-compatible embedding endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimension: usize,
    send_dimensions: bool,
    retry: RetryConfig,
}

impl OpenAiEmbedder {
    /// Create a new embedder with the given configuration.
    pub fn new(config: &EmbeddingConfig) -> Result<Self, AppError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingCredentials(OPENAI_API_KEY_ENV))?;

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|_| {
            ConfigError::ValidationError("embedding API key is not a valid header".to_string())
        })?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| EmbeddingError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.url.trim_end_matches('/')),
            model: config.model.clone(),
            dimension: config.dimension as usize,
            send_dimensions: config.send_dimensions,
            retry: RetryConfig::from(&config.retry),
        })
    }

    /// Get the full embeddings endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// One HTTP round trip, classified into the error taxonomy.
    async fn embed_once(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let request = EmbedRequest {
            input: text,
            model: &self.model,
            dimensions: self.send_dimensions.then_some(self.dimension),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(EmbeddingError::RateLimited {
                attempts: 1,
                retry_after: parse_retry_after(response.headers()),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("status {}: {}", status, body);
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    EmbeddingError::Unauthorized(message)
                }
                _ => EmbeddingError::ProviderError(message),
            });
        }

        let parsed: EmbedResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                EmbeddingError::Timeout { attempts: 1 }
            } else {
                EmbeddingError::InvalidResponse(e.to_string())
            }
        })?;

        parsed
            .data
            .into_iter()
            .min_by_key(|d| d.index)
            .map(|d| d.embedding)
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding response".to_string()))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        debug!(model = %self.model, chars = text.len(), "requesting embedding");
        match with_retry(&self.retry, || self.embed_once(text)).await {
            RetryResult::Success(vector) => Ok(vector),
            RetryResult::Failed {
                last_error,
                attempts,
            } => Err(last_error.with_attempts(attempts)),
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn classify_transport_error(e: reqwest::Error) -> EmbeddingError {
    if e.is_timeout() {
        EmbeddingError::Timeout { attempts: 1 }
    } else if e.is_connect() {
        EmbeddingError::ConnectionError(e.to_string())
    } else {
        EmbeddingError::ProviderError(e.to_string())
    }
}

/// Read `retry-after-ms` or `Retry-After` (delta seconds). HTTP dates are ignored.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let parse = |name: &str| -> Option<f64> {
        headers
            .get(name)?
            .to_str()
            .ok()?
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
    };

    // Out-of-range values are dropped rather than trusted.
    if let Some(ms) = parse("retry-after-ms") {
        return Duration::try_from_secs_f64(ms / 1000.0).ok();
    }
    parse("retry-after").and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RetrySettings;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(url: &str) -> EmbeddingConfig {
        EmbeddingConfig {
            url: url.to_string(),
            dimension: 3,
            api_key: Some("test-key".to_string()),
            retry: RetrySettings {
                max_retries: 3,
                base_delay_ms: 10,
                max_delay_ms: 100,
                honor_retry_after: true,
            },
            ..Default::default()
        }
    }

    fn embedding_body() -> serde_json::Value {
        json!({
            "object": "list",
            "data": [{"object": "embedding", "index": 0, "embedding": [0.1, 0.2, 0.3]}],
            "model": "text-embedding-3-small"
        })
    }

    #[test]
    fn test_missing_api_key() {
        let config = EmbeddingConfig::default();
        let err = OpenAiEmbedder::new(&config).unwrap_err();
        assert!(matches!(
            err,
            AppError::Config(ConfigError::MissingCredentials(OPENAI_API_KEY_ENV))
        ));
    }

    #[test]
    fn test_endpoint_trimming() {
        let embedder = OpenAiEmbedder::new(&test_config("https://api.openai.com/v1/")).unwrap();
        assert_eq!(embedder.endpoint(), "https://api.openai.com/v1/embeddings");
        assert_eq!(embedder.dimension(), 3);
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert("retry-after", HeaderValue::from_static("2"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(2)));

        headers.insert("retry-after-ms", HeaderValue::from_static("250"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_millis(250)));

        let mut headers = HeaderMap::new();
        headers.insert(
            "retry-after",
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_parse_retry_after_out_of_range() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("1e20"));
        assert_eq!(parse_retry_after(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert("retry-after-ms", HeaderValue::from_static("1e300"));
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert("retry-after", HeaderValue::from_static("inf"));
        headers.remove("retry-after-ms");
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[tokio::test]
    async fn test_embed_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "input": "Nausea and vomiting in early pregnancy.",
                "model": "text-embedding-3-small"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body()))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new(&test_config(&server.uri())).unwrap();
        let vector = embedder
            .embed("Nausea and vomiting in early pregnancy.")
            .await
            .unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_embed_recovers_from_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after-ms", "5"))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body()))
            .with_priority(2)
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new(&test_config(&server.uri())).unwrap();
        let vector = embedder.embed("Feeling tired").await.unwrap();
        assert_eq!(vector.len(), 3);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 3);
    }

    #[tokio::test]
    async fn test_embed_rate_limit_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new(&test_config(&server.uri())).unwrap();
        let err = embedder.embed("Feeling tired").await.unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::RateLimited { attempts: 4, .. }
        ));

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 4);
    }

    #[tokio::test]
    async fn test_embed_server_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new(&test_config(&server.uri())).unwrap();
        let err = embedder.embed("Headache").await.unwrap_err();
        match err {
            EmbeddingError::ProviderError(msg) => assert!(msg.contains("upstream exploded")),
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_embed_unauthorized_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new(&test_config(&server.uri())).unwrap();
        let err = embedder.embed("Headache").await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_embed_empty_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new(&test_config(&server.uri())).unwrap();
        let err = embedder.embed("Headache").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_embed_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(embedding_body())
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let mut config = test_config(&server.uri());
        config.timeout_secs = 1;
        config.retry.max_retries = 0;
        let embedder = OpenAiEmbedder::new(&config).unwrap();
        let err = embedder.embed("Headache").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Timeout { attempts: 1 }));
    }

    #[tokio::test]
    async fn test_embed_timeout_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(embedding_body())
                    .set_delay(Duration::from_secs(3)),
            )
            .expect(2)
            .mount(&server)
            .await;

        let mut config = test_config(&server.uri());
        config.timeout_secs = 1;
        config.retry.max_retries = 1;
        let embedder = OpenAiEmbedder::new(&config).unwrap();
        let err = embedder.embed("Headache").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Timeout { attempts: 2 }));

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
    }
}
