//! Pinecone data-plane backend over REST.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::debug;

use super::{IndexInfo, VectorIndex, check_dimensions};
use crate::error::{AppError, ConfigError, VectorIndexError};
use crate::models::{IndexConfig, PINECONE_API_KEY_ENV, PINECONE_INDEX_HOST_ENV, UpsertEntry};

const API_VERSION: &str = "2024-07";

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<PineconeVector<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct PineconeVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct DescribeRequest {}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeResponse {
    #[serde(default)]
    dimension: Option<usize>,
    #[serde(default)]
    total_vector_count: u64,
    #[serde(default)]
    namespaces: HashMap<String, NamespaceSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceSummary {
    #[serde(default)]
    vector_count: u64,
}

/// Pinecone index backend.
#[derive(Debug, Clone)]
pub struct PineconeBackend {
    client: Client,
    host: String,
    name: String,
    namespace: Option<String>,
    dimension: usize,
}

impl PineconeBackend {
    /// Create a new Pinecone backend for the index host in `config.url`.
    pub fn new(config: &IndexConfig, dimension: usize) -> Result<Self, AppError> {
        let host = config.effective_url();
        if host.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "Pinecone index host is not set: set index.url or {}",
                PINECONE_INDEX_HOST_ENV
            ))
            .into());
        }

        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingCredentials(PINECONE_API_KEY_ENV))?;

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(api_key).map_err(|_| {
            ConfigError::ValidationError("Pinecone API key is not a valid header".to_string())
        })?;
        headers.insert("api-key", key);
        headers.insert(
            "x-pinecone-api-version",
            HeaderValue::from_static(API_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| VectorIndexError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            host: normalize_host(host),
            name: config.name.clone(),
            namespace: config.namespace.clone().filter(|ns| !ns.is_empty()),
            dimension,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Transport failures other than connect errors are reported through `on_error`.
    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
        on_error: fn(String) -> VectorIndexError,
    ) -> Result<Response, VectorIndexError> {
        let url = format!("{}{}", self.host, path);
        self.client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    VectorIndexError::ConnectionError(e.to_string())
                } else if e.is_timeout() {
                    on_error(format!("request to {} timed out", path))
                } else {
                    on_error(e.to_string())
                }
            })
    }
}

fn normalize_host(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

/// Map a non-success response onto the error taxonomy.
async fn classify_failure(
    response: Response,
    fallback: fn(String) -> VectorIndexError,
) -> VectorIndexError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = format!("status {}: {}", status, body);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => VectorIndexError::Unauthorized(message),
        StatusCode::BAD_REQUEST if body.to_lowercase().contains("dimension") => {
            match parse_dimension_message(&body) {
                Some((actual, expected)) => {
                    VectorIndexError::DimensionMismatch { expected, actual }
                }
                None => fallback(message),
            }
        }
        _ => fallback(message),
    }
}

/// Extract `(actual, expected)` from
/// "Vector dimension 3 does not match the dimension of the index 1536".
fn parse_dimension_message(body: &str) -> Option<(usize, usize)> {
    let lower = body.to_lowercase();
    let numbers: Vec<usize> = lower
        .split("dimension")
        .skip(1)
        .filter_map(|segment| {
            segment
                .split(|c: char| !c.is_ascii_digit())
                .find(|s| !s.is_empty())
                .and_then(|s| s.parse().ok())
        })
        .collect();
    match numbers.as_slice() {
        [actual, expected, ..] => Some((*actual, *expected)),
        _ => None,
    }
}

#[async_trait]
impl VectorIndex for PineconeBackend {
    async fn health_check(&self) -> Result<bool, VectorIndexError> {
        self.describe().await.map(|_| true)
    }

    async fn describe(&self) -> Result<IndexInfo, VectorIndexError> {
        let response = self
            .post(
                "/describe_index_stats",
                &DescribeRequest {},
                VectorIndexError::DescribeError,
            )
            .await?;
        if !response.status().is_success() {
            return Err(classify_failure(response, VectorIndexError::DescribeError).await);
        }

        let stats: DescribeResponse = response
            .json()
            .await
            .map_err(|e| VectorIndexError::DescribeError(e.to_string()))?;

        let vector_count = match &self.namespace {
            Some(ns) => stats.namespaces.get(ns).map_or(0, |s| s.vector_count),
            None => stats.total_vector_count,
        };

        Ok(IndexInfo {
            dimension: stats.dimension,
            vector_count,
        })
    }

    async fn upsert(&self, entries: Vec<UpsertEntry>) -> Result<(), VectorIndexError> {
        if entries.is_empty() {
            return Ok(());
        }
        check_dimensions(self.dimension, &entries)?;

        let request = UpsertRequest {
            vectors: entries
                .iter()
                .map(|e| PineconeVector {
                    id: e.key.as_str(),
                    values: &e.vector,
                    metadata: &e.metadata,
                })
                .collect(),
            namespace: self.namespace.as_deref(),
        };

        debug!(index = %self.name, count = entries.len(), "upserting vectors");
        let response = self
            .post("/vectors/upsert", &request, VectorIndexError::UpsertError)
            .await?;
        if !response.status().is_success() {
            return Err(classify_failure(response, VectorIndexError::UpsertError).await);
        }

        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IndexDriver, StableKey};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(url: &str) -> IndexConfig {
        IndexConfig {
            driver: IndexDriver::Pinecone,
            url: url.to_string(),
            name: "symptoms".to_string(),
            namespace: Some("prenatal".to_string()),
            api_key: Some("pc-test".to_string()),
            ..Default::default()
        }
    }

    fn entry(name: &str) -> UpsertEntry {
        let mut metadata = BTreeMap::new();
        metadata.insert("name".to_string(), name.to_string());
        UpsertEntry {
            key: StableKey::derive(name).unwrap(),
            vector: vec![0.25, 0.5],
            metadata,
        }
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(
            normalize_host("symptoms-abc.svc.pinecone.io/"),
            "https://symptoms-abc.svc.pinecone.io"
        );
        assert_eq!(normalize_host("http://localhost:5080"), "http://localhost:5080");
    }

    #[test]
    fn test_parse_dimension_message() {
        assert_eq!(
            parse_dimension_message(
                r#"{"code":3,"message":"Vector dimension 3 does not match the dimension of the index 1536"}"#
            ),
            Some((3, 1536))
        );
        assert_eq!(parse_dimension_message("dimension mismatch"), None);
    }

    #[tokio::test]
    async fn test_upsert_sends_vectors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/vectors/upsert"))
            .and(header("api-key", "pc-test"))
            .and(body_json(json!({
                "vectors": [{
                    "id": "morning-sickness",
                    "values": [0.25, 0.5],
                    "metadata": {"name": "Morning Sickness"}
                }],
                "namespace": "prenatal"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"upsertedCount": 1})))
            .expect(1)
            .mount(&server)
            .await;

        let backend = PineconeBackend::new(&test_config(&server.uri()), 2).unwrap();
        backend.upsert(vec![entry("Morning Sickness")]).await.unwrap();
    }

    #[tokio::test]
    async fn test_upsert_checks_dimension_before_sending() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let backend = PineconeBackend::new(&test_config(&server.uri()), 1536).unwrap();
        let err = backend.upsert(vec![entry("Fatigue")]).await.unwrap_err();
        assert!(matches!(
            err,
            VectorIndexError::DimensionMismatch {
                expected: 1536,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_upsert_server_dimension_error_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/vectors/upsert"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": 3,
                "message": "Vector dimension 2 does not match the dimension of the index 1536"
            })))
            .mount(&server)
            .await;

        let backend = PineconeBackend::new(&test_config(&server.uri()), 2).unwrap();
        let err = backend.upsert(vec![entry("Fatigue")]).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            VectorIndexError::DimensionMismatch {
                expected: 1536,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_upsert_server_error_is_not_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let backend = PineconeBackend::new(&test_config(&server.uri()), 2).unwrap();
        let err = backend.upsert(vec![entry("Fatigue")]).await.unwrap_err();
        assert!(matches!(err, VectorIndexError::UpsertError(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_describe_and_prepare() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/describe_index_stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "namespaces": {"prenatal": {"vectorCount": 2}, "other": {"vectorCount": 7}},
                "dimension": 1536,
                "indexFullness": 0.0,
                "totalVectorCount": 9
            })))
            .mount(&server)
            .await;

        let backend = PineconeBackend::new(&test_config(&server.uri()), 1536).unwrap();
        let info = backend.describe().await.unwrap();
        assert_eq!(info.dimension, Some(1536));
        assert_eq!(info.vector_count, 2);
        assert!(backend.prepare().await.is_ok());

        let mismatched = PineconeBackend::new(&test_config(&server.uri()), 768).unwrap();
        let err = mismatched.prepare().await.unwrap_err();
        assert!(matches!(
            err,
            VectorIndexError::DimensionMismatch {
                expected: 1536,
                actual: 768
            }
        ));
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let backend = PineconeBackend::new(&test_config(&server.uri()), 2).unwrap();
        assert!(matches!(
            backend.describe().await,
            Err(VectorIndexError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_missing_host_is_rejected() {
        let config = test_config("  ");
        assert!(matches!(
            PineconeBackend::new(&config, 2),
            Err(AppError::Config(ConfigError::ValidationError(_)))
        ));

        let defaults = IndexConfig {
            api_key: Some("pc-test".to_string()),
            ..Default::default()
        };
        assert!(PineconeBackend::new(&defaults, 2).is_err());
    }

    #[tokio::test]
    async fn test_describe_timeout_is_describe_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/describe_index_stats"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"dimension": 2, "totalVectorCount": 0}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let mut config = test_config(&server.uri());
        config.timeout_secs = 1;
        let backend = PineconeBackend::new(&config, 2).unwrap();
        match backend.describe().await {
            Err(VectorIndexError::DescribeError(msg)) => assert!(msg.contains("timed out")),
            other => panic!("expected describe timeout, got {other:?}"),
        }
    }
}
