//! Remote document retrieval: "bytes by id" and "metadata by id".

use base64::Engine as _;
use chrono::{DateTime, Utc};
use doc_model::DocumentId;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetrievalError {
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("server responded with status {0}")]
    Status(u16),
    #[error("document service error: {0}")]
    Service(String),
    #[error("no remote document source configured")]
    NotConfigured,
}

impl RetrievalError {
    /// Transport failures and overload responses are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            RetrievalError::Network(_) => true,
            RetrievalError::Status(status) => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMetadata {
    pub name: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
}

/// Where document bytes and metadata come from.
pub trait DocumentSource: Send + Sync {
    fn fetch_bytes(&self, id: &DocumentId) -> BoxFuture<'static, Result<Vec<u8>, RetrievalError>>;

    fn fetch_metadata(
        &self,
        id: &DocumentId,
    ) -> BoxFuture<'static, Result<RemoteMetadata, RetrievalError>>;
}

/// Stand-in used when no remote URL is configured; every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineSource;

impl DocumentSource for OfflineSource {
    fn fetch_bytes(&self, _id: &DocumentId) -> BoxFuture<'static, Result<Vec<u8>, RetrievalError>> {
        futures::future::ready(Err(RetrievalError::NotConfigured)).boxed()
    }

    fn fetch_metadata(
        &self,
        _id: &DocumentId,
    ) -> BoxFuture<'static, Result<RemoteMetadata, RetrievalError>> {
        futures::future::ready(Err(RetrievalError::NotConfigured)).boxed()
    }
}

/// JSON-over-HTTP document service: `GET <base>?action=pdf&fileId=<id>` and
/// `GET <base>?action=metadata&fileId=<id>`.
#[derive(Debug, Clone)]
pub struct HttpSource {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .user_agent(concat!("pdf-markup/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { base_url: base_url.into(), agent }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(
        &self,
        action: &'static str,
        id: &DocumentId,
    ) -> BoxFuture<'static, Result<String, RetrievalError>> {
        let agent = self.agent.clone();
        let url = self.base_url.clone();
        let id = id.clone();
        async move {
            tokio::task::spawn_blocking(move || {
                log::debug!("GET {url} action={action} fileId={id}");
                let response = agent
                    .get(&url)
                    .query("action", action)
                    .query("fileId", id.as_str())
                    .set("Accept", "application/json")
                    .call()
                    .map_err(|err| match err {
                        ureq::Error::Status(status, _) => RetrievalError::Status(status),
                        ureq::Error::Transport(transport) => {
                            RetrievalError::Network(transport.to_string())
                        }
                    })?;
                response.into_string().map_err(|err| RetrievalError::Network(err.to_string()))
            })
            .await
            .map_err(|err| RetrievalError::Network(format!("request task failed: {err}")))?
        }
        .boxed()
    }
}

impl DocumentSource for HttpSource {
    fn fetch_bytes(&self, id: &DocumentId) -> BoxFuture<'static, Result<Vec<u8>, RetrievalError>> {
        let body = self.get("pdf", id);
        async move { parse_bytes_response(&body.await?) }.boxed()
    }

    fn fetch_metadata(
        &self,
        id: &DocumentId,
    ) -> BoxFuture<'static, Result<RemoteMetadata, RetrievalError>> {
        let body = self.get("metadata", id);
        async move { parse_metadata_response(&body.await?) }.boxed()
    }
}

#[derive(Debug, Deserialize)]
struct BytesResponse {
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    modified_time: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn service_error(error: Option<String>) -> Result<(), RetrievalError> {
    match error {
        Some(message) if !message.trim().is_empty() => Err(RetrievalError::Service(message)),
        _ => Ok(()),
    }
}

pub fn parse_bytes_response(body: &str) -> Result<Vec<u8>, RetrievalError> {
    let response: BytesResponse = serde_json::from_str(body)
        .map_err(|err| RetrievalError::InvalidResponse(err.to_string()))?;
    service_error(response.error)?;

    let data = response
        .data
        .ok_or_else(|| RetrievalError::InvalidResponse("missing `data` field".to_owned()))?;
    base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|err| RetrievalError::InvalidResponse(format!("bad base64 payload: {err}")))
}

pub fn parse_metadata_response(body: &str) -> Result<RemoteMetadata, RetrievalError> {
    let response: MetadataResponse = serde_json::from_str(body)
        .map_err(|err| RetrievalError::InvalidResponse(err.to_string()))?;
    service_error(response.error)?;

    let modified_at = response
        .modified_time
        .map(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|time| time.with_timezone(&Utc))
                .map_err(|err| RetrievalError::InvalidResponse(format!("modifiedTime: {err}")))
        })
        .transpose()?;

    Ok(RemoteMetadata { name: response.name.filter(|name| !name.is_empty()), modified_at })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn bytes_response_decodes_base64_payload() {
        let bytes = parse_bytes_response(r#"{"data":"JVBERi0xLjQ="}"#).expect("should decode");
        assert_eq!(bytes, b"%PDF-1.4");
    }

    #[test]
    fn bytes_response_surfaces_service_error() {
        let err = parse_bytes_response(r#"{"error":"file not found"}"#).expect_err("error field");
        assert_eq!(err, RetrievalError::Service("file not found".to_owned()));
        assert!(!err.is_retryable());
    }

    #[test]
    fn bytes_response_rejects_missing_or_malformed_data() {
        assert!(matches!(parse_bytes_response("{}"), Err(RetrievalError::InvalidResponse(_))));
        assert!(matches!(
            parse_bytes_response(r#"{"data":"not base64!"}"#),
            Err(RetrievalError::InvalidResponse(_))
        ));
        assert!(matches!(parse_bytes_response("<html>"), Err(RetrievalError::InvalidResponse(_))));
    }

    #[test]
    fn empty_error_field_is_not_a_failure() {
        let bytes = parse_bytes_response(r#"{"data":"QUI=","error":""}"#).expect("should decode");
        assert_eq!(bytes, b"AB");
    }

    #[test]
    fn metadata_response_parses_rfc3339_time() {
        let metadata = parse_metadata_response(
            r#"{"name":"Floor plan.pdf","modifiedTime":"2024-03-01T09:30:00.000+09:00"}"#,
        )
        .expect("should parse");

        assert_eq!(metadata.name.as_deref(), Some("Floor plan.pdf"));
        assert_eq!(
            metadata.modified_at,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 30, 0).unwrap())
        );
    }

    #[test]
    fn metadata_fields_are_optional() {
        let metadata = parse_metadata_response(r#"{"name":""}"#).expect("should parse");
        assert_eq!(metadata, RemoteMetadata { name: None, modified_at: None });

        let err = parse_metadata_response(r#"{"modifiedTime":"yesterday"}"#)
            .expect_err("bad timestamp should fail");
        assert!(matches!(err, RetrievalError::InvalidResponse(_)));
    }

    #[test]
    fn retryable_errors() {
        assert!(RetrievalError::Network("reset".to_owned()).is_retryable());
        assert!(RetrievalError::Status(503).is_retryable());
        assert!(RetrievalError::Status(429).is_retryable());
        assert!(!RetrievalError::Status(404).is_retryable());
        assert!(!RetrievalError::NotConfigured.is_retryable());
    }

    #[tokio::test]
    async fn offline_source_reports_not_configured() {
        let id = DocumentId::new("abc").expect("valid id");
        let err = OfflineSource.fetch_bytes(&id).await.expect_err("offline");
        assert_eq!(err, RetrievalError::NotConfigured);
    }
}
