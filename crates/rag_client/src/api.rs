//! HTTP wrappers for the RAG service endpoints: health, collection stats,
//! document listing/deletion, file ingestion, and the streamed query request.

use serde::{Deserialize, Serialize};
use std::path::Path;

const ALLOWED_EXTENSIONS: [&str; 3] = ["pdf", "txt", "md"];

/// Transport error: connection failure, non-success status, or a response
/// body that did not decode. Reported to the user, never fatal.
#[derive(Debug)]
pub struct ClientError(pub String);

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError(e.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError(e.to_string())
    }
}

impl From<String> for ClientError {
    fn from(s: String) -> Self {
        ClientError(s)
    }
}

/// `GET /health` response.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub vectorstore_status: String,
    pub version: String,
    #[serde(default)]
    pub document_count: u64,
}

/// `GET /collection/stats` response.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionStats {
    pub document_count: u64,
    pub name: String,
}

/// One entry of `GET /collection/documents`.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentEntry {
    pub name: String,
    pub page_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct DocumentList {
    #[serde(default)]
    documents: Vec<DocumentEntry>,
}

/// `DELETE /collection/document/{name}` response.
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteOutcome {
    pub status: String,
    #[serde(default)]
    pub chunks_deleted: u64,
    #[serde(default)]
    pub message: Option<String>,
}

/// `POST /ingest/file` response.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestOutcome {
    pub status: String,
    #[serde(default)]
    pub chunks_added: u64,
    #[serde(default)]
    pub error: Option<String>,
}

/// `POST /query/stream` request body.
#[derive(Debug, Clone, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    include_sources: bool,
}

/// Client for one RAG service instance.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<HealthReport, ClientError> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        Ok(Self::expect_success(response)?.json().await?)
    }

    pub async fn collection_stats(&self) -> Result<CollectionStats, ClientError> {
        let response = self
            .http
            .get(format!("{}/collection/stats", self.base_url))
            .send()
            .await?;
        Ok(Self::expect_success(response)?.json().await?)
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentEntry>, ClientError> {
        let response = self
            .http
            .get(format!("{}/collection/documents", self.base_url))
            .send()
            .await?;
        let list: DocumentList = Self::expect_success(response)?.json().await?;
        Ok(list.documents)
    }

    /// Delete one ingested document by name (percent-encoded path segment).
    pub async fn delete_document(&self, name: &str) -> Result<DeleteOutcome, ClientError> {
        let response = self
            .http
            .delete(format!(
                "{}/collection/document/{}",
                self.base_url,
                urlencoding::encode(name)
            ))
            .send()
            .await?;
        Ok(Self::expect_success(response)?.json().await?)
    }

    /// Upload one document as a multipart `file` field. Only `.pdf`, `.txt`,
    /// and `.md` files are accepted by the service.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestOutcome, ClientError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(ClientError(format!(
                "unsupported file type '.{}' (allowed: .pdf, .txt, .md)",
                extension
            )));
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let bytes = tokio::fs::read(path).await?;
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(format!("{}/ingest/file", self.base_url))
            .multipart(form)
            .send()
            .await?;
        Ok(Self::expect_success(response)?.json().await?)
    }

    /// Open the streamed query request. The response status is left to the
    /// caller, which drives the body as a line stream.
    pub async fn open_query_stream(&self, query: &str) -> Result<reqwest::Response, ClientError> {
        let body = QueryRequest {
            query,
            include_sources: true,
        };
        Ok(self
            .http
            .post(format!("{}/query/stream", self.base_url))
            .json(&body)
            .send()
            .await?)
    }

    fn expect_success(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(ClientError(format!("HTTP {}", response.status())))
        }
    }
}
