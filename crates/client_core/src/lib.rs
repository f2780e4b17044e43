use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Body, Client, Response,
};
use shared::{
    domain::{DocumentId, PDF_CONTENT_TYPE},
    error::ServiceErrorBody,
    protocol::{ClassifyResponse, DocumentSummary, ListDocumentsQuery, ListDocumentsResponse},
};
use tracing::{debug, warn};
use url::Url;

pub mod config;
pub mod error;
pub mod gallery;
pub mod intake;
pub mod progress;
pub mod source_file;
pub mod tracker;

pub use config::{load_settings, ClientSettings};
pub use error::ClientError;
pub use gallery::{DeleteOutcome, Gallery, GalleryFilter, Pagination};
pub use intake::{Intake, IntakePolicy, Rejection};
pub use progress::ProgressCallback;
pub use source_file::SourceFile;
pub use tracker::{TrackerNotification, UploadRecord, UploadTracker};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Remote document service: classification, listing and deletion.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    async fn classify(
        &self,
        file: SourceFile,
        progress: ProgressCallback,
    ) -> Result<ClassifyResponse, ClientError>;
    async fn list_documents(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<Vec<DocumentSummary>, ClientError>;
    async fn delete_document(&self, id: &DocumentId) -> Result<(), ClientError>;
}

pub struct HttpDocumentClient {
    http: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl HttpDocumentClient {
    pub fn new(settings: &ClientSettings) -> Result<Self, ClientError> {
        let timeout = settings.request_timeout();
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ClientError::Transport)?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim().to_string(),
            api_key: settings.api_key.trim().to_string(),
            timeout,
        })
    }

    pub fn new_shared(settings: &ClientSettings) -> Result<Arc<dyn DocumentApi>, ClientError> {
        Ok(Arc::new(Self::new(settings)?))
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        if self.base_url.is_empty() {
            return Err(ClientError::MissingSetting("base_url"));
        }
        if self.api_key.is_empty() {
            return Err(ClientError::MissingSetting("api_key"));
        }

        let mut url = Url::parse(&self.base_url).map_err(|err| ClientError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason: err.to_string(),
        })?;
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidBaseUrl {
                url: self.base_url.clone(),
                reason: "url cannot be a base".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn transport_error(&self, err: reqwest::Error) -> ClientError {
        ClientError::from_reqwest(err, self.timeout)
    }

    async fn check_status(&self, response: Response) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().await.unwrap_or_default();
        let message = ServiceErrorBody::from_body(&body)
            .message()
            .map(str::to_string);
        warn!(
            status = status.as_u16(),
            message = message.as_deref().unwrap_or(""),
            "document service rejected request"
        );
        Err(ClientError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        response: Response,
    ) -> Result<T, ClientError> {
        let body = response
            .bytes()
            .await
            .map_err(|err| self.transport_error(err))?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl DocumentApi for HttpDocumentClient {
    async fn classify(
        &self,
        file: SourceFile,
        progress: ProgressCallback,
    ) -> Result<ClassifyResponse, ClientError> {
        let url = self.endpoint(&["documents", "classify"])?;
        let bytes = file.read_bytes().await?;
        let total = bytes.len() as u64;

        let reporter =
            progress::UploadProgressReporter::new(total).with_progress_callback(progress);
        let stream = progress::UploadProgressStream::wrap_bytes_as_stream(
            bytes,
            progress::UPLOAD_BLOCK_SIZE,
            reporter,
        );
        let content_type = file.content_type().unwrap_or(PDF_CONTENT_TYPE);
        let part = Part::stream_with_length(Body::wrap_stream(stream), total)
            .file_name(file.name().to_string())
            .mime_str(content_type)
            .map_err(|source| ClientError::InvalidContentType {
                content_type: content_type.to_string(),
                source,
            })?;
        let form = Form::new().part("file", part);

        debug!(
            file = file.name(),
            bytes = total,
            %url,
            "uploading document for classification"
        );
        let response = self
            .http
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;
        let response = self.check_status(response).await?;
        self.read_json(response).await
    }

    async fn list_documents(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<Vec<DocumentSummary>, ClientError> {
        let url = self.endpoint(&["documents"])?;
        let response = self
            .http
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(&ListDocumentsQuery { page, limit })
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;
        let response = self.check_status(response).await?;
        let listing: ListDocumentsResponse = self.read_json(response).await?;
        debug!(page, limit, count = listing.results.len(), "fetched documents");
        Ok(listing.results)
    }

    async fn delete_document(&self, id: &DocumentId) -> Result<(), ClientError> {
        let url = self.endpoint(&["documents", id.0.as_str()])?;
        let response = self
            .http
            .delete(url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;
        self.check_status(response).await?;
        debug!(document_id = %id, "deleted document");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
