//! Cloud Vision OCR client
//!
//! Request/response types for `POST v1/images:annotate` and a client that
//! sends one DOCUMENT_TEXT_DETECTION request per image. The API key travels
//! as the `key` query parameter. The transport has a bounded call timeout
//! and never retries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use snapscribe_processing::EncodedImage;

use crate::error::{OcrError, Result};

pub const DEFAULT_BASE_URL: &str = "https://vision.googleapis.com/";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DOCUMENT_TEXT_DETECTION: &str = "DOCUMENT_TEXT_DETECTION";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotateImageRequest {
    pub requests: Vec<RequestItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestItem {
    pub image: ImagePayload,
    pub features: Vec<Feature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_context: Option<ImageContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePayload {
    /// Base64 JPEG
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    pub max_results: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_hints: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AnnotateImageResponse {
    #[serde(default)]
    pub responses: Vec<SingleResponse>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleResponse {
    #[serde(default)]
    pub full_text_annotation: Option<FullTextAnnotation>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FullTextAnnotation {
    #[serde(default)]
    pub text: Option<String>,
}

impl AnnotateImageRequest {
    /// Single document-text request for one image
    pub fn document_text(image: &EncodedImage, language_hints: &[String]) -> Self {
        let image_context = if language_hints.is_empty() {
            None
        } else {
            Some(ImageContext {
                language_hints: Some(language_hints.to_vec()),
            })
        };

        Self {
            requests: vec![RequestItem {
                image: ImagePayload {
                    content: image.to_base64(),
                },
                features: vec![Feature {
                    kind: DOCUMENT_TEXT_DETECTION.to_string(),
                    max_results: 1,
                }],
                image_context,
            }],
        }
    }
}

impl AnnotateImageResponse {
    /// Full text of the first response; a missing element or field is `None`
    pub fn first_text(&self) -> Option<&str> {
        self.responses
            .first()?
            .full_text_annotation
            .as_ref()?
            .text
            .as_deref()
    }

    pub fn into_first_text(self) -> Option<String> {
        self.responses
            .into_iter()
            .next()?
            .full_text_annotation?
            .text
    }
}

/// Wire transport for annotate calls
#[async_trait]
pub trait VisionTransport: Send + Sync {
    async fn annotate(
        &self,
        body: &AnnotateImageRequest,
        api_key: &str,
    ) -> Result<AnnotateImageResponse>;
}

/// HTTPS transport with a bounded call timeout
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

/// Service error envelope: `{"error": {"message": ...}}`
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OcrError::EngineInitFailed(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, base_url, timeout))
    }

    /// Use a preconfigured client; `timeout` is only used for error reporting
    pub fn with_client(client: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            endpoint: endpoint_url(base_url),
            timeout,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_send_error(&self, e: reqwest::Error) -> OcrError {
        if e.is_timeout() {
            OcrError::Timeout(self.timeout)
        } else {
            OcrError::HttpError(e)
        }
    }
}

#[async_trait]
impl VisionTransport for HttpTransport {
    async fn annotate(
        &self,
        body: &AnnotateImageRequest,
        api_key: &str,
    ) -> Result<AnnotateImageResponse> {
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", api_key)])
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_send_error(e))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|envelope| envelope.error.message)
                .unwrap_or_else(|_| text.chars().take(200).collect());
            return Err(OcrError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(serde_json::from_str(&text)?)
    }
}

/// `<base>/v1/images:annotate`
pub fn endpoint_url(base_url: &str) -> String {
    format!("{}/v1/images:annotate", base_url.trim_end_matches('/'))
}

/// Cloud client settings
#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    pub language_hints: Vec<String>,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            language_hints: vec!["en".to_string()],
        }
    }
}

/// Stateless request builder and response parser over a shared transport
pub struct CloudVisionClient {
    transport: Arc<dyn VisionTransport>,
    api_key: String,
    language_hints: Vec<String>,
}

impl CloudVisionClient {
    pub fn new(config: VisionConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config.base_url, config.timeout)?;
        debug!(
            "cloud vision client for {} (timeout {:?})",
            transport.endpoint(),
            config.timeout
        );
        Ok(Self::with_transport(Arc::new(transport), config.api_key)
            .with_language_hints(config.language_hints))
    }

    pub fn with_transport(transport: Arc<dyn VisionTransport>, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            api_key: api_key.into(),
            language_hints: vec!["en".to_string()],
        }
    }

    pub fn with_language_hints(mut self, hints: Vec<String>) -> Self {
        self.language_hints = hints;
        self
    }

    pub fn build_request(&self, image: &EncodedImage) -> AnnotateImageRequest {
        AnnotateImageRequest::document_text(image, &self.language_hints)
    }

    /// Send one image; `Ok(None)` means the service returned no text
    pub async fn annotate(&self, image: &EncodedImage) -> Result<Option<String>> {
        let body = self.build_request(image);
        debug!("submitting {} byte image for text detection", image.len());
        let response = self.transport.annotate(&body, &self.api_key).await?;
        Ok(response.into_first_text())
    }

    /// Parse a raw annotate response body
    pub fn parse_response(json: &str) -> Result<Option<String>> {
        let response: AnnotateImageResponse = serde_json::from_str(json)?;
        Ok(response.into_first_text())
    }
}
