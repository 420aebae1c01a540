//! Generation provider client
//!
//! Every generation node talks to the provider through [`PipelineApi`], so
//! the catalogue can run against the HTTP backend or an in-process fake.
//! All endpoints take and return camelCase JSON; a non-2xx response carries
//! an `{ "error": "..." }` body.

use async_trait::async_trait;
use pipeline_engine::PipelineError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::PipelineConfig;

/// Errors from the provider client
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Status { status: u16, message: String },
}

impl From<ApiError> for PipelineError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Status { message, .. } => PipelineError::provider(message),
            other => PipelineError::provider(other.to_string()),
        }
    }
}

/// `POST /api/generate`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    /// `provider:model`
    pub model: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cfg_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_net_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_net_strength: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_image_url: Option<String>,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub image_url: String,
    #[serde(default)]
    pub seed: Option<u64>,
}

/// `POST /api/upscale`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpscaleRequest {
    pub image_url: String,
    pub scale: f64,
    pub method: String,
}

/// `POST /api/ip-adapter`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpAdapterRequest {
    pub image_url: String,
    pub prompt: String,
    /// Adapter weight in `0..=1`
    pub scale: f64,
    pub steps: u32,
}

/// `POST /api/style-transfer`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleTransferRequest {
    pub style_image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub model: String,
    /// Style strength in `0..=1`
    pub strength: f64,
}

/// Response of the image-to-image endpoints
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    pub image_url: String,
}

/// `POST /api/generate-text`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTextRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextResponse {
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// Generation backend used by the built-in nodes
#[async_trait]
pub trait PipelineApi: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, ApiError>;

    async fn upscale(&self, request: UpscaleRequest) -> Result<ImageResponse, ApiError>;

    async fn ip_adapter(&self, request: IpAdapterRequest) -> Result<ImageResponse, ApiError>;

    async fn style_transfer(&self, request: StyleTransferRequest)
        -> Result<ImageResponse, ApiError>;

    async fn generate_text(&self, request: GenerateTextRequest) -> Result<TextResponse, ApiError>;

    /// Raw bytes of a remote image, for nodes that process pixels locally
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, ApiError>;
}

/// [`PipelineApi`] over HTTP
pub struct HttpPipelineApi {
    http_client: reqwest::Client,
    config: PipelineConfig,
}

impl HttpPipelineApi {
    pub fn new(config: &PipelineConfig) -> Result<Self, ApiError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            http_client,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, ApiError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = self.config.endpoint(path);
        log::debug!("POST {}", url);

        let response = self.http_client.post(&url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("Request failed")
                        .to_string()
                });
            log::warn!("{} failed ({}): {}", path, status, message);
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl PipelineApi for HttpPipelineApi {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, ApiError> {
        self.post("/api/generate", &request).await
    }

    async fn upscale(&self, request: UpscaleRequest) -> Result<ImageResponse, ApiError> {
        self.post("/api/upscale", &request).await
    }

    async fn ip_adapter(&self, request: IpAdapterRequest) -> Result<ImageResponse, ApiError> {
        self.post("/api/ip-adapter", &request).await
    }

    async fn style_transfer(
        &self,
        request: StyleTransferRequest,
    ) -> Result<ImageResponse, ApiError> {
        self.post("/api/style-transfer", &request).await
    }

    async fn generate_text(&self, request: GenerateTextRequest) -> Result<TextResponse, ApiError> {
        self.post("/api/generate-text", &request).await
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        log::debug!("GET {}", url);
        let response = self.http_client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}
