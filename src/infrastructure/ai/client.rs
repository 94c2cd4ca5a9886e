//! AI Vision Client
//!
//! HTTP client for the external vision service. Unary embedding
//! extraction plus a newline-delimited JSON frame stream per camera.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::BytesMut;
use futures::Stream;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use super::types::{ExtractRequest, ExtractResponse, FrameResponse, OpenStreamRequest};

/// Typed AI client failures.
#[derive(Debug, thiserror::Error)]
pub enum AiClientError {
    /// Connection/transport failure; retryable by the supervisor.
    #[error("AI transport error: {0}")]
    Transport(String),

    /// The service answered with a typed error code.
    #[error("AI service error {code}: {message}")]
    Service { code: String, message: String },

    /// The service answered with a payload we could not decode.
    #[error("AI response decode error: {0}")]
    Decode(String),
}

/// Stream of detection frames for one camera.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<FrameResponse, AiClientError>> + Send>>;

/// Contract for the external vision service.
#[async_trait]
pub trait AiVisionClient: Send + Sync {
    /// Extracts face embeddings from a single image.
    async fn extract_embedding(
        &self,
        image: &[u8],
        camera_id: Option<&str>,
    ) -> Result<ExtractResponse, AiClientError>;

    /// Opens the streaming detection channel for a camera. The stream
    /// ends at EOF or on the first transport error; dropping it closes
    /// the channel.
    async fn open_camera_stream(
        &self,
        camera_id: i64,
        url: &str,
    ) -> Result<FrameStream, AiClientError>;
}

/// Reqwest-based implementation speaking JSON + NDJSON.
pub struct HttpAiVisionClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAiVisionClient {
    /// Creates a client for the given service base URL.
    pub fn new(base_url: String, request_timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl AiVisionClient for HttpAiVisionClient {
    async fn extract_embedding(
        &self,
        image: &[u8],
        camera_id: Option<&str>,
    ) -> Result<ExtractResponse, AiClientError> {
        let request = ExtractRequest {
            image: BASE64.encode(image),
            camera_id: camera_id.map(|s| s.to_string()),
        };

        let response = self
            .http
            .post(format!("{}/v1/faces/extract", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| AiClientError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AiClientError::Service {
                code: response.status().as_str().to_string(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let extracted: ExtractResponse = response
            .json()
            .await
            .map_err(|e| AiClientError::Decode(e.to_string()))?;

        if !extracted.success {
            return Err(AiClientError::Service {
                code: extracted.error_code.clone().unwrap_or_else(|| "unknown".to_string()),
                message: extracted.error_message.clone().unwrap_or_default(),
            });
        }

        Ok(extracted)
    }

    async fn open_camera_stream(
        &self,
        camera_id: i64,
        url: &str,
    ) -> Result<FrameStream, AiClientError> {
        let request = OpenStreamRequest {
            camera_id: camera_id.to_string(),
            url: url.to_string(),
        };

        // Streaming responses must not be cut short by the unary timeout.
        let response = self
            .http
            .post(format!("{}/v1/cameras/stream", self.base_url))
            .timeout(Duration::from_secs(60 * 60 * 24))
            .json(&request)
            .send()
            .await
            .map_err(|e| AiClientError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AiClientError::Service {
                code: response.status().as_str().to_string(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let (tx, rx) = mpsc::channel::<Result<FrameResponse, AiClientError>>(32);
        let mut bytes = response.bytes_stream();

        tokio::spawn(async move {
            let mut buffer = BytesMut::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(AiClientError::Transport(e.to_string()))).await;
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                    let line = buffer.split_to(newline + 1);
                    let line = &line[..line.len() - 1];
                    let line = line.strip_suffix(b"\r").unwrap_or(line);
                    if line.is_empty() {
                        continue;
                    }

                    match serde_json::from_slice::<FrameResponse>(line) {
                        Ok(frame) => {
                            if tx.send(Ok(frame)).await.is_err() {
                                debug!(camera_id, "Frame consumer dropped, closing stream");
                                return;
                            }
                        }
                        Err(e) => {
                            warn!(camera_id, "Dropping undecodable frame: {}", e);
                        }
                    }
                }
            }
            debug!(camera_id, "Camera stream reached EOF");
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
