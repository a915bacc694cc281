//! Detection client for the hosted classifier, using `reqwest`.

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use typesecure_protocol::{Codec, DetectPayload, DetectionRequest, DetectionResponse, JsonCodec};

use crate::{DetectError, Detector, DetectorConfig};

/// A [`Detector`] that POSTs to `{base_url}/api/detect`.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpDetector {
    client: Client,
    endpoint: String,
    max_file_bytes: u64,
    codec: JsonCodec,
}

impl HttpDetector {
    /// Builds a client with the configured request timeout.
    ///
    /// # Errors
    /// Returns `DetectError::Unavailable` when the HTTP client can't be
    /// constructed (e.g. no TLS backend).
    pub fn new(config: &DetectorConfig) -> Result<Self, DetectError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| DetectError::Unavailable(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint(),
            max_file_bytes: config.max_file_bytes,
            codec: JsonCodec,
        })
    }

    /// The URL requests are sent to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Detector for HttpDetector {
    async fn detect(
        &self,
        request: &DetectionRequest,
    ) -> Result<DetectionResponse, DetectError> {
        let file_name = match request {
            DetectionRequest::Text(_) => None,
            DetectionRequest::File { name, contents } => {
                let size = contents.len() as u64;
                if size > self.max_file_bytes {
                    return Err(DetectError::TooLarge {
                        size,
                        limit: self.max_file_bytes,
                    });
                }
                Some(name.clone())
            }
        };

        let payload = DetectPayload {
            text: request.text(),
        };
        let body = self.codec.encode(&payload)?;
        tracing::debug!(
            endpoint = %self.endpoint,
            bytes = body.len(),
            file = file_name.as_deref(),
            "sending detection request"
        );

        let response = self
            .client
            .post(self.endpoint.as_str())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes).trim().to_string();
            tracing::warn!(status = status.as_u16(), %body, "detection request rejected");
            return Err(DetectError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let decoded: DetectionResponse = self.codec.decode(&bytes)?;
        let (mut result, clamped) = decoded.normalized()?;
        if clamped {
            tracing::warn!(
                confidence = result.confidence,
                "detection confidence out of range, clamped"
            );
        }
        if let Some(name) = file_name {
            result.processed_text = format!("File: {name}");
        }

        tracing::info!(
            is_sensitive = result.is_sensitive,
            confidence = result.confidence,
            types = result.detected_types.len(),
            "detection complete"
        );
        Ok(result)
    }
}

fn map_transport_error(error: reqwest::Error) -> DetectError {
    if error.is_timeout() {
        DetectError::Unavailable(format!("request timed out: {error}"))
    } else {
        DetectError::Unavailable(error.to_string())
    }
}
