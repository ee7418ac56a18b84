//! Clova OCR backend
//!
//! Client for the Naver Clova General OCR endpoint. The shared secret
//! travels in the `X-OCR-SECRET` header; the image payload is base64 inside
//! the request JSON.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{BoundingBox, OcrError, Recognition, RecognizedField, Recognizer};
use crate::capture::frame::CapturedFrame;

const API_VERSION: &str = "V2";
const IMAGE_NAME: &str = "contribution-envelope";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClovaRequest<'a> {
    version: &'static str,
    request_id: String,
    timestamp: i64,
    lang: &'a str,
    images: Vec<ClovaImage<'a>>,
}

#[derive(Debug, Serialize)]
struct ClovaImage<'a> {
    format: &'a str,
    name: &'static str,
    data: &'a str,
}

#[derive(Debug, Deserialize)]
struct ClovaResponse {
    #[serde(default)]
    images: Vec<ClovaImageResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClovaImageResult {
    infer_result: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    fields: Vec<ClovaField>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClovaField {
    infer_text: String,
    infer_confidence: f32,
    #[serde(default)]
    bounding_poly: Option<BoundingPoly>,
}

#[derive(Debug, Deserialize)]
struct BoundingPoly {
    #[serde(default)]
    vertices: Vec<Vertex>,
}

#[derive(Debug, Deserialize)]
struct Vertex {
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
}

impl BoundingPoly {
    /// Collapse the polygon into an axis-aligned box
    fn to_box(&self) -> Option<BoundingBox> {
        if self.vertices.is_empty() {
            return None;
        }
        let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
        let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
        for v in &self.vertices {
            min_x = min_x.min(v.x);
            min_y = min_y.min(v.y);
            max_x = max_x.max(v.x);
            max_y = max_y.max(v.y);
        }
        Some(BoundingBox {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        })
    }
}

/// Clova OCR client
pub struct ClovaOcr {
    client: reqwest::Client,
    invoke_url: String,
    secret_key: String,
    lang: String,
}

impl ClovaOcr {
    /// Create a client for the given invoke URL and shared secret
    pub fn new(invoke_url: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            invoke_url: invoke_url.into(),
            secret_key: secret_key.into(),
            lang: "ko".to_string(),
        }
    }

    /// Override the recognition language tag
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    fn build_request<'a>(&'a self, frame: &'a CapturedFrame) -> ClovaRequest<'a> {
        ClovaRequest {
            version: API_VERSION,
            request_id: format!("ocr-{}", uuid::Uuid::new_v4()),
            timestamp: Utc::now().timestamp_millis(),
            lang: &self.lang,
            images: vec![ClovaImage {
                format: frame.format.as_str(),
                name: IMAGE_NAME,
                data: &frame.data,
            }],
        }
    }

    fn map_response(response: ClovaResponse) -> Result<Recognition, OcrError> {
        let image = response
            .images
            .into_iter()
            .next()
            .ok_or_else(|| OcrError::Malformed("response contained no images".to_string()))?;

        if !image.infer_result.eq_ignore_ascii_case("SUCCESS") {
            let message = image
                .message
                .unwrap_or_else(|| image.infer_result.clone());
            warn!("recognition rejected: {}", message);
            return Err(OcrError::Rejected(message));
        }

        let fields = image
            .fields
            .into_iter()
            .map(|f| RecognizedField {
                text: f.infer_text,
                confidence: f.infer_confidence,
                bounding_box: f.bounding_poly.as_ref().and_then(BoundingPoly::to_box),
            })
            .collect();

        Ok(Recognition::from_fields(fields))
    }
}

#[async_trait::async_trait]
impl Recognizer for ClovaOcr {
    async fn recognize(&self, frame: &CapturedFrame) -> Result<Recognition, OcrError> {
        let request = self.build_request(frame);
        debug!(
            "submitting {}x{} {} frame to recognition service",
            frame.width,
            frame.height,
            frame.format.as_str()
        );

        let response = self
            .client
            .post(&self.invoke_url)
            .header("X-OCR-SECRET", &self.secret_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OcrError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ClovaResponse = response
            .json()
            .await
            .map_err(|e| OcrError::Malformed(e.to_string()))?;

        let recognition = Self::map_response(parsed)?;
        debug!(
            "recognition returned {} fields (avg confidence {:.2})",
            recognition.fields.len(),
            recognition.average_confidence
        );
        Ok(recognition)
    }
}
