//! Recognition Layer
//!
//! Sends a captured frame to the remote handwriting OCR service and maps the
//! response into an ordered list of recognized fields. One image in, one
//! response out; retry policy belongs to the capture session, not here.

pub mod clova;

pub use clova::ClovaOcr;

use async_trait::async_trait;
use thiserror::Error;

use crate::capture::frame::CapturedFrame;

/// Axis-aligned bounding box of a recognized text span, in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One OCR-detected text span
#[derive(Debug, Clone)]
pub struct RecognizedField {
    /// Recognized text content
    pub text: String,
    /// Recognition confidence (0.0 - 1.0)
    pub confidence: f32,
    /// Position in the source image, when the service reports one
    pub bounding_box: Option<BoundingBox>,
}

/// Full recognition result for a single image.
///
/// Field order is the service's return order and carries no semantic
/// meaning.
#[derive(Debug, Clone, Default)]
pub struct Recognition {
    /// Recognized fields in service return order
    pub fields: Vec<RecognizedField>,
    /// Mean of the per-field confidences (0.0 when no fields)
    pub average_confidence: f32,
}

impl Recognition {
    /// Build a recognition result, deriving the average confidence
    pub fn from_fields(fields: Vec<RecognizedField>) -> Self {
        let average_confidence = if fields.is_empty() {
            0.0
        } else {
            fields.iter().map(|f| f.confidence).sum::<f32>() / fields.len() as f32
        };
        Self {
            fields,
            average_confidence,
        }
    }

    /// All field texts joined with single spaces
    pub fn concatenated_text(&self) -> String {
        self.fields
            .iter()
            .map(|f| f.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Recognition gateway errors
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("recognition request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("recognition service returned {status}: {body}")]
    Service { status: u16, body: String },
    #[error("recognition service rejected the image: {0}")]
    Rejected(String),
    #[error("malformed recognition response: {0}")]
    Malformed(String),
}

impl OcrError {
    /// Whether the capture session may retry this failure once.
    ///
    /// Transport failures and server-side errors are transient; a rejected
    /// or malformed response will not improve on resubmission.
    pub fn is_transient(&self) -> bool {
        match self {
            OcrError::Transport(_) => true,
            OcrError::Service { status, .. } => *status >= 500,
            OcrError::Rejected(_) | OcrError::Malformed(_) => false,
        }
    }
}

/// A handwriting/text recognition service
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Recognize text in a single captured frame
    async fn recognize(&self, frame: &CapturedFrame) -> Result<Recognition, OcrError>;
}
