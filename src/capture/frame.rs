//! Frame data structures for captured envelope images

use chrono::{DateTime, Utc};

/// Encoding format of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    Jpg,
    Png,
}

impl FrameFormat {
    /// Format hint as sent to the recognition service
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameFormat::Jpg => "jpg",
            FrameFormat::Png => "png",
        }
    }

    /// Guess the format from a file extension, defaulting to JPEG
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "png" => FrameFormat::Png,
            _ => FrameFormat::Jpg,
        }
    }
}

/// A captured frame from the camera or the file-upload fallback
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Base64-encoded image payload
    pub data: String,
    /// Encoding format of the payload
    pub format: FrameFormat,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Timestamp when the frame was captured
    pub captured_at: DateTime<Utc>,
}

impl CapturedFrame {
    /// Create a new captured frame stamped with the current time
    pub fn new(data: String, format: FrameFormat, width: u32, height: u32) -> Self {
        Self {
            data,
            format,
            width,
            height,
            captured_at: Utc::now(),
        }
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
