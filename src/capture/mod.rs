//! Camera Capture Layer
//!
//! The camera is an injected capability: `CameraSource` abstracts the actual
//! device (or the manual file-upload fallback) so the capture flow can be
//! exercised without hardware. `CameraManager` owns the permission lifecycle
//! and the bounded retry policy for busy devices.

pub mod frame;

pub use frame::{CapturedFrame, FrameFormat};

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Which camera lens to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacingMode {
    /// Front-facing camera
    User,
    /// Rear-facing camera (default for envelope shots)
    #[default]
    Environment,
}

impl FacingMode {
    /// The opposite lens
    pub fn toggled(&self) -> Self {
        match self {
            FacingMode::User => FacingMode::Environment,
            FacingMode::Environment => FacingMode::User,
        }
    }
}

/// Camera permission lifecycle as tracked by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionState {
    /// Not yet probed
    #[default]
    Unknown,
    /// Acquisition in progress
    Requesting,
    /// Device access granted
    Granted,
    /// Device access denied by the user or platform
    Denied,
}

/// Answer from probing the platform permission state.
///
/// `Unknown` covers the environments where no permission query API exists
/// and device enumeration is inconclusive (devices listed but labels
/// unpopulated); the manager then attempts acquisition and infers the grant
/// from the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionProbe {
    Granted,
    Denied,
    Unknown,
}

/// Device error taxonomy, one variant per remediation path
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera access was denied")]
    PermissionDenied,
    #[error("no camera device found")]
    NotFound,
    #[error("camera device is busy or not readable")]
    Busy,
    #[error("requested camera constraints are not supported")]
    Overconstrained,
    #[error("camera is not available in this environment")]
    Unsupported,
    #[error("camera acquisition was cancelled")]
    Cancelled,
    #[error("camera error: {0}")]
    Other(String),
}

impl CameraError {
    /// Whether a bounded automatic retry is warranted.
    ///
    /// Only busy/not-readable failures are transient; everything else needs
    /// explicit user action.
    pub fn is_transient(&self) -> bool {
        matches!(self, CameraError::Busy)
    }

    /// User-facing remediation message for this cause
    pub fn remediation(&self) -> &'static str {
        match self {
            CameraError::PermissionDenied => {
                "카메라 접근이 거부되었습니다. 설정에서 권한을 허용해주세요."
            }
            CameraError::NotFound => {
                "카메라를 찾을 수 없습니다. 카메라가 연결되어 있는지 확인해주세요."
            }
            CameraError::Busy => "카메라에 접근할 수 없습니다. 다른 앱에서 사용 중일 수 있습니다.",
            CameraError::Overconstrained => "요청한 카메라 설정을 지원하지 않습니다.",
            CameraError::Unsupported => "이 환경에서는 카메라를 사용할 수 없습니다.",
            CameraError::Cancelled => "카메라 초기화가 취소되었습니다.",
            CameraError::Other(_) => "카메라 접근 중 오류가 발생했습니다.",
        }
    }
}

/// An injectable camera capability.
///
/// Implementations hold at most one device stream at a time; `acquire` on an
/// already-acquired source must release the previous stream first.
#[async_trait]
pub trait CameraSource: Send {
    /// Probe the platform permission state without acquiring the device
    async fn probe_permission(&self) -> PermissionProbe;

    /// Acquire a device stream for the given lens
    async fn acquire(&mut self, facing: FacingMode) -> Result<(), CameraError>;

    /// Capture a single frame from the acquired stream
    async fn capture_frame(&mut self) -> Result<CapturedFrame, CameraError>;

    /// Release the device stream
    async fn release(&mut self);
}

/// Retry policy for transient device-busy failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total acquisition attempts, including the first
    pub max_attempts: u32,
    /// Base delay; attempt n waits `base_delay * n`
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Drives a `CameraSource` through the permission lifecycle and retry policy
pub struct CameraManager<S: CameraSource> {
    source: S,
    facing: FacingMode,
    permission: PermissionState,
    retry: RetryPolicy,
    cancel: CancellationToken,
    acquired: bool,
}

impl<S: CameraSource> CameraManager<S> {
    /// Create a new manager over the given source
    pub fn new(source: S, facing: FacingMode) -> Self {
        Self {
            source,
            facing,
            permission: PermissionState::Unknown,
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
            acquired: false,
        }
    }

    /// Override the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Token cancelling any in-flight retry backoff
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current permission state
    pub fn permission(&self) -> PermissionState {
        self.permission
    }

    /// Current lens
    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    /// Acquire the device stream, retrying bounded on busy failures.
    ///
    /// A denied probe short-circuits without touching the device; an
    /// inconclusive probe proceeds to acquisition and infers the grant from
    /// the outcome.
    pub async fn open(&mut self) -> Result<(), CameraError> {
        if self.acquired {
            return Ok(());
        }

        if self.source.probe_permission().await == PermissionProbe::Denied {
            self.permission = PermissionState::Denied;
            return Err(CameraError::PermissionDenied);
        }

        self.permission = PermissionState::Requesting;

        let mut attempt = 1u32;
        loop {
            match self.source.acquire(self.facing).await {
                Ok(()) => {
                    self.permission = PermissionState::Granted;
                    self.acquired = true;
                    info!("camera acquired ({:?}, attempt {})", self.facing, attempt);
                    return Ok(());
                }
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.base_delay * attempt;
                    warn!(
                        "camera busy (attempt {}/{}), retrying in {:?}",
                        attempt, self.retry.max_attempts, delay
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            debug!("camera retry abandoned: session cancelled");
                            return Err(CameraError::Cancelled);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(err) => {
                    if matches!(err, CameraError::PermissionDenied) {
                        self.permission = PermissionState::Denied;
                    }
                    warn!("camera acquisition failed: {}", err);
                    return Err(err);
                }
            }
        }
    }

    /// Capture a single frame, acquiring the device first if needed
    pub async fn capture(&mut self) -> Result<CapturedFrame, CameraError> {
        if !self.acquired {
            self.open().await?;
        }
        self.source.capture_frame().await
    }

    /// Switch between front and rear lenses.
    ///
    /// The current stream is released before the new acquisition: the camera
    /// is an exclusively-held resource and two device handles must never
    /// coexist.
    pub async fn switch_facing(&mut self) -> Result<(), CameraError> {
        self.close().await;
        self.facing = self.facing.toggled();
        self.open().await
    }

    /// Release the device stream
    pub async fn close(&mut self) {
        if self.acquired {
            self.source.release().await;
            self.acquired = false;
        }
    }
}

/// Manual image-upload fallback: frames come from image files on disk.
///
/// Used when device access is denied or no camera exists; also the capture
/// source for the CLI.
pub struct FileSource {
    queue: VecDeque<PathBuf>,
    acquired: bool,
}

impl FileSource {
    /// A source that serves the given files in order
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            queue: paths.into(),
            acquired: false,
        }
    }

    /// A source serving a single file
    pub fn single(path: PathBuf) -> Self {
        Self::new(vec![path])
    }

    fn load_frame(path: &std::path::Path) -> Result<CapturedFrame, CameraError> {
        let bytes = std::fs::read(path)
            .map_err(|e| CameraError::Other(format!("failed to read {}: {}", path.display(), e)))?;

        let decoded = image::load_from_memory(&bytes)
            .map_err(|e| CameraError::Other(format!("failed to decode {}: {}", path.display(), e)))?;

        let format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(FrameFormat::from_extension)
            .unwrap_or(FrameFormat::Jpg);

        let data = base64::engine::general_purpose::STANDARD.encode(&bytes);
        Ok(CapturedFrame::new(
            data,
            format,
            decoded.width(),
            decoded.height(),
        ))
    }
}

#[async_trait]
impl CameraSource for FileSource {
    async fn probe_permission(&self) -> PermissionProbe {
        // Reading local files needs no device grant
        PermissionProbe::Granted
    }

    async fn acquire(&mut self, _facing: FacingMode) -> Result<(), CameraError> {
        self.acquired = true;
        Ok(())
    }

    async fn capture_frame(&mut self) -> Result<CapturedFrame, CameraError> {
        let path = self
            .queue
            .pop_front()
            .ok_or_else(|| CameraError::Other("no image file queued".to_string()))?;
        Self::load_frame(&path)
    }

    async fn release(&mut self) {
        self.acquired = false;
    }
}
