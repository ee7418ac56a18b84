//! Capture Session State Machine
//!
//! Sequences one scan: camera → recognition → editable draft → persist or
//! discard. The session is strictly sequential and restartable forever;
//! `Saved` is a transient confirmation, not an exit.

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, warn};

use crate::capture::{CameraError, CameraManager, CameraSource, CapturedFrame};
use crate::extract::{extract_record, ExtractedRecord};
use crate::ocr::{OcrError, Recognizer};
use crate::storage::{ContributionRecord, NewRecord, RecordStore, StoreError, ValidationError};

/// Where the session currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for a frame
    Camera,
    /// Frame captured, awaiting recognition
    Processing,
    /// Recognition done, draft open for editing
    Editing,
    /// Record persisted, confirmation showing
    Saved,
    /// A device or service failure; retake to continue
    Error,
}

/// The editable form seeded from the extraction result.
///
/// Partial extraction still opens the editor: missing fields stay blank for
/// the user to fill in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordDraft {
    pub name: String,
    pub amount: i64,
    pub memo: Option<String>,
    pub date: Option<NaiveDate>,
    pub image_data: Option<String>,
}

impl RecordDraft {
    /// Seed a draft from the extraction result and the frame it came from
    pub fn from_extracted(extracted: &ExtractedRecord, frame: &CapturedFrame) -> Self {
        Self {
            name: extracted.name.clone().unwrap_or_default(),
            amount: extracted.amount.unwrap_or(0),
            memo: extracted.memo.clone(),
            date: None,
            image_data: Some(frame.data.clone()),
        }
    }

    /// Validate and convert into a record ready to persist
    pub fn validate(&self) -> Result<NewRecord, ValidationError> {
        let date = self.date.ok_or(ValidationError::MissingDate)?;
        let record = NewRecord {
            name: self.name.trim().to_string(),
            amount: self.amount,
            memo: self.memo.clone().filter(|m| !m.trim().is_empty()),
            date,
            image_data: self.image_data.clone(),
        };
        record.validate()?;
        Ok(record)
    }
}

/// Session failures, split by the error taxonomy
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Recognition(#[from] OcrError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("cannot {action} while in {state:?} state")]
    WrongState {
        action: &'static str,
        state: SessionState,
    },
}

/// One camera → edit → save cycle, restartable indefinitely
pub struct CaptureSession {
    state: SessionState,
    frame: Option<CapturedFrame>,
    extracted: Option<ExtractedRecord>,
    draft: Option<RecordDraft>,
    last_error: Option<String>,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Camera,
            frame: None,
            extracted: None,
            draft: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The open draft, when editing
    pub fn draft(&self) -> Option<&RecordDraft> {
        self.draft.as_ref()
    }

    /// Mutable access to the open draft for user edits
    pub fn draft_mut(&mut self) -> Option<&mut RecordDraft> {
        self.draft.as_mut()
    }

    /// The raw extraction result behind the draft
    pub fn extracted(&self) -> Option<&ExtractedRecord> {
        self.extracted.as_ref()
    }

    /// User-facing message for the most recent failure
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn require_state(
        &self,
        expected: SessionState,
        action: &'static str,
    ) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::WrongState {
                action,
                state: self.state,
            })
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!("session {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Capture a frame through the camera manager.
    ///
    /// Success moves to `Processing`; a device failure fails closed into
    /// `Error` with the cause's remediation message.
    pub async fn capture<S: CameraSource>(
        &mut self,
        camera: &mut CameraManager<S>,
    ) -> Result<(), SessionError> {
        self.require_state(SessionState::Camera, "capture")?;

        match camera.capture().await {
            Ok(frame) => {
                debug!("captured {}x{} frame", frame.width, frame.height);
                self.frame = Some(frame);
                self.last_error = None;
                self.transition(SessionState::Processing);
                Ok(())
            }
            Err(err) => {
                self.last_error = Some(err.remediation().to_string());
                self.transition(SessionState::Error);
                Err(err.into())
            }
        }
    }

    /// Submit the captured frame for recognition and open the draft.
    ///
    /// Transient recognition failures are retried exactly once; a second
    /// failure (or any non-transient one) lands in `Error`. The draft opens
    /// even when nothing was extracted.
    pub async fn recognize<R: Recognizer + ?Sized>(
        &mut self,
        recognizer: &R,
    ) -> Result<&RecordDraft, SessionError> {
        self.require_state(SessionState::Processing, "recognize")?;
        let Some(frame) = self.frame.as_ref() else {
            return Err(SessionError::WrongState {
                action: "recognize",
                state: self.state,
            });
        };

        let recognition = match recognizer.recognize(frame).await {
            Ok(recognition) => recognition,
            Err(err) if err.is_transient() => {
                warn!("recognition failed ({}), retrying once", err);
                match recognizer.recognize(frame).await {
                    Ok(recognition) => recognition,
                    Err(err) => return Err(self.fail_recognition(err)),
                }
            }
            Err(err) => return Err(self.fail_recognition(err)),
        };

        debug!("recognized: {}", recognition.concatenated_text());
        let extracted = extract_record(&recognition.fields);
        debug!(
            "extracted name={:?} amount={:?} (score {})",
            extracted.name, extracted.amount, extracted.confidence
        );

        let draft = RecordDraft::from_extracted(&extracted, frame);
        self.extracted = Some(extracted);
        self.last_error = None;
        self.transition(SessionState::Editing);
        Ok(self.draft.insert(draft))
    }

    fn fail_recognition(&mut self, err: OcrError) -> SessionError {
        self.last_error = Some(err.to_string());
        self.transition(SessionState::Error);
        err.into()
    }

    /// Validate the draft and persist it.
    ///
    /// Validation failures are input errors: message surfaced, state
    /// unchanged. Store failures keep the session in `Editing` so the
    /// submit can be retried.
    pub async fn submit<T: RecordStore + ?Sized>(
        &mut self,
        store: &T,
    ) -> Result<ContributionRecord, SessionError> {
        self.require_state(SessionState::Editing, "submit")?;
        let Some(draft) = self.draft.as_ref() else {
            return Err(SessionError::WrongState {
                action: "submit",
                state: self.state,
            });
        };

        let record = draft.validate()?;
        match store.add_record(record).await {
            Ok(saved) => {
                self.frame = None;
                self.extracted = None;
                self.draft = None;
                self.last_error = None;
                self.transition(SessionState::Saved);
                Ok(saved)
            }
            Err(err) => {
                self.last_error = Some(err.to_string());
                Err(err.into())
            }
        }
    }

    /// Discard the draft and captured frame, back to the camera
    pub fn cancel(&mut self) -> Result<(), SessionError> {
        self.require_state(SessionState::Editing, "cancel")?;
        self.frame = None;
        self.extracted = None;
        self.draft = None;
        self.transition(SessionState::Camera);
        Ok(())
    }

    /// Leave the error state and allow a retake
    pub fn retake(&mut self) -> Result<(), SessionError> {
        self.require_state(SessionState::Error, "retake")?;
        self.frame = None;
        self.extracted = None;
        self.draft = None;
        self.transition(SessionState::Camera);
        Ok(())
    }

    /// Leave the confirmation screen and start the next capture
    pub fn start_new(&mut self) -> Result<(), SessionError> {
        self.require_state(SessionState::Saved, "start a new capture")?;
        self.transition(SessionState::Camera);
        Ok(())
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{FacingMode, FrameFormat, PermissionProbe, RetryPolicy};
    use crate::ocr::{OcrError, Recognition, RecognizedField};
    use crate::storage::RecordPatch;
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct StubCamera {
        fail_with: Option<fn() -> CameraError>,
    }

    #[async_trait]
    impl CameraSource for StubCamera {
        async fn probe_permission(&self) -> PermissionProbe {
            PermissionProbe::Granted
        }
        async fn acquire(&mut self, _facing: FacingMode) -> Result<(), CameraError> {
            match self.fail_with {
                Some(make) => Err(make()),
                None => Ok(()),
            }
        }
        async fn capture_frame(&mut self) -> Result<CapturedFrame, CameraError> {
            Ok(CapturedFrame::new(
                "ZW52ZWxvcGU=".to_string(),
                FrameFormat::Jpg,
                1280,
                720,
            ))
        }
        async fn release(&mut self) {}
    }

    fn working_camera() -> CameraManager<StubCamera> {
        CameraManager::new(StubCamera { fail_with: None }, FacingMode::Environment)
    }

    fn busy_camera() -> CameraManager<StubCamera> {
        CameraManager::new(
            StubCamera {
                fail_with: Some(|| CameraError::Busy),
            },
            FacingMode::Environment,
        )
        .with_retry_policy(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        })
    }

    struct StubRecognizer {
        texts: Vec<&'static str>,
        fail_times: AtomicU32,
        error: fn() -> OcrError,
        calls: AtomicU32,
    }

    impl StubRecognizer {
        fn ok(texts: Vec<&'static str>) -> Self {
            Self {
                texts,
                fail_times: AtomicU32::new(0),
                error: || OcrError::Malformed("unused".into()),
                calls: AtomicU32::new(0),
            }
        }

        fn failing(times: u32, error: fn() -> OcrError) -> Self {
            Self {
                texts: vec!["김철수", "5만원"],
                fail_times: AtomicU32::new(times),
                error,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Recognizer for StubRecognizer {
        async fn recognize(&self, _frame: &CapturedFrame) -> Result<Recognition, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.fail_times.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_times.store(remaining - 1, Ordering::SeqCst);
                return Err((self.error)());
            }
            Ok(Recognition::from_fields(
                self.texts
                    .iter()
                    .map(|t| RecognizedField {
                        text: t.to_string(),
                        confidence: 0.9,
                        bounding_box: None,
                    })
                    .collect(),
            ))
        }
    }

    struct MemoryStore {
        fail: bool,
        added: parking_lot::Mutex<Vec<NewRecord>>,
    }

    impl MemoryStore {
        fn new() -> Self {
            Self {
                fail: false,
                added: parking_lot::Mutex::new(vec![]),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                added: parking_lot::Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl RecordStore for MemoryStore {
        async fn add_record(&self, record: NewRecord) -> Result<ContributionRecord, StoreError> {
            if self.fail {
                return Err(StoreError::Service {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            let saved = ContributionRecord {
                id: "r1".to_string(),
                name: record.name.clone(),
                amount: record.amount,
                memo: record.memo.clone(),
                date: record.date,
                created_at: Utc::now(),
                updated_at: Utc::now(),
                image_data: record.image_data.clone(),
            };
            self.added.lock().push(record);
            Ok(saved)
        }
        async fn update_record(
            &self,
            _: &str,
            _: RecordPatch,
        ) -> Result<ContributionRecord, StoreError> {
            unimplemented!()
        }
        async fn delete_record(&self, _: &str) -> Result<(), StoreError> {
            Ok(())
        }
        async fn fetch_records(&self) -> Result<Vec<ContributionRecord>, StoreError> {
            Ok(vec![])
        }
        async fn search_records(&self, _: &str) -> Result<Vec<ContributionRecord>, StoreError> {
            Ok(vec![])
        }
        async fn fetch_records_by_date_range(
            &self,
            _: NaiveDate,
            _: NaiveDate,
        ) -> Result<Vec<ContributionRecord>, StoreError> {
            Ok(vec![])
        }
    }

    fn march(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    #[tokio::test]
    async fn test_happy_path() {
        let mut session = CaptureSession::new();
        let mut camera = working_camera();
        let recognizer = StubRecognizer::ok(vec!["축 결혼", "김철수", "50,000원"]);
        let store = MemoryStore::new();

        assert_eq!(session.state(), SessionState::Camera);
        session.capture(&mut camera).await.unwrap();
        assert_eq!(session.state(), SessionState::Processing);

        let draft = session.recognize(&recognizer).await.unwrap();
        assert_eq!(draft.name, "김철수");
        assert_eq!(draft.amount, 50_000);
        assert_eq!(session.state(), SessionState::Editing);

        session.draft_mut().unwrap().date = Some(march(14));
        let saved = session.submit(&store).await.unwrap();
        assert_eq!(saved.name, "김철수");
        assert_eq!(session.state(), SessionState::Saved);

        session.start_new().unwrap();
        assert_eq!(session.state(), SessionState::Camera);
    }

    #[tokio::test]
    async fn test_partial_extraction_still_opens_editor() {
        let mut session = CaptureSession::new();
        let mut camera = working_camera();
        // Nothing recognizable on the envelope
        let recognizer = StubRecognizer::ok(vec!["??", "##"]);

        session.capture(&mut camera).await.unwrap();
        let draft = session.recognize(&recognizer).await.unwrap();

        assert!(draft.name.is_empty());
        assert_eq!(draft.amount, 0);
        assert_eq!(session.state(), SessionState::Editing);
    }

    #[tokio::test]
    async fn test_transient_recognition_failure_retried_once() {
        let mut session = CaptureSession::new();
        let mut camera = working_camera();
        let recognizer = StubRecognizer::failing(1, || OcrError::Service {
            status: 503,
            body: String::new(),
        });

        session.capture(&mut camera).await.unwrap();
        session.recognize(&recognizer).await.unwrap();

        assert_eq!(session.state(), SessionState::Editing);
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_failure_lands_in_error() {
        let mut session = CaptureSession::new();
        let mut camera = working_camera();
        let recognizer = StubRecognizer::failing(2, || OcrError::Service {
            status: 503,
            body: String::new(),
        });

        session.capture(&mut camera).await.unwrap();
        let err = session.recognize(&recognizer).await.unwrap_err();
        assert!(matches!(err, SessionError::Recognition(_)));
        assert_eq!(session.state(), SessionState::Error);
        // One automatic retry, never more
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 2);

        session.retake().unwrap();
        assert_eq!(session.state(), SessionState::Camera);
    }

    #[tokio::test]
    async fn test_non_transient_failure_not_retried() {
        let mut session = CaptureSession::new();
        let mut camera = working_camera();
        let recognizer = StubRecognizer::failing(1, || OcrError::Rejected("bad image".into()));

        session.capture(&mut camera).await.unwrap();
        session.recognize(&recognizer).await.unwrap_err();

        assert_eq!(session.state(), SessionState::Error);
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_camera_failure_fails_closed() {
        let mut session = CaptureSession::new();
        let mut camera = busy_camera();

        let err = session.capture(&mut camera).await.unwrap_err();
        assert!(matches!(err, SessionError::Camera(CameraError::Busy)));
        assert_eq!(session.state(), SessionState::Error);
        assert_eq!(
            session.last_error(),
            Some("카메라에 접근할 수 없습니다. 다른 앱에서 사용 중일 수 있습니다.")
        );
    }

    #[tokio::test]
    async fn test_validation_failure_keeps_editing() {
        let mut session = CaptureSession::new();
        let mut camera = working_camera();
        let recognizer = StubRecognizer::ok(vec!["김철수"]);
        let store = MemoryStore::new();

        session.capture(&mut camera).await.unwrap();
        session.recognize(&recognizer).await.unwrap();
        session.draft_mut().unwrap().date = Some(march(14));
        // No amount was recognized and the user did not fill one in
        let err = session.submit(&store).await.unwrap_err();

        assert!(matches!(
            err,
            SessionError::Invalid(ValidationError::NonPositiveAmount)
        ));
        assert_eq!(session.state(), SessionState::Editing);
        assert!(store.added.lock().is_empty());
    }

    #[tokio::test]
    async fn test_missing_date_rejected() {
        let mut session = CaptureSession::new();
        let mut camera = working_camera();
        let recognizer = StubRecognizer::ok(vec!["김철수", "5만원"]);
        let store = MemoryStore::new();

        session.capture(&mut camera).await.unwrap();
        session.recognize(&recognizer).await.unwrap();
        let err = session.submit(&store).await.unwrap_err();

        assert!(matches!(
            err,
            SessionError::Invalid(ValidationError::MissingDate)
        ));
        assert_eq!(session.state(), SessionState::Editing);
    }

    #[tokio::test]
    async fn test_store_failure_keeps_editing() {
        let mut session = CaptureSession::new();
        let mut camera = working_camera();
        let recognizer = StubRecognizer::ok(vec!["김철수", "5만원"]);
        let store = MemoryStore::failing();

        session.capture(&mut camera).await.unwrap();
        session.recognize(&recognizer).await.unwrap();
        session.draft_mut().unwrap().date = Some(march(14));
        let err = session.submit(&store).await.unwrap_err();

        assert!(matches!(err, SessionError::Store(_)));
        // Retry-capable: the draft is still open
        assert_eq!(session.state(), SessionState::Editing);
        assert!(session.draft().is_some());
    }

    #[tokio::test]
    async fn test_cancel_discards_frame_and_draft() {
        let mut session = CaptureSession::new();
        let mut camera = working_camera();
        let recognizer = StubRecognizer::ok(vec!["김철수", "5만원"]);

        session.capture(&mut camera).await.unwrap();
        session.recognize(&recognizer).await.unwrap();
        session.cancel().unwrap();

        assert_eq!(session.state(), SessionState::Camera);
        assert!(session.draft().is_none());
        assert!(session.extracted().is_none());
    }

    #[tokio::test]
    async fn test_wrong_state_transitions_rejected() {
        let mut session = CaptureSession::new();
        let store = MemoryStore::new();

        let err = session.submit(&store).await.unwrap_err();
        assert!(matches!(err, SessionError::WrongState { .. }));
        assert!(session.cancel().is_err());
        assert!(session.start_new().is_err());
        assert!(session.retake().is_err());
        assert_eq!(session.state(), SessionState::Camera);
    }

    #[tokio::test]
    async fn test_session_restartable_after_save() {
        let mut session = CaptureSession::new();
        let mut camera = working_camera();
        let recognizer = StubRecognizer::ok(vec!["김철수", "5만원"]);
        let store = MemoryStore::new();

        for day in 1..=3 {
            session.capture(&mut camera).await.unwrap();
            session.recognize(&recognizer).await.unwrap();
            session.draft_mut().unwrap().date = Some(march(day));
            session.submit(&store).await.unwrap();
            session.start_new().unwrap();
        }

        assert_eq!(store.added.lock().len(), 3);
        assert_eq!(session.state(), SessionState::Camera);
    }
}
