//! Transcript capture state machine.
//!
//! Models the microphone toggle as explicit states instead of a tangle
//! of callbacks: `Idle -> Listening (start) -> Idle (stop, empty
//! transcript) | Processing (stop, non-empty transcript) -> Idle
//! (finish)`. `cancel()` drops back to Idle from anywhere; capture
//! errors end the listening state silently apart from a log line.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Listening,
    Processing,
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("capture is already active")]
    AlreadyActive,

    #[error("capture is not listening")]
    NotListening,
}

#[derive(Debug)]
pub struct TranscriptCapture {
    state: CaptureState,
    transcript: String,
}

impl Default for TranscriptCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptCapture {
    pub fn new() -> Self {
        Self {
            state: CaptureState::Idle,
            transcript: String::new(),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Begin continuous, interim-enabled capture.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.state != CaptureState::Idle {
            return Err(CaptureError::AlreadyActive);
        }
        self.transcript.clear();
        self.state = CaptureState::Listening;
        Ok(())
    }

    /// Replace the transcript with the latest interim snapshot.
    ///
    /// Recognizers re-deliver the whole transcript on every update, so
    /// this replaces rather than appends.
    pub fn update_transcript(&mut self, transcript: &str) -> Result<(), CaptureError> {
        if self.state != CaptureState::Listening {
            return Err(CaptureError::NotListening);
        }
        self.transcript = transcript.to_string();
        Ok(())
    }

    /// End capture. A non-empty transcript moves to Processing and is
    /// returned for interpretation; an empty one drops back to Idle.
    pub fn stop(&mut self) -> Option<String> {
        if self.state != CaptureState::Listening {
            return None;
        }

        if self.transcript.trim().is_empty() {
            self.state = CaptureState::Idle;
            return None;
        }

        self.state = CaptureState::Processing;
        Some(self.transcript.clone())
    }

    /// The pipeline finished (success or failure); back to Idle.
    pub fn finish(&mut self) {
        self.state = CaptureState::Idle;
        self.transcript.clear();
    }

    /// Abort from any state, discarding the transcript.
    pub fn cancel(&mut self) {
        self.state = CaptureState::Idle;
        self.transcript.clear();
    }

    /// A capture error ends the listening state; logged, not surfaced.
    pub fn fail(&mut self, error: &str) {
        log::error!("speech capture error: {error}");
        self.state = CaptureState::Idle;
        self.transcript.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_stop_empty_returns_to_idle() {
        let mut capture = TranscriptCapture::new();
        capture.start().unwrap();
        assert_eq!(capture.state(), CaptureState::Listening);

        assert_eq!(capture.stop(), None);
        assert_eq!(capture.state(), CaptureState::Idle);
    }

    #[test]
    fn test_stop_with_transcript_enters_processing() {
        let mut capture = TranscriptCapture::new();
        capture.start().unwrap();
        capture.update_transcript("find ai").unwrap();
        capture.update_transcript("find ai companies").unwrap();

        let transcript = capture.stop();
        assert_eq!(transcript.as_deref(), Some("find ai companies"));
        assert_eq!(capture.state(), CaptureState::Processing);

        capture.finish();
        assert_eq!(capture.state(), CaptureState::Idle);
        assert_eq!(capture.transcript(), "");
    }

    #[test]
    fn test_whitespace_transcript_counts_as_empty() {
        let mut capture = TranscriptCapture::new();
        capture.start().unwrap();
        capture.update_transcript("   ").unwrap();

        assert_eq!(capture.stop(), None);
        assert_eq!(capture.state(), CaptureState::Idle);
    }

    #[test]
    fn test_double_start_is_rejected() {
        let mut capture = TranscriptCapture::new();
        capture.start().unwrap();
        assert!(matches!(
            capture.start(),
            Err(CaptureError::AlreadyActive)
        ));
    }

    #[test]
    fn test_update_requires_listening() {
        let mut capture = TranscriptCapture::new();
        assert!(matches!(
            capture.update_transcript("hello"),
            Err(CaptureError::NotListening)
        ));
    }

    #[test]
    fn test_cancel_from_any_state() {
        let mut capture = TranscriptCapture::new();
        capture.start().unwrap();
        capture.update_transcript("something").unwrap();
        capture.cancel();
        assert_eq!(capture.state(), CaptureState::Idle);
        assert_eq!(capture.transcript(), "");

        capture.start().unwrap();
        capture.update_transcript("something").unwrap();
        capture.stop();
        capture.cancel();
        assert_eq!(capture.state(), CaptureState::Idle);
    }

    #[test]
    fn test_fail_silently_ends_listening() {
        let mut capture = TranscriptCapture::new();
        capture.start().unwrap();
        capture.fail("no-speech");
        assert_eq!(capture.state(), CaptureState::Idle);

        // ready for a fresh start afterwards
        assert!(capture.start().is_ok());
    }

    #[test]
    fn test_start_clears_previous_transcript() {
        let mut capture = TranscriptCapture::new();
        capture.start().unwrap();
        capture.update_transcript("first run").unwrap();
        capture.stop();
        capture.finish();

        capture.start().unwrap();
        assert_eq!(capture.transcript(), "");
    }
}
