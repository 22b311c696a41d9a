//! Mock capture service for unit and integration testing.
//!
//! Sessions are handed out in creation order, each replaying the script
//! queued for it with [`MockCaptureService::push_session`].  A session with
//! no script returns black frames of the right size.  The service records
//! every request and counts destroyed sessions so tests can check teardown.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::application::capture_loop::{CaptureError, CaptureHandle, CaptureRequest, CaptureService};

/// One scripted grab result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFrame {
    Frame(Vec<u8>),
    Fail(String),
    /// Panics the grabbing thread with the given message.
    Panic(String),
}

#[derive(Default)]
struct State {
    scripts: VecDeque<Vec<MockFrame>>,
    failing_displays: HashSet<String>,
    requests: Vec<CaptureRequest>,
}

/// A scripted [`CaptureService`].
#[derive(Clone, Default)]
pub struct MockCaptureService {
    state: Arc<Mutex<State>>,
    destroyed: Arc<AtomicUsize>,
}

impl MockCaptureService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the script for the next session to be created.
    ///
    /// After the last entry the session keeps repeating it.
    pub fn push_session(&self, script: Vec<MockFrame>) {
        self.lock().scripts.push_back(script);
    }

    /// Makes session creation fail for `display`.
    pub fn fail_display(&self, display: &str) {
        self.lock().failing_displays.insert(display.to_string());
    }

    /// Returns every request received so far, in order.
    pub fn requests(&self) -> Vec<CaptureRequest> {
        self.lock().requests.clone()
    }

    /// Returns how many sessions have been dropped.
    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CaptureService for MockCaptureService {
    fn create_capture(
        &self,
        request: &CaptureRequest,
    ) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        let mut state = self.lock();
        state.requests.push(request.clone());
        if state.failing_displays.contains(&request.display) {
            return Err(CaptureError::SessionFailed {
                display: request.display.clone(),
                reason: "display not found".to_string(),
            });
        }
        let script = state
            .scripts
            .pop_front()
            .unwrap_or_else(|| vec![MockFrame::Frame(vec![0; request.frame_len()])]);
        Ok(Box::new(MockCaptureHandle {
            script: script.into(),
            current: Vec::new(),
            destroyed: Arc::clone(&self.destroyed),
        }))
    }
}

/// Session handed out by [`MockCaptureService`].
pub struct MockCaptureHandle {
    script: VecDeque<MockFrame>,
    current: Vec<u8>,
    destroyed: Arc<AtomicUsize>,
}

impl CaptureHandle for MockCaptureHandle {
    fn grab(&mut self) -> Result<&[u8], CaptureError> {
        let next = if self.script.len() > 1 {
            self.script.pop_front()
        } else {
            self.script.front().cloned()
        };
        match next {
            Some(MockFrame::Frame(frame)) => {
                self.current = frame;
                Ok(&self.current)
            }
            Some(MockFrame::Fail(reason)) => Err(CaptureError::Grab(reason)),
            Some(MockFrame::Panic(message)) => panic!("{message}"),
            None => Err(CaptureError::Grab("empty script".to_string())),
        }
    }
}

impl Drop for MockCaptureHandle {
    fn drop(&mut self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}
