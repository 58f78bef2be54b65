use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// One scripted detector response.
#[derive(Clone, Debug)]
pub enum ScriptStep {
    Detections(Vec<Detection>),
    /// Return an error for this call.
    Fail(String),
    /// Panic inside `detect` (exercises the pipeline's fail-open path).
    Panic,
}

/// Stub backend for testing. Replays a script of responses, one per call.
///
/// Once the script runs out the backend returns no detections, or repeats the
/// script from the start when looping is enabled.
pub struct ScriptedBackend {
    script: VecDeque<ScriptStep>,
    original: Vec<ScriptStep>,
    looping: bool,
    calls: Arc<AtomicU64>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::with_script(Vec::new())
    }

    pub fn with_script(steps: Vec<ScriptStep>) -> Self {
        Self {
            script: steps.iter().cloned().collect(),
            original: steps,
            looping: false,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Replay the same detections on every call.
    pub fn constant(detections: Vec<Detection>) -> Self {
        Self::with_script(vec![ScriptStep::Detections(detections)]).looping(true)
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Shared call counter, readable after the backend moved into a pipeline.
    pub fn call_counter(&self) -> Arc<AtomicU64> {
        self.calls.clone()
    }

    fn next_step(&mut self) -> Option<ScriptStep> {
        if self.script.is_empty() && self.looping {
            self.script = self.original.iter().cloned().collect();
        }
        self.script.pop_front()
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.next_step() {
            Some(ScriptStep::Detections(dets)) => Ok(dets),
            Some(ScriptStep::Fail(reason)) => Err(anyhow!("scripted detector failure: {}", reason)),
            Some(ScriptStep::Panic) => panic!("scripted detector panic"),
            None => Ok(Vec::new()),
        }
    }
}
