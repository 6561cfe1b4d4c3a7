use anyhow::{bail, Result};

use crate::detect::backend::{DetectParams, DetectorBackend};
use crate::detect::result::{ObjectClass, RawDetection};
use crate::frame::Frame;

/// Stub backend for testing. Replays a fixed script of results.
///
/// Call `n` returns `script[n % script.len()]`, filtered by class and
/// confidence like a real engine would. An empty script always returns no
/// boxes.
#[derive(Default)]
pub struct StubBackend {
    script: Vec<Vec<RawDetection>>,
    fail_on: Option<usize>,
    calls: usize,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(script: Vec<Vec<RawDetection>>) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    /// Make the given (0-based) call return an error.
    pub fn failing_on(mut self, call: usize) -> Self {
        self.fail_on = Some(call);
        self
    }

    /// Number of `detect` calls so far.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn supports(&self, _class: ObjectClass) -> bool {
        true
    }

    fn detect(&mut self, _frame: &Frame, params: &DetectParams) -> Result<Vec<RawDetection>> {
        let call = self.calls;
        self.calls += 1;

        if self.fail_on == Some(call) {
            bail!("stub backend scripted failure on call {}", call);
        }
        if self.script.is_empty() {
            return Ok(Vec::new());
        }

        let result = self.script[call % self.script.len()]
            .iter()
            .filter(|d| d.class == params.class && d.confidence >= params.confidence)
            .cloned()
            .collect();
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_script_and_counts_calls() -> Result<()> {
        let frame = Frame::solid(4, 4, [0, 0, 0]);
        let params = DetectParams::person(0.5, 0.5);
        let mut backend = StubBackend::scripted(vec![
            vec![RawDetection::person(0.0, 0.0, 1.0, 1.0, 0.9)],
            vec![RawDetection::person(0.0, 0.0, 1.0, 1.0, 0.1)],
        ]);

        assert_eq!(backend.detect(&frame, &params)?.len(), 1);
        assert!(backend.detect(&frame, &params)?.is_empty());
        assert_eq!(backend.detect(&frame, &params)?.len(), 1);
        assert_eq!(backend.calls(), 3);
        Ok(())
    }

    #[test]
    fn scripted_failure_fires_once() {
        let frame = Frame::solid(4, 4, [0, 0, 0]);
        let params = DetectParams::person(0.5, 0.5);
        let mut backend = StubBackend::new().failing_on(1);

        assert!(backend.detect(&frame, &params).is_ok());
        assert!(backend.detect(&frame, &params).is_err());
        assert!(backend.detect(&frame, &params).is_ok());
    }
}
