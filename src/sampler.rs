//! Keyframe sampling with carry-forward interpolation.
//!
//! Every `interval`-th frame (starting at frame 0) is a keyframe and gets a
//! fresh detection pass. Frames in between reuse the detections of the most
//! recent keyframe verbatim. The rolling set lives in an explicit
//! `CarryState` value that goes into and comes out of each `step`, so the
//! sampler can be driven without a video source.

use anyhow::{anyhow, bail, Result};

use crate::normalize::Detection;

/// Detection state of one decoded frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameRecord {
    pub index: u64,
    pub is_keyframe: bool,
    pub detections: Vec<Detection>,
}

/// Rolling state threaded from one frame to the next.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CarryState {
    next_index: u64,
    last: Vec<Detection>,
}

impl CarryState {
    /// Index the next `step` call must present.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Detections of the most recent keyframe (empty before the first one).
    pub fn last_detections(&self) -> &[Detection] {
        &self.last
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyframeSampler {
    interval: u32,
}

impl KeyframeSampler {
    pub fn new(interval: u32) -> Result<Self> {
        if interval == 0 {
            return Err(anyhow!("frame interval must be >= 1"));
        }
        Ok(Self { interval })
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn is_keyframe(&self, frame_index: u64) -> bool {
        frame_index % self.interval as u64 == 0
    }

    /// Advance by one frame.
    ///
    /// `detect` is only called on keyframes. A detection error is logged and
    /// recorded as an empty set; it never aborts the pass.
    pub fn step<F>(
        &self,
        state: CarryState,
        frame_index: u64,
        detect: F,
    ) -> Result<(CarryState, FrameRecord)>
    where
        F: FnOnce() -> Result<Vec<Detection>>,
    {
        if frame_index != state.next_index {
            bail!(
                "frame {} presented out of sequence (expected {})",
                frame_index,
                state.next_index
            );
        }

        let is_keyframe = self.is_keyframe(frame_index);
        let last = if is_keyframe {
            detect().unwrap_or_else(|err| {
                log::warn!("detection failed on keyframe {}: {:#}", frame_index, err);
                Vec::new()
            })
        } else {
            state.last
        };

        let record = FrameRecord {
            index: frame_index,
            is_keyframe,
            detections: last.clone(),
        };
        let next = CarryState {
            next_index: frame_index + 1,
            last,
        };
        Ok((next, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::PixelBox;

    fn det(x: u32, confidence: f32) -> Detection {
        Detection {
            bbox: PixelBox::from([x, 0, x + 10, 20]),
            confidence,
        }
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(KeyframeSampler::new(0).is_err());
    }

    #[test]
    fn keyframes_follow_the_modulus() {
        for interval in [1u32, 2, 3, 15] {
            let sampler = KeyframeSampler::new(interval).unwrap();
            assert!(sampler.is_keyframe(0));
            for i in 0..100u64 {
                assert_eq!(sampler.is_keyframe(i), i % interval as u64 == 0);
            }
        }
    }

    #[test]
    fn non_keyframes_repeat_the_last_keyframe() -> Result<()> {
        let sampler = KeyframeSampler::new(3)?;
        let mut state = CarryState::default();
        let mut records = Vec::new();
        let mut calls = 0;
        for i in 0..9u64 {
            let (next, record) = sampler.step(state, i, || {
                calls += 1;
                Ok(vec![det(i as u32, 0.5), det(i as u32 + 1, 0.25)])
            })?;
            state = next;
            records.push(record);
        }

        assert_eq!(calls, 3);
        for record in &records {
            let key = &records[(record.index - record.index % 3) as usize];
            assert!(key.is_keyframe);
            assert_eq!(record.detections, key.detections);
            assert_eq!(record.is_keyframe, record.index % 3 == 0);
        }
        assert_eq!(state.next_index(), 9);
        Ok(())
    }

    #[test]
    fn empty_keyframe_clears_the_carry() -> Result<()> {
        let sampler = KeyframeSampler::new(2)?;
        let (state, _) = sampler.step(CarryState::default(), 0, || Ok(vec![det(1, 0.9)]))?;
        let (state, r1) = sampler.step(state, 1, || unreachable!())?;
        assert_eq!(r1.detections.len(), 1);

        let (state, r2) = sampler.step(state, 2, || Ok(Vec::new()))?;
        let (_, r3) = sampler.step(state, 3, || unreachable!())?;
        assert!(r2.detections.is_empty());
        assert!(r3.detections.is_empty());
        Ok(())
    }

    #[test]
    fn failed_detection_becomes_an_empty_set() -> Result<()> {
        let sampler = KeyframeSampler::new(2)?;
        let (state, _) = sampler.step(CarryState::default(), 0, || Ok(vec![det(1, 0.9)]))?;
        let (state, _) = sampler.step(state, 1, || unreachable!())?;
        let (state, record) = sampler.step(state, 2, || Err(anyhow!("engine crashed")))?;

        assert!(record.is_keyframe);
        assert!(record.detections.is_empty());
        assert!(state.last_detections().is_empty());
        Ok(())
    }

    #[test]
    fn out_of_sequence_frames_are_rejected() -> Result<()> {
        let sampler = KeyframeSampler::new(5)?;
        let (state, _) = sampler.step(CarryState::default(), 0, || Ok(Vec::new()))?;
        assert!(sampler.step(state.clone(), 2, || Ok(Vec::new())).is_err());
        assert!(sampler.step(state, 0, || Ok(Vec::new())).is_err());
        Ok(())
    }
}
