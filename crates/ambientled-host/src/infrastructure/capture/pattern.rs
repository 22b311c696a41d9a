//! Synthetic capture backend: a rainbow that rotates along each segment.
//!
//! Needs no display.  Selected with `--capture pattern` to check controller
//! wiring, LED order (a flipped segment visibly runs the other way) and
//! calibration multipliers.

use crate::application::capture_loop::{CaptureError, CaptureHandle, CaptureRequest, CaptureService};

/// Seconds for the rainbow to travel once along a segment.
const CYCLE_SECONDS: f32 = 5.0;

#[derive(Debug, Default, Clone, Copy)]
pub struct PatternCaptureService;

impl PatternCaptureService {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureService for PatternCaptureService {
    fn create_capture(
        &self,
        request: &CaptureRequest,
    ) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        Ok(Box::new(PatternHandle {
            length: request.length,
            step: 1.0 / (request.fps.max(1) as f32 * CYCLE_SECONDS),
            phase: 0.0,
            frame: vec![0; request.frame_len()],
        }))
    }
}

struct PatternHandle {
    length: usize,
    step: f32,
    phase: f32,
    frame: Vec<u8>,
}

impl CaptureHandle for PatternHandle {
    fn grab(&mut self) -> Result<&[u8], CaptureError> {
        let length = self.length.max(1) as f32;
        for (i, led) in self.frame.chunks_exact_mut(3).enumerate() {
            led.copy_from_slice(&hue_to_rgb(self.phase + i as f32 / length));
        }
        self.phase = (self.phase + self.step).rem_euclid(1.0);
        Ok(&self.frame)
    }
}

/// Fully saturated, full value color for `hue` in turns (`0.0` = red).
fn hue_to_rgb(hue: f32) -> [u8; 3] {
    let h = hue.rem_euclid(1.0) * 6.0;
    let sector = h.floor();
    let rise = ((h - sector) * 255.0).round() as u8;
    let fall = 255 - rise;
    match sector as u8 {
        0 => [255, rise, 0],
        1 => [fall, 255, 0],
        2 => [0, 255, rise],
        3 => [0, fall, 255],
        4 => [rise, 0, 255],
        _ => [255, 0, fall],
    }
}
