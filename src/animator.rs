//! Animator and filter hooks
//!
//! An animator runs inside the refresh task once per segment per cycle and writes the
//! output buffer directly. State that moves with time advances in `end_cycle`, so every
//! segment of one frame sees the same step. A filter runs during `flip()` and transforms the whole draw
//! buffer into the output buffer. Filters are not applied to animated frames.

use embassy_time::Duration;

use crate::color::{Rgbw, hsv_to_rgbw, rgbw_to_hsv, shift_hue};
use crate::config;
use crate::segment::{PixelType, Segment};

/// The slice of both buffers belonging to one segment
pub struct SegmentFrame<'a> {
    pub segment: &'a Segment,
    /// Caller-authored pixels, read only while animating
    pub draw: &'a [u8],
    /// Pixels about to be sent
    pub output: &'a mut [u8],
}

/// Per-cycle pixel generator
///
/// Animators must not call back into the strip: they run while its buffers are locked.
pub trait Animator {
    /// Update `frame.output`; return `true` when it changed and needs sending
    fn process(&mut self, frame: SegmentFrame<'_>) -> bool;

    /// Called once after every segment of a cycle has been processed
    fn end_cycle(&mut self) {}

    /// Pause the refresh task takes after an animated cycle
    fn frame_interval(&self) -> Duration {
        Duration::from_ticks(0)
    }
}

impl<F> Animator for F
where
    F: FnMut(SegmentFrame<'_>) -> bool,
{
    fn process(&mut self, frame: SegmentFrame<'_>) -> bool {
        self(frame)
    }
}

/// Byte transform applied on flip
pub trait Filter {
    /// Fill `dest` from `source` (same length); return `false` to reject
    fn apply(&mut self, dest: &mut [u8], source: &[u8]) -> bool;
}

impl<F> Filter for F
where
    F: FnMut(&mut [u8], &[u8]) -> bool,
{
    fn apply(&mut self, dest: &mut [u8], source: &[u8]) -> bool {
        self(dest, source)
    }
}

/// Cycles the hue of whatever has been drawn into RGBW segments
#[derive(Debug, Clone)]
pub struct HueCycleAnimator {
    offset: u8,
    step: u8,
    interval: Duration,
}

impl HueCycleAnimator {
    pub const fn new() -> Self {
        Self {
            offset: 0,
            step: 1,
            interval: config::ANIMATION_FRAME_INTERVAL,
        }
    }

    /// Hue steps added per refresh cycle
    pub const fn with_step(mut self, step: u8) -> Self {
        self.step = step;
        self
    }

    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn offset(&self) -> u8 {
        self.offset
    }
}

impl Default for HueCycleAnimator {
    fn default() -> Self {
        Self::new()
    }
}

impl Animator for HueCycleAnimator {
    fn process(&mut self, frame: SegmentFrame<'_>) -> bool {
        if frame.segment.pixel_type != PixelType::Rgbw {
            return false;
        }

        let offset = self.offset;
        for (src, dst) in frame.draw.chunks_exact(4).zip(frame.output.chunks_exact_mut(4)) {
            let px = Rgbw::from_grbw(src);
            let mut hsv = rgbw_to_hsv(px);
            hsv.h = shift_hue(hsv.h, offset);

            let mut shifted = hsv_to_rgbw(hsv);
            shifted.w = px.w;
            dst.copy_from_slice(&shifted.to_grbw());
        }
        true
    }

    fn end_cycle(&mut self) {
        self.offset = shift_hue(self.offset, self.step);
    }

    fn frame_interval(&self) -> Duration {
        self.interval
    }
}

/// Rotates the drawn RGBW pattern along the segment
#[derive(Debug, Clone)]
pub struct ChaseAnimator {
    offset: usize,
    interval: Duration,
}

impl ChaseAnimator {
    pub const fn new() -> Self {
        Self {
            offset: 0,
            interval: config::ANIMATION_FRAME_INTERVAL,
        }
    }

    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl Default for ChaseAnimator {
    fn default() -> Self {
        Self::new()
    }
}

impl Animator for ChaseAnimator {
    fn process(&mut self, frame: SegmentFrame<'_>) -> bool {
        let leds = frame.segment.led_count;
        if frame.segment.pixel_type != PixelType::Rgbw || leds == 0 {
            return false;
        }

        let offset = self.offset % leds;
        for (i, dst) in frame.output.chunks_exact_mut(4).enumerate() {
            let from = ((i + offset) % leds) * 4;
            dst.copy_from_slice(&frame.draw[from..from + 4]);
        }
        true
    }

    fn end_cycle(&mut self) {
        self.offset = self.offset.wrapping_add(1);
    }

    fn frame_interval(&self) -> Duration {
        self.interval
    }
}

/// Scales every channel by `scale / 256`, like FastLED's `scale8`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrightnessFilter {
    pub scale: u8,
}

impl BrightnessFilter {
    pub const fn new(scale: u8) -> Self {
        Self { scale }
    }
}

#[inline]
#[allow(clippy::cast_possible_truncation)]
fn scale8(value: u8, scale: u8) -> u8 {
    ((u16::from(value) * (1 + u16::from(scale))) >> 8) as u8
}

impl Filter for BrightnessFilter {
    fn apply(&mut self, dest: &mut [u8], source: &[u8]) -> bool {
        if dest.len() != source.len() {
            return false;
        }
        for (d, s) in dest.iter_mut().zip(source) {
            *d = scale8(*s, self.scale);
        }
        true
    }
}
