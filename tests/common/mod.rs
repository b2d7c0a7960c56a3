//! Host stand-ins for the RMT channel and the GPIO lines.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Instant};
use pixelstrip_board::{
    LedError, LedStrip, PinControl, PinMode, PixelType, PulseChannel, PulseItem, SegmentConfig,
    StripOptions,
};

pub type Strip<'b> = LedStrip<'b, CriticalSectionRawMutex>;
pub type Bus = pixelstrip_board::SharedBus<CriticalSectionRawMutex>;

/// RMT tick rate used on the board (80MHz / 2)
pub const CLOCK_HZ: u32 = 40_000_000;

/// RGBW ring followed by three UV LEDs
pub const SEGMENTS: [SegmentConfig; 2] = [
    SegmentConfig::new("A", PixelType::Rgbw, 8),
    SegmentConfig::new("B", PixelType::Uv3, 3),
];

pub fn options() -> StripOptions {
    StripOptions::new().with_refresh_tick(Duration::from_millis(1))
}

/// What went over the data line
#[derive(Clone, Default)]
pub struct Wire {
    frames: Arc<Mutex<Vec<(Instant, Vec<u8>)>>>,
    failures: Arc<AtomicUsize>,
    acquired: Arc<AtomicUsize>,
}

impl Wire {
    pub fn frames(&self) -> Vec<Vec<u8>> {
        let frames = self.frames.lock().unwrap();
        frames.iter().map(|(_, bytes)| bytes.clone()).collect()
    }

    pub fn timestamps(&self) -> Vec<Instant> {
        let frames = self.frames.lock().unwrap();
        frames.iter().map(|(at, _)| *at).collect()
    }

    pub fn last(&self) -> Option<Vec<u8>> {
        self.frames.lock().unwrap().last().map(|(_, bytes)| bytes.clone())
    }

    pub fn count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    /// Make the next `n` transmissions fail
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// How many times a channel on this wire was brought up
    pub fn acquisitions(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }
}

/// Pulse channel that decodes every frame back into bytes
pub struct RecordingChannel {
    wire: Wire,
    clock_hz: u32,
}

impl RecordingChannel {
    pub fn new(wire: &Wire) -> Self {
        Self::with_clock(wire, CLOCK_HZ)
    }

    pub fn with_clock(wire: &Wire, clock_hz: u32) -> Self {
        Self {
            wire: wire.clone(),
            clock_hz,
        }
    }
}

impl PulseChannel for RecordingChannel {
    fn acquire(&mut self) -> Result<u32, LedError> {
        if self.clock_hz == 0 {
            return Err(LedError::HardwareInitFailed);
        }
        self.wire.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(self.clock_hz)
    }

    async fn transmit(&mut self, pulses: &[PulseItem]) -> Result<(), LedError> {
        let failures = &self.wire.failures;
        if failures.load(Ordering::SeqCst) > 0 {
            failures.fetch_sub(1, Ordering::SeqCst);
            return Err(LedError::WriteFailed);
        }

        assert_eq!(pulses.len() % 8, 0, "frame must hold whole bytes");
        // a 1-bit has the longer (or equal) high phase
        let bytes = pulses
            .chunks_exact(8)
            .map(|bits| {
                bits.iter()
                    .fold(0u8, |acc, p| (acc << 1) | u8::from(p.duration0 >= p.duration1))
            })
            .collect();
        self.wire
            .frames
            .lock()
            .unwrap()
            .push((Instant::now(), bytes));
        Ok(())
    }
}

/// Pin control that logs every call
#[derive(Clone, Default)]
pub struct RecordingPins {
    modes: Arc<Mutex<Vec<(u8, PinMode)>>>,
    writes: Arc<Mutex<Vec<(u8, bool)>>>,
}

impl RecordingPins {
    pub fn modes(&self) -> Vec<(u8, PinMode)> {
        self.modes.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<(u8, bool)> {
        self.writes.lock().unwrap().clone()
    }
}

impl PinControl for RecordingPins {
    fn set_mode(&mut self, pin: u8, mode: PinMode) -> Result<(), LedError> {
        self.modes.lock().unwrap().push((pin, mode));
        Ok(())
    }

    fn digital_write(&mut self, pin: u8, high: bool) -> Result<(), LedError> {
        self.writes.lock().unwrap().push((pin, high));
        Ok(())
    }
}
