//! One-wire LED protocol encoder
//!
//! Each data bit becomes one two-phase pulse: a short high followed by a long low for a
//! 0-bit, a long high followed by a short low for a 1-bit. Bytes are sent MSB first.
//! Tick durations are derived once from the channel clock rate.

use embassy_time::Duration;

use crate::LedError;

/// Longest duration a single pulse phase can hold (15-bit RMT field)
pub const MAX_PHASE_TICKS: u32 = 0x7FFF;

/// Nominal protocol timing windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitTiming {
    pub t0h_ns: u32,
    pub t0l_ns: u32,
    pub t1h_ns: u32,
    pub t1l_ns: u32,
    /// Minimum low-level silence between two frames
    pub reset: Duration,
}

/// A two-phase pulse descriptor, laid out like an RMT item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PulseItem {
    pub level0: bool,
    pub duration0: u16,
    pub level1: bool,
    pub duration1: u16,
}

impl PulseItem {
    pub const fn new(level0: bool, duration0: u16, level1: bool, duration1: u16) -> Self {
        Self {
            level0,
            duration0,
            level1,
            duration1,
        }
    }

    /// Pack into the 32-bit RMT memory word (duration0 in bits 0-14, level0 in bit 15,
    /// duration1 in bits 16-30, level1 in bit 31)
    pub const fn to_raw(self) -> u32 {
        let low = (self.duration0 as u32 & MAX_PHASE_TICKS) | ((self.level0 as u32) << 15);
        let high = (self.duration1 as u32 & MAX_PHASE_TICKS) | ((self.level1 as u32) << 15);
        low | (high << 16)
    }
}

/// Result of one encoder call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translated {
    /// Source bytes consumed
    pub bytes: usize,
    /// Pulse items written
    pub items: usize,
}

/// Hardware that can play back a pulse train on the data pin
#[allow(async_fn_in_trait)]
pub trait PulseChannel {
    /// Route the channel to the data pin and report its tick rate after the clock
    /// divider. Called on every init, the pin may have been handed to the SD card since.
    fn acquire(&mut self) -> Result<u32, LedError>;

    /// Send one frame and return once the hardware finished
    async fn transmit(&mut self, pulses: &[PulseItem]) -> Result<(), LedError>;
}

/// Round `ns` at `clock_hz` to the nearest tick
fn ns_to_ticks(ns: u32, clock_hz: u32) -> u64 {
    (u64::from(ns) * u64::from(clock_hz) + 500_000_000) / 1_000_000_000
}

fn phase_ticks(ns: u32, clock_hz: u32) -> Result<u16, LedError> {
    let ticks = ns_to_ticks(ns, clock_hz);
    if ticks == 0 || ticks > u64::from(MAX_PHASE_TICKS) {
        return Err(LedError::HardwareInitFailed);
    }
    u16::try_from(ticks).map_err(|_| LedError::HardwareInitFailed)
}

/// Byte to pulse translator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseEncoder {
    zero: PulseItem,
    one: PulseItem,
    reset: Duration,
}

impl PulseEncoder {
    /// Derive the bit shapes for a channel running at `clock_hz`.
    ///
    /// Fails with `HardwareInitFailed` when a phase rounds to zero ticks or overflows
    /// the pulse field.
    pub fn new(timing: &BitTiming, clock_hz: u32) -> Result<Self, LedError> {
        let zero = PulseItem::new(
            true,
            phase_ticks(timing.t0h_ns, clock_hz)?,
            false,
            phase_ticks(timing.t0l_ns, clock_hz)?,
        );
        let one = PulseItem::new(
            true,
            phase_ticks(timing.t1h_ns, clock_hz)?,
            false,
            phase_ticks(timing.t1l_ns, clock_hz)?,
        );

        Ok(Self {
            zero,
            one,
            reset: timing.reset,
        })
    }

    /// Pulse used for a 0-bit
    pub fn zero(&self) -> PulseItem {
        self.zero
    }

    /// Pulse used for a 1-bit
    pub fn one(&self) -> PulseItem {
        self.one
    }

    /// Silence required between frames
    pub fn reset(&self) -> Duration {
        self.reset
    }

    /// Encode a single byte, MSB first
    pub fn byte_to_pulses(&self, byte: u8) -> [PulseItem; 8] {
        let mut pulses = [self.zero; 8];
        for (i, pulse) in pulses.iter_mut().enumerate() {
            if (byte >> (7 - i)) & 1 == 1 {
                *pulse = self.one;
            }
        }
        pulses
    }

    /// Translate as many whole bytes of `src` as fit in `wanted_num` pulse items.
    ///
    /// The peripheral may ask for fewer items than the full buffer needs; the caller
    /// resumes from `src[bytes..]` on the next call. Empty input or output translates
    /// nothing.
    pub fn translate(&self, src: &[u8], dest: &mut [PulseItem], wanted_num: usize) -> Translated {
        let budget = wanted_num.min(dest.len()) / 8;
        let bytes = budget.min(src.len());

        for (byte, chunk) in src[..bytes].iter().zip(dest.chunks_exact_mut(8)) {
            chunk.copy_from_slice(&self.byte_to_pulses(*byte));
        }

        Translated {
            bytes,
            items: bytes * 8,
        }
    }
}
