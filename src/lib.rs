#![cfg_attr(not(test), no_std)]

//! ESP32 Camera Module Pixel-Strip Library
//!
//! This library drives a chain of heterogeneous one-wire LED segments (RGB, RGBW, UV)
//! from a single data pin. Callers draw into a double-buffered pixel store, flip it to the
//! output buffer and a dedicated refresh task encodes the bytes into RMT pulses.

extern crate alloc;

pub mod animator;
pub mod color;
pub mod command;
pub mod encoder;
pub mod led_control;
pub mod pins;
pub mod refresh;
pub mod segment;
pub mod writer;

#[cfg(feature = "esp32c3")]
pub mod rmt;

pub use animator::{Animator, BrightnessFilter, ChaseAnimator, Filter, HueCycleAnimator, SegmentFrame};
pub use color::{Hsv, Rgbw, hsv_to_rgbw, rgbw_to_hsv};
pub use encoder::{BitTiming, PulseChannel, PulseEncoder, PulseItem, Translated};
pub use led_control::{ALL_LEDS, HookRetention, LedStrip, StripOptions};
pub use pins::{BusOwner, PinControl, PinMode, SharedBus, WhiteLight};
pub use refresh::Refresher;
pub use segment::{Layout, PixelType, Segment, SegmentConfig};
pub use writer::SegmentWriter;

/// Project version information
pub const VERSION: &str = "0.1.0-dev";

/// Default configuration constants
pub mod config {
    use embassy_time::Duration;

    use crate::encoder::BitTiming;

    /// LED strip data GPIO pin
    pub const LED_STRIP_DATA_PIN: u8 = 13;

    /// GPIO lines shared between the LED strip and the SD card interface
    pub const SD_SHARED_PINS: [u8; 2] = [12, 13];

    /// Onboard white light, also toggled by SD card traffic
    pub const WHITE_LIGHT_PIN: u8 = 4;

    /// RMT source clock in MHz
    pub const RMT_SOURCE_MHZ: u32 = 80;

    /// RMT channel clock divider (40MHz ticks = 25ns)
    pub const RMT_CLOCK_DIVIDER: u8 = 2;

    /// SK6812 timing: 0-bit = 300ns high + 900ns low, 1-bit = 600ns high + 600ns low
    pub const SK6812_TIMING: BitTiming = BitTiming {
        t0h_ns: 300,
        t0l_ns: 900,
        t1h_ns: 600,
        t1l_ns: 600,
        reset: Duration::from_micros(280),
    };

    /// Pause between refresh cycles when no animator is installed
    pub const REFRESH_TICK: Duration = Duration::from_millis(10);

    /// Upper bound for one frame on the wire
    pub const TRANSMIT_TIMEOUT: Duration = Duration::from_millis(100);

    /// How long deinit waits for the refresh task to confirm shutdown
    pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

    /// Tries the refresh task gives the blanking frame on its way out
    pub const SHUTDOWN_BLANK_ATTEMPTS: u32 = 3;

    /// Pulse items produced per encoder call
    pub const ENCODER_BATCH_ITEMS: usize = 64;

    /// Frame interval of the bundled animators (~30fps)
    pub const ANIMATION_FRAME_INTERVAL: Duration = Duration::from_millis(33);
}

/// Error types for the pixel strip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedError {
    /// Operation before init or after deinit
    NotInitialized,
    /// Unknown segment name, index out of range or malformed input
    InvalidArgument,
    /// Pixel or pulse buffer allocation failed
    OutOfMemory,
    /// Pulse peripheral setup or clock query failed
    HardwareInitFailed,
    /// Frame submission or completion wait failed, or the strip could not be blanked
    WriteFailed,
    /// Shared GPIO lines are held by the SD card interface
    PinConflict,
}

impl core::fmt::Display for LedError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            LedError::NotInitialized => "led strip not initialized",
            LedError::InvalidArgument => "invalid argument",
            LedError::OutOfMemory => "out of memory",
            LedError::HardwareInitFailed => "pulse peripheral init failed",
            LedError::WriteFailed => "frame transmission failed",
            LedError::PinConflict => "shared pins owned by sd card",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for LedError {}
