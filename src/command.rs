//! Text command for setting the strip color
//!
//! Accepts `ledcolor #rrggbb`, `ledcolor #rrggbbww` and the URL-encoded form
//! `ledcolor=%23rrggbb` as sent by the web UI.

use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;
use log::{debug, info, warn};

use crate::LedError;
use crate::color::Rgbw;
use crate::led_control::{ALL_LEDS, LedStrip};

/// Command keyword
pub const LED_COLOR_COMMAND: &str = "ledcolor";

/// Maximum number of hex pairs (R, G, B, W)
const MAX_CHANNELS: usize = 4;

fn hex_pair(pair: &[u8]) -> Result<u8, LedError> {
    let digit = |c: u8| match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(LedError::InvalidArgument),
    };
    match pair {
        [hi, lo] => Ok((digit(*hi)? << 4) | digit(*lo)?),
        _ => Err(LedError::InvalidArgument),
    }
}

/// Parse a `#rrggbb` / `#rrggbbww` color, `%23` standing in for `#`.
///
/// Three equal RGB pairs mean "white": the value moves to the W channel and RGB is zeroed.
pub fn parse_led_color(arg: &str) -> Result<Rgbw, LedError> {
    let arg = arg.trim();
    let Some(hex) = arg.strip_prefix('#').or_else(|| arg.strip_prefix("%23")) else {
        warn!("[CMD] Invalid led color {:?}, expected #rrggbb or #rrggbbww", arg);
        return Err(LedError::InvalidArgument);
    };

    let bytes = hex.as_bytes();
    if bytes.len() % 2 != 0 {
        warn!("[CMD] Odd number of hex digits in {:?}", arg);
        return Err(LedError::InvalidArgument);
    }

    let mut channels: Vec<u8, MAX_CHANNELS> = Vec::new();
    for pair in bytes.chunks(2) {
        channels
            .push(hex_pair(pair)?)
            .map_err(|_| LedError::InvalidArgument)?;
    }

    let color = match channels.as_slice() {
        [r, g, b] if r == g && g == b => Rgbw::new(0, 0, 0, *r),
        [r, g, b] => Rgbw::new(*r, *g, *b, 0),
        [r, g, b, w] => Rgbw::new(*r, *g, *b, *w),
        _ => {
            warn!("[CMD] Expected 3 or 4 color channels, got {}", channels.len());
            return Err(LedError::InvalidArgument);
        }
    };

    debug!(
        "[CMD] Colors: {:02X} {:02X} {:02X} {:02X}",
        color.r, color.g, color.b, color.w
    );
    Ok(color)
}

/// Paint every LED of a segment (the first one when `segment` is `None`) and publish it
pub async fn apply<M: RawMutex>(
    strip: &LedStrip<'_, M>,
    segment: Option<&str>,
    color: Rgbw,
) -> Result<(), LedError> {
    let target = strip.segment(segment)?;
    strip.set_led(target.name, ALL_LEDS, color)?;
    strip.flip().await?;
    info!("[CMD] Segment '{}' set to {:?}", target.name, color);
    Ok(())
}

/// Handle one command line. Returns `Ok(false)` when the line is not a color command.
pub async fn handle_line<M: RawMutex>(
    strip: &LedStrip<'_, M>,
    line: &str,
) -> Result<bool, LedError> {
    let Some(rest) = line.trim().strip_prefix(LED_COLOR_COMMAND) else {
        return Ok(false);
    };

    let Some(arg) = rest.strip_prefix([' ', '=']) else {
        warn!("[CMD] '{}' requires an argument", LED_COLOR_COMMAND);
        return Err(LedError::InvalidArgument);
    };

    let color = parse_led_color(arg)?;
    apply(strip, None, color).await?;
    Ok(true)
}
