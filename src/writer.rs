//! `smart-leds` adapter
//!
//! Lets the usual `smart_leds` iterator helpers (`brightness`, `gamma`, ...) draw into one
//! segment. Writes land in the draw buffer; call [`LedStrip::flip`] to publish them.

use embassy_sync::blocking_mutex::raw::RawMutex;
use log::warn;
use smart_leds::{RGB8, SmartLedsWrite};

use crate::LedError;
use crate::color::Rgbw;
use crate::led_control::LedStrip;

/// Sequential writer for the LEDs of one segment
pub struct SegmentWriter<'a, M: RawMutex> {
    strip: &'a LedStrip<'a, M>,
    segment: &'static str,
}

impl<'a, M: RawMutex> SegmentWriter<'a, M> {
    /// Writer for the named segment, or the first one when `segment` is `None`
    pub fn new(strip: &'a LedStrip<'a, M>, segment: Option<&str>) -> Result<Self, LedError> {
        let segment = strip.segment(segment)?.name;
        Ok(Self { strip, segment })
    }

    pub fn segment(&self) -> &'static str {
        self.segment
    }
}

impl<M: RawMutex> SmartLedsWrite for SegmentWriter<'_, M> {
    type Error = LedError;
    type Color = RGB8;

    /// Write colors starting at LED 0. The white channel of RGBW LEDs is cleared; LEDs past
    /// the end of the iterator keep their previous value.
    fn write<T, I>(&mut self, iterator: T) -> Result<(), Self::Error>
    where
        T: IntoIterator<Item = I>,
        I: Into<Self::Color>,
    {
        let leds = self.strip.segment(Some(self.segment))?.led_count;

        for (index, color) in iterator.into_iter().enumerate() {
            if index >= leds {
                warn!(
                    "[LED] Segment '{}' has {} LEDs, ignoring the rest",
                    self.segment, leds
                );
                return Err(LedError::InvalidArgument);
            }
            let RGB8 { r, g, b } = color.into();
            let index = i32::try_from(index).map_err(|_| LedError::InvalidArgument)?;
            self.strip.set_led(self.segment, index, Rgbw::new(r, g, b, 0))?;
        }
        Ok(())
    }
}
