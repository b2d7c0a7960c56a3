//! LED segment model
//!
//! A strip chain is described as an ordered list of named segments. Every LED channel is
//! called a "pixel" here, so an RGBW LED occupies four pixels and an RGB LED three.
//! Segments are laid out back to back in declaration order inside the shared buffers.

use alloc::vec::Vec;
use core::ops::Range;

use log::info;

use crate::LedError;

/// LED package types supported on the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    /// 3 pixels per LED - G, R, B
    Rgb,
    /// 4 pixels per LED - G, R, B, W
    Rgbw,
    /// 3 pixels per LED, all UV
    Uv3,
}

impl PixelType {
    /// Number of byte channels one LED of this type occupies
    pub const fn channels(self) -> usize {
        match self {
            PixelType::Rgb | PixelType::Uv3 => 3,
            PixelType::Rgbw => 4,
        }
    }
}

/// Static description of one segment, as written by the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentConfig {
    pub name: &'static str,
    pub pixel_type: PixelType,
    pub led_count: usize,
}

impl SegmentConfig {
    pub const fn new(name: &'static str, pixel_type: PixelType, led_count: usize) -> Self {
        Self {
            name,
            pixel_type,
            led_count,
        }
    }
}

/// A configured segment with its derived buffer placement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub name: &'static str,
    pub pixel_type: PixelType,
    pub led_count: usize,
    /// `led_count * channels`
    pub pixel_count: usize,
    /// Byte offset of the first pixel inside the shared buffers
    pub first_pixel_offset: usize,
    /// Index of the first LED counted across the whole chain
    pub first_led_index: usize,
}

impl Segment {
    /// Byte range of this segment inside the draw and output buffers
    pub fn range(&self) -> Range<usize> {
        self.first_pixel_offset..self.first_pixel_offset + self.pixel_count
    }

    pub fn channels(&self) -> usize {
        self.pixel_type.channels()
    }

    /// Byte range of a single LED, relative to the segment start
    pub(crate) fn led_range(&self, index: usize) -> Option<Range<usize>> {
        if index >= self.led_count {
            return None;
        }
        let start = index * self.channels();
        Some(start..start + self.channels())
    }
}

/// Computed layout of the whole chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    segments: Vec<Segment>,
    total_pixels: usize,
}

impl Layout {
    /// Assign offsets to the configured segments in declaration order.
    ///
    /// Fails with `InvalidArgument` on an empty list, duplicate names or a size overflow.
    pub fn new(configs: &[SegmentConfig]) -> Result<Self, LedError> {
        if configs.is_empty() {
            return Err(LedError::InvalidArgument);
        }

        let mut segments = Vec::new();
        segments
            .try_reserve_exact(configs.len())
            .map_err(|_| LedError::OutOfMemory)?;

        let mut offset = 0usize;
        let mut led_index = 0usize;
        for config in configs {
            if segments.iter().any(|s: &Segment| s.name == config.name) {
                return Err(LedError::InvalidArgument);
            }

            let pixel_count = config
                .led_count
                .checked_mul(config.pixel_type.channels())
                .ok_or(LedError::InvalidArgument)?;

            segments.push(Segment {
                name: config.name,
                pixel_type: config.pixel_type,
                led_count: config.led_count,
                pixel_count,
                first_pixel_offset: offset,
                first_led_index: led_index,
            });

            offset = offset
                .checked_add(pixel_count)
                .ok_or(LedError::InvalidArgument)?;
            led_index = led_index
                .checked_add(config.led_count)
                .ok_or(LedError::InvalidArgument)?;
        }

        info!(
            "[LED] Layout: {} segments, {} LEDs, {} bytes",
            segments.len(),
            led_index,
            offset
        );

        Ok(Self {
            segments,
            total_pixels: offset,
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Length of each of the two pixel buffers
    pub fn total_pixels(&self) -> usize {
        self.total_pixels
    }

    pub fn total_leds(&self) -> usize {
        self.segments.iter().map(|s| s.led_count).sum()
    }

    pub fn find(&self, name: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.name == name)
    }

    /// Look up a segment by name, or the first segment when no name is given
    pub fn lookup(&self, name: Option<&str>) -> Option<&Segment> {
        match name {
            Some(name) => self.find(name),
            None => self.segments.first(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_segment_contributes_no_bytes() {
        let layout = Layout::new(&[
            SegmentConfig::new("Empty", PixelType::Rgb, 0),
            SegmentConfig::new("Tail", PixelType::Rgbw, 2),
        ])
        .unwrap();

        let tail = layout.find("Tail").unwrap();
        assert_eq!(tail.first_pixel_offset, 0);
        assert_eq!(tail.first_led_index, 0);
        assert_eq!(layout.total_pixels(), 8);
    }

    #[test]
    fn led_range_rejects_out_of_bounds() {
        let layout = Layout::new(&[SegmentConfig::new("Uv", PixelType::Uv3, 3)]).unwrap();
        let uv = layout.find("Uv").unwrap();
        assert_eq!(uv.led_range(2), Some(6..9));
        assert_eq!(uv.led_range(3), None);
    }
}
