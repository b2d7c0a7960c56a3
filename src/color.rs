//! Color conversions for the bundled animators
//!
//! Hue uses the 0-179 range (half degrees) so it fits in a byte, like OpenCV does.
//! Saturation and value are 0-255. The white channel does not take part in the
//! conversion and comes back as zero.

/// Number of distinct hue steps
pub const HUE_RANGE: u8 = 180;

/// One LED worth of channels, in logical order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgbw {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub w: u8,
}

impl Rgbw {
    pub const fn new(r: u8, g: u8, b: u8, w: u8) -> Self {
        Self { r, g, b, w }
    }

    /// Channels in wire order (G, R, B, W)
    pub const fn to_grbw(self) -> [u8; 4] {
        [self.g, self.r, self.b, self.w]
    }

    /// Build from wire order bytes; missing channels read as zero
    pub fn from_grbw(bytes: &[u8]) -> Self {
        let at = |i: usize| bytes.get(i).copied().unwrap_or(0);
        Self {
            g: at(0),
            r: at(1),
            b: at(2),
            w: at(3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Hsv {
    /// 0-179
    pub h: u8,
    pub s: u8,
    pub v: u8,
}

impl Hsv {
    pub const fn new(h: u8, s: u8, v: u8) -> Self {
        Self { h, s, v }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn rgbw_to_hsv(px: Rgbw) -> Hsv {
    let r = i32::from(px.r);
    let g = i32::from(px.g);
    let b = i32::from(px.b);

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    if max == 0 {
        return Hsv::new(0, 0, 0);
    }

    let s = (255 * delta + max / 2) / max;
    if delta == 0 {
        // gray, hue is meaningless
        return Hsv::new(0, 0, max as u8);
    }

    // 30 half-degrees per 60 degree sector, rounded
    let sector = |diff: i32| (30 * diff * 2 + delta).div_euclid(2 * delta);
    let mut h = if max == r {
        sector(g - b)
    } else if max == g {
        60 + sector(b - r)
    } else {
        120 + sector(r - g)
    };
    h = h.rem_euclid(i32::from(HUE_RANGE));

    Hsv::new(h as u8, s as u8, max as u8)
}

#[allow(clippy::cast_possible_truncation)]
pub fn hsv_to_rgbw(hsv: Hsv) -> Rgbw {
    let v = u32::from(hsv.v);
    let s = u32::from(hsv.s);

    if s == 0 || v == 0 {
        let v = v as u8;
        return Rgbw::new(v, v, v, 0);
    }

    let h = u32::from(hsv.h % HUE_RANGE);
    let region = h / 30;
    let remainder = (h - region * 30) * 255 / 30;

    let p = (v * (255 - s) / 255) as u8;
    let q = (v * (255 - s * remainder / 255) / 255) as u8;
    let t = (v * (255 - s * (255 - remainder) / 255) / 255) as u8;
    let v = v as u8;

    match region {
        0 => Rgbw::new(v, t, p, 0),
        1 => Rgbw::new(q, v, p, 0),
        2 => Rgbw::new(p, v, t, 0),
        3 => Rgbw::new(p, q, v, 0),
        4 => Rgbw::new(t, p, v, 0),
        _ => Rgbw::new(v, p, q, 0),
    }
}

/// Rotate a hue by `offset` steps around the 0-179 circle
pub fn shift_hue(h: u8, offset: u8) -> u8 {
    ((u16::from(h) + u16::from(offset)) % u16::from(HUE_RANGE)) as u8
}
