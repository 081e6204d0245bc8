//! Hex color parsing for colors supplied in request payloads.
//!
//! The bot backend sends colors as `#RRGGBB` or `#RRGGBBAA`. Short forms
//! (`#RGB`, `#RGBA`) are accepted as well.

use crate::error::{CardError, CardResult};

/// Straight (non-premultiplied) RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::rgb(255, 255, 255);
    pub const BLACK: Rgba = Rgba::rgb(0, 0, 0);
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// Same color with a different alpha.
    pub const fn with_alpha(self, a: u8) -> Self {
        Self::new(self.r, self.g, self.b, a)
    }
}

/// Parse `#RRGGBB`, `#RRGGBBAA`, `#RGB` or `#RGBA` (leading `#` optional).
pub fn parse_hex_color(input: &str) -> CardResult<Rgba> {
    let s = input.trim().trim_start_matches('#');
    let invalid = || CardError::InvalidRequest(format!("Invalid color '{}'", input));

    if !s.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let byte = |i: usize| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| invalid());
    let nibble = |i: usize| {
        u8::from_str_radix(&s[i..i + 1], 16)
            .map(|v| v * 17)
            .map_err(|_| invalid())
    };

    match s.len() {
        6 => Ok(Rgba::rgb(byte(0)?, byte(2)?, byte(4)?)),
        8 => Ok(Rgba::new(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
        3 => Ok(Rgba::rgb(nibble(0)?, nibble(1)?, nibble(2)?)),
        4 => Ok(Rgba::new(nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?)),
        _ => Err(invalid()),
    }
}
