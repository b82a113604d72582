//! RGB fill colors as they appear in `w:shd@w:fill`, `a:srgbClr@val` and VML `fillcolor`.

use std::fmt::Display;

/// An sRGB color with 8-bit channels
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// Parses `RRGGBB` or `#RRGGBB`, optionally followed by VML decorations such as
    /// `#ffc000 [3207]`. Returns `None` for `auto` and named colors.
    pub fn parse_hex(value: &str) -> Option<Rgb> {
        let hex = value.trim().trim_start_matches('#');
        let hex = hex.split_whitespace().next()?;
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
        Some(Rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    /// True when every channel differs by at most `tolerance`
    pub fn is_near(&self, other: &Rgb, tolerance: u8) -> bool {
        self.0.abs_diff(other.0) <= tolerance
            && self.1.abs_diff(other.1) <= tolerance
            && self.2.abs_diff(other.2) <= tolerance
    }
}

impl Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}

/// Removes near-duplicate colors, keeping the first occurrence of each
pub fn dedup_near(colors: &[Rgb], tolerance: u8) -> Vec<Rgb> {
    let mut distinct: Vec<Rgb> = Vec::new();
    for color in colors {
        if !distinct.iter().any(|seen| seen.is_near(color, tolerance)) {
            distinct.push(*color);
        }
    }
    distinct
}
