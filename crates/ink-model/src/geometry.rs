use crate::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position in surface pixel space.
///
/// Origin is the top-left corner of the rendered page surface, x grows to the
/// right and y grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Point at parameter `t` on the straight line from `self` to `other`
    pub fn lerp(&self, other: &Point, t: f32) -> Point {
        Point { x: self.x + (other.x - self.x) * t, y: self.y + (other.y - self.y) * t }
    }
}

/// Pixel dimensions of a drawing surface or page viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceSize {
    pub width: f32,
    pub height: f32,
}

impl SurfaceSize {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Whole-pixel dimensions, never smaller than one pixel
    pub fn to_pixels(self) -> (u32, u32) {
        (self.width.round().max(1.0) as u32, self.height.round().max(1.0) as u32)
    }
}

/// RGBA color, serialized as a `#RRGGBB` / `#RRGGBBAA` literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0, a: 255 };
    pub const WHITE: Color = Color { r: 255, g: 255, b: 255, a: 255 };
    pub const RED: Color = Color { r: 255, g: 0, b: 0, a: 255 };
    pub const BLUE: Color = Color { r: 0, g: 0, b: 255, a: 255 };

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse `#RRGGBB` or `#RRGGBBAA`
    pub fn from_hex(literal: &str) -> Result<Self, ModelError> {
        let invalid = || ModelError::InvalidColor(literal.to_owned());
        let digits = literal.strip_prefix('#').ok_or_else(invalid)?;
        if !digits.is_ascii() || !(digits.len() == 6 || digits.len() == 8) {
            return Err(invalid());
        }

        let channel = |index: usize| {
            u8::from_str_radix(&digits[index * 2..index * 2 + 2], 16).map_err(|_| invalid())
        };

        let alpha = if digits.len() == 8 { channel(3)? } else { 255 };
        Ok(Self { r: channel(0)?, g: channel(1)?, b: channel(2)?, a: alpha })
    }

    /// Channels normalized to 0.0..=1.0
    pub fn to_normalized(&self) -> (f32, f32, f32, f32) {
        (
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        )
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)?;
        if self.a != 255 {
            write!(f, "{:02x}", self.a)?;
        }
        Ok(())
    }
}

impl TryFrom<String> for Color {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<Color> for String {
    fn from(value: Color) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_euclidean() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn lerp_hits_both_ends() {
        let a = Point::new(2.0, 2.0);
        let b = Point::new(12.0, 7.0);
        assert_eq!(a.lerp(&b, 0.0), a);
        assert_eq!(a.lerp(&b, 1.0), b);
        assert_eq!(a.lerp(&b, 0.5), Point::new(7.0, 4.5));
    }

    #[test]
    fn parses_hex_colors() {
        assert_eq!(Color::from_hex("#000000").unwrap(), Color::BLACK);
        assert_eq!(Color::from_hex("#FF0000").unwrap(), Color::RED);
        assert_eq!(Color::from_hex("#0000ff80").unwrap(), Color::new(0, 0, 255, 128));
    }

    #[test]
    fn rejects_malformed_hex_colors() {
        for literal in ["000000", "#fff", "#12345g", "#1234567", ""] {
            assert!(
                matches!(Color::from_hex(literal), Err(ModelError::InvalidColor(_))),
                "{literal:?} should be rejected"
            );
        }
    }

    #[test]
    fn color_serializes_as_literal() {
        let json = serde_json::to_string(&Color::rgb(18, 52, 86)).unwrap();
        assert_eq!(json, "\"#123456\"");

        let back: Color = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Color::rgb(18, 52, 86));
    }

    #[test]
    fn surface_size_rounds_to_whole_pixels() {
        assert_eq!(SurfaceSize::new(611.6, 791.2).to_pixels(), (612, 791));
        assert_eq!(SurfaceSize::new(0.0, 0.2).to_pixels(), (1, 1));
    }
}
