//! Colors
//!
//! RGBA colors with CSS name / hex parsing.

use std::fmt;

/// RGBA color, 8 bits per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// From channel values in `0.0..=1.0` (clamped)
    pub fn from_unit(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self {
            r: unit_to_byte(r),
            g: unit_to_byte(g),
            b: unit_to_byte(b),
            a: unit_to_byte(a),
        }
    }

    /// From hue, saturation and brightness in `0.0..=1.0`
    pub fn from_hsb(h: f64, s: f64, b: f64) -> Self {
        let hue = h.rem_euclid(1.0) * 360.0;
        let c = csscolorparser::Color::from_hsva(hue, s.clamp(0.0, 1.0), b.clamp(0.0, 1.0), 1.0);
        let [r, g, b, a] = c.to_rgba8();
        Self { r, g, b, a }
    }

    /// Parse `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb(...)` or a CSS color name
    pub fn parse(s: &str) -> Option<Self> {
        let parsed = csscolorparser::parse(s.trim()).ok()?;
        let [r, g, b, a] = parsed.to_rgba8();
        Some(Self { r, g, b, a })
    }

    /// Channel values in `0.0..=1.0`
    pub fn red(&self) -> f64 {
        self.r as f64 / 255.0
    }

    pub fn green(&self) -> f64 {
        self.g as f64 / 255.0
    }

    pub fn blue(&self) -> f64 {
        self.b as f64 / 255.0
    }

    pub fn alpha(&self) -> f64 {
        self.a as f64 / 255.0
    }

    /// `#rrggbb`, or `#rrggbbaa` when not opaque
    pub fn to_html(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_html())
    }
}

fn unit_to_byte(v: f64) -> u8 {
    if v.is_nan() {
        return 0;
    }
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}
