//! Chart styling, passed explicitly to the renderer
//!
//! Defaults to the dark palette; any field can be overridden from a TOML file:
//!
//! ```toml
//! background = "#ffffff"
//! text = "#111111"
//! panel_width = 640
//! ```

use std::fs;
use std::path::Path;

use anyhow::Context;
use plotters::style::RGBColor;
use serde::Deserialize;

/// `#rrggbb` color as written in the style file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct HexColor(pub u8, pub u8, pub u8);

impl HexColor {
    pub fn rgb(self) -> RGBColor {
        RGBColor(self.0, self.1, self.2)
    }
}

impl TryFrom<String> for HexColor {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let hex = value.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("invalid color `{value}`, expected #rrggbb"));
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| e.to_string());
        Ok(HexColor(channel(0)?, channel(2)?, channel(4)?))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChartStyle {
    pub background: HexColor,
    /// Plot area fill
    pub surface: HexColor,
    pub grid: HexColor,
    pub text: HexColor,
    /// Axis labels and secondary text
    pub muted: HexColor,
    /// Titles and the first series
    pub highlight: HexColor,
    pub secondary: HexColor,
    pub positive: HexColor,
    pub negative: HexColor,
    pub extra: HexColor,
    pub font_family: String,
    pub panel_width: u32,
    pub panel_height: u32,
    pub title_size: u32,
    pub caption_size: u32,
    pub label_size: u32,
}

impl Default for ChartStyle {
    fn default() -> Self {
        ChartStyle {
            background: HexColor(0x0d, 0x0f, 0x14),
            surface: HexColor(0x16, 0x1a, 0x23),
            grid: HexColor(0x2a, 0x30, 0x45),
            text: HexColor(0xe8, 0xec, 0xf4),
            muted: HexColor(0x6b, 0x7a, 0x99),
            highlight: HexColor(0xf0, 0xc0, 0x40),
            secondary: HexColor(0x4f, 0xd1, 0xc5),
            positive: HexColor(0x4a, 0xde, 0x80),
            negative: HexColor(0xf8, 0x71, 0x71),
            extra: HexColor(0xa7, 0x8b, 0xfa),
            font_family: "monospace".to_string(),
            panel_width: 560,
            panel_height: 440,
            title_size: 26,
            caption_size: 18,
            label_size: 13,
        }
    }
}

impl ChartStyle {
    /// Load a style file, or the default style when no path is given
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let Some(path) = path else {
            return Ok(ChartStyle::default());
        };
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read style file {}", path.display()))?;
        let style: ChartStyle = toml::from_str(&content)
            .with_context(|| format!("invalid style file {}", path.display()))?;
        if style.panel_width == 0 || style.panel_height == 0 {
            anyhow::bail!("panel_width and panel_height must be positive");
        }
        Ok(style)
    }
}
