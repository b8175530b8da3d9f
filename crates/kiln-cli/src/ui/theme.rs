//! Colors, status glyphs and column widths for build output.

use crossterm::style::Color;

/// Everything the terminal reporter needs to lay out a row.
#[derive(Debug, Clone, Default)]
pub struct Theme {
    pub colors: ColorScheme,
    pub icons: Icons,
    pub layout: Layout,
}

#[derive(Debug, Clone)]
pub struct ColorScheme {
    pub package_name: Color,
    pub version: Color,
    /// Step names, timings and skip reasons
    pub detail: Color,
    pub building: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            package_name: Color::Cyan,
            version: Color::White,
            detail: Color::DarkGrey,
            building: Color::Yellow,
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
        }
    }
}

/// One glyph per node status, plus message prefixes.
#[derive(Debug, Clone)]
pub struct Icons {
    pub building: &'static str,
    pub built: &'static str,
    pub failed: &'static str,
    pub skipped: &'static str,
    pub warning: &'static str,
    pub info: &'static str,
}

impl Default for Icons {
    fn default() -> Self {
        Self {
            building: "●",
            built: "✓",
            failed: "✗",
            skipped: "○",
            warning: "⚠",
            info: "ℹ",
        }
    }
}

/// Column widths for progress rows.
#[derive(Debug, Clone)]
pub struct Layout {
    pub name_width: usize,
    pub version_width: usize,
    pub step_width: usize,
}

impl Default for Layout {
    fn default() -> Self {
        // wide enough for `libs/qt5/qtbase` style names
        Self {
            name_width: 28,
            version_width: 10,
            step_width: 10,
        }
    }
}
