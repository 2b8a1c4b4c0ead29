//! Colours for the dark and light themes, plus avatar colour parsing.

use ratatui::style::{Color, Modifier, Style};

use crate::core::config::Theme;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Palette {
    pub text: Color,
    pub muted: Color,
    pub border: Color,
    pub accent: Color,
    pub error: Color,
    pub own_bubble: Color,
}

impl Palette {
    pub fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Dark => Self {
                text: Color::Gray,
                muted: Color::DarkGray,
                border: Color::DarkGray,
                accent: Color::Cyan,
                error: Color::LightRed,
                own_bubble: Color::Blue,
            },
            Theme::Light => Self {
                text: Color::Black,
                muted: Color::Gray,
                border: Color::Gray,
                accent: Color::Blue,
                error: Color::Red,
                own_bubble: Color::Cyan,
            },
        }
    }

    pub fn text_style(&self) -> Style {
        Style::default().fg(self.text)
    }

    pub fn muted_style(&self) -> Style {
        Style::default().fg(self.muted).add_modifier(Modifier::DIM)
    }
}

/// Parses `#RRGGBB` into an RGB colour. Anything else falls back to grey.
pub fn avatar_color(hex: &str) -> Color {
    let digits = hex.trim().trim_start_matches('#');
    if digits.len() != 6 {
        return Color::Gray;
    }
    let channel = |range: std::ops::Range<usize>| {
        digits
            .get(range)
            .and_then(|s| u8::from_str_radix(s, 16).ok())
    };
    match (channel(0..2), channel(2..4), channel(4..6)) {
        (Some(r), Some(g), Some(b)) => Color::Rgb(r, g, b),
        _ => Color::Gray,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avatar_color_parses_hex() {
        assert_eq!(avatar_color("#3B82F6"), Color::Rgb(0x3B, 0x82, 0xF6));
        assert_eq!(avatar_color("ec4899"), Color::Rgb(0xEC, 0x48, 0x99));
    }

    #[test]
    fn test_avatar_color_falls_back() {
        assert_eq!(avatar_color("blue"), Color::Gray);
        assert_eq!(avatar_color("#12345G"), Color::Gray);
        assert_eq!(avatar_color("#ééé"), Color::Gray);
    }

    #[test]
    fn test_themes_differ() {
        assert_ne!(Palette::for_theme(Theme::Dark), Palette::for_theme(Theme::Light));
    }
}
