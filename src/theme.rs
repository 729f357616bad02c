use ratatui::style::Color;

/// A named UI palette. Cycled with Ctrl+T and persisted by name.
pub struct Theme {
  pub name: &'static str,
  pub bg: Color,
  pub fg: Color,
  pub muted: Color,
  pub accent: Color,
  pub border: Color,
  pub status: Color,
  pub error: Color,
  pub highlight_fg: Color,
  pub highlight_bg: Color,
  pub stripe_bg: Color,
  pub key_fg: Color,
  pub key_bg: Color,
}

pub const THEMES: [Theme; 3] = [
  Theme {
    name: "harbor",
    bg: Color::Rgb(16, 20, 28),
    fg: Color::Rgb(205, 214, 224),
    muted: Color::Rgb(110, 122, 138),
    accent: Color::Rgb(98, 178, 255),
    border: Color::Rgb(52, 62, 78),
    status: Color::Rgb(126, 200, 165),
    error: Color::Rgb(235, 115, 115),
    highlight_fg: Color::Rgb(16, 20, 28),
    highlight_bg: Color::Rgb(98, 178, 255),
    stripe_bg: Color::Rgb(22, 27, 37),
    key_fg: Color::Rgb(16, 20, 28),
    key_bg: Color::Rgb(110, 122, 138),
  },
  Theme {
    name: "moss",
    bg: Color::Rgb(20, 24, 18),
    fg: Color::Rgb(210, 216, 200),
    muted: Color::Rgb(118, 128, 104),
    accent: Color::Rgb(158, 206, 106),
    border: Color::Rgb(58, 66, 48),
    status: Color::Rgb(158, 206, 106),
    error: Color::Rgb(224, 108, 92),
    highlight_fg: Color::Rgb(20, 24, 18),
    highlight_bg: Color::Rgb(158, 206, 106),
    stripe_bg: Color::Rgb(26, 31, 24),
    key_fg: Color::Rgb(20, 24, 18),
    key_bg: Color::Rgb(118, 128, 104),
  },
  Theme {
    name: "plain",
    bg: Color::Reset,
    fg: Color::Reset,
    muted: Color::DarkGray,
    accent: Color::Cyan,
    border: Color::DarkGray,
    status: Color::Green,
    error: Color::Red,
    highlight_fg: Color::Black,
    highlight_bg: Color::Cyan,
    stripe_bg: Color::Reset,
    key_fg: Color::Black,
    key_bg: Color::DarkGray,
  },
];
