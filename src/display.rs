use clap::ValueEnum;

/// Preview backend selectable on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliPreviewMode {
  Auto,
  Kitty,
  Direct,
  Ascii,
  Off,
}

/// Resolved thumbnail rendering backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
  /// Kitty graphics protocol (pixel previews, needs a supporting terminal).
  Kitty,
  /// True-color half-block cells.
  Direct,
  /// Grayscale ASCII ramp.
  Ascii,
  /// No previews; the detail pane shows a placeholder.
  Off,
}

impl DisplayMode {
  pub fn label(self) -> &'static str {
    match self {
      DisplayMode::Kitty => "kitty",
      DisplayMode::Direct => "half-block",
      DisplayMode::Ascii => "ascii",
      DisplayMode::Off => "off",
    }
  }
}

/// Detect the best preview backend the terminal advertises.
///
/// Kitty graphics for kitty/WezTerm/ghostty, half-block cells for any
/// true-color terminal, ASCII otherwise.
pub fn detect_display_mode() -> DisplayMode {
  let term = std::env::var("TERM").unwrap_or_default();
  let term_program = std::env::var("TERM_PROGRAM").unwrap_or_default().to_lowercase();

  if term == "xterm-kitty" || matches!(term_program.as_str(), "kitty" | "wezterm" | "ghostty") {
    return DisplayMode::Kitty;
  }

  let colorterm = std::env::var("COLORTERM").unwrap_or_default().to_lowercase();
  if colorterm == "truecolor" || colorterm == "24bit" {
    return DisplayMode::Direct;
  }

  DisplayMode::Ascii
}

pub fn resolve_display_mode(cli: CliPreviewMode) -> DisplayMode {
  match cli {
    CliPreviewMode::Auto => detect_display_mode(),
    CliPreviewMode::Kitty => DisplayMode::Kitty,
    CliPreviewMode::Direct => DisplayMode::Direct,
    CliPreviewMode::Ascii => DisplayMode::Ascii,
    CliPreviewMode::Off => DisplayMode::Off,
  }
}
