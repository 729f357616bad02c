use image::imageops::FilterType;
use ratatui::{
  Frame,
  layout::{Alignment, Constraint, Layout, Rect},
  style::{Modifier, Style, Stylize},
  text::{Line, Span},
  widgets::{Block, BorderType, List, ListItem, Padding, Paragraph},
};

use crate::app::{App, AppMode};
use crate::display::DisplayMode;
use crate::graphics::PreviewWidget;
use crate::theme::Theme;

// --- Helpers ---

/// Display width of the first `n` chars (double-width CJK aware).
pub fn display_width(s: &str, n: usize) -> usize {
  use unicode_width::UnicodeWidthChar;
  s.chars().take(n).map(|c| c.width().unwrap_or(0)).sum()
}

/// Truncate to `max_width` chars, appending "…" when shortened.
fn truncate_str(s: &str, max_width: usize) -> String {
  if s.chars().count() <= max_width {
    s.to_string()
  } else {
    let shortened: String = s.chars().take(max_width.saturating_sub(1)).collect();
    format!("{}…", shortened)
  }
}

// --- Layout ---

pub fn ui(frame: &mut Frame, app: &mut App) {
  let theme = app.theme();
  app.gfx.thumb_area = None;

  frame.render_widget(Block::default().style(Style::default().bg(theme.bg)), frame.area());

  let [header_area, main_area, status_area, input_area, footer_area] = Layout::vertical([
    Constraint::Length(1),
    Constraint::Min(3),
    Constraint::Length(1),
    Constraint::Length(3),
    Constraint::Length(1),
  ])
  .areas(frame.area());

  render_header(frame, theme, header_area);
  if app.catalog.is_empty() {
    render_welcome(frame, theme, main_area);
  } else {
    render_browser(frame, app, main_area);
  }
  render_status(frame, app, status_area);
  render_input(frame, app, input_area);
  render_footer(frame, app, footer_area);
}

fn render_header(frame: &mut Frame, theme: &Theme, area: Rect) {
  let left = Line::from(Span::styled(" ⛁ dsb ", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)));
  frame.render_widget(left, area);

  let version = format!("v{} ", env!("CARGO_PKG_VERSION"));
  let right = Line::from(Span::styled(&version, Style::default().fg(theme.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(version.len() as u16), width: version.len() as u16, ..area };
  frame.render_widget(right, right_area);
}

fn render_welcome(frame: &mut Frame, theme: &Theme, area: Rect) {
  let text = vec![
    Line::from(""),
    Line::from(Span::styled("⛁  dsb", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))),
    Line::from(""),
    Line::from(Span::styled(
      "Browse a remote dataset server. Open datasets in your viewer.",
      Style::default().fg(theme.fg),
    )),
    Line::from(""),
    Line::from(Span::styled("Type a server address below and press Enter.", Style::default().fg(theme.muted))),
  ];
  let paragraph = Paragraph::new(text)
    .alignment(Alignment::Center)
    .block(Block::bordered().border_type(BorderType::Rounded).border_style(Style::default().fg(theme.border)));
  frame.render_widget(paragraph, area);
}

// --- Browser view ---

fn render_browser(frame: &mut Frame, app: &mut App, area: Rect) {
  let [list_area, detail_area] =
    Layout::horizontal([Constraint::Percentage(60), Constraint::Percentage(40)]).areas(area);
  render_dataset_list(frame, app, list_area);
  render_detail(frame, app, detail_area);
}

fn render_dataset_list(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();

  // Area minus 2 borders minus the 2-char highlight symbol.
  let inner_w = area.width.saturating_sub(4) as usize;

  let items: Vec<ListItem> = app
    .catalog
    .entries()
    .iter()
    .enumerate()
    .map(|(i, entry)| {
      let is_selected = Some(i) == app.list_state.selected();
      let fg = if is_selected { theme.highlight_fg } else { theme.fg };
      let bg = if is_selected {
        theme.highlight_bg
      } else if i % 2 == 1 {
        theme.stripe_bg
      } else {
        theme.bg
      };

      let marker = if entry.dataset_url.is_none() { "no dataset" } else { "" };
      let marker_w = marker.chars().count();
      let description = entry.description.as_deref().unwrap_or("");

      let left_max = if marker_w > 0 { inner_w.saturating_sub(marker_w + 2) } else { inner_w };

      let id = truncate_str(&entry.id, left_max);
      let mut used = id.chars().count();
      let mut spans = vec![Span::styled(id, Style::default().fg(fg))];

      if !description.is_empty() && left_max > used + 2 {
        let desc = truncate_str(description, left_max - used - 2);
        used += desc.chars().count() + 2;
        spans.push(Span::raw("  "));
        spans.push(Span::styled(desc, Style::default().fg(theme.muted)));
      }
      if marker_w > 0 {
        let gap = inner_w.saturating_sub(used + marker_w);
        spans.push(Span::raw(" ".repeat(gap)));
        spans.push(Span::styled(marker, Style::default().fg(theme.muted).add_modifier(Modifier::ITALIC)));
      }

      ListItem::new(Line::from(spans)).bg(bg)
    })
    .collect();

  let title = match app.server {
    Some(ref server) => format!(" {} — {} datasets ", server, app.catalog.len()),
    None => " Datasets ".to_string(),
  };

  let list = List::new(items)
    .block(
      Block::bordered()
        .title(truncate_str(&title, area.width.saturating_sub(2) as usize))
        .title_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.border)),
    )
    .highlight_symbol("▶ ")
    .highlight_style(Style::default().fg(theme.highlight_fg).bg(theme.highlight_bg).add_modifier(Modifier::BOLD));

  frame.render_stateful_widget(list, area, &mut app.list_state);
}

fn thumb_height(area: Rect) -> u16 {
  // Previews aim for 16:9 over half-block cells (two pixels per cell row).
  ((area.width as f32 * 9.0 / 32.0).round() as u16).min(area.height / 2).max(1)
}

fn render_detail(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let block = Block::bordered()
    .title(" Dataset ")
    .title_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(theme.border))
    .padding(Padding::horizontal(1));
  let inner = block.inner(area);
  frame.render_widget(block, area);

  let Some(selected) = app.list_state.selected() else { return };
  let Some(entry) = app.catalog.entries().get(selected).cloned() else { return };

  let [thumb_area, info_area] =
    Layout::vertical([Constraint::Length(thumb_height(inner)), Constraint::Min(1)]).areas(inner);

  render_preview(frame, app, &entry.id, thumb_area);

  let inner_w = info_area.width as usize;
  let mut lines = vec![
    Line::from(""),
    Line::from(Span::styled(
      truncate_str(&entry.id, inner_w),
      Style::default().fg(theme.fg).add_modifier(Modifier::BOLD),
    )),
  ];
  if let Some(ref description) = entry.description {
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(truncate_str(description, inner_w), Style::default().fg(theme.fg))));
  }
  lines.push(Line::from(""));
  match entry.dataset_url {
    Some(ref locator) => {
      lines.push(Line::from(Span::styled(
        truncate_str(locator, inner_w),
        Style::default().fg(theme.accent).add_modifier(Modifier::UNDERLINED),
      )));
    }
    None => {
      lines.push(Line::from(Span::styled(
        "This entry advertises no dataset to open.",
        Style::default().fg(theme.muted),
      )));
    }
  }

  frame.render_widget(Paragraph::new(lines), info_area);
}

fn render_preview(frame: &mut Frame, app: &mut App, entry_id: &str, area: Rect) {
  let theme = app.theme();
  if area.is_empty() {
    return;
  }

  if app.display_mode == DisplayMode::Off {
    render_placeholder(frame, theme, area, "previews off");
    return;
  }

  if !app.thumbnails.contains_key(entry_id) {
    render_placeholder(frame, theme, area, "no preview");
    return;
  }

  if app.display_mode == DisplayMode::Kitty {
    // The raw escape pass happens after the frame is drawn; just reserve the area.
    app.gfx.thumb_area = Some(area);
    return;
  }

  let needs_resize = match app.gfx.resized_thumb {
    Some((ref id, w, h, _)) => id != entry_id || w != area.width || h != area.height,
    None => true,
  };
  if needs_resize && let Some(image) = app.thumbnails.get(entry_id) {
    let target_w = (area.width as u32).max(1);
    let target_h = match app.display_mode {
      // Half-blocks pack two pixel rows per cell.
      DisplayMode::Direct => (area.height as u32 * 2).max(1),
      _ => (area.height as u32).max(1),
    };
    let resized = image.resize(target_w, target_h, FilterType::Lanczos3);
    app.gfx.resized_thumb = Some((entry_id.to_string(), area.width, area.height, resized));
  }

  if let Some((_, _, _, ref resized)) = app.gfx.resized_thumb {
    frame.render_widget(PreviewWidget { image: resized, display_mode: app.display_mode }, area);
  }
}

fn render_placeholder(frame: &mut Frame, theme: &Theme, area: Rect, label: &str) {
  let lines = vec![Line::from(""), Line::from(Span::styled(label.to_string(), Style::default().fg(theme.muted)))];
  frame.render_widget(Paragraph::new(lines).alignment(Alignment::Center), area);
}

// --- Status / input / footer ---

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let (text, style) = if let Some(ref msg) = app.status_message {
    (format!(" ⏳ {}", msg), Style::default().fg(theme.status))
  } else if let Some(ref err) = app.last_error {
    (format!(" ⚠  {}", err), Style::default().fg(theme.error))
  } else if let Some(ref info) = app.info_message {
    (format!(" ℹ {}", info), Style::default().fg(theme.status))
  } else {
    (" Ready".to_string(), Style::default().fg(theme.muted))
  };
  frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_input(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let border_color = if app.mode == AppMode::Address { theme.accent } else { theme.border };
  let block = Block::bordered()
    .title(" Server address ")
    .title_style(Style::default().fg(border_color))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(border_color))
    .padding(Padding::horizontal(1));

  let inner_w = area.width.saturating_sub(4) as usize;
  let cursor_col = display_width(&app.input, app.cursor_position);

  if cursor_col < app.input_scroll {
    app.input_scroll = cursor_col;
  } else if cursor_col >= app.input_scroll + inner_w {
    app.input_scroll = cursor_col.saturating_sub(inner_w) + 1;
  }

  let mut visible = String::new();
  let mut col = 0usize;
  for c in app.input.chars() {
    let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
    let start = col;
    col += w;
    if col <= app.input_scroll {
      continue;
    }
    if start >= app.input_scroll + inner_w {
      break;
    }
    visible.push(c);
  }

  frame.render_widget(Paragraph::new(visible).style(Style::default().fg(theme.fg)).block(block), area);

  if app.mode == AppMode::Address {
    let cursor_x = area.x + 2 + (cursor_col - app.input_scroll) as u16;
    frame.set_cursor_position((cursor_x, area.y + 1));
  }
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let has_catalog = !app.catalog.is_empty();
  let keys: Vec<(&str, &str)> = match app.mode {
    AppMode::Address => {
      let mut k = vec![("Enter", "Connect"), ("^t", "Theme")];
      if has_catalog {
        k.push(("↓", "Datasets"));
        k.push(("Esc", "Datasets"));
      } else {
        k.push(("Esc", "Quit"));
      }
      k
    }
    AppMode::Datasets => vec![("Enter", "Open"), ("j/k", "Navigate"), ("^t", "Theme"), ("Esc", "Address")],
  };

  let spans: Vec<Span> = keys
    .iter()
    .enumerate()
    .flat_map(|(i, (key, action))| {
      let mut s = vec![
        Span::styled(format!(" {} ", key), Style::default().fg(theme.key_fg).bg(theme.key_bg)),
        Span::styled(format!(" {} ", action), Style::default().fg(theme.muted)),
      ];
      if i < keys.len() - 1 {
        s.push(Span::raw("  "));
      }
      s
    })
    .collect();

  frame.render_widget(Line::from(spans), area);

  let label = format!("{} · {} ", app.display_mode.label(), theme.name);
  let label_w = label.chars().count() as u16;
  let right = Line::from(Span::styled(&label, Style::default().fg(theme.muted)));
  let right_area = Rect { x: area.x + area.width.saturating_sub(label_w), width: label_w, ..area };
  frame.render_widget(right, right_area);
}
