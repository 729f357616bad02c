use anyhow::Result;
use ratatui::crossterm::event::{self, KeyCode, KeyModifiers};

use crate::app::{App, AppMode};

// --- Helpers ---

/// Convert a char index to a byte offset within the string.
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
  s.char_indices().nth(char_idx).map_or(s.len(), |(i, _)| i)
}

// --- Event handling ---

pub fn handle_key_event(app: &mut App, key: event::KeyEvent) -> Result<()> {
  if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
    app.should_quit = true;
    return Ok(());
  }

  if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('t') {
    app.next_theme();
    return Ok(());
  }

  match app.mode {
    AppMode::Address => handle_address_key(app, key),
    AppMode::Datasets => handle_dataset_key(app, key),
  }
  Ok(())
}

fn handle_address_key(app: &mut App, key: event::KeyEvent) {
  app.clear_error();
  match key.code {
    KeyCode::Enter => {
      app.trigger_connect();
    }
    KeyCode::Char(c) => {
      let byte_idx = char_to_byte_index(&app.input, app.cursor_position);
      app.input.insert(byte_idx, c);
      app.cursor_position += 1;
    }
    KeyCode::Backspace => {
      if app.cursor_position > 0 {
        app.cursor_position -= 1;
        let byte_idx = char_to_byte_index(&app.input, app.cursor_position);
        app.input.remove(byte_idx);
      }
    }
    KeyCode::Delete => {
      if app.cursor_position < app.input.chars().count() {
        let byte_idx = char_to_byte_index(&app.input, app.cursor_position);
        app.input.remove(byte_idx);
      }
    }
    KeyCode::Left => {
      app.cursor_position = app.cursor_position.saturating_sub(1);
    }
    KeyCode::Right => {
      if app.cursor_position < app.input.chars().count() {
        app.cursor_position += 1;
      }
    }
    KeyCode::Home => {
      app.cursor_position = 0;
    }
    KeyCode::End => {
      app.cursor_position = app.input.chars().count();
    }
    KeyCode::Esc => {
      if !app.input.is_empty() {
        app.input.clear();
        app.cursor_position = 0;
        app.input_scroll = 0;
      } else if !app.catalog.is_empty() {
        app.mode = AppMode::Datasets;
      } else {
        app.should_quit = true;
      }
    }
    KeyCode::Down => {
      if !app.catalog.is_empty() {
        app.mode = AppMode::Datasets;
      }
    }
    _ => {}
  }
}

fn handle_dataset_key(app: &mut App, key: event::KeyEvent) {
  match key.code {
    KeyCode::Enter => {
      app.activate_selected();
    }
    KeyCode::Down | KeyCode::Char('j') => {
      let count = app.catalog.len();
      if count > 0 {
        let i = app.list_state.selected().map_or(0, |i| (i + 1) % count);
        app.list_state.select(Some(i));
      }
    }
    KeyCode::Up | KeyCode::Char('k') => {
      let count = app.catalog.len();
      if count > 0 {
        let i = app.list_state.selected().map_or(0, |i| if i == 0 { count - 1 } else { i - 1 });
        app.list_state.select(Some(i));
      }
    }
    KeyCode::Home | KeyCode::Char('g') => {
      if !app.catalog.is_empty() {
        app.list_state.select(Some(0));
      }
    }
    KeyCode::End | KeyCode::Char('G') => {
      let count = app.catalog.len();
      if count > 0 {
        app.list_state.select(Some(count - 1));
      }
    }
    KeyCode::Esc => {
      app.mode = AppMode::Address;
    }
    _ => {}
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  // --- char_to_byte_index ---

  #[test]
  fn ascii_chars_map_one_to_one() {
    assert_eq!(char_to_byte_index("server", 0), 0);
    assert_eq!(char_to_byte_index("server", 4), 4);
    assert_eq!(char_to_byte_index("server", 6), 6); // past end
  }

  #[test]
  fn multibyte_chars_advance_by_their_byte_width() {
    let s = "aé日"; // a=1 byte, é=2 bytes, 日=3 bytes
    assert_eq!(char_to_byte_index(s, 0), 0);
    assert_eq!(char_to_byte_index(s, 1), 1);
    assert_eq!(char_to_byte_index(s, 2), 3);
    assert_eq!(char_to_byte_index(s, 3), 6); // past end
  }

  #[test]
  fn empty_string_always_maps_to_zero() {
    assert_eq!(char_to_byte_index("", 0), 0);
    assert_eq!(char_to_byte_index("", 3), 0);
  }
}
