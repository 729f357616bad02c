use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use image::{DynamicImage, ImageFormat};
use ratatui::{
  buffer::Buffer,
  layout::Rect,
  style::{Color, Style},
  widgets::Widget,
};
use std::io::{Cursor, Write};

use crate::display::DisplayMode;

// --- Preview widget (cell-based backends) ---

/// Renders a preview image into terminal cells. The Kitty backend bypasses
/// this widget; its escape stream is written after the frame is drawn (see
/// the render pass in main).
pub struct PreviewWidget<'a> {
  pub image: &'a DynamicImage,
  pub display_mode: DisplayMode,
}

impl Widget for PreviewWidget<'_> {
  fn render(self, area: Rect, buf: &mut Buffer) {
    if area.is_empty() {
      return;
    }
    match self.display_mode {
      DisplayMode::Direct => render_half_blocks(self.image, area, buf),
      DisplayMode::Ascii => render_ascii(self.image, area, buf),
      DisplayMode::Kitty | DisplayMode::Off => {}
    }
  }
}

/// One cell covers two image rows via the upper-half-block glyph: the
/// foreground paints the top pixel, the background the bottom.
fn render_half_blocks(image: &DynamicImage, area: Rect, buf: &mut Buffer) {
  let rgb = image.to_rgb8();
  let width = rgb.width().min(area.width as u32);
  let cell_rows = rgb.height().div_ceil(2).min(area.height as u32);
  let offset_x = ((area.width as u32).saturating_sub(width) / 2) as u16;
  let offset_y = ((area.height as u32).saturating_sub(cell_rows) / 2) as u16;

  for row in 0..cell_rows {
    for col in 0..width {
      let top = rgb.get_pixel(col, row * 2);
      let bottom_y = row * 2 + 1;
      let fg = Color::Rgb(top[0], top[1], top[2]);
      let bg = if bottom_y < rgb.height() {
        let bottom = rgb.get_pixel(col, bottom_y);
        Color::Rgb(bottom[0], bottom[1], bottom[2])
      } else {
        Color::Reset
      };
      buf.set_string(
        area.x + offset_x + col as u16,
        area.y + offset_y + row as u16,
        "▀",
        Style::default().fg(fg).bg(bg),
      );
    }
  }
}

const ASCII_RAMP: &[u8] = b" .:-=+*#%@";

fn render_ascii(image: &DynamicImage, area: Rect, buf: &mut Buffer) {
  let gray = image.to_luma8();
  let width = gray.width().min(area.width as u32);
  let height = gray.height().min(area.height as u32);
  let offset_x = ((area.width as u32).saturating_sub(width) / 2) as u16;
  let offset_y = ((area.height as u32).saturating_sub(height) / 2) as u16;

  for row in 0..height {
    for col in 0..width {
      let level = gray.get_pixel(col, row)[0] as usize;
      let idx = level * (ASCII_RAMP.len() - 1) / 255;
      buf.set_string(
        area.x + offset_x + col as u16,
        area.y + offset_y + row as u16,
        (ASCII_RAMP[idx] as char).to_string(),
        Style::default(),
      );
    }
  }
}

// --- Kitty graphics protocol ---
//
// Transmit-and-display with a fixed image id, so re-sending replaces the
// previous placement atomically:
//
//   first chunk:  ESC _G a=T,f=100,t=d,i=1,p=1,c=<cols>,r=<rows>,q=2,m=<more> ; <base64> ESC \
//   later chunks: ESC _G m=<more> ; <base64> ESC \
//   delete all:   ESC _G a=d,d=a,q=2 ESC \
//
// The payload is the PNG encoding of the image, base64'd and split into
// 4096-byte chunks as the protocol requires. c/r tell the terminal how many
// cells to scale the image over.

const KITTY_CHUNK: usize = 4096;

/// Remove every image this process has placed (pane cleared, app exit).
pub fn kitty_delete_all() -> Result<()> {
  let mut stdout = std::io::stdout();
  write!(stdout, "\x1B_Ga=d,d=a,q=2\x1B\\").context("Failed to write kitty delete")?;
  stdout.flush().context("Failed to flush kitty delete")?;
  Ok(())
}

/// Place `image` over the cell rectangle `area`.
pub fn kitty_render_image(image: &DynamicImage, area: Rect) -> Result<()> {
  if area.is_empty() {
    return Ok(());
  }

  let mut png = Vec::new();
  image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png).context("Failed to encode preview as PNG")?;
  let payload = BASE64.encode(&png);

  let mut out = String::with_capacity(payload.len() + 256);
  out.push_str(&format!("\x1B[{};{}H", area.y.saturating_add(1), area.x.saturating_add(1)));

  let total = payload.len().div_ceil(KITTY_CHUNK);
  for (i, chunk) in payload.as_bytes().chunks(KITTY_CHUNK).enumerate() {
    let data = std::str::from_utf8(chunk).context("base64 payload must be ASCII")?;
    let more = if i + 1 < total { 1 } else { 0 };
    if i == 0 {
      out.push_str(&format!(
        "\x1B_Ga=T,f=100,t=d,i=1,p=1,c={},r={},q=2,m={};{}\x1B\\",
        area.width, area.height, more, data
      ));
    } else {
      out.push_str(&format!("\x1B_Gm={};{}\x1B\\", more, data));
    }
  }

  let mut stdout = std::io::stdout();
  stdout.write_all(out.as_bytes()).context("Failed to write kitty image")?;
  stdout.flush().context("Failed to flush kitty image")?;
  Ok(())
}
