//! Tuneable application constants, embedded from `constants.ron`.
//!
//! `include_str!` bakes the RON file into the binary, so there is no runtime
//! file I/O; the file is parsed once on first access.

use serde::Deserialize;
use std::sync::LazyLock;

#[derive(Debug, Deserialize)]
pub struct Constants {
  /// Catalog endpoint, relative to the server base address.
  pub catalog_endpoint: String,

  // HTTP
  pub http_timeout_secs: u64,

  // Thumbnails
  pub thumbnail_concurrency: usize,

  // Viewer
  pub default_viewer_command: String,

  // UI
  pub error_dismiss_secs: u64,
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; a malformed file fails the first run of any build.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}
