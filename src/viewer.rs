use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::{debug, info};

use crate::config::Config;
use crate::constants::constants;

// --- Errors ---

#[derive(Debug, Error)]
pub enum ViewerError {
  #[error("viewer command '{0}' not found. Point --viewer (or the viewer_command preference) at your viewer")]
  NotFound(String),
  #[error("failed to launch viewer: {0}")]
  Launch(String),
}

// --- Collaborator seam ---

/// Outbound boundary to the external dataset viewer.
///
/// The session core asks for one thing: open `locator` under `title`. The
/// trait seam lets the test suite substitute a recording double.
pub trait ViewerLauncher: Send + Sync {
  fn open(&self, locator: &str, title: &str) -> Result<(), ViewerError>;
}

/// Display title for a dataset locator: its final path segment.
pub fn display_title(locator: &str) -> String {
  let trimmed = locator.trim_end_matches('/');
  trimmed.rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or(locator).to_string()
}

// --- Process launcher ---

/// Launches the configured viewer executable as a detached process.
pub struct ProcessViewer {
  command: String,
}

impl ProcessViewer {
  pub fn new(command: String) -> Self {
    Self { command }
  }

  /// CLI override first, then the saved preference, then the built-in default.
  pub fn from_preferences(override_command: Option<String>) -> Self {
    let command = override_command
      .or_else(|| Config::load().viewer_command)
      .unwrap_or_else(|| constants().default_viewer_command.clone());
    debug!(command = %command, "viewer command resolved");
    Self::new(command)
  }
}

impl ViewerLauncher for ProcessViewer {
  fn open(&self, locator: &str, title: &str) -> Result<(), ViewerError> {
    info!(command = %self.command, locator = %locator, title = %title, "launching viewer");
    let mut child = Command::new(&self.command)
      .arg("--title")
      .arg(title)
      .arg(locator)
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::null())
      .spawn()
      .map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
          ViewerError::NotFound(self.command.clone())
        } else {
          ViewerError::Launch(e.to_string())
        }
      })?;

    // The viewer owns its own lifetime from here; reap it in a background
    // thread so it doesn't linger as a zombie when it eventually exits.
    std::thread::spawn(move || {
      let _ = child.wait();
    });
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  // --- display_title ---

  #[test]
  fn title_is_the_final_path_segment() {
    assert_eq!(display_title("http://h/x.xml"), "x.xml");
    assert_eq!(display_title("http://h/a/b/dataset.h5"), "dataset.h5");
  }

  #[test]
  fn trailing_slash_is_ignored() {
    assert_eq!(display_title("http://h/exports/"), "exports");
  }

  #[test]
  fn bare_names_title_themselves() {
    assert_eq!(display_title("dataset42"), "dataset42");
  }

  #[test]
  fn slash_only_locator_falls_back_to_itself() {
    assert_eq!(display_title("/"), "/");
  }

  // --- ProcessViewer ---

  #[test]
  fn missing_binary_is_reported_as_not_found() {
    let viewer = ProcessViewer::new("dsb-test-viewer-that-does-not-exist".to_string());
    let err = viewer.open("http://h/x.xml", "x.xml").unwrap_err();
    assert!(matches!(err, ViewerError::NotFound(_)));
  }
}
