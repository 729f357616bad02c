use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::DynamicImage;
use ratatui::{layout::Rect, widgets::ListState};
use reqwest::Client;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, CatalogError, fetch_catalog};
use crate::config::Config;
use crate::constants::constants;
use crate::display::DisplayMode;
use crate::theme::{THEMES, Theme};
use crate::thumbnail::{ThumbnailUpdate, resolve_thumbnails, thumbnail_jobs};
use crate::viewer::{ViewerError, ViewerLauncher, display_title};

// --- Types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
  Address,
  Datasets,
}

/// Errors surfaced per activation attempt. They never affect the catalog.
#[derive(Debug, Error)]
pub enum ActivateError {
  /// The entry is listed but advertises no dataset locator.
  #[error("dataset '{0}' has no dataset locator and cannot be opened")]
  NotOpenable(String),
}

/// Terminal graphics state for the preview pane (Kitty raw pass + resize cache).
#[derive(Default)]
pub struct GraphicsCache {
  pub thumb_area: Option<Rect>,
  pub last_sent: Option<(String, Rect)>,
  pub resized_thumb: Option<(String, u16, u16, DynamicImage)>,
}

/// In-flight async task receivers and handles.
#[derive(Default)]
struct AsyncTasks {
  load_rx: Option<oneshot::Receiver<Result<Catalog, CatalogError>>>,
  open_rx: Option<oneshot::Receiver<Result<(), ViewerError>>>,
  thumb_rx: Option<mpsc::Receiver<ThumbnailUpdate>>,
  thumb_handle: Option<JoinHandle<()>>,
}

pub struct App {
  pub input: String,
  pub cursor_position: usize,
  pub input_scroll: usize,
  pub mode: AppMode,
  pub theme_index: usize,
  pub display_mode: DisplayMode,
  /// The catalog currently shown. Replaced wholesale by a successful fetch;
  /// a failed fetch leaves it untouched.
  pub catalog: Catalog,
  /// Address the current catalog was fetched from.
  pub server: Option<String>,
  /// Session thumbnail cache, keyed by entry id. Absence means "no preview".
  pub thumbnails: HashMap<String, DynamicImage>,
  pub list_state: ListState,
  pub last_error: Option<String>,
  pub status_message: Option<String>,
  /// Informational message, lower priority than status/error.
  pub info_message: Option<String>,
  pub should_quit: bool,
  pub gfx: GraphicsCache,
  launcher: Arc<dyn ViewerLauncher>,
  http: Client,
  /// Entry id with a viewer open in flight. While set, further activations
  /// are ignored (Idle → Opening → Idle).
  opening: Option<String>,
  /// Address of the fetch currently in flight.
  pending_server: Option<String>,
  tasks: AsyncTasks,
  /// When the last error was set, for auto-dismiss.
  error_time: Option<Instant>,
}

impl App {
  pub fn new(display_mode: DisplayMode, launcher: Arc<dyn ViewerLauncher>) -> Self {
    let config = Config::load();
    let theme_index =
      if let Some(ref name) = config.theme_name { THEMES.iter().position(|t| t.name == name).unwrap_or(0) } else { 0 };

    let http = Client::builder()
      .user_agent(concat!("dsb/", env!("CARGO_PKG_VERSION")))
      .timeout(Duration::from_secs(constants().http_timeout_secs))
      .build()
      .unwrap_or_else(|_| Client::new());

    // The address box starts with the scheme already typed.
    let input = "http://".to_string();
    let cursor_position = input.chars().count();

    Self {
      input,
      cursor_position,
      input_scroll: 0,
      mode: AppMode::Address,
      theme_index,
      display_mode,
      catalog: Catalog::default(),
      server: None,
      thumbnails: HashMap::new(),
      list_state: ListState::default(),
      last_error: None,
      status_message: None,
      info_message: None,
      should_quit: false,
      gfx: GraphicsCache::default(),
      launcher,
      http,
      opening: None,
      pending_server: None,
      tasks: AsyncTasks::default(),
      error_time: None,
    }
  }

  pub fn theme(&self) -> &'static Theme {
    // Safety: theme_index is produced by position() over THEMES or by modular
    // arithmetic in next_theme(), so it is always in bounds.
    &THEMES[self.theme_index]
  }

  pub fn set_error(&mut self, msg: String) {
    self.last_error = Some(msg);
    self.error_time = Some(Instant::now());
  }

  pub fn clear_error(&mut self) {
    self.last_error = None;
    self.error_time = None;
  }

  /// Drop stale error messages after a few seconds.
  pub fn expire_error(&mut self) {
    if let Some(t) = self.error_time
      && t.elapsed() >= Duration::from_secs(constants().error_dismiss_secs)
    {
      self.last_error = None;
      self.error_time = None;
    }
  }

  pub fn next_theme(&mut self) {
    self.theme_index = (self.theme_index + 1) % THEMES.len();
    let mut config = Config::load();
    config.theme_name = Some(self.theme().name.to_string());
    config.save();
  }

  // --- Catalog loading ---

  /// Start a catalog fetch for the address in the input box.
  ///
  /// A fetch already in flight is superseded: its receiver is dropped here,
  /// so whatever it still produces is discarded and the last submitted
  /// address wins.
  pub fn trigger_connect(&mut self) {
    let address = self.input.trim().trim_end_matches('/').to_string();
    if address.is_empty() || address.ends_with(':') {
      self.set_error("Enter a server address.".to_string());
      return;
    }
    info!(server = %address, "catalog fetch triggered");
    self.tasks.load_rx = None;
    self.cancel_thumbnails();
    self.clear_error();
    self.info_message = None;
    self.status_message = Some(format!("Connecting to {}…", address));
    self.pending_server = Some(address.clone());

    let client = self.http.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let _ = tx.send(fetch_catalog(&client, &address).await);
    });
    self.tasks.load_rx = Some(rx);
  }

  /// Install a finished fetch. Success replaces the catalog wholesale and
  /// kicks off the thumbnail sweep; failure surfaces one message and leaves
  /// the prior catalog authoritative.
  fn apply_catalog_result(&mut self, result: Result<Catalog, CatalogError>) {
    match result {
      Ok(catalog) => {
        info!(datasets = catalog.len(), "catalog loaded");
        self.thumbnails.clear();
        self.gfx.resized_thumb = None;
        self.catalog = catalog;
        self.server = self.pending_server.take();
        if self.catalog.is_empty() {
          self.info_message = Some("Server lists no datasets.".to_string());
          self.list_state.select(None);
          self.mode = AppMode::Address;
        } else {
          self.list_state.select(Some(0));
          self.mode = AppMode::Datasets;
          self.trigger_thumbnails();
        }
      }
      Err(e) => {
        warn!(err = %e, "catalog fetch failed");
        self.pending_server = None;
        self.set_error(e.to_string());
      }
    }
  }

  // --- Thumbnails ---

  fn trigger_thumbnails(&mut self) {
    self.cancel_thumbnails();
    let jobs = thumbnail_jobs(&self.catalog);
    if jobs.is_empty() {
      return;
    }
    debug!(jobs = jobs.len(), "starting thumbnail sweep");
    let client = self.http.clone();
    let (tx, rx) = mpsc::channel(16);
    let handle = tokio::spawn(async move {
      resolve_thumbnails(client, jobs, tx).await;
    });
    self.tasks.thumb_rx = Some(rx);
    self.tasks.thumb_handle = Some(handle);
  }

  /// Abort the sweep owned by a catalog that is going away.
  fn cancel_thumbnails(&mut self) {
    if let Some(handle) = self.tasks.thumb_handle.take() {
      handle.abort();
    }
    self.tasks.thumb_rx = None;
  }

  // --- Activation ---

  /// Activate the entry under the cursor.
  pub fn activate_selected(&mut self) {
    let Some(selected) = self.list_state.selected() else { return };
    let Some(entry) = self.catalog.entries().get(selected) else { return };
    let id = entry.id.clone();
    if let Err(e) = self.activate(&id) {
      self.set_error(e.to_string());
    }
  }

  /// Turn an activation gesture into at most one viewer-open call.
  ///
  /// Entries without a dataset locator report `NotOpenable` without touching
  /// the collaborator. While an open is in flight every further activation is
  /// ignored, so a rapid double-activation cannot spawn a second viewer.
  pub fn activate(&mut self, entry_id: &str) -> Result<(), ActivateError> {
    if let Some(ref pending) = self.opening {
      debug!(entry = entry_id, pending = %pending, "activation ignored, an open is already in flight");
      return Ok(());
    }
    let Some(entry) = self.catalog.get(entry_id) else {
      warn!(entry = entry_id, "activation for an id not in the catalog");
      return Ok(());
    };
    let Some(locator) = entry.dataset_url.clone() else {
      return Err(ActivateError::NotOpenable(entry_id.to_string()));
    };

    let title = display_title(&locator);
    info!(entry = entry_id, locator = %locator, title = %title, "opening dataset");
    self.status_message = Some(format!("Opening {}…", title));
    self.opening = Some(entry_id.to_string());

    let launcher = Arc::clone(&self.launcher);
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let _ = tx.send(launcher.open(&locator, &title));
    });
    self.tasks.open_rx = Some(rx);
    Ok(())
  }

  // --- Pending task results ---

  /// Drain finished background work. Called once per event-loop tick.
  pub fn check_pending(&mut self) {
    if let Some(mut rx) = self.tasks.load_rx.take() {
      match rx.try_recv() {
        Ok(result) => {
          self.status_message = None;
          self.apply_catalog_result(result);
        }
        Err(oneshot::error::TryRecvError::Empty) => {
          self.tasks.load_rx = Some(rx);
        }
        Err(oneshot::error::TryRecvError::Closed) => {
          self.status_message = None;
          self.pending_server = None;
          self.set_error("Catalog fetch task failed.".to_string());
        }
      }
    }

    if let Some(mut rx) = self.tasks.open_rx.take() {
      match rx.try_recv() {
        Ok(result) => {
          self.status_message = None;
          let entry = self.opening.take();
          match result {
            Ok(()) => {
              if let Some(id) = entry {
                debug!(entry = %id, "viewer launch completed");
              }
            }
            Err(e) => {
              self.set_error(format!("Viewer launch failed: {}", e));
            }
          }
        }
        Err(oneshot::error::TryRecvError::Empty) => {
          self.tasks.open_rx = Some(rx);
        }
        Err(oneshot::error::TryRecvError::Closed) => {
          self.status_message = None;
          self.opening = None;
          self.set_error("Viewer launch task failed.".to_string());
        }
      }
    }

    if let Some(ref mut rx) = self.tasks.thumb_rx {
      while let Ok(update) = rx.try_recv() {
        // A sweep for a discarded catalog is aborted in cancel_thumbnails,
        // but guard against a late send racing the swap anyway.
        if self.catalog.get(&update.entry_id).is_some() {
          self.thumbnails.insert(update.entry_id, update.image);
        }
      }
    }
  }

  /// Id of the selected entry, if its thumbnail has resolved.
  pub fn selected_thumbnail_id(&self) -> Option<String> {
    let selected = self.list_state.selected()?;
    let entry = self.catalog.entries().get(selected)?;
    self.thumbnails.contains_key(&entry.id).then(|| entry.id.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::catalog::decode_catalog;
  use std::sync::Mutex;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct RecordingLauncher {
    calls: AtomicUsize,
    last: Mutex<Option<(String, String)>>,
    fail: bool,
  }

  impl RecordingLauncher {
    fn new(fail: bool) -> Arc<Self> {
      Arc::new(Self { calls: AtomicUsize::new(0), last: Mutex::new(None), fail })
    }
  }

  impl ViewerLauncher for RecordingLauncher {
    fn open(&self, locator: &str, title: &str) -> Result<(), ViewerError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      *self.last.lock().unwrap() = Some((locator.to_string(), title.to_string()));
      if self.fail { Err(ViewerError::Launch("viewer exploded".to_string())) } else { Ok(()) }
    }
  }

  fn scenario_catalog() -> Catalog {
    decode_catalog(br#"{"a":{"id":"a","datasetUrl":"http://h/x.xml"},"b":{"id":"b"}}"#).unwrap()
  }

  fn app_with(catalog: Catalog, launcher: Arc<RecordingLauncher>) -> App {
    let mut app = App::new(DisplayMode::Off, launcher);
    app.catalog = catalog;
    app.list_state.select(Some(0));
    app.mode = AppMode::Datasets;
    app
  }

  async fn wait_for_open(app: &mut App) {
    for _ in 0..100 {
      tokio::task::yield_now().await;
      app.check_pending();
      if app.opening.is_none() {
        return;
      }
      tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("viewer open never completed");
  }

  // --- activate ---

  #[tokio::test]
  async fn activation_invokes_the_viewer_with_locator_and_title() {
    let launcher = RecordingLauncher::new(false);
    let mut app = app_with(scenario_catalog(), Arc::clone(&launcher));
    app.activate("a").unwrap();
    wait_for_open(&mut app).await;
    assert_eq!(launcher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(*launcher.last.lock().unwrap(), Some(("http://h/x.xml".to_string(), "x.xml".to_string())));
  }

  #[tokio::test]
  async fn entry_without_locator_is_not_openable() {
    let launcher = RecordingLauncher::new(false);
    let mut app = app_with(scenario_catalog(), Arc::clone(&launcher));
    let err = app.activate("b").unwrap_err();
    assert!(matches!(err, ActivateError::NotOpenable(_)));
    tokio::task::yield_now().await;
    assert_eq!(launcher.calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn rapid_double_activation_opens_once() {
    let launcher = RecordingLauncher::new(false);
    let mut app = app_with(scenario_catalog(), Arc::clone(&launcher));
    app.activate("a").unwrap();
    app.activate("a").unwrap();
    wait_for_open(&mut app).await;
    assert_eq!(launcher.calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn activation_is_possible_again_after_completion() {
    let launcher = RecordingLauncher::new(false);
    let mut app = app_with(scenario_catalog(), Arc::clone(&launcher));
    app.activate("a").unwrap();
    wait_for_open(&mut app).await;
    app.activate("a").unwrap();
    wait_for_open(&mut app).await;
    assert_eq!(launcher.calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn launcher_failure_surfaces_and_resets_state() {
    let launcher = RecordingLauncher::new(true);
    let mut app = app_with(scenario_catalog(), Arc::clone(&launcher));
    app.activate("a").unwrap();
    wait_for_open(&mut app).await;
    assert!(app.last_error.as_deref().unwrap().contains("Viewer launch failed"));
    assert!(app.opening.is_none());
    assert_eq!(app.catalog.len(), 2);
  }

  // --- catalog install ---

  #[tokio::test]
  async fn failed_fetch_keeps_the_prior_catalog() {
    let launcher = RecordingLauncher::new(false);
    let mut app = app_with(scenario_catalog(), Arc::clone(&launcher));
    app.apply_catalog_result(Err(CatalogError::Connection("connection refused".to_string())));
    assert_eq!(app.catalog.len(), 2);
    assert!(app.last_error.as_deref().unwrap().contains("connection"));
  }

  #[tokio::test]
  async fn successful_fetch_replaces_the_catalog_wholesale() {
    let launcher = RecordingLauncher::new(false);
    let mut app = app_with(scenario_catalog(), Arc::clone(&launcher));
    app.thumbnails.insert("a".to_string(), DynamicImage::new_rgb8(1, 1));
    let replacement = decode_catalog(br#"{"c":{"id":"c","datasetUrl":"http://h/c.xml"}}"#).unwrap();
    app.apply_catalog_result(Ok(replacement));
    assert_eq!(app.catalog.len(), 1);
    assert!(app.catalog.get("c").is_some());
    assert!(app.thumbnails.is_empty());
    assert_eq!(app.list_state.selected(), Some(0));
  }

  #[tokio::test]
  async fn empty_catalog_is_installed_with_a_notice() {
    let launcher = RecordingLauncher::new(false);
    let mut app = app_with(scenario_catalog(), Arc::clone(&launcher));
    app.apply_catalog_result(Ok(Catalog::default()));
    assert!(app.catalog.is_empty());
    assert!(app.info_message.is_some());
  }

  // --- thumbnails ---

  #[tokio::test]
  async fn thumbnail_updates_apply_only_to_live_entries() {
    let launcher = RecordingLauncher::new(false);
    let mut app = app_with(scenario_catalog(), Arc::clone(&launcher));
    let (tx, rx) = mpsc::channel(4);
    app.tasks.thumb_rx = Some(rx);
    tx.send(ThumbnailUpdate { entry_id: "a".to_string(), image: DynamicImage::new_rgb8(1, 1) }).await.unwrap();
    tx.send(ThumbnailUpdate { entry_id: "ghost".to_string(), image: DynamicImage::new_rgb8(1, 1) }).await.unwrap();
    drop(tx);
    app.check_pending();
    assert!(app.thumbnails.contains_key("a"));
    assert!(!app.thumbnails.contains_key("ghost"));
  }
}
