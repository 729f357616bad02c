use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// Persisted user preferences, stored as TOML in the platform config dir.
#[derive(Serialize, Deserialize, Default, Debug)]
pub struct Config {
  pub theme_name: Option<String>,
  /// Command used to open datasets in the external viewer.
  pub viewer_command: Option<String>,
}

impl Config {
  pub fn load() -> Self {
    if let Some(proj_dirs) = ProjectDirs::from("", "", "dsb")
      && let Ok(content) = std::fs::read_to_string(proj_dirs.config_dir().join("prefs.toml"))
      && let Ok(config) = toml::from_str(&content)
    {
      return config;
    }
    Self::default()
  }

  pub fn save(&self) {
    if let Some(proj_dirs) = ProjectDirs::from("", "", "dsb")
      && std::fs::create_dir_all(proj_dirs.config_dir()).is_ok()
      && let Ok(content) = toml::to_string(self)
    {
      let _ = std::fs::write(proj_dirs.config_dir().join("prefs.toml"), content);
    }
  }
}
