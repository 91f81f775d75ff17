//! Default worksheet settings from `settings.toml`.

use directories::ProjectDirs;
use mathsheet_core::Settings;
use std::path::{Path, PathBuf};
use tracing::debug;

const MAX_CONFIG_FILE_BYTES: u64 = 65_536;

pub fn user_settings_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("", "", "mathsheet")?;
    let mut path = proj.config_dir().to_path_buf();
    path.push("settings.toml");
    Some(path)
}

pub fn parse_settings(content: &str) -> Result<Settings, toml::de::Error> {
    toml::from_str::<Settings>(content)
}

/// Load settings from `explicit`, else from the user config dir. Problems
/// fall back to the defaults and are returned as warnings.
pub fn load_settings(explicit: Option<&Path>) -> (Settings, Vec<String>) {
    let mut warnings = Vec::new();
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match user_settings_path() {
            Some(path) if path.exists() => path,
            _ => return (Settings::default(), warnings),
        },
    };
    debug!(path = %path.display(), "loading settings");

    let settings = match std::fs::metadata(&path) {
        Ok(meta) if meta.len() > MAX_CONFIG_FILE_BYTES => {
            warnings.push(format!(
                "Refusing to read {}: settings file too large ({} bytes, max {})",
                path.display(),
                meta.len(),
                MAX_CONFIG_FILE_BYTES
            ));
            None
        }
        Ok(_) => match std::fs::read_to_string(&path) {
            Ok(content) => match parse_settings(&content) {
                Ok(parsed) => Some(parsed),
                Err(err) => {
                    warnings.push(format!("Failed to parse {}: {}", path.display(), err));
                    None
                }
            },
            Err(err) => {
                warnings.push(format!("Failed to read {}: {}", path.display(), err));
                None
            }
        },
        Err(err) => {
            warnings.push(format!("Failed to read metadata for {}: {}", path.display(), err));
            None
        }
    };
    (settings.unwrap_or_default(), warnings)
}
