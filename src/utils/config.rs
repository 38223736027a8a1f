use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use anyhow::{Result, Context};
use tracing::{info, debug};

const ENV_DB: &str = "GREENBLOG_DB";
const ENV_MEDIA_ROOT: &str = "GREENBLOG_MEDIA_ROOT";
const ENV_MEDIA_URL: &str = "GREENBLOG_MEDIA_URL";
const ENV_IMAGE_DIR: &str = "GREENBLOG_IMAGE_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub db_path: PathBuf,
    /// Directory every media path is relative to.
    pub media_root: PathBuf,
    /// Public URL prefix media is served under. Always starts and ends with `/`.
    pub media_url: String,
    /// Subdirectory of `media_root` holding blog images. This is the
    /// directory the unused-image sweep walks.
    pub image_dir: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("blog.sqlite3"),
            media_root: PathBuf::from("media"),
            media_url: "/media/".to_string(),
            image_dir: "blog_images".to_string(),
        }
    }
}

impl Settings {
    /// Defaults, then the `.env` file at `env_path` (if any), then the
    /// process environment.
    pub fn load(env_path: &Path) -> Result<Self> {
        let mut settings = Settings::default();

        if env_path.exists() {
            load_from_env(env_path, &mut settings)?;
            info!("Loaded settings from {:?}", env_path);
        }

        for key in [ENV_DB, ENV_MEDIA_ROOT, ENV_MEDIA_URL, ENV_IMAGE_DIR] {
            if let Ok(value) = std::env::var(key) {
                debug!("{} overridden by environment", key);
                settings.apply(key, &value);
            }
        }

        Ok(settings.normalized())
    }

    pub fn with_overrides(mut self, db_path: Option<PathBuf>, media_root: Option<PathBuf>) -> Self {
        if let Some(db) = db_path {
            self.db_path = db;
        }
        if let Some(root) = media_root {
            self.media_root = root;
        }
        self
    }

    pub fn image_root(&self) -> PathBuf {
        self.media_root.join(&self.image_dir)
    }

    fn apply(&mut self, key: &str, value: &str) {
        let value = value.trim();
        match key {
            ENV_DB => self.db_path = PathBuf::from(value),
            ENV_MEDIA_ROOT => self.media_root = PathBuf::from(value),
            ENV_MEDIA_URL => self.media_url = value.to_string(),
            ENV_IMAGE_DIR => self.image_dir = value.to_string(),
            _ => {}
        }
    }

    fn normalized(mut self) -> Self {
        let trimmed = self.media_url.trim_matches('/');
        self.media_url = if trimmed.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", trimmed)
        };
        self.image_dir = self.image_dir.trim_matches('/').to_string();
        self
    }
}

fn load_from_env(path: &Path, settings: &mut Settings) -> Result<()> {
    let entries = dotenvy::from_path_iter(path)
        .with_context(|| format!("Failed to read {:?}", path))?;

    for entry in entries {
        let (key, value) = entry.context("Malformed .env entry")?;
        settings.apply(&key, &value);
    }
    Ok(())
}

/// Writes the settings to `path` so later runs pick them up. Leaves an
/// existing file alone and returns `false` in that case.
pub fn save_to_env(path: &Path, settings: &Settings) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    let mut file = File::create(path).context("Failed to create .env file")?;
    writeln!(file, "{}={}", ENV_DB, settings.db_path.display())?;
    writeln!(file, "{}={}", ENV_MEDIA_ROOT, settings.media_root.display())?;
    writeln!(file, "{}={}", ENV_MEDIA_URL, settings.media_url)?;
    writeln!(file, "{}={}", ENV_IMAGE_DIR, settings.image_dir)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_save_and_load_env() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(".env");
        let settings = Settings {
            db_path: PathBuf::from("/tmp/blog.db"),
            media_root: PathBuf::from("/srv/media"),
            media_url: "/files/".to_string(),
            image_dir: "uploads".to_string(),
        };

        assert!(save_to_env(&path, &settings)?);

        let content = fs::read_to_string(&path)?;
        assert!(content.contains("GREENBLOG_MEDIA_ROOT=/srv/media"));
        assert!(content.contains("GREENBLOG_IMAGE_DIR=uploads"));

        let mut loaded = Settings::default();
        load_from_env(&path, &mut loaded)?;
        assert_eq!(loaded.normalized(), settings);

        // second save does not clobber
        assert!(!save_to_env(&path, &Settings::default())?);
        Ok(())
    }

    #[test]
    fn test_media_url_is_normalized() {
        let mut settings = Settings::default();
        settings.media_url = "media".to_string();
        assert_eq!(settings.normalized().media_url, "/media/");

        let mut settings = Settings::default();
        settings.media_url = "".to_string();
        assert_eq!(settings.normalized().media_url, "/");
    }
}
