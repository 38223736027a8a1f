use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::content::slug::slugify;
use crate::error::{BlogError, Result};
use crate::ingest::hasher;

/// Files under the media root, addressed by `/`-separated relative paths.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
    base_url: String,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute location of `name`, refusing anything that would escape the root.
    pub fn path(&self, name: &str) -> Result<PathBuf> {
        let rel = Path::new(name);
        let escapes = name.is_empty()
            || rel
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(BlogError::validation("path", format!("{:?} is outside the media root", name)));
        }
        Ok(self.root.join(rel))
    }

    /// Root-relative name of an absolute path under the root.
    pub fn relative_name(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<_> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }

    pub fn url(&self, name: &str) -> String {
        format!("{}{}", self.base_url, name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).map(|p| p.is_file()).unwrap_or(false)
    }

    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.path(name)?)?)
    }

    /// Stores `data` as `dir/file_name`, never overwriting. A clashing name
    /// gets the content fingerprint appended. Returns the name actually used.
    pub fn save(&self, dir: &str, file_name: &str, data: &[u8]) -> Result<String> {
        let (stem, ext) = sanitize_file_name(file_name);
        let dir = dir.trim_matches('/');
        let join = |file: String| if dir.is_empty() { file } else { format!("{}/{}", dir, file) };

        let mut name = join(with_ext(&stem, &ext));
        if self.path(&name)?.exists() {
            let tagged = format!("{}_{}", stem, hasher::short_fingerprint(data));
            name = join(with_ext(&tagged, &ext));
            let mut n = 1;
            while self.path(&name)?.exists() {
                name = join(with_ext(&format!("{}_{}", tagged, n), &ext));
                n += 1;
            }
        }

        let target = self.path(&name)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, data)?;
        debug!("Stored {} ({} bytes)", name, data.len());
        Ok(name)
    }

    /// Removes `name`. A file that is already gone is not an error.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let path = self.path(name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn with_ext(stem: &str, ext: &str) -> String {
    if ext.is_empty() {
        stem.to_string()
    } else {
        format!("{}.{}", stem, ext)
    }
}

fn sanitize_file_name(file_name: &str) -> (String, String) {
    let base = Path::new(file_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (stem, ext) = match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), ext.to_ascii_lowercase()),
        _ => (base.clone(), String::new()),
    };
    let stem = match slugify(&stem) {
        s if s.is_empty() => "upload".to_string(),
        s => s,
    };
    let ext: String = ext.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    (stem, ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> (tempfile::TempDir, FileStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path(), "/media/");
        (dir, storage)
    }

    #[test]
    fn test_save_sanitizes_name() -> Result<()> {
        let (_dir, storage) = storage();
        let name = storage.save("blog_images", "../My Holiday PHOTO.JPG", b"jpeg")?;
        assert_eq!(name, "blog_images/my-holiday-photo.jpg");
        assert!(storage.exists(&name));
        assert_eq!(storage.url(&name), "/media/blog_images/my-holiday-photo.jpg");
        Ok(())
    }

    #[test]
    fn test_save_never_overwrites() -> Result<()> {
        let (_dir, storage) = storage();
        let first = storage.save("blog_images", "a.png", b"one")?;
        let second = storage.save("blog_images", "a.png", b"two")?;
        assert_ne!(first, second);
        assert_eq!(second, format!("blog_images/a_{}.png", hasher::short_fingerprint(b"two")));
        assert_eq!(storage.read(&first)?, b"one");
        assert_eq!(storage.read(&second)?, b"two");

        let third = storage.save("blog_images", "a.png", b"two")?;
        assert_eq!(third, format!("blog_images/a_{}_1.png", hasher::short_fingerprint(b"two")));
        Ok(())
    }

    #[test]
    fn test_delete_missing_is_ok() -> Result<()> {
        let (_dir, storage) = storage();
        let name = storage.save("", "x.txt", b"x")?;
        assert!(storage.delete(&name)?);
        assert!(!storage.delete(&name)?);
        Ok(())
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let (_dir, storage) = storage();
        assert!(storage.path("../etc/passwd").is_err());
        assert!(storage.path("/etc/passwd").is_err());
        assert!(storage.path("").is_err());
        assert!(storage.delete("a/../../b").is_err());
    }

    #[test]
    fn test_relative_name_roundtrip() -> Result<()> {
        let (_dir, storage) = storage();
        let path = storage.path("blog_images/nested/a.jpg")?;
        assert_eq!(storage.relative_name(&path).as_deref(), Some("blog_images/nested/a.jpg"));
        Ok(())
    }
}
