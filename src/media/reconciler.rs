use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

use crate::database::models::Post;
use crate::database::repo::BlogRepository;
use crate::error::{BlogError, Result};
use crate::ingest::scanner;
use crate::media::references::embedded_images;
use crate::media::storage::FileStorage;

/// What a reconciliation pass did with each candidate image.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub deleted: Vec<String>,
    pub retained: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    pub scanned: usize,
    pub deleted: usize,
}

impl fmt::Display for SweepSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Scanned {} image files, deleted {} unused.",
            self.scanned, self.deleted
        )
    }
}

/// Keeps image files on disk in step with the posts that reference them.
///
/// All deletions are best effort: an I/O failure is logged and the
/// caller carries on.
pub struct MediaReconciler<'a> {
    repo: &'a BlogRepository,
    storage: &'a FileStorage,
}

impl<'a> MediaReconciler<'a> {
    pub fn new(repo: &'a BlogRepository, storage: &'a FileStorage) -> Self {
        Self { repo, storage }
    }

    /// Run after `current` has been saved over `previous`.
    pub fn after_update(&self, previous: &Post, current: &Post) -> Result<Reconciled> {
        let mut outcome = Reconciled::default();

        if let Some(old) = previous.primary_image() {
            if current.primary_image() != Some(old) {
                let users = self.repo.posts_using_image(old, current.id)?;
                if users.is_empty() {
                    info!("Primary image {} no longer used, deleting", old);
                    self.remove(old, &mut outcome);
                } else {
                    info!("Primary image {} still used by {:?}", old, users);
                    outcome.retained.push(old.to_string());
                }
            }
        }

        let media_url = self.storage.base_url();
        let old_images = embedded_images(&previous.content, media_url);
        let new_images = embedded_images(&current.content, media_url);

        for img in old_images.difference(&new_images) {
            if current.primary_image() == Some(img.as_str()) {
                outcome.retained.push(img.clone());
                continue;
            }
            let users = self.repo.posts_embedding(img, current.id)?;
            if users.is_empty() {
                info!("Embedded image {} no longer used, deleting", img);
                self.remove(img, &mut outcome);
            } else {
                debug!("Embedded image {} still used by {:?}", img, users);
                outcome.retained.push(img.clone());
            }
        }

        Ok(outcome)
    }

    /// Run once `removed` is gone from the store. Its images are deleted
    /// unless a surviving post still points at them.
    pub fn after_delete(&self, removed: &Post) -> Result<Reconciled> {
        let mut outcome = Reconciled::default();

        if let Some(image) = removed.primary_image() {
            let users = self.repo.posts_using_image(image, removed.id)?;
            if users.is_empty() {
                self.remove(image, &mut outcome);
            } else {
                info!("Primary image {} still used by {:?}", image, users);
                outcome.retained.push(image.to_string());
            }
        }

        for img in embedded_images(&removed.content, self.storage.base_url()) {
            if removed.primary_image() == Some(img.as_str()) {
                continue;
            }
            let users = self.repo.posts_embedding(&img, removed.id)?;
            if users.is_empty() {
                self.remove(&img, &mut outcome);
            } else {
                debug!("Embedded image {} still used by {:?}", img, users);
                outcome.retained.push(img);
            }
        }

        Ok(outcome)
    }

    /// Deletes every file under the managed image directory that no post
    /// references, either as primary image or inside its body.
    pub fn sweep(&self, image_dir: &str) -> Result<SweepSummary> {
        let dir = self.storage.path(image_dir)?;
        if !dir.is_dir() {
            return Err(BlogError::MissingMediaDir(dir));
        }

        let used = self.used_images()?;
        let files = scanner::scan_directory(&dir)?;

        let mut summary = SweepSummary { scanned: files.len(), deleted: 0 };
        for path in files {
            let Some(name) = self.storage.relative_name(&path) else {
                continue;
            };
            if used.contains(&name) {
                continue;
            }
            info!("Deleting unused image: {}", name);
            match self.storage.delete(&name) {
                Ok(true) => summary.deleted += 1,
                Ok(false) => debug!("{} vanished before it could be deleted", name),
                Err(e) => warn!("Failed to delete {}: {}", name, e),
            }
        }

        info!("Sweep finished: {}", summary);
        Ok(summary)
    }

    /// Every image any post references right now.
    pub fn used_images(&self) -> Result<HashSet<String>> {
        let media_url = self.storage.base_url();
        let mut used = HashSet::new();
        for (image, content) in self.repo.image_references()? {
            if let Some(image) = image.filter(|s| !s.is_empty()) {
                used.insert(image);
            }
            used.extend(embedded_images(&content, media_url));
        }
        Ok(used)
    }

    fn remove(&self, name: &str, outcome: &mut Reconciled) {
        match self.storage.delete(name) {
            Ok(true) => outcome.deleted.push(name.to_string()),
            Ok(false) => debug!("{} was already gone", name),
            Err(e) => warn!("Failed to delete {}: {}", name, e),
        }
    }
}
