use std::fs;
use tracing::{info, warn};

use crate::content::slug;
use crate::database::models::{Comment, Post, PostDraft, PostFilter, Term, TermKind};
use crate::database::repo::BlogRepository;
use crate::error::{BlogError, Result};
use crate::media::reconciler::{MediaReconciler, Reconciled, SweepSummary};
use crate::media::storage::FileStorage;
use crate::media::upload::{self, UploadResponse};
use crate::utils::config::Settings;

/// Every content operation goes through here so that slug assignment and
/// media cleanup run in the right order around the store.
pub struct Blog {
    repo: BlogRepository,
    storage: FileStorage,
    image_dir: String,
}

impl Blog {
    pub fn open(settings: &Settings) -> Result<Self> {
        let repo = BlogRepository::open(&settings.db_path)?;
        Ok(Self::new(repo, settings))
    }

    pub fn new(repo: BlogRepository, settings: &Settings) -> Self {
        Self {
            repo,
            storage: FileStorage::new(&settings.media_root, settings.media_url.clone()),
            image_dir: settings.image_dir.clone(),
        }
    }

    pub fn repo(&self) -> &BlogRepository {
        &self.repo
    }

    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    /// Creates the managed image directory if it is missing.
    pub fn ensure_media_dirs(&self) -> Result<()> {
        fs::create_dir_all(self.storage.path(&self.image_dir)?)?;
        Ok(())
    }

    fn reconciler(&self) -> MediaReconciler<'_> {
        MediaReconciler::new(&self.repo, &self.storage)
    }

    // ---- categories & tags ----

    pub fn add_term(&self, kind: TermKind, name: &str) -> Result<Term> {
        let name = required("name", name)?;
        let slug = slug::assign_on_create(name, None)?;
        let term = self.repo.insert_term(kind, name, &slug)?;
        info!("Created {} {:?} ({})", kind.label(), term.name, term.slug);
        Ok(term)
    }

    pub fn rename_term(&self, kind: TermKind, id: i64, name: &str) -> Result<Term> {
        let name = required("name", name)?;
        let mut term = self
            .repo
            .get_term(kind, id)?
            .ok_or_else(|| BlogError::not_found(kind.label(), id))?;
        term.slug = slug::assign_on_update(&term.name, name, &term.slug)?;
        term.name = name.to_string();
        self.repo.update_term(kind, &term)?;
        Ok(term)
    }

    pub fn delete_term(&self, kind: TermKind, id: i64) -> Result<()> {
        if !self.repo.delete_term(kind, id)? {
            return Err(BlogError::not_found(kind.label(), id));
        }
        Ok(())
    }

    // ---- posts ----

    pub fn create_post(&mut self, draft: &PostDraft) -> Result<Post> {
        required("title", &draft.title)?;
        let slug = slug::assign_on_create(&draft.title, draft.slug.as_deref())?;
        let post = self.repo.insert_post(draft, &slug)?;
        info!("Created post {} ({})", post.id, post.slug);
        Ok(post)
    }

    /// Saves `edited` over the stored post with the same id, then removes
    /// images the edit left unreferenced.
    pub fn update_post(&mut self, edited: &Post) -> Result<(Post, Reconciled)> {
        required("title", &edited.title)?;
        let previous = self
            .repo
            .get_post(edited.id)?
            .ok_or_else(|| BlogError::not_found("post", edited.id))?;

        let mut next = edited.clone();
        next.slug = slug::assign_on_update(&previous.title, &edited.title, &edited.slug)?;
        let saved = self.repo.update_post(&next)?;

        let cleanup = self.reconciler().after_update(&previous, &saved).unwrap_or_else(|e| {
            warn!("Media cleanup after updating post {} failed: {}", saved.id, e);
            Reconciled::default()
        });
        Ok((saved, cleanup))
    }

    /// Removes the post, then its images unless another post still uses them.
    pub fn delete_post(&mut self, id: i64) -> Result<(Post, Reconciled)> {
        let removed = self
            .repo
            .delete_post(id)?
            .ok_or_else(|| BlogError::not_found("post", id))?;
        info!("Deleted post {} ({})", removed.id, removed.slug);

        let cleanup = self.reconciler().after_delete(&removed).unwrap_or_else(|e| {
            warn!("Media cleanup after deleting post {} failed: {}", removed.id, e);
            Reconciled::default()
        });
        Ok((removed, cleanup))
    }

    pub fn post(&self, id: i64) -> Result<Post> {
        self.repo.get_post(id)?.ok_or_else(|| BlogError::not_found("post", id))
    }

    pub fn post_by_slug(&self, slug: &str) -> Result<Post> {
        self.repo
            .get_post_by_slug(slug)?
            .ok_or_else(|| BlogError::not_found("post", slug))
    }

    pub fn posts(&self, filter: &PostFilter) -> Result<Vec<Post>> {
        self.repo.list_posts(filter)
    }

    // ---- comments ----

    pub fn add_comment(&self, post_id: i64, author: &str, content: &str) -> Result<Comment> {
        let author = required("author", author)?;
        let content = required("content", content)?;
        self.post(post_id)?;
        self.repo.insert_comment(post_id, author, content)
    }

    pub fn comments(&self, post_id: i64) -> Result<Vec<Comment>> {
        self.repo.list_comments(post_id)
    }

    pub fn delete_comment(&self, id: i64) -> Result<()> {
        if !self.repo.delete_comment(id)? {
            return Err(BlogError::not_found("comment", id));
        }
        Ok(())
    }

    // ---- media ----

    /// Stores a primary image for a post. An image that cannot be
    /// re-encoded is dropped and `None` returned so the field stays empty.
    pub fn attach_primary_image(&self, file_name: &str, data: &[u8]) -> Result<Option<String>> {
        match upload::store_image(&self.storage, &self.image_dir, file_name, data) {
            Ok(name) => Ok(Some(name)),
            Err(e @ BlogError::Unprocessable { .. }) => {
                warn!("Discarding primary image {:?}: {}", file_name, e);
                Ok(None)
            }
            Err(BlogError::NotAnImage(mime)) => Err(BlogError::validation(
                "image",
                format!("{:?} is not an image ({})", file_name, mime),
            )),
            Err(e) => Err(e),
        }
    }

    pub fn upload_editor_image(&self, file_name: &str, data: &[u8]) -> UploadResponse {
        upload::handle_editor_upload(&self.storage, &self.image_dir, file_name, data)
    }

    pub fn sweep_unused_images(&self) -> Result<SweepSummary> {
        self.reconciler().sweep(&self.image_dir)
    }
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(BlogError::validation(field, "may not be blank"));
    }
    Ok(value)
}
