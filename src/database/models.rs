use chrono::{DateTime, Utc};
use serde::Serialize;

/// Categories and tags share one shape and differ only in where they live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermKind {
    Category,
    Tag,
}

impl TermKind {
    pub(crate) fn table(self) -> &'static str {
        match self {
            TermKind::Category => "categories",
            TermKind::Tag => "tags",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TermKind::Category => "category",
            TermKind::Tag => "tag",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Term {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub category_id: Option<i64>,
    /// Rich-text HTML body.
    pub content: String,
    /// Media-root-relative path of the primary image.
    pub image: Option<String>,
    pub author: Option<String>,
    pub published: bool,
    pub tag_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn primary_image(&self) -> Option<&str> {
        self.image.as_deref().filter(|s| !s.is_empty())
    }
}

/// Fields supplied when creating a post.
#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    pub title: String,
    pub slug: Option<String>,
    pub category_id: Option<i64>,
    pub content: String,
    pub image: Option<String>,
    pub author: Option<String>,
    pub published: bool,
    pub tag_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub category: Option<String>,
    pub tag: Option<String>,
    /// Case-insensitive match against title or body.
    pub search: Option<String>,
    pub published_only: bool,
}
