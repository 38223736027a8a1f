use std::path::Path;
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction};
use tracing::debug;

use crate::database::models::{Comment, Post, PostDraft, PostFilter, Term, TermKind};
use crate::database::schema::SCHEMA;
use crate::error::{BlogError, Result};

const POST_COLUMNS: &str =
    "id, title, slug, category_id, content, image, author, published, created_at, updated_at";

/// SQLite-backed store for posts, categories, tags and comments.
pub struct BlogRepository {
    conn: Connection,
}

impl BlogRepository {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // ---- categories & tags ----

    pub fn insert_term(&self, kind: TermKind, name: &str, slug: &str) -> Result<Term> {
        self.conn.execute(
            &format!("INSERT INTO {} (name, slug) VALUES (?1, ?2)", kind.table()),
            params![name, slug],
        )?;
        Ok(Term {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            slug: slug.to_string(),
        })
    }

    pub fn get_term(&self, kind: TermKind, id: i64) -> Result<Option<Term>> {
        let term = self
            .conn
            .query_row(
                &format!("SELECT id, name, slug FROM {} WHERE id = ?1", kind.table()),
                params![id],
                term_from_row,
            )
            .optional()?;
        Ok(term)
    }

    pub fn get_term_by_slug(&self, kind: TermKind, slug: &str) -> Result<Option<Term>> {
        let term = self
            .conn
            .query_row(
                &format!("SELECT id, name, slug FROM {} WHERE slug = ?1", kind.table()),
                params![slug],
                term_from_row,
            )
            .optional()?;
        Ok(term)
    }

    pub fn update_term(&self, kind: TermKind, term: &Term) -> Result<()> {
        let changed = self.conn.execute(
            &format!("UPDATE {} SET name = ?1, slug = ?2 WHERE id = ?3", kind.table()),
            params![term.name, term.slug, term.id],
        )?;
        if changed == 0 {
            return Err(BlogError::not_found(kind.label(), term.id));
        }
        Ok(())
    }

    pub fn delete_term(&self, kind: TermKind, id: i64) -> Result<bool> {
        let changed = self.conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", kind.table()),
            params![id],
        )?;
        Ok(changed > 0)
    }

    pub fn list_terms(&self, kind: TermKind) -> Result<Vec<Term>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT id, name, slug FROM {} ORDER BY name", kind.table()))?;
        let terms = stmt
            .query_map([], term_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(terms)
    }

    // ---- posts ----

    pub fn insert_post(&mut self, draft: &PostDraft, slug: &str) -> Result<Post> {
        let now = Utc::now();
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO posts (title, slug, category_id, content, image, author, published, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                draft.title,
                slug,
                draft.category_id,
                draft.content,
                draft.image,
                draft.author,
                draft.published,
                now
            ],
        )?;
        let id = tx.last_insert_rowid();
        replace_tags(&tx, id, &draft.tag_ids)?;
        tx.commit()?;

        debug!("Inserted post {} ({})", id, slug);
        self.get_post(id)?.ok_or_else(|| BlogError::not_found("post", id))
    }

    /// Writes every editable column of `post` and bumps `updated_at`.
    pub fn update_post(&mut self, post: &Post) -> Result<Post> {
        let tx = self.conn.transaction()?;
        let changed = tx.execute(
            "UPDATE posts SET title = ?1, slug = ?2, category_id = ?3, content = ?4, image = ?5,
                 author = ?6, published = ?7, updated_at = ?8
             WHERE id = ?9",
            params![
                post.title,
                post.slug,
                post.category_id,
                post.content,
                post.image,
                post.author,
                post.published,
                Utc::now(),
                post.id
            ],
        )?;
        if changed == 0 {
            return Err(BlogError::not_found("post", post.id));
        }
        replace_tags(&tx, post.id, &post.tag_ids)?;
        tx.commit()?;

        self.get_post(post.id)?.ok_or_else(|| BlogError::not_found("post", post.id))
    }

    pub fn get_post(&self, id: i64) -> Result<Option<Post>> {
        let post = self
            .conn
            .query_row(
                &format!("SELECT {} FROM posts WHERE id = ?1", POST_COLUMNS),
                params![id],
                post_from_row,
            )
            .optional()?;
        post.map(|p| self.with_tags(p)).transpose()
    }

    pub fn get_post_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        let post = self
            .conn
            .query_row(
                &format!("SELECT {} FROM posts WHERE slug = ?1", POST_COLUMNS),
                params![slug],
                post_from_row,
            )
            .optional()?;
        post.map(|p| self.with_tags(p)).transpose()
    }

    /// Deletes the row and hands back what it held, for post-delete cleanup.
    pub fn delete_post(&mut self, id: i64) -> Result<Option<Post>> {
        let Some(post) = self.get_post(id)? else {
            return Ok(None);
        };
        self.conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
        Ok(Some(post))
    }

    /// Posts newest first.
    pub fn list_posts(&self, filter: &PostFilter) -> Result<Vec<Post>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if filter.published_only {
            clauses.push("published = 1".to_string());
        }
        if let Some(category) = &filter.category {
            values.push(category.clone());
            clauses.push(format!(
                "category_id IN (SELECT id FROM categories WHERE slug = ?{})",
                values.len()
            ));
        }
        if let Some(tag) = &filter.tag {
            values.push(tag.clone());
            clauses.push(format!(
                "id IN (SELECT pt.post_id FROM post_tags pt JOIN tags t ON t.id = pt.tag_id WHERE t.slug = ?{})",
                values.len()
            ));
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            values.push(like_pattern(search));
            let n = values.len();
            clauses.push(format!(
                "(title LIKE ?{n} ESCAPE '\\' OR content LIKE ?{n} ESCAPE '\\')"
            ));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {} FROM posts {} ORDER BY created_at DESC, id DESC",
            POST_COLUMNS, where_sql
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let posts = stmt
            .query_map(params_from_iter(values.iter()), post_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        posts.into_iter().map(|p| self.with_tags(p)).collect()
    }

    fn with_tags(&self, mut post: Post) -> Result<Post> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT tag_id FROM post_tags WHERE post_id = ?1 ORDER BY tag_id")?;
        post.tag_ids = stmt
            .query_map(params![post.id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(post)
    }

    // ---- image references ----

    /// Titles of posts other than `exclude_id` whose primary image is `path`.
    pub fn posts_using_image(&self, path: &str, exclude_id: i64) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT title FROM posts WHERE image = ?1 AND id != ?2 ORDER BY id")?;
        let titles = stmt
            .query_map(params![path, exclude_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(titles)
    }

    /// Titles of posts other than `exclude_id` whose body mentions `path`
    /// anywhere (case-insensitive).
    pub fn posts_embedding(&self, path: &str, exclude_id: i64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT title FROM posts WHERE content LIKE ?1 ESCAPE '\\' AND id != ?2 ORDER BY id",
        )?;
        let titles = stmt
            .query_map(params![like_pattern(path), exclude_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(titles)
    }

    /// `(primary image, body)` of every post.
    pub fn image_references(&self) -> Result<Vec<(Option<String>, String)>> {
        let mut stmt = self.conn.prepare("SELECT image, content FROM posts")?;
        let refs = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(refs)
    }

    // ---- comments ----

    pub fn insert_comment(&self, post_id: i64, author: &str, content: &str) -> Result<Comment> {
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO comments (post_id, author, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![post_id, author, content, now],
        )?;
        Ok(Comment {
            id: self.conn.last_insert_rowid(),
            post_id,
            author: author.to_string(),
            content: content.to_string(),
            created_at: now,
        })
    }

    /// Comments on a post, newest first.
    pub fn list_comments(&self, post_id: i64) -> Result<Vec<Comment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, post_id, author, content, created_at FROM comments
             WHERE post_id = ?1 ORDER BY created_at DESC, id DESC",
        )?;
        let comments = stmt
            .query_map(params![post_id], |row| {
                Ok(Comment {
                    id: row.get(0)?,
                    post_id: row.get(1)?,
                    author: row.get(2)?,
                    content: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(comments)
    }

    pub fn delete_comment(&self, id: i64) -> Result<bool> {
        let changed = self.conn.execute("DELETE FROM comments WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}

fn replace_tags(tx: &Transaction<'_>, post_id: i64, tag_ids: &[i64]) -> Result<()> {
    tx.execute("DELETE FROM post_tags WHERE post_id = ?1", params![post_id])?;
    let mut stmt = tx.prepare("INSERT OR IGNORE INTO post_tags (post_id, tag_id) VALUES (?1, ?2)")?;
    for tag_id in tag_ids {
        stmt.execute(params![post_id, tag_id])?;
    }
    Ok(())
}

fn term_from_row(row: &Row<'_>) -> rusqlite::Result<Term> {
    Ok(Term {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
    })
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        slug: row.get(2)?,
        category_id: row.get(3)?,
        content: row.get(4)?,
        image: row.get(5)?,
        author: row.get(6)?,
        published: row.get(7)?,
        tag_ids: Vec::new(),
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

/// `%needle%` with LIKE wildcards in `needle` escaped by `\`.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(title: &str, content: &str, image: Option<&str>) -> PostDraft {
        PostDraft {
            title: title.to_string(),
            content: content.to_string(),
            image: image.map(str::to_string),
            ..PostDraft::default()
        }
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("a_b%c"), "%a\\_b\\%c%");
    }

    #[test]
    fn test_duplicate_slug_is_validation_error() -> Result<()> {
        let mut repo = BlogRepository::open_in_memory()?;
        repo.insert_post(&draft("One", "", None), "same")?;
        let err = repo.insert_post(&draft("Two", "", None), "same").unwrap_err();
        match err {
            BlogError::Validation { field, .. } => assert_eq!(field, "slug"),
            other => panic!("unexpected error: {other}"),
        }
        Ok(())
    }

    #[test]
    fn test_post_roundtrip_with_tags() -> Result<()> {
        let mut repo = BlogRepository::open_in_memory()?;
        let rust = repo.insert_term(TermKind::Tag, "Rust", "rust")?;
        let web = repo.insert_term(TermKind::Tag, "Web", "web")?;

        let mut d = draft("Hello", "<p>hi</p>", Some("blog_images/a.jpg"));
        d.tag_ids = vec![web.id, rust.id];
        let post = repo.insert_post(&d, "hello")?;
        assert_eq!(post.tag_ids, vec![rust.id, web.id]);
        assert_eq!(post.primary_image(), Some("blog_images/a.jpg"));

        let mut edited = post.clone();
        edited.tag_ids = vec![web.id];
        edited.content = "<p>bye</p>".to_string();
        let saved = repo.update_post(&edited)?;
        assert_eq!(saved.tag_ids, vec![web.id]);
        assert_eq!(saved.content, "<p>bye</p>");
        assert!(saved.updated_at >= post.updated_at);

        assert_eq!(repo.get_post_by_slug("hello")?.map(|p| p.id), Some(post.id));
        Ok(())
    }

    #[test]
    fn test_delete_post_cascades_comments() -> Result<()> {
        let mut repo = BlogRepository::open_in_memory()?;
        let post = repo.insert_post(&draft("P", "", None), "p")?;
        repo.insert_comment(post.id, "alice", "nice")?;
        assert_eq!(repo.list_comments(post.id)?.len(), 1);

        let removed = repo.delete_post(post.id)?;
        assert_eq!(removed.map(|p| p.id), Some(post.id));
        assert!(repo.list_comments(post.id)?.is_empty());
        assert!(repo.delete_post(post.id)?.is_none());
        Ok(())
    }

    #[test]
    fn test_deleting_category_unsets_posts() -> Result<()> {
        let mut repo = BlogRepository::open_in_memory()?;
        let cat = repo.insert_term(TermKind::Category, "News", "news")?;
        let mut d = draft("P", "", None);
        d.category_id = Some(cat.id);
        let post = repo.insert_post(&d, "p")?;

        assert!(repo.delete_term(TermKind::Category, cat.id)?);
        assert_eq!(repo.get_post(post.id)?.and_then(|p| p.category_id), None);
        Ok(())
    }

    #[test]
    fn test_list_posts_filters() -> Result<()> {
        let mut repo = BlogRepository::open_in_memory()?;
        let news = repo.insert_term(TermKind::Category, "News", "news")?;
        let rust = repo.insert_term(TermKind::Tag, "Rust", "rust")?;

        let mut a = draft("Release notes", "<p>Version 2</p>", None);
        a.category_id = Some(news.id);
        a.published = true;
        let a = repo.insert_post(&a, "release-notes")?;

        let mut b = draft("Ownership", "<p>Borrowing in RUST</p>", None);
        b.tag_ids = vec![rust.id];
        let b = repo.insert_post(&b, "ownership")?;

        let all = repo.list_posts(&PostFilter::default())?;
        assert_eq!(all.iter().map(|p| p.id).collect::<Vec<_>>(), vec![b.id, a.id]);

        let by_cat = repo.list_posts(&PostFilter { category: Some("news".into()), ..Default::default() })?;
        assert_eq!(by_cat.len(), 1);
        assert_eq!(by_cat[0].id, a.id);

        let by_tag = repo.list_posts(&PostFilter { tag: Some("rust".into()), ..Default::default() })?;
        assert_eq!(by_tag.len(), 1);
        assert_eq!(by_tag[0].id, b.id);

        let search = repo.list_posts(&PostFilter { search: Some("rust".into()), ..Default::default() })?;
        assert_eq!(search.len(), 1);
        assert_eq!(search[0].id, b.id);

        let published = repo.list_posts(&PostFilter { published_only: true, ..Default::default() })?;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].id, a.id);
        Ok(())
    }

    #[test]
    fn test_reference_queries_exclude_self() -> Result<()> {
        let mut repo = BlogRepository::open_in_memory()?;
        let body = r#"<img src="/media/blog_images/shared.jpg">"#;
        let a = repo.insert_post(&draft("A", body, Some("blog_images/cover.jpg")), "a")?;
        let b = repo.insert_post(&draft("B", &body.to_uppercase(), Some("blog_images/cover.jpg")), "b")?;

        assert_eq!(repo.posts_using_image("blog_images/cover.jpg", a.id)?, vec!["B"]);
        assert_eq!(repo.posts_embedding("blog_images/shared.jpg", b.id)?, vec!["A"]);
        assert_eq!(repo.posts_embedding("blog_images/shared.jpg", a.id)?, vec!["B"]);
        assert!(repo.posts_embedding("blog_images/other.jpg", a.id)?.is_empty());
        assert_eq!(repo.image_references()?.len(), 2);
        Ok(())
    }
}
