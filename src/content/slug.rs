use crate::error::{BlogError, Result};

/// Lowercase, transliterated, hyphen-separated form of `name`.
pub fn slugify(name: &str) -> String {
    ::slug::slugify(name)
}

pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--")
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Slug for a record that is about to be inserted. A supplied slug wins
/// over the derived one but still has to be well formed.
pub fn assign_on_create(name: &str, supplied: Option<&str>) -> Result<String> {
    match supplied.map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) => checked(slug.to_string()),
        None => derive(name),
    }
}

/// Slug for a record being updated. A change of name or a blanked slug
/// regenerates it; otherwise whatever is in `current_slug` (possibly hand
/// edited) is kept.
pub fn assign_on_update(previous_name: &str, name: &str, current_slug: &str) -> Result<String> {
    let current = current_slug.trim();
    if previous_name != name || current.is_empty() {
        derive(name)
    } else {
        checked(current.to_string())
    }
}

fn derive(name: &str) -> Result<String> {
    let slug = slugify(name);
    if slug.is_empty() {
        return Err(BlogError::validation(
            "slug",
            format!("{:?} has no characters usable in a slug", name),
        ));
    }
    Ok(slug)
}

fn checked(slug: String) -> Result<String> {
    if is_valid_slug(&slug) {
        Ok(slug)
    } else {
        Err(BlogError::validation(
            "slug",
            format!("{:?} must be lowercase letters, digits and single hyphens", slug),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Rust   &  Django  "), "rust-django");
        assert_eq!(slugify("Café Crème"), "cafe-creme");
    }

    #[test]
    fn test_slugify_is_idempotent() {
        for name in ["Hello, World!", "A -- B", "Ünïcödé Tïtle 2024", "already-a-slug", "___"] {
            let once = slugify(name);
            assert_eq!(slugify(&once), once, "not idempotent for {:?}", name);
        }
    }

    #[test]
    fn test_derived_slugs_are_valid() {
        for name in ["Hello, World!", "-leading and trailing-", "Numbers 1 2 3"] {
            assert!(is_valid_slug(&slugify(name)), "{:?}", name);
        }
    }

    #[test]
    fn test_create_uses_supplied_slug() -> Result<()> {
        assert_eq!(assign_on_create("My Post", None)?, "my-post");
        assert_eq!(assign_on_create("My Post", Some(""))?, "my-post");
        assert_eq!(assign_on_create("My Post", Some("custom"))?, "custom");
        assert!(assign_on_create("My Post", Some("Not A Slug")).unwrap_err().is_validation());
        Ok(())
    }

    #[test]
    fn test_unusable_name_is_rejected() {
        let err = assign_on_create("!!!", None).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_update_keeps_slug_when_name_unchanged() -> Result<()> {
        assert_eq!(assign_on_update("My Post", "My Post", "hand-edited")?, "hand-edited");
        assert_eq!(assign_on_update("My Post", "Renamed Post", "hand-edited")?, "renamed-post");
        Ok(())
    }

    #[test]
    fn test_update_with_blank_slug_derives_from_name() -> Result<()> {
        assert_eq!(assign_on_update("My Post", "My Post", "")?, "my-post");
        assert_eq!(assign_on_update("My Post", "My Post", "   ")?, "my-post");
        assert!(assign_on_update("!!!", "!!!", "").unwrap_err().is_validation());
        Ok(())
    }
}
