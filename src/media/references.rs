use std::collections::BTreeSet;
use std::sync::LazyLock;
use regex::Regex;

static IMG_SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<img\s(?:[^>]*?\s)?src="([^"]+)""#).expect("img src pattern")
});

/// Media-root-relative paths of every local `<img src="...">` in `html`.
///
/// Sources that carry a scheme or a network host (`https://...`, `//cdn/...`,
/// `data:...`) are not ours and are skipped, as is anything that still points
/// outside the media root once `media_url` has been stripped.
pub fn embedded_images(html: &str, media_url: &str) -> BTreeSet<String> {
    IMG_SRC
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .filter_map(|src| to_media_path(src.as_str(), media_url))
        .collect()
}

/// Maps a URL as it appears in markup to a path under the media root.
pub fn to_media_path(url: &str, media_url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() || url.starts_with("//") || has_scheme(url) {
        return None;
    }

    // Query strings and fragments never name a different file.
    let url = url.split(['?', '#']).next().unwrap_or(url);

    let relative = match url.strip_prefix(media_url) {
        Some(rest) => rest,
        None if url.starts_with('/') => return None,
        None => url,
    };

    if relative.is_empty() || relative.split('/').any(|seg| seg == "..") {
        return None;
    }
    Some(relative.to_string())
}

fn has_scheme(url: &str) -> bool {
    match url.find(':') {
        Some(colon) => {
            let scheme = &url[..colon];
            !scheme.is_empty()
                && !scheme.contains('/')
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEDIA_URL: &str = "/media/";

    #[test]
    fn test_extracts_local_images() {
        let html = r#"<p>intro</p>
            <img alt="a" src="/media/blog_images/a.jpg" />
            <img src="/media/blog_images/nested/b.png" width="10">
            <img src="https://cdn.example.com/c.jpg">"#;
        let found: Vec<_> = embedded_images(html, MEDIA_URL).into_iter().collect();
        assert_eq!(found, vec!["blog_images/a.jpg", "blog_images/nested/b.png"]);
    }

    #[test]
    fn test_only_the_src_attribute_counts() {
        let html = r#"<img data-src="/media/blog_images/lazy.jpg" src="/media/blog_images/real.jpg">
            <img class="x" data-src="/media/blog_images/only-lazy.jpg">"#;
        let found: Vec<_> = embedded_images(html, MEDIA_URL).into_iter().collect();
        assert_eq!(found, vec!["blog_images/real.jpg"]);
    }

    #[test]
    fn test_ignores_foreign_sources() {
        assert_eq!(to_media_path("http://example.com/media/x.jpg", MEDIA_URL), None);
        assert_eq!(to_media_path("//example.com/x.jpg", MEDIA_URL), None);
        assert_eq!(to_media_path("data:image/png;base64,AAAA", MEDIA_URL), None);
        assert_eq!(to_media_path("/static/logo.png", MEDIA_URL), None);
        assert_eq!(to_media_path("/media/../secret", MEDIA_URL), None);
    }

    #[test]
    fn test_relative_sources_are_kept() {
        assert_eq!(
            to_media_path("blog_images/a.jpg", MEDIA_URL).as_deref(),
            Some("blog_images/a.jpg")
        );
        assert_eq!(
            to_media_path("/media/blog_images/a.jpg?v=2", MEDIA_URL).as_deref(),
            Some("blog_images/a.jpg")
        );
    }

    #[test]
    fn test_duplicates_collapse() {
        let html = r#"<img src="/media/x.jpg"><IMG class="y" src="/media/x.jpg">"#;
        assert_eq!(embedded_images(html, MEDIA_URL).len(), 1);
    }

    #[test]
    fn test_empty_body() {
        assert!(embedded_images("", MEDIA_URL).is_empty());
        assert!(embedded_images("<p>no images</p>", MEDIA_URL).is_empty());
    }
}
