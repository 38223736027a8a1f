//! Turns links to known video and social hosts into their embed widgets.

use std::borrow::Cow;
use std::sync::LazyLock;
use regex::{Captures, Regex};

static ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href="([^"]+)"[^>]*>.*?</a>"#).expect("anchor pattern")
});

static YOUTUBE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https?://(?:www\.|m\.)?(?:youtube\.com/(?:watch\?(?:\S*?(?:&amp;|&))?v=|shorts/|embed/)|youtu\.be/)([A-Za-z0-9_-]{11})",
    )
    .expect("youtube pattern")
});

static VIMEO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:www\.)?vimeo\.com/(\d+)").expect("vimeo pattern")
});

static TWEET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:www\.|mobile\.)?(?:twitter|x)\.com/([A-Za-z0-9_]{1,15})/status/(\d+)")
        .expect("tweet pattern")
});

static INSTAGRAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:www\.)?instagram\.com/(p|reel)/([A-Za-z0-9_-]+)")
        .expect("instagram pattern")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Embed {
    YouTube { id: String },
    Vimeo { id: String },
    Tweet { user: String, id: String },
    Instagram { kind: String, id: String },
}

impl Embed {
    pub fn detect(href: &str) -> Option<Embed> {
        let href = href.trim();
        if let Some(c) = YOUTUBE.captures(href) {
            return Some(Embed::YouTube { id: c[1].to_string() });
        }
        if let Some(c) = VIMEO.captures(href) {
            return Some(Embed::Vimeo { id: c[1].to_string() });
        }
        if let Some(c) = TWEET.captures(href) {
            return Some(Embed::Tweet { user: c[1].to_string(), id: c[2].to_string() });
        }
        if let Some(c) = INSTAGRAM.captures(href) {
            return Some(Embed::Instagram { kind: c[1].to_string(), id: c[2].to_string() });
        }
        None
    }

    pub fn to_html(&self) -> String {
        match self {
            Embed::YouTube { id } => video_frame(&format!("https://www.youtube.com/embed/{}", id)),
            Embed::Vimeo { id } => video_frame(&format!("https://player.vimeo.com/video/{}", id)),
            Embed::Tweet { user, id } => format!(
                r#"<blockquote class="twitter-tweet"><a href="https://twitter.com/{user}/status/{id}"></a></blockquote>"#
            ),
            Embed::Instagram { kind, id } => format!(
                r#"<blockquote class="instagram-media" data-instgrm-permalink="https://www.instagram.com/{kind}/{id}/"></blockquote>"#
            ),
        }
    }
}

fn video_frame(src: &str) -> String {
    format!(
        r#"<div class="embed embed-video"><iframe src="{}" frameborder="0" allow="accelerometer; encrypted-media; gyroscope; picture-in-picture" allowfullscreen></iframe></div>"#,
        src
    )
}

/// Rewrites anchors pointing at recognised providers. Everything else is
/// returned untouched (and unallocated when nothing matched).
pub fn render_embeds(html: &str) -> Cow<'_, str> {
    ANCHOR.replace_all(html, |caps: &Captures<'_>| match Embed::detect(&caps[1]) {
        Some(embed) => embed.to_html(),
        None => caps[0].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_providers() {
        assert_eq!(
            Embed::detect("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some(Embed::YouTube { id: "dQw4w9WgXcQ".into() })
        );
        assert_eq!(
            Embed::detect("https://www.youtube.com/watch?feature=share&amp;v=dQw4w9WgXcQ"),
            Some(Embed::YouTube { id: "dQw4w9WgXcQ".into() })
        );
        assert_eq!(
            Embed::detect("https://youtu.be/dQw4w9WgXcQ"),
            Some(Embed::YouTube { id: "dQw4w9WgXcQ".into() })
        );
        assert_eq!(Embed::detect("https://vimeo.com/76979871"), Some(Embed::Vimeo { id: "76979871".into() }));
        assert_eq!(
            Embed::detect("https://x.com/rustlang/status/1234567890"),
            Some(Embed::Tweet { user: "rustlang".into(), id: "1234567890".into() })
        );
        assert_eq!(
            Embed::detect("https://www.instagram.com/p/CxYz_12-ab/"),
            Some(Embed::Instagram { kind: "p".into(), id: "CxYz_12-ab".into() })
        );
        assert_eq!(Embed::detect("https://example.com/watch?v=dQw4w9WgXcQ"), None);
    }

    #[test]
    fn test_render_rewrites_known_links() {
        let html = r#"<p>Watch: <a href="https://youtu.be/dQw4w9WgXcQ" target="_blank">this</a></p>"#;
        let out = render_embeds(html);
        assert!(out.contains(r#"<iframe src="https://www.youtube.com/embed/dQw4w9WgXcQ""#));
        assert!(!out.contains("<a "));
        assert!(out.starts_with("<p>Watch: <div"));
    }

    #[test]
    fn test_render_leaves_other_links_alone() {
        let html = r#"<p><a href="https://www.rust-lang.org/">Rust</a> and <img src="/media/x.jpg"></p>"#;
        assert_eq!(render_embeds(html), html);
        assert!(matches!(render_embeds("<p>plain</p>"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_render_handles_multiple_anchors() {
        let html = concat!(
            r#"<a href="https://vimeo.com/1">v</a>"#,
            r#"<a href="/about">about</a>"#,
            r#"<a href="https://twitter.com/a/status/2">t</a>"#
        );
        let out = render_embeds(html);
        assert!(out.contains("player.vimeo.com/video/1"));
        assert!(out.contains(r#"<a href="/about">about</a>"#));
        assert!(out.contains(r#"class="twitter-tweet""#));
    }
}
