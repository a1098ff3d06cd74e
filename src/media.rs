use regex::Regex;
use std::sync::OnceLock;

/// Matches the URL shapes the portal accepts for gallery videos:
/// `watch?v=`, `youtu.be/`, `embed/`, `v/`, `u/<x>/` and bare `&v=` params.
fn youtube_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(youtu\.be/|v/|u/\w/|embed/|watch\?v=|&v=)([^#&?]*)")
            .expect("youtube url pattern")
    })
}

/// Extract the 11-character video id from a recognized YouTube URL.
pub fn youtube_id(url: &str) -> Option<&str> {
    let caps = youtube_pattern().captures(url)?;
    let id = caps.get(2)?.as_str();
    if id.len() == 11 {
        Some(id)
    } else {
        None
    }
}

/// Normalize any recognized YouTube URL to its canonical embed form.
/// Unrecognized strings pass through unchanged.
pub fn embed_url(url: &str) -> String {
    match youtube_id(url) {
        Some(id) => format!("https://www.youtube.com/embed/{}", id),
        None => url.to_string(),
    }
}

pub fn thumbnail_url(url: &str) -> Option<String> {
    youtube_id(url).map(|id| format!("https://img.youtube.com/vi/{}/hqdefault.jpg", id))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "dQw4w9WgXcQ";

    #[test]
    fn recognizes_common_shapes() {
        let expect = format!("https://www.youtube.com/embed/{}", ID);
        for url in [
            format!("https://www.youtube.com/watch?v={}", ID),
            format!("https://youtu.be/{}", ID),
            format!("https://www.youtube.com/embed/{}", ID),
            format!("https://www.youtube.com/v/{}", ID),
            format!("https://www.youtube.com/watch?feature=share&v={}", ID),
            format!("https://m.youtube.com/watch?v={}&t=42s", ID),
        ] {
            assert_eq!(embed_url(&url), expect, "url: {}", url);
        }
    }

    #[test]
    fn passes_through_unrecognized_strings() {
        for url in [
            "https://vimeo.com/12345",
            "not a url at all",
            "https://www.youtube.com/watch?v=short",
            "",
        ] {
            assert_eq!(embed_url(url), url);
        }
    }

    #[test]
    fn thumbnail_only_for_recognized() {
        assert_eq!(
            thumbnail_url(&format!("https://youtu.be/{}", ID)).as_deref(),
            Some("https://img.youtube.com/vi/dQw4w9WgXcQ/hqdefault.jpg")
        );
        assert!(thumbnail_url("https://example.com/clip.mp4").is_none());
    }
}
