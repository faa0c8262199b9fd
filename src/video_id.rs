/// Video identifier extraction and URL canonicalization
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// A video id is 11 characters of URL-safe base64
static VIDEO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("valid video id regex"));

/// Path shapes that carry the id as their second segment
const ID_PATH_PREFIXES: [&str; 4] = ["embed", "shorts", "live", "v"];

/// Extract the video id from a YouTube URL
///
/// Recognized shapes:
/// - https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42
/// - https://youtu.be/dQw4w9WgXcQ?si=abc
/// - https://www.youtube.com/embed/dQw4w9WgXcQ
/// - https://www.youtube.com/shorts/dQw4w9WgXcQ (also /live/ and /v/)
///
/// Missing scheme is tolerated ("youtube.com/watch?v=...").
pub fn extract_video_id(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    let parsed = Url::parse(url)
        .or_else(|_| Url::parse(&format!("https://{}", url)))
        .ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let host = host.strip_prefix("m.").unwrap_or(host);

    let mut segments = parsed.path_segments()?.filter(|s| !s.is_empty());

    let candidate = match host {
        "youtu.be" => segments.next().map(str::to_string),
        "youtube.com" | "youtube-nocookie.com" | "music.youtube.com" => {
            match segments.next() {
                Some("watch") => parsed
                    .query_pairs()
                    .find(|(k, _)| k == "v")
                    .map(|(_, v)| v.into_owned()),
                Some(prefix) if ID_PATH_PREFIXES.contains(&prefix) => {
                    segments.next().map(str::to_string)
                }
                _ => None,
            }
        }
        _ => None,
    }?;

    VIDEO_ID.is_match(&candidate).then_some(candidate)
}

/// Canonical form of a video URL: the watch URL for its id, or the input verbatim
pub fn canonicalize_url(url: &str) -> String {
    match extract_video_id(url) {
        Some(id) => watch_url(&id),
        None => url.to_string(),
    }
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

/// Two URLs denote the same video iff their ids match, or, when either id is
/// missing, the raw strings match
pub fn is_same_video(a: &str, b: &str) -> bool {
    match (extract_video_id(a), extract_video_id(b)) {
        (Some(left), Some(right)) => left == right,
        _ => a == b,
    }
}

/// Whether a tab URL is a page we can extract from
pub fn is_video_page(url: &str) -> bool {
    extract_video_id(url).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "dQw4w9WgXcQ";

    #[test]
    fn test_extract_watch_urls() {
        assert_eq!(extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"), Some(ID.to_string()));
        assert_eq!(extract_video_id("https://youtube.com/watch?v=dQw4w9WgXcQ&t=42s"), Some(ID.to_string()));
        assert_eq!(extract_video_id("https://m.youtube.com/watch?feature=share&v=dQw4w9WgXcQ"), Some(ID.to_string()));
        assert_eq!(extract_video_id("youtube.com/watch?v=dQw4w9WgXcQ"), Some(ID.to_string()));
    }

    #[test]
    fn test_extract_short_and_embed_urls() {
        assert_eq!(extract_video_id("https://youtu.be/dQw4w9WgXcQ"), Some(ID.to_string()));
        assert_eq!(extract_video_id("https://youtu.be/dQw4w9WgXcQ?si=xyz&t=3"), Some(ID.to_string()));
        assert_eq!(extract_video_id("https://www.youtube.com/embed/dQw4w9WgXcQ?autoplay=1"), Some(ID.to_string()));
        assert_eq!(extract_video_id("https://www.youtube-nocookie.com/embed/dQw4w9WgXcQ"), Some(ID.to_string()));
        assert_eq!(extract_video_id("https://www.youtube.com/shorts/dQw4w9WgXcQ"), Some(ID.to_string()));
        assert_eq!(extract_video_id("https://www.youtube.com/live/dQw4w9WgXcQ"), Some(ID.to_string()));
    }

    #[test]
    fn test_extract_rejects_other_shapes() {
        assert_eq!(extract_video_id(""), None);
        assert_eq!(extract_video_id("https://www.youtube.com/"), None);
        assert_eq!(extract_video_id("https://www.youtube.com/results?search_query=rust"), None);
        assert_eq!(extract_video_id("https://www.youtube.com/watch?v=short"), None);
        assert_eq!(extract_video_id("https://example.com/watch?v=dQw4w9WgXcQ"), None);
        assert_eq!(extract_video_id("not a url at all"), None);
    }

    #[test]
    fn test_canonicalize() {
        assert_eq!(canonicalize_url("https://youtu.be/dQw4w9WgXcQ?t=1"), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(canonicalize_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ&list=PL1"), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(canonicalize_url("https://www.youtube.com/feed/subscriptions"), "https://www.youtube.com/feed/subscriptions");
    }

    #[test]
    fn test_is_same_video() {
        assert!(is_same_video("https://youtu.be/dQw4w9WgXcQ", "https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=10"));
        assert!(!is_same_video("https://youtu.be/dQw4w9WgXcQ", "https://youtu.be/aaaaaaaaaaa"));
        assert!(is_same_video("https://example.com/a", "https://example.com/a"));
        assert!(!is_same_video("https://example.com/a", "https://youtu.be/dQw4w9WgXcQ"));
    }

    #[test]
    fn test_is_video_page() {
        assert!(is_video_page("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(!is_video_page("https://www.youtube.com/"));
        assert!(!is_video_page("chrome://extensions"));
    }
}
