/// Prompt templates for the derived artifacts
use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::transcript::Transcript;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("valid placeholder regex"));

pub const KEY_POINTS_TEMPLATE: &str = r#"You are analyzing the transcript of a YouTube video titled "{title}".

Extract the key points of the video. Write them as a Markdown bullet list, one point per bullet, in the order they come up. Group closely related points under short bold headings when the video covers several topics. Keep each bullet to one or two sentences, keep concrete numbers, names and examples, and leave out filler, sponsor segments and calls to subscribe.

Transcript:
{transcript}"#;

pub const ARTICLE_TEMPLATE: &str = r#"You are writing an article based on a YouTube video titled "{title}".

Use the key points below as the outline and the transcript for detail and accurate wording. Write a well-structured Markdown article with a title, a short introduction, one section per major theme, and a brief conclusion. Write in clear prose rather than bullets, do not invent facts that are not in the transcript, and do not mention that the article was generated from a video transcript.

Key points:
{key_points}

Transcript:
{transcript}"#;

/// Fill `{name}` placeholders in one pass; inserted values are never re-scanned and
/// unknown placeholders are left as they are
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            values
                .iter()
                .find(|(name, _)| *name == &caps[1])
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

pub fn key_points_prompt(transcript: &Transcript) -> String {
    let text = transcript.plain_text();
    render(
        KEY_POINTS_TEMPLATE,
        &[("title", transcript.video_title.as_str()), ("transcript", text.as_str())],
    )
}

pub fn article_prompt(key_points: &str, transcript: &Transcript) -> String {
    let text = transcript.plain_text();
    render(
        ARTICLE_TEMPLATE,
        &[
            ("title", transcript.video_title.as_str()),
            ("key_points", key_points.trim()),
            ("transcript", text.as_str()),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::{ExtractionSource, TranscriptSegment};

    fn transcript() -> Transcript {
        Transcript::new(
            "https://youtu.be/dQw4w9WgXcQ".to_string(),
            "Rust in 100 Seconds".to_string(),
            0.0,
            ExtractionSource::TranscriptPanel,
            vec![
                TranscriptSegment::new("0:00", "Rust is a memory-safe language"),
                TranscriptSegment::new("0:04", "with no garbage collector {title}"),
            ],
        )
    }

    #[test]
    fn test_render_single_pass() {
        let out = render("{a} and {b} and {missing}", &[("a", "{b}"), ("b", "B")]);
        assert_eq!(out, "{b} and B and {missing}");
    }

    #[test]
    fn test_key_points_prompt() {
        let prompt = key_points_prompt(&transcript());
        assert!(prompt.contains("titled \"Rust in 100 Seconds\""));
        assert!(prompt.contains("Rust is a memory-safe language with no garbage collector {title}"));
        assert!(!prompt.contains("{transcript}"));
    }

    #[test]
    fn test_article_prompt() {
        let prompt = article_prompt("  - fast\n- safe  ", &transcript());
        assert!(prompt.contains("Key points:\n- fast\n- safe\n"));
        assert!(prompt.contains("Transcript:\nRust is a memory-safe language"));
        assert!(!prompt.contains("{key_points}"));
    }
}
