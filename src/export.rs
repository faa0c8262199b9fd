/// Markdown and plain-text export of a tab's transcript and derived artifacts
use std::fmt::Write;
use std::sync::LazyLock;

use regex::Regex;

use crate::tab_state::TabState;
use crate::transcript::Transcript;

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]+"#).expect("valid filename regex"));

const MAX_FILENAME_STEM: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Markdown,
    PlainText,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::PlainText => "txt",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Markdown => "text/markdown",
            ExportFormat::PlainText => "text/plain",
        }
    }
}

/// A rendered document ready to download
#[derive(Debug, Clone, PartialEq)]
pub struct ExportFile {
    pub filename: String,
    pub mime_type: &'static str,
    pub content: String,
}

/// Filesystem-safe file name from a video title
pub fn export_filename(title: &str, format: ExportFormat) -> String {
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(title, " ");
    let stem: String = cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches('.')
        .chars()
        .take(MAX_FILENAME_STEM)
        .collect();
    let stem = stem.trim();

    if stem.is_empty() {
        format!("transcript.{}", format.extension())
    } else {
        format!("{}.{}", stem, format.extension())
    }
}

/// Export everything known about a tab; `None` until a transcript exists
pub fn export_tab(state: &TabState, format: ExportFormat) -> Option<ExportFile> {
    let transcript = state.transcript.as_ref().filter(|t| !t.is_empty())?;
    let title = if transcript.video_title.trim().is_empty() {
        state.title.as_str()
    } else {
        transcript.video_title.as_str()
    };

    let content = match format {
        ExportFormat::Markdown => render_markdown(title, state, transcript),
        ExportFormat::PlainText => render_plain(title, state, transcript),
    };

    Some(ExportFile {
        filename: export_filename(title, format),
        mime_type: format.mime_type(),
        content,
    })
}

fn render_markdown(title: &str, state: &TabState, transcript: &Transcript) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", title);
    let _ = writeln!(out, "Source: <{}>\n", transcript.source_url);

    if let Some(key_points) = &state.key_points {
        let _ = writeln!(out, "## Key Points\n\n{}\n", key_points.trim());
    }
    if let Some(article) = &state.article {
        let _ = writeln!(out, "## Article\n\n{}\n", article.trim());
    }

    let _ = writeln!(out, "## Transcript\n");
    // Synthetic "#n" indices carry no timing, so they are not shown
    if transcript.source.has_real_timestamps() {
        for segment in &transcript.segments {
            let _ = writeln!(out, "- **{}** {}", segment.timestamp, segment.text);
        }
    } else {
        for segment in &transcript.segments {
            let _ = writeln!(out, "{}\n", segment.text);
        }
    }
    out.trim_end().to_string() + "\n"
}

fn render_plain(title: &str, state: &TabState, transcript: &Transcript) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}\n{}\n", title, transcript.source_url);

    if let Some(key_points) = &state.key_points {
        let _ = writeln!(out, "KEY POINTS\n\n{}\n", key_points.trim());
    }
    if let Some(article) = &state.article {
        let _ = writeln!(out, "ARTICLE\n\n{}\n", article.trim());
    }

    let _ = writeln!(out, "TRANSCRIPT\n");
    if transcript.source.has_real_timestamps() {
        let _ = writeln!(out, "{}", transcript.timestamped_text());
    } else {
        let _ = writeln!(out, "{}", transcript.plain_text());
    }
    out.trim_end().to_string() + "\n"
}
