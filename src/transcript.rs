/// Transcript data structures
use serde::{Deserialize, Serialize};

/// One timestamped unit of transcript text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptSegment {
    /// Display form ("1:05"), or a synthetic "#n" index for sources without timing
    pub timestamp: String,
    pub text: String,
}

impl TranscriptSegment {
    pub fn new(timestamp: impl Into<String>, text: impl Into<String>) -> TranscriptSegment {
        TranscriptSegment {
            timestamp: timestamp.into(),
            text: text.into(),
        }
    }

    /// Synthetic timestamp for sources that carry no timing information
    pub fn indexed(index: usize, text: impl Into<String>) -> TranscriptSegment {
        TranscriptSegment::new(format!("#{}", index), text)
    }
}

/// Which extraction strategy produced a transcript
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ExtractionSource {
    TranscriptPanel,
    Captions,
    Generic,
    #[default]
    None,
}

impl ExtractionSource {
    /// Only the panel carries real elapsed-time timestamps
    pub fn has_real_timestamps(self) -> bool {
        self == ExtractionSource::TranscriptPanel
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub source_url: String,
    pub video_title: String,
    pub extracted_at: f64,
    #[serde(default)]
    pub source: ExtractionSource,
    pub segments: Vec<TranscriptSegment>,
}

impl Transcript {
    /// Build a transcript, dropping any segment whose text is blank
    pub fn new(
        source_url: String,
        video_title: String,
        extracted_at: f64,
        source: ExtractionSource,
        segments: Vec<TranscriptSegment>,
    ) -> Transcript {
        let segments = segments
            .into_iter()
            .filter(|s| !s.text.trim().is_empty())
            .collect();

        Transcript {
            source_url,
            video_title,
            extracted_at,
            source,
            segments,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segment text joined into one block, as sent to the API
    pub fn plain_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.trim())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// One "[timestamp] text" line per segment
    pub fn timestamped_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| format!("[{}] {}", s.timestamp, s.text.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn word_count(&self) -> usize {
        self.segments
            .iter()
            .map(|s| s.text.split_whitespace().count())
            .sum()
    }
}
