use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod analyzer;
pub mod backend;
pub mod config_file;
pub mod extract;
pub mod history;
pub mod mock;
pub mod orchestrator;

// Re-export for convenience
pub use analyzer::analyze;
pub use backend::{BackendError, OcrEngine, OcrStatus, PdfBackend, PdfDocument};
pub use extract::{ExtractError, Extractor, ExtractorKind, OcrExtractor, PdfTextExtractor, select};
pub use history::{HistoryError, HistoryStore, JsonHistoryStore, MemoryHistoryStore};
pub use orchestrator::{Pipeline, PipelineError, PipelineOptions, PipelineState};

/// Media type of PDF documents.
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// A document submitted for extraction: raw bytes plus the media type the
/// caller declared for them.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub name: String,
    pub media_type: String,
    pub bytes: Arc<[u8]>,
}

impl InputFile {
    pub fn new(
        name: impl Into<String>,
        media_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }
}

/// Sentiment label attached to an analysis.
///
/// The analyzer does not classify sentiment; it always reports
/// [`Sentiment::Positive`]. The other variants exist so stored records with
/// a different label still deserialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Sentiment::Positive => "Positive",
            Sentiment::Neutral => "Neutral",
            Sentiment::Negative => "Negative",
        };
        f.write_str(s)
    }
}

/// Statistics and suggestions derived from extracted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub sentiment: Sentiment,
    /// Up to 10 distinct tokens, most frequent first.
    pub keywords: Vec<String>,
    pub word_count: usize,
    pub sentence_count: usize,
    /// Always exactly 4 entries.
    pub suggestions: Vec<String>,
}

/// One persisted pipeline result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRecord {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
}

impl PipelineRecord {
    /// Create a record stamped with the current time.
    pub fn new(text: String, analysis: Option<AnalysisResult>) -> Self {
        Self {
            text,
            analysis,
            timestamp: Utc::now(),
        }
    }
}

/// Phase of a pipeline run that a progress report belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Extracting,
    Analyzing,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Extracting => f.write_str("Extracting"),
            Phase::Analyzing => f.write_str("Analyzing"),
        }
    }
}

/// Events delivered to the presentation layer during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// Completion of the current phase, 0–100. Resets to 0 when a new phase
    /// starts.
    Progress { phase: Phase, percent: u8 },
    Failed { message: String },
    Completed {
        text: String,
        analysis: Box<AnalysisResult>,
    },
    /// The run completed but its record could not be stored.
    HistoryWriteFailed { message: String },
}

/// Serialize timestamps as ISO-8601 UTC instants with millisecond precision,
/// e.g. `2024-05-01T09:30:00.000Z`.
mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serializes_with_camel_case_analysis() {
        let record = PipelineRecord {
            text: "Hello world.".into(),
            analysis: Some(analyze("Hello world.")),
            timestamp: DateTime::parse_from_rfc3339("2024-05-01T09:30:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["text"], "Hello world.");
        assert_eq!(json["timestamp"], "2024-05-01T09:30:00.000Z");
        assert_eq!(json["analysis"]["sentiment"], "Positive");
        assert_eq!(json["analysis"]["wordCount"], 2);
        assert_eq!(json["analysis"]["sentenceCount"], 1);
        assert_eq!(json["analysis"]["suggestions"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn record_without_analysis_omits_field() {
        let record = PipelineRecord::new("plain".into(), None);
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("analysis").is_none());
    }

    #[test]
    fn extraction_only_record_deserializes() {
        let raw = r#"{"text":"scanned page\n","timestamp":"2023-11-02T18:04:12.345Z"}"#;
        let record: PipelineRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.text, "scanned page\n");
        assert!(record.analysis.is_none());
        assert_eq!(record.timestamp.timestamp_subsec_millis(), 345);
    }

    #[test]
    fn invalid_timestamp_is_rejected() {
        let raw = r#"{"text":"x","timestamp":"yesterday"}"#;
        assert!(serde_json::from_str::<PipelineRecord>(raw).is_err());
    }
}
