use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use textlens_core::config_file::ConfigFile;
use textlens_core::extract::DEFAULT_OCR_LANGUAGE;
use textlens_core::{
    HistoryStore, InputFile, OcrExtractor, PdfBackend, PdfTextExtractor, Pipeline,
    PipelineOptions,
};
use textlens_ocr::TesseractEngine;

// Re-export domain types for convenience
pub use textlens_core::{AnalysisResult, PipelineEvent, PipelineRecord};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Media type declared for files whose extension is not recognized.
pub const UNKNOWN_MEDIA_TYPE: &str = "application/octet-stream";

/// Infer a media type from a file extension.
///
/// - `.pdf` → `application/pdf`
/// - common raster image extensions → `image/<subtype>`
/// - anything else → [`UNKNOWN_MEDIA_TYPE`]
pub fn media_type_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "webp" => "image/webp",
        "pbm" => "image/x-portable-bitmap",
        "pgm" => "image/x-portable-graymap",
        "ppm" => "image/x-portable-pixmap",
        _ => UNKNOWN_MEDIA_TYPE,
    }
}

/// Read a file into an [`InputFile`].
///
/// `media_type` overrides detection from the extension.
pub fn load_input(path: &Path, media_type: Option<&str>) -> Result<InputFile, IngestError> {
    let bytes = std::fs::read(path).map_err(|source| IngestError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let media_type = media_type.unwrap_or_else(|| media_type_for_path(path));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    tracing::debug!(file = %name, media_type, bytes = bytes.len(), "loaded input");
    Ok(InputFile::new(name, media_type, bytes))
}

/// Backend settings resolved from config, environment and flags.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub ocr_language: String,
    pub tesseract_cmd: Option<String>,
    pub header_exclusion: Option<f32>,
    pub footer_exclusion: Option<f32>,
    pub extraction_timeout: Option<Duration>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            ocr_language: DEFAULT_OCR_LANGUAGE.to_string(),
            tesseract_cmd: None,
            header_exclusion: None,
            footer_exclusion: None,
            extraction_timeout: None,
        }
    }
}

impl BackendSettings {
    pub fn from_config(config: &ConfigFile) -> Self {
        let pdf = config.pdf.clone().unwrap_or_default();
        Self {
            ocr_language: config
                .ocr_language()
                .unwrap_or(DEFAULT_OCR_LANGUAGE)
                .to_string(),
            tesseract_cmd: config.tesseract_cmd().map(String::from),
            header_exclusion: pdf.header_exclusion,
            footer_exclusion: pdf.footer_exclusion,
            extraction_timeout: config.extraction_timeout_secs().map(Duration::from_secs),
        }
    }
}

/// Build a pipeline wired to the MuPDF and Tesseract backends.
pub fn build_pipeline(settings: &BackendSettings, history: Arc<dyn HistoryStore>) -> Pipeline {
    let mut engine = TesseractEngine::new();
    if let Some(ref cmd) = settings.tesseract_cmd {
        engine = engine.with_command(cmd.clone());
    }

    let pdf = PdfTextExtractor::new(pdf_backend(settings));
    let ocr = OcrExtractor::new(Arc::new(engine)).with_language(settings.ocr_language.clone());

    Pipeline::new(Arc::new(pdf), Arc::new(ocr), history).with_options(PipelineOptions {
        extraction_timeout: settings.extraction_timeout,
    })
}

#[cfg(feature = "pdf")]
fn pdf_backend(settings: &BackendSettings) -> Arc<dyn PdfBackend> {
    let mut backend = textlens_pdf_mupdf::MupdfBackend::new();
    if let Some(ratio) = settings.header_exclusion {
        backend = backend.with_header_exclusion(ratio);
    }
    if let Some(ratio) = settings.footer_exclusion {
        backend = backend.with_footer_exclusion(ratio);
    }
    Arc::new(backend)
}

#[cfg(not(feature = "pdf"))]
fn pdf_backend(_settings: &BackendSettings) -> Arc<dyn PdfBackend> {
    Arc::new(NoPdfSupport)
}

/// Stand-in backend when the `pdf` feature is disabled.
#[cfg(not(feature = "pdf"))]
struct NoPdfSupport;

#[cfg(not(feature = "pdf"))]
impl PdfBackend for NoPdfSupport {
    fn open(
        &self,
        _bytes: &[u8],
    ) -> Result<Box<dyn textlens_core::PdfDocument>, textlens_core::BackendError> {
        Err(textlens_core::BackendError::OpenError(
            "PDF support not compiled in (enable the `pdf` feature of textlens-ingest)".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use textlens_core::config_file::{OcrConfig, PdfConfig, PipelineConfig};
    use textlens_core::{ExtractorKind, MemoryHistoryStore, PipelineState, select};

    #[test]
    fn media_types_from_extension() {
        assert_eq!(media_type_for_path(Path::new("a/b/report.PDF")), "application/pdf");
        assert_eq!(media_type_for_path(Path::new("scan.jpeg")), "image/jpeg");
        assert_eq!(media_type_for_path(Path::new("scan.tif")), "image/tiff");
        assert_eq!(media_type_for_path(Path::new("notes.txt")), UNKNOWN_MEDIA_TYPE);
        assert_eq!(media_type_for_path(Path::new("no_extension")), UNKNOWN_MEDIA_TYPE);
    }

    #[test]
    fn detected_types_route_to_extractors() {
        assert_eq!(
            select(media_type_for_path(Path::new("x.pdf"))),
            Some(ExtractorKind::Pdf)
        );
        assert_eq!(
            select(media_type_for_path(Path::new("x.webp"))),
            Some(ExtractorKind::Ocr)
        );
        assert_eq!(select(media_type_for_path(Path::new("x.docx"))), None);
    }

    #[test]
    fn load_input_reads_bytes_and_detects_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let input = load_input(&path, None).unwrap();
        assert_eq!(input.name, "photo.png");
        assert_eq!(input.media_type, "image/png");
        assert_eq!(&*input.bytes, &[1u8, 2, 3]);

        let overridden = load_input(&path, Some("application/pdf")).unwrap();
        assert_eq!(overridden.media_type, "application/pdf");
    }

    #[test]
    fn load_input_missing_file() {
        let err = load_input(Path::new("/definitely/not/here.pdf"), None).unwrap_err();
        assert!(err.to_string().contains("here.pdf"));
    }

    #[test]
    fn settings_from_config() {
        let config = ConfigFile {
            ocr: Some(OcrConfig {
                language: Some("spa".into()),
                tesseract_cmd: Some("/opt/tess/bin/tesseract".into()),
            }),
            pdf: Some(PdfConfig {
                header_exclusion: Some(0.04),
                footer_exclusion: None,
            }),
            pipeline: Some(PipelineConfig {
                extraction_timeout_secs: Some(90),
            }),
            ..Default::default()
        };
        let settings = BackendSettings::from_config(&config);
        assert_eq!(settings.ocr_language, "spa");
        assert_eq!(settings.tesseract_cmd.as_deref(), Some("/opt/tess/bin/tesseract"));
        assert_eq!(settings.header_exclusion, Some(0.04));
        assert_eq!(settings.extraction_timeout, Some(Duration::from_secs(90)));

        let defaults = BackendSettings::from_config(&ConfigFile::default());
        assert_eq!(defaults.ocr_language, "eng");
        assert!(defaults.extraction_timeout.is_none());
    }

    #[test]
    fn built_pipeline_starts_idle() {
        let pipeline = build_pipeline(
            &BackendSettings::default(),
            Arc::new(MemoryHistoryStore::new()),
        );
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }
}
