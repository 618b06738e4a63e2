//! Extraction strategies: media-type dispatch plus the PDF and OCR
//! extractors that drive the capability backends.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendError, OcrEngine, OcrStatus, PdfBackend};
use crate::{InputFile, PDF_MEDIA_TYPE};

/// Language model used for OCR unless configured otherwise.
pub const DEFAULT_OCR_LANGUAGE: &str = "eng";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("{0}")]
    Pdf(BackendError),
    #[error("{0}")]
    Ocr(BackendError),
    #[error("extraction was cancelled")]
    Cancelled,
    #[error("extraction timed out after {0:?}")]
    TimedOut(Duration),
    #[error("extraction worker failed: {0}")]
    Worker(String),
}

/// Which extractor handles a media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorKind {
    Pdf,
    Ocr,
}

impl std::fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractorKind::Pdf => f.write_str("pdf"),
            ExtractorKind::Ocr => f.write_str("ocr"),
        }
    }
}

/// Pick the extractor for a declared media type.
///
/// - `application/pdf` → [`ExtractorKind::Pdf`]
/// - `image/*` → [`ExtractorKind::Ocr`]
/// - anything else → `None`
pub fn select(media_type: &str) -> Option<ExtractorKind> {
    if media_type == PDF_MEDIA_TYPE {
        Some(ExtractorKind::Pdf)
    } else if media_type.starts_with("image/") {
        Some(ExtractorKind::Ocr)
    } else {
        None
    }
}

/// A strategy that turns a file into plain text, reporting progress
/// (0–100) as it goes.
pub trait Extractor: Send + Sync {
    fn kind(&self) -> ExtractorKind;

    fn extract<'a>(
        &'a self,
        file: &'a InputFile,
        on_progress: &'a (dyn Fn(u8) + Send + Sync),
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<String, ExtractError>> + Send + 'a>>;
}

/// Percentage reported after `page` of `total` pages is done.
pub fn page_percent(page: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((page as f64 / total as f64) * 100.0).round().min(100.0) as u8
}

/// Percentage for an engine-reported recognition fraction.
pub fn ocr_percent(progress: f32) -> u8 {
    (progress.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// Extracts text page by page through a [`PdfBackend`].
pub struct PdfTextExtractor {
    backend: Arc<dyn PdfBackend>,
}

impl PdfTextExtractor {
    pub fn new(backend: Arc<dyn PdfBackend>) -> Self {
        Self { backend }
    }
}

impl Extractor for PdfTextExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Pdf
    }

    fn extract<'a>(
        &'a self,
        file: &'a InputFile,
        on_progress: &'a (dyn Fn(u8) + Send + Sync),
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<String, ExtractError>> + Send + 'a>> {
        Box::pin(async move {
            let backend = Arc::clone(&self.backend);
            let bytes = Arc::clone(&file.bytes);
            let worker_cancel = cancel.child_token();
            // Dropping this future stops the worker at its next page.
            let _stop_worker = worker_cancel.clone().drop_guard();
            let (tx, mut rx) = mpsc::unbounded_channel();

            // Engines may hold thread-affine handles, so the whole document
            // lifetime stays on one blocking thread.
            let worker = tokio::task::spawn_blocking(move || {
                read_pages(&*backend, &bytes, &tx, &worker_cancel)
            });

            // Ends once the worker drops its sender.
            while let Some(percent) = rx.recv().await {
                on_progress(percent);
            }

            worker
                .await
                .map_err(|e| ExtractError::Worker(e.to_string()))?
        })
    }
}

fn read_pages(
    backend: &dyn PdfBackend,
    bytes: &[u8],
    progress: &mpsc::UnboundedSender<u8>,
    cancel: &CancellationToken,
) -> Result<String, ExtractError> {
    let document = backend.open(bytes).map_err(ExtractError::Pdf)?;
    let total = document.page_count();
    tracing::debug!(pages = total, "opened PDF");

    let mut text = String::new();
    for page_number in 1..=total {
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }
        let items = document.page_text(page_number).map_err(ExtractError::Pdf)?;
        text.push_str(&items.join(" "));
        text.push('\n');
        // The receiver is only gone if the caller stopped listening.
        let _ = progress.send(page_percent(page_number, total));
    }

    Ok(text)
}

/// Recognizes text in raster images through an [`OcrEngine`].
pub struct OcrExtractor {
    engine: Arc<dyn OcrEngine>,
    language: String,
}

impl OcrExtractor {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self {
            engine,
            language: DEFAULT_OCR_LANGUAGE.to_string(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn language(&self) -> &str {
        &self.language
    }
}

impl Extractor for OcrExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Ocr
    }

    fn extract<'a>(
        &'a self,
        file: &'a InputFile,
        on_progress: &'a (dyn Fn(u8) + Send + Sync),
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<String, ExtractError>> + Send + 'a>> {
        Box::pin(async move {
            let engine_name = self.engine.name();
            let on_status = move |status: OcrStatus| {
                if status.is_recognizing() {
                    on_progress(ocr_percent(status.progress));
                } else {
                    tracing::debug!(
                        engine = engine_name,
                        status = %status.status,
                        progress = status.progress,
                        "ocr status"
                    );
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => Err(ExtractError::Cancelled),
                result = self.engine.recognize(&file.bytes, &self.language, &on_status) => {
                    result.map_err(ExtractError::Ocr)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_pdf() {
        assert_eq!(select("application/pdf"), Some(ExtractorKind::Pdf));
    }

    #[test]
    fn select_images() {
        assert_eq!(select("image/png"), Some(ExtractorKind::Ocr));
        assert_eq!(select("image/jpeg"), Some(ExtractorKind::Ocr));
        assert_eq!(select("image/"), Some(ExtractorKind::Ocr));
    }

    #[test]
    fn select_unsupported() {
        assert_eq!(select("text/plain"), None);
        assert_eq!(select("application/pdfx"), None);
        assert_eq!(select("Application/PDF"), None);
        assert_eq!(select(""), None);
    }

    #[test]
    fn page_percent_rounds() {
        assert_eq!(page_percent(1, 1), 100);
        assert_eq!(page_percent(1, 3), 33);
        assert_eq!(page_percent(2, 3), 67);
        assert_eq!(page_percent(3, 3), 100);
        assert_eq!(page_percent(1, 8), 13);
        assert_eq!(page_percent(0, 0), 0);
    }

    #[test]
    fn ocr_percent_clamps() {
        assert_eq!(ocr_percent(0.0), 0);
        assert_eq!(ocr_percent(0.42), 42);
        assert_eq!(ocr_percent(1.0), 100);
        assert_eq!(ocr_percent(1.7), 100);
        assert_eq!(ocr_percent(-0.2), 0);
    }
}
