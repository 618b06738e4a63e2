use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open document: {0}")]
    OpenError(String),
    #[error("failed to extract text: {0}")]
    ExtractionError(String),
    #[error("OCR engine error: {0}")]
    EngineError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for PDF parsing backends.
///
/// Implementors only open documents and hand back per-page text items; page
/// ordering, concatenation and progress reporting live in
/// [`crate::extract::PdfTextExtractor`].
pub trait PdfBackend: Send + Sync {
    /// Parse a document from its raw bytes.
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn PdfDocument>, BackendError>;
}

/// An opened PDF document.
///
/// Not required to be `Send`: engines such as MuPDF keep thread-affine
/// handles, so documents are only used from the blocking thread that opened
/// them.
pub trait PdfDocument {
    /// Number of pages in the document.
    fn page_count(&self) -> usize;

    /// Ordered text items of a page. `page_number` is 1-based.
    fn page_text(&self, page_number: usize) -> Result<Vec<String>, BackendError>;
}

/// Status string an OCR engine reports while actively recognizing text.
/// Only events carrying this status count towards extraction progress.
pub const RECOGNIZING_TEXT: &str = "recognizing text";

/// A status/progress pair emitted by an OCR engine while it works.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrStatus {
    pub status: String,
    /// Fraction of the current status step, 0.0–1.0.
    pub progress: f32,
}

impl OcrStatus {
    pub fn new(status: impl Into<String>, progress: f32) -> Self {
        Self {
            status: status.into(),
            progress,
        }
    }

    pub fn is_recognizing(&self) -> bool {
        self.status == RECOGNIZING_TEXT
    }
}

/// An optical character recognition engine.
pub trait OcrEngine: Send + Sync {
    /// The canonical name of this engine (e.g. "tesseract").
    fn name(&self) -> &str;

    /// Recognize the text in an encoded raster image.
    ///
    /// `on_status` receives every status event the engine produces, in order.
    fn recognize<'a>(
        &'a self,
        image: &'a [u8],
        language: &'a str,
        on_status: &'a (dyn Fn(OcrStatus) + Send + Sync),
    ) -> Pin<Box<dyn Future<Output = Result<String, BackendError>> + Send + 'a>>;
}
