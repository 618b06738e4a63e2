use mupdf::{Document, TextPageFlags};

use textlens_core::{BackendError, PdfBackend, PdfDocument};

/// MuPDF-based implementation of [`PdfBackend`].
///
/// This crate is the sole AGPL island: it isolates the mupdf dependency
/// (which is AGPL-3.0) so that the pipeline and the OCR path do not
/// transitively depend on it.
///
/// Each text line MuPDF finds becomes one text item. Header and footer
/// bands can be excluded for documents with running heads or page numbers;
/// both are off by default.
#[derive(Debug, Clone, Default)]
pub struct MupdfBackend {
    /// Fraction of page height from bottom to exclude as footer (0.0–1.0).
    footer_exclusion_ratio: Option<f32>,
    /// Fraction of page height from top to exclude as header (0.0–1.0).
    header_exclusion_ratio: Option<f32>,
}

impl MupdfBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the footer exclusion ratio. Pass `0.0` to disable.
    pub fn with_footer_exclusion(mut self, ratio: f32) -> Self {
        self.footer_exclusion_ratio = if ratio > 0.0 { Some(ratio.min(1.0)) } else { None };
        self
    }

    /// Set the header exclusion ratio. Pass `0.0` to disable.
    pub fn with_header_exclusion(mut self, ratio: f32) -> Self {
        self.header_exclusion_ratio = if ratio > 0.0 { Some(ratio.min(1.0)) } else { None };
        self
    }
}

impl PdfBackend for MupdfBackend {
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn PdfDocument>, BackendError> {
        let document = Document::from_bytes(bytes, "application/pdf")
            .map_err(|e| BackendError::OpenError(e.to_string()))?;
        let page_count = document
            .page_count()
            .map_err(|e| BackendError::OpenError(e.to_string()))?;

        Ok(Box::new(MupdfDocument {
            document,
            page_count: usize::try_from(page_count).unwrap_or(0),
            footer_exclusion_ratio: self.footer_exclusion_ratio,
            header_exclusion_ratio: self.header_exclusion_ratio,
        }))
    }
}

struct MupdfDocument {
    document: Document,
    page_count: usize,
    footer_exclusion_ratio: Option<f32>,
    header_exclusion_ratio: Option<f32>,
}

impl PdfDocument for MupdfDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_text(&self, page_number: usize) -> Result<Vec<String>, BackendError> {
        if page_number == 0 || page_number > self.page_count {
            return Err(BackendError::ExtractionError(format!(
                "page {} out of range (document has {})",
                page_number, self.page_count
            )));
        }
        // MuPDF pages are 0-based.
        let index = i32::try_from(page_number - 1)
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?;

        let page = self
            .document
            .load_page(index)
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?;
        let text_page = page
            .to_text_page(TextPageFlags::empty())
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?;

        // Get page bounds for header/footer exclusion
        let page_bounds = page
            .bounds()
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?;
        let page_height = page_bounds.y1 - page_bounds.y0;

        let header_threshold = self
            .header_exclusion_ratio
            .map(|r| page_bounds.y0 + page_height * r);
        let footer_threshold = self
            .footer_exclusion_ratio
            .map(|r| page_bounds.y1 - page_height * r);

        let mut items = Vec::new();
        for block in text_page.blocks() {
            let block_bounds = block.bounds();

            // Skip blocks entirely within the header region
            if let Some(threshold) = header_threshold {
                if block_bounds.y1 <= threshold {
                    continue;
                }
            }

            // Skip blocks whose top edge is in the footer region
            if let Some(threshold) = footer_threshold {
                if block_bounds.y0 >= threshold {
                    continue;
                }
            }

            for line in block.lines() {
                let line_text: String = line
                    .chars()
                    .map(|c| c.char().unwrap_or('\u{FFFD}'))
                    .collect();
                if !line_text.trim().is_empty() {
                    items.push(line_text);
                }
            }
        }

        tracing::trace!(page = page_number, items = items.len(), "read PDF page");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_yield_no_text() {
        // MuPDF may refuse the bytes outright or "repair" them into an empty
        // document; either way nothing is extracted.
        let backend = MupdfBackend::new();
        match backend.open(b"definitely not a pdf") {
            Err(e) => assert!(matches!(e, BackendError::OpenError(_))),
            Ok(doc) => assert_eq!(doc.page_count(), 0),
        }
    }

    #[test]
    fn exclusion_ratios_clamp_and_disable() {
        let backend = MupdfBackend::new()
            .with_header_exclusion(0.04)
            .with_footer_exclusion(2.0);
        assert_eq!(backend.header_exclusion_ratio, Some(0.04));
        assert_eq!(backend.footer_exclusion_ratio, Some(1.0));

        let disabled = backend.with_header_exclusion(0.0);
        assert_eq!(disabled.header_exclusion_ratio, None);
    }
}
