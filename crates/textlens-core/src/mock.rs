//! Mock capability backends for testing.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::backend::{BackendError, OcrEngine, OcrStatus, PdfBackend, PdfDocument};

/// A hand-rolled [`PdfBackend`] serving fixed pages of text items.
#[derive(Debug, Clone, Default)]
pub struct MockPdfBackend {
    pages: Vec<Vec<String>>,
    open_error: Option<String>,
    /// 1-based page number whose fetch fails.
    failing_page: Option<usize>,
    page_delay: Option<Duration>,
    pages_read: Arc<AtomicUsize>,
}

impl MockPdfBackend {
    /// A document whose pages hold the given text items.
    pub fn new(pages: Vec<Vec<&str>>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|items| items.into_iter().map(String::from).collect())
                .collect(),
            ..Self::default()
        }
    }

    /// A document with one text item per page.
    pub fn with_pages(pages: &[&str]) -> Self {
        Self::new(pages.iter().map(|p| vec![*p]).collect())
    }

    /// A document that cannot be opened.
    pub fn unreadable(message: &str) -> Self {
        Self {
            open_error: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Make fetching `page_number` (1-based) fail.
    pub fn failing_at(mut self, page_number: usize) -> Self {
        self.failing_page = Some(page_number);
        self
    }

    /// Block the reading thread this long for every page.
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = Some(delay);
        self
    }

    /// Pages fetched so far, across every document opened from this backend.
    pub fn pages_read(&self) -> usize {
        self.pages_read.load(Ordering::SeqCst)
    }
}

impl PdfBackend for MockPdfBackend {
    fn open(&self, _bytes: &[u8]) -> Result<Box<dyn PdfDocument>, BackendError> {
        if let Some(ref msg) = self.open_error {
            return Err(BackendError::OpenError(msg.clone()));
        }
        Ok(Box::new(MockPdfDocument {
            pages: self.pages.clone(),
            failing_page: self.failing_page,
            page_delay: self.page_delay,
            pages_read: Arc::clone(&self.pages_read),
        }))
    }
}

struct MockPdfDocument {
    pages: Vec<Vec<String>>,
    failing_page: Option<usize>,
    page_delay: Option<Duration>,
    pages_read: Arc<AtomicUsize>,
}

impl PdfDocument for MockPdfDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&self, page_number: usize) -> Result<Vec<String>, BackendError> {
        if let Some(d) = self.page_delay {
            std::thread::sleep(d);
        }
        self.pages_read.fetch_add(1, Ordering::SeqCst);
        if self.failing_page == Some(page_number) {
            return Err(BackendError::ExtractionError(format!(
                "page {page_number} is damaged"
            )));
        }
        self.pages
            .get(page_number.wrapping_sub(1))
            .cloned()
            .ok_or_else(|| BackendError::ExtractionError(format!("no page {page_number}")))
    }
}

/// A hand-rolled [`OcrEngine`] that replays scripted status events.
#[derive(Debug)]
pub struct MockOcrEngine {
    events: Vec<OcrStatus>,
    outcome: Result<String, String>,
    delay: Option<Duration>,
    call_count: AtomicUsize,
    last_language: std::sync::Mutex<Option<String>>,
}

impl MockOcrEngine {
    /// An engine that emits `events` and then recognizes `text`.
    pub fn new(text: &str, events: Vec<OcrStatus>) -> Self {
        Self {
            events,
            outcome: Ok(text.to_string()),
            delay: None,
            call_count: AtomicUsize::new(0),
            last_language: std::sync::Mutex::new(None),
        }
    }

    /// An engine that emits `events` and then fails with `message`.
    pub fn failing(message: &str, events: Vec<OcrStatus>) -> Self {
        Self {
            outcome: Err(message.to_string()),
            ..Self::new("", events)
        }
    }

    /// Wait this long before finishing recognition.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// How many times `recognize()` has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Language passed to the most recent `recognize()` call.
    pub fn last_language(&self) -> Option<String> {
        self.last_language.lock().ok().and_then(|l| l.clone())
    }
}

impl OcrEngine for MockOcrEngine {
    fn name(&self) -> &str {
        "mock"
    }

    fn recognize<'a>(
        &'a self,
        _image: &'a [u8],
        language: &'a str,
        on_status: &'a (dyn Fn(OcrStatus) + Send + Sync),
    ) -> Pin<Box<dyn Future<Output = Result<String, BackendError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_language.lock() {
            *last = Some(language.to_string());
        }

        Box::pin(async move {
            for event in &self.events {
                on_status(event.clone());
                tokio::task::yield_now().await;
            }
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            self.outcome.clone().map_err(BackendError::EngineError)
        })
    }
}
