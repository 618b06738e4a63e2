//! The extraction → analysis state machine.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::backend::{OcrEngine, PdfBackend};
use crate::extract::{
    ExtractError, Extractor, ExtractorKind, OcrExtractor, PdfTextExtractor, select,
};
use crate::history::HistoryStore;
use crate::{AnalysisResult, InputFile, Phase, PipelineEvent, PipelineRecord, analyze};

/// Message shown when a file's media type has no extractor.
pub const INVALID_FILE_TYPE: &str = "Invalid file type. Please upload a PDF or an image file.";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),
    #[error("Error processing file: {0}")]
    ExtractionFailed(#[source] ExtractError),
    #[error("pipeline is {0}; wait for the run to finish and reset before submitting")]
    Busy(PipelineState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Extracting,
    Analyzing,
    Complete,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Complete | PipelineState::Failed)
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PipelineState::Idle => "idle",
            PipelineState::Extracting => "extracting",
            PipelineState::Analyzing => "analyzing",
            PipelineState::Complete => "complete",
            PipelineState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Give up on extraction after this long. `None` waits indefinitely.
    pub extraction_timeout: Option<Duration>,
}

/// Receives presentation events for every state transition.
pub type Observer = Arc<dyn Fn(&PipelineEvent) + Send + Sync>;

/// Runs one document at a time through extraction and analysis and records
/// each successful result in the injected [`HistoryStore`].
///
/// A `Pipeline` starts `Idle`. [`submit`](Pipeline::submit) drives it to
/// `Complete` or `Failed`, and [`reset`](Pipeline::reset) returns it to
/// `Idle`. Use the cancellation token to stop a run early; dropping the
/// `submit` future mid-run leaves the pipeline busy.
pub struct Pipeline {
    pdf: Arc<dyn Extractor>,
    ocr: Arc<dyn Extractor>,
    history: Arc<dyn HistoryStore>,
    observer: Option<Observer>,
    options: PipelineOptions,
    state: PipelineState,
    progress: Arc<AtomicU8>,
    text: Option<String>,
    analysis: Option<AnalysisResult>,
    error: Option<String>,
    record: Option<PipelineRecord>,
}

impl Pipeline {
    pub fn new(
        pdf: Arc<dyn Extractor>,
        ocr: Arc<dyn Extractor>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            pdf,
            ocr,
            history,
            observer: None,
            options: PipelineOptions::default(),
            state: PipelineState::Idle,
            progress: Arc::new(AtomicU8::new(0)),
            text: None,
            analysis: None,
            error: None,
            record: None,
        }
    }

    /// Build a pipeline from raw capability backends with the default OCR
    /// language.
    pub fn from_backends(
        pdf: Arc<dyn PdfBackend>,
        ocr: Arc<dyn OcrEngine>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self::new(
            Arc::new(PdfTextExtractor::new(pdf)),
            Arc::new(OcrExtractor::new(ocr)),
            history,
        )
    }

    pub fn with_observer(
        mut self,
        observer: impl Fn(&PipelineEvent) + Send + Sync + 'static,
    ) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Progress of the current (or last) phase, 0–100.
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::SeqCst)
    }

    pub fn extracted_text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        self.analysis.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The record produced by the last successful run.
    pub fn record(&self) -> Option<&PipelineRecord> {
        self.record.as_ref()
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    /// Run `file` through extraction and analysis.
    ///
    /// Only accepted while `Idle`; any other state returns
    /// [`PipelineError::Busy`] and leaves the pipeline untouched. Every other
    /// error also moves the pipeline to `Failed`, as does dropping the
    /// returned future before it finishes.
    pub async fn submit(
        &mut self,
        file: InputFile,
        cancel: &CancellationToken,
    ) -> Result<PipelineRecord, PipelineError> {
        if self.state != PipelineState::Idle {
            tracing::warn!(state = %self.state, file = %file.name, "rejected submit: pipeline busy");
            return Err(PipelineError::Busy(self.state));
        }

        let mut run = InFlight { pipeline: self };
        run.pipeline.execute(file, cancel).await
    }

    async fn execute(
        &mut self,
        file: InputFile,
        cancel: &CancellationToken,
    ) -> Result<PipelineRecord, PipelineError> {
        let Some(kind) = select(&file.media_type) else {
            tracing::info!(file = %file.name, media_type = %file.media_type, "unsupported media type");
            return Err(self.fail(PipelineError::Validation(INVALID_FILE_TYPE.to_string())));
        };

        tracing::info!(
            file = %file.name,
            media_type = %file.media_type,
            extractor = %kind,
            bytes = file.bytes.len(),
            "starting extraction"
        );
        self.enter(PipelineState::Extracting, Phase::Extracting);

        let text = match self.run_extractor(kind, &file, cancel).await {
            Ok(text) => text,
            Err(e) => return Err(self.fail(PipelineError::ExtractionFailed(e))),
        };
        tracing::debug!(file = %file.name, chars = text.len(), "extraction complete");

        self.enter(PipelineState::Analyzing, Phase::Analyzing);
        let analysis = analyze(&text);
        self.progress.store(100, Ordering::SeqCst);
        self.emit(&PipelineEvent::Progress {
            phase: Phase::Analyzing,
            percent: 100,
        });

        let record = PipelineRecord::new(text.clone(), Some(analysis.clone()));
        self.state = PipelineState::Complete;
        self.text = Some(text.clone());
        self.analysis = Some(analysis.clone());
        self.record = Some(record.clone());

        if let Err(e) = self.history.append(record.clone()) {
            tracing::warn!(file = %file.name, error = %e, "failed to store history record");
            self.emit(&PipelineEvent::HistoryWriteFailed {
                message: e.to_string(),
            });
        }

        tracing::info!(
            file = %file.name,
            words = analysis.word_count,
            sentences = analysis.sentence_count,
            keywords = analysis.keywords.len(),
            "pipeline complete"
        );
        self.emit(&PipelineEvent::Completed {
            text,
            analysis: Box::new(analysis),
        });

        Ok(record)
    }

    /// Return to `Idle`, clearing text, analysis, error and progress.
    ///
    /// Rejected while a run is in flight; a no-op when already idle.
    pub fn reset(&mut self) -> Result<(), PipelineError> {
        if self.state != PipelineState::Idle && !self.state.is_terminal() {
            return Err(PipelineError::Busy(self.state));
        }
        self.state = PipelineState::Idle;
        self.progress.store(0, Ordering::SeqCst);
        self.text = None;
        self.analysis = None;
        self.error = None;
        self.record = None;
        Ok(())
    }

    async fn run_extractor(
        &self,
        kind: ExtractorKind,
        file: &InputFile,
        cancel: &CancellationToken,
    ) -> Result<String, ExtractError> {
        let extractor = match kind {
            ExtractorKind::Pdf => Arc::clone(&self.pdf),
            ExtractorKind::Ocr => Arc::clone(&self.ocr),
        };

        let progress = Arc::clone(&self.progress);
        let observer = self.observer.clone();
        let on_progress = move |percent: u8| {
            let percent = percent.min(100);
            // Only forward values that move the bar forward.
            let previous = progress.fetch_max(percent, Ordering::SeqCst);
            if percent > previous {
                if let Some(ref observer) = observer {
                    observer(&PipelineEvent::Progress {
                        phase: Phase::Extracting,
                        percent,
                    });
                }
            }
        };

        let run_cancel = cancel.child_token();
        let extraction = extractor.extract(file, &on_progress, &run_cancel);
        match self.options.extraction_timeout {
            Some(limit) => match tokio::time::timeout(limit, extraction).await {
                Ok(result) => result,
                Err(_) => {
                    run_cancel.cancel();
                    tracing::warn!(file = %file.name, ?limit, "extraction timed out");
                    Err(ExtractError::TimedOut(limit))
                }
            },
            None => extraction.await,
        }
    }

    fn enter(&mut self, state: PipelineState, phase: Phase) {
        self.state = state;
        self.progress.store(0, Ordering::SeqCst);
        self.emit(&PipelineEvent::Progress { phase, percent: 0 });
    }

    fn fail(&mut self, error: PipelineError) -> PipelineError {
        let message = error.to_string();
        tracing::warn!(error = %message, "pipeline failed");
        self.state = PipelineState::Failed;
        self.text = None;
        self.analysis = None;
        self.record = None;
        self.error = Some(message.clone());
        self.emit(&PipelineEvent::Failed { message });
        error
    }

    fn emit(&self, event: &PipelineEvent) {
        if let Some(ref observer) = self.observer {
            observer(event);
        }
    }
}

/// Marks the pipeline `Failed` when a run is dropped mid-flight.
struct InFlight<'p> {
    pipeline: &'p mut Pipeline,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if matches!(
            self.pipeline.state,
            PipelineState::Extracting | PipelineState::Analyzing
        ) {
            tracing::warn!(state = %self.pipeline.state, "run dropped before finishing");
            self.pipeline.fail(PipelineError::ExtractionFailed(ExtractError::Cancelled));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistoryStore;
    use crate::mock::{MockOcrEngine, MockPdfBackend};

    fn pipeline(pdf: MockPdfBackend) -> (Pipeline, Arc<MemoryHistoryStore>) {
        let history = Arc::new(MemoryHistoryStore::new());
        let pipeline = Pipeline::from_backends(
            Arc::new(pdf),
            Arc::new(MockOcrEngine::new("", vec![])),
            history.clone(),
        );
        (pipeline, history)
    }

    fn pdf_file() -> InputFile {
        InputFile::new("doc.pdf", "application/pdf", vec![0u8; 4])
    }

    #[tokio::test]
    async fn starts_idle() {
        let (pipeline, _) = pipeline(MockPdfBackend::with_pages(&["x"]));
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert_eq!(pipeline.progress(), 0);
        assert!(pipeline.extracted_text().is_none());
        assert!(pipeline.analysis().is_none());
        assert!(pipeline.error_message().is_none());
    }

    #[tokio::test]
    async fn submit_while_complete_is_rejected() {
        let (mut pipeline, history) = pipeline(MockPdfBackend::with_pages(&["one page."]));
        let cancel = CancellationToken::new();
        pipeline.submit(pdf_file(), &cancel).await.unwrap();

        let err = pipeline.submit(pdf_file(), &cancel).await.unwrap_err();
        assert!(matches!(err, PipelineError::Busy(PipelineState::Complete)));
        assert_eq!(pipeline.state(), PipelineState::Complete);
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn reset_from_idle_is_noop() {
        let (mut pipeline, _) = pipeline(MockPdfBackend::with_pages(&["x"]));
        pipeline.reset().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fails_run() {
        let history = Arc::new(MemoryHistoryStore::new());
        let slow = MockOcrEngine::new("late", vec![]).with_delay(Duration::from_secs(30));
        let mut pipeline = Pipeline::from_backends(
            Arc::new(MockPdfBackend::default()),
            Arc::new(slow),
            history.clone(),
        )
        .with_options(PipelineOptions {
            extraction_timeout: Some(Duration::from_millis(20)),
        });

        let file = InputFile::new("scan.png", "image/png", vec![1u8]);
        let err = pipeline
            .submit(file, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ExtractionFailed(ExtractError::TimedOut(_))
        ));
        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert!(pipeline.error_message().unwrap().contains("timed out"));
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn reset_rejected_while_extracting() {
        let (mut pipeline, _) = pipeline(MockPdfBackend::with_pages(&["x"]));
        pipeline.state = PipelineState::Extracting;
        assert!(matches!(
            pipeline.reset(),
            Err(PipelineError::Busy(PipelineState::Extracting))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_submit_leaves_pipeline_recoverable() {
        let slow = MockOcrEngine::new("late", vec![]).with_delay(Duration::from_secs(30));
        let mut pipeline = Pipeline::from_backends(
            Arc::new(MockPdfBackend::default()),
            Arc::new(slow),
            Arc::new(MemoryHistoryStore::new()),
        );
        let file = InputFile::new("scan.png", "image/png", vec![1u8]);
        let cancel = CancellationToken::new();

        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), pipeline.submit(file, &cancel)).await;
        assert!(abandoned.is_err());

        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert!(pipeline.error_message().unwrap().contains("cancelled"));
        pipeline.reset().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }
}
