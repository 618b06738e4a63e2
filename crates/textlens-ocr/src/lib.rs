//! Tesseract implementation of [`OcrEngine`].
//!
//! Runs the `tesseract` executable on a temporary copy of the image and reads
//! the recognized text from its stdout. The binary does not stream progress,
//! so the engine reports coarse steps: loading, initializing, and the start
//! and end of recognition.

use std::future::Future;
use std::io::Write;
use std::pin::Pin;

use tokio::process::Command;

use textlens_core::backend::RECOGNIZING_TEXT;
use textlens_core::{BackendError, OcrEngine, OcrStatus};

/// Executable looked up on `PATH` when no command is configured.
pub const DEFAULT_TESSERACT_CMD: &str = "tesseract";

const LOADING: &str = "loading tesseract core";
const INITIALIZING: &str = "initializing api";

#[derive(Debug, Clone)]
pub struct TesseractEngine {
    command: String,
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self {
            command: DEFAULT_TESSERACT_CMD.to_string(),
        }
    }
}

impl TesseractEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific tesseract executable.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    async fn run(
        &self,
        image: &[u8],
        language: &str,
        on_status: &(dyn Fn(OcrStatus) + Send + Sync),
    ) -> Result<String, BackendError> {
        on_status(OcrStatus::new(LOADING, 0.0));

        let mut input = tempfile::Builder::new()
            .prefix("textlens-ocr-")
            .tempfile()?;
        input.write_all(image)?;
        input.flush()?;

        on_status(OcrStatus::new(LOADING, 1.0));
        on_status(OcrStatus::new(INITIALIZING, 1.0));
        on_status(OcrStatus::new(RECOGNIZING_TEXT, 0.0));

        tracing::debug!(
            command = %self.command,
            language,
            bytes = image.len(),
            "running tesseract"
        );
        let output = Command::new(&self.command)
            .arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(language)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    BackendError::EngineError(format!(
                        "`{}` not found; install tesseract or set TESSERACT_CMD",
                        self.command
                    ))
                } else {
                    BackendError::Io(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim();
            return Err(BackendError::EngineError(if detail.is_empty() {
                format!("tesseract exited with {}", output.status)
            } else {
                detail.to_string()
            }));
        }

        on_status(OcrStatus::new(RECOGNIZING_TEXT, 1.0));
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize<'a>(
        &'a self,
        image: &'a [u8],
        language: &'a str,
        on_status: &'a (dyn Fn(OcrStatus) + Send + Sync),
    ) -> Pin<Box<dyn Future<Output = Result<String, BackendError>> + Send + 'a>> {
        Box::pin(self.run(image, language, on_status))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    fn write_script(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    // Scripts are exercised from a single test so no concurrent fork can
    // inherit a script's write handle.
    #[tokio::test]
    async fn drives_tesseract_binary() {
        let dir = tempfile::tempdir().unwrap();

        // Echo the language argument back so it can be checked.
        let ok = write_script(dir.path(), "ok.sh", "printf 'lang=%s\\nline two\\n' \"$4\"");
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let on_status = move |s: OcrStatus| sink.lock().unwrap().push(s);

        let engine = TesseractEngine::new().with_command(ok);
        let text = engine.recognize(b"fake png", "eng", &on_status).await.unwrap();
        assert_eq!(text, "lang=eng\nline two\n");

        let recognizing: Vec<f32> = events
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.is_recognizing())
            .map(|s| s.progress)
            .collect();
        assert_eq!(recognizing, vec![0.0, 1.0]);
        assert_eq!(events.lock().unwrap()[0].status, LOADING);

        let failing = write_script(
            dir.path(),
            "fail.sh",
            "echo 'Error in pixReadMem: Unknown format' >&2\nexit 1",
        );
        let engine = TesseractEngine::new().with_command(failing);
        let err = engine
            .recognize(b"fake png", "eng", &|_| {})
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown format"), "{err}");

        let missing = dir.path().join("no-such-tesseract");
        let engine = TesseractEngine::new().with_command(missing.to_string_lossy());
        let err = engine
            .recognize(b"fake png", "eng", &|_| {})
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"), "{err}");
    }

    #[test]
    fn default_command() {
        assert_eq!(TesseractEngine::new().command(), "tesseract");
    }
}
