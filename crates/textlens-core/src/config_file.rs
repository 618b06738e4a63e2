use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub history: Option<HistoryConfig>,
    pub ocr: Option<OcrConfig>,
    pub pdf: Option<PdfConfig>,
    pub pipeline: Option<PipelineConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Tesseract language model, e.g. "eng".
    pub language: Option<String>,
    /// Path or name of the tesseract executable.
    pub tesseract_cmd: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PdfConfig {
    /// Fraction of page height from the top to drop as running header.
    pub header_exclusion: Option<f32>,
    /// Fraction of page height from the bottom to drop as footer.
    pub footer_exclusion: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub extraction_timeout_secs: Option<u64>,
}

/// Platform config directory path: `<config_dir>/textlens/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("textlens").join("config.toml"))
}

/// Load config by cascading CWD `.textlens.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".textlens.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        history: Some(HistoryConfig {
            path: overlay
                .history
                .as_ref()
                .and_then(|h| h.path.clone())
                .or_else(|| base.history.as_ref().and_then(|h| h.path.clone())),
        }),
        ocr: Some(OcrConfig {
            language: overlay
                .ocr
                .as_ref()
                .and_then(|o| o.language.clone())
                .or_else(|| base.ocr.as_ref().and_then(|o| o.language.clone())),
            tesseract_cmd: overlay
                .ocr
                .as_ref()
                .and_then(|o| o.tesseract_cmd.clone())
                .or_else(|| base.ocr.as_ref().and_then(|o| o.tesseract_cmd.clone())),
        }),
        pdf: Some(PdfConfig {
            header_exclusion: overlay
                .pdf
                .as_ref()
                .and_then(|p| p.header_exclusion)
                .or_else(|| base.pdf.as_ref().and_then(|p| p.header_exclusion)),
            footer_exclusion: overlay
                .pdf
                .as_ref()
                .and_then(|p| p.footer_exclusion)
                .or_else(|| base.pdf.as_ref().and_then(|p| p.footer_exclusion)),
        }),
        pipeline: Some(PipelineConfig {
            extraction_timeout_secs: overlay
                .pipeline
                .as_ref()
                .and_then(|p| p.extraction_timeout_secs)
                .or_else(|| {
                    base.pipeline
                        .as_ref()
                        .and_then(|p| p.extraction_timeout_secs)
                }),
        }),
    }
}

impl ConfigFile {
    pub fn history_path(&self) -> Option<PathBuf> {
        self.history
            .as_ref()
            .and_then(|h| h.path.as_deref())
            .map(PathBuf::from)
    }

    pub fn ocr_language(&self) -> Option<&str> {
        self.ocr.as_ref().and_then(|o| o.language.as_deref())
    }

    pub fn tesseract_cmd(&self) -> Option<&str> {
        self.ocr.as_ref().and_then(|o| o.tesseract_cmd.as_deref())
    }

    pub fn extraction_timeout_secs(&self) -> Option<u64> {
        self.pipeline
            .as_ref()
            .and_then(|p| p.extraction_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_parses() {
        let toml_str = "[ocr]\nlanguage = \"deu\"\n";
        let parsed: ConfigFile = toml::from_str(toml_str).unwrap();
        assert_eq!(parsed.ocr_language(), Some("deu"));
        assert!(parsed.history.is_none());
        assert!(parsed.extraction_timeout_secs().is_none());
    }

    #[test]
    fn history_path_round_trip_toml() {
        let config = ConfigFile {
            history: Some(HistoryConfig {
                path: Some("/tmp/textlens/history.json".to_string()),
            }),
            ..Default::default()
        };
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: ConfigFile = toml::from_str(&toml_str).unwrap();
        assert_eq!(
            parsed.history_path(),
            Some(PathBuf::from("/tmp/textlens/history.json"))
        );
    }

    #[test]
    fn merge_overlay_wins() {
        let base = ConfigFile {
            ocr: Some(OcrConfig {
                language: Some("eng".into()),
                tesseract_cmd: Some("/usr/bin/tesseract".into()),
            }),
            pipeline: Some(PipelineConfig {
                extraction_timeout_secs: Some(60),
            }),
            ..Default::default()
        };
        let overlay = ConfigFile {
            ocr: Some(OcrConfig {
                language: Some("fra".into()),
                tesseract_cmd: None,
            }),
            ..Default::default()
        };
        let merged = merge(base, overlay);
        assert_eq!(merged.ocr_language(), Some("fra"));
        assert_eq!(merged.tesseract_cmd(), Some("/usr/bin/tesseract"));
        assert_eq!(merged.extraction_timeout_secs(), Some(60));
    }

    #[test]
    fn merge_base_preserved_when_overlay_absent() {
        let base = ConfigFile {
            pdf: Some(PdfConfig {
                header_exclusion: Some(0.1),
                footer_exclusion: None,
            }),
            ..Default::default()
        };
        let merged = merge(base, ConfigFile::default());
        let pdf = merged.pdf.unwrap();
        assert_eq!(pdf.header_exclusion, Some(0.1));
        assert_eq!(pdf.footer_exclusion, None);
    }

    #[test]
    fn unparseable_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[ocr\nlanguage = ").unwrap();
        assert!(load_from_path(&path).is_none());
        assert!(load_from_path(&dir.path().join("missing.toml")).is_none());
    }
}
