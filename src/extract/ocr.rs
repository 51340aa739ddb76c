//! OCR through the external `tesseract` binary.
//!
//! The engine is probed once per [`OcrEngine`] with `--list-langs`; the
//! result (installed languages, or the reason OCR is unavailable) is cached
//! for the life of the process. Language selection happens against that
//! probe rather than by retrying failed recognitions.

use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use docsage_core::{PipelineError, PipelineResult};

use crate::config::OcrConfig;

const INSTALL_HINT: &str =
    "install Tesseract (e.g. `apt install tesseract-ocr`, `brew install tesseract`) or set ocr.binary";

pub struct OcrEngine {
    binary: String,
    primary: String,
    secondary: Option<String>,
    probe: OnceLock<PipelineResult<Vec<String>>>,
}

impl OcrEngine {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            primary: config.primary_language.clone(),
            secondary: config.secondary_language.clone(),
            probe: OnceLock::new(),
        }
    }

    /// Installed language models, probing the binary on first use.
    pub fn installed_languages(&self) -> PipelineResult<&[String]> {
        match self.probe.get_or_init(|| probe_languages(&self.binary)) {
            Ok(langs) => Ok(langs.as_slice()),
            Err(e) => Err(e.clone()),
        }
    }

    /// The `-l` argument to pass to tesseract.
    pub fn language_arg(&self) -> PipelineResult<String> {
        let installed = self.installed_languages()?;
        select_languages(installed, &self.primary, self.secondary.as_deref())
    }

    /// Fail early when OCR cannot run.
    pub fn ensure_available(&self) -> PipelineResult<()> {
        self.language_arg().map(|_| ())
    }

    /// Recognize text in one encoded image (PNG, JPEG, TIFF, ...).
    pub fn recognize(&self, image: &[u8]) -> PipelineResult<String> {
        let langs = self.language_arg()?;
        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l", &langs])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(&self.binary, e))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| PipelineError::ExtractionFailed("tesseract stdin unavailable".to_string()))?;
        let data = image.to_vec();
        let writer = std::thread::spawn(move || stdin.write_all(&data));

        let output = child
            .wait_with_output()
            .map_err(|e| PipelineError::ExtractionFailed(format!("tesseract failed: {}", e)))?;
        match writer.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "tesseract closed stdin early"),
            Err(_) => {
                return Err(PipelineError::ExtractionFailed(
                    "tesseract stdin writer panicked".to_string(),
                ))
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::ExtractionFailed(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        tracing::debug!(langs = %langs, bytes = image.len(), chars = text.len(), "ocr page done");
        Ok(text)
    }
}

fn spawn_error(binary: &str, e: std::io::Error) -> PipelineError {
    if e.kind() == std::io::ErrorKind::NotFound {
        PipelineError::OcrUnavailable(format!("'{}' not found; {}", binary, INSTALL_HINT))
    } else {
        PipelineError::OcrUnavailable(format!("cannot run '{}': {}", binary, e))
    }
}

fn probe_languages(binary: &str) -> PipelineResult<Vec<String>> {
    let output = Command::new(binary)
        .arg("--list-langs")
        .output()
        .map_err(|e| spawn_error(binary, e))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::OcrUnavailable(format!(
            "'{} --list-langs' failed: {}",
            binary,
            stderr.trim()
        )));
    }
    // Older releases print the list on stderr.
    let mut listing = String::from_utf8_lossy(&output.stdout).into_owned();
    listing.push('\n');
    listing.push_str(&String::from_utf8_lossy(&output.stderr));
    let langs = parse_language_list(&listing);
    tracing::info!(binary, languages = ?langs, "ocr engine available");
    Ok(langs)
}

/// Parse `tesseract --list-langs` output.
pub fn parse_language_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("List of available languages"))
        .filter(|l| l.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        .map(str::to_string)
        .collect()
}

/// `primary+secondary` when both models are installed, `primary` alone
/// when only it is, `OcrUnavailable` when the primary model is missing.
pub fn select_languages(
    installed: &[String],
    primary: &str,
    secondary: Option<&str>,
) -> PipelineResult<String> {
    let has = |lang: &str| installed.iter().any(|l| l == lang);
    if !has(primary) {
        return Err(PipelineError::OcrUnavailable(format!(
            "language model '{}' is not installed (e.g. `apt install tesseract-ocr-{}`)",
            primary, primary
        )));
    }
    match secondary {
        Some(sec) if sec != primary && has(sec) => Ok(format!("{}+{}", primary, sec)),
        _ => Ok(primary.to_string()),
    }
}
