//! HTML to PDF conversion.
//!
//! [`CommandPdfConverter`] writes the snapshot to a scratch directory, runs an
//! external converter on it, and reads the result back.

use std::fs;
use std::process::Command;

use tracing::debug;

use crate::config::PdfConfig;
use crate::error::{Result, SnapError};

/// Placeholder replaced with the HTML input path.
const INPUT_PLACEHOLDER: &str = "{input}";
/// Placeholder replaced with the PDF output path.
const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Converts a rendered HTML document into PDF bytes.
pub trait PdfConverter {
    fn convert(&self, html: &str) -> Result<Vec<u8>>;
}

/// Runs an external program such as `wkhtmltopdf`.
#[derive(Debug, Clone)]
pub struct CommandPdfConverter {
    program: String,
    args: Vec<String>,
}

impl CommandPdfConverter {
    /// Build from `[program, args...]`.
    pub fn new(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| SnapError::Pdf("No converter command configured".to_string()))?;
        if program.trim().is_empty() {
            return Err(SnapError::Pdf("Converter program is empty".to_string()));
        }
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    pub fn from_config(config: &PdfConfig) -> Result<Self> {
        Self::new(&config.command)
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl PdfConverter for CommandPdfConverter {
    fn convert(&self, html: &str) -> Result<Vec<u8>> {
        let scratch = tempfile::tempdir()
            .map_err(|e| SnapError::Pdf(format!("Cannot create scratch directory: {e}")))?;
        let input = scratch.path().join("snapshot.html");
        let output = scratch.path().join("snapshot.pdf");
        fs::write(&input, html).map_err(|e| SnapError::io(&input, e))?;

        let input_arg = input.to_string_lossy();
        let output_arg = output.to_string_lossy();
        let args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                arg.replace(INPUT_PLACEHOLDER, &input_arg)
                    .replace(OUTPUT_PLACEHOLDER, &output_arg)
            })
            .collect();

        debug!(program = %self.program, "Running PDF converter");
        let result = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| SnapError::Pdf(format!("Cannot run '{}': {e}", self.program)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(SnapError::Pdf(format!(
                "'{}' exited with {}: {}",
                self.program,
                result.status,
                stderr.trim()
            )));
        }

        let pdf = fs::read(&output).map_err(|e| SnapError::io(&output, e))?;
        if pdf.is_empty() {
            return Err(SnapError::Pdf(format!("'{}' produced no output", self.program)));
        }
        Ok(pdf)
    }
}
