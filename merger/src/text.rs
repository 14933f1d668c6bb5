use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;
use tracing::instrument;

use crate::pdf::PdfRenderError;
use crate::pdf::text::render_text_pdf;

#[derive(Error, Debug)]
pub enum TextMergeError {
    #[error("Cannot read or write text: {0}")]
    Io(#[from] io::Error),
    #[error("File is not valid UTF-8 text: {0}")]
    Encoding(String),
    #[error(transparent)]
    Pdf(#[from] PdfRenderError),
}

/// Concatenate text files, each followed by a line break, into `merged_txt`.
/// Line endings are normalized to `\n`. With `pdf_output` set the merged text
/// is also rendered there as a PDF.
#[instrument(skip(files), fields(files = files.len()))]
pub fn merge_text_files<P>(
    files: &[P],
    merged_txt: &Path,
    pdf_output: Option<&Path>,
) -> Result<(), TextMergeError>
where
    P: AsRef<Path>,
{
    let mut merged = String::new();
    for path in files {
        let bytes = fs::read(path.as_ref())?;
        let text = String::from_utf8(bytes)
            .map_err(|_| TextMergeError::Encoding(path.as_ref().display().to_string()))?;
        merged.push_str(&normalize_line_endings(&text));
        merged.push('\n');
    }
    fs::write(merged_txt, &merged)?;

    if let Some(pdf_path) = pdf_output {
        render_text_pdf(&merged, pdf_path)?;
    }
    Ok(())
}

/// Turn `\r\n` and lone `\r` into `\n`.
pub(crate) fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}
