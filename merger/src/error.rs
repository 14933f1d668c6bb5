use std::io;

use thiserror::Error;

use crate::images::ImageMergeError;
use crate::ooxml::OoxmlError;
use crate::pdf::merge::MergePDFError;
use crate::text::TextMergeError;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Upload at least two files first.")]
    TooFewFiles,
    #[error("Unsupported file type")]
    Unsupported(String),
    #[error(transparent)]
    Pdf(#[from] MergePDFError),
    #[error(transparent)]
    Image(#[from] ImageMergeError),
    #[error(transparent)]
    Office(#[from] OoxmlError),
    #[error(transparent)]
    Text(#[from] TextMergeError),
    #[error("Cannot prepare merge output: {0}")]
    Io(#[from] io::Error),
}

impl MergeError {
    /// Errors caused by the batch itself rather than by processing it.
    pub fn is_client_error(&self) -> bool {
        matches!(self, MergeError::TooFewFiles | MergeError::Unsupported(_))
    }
}
