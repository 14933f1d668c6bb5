use std::io;

use thiserror::Error;

pub mod images;
pub mod merge;
pub mod text;

/// Failures while producing a new PDF from non-PDF content.
#[derive(Error, Debug)]
pub enum PdfRenderError {
    #[error("Could not decode image for PDF page. decoding_error=`{0}`")]
    BadImageDecoding(String),
    #[error("Could not encode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("Could not assemble PDF: {0}")]
    Lopdf(#[from] lopdf::Error),
    #[error("Cannot write PDF file: {0}")]
    Io(#[from] io::Error),
}
