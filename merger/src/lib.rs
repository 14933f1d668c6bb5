pub mod dispatch;
pub mod error;
pub mod format;
pub mod images;
pub mod ooxml;
pub mod pdf;
pub mod text;

pub use dispatch::{MergedDocument, merge_files};
pub use error::MergeError;
pub use format::{DocumentFormat, ImageKind, ValidationError, validate_batch};
