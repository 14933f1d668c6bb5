use std::path::Path;

use image::ImageFormat;
use thiserror::Error;

/// Extensions accepted for upload, compared case-insensitively.
pub const ALLOWED_EXTENSIONS: [&str; 7] = ["pdf", "jpg", "jpeg", "png", "docx", "xlsx", "txt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    pub fn image_format(self) -> ImageFormat {
        match self {
            ImageKind::Jpeg => ImageFormat::Jpeg,
            ImageKind::Png => ImageFormat::Png,
        }
    }
}

/// Every document type the merger knows how to combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Image(ImageKind),
    Docx,
    Xlsx,
    Text,
}

impl DocumentFormat {
    /// Parse a bare extension (no leading dot), ignoring case.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "jpg" | "jpeg" => Some(DocumentFormat::Image(ImageKind::Jpeg)),
            "png" => Some(DocumentFormat::Image(ImageKind::Png)),
            "docx" => Some(DocumentFormat::Docx),
            "xlsx" => Some(DocumentFormat::Xlsx),
            "txt" => Some(DocumentFormat::Text),
            _ => None,
        }
    }

    /// Whether the "save as PDF" flag changes what this format produces.
    /// Office formats are always written in their own container.
    pub fn honors_pdf_flag(self) -> bool {
        !matches!(self, DocumentFormat::Docx | DocumentFormat::Xlsx)
    }
}

/// The lowercased text after the last `.` of a file name, if any.
pub fn extension_of(file_name: &str) -> Option<String> {
    file_name
        .rsplit_once('.')
        .map(|(_, extension)| extension.to_ascii_lowercase())
}

/// Same as [`extension_of`] but for the final component of a path.
pub fn path_extension(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(extension_of)
}

pub fn is_allowed(file_name: &str) -> bool {
    extension_of(file_name).is_some_and(|extension| ALLOWED_EXTENSIONS.contains(&extension.as_str()))
}

/// Content type sent along with a merged download.
pub fn mime_type(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No files uploaded.")]
    NoFiles,
    #[error("File not allowed: {0}")]
    NotAllowed(String),
    #[error("All files must be of the same type.")]
    MixedTypes,
}

/// Check an upload batch by file name only.
///
/// Every name must carry an allowed extension and all of them must share the
/// extension of the first one. Returns the format the batch will be merged as.
pub fn validate_batch<S>(file_names: &[S]) -> Result<DocumentFormat, ValidationError>
where
    S: AsRef<str>,
{
    let first = file_names.first().ok_or(ValidationError::NoFiles)?.as_ref();
    let batch_extension =
        extension_of(first).ok_or_else(|| ValidationError::NotAllowed(first.to_owned()))?;

    for name in file_names.iter().map(AsRef::as_ref) {
        if !is_allowed(name) {
            return Err(ValidationError::NotAllowed(name.to_owned()));
        }
        if extension_of(name).as_deref() != Some(batch_extension.as_str()) {
            return Err(ValidationError::MixedTypes);
        }
    }

    DocumentFormat::from_extension(&batch_extension)
        .ok_or_else(|| ValidationError::NotAllowed(first.to_owned()))
}
