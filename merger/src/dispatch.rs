use std::path::{Path, PathBuf};

use tracing::instrument;

use crate::error::MergeError;
use crate::format::{DocumentFormat, mime_type, path_extension};
use crate::images::merge_images;
use crate::ooxml::docx::merge_docx_files;
use crate::ooxml::xlsx::merge_xlsx_files;
use crate::pdf::merge::merge_pdf_files;
use crate::text::merge_text_files;

const OUTPUT_STEM: &str = "merged_output";
const MERGED_TEXT_NAME: &str = "merged.txt";
const DOWNLOAD_STEM: &str = "merged_document";

/// The file a merge produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedDocument {
    pub path: PathBuf,
    /// Extension the result is announced with, lowercase and without a dot.
    pub extension: String,
}

impl MergedDocument {
    /// File name offered to whoever downloads the result.
    pub fn download_name(&self) -> String {
        format!("{DOWNLOAD_STEM}.{}", self.extension)
    }

    pub fn content_type(&self) -> &'static str {
        mime_type(&self.extension)
    }
}

/// Merge a stored batch into a single file inside `workdir`.
///
/// The batch format comes from the first file's extension. With
/// `save_as_pdf` set the result is announced as a PDF; the Office formats
/// still produce their own container in that case.
#[instrument(skip(files, workdir), fields(files = files.len()))]
pub fn merge_files<P>(
    files: &[P],
    save_as_pdf: bool,
    workdir: &Path,
) -> Result<MergedDocument, MergeError>
where
    P: AsRef<Path>,
{
    if files.len() < 2 {
        return Err(MergeError::TooFewFiles);
    }

    let extension = path_extension(files[0].as_ref()).unwrap_or_default();
    let format = DocumentFormat::from_extension(&extension)
        .ok_or_else(|| MergeError::Unsupported(extension.clone()))?;

    let output_extension = if save_as_pdf {
        "pdf".to_owned()
    } else {
        extension
    };
    let output_path = workdir.join(format!("{OUTPUT_STEM}.{output_extension}"));

    if save_as_pdf && !format.honors_pdf_flag() {
        tracing::warn!(
            "PDF output requested but not supported for this format, keeping native container. format={:?}",
            format
        );
    }

    let path = match format {
        DocumentFormat::Pdf => {
            merge_pdf_files(files, &output_path)?;
            output_path
        }
        DocumentFormat::Image(kind) => {
            merge_images(files, kind, save_as_pdf, &output_path)?;
            output_path
        }
        DocumentFormat::Docx => {
            merge_docx_files(files, &output_path)?;
            output_path
        }
        DocumentFormat::Xlsx => {
            merge_xlsx_files(files, &output_path)?;
            output_path
        }
        DocumentFormat::Text => {
            let merged_txt = workdir.join(MERGED_TEXT_NAME);
            if save_as_pdf {
                merge_text_files(files, &merged_txt, Some(&output_path))?;
                output_path
            } else {
                merge_text_files(files, &merged_txt, None)?;
                merged_txt
            }
        }
    };

    tracing::info!("Merge completed. format={:?} output={:?}", format, path);
    Ok(MergedDocument {
        path,
        extension: output_extension,
    })
}
