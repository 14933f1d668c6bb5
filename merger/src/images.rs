use std::path::Path;

use image::{Rgb, RgbImage, imageops};
use thiserror::Error;
use tracing::instrument;

use crate::format::ImageKind;
use crate::pdf::PdfRenderError;
use crate::pdf::images::write_image_pdf;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Error, Debug)]
pub enum ImageMergeError {
    #[error("No images to merge")]
    EmptyInput,
    #[error("Merged image would be too tall. height={0}")]
    CanvasTooLarge(u64),
    #[error("Cannot process image: {0}")]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Pdf(#[from] PdfRenderError),
}

/// Merge images either into one tall picture in the batch's own format, or
/// into a PDF with one page per image when `save_as_pdf` is set.
#[instrument(skip(files), fields(files = files.len()))]
pub fn merge_images<P>(
    files: &[P],
    kind: ImageKind,
    save_as_pdf: bool,
    output_path: &Path,
) -> Result<(), ImageMergeError>
where
    P: AsRef<Path>,
{
    if files.is_empty() {
        return Err(ImageMergeError::EmptyInput);
    }

    let images = files
        .iter()
        .map(|path| image::open(path.as_ref()).map(|decoded| decoded.to_rgb8()))
        .collect::<Result<Vec<_>, _>>()?;

    if save_as_pdf {
        write_image_pdf(&images, output_path)?;
        return Ok(());
    }

    let canvas = stack_vertically(&images)?;
    canvas.save_with_format(output_path, kind.image_format())?;
    Ok(())
}

/// Paste `images` top to bottom, left-aligned, on a white canvas as wide as
/// the widest image and as tall as all of them together.
pub fn stack_vertically(images: &[RgbImage]) -> Result<RgbImage, ImageMergeError> {
    let width = images.iter().map(RgbImage::width).max().unwrap_or(0);
    let total_height: u64 = images.iter().map(|img| u64::from(img.height())).sum();
    let height =
        u32::try_from(total_height).map_err(|_| ImageMergeError::CanvasTooLarge(total_height))?;

    let mut canvas = RgbImage::from_pixel(width, height, BACKGROUND);
    let mut y_offset: i64 = 0;
    for img in images {
        imageops::replace(&mut canvas, img, 0, y_offset);
        y_offset += i64::from(img.height());
    }
    Ok(canvas)
}
