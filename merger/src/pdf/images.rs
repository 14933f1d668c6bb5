use std::fs;
use std::io::Cursor;
use std::path::Path;

use image::{ImageFormat, RgbImage};
use printpdf::{Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, RawImage, XObjectTransform};
use tracing::instrument;

use super::PdfRenderError;

/// Images are placed at 72 DPI, so one pixel maps to one PDF point.
const DPI: f32 = 72.0;

/// Write `images` as a PDF with one full-page image per page, in order.
#[instrument(skip_all, fields(images = images.len()))]
pub fn write_image_pdf(images: &[RgbImage], output_path: &Path) -> Result<(), PdfRenderError> {
    let mut doc_out = PdfDocument::new("Merged Images");
    let mut pdf_pages = Vec::with_capacity(images.len());

    for (index, bitmap) in images.iter().enumerate() {
        let mut png_data = Vec::new();
        bitmap.write_to(&mut Cursor::new(&mut png_data), ImageFormat::Png)?;

        let mut warnings = Vec::new();
        let image = RawImage::decode_from_bytes(&png_data, &mut warnings)
            .map_err(PdfRenderError::BadImageDecoding)?;
        let image_id = doc_out.add_image(&image);

        // compute page size *in mm* (printpdf::Mm expects mm)
        let width_mm = Mm(bitmap.width() as f32 * 25.4 / DPI);
        let height_mm = Mm(bitmap.height() as f32 * 25.4 / DPI);

        let contents = vec![Op::UseXobject {
            id: image_id,
            transform: XObjectTransform {
                dpi: Some(DPI),
                ..Default::default()
            },
        }];

        tracing::debug!("Image {index} placed on its own page");
        pdf_pages.push(PdfPage::new(width_mm, height_mm, contents));
    }

    let mut warnings = Vec::new();
    let pdf_bytes = doc_out
        .with_pages(pdf_pages)
        .save(&PdfSaveOptions::default(), &mut warnings);
    fs::write(output_path, pdf_bytes)?;
    Ok(())
}
