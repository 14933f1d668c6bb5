use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream};
use tracing::instrument;

use super::PdfRenderError;
use crate::text::normalize_line_endings;

// A4 in points
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;

const LEFT_MARGIN: i64 = 50;
const FIRST_BASELINE: i64 = 800;
const BOTTOM_MARGIN: i64 = 50;
const LINE_STEP: i64 = 15;
const FONT_SIZE: i64 = 12;
const FONT_NAME: &[u8] = b"Courier";

/// A line of text and the baseline it is drawn on.
type PlacedLine = (i64, String);

/// Render plain text as a PDF, one text line per output line.
///
/// Lines are drawn top-down and a new page begins once the cursor drops below
/// the bottom margin. Nothing is wrapped, so long lines run off the page.
#[instrument(skip(text))]
pub fn render_text_pdf(text: &str, output_path: &Path) -> Result<(), PdfRenderError> {
    let pages = layout_pages(text);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(FONT_NAME.to_vec())),
        ("Encoding", Object::Name(b"WinAnsiEncoding".to_vec())),
    ]));
    let resources_id = doc.add_object(Dictionary::from_iter([(
        "Font",
        Object::Dictionary(Dictionary::from_iter([("F1", Object::Reference(font_id))])),
    )]));

    let mut kids = Vec::with_capacity(pages.len());
    for lines in &pages {
        let content: Content<Vec<Operation>> = Content {
            operations: lines.iter().flat_map(draw_line).collect(),
        };
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode()?));
        let page_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            ("Contents", Object::Reference(content_id)),
            ("Resources", Object::Reference(resources_id)),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(PAGE_WIDTH),
                    Object::Integer(PAGE_HEIGHT),
                ]),
            ),
        ]));
        kids.push(Object::Reference(page_id));
    }

    let page_tree = Dictionary::from_iter([
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(kids.len() as i64)),
        ("Kids", Object::Array(kids)),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(page_tree));

    let catalog_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    doc.compress();
    doc.save(output_path)?;
    tracing::info!("Text rendered to PDF. pages={}", pages.len());
    Ok(())
}

/// Split `text` into pages of placed lines. Always yields at least one page;
/// a trailing page is only started when a line lands on it.
fn layout_pages(text: &str) -> Vec<Vec<PlacedLine>> {
    let mut pages = Vec::new();
    let mut current = Vec::new();
    let mut y = FIRST_BASELINE;

    for line in normalize_line_endings(text).lines() {
        current.push((y, line.trim().to_owned()));
        y -= LINE_STEP;
        if y < BOTTOM_MARGIN {
            pages.push(std::mem::take(&mut current));
            y = FIRST_BASELINE;
        }
    }

    if !current.is_empty() || pages.is_empty() {
        pages.push(current);
    }
    pages
}

fn draw_line((y, line): &PlacedLine) -> Vec<Operation> {
    if line.is_empty() {
        return Vec::new();
    }
    vec![
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![Object::Name(b"F1".to_vec()), Object::Integer(FONT_SIZE)],
        ),
        Operation::new(
            "Td",
            vec![Object::Integer(LEFT_MARGIN), Object::Integer(*y)],
        ),
        Operation::new("Tj", vec![Object::string_literal(win_ansi_bytes(line))]),
        Operation::new("ET", vec![]),
    ]
}

/// Characters WinAnsiEncoding places in 0x80..=0x9F. Slots left `None` are
/// undefined.
const WIN_ANSI_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'), None, Some('\u{201A}'), Some('\u{0192}'),
    Some('\u{201E}'), Some('\u{2026}'), Some('\u{2020}'), Some('\u{2021}'),
    Some('\u{02C6}'), Some('\u{2030}'), Some('\u{0160}'), Some('\u{2039}'),
    Some('\u{0152}'), None, Some('\u{017D}'), None,
    None, Some('\u{2018}'), Some('\u{2019}'), Some('\u{201C}'),
    Some('\u{201D}'), Some('\u{2022}'), Some('\u{2013}'), Some('\u{2014}'),
    Some('\u{02DC}'), Some('\u{2122}'), Some('\u{0161}'), Some('\u{203A}'),
    Some('\u{0153}'), None, Some('\u{017E}'), Some('\u{0178}'),
];

const REPLACEMENT: u8 = b'?';

/// Encode text for a standard font using WinAnsiEncoding. Characters it
/// cannot represent become `?`.
fn win_ansi_bytes(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match u32::from(c) {
            code @ (0x20..=0x7E | 0xA0..=0xFF) => code as u8,
            _ => WIN_ANSI_HIGH
                .iter()
                .position(|slot| *slot == Some(c))
                .map(|index| 0x80 + index as u8)
                .unwrap_or(REPLACEMENT),
        })
        .collect()
}
