use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::Path;
use std::time::Instant;

use lopdf::{Dictionary, Document, Object, ObjectId};
use thiserror::Error;
use tracing::instrument;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

#[derive(Error, Debug)]
pub enum MergePDFError {
    #[error("No input files provided")]
    NoInput,
    #[error("Could not find Pages object")]
    MissingPageTree,
    #[error("Cannot open file: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid PDF: {0}")]
    Lopdf(#[from] lopdf::Error),
}

/// Merge every file in `files` into a single PDF file at `output_path`.
/// The first file becomes the "base"; the pages of all others are appended
/// in order, without re-rendering anything.
///
/// Implementation inspired on the reference example from the [lopdf repo here.](https://github.com/J-F-Liu/lopdf/blob/c320c1d9d90028ee64e668f0bbbe9815fae3fb44/examples/merge.rs)
#[instrument(skip_all, fields(files = files.len()))]
pub fn merge_pdf_files<P>(files: &[P], output_path: &Path) -> Result<(), MergePDFError>
where
    P: AsRef<Path>,
{
    if files.is_empty() {
        return Err(MergePDFError::NoInput);
    }

    let start_time = Instant::now();

    // Start with the first document as the base
    let first_file = File::open(files[0].as_ref())?;
    let mut merged_doc = Document::load_from(first_file)?;

    if files.len() == 1 {
        // Only one file, just save it to the given output and bail
        merged_doc.save(output_path)?;
        return Ok(());
    }

    // Track the next available object ID
    let mut max_id = merged_doc.max_id + 1;

    // Page order matters, so pages are kept in a Vec rather than keyed by id
    let mut all_pages: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut all_objects = BTreeMap::new();

    collect_pages(&merged_doc, &mut all_pages)?;

    for input_path in files.iter().skip(1) {
        let file = File::open(input_path.as_ref())?;
        let mut doc = Document::load_from(file)?;

        // Renumber objects to avoid conflicts
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        collect_pages(&doc, &mut all_pages)?;

        // For objects that are not pages,
        // Add all objects (except Catalog and Pages which we'll handle specially)
        for (object_id, object) in doc.objects.into_iter() {
            match object.type_name().unwrap_or(b"") {
                b"Catalog" | b"Pages" | b"Page" => {}
                _ => {
                    all_objects.insert(object_id, object);
                }
            }
        }
    }

    for (object_id, object) in all_objects {
        merged_doc.objects.insert(object_id, object);
    }

    let pages_id = merged_doc
        .catalog()?
        .get(b"Pages")
        .and_then(|pages_ref| pages_ref.as_reference())
        .map_err(|_| MergePDFError::MissingPageTree)?;

    // Every page now hangs directly off the base document's page tree root
    for (page_id, page_dict) in &all_pages {
        let mut new_dict = page_dict.clone();
        new_dict.set("Parent", pages_id);
        merged_doc
            .objects
            .insert(*page_id, Object::Dictionary(new_dict));
    }

    let pages_dict = merged_doc
        .get_object_mut(pages_id)
        .and_then(|pages_obj| pages_obj.as_dict_mut())
        .map_err(|_| MergePDFError::MissingPageTree)?;
    pages_dict.set("Count", all_pages.len() as u32);
    let kids: Vec<Object> = all_pages
        .iter()
        .map(|(page_id, _)| Object::Reference(*page_id))
        .collect();
    pages_dict.set("Kids", kids);

    // Update max_id and renumber objects to ensure consistency
    // before saving the final merged document
    merged_doc.max_id = merged_doc.objects.len() as u32;
    merged_doc.renumber_objects();

    merged_doc.save(output_path)?;
    tracing::info!(
        "Merged PDF written. pages={} elapsed={:?}",
        all_pages.len(),
        start_time.elapsed()
    );
    Ok(())
}

/// Append the pages of `doc` in page-number order, each one carrying a copy
/// of the attributes it used to inherit from its own page tree.
fn collect_pages(
    doc: &Document,
    pages: &mut Vec<(ObjectId, Dictionary)>,
) -> Result<(), MergePDFError> {
    for page_id in doc.get_pages().into_values() {
        let mut page = doc.get_object(page_id)?.as_dict()?.clone();
        inline_inherited_attributes(doc, &mut page);
        pages.push((page_id, page));
    }
    Ok(())
}

fn inline_inherited_attributes(doc: &Document, page: &mut Dictionary) {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    // Bounded walk in case of a cyclic page tree
    let mut hops = 0;
    while let Some(parent_id) = parent {
        hops += 1;
        let Some(node) = doc
            .get_object(parent_id)
            .and_then(Object::as_dict)
            .ok()
            .filter(|_| hops < 64)
        else {
            break;
        };
        for key in INHERITABLE_KEYS {
            if !page.has(key)
                && let Ok(value) = node.get(key)
            {
                page.set(key.to_vec(), value.clone());
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::Stream;
    use lopdf::content::{Content, Operation};
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Build a PDF whose pages each print their label, so merged order can be
    /// checked by reading the content streams back.
    pub(crate) fn write_test_pdf(path: &Path, labels: &[&str]) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Font".to_vec())),
            ("Subtype", Object::Name(b"Type1".to_vec())),
            ("BaseFont", Object::Name(b"Helvetica".to_vec())),
        ]));

        let mut kids = Vec::new();
        for label in labels {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(24)]),
                    Operation::new("Td", vec![Object::Integer(100), Object::Integer(700)]),
                    Operation::new("Tj", vec![Object::string_literal(*label)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
            let page_id = doc.add_object(Dictionary::from_iter([
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(pages_id)),
                ("Contents", Object::Reference(content_id)),
            ]));
            kids.push(Object::Reference(page_id));
        }

        // MediaBox and Resources live on the tree root and are inherited
        let resources = Dictionary::from_iter([(
            "Font",
            Object::Dictionary(Dictionary::from_iter([("F1", Object::Reference(font_id))])),
        )]);
        let page_tree = Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(kids.len() as i64)),
            ("Kids", Object::Array(kids)),
            ("Resources", Object::Dictionary(resources)),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(612),
                    Object::Integer(792),
                ]),
            ),
        ]);
        doc.objects.insert(pages_id, Object::Dictionary(page_tree));

        let catalog_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]));
        doc.trailer.set("Root", Object::Reference(catalog_id));
        doc.save(path).unwrap();
    }

    /// The label printed on every page of `path`, in page order.
    pub(crate) fn page_labels(path: &Path) -> Vec<String> {
        let doc = Document::load(path).unwrap();
        doc.get_pages()
            .into_values()
            .map(|page_id| {
                let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
                content
                    .operations
                    .iter()
                    .find(|op| op.operator == "Tj")
                    .and_then(|op| match op.operands.first() {
                        Some(Object::String(bytes, _)) => {
                            Some(String::from_utf8_lossy(bytes).into_owned())
                        }
                        _ => None,
                    })
                    .unwrap_or_default()
            })
            .collect()
    }

    fn fixtures(dir: &TempDir) -> (PathBuf, PathBuf, PathBuf) {
        let first = dir.path().join("first.pdf");
        let second = dir.path().join("second.pdf");
        let third = dir.path().join("third.pdf");
        write_test_pdf(&first, &["a1", "a2"]);
        write_test_pdf(&second, &["b1"]);
        write_test_pdf(&third, &["c1", "c2", "c3"]);
        (first, second, third)
    }

    #[test]
    fn test_merge_single_file() {
        let dir = TempDir::new().unwrap();
        let (first, _, _) = fixtures(&dir);
        let output_path = dir.path().join("out.pdf");

        let result = merge_pdf_files(&[first], &output_path);
        assert!(result.is_ok(), "Failed to merge single PDF: {result:?}");
        assert_eq!(page_labels(&output_path), vec!["a1", "a2"]);
    }

    #[test]
    fn test_merge_two_files() {
        let dir = TempDir::new().unwrap();
        let (first, second, _) = fixtures(&dir);
        let output_path = dir.path().join("out.pdf");

        let result = merge_pdf_files(&[first, second], &output_path);
        assert!(result.is_ok(), "Failed to merge two PDFs: {result:?}");

        let merged_doc = Document::load(&output_path).expect("Output is not a valid PDF");
        assert_eq!(
            merged_doc.get_pages().len(),
            3,
            "Merged PDF should have pages from both input documents"
        );
    }

    #[test]
    fn test_merge_keeps_input_order() {
        let dir = TempDir::new().unwrap();
        let (first, second, third) = fixtures(&dir);
        let output_path = dir.path().join("out.pdf");

        merge_pdf_files(&[third, first, second], &output_path).expect("Failed to merge PDFs");

        assert_eq!(
            page_labels(&output_path),
            vec!["c1", "c2", "c3", "a1", "a2", "b1"]
        );
    }

    #[test]
    fn test_merged_pages_keep_inherited_attributes() {
        let dir = TempDir::new().unwrap();
        let (first, second, _) = fixtures(&dir);
        let output_path = dir.path().join("out.pdf");

        merge_pdf_files(&[first, second], &output_path).expect("Failed to merge PDFs");

        let merged_doc = Document::load(&output_path).unwrap();
        for page_id in merged_doc.get_pages().into_values() {
            let page = merged_doc.get_dictionary(page_id).unwrap();
            assert!(page.has(b"MediaBox"), "Every page should keep a MediaBox");
            assert!(page.has(b"Resources"), "Every page should keep Resources");
        }
    }

    #[test]
    fn test_merge_empty_input_list() {
        let dir = TempDir::new().unwrap();
        let output_path = dir.path().join("out.pdf");

        let result = merge_pdf_files::<PathBuf>(&[], &output_path);
        assert!(matches!(result, Err(MergePDFError::NoInput)));
        assert!(!output_path.exists());
    }

    #[test]
    fn test_merge_nonexistent_file() {
        let dir = TempDir::new().unwrap();
        let output_path = dir.path().join("out.pdf");

        let result = merge_pdf_files(&[PathBuf::from("/path/that/does/not/exist.pdf")], &output_path);
        assert!(result.is_err(), "Should return error for nonexistent file");
    }

    #[test]
    fn test_merge_rejects_non_pdf_input() {
        let dir = TempDir::new().unwrap();
        let (first, _, _) = fixtures(&dir);
        let bogus = dir.path().join("bogus.pdf");
        std::fs::write(&bogus, b"definitely not a pdf").unwrap();

        let result = merge_pdf_files(&[first, bogus], &dir.path().join("out.pdf"));
        assert!(matches!(result, Err(MergePDFError::Lopdf(_))));
    }

    #[test]
    fn test_merged_pdf_structure() {
        let dir = TempDir::new().unwrap();
        let (first, second, third) = fixtures(&dir);
        let output_path = dir.path().join("out.pdf");

        merge_pdf_files(&[first, second, third], &output_path).expect("Failed to merge PDFs");

        let merged_doc = Document::load(&output_path).expect("Failed to load merged PDF");
        let pages_id = merged_doc
            .catalog()
            .and_then(|catalog| catalog.get(b"Pages"))
            .and_then(Object::as_reference)
            .expect("Catalog should reference a valid Pages object");
        let pages_dict = merged_doc
            .get_dictionary(pages_id)
            .expect("Pages object should be a dictionary");

        let count = pages_dict.get(b"Count").and_then(Object::as_i64).unwrap();
        let kids = pages_dict.get(b"Kids").and_then(Object::as_array).unwrap();
        assert_eq!(count, 6);
        assert_eq!(count as usize, kids.len(), "Page count should match kids array length");
    }
}
