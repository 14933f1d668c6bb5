use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::instrument;

use super::{
    OFFICE_DOCUMENT_REL, OoxmlError, RELATIONSHIPS_NS, XML_DECLARATION, main_part_name,
    open_package, require_part, write_package,
};

const WORDPROCESSING_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const DOCUMENT_RELATIONSHIPS_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const DEFAULT_DOCUMENT_PART: &str = "word/document.xml";

/// A4 portrait with one inch margins, measured in twentieths of a point.
const DEFAULT_SECTION: &str = concat!(
    r#"<w:sectPr><w:pgSz w:w="11906" w:h="16838"/>"#,
    r#"<w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="708" w:footer="708" w:gutter="0"/>"#,
    r#"</w:sectPr>"#
);

/// What one source document contributes to the merged body.
#[derive(Debug, Default)]
struct SourceBody {
    /// `xmlns` declarations of the source's root element, raw.
    namespaces: Vec<(String, String)>,
    ignorable: Option<String>,
    /// Top-level body elements, copied byte for byte.
    elements: Vec<String>,
}

/// Build a new document whose body holds every top-level body element of
/// each input, in input order.
///
/// Only the main document part is carried over: styles, numbering, headers
/// and relationship targets such as images stay behind.
#[instrument(skip(files), fields(files = files.len()))]
pub fn merge_docx_files<P>(files: &[P], output_path: &Path) -> Result<(), OoxmlError>
where
    P: AsRef<Path>,
{
    let mut namespaces: Vec<(String, String)> = vec![
        ("xmlns:w".to_owned(), WORDPROCESSING_NS.to_owned()),
        ("xmlns:r".to_owned(), DOCUMENT_RELATIONSHIPS_NS.to_owned()),
    ];
    let mut ignorable = None;
    let mut body = String::new();

    for path in files {
        let mut archive = open_package(path.as_ref())?;
        let part_name = main_part_name(&mut archive, DEFAULT_DOCUMENT_PART)?;
        let source = read_body(&require_part(&mut archive, &part_name)?)?;

        for (key, value) in source.namespaces {
            if !namespaces.iter().any(|(existing, _)| *existing == key) {
                namespaces.push((key, value));
            }
        }
        if ignorable.is_none() {
            ignorable = source.ignorable;
        }
        tracing::debug!(
            "Copying body elements. file={:?} elements={}",
            path.as_ref(),
            source.elements.len()
        );
        source
            .elements
            .iter()
            .for_each(|element| body.push_str(element));
    }

    let mut root_attributes: String = namespaces
        .iter()
        .map(|(key, value)| format!(r#" {key}="{value}""#))
        .collect();
    if let Some(prefixes) = ignorable {
        root_attributes.push_str(&format!(r#" mc:Ignorable="{prefixes}""#));
    }

    let document = format!(
        "{XML_DECLARATION}\n<w:document{root_attributes}><w:body>{body}{DEFAULT_SECTION}</w:body></w:document>"
    );

    write_package(
        output_path,
        &[
            ("[Content_Types].xml", content_types()),
            ("_rels/.rels", package_relationships()),
            (DEFAULT_DOCUMENT_PART, document),
        ],
    )
}

/// Pull namespaces and top-level body children out of a `document.xml`.
/// Section properties are skipped; the merged document gets its own.
fn read_body(xml: &str) -> Result<SourceBody, OoxmlError> {
    let bytes = xml.as_bytes();
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();

    let mut source = SourceBody::default();
    let mut depth = 0usize;
    let mut body_depth: Option<usize> = None;
    // Start offset of the body child being copied, and whether to drop it
    let mut open_child: Option<(usize, bool)> = None;

    loop {
        let before = reader.buffer_position() as usize;
        let event = reader.read_event_into(&mut buf)?;
        let after = reader.buffer_position() as usize;

        match event {
            Event::Start(e) => {
                depth += 1;
                let local_name = e.local_name();
                if depth == 1 {
                    for attr in e.attributes() {
                        let attr = attr?;
                        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                        let value = String::from_utf8_lossy(&attr.value).into_owned();
                        if key.starts_with("xmlns") {
                            source.namespaces.push((key, value));
                        } else if key == "mc:Ignorable" {
                            source.ignorable = Some(value);
                        }
                    }
                } else if depth == 2 && local_name.as_ref() == b"body" {
                    body_depth = Some(depth);
                } else if body_depth.is_some_and(|body| depth == body + 1) {
                    open_child = Some((before, local_name.as_ref() == b"sectPr"));
                }
            }
            Event::Empty(e) => {
                if body_depth == Some(depth) && e.local_name().as_ref() != b"sectPr" {
                    source
                        .elements
                        .push(String::from_utf8_lossy(&bytes[before..after]).into_owned());
                }
            }
            Event::End(_) => {
                if body_depth.is_some_and(|body| depth == body + 1)
                    && let Some((start, skip)) = open_child.take()
                    && !skip
                {
                    source
                        .elements
                        .push(String::from_utf8_lossy(&bytes[start..after]).into_owned());
                } else if body_depth == Some(depth) {
                    body_depth = None;
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(source)
}

fn content_types() -> String {
    format!(
        concat!(
            "{}\n",
            r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
            r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
            r#"<Default Extension="xml" ContentType="application/xml"/>"#,
            r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
            "</Types>"
        ),
        XML_DECLARATION
    )
}

fn package_relationships() -> String {
    format!(
        r#"{XML_DECLARATION}
<Relationships xmlns="{RELATIONSHIPS_NS}"><Relationship Id="rId1" Type="{OFFICE_DOCUMENT_REL}" Target="{DEFAULT_DOCUMENT_PART}"/></Relationships>"#
    )
}
