//! Office Open XML packages (`.docx`, `.xlsx`) are zip archives of XML parts.
//! This module holds the package plumbing shared by both merge strategies.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, Write};
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

pub mod docx;
pub mod xlsx;

pub(crate) const XML_DECLARATION: &str =
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
pub(crate) const RELATIONSHIPS_NS: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships";
pub(crate) const OFFICE_DOCUMENT_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";

#[derive(Error, Debug)]
pub enum OoxmlError {
    #[error("Not a valid Office document: {0}")]
    Zip(#[from] ZipError),
    #[error("Malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("Malformed XML attribute: {0}")]
    Attribute(#[from] AttrError),
    #[error("Document part is missing: {0}")]
    MissingPart(String),
    #[error("Worksheet is out of bounds: {0}")]
    InvalidSheet(String),
    #[error("Cannot read or write document: {0}")]
    Io(#[from] io::Error),
}

pub(crate) type Package = ZipArchive<BufReader<File>>;

pub(crate) fn open_package(path: &Path) -> Result<Package, OoxmlError> {
    let file = File::open(path)?;
    Ok(ZipArchive::new(BufReader::new(file))?)
}

/// Read a part as UTF-8 text. A part that does not exist yields `None`.
pub(crate) fn read_part<R>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, OoxmlError>
where
    R: Read + Seek,
{
    match archive.by_name(name) {
        Ok(mut part) => {
            let mut content = String::new();
            part.read_to_string(&mut content)?;
            Ok(Some(content))
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(error) => Err(error.into()),
    }
}

/// Same as [`read_part`] but a missing part is an error.
pub(crate) fn require_part<R>(archive: &mut ZipArchive<R>, name: &str) -> Result<String, OoxmlError>
where
    R: Read + Seek,
{
    read_part(archive, name)?.ok_or_else(|| OoxmlError::MissingPart(name.to_owned()))
}

/// Write a new package made of `(part name, xml)` pairs. Timestamps are fixed
/// so the same parts always produce the same bytes.
pub(crate) fn write_package(output_path: &Path, parts: &[(&str, String)]) -> Result<(), OoxmlError> {
    let file = File::create(output_path)?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());

    for (name, content) in parts {
        zip.start_file(*name, options)?;
        zip.write_all(content.as_bytes())?;
    }
    zip.finish()?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
}

/// Parse a `.rels` part.
pub(crate) fn parse_relationships(xml: &str) -> Result<Vec<Relationship>, OoxmlError> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    let mut buf = Vec::new();
    let mut relationships = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                relationships.push(Relationship {
                    id: attribute(&e, b"Id")?.unwrap_or_default(),
                    rel_type: attribute(&e, b"Type")?.unwrap_or_default(),
                    target: attribute(&e, b"Target")?.unwrap_or_default(),
                });
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(relationships)
}

/// Resolve a relationship target against the folder of the part that owns
/// the relationship (`""` for the package root).
pub(crate) fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_owned();
    }
    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Locate the main part of a package through its root relationships.
pub(crate) fn main_part_name<R>(archive: &mut ZipArchive<R>, fallback: &str) -> Result<String, OoxmlError>
where
    R: Read + Seek,
{
    let Some(rels) = read_part(archive, "_rels/.rels")? else {
        return Ok(fallback.to_owned());
    };
    Ok(parse_relationships(&rels)?
        .into_iter()
        .find(|rel| rel.rel_type == OFFICE_DOCUMENT_REL)
        .map(|rel| resolve_target("", &rel.target))
        .unwrap_or_else(|| fallback.to_owned()))
}

/// Raw (still escaped) value of the first attribute whose local name matches.
pub(crate) fn attribute(element: &BytesStart<'_>, local_name: &[u8]) -> Result<Option<String>, OoxmlError> {
    for attr in element.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == local_name {
            return Ok(Some(String::from_utf8_lossy(&attr.value).into_owned()));
        }
    }
    Ok(None)
}

/// Expand a general reference such as `amp` or `#x41` to its text.
pub(crate) fn resolve_reference(name: &[u8]) -> Option<String> {
    let name = std::str::from_utf8(name).ok()?;
    if let Some(code) = name.strip_prefix('#') {
        let value = match code.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => code.parse().ok()?,
        };
        return char::from_u32(value).map(String::from);
    }
    let resolved = match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        _ => return None,
    };
    Some(resolved.to_owned())
}

/// Escape text for use in element content or attribute values.
pub(crate) fn escape(text: &str) -> String {
    quick_xml::escape::escape(text).into_owned()
}
