use std::collections::BTreeMap;
use std::io::{Read, Seek};
use std::path::Path;

use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::Event;
use tracing::instrument;
use zip::ZipArchive;

use super::{
    OFFICE_DOCUMENT_REL, OoxmlError, RELATIONSHIPS_NS, XML_DECLARATION, attribute, escape,
    main_part_name, open_package, parse_relationships, read_part, require_part,
    resolve_reference, resolve_target, write_package,
};

const SPREADSHEET_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const DOCUMENT_RELATIONSHIPS_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const WORKSHEET_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const STYLES_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
const DEFAULT_WORKBOOK_PART: &str = "xl/workbook.xml";
const OUTPUT_SHEET_NAME: &str = "Sheet";

/// Worksheet limits of the file format.
pub const MAX_ROWS: u32 = 1_048_576;
pub const MAX_COLUMNS: u32 = 16_384;

/// Custom number format written for date cells, and the `cellXfs` index using it.
const DATE_FORMAT_ID: u32 = 164;
const DATE_FORMAT_CODE: &str = "yyyy-mm-dd h:mm:ss";
const DATE_STYLE_INDEX: u32 = 1;

/// A cell value as stored, without formula or style.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Numbers keep their stored text so nothing is lost to float formatting.
    Number(String),
    Text(String),
    Bool(bool),
    Error(String),
    /// Date or time as a serial day number counted from 1899-12-30.
    Date(String),
}

/// Cells of one row keyed by 1-based column index.
pub type Row = BTreeMap<u32, CellValue>;

/// Concatenate the active sheet of every input workbook into the single
/// sheet of a new workbook. Each input row lands on the next free output row
/// in its original column.
#[instrument(skip(files), fields(files = files.len()))]
pub fn merge_xlsx_files<P>(files: &[P], output_path: &Path) -> Result<(), OoxmlError>
where
    P: AsRef<Path>,
{
    let mut merged: Vec<Row> = Vec::new();

    for path in files {
        let mut archive = open_package(path.as_ref())?;
        let rows = read_active_sheet(&mut archive)?;
        tracing::debug!("Appending rows. file={:?} rows={}", path.as_ref(), rows.len());
        merged.extend(rows);
    }
    if merged.len() > MAX_ROWS as usize {
        return Err(OoxmlError::InvalidSheet(format!(
            "merged workbook has {} rows, the limit is {MAX_ROWS}",
            merged.len()
        )));
    }

    write_workbook(output_path, &merged)
}

/// Rows `1..=last row` of the workbook's active sheet; gaps are empty rows.
pub fn read_active_sheet<R>(archive: &mut ZipArchive<R>) -> Result<Vec<Row>, OoxmlError>
where
    R: Read + Seek,
{
    let workbook_part = main_part_name(archive, DEFAULT_WORKBOOK_PART)?;
    let workbook_dir = parent_dir(&workbook_part);
    let (sheet_ids, active_tab) = parse_workbook(&require_part(archive, &workbook_part)?)?;

    let rels_part = relationships_part(&workbook_part);
    let relationships = parse_relationships(&require_part(archive, &rels_part)?)?;

    let sheet_id = sheet_ids
        .get(active_tab)
        .or_else(|| sheet_ids.first())
        .ok_or_else(|| OoxmlError::MissingPart(format!("{workbook_part} sheets")))?;
    let sheet_part = relationships
        .iter()
        .find(|rel| rel.id == *sheet_id)
        .map(|rel| resolve_target(workbook_dir, &rel.target))
        .ok_or_else(|| OoxmlError::MissingPart(format!("worksheet {sheet_id}")))?;

    let shared_strings = match relationships
        .iter()
        .find(|rel| rel.rel_type.ends_with("/sharedStrings"))
    {
        Some(rel) => match read_part(archive, &resolve_target(workbook_dir, &rel.target))? {
            Some(xml) => parse_shared_strings(&xml)?,
            None => Vec::new(),
        },
        None => Vec::new(),
    };

    let date_styles = match relationships.iter().find(|rel| rel.rel_type == STYLES_REL) {
        Some(rel) => match read_part(archive, &resolve_target(workbook_dir, &rel.target))? {
            Some(xml) => parse_date_styles(&xml)?,
            None => Vec::new(),
        },
        None => Vec::new(),
    };

    let context = SheetContext {
        shared_strings: &shared_strings,
        date_styles: &date_styles,
    };
    parse_sheet(&require_part(archive, &sheet_part)?, &context)
}

fn parent_dir(part: &str) -> &str {
    part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// `xl/workbook.xml` → `xl/_rels/workbook.xml.rels`
fn relationships_part(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, name)) => format!("{dir}/_rels/{name}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Sheet relationship ids in tab order plus the active tab index.
fn parse_workbook(xml: &str) -> Result<(Vec<String>, usize), OoxmlError> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    let mut buf = Vec::new();
    let mut sheet_ids = Vec::new();
    let mut active_tab = 0;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"workbookView" => {
                    if let Some(tab) = attribute(&e, b"activeTab")? {
                        active_tab = tab.parse().unwrap_or(0);
                    }
                }
                b"sheet" => {
                    // `r:id`; the sheet's other attributes have different local names
                    if let Some(id) = attribute(&e, b"id")? {
                        sheet_ids.push(id);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok((sheet_ids, active_tab))
}

/// The shared string table; rich text runs are flattened and phonetic hints
/// dropped.
fn parse_shared_strings(xml: &str) -> Result<Vec<String>, OoxmlError> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut phonetic_depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_text = phonetic_depth == 0,
                b"rPh" => phonetic_depth += 1,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.push(std::mem::take(&mut current)),
                b"t" => in_text = false,
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                _ => {}
            },
            Event::Text(e) if in_text => current.push_str(&String::from_utf8_lossy(e.as_ref())),
            Event::CData(e) if in_text => current.push_str(&String::from_utf8_lossy(e.as_ref())),
            Event::GeneralRef(e) if in_text => {
                if let Some(resolved) = resolve_reference(e.as_ref()) {
                    current.push_str(&resolved);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// For every `cellXfs` entry, whether its number format shows a date or time.
fn parse_date_styles(xml: &str) -> Result<Vec<bool>, OoxmlError> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    let mut buf = Vec::new();
    let mut custom_formats: BTreeMap<u32, String> = BTreeMap::new();
    let mut style_formats: Vec<u32> = Vec::new();
    let mut in_cell_xfs = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = true,
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"numFmt" => {
                    let id = attribute(&e, b"numFmtId")?.and_then(|id| id.trim().parse().ok());
                    if let (Some(id), Some(code)) = (id, attribute(&e, b"formatCode")?) {
                        let code = unescape(&code).map(|c| c.into_owned()).unwrap_or_else(|_| code.clone());
                        custom_formats.insert(id, code);
                    }
                }
                b"xf" if in_cell_xfs => style_formats.push(
                    attribute(&e, b"numFmtId")?
                        .and_then(|id| id.trim().parse().ok())
                        .unwrap_or(0),
                ),
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = false,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(style_formats
        .into_iter()
        .map(|id| match custom_formats.get(&id) {
            Some(code) => is_date_format_code(code),
            None => is_builtin_date_format(id),
        })
        .collect())
}

fn is_builtin_date_format(id: u32) -> bool {
    matches!(id, 14..=22 | 45..=47)
}

/// A format code shows a date when a date or time token survives once
/// literals, colors and locale tags are removed.
pub fn is_date_format_code(code: &str) -> bool {
    let mut chars = code.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                for quoted in chars.by_ref() {
                    if quoted == '"' {
                        break;
                    }
                }
            }
            '\\' | '_' | '*' => {
                chars.next();
            }
            '[' => {
                let section: String = chars.by_ref().take_while(|&c| c != ']').collect();
                // `[h]:mm` style elapsed time
                if !section.is_empty()
                    && section.chars().all(|c| matches!(c.to_ascii_lowercase(), 'h' | 'm' | 's'))
                {
                    return true;
                }
            }
            ';' => return false,
            c if matches!(c.to_ascii_lowercase(), 'y' | 'm' | 'd' | 'h' | 's') => return true,
            _ => {}
        }
    }
    false
}

/// Serial day number (from 1899-12-30) for an ISO 8601 date or date time.
pub fn iso_to_serial(value: &str) -> Option<String> {
    let value = value.trim().trim_end_matches('Z');
    let (date, time) = match value.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (value, None),
    };

    let mut parts = date.splitn(3, '-');
    let year: i64 = parts.next()?.parse().ok()?;
    let month: i64 = parts.next()?.parse().ok()?;
    let day: i64 = parts.next()?.parse().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    let days = days_from_civil(year, month, day) - days_from_civil(1899, 12, 30);

    let seconds = match time {
        Some(time) => {
            let mut parts = time.splitn(3, ':');
            let hours: f64 = parts.next()?.parse().ok()?;
            let minutes: f64 = parts.next().unwrap_or("0").parse().ok()?;
            let seconds: f64 = parts.next().unwrap_or("0").parse().ok()?;
            hours * 3600.0 + minutes * 60.0 + seconds
        }
        None => 0.0,
    };

    if seconds == 0.0 {
        Some(days.to_string())
    } else {
        Some((days as f64 + seconds / 86_400.0).to_string())
    }
}

/// Days since 1970-01-01 in the proleptic Gregorian calendar.
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let year_of_era = year - era * 400;
    let day_of_year = (153 * ((month + 9) % 12) + 2) / 5 + day - 1;
    let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
    era * 146_097 + day_of_era - 719_468
}

/// Lookup tables shared by every cell of a sheet.
struct SheetContext<'a> {
    shared_strings: &'a [String],
    date_styles: &'a [bool],
}

impl SheetContext<'_> {
    fn is_date_style(&self, style: Option<usize>) -> bool {
        style.is_some_and(|index| self.date_styles.get(index).copied().unwrap_or(false))
    }
}

/// Cell being read from a worksheet.
#[derive(Default)]
struct PendingCell {
    column: u32,
    kind: Option<String>,
    style: Option<usize>,
    value: Option<String>,
    inline: Option<String>,
}

impl PendingCell {
    fn into_value(self, context: &SheetContext<'_>) -> Option<CellValue> {
        match self.kind.as_deref() {
            Some("s") => {
                let index: usize = self.value?.trim().parse().ok()?;
                context.shared_strings.get(index).cloned().map(CellValue::Text)
            }
            Some("d") => {
                let value = self.value?;
                Some(match iso_to_serial(&value) {
                    Some(serial) => CellValue::Date(serial),
                    None => CellValue::Text(value),
                })
            }
            Some("inlineStr") => self.inline.map(CellValue::Text),
            Some("str") => self.value.map(CellValue::Text),
            Some("b") => self
                .value
                .map(|v| CellValue::Bool(matches!(v.trim(), "1" | "true"))),
            Some("e") => self.value.map(CellValue::Error),
            _ => {
                let number = self.value.filter(|v| !v.trim().is_empty())?.trim().to_owned();
                if context.is_date_style(self.style) {
                    Some(CellValue::Date(number))
                } else {
                    Some(CellValue::Number(number))
                }
            }
        }
    }
}

/// Which text node of a cell is being read.
#[derive(Clone, Copy, PartialEq)]
enum TextTarget {
    None,
    Value,
    Inline,
}

fn parse_sheet(xml: &str, context: &SheetContext<'_>) -> Result<Vec<Row>, OoxmlError> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    let mut buf = Vec::new();

    let mut rows: BTreeMap<u32, Row> = BTreeMap::new();
    let mut row_index = 0u32;
    let mut row = Row::new();
    let mut last_column = 0u32;
    let mut cell: Option<PendingCell> = None;
    let mut target = TextTarget::None;
    let mut phonetic_depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => {
                    row_index = next_row_index(attribute(&e, b"r")?, row_index)?;
                    row = Row::new();
                    last_column = 0;
                }
                b"c" => {
                    let column = next_column(attribute(&e, b"r")?, last_column)?;
                    last_column = column;
                    cell = Some(PendingCell {
                        column,
                        kind: attribute(&e, b"t")?,
                        style: attribute(&e, b"s")?.and_then(|s| s.trim().parse().ok()),
                        ..Default::default()
                    });
                }
                b"v" => target = TextTarget::Value,
                b"t" if phonetic_depth == 0 => target = TextTarget::Inline,
                b"rPh" => phonetic_depth += 1,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"row" => {
                    row_index = next_row_index(attribute(&e, b"r")?, row_index)?;
                    rows.insert(row_index, Row::new());
                }
                b"c" => last_column = next_column(attribute(&e, b"r")?, last_column)?,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"row" => {
                    rows.insert(row_index, std::mem::take(&mut row));
                }
                b"c" => {
                    if let Some(pending) = cell.take() {
                        let column = pending.column;
                        if let Some(value) = pending.into_value(context) {
                            row.insert(column, value);
                        }
                    }
                }
                b"v" | b"t" => target = TextTarget::None,
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                _ => {}
            },
            Event::Text(e) => push_cell_text(&mut cell, target, &String::from_utf8_lossy(e.as_ref())),
            Event::CData(e) => push_cell_text(&mut cell, target, &String::from_utf8_lossy(e.as_ref())),
            Event::GeneralRef(e) => {
                if let Some(resolved) = resolve_reference(e.as_ref()) {
                    push_cell_text(&mut cell, target, &resolved);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let last_row = rows.keys().next_back().copied().unwrap_or(0);
    Ok((1..=last_row)
        .map(|index| rows.remove(&index).unwrap_or_default())
        .collect())
}

fn push_cell_text(cell: &mut Option<PendingCell>, target: TextTarget, text: &str) {
    let Some(cell) = cell.as_mut() else {
        return;
    };
    let slot = match target {
        TextTarget::Value => &mut cell.value,
        TextTarget::Inline => &mut cell.inline,
        TextTarget::None => return,
    };
    slot.get_or_insert_with(String::new).push_str(text);
}

/// Row number from a `<row r="..">` attribute, or the row after `previous`.
fn next_row_index(reference: Option<String>, previous: u32) -> Result<u32, OoxmlError> {
    let index = match reference {
        Some(r) => r
            .trim()
            .parse::<u64>()
            .map_err(|_| OoxmlError::InvalidSheet(format!("row number {r:?}")))?,
        None => u64::from(previous) + 1,
    };
    match u32::try_from(index) {
        Ok(index) if (1..=MAX_ROWS).contains(&index) => Ok(index),
        _ => Err(OoxmlError::InvalidSheet(format!(
            "row {index} is outside 1..={MAX_ROWS}"
        ))),
    }
}

fn next_column(reference: Option<String>, previous: u32) -> Result<u32, OoxmlError> {
    let column = reference
        .and_then(|r| column_index(&r))
        .unwrap_or(previous.saturating_add(1));
    if column > MAX_COLUMNS {
        return Err(OoxmlError::InvalidSheet(format!(
            "column {column} is outside 1..={MAX_COLUMNS}"
        )));
    }
    Ok(column)
}

/// 1-based column of an `A1`-style reference.
pub fn column_index(reference: &str) -> Option<u32> {
    let letters: Vec<u8> = reference
        .bytes()
        .take_while(u8::is_ascii_alphabetic)
        .map(|b| b.to_ascii_uppercase())
        .collect();
    if letters.is_empty() {
        return None;
    }
    letters.iter().try_fold(0u32, |index, letter| {
        index
            .checked_mul(26)?
            .checked_add(u32::from(letter - b'A') + 1)
    })
}

/// Letters for a 1-based column index: 1 → `A`, 27 → `AA`.
pub fn column_name(mut index: u32) -> String {
    let mut letters = Vec::new();
    while index > 0 {
        let remainder = (index - 1) % 26;
        letters.push(char::from(b'A' + remainder as u8));
        index = (index - 1) / 26;
    }
    letters.iter().rev().collect()
}

fn write_workbook(output_path: &Path, rows: &[Row]) -> Result<(), OoxmlError> {
    let mut sheet_data = String::new();
    for (offset, row) in rows.iter().enumerate() {
        if row.is_empty() {
            continue;
        }
        let row_number = offset + 1;
        sheet_data.push_str(&format!(r#"<row r="{row_number}">"#));
        for (column, value) in row {
            let reference = format!("{}{row_number}", column_name(*column));
            sheet_data.push_str(&cell_xml(&reference, value));
        }
        sheet_data.push_str("</row>");
    }

    let sheet = format!(
        r#"{XML_DECLARATION}
<worksheet xmlns="{SPREADSHEET_NS}"><sheetData>{sheet_data}</sheetData></worksheet>"#
    );
    let workbook = format!(
        r#"{XML_DECLARATION}
<workbook xmlns="{SPREADSHEET_NS}" xmlns:r="{DOCUMENT_RELATIONSHIPS_NS}"><sheets><sheet name="{OUTPUT_SHEET_NAME}" sheetId="1" r:id="rId1"/></sheets></workbook>"#
    );
    let workbook_rels = format!(
        r#"{XML_DECLARATION}
<Relationships xmlns="{RELATIONSHIPS_NS}"><Relationship Id="rId1" Type="{WORKSHEET_REL}" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="{STYLES_REL}" Target="styles.xml"/></Relationships>"#
    );
    let package_rels = format!(
        r#"{XML_DECLARATION}
<Relationships xmlns="{RELATIONSHIPS_NS}"><Relationship Id="rId1" Type="{OFFICE_DOCUMENT_REL}" Target="{DEFAULT_WORKBOOK_PART}"/></Relationships>"#
    );

    write_package(
        output_path,
        &[
            ("[Content_Types].xml", content_types()),
            ("_rels/.rels", package_rels),
            (DEFAULT_WORKBOOK_PART, workbook),
            ("xl/_rels/workbook.xml.rels", workbook_rels),
            ("xl/styles.xml", styles()),
            ("xl/worksheets/sheet1.xml", sheet),
        ],
    )
}

/// Minimal stylesheet: the default cell format plus one date format.
fn styles() -> String {
    format!(
        concat!(
            "{decl}\n",
            r#"<styleSheet xmlns="{ns}">"#,
            r#"<numFmts count="1"><numFmt numFmtId="{id}" formatCode="{code}"/></numFmts>"#,
            r#"<fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts>"#,
            r#"<fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>"#,
            r#"<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>"#,
            r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#,
            r#"<cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>"#,
            r#"<xf numFmtId="{id}" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/></cellXfs>"#,
            r#"<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>"#,
            "</styleSheet>"
        ),
        decl = XML_DECLARATION,
        ns = SPREADSHEET_NS,
        id = DATE_FORMAT_ID,
        code = DATE_FORMAT_CODE,
    )
}

fn cell_xml(reference: &str, value: &CellValue) -> String {
    match value {
        CellValue::Number(number) => format!(r#"<c r="{reference}"><v>{}</v></c>"#, escape(number)),
        CellValue::Text(text) => format!(
            r#"<c r="{reference}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
            escape(text)
        ),
        CellValue::Bool(flag) => format!(r#"<c r="{reference}" t="b"><v>{}</v></c>"#, u8::from(*flag)),
        CellValue::Error(code) => format!(r#"<c r="{reference}" t="e"><v>{}</v></c>"#, escape(code)),
        CellValue::Date(serial) => format!(
            r#"<c r="{reference}" s="{DATE_STYLE_INDEX}"><v>{}</v></c>"#,
            escape(serial)
        ),
    }
}

fn content_types() -> String {
    format!(
        concat!(
            "{}\n",
            r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
            r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
            r#"<Default Extension="xml" ContentType="application/xml"/>"#,
            r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
            r#"<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
            r#"<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#,
            "</Types>"
        ),
        XML_DECLARATION
    )
}
