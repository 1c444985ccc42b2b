//! Plain-text extraction from Office Open XML containers (docx/xlsx/pptx).
//!
//! The packages are zip archives of XML parts. Only the text-bearing elements
//! are read; formatting, styles and embedded media are ignored. The XML
//! scanner below understands just enough of the syntax for these parts:
//! start/end/empty tags, quoted attributes, text, CDATA sections and the
//! predefined entities.
//!
//! Decompressed output is bounded: every read counts against a budget shared
//! by all parts of one package.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use thiserror::Error;
use tracing::warn;
use zip::{ZipArchive, result::ZipError};

#[derive(Debug, Error)]
pub enum OoxmlError {
    #[error("could not read document package: {0}")]
    Zip(#[from] ZipError),
    #[error("package part `{part}` expands beyond {limit} bytes")]
    TooLarge { part: String, limit: u64 },
}

pub type OoxmlResult<T> = Result<T, OoxmlError>;

#[derive(Debug, PartialEq)]
enum XmlEvent<'a> {
    Start { name: &'a str, attrs: &'a str },
    End { name: &'a str },
    Empty { name: &'a str, attrs: &'a str },
    /// Character data with entities still encoded.
    Text(&'a str),
    /// Contents of a CDATA section, taken literally.
    CData(&'a str),
}

impl XmlEvent<'_> {
    /// Decoded character content, if this event carries any.
    fn text(&self) -> Option<String> {
        match self {
            XmlEvent::Text(text) => Some(unescape(text)),
            XmlEvent::CData(text) => Some((*text).to_string()),
            _ => None,
        }
    }
}

/// Iterator over the tags and text of an XML document.
struct XmlEvents<'a> {
    rest: &'a str,
}

impl<'a> XmlEvents<'a> {
    fn new(xml: &'a str) -> Self {
        Self { rest: xml }
    }
}

/// Offset of the `>` closing the tag at the start of `tag`, skipping any
/// inside quoted attribute values.
fn tag_end(tag: &str) -> Option<usize> {
    let mut quote = None;
    for (pos, ch) in tag.char_indices().skip(1) {
        match (quote, ch) {
            (Some(open), ch) if ch == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '>') => return Some(pos),
            (None, _) => {}
        }
    }
    None
}

impl<'a> Iterator for XmlEvents<'a> {
    type Item = XmlEvent<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.rest.is_empty() {
                return None;
            }

            if !self.rest.starts_with('<') {
                let end = self.rest.find('<').unwrap_or(self.rest.len());
                let (text, rest) = self.rest.split_at(end);
                self.rest = rest;
                return Some(XmlEvent::Text(text));
            }

            if let Some(section) = self.rest.strip_prefix("<![CDATA[") {
                let (data, rest) = match section.find("]]>") {
                    Some(pos) => (&section[..pos], &section[pos + 3..]),
                    None => (section, ""),
                };
                self.rest = rest;
                return Some(XmlEvent::CData(data));
            }

            // Declarations, comments and processing instructions carry no
            // document text.
            if self.rest.starts_with("<?") || self.rest.starts_with("<!") {
                let terminator = if self.rest.starts_with("<!--") {
                    "-->"
                } else {
                    ">"
                };
                match self.rest.find(terminator) {
                    Some(pos) => self.rest = &self.rest[pos + terminator.len()..],
                    None => self.rest = "",
                }
                continue;
            }

            let close = tag_end(self.rest)?;
            let inner = &self.rest[1..close];
            self.rest = &self.rest[close + 1..];

            if let Some(name) = inner.strip_prefix('/') {
                return Some(XmlEvent::End { name: name.trim() });
            }

            let (body, empty) = match inner.strip_suffix('/') {
                Some(body) => (body, true),
                None => (inner, false),
            };
            let (name, attrs) = match body.find(char::is_whitespace) {
                Some(pos) => (&body[..pos], body[pos..].trim()),
                None => (body, ""),
            };
            return Some(if empty {
                XmlEvent::Empty { name, attrs }
            } else {
                XmlEvent::Start { name, attrs }
            });
        }
    }
}

/// Value of attribute `name` in a raw attribute string.
fn attribute<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    let mut rest = attrs;
    while let Some(eq) = rest.find('=') {
        let key = rest[..eq].trim();
        let after = rest[eq + 1..].trim_start();
        let quote = after.chars().next()?;
        if quote != '"' && quote != '\'' {
            return None;
        }
        let value_end = after[1..].find(quote)? + 1;
        if key == name {
            return Some(&after[1..value_end]);
        }
        rest = &after[value_end + 1..];
    }
    None
}

/// Decode the predefined XML entities and numeric character references.
fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let Some(semi) = rest.find(';') else {
            break;
        };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(ch) => {
                out.push(ch);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Text of every `text_tag` element, one line per `paragraph_tag` element.
fn paragraph_text(xml: &str, text_tag: &str, paragraph_tag: &str) -> String {
    let mut out = String::new();
    let mut line = String::new();
    let mut in_text = false;

    for event in XmlEvents::new(xml) {
        match event {
            XmlEvent::Start { name, .. } if name == text_tag => in_text = true,
            XmlEvent::End { name } if name == text_tag => in_text = false,
            XmlEvent::End { name } if name == paragraph_tag => {
                out.push_str(&line);
                out.push('\n');
                line.clear();
            }
            ref other if in_text => {
                if let Some(text) = other.text() {
                    line.push_str(&text);
                }
            }
            _ => {}
        }
    }
    if !line.is_empty() {
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn too_large(part: &str, limit: u64) -> OoxmlError {
    warn!("package part {} exceeds the {} byte budget", part, limit);
    OoxmlError::TooLarge {
        part: part.to_string(),
        limit,
    }
}

/// An opened package plus what is left of its decompression budget.
struct Package<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
    limit: u64,
    remaining: u64,
}

impl<'a> Package<'a> {
    fn open(content: &'a [u8], limit: u64) -> OoxmlResult<Self> {
        Ok(Self {
            archive: ZipArchive::new(Cursor::new(content))?,
            limit,
            remaining: limit,
        })
    }

    /// Contents of part `name`, or `None` when the package lacks it.
    fn read_part(&mut self, name: &str) -> OoxmlResult<Option<String>> {
        let file = match self.archive.by_name(name) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if file.size() > self.remaining {
            return Err(too_large(name, self.limit));
        }

        // The declared size is not trusted: read at most one byte past the
        // budget to detect overruns.
        let mut bytes = Vec::new();
        file.take(self.remaining.saturating_add(1))
            .read_to_end(&mut bytes)
            .map_err(ZipError::Io)?;
        let read = bytes.len() as u64;
        if read > self.remaining {
            return Err(too_large(name, self.limit));
        }
        self.remaining -= read;
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Part names matching `prefix{N}.xml`, ordered by N.
    fn numbered_parts(&self, prefix: &str) -> Vec<String> {
        let mut parts: Vec<(u32, String)> = self
            .archive
            .file_names()
            .filter_map(|name| {
                let number = name.strip_prefix(prefix)?.strip_suffix(".xml")?;
                Some((number.parse().ok()?, name.to_string()))
            })
            .collect();
        parts.sort();
        parts.into_iter().map(|(_, name)| name).collect()
    }
}

/// Paragraph text of a Word document body. At most `limit` bytes are
/// decompressed.
pub fn docx_text(content: &[u8], limit: u64) -> OoxmlResult<String> {
    let mut package = Package::open(content, limit)?;
    Ok(package
        .read_part("word/document.xml")?
        .map(|xml| paragraph_text(&xml, "w:t", "w:p"))
        .unwrap_or_default())
}

/// Paragraph text of every slide, in slide order.
pub fn pptx_text(content: &[u8], limit: u64) -> OoxmlResult<String> {
    let mut package = Package::open(content, limit)?;
    let mut out = String::new();
    for part in package.numbered_parts("ppt/slides/slide") {
        if let Some(xml) = package.read_part(&part)? {
            out.push_str(&paragraph_text(&xml, "a:t", "a:p"));
        }
    }
    Ok(out)
}

/// Cell values of every worksheet, one line per row, cells separated by a
/// space. Shared-string cells are resolved to their text.
pub fn xlsx_text(content: &[u8], limit: u64) -> OoxmlResult<String> {
    let mut package = Package::open(content, limit)?;
    let shared = package
        .read_part("xl/sharedStrings.xml")?
        .map(|xml| shared_strings(&xml))
        .unwrap_or_default();

    let mut out = String::new();
    for part in package.numbered_parts("xl/worksheets/sheet") {
        if let Some(xml) = package.read_part(&part)? {
            out.push_str(&sheet_text(&xml, &shared));
        }
    }
    Ok(out)
}

fn shared_strings(xml: &str) -> Vec<String> {
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    for event in XmlEvents::new(xml) {
        match event {
            XmlEvent::Start { name: "si", .. } => current.clear(),
            XmlEvent::End { name: "si" } => strings.push(std::mem::take(&mut current)),
            XmlEvent::Start { name: "t", .. } => in_text = true,
            XmlEvent::End { name: "t" } => in_text = false,
            ref other if in_text => {
                if let Some(text) = other.text() {
                    current.push_str(&text);
                }
            }
            _ => {}
        }
    }
    strings
}

fn sheet_text(xml: &str, shared: &[String]) -> String {
    let lookup: HashMap<usize, &str> = shared
        .iter()
        .enumerate()
        .map(|(idx, s)| (idx, s.as_str()))
        .collect();

    let mut out = String::new();
    let mut cell_is_shared = false;
    let mut in_value = false;
    let mut in_inline = false;
    let mut value = String::new();

    for event in XmlEvents::new(xml) {
        match event {
            XmlEvent::Start { name: "c", attrs } => {
                cell_is_shared = attribute(attrs, "t") == Some("s");
                value.clear();
            }
            XmlEvent::End { name: "c" } => {
                let text = if cell_is_shared {
                    value
                        .trim()
                        .parse::<usize>()
                        .ok()
                        .and_then(|idx| lookup.get(&idx).copied())
                        .unwrap_or("")
                } else {
                    value.as_str()
                };
                if !text.is_empty() {
                    out.push_str(text);
                    out.push(' ');
                }
            }
            XmlEvent::Start { name: "v", .. } => in_value = true,
            XmlEvent::End { name: "v" } => in_value = false,
            XmlEvent::Start { name: "t", .. } => in_inline = true,
            XmlEvent::End { name: "t" } => in_inline = false,
            XmlEvent::End { name: "row" } => out.push('\n'),
            ref other if in_value || in_inline => {
                if let Some(text) = other.text() {
                    value.push_str(&text);
                }
            }
            _ => {}
        }
    }
    out
}
