//! Document content processing: text extraction, HTML rendering, and
//! building `DocumentMetadata` for an uploaded file.

use crate::models::{
    document::DocumentMetadata,
    file_type::{extension_of, stem_of},
};
use crate::services::ooxml::{self, OoxmlError};
use base64::{Engine as _, engine::general_purpose};
use chrono::Utc;
use pulldown_cmark::{Options, Parser, html};
use thiserror::Error;
use tracing::debug;

/// Extensions accepted for extraction and versioning.
pub const SUPPORTED_FILE_TYPES: [&str; 9] = [
    ".docx", ".doc", ".xlsx", ".xls", ".pptx", ".ppt", ".pdf", ".md", ".txt",
];

/// Description length taken from extracted text, in characters.
const DESCRIPTION_LIMIT: usize = 500;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Office packages may decompress to this multiple of the upload limit.
const PACKAGE_EXPANSION_FACTOR: u64 = 8;

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("unsupported file type `{0}`")]
    UnsupportedType(String),
    #[error("file is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },
    #[error("invalid inline content: {0}")]
    InvalidContent(#[from] base64::DecodeError),
    #[error(transparent)]
    Package(#[from] OoxmlError),
}

pub type ProcessingResult<T> = Result<T, ProcessingError>;

#[derive(Clone, Debug)]
pub struct DocumentProcessor {
    max_file_size: u64,
}

impl Default for DocumentProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FILE_SIZE)
    }
}

impl DocumentProcessor {
    pub fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    fn package_limit(&self) -> u64 {
        self.max_file_size.saturating_mul(PACKAGE_EXPANSION_FACTOR)
    }

    pub fn supported_file_types(&self) -> &'static [&'static str] {
        &SUPPORTED_FILE_TYPES
    }

    pub fn is_supported(&self, file_name: &str) -> bool {
        SUPPORTED_FILE_TYPES.contains(&extension_of(file_name).as_str())
    }

    /// Plain text of a document.
    ///
    /// Legacy binary Office formats and PDF are accepted but yield no text.
    pub fn extract_text(&self, content: &[u8], file_type: &str) -> ProcessingResult<String> {
        let file_type = file_type.to_ascii_lowercase();
        debug!("extracting text from {} bytes of {}", content.len(), file_type);
        match file_type.as_str() {
            ".docx" => Ok(ooxml::docx_text(content, self.package_limit())?),
            ".xlsx" => Ok(ooxml::xlsx_text(content, self.package_limit())?),
            ".pptx" => Ok(ooxml::pptx_text(content, self.package_limit())?),
            ".md" | ".txt" => Ok(String::from_utf8_lossy(content).into_owned()),
            ".doc" | ".xls" | ".ppt" | ".pdf" => Ok(String::new()),
            _ => Err(ProcessingError::UnsupportedType(file_type)),
        }
    }

    /// HTML rendering of a document.
    pub fn convert_to_html(&self, content: &[u8], file_type: &str) -> ProcessingResult<String> {
        match file_type.to_ascii_lowercase().as_str() {
            ".md" => Ok(markdown_to_html(&String::from_utf8_lossy(content))),
            ".docx" => {
                let text = ooxml::docx_text(content, self.package_limit())?;
                let mut out = String::from("<div class=\"document-content\">");
                for line in text.lines().filter(|l| !l.trim().is_empty()) {
                    out.push_str("<p>");
                    out.push_str(&html_escape(line));
                    out.push_str("</p>");
                }
                out.push_str("</div>");
                Ok(out)
            }
            other => {
                let text = self.extract_text(content, other)?;
                Ok(format!("<pre>{}</pre>", html_escape(&text)))
            }
        }
    }

    /// Build metadata for an uploaded file, keeping its bytes inline.
    ///
    /// When `extract_text` is set the description is the first 500
    /// characters of the document text.
    pub fn process_file(
        &self,
        file_name: &str,
        content: &[u8],
        extract_text: bool,
    ) -> ProcessingResult<DocumentMetadata> {
        let file_type = extension_of(file_name);
        if !self.is_supported(file_name) {
            return Err(ProcessingError::UnsupportedType(file_type));
        }
        let size = content.len() as u64;
        if size > self.max_file_size {
            return Err(ProcessingError::TooLarge {
                size,
                limit: self.max_file_size,
            });
        }

        let description = if extract_text {
            truncate_description(&self.extract_text(content, &file_type)?)
        } else {
            String::new()
        };

        Ok(DocumentMetadata {
            title: stem_of(file_name),
            file_name: file_name.to_string(),
            file_type,
            file_size: size,
            description,
            modified_date: Utc::now(),
            content_base64: Some(general_purpose::STANDARD.encode(content)),
            ..Default::default()
        })
    }

    /// Decode a document's inline content, if it has any.
    pub fn inline_content(&self, document: &DocumentMetadata) -> ProcessingResult<Option<Vec<u8>>> {
        document
            .content_base64
            .as_deref()
            .map(|encoded| general_purpose::STANDARD.decode(encoded))
            .transpose()
            .map_err(ProcessingError::from)
    }
}

fn truncate_description(text: &str) -> String {
    if text.chars().count() > DESCRIPTION_LIMIT {
        let mut short: String = text.chars().take(DESCRIPTION_LIMIT).collect();
        short.push_str("...");
        short
    } else {
        text.to_string()
    }
}

fn markdown_to_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_FOOTNOTES;
    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

pub(crate) fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ooxml::tests::docx;

    #[test]
    fn supported_types_match_by_extension() {
        let processor = DocumentProcessor::default();
        assert!(processor.is_supported("notes.MD"));
        assert!(processor.is_supported("deck.pptx"));
        assert!(!processor.is_supported("photo.png"));
        assert!(!processor.is_supported("no_extension"));
    }

    #[test]
    fn extracts_plain_formats() {
        let processor = DocumentProcessor::default();
        assert_eq!(processor.extract_text(b"# Title", ".md").unwrap(), "# Title");
        assert_eq!(processor.extract_text(b"plain", ".TXT").unwrap(), "plain");
        assert_eq!(processor.extract_text(b"%PDF-1.4", ".pdf").unwrap(), "");
        assert!(matches!(
            processor.extract_text(b"", ".exe"),
            Err(ProcessingError::UnsupportedType(_))
        ));
    }

    #[test]
    fn markdown_renders_to_html() {
        let processor = DocumentProcessor::default();
        let html = processor
            .convert_to_html(b"# Title\n\n| a | b |\n|---|---|\n| 1 | 2 |\n", ".md")
            .unwrap();
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<table>"));
    }

    #[test]
    fn docx_renders_paragraphs() {
        let processor = DocumentProcessor::default();
        let html = processor
            .convert_to_html(&docx(&["first", "a &lt; b"]), ".docx")
            .unwrap();
        assert_eq!(
            html,
            "<div class=\"document-content\"><p>first</p><p>a &lt; b</p></div>"
        );
    }

    #[test]
    fn text_renders_preformatted_and_escaped() {
        let processor = DocumentProcessor::default();
        let html = processor.convert_to_html(b"<b>x</b>", ".txt").unwrap();
        assert_eq!(html, "<pre>&lt;b&gt;x&lt;/b&gt;</pre>");
    }

    #[test]
    fn process_file_fills_metadata() {
        let processor = DocumentProcessor::default();
        let doc = processor.process_file("Guide.md", b"hello world", true).unwrap();

        assert_eq!(doc.title, "Guide");
        assert_eq!(doc.file_name, "Guide.md");
        assert_eq!(doc.file_type, ".md");
        assert_eq!(doc.file_size, 11);
        assert_eq!(doc.description, "hello world");
        assert_eq!(
            processor.inline_content(&doc).unwrap().as_deref(),
            Some(&b"hello world"[..])
        );
        assert!(doc.is_current());
    }

    #[test]
    fn long_descriptions_are_truncated_by_characters() {
        let processor = DocumentProcessor::default();
        let text = "é".repeat(600);
        let doc = processor.process_file("long.txt", text.as_bytes(), true).unwrap();
        assert_eq!(doc.description.chars().count(), DESCRIPTION_LIMIT + 3);
        assert!(doc.description.ends_with("..."));
    }

    #[test]
    fn compressed_bombs_are_refused() {
        let processor = DocumentProcessor::new(2 * 1024);
        let bomb = docx(&[&"z".repeat(64 * 1024)]);
        assert!((bomb.len() as u64) < processor.max_file_size());

        assert!(matches!(
            processor.process_file("bomb.docx", &bomb, true),
            Err(ProcessingError::Package(OoxmlError::TooLarge { limit: 16384, .. }))
        ));
        assert!(processor.process_file("bomb.docx", &bomb, false).is_ok());
    }

    #[test]
    fn process_file_enforces_type_and_size() {
        let processor = DocumentProcessor::new(4);
        assert!(matches!(
            processor.process_file("image.png", b"x", true),
            Err(ProcessingError::UnsupportedType(_))
        ));
        assert!(matches!(
            processor.process_file("big.txt", b"12345", false),
            Err(ProcessingError::TooLarge { size: 5, limit: 4 })
        ));
    }
}
