//! Text extraction for ingested files.

use std::path::Path;

use docx_rs::{DocumentChild, ParagraphChild, RunChild};
use pulldown_cmark::{Event, Parser as MarkdownParser, TagEnd};
use tracing::debug;

use rag_core::{Parser, RagError, Result};

/// File formats the parser understands, by lowercased extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    PlainText,
    Markdown,
    Pdf,
    Docx,
}

impl Format {
    const ALL: [(&'static str, Format); 5] = [
        ("txt", Format::PlainText),
        ("md", Format::Markdown),
        ("markdown", Format::Markdown),
        ("pdf", Format::Pdf),
        ("docx", Format::Docx),
    ];

    fn of(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        Self::ALL
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, format)| *format)
    }
}

/// Extracts text from PDF, DOCX, plain-text and Markdown files.
///
/// PDF page texts and DOCX paragraphs are joined by newlines. Markdown is
/// rendered to plain text: markup is dropped and block elements are
/// separated by blank lines.
#[derive(Debug, Clone, Default)]
pub struct FileParser;

impl FileParser {
    pub fn new() -> Self {
        Self
    }

    /// Lowercased extensions this parser accepts.
    pub fn supported_extensions() -> impl Iterator<Item = &'static str> {
        Format::ALL.iter().map(|(ext, _)| *ext)
    }
}

impl Parser for FileParser {
    fn parse(&self, path: &Path) -> Result<String> {
        let format = Format::of(path)
            .ok_or_else(|| RagError::unsupported_file_type(path.display().to_string()))?;

        let text = match format {
            Format::PlainText => read_text(path)?,
            Format::Markdown => markdown_to_text(&read_text(path)?),
            Format::Pdf => pdf_to_text(path)?,
            Format::Docx => {
                let bytes = std::fs::read(path).map_err(|e| read_error(path, e))?;
                docx_to_text(&bytes).map_err(|e| {
                    RagError::document_processing(format!("{}: {}", path.display(), e))
                })?
            }
        };

        debug!("Extracted {} characters from {:?}", text.len(), path);
        Ok(text.trim().to_string())
    }

    fn supports(&self, path: &Path) -> bool {
        Format::of(path).is_some()
    }
}

fn read_error(path: &Path, e: impl std::fmt::Display) -> RagError {
    RagError::document_processing(format!("Failed to read {}: {}", path.display(), e))
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| read_error(path, e))
}

/// Text of every page, in page order, one page per line group.
fn pdf_to_text(path: &Path) -> Result<String> {
    let document = lopdf::Document::load(path).map_err(|e| read_error(path, e))?;

    let mut pages = Vec::new();
    for page_number in document.get_pages().keys() {
        let text = document.extract_text(&[*page_number]).map_err(|e| {
            RagError::document_processing(format!(
                "Failed to extract page {} of {}: {}",
                page_number,
                path.display(),
                e
            ))
        })?;
        pages.push(text);
    }

    Ok(pages.join("\n"))
}

/// Text of the body paragraphs of a DOCX archive, one paragraph per line.
pub fn docx_to_text(bytes: &[u8]) -> std::result::Result<String, docx_rs::ReaderError> {
    let docx = docx_rs::read_docx(bytes)?;

    let paragraphs: Vec<String> = docx
        .document
        .children
        .iter()
        .filter_map(|child| match child {
            DocumentChild::Paragraph(paragraph) => {
                let mut text = String::new();
                push_runs(&paragraph.children, &mut text);
                Some(text)
            }
            _ => None,
        })
        .collect();

    Ok(paragraphs.join("\n"))
}

fn push_runs(children: &[ParagraphChild], out: &mut String) {
    for child in children {
        match child {
            ParagraphChild::Run(run) => {
                for run_child in &run.children {
                    if let RunChild::Text(text) = run_child {
                        out.push_str(&text.text);
                    }
                }
            }
            ParagraphChild::Hyperlink(link) => push_runs(&link.children, out),
            _ => {}
        }
    }
}

/// Render Markdown to plain text.
pub fn markdown_to_text(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());

    for event in MarkdownParser::new(markdown) {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::CodeBlock
                | TagEnd::BlockQuote
                | TagEnd::Item,
            ) => {
                if !out.ends_with("\n\n") {
                    out.push_str(if out.ends_with('\n') { "\n" } else { "\n\n" });
                }
            }
            _ => {}
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use docx_rs::{Docx, Paragraph, Run};
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    /// Single-page PDF showing `line` in Courier.
    fn write_pdf(path: &Path, line: &str) {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(line)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    #[test]
    fn test_parse_plain_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "  Section 1 text.\n\nSection 2 text.  \n").unwrap();

        let text = FileParser::new().parse(&path).unwrap();
        assert_eq!(text, "Section 1 text.\n\nSection 2 text.");
    }

    #[test]
    fn test_parse_markdown_strips_markup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("README.MD");
        fs::write(&path, "# Title\n\nSome *emphasis* and `code`.\n\n- one\n- two\n").unwrap();

        let text = FileParser::new().parse(&path).unwrap();
        assert!(text.starts_with("Title\n\nSome emphasis and code."));
        assert!(text.contains("one"));
        assert!(!text.contains('#'));
        assert!(!text.contains('*'));
    }

    #[test]
    fn test_parse_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contract.pdf");
        write_pdf(&path, "Thirty days written notice");

        let text = FileParser::new().parse(&path).unwrap();
        assert!(text.contains("Thirty days written notice"), "{:?}", text);
        assert_eq!(text, text.trim());
    }

    #[test]
    fn test_parse_docx_joins_paragraphs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Policy.DOCX");
        Docx::new()
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Refunds within 30 days.")))
            .add_paragraph(
                Paragraph::new()
                    .add_run(Run::new().add_text("Contact "))
                    .add_run(Run::new().add_text("support.")),
            )
            .build()
            .pack(fs::File::create(&path).unwrap())
            .unwrap();

        let text = FileParser::new().parse(&path).unwrap();
        assert!(
            text.contains("Refunds within 30 days.\nContact support."),
            "{:?}",
            text
        );
    }

    #[test]
    fn test_corrupt_pdf_and_docx_are_processing_errors() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["broken.pdf", "broken.docx"] {
            let path = dir.path().join(name);
            fs::write(&path, "this is not the format it claims").unwrap();

            let err = FileParser::new().parse(&path).unwrap_err();
            assert_eq!(err.error_code(), "DOCUMENT_PROCESSING_ERROR", "{}", name);
        }
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sheet.xlsx");
        fs::write(&path, "binary").unwrap();

        let err = FileParser::new().parse(&path).unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_FILE_TYPE");
    }

    #[test]
    fn test_missing_file_is_processing_error() {
        let err = FileParser::new()
            .parse(Path::new("/nonexistent/file.txt"))
            .unwrap_err();
        assert_eq!(err.error_code(), "DOCUMENT_PROCESSING_ERROR");
    }

    #[test]
    fn test_invalid_utf8_is_processing_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        fs::write(&path, [0xff, 0xfe, 0xfd]).unwrap();

        let err = FileParser::new().parse(&path).unwrap_err();
        assert_eq!(err.error_code(), "DOCUMENT_PROCESSING_ERROR");
    }

    #[test]
    fn test_supports() {
        let parser = FileParser::new();
        assert!(parser.supports(Path::new("a.txt")));
        assert!(parser.supports(Path::new("a.Markdown")));
        assert!(parser.supports(Path::new("contract.pdf")));
        assert!(parser.supports(Path::new("policy.DOCX")));
        assert!(!parser.supports(Path::new("sheet.xlsx")));
        assert!(!parser.supports(Path::new("Makefile")));
    }
}
