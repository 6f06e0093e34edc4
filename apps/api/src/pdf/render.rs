//! Minimal single-column renderer for CVs that have no uploaded original.
//!
//! A4, Helvetica and Helvetica-Bold, greedy wrapping, page breaks when the
//! cursor reaches the bottom margin. Output is plain on purpose: it has to be
//! readable by ATS parsers, not pretty.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use serde_json::Value;

use crate::pdf::font::winansi_encode;
use crate::pdf::font_metrics::{get_metrics, StandardFont};
use crate::pdf::PatchError;

const PAGE_WIDTH: f32 = 595.28;
const PAGE_HEIGHT: f32 = 841.89;
/// 2 cm.
const MARGIN: f32 = 56.69;
const LINE_HEIGHT_FACTOR: f32 = 1.3;

const TITLE_SIZE: f32 = 22.0;
const HEADING_SIZE: f32 = 13.0;
const BODY_SIZE: f32 = 10.0;
const MUTED_SIZE: f32 = 9.0;
const MUTED_GRAY: f32 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emphasis {
    Normal,
    Bold,
    /// Smaller gray text for dates and locations.
    Muted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Paragraph {
    pub text: String,
    pub emphasis: Emphasis,
}

impl Paragraph {
    pub fn normal(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            emphasis: Emphasis::Normal,
        }
    }

    pub fn bold(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            emphasis: Emphasis::Bold,
        }
    }

    pub fn muted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            emphasis: Emphasis::Muted,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlainSection {
    pub heading: String,
    pub paragraphs: Vec<Paragraph>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlainDocument {
    pub title: String,
    pub subtitle: Option<String>,
    pub sections: Vec<PlainSection>,
}

// ────────────────────────────────────────────────────────────────────────────
// CV content → document
// ────────────────────────────────────────────────────────────────────────────

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Strings of a JSON array; objects contribute their `name` or `word` field.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Object(_) => str_field(item, "name")
                    .or_else(|| str_field(item, "word"))
                    .map(str::to_string),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

impl PlainDocument {
    /// Builds sections from a CV content object. Unknown keys are ignored.
    pub fn from_cv_content(title: &str, content: &Value) -> Self {
        let contact = content.get("contact_info").unwrap_or(&Value::Null);
        let doc_title = str_field(contact, "name").unwrap_or(title).to_string();
        let contact_parts: Vec<&str> = ["email", "phone", "location"]
            .iter()
            .filter_map(|k| str_field(contact, k))
            .collect();
        let subtitle = (!contact_parts.is_empty()).then(|| contact_parts.join(" | "));

        let mut sections = Vec::new();

        if let Some(summary) = str_field(content, "summary") {
            sections.push(PlainSection {
                heading: "Professional Summary".into(),
                paragraphs: vec![Paragraph::normal(summary)],
            });
        }

        if let Some(Value::Array(items)) = content.get("experience") {
            let mut paragraphs = Vec::new();
            for exp in items {
                let mut head = str_field(exp, "job_title").unwrap_or_default().to_string();
                if let Some(company) = str_field(exp, "company") {
                    head = if head.is_empty() {
                        company.to_string()
                    } else {
                        format!("{head} - {company}")
                    };
                }
                if !head.is_empty() {
                    paragraphs.push(Paragraph::bold(head));
                }

                let mut dates = String::new();
                if let Some(start) = str_field(exp, "start_date") {
                    dates.push_str(start);
                    if let Some(end) = str_field(exp, "end_date") {
                        dates.push_str(&format!(" - {end}"));
                    } else if exp.get("current").and_then(Value::as_bool) == Some(true) {
                        dates.push_str(" - Present");
                    }
                }
                if let Some(location) = str_field(exp, "location") {
                    dates.push_str(&format!(" | {location}"));
                }
                if !dates.is_empty() {
                    paragraphs.push(Paragraph::muted(dates));
                }

                for bullet in string_list(exp.get("bullets")) {
                    paragraphs.push(Paragraph::normal(format!("• {bullet}")));
                }
            }
            if !paragraphs.is_empty() {
                sections.push(PlainSection {
                    heading: "Experience".into(),
                    paragraphs,
                });
            }
        }

        if let Some(Value::Array(items)) = content.get("education") {
            let mut paragraphs = Vec::new();
            for edu in items {
                let mut line = str_field(edu, "degree").unwrap_or_default().to_string();
                if let Some(field) = str_field(edu, "field") {
                    line.push_str(&format!(" in {field}"));
                }
                if let Some(school) = str_field(edu, "school") {
                    line.push_str(&format!(" - {school}"));
                }
                let line = line.trim().to_string();
                if !line.is_empty() {
                    paragraphs.push(Paragraph::bold(line));
                }
                if let Some(date) = str_field(edu, "graduation_date") {
                    paragraphs.push(Paragraph::muted(date));
                }
            }
            if !paragraphs.is_empty() {
                sections.push(PlainSection {
                    heading: "Education".into(),
                    paragraphs,
                });
            }
        }

        for (key, heading) in [("skills", "Skills"), ("languages", "Languages")] {
            let items = string_list(content.get(key));
            if !items.is_empty() {
                sections.push(PlainSection {
                    heading: heading.into(),
                    paragraphs: vec![Paragraph::normal(items.join(" • "))],
                });
            }
        }

        let certifications = string_list(content.get("certifications"));
        if !certifications.is_empty() {
            sections.push(PlainSection {
                heading: "Certifications".into(),
                paragraphs: certifications
                    .into_iter()
                    .map(|c| Paragraph::normal(format!("• {c}")))
                    .collect(),
            });
        }

        Self {
            title: doc_title,
            subtitle,
            sections,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Rendering
// ────────────────────────────────────────────────────────────────────────────

struct PageWriter {
    pages: Vec<Vec<Operation>>,
    /// Distance of the next baseline from the top edge.
    cursor: f32,
}

impl PageWriter {
    fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
            cursor: MARGIN,
        }
    }

    fn ops(&mut self) -> &mut Vec<Operation> {
        if self.pages.is_empty() {
            self.pages.push(Vec::new());
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn gap(&mut self, points: f32) {
        self.cursor += points;
    }

    /// Writes `text` wrapped to the content width, breaking pages as needed.
    fn write(&mut self, text: &str, font: StandardFont, size: f32, gray: f32) {
        let metrics = get_metrics(&font);
        let line_height = size * LINE_HEIGHT_FACTOR;
        let resource = if font == StandardFont::HelveticaBold { "F2" } else { "F1" };

        for line in metrics.wrap_lines(text, PAGE_WIDTH - 2.0 * MARGIN, size) {
            if self.cursor + line_height > PAGE_HEIGHT - MARGIN {
                self.pages.push(Vec::new());
                self.cursor = MARGIN;
            }
            self.cursor += line_height;
            let y = PAGE_HEIGHT - self.cursor;
            let bytes: Vec<u8> = line.chars().map(|c| winansi_encode(c).unwrap_or(b'?')).collect();
            self.ops().extend([
                Operation::new("BT", vec![]),
                Operation::new("g", vec![Object::Real(gray.into())]),
                Operation::new("Tf", vec![Object::Name(resource.into()), Object::Real(size.into())]),
                Operation::new("Td", vec![Object::Real(MARGIN.into()), Object::Real(y.into())]),
                Operation::new("Tj", vec![Object::String(bytes, StringFormat::Literal)]),
                Operation::new("ET", vec![]),
            ]);
        }
    }
}

/// Renders `doc` to PDF bytes.
pub fn render_plain_pdf(doc: &PlainDocument) -> Result<Vec<u8>, PatchError> {
    let mut writer = PageWriter::new();

    let title = if doc.title.trim().is_empty() { "CV" } else { doc.title.trim() };
    writer.write(title, StandardFont::HelveticaBold, TITLE_SIZE, 0.0);
    if let Some(subtitle) = &doc.subtitle {
        writer.write(subtitle, StandardFont::Helvetica, BODY_SIZE, 0.0);
    }
    writer.gap(12.0);

    for section in &doc.sections {
        writer.gap(6.0);
        writer.write(&section.heading, StandardFont::HelveticaBold, HEADING_SIZE, 0.0);
        writer.gap(4.0);
        for paragraph in &section.paragraphs {
            match paragraph.emphasis {
                Emphasis::Normal => writer.write(&paragraph.text, StandardFont::Helvetica, BODY_SIZE, 0.0),
                Emphasis::Bold => writer.write(&paragraph.text, StandardFont::HelveticaBold, BODY_SIZE, 0.0),
                Emphasis::Muted => writer.write(&paragraph.text, StandardFont::Helvetica, MUTED_SIZE, MUTED_GRAY),
            }
        }
    }

    assemble(writer.pages)
}

fn assemble(pages: Vec<Vec<Operation>>) -> Result<Vec<u8>, PatchError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font = |base: StandardFont| {
        dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => base.base_font_name(),
            "Encoding" => "WinAnsiEncoding",
        }
    };
    let regular_id = doc.add_object(font(StandardFont::Helvetica));
    let bold_id = doc.add_object(font(StandardFont::HelveticaBold));
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for operations in pages {
        let data = Content { operations }
            .encode()
            .map_err(|e| PatchError::Rendering(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, data));
        let page_id: ObjectId = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Real(PAGE_WIDTH.into()), Object::Real(PAGE_HEIGHT.into())],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| PatchError::Rendering(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::lopdf_surface::LopdfSurface;
    use crate::pdf::surface::PdfSurface;
    use serde_json::json;

    #[test]
    fn test_from_cv_content_builds_sections_in_order() {
        let content = json!({
            "contact_info": {"name": "Jane Doe", "email": "jane@example.com", "location": "Lyon"},
            "summary": "Backend engineer.",
            "experience": [{
                "job_title": "Engineer",
                "company": "Acme",
                "start_date": "2020",
                "current": true,
                "bullets": ["Built APIs"]
            }],
            "skills": ["Rust", {"name": "Go"}, ""],
        });

        let doc = PlainDocument::from_cv_content("My CV", &content);

        assert_eq!(doc.title, "Jane Doe");
        assert_eq!(doc.subtitle.as_deref(), Some("jane@example.com | Lyon"));
        let headings: Vec<&str> = doc.sections.iter().map(|s| s.heading.as_str()).collect();
        assert_eq!(headings, vec!["Professional Summary", "Experience", "Skills"]);
        assert_eq!(doc.sections[1].paragraphs[0], Paragraph::bold("Engineer - Acme"));
        assert_eq!(doc.sections[1].paragraphs[1], Paragraph::muted("2020 - Present"));
        assert_eq!(doc.sections[2].paragraphs[0].text, "Rust • Go");
    }

    #[test]
    fn test_from_cv_content_falls_back_to_title() {
        let doc = PlainDocument::from_cv_content("Data CV", &json!({}));
        assert_eq!(doc.title, "Data CV");
        assert!(doc.sections.is_empty());
        assert!(doc.subtitle.is_none());
    }

    #[test]
    fn test_rendered_pdf_is_searchable() {
        let doc = PlainDocument {
            title: "Jane Doe".into(),
            subtitle: None,
            sections: vec![PlainSection {
                heading: "Skills".into(),
                paragraphs: vec![Paragraph::normal("Rust • PostgreSQL")],
            }],
        };
        let bytes = render_plain_pdf(&doc).expect("render");
        assert!(bytes.starts_with(b"%PDF-"));

        let mut surface = LopdfSurface::open(&bytes).expect("open");
        let text = surface.page_text(0).expect("text");
        assert!(text.contains("Jane Doe"));
        assert!(text.contains("Rust • PostgreSQL"), "got {text}");
        let page = surface.page_rect(0).expect("rect");
        assert!((page.width() - PAGE_WIDTH).abs() < 0.01);
    }

    #[test]
    fn test_long_content_breaks_pages() {
        let paragraphs = (0..120).map(|i| Paragraph::normal(format!("Bullet number {i}"))).collect();
        let doc = PlainDocument {
            title: "Long".into(),
            subtitle: None,
            sections: vec![PlainSection {
                heading: "Experience".into(),
                paragraphs,
            }],
        };
        let bytes = render_plain_pdf(&doc).expect("render");
        let surface = LopdfSurface::open(&bytes).expect("open");
        assert!(surface.page_count() > 1);
    }
}
