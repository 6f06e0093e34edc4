//! `PdfSurface` over an in-memory lopdf document.
//!
//! Pages are loaded lazily: content streams are decoded and interpreted the
//! first time a page is searched. Mutations are applied to the decoded
//! operation list and written back as a fresh content stream on `to_bytes`.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use tracing::debug;

use crate::pdf::font::{winansi_encode, PdfFont};
use crate::pdf::font_metrics::{get_metrics, StandardFont};
use crate::pdf::geometry::{Color, Rect};
use crate::pdf::objects::{dict_get, inherited, number, resolve, resolve_array, resolve_dict, stream_bytes};
use crate::pdf::search::find_in_layout;
use crate::pdf::surface::{FitPolicy, PdfSurface, TextMatch, TextStyle};
use crate::pdf::text_layout::{interpret, FontSet, PageLayout, ShowOp};
use crate::pdf::PatchError;

/// US Letter, used when a page has no usable MediaBox.
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];
const LINE_HEIGHT_FACTOR: f32 = 1.2;
/// Resource name prefix for the font added to pages we write on.
const INSERT_FONT_PREFIX: &str = "CvbF";
const INSERT_FONT: StandardFont = StandardFont::Helvetica;

struct PageState {
    id: ObjectId,
    media_box: [f32; 4],
    loaded: Option<LoadedPage>,
    dirty: bool,
}

struct LoadedPage {
    ops: Vec<Operation>,
    fonts: FontSet,
    layout: Option<PageLayout>,
    insert_font: Option<Vec<u8>>,
}

pub struct LopdfSurface {
    doc: Document,
    pages: Vec<PageState>,
    modified: bool,
}

impl LopdfSurface {
    /// Parses `bytes`. Fails with `DocumentUnreadable` for anything that is
    /// not a PDF with at least one page.
    pub fn open(bytes: &[u8]) -> Result<Self, PatchError> {
        let doc = Document::load_mem(bytes).map_err(|e| PatchError::DocumentUnreadable(e.to_string()))?;

        let page_ids: BTreeMap<u32, ObjectId> = doc.get_pages();
        if page_ids.is_empty() {
            return Err(PatchError::DocumentUnreadable("document has no pages".into()));
        }

        let pages = page_ids
            .values()
            .map(|id| PageState {
                id: *id,
                media_box: media_box(&doc, *id),
                loaded: None,
                dirty: false,
            })
            .collect();

        Ok(Self {
            doc,
            pages,
            modified: false,
        })
    }

    fn check(&self, page: usize) -> Result<(), PatchError> {
        if page < self.pages.len() {
            Ok(())
        } else {
            Err(PatchError::PageOutOfRange {
                page,
                count: self.pages.len(),
            })
        }
    }

    fn loaded(&mut self, page: usize) -> Result<&mut LoadedPage, PatchError> {
        self.check(page)?;
        let state = &mut self.pages[page];
        if state.loaded.is_none() {
            state.loaded = Some(load_page(&self.doc, state.id)?);
        }
        state
            .loaded
            .as_mut()
            .ok_or_else(|| PatchError::Rendering(format!("page {page} failed to load")))
    }

    fn layout(&mut self, page: usize) -> Result<&PageLayout, PatchError> {
        self.check(page)?;
        let media_box = self.pages[page].media_box;
        let loaded = self.loaded(page)?;
        if loaded.layout.is_none() {
            let layout = interpret(&loaded.ops, &loaded.fonts, media_box);
            loaded.layout = Some(layout);
        }
        loaded
            .layout
            .as_ref()
            .ok_or_else(|| PatchError::Rendering(format!("page {page} has no layout")))
    }

    fn mark_dirty(&mut self, page: usize) {
        self.pages[page].dirty = true;
        self.modified = true;
        if let Some(loaded) = self.pages[page].loaded.as_mut() {
            loaded.layout = None;
        }
    }

    /// Adds a Helvetica resource to the page (once) and returns its name.
    fn ensure_insert_font(&mut self, page: usize) -> Result<Vec<u8>, PatchError> {
        if let Some(name) = self.loaded(page)?.insert_font.clone() {
            return Ok(name);
        }
        let page_id = self.pages[page].id;

        let mut resources = inherited(&self.doc, page_id, b"Resources")
            .and_then(|o| resolve_dict(&self.doc, o))
            .cloned()
            .unwrap_or_default();
        let mut fonts = resources
            .get(b"Font")
            .ok()
            .and_then(|o| resolve_dict(&self.doc, o))
            .cloned()
            .unwrap_or_default();

        let mut suffix = 1;
        let name = loop {
            let candidate = format!("{INSERT_FONT_PREFIX}{suffix}").into_bytes();
            if !fonts.has(&candidate) {
                break candidate;
            }
            suffix += 1;
        };

        let font_id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => INSERT_FONT.base_font_name(),
            "Encoding" => "WinAnsiEncoding",
        });
        fonts.set(name.clone(), Object::Reference(font_id));
        resources.set("Font", Object::Dictionary(fonts));

        self.doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| PatchError::Rendering(e.to_string()))?
            .set("Resources", Object::Dictionary(resources));

        let loaded = self.loaded(page)?;
        loaded.fonts.insert(name.clone(), PdfFont::standard(INSERT_FONT));
        loaded.insert_font = Some(name.clone());
        Ok(name)
    }

    /// Converts a top-left page rect into user-space `x y w h`.
    fn user_rect(&self, page: usize, rect: &Rect) -> [f32; 4] {
        let mb = self.pages[page].media_box;
        [rect.x0 + mb[0], mb[3] - rect.y1, rect.width(), rect.height()]
    }
}

impl PdfSurface for LopdfSurface {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_rect(&self, page: usize) -> Result<Rect, PatchError> {
        self.check(page)?;
        let mb = self.pages[page].media_box;
        Ok(Rect::new(0.0, 0.0, mb[2] - mb[0], mb[3] - mb[1]))
    }

    fn page_text(&mut self, page: usize) -> Result<String, PatchError> {
        Ok(self.layout(page)?.text.clone())
    }

    fn search_text(&mut self, page: usize, needle: &str) -> Result<Vec<TextMatch>, PatchError> {
        let layout = self.layout(page)?;
        Ok(find_in_layout(layout, needle)
            .into_iter()
            .map(|rects| TextMatch { rects })
            .collect())
    }

    fn font_size_at(&mut self, page: usize, rect: &Rect) -> Result<Option<f32>, PatchError> {
        let layout = self.layout(page)?;
        Ok(layout
            .glyphs_in(rect)
            .first()
            .map(|i| layout.glyphs[*i].font_size))
    }

    fn redact(&mut self, page: usize, rect: &Rect) -> Result<(), PatchError> {
        self.layout(page)?;
        let [x, y, w, h] = self.user_rect(page, rect);
        let loaded = self.loaded(page)?;
        let layout = loaded
            .layout
            .take()
            .ok_or_else(|| PatchError::Rendering(format!("page {page} has no layout")))?;

        let mut removals: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
        for i in layout.glyphs_in(rect) {
            let glyph = &layout.glyphs[i];
            removals.entry(glyph.op_index).or_default().insert(glyph.code_index);
        }
        debug!(page, glyphs = removals.values().map(BTreeSet::len).sum::<usize>(), "redacting");

        // Back to front so earlier indices stay valid while splicing.
        for (op_index, removed) in removals.iter().rev() {
            let Some(info) = layout.show_ops.get(op_index) else {
                continue;
            };
            let font = loaded.fonts.get(&info.font_key);
            let replacement = rewrite_show_op(&loaded.ops[*op_index], info, font, removed);
            loaded.ops.splice(*op_index..*op_index + 1, replacement);
        }

        loaded.ops.extend(fill_rect_ops(Color::WHITE, [x, y, w, h]));
        self.mark_dirty(page);
        Ok(())
    }

    fn insert_text(
        &mut self,
        page: usize,
        rect: &Rect,
        text: &str,
        style: &TextStyle,
        policy: FitPolicy,
    ) -> Result<bool, PatchError> {
        self.check(page)?;
        let metrics = get_metrics(&INSERT_FONT);
        let size = style.font_size;
        let line_height = size * LINE_HEIGHT_FACTOR;
        let lines = metrics.wrap_lines(text, rect.width(), size);
        let fits = lines.len() as f32 * line_height <= rect.height() + 0.01;

        if !fits && policy == FitPolicy::Strict {
            return Ok(false);
        }
        if text.trim().is_empty() {
            return Ok(fits);
        }

        let font_name = self.ensure_insert_font(page)?;
        let mb = self.pages[page].media_box;
        let ascent = f32::from(metrics.ascent) / 1000.0 * size;
        let Color { r, g, b } = style.color;

        let mut ops = vec![
            Operation::new("q", vec![]),
            Operation::new("BT", vec![]),
            Operation::new("rg", vec![real(r), real(g), real(b)]),
            Operation::new("Tf", vec![Object::Name(font_name), real(size)]),
        ];
        for (i, line) in lines.iter().enumerate() {
            let baseline = rect.y0 + ascent + i as f32 * line_height;
            let x = rect.x0 + mb[0];
            let y = mb[3] - baseline;
            ops.push(Operation::new(
                "Tm",
                vec![real(1.0), real(0.0), real(0.0), real(1.0), real(x), real(y)],
            ));
            ops.push(Operation::new("Tj", vec![Object::String(encode_winansi(line), StringFormat::Literal)]));
        }
        ops.push(Operation::new("ET", vec![]));
        ops.push(Operation::new("Q", vec![]));

        self.loaded(page)?.ops.extend(ops);
        self.mark_dirty(page);
        Ok(fits)
    }

    fn is_modified(&self) -> bool {
        self.modified
    }

    fn to_bytes(&mut self) -> Result<Vec<u8>, PatchError> {
        for state in self.pages.iter_mut().filter(|s| s.dirty) {
            let Some(loaded) = state.loaded.as_ref() else {
                continue;
            };
            let content = Content {
                operations: loaded.ops.clone(),
            };
            let data = content.encode().map_err(|e| PatchError::Rendering(e.to_string()))?;
            let stream_id = self.doc.add_object(Stream::new(dictionary! {}, data));
            self.doc
                .get_object_mut(state.id)
                .and_then(Object::as_dict_mut)
                .map_err(|e| PatchError::Rendering(e.to_string()))?
                .set("Contents", Object::Reference(stream_id));
            state.dirty = false;
        }

        let mut out = Vec::new();
        self.doc
            .save_to(&mut out)
            .map_err(|e| PatchError::Rendering(e.to_string()))?;
        Ok(out)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Page loading
// ────────────────────────────────────────────────────────────────────────────

fn media_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    let values: Vec<f32> = inherited(doc, page_id, b"MediaBox")
        .and_then(|o| resolve_array(doc, o))
        .map(|arr| arr.iter().filter_map(|o| resolve(doc, o).and_then(number)).collect())
        .unwrap_or_default();
    match values.as_slice() {
        [a, b, c, d] if (c - a).abs() > 0.0 && (d - b).abs() > 0.0 => {
            [a.min(*c), b.min(*d), a.max(*c), b.max(*d)]
        }
        _ => DEFAULT_MEDIA_BOX,
    }
}

fn load_page(doc: &Document, page_id: ObjectId) -> Result<LoadedPage, PatchError> {
    let data = page_content(doc, page_id);
    let content = Content::decode(&data).map_err(|e| PatchError::Rendering(e.to_string()))?;

    // Wrapped so anything appended later starts from the default graphics state.
    let mut ops = Vec::with_capacity(content.operations.len() + 2);
    ops.push(Operation::new("q", vec![]));
    ops.extend(content.operations);
    ops.push(Operation::new("Q", vec![]));

    Ok(LoadedPage {
        ops,
        fonts: page_fonts(doc, page_id),
        layout: None,
        insert_font: None,
    })
}

/// Concatenated, decompressed content streams of a page.
fn page_content(doc: &Document, page_id: ObjectId) -> Vec<u8> {
    let Some(page) = doc.get_dictionary(page_id).ok() else {
        return Vec::new();
    };
    let streams: Vec<&Object> = match dict_get(doc, page, b"Contents") {
        Some(Object::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
        None => Vec::new(),
    };

    let mut data = Vec::new();
    for obj in streams {
        if let Some(Object::Stream(stream)) = resolve(doc, obj) {
            if let Some(bytes) = stream_bytes(stream) {
                data.extend_from_slice(&bytes);
                data.push(b'\n');
            }
        }
    }
    data
}

fn page_fonts(doc: &Document, page_id: ObjectId) -> FontSet {
    let mut fonts = HashMap::new();
    let font_dict: Option<&Dictionary> = inherited(doc, page_id, b"Resources")
        .and_then(|o| resolve_dict(doc, o))
        .and_then(|res| dict_get(doc, res, b"Font"))
        .and_then(|o| resolve_dict(doc, o));

    if let Some(font_dict) = font_dict {
        for (key, value) in font_dict.iter() {
            if let Some(dict) = resolve_dict(doc, value) {
                fonts.insert(key.clone(), PdfFont::from_dict(doc, dict));
            }
        }
    }
    FontSet::new(fonts)
}

// ────────────────────────────────────────────────────────────────────────────
// Operation rewriting
// ────────────────────────────────────────────────────────────────────────────

enum Piece {
    Codes(Vec<u32>),
    Adjust(f32),
}

/// Rewrites a show-text operation as `TJ` without the `removed` codes, each
/// replaced by a displacement equal to its advance so later glyphs stay put.
fn rewrite_show_op(
    op: &Operation,
    info: &ShowOp,
    font: &PdfFont,
    removed: &BTreeSet<usize>,
) -> Vec<Operation> {
    let items: Vec<Object> = match op.operator.as_str() {
        "TJ" => match op.operands.first() {
            Some(Object::Array(items)) => items.clone(),
            _ => Vec::new(),
        },
        "\"" => op.operands.get(2).cloned().into_iter().collect(),
        _ => op.operands.first().cloned().into_iter().collect(),
    };

    let mut pieces: Vec<Piece> = Vec::new();
    let mut code_index = 0;
    for item in &items {
        match item {
            Object::String(bytes, _) => {
                for code in font.split_codes(bytes) {
                    if removed.contains(&code_index) {
                        let spacing = if font.is_word_space(code) {
                            info.char_spacing + info.word_spacing
                        } else {
                            info.char_spacing
                        };
                        let spacing_units = if info.font_size.abs() > f32::EPSILON {
                            spacing * 1000.0 / info.font_size
                        } else {
                            0.0
                        };
                        push_adjust(&mut pieces, -(font.width(code) + spacing_units));
                    } else {
                        match pieces.last_mut() {
                            Some(Piece::Codes(codes)) => codes.push(code),
                            _ => pieces.push(Piece::Codes(vec![code])),
                        }
                    }
                    code_index += 1;
                }
            }
            other => {
                if let Some(n) = number(other) {
                    push_adjust(&mut pieces, n);
                }
            }
        }
    }

    let array: Vec<Object> = pieces
        .into_iter()
        .filter_map(|piece| match piece {
            Piece::Codes(codes) => Some(Object::String(font.encode_codes(&codes), StringFormat::Hexadecimal)),
            Piece::Adjust(n) if n.abs() > 1e-4 => Some(real(n)),
            Piece::Adjust(_) => None,
        })
        .collect();
    let tj = Operation::new("TJ", vec![Object::Array(array)]);

    match op.operator.as_str() {
        "'" => vec![Operation::new("T*", vec![]), tj],
        "\"" => vec![
            Operation::new("Tw", op.operands.first().cloned().into_iter().collect()),
            Operation::new("Tc", op.operands.get(1).cloned().into_iter().collect()),
            Operation::new("T*", vec![]),
            tj,
        ],
        _ => vec![tj],
    }
}

fn push_adjust(pieces: &mut Vec<Piece>, n: f32) {
    match pieces.last_mut() {
        Some(Piece::Adjust(total)) => *total += n,
        _ => pieces.push(Piece::Adjust(n)),
    }
}

fn fill_rect_ops(color: Color, [x, y, w, h]: [f32; 4]) -> Vec<Operation> {
    vec![
        Operation::new("q", vec![]),
        Operation::new("rg", vec![real(color.r), real(color.g), real(color.b)]),
        Operation::new("re", vec![real(x), real(y), real(w), real(h)]),
        Operation::new("f", vec![]),
        Operation::new("Q", vec![]),
    ]
}

fn encode_winansi(text: &str) -> Vec<u8> {
    text.chars().map(|c| winansi_encode(c).unwrap_or(b'?')).collect()
}

fn real(value: f32) -> Object {
    Object::Real(value.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::fixtures::{pdf_with_pages, text_line};

    fn surface(pages: &[String]) -> LopdfSurface {
        LopdfSurface::open(&pdf_with_pages(pages)).expect("fixture opens")
    }

    #[test]
    fn test_open_rejects_non_pdf() {
        let err = LopdfSurface::open(b"definitely not a pdf").err();
        assert!(matches!(err, Some(PatchError::DocumentUnreadable(_))));
    }

    #[test]
    fn test_page_rect_from_inherited_media_box() {
        let s = surface(&[text_line(72.0, 700.0, 11.0, "Hello")]);
        assert_eq!(s.page_count(), 1);
        assert_eq!(s.page_rect(0).ok(), Some(Rect::new(0.0, 0.0, 612.0, 792.0)));
        assert!(matches!(s.page_rect(3), Err(PatchError::PageOutOfRange { page: 3, count: 1 })));
    }

    #[test]
    fn test_search_and_font_size() {
        let mut s = surface(&[text_line(72.0, 700.0, 11.0, "Managed a team of five")]);
        let hits = s.search_text(0, "A TEAM").expect("search");
        assert_eq!(hits.len(), 1);
        let size = s.font_size_at(0, &hits[0].rects[0]).expect("size");
        assert_eq!(size, Some(11.0));
    }

    #[test]
    fn test_redact_removes_text_and_keeps_neighbours() {
        let mut s = surface(&[text_line(72.0, 700.0, 10.0, "Python Java Rust")]);
        let hit = s.search_text(0, "Java").expect("search").remove(0);
        let rust_before = s.search_text(0, "Rust").expect("search").remove(0).rects[0];

        s.redact(0, &hit.rects[0]).expect("redact");

        let text = s.page_text(0).expect("text");
        assert!(!text.contains("Java"), "got {text}");
        assert!(text.contains("Python") && text.contains("Rust"));
        let rust_after = s.search_text(0, "Rust").expect("search").remove(0).rects[0];
        assert!((rust_after.x0 - rust_before.x0).abs() < 0.01);
        assert!(s.is_modified());
    }

    #[test]
    fn test_insert_text_reports_overflow_in_strict_mode() {
        let mut s = surface(&[text_line(72.0, 700.0, 10.0, "Summary")]);
        let tiny = Rect::new(72.0, 100.0, 100.0, 105.0);
        let style = TextStyle {
            font_size: 10.0,
            color: Color::BLACK,
        };
        let fit = s
            .insert_text(0, &tiny, "far too much text for this box", &style, FitPolicy::Strict)
            .expect("insert");
        assert!(!fit);
        assert!(!s.is_modified());
    }

    #[test]
    fn test_insert_text_is_searchable_after_save() {
        let mut s = surface(&[text_line(72.0, 700.0, 10.0, "Summary")]);
        let style = TextStyle {
            font_size: 10.0,
            color: Color::BLACK,
        };
        let rect = Rect::new(72.0, 200.0, 400.0, 240.0);
        let fit = s
            .insert_text(0, &rect, "Led platform migration", &style, FitPolicy::BestEffort)
            .expect("insert");
        assert!(fit);

        let bytes = s.to_bytes().expect("save");
        let mut reopened = LopdfSurface::open(&bytes).expect("reopen");
        let hits = reopened.search_text(0, "platform migration").expect("search");
        assert_eq!(hits.len(), 1);
        let r = hits[0].rects[0];
        assert!(r.x0 >= 72.0 - 0.01 && r.y0 >= 200.0 - 0.01 && r.y1 <= 240.0);
        assert!(reopened.page_text(0).expect("text").contains("Summary"));
    }

    #[test]
    fn test_rewrite_tj_replaces_removed_codes_with_advance() {
        let op = Operation::new("Tj", vec![Object::string_literal("AB")]);
        let info = ShowOp {
            font_key: b"F1".to_vec(),
            font_size: 10.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
        };
        let font = PdfFont::standard(StandardFont::Helvetica);
        let removed: BTreeSet<usize> = [0].into_iter().collect();

        let ops = rewrite_show_op(&op, &info, &font, &removed);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].operator, "TJ");
        let Some(Object::Array(items)) = ops[0].operands.first() else {
            panic!("TJ operand is not an array");
        };
        // A is 667 units wide
        assert!(matches!(items.first().and_then(number), Some(n) if (n + 667.0).abs() < 1e-3));
        assert!(matches!(items.get(1), Some(Object::String(b, _)) if b == b"B"));
    }
}
