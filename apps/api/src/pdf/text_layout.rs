//! Content-stream interpreter: positions every glyph a page shows.
//!
//! Produces a `PageLayout`: glyph boxes in top-left page space, the page's
//! reading-order text, and a char → glyph map so search results can be turned
//! back into rectangles and redactions into operator rewrites.
//!
//! Only the text and transform operators are interpreted. Form XObjects are
//! not descended into, so their text is invisible to search.

use std::collections::HashMap;

use lopdf::content::Operation;
use lopdf::Object;

use crate::pdf::font::PdfFont;
use crate::pdf::font_metrics::StandardFont;
use crate::pdf::geometry::{Matrix, Rect};
use crate::pdf::objects::number;

/// A vertical jump larger than this fraction of the font size starts a new line.
const NEW_LINE_FACTOR: f32 = 0.5;
/// A horizontal gap larger than this fraction of the font size reads as a space.
const WORD_GAP_FACTOR: f32 = 0.2;

/// One positioned glyph.
#[derive(Debug, Clone)]
pub struct Glyph {
    pub text: String,
    pub bbox: Rect,
    /// Effective size in points (font size scaled by text and CTM matrices).
    pub font_size: f32,
    /// Origin in top-left page space.
    pub origin: (f32, f32),
    /// Index of the show-text operation that painted this glyph.
    pub op_index: usize,
    /// Index of the code within that operation, counted across TJ elements.
    pub code_index: usize,
}

/// Text state in effect for one show-text operation; needed to rewrite it.
#[derive(Debug, Clone)]
pub struct ShowOp {
    pub font_key: Vec<u8>,
    pub font_size: f32,
    pub char_spacing: f32,
    pub word_spacing: f32,
}

#[derive(Debug, Default)]
pub struct PageLayout {
    pub glyphs: Vec<Glyph>,
    pub show_ops: HashMap<usize, ShowOp>,
    /// Reading-order text; visual lines separated by `\n`.
    pub text: String,
    /// For each char of `text`: the glyph it came from, `None` if synthesized.
    pub char_glyph: Vec<Option<usize>>,
    /// For each char of `text`: its visual line number.
    pub char_line: Vec<usize>,
}

impl PageLayout {
    /// Indices of glyphs whose centre lies inside `rect`.
    pub fn glyphs_in(&self, rect: &Rect) -> Vec<usize> {
        self.glyphs
            .iter()
            .enumerate()
            .filter(|(_, g)| {
                let (cx, cy) = g.bbox.center();
                rect.contains_point(cx, cy)
            })
            .map(|(i, _)| i)
            .collect()
    }
}

/// Fonts of a page keyed by resource name.
pub struct FontSet {
    fonts: HashMap<Vec<u8>, PdfFont>,
    fallback: PdfFont,
}

impl FontSet {
    pub fn new(fonts: HashMap<Vec<u8>, PdfFont>) -> Self {
        Self {
            fonts,
            fallback: PdfFont::standard(StandardFont::Helvetica),
        }
    }

    pub fn insert(&mut self, key: Vec<u8>, font: PdfFont) {
        self.fonts.insert(key, font);
    }

    pub fn get(&self, key: &[u8]) -> &PdfFont {
        self.fonts.get(key).unwrap_or(&self.fallback)
    }
}

#[derive(Debug, Clone)]
struct TextState {
    font_key: Vec<u8>,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
    leading: f32,
    rise: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font_key: Vec::new(),
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    text: TextState,
}

struct Interpreter<'a> {
    fonts: &'a FontSet,
    /// MediaBox `[x0, y0, x1, y1]` in user space.
    media_box: [f32; 4],
    stack: Vec<GraphicsState>,
    state: GraphicsState,
    tm: Matrix,
    tlm: Matrix,
    layout: PageLayout,
}

fn operand(op: &Operation, i: usize) -> f32 {
    op.operands.get(i).and_then(number).unwrap_or(0.0)
}

impl<'a> Interpreter<'a> {
    fn run(mut self, ops: &[Operation]) -> PageLayout {
        for (index, op) in ops.iter().enumerate() {
            match op.operator.as_str() {
                "q" => self.stack.push(self.state.clone()),
                "Q" => {
                    if let Some(saved) = self.stack.pop() {
                        self.state = saved;
                    }
                }
                "cm" => {
                    let m = Matrix::new(
                        operand(op, 0),
                        operand(op, 1),
                        operand(op, 2),
                        operand(op, 3),
                        operand(op, 4),
                        operand(op, 5),
                    );
                    self.state.ctm = m.then(&self.state.ctm);
                }
                "BT" => {
                    self.tm = Matrix::IDENTITY;
                    self.tlm = Matrix::IDENTITY;
                }
                "Tf" => {
                    if let Some(Object::Name(key)) = op.operands.first() {
                        self.state.text.font_key = key.clone();
                    }
                    self.state.text.font_size = operand(op, 1);
                }
                "Tc" => self.state.text.char_spacing = operand(op, 0),
                "Tw" => self.state.text.word_spacing = operand(op, 0),
                "Tz" => self.state.text.horizontal_scale = operand(op, 0) / 100.0,
                "TL" => self.state.text.leading = operand(op, 0),
                "Ts" => self.state.text.rise = operand(op, 0),
                "Td" => self.move_line(operand(op, 0), operand(op, 1)),
                "TD" => {
                    self.state.text.leading = -operand(op, 1);
                    self.move_line(operand(op, 0), operand(op, 1));
                }
                "Tm" => {
                    self.tlm = Matrix::new(
                        operand(op, 0),
                        operand(op, 1),
                        operand(op, 2),
                        operand(op, 3),
                        operand(op, 4),
                        operand(op, 5),
                    );
                    self.tm = self.tlm;
                }
                "T*" => self.next_line(),
                "Tj" => {
                    self.record_show_op(index);
                    if let Some(Object::String(bytes, _)) = op.operands.first() {
                        self.show(bytes, index, &mut 0);
                    }
                }
                "'" => {
                    self.next_line();
                    self.record_show_op(index);
                    if let Some(Object::String(bytes, _)) = op.operands.first() {
                        self.show(bytes, index, &mut 0);
                    }
                }
                "\"" => {
                    self.state.text.word_spacing = operand(op, 0);
                    self.state.text.char_spacing = operand(op, 1);
                    self.next_line();
                    self.record_show_op(index);
                    if let Some(Object::String(bytes, _)) = op.operands.get(2) {
                        self.show(bytes, index, &mut 0);
                    }
                }
                "TJ" => {
                    self.record_show_op(index);
                    if let Some(Object::Array(items)) = op.operands.first() {
                        let mut code_index = 0;
                        for item in items {
                            match item {
                                Object::String(bytes, _) => self.show(bytes, index, &mut code_index),
                                other => {
                                    if let Some(adjust) = number(other) {
                                        let text = &self.state.text;
                                        let tx = -adjust / 1000.0 * text.font_size * text.horizontal_scale;
                                        self.tm = Matrix::translate(tx, 0.0).then(&self.tm);
                                    }
                                }
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        build_text(&mut self.layout);
        self.layout
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.tlm = Matrix::translate(tx, ty).then(&self.tlm);
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        let leading = self.state.text.leading;
        self.move_line(0.0, -leading);
    }

    fn record_show_op(&mut self, index: usize) {
        let text = &self.state.text;
        self.layout.show_ops.insert(
            index,
            ShowOp {
                font_key: text.font_key.clone(),
                font_size: text.font_size,
                char_spacing: text.char_spacing,
                word_spacing: text.word_spacing,
            },
        );
    }

    fn to_page(&self, x: f32, y: f32) -> (f32, f32) {
        (x - self.media_box[0], self.media_box[3] - y)
    }

    fn show(&mut self, bytes: &[u8], op_index: usize, code_index: &mut usize) {
        let font = self.fonts.get(&self.state.text.font_key);
        let text = self.state.text.clone();
        let ctm = self.state.ctm;

        for code in font.split_codes(bytes) {
            let w0 = font.width(code) / 1000.0;
            let glyph_space = Matrix::new(
                text.font_size * text.horizontal_scale,
                0.0,
                0.0,
                text.font_size,
                0.0,
                text.rise,
            );
            let device = self.tm.then(&ctm);
            let trm = glyph_space.then(&device);

            let corners = [
                trm.apply(0.0, font.descent),
                trm.apply(w0, font.descent),
                trm.apply(0.0, font.ascent),
                trm.apply(w0, font.ascent),
            ];
            let mut bbox = Rect::new(f32::MAX, f32::MAX, f32::MIN, f32::MIN);
            for (ux, uy) in corners {
                let (px, py) = self.to_page(ux, uy);
                bbox = bbox.union(&Rect::new(px, py, px, py));
            }
            let (ox, oy) = trm.apply(0.0, 0.0);

            self.layout.glyphs.push(Glyph {
                text: font.decode(code),
                bbox,
                font_size: text.font_size * device.vertical_scale(),
                origin: self.to_page(ox, oy),
                op_index,
                code_index: *code_index,
            });
            *code_index += 1;

            let spacing = if font.is_word_space(code) {
                text.char_spacing + text.word_spacing
            } else {
                text.char_spacing
            };
            let tx = (w0 * text.font_size + spacing) * text.horizontal_scale;
            self.tm = Matrix::translate(tx, 0.0).then(&self.tm);
        }
    }
}

/// Interprets `ops` against `fonts` for a page with the given MediaBox.
pub fn interpret(ops: &[Operation], fonts: &FontSet, media_box: [f32; 4]) -> PageLayout {
    let state = GraphicsState {
        ctm: Matrix::IDENTITY,
        text: TextState::default(),
    };
    Interpreter {
        fonts,
        media_box,
        stack: Vec::new(),
        state,
        tm: Matrix::IDENTITY,
        tlm: Matrix::IDENTITY,
        layout: PageLayout::default(),
    }
    .run(ops)
}

/// Assembles reading-order text from glyphs in paint order.
fn build_text(layout: &mut PageLayout) {
    let mut text = String::new();
    let mut char_glyph = Vec::new();
    let mut char_line = Vec::new();
    let mut line = 0usize;
    // (baseline y, right edge x) of the previous glyph
    let mut previous: Option<(f32, f32)> = None;

    for (i, glyph) in layout.glyphs.iter().enumerate() {
        if glyph.text.is_empty() {
            continue;
        }
        let size = glyph.font_size.max(1.0);
        let (x, baseline) = glyph.origin;

        if let Some((prev_baseline, prev_right)) = previous {
            let new_line = (baseline - prev_baseline).abs() > size * NEW_LINE_FACTOR
                || x < prev_right - size;
            if new_line {
                line += 1;
                text.push('\n');
                char_glyph.push(None);
                char_line.push(line);
            } else if x - prev_right > size * WORD_GAP_FACTOR
                && !text.ends_with(char::is_whitespace)
                && !glyph.text.starts_with(char::is_whitespace)
            {
                text.push(' ');
                char_glyph.push(None);
                char_line.push(line);
            }
        }

        for c in glyph.text.chars() {
            text.push(c);
            char_glyph.push(Some(i));
            char_line.push(line);
        }
        previous = Some((baseline, glyph.bbox.x1));
    }

    layout.text = text;
    layout.char_glyph = char_glyph;
    layout.char_line = char_line;
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::Content;

    const LETTER: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

    fn fonts() -> FontSet {
        let mut map = HashMap::new();
        map.insert(b"F1".to_vec(), PdfFont::standard(StandardFont::Helvetica));
        FontSet::new(map)
    }

    fn layout_of(stream: &str) -> PageLayout {
        let content = Content::decode(stream.as_bytes()).expect("valid content");
        interpret(&content.operations, &fonts(), LETTER)
    }

    #[test]
    fn test_single_tj_positions_glyphs() {
        let layout = layout_of("BT /F1 10 Tf 72 700 Td (Hi) Tj ET");
        assert_eq!(layout.text, "Hi");
        assert_eq!(layout.glyphs.len(), 2);
        let h = &layout.glyphs[0];
        assert!((h.origin.0 - 72.0).abs() < 1e-3);
        assert!((h.origin.1 - 92.0).abs() < 1e-3);
        assert!((h.font_size - 10.0).abs() < 1e-3);
        // H is 722 units wide in Helvetica
        assert!((layout.glyphs[1].origin.0 - 79.22).abs() < 1e-2);
    }

    #[test]
    fn test_tj_kerning_creates_word_gap() {
        let layout = layout_of("BT /F1 10 Tf 72 700 Td [(Python)-600(Java)] TJ ET");
        assert_eq!(layout.text, "Python Java");
        assert_eq!(layout.glyphs[6].code_index, 6);
    }

    #[test]
    fn test_td_to_next_line_inserts_newline() {
        let layout = layout_of("BT /F1 10 Tf 14 TL 72 700 Td (Skills) Tj T* (Rust) Tj ET");
        assert_eq!(layout.text, "Skills\nRust");
        let last = layout.char_line.last().copied();
        assert_eq!(last, Some(1));
    }

    #[test]
    fn test_cm_scales_effective_font_size() {
        let layout = layout_of("q 2 0 0 2 0 0 cm BT /F1 6 Tf 10 10 Td (A) Tj ET Q");
        assert!((layout.glyphs[0].font_size - 12.0).abs() < 1e-3);
        assert!((layout.glyphs[0].origin.0 - 20.0).abs() < 1e-3);
    }

    #[test]
    fn test_text_matrix_size_counts_toward_font_size() {
        let layout = layout_of("BT /F1 1 Tf 11 0 0 11 72 700 Tm (A) Tj ET");
        assert!((layout.glyphs[0].font_size - 11.0).abs() < 1e-3);
    }

    #[test]
    fn test_show_ops_record_spacing_state() {
        let layout = layout_of("BT /F1 10 Tf 1.5 Tc 72 700 Td (A B) Tj ET");
        let op = layout.show_ops.values().next().expect("one show op");
        assert_eq!(op.char_spacing, 1.5);
        assert_eq!(op.font_key, b"F1".to_vec());
    }

    #[test]
    fn test_glyphs_in_selects_by_centre() {
        let layout = layout_of("BT /F1 10 Tf 72 700 Td (AB) Tj ET");
        let first = layout.glyphs[0].bbox;
        assert_eq!(layout.glyphs_in(&first), vec![0]);
    }
}
