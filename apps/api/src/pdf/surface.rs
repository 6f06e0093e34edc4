//! The capability interface the patch engine is written against.
//!
//! Pages are zero-indexed; rectangles use the top-left page space of
//! [`Rect`]. An implementation owns one open document.

use crate::pdf::geometry::{Color, Rect};
use crate::pdf::PatchError;

/// One logical occurrence of a needle: one rectangle per visual line.
#[derive(Debug, Clone, PartialEq)]
pub struct TextMatch {
    pub rects: Vec<Rect>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub font_size: f32,
    pub color: Color,
}

/// What to do when text does not fit the box it is inserted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitPolicy {
    /// Draw nothing and report the overflow.
    Strict,
    /// Draw every line anyway and report the overflow.
    BestEffort,
}

pub trait PdfSurface {
    fn page_count(&self) -> usize;

    /// Page bounds; the origin is always (0, 0).
    fn page_rect(&self, page: usize) -> Result<Rect, PatchError>;

    /// Extracted text in reading order, lines separated by `\n`.
    fn page_text(&mut self, page: usize) -> Result<String, PatchError>;

    /// Case-insensitive, whitespace-normalised search.
    fn search_text(&mut self, page: usize, needle: &str) -> Result<Vec<TextMatch>, PatchError>;

    /// Size of the first glyph inside `rect`, if any.
    fn font_size_at(&mut self, page: usize, rect: &Rect) -> Result<Option<f32>, PatchError>;

    /// Removes text whose glyph centres fall inside `rect` and paints it white.
    fn redact(&mut self, page: usize, rect: &Rect) -> Result<(), PatchError>;

    /// Draws `text` wrapped to `rect`. Returns `true` when it fit.
    fn insert_text(
        &mut self,
        page: usize,
        rect: &Rect,
        text: &str,
        style: &TextStyle,
        policy: FitPolicy,
    ) -> Result<bool, PatchError>;

    /// Whether any page has been changed since opening.
    fn is_modified(&self) -> bool;

    fn to_bytes(&mut self) -> Result<Vec<u8>, PatchError>;
}
