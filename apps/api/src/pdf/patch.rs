//! Patch engine: applies accepted `before → after` edits and injects keywords
//! into an existing PDF, in place.
//!
//! Everything here is written against [`PdfSurface`]; only
//! [`apply_ats_to_pdf`] knows the document is backed by lopdf.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::pdf::geometry::{Color, Rect};
use crate::pdf::lopdf_surface::LopdfSurface;
use crate::pdf::search::{search_tiers, SearchTier};
use crate::pdf::surface::{FitPolicy, PdfSurface, TextStyle};
use crate::pdf::PatchError;

// ────────────────────────────────────────────────────────────────────────────
// Inputs and outputs
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextEdit {
    /// Informational only (e.g. "experience").
    #[serde(default)]
    pub section: String,
    pub before: String,
    pub after: String,
}

impl TextEdit {
    pub fn new(section: &str, before: &str, after: &str) -> Self {
        Self {
            section: section.to_string(),
            before: before.to_string(),
            after: after.to_string(),
        }
    }
}

/// One logical match of an edit on a page, with the font size seen at its
/// first rectangle before anything was changed.
#[derive(Debug, Clone, PartialEq)]
pub struct PageTextHit {
    pub page: usize,
    pub tier: SearchTier,
    pub rects: Vec<Rect>,
    pub font_size: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KeywordPlacement {
    /// Inserted under the first skills-like heading found.
    Heading { page: usize, heading: String },
    /// No heading anywhere; appended near the bottom of the last page.
    LastPage { page: usize },
    /// Nothing to inject.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct PatchResult {
    pub bytes: Vec<u8>,
    pub applied: usize,
    pub total: usize,
    pub keywords: KeywordPlacement,
}

// ────────────────────────────────────────────────────────────────────────────
// Settings
// ────────────────────────────────────────────────────────────────────────────

/// Tunables of the engine. `Default` carries the production values.
#[derive(Debug, Clone)]
pub struct PatchSettings {
    /// Prefix lengths tried after the exact text, longest first.
    pub prefix_lengths: Vec<usize>,
    /// Used when no glyph is found under a match.
    pub default_font_size: f32,
    pub max_insert_width: f32,
    pub right_margin: f32,
    /// Extra room below the last matched line.
    pub bottom_padding: f32,
    pub shrink_step: f32,
    pub min_font_size: f32,
    /// Lowercase headings probed for keyword injection, in priority order.
    pub keyword_headings: Vec<String>,
    pub keyword_separator: String,
    pub keyword_font_size: f32,
    pub keyword_color: Color,
    pub fallback_prefix: String,
}

impl Default for PatchSettings {
    fn default() -> Self {
        Self {
            prefix_lengths: vec![60, 30],
            default_font_size: 10.0,
            max_insert_width: 450.0,
            right_margin: 30.0,
            bottom_padding: 8.0,
            shrink_step: 1.5,
            min_font_size: 7.0,
            keyword_headings: [
                "skills",
                "compétences",
                "competences",
                "technical skills",
                "core competencies",
                "key skills",
                "technologies",
                "hard skills",
                "soft skills",
                "outils",
                "tools",
            ]
            .iter()
            .map(|h| h.to_string())
            .collect(),
            keyword_separator: " · ".to_string(),
            keyword_font_size: 9.0,
            keyword_color: Color::KEYWORD_GREEN,
            fallback_prefix: "Added keywords: ".to_string(),
        }
    }
}

// Keyword box placement relative to the heading / page edges.
const HEADING_GAP: f32 = 4.0;
const HEADING_BOX_BOTTOM: f32 = 22.0;
const HEADING_RIGHT_MARGIN: f32 = 40.0;
const FALLBACK_MARGIN: f32 = 40.0;
const FALLBACK_TOP: f32 = 70.0;
const FALLBACK_BOTTOM: f32 = 50.0;

// ────────────────────────────────────────────────────────────────────────────
// Edits
// ────────────────────────────────────────────────────────────────────────────

/// Finds every occurrence of `before` on the first page that has one. Each
/// tier is tried across the whole document before falling back to the next.
pub fn locate<S: PdfSurface + ?Sized>(
    surface: &mut S,
    before: &str,
    settings: &PatchSettings,
) -> Result<Vec<PageTextHit>, PatchError> {
    let tiers = search_tiers(before, &settings.prefix_lengths);

    for tier in &tiers {
        let needle = tier.needle(before);
        if needle.is_empty() {
            continue;
        }
        for page in 0..surface.page_count() {
            let matches = surface.search_text(page, &needle)?;
            if matches.is_empty() {
                continue;
            }

            let mut hits = Vec::with_capacity(matches.len());
            for m in matches {
                let font_size = match m.rects.first() {
                    Some(rect) => surface.font_size_at(page, rect)?,
                    None => None,
                };
                hits.push(PageTextHit {
                    page,
                    tier: *tier,
                    rects: m.rects,
                    font_size: font_size.unwrap_or(settings.default_font_size),
                });
            }
            return Ok(hits);
        }
    }
    Ok(Vec::new())
}

/// Box the replacement for `hit` is written into.
pub fn insertion_rect(hit: &PageTextHit, page: &Rect, settings: &PatchSettings) -> Option<Rect> {
    let first = hit.rects.first()?;
    let last = hit.rects.last()?;
    let right = (first.x0 + settings.max_insert_width)
        .min(page.width() - settings.right_margin)
        .max(first.x0);
    Some(Rect::new(first.x0, first.y0, right, last.y1 + settings.bottom_padding))
}

/// Applies `edits` in order and returns how many were applied.
pub fn apply_edits<S: PdfSurface + ?Sized>(
    surface: &mut S,
    edits: &[TextEdit],
    settings: &PatchSettings,
) -> Result<usize, PatchError> {
    let mut applied = 0;

    for (index, edit) in edits.iter().enumerate() {
        let before = edit.before.trim();
        let after = edit.after.trim();
        if before.is_empty() || after.is_empty() {
            debug!(index, section = %edit.section, "skipping empty edit");
            continue;
        }

        let hits = locate(surface, before, settings)?;
        let Some(first) = hits.first() else {
            debug!(index, section = %edit.section, before = %preview(before), "edit not located");
            continue;
        };
        let page = first.page;
        debug!(index, page, tier = ?first.tier, occurrences = hits.len(), "edit located");

        for hit in &hits {
            for rect in &hit.rects {
                surface.redact(page, rect)?;
            }
        }

        let page_rect = surface.page_rect(page)?;
        for hit in &hits {
            let Some(rect) = insertion_rect(hit, &page_rect, settings) else {
                continue;
            };
            insert_with_shrink(surface, page, &rect, after, hit.font_size, settings)?;
        }
        applied += 1;
    }
    Ok(applied)
}

/// Inserts at `size`; on overflow retries once smaller and draws regardless.
fn insert_with_shrink<S: PdfSurface + ?Sized>(
    surface: &mut S,
    page: usize,
    rect: &Rect,
    text: &str,
    size: f32,
    settings: &PatchSettings,
) -> Result<(), PatchError> {
    let style = TextStyle {
        font_size: size,
        color: Color::BLACK,
    };
    if surface.insert_text(page, rect, text, &style, FitPolicy::Strict)? {
        return Ok(());
    }

    let smaller = TextStyle {
        font_size: (size - settings.shrink_step).max(settings.min_font_size),
        ..style
    };
    if !surface.insert_text(page, rect, text, &smaller, FitPolicy::BestEffort)? {
        warn!(page, font_size = smaller.font_size, "replacement text overflows its box");
    }
    Ok(())
}

fn preview(text: &str) -> String {
    text.chars().take(40).collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Keywords
// ────────────────────────────────────────────────────────────────────────────

/// Writes the keywords under the first skills-like heading, or at the bottom
/// of the last page when there is none.
pub fn inject_keywords<S: PdfSurface + ?Sized>(
    surface: &mut S,
    keywords: &[String],
    settings: &PatchSettings,
) -> Result<KeywordPlacement, PatchError> {
    let cleaned: Vec<&str> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect();
    if cleaned.is_empty() || surface.page_count() == 0 {
        return Ok(KeywordPlacement::Skipped);
    }
    let joined = cleaned.join(&settings.keyword_separator);
    let style = TextStyle {
        font_size: settings.keyword_font_size,
        color: settings.keyword_color,
    };

    for page in 0..surface.page_count() {
        let text = surface.page_text(page)?.to_lowercase();
        for heading in &settings.keyword_headings {
            if !text.contains(heading.as_str()) {
                continue;
            }
            let matches = surface.search_text(page, heading)?;
            let Some(anchor) = matches.first().and_then(|m| m.rects.first()).copied() else {
                continue;
            };

            let page_rect = surface.page_rect(page)?;
            let rect = Rect::new(
                anchor.x0,
                anchor.y1 + HEADING_GAP,
                page_rect.width() - HEADING_RIGHT_MARGIN,
                anchor.y1 + HEADING_BOX_BOTTOM,
            );
            if !surface.insert_text(page, &rect, &joined, &style, FitPolicy::BestEffort)? {
                warn!(page, heading = %heading, "keywords overflow their box");
            }
            return Ok(KeywordPlacement::Heading {
                page,
                heading: heading.clone(),
            });
        }
    }

    let page = surface.page_count() - 1;
    debug!(page, "no skills heading found, appending keywords to last page");
    let page_rect = surface.page_rect(page)?;
    let rect = Rect::new(
        FALLBACK_MARGIN,
        page_rect.height() - FALLBACK_TOP,
        page_rect.width() - FALLBACK_MARGIN,
        page_rect.height() - FALLBACK_BOTTOM,
    );
    let text = format!("{}{}", settings.fallback_prefix, joined);
    if !surface.insert_text(page, &rect, &text, &style, FitPolicy::BestEffort)? {
        warn!(page, "keywords overflow the fallback box");
    }
    Ok(KeywordPlacement::LastPage { page })
}

// ────────────────────────────────────────────────────────────────────────────
// Entry point
// ────────────────────────────────────────────────────────────────────────────

/// Opens `bytes`, applies `edits` then `keywords`, and serialises the result.
/// A document nothing was changed in comes back byte-for-byte.
pub fn apply_ats_to_pdf(
    bytes: &[u8],
    edits: &[TextEdit],
    keywords: &[String],
    settings: &PatchSettings,
) -> Result<PatchResult, PatchError> {
    let mut surface = LopdfSurface::open(bytes)?;

    let applied = apply_edits(&mut surface, edits, settings)?;
    let placement = inject_keywords(&mut surface, keywords, settings)?;
    info!(applied, total = edits.len(), keywords = ?placement, "patched document");

    let out = if surface.is_modified() {
        surface.to_bytes()?
    } else {
        bytes.to_vec()
    };
    Ok(PatchResult {
        bytes: out,
        applied,
        total: edits.len(),
        keywords: placement,
    })
}
