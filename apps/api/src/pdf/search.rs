//! Text matching: search tiers for an edit and whitespace-insensitive lookup
//! of a needle in a laid-out page.

use std::ops::Range;

use crate::pdf::geometry::Rect;
use crate::pdf::text_layout::PageLayout;

// ────────────────────────────────────────────────────────────────────────────
// Tiers
// ────────────────────────────────────────────────────────────────────────────

/// How much of an edit's `before` text is being looked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTier {
    Exact,
    /// The first `n` characters, trimmed.
    Prefix(usize),
}

impl SearchTier {
    pub fn needle(&self, before: &str) -> String {
        match self {
            SearchTier::Exact => before.to_string(),
            SearchTier::Prefix(n) => before.chars().take(*n).collect::<String>().trim().to_string(),
        }
    }
}

/// Tiers to try for `before`, most specific first. A prefix tier is only
/// used when `before` is strictly longer than the prefix.
pub fn search_tiers(before: &str, prefix_lengths: &[usize]) -> Vec<SearchTier> {
    let len = before.chars().count();
    let mut tiers = vec![SearchTier::Exact];
    tiers.extend(
        prefix_lengths
            .iter()
            .filter(|n| len > **n)
            .map(|n| SearchTier::Prefix(*n)),
    );
    tiers
}

// ────────────────────────────────────────────────────────────────────────────
// Normalisation
// ────────────────────────────────────────────────────────────────────────────

/// Lowercased text with whitespace runs collapsed to one space, remembering
/// which source char each normalised char came from.
#[derive(Debug, Default)]
pub struct NormalizedText {
    pub chars: Vec<char>,
    pub source: Vec<usize>,
}

impl NormalizedText {
    pub fn new(text: &str) -> Self {
        let mut out = NormalizedText::default();
        let mut pending_space: Option<usize> = None;

        for (i, c) in text.chars().enumerate() {
            if c.is_whitespace() {
                if pending_space.is_none() {
                    pending_space = Some(i);
                }
                continue;
            }
            if let Some(at) = pending_space.take() {
                if !out.chars.is_empty() {
                    out.chars.push(' ');
                    out.source.push(at);
                }
            }
            out.chars.push(fold_case(c));
            out.source.push(i);
        }
        out
    }
}

fn fold_case(c: char) -> char {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) => l,
        _ => c,
    }
}

/// Normalised form of a search needle.
pub fn normalize(text: &str) -> Vec<char> {
    NormalizedText::new(text).chars
}

/// Non-overlapping occurrences of `needle` in `haystack`, left to right.
pub fn find_char_ranges(haystack: &[char], needle: &[char]) -> Vec<Range<usize>> {
    let mut found = Vec::new();
    if needle.is_empty() || needle.len() > haystack.len() {
        return found;
    }
    let mut start = 0;
    while start + needle.len() <= haystack.len() {
        if haystack[start..start + needle.len()] == *needle {
            found.push(start..start + needle.len());
            start += needle.len();
        } else {
            start += 1;
        }
    }
    found
}

// ────────────────────────────────────────────────────────────────────────────
// Layout lookup
// ────────────────────────────────────────────────────────────────────────────

/// Every occurrence of `needle` on the page, each as one rectangle per visual
/// line it covers, top to bottom.
pub fn find_in_layout(layout: &PageLayout, needle: &str) -> Vec<Vec<Rect>> {
    let needle = normalize(needle);
    let haystack = NormalizedText::new(&layout.text);

    find_char_ranges(&haystack.chars, &needle)
        .into_iter()
        .map(|range| {
            let first = haystack.source[range.start];
            let last = haystack.source[range.end - 1];
            line_rects(layout, first..last + 1)
        })
        .filter(|rects| !rects.is_empty())
        .collect()
}

/// Union of glyph boxes per line for a range of `layout.text` chars.
fn line_rects(layout: &PageLayout, chars: Range<usize>) -> Vec<Rect> {
    let mut rects: Vec<(usize, Rect)> = Vec::new();
    for i in chars {
        let Some(Some(glyph)) = layout.char_glyph.get(i) else {
            continue;
        };
        let line = layout.char_line[i];
        let bbox = layout.glyphs[*glyph].bbox;
        match rects.last_mut() {
            Some((l, rect)) if *l == line => *rect = rect.union(&bbox),
            _ => rects.push((line, bbox)),
        }
    }
    rects.into_iter().map(|(_, r)| r).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::font::PdfFont;
    use crate::pdf::font_metrics::StandardFont;
    use crate::pdf::text_layout::{interpret, FontSet};
    use lopdf::content::Content;
    use std::collections::HashMap;

    fn layout_of(stream: &str) -> PageLayout {
        let mut fonts = HashMap::new();
        fonts.insert(b"F1".to_vec(), PdfFont::standard(StandardFont::Helvetica));
        let content = Content::decode(stream.as_bytes()).expect("valid content");
        interpret(&content.operations, &FontSet::new(fonts), [0.0, 0.0, 612.0, 792.0])
    }

    #[test]
    fn test_tiers_for_short_text_is_exact_only() {
        assert_eq!(search_tiers("Led a team", &[60, 30]), vec![SearchTier::Exact]);
    }

    #[test]
    fn test_exactly_sixty_chars_skips_sixty_tier() {
        let before = "a".repeat(60);
        assert_eq!(
            search_tiers(&before, &[60, 30]),
            vec![SearchTier::Exact, SearchTier::Prefix(30)]
        );
    }

    #[test]
    fn test_long_text_gets_both_prefix_tiers() {
        let before = "x".repeat(200);
        let tiers = search_tiers(&before, &[60, 30]);
        assert_eq!(tiers.len(), 3);
        assert_eq!(tiers[1].needle(&before).chars().count(), 60);
    }

    #[test]
    fn test_prefix_needle_is_trimmed() {
        let before = format!("{} tail that goes on and on", "word ".repeat(6));
        // first 30 chars end with a space
        assert!(!SearchTier::Prefix(30).needle(&before).ends_with(' '));
    }

    #[test]
    fn test_normalize_collapses_whitespace_and_case() {
        let n = NormalizedText::new("  Led\n a  TEAM ");
        assert_eq!(n.chars.iter().collect::<String>(), "led a team");
        assert_eq!(n.source[0], 2);
    }

    #[test]
    fn test_find_char_ranges_non_overlapping() {
        let hay: Vec<char> = "aaaa".chars().collect();
        let needle: Vec<char> = "aa".chars().collect();
        assert_eq!(find_char_ranges(&hay, &needle), vec![0..2, 2..4]);
    }

    #[test]
    fn test_find_in_layout_single_line() {
        let layout = layout_of("BT /F1 10 Tf 72 700 Td (Managed budgets) Tj ET");
        let hits = find_in_layout(&layout, "managed");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].len(), 1);
        let rect = hits[0][0];
        assert!((rect.x0 - 72.0).abs() < 1e-3);
        assert!(rect.y0 < 92.0 && rect.y1 > 92.0);
    }

    #[test]
    fn test_find_in_layout_across_lines_yields_rect_per_line() {
        let layout = layout_of("BT /F1 10 Tf 14 TL 72 700 Td (Built data) Tj T* (pipelines fast) Tj ET");
        let hits = find_in_layout(&layout, "data pipelines");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].len(), 2);
        assert!(hits[0][0].y0 < hits[0][1].y0);
    }

    #[test]
    fn test_find_in_layout_missing_text() {
        let layout = layout_of("BT /F1 10 Tf 72 700 Td (Rust) Tj ET");
        assert!(find_in_layout(&layout, "Golang").is_empty());
    }
}
