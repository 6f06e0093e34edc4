//! Static glyph-width tables for the PDF standard fonts used by the surface.
//!
//! Widths are in thousandths of an em (the unit of a PDF `/Widths` array), so a
//! glyph is `width / 1000 * font_size` points wide. Tables cover ASCII
//! 0x20..=0x7E; index = (char as usize) - 32. They serve two purposes: sizing
//! glyphs of standard-14 fonts that ship without a `/Widths` array, and
//! word-wrapping the text the surface inserts with its own Helvetica resource.

// ────────────────────────────────────────────────────────────────────────────
// Font enum
// ────────────────────────────────────────────────────────────────────────────

/// Standard font families with built-in metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardFont {
    /// Helvetica / Arial and any unknown sans fallback.
    Helvetica,
    HelveticaBold,
    /// Times-Roman and serif fallbacks.
    Times,
    /// Fixed pitch, every glyph 600.
    Courier,
}

impl StandardFont {
    /// Picks the closest table for a `/BaseFont` name, ignoring subset prefixes
    /// such as `ABCDEF+`.
    pub fn from_base_font(name: &str) -> StandardFont {
        let base = name.split_once('+').map(|(_, rest)| rest).unwrap_or(name);
        let lower = base.to_ascii_lowercase();
        if lower.contains("courier") || lower.contains("mono") {
            StandardFont::Courier
        } else if lower.contains("times") || lower.contains("serif") || lower.contains("georgia")
        {
            StandardFont::Times
        } else if lower.contains("bold") {
            StandardFont::HelveticaBold
        } else {
            StandardFont::Helvetica
        }
    }

    /// PostScript name written into a `/BaseFont` entry.
    pub fn base_font_name(&self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::HelveticaBold => "Helvetica-Bold",
            StandardFont::Times => "Times-Roman",
            StandardFont::Courier => "Courier",
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Metric table
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct FontMetricTable {
    widths: [u16; 95],
    /// Fallback for characters outside the table.
    pub average_char_width: u16,
    /// Ascender and descender in thousandths of an em (descent is negative).
    pub ascent: i16,
    pub descent: i16,
}

impl FontMetricTable {
    /// Width of one character in thousandths of an em.
    pub fn char_width(&self, c: char) -> u16 {
        let code = c as usize;
        if (32..=126).contains(&code) {
            return self.widths[code - 32];
        }
        match c {
            '\u{00A0}' => self.widths[0],
            '\u{00B7}' => self.widths[14], // periodcentered matches period
            '\u{2022}' => 350,
            '\u{2013}' => 556,
            '\u{2014}' => 1000,
            '\u{2018}' | '\u{2019}' => self.widths[7],
            _ => self.average_char_width,
        }
    }

    /// Rendered width of `s` in points at `font_size`.
    pub fn measure_str(&self, s: &str, font_size: f32) -> f32 {
        let units: u32 = s.chars().map(|c| u32::from(self.char_width(c))).sum();
        units as f32 / 1000.0 * font_size
    }

    /// Greedy word wrap to `max_width` points. Words wider than a full line are
    /// broken at character boundaries. Always returns at least one line.
    pub fn wrap_lines(&self, text: &str, max_width: f32, font_size: f32) -> Vec<String> {
        let space_width = self.measure_str(" ", font_size);
        let mut lines = Vec::new();
        let mut current = String::new();
        let mut current_width = 0.0_f32;

        for word in text.split_whitespace() {
            let word_width = self.measure_str(word, font_size);

            if word_width > max_width {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let mut chunk_width = 0.0_f32;
                for c in word.chars() {
                    let w = f32::from(self.char_width(c)) / 1000.0 * font_size;
                    if chunk_width + w > max_width && !current.is_empty() {
                        lines.push(std::mem::take(&mut current));
                        chunk_width = 0.0;
                    }
                    current.push(c);
                    chunk_width += w;
                }
                current_width = chunk_width;
                continue;
            }

            if current.is_empty() {
                current.push_str(word);
                current_width = word_width;
            } else if current_width + space_width + word_width <= max_width {
                current.push(' ');
                current.push_str(word);
                current_width += space_width + word_width;
            } else {
                lines.push(std::mem::take(&mut current));
                current.push_str(word);
                current_width = word_width;
            }
        }

        if !current.is_empty() || lines.is_empty() {
            lines.push(current);
        }
        lines
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Static width tables (Adobe core AFM values)
// ────────────────────────────────────────────────────────────────────────────

static HELVETICA_TABLE: FontMetricTable = FontMetricTable {
    #[rustfmt::skip]
    widths: [
        // sp   !    "    #    $    %    &    '    (    )    *    +    ,    -    .    /
        278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
        // 0-9
        556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
        // :    ;    <    =    >    ?    @
        278, 278, 584, 584, 584, 556, 1015,
        // A-M
        667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833,
        // N-Z
        722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611,
        // [    \    ]    ^    _    `
        278, 278, 278, 469, 556, 333,
        // a-m
        556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833,
        // n-z
        556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500,
        // {    |    }    ~
        334, 260, 334, 584,
    ],
    average_char_width: 556,
    ascent: 718,
    descent: -207,
};

static HELVETICA_BOLD_TABLE: FontMetricTable = FontMetricTable {
    #[rustfmt::skip]
    widths: [
        278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
        556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
        333, 333, 584, 584, 584, 611, 975,
        722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833,
        722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611,
        333, 278, 333, 584, 556, 333,
        556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889,
        611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500,
        389, 280, 389, 584,
    ],
    average_char_width: 580,
    ascent: 718,
    descent: -207,
};

static TIMES_TABLE: FontMetricTable = FontMetricTable {
    #[rustfmt::skip]
    widths: [
        250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278,
        500, 500, 500, 500, 500, 500, 500, 500, 500, 500,
        278, 278, 564, 564, 564, 444, 921,
        722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889,
        722, 722, 556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611,
        333, 278, 333, 469, 500, 333,
        444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778,
        500, 500, 500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444,
        480, 200, 480, 541,
    ],
    average_char_width: 480,
    ascent: 683,
    descent: -217,
};

static COURIER_TABLE: FontMetricTable = FontMetricTable {
    widths: [600; 95],
    average_char_width: 600,
    ascent: 629,
    descent: -157,
};

pub fn get_metrics(font: &StandardFont) -> &'static FontMetricTable {
    match font {
        StandardFont::Helvetica => &HELVETICA_TABLE,
        StandardFont::HelveticaBold => &HELVETICA_BOLD_TABLE,
        StandardFont::Times => &TIMES_TABLE,
        StandardFont::Courier => &COURIER_TABLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure_str_empty_returns_zero() {
        let metrics = get_metrics(&StandardFont::Helvetica);
        assert_eq!(metrics.measure_str("", 10.0), 0.0);
    }

    #[test]
    fn test_measure_str_ascii_characters() {
        let metrics = get_metrics(&StandardFont::Helvetica);
        // "Java" = J(500) + a(556) + v(500) + a(556) = 2112 units
        let width = metrics.measure_str("Java", 10.0);
        assert!((width - 21.12).abs() < 1e-3, "got {width}");
    }

    #[test]
    fn test_courier_is_fixed_pitch() {
        let metrics = get_metrics(&StandardFont::Courier);
        assert_eq!(metrics.measure_str("iiii", 10.0), metrics.measure_str("WWWW", 10.0));
    }

    #[test]
    fn test_middle_dot_falls_back_to_period_width() {
        let metrics = get_metrics(&StandardFont::Helvetica);
        assert_eq!(metrics.char_width('·'), metrics.char_width('.'));
    }

    #[test]
    fn test_from_base_font_strips_subset_prefix() {
        assert_eq!(StandardFont::from_base_font("ABCDEF+Arial-BoldMT"), StandardFont::HelveticaBold);
        assert_eq!(StandardFont::from_base_font("Times-Roman"), StandardFont::Times);
        assert_eq!(StandardFont::from_base_font("CourierNewPSMT"), StandardFont::Courier);
        assert_eq!(StandardFont::from_base_font("Calibri"), StandardFont::Helvetica);
    }

    #[test]
    fn test_wrap_lines_short_text_is_one_line() {
        let metrics = get_metrics(&StandardFont::Helvetica);
        let lines = metrics.wrap_lines("Proficient in Python", 400.0, 10.0);
        assert_eq!(lines, vec!["Proficient in Python".to_string()]);
    }

    #[test]
    fn test_wrap_lines_breaks_at_width() {
        let metrics = get_metrics(&StandardFont::Helvetica);
        let text = "Expert in Python, Java, and distributed systems design.";
        let lines = metrics.wrap_lines(text, 100.0, 10.0);
        assert!(lines.len() >= 3, "expected wrap, got {lines:?}");
        for line in &lines {
            assert!(metrics.measure_str(line, 10.0) <= 100.0 + 1e-3);
        }
        assert_eq!(lines.join(" "), text);
    }

    #[test]
    fn test_wrap_lines_breaks_overlong_word() {
        let metrics = get_metrics(&StandardFont::Helvetica);
        let lines = metrics.wrap_lines("Supercalifragilistic", 30.0, 10.0);
        assert!(lines.len() > 1);
        assert_eq!(lines.concat(), "Supercalifragilistic");
    }

    #[test]
    fn test_wrap_lines_empty_text_yields_single_empty_line() {
        let metrics = get_metrics(&StandardFont::Helvetica);
        assert_eq!(metrics.wrap_lines("   ", 100.0, 10.0), vec![String::new()]);
    }
}
