//! Font decoding for the content-stream interpreter.
//!
//! Turns the byte strings of show-text operators into character codes, Unicode
//! text and advance widths. Covers simple fonts (one byte per code) and Type0
//! composite fonts (two bytes per code); a `/ToUnicode` CMap always wins over
//! the font's own encoding.

use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object};

use crate::pdf::font_metrics::{get_metrics, FontMetricTable, StandardFont};
use crate::pdf::objects::{dict_get, name, number, resolve, resolve_array, resolve_dict, stream_bytes};

/// Upper bound on entries expanded from a single `bfrange`.
const MAX_RANGE_ENTRIES: u32 = 0x1_0000;

#[derive(Debug, Clone)]
pub struct PdfFont {
    /// Bytes per character code: 1 for simple fonts, 2 for Type0.
    pub code_len: usize,
    widths: HashMap<u32, f32>,
    default_width: f32,
    /// Built-in metrics for standard fonts that ship without `/Widths`.
    builtin: Option<&'static FontMetricTable>,
    differences: HashMap<u8, String>,
    to_unicode: Option<HashMap<u32, String>>,
    /// Ascender / descender as fractions of an em.
    pub ascent: f32,
    pub descent: f32,
}

impl PdfFont {
    /// A standard font with WinAnsi encoding. Used for fonts we cannot resolve
    /// and for the resource the surface adds when inserting text.
    pub fn standard(font: StandardFont) -> PdfFont {
        let metrics = get_metrics(&font);
        PdfFont {
            code_len: 1,
            widths: HashMap::new(),
            default_width: f32::from(metrics.average_char_width),
            builtin: Some(metrics),
            differences: HashMap::new(),
            to_unicode: None,
            ascent: f32::from(metrics.ascent) / 1000.0,
            descent: f32::from(metrics.descent) / 1000.0,
        }
    }

    pub fn from_dict(doc: &Document, dict: &Dictionary) -> PdfFont {
        let subtype = dict_get(doc, dict, b"Subtype").and_then(name).unwrap_or(&b"Type1"[..]);
        let base_font = dict_get(doc, dict, b"BaseFont")
            .and_then(name)
            .map(|n| String::from_utf8_lossy(n).into_owned())
            .unwrap_or_default();
        let standard = StandardFont::from_base_font(&base_font);

        let mut font = if subtype == b"Type0" {
            Self::composite(doc, dict, standard)
        } else {
            Self::simple(doc, dict, standard)
        };

        font.to_unicode = dict_get(doc, dict, b"ToUnicode").and_then(|obj| match obj {
            Object::Stream(stream) => stream_bytes(stream).map(|data| parse_to_unicode(&data)),
            _ => None,
        });
        font
    }

    fn simple(doc: &Document, dict: &Dictionary, standard: StandardFont) -> PdfFont {
        let mut font = PdfFont::standard(standard);

        if let Some(widths) = dict_get(doc, dict, b"Widths").and_then(|o| resolve_array(doc, o)) {
            let first_char = dict_get(doc, dict, b"FirstChar").and_then(number).unwrap_or(0.0) as u32;
            for (i, w) in widths.iter().enumerate() {
                if let Some(w) = resolve(doc, w).and_then(number) {
                    font.widths.insert(first_char + i as u32, w);
                }
            }
            font.builtin = None;
        }

        if let Some(descriptor) = dict_get(doc, dict, b"FontDescriptor").and_then(|o| resolve_dict(doc, o)) {
            font.apply_descriptor(doc, descriptor);
        }

        if let Some(encoding) = dict_get(doc, dict, b"Encoding").and_then(|o| resolve_dict(doc, o)) {
            if let Some(diffs) = dict_get(doc, encoding, b"Differences").and_then(|o| resolve_array(doc, o)) {
                font.differences = parse_differences(diffs);
            }
        }
        font
    }

    fn composite(doc: &Document, dict: &Dictionary, standard: StandardFont) -> PdfFont {
        let mut font = PdfFont::standard(standard);
        font.code_len = 2;
        font.builtin = None;
        font.default_width = 1000.0;

        let descendant = dict_get(doc, dict, b"DescendantFonts")
            .and_then(|o| resolve_array(doc, o))
            .and_then(|arr| arr.first())
            .and_then(|o| resolve_dict(doc, o));

        if let Some(cid_font) = descendant {
            if let Some(dw) = dict_get(doc, cid_font, b"DW").and_then(number) {
                font.default_width = dw;
            }
            if let Some(w) = dict_get(doc, cid_font, b"W").and_then(|o| resolve_array(doc, o)) {
                font.widths = parse_cid_widths(doc, w);
            }
            if let Some(descriptor) =
                dict_get(doc, cid_font, b"FontDescriptor").and_then(|o| resolve_dict(doc, o))
            {
                font.apply_descriptor(doc, descriptor);
            }
        }
        font
    }

    fn apply_descriptor(&mut self, doc: &Document, descriptor: &Dictionary) {
        if let Some(missing) = dict_get(doc, descriptor, b"MissingWidth").and_then(number) {
            if missing > 0.0 {
                self.default_width = missing;
            }
        }
        let ascent = dict_get(doc, descriptor, b"Ascent").and_then(number);
        let descent = dict_get(doc, descriptor, b"Descent").and_then(number);
        if let (Some(a), Some(d)) = (ascent, descent) {
            // Some producers write zeros; keep the standard metrics then.
            if a > 0.0 && d < 0.0 {
                self.ascent = a / 1000.0;
                self.descent = d / 1000.0;
            }
        }
    }

    /// Splits a show-text string into character codes.
    pub fn split_codes(&self, bytes: &[u8]) -> Vec<u32> {
        if self.code_len == 2 {
            bytes
                .chunks(2)
                .map(|pair| match pair {
                    [hi, lo] => (u32::from(*hi) << 8) | u32::from(*lo),
                    [single] => u32::from(*single),
                    _ => 0,
                })
                .collect()
        } else {
            bytes.iter().map(|b| u32::from(*b)).collect()
        }
    }

    /// Serialises codes back into show-text bytes.
    pub fn encode_codes(&self, codes: &[u32]) -> Vec<u8> {
        let mut out = Vec::with_capacity(codes.len() * self.code_len);
        for code in codes {
            if self.code_len == 2 {
                out.push((code >> 8) as u8);
            }
            out.push(*code as u8);
        }
        out
    }

    /// Unicode text for one code. May be empty or longer than one char.
    pub fn decode(&self, code: u32) -> String {
        if let Some(text) = self.to_unicode.as_ref().and_then(|map| map.get(&code)) {
            return text.clone();
        }
        if self.code_len == 2 {
            return '\u{FFFD}'.to_string();
        }
        let byte = code as u8;
        if let Some(text) = self.differences.get(&byte) {
            return text.clone();
        }
        winansi_decode(byte).to_string()
    }

    /// Advance width in thousandths of an em.
    pub fn width(&self, code: u32) -> f32 {
        if let Some(w) = self.widths.get(&code) {
            return *w;
        }
        if let Some(table) = self.builtin {
            return self
                .decode(code)
                .chars()
                .map(|c| f32::from(table.char_width(c)))
                .sum();
        }
        self.default_width
    }

    /// Whether word spacing (`Tw`) applies to this code.
    pub fn is_word_space(&self, code: u32) -> bool {
        self.code_len == 1 && code == 32
    }
}

// ────────────────────────────────────────────────────────────────────────────
// WinAnsi
// ────────────────────────────────────────────────────────────────────────────

/// Code points for WinAnsiEncoding bytes 0x80..=0x9F. Unassigned slots are 0.
#[rustfmt::skip]
const WINANSI_HIGH: [u16; 32] = [
    0x20AC, 0, 0x201A, 0x0192, 0x201E, 0x2026, 0x2020, 0x2021,
    0x02C6, 0x2030, 0x0160, 0x2039, 0x0152, 0, 0x017D, 0,
    0, 0x2018, 0x2019, 0x201C, 0x201D, 0x2022, 0x2013, 0x2014,
    0x02DC, 0x2122, 0x0161, 0x203A, 0x0153, 0, 0x017E, 0x0178,
];

pub fn winansi_decode(byte: u8) -> char {
    match byte {
        0x80..=0x9F => {
            let cp = WINANSI_HIGH[usize::from(byte - 0x80)];
            if cp == 0 {
                '\u{FFFD}'
            } else {
                char::from_u32(u32::from(cp)).unwrap_or('\u{FFFD}')
            }
        }
        _ => char::from(byte),
    }
}

pub fn winansi_encode(c: char) -> Option<u8> {
    let cp = c as u32;
    match cp {
        0x20..=0x7E | 0xA0..=0xFF => Some(cp as u8),
        _ => WINANSI_HIGH
            .iter()
            .position(|&high| high != 0 && u32::from(high) == cp)
            .map(|i| 0x80 + i as u8),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Encoding /Differences
// ────────────────────────────────────────────────────────────────────────────

fn parse_differences(items: &[Object]) -> HashMap<u8, String> {
    let mut map = HashMap::new();
    let mut code: Option<u32> = None;
    for item in items {
        match item {
            Object::Integer(i) => code = u32::try_from(*i).ok(),
            Object::Name(glyph) => {
                if let Some(c) = code {
                    if let (Ok(byte), Some(text)) = (u8::try_from(c), glyph_to_text(glyph)) {
                        map.insert(byte, text);
                    }
                    code = Some(c + 1);
                }
            }
            _ => {}
        }
    }
    map
}

fn glyph_to_text(glyph: &[u8]) -> Option<String> {
    let name = std::str::from_utf8(glyph).ok()?;
    if name.chars().count() == 1 {
        return Some(name.to_string());
    }
    if let Some(hex) = name.strip_prefix("uni").or_else(|| name.strip_prefix('u')) {
        if hex.len() >= 4 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return u32::from_str_radix(&hex[..4], 16)
                .ok()
                .and_then(char::from_u32)
                .map(String::from);
        }
    }
    let text = match name {
        "space" => " ",
        "exclam" => "!",
        "quotedbl" => "\"",
        "numbersign" => "#",
        "dollar" => "$",
        "percent" => "%",
        "ampersand" => "&",
        "quotesingle" => "'",
        "parenleft" => "(",
        "parenright" => ")",
        "asterisk" => "*",
        "plus" => "+",
        "comma" => ",",
        "hyphen" | "minus" => "-",
        "period" => ".",
        "slash" => "/",
        "zero" => "0",
        "one" => "1",
        "two" => "2",
        "three" => "3",
        "four" => "4",
        "five" => "5",
        "six" => "6",
        "seven" => "7",
        "eight" => "8",
        "nine" => "9",
        "colon" => ":",
        "semicolon" => ";",
        "less" => "<",
        "equal" => "=",
        "greater" => ">",
        "question" => "?",
        "at" => "@",
        "bracketleft" => "[",
        "backslash" => "\\",
        "bracketright" => "]",
        "underscore" => "_",
        "bar" => "|",
        "bullet" => "\u{2022}",
        "endash" => "\u{2013}",
        "emdash" => "\u{2014}",
        "quoteleft" => "\u{2018}",
        "quoteright" => "\u{2019}",
        "quotedblleft" => "\u{201C}",
        "quotedblright" => "\u{201D}",
        "periodcentered" => "\u{00B7}",
        "eacute" => "é",
        "egrave" => "è",
        "ecircumflex" => "ê",
        "agrave" => "à",
        "ccedilla" => "ç",
        "ocircumflex" => "ô",
        "fi" => "fi",
        "fl" => "fl",
        "ff" => "ff",
        _ => return None,
    };
    Some(text.to_string())
}

// ────────────────────────────────────────────────────────────────────────────
// CID widths and ToUnicode CMaps
// ────────────────────────────────────────────────────────────────────────────

/// Parses a CIDFont `/W` array: `c [w1 w2 ...]` and `c_first c_last w` forms.
fn parse_cid_widths(doc: &Document, items: &[Object]) -> HashMap<u32, f32> {
    let mut widths = HashMap::new();
    let mut i = 0;
    while i < items.len() {
        let Some(first) = resolve(doc, &items[i]).and_then(number) else {
            i += 1;
            continue;
        };
        let first = first as u32;
        match items.get(i + 1).and_then(|o| resolve(doc, o)) {
            Some(Object::Array(list)) => {
                for (offset, w) in list.iter().enumerate() {
                    if let Some(w) = resolve(doc, w).and_then(number) {
                        widths.insert(first + offset as u32, w);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let last = number(last).unwrap_or(0.0) as u32;
                let w = items.get(i + 2).and_then(|o| resolve(doc, o)).and_then(number);
                if let Some(w) = w {
                    for cid in first..=last.min(first + MAX_RANGE_ENTRIES) {
                        widths.insert(cid, w);
                    }
                }
                i += 3;
            }
            None => break,
        }
    }
    widths
}

#[derive(Debug, PartialEq)]
enum CMapToken {
    Hex(Vec<u8>),
    Word(String),
    ArrayStart,
    ArrayEnd,
}

fn tokenize_cmap(data: &[u8]) -> Vec<CMapToken> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            b'<' if data.get(i + 1) != Some(&b'<') => {
                let end = data[i + 1..].iter().position(|&b| b == b'>').map(|p| i + 1 + p);
                let Some(end) = end else { break };
                let digits: Vec<u8> = data[i + 1..end]
                    .iter()
                    .copied()
                    .filter(u8::is_ascii_hexdigit)
                    .collect();
                tokens.push(CMapToken::Hex(hex_decode(&digits)));
                i = end + 1;
            }
            b'[' => {
                tokens.push(CMapToken::ArrayStart);
                i += 1;
            }
            b']' => {
                tokens.push(CMapToken::ArrayEnd);
                i += 1;
            }
            b'%' => {
                while i < data.len() && data[i] != b'\n' && data[i] != b'\r' {
                    i += 1;
                }
            }
            b if b.is_ascii_whitespace() => i += 1,
            _ => {
                let start = i;
                while i < data.len()
                    && !data[i].is_ascii_whitespace()
                    && !matches!(data[i], b'<' | b'[' | b']' | b'%')
                {
                    i += 1;
                }
                if i == start {
                    i += 1;
                    continue;
                }
                tokens.push(CMapToken::Word(String::from_utf8_lossy(&data[start..i]).into_owned()));
            }
        }
    }
    tokens
}

fn hex_decode(digits: &[u8]) -> Vec<u8> {
    let value = |d: u8| (d as char).to_digit(16).unwrap_or(0) as u8;
    digits
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => (value(*hi) << 4) | value(*lo),
            [hi] => value(*hi) << 4,
            _ => 0,
        })
        .collect()
}

fn code_of(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b))
}

fn utf16_text(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => (u16::from(*hi) << 8) | u16::from(*lo),
            [single] => u16::from(*single),
            _ => 0,
        })
        .collect();
    String::from_utf16_lossy(&units)
}

/// Offsets the last UTF-16 unit of `base` by `delta`.
fn offset_utf16(base: &[u8], delta: u32) -> String {
    let mut units: Vec<u16> = base
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => (u16::from(*hi) << 8) | u16::from(*lo),
            [single] => u16::from(*single),
            _ => 0,
        })
        .collect();
    if let Some(last) = units.last_mut() {
        *last = last.wrapping_add(delta as u16);
    }
    String::from_utf16_lossy(&units)
}

/// Parses the `bfchar` and `bfrange` sections of a ToUnicode CMap.
pub fn parse_to_unicode(data: &[u8]) -> HashMap<u32, String> {
    let tokens = tokenize_cmap(data);
    let mut map = HashMap::new();
    let mut i = 0;

    while i < tokens.len() {
        match &tokens[i] {
            CMapToken::Word(w) if w == "beginbfchar" => {
                i += 1;
                while i + 1 < tokens.len() {
                    match (&tokens[i], &tokens[i + 1]) {
                        (CMapToken::Hex(src), CMapToken::Hex(dst)) => {
                            map.insert(code_of(src), utf16_text(dst));
                            i += 2;
                        }
                        _ => break,
                    }
                }
            }
            CMapToken::Word(w) if w == "beginbfrange" => {
                i += 1;
                while i + 2 < tokens.len() {
                    let (CMapToken::Hex(lo), CMapToken::Hex(hi)) = (&tokens[i], &tokens[i + 1]) else {
                        break;
                    };
                    let (lo, hi) = (code_of(lo), code_of(hi));
                    if hi < lo || hi - lo > MAX_RANGE_ENTRIES {
                        i += 3;
                        continue;
                    }
                    match &tokens[i + 2] {
                        CMapToken::Hex(dst) => {
                            for code in lo..=hi {
                                map.insert(code, offset_utf16(dst, code - lo));
                            }
                            i += 3;
                        }
                        CMapToken::ArrayStart => {
                            let mut j = i + 3;
                            let mut code = lo;
                            while let Some(CMapToken::Hex(dst)) = tokens.get(j) {
                                if code <= hi {
                                    map.insert(code, utf16_text(dst));
                                }
                                code += 1;
                                j += 1;
                            }
                            // skip the closing bracket
                            i = j + 1;
                        }
                        _ => break,
                    }
                }
            }
            _ => i += 1,
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    #[test]
    fn test_standard_font_debug_lists_builtin_metrics() {
        let font = PdfFont::standard(StandardFont::Courier);
        let rendered = format!("{font:?}");
        assert!(rendered.contains("average_char_width: 600"), "got {rendered}");
    }

    #[test]
    fn test_winansi_round_trip_for_special_punctuation() {
        for c in ['€', '–', '—', '•', '·', 'é', 'A'] {
            let byte = winansi_encode(c).expect("encodable");
            assert_eq!(winansi_decode(byte), c);
        }
        assert_eq!(winansi_encode('漢'), None);
    }

    #[test]
    fn test_parse_to_unicode_bfchar_and_bfrange() {
        let cmap = b"/CIDInit /ProcSet findresource begin\n\
            2 beginbfchar\n<0003> <0020>\n<0011> <00660069>\nendbfchar\n\
            1 beginbfrange\n<0024> <0026> <0041>\nendbfrange\n\
            1 beginbfrange\n<0030> <0031> [<0061> <0062>]\nendbfrange\nend";
        let map = parse_to_unicode(cmap);
        assert_eq!(map.get(&0x03).map(String::as_str), Some(" "));
        assert_eq!(map.get(&0x11).map(String::as_str), Some("fi"));
        assert_eq!(map.get(&0x24).map(String::as_str), Some("A"));
        assert_eq!(map.get(&0x26).map(String::as_str), Some("C"));
        assert_eq!(map.get(&0x31).map(String::as_str), Some("b"));
    }

    #[test]
    fn test_simple_font_uses_widths_array() {
        let doc = Document::with_version("1.5");
        let dict = dictionary! {
            "Type" => "Font",
            "Subtype" => "TrueType",
            "BaseFont" => "Arial",
            "FirstChar" => 65,
            "Widths" => vec![Object::Integer(700), Object::Integer(650)],
        };
        let font = PdfFont::from_dict(&doc, &dict);
        assert_eq!(font.width(65), 700.0);
        assert_eq!(font.width(66), 650.0);
        assert_eq!(font.decode(65), "A");
    }

    #[test]
    fn test_standard_font_without_widths_uses_builtin_table() {
        let doc = Document::with_version("1.5");
        let dict = dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        };
        let font = PdfFont::from_dict(&doc, &dict);
        assert_eq!(font.width(u32::from(b'W')), 944.0);
    }

    #[test]
    fn test_differences_override_encoding() {
        let doc = Document::with_version("1.5");
        let dict = dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => dictionary! {
                "Differences" => vec![Object::Integer(1), Object::Name(b"bullet".to_vec()), Object::Name(b"uni00E9".to_vec())],
            },
        };
        let font = PdfFont::from_dict(&doc, &dict);
        assert_eq!(font.decode(1), "\u{2022}");
        assert_eq!(font.decode(2), "é");
    }

    #[test]
    fn test_composite_font_splits_two_byte_codes() {
        let doc = Document::with_version("1.5");
        let dict = dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => "Calibri",
            "DescendantFonts" => vec![Object::Dictionary(dictionary! {
                "Type" => "Font",
                "Subtype" => "CIDFontType2",
                "DW" => 500,
                "W" => vec![Object::Integer(3), Object::Array(vec![Object::Integer(226), Object::Integer(579)])],
            })],
        };
        let font = PdfFont::from_dict(&doc, &dict);
        assert_eq!(font.split_codes(&[0x00, 0x03, 0x00, 0x04]), vec![3, 4]);
        assert_eq!(font.width(3), 226.0);
        assert_eq!(font.width(4), 579.0);
        assert_eq!(font.width(99), 500.0);
        assert_eq!(font.encode_codes(&[3, 4]), vec![0x00, 0x03, 0x00, 0x04]);
    }
}
