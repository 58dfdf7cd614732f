//! Display-width aware line wrapping.
//!
//! Width is counted per rune: wide (East Asian wide/fullwidth) code points
//! take two columns, everything else one. Runs of ASCII word characters never
//! split unless a single run is wider than the target; other runs may break at
//! any rune boundary.

use unicode_width::UnicodeWidthChar;

const TAB_SPACES: &str = "    ";

/// Column width of one rune.
pub fn char_width(ch: char) -> usize {
    match UnicodeWidthChar::width(ch) {
        Some(w) if w >= 2 => 2,
        _ => 1,
    }
}

pub fn str_width(value: &str) -> usize {
    value.chars().map(char_width).sum()
}

/// Truncate to at most `max` columns, appending `...` when cut.
pub fn truncate_to_width(value: &str, max: usize) -> String {
    if str_width(value) <= max {
        return value.to_string();
    }
    let budget = max.saturating_sub(3);
    let mut out = String::new();
    let mut used = 0;
    for ch in value.chars() {
        let w = char_width(ch);
        if used + w > budget {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push_str(&"..."[..max.min(3)]);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Word,
    Space,
    Other,
}

fn is_word_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

fn tokenize(paragraph: &str) -> Vec<(TokenKind, &str)> {
    let mut tokens = Vec::new();
    let mut word_start: Option<usize> = None;

    for (idx, ch) in paragraph.char_indices() {
        if is_word_char(ch) {
            word_start.get_or_insert(idx);
            continue;
        }
        if let Some(start) = word_start.take() {
            tokens.push((TokenKind::Word, &paragraph[start..idx]));
        }
        let kind = if ch == ' ' {
            TokenKind::Space
        } else {
            TokenKind::Other
        };
        tokens.push((kind, &paragraph[idx..idx + ch.len_utf8()]));
    }
    if let Some(start) = word_start {
        tokens.push((TokenKind::Word, &paragraph[start..]));
    }
    tokens
}

struct LineBuilder {
    width: usize,
    lines: Vec<String>,
    current: String,
    used: usize,
}

impl LineBuilder {
    fn new(width: usize) -> Self {
        Self {
            width,
            lines: Vec::new(),
            current: String::new(),
            used: 0,
        }
    }

    fn remaining(&self) -> usize {
        self.width - self.used
    }

    fn push_str(&mut self, value: &str, w: usize) {
        self.current.push_str(value);
        self.used += w;
    }

    fn break_line(&mut self) {
        let line = std::mem::take(&mut self.current);
        self.lines.push(line.trim_end_matches(' ').to_string());
        self.used = 0;
    }

    fn push_chars(&mut self, value: &str) {
        for ch in value.chars() {
            let w = char_width(ch);
            if w > self.remaining() && self.used > 0 {
                self.break_line();
            }
            let mut buf = [0u8; 4];
            self.push_str(ch.encode_utf8(&mut buf), w);
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.lines.push(self.current);
        self.lines
    }
}

fn wrap_paragraph(paragraph: &str, width: usize) -> Vec<String> {
    let mut builder = LineBuilder::new(width);
    let mut wrapped = false;

    for (kind, token) in tokenize(paragraph) {
        let w = str_width(token);
        match kind {
            TokenKind::Space => {
                if builder.used == 0 && wrapped {
                    continue;
                }
                if w > builder.remaining() {
                    builder.break_line();
                    wrapped = true;
                    continue;
                }
                builder.push_str(token, w);
            }
            TokenKind::Word => {
                if w <= builder.remaining() {
                    builder.push_str(token, w);
                } else if w <= width {
                    builder.break_line();
                    wrapped = true;
                    builder.push_str(token, w);
                } else {
                    builder.push_chars(token);
                    wrapped = true;
                }
            }
            TokenKind::Other => {
                if w > builder.remaining() && builder.used > 0 {
                    builder.break_line();
                    wrapped = true;
                }
                builder.push_str(token, w);
            }
        }
    }

    builder.finish()
}

/// Wrap `text` to `width` columns. Existing newlines are hard breaks; widths
/// below two are clamped to two so a wide rune always fits.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(2);
    text.replace('\r', "")
        .replace('\t', TAB_SPACES)
        .split('\n')
        .flat_map(|paragraph| wrap_paragraph(paragraph, width))
        .collect()
}
