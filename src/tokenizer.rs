use crate::error::CertPressError;
use crate::font::TextMeasure;
use crate::types::Pt;
use std::sync::Arc;

/// A run of text drawn in one font. Adjacent segments concatenate literally.
#[derive(Debug, Clone, PartialEq)]
pub struct StyledSegment {
    pub text: String,
    pub font: Arc<str>,
}

impl StyledSegment {
    pub fn new(text: impl Into<String>, font: impl Into<Arc<str>>) -> Self {
        Self {
            text: text.into(),
            font: font.into(),
        }
    }
}

/// Smallest layout unit: one font, one measured width.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub text: String,
    pub font: Arc<str>,
    pub width: Pt,
    pub is_whitespace: bool,
}

/// Splits a segment into alternating word and whitespace runs.
///
/// Whitespace runs are kept as their own tokens, so joining every token's
/// text gives back the segment text exactly. Line feeds count as ordinary
/// whitespace; no hard break is ever produced here.
pub fn tokenize(
    segment: &StyledSegment,
    size: Pt,
    measure: &impl TextMeasure,
) -> Result<Vec<Token>, CertPressError> {
    let mut tokens = Vec::new();
    for (text, is_whitespace) in split_runs(&segment.text) {
        let width = measure.text_width(&segment.font, size, text)?;
        tokens.push(Token {
            text: text.to_string(),
            font: segment.font.clone(),
            width,
            is_whitespace,
        });
    }
    Ok(tokens)
}

fn split_runs(text: &str) -> Vec<(&str, bool)> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut current: Option<bool> = None;
    for (idx, ch) in text.char_indices() {
        // Unicode White_Space: U+0085 splits a word, U+FEFF does not.
        let ws = ch.is_whitespace();
        match current {
            Some(kind) if kind == ws => {}
            Some(kind) => {
                runs.push((&text[start..idx], kind));
                start = idx;
                current = Some(ws);
            }
            None => current = Some(ws),
        }
    }
    if let Some(kind) = current {
        if start < text.len() {
            runs.push((&text[start..], kind));
        }
    }
    runs
}
