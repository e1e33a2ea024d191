use crate::error::CertPressError;
use crate::font::TextMeasure;
use crate::line_break::VisualLine;
use crate::types::Pt;
use std::collections::BTreeMap;

/// Fraction of a trailing glyph's width that may hang past the right edge.
#[derive(Debug, Clone, PartialEq)]
pub struct HangTable {
    factors: BTreeMap<char, f32>,
}

const DEFAULT_HANG: &[(char, f32)] = &[
    ('.', 0.6),
    (',', 0.6),
    (';', 0.5),
    (':', 0.5),
    ('!', 0.45),
    ('?', 0.45),
    ('\u{2026}', 0.9),
    ('\'', 0.35),
    ('\u{2018}', 0.35),
    ('\u{2019}', 0.35),
    ('"', 0.35),
    ('\u{201C}', 0.35),
    ('\u{201D}', 0.35),
    (')', 0.25),
    (']', 0.25),
    ('\u{00BB}', 0.35),
];

impl Default for HangTable {
    fn default() -> Self {
        Self {
            factors: DEFAULT_HANG.iter().copied().collect(),
        }
    }
}

impl HangTable {
    /// A table with no hanging characters.
    pub fn empty() -> Self {
        Self {
            factors: BTreeMap::new(),
        }
    }

    /// Sets the factor for `ch`. Factors must lie in `(0, 1]`.
    pub fn with(mut self, ch: char, factor: f32) -> Result<Self, CertPressError> {
        if !factor.is_finite() || factor <= 0.0 || factor > 1.0 {
            return Err(CertPressError::InvalidConfiguration(format!(
                "hang factor for {ch:?} must be in (0, 1], got {factor}"
            )));
        }
        self.factors.insert(ch, factor);
        Ok(self)
    }

    pub fn without(mut self, ch: char) -> Self {
        self.factors.remove(&ch);
        self
    }

    pub fn factor(&self, ch: char) -> Option<f32> {
        self.factors.get(&ch).copied()
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }
}

/// How far a right-aligned line may extend past the box edge.
///
/// Walks the last non-whitespace token backwards one character at a time,
/// adding `glyph_width * factor` for each character found in `table` and
/// stopping at the first one that is not. The result is never negative.
pub fn line_hang(
    line: &VisualLine,
    size: Pt,
    table: &HangTable,
    measure: &impl TextMeasure,
) -> Result<Pt, CertPressError> {
    let Some(last) = line
        .tokens()
        .iter()
        .rev()
        .find(|t| !t.is_whitespace && !t.text.is_empty())
    else {
        return Ok(Pt::ZERO);
    };

    let mut hang = Pt::ZERO;
    let mut buf = [0u8; 4];
    for ch in last.text.chars().rev() {
        let Some(factor) = table.factor(ch) else {
            break;
        };
        let glyph = measure.text_width(&last.font, size, ch.encode_utf8(&mut buf))?;
        hang += glyph * factor;
    }
    Ok(hang.max(Pt::ZERO))
}
