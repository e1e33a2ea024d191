use crate::error::CertPressError;
use crate::font::TextMeasure;
use crate::tokenizer::{StyledSegment, Token, tokenize};
use crate::types::Pt;

/// A sealed, wrapped line. Never starts or ends with a whitespace token.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualLine {
    tokens: Vec<Token>,
    width: Pt,
}

impl VisualLine {
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Sum of token widths, computed once when the line is sealed.
    pub fn width(&self) -> Pt {
        self.width
    }

    pub fn text(&self) -> String {
        self.tokens.iter().map(|t| t.text.as_str()).collect()
    }
}

struct LineBuilder {
    max_width: Pt,
    current: Vec<Token>,
    current_width: Pt,
    lines: Vec<VisualLine>,
}

impl LineBuilder {
    fn new(max_width: Pt) -> Self {
        Self {
            max_width,
            current: Vec::new(),
            current_width: Pt::ZERO,
            lines: Vec::new(),
        }
    }

    fn push(&mut self, token: Token) {
        if self.current.is_empty() {
            if token.is_whitespace {
                return;
            }
            self.start_line_with(token);
            return;
        }
        if self.current_width + token.width <= self.max_width {
            self.current_width += token.width;
            self.current.push(token);
            return;
        }
        self.seal();
        if !token.is_whitespace {
            self.start_line_with(token);
        }
    }

    // Places the first word of a line; a word wider than the box is
    // accepted on its own and sealed right away.
    fn start_line_with(&mut self, token: Token) {
        let overflows = token.width > self.max_width;
        self.current_width = token.width;
        self.current.push(token);
        if overflows {
            self.seal();
        }
    }

    fn seal(&mut self) {
        let mut tokens = std::mem::take(&mut self.current);
        self.current_width = Pt::ZERO;
        while tokens.last().is_some_and(|t| t.is_whitespace) {
            tokens.pop();
        }
        if tokens.is_empty() {
            return;
        }
        let width = tokens.iter().map(|t| t.width).sum();
        self.lines.push(VisualLine { tokens, width });
    }

    fn finish(mut self) -> Vec<VisualLine> {
        self.seal();
        self.lines
    }
}

/// Greedy first-fit wrapping of an already tokenized stream.
///
/// Never hyphenates. A single token wider than `max_width` gets a line of
/// its own, which keeps every pass making progress even for a degenerate
/// box width.
pub fn break_tokens(tokens: impl IntoIterator<Item = Token>, max_width: Pt) -> Vec<VisualLine> {
    let mut builder = LineBuilder::new(max_width);
    for token in tokens {
        builder.push(token);
    }
    builder.finish()
}

/// Tokenizes each segment on its own, in order, then wraps the result.
pub fn break_segments(
    segments: &[StyledSegment],
    size: Pt,
    max_width: Pt,
    measure: &impl TextMeasure,
) -> Result<Vec<VisualLine>, CertPressError> {
    let mut tokens = Vec::new();
    for segment in segments {
        tokens.extend(tokenize(segment, size, measure)?);
    }
    Ok(break_tokens(tokens, max_width))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tests::FixedMeasure;

    fn word(text: &str, width: f32) -> Token {
        Token {
            text: text.to_string(),
            font: "Serif".into(),
            width: Pt::from_f32(width),
            is_whitespace: false,
        }
    }

    fn space(width: f32) -> Token {
        Token {
            text: " ".to_string(),
            font: "Serif".into(),
            width: Pt::from_f32(width),
            is_whitespace: true,
        }
    }

    fn line_texts(lines: &[VisualLine]) -> Vec<String> {
        lines.iter().map(|l| l.text()).collect()
    }

    fn assert_sealed(lines: &[VisualLine]) {
        for line in lines {
            let tokens = line.tokens();
            assert!(!tokens.is_empty());
            assert!(!tokens[0].is_whitespace, "leading space in {:?}", line.text());
            assert!(
                !tokens[tokens.len() - 1].is_whitespace,
                "trailing space in {:?}",
                line.text()
            );
            let sum: Pt = tokens.iter().map(|t| t.width).sum();
            assert_eq!(sum, line.width());
        }
    }

    #[test]
    fn words_wrap_at_max_width() {
        let tokens = vec![
            word("aaaa", 40.0),
            space(5.0),
            word("bbbb", 40.0),
            space(5.0),
            word("cccc", 40.0),
        ];
        let lines = break_tokens(tokens, Pt::from_f32(90.0));
        assert_eq!(line_texts(&lines), vec!["aaaa bbbb", "cccc"]);
        assert_eq!(lines[0].width(), Pt::from_f32(85.0));
        assert_sealed(&lines);
    }

    #[test]
    fn exact_fit_stays_on_the_line() {
        let tokens = vec![word("aa", 45.0), space(10.0), word("bb", 45.0)];
        let lines = break_tokens(tokens, Pt::from_f32(100.0));
        assert_eq!(line_texts(&lines), vec!["aa bb"]);
    }

    #[test]
    fn overflowing_space_is_dropped_not_carried() {
        let tokens = vec![
            word("aaaa", 50.0),
            space(10.0),
            word("bbbb", 45.0),
        ];
        // The space fits (60) but the next word does not (105).
        let lines = break_tokens(tokens.clone(), Pt::from_f32(100.0));
        assert_eq!(line_texts(&lines), vec!["aaaa", "bbbb"]);
        assert_sealed(&lines);

        // The space itself overflows.
        let lines = break_tokens(tokens, Pt::from_f32(55.0));
        assert_eq!(line_texts(&lines), vec!["aaaa", "bbbb"]);
        assert_sealed(&lines);
    }

    #[test]
    fn oversized_word_gets_its_own_line() {
        let tokens = vec![
            word("a", 10.0),
            space(5.0),
            word("Supercalifragilistic", 300.0),
            space(5.0),
            word("b", 10.0),
        ];
        let lines = break_tokens(tokens, Pt::from_f32(100.0));
        assert_eq!(line_texts(&lines), vec!["a", "Supercalifragilistic", "b"]);
        assert_sealed(&lines);
    }

    #[test]
    fn oversized_first_word_is_sealed_immediately() {
        let tokens = vec![word("Wide", 150.0), word("tail", 10.0)];
        let lines = break_tokens(tokens, Pt::from_f32(100.0));
        assert_eq!(line_texts(&lines), vec!["Wide", "tail"]);
    }

    #[test]
    fn whitespace_only_input_produces_no_lines() {
        assert!(break_tokens(Vec::new(), Pt::from_f32(100.0)).is_empty());
        let tokens = vec![space(5.0), space(5.0)];
        assert!(break_tokens(tokens, Pt::from_f32(100.0)).is_empty());
        let tokens = vec![space(500.0)];
        assert!(break_tokens(tokens, Pt::from_f32(100.0)).is_empty());
    }

    #[test]
    fn tiny_widths_still_terminate_with_one_word_per_line() {
        for max in [1.0f32, 0.0, -5.0] {
            let tokens = vec![
                word("a", 5.0),
                space(2.0),
                word("b", 5.0),
                space(2.0),
                word("c", 5.0),
            ];
            let lines = break_tokens(tokens, Pt::from_f32(max));
            assert_eq!(line_texts(&lines), vec!["a", "b", "c"], "max={max}");
            assert_sealed(&lines);
        }
    }

    #[test]
    fn tokens_never_merge_across_segments() {
        let segments = vec![
            StyledSegment::new("Awarded to ", "Serif"),
            StyledSegment::new("Jane", "Serif Bold"),
            StyledSegment::new("Doe", "Serif Italic"),
        ];
        let lines = break_segments(
            &segments,
            Pt::from_f32(10.0),
            Pt::from_f32(1000.0),
            &FixedMeasure::new(),
        )
        .unwrap();
        assert_eq!(lines.len(), 1);
        let fonts: Vec<&str> = lines[0].tokens().iter().map(|t| t.font.as_ref()).collect();
        assert_eq!(
            fonts,
            vec!["Serif", "Serif", "Serif", "Serif", "Serif Bold", "Serif Italic"]
        );
        assert_eq!(lines[0].text(), "Awarded to JaneDoe");
    }

    #[test]
    fn segment_breaks_wrap_like_any_other_token_boundary() {
        let segments = vec![
            StyledSegment::new("aaaa ", "Serif"),
            StyledSegment::new("bbbb", "Serif Bold"),
        ];
        // Each regular glyph is 5pt at 10pt, space 2.5pt.
        let lines = break_segments(
            &segments,
            Pt::from_f32(10.0),
            Pt::from_f32(30.0),
            &FixedMeasure::new(),
        )
        .unwrap();
        assert_eq!(line_texts(&lines), vec!["aaaa", "bbbb"]);
        assert_eq!(lines[1].tokens()[0].font.as_ref(), "Serif Bold");
        assert_sealed(&lines);
    }

    #[test]
    fn sealed_lines_hold_invariants_across_widths() {
        let text = "  The quick brown fox   jumps over\tthe lazy dog.  ";
        let segments = vec![StyledSegment::new(text, "Serif")];
        let measure = FixedMeasure::new();
        for max in [1.0f32, 7.5, 20.0, 33.3, 60.0, 120.0, 1000.0] {
            let lines = break_segments(
                &segments,
                Pt::from_f32(10.0),
                Pt::from_f32(max),
                &measure,
            )
            .unwrap();
            assert!(!lines.is_empty());
            assert_sealed(&lines);
            let words: Vec<String> = lines
                .iter()
                .flat_map(|l| l.tokens().iter())
                .filter(|t| !t.is_whitespace)
                .map(|t| t.text.clone())
                .collect();
            let expected: Vec<String> = text.split_whitespace().map(str::to_string).collect();
            assert_eq!(words, expected, "max={max}");
            for line in &lines {
                if line.tokens().len() > 1 {
                    assert!(line.width() <= Pt::from_f32(max), "max={max}");
                }
            }
        }
    }
}
