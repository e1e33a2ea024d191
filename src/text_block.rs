use crate::canvas::Surface;
use crate::error::CertPressError;
use crate::font::TextMeasure;
use crate::line_break::{VisualLine, break_segments};
use crate::optical_margin::{HangTable, line_hang};
use crate::tokenizer::StyledSegment;
use crate::types::{Color, Pt};
use std::str::FromStr;

/// Box width used when a block does not set one.
pub const DEFAULT_MAX_WIDTH: f32 = 842.0;

/// Line height as a multiple of the font size when unset.
pub const DEFAULT_LINE_HEIGHT_RATIO: f32 = 1.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

impl FromStr for Align {
    type Err = CertPressError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "left" => Ok(Align::Left),
            "center" => Ok(Align::Center),
            "right" => Ok(Align::Right),
            other => Err(CertPressError::InvalidTemplate(format!(
                "unknown alignment '{other}' (expected left, center or right)"
            ))),
        }
    }
}

/// A positioned, styled paragraph. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    x: Pt,
    y: Pt,
    size: Pt,
    max_width: Pt,
    line_height: Pt,
    align: Align,
    color: Color,
    optical_margin: bool,
    segments: Vec<StyledSegment>,
}

impl TextBlock {
    pub fn builder(x: f32, y: f32, size: f32) -> TextBlockBuilder {
        TextBlockBuilder {
            x,
            y,
            size,
            max_width: None,
            line_height: None,
            align: Align::Left,
            color: Color::BLACK,
            optical_margin: None,
            segments: Vec::new(),
        }
    }

    pub fn x(&self) -> Pt {
        self.x
    }

    /// Baseline of the first line.
    pub fn y(&self) -> Pt {
        self.y
    }

    pub fn size(&self) -> Pt {
        self.size
    }

    pub fn max_width(&self) -> Pt {
        self.max_width
    }

    pub fn line_height(&self) -> Pt {
        self.line_height
    }

    pub fn align(&self) -> Align {
        self.align
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn optical_margin(&self) -> bool {
        self.optical_margin
    }

    pub fn segments(&self) -> &[StyledSegment] {
        &self.segments
    }

    /// Same block with different content.
    pub fn with_segments(&self, segments: Vec<StyledSegment>) -> TextBlock {
        TextBlock {
            segments,
            ..self.clone()
        }
    }
}

pub struct TextBlockBuilder {
    x: f32,
    y: f32,
    size: f32,
    max_width: Option<f32>,
    line_height: Option<f32>,
    align: Align,
    color: Color,
    optical_margin: Option<bool>,
    segments: Vec<StyledSegment>,
}

impl TextBlockBuilder {
    pub fn max_width(mut self, value: f32) -> Self {
        self.max_width = Some(value);
        self
    }

    pub fn line_height(mut self, value: f32) -> Self {
        self.line_height = Some(value);
        self
    }

    pub fn align(mut self, align: Align) -> Self {
        self.align = align;
        self
    }

    pub fn color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    /// Overrides the default, which is on for right-aligned blocks only.
    pub fn optical_margin(mut self, enabled: bool) -> Self {
        self.optical_margin = Some(enabled);
        self
    }

    pub fn segment(mut self, segment: StyledSegment) -> Self {
        self.segments.push(segment);
        self
    }

    pub fn segments(mut self, segments: impl IntoIterator<Item = StyledSegment>) -> Self {
        self.segments.extend(segments);
        self
    }

    pub fn build(self) -> Result<TextBlock, CertPressError> {
        require_finite("x", self.x)?;
        require_finite("y", self.y)?;
        require_finite("size", self.size)?;
        if self.size <= 0.0 {
            return Err(CertPressError::InvalidTemplate(format!(
                "size must be > 0, got {}",
                self.size
            )));
        }
        let max_width = self.max_width.unwrap_or(DEFAULT_MAX_WIDTH);
        require_finite("maxWidth", max_width)?;
        let line_height = self
            .line_height
            .unwrap_or(self.size * DEFAULT_LINE_HEIGHT_RATIO);
        require_finite("lineHeight", line_height)?;
        let color = Color::try_rgb(self.color.r, self.color.g, self.color.b)?;
        for segment in &self.segments {
            if segment.font.is_empty() {
                return Err(CertPressError::InvalidTemplate(
                    "segment font name cannot be empty".to_string(),
                ));
            }
        }
        Ok(TextBlock {
            x: Pt::from_f32(self.x),
            y: Pt::from_f32(self.y),
            size: Pt::from_f32(self.size),
            max_width: Pt::from_f32(max_width),
            line_height: Pt::from_f32(line_height),
            align: self.align,
            color,
            optical_margin: self
                .optical_margin
                .unwrap_or(self.align == Align::Right),
            segments: self.segments,
        })
    }
}

fn require_finite(field: &str, value: f32) -> Result<(), CertPressError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(CertPressError::InvalidTemplate(format!(
            "{field} must be a finite number, got {value}"
        )))
    }
}

/// A wrapped line with its paint origin resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub origin_x: Pt,
    pub baseline_y: Pt,
    /// Optical margin offset already included in `origin_x`.
    pub hang: Pt,
    pub line: VisualLine,
}

/// Wraps a block and computes where each line starts.
pub fn layout_text_block(
    block: &TextBlock,
    measure: &impl TextMeasure,
    hang_table: &HangTable,
) -> Result<Vec<PlacedLine>, CertPressError> {
    let lines = break_segments(&block.segments, block.size, block.max_width, measure)?;
    let mut placed = Vec::with_capacity(lines.len());
    let mut baseline_y = block.y;
    for line in lines {
        let slack = block.max_width - line.width();
        let mut hang = Pt::ZERO;
        let origin_x = match block.align {
            Align::Left => block.x,
            Align::Center => block.x + slack / 2,
            Align::Right => {
                if block.optical_margin {
                    hang = line_hang(&line, block.size, hang_table, measure)?;
                }
                block.x + slack + hang
            }
        };
        placed.push(PlacedLine {
            origin_x,
            baseline_y,
            hang,
            line,
        });
        baseline_y -= block.line_height;
    }
    Ok(placed)
}

/// Lays out `block` and paints every token of every line onto `surface`.
///
/// Tokens are drawn left to right in their own font, the pen advancing by
/// each token's measured width. Returns the placed lines.
pub fn render_text_block(
    surface: &mut impl Surface,
    fonts: &impl TextMeasure,
    block: &TextBlock,
    hang_table: &HangTable,
) -> Result<Vec<PlacedLine>, CertPressError> {
    let placed = layout_text_block(block, fonts, hang_table)?;
    for line in &placed {
        let mut pen_x = line.origin_x;
        for token in line.line.tokens() {
            surface.draw_text_run(
                &token.text,
                &token.font,
                block.size,
                block.color,
                pen_x,
                line.baseline_y,
            );
            pen_x += token.width;
        }
    }
    Ok(placed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{Canvas, Command};
    use crate::tokenizer::tests::FixedMeasure;
    use crate::types::Size;

    fn block(align: Align, text: &str, size: f32) -> TextBlockBuilder {
        TextBlock::builder(50.0, 500.0, size)
            .max_width(200.0)
            .align(align)
            .segment(StyledSegment::new(text, "Serif"))
    }

    fn draws(canvas: Canvas) -> Vec<(String, i64, i64)> {
        canvas
            .finish()
            .commands
            .into_iter()
            .filter_map(|cmd| match cmd {
                Command::DrawString { x, y, text } => {
                    Some((text, x.to_milli_i64(), y.to_milli_i64()))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn center_alignment_splits_the_slack() {
        // 10 glyphs of 12pt each at 24pt: width 120.
        let block = block(Align::Center, "aaaaaaaaaa", 24.0).build().unwrap();
        let placed = layout_text_block(&block, &FixedMeasure::new(), &HangTable::default())
            .unwrap();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].line.width().to_milli_i64(), 120_000);
        assert_eq!(placed[0].origin_x.to_milli_i64(), 90_000);
        assert_eq!(placed[0].baseline_y.to_milli_i64(), 500_000);
    }

    #[test]
    fn left_alignment_starts_at_block_x() {
        let block = block(Align::Left, "Hello.", 12.0).build().unwrap();
        let placed = layout_text_block(&block, &FixedMeasure::new(), &HangTable::default())
            .unwrap();
        assert_eq!(placed[0].origin_x.to_milli_i64(), 50_000);
        assert_eq!(placed[0].hang, Pt::ZERO);
    }

    #[test]
    fn right_alignment_adds_the_hang_when_enabled() {
        // "Done." is 30pt wide at 12pt, the period is 6pt.
        let block = block(Align::Right, "Done.", 12.0).build().unwrap();
        assert!(block.optical_margin());
        let placed = layout_text_block(&block, &FixedMeasure::new(), &HangTable::default())
            .unwrap();
        assert_eq!(placed[0].hang.to_milli_i64(), 3_600);
        assert_eq!(placed[0].origin_x.to_milli_i64(), 50_000 + 170_000 + 3_600);

        let flush = block_without_margin();
        let placed = layout_text_block(&flush, &FixedMeasure::new(), &HangTable::default())
            .unwrap();
        assert_eq!(placed[0].hang, Pt::ZERO);
        assert_eq!(placed[0].origin_x.to_milli_i64(), 220_000);
    }

    fn block_without_margin() -> TextBlock {
        block(Align::Right, "Done.", 12.0)
            .optical_margin(false)
            .build()
            .unwrap()
    }

    #[test]
    fn optical_margin_is_ignored_outside_right_alignment() {
        let block = block(Align::Center, "Done.", 12.0)
            .optical_margin(true)
            .build()
            .unwrap();
        let placed = layout_text_block(&block, &FixedMeasure::new(), &HangTable::default())
            .unwrap();
        assert_eq!(placed[0].hang, Pt::ZERO);
        assert_eq!(placed[0].origin_x.to_milli_i64(), 135_000);
    }

    #[test]
    fn baselines_step_down_by_line_height() {
        // Each word is 30pt wide, so only one fits in 40pt.
        let block = TextBlock::builder(10.0, 300.0, 12.0)
            .max_width(40.0)
            .segment(StyledSegment::new("aaaaa bbbbb ccccc", "Serif"))
            .build()
            .unwrap();
        assert_eq!(block.line_height().to_milli_i64(), 16_800);
        let placed = layout_text_block(&block, &FixedMeasure::new(), &HangTable::default())
            .unwrap();
        let baselines: Vec<i64> = placed.iter().map(|p| p.baseline_y.to_milli_i64()).collect();
        assert_eq!(baselines, vec![300_000, 283_200, 266_400]);

        let explicit = TextBlock::builder(10.0, 300.0, 12.0)
            .max_width(40.0)
            .line_height(20.0)
            .segment(StyledSegment::new("aaaaa bbbbb", "Serif"))
            .build()
            .unwrap();
        let placed = layout_text_block(&explicit, &FixedMeasure::new(), &HangTable::default())
            .unwrap();
        let baselines: Vec<i64> = placed.iter().map(|p| p.baseline_y.to_milli_i64()).collect();
        assert_eq!(baselines, vec![300_000, 280_000]);
    }

    #[test]
    fn tokens_are_painted_with_advancing_pen() {
        let block = TextBlock::builder(10.0, 100.0, 10.0)
            .segment(StyledSegment::new("ab ", "Serif"))
            .segment(StyledSegment::new("W", "Serif Bold"))
            .build()
            .unwrap();
        let mut canvas = Canvas::new(Size::a4());
        render_text_block(&mut canvas, &FixedMeasure::new(), &block, &HangTable::default())
            .unwrap();
        let page_fonts: Vec<Command> = canvas
            .commands()
            .iter()
            .filter(|cmd| matches!(cmd, Command::SetFontName(_)))
            .cloned()
            .collect();
        assert_eq!(page_fonts.len(), 2);
        assert_eq!(
            draws(canvas),
            vec![
                ("ab".to_string(), 10_000, 100_000),
                (" ".to_string(), 20_000, 100_000),
                ("W".to_string(), 22_500, 100_000),
            ]
        );
    }

    #[test]
    fn whitespace_only_block_paints_nothing() {
        let block = TextBlock::builder(10.0, 100.0, 12.0)
            .segment(StyledSegment::new("   ", "Serif"))
            .build()
            .unwrap();
        let mut canvas = Canvas::new(Size::a4());
        let placed =
            render_text_block(&mut canvas, &FixedMeasure::new(), &block, &HangTable::default())
                .unwrap();
        assert!(placed.is_empty());
        assert_eq!(canvas.finish().paint_count(), 0);

        let empty = TextBlock::builder(10.0, 100.0, 12.0).build().unwrap();
        let mut canvas = Canvas::new(Size::a4());
        render_text_block(&mut canvas, &FixedMeasure::new(), &empty, &HangTable::default())
            .unwrap();
        assert_eq!(canvas.finish().paint_count(), 0);
    }

    #[test]
    fn unresolved_font_aborts_painting() {
        let block = TextBlock::builder(10.0, 100.0, 12.0)
            .segment(StyledSegment::new("x", "Missing"))
            .build()
            .unwrap();
        let mut canvas = Canvas::new(Size::a4());
        let err =
            render_text_block(&mut canvas, &FixedMeasure::new(), &block, &HangTable::default())
                .unwrap_err();
        assert!(matches!(err, CertPressError::FontNotResolved(_)));
        assert_eq!(canvas.finish().paint_count(), 0);
    }

    #[test]
    fn builder_applies_defaults() {
        let block = TextBlock::builder(0.0, 0.0, 10.0).build().unwrap();
        assert_eq!(block.max_width(), Pt::from_f32(DEFAULT_MAX_WIDTH));
        assert_eq!(block.line_height().to_milli_i64(), 14_000);
        assert_eq!(block.align(), Align::Left);
        assert_eq!(block.color(), Color::BLACK);
        assert!(!block.optical_margin());
    }

    #[test]
    fn builder_rejects_invalid_values() {
        let cases = [
            TextBlock::builder(f32::NAN, 0.0, 10.0),
            TextBlock::builder(0.0, 0.0, 0.0),
            TextBlock::builder(0.0, 0.0, -3.0),
            TextBlock::builder(0.0, 0.0, 10.0).max_width(f32::INFINITY),
            TextBlock::builder(0.0, 0.0, 10.0).line_height(f32::NAN),
            TextBlock::builder(0.0, 0.0, 10.0).segment(StyledSegment::new("x", "")),
        ];
        for builder in cases {
            assert!(matches!(
                builder.build(),
                Err(CertPressError::InvalidTemplate(_))
            ));
        }
        let bad_color = TextBlock::builder(0.0, 0.0, 10.0)
            .color(Color::rgb(1.5, 0.0, 0.0))
            .build();
        assert!(matches!(bad_color, Err(CertPressError::InvalidColor(_))));
    }

    #[test]
    fn degenerate_box_width_still_lays_out() {
        let block = TextBlock::builder(0.0, 100.0, 12.0)
            .max_width(0.0)
            .segment(StyledSegment::new("one two", "Serif"))
            .build()
            .unwrap();
        let placed = layout_text_block(&block, &FixedMeasure::new(), &HangTable::default())
            .unwrap();
        assert_eq!(placed.len(), 2);
    }

    #[test]
    fn alignment_parses_known_values_only() {
        assert_eq!("left".parse::<Align>().unwrap(), Align::Left);
        assert_eq!("center".parse::<Align>().unwrap(), Align::Center);
        assert_eq!("right".parse::<Align>().unwrap(), Align::Right);
        assert!("justify".parse::<Align>().is_err());
        assert!("Right".parse::<Align>().is_err());
    }
}
