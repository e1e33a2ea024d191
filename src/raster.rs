use crate::canvas::{Command, Page};
use crate::error::CertPressError;
use crate::font::FontTable;
use crate::types::{Color, Pt};
use tiny_skia::{FillRule, Paint, Path, PathBuilder, Pixmap, Rect, Transform};
use ttf_parser::{GlyphId, OutlineBuilder};

#[derive(Clone)]
struct RasterState {
    fill_color: Color,
    font_name: Option<String>,
    font_size: Pt,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            fill_color: Color::BLACK,
            font_name: None,
            font_size: Pt::from_f32(12.0),
        }
    }
}

/// Renders a recorded page on a white pixmap at `dpi`.
///
/// Text runs need `fonts`; a page that only paints rectangles can pass
/// `None`.
pub(crate) fn rasterize_page(
    page: &Page,
    fonts: Option<&FontTable>,
    dpi: u32,
) -> Result<Pixmap, CertPressError> {
    let width_px = pt_milli_to_px_u32(page.size.width.to_milli_i64(), dpi)?;
    let height_px = pt_milli_to_px_u32(page.size.height.to_milli_i64(), dpi)?;
    let scale = dpi as f32 / 72.0;
    let page_height_pt = page.size.height.to_f32();
    let transform = Transform::from_row(scale, 0.0, 0.0, -scale, 0.0, page_height_pt * scale);

    let mut pixmap = Pixmap::new(width_px, height_px).ok_or_else(|| {
        CertPressError::Raster(format!(
            "invalid raster size {}x{} at {} DPI",
            width_px, height_px, dpi
        ))
    })?;
    pixmap.fill(tiny_skia::Color::from_rgba8(255, 255, 255, 255));

    let mut state = RasterState::default();
    for command in &page.commands {
        match command {
            Command::SetFillColor(color) => state.fill_color = *color,
            Command::SetFontName(name) => state.font_name = Some(name.to_string()),
            Command::SetFontSize(size) => state.font_size = *size,
            Command::DrawRect {
                x,
                y,
                width,
                height,
            } => {
                let Some(rect) = Rect::from_xywh(
                    x.to_f32(),
                    y.to_f32(),
                    width.to_f32(),
                    height.to_f32(),
                ) else {
                    continue;
                };
                pixmap.fill_rect(rect, &fill_paint(state.fill_color), transform, None);
            }
            Command::DrawString { x, y, text } => {
                let Some(name) = state.font_name.as_deref() else {
                    return Err(CertPressError::Raster(
                        "text drawn before a font was selected".to_string(),
                    ));
                };
                let Some(fonts) = fonts else {
                    return Err(CertPressError::FontNotResolved(name.to_string()));
                };
                let font = fonts.get(name)?;
                draw_string(
                    &mut pixmap,
                    &state,
                    font,
                    x.to_f32(),
                    y.to_f32(),
                    text,
                    transform,
                );
            }
        }
    }
    Ok(pixmap)
}

pub(crate) fn page_to_png(
    page: &Page,
    fonts: Option<&FontTable>,
    dpi: u32,
) -> Result<Vec<u8>, CertPressError> {
    let pixmap = rasterize_page(page, fonts, dpi)?;
    pixmap
        .encode_png()
        .map_err(|e| CertPressError::Raster(format!("png encode failed: {e}")))
}

fn draw_string(
    pixmap: &mut Pixmap,
    state: &RasterState,
    font: &crate::font::EmbeddedFont,
    x: f32,
    baseline_y: f32,
    text: &str,
    transform: Transform,
) {
    let font_size = state.font_size.to_f32();
    if font_size <= 0.0 {
        return;
    }
    let Ok(face) = ttf_parser::Face::parse(font.data(), 0) else {
        return;
    };
    let scale = font_size / face.units_per_em().max(1) as f32;
    let paint = fill_paint(state.fill_color);
    let mut pen_x = x;
    for glyph in font.shape(text) {
        let origin_x = pen_x + glyph.x_offset as f32 * font_size / 1000.0;
        pen_x += glyph.advance as f32 * font_size / 1000.0;
        if glyph.glyph_id == 0 {
            continue;
        }
        let mut builder = GlyphPathBuilder::new(origin_x, baseline_y, scale);
        if face
            .outline_glyph(GlyphId(glyph.glyph_id), &mut builder)
            .is_none()
        {
            continue;
        }
        let Some(path) = builder.finish() else {
            continue;
        };
        pixmap.fill_path(&path, &paint, FillRule::Winding, transform, None);
    }
}

// Maps font units straight into PDF user space; y stays upward.
struct GlyphPathBuilder {
    builder: PathBuilder,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(origin_x: f32, origin_y: f32, scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            origin_x,
            origin_y,
            scale,
        }
    }

    fn finish(self) -> Option<Path> {
        self.builder.finish()
    }

    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin_x + x * self.scale, self.origin_y + y * self.scale)
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x, y) = self.map(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x2, y2) = self.map(x2, y2);
        let (x, y) = self.map(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

fn fill_paint(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    let [r, g, b] = color.to_rgb8();
    paint.set_color_rgba8(r, g, b, 255);
    paint.anti_alias = true;
    paint
}

fn pt_milli_to_px_u32(pt_milli: i64, dpi: u32) -> Result<u32, CertPressError> {
    if dpi == 0 {
        return Err(CertPressError::InvalidConfiguration(
            "dpi must be > 0".to_string(),
        ));
    }
    let num = (pt_milli as i128).saturating_mul(dpi as i128);
    let den = 72_000_i128;
    let px = if num >= 0 {
        (num + (den / 2)) / den
    } else {
        -(((-num) + (den / 2)) / den)
    };
    if px <= 0 {
        return Err(CertPressError::Raster(format!(
            "invalid non-positive pixel dimension {px} for pt_milli={pt_milli} dpi={dpi}"
        )));
    }
    u32::try_from(px).map_err(|_| {
        CertPressError::Raster(format!(
            "pixel dimension out of range: {px} for pt_milli={pt_milli} dpi={dpi}"
        ))
    })
}
