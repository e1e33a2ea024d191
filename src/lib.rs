mod canvas;
mod debug;
mod error;
mod finalize;
mod font;
mod line_break;
mod metrics;
mod optical_margin;
mod pdf;
mod perf;
mod qr;
mod raster;
mod template;
#[cfg(test)]
mod test_font;
mod text_block;
mod tokenizer;
mod types;

pub use canvas::{Canvas, Command, Page, Surface};
use debug::DebugLogger;
pub use error::CertPressError;
pub use font::{EmbeddedFont, FontTable, TextMeasure, TypefaceRegistry, resolve_fonts};
pub use line_break::{VisualLine, break_segments, break_tokens};
pub use metrics::{BlockMetrics, RenderMetrics};
pub use optical_margin::{HangTable, line_hang};
use perf::{PerfLogger, perf_end, perf_start};
pub use qr::{QrCodeBlock, QrErrorCorrection, QrMatrix, render_qr_code};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
pub use template::{CertificateTemplate, Recipient};
pub use text_block::{
    Align, DEFAULT_LINE_HEIGHT_RATIO, DEFAULT_MAX_WIDTH, PlacedLine, TextBlock, TextBlockBuilder,
    layout_text_block, render_text_block,
};
pub use tokenizer::{StyledSegment, Token, tokenize};
pub use types::{Color, Pt, Size};

/// Certificate renderer. Cheap to share across threads; every render call
/// resolves its own font table from the shared registry.
pub struct CertPress {
    default_page_size: Size,
    default_max_width: f32,
    registry: Arc<TypefaceRegistry>,
    hang_table: HangTable,
    debug: Option<Arc<DebugLogger>>,
    perf: Option<Arc<PerfLogger>>,
    calls: AtomicU64,
}

// Identifies one public call and, inside a batch, the item being rendered.
#[derive(Debug, Clone, Copy)]
struct RenderScope {
    call: u64,
    render_id: Option<usize>,
}

/// Output of laying out one certificate, before serialisation.
#[derive(Debug)]
pub struct RenderedPage {
    pub page: Page,
    pub fonts: FontTable,
    pub metrics: RenderMetrics,
}

impl CertPress {
    pub fn builder() -> CertPressBuilder {
        CertPressBuilder::new()
    }

    fn next_call(&self) -> u64 {
        self.calls.fetch_add(1, Ordering::Relaxed)
    }

    fn single_scope(&self) -> RenderScope {
        RenderScope {
            call: self.next_call(),
            render_id: None,
        }
    }

    fn emit_debug_summary(&self, call: u64, context: &str) {
        if let Some(logger) = self.debug.as_deref() {
            logger.emit_summary(call, context);
            logger.flush();
        }
        if let Some(perf) = self.perf.as_deref() {
            perf.flush();
        }
    }

    fn log_render_error(&self, scope: RenderScope, stage: &str, err: &CertPressError) {
        if let Some(logger) = self.debug.as_deref() {
            logger.log_event(
                "render.error",
                json!({
                    "call": scope.call,
                    "render_id": scope.render_id,
                    "stage": stage,
                    "error": err.to_string(),
                }),
            );
            logger.increment(scope.call, "errors", 1);
        }
    }

    pub fn default_page_size(&self) -> Size {
        self.default_page_size
    }

    pub fn default_max_width(&self) -> f32 {
        self.default_max_width
    }

    pub fn registry(&self) -> &TypefaceRegistry {
        &self.registry
    }

    pub fn hang_table(&self) -> &HangTable {
        &self.hang_table
    }

    /// Parses a JSON template using this renderer's page and width defaults.
    pub fn template_from_json(&self, json: &str) -> Result<CertificateTemplate, CertPressError> {
        CertificateTemplate::from_json(json, self.default_max_width, self.default_page_size)
    }

    pub fn render_page(
        &self,
        template: &CertificateTemplate,
        recipient: &Recipient,
    ) -> Result<RenderedPage, CertPressError> {
        let scope = self.single_scope();
        let result = self.render_page_at(scope, template, recipient);
        self.emit_debug_summary(scope.call, "render_page");
        result
    }

    /// Renders a standalone one-page PDF.
    pub fn render_pdf(
        &self,
        template: &CertificateTemplate,
        recipient: &Recipient,
    ) -> Result<Vec<u8>, CertPressError> {
        let scope = self.single_scope();
        let result = self.render_pdf_at(scope, template, recipient);
        self.emit_debug_summary(scope.call, "render_pdf");
        result
    }

    /// Renders the certificate and stamps it over the first page of
    /// `background_pdf`.
    pub fn render_onto_background(
        &self,
        background_pdf: &[u8],
        template: &CertificateTemplate,
        recipient: &Recipient,
    ) -> Result<Vec<u8>, CertPressError> {
        let scope = self.single_scope();
        let result = self
            .render_pdf_at(scope, template, recipient)
            .and_then(|overlay| {
                let t_stamp = perf_start(self.perf.as_deref());
                let stamped = finalize::stamp_overlay(background_pdf, &overlay);
                perf_end(self.perf.as_deref(), "render.stamp", None, t_stamp);
                stamped.inspect_err(|err| self.log_render_error(scope, "stamp", err))
            });
        self.emit_debug_summary(scope.call, "render_onto_background");
        result
    }

    /// Rasterises the certificate to PNG at `dpi`.
    pub fn render_png(
        &self,
        template: &CertificateTemplate,
        recipient: &Recipient,
        dpi: u32,
    ) -> Result<Vec<u8>, CertPressError> {
        let scope = self.single_scope();
        let result = self
            .render_page_at(scope, template, recipient)
            .and_then(|rendered| {
                let t_raster = perf_start(self.perf.as_deref());
                let png = raster::page_to_png(&rendered.page, Some(&rendered.fonts), dpi);
                perf_end(self.perf.as_deref(), "render.raster", None, t_raster);
                png.inspect_err(|err| self.log_render_error(scope, "raster", err))
            });
        self.emit_debug_summary(scope.call, "render_png");
        result
    }

    /// Renders one PDF per recipient on the rayon pool.
    ///
    /// Results keep input order and each item succeeds or fails on its own.
    pub fn render_many_pdf_parallel(
        &self,
        template: &CertificateTemplate,
        recipients: &[Recipient],
    ) -> Vec<Result<Vec<u8>, CertPressError>> {
        use rayon::prelude::*;

        let call = self.next_call();
        let results: Vec<Result<Vec<u8>, CertPressError>> = recipients
            .par_iter()
            .enumerate()
            .map(|(idx, recipient)| {
                let scope = RenderScope {
                    call,
                    render_id: Some(idx),
                };
                self.render_pdf_at(scope, template, recipient)
            })
            .collect();
        self.emit_debug_summary(call, "render_many_pdf_parallel");
        results
    }

    fn render_pdf_at(
        &self,
        scope: RenderScope,
        template: &CertificateTemplate,
        recipient: &Recipient,
    ) -> Result<Vec<u8>, CertPressError> {
        let rendered = self.render_page_at(scope, template, recipient)?;
        let t_pdf = perf_start(self.perf.as_deref());
        let pdf = pdf::page_to_pdf(&rendered.page, &rendered.fonts);
        perf_end(self.perf.as_deref(), "render.pdf", scope.render_id, t_pdf);
        pdf.inspect_err(|err| self.log_render_error(scope, "pdf", err))
    }

    fn render_page_at(
        &self,
        scope: RenderScope,
        template: &CertificateTemplate,
        recipient: &Recipient,
    ) -> Result<RenderedPage, CertPressError> {
        self.render_page_inner(scope, template, recipient)
            .inspect_err(|err| self.log_render_error(scope, "layout", err))
    }

    fn render_page_inner(
        &self,
        scope: RenderScope,
        template: &CertificateTemplate,
        recipient: &Recipient,
    ) -> Result<RenderedPage, CertPressError> {
        let RenderScope { call, render_id } = scope;
        let perf = self.perf.as_deref();
        let debug = self.debug.as_deref();

        let texts = template.bind_texts(recipient)?;
        let qr = template.bind_qr(recipient)?;

        // Every font is resolved before anything is painted.
        let t_fonts = perf_start(perf);
        let fonts = resolve_fonts(&texts, &self.registry);
        perf_end(perf, "render.fonts", render_id, t_fonts);
        let fonts = fonts?;
        if let Some(logger) = debug {
            let names: Vec<&str> = fonts.iter().map(|font| font.name()).collect();
            logger.log_event(
                "font.resolve",
                json!({ "render_id": render_id, "fonts": names }),
            );
        }

        let mut canvas = Canvas::new(template.page_size());
        let mut metrics = RenderMetrics {
            font_count: fonts.len(),
            ..RenderMetrics::default()
        };

        let layout_start = Instant::now();
        for (index, block) in texts.iter().enumerate() {
            let placed = render_text_block(&mut canvas, &fonts, block, &self.hang_table)?;
            let token_count: usize = placed.iter().map(|line| line.line.tokens().len()).sum();
            if let Some(logger) = debug {
                let lines: Vec<_> = placed
                    .iter()
                    .map(|line| {
                        json!({
                            "text": line.line.text(),
                            "x": line.origin_x.to_f32(),
                            "baseline": line.baseline_y.to_f32(),
                            "width": line.line.width().to_f32(),
                            "hang": line.hang.to_f32(),
                        })
                    })
                    .collect();
                logger.log_event(
                    "layout.block",
                    json!({
                        "render_id": render_id,
                        "block": index,
                        "align": format!("{:?}", block.align()).to_ascii_lowercase(),
                        "max_width": block.max_width().to_f32(),
                        "lines": lines,
                    }),
                );
                logger.increment(call, "blocks", 1);
                logger.increment(call, "lines", placed.len() as u64);
                logger.increment(call, "tokens", token_count as u64);
            }
            metrics.blocks.push(BlockMetrics {
                block_index: index,
                line_count: placed.len(),
                token_count,
            });
        }
        metrics.layout_ms = layout_start.elapsed().as_secs_f64() * 1000.0;
        if let Some(perf) = perf {
            perf.log_span_ms("render.layout", render_id, metrics.layout_ms);
        }

        if let Some((block, url)) = qr {
            let t_qr = perf_start(perf);
            let painted = render_qr_code(
                &mut canvas,
                url,
                block.x,
                block.y,
                block.width,
                block.background,
                block.color,
                block.error_correction,
            );
            perf_end(perf, "render.qr", render_id, t_qr);
            metrics.qr_modules = painted?;
            if let Some(logger) = debug {
                logger.log_event(
                    "qr.render",
                    json!({
                        "render_id": render_id,
                        "x": block.x.to_f32(),
                        "y": block.y.to_f32(),
                        "width": block.width.to_f32(),
                        "ec": format!("{:?}", block.error_correction),
                        "modules": metrics.qr_modules,
                    }),
                );
                logger.increment(call, "qr_modules", metrics.qr_modules as u64);
            }
        }

        let page = canvas.finish();
        metrics.paint_count = page.paint_count();
        if let Some(perf) = perf {
            perf.log_counts(
                "render.page",
                render_id,
                &[
                    ("blocks", metrics.blocks.len() as u64),
                    ("lines", metrics.line_count() as u64),
                    ("tokens", metrics.token_count() as u64),
                    ("paints", metrics.paint_count as u64),
                    ("qr_modules", metrics.qr_modules as u64),
                ],
            );
        }
        Ok(RenderedPage {
            page,
            fonts,
            metrics,
        })
    }
}

enum FontSource {
    Bytes { name: String, data: Vec<u8> },
    File { name: String, path: PathBuf },
    Dir(PathBuf),
}

pub struct CertPressBuilder {
    page_size: Size,
    default_max_width: f32,
    fonts: Vec<FontSource>,
    hang_table: HangTable,
    debug_path: Option<PathBuf>,
    perf_enabled: bool,
    perf_path: Option<PathBuf>,
}

impl CertPressBuilder {
    pub fn new() -> Self {
        Self {
            page_size: Size::a4().landscape(),
            default_max_width: DEFAULT_MAX_WIDTH,
            fonts: Vec::new(),
            hang_table: HangTable::default(),
            debug_path: None,
            perf_enabled: false,
            perf_path: None,
        }
    }

    /// Page size for templates that do not declare one.
    pub fn page_size(mut self, size: Size) -> Self {
        self.page_size = size;
        self
    }

    /// Box width for text blocks that do not declare `maxWidth`.
    pub fn default_max_width(mut self, width: f32) -> Self {
        self.default_max_width = width;
        self
    }

    pub fn register_font(mut self, name: impl Into<String>, data: Vec<u8>) -> Self {
        self.fonts.push(FontSource::Bytes {
            name: name.into(),
            data,
        });
        self
    }

    pub fn register_font_file(
        mut self,
        name: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        self.fonts.push(FontSource::File {
            name: name.into(),
            path: path.into(),
        });
        self
    }

    /// Registers every `.ttf`/`.otf` in `path`, named by file stem.
    pub fn register_font_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.fonts.push(FontSource::Dir(path.into()));
        self
    }

    pub fn hang_table(mut self, table: HangTable) -> Self {
        self.hang_table = table;
        self
    }

    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn perf_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.perf_enabled = true;
        self.perf_path = Some(path.into());
        self
    }

    // Uses certpress_perf.log when enabled without a path.
    pub fn perf_enabled(mut self, enabled: bool) -> Self {
        self.perf_enabled = enabled;
        self
    }

    pub fn build(self) -> Result<CertPress, CertPressError> {
        if !self.default_max_width.is_finite() || self.default_max_width <= 0.0 {
            return Err(CertPressError::InvalidConfiguration(format!(
                "default_max_width must be > 0, got {}",
                self.default_max_width
            )));
        }
        if self.page_size.width <= Pt::ZERO || self.page_size.height <= Pt::ZERO {
            return Err(CertPressError::InvalidConfiguration(
                "page_size must have positive width and height".to_string(),
            ));
        }
        let mut registry = TypefaceRegistry::new();
        for source in self.fonts {
            match source {
                FontSource::Bytes { name, data } => registry.register_bytes(name, data)?,
                FontSource::File { name, path } => registry.register_file(name, path)?,
                FontSource::Dir(path) => {
                    registry.register_dir(path)?;
                }
            }
        }
        let debug = if let Some(path) = self.debug_path {
            Some(Arc::new(DebugLogger::new(path)?))
        } else {
            None
        };
        let perf = if self.perf_enabled || self.perf_path.is_some() {
            let path = self
                .perf_path
                .unwrap_or_else(|| PathBuf::from("certpress_perf.log"));
            Some(Arc::new(PerfLogger::new(path)?))
        } else {
            None
        };
        Ok(CertPress {
            default_page_size: self.page_size,
            default_max_width: self.default_max_width,
            registry: Arc::new(registry),
            hang_table: self.hang_table,
            debug,
            perf,
            calls: AtomicU64::new(0),
        })
    }
}

impl Default for CertPressBuilder {
    fn default() -> Self {
        Self::new()
    }
}
