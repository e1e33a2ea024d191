use crate::types::{Color, Pt, Size};
use std::sync::Arc;

/// Drawing target for text runs and filled rectangles.
///
/// Coordinates are PDF user space: origin at the bottom-left of the page,
/// y increasing upward, `y` of a text run is its baseline.
pub trait Surface {
    fn draw_text_run(&mut self, text: &str, font: &str, size: Pt, color: Color, x: Pt, y: Pt);

    fn fill_rect(&mut self, x: Pt, y: Pt, width: Pt, height: Pt, color: Color);
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetFillColor(Color),
    SetFontName(Arc<str>),
    SetFontSize(Pt),
    DrawString {
        x: Pt,
        y: Pt,
        text: String,
    },
    // Filled with the current fill color.
    DrawRect {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
    },
}

/// One recorded page, ready for the PDF writer or the rasterizer.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub size: Size,
    pub commands: Vec<Command>,
}

impl Page {
    /// Number of text runs and rectangles painted.
    pub fn paint_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|cmd| matches!(cmd, Command::DrawString { .. } | Command::DrawRect { .. }))
            .count()
    }

    /// Distinct font names in first-use order.
    pub fn font_names(&self) -> Vec<Arc<str>> {
        let mut names: Vec<Arc<str>> = Vec::new();
        for cmd in &self.commands {
            if let Command::SetFontName(name) = cmd {
                if !names.iter().any(|n| n == name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    fill_color: Option<Color>,
    font_size: Option<Pt>,
    font_name: Option<Arc<str>>,
}

/// Records paint operations for a single page.
///
/// State changes are only emitted when they differ from the current state,
/// so consecutive runs in the same font and color share one `SetFont*`.
pub struct Canvas {
    page_size: Size,
    commands: Vec<Command>,
    state: GraphicsState,
}

impl Canvas {
    pub fn new(page_size: Size) -> Self {
        Self {
            page_size,
            commands: Vec::new(),
            state: GraphicsState {
                fill_color: None,
                font_size: None,
                font_name: None,
            },
        }
    }

    pub fn page_size(&self) -> Size {
        self.page_size
    }

    pub fn set_fill_color(&mut self, color: Color) {
        if self.state.fill_color == Some(color) {
            return;
        }
        self.state.fill_color = Some(color);
        self.commands.push(Command::SetFillColor(color));
    }

    pub fn set_font_name(&mut self, name: &str) {
        if self.state.font_name.as_deref() == Some(name) {
            return;
        }
        let name: Arc<str> = Arc::from(name);
        self.state.font_name = Some(name.clone());
        self.commands.push(Command::SetFontName(name));
    }

    pub fn set_font_size(&mut self, size: Pt) {
        if self.state.font_size == Some(size) {
            return;
        }
        self.state.font_size = Some(size);
        self.commands.push(Command::SetFontSize(size));
    }

    pub fn draw_string(&mut self, x: Pt, y: Pt, text: impl Into<String>) {
        self.commands.push(Command::DrawString {
            x,
            y,
            text: text.into(),
        });
    }

    pub fn draw_rect(&mut self, x: Pt, y: Pt, width: Pt, height: Pt) {
        self.commands.push(Command::DrawRect {
            x,
            y,
            width,
            height,
        });
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn finish(self) -> Page {
        Page {
            size: self.page_size,
            commands: self.commands,
        }
    }
}

impl Surface for Canvas {
    fn draw_text_run(&mut self, text: &str, font: &str, size: Pt, color: Color, x: Pt, y: Pt) {
        self.set_fill_color(color);
        self.set_font_name(font);
        self.set_font_size(size);
        self.draw_string(x, y, text);
    }

    fn fill_rect(&mut self, x: Pt, y: Pt, width: Pt, height: Pt, color: Color) {
        self.set_fill_color(color);
        self.draw_rect(x, y, width, height);
    }
}
