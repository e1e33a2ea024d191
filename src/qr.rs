use crate::canvas::Surface;
use crate::error::CertPressError;
use crate::types::{Color, Pt};
use qrcode::{EcLevel, QrCode};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QrErrorCorrection {
    L,
    #[default]
    M,
    Q,
    H,
}

impl QrErrorCorrection {
    fn ec_level(self) -> EcLevel {
        match self {
            QrErrorCorrection::L => EcLevel::L,
            QrErrorCorrection::M => EcLevel::M,
            QrErrorCorrection::Q => EcLevel::Q,
            QrErrorCorrection::H => EcLevel::H,
        }
    }
}

impl FromStr for QrErrorCorrection {
    type Err = CertPressError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "L" => Ok(QrErrorCorrection::L),
            "M" => Ok(QrErrorCorrection::M),
            "Q" => Ok(QrErrorCorrection::Q),
            "H" => Ok(QrErrorCorrection::H),
            other => Err(CertPressError::InvalidTemplate(format!(
                "unknown error correction level '{other}' (expected L, M, Q or H)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QrCodeBlock {
    pub show: bool,
    pub x: Pt,
    /// Bottom edge of the symbol.
    pub y: Pt,
    pub width: Pt,
    pub color: Color,
    pub background: Color,
    pub error_correction: QrErrorCorrection,
}

/// Square module matrix, row 0 at the top of the symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct QrMatrix {
    size: usize,
    dark: Vec<bool>,
}

impl QrMatrix {
    pub fn encode(url: &str, level: QrErrorCorrection) -> Result<Self, CertPressError> {
        let code = QrCode::with_error_correction_level(url.as_bytes(), level.ec_level())
            .map_err(|err| CertPressError::QrEncode(format!("{err} ({} bytes)", url.len())))?;
        let size = code.width();
        let dark = code
            .to_colors()
            .into_iter()
            .map(|color| color == qrcode::Color::Dark)
            .collect();
        Ok(Self { size, dark })
    }

    /// Modules per side.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_dark(&self, row: usize, col: usize) -> bool {
        row < self.size && col < self.size && self.dark[row * self.size + col]
    }

    pub fn dark_count(&self) -> usize {
        self.dark.iter().filter(|d| **d).count()
    }
}

/// Encodes `url` and paints it as filled squares.
///
/// The background plate extends one module beyond the `width` square on
/// every side. Matrix row 0 lands at the top, so row `r` spans
/// `y + width * (n - 1 - r) / n` up to `y + width * (n - r) / n`. Returns the
/// number of dark modules painted.
#[allow(clippy::too_many_arguments)]
pub fn render_qr_code(
    surface: &mut impl Surface,
    url: &str,
    x: Pt,
    y: Pt,
    width: Pt,
    background: Color,
    color: Color,
    level: QrErrorCorrection,
) -> Result<usize, CertPressError> {
    let matrix = QrMatrix::encode(url, level)?;
    Ok(paint_matrix(surface, &matrix, x, y, width, background, color))
}

pub(crate) fn paint_matrix(
    surface: &mut impl Surface,
    matrix: &QrMatrix,
    x: Pt,
    y: Pt,
    width: Pt,
    background: Color,
    color: Color,
) -> usize {
    let n = matrix.size();
    if n == 0 {
        return 0;
    }
    // Module edges sit at width * i / n so the symbol spans exactly `width`.
    let edge = |i: usize| width.mul_ratio(i as i32, n as i32);
    let module = edge(1);
    surface.fill_rect(
        x - module,
        y - module,
        width + module * 2,
        width + module * 2,
        background,
    );
    let mut painted = 0;
    for row in 0..n {
        let bottom = edge(n - 1 - row);
        let height = edge(n - row) - bottom;
        for col in 0..n {
            if !matrix.is_dark(row, col) {
                continue;
            }
            let left = edge(col);
            surface.fill_rect(
                x + left,
                y + bottom,
                edge(col + 1) - left,
                height,
                color,
            );
            painted += 1;
        }
    }
    painted
}
