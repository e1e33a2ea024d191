use crate::error::CertPressError;
use crate::qr::{QrCodeBlock, QrErrorCorrection};
use crate::text_block::{Align, TextBlock};
use crate::tokenizer::StyledSegment;
use crate::types::{Color, Pt, Size};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTemplate {
    #[serde(default)]
    page: Option<RawPage>,
    #[serde(default)]
    texts: Vec<RawText>,
    #[serde(default)]
    qrcode: Option<RawQrCode>,
}

#[derive(Debug, Deserialize)]
struct RawPage {
    width: f32,
    height: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawText {
    x: f32,
    y: f32,
    size: f32,
    #[serde(default)]
    max_width: Option<f32>,
    #[serde(default)]
    line_height: Option<f32>,
    #[serde(default)]
    align: Option<String>,
    #[serde(default)]
    color: Option<Value>,
    #[serde(default)]
    optical_margin: Option<bool>,
    #[serde(default)]
    lines: Vec<RawSegment>,
}

#[derive(Debug, Deserialize)]
struct RawSegment {
    text: String,
    font: String,
}

#[derive(Debug, Deserialize)]
struct RawQrCode {
    #[serde(default)]
    show: bool,
    x: f32,
    y: f32,
    width: f32,
    #[serde(default)]
    color: Option<Value>,
    #[serde(default)]
    background: Option<Value>,
    #[serde(default)]
    ec: Option<String>,
}

/// A certificate layout: page size, text blocks with placeholder text and
/// an optional QR code.
#[derive(Debug, Clone, PartialEq)]
pub struct CertificateTemplate {
    page_size: Size,
    texts: Vec<TextBlock>,
    qr_code: Option<QrCodeBlock>,
}

impl CertificateTemplate {
    pub fn new(page_size: Size, texts: Vec<TextBlock>, qr_code: Option<QrCodeBlock>) -> Self {
        Self {
            page_size,
            texts,
            qr_code,
        }
    }

    /// Parses and validates a JSON template.
    ///
    /// `default_max_width` applies to blocks without `maxWidth`;
    /// `default_page` to documents without `page`.
    pub fn from_json(
        json: &str,
        default_max_width: f32,
        default_page: Size,
    ) -> Result<Self, CertPressError> {
        let raw: RawTemplate = serde_json::from_str(json)
            .map_err(|err| CertPressError::InvalidTemplate(format!("template json: {err}")))?;

        let page_size = match raw.page {
            Some(page) => {
                for (field, value) in [("page.width", page.width), ("page.height", page.height)] {
                    if !value.is_finite() || value <= 0.0 {
                        return Err(CertPressError::InvalidTemplate(format!(
                            "{field} must be > 0, got {value}"
                        )));
                    }
                }
                Size::new(page.width, page.height)
            }
            None => default_page,
        };

        let mut texts = Vec::with_capacity(raw.texts.len());
        for (index, text) in raw.texts.into_iter().enumerate() {
            let block = text_block_from_raw(text, default_max_width).map_err(|err| match err {
                CertPressError::InvalidTemplate(msg) => {
                    CertPressError::InvalidTemplate(format!("texts[{index}]: {msg}"))
                }
                other => other,
            })?;
            texts.push(block);
        }

        let qr_code = raw.qrcode.map(qr_block_from_raw).transpose()?;
        Ok(Self {
            page_size,
            texts,
            qr_code,
        })
    }

    pub fn page_size(&self) -> Size {
        self.page_size
    }

    pub fn texts(&self) -> &[TextBlock] {
        &self.texts
    }

    pub fn qr_code(&self) -> Option<&QrCodeBlock> {
        self.qr_code.as_ref()
    }

    /// Substitutes recipient fields into every segment.
    pub fn bind_texts(&self, recipient: &Recipient) -> Result<Vec<TextBlock>, CertPressError> {
        self.texts
            .iter()
            .map(|block| {
                let segments = block
                    .segments()
                    .iter()
                    .map(|segment| {
                        Ok(StyledSegment::new(
                            bind_placeholders(&segment.text, &recipient.fields)?,
                            segment.font.clone(),
                        ))
                    })
                    .collect::<Result<Vec<_>, CertPressError>>()?;
                Ok(block.with_segments(segments))
            })
            .collect()
    }

    /// The QR block to paint and its payload, if the template shows one.
    pub fn bind_qr<'a>(
        &self,
        recipient: &'a Recipient,
    ) -> Result<Option<(QrCodeBlock, &'a str)>, CertPressError> {
        let Some(block) = self.qr_code.filter(|qr| qr.show) else {
            return Ok(None);
        };
        match recipient.qr_url.as_deref() {
            Some(url) => Ok(Some((block, url))),
            None => Err(CertPressError::MissingField("qr_url".to_string())),
        }
    }
}

fn text_block_from_raw(raw: RawText, default_max_width: f32) -> Result<TextBlock, CertPressError> {
    let mut builder = TextBlock::builder(raw.x, raw.y, raw.size)
        .max_width(raw.max_width.unwrap_or(default_max_width));
    if let Some(line_height) = raw.line_height {
        builder = builder.line_height(line_height);
    }
    if let Some(align) = raw.align.as_deref() {
        builder = builder.align(align.parse::<Align>()?);
    }
    if let Some(color) = raw.color.as_ref() {
        builder = builder.color(color_from_value(color)?);
    }
    if let Some(optical_margin) = raw.optical_margin {
        builder = builder.optical_margin(optical_margin);
    }
    builder
        .segments(
            raw.lines
                .into_iter()
                .map(|line| StyledSegment::new(line.text, line.font)),
        )
        .build()
}

fn qr_block_from_raw(raw: RawQrCode) -> Result<QrCodeBlock, CertPressError> {
    for (field, value) in [("qrcode.x", raw.x), ("qrcode.y", raw.y)] {
        if !value.is_finite() {
            return Err(CertPressError::InvalidTemplate(format!(
                "{field} must be a finite number, got {value}"
            )));
        }
    }
    if !raw.width.is_finite() || raw.width <= 0.0 {
        return Err(CertPressError::InvalidTemplate(format!(
            "qrcode.width must be > 0, got {}",
            raw.width
        )));
    }
    let color = match raw.color.as_ref() {
        Some(value) => color_from_value(value)?,
        None => Color::BLACK,
    };
    let background = match raw.background.as_ref() {
        Some(value) => color_from_value(value)?,
        None => Color::WHITE,
    };
    let error_correction = match raw.ec.as_deref() {
        Some(level) => level.parse::<QrErrorCorrection>()?,
        None => QrErrorCorrection::default(),
    };
    Ok(QrCodeBlock {
        show: raw.show,
        x: Pt::from_f32(raw.x),
        y: Pt::from_f32(raw.y),
        width: Pt::from_f32(raw.width),
        color,
        background,
        error_correction,
    })
}

/// Accepts a hex string or an `[r, g, b]` array of 0..1 components.
fn color_from_value(value: &Value) -> Result<Color, CertPressError> {
    match value {
        Value::String(hex) => Color::from_hex(hex),
        Value::Array(items) if items.len() == 3 => {
            let mut channels = [0f32; 3];
            for (slot, item) in channels.iter_mut().zip(items) {
                let Some(component) = item.as_f64() else {
                    return Err(CertPressError::InvalidColor(format!(
                        "color component {item} is not a number"
                    )));
                };
                *slot = component as f32;
            }
            Color::try_rgb(channels[0], channels[1], channels[2])
        }
        other => Err(CertPressError::InvalidColor(format!(
            "expected a hex string or [r, g, b], got {other}"
        ))),
    }
}

/// Values for one certificate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recipient {
    pub fields: BTreeMap<String, String>,
    pub qr_url: Option<String>,
}

impl Recipient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn qr_url(mut self, url: impl Into<String>) -> Self {
        self.qr_url = Some(url.into());
        self
    }
}

fn is_identifier_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-')
}

/// Replaces `{identifier}` with the bound value. Any other brace is copied
/// through unchanged.
pub(crate) fn bind_placeholders(
    text: &str,
    fields: &BTreeMap<String, String>,
) -> Result<String, CertPressError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let name_len = after
            .find(|ch: char| !is_identifier_char(ch))
            .unwrap_or(after.len());
        if name_len > 0 && after[name_len..].starts_with('}') {
            let name = &after[..name_len];
            let Some(value) = fields.get(name) else {
                return Err(CertPressError::MissingField(name.to_string()));
            };
            out.push_str(value);
            rest = &after[name_len + 1..];
        } else {
            out.push('{');
            rest = after;
        }
    }
    out.push_str(rest);
    Ok(out)
}
