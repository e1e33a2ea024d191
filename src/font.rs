use crate::error::CertPressError;
use crate::text_block::TextBlock;
use crate::types::Pt;
use rustybuzz::{Direction as HbDirection, Face as HbFace, UnicodeBuffer};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use ttf_parser::GlyphId;

/// Width lookups needed by tokenizing and optical margin calculation.
pub trait TextMeasure {
    fn text_width(&self, font: &str, size: Pt, text: &str) -> Result<Pt, CertPressError>;
}

/// Known typefaces by exact name. Shared read-only across renders.
#[derive(Debug, Clone, Default)]
pub struct TypefaceRegistry {
    typefaces: HashMap<String, Arc<[u8]>>,
}

impl TypefaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_bytes(
        &mut self,
        name: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<(), CertPressError> {
        let name = name.into();
        if name.is_empty() {
            return Err(CertPressError::InvalidFont(
                "typeface name cannot be empty".to_string(),
            ));
        }
        if ttf_parser::Face::parse(&data, 0).is_err() {
            return Err(CertPressError::InvalidFont(format!(
                "font data for '{name}' cannot be parsed"
            )));
        }
        self.typefaces.insert(name, Arc::from(data));
        Ok(())
    }

    pub fn register_file(
        &mut self,
        name: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Result<(), CertPressError> {
        let data = fs::read(path.as_ref())?;
        self.register_bytes(name, data)
    }

    /// Registers every `.ttf`/`.otf` file under `path` by file stem.
    /// Returns how many typefaces were added.
    pub fn register_dir(&mut self, path: impl AsRef<Path>) -> Result<usize, CertPressError> {
        let mut added = 0;
        for entry in fs::read_dir(path.as_ref())? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(ext) = path.extension().and_then(|v| v.to_str()) else {
                continue;
            };
            let ext = ext.to_ascii_lowercase();
            if ext != "ttf" && ext != "otf" {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|v| v.to_str()) else {
                continue;
            };
            match self.register_file(stem.to_string(), &path) {
                Ok(()) => added += 1,
                Err(err) => eprintln!(
                    "[certpress][fonts] skipping {}: {}",
                    path.display(),
                    err
                ),
            }
        }
        Ok(added)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.typefaces.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.typefaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.typefaces.is_empty()
    }

    fn get(&self, name: &str) -> Option<&Arc<[u8]>> {
        self.typefaces.get(name)
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct FontMetrics {
    pub(crate) units_per_em: u16,
    pub(crate) ascent: i16,
    pub(crate) descent: i16,
    pub(crate) cap_height: i16,
    pub(crate) italic_angle: i16,
    pub(crate) bbox: (i16, i16, i16, i16),
    pub(crate) missing_width: u16,
    pub(crate) is_fixed_pitch: bool,
}

/// One shaped glyph; advances and offsets are in 1/1000 em.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ShapedGlyph {
    pub(crate) glyph_id: u16,
    pub(crate) advance: i32,
    pub(crate) x_offset: i32,
    pub(crate) text: String,
}

/// A typeface resolved for one render, ready for measuring and drawing.
#[derive(Debug)]
pub struct EmbeddedFont {
    name: Arc<str>,
    data: Arc<[u8]>,
    metrics: FontMetrics,
    width_cache: Mutex<HashMap<(i64, String), Pt>>,
}

impl EmbeddedFont {
    pub(crate) fn parse(name: Arc<str>, data: Arc<[u8]>) -> Result<Self, CertPressError> {
        let face = ttf_parser::Face::parse(&data, 0).map_err(|err| {
            CertPressError::InvalidFont(format!("font data for '{name}' cannot be parsed: {err}"))
        })?;
        let metrics = FontMetrics::from_face(&face);
        Ok(Self {
            name,
            data,
            metrics,
            width_cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn metrics(&self) -> &FontMetrics {
        &self.metrics
    }

    /// Advance width of `text` at `size`, from shaped glyph advances.
    pub fn text_width(&self, size: Pt, text: &str) -> Pt {
        if text.is_empty() {
            return Pt::ZERO;
        }
        let key = (size.to_milli_i64(), text.to_string());
        if let Ok(cache) = self.width_cache.lock() {
            if let Some(value) = cache.get(&key) {
                return *value;
            }
        }
        let units = self
            .shaped_advance_units(text)
            .unwrap_or_else(|| self.nominal_advance_units(text));
        let value = if units <= 0 {
            Pt::ZERO
        } else {
            size.mul_ratio(units, 1000)
        };
        if let Ok(mut cache) = self.width_cache.lock() {
            cache.insert(key, value);
        }
        value
    }

    pub(crate) fn shape(&self, text: &str) -> Vec<ShapedGlyph> {
        let Some(face) = HbFace::from_slice(&self.data, 0) else {
            return self.shape_unshaped(text);
        };
        let units_per_em = face.units_per_em().max(1) as i64;
        let mut buffer = UnicodeBuffer::new();
        buffer.set_direction(detect_direction(text));
        buffer.push_str(text);
        let output = rustybuzz::shape(&face, &[], buffer);
        let infos = output.glyph_infos();
        let positions = output.glyph_positions();
        if infos.is_empty() || infos.len() != positions.len() {
            return self.shape_unshaped(text);
        }

        let mut clusters: Vec<usize> = infos.iter().map(|g| g.cluster as usize).collect();
        clusters.sort_unstable();
        clusters.dedup();
        let mut glyphs = Vec::with_capacity(infos.len());
        for (info, pos) in infos.iter().zip(positions.iter()) {
            let start = (info.cluster as usize).min(text.len());
            let end = clusters
                .iter()
                .copied()
                .find(|c| *c > start)
                .unwrap_or(text.len())
                .min(text.len());
            let cluster_text = text.get(start..end).unwrap_or_default().to_string();
            glyphs.push(ShapedGlyph {
                glyph_id: info.glyph_id as u16,
                advance: to_thousandths(pos.x_advance as i64, units_per_em),
                x_offset: to_thousandths(pos.x_offset as i64, units_per_em),
                text: cluster_text,
            });
        }
        glyphs
    }

    /// Nominal hmtx advance for `gid` in 1/1000 em.
    pub(crate) fn glyph_advance(&self, gid: u16) -> u16 {
        let Ok(face) = ttf_parser::Face::parse(&self.data, 0) else {
            return self.metrics.missing_width;
        };
        let advance = face.glyph_hor_advance(GlyphId(gid)).unwrap_or(0) as i64;
        let units = self.metrics.units_per_em.max(1) as i64;
        to_thousandths(advance, units).clamp(0, u16::MAX as i32) as u16
    }

    fn shaped_advance_units(&self, text: &str) -> Option<i32> {
        let face = HbFace::from_slice(&self.data, 0)?;
        let units_per_em = face.units_per_em().max(1) as i64;
        let mut buffer = UnicodeBuffer::new();
        buffer.set_direction(detect_direction(text));
        buffer.push_str(text);
        let output = rustybuzz::shape(&face, &[], buffer);
        let positions = output.glyph_positions();
        if positions.is_empty() {
            return None;
        }
        let mut total: i32 = 0;
        for pos in positions {
            total = total.saturating_add(to_thousandths(pos.x_advance as i64, units_per_em));
        }
        Some(total)
    }

    fn nominal_advance_units(&self, text: &str) -> i32 {
        let Ok(face) = ttf_parser::Face::parse(&self.data, 0) else {
            return 0;
        };
        let units = self.metrics.units_per_em.max(1) as i64;
        let mut total: i32 = 0;
        for ch in text.chars() {
            let advance = face
                .glyph_index(ch)
                .and_then(|gid| face.glyph_hor_advance(gid))
                .map(|adv| to_thousandths(adv as i64, units))
                .unwrap_or(self.metrics.missing_width as i32);
            total = total.saturating_add(advance);
        }
        total
    }

    fn shape_unshaped(&self, text: &str) -> Vec<ShapedGlyph> {
        let Ok(face) = ttf_parser::Face::parse(&self.data, 0) else {
            return Vec::new();
        };
        let units = self.metrics.units_per_em.max(1) as i64;
        text.chars()
            .map(|ch| {
                let gid = face.glyph_index(ch).map(|id| id.0).unwrap_or(0);
                let advance = face
                    .glyph_hor_advance(GlyphId(gid))
                    .map(|adv| to_thousandths(adv as i64, units))
                    .unwrap_or(self.metrics.missing_width as i32);
                ShapedGlyph {
                    glyph_id: gid,
                    advance,
                    x_offset: 0,
                    text: ch.to_string(),
                }
            })
            .collect()
    }
}

impl FontMetrics {
    fn from_face(face: &ttf_parser::Face<'_>) -> Self {
        let units_per_em = face.units_per_em().max(1);
        let scale = 1000.0 / units_per_em as f32;
        let ascent = scale_i16(face.ascender(), scale);
        let descent = scale_i16(face.descender(), scale);
        let cap_height = face
            .capital_height()
            .map(|value| scale_i16(value, scale))
            .unwrap_or(ascent);
        let bbox = face.global_bounding_box();
        let bbox = (
            scale_i16(bbox.x_min, scale),
            scale_i16(bbox.y_min, scale),
            scale_i16(bbox.x_max, scale),
            scale_i16(bbox.y_max, scale),
        );
        let italic_angle = face
            .italic_angle()
            .map(|value| value.round() as i16)
            .unwrap_or(0);
        let missing_width = face
            .glyph_hor_advance(GlyphId(0))
            .map(|adv| (adv as f32 * scale).round().clamp(0.0, u16::MAX as f32) as u16)
            .unwrap_or(0);
        Self {
            units_per_em,
            ascent,
            descent,
            cap_height,
            italic_angle,
            bbox,
            missing_width,
            is_fixed_pitch: face.is_monospaced(),
        }
    }
}

/// Fonts resolved for a single render call. Never shared between renders.
#[derive(Debug, Default)]
pub struct FontTable {
    fonts: BTreeMap<Arc<str>, Arc<EmbeddedFont>>,
}

impl FontTable {
    pub fn get(&self, name: &str) -> Result<&EmbeddedFont, CertPressError> {
        self.fonts
            .get(name)
            .map(|font| font.as_ref())
            .ok_or_else(|| CertPressError::FontNotResolved(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fonts.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    /// Fonts in name order.
    pub fn iter(&self) -> impl Iterator<Item = &EmbeddedFont> {
        self.fonts.values().map(|font| font.as_ref())
    }

    pub(crate) fn insert(&mut self, font: EmbeddedFont) {
        self.fonts.insert(font.name.clone(), Arc::new(font));
    }
}

impl TextMeasure for FontTable {
    fn text_width(&self, font: &str, size: Pt, text: &str) -> Result<Pt, CertPressError> {
        Ok(self.get(font)?.text_width(size, text))
    }
}

/// Builds the font table for one document render.
///
/// Every distinct font named by a segment must be registered; the first
/// missing name aborts the render. No fallback face is substituted.
pub fn resolve_fonts(
    blocks: &[TextBlock],
    registry: &TypefaceRegistry,
) -> Result<FontTable, CertPressError> {
    let mut names: BTreeSet<&str> = BTreeSet::new();
    for block in blocks {
        for segment in block.segments() {
            names.insert(segment.font.as_ref());
        }
    }
    let mut table = FontTable::default();
    for name in names {
        let Some(data) = registry.get(name) else {
            return Err(CertPressError::MissingFont(name.to_string()));
        };
        table.insert(EmbeddedFont::parse(Arc::from(name), data.clone())?);
    }
    Ok(table)
}

fn to_thousandths(value: i64, units_per_em: i64) -> i32 {
    let units_per_em = units_per_em.max(1);
    let half = if value >= 0 {
        units_per_em / 2
    } else {
        -(units_per_em / 2)
    };
    ((value * 1000 + half) / units_per_em).clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

pub(crate) fn detect_direction(text: &str) -> HbDirection {
    for ch in text.chars() {
        let code = ch as u32;
        let rtl = matches!(
            code,
            0x0590..=0x08FF
                | 0xFB1D..=0xFDFF
                | 0xFE70..=0xFEFF
                | 0x1EE00..=0x1EEFF
        );
        if rtl {
            return HbDirection::RightToLeft;
        }
    }
    HbDirection::LeftToRight
}

fn scale_i16(value: i16, scale: f32) -> i16 {
    let scaled = (value as f32 * scale).round() as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}
