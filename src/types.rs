use crate::error::CertPressError;
use fixed::types::I32F32;

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Pt(I32F32);

impl Pt {
    pub const ZERO: Pt = Pt(I32F32::from_bits(0));

    pub fn from_f32(value: f32) -> Pt {
        if !value.is_finite() {
            return Pt::ZERO;
        }
        let milli = (value as f64 * 1000.0).round();
        let milli = milli.clamp(i64::MIN as f64, i64::MAX as f64) as i64;
        Pt::from_milli_i64(milli)
    }

    pub fn from_i32(value: i32) -> Pt {
        Pt::from_milli_i64((value as i64) * 1000)
    }

    pub fn to_f32(self) -> f32 {
        self.0.to_num()
    }

    pub fn to_milli_i64(self) -> i64 {
        let bits = self.0.to_bits() as i128;
        let denom = 1i128 << 32;
        let scaled = bits * 1000;
        let adj = if scaled >= 0 { denom / 2 } else { -denom / 2 };
        let milli = (scaled + adj) / denom;
        milli.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    pub fn max(self, other: Pt) -> Pt {
        if self >= other { self } else { other }
    }

    pub fn min(self, other: Pt) -> Pt {
        if self <= other { self } else { other }
    }

    pub fn mul_ratio(self, num: i32, denom: i32) -> Pt {
        if denom == 0 {
            return Pt::ZERO;
        }
        let milli = self.to_milli_i64() as i128;
        let num = num as i128;
        let denom = denom as i128;
        let value = div_round_i128(milli.saturating_mul(num), denom);
        Pt::from_milli_i128(value)
    }

    pub fn from_milli_i64(milli: i64) -> Pt {
        Pt::from_milli_i128(milli as i128)
    }

    fn from_milli_i128(milli: i128) -> Pt {
        let denom = 1i128 << 32;
        let adj = if milli >= 0 { 500 } else { -500 };
        let bits = (milli * denom + adj) / 1000;
        let bits = bits.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        Pt(I32F32::from_bits(bits))
    }
}

impl std::ops::Add for Pt {
    type Output = Pt;
    fn add(self, rhs: Pt) -> Pt {
        Pt::from_milli_i128(self.to_milli_i64() as i128 + rhs.to_milli_i64() as i128)
    }
}

impl std::ops::AddAssign for Pt {
    fn add_assign(&mut self, rhs: Pt) {
        *self = *self + rhs;
    }
}

impl std::ops::Sub for Pt {
    type Output = Pt;
    fn sub(self, rhs: Pt) -> Pt {
        Pt::from_milli_i128(self.to_milli_i64() as i128 - rhs.to_milli_i64() as i128)
    }
}

impl std::ops::SubAssign for Pt {
    fn sub_assign(&mut self, rhs: Pt) {
        *self = *self - rhs;
    }
}

impl std::ops::Mul<i32> for Pt {
    type Output = Pt;
    fn mul(self, rhs: i32) -> Pt {
        let milli = self.to_milli_i64() as i128;
        Pt::from_milli_i128(milli.saturating_mul(rhs as i128))
    }
}

impl std::ops::Div<i32> for Pt {
    type Output = Pt;
    fn div(self, rhs: i32) -> Pt {
        if rhs == 0 {
            Pt::ZERO
        } else {
            let milli = self.to_milli_i64() as i128;
            let value = div_round_i128(milli, rhs as i128);
            Pt::from_milli_i128(value)
        }
    }
}

impl std::ops::Mul<f32> for Pt {
    type Output = Pt;
    fn mul(self, rhs: f32) -> Pt {
        if !rhs.is_finite() {
            return Pt::ZERO;
        }
        Pt::from_f32(self.to_f32() * rhs)
    }
}

impl std::ops::Div<f32> for Pt {
    type Output = Pt;
    fn div(self, rhs: f32) -> Pt {
        if rhs == 0.0 || !rhs.is_finite() {
            Pt::ZERO
        } else {
            Pt::from_f32(self.to_f32() / rhs)
        }
    }
}

fn div_round_i128(num: i128, den: i128) -> i128 {
    if den == 0 {
        return 0;
    }
    let den_abs = den.abs();
    if num >= 0 {
        (num + (den_abs / 2)) / den
    } else {
        -(((-num) + (den_abs / 2)) / den)
    }
}

impl std::ops::Neg for Pt {
    type Output = Pt;
    fn neg(self) -> Pt {
        Pt::from_milli_i128(-(self.to_milli_i64() as i128))
    }
}

impl std::iter::Sum for Pt {
    fn sum<I: Iterator<Item = Pt>>(iter: I) -> Pt {
        iter.fold(Pt::ZERO, |acc, v| acc + v)
    }
}

impl<'a> std::iter::Sum<&'a Pt> for Pt {
    fn sum<I: Iterator<Item = &'a Pt>>(iter: I) -> Pt {
        iter.fold(Pt::ZERO, |acc, v| acc + *v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: Pt,
    pub height: Pt,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width: Pt::from_f32(width),
            height: Pt::from_f32(height),
        }
    }

    pub fn a4() -> Self {
        Self {
            width: Pt::from_f32(595.28),
            height: Pt::from_f32(841.89),
        }
    }

    pub fn letter() -> Self {
        // 8.5in x 11in at 72pt/in.
        Self {
            width: Pt::from_f32(612.0),
            height: Pt::from_f32(792.0),
        }
    }

    pub fn landscape(self) -> Self {
        Self {
            width: self.height.max(self.width),
            height: self.height.min(self.width),
        }
    }
}

/// RGB color with components in `0.0..=1.0`.
///
/// Values built through [`Color::try_rgb`] or [`Color::from_hex`] are
/// validated; the renderer assumes every color it receives already is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn try_rgb(r: f32, g: f32, b: f32) -> Result<Self, CertPressError> {
        for (label, value) in [("r", r), ("g", g), ("b", b)] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(CertPressError::InvalidColor(format!(
                    "component {label}={value} is outside 0..1"
                )));
            }
        }
        Ok(Self { r, g, b })
    }

    /// Parses `#rrggbb`, `rrggbb`, `#rgb` or `rgb`.
    pub fn from_hex(raw: &str) -> Result<Self, CertPressError> {
        let trimmed = raw.trim();
        let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(CertPressError::InvalidColor(format!(
                "'{raw}' is not a hex color"
            )));
        }
        let channels: [u8; 3] = match hex.len() {
            6 => {
                let mut out = [0u8; 3];
                for (idx, slot) in out.iter_mut().enumerate() {
                    *slot = parse_hex_byte(&hex[idx * 2..idx * 2 + 2], raw)?;
                }
                out
            }
            3 => {
                let mut out = [0u8; 3];
                for (idx, slot) in out.iter_mut().enumerate() {
                    let nibble = parse_hex_byte(&hex[idx..idx + 1], raw)?;
                    *slot = nibble * 17;
                }
                out
            }
            _ => {
                return Err(CertPressError::InvalidColor(format!(
                    "'{raw}' must have 3 or 6 hex digits"
                )));
            }
        };
        Ok(Self {
            r: channels[0] as f32 / 255.0,
            g: channels[1] as f32 / 255.0,
            b: channels[2] as f32 / 255.0,
        })
    }

    pub fn to_hex(self) -> Result<String, CertPressError> {
        let checked = Color::try_rgb(self.r, self.g, self.b)?;
        Ok(format!(
            "#{:02x}{:02x}{:02x}",
            unit_to_byte(checked.r),
            unit_to_byte(checked.g),
            unit_to_byte(checked.b)
        ))
    }

    pub(crate) fn to_rgb8(self) -> [u8; 3] {
        [
            unit_to_byte(self.r.clamp(0.0, 1.0)),
            unit_to_byte(self.g.clamp(0.0, 1.0)),
            unit_to_byte(self.b.clamp(0.0, 1.0)),
        ]
    }
}

fn parse_hex_byte(digits: &str, raw: &str) -> Result<u8, CertPressError> {
    u8::from_str_radix(digits, 16)
        .map_err(|_| CertPressError::InvalidColor(format!("'{raw}' is not a hex color")))
}

fn unit_to_byte(value: f32) -> u8 {
    (value * 255.0).round() as u8
}
