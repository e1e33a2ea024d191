use crate::canvas::{Command, Page};
use crate::error::CertPressError;
use crate::font::{EmbeddedFont, FontTable};
use crate::types::{Color, Pt, Size};
use fixed::types::I32F32;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

const PDF_HEADER: &[u8] = b"%PDF-1.7\n";

struct FontUsage<'a> {
    resource: String,
    font: &'a EmbeddedFont,
    glyph_map: BTreeMap<u16, String>,
}

/// Serialises one recorded page as a standalone PDF.
///
/// Every font the page draws with is embedded as a Type0 font with
/// Identity-H encoding, so glyph ids in the content stream are the ids
/// rustybuzz produced when shaping each run.
pub(crate) fn page_to_pdf(page: &Page, fonts: &FontTable) -> Result<Vec<u8>, CertPressError> {
    let mut usage: BTreeMap<String, FontUsage<'_>> = BTreeMap::new();
    for (index, name) in page.font_names().iter().enumerate() {
        usage.insert(
            name.to_string(),
            FontUsage {
                resource: format!("F{}", index + 1),
                font: fonts.get(name)?,
                glyph_map: BTreeMap::new(),
            },
        );
    }

    let content = render_content(&page.commands, &mut usage)?;

    let catalog_id = 1;
    let pages_id = 2;
    let page_id = 3;
    let content_id = 4;
    let mut next_id = 5;

    let mut font_objects: Vec<String> = Vec::new();
    let mut font_refs: Vec<(String, usize)> = Vec::new();
    for font_usage in usage.values() {
        let (objects, type0_id, after) = build_cidfont_objects(font_usage, next_id);
        font_objects.extend(objects);
        font_refs.push((font_usage.resource.clone(), type0_id));
        next_id = after;
    }
    font_refs.sort_by(|a, b| a.0.cmp(&b.0));
    let info_id = next_id;

    let mut objects: Vec<String> = Vec::with_capacity(next_id);
    objects.push(format!("<< /Type /Catalog /Pages {} 0 R >>", pages_id));
    objects.push(format!(
        "<< /Type /Pages /Kids [{} 0 R] /Count 1 >>",
        page_id
    ));
    objects.push(page_object(page.size, pages_id, content_id, &font_refs));
    objects.push(stream_object(&content));
    objects.extend(font_objects);
    objects.push("<< /Producer (certpress) >>".to_string());

    Ok(build_pdf(objects, catalog_id, Some(info_id)))
}

fn render_content(
    commands: &[Command],
    usage: &mut BTreeMap<String, FontUsage<'_>>,
) -> Result<String, CertPressError> {
    let mut out = String::new();
    let mut font_name: Option<&str> = None;
    let mut font_size = Pt::from_f32(12.0);
    for command in commands {
        match command {
            Command::SetFillColor(color) => out.push_str(&color_to_pdf_fill(*color)),
            Command::SetFontName(name) => font_name = Some(name.as_ref()),
            Command::SetFontSize(size) => font_size = *size,
            Command::DrawRect {
                x,
                y,
                width,
                height,
            } => {
                let _ = writeln!(
                    out,
                    "{} {} {} {} re f",
                    fmt_pt(*x),
                    fmt_pt(*y),
                    fmt_pt(*width),
                    fmt_pt(*height)
                );
            }
            Command::DrawString { x, y, text } => {
                let Some(name) = font_name else {
                    return Err(CertPressError::Pdf(
                        "text drawn before a font was selected".to_string(),
                    ));
                };
                let Some(font_usage) = usage.get_mut(name) else {
                    return Err(CertPressError::FontNotResolved(name.to_string()));
                };
                let Some(tj) = shape_text_to_tj(font_usage, text) else {
                    continue;
                };
                let _ = write!(
                    out,
                    "BT\n/{} {} Tf\n{} {} Td\n{}ET\n",
                    font_usage.resource,
                    fmt_pt(font_size),
                    fmt_pt(*x),
                    fmt_pt(*y),
                    tj
                );
            }
        }
    }
    Ok(out)
}

// TJ numbers are thousandths of text space; positive values move left.
fn shape_text_to_tj(usage: &mut FontUsage<'_>, text: &str) -> Option<String> {
    let glyphs = usage.font.shape(text);
    if glyphs.is_empty() {
        return None;
    }
    let mut parts: Vec<String> = Vec::with_capacity(glyphs.len() * 2);
    for glyph in glyphs {
        // Unmapped whitespace only moves the pen, as in the raster path.
        if glyph.glyph_id == 0
            && !glyph.text.is_empty()
            && glyph.text.chars().all(char::is_whitespace)
        {
            if glyph.advance != 0 {
                parts.push(format!("{}", -glyph.advance));
            }
            continue;
        }
        if glyph.x_offset != 0 {
            parts.push(format!("{}", -glyph.x_offset));
        }
        parts.push(format!("<{:04X}>", glyph.glyph_id));
        let nominal = usage.font.glyph_advance(glyph.glyph_id) as i32;
        let adjust = nominal - glyph.advance + glyph.x_offset;
        if adjust != 0 {
            parts.push(format!("{}", adjust));
        }
        if glyph.glyph_id != 0 && !glyph.text.is_empty() {
            usage.glyph_map.entry(glyph.glyph_id).or_insert(glyph.text);
        }
    }
    Some(format!("[{}] TJ\n", parts.join(" ")))
}

fn page_object(size: Size, pages_id: usize, content_id: usize, fonts: &[(String, usize)]) -> String {
    format!(
        "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {} {}] /Resources << /Font {} >> /Contents {} 0 R >>",
        pages_id,
        fmt_pt(size.width),
        fmt_pt(size.height),
        font_resources(fonts),
        content_id
    )
}

fn font_resources(fonts: &[(String, usize)]) -> String {
    let mut entries = Vec::new();
    for (resource, font_id) in fonts {
        entries.push(format!("/{} {} 0 R", resource, font_id));
    }
    format!("<< {} >>", entries.join(" "))
}

fn build_cidfont_objects(usage: &FontUsage<'_>, start_id: usize) -> (Vec<String>, usize, usize) {
    let font_file_id = start_id;
    let descriptor_id = start_id + 1;
    let cid_font_id = start_id + 2;
    let to_unicode_id = start_id + 3;
    let type0_font_id = start_id + 4;
    let font = usage.font;
    let base = sanitize_font_name(font.name());

    let mut objects = Vec::with_capacity(5);
    objects.push(font_file_object(font.data()));
    objects.push(font_descriptor_object(font, &base, font_file_id));

    let used_gids: BTreeSet<u16> = usage.glyph_map.keys().copied().collect();
    let mut w_entries: Vec<String> = Vec::new();
    for gid in &used_gids {
        let adv = font.glyph_advance(*gid);
        let width = if adv > 0 {
            adv
        } else {
            font.metrics().missing_width
        };
        w_entries.push(format!("{} [{}]", gid, width));
    }
    let w_array = if w_entries.is_empty() {
        String::new()
    } else {
        format!(" /W [{}]", w_entries.join(" "))
    };

    objects.push(format!(
        "<< /Type /Font /Subtype /CIDFontType2 /BaseFont /{} /CIDSystemInfo << /Registry (Adobe) /Ordering (Identity) /Supplement 0 >> /FontDescriptor {} 0 R /DW {}{} /CIDToGIDMap /Identity >>",
        base,
        descriptor_id,
        font.metrics().missing_width,
        w_array
    ));
    objects.push(stream_object(&to_unicode_cmap(&usage.glyph_map)));
    objects.push(format!(
        "<< /Type /Font /Subtype /Type0 /BaseFont /{} /Encoding /Identity-H /DescendantFonts [{} 0 R] /ToUnicode {} 0 R >>",
        base, cid_font_id, to_unicode_id
    ));

    (objects, type0_font_id, start_id + 5)
}

fn font_descriptor_object(font: &EmbeddedFont, base: &str, font_file_id: usize) -> String {
    let metrics = font.metrics();
    let mut flags = 4;
    if metrics.is_fixed_pitch {
        flags |= 1;
    }
    format!(
        "<< /Type /FontDescriptor /FontName /{} /Flags {} /FontBBox [{} {} {} {}] /ItalicAngle {} /Ascent {} /Descent {} /CapHeight {} /StemV 80 /MissingWidth {} /FontFile2 {} 0 R >>",
        base,
        flags,
        metrics.bbox.0,
        metrics.bbox.1,
        metrics.bbox.2,
        metrics.bbox.3,
        metrics.italic_angle,
        metrics.ascent,
        metrics.descent,
        metrics.cap_height,
        metrics.missing_width,
        font_file_id
    )
}

fn font_file_object(data: &[u8]) -> String {
    let mut stream_data = ascii_hex_encode(data);
    stream_data.push('>');
    stream_data.push('\n');
    format!(
        "<< /Length {} /Length1 {} /Filter /ASCIIHexDecode >>\nstream\n{}endstream",
        stream_data.len(),
        data.len(),
        stream_data
    )
}

fn ascii_hex_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2 + data.len() / 32);
    for (index, byte) in data.iter().enumerate() {
        let _ = write!(&mut out, "{:02X}", byte);
        if index % 32 == 31 {
            out.push('\n');
        }
    }
    out
}

fn to_unicode_cmap(glyph_map: &BTreeMap<u16, String>) -> String {
    let entries: Vec<(&u16, &String)> = glyph_map.iter().collect();

    let mut out = String::new();
    out.push_str("/CIDInit /ProcSet findresource begin\n");
    out.push_str("12 dict begin\n");
    out.push_str("begincmap\n");
    out.push_str("/CIDSystemInfo << /Registry (Adobe) /Ordering (Identity) /Supplement 0 >> def\n");
    out.push_str("/CMapName /Adobe-Identity-UCS def\n");
    out.push_str("/CMapType 2 def\n");
    out.push_str("1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n");

    for chunk in entries.chunks(100) {
        let _ = writeln!(out, "{} beginbfchar", chunk.len());
        for (gid, text) in chunk {
            let mut utf16 = String::new();
            for unit in text.encode_utf16() {
                let _ = write!(utf16, "{:04X}", unit);
            }
            let _ = writeln!(out, "<{:04X}> <{}>", gid, utf16);
        }
        out.push_str("endbfchar\n");
    }

    out.push_str("endcmap\n");
    out.push_str("CMapName currentdict /CMap defineresource pop\n");
    out.push_str("end\nend\n");
    out
}

fn stream_object(content: &str) -> String {
    format!(
        "<< /Length {} >>\nstream\n{}\nendstream",
        content.len(),
        content
    )
}

fn build_pdf(objects: Vec<String>, catalog_id: usize, info_id: Option<usize>) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();
    out.extend_from_slice(PDF_HEADER);
    out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

    let mut offsets = Vec::with_capacity(objects.len());
    for (index, obj) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n", index + 1).as_bytes());
        out.extend_from_slice(obj.as_bytes());
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }

    let mut trailer = format!(
        "trailer\n<< /Size {} /Root {} 0 R",
        objects.len() + 1,
        catalog_id
    );
    if let Some(info_id) = info_id {
        let _ = write!(trailer, " /Info {} 0 R", info_id);
    }
    let _ = write!(trailer, " >>\nstartxref\n{}\n%%EOF", xref_start);
    out.extend_from_slice(trailer.as_bytes());
    out
}

fn sanitize_font_name(name: &str) -> String {
    let mut out = String::new();
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch);
        } else if ch == ' ' {
            out.push('-');
        }
    }
    if out.is_empty() {
        "Embedded".to_string()
    } else {
        out
    }
}

fn color_to_pdf_fill(color: Color) -> String {
    format!(
        "{} {} {} rg\n",
        fmt(color.r.clamp(0.0, 1.0)),
        fmt(color.g.clamp(0.0, 1.0)),
        fmt(color.b.clamp(0.0, 1.0))
    )
}

fn fmt(value: f32) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let fixed = I32F32::from_num(value);
    let scaled = (fixed * I32F32::from_num(1000)).round();
    let milli: i64 = scaled.to_num();
    format_milli(milli)
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        format!("{}{}", sign, int_part)
    } else {
        let mut s = format!("{}{}.{:03}", sign, int_part, frac_part);
        while s.ends_with('0') {
            s.pop();
        }
        s
    }
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}
