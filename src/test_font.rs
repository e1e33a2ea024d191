//! Synthetic TrueType fonts with known advances for unit tests.
//!
//! Every outlined glyph is a filled box inset 50 units from its advance,
//! 700 units tall, so raster tests can see ink and layout tests can rely
//! on exact widths.

const UNITS_PER_EM: u16 = 1000;
const NOTDEF_ADVANCE: u16 = 500;

/// Space is 250 units, `W` and `M` are 1000, every other glyph is 500.
pub(crate) fn sample_font() -> Vec<u8> {
    let mut glyphs: Vec<(char, u16)> = Vec::new();
    for code in 0x20u32..=0x7E {
        let Some(ch) = char::from_u32(code) else {
            continue;
        };
        let advance = match ch {
            ' ' => 250,
            'W' | 'M' => 1000,
            _ => 500,
        };
        glyphs.push((ch, advance));
    }
    for ch in ['\u{a0}', '«', '»', 'é', '‘', '’', '“', '”', '…'] {
        let advance = if ch == '\u{a0}' { 250 } else { 500 };
        glyphs.push((ch, advance));
    }
    build_font(&glyphs)
}

pub(crate) fn build_font(glyphs: &[(char, u16)]) -> Vec<u8> {
    let mut sorted: Vec<(char, u16)> = glyphs.to_vec();
    sorted.sort_by_key(|(ch, _)| *ch as u32);
    sorted.dedup_by_key(|(ch, _)| *ch);
    let num_glyphs = (sorted.len() + 1) as u16;

    let mut advances = vec![NOTDEF_ADVANCE];
    let mut outlined = vec![true];
    for (ch, advance) in &sorted {
        advances.push(*advance);
        outlined.push(!ch.is_whitespace());
    }

    let (glyf, loca) = glyf_and_loca(&advances, &outlined);
    let max_advance = advances.iter().copied().max().unwrap_or(NOTDEF_ADVANCE);

    let tables: Vec<([u8; 4], Vec<u8>)> = vec![
        (*b"cmap", cmap_table(&sorted)),
        (*b"glyf", glyf),
        (*b"head", head_table(max_advance)),
        (*b"hhea", hhea_table(num_glyphs, max_advance)),
        (*b"hmtx", hmtx_table(&advances)),
        (*b"loca", loca),
        (*b"maxp", maxp_table(num_glyphs)),
    ];
    assemble(&tables)
}

fn assemble(tables: &[([u8; 4], Vec<u8>)]) -> Vec<u8> {
    let num_tables = tables.len() as u16;
    let mut entry_selector = 0u16;
    while (1u16 << (entry_selector + 1)) <= num_tables {
        entry_selector += 1;
    }
    let search_range = (1u16 << entry_selector) * 16;
    let range_shift = num_tables * 16 - search_range;

    let mut out = Vec::new();
    out.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    out.extend_from_slice(&num_tables.to_be_bytes());
    out.extend_from_slice(&search_range.to_be_bytes());
    out.extend_from_slice(&entry_selector.to_be_bytes());
    out.extend_from_slice(&range_shift.to_be_bytes());

    let mut offset = 12 + 16 * tables.len();
    let mut body = Vec::new();
    for (tag, data) in tables {
        out.extend_from_slice(tag);
        out.extend_from_slice(&checksum(data).to_be_bytes());
        out.extend_from_slice(&(offset as u32).to_be_bytes());
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        body.extend_from_slice(data);
        while body.len() % 4 != 0 {
            body.push(0);
        }
        offset = 12 + 16 * tables.len() + body.len();
    }
    out.extend_from_slice(&body);
    out
}

fn checksum(data: &[u8]) -> u32 {
    let mut sum = 0u32;
    for chunk in data.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        sum = sum.wrapping_add(u32::from_be_bytes(word));
    }
    sum
}

fn cmap_table(glyphs: &[(char, u16)]) -> Vec<u8> {
    // Format 12 groups, one per mapped character.
    let mut groups = Vec::new();
    for (index, (ch, _)) in glyphs.iter().enumerate() {
        let code = *ch as u32;
        let gid = (index + 1) as u32;
        groups.extend_from_slice(&code.to_be_bytes());
        groups.extend_from_slice(&code.to_be_bytes());
        groups.extend_from_slice(&gid.to_be_bytes());
    }
    let subtable_len = 16 + groups.len();

    let mut out = Vec::new();
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&3u16.to_be_bytes());
    out.extend_from_slice(&10u16.to_be_bytes());
    out.extend_from_slice(&12u32.to_be_bytes());

    out.extend_from_slice(&12u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&(subtable_len as u32).to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&(glyphs.len() as u32).to_be_bytes());
    out.extend_from_slice(&groups);
    out
}

fn glyf_and_loca(advances: &[u16], outlined: &[bool]) -> (Vec<u8>, Vec<u8>) {
    let mut glyf = Vec::new();
    let mut loca = Vec::new();
    for (advance, has_outline) in advances.iter().zip(outlined.iter()) {
        loca.extend_from_slice(&(glyf.len() as u32).to_be_bytes());
        if !*has_outline {
            continue;
        }
        let left: i16 = 50;
        let width = (*advance as i16 - 100).max(10);
        let top: i16 = 700;
        glyf.extend_from_slice(&1i16.to_be_bytes());
        glyf.extend_from_slice(&left.to_be_bytes());
        glyf.extend_from_slice(&0i16.to_be_bytes());
        glyf.extend_from_slice(&(left + width).to_be_bytes());
        glyf.extend_from_slice(&top.to_be_bytes());
        glyf.extend_from_slice(&3u16.to_be_bytes());
        glyf.extend_from_slice(&0u16.to_be_bytes());
        glyf.extend_from_slice(&[0x01, 0x01, 0x01, 0x01]);
        for dx in [left, width, 0, -width] {
            glyf.extend_from_slice(&dx.to_be_bytes());
        }
        for dy in [0i16, 0, top, 0] {
            glyf.extend_from_slice(&dy.to_be_bytes());
        }
        while glyf.len() % 4 != 0 {
            glyf.push(0);
        }
    }
    loca.extend_from_slice(&(glyf.len() as u32).to_be_bytes());
    (glyf, loca)
}

fn head_table(max_advance: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(54);
    out.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    out.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&0x5F0F_3CF5u32.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&UNITS_PER_EM.to_be_bytes());
    out.extend_from_slice(&0u64.to_be_bytes());
    out.extend_from_slice(&0u64.to_be_bytes());
    out.extend_from_slice(&0i16.to_be_bytes());
    out.extend_from_slice(&(-200i16).to_be_bytes());
    out.extend_from_slice(&(max_advance as i16).to_be_bytes());
    out.extend_from_slice(&800i16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&8u16.to_be_bytes());
    out.extend_from_slice(&2i16.to_be_bytes());
    // Long loca offsets.
    out.extend_from_slice(&1i16.to_be_bytes());
    out.extend_from_slice(&0i16.to_be_bytes());
    out
}

fn hhea_table(num_glyphs: u16, max_advance: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(36);
    out.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    out.extend_from_slice(&800i16.to_be_bytes());
    out.extend_from_slice(&(-200i16).to_be_bytes());
    out.extend_from_slice(&0i16.to_be_bytes());
    out.extend_from_slice(&max_advance.to_be_bytes());
    out.extend_from_slice(&0i16.to_be_bytes());
    out.extend_from_slice(&0i16.to_be_bytes());
    out.extend_from_slice(&(max_advance as i16).to_be_bytes());
    out.extend_from_slice(&1i16.to_be_bytes());
    out.extend_from_slice(&0i16.to_be_bytes());
    out.extend_from_slice(&0i16.to_be_bytes());
    for _ in 0..4 {
        out.extend_from_slice(&0i16.to_be_bytes());
    }
    out.extend_from_slice(&0i16.to_be_bytes());
    out.extend_from_slice(&num_glyphs.to_be_bytes());
    out
}

fn hmtx_table(advances: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(advances.len() * 4);
    for advance in advances {
        out.extend_from_slice(&advance.to_be_bytes());
        out.extend_from_slice(&50i16.to_be_bytes());
    }
    out
}

fn maxp_table(num_glyphs: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(6);
    out.extend_from_slice(&0x0000_5000u32.to_be_bytes());
    out.extend_from_slice(&num_glyphs.to_be_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ttf_parser::GlyphId;

    #[test]
    fn sample_font_parses_with_expected_metrics() {
        let data = sample_font();
        let face = ttf_parser::Face::parse(&data, 0).unwrap();
        assert_eq!(face.units_per_em(), 1000);
        let a = face.glyph_index('a').unwrap();
        assert_eq!(face.glyph_hor_advance(a), Some(500));
        let space = face.glyph_index(' ').unwrap();
        assert_eq!(face.glyph_hor_advance(space), Some(250));
        let ellipsis = face.glyph_index('…').unwrap();
        assert_eq!(face.glyph_hor_advance(ellipsis), Some(500));
        assert_eq!(face.glyph_hor_advance(GlyphId(0)), Some(500));
        assert!(face.glyph_bounding_box(a).is_some());
        assert!(face.glyph_bounding_box(space).is_none());
    }
}
