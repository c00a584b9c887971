//! Fixture builders shared by this crate's tests and downstream crates
//! (enable the `test-support` feature). Everything is generated in code so
//! no binary fixtures need to be checked in.

use lopdf::{dictionary, Document, Object, ObjectId, Stream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpec {
    pub width: i64,
    pub height: i64,
    pub rotation: i64,
    pub origin: (i64, i64),
}

impl PageSpec {
    pub fn new(width: i64, height: i64) -> Self {
        Self { width, height, rotation: 0, origin: (0, 0) }
    }

    pub fn letter() -> Self {
        Self::new(612, 792)
    }

    pub fn rotated(self, rotation: i64) -> Self {
        Self { rotation, ..self }
    }

    pub fn with_origin(self, x: i64, y: i64) -> Self {
        Self { origin: (x, y), ..self }
    }
}

const SAMPLE_CONTENT: &[u8] = b"BT /F1 12 Tf 72 720 Td (Hi) Tj ET\n";

/// A small document whose pages each draw "Hi" in Helvetica as `/F1`.
pub fn sample_pdf(pages: &[PageSpec]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::with_capacity(pages.len());
    for spec in pages {
        let content_id = doc.add_object(Stream::new(dictionary! {}, SAMPLE_CONTENT.to_vec()));
        let (x0, y0) = spec.origin;
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => media_box(x0, y0, x0 + spec.width, y0 + spec.height),
            "Contents" => Object::Reference(content_id),
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => Object::Reference(font_id) },
            },
        };
        if spec.rotation != 0 {
            page.set("Rotate", Object::Integer(spec.rotation));
        }
        kids.push(Object::Reference(doc.add_object(page)));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(count),
        }),
    );

    finish(doc, pages_id)
}

/// One page that takes its media box, rotation and resources from the page tree.
pub fn sample_pdf_with_inherited_attributes(width: i64, height: i64, rotation: i64) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content = b"0 0 1 rg 10 10 20 20 re f\n".to_vec();
    let content_id = doc.add_object(Stream::new(dictionary! {}, content));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => Object::Reference(pages_id),
        "Contents" => Object::Reference(content_id),
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => Object::Integer(1),
            "MediaBox" => media_box(0, 0, width, height),
            "Rotate" => Object::Integer(rotation),
            "Resources" => dictionary! {},
        }),
    );

    finish(doc, pages_id)
}

fn media_box(x0: i64, y0: i64, x1: i64, y1: i64) -> Object {
    Object::Array(vec![
        Object::Integer(x0),
        Object::Integer(y0),
        Object::Integer(x1),
        Object::Integer(y1),
    ])
}

fn finish(mut doc: Document, pages_id: ObjectId) -> Vec<u8> {
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("sample pdf should serialize");
    bytes
}

/// Decoded content of a page, all streams concatenated.
pub fn page_content(bytes: &[u8], page: u32) -> String {
    let doc = Document::load_mem(bytes).expect("pdf should parse");
    let page_id = doc.get_pages()[&page];
    let content = doc.get_page_content(page_id).expect("page content should decode");
    String::from_utf8_lossy(&content).into_owned()
}

#[derive(Debug, Clone, Copy)]
pub struct SyntheticGlyph {
    pub ch: Option<char>,
    pub advance: u16,
    /// `[x_min, y_min, x_max, y_max]` of the square outline, if any.
    pub outline: Option<[i16; 4]>,
}

const fn glyph(ch: Option<char>, advance: u16, outline: Option<[i16; 4]>) -> SyntheticGlyph {
    SyntheticGlyph { ch, advance, outline }
}

/// Glyph order of [`synthetic_font`]: notdef, then ascending codepoints.
pub const SYNTHETIC_GLYPHS: &[SyntheticGlyph] = &[
    glyph(None, 500, Some([50, 0, 450, 700])),
    glyph(Some(' '), 250, None),
    glyph(Some('A'), 600, Some([40, 0, 560, 700])),
    glyph(Some('B'), 620, Some([60, 0, 580, 700])),
    glyph(Some('H'), 700, Some([60, 0, 640, 700])),
    glyph(Some('e'), 540, Some([40, 0, 500, 500])),
    glyph(Some('l'), 260, Some([60, 0, 200, 720])),
    glyph(Some('o'), 560, Some([40, 0, 520, 500])),
    glyph(Some('x'), 520, Some([20, 0, 500, 500])),
    glyph(Some('ä'), 560, Some([40, 0, 520, 680])),
];

const UNITS_PER_EM: u16 = 1000;
const ASCENDER: i16 = 800;
const DESCENDER: i16 = -200;

/// A minimal but complete TrueType font: square outlines for the glyphs in
/// [`SYNTHETIC_GLYPHS`], format 4 cmap, 1000 units per em.
pub fn synthetic_font() -> Vec<u8> {
    let glyph_count = SYNTHETIC_GLYPHS.len() as u16;

    let mut glyf = Vec::new();
    let mut loca = Vec::new();
    let mut hmtx = Vec::new();
    for glyph in SYNTHETIC_GLYPHS {
        put_u16(&mut loca, (glyf.len() / 2) as u16);
        let lsb = glyph.outline.map(|outline| outline[0]).unwrap_or(0);
        put_u16(&mut hmtx, glyph.advance);
        put_i16(&mut hmtx, lsb);
        if let Some(outline) = glyph.outline {
            square_glyph(&mut glyf, outline);
        }
    }
    put_u16(&mut loca, (glyf.len() / 2) as u16);

    let tables: Vec<([u8; 4], Vec<u8>)> = vec![
        (*b"OS/2", os2_table()),
        (*b"cmap", cmap_table()),
        (*b"glyf", glyf),
        (*b"head", head_table()),
        (*b"hhea", hhea_table(glyph_count)),
        (*b"hmtx", hmtx),
        (*b"loca", loca),
        (*b"maxp", maxp_table(glyph_count)),
        (*b"name", name_table()),
        (*b"post", post_table()),
    ];

    assemble(tables)
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_i16(out: &mut Vec<u8>, value: i16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn square_glyph(out: &mut Vec<u8>, [x0, y0, x1, y1]: [i16; 4]) {
    put_i16(out, 1);
    for value in [x0, y0, x1, y1] {
        put_i16(out, value);
    }
    put_u16(out, 3);
    put_u16(out, 0);
    out.extend_from_slice(&[0x01; 4]);
    for dx in [x0, 0, x1 - x0, 0] {
        put_i16(out, dx);
    }
    for dy in [y0, y1 - y0, 0, y0 - y1] {
        put_i16(out, dy);
    }
}

fn head_table() -> Vec<u8> {
    let mut out = Vec::with_capacity(54);
    put_u16(&mut out, 1);
    put_u16(&mut out, 0);
    put_u32(&mut out, 0x0001_0000);
    put_u32(&mut out, 0);
    put_u32(&mut out, 0x5F0F_3CF5);
    put_u16(&mut out, 0);
    put_u16(&mut out, UNITS_PER_EM);
    out.extend_from_slice(&[0; 16]);
    for value in [0, DESCENDER, 700, ASCENDER] {
        put_i16(&mut out, value);
    }
    put_u16(&mut out, 0);
    put_u16(&mut out, 8);
    put_i16(&mut out, 2);
    put_i16(&mut out, 0);
    put_i16(&mut out, 0);
    out
}

fn hhea_table(glyph_count: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(36);
    put_u32(&mut out, 0x0001_0000);
    put_i16(&mut out, ASCENDER);
    put_i16(&mut out, DESCENDER);
    put_i16(&mut out, 0);
    put_u16(&mut out, 700);
    put_i16(&mut out, 0);
    put_i16(&mut out, 0);
    put_i16(&mut out, 640);
    put_i16(&mut out, 1);
    put_i16(&mut out, 0);
    put_i16(&mut out, 0);
    out.extend_from_slice(&[0; 8]);
    put_i16(&mut out, 0);
    put_u16(&mut out, glyph_count);
    out
}

fn maxp_table(glyph_count: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(32);
    put_u32(&mut out, 0x0001_0000);
    put_u16(&mut out, glyph_count);
    for value in [4, 1, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0] {
        put_u16(&mut out, value);
    }
    out
}

fn cmap_table() -> Vec<u8> {
    let mut segments: Vec<(u16, u16)> = SYNTHETIC_GLYPHS
        .iter()
        .enumerate()
        .filter_map(|(gid, glyph)| glyph.ch.map(|ch| (ch as u16, gid as u16)))
        .collect();
    segments.sort_unstable();

    let seg_count = segments.len() as u16 + 1;
    let search_range = 2 * (1u16 << (15 - seg_count.leading_zeros()));
    let entry_selector = (search_range / 2).trailing_zeros() as u16;

    let mut sub = Vec::new();
    put_u16(&mut sub, 4);
    put_u16(&mut sub, 16 + 8 * seg_count);
    put_u16(&mut sub, 0);
    put_u16(&mut sub, seg_count * 2);
    put_u16(&mut sub, search_range);
    put_u16(&mut sub, entry_selector);
    put_u16(&mut sub, seg_count * 2 - search_range);
    for &(code, _) in &segments {
        put_u16(&mut sub, code);
    }
    put_u16(&mut sub, 0xFFFF);
    put_u16(&mut sub, 0);
    for &(code, _) in &segments {
        put_u16(&mut sub, code);
    }
    put_u16(&mut sub, 0xFFFF);
    for &(code, gid) in &segments {
        put_u16(&mut sub, gid.wrapping_sub(code));
    }
    put_u16(&mut sub, 1);
    for _ in 0..seg_count {
        put_u16(&mut sub, 0);
    }

    let mut out = Vec::new();
    put_u16(&mut out, 0);
    put_u16(&mut out, 1);
    put_u16(&mut out, 3);
    put_u16(&mut out, 1);
    put_u32(&mut out, 12);
    out.extend_from_slice(&sub);
    out
}

fn os2_table() -> Vec<u8> {
    let mut out = vec![0; 96];
    out[0..2].copy_from_slice(&4u16.to_be_bytes());
    out[2..4].copy_from_slice(&500i16.to_be_bytes());
    out[4..6].copy_from_slice(&400u16.to_be_bytes());
    out[6..8].copy_from_slice(&5u16.to_be_bytes());
    out[62..64].copy_from_slice(&0x0040u16.to_be_bytes());
    out[64..66].copy_from_slice(&0x0020u16.to_be_bytes());
    out[66..68].copy_from_slice(&0x00E4u16.to_be_bytes());
    out[68..70].copy_from_slice(&ASCENDER.to_be_bytes());
    out[70..72].copy_from_slice(&DESCENDER.to_be_bytes());
    out[74..76].copy_from_slice(&(ASCENDER as u16).to_be_bytes());
    out[76..78].copy_from_slice(&(-DESCENDER as u16).to_be_bytes());
    out[86..88].copy_from_slice(&500i16.to_be_bytes());
    out[88..90].copy_from_slice(&700i16.to_be_bytes());
    out
}

fn name_table() -> Vec<u8> {
    let mut out = Vec::new();
    put_u16(&mut out, 0);
    put_u16(&mut out, 0);
    put_u16(&mut out, 6);
    out
}

fn post_table() -> Vec<u8> {
    let mut out = Vec::with_capacity(32);
    put_u32(&mut out, 0x0003_0000);
    out.extend_from_slice(&[0; 28]);
    out
}

fn checksum(data: &[u8]) -> u32 {
    data.chunks(4).fold(0u32, |sum, chunk| {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        sum.wrapping_add(u32::from_be_bytes(word))
    })
}

fn assemble(tables: Vec<([u8; 4], Vec<u8>)>) -> Vec<u8> {
    let num_tables = tables.len() as u16;
    let search_range = 16 * (1u16 << (15 - num_tables.leading_zeros()));
    let entry_selector = (search_range / 16).trailing_zeros() as u16;

    let mut out = Vec::new();
    put_u32(&mut out, 0x0001_0000);
    put_u16(&mut out, num_tables);
    put_u16(&mut out, search_range);
    put_u16(&mut out, entry_selector);
    put_u16(&mut out, num_tables * 16 - search_range);

    let mut offset = 12 + 16 * tables.len();
    let mut body = Vec::new();
    for (tag, data) in &tables {
        out.extend_from_slice(tag);
        put_u32(&mut out, checksum(data));
        put_u32(&mut out, offset as u32);
        put_u32(&mut out, data.len() as u32);

        body.extend_from_slice(data);
        while body.len() % 4 != 0 {
            body.push(0);
        }
        offset = 12 + 16 * tables.len() + body.len();
    }

    out.extend_from_slice(&body);
    out
}
