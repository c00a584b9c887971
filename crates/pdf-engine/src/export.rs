//! Burns the annotation set into a copy of the document.
//!
//! Per annotated page the existing content is wrapped in `q ... Q` and one
//! markup stream is appended: every rectangle first (masks sit beneath
//! labels), then every text label drawn with that family's embedded
//! Type0/Identity-H font.

use crate::fonts::{FontMap, FontPayload};
use crate::objects;
use crate::PdfEngineError;
use doc_model::transform::{self, InvalidRotation, Rotation};
use doc_model::{AnnotationSet, Color, FontFamily, RectAnnotation, TextAnnotation};
use log::{info, warn};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::collections::BTreeMap;
use std::fmt::Write as _;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Engine(#[from] PdfEngineError),
    #[error("no embedded font available for family {0}")]
    MissingEmbeddedFont(FontFamily),
    #[error("page {page}: {source}")]
    InvalidRotation {
        page: u32,
        #[source]
        source: InvalidRotation,
    },
    #[error("annotation on page {page} but document has {page_count} pages")]
    PageOutOfRange { page: u32, page_count: u32 },
}

impl From<lopdf::Error> for ExportError {
    fn from(err: lopdf::Error) -> Self {
        ExportError::Engine(PdfEngineError::Parse(err))
    }
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        ExportError::Engine(PdfEngineError::Io(err))
    }
}

/// Returns new document bytes with `annotations` painted onto their pages.
///
/// Every family used by a non-empty label must be present in `fonts`; a
/// missing one fails the whole export rather than dropping text.
pub fn export_document(
    original: &[u8],
    annotations: &AnnotationSet,
    fonts: &FontMap,
) -> Result<Vec<u8>, ExportError> {
    for text in annotations.texts.iter().filter(|text| !text.text.is_empty()) {
        if !fonts.contains_key(&text.style.font_family) {
            return Err(ExportError::MissingEmbeddedFont(text.style.font_family));
        }
    }

    let mut doc = Document::load_mem(original)?;
    let pages = doc.get_pages();
    let page_count = pages.len() as u32;

    let mut targets = Vec::new();
    for page in annotations.pages() {
        let page_id = *pages.get(&page).ok_or(ExportError::PageOutOfRange { page, page_count })?;
        let geometry = objects::page_geometry(&doc, page_id);
        let rotation = geometry.rotation().map_err(|source| {
            warn!("cannot place markup on page {page}: {source}");
            ExportError::InvalidRotation { page, source }
        })?;
        targets.push((page, page_id, geometry, rotation));
    }

    let used_families = annotations
        .texts
        .iter()
        .filter(|text| !text.text.is_empty())
        .map(|text| text.style.font_family)
        .collect::<std::collections::BTreeSet<_>>();

    let mut embedded = BTreeMap::new();
    for family in used_families {
        let payload = fonts.get(&family).ok_or(ExportError::MissingEmbeddedFont(family))?;
        embedded.insert(family, embed_font(&mut doc, payload));
    }

    for (page, page_id, geometry, rotation) in targets {
        let mut resources = objects::page_resources(&doc, page_id);
        let mut font_resources = match resources.get(b"Font") {
            Ok(object) => objects::resolve(&doc, object)
                .as_dict()
                .cloned()
                .unwrap_or_else(|_| Dictionary::new()),
            Err(_) => Dictionary::new(),
        };

        let mut resource_names = BTreeMap::new();
        for (family, font_id) in &embedded {
            let name = unused_resource_name(&font_resources, *family);
            font_resources.set(name.clone(), Object::Reference(*font_id));
            resource_names.insert(*family, name);
        }
        resources.set("Font", Object::Dictionary(font_resources));

        let frame = PageFrame::new(&geometry, rotation);
        let markup = page_markup(annotations, page, &frame, fonts, &resource_names);

        let mut contents = objects::page_contents(&doc, page_id);
        let open_id = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
        let markup_id = doc.add_object(Stream::new(dictionary! {}, markup));
        contents.insert(0, Object::Reference(open_id));
        contents.push(Object::Reference(markup_id));

        let page_dict = doc.get_object_mut(page_id)?.as_dict_mut()?;
        page_dict.set("Contents", Object::Array(contents));
        page_dict.set("Resources", Object::Dictionary(resources));
    }

    let mut out = Vec::with_capacity(original.len());
    doc.save_to(&mut out)?;

    info!(
        "exported {} texts and {} rects across {page_count} pages ({} bytes)",
        annotations.texts.len(),
        annotations.rects.len(),
        out.len()
    );
    Ok(out)
}

/// Everything needed to move a doc-space point onto one output page.
struct PageFrame {
    width: f32,
    height: f32,
    origin: (f32, f32),
    rotation: Rotation,
}

impl PageFrame {
    fn new(geometry: &crate::PageGeometry, rotation: Rotation) -> Self {
        let (width, height) =
            transform::displayed_size(geometry.width_pt, geometry.height_pt, rotation);
        Self { width, height, origin: (geometry.origin_x, geometry.origin_y), rotation }
    }

    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        let (ox, oy) = transform::to_output_space(x, y, self.width, self.height, self.rotation);
        (ox + self.origin.0, oy + self.origin.1)
    }
}

fn page_markup(
    annotations: &AnnotationSet,
    page: u32,
    frame: &PageFrame,
    fonts: &FontMap,
    resource_names: &BTreeMap<FontFamily, String>,
) -> Vec<u8> {
    let mut ops = String::from("Q\nq\n");

    for rect in annotations.rects_on_page(page) {
        write_rect(&mut ops, rect, frame);
    }

    for text in annotations.texts_on_page(page).filter(|text| !text.text.is_empty()) {
        let family = text.style.font_family;
        if let (Some(payload), Some(name)) = (fonts.get(&family), resource_names.get(&family)) {
            write_text(&mut ops, text, frame, payload, name);
        }
    }

    ops.push_str("Q\n");
    ops.into_bytes()
}

fn write_rect(ops: &mut String, rect: &RectAnnotation, frame: &PageFrame) {
    let a = frame.map(rect.x, rect.y);
    let b = frame.map(rect.x + rect.width, rect.y + rect.height);
    let (x, y) = (a.0.min(b.0), a.1.min(b.1));
    let (width, height) = ((a.0 - b.0).abs(), (a.1 - b.1).abs());

    let _ = writeln!(ops, "{} rg", color_operands(rect.color));
    let _ = writeln!(ops, "{} {} {} {} re f", num(x), num(y), num(width), num(height));
}

fn write_text(
    ops: &mut String,
    text: &TextAnnotation,
    frame: &PageFrame,
    payload: &FontPayload,
    resource_name: &str,
) {
    let (x, y) = frame.map(text.x, text.y);
    let [a, b, c, d] = transform::text_matrix(frame.rotation);

    let mut glyphs = String::with_capacity(text.text.len() * 4);
    for cid in payload.encode(&text.text) {
        let _ = write!(glyphs, "{cid:04X}");
    }

    ops.push_str("BT\n");
    let _ = writeln!(ops, "/{resource_name} {} Tf", num(text.style.font_size));
    let _ = writeln!(ops, "{} rg", color_operands(text.style.color));
    let _ = writeln!(ops, "{} {} {} {} {} {} Tm", num(a), num(b), num(c), num(d), num(x), num(y));
    let _ = writeln!(ops, "<{glyphs}> Tj");
    ops.push_str("ET\n");
}

fn color_operands(color: Color) -> String {
    let (r, g, b) = color.to_normalized();
    format!("{} {} {}", num(r), num(g), num(b))
}

/// Content-stream number: at most three decimals, no trailing zeros, no `-0`.
fn num(value: f32) -> String {
    let formatted = format!("{value:.3}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" | "" => "0".to_owned(),
        other => other.to_owned(),
    }
}

fn unused_resource_name(fonts: &Dictionary, family: FontFamily) -> String {
    let base = match family {
        FontFamily::Serif => "MkSerif",
        FontFamily::Sans => "MkSans",
    };
    let mut name = base.to_owned();
    let mut counter = 1;
    while fonts.has(name.as_bytes()) {
        counter += 1;
        name = format!("{base}{counter}");
    }
    name
}

fn embed_font(doc: &mut Document, payload: &FontPayload) -> ObjectId {
    let metrics = payload.metrics;
    let base_font = Object::Name(payload.base_font.as_bytes().to_vec());

    let file_id = doc.add_object(Stream::new(
        dictionary! { "Length1" => Object::Integer(payload.bytes.len() as i64) },
        payload.bytes.to_vec(),
    ));

    let bbox =
        metrics.bbox.iter().map(|value| Object::Integer(metrics.to_pdf_units(*value as i32)));
    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => base_font.clone(),
        "Flags" => Object::Integer(32),
        "FontBBox" => Object::Array(bbox.collect()),
        "ItalicAngle" => Object::Integer(0),
        "Ascent" => Object::Integer(metrics.to_pdf_units(metrics.ascender as i32)),
        "Descent" => Object::Integer(metrics.to_pdf_units(metrics.descender as i32)),
        "CapHeight" => Object::Integer(metrics.to_pdf_units(metrics.cap_height as i32)),
        "StemV" => Object::Integer(80),
        "FontFile2" => Object::Reference(file_id),
    });

    let cid_font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => base_font.clone(),
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => Object::Integer(0),
        },
        "FontDescriptor" => Object::Reference(descriptor_id),
        "DW" => Object::Integer(1000),
        "W" => widths_array(payload),
        "CIDToGIDMap" => "Identity",
    });

    let to_unicode_id =
        doc.add_object(Stream::new(dictionary! {}, to_unicode_cmap(payload).into_bytes()));

    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => base_font,
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![Object::Reference(cid_font_id)],
        "ToUnicode" => Object::Reference(to_unicode_id),
    })
}

/// `/W` entries grouped into runs of consecutive CIDs.
fn widths_array(payload: &FontPayload) -> Object {
    let mut entries = Vec::new();
    let mut run: Option<(u16, Vec<Object>)> = None;

    for (&cid, &width) in &payload.widths {
        match run.as_mut() {
            Some((start, widths)) if *start as usize + widths.len() == cid as usize => {
                widths.push(Object::Integer(width));
            }
            _ => {
                if let Some((start, widths)) = run.take() {
                    entries.push(Object::Integer(start as i64));
                    entries.push(Object::Array(widths));
                }
                run = Some((cid, vec![Object::Integer(width)]));
            }
        }
    }
    if let Some((start, widths)) = run {
        entries.push(Object::Integer(start as i64));
        entries.push(Object::Array(widths));
    }

    Object::Array(entries)
}

fn to_unicode_cmap(payload: &FontPayload) -> String {
    let mut mappings: Vec<(u16, char)> = payload.cids.iter().map(|(&ch, &cid)| (cid, ch)).collect();
    mappings.sort_unstable();

    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n\
         /CMapType 2 def\n\
         1 begincodespacerange\n\
         <0000> <FFFF>\n\
         endcodespacerange\n",
    );

    for chunk in mappings.chunks(100) {
        let _ = writeln!(cmap, "{} beginbfchar", chunk.len());
        for &(cid, ch) in chunk {
            let mut units = [0u16; 2];
            let utf16 = ch.encode_utf16(&mut units);
            let hex: String = utf16.iter().map(|unit| format!("{unit:04X}")).collect();
            let _ = writeln!(cmap, "<{cid:04X}> <{hex}>");
        }
        cmap.push_str("endbfchar\n");
    }

    cmap.push_str(
        "endcmap\n\
         CMapName currentdict /CMap defineresource pop\n\
         end\n\
         end\n",
    );
    cmap
}
