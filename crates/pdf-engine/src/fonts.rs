//! Font assets and the subset builder used when embedding markup text.
//!
//! A [`FontPayload`] is what the exporter embeds: the font program (a true
//! subset, or the full font when subsetting fails), the codepoint to CID map
//! used to encode text, and per-CID advance widths in 1/1000 em.

use doc_model::{AnnotationSet, FontFamily};
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use subsetter::GlyphRemapper;
use ttf_parser::{Face, GlyphId};

#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("font parse error: {0}")]
    Parse(#[from] ttf_parser::FaceParsingError),
}

/// Vertical metrics in font units, taken once when the asset loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FontMetrics {
    pub units_per_em: u16,
    pub ascender: i16,
    pub descender: i16,
    pub cap_height: i16,
    pub bbox: [i16; 4],
}

impl FontMetrics {
    fn from_face(face: &Face<'_>) -> Self {
        let bbox = face.global_bounding_box();
        Self {
            units_per_em: face.units_per_em().max(1),
            ascender: face.ascender(),
            descender: face.descender(),
            cap_height: face.capital_height().unwrap_or_else(|| face.ascender()),
            bbox: [bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max],
        }
    }

    /// Converts font units into 1/1000 em, the unit PDF font dictionaries use.
    pub fn to_pdf_units(&self, value: i32) -> i64 {
        (value as f64 * 1000.0 / self.units_per_em as f64).round() as i64
    }

    pub fn line_height(&self, font_size: f32) -> f32 {
        (self.ascender as f32 - self.descender as f32) / self.units_per_em as f32 * font_size
    }
}

/// One family's full font program, loaded once and shared.
#[derive(Debug, Clone)]
pub struct FontAsset {
    family: FontFamily,
    bytes: Arc<Vec<u8>>,
    metrics: FontMetrics,
    fingerprint: u64,
}

impl FontAsset {
    pub fn from_bytes(family: FontFamily, bytes: Vec<u8>) -> Result<Self, FontError> {
        let metrics = FontMetrics::from_face(&Face::parse(&bytes, 0)?);
        let fingerprint = fnv1a(&bytes);
        Ok(Self { family, bytes: Arc::new(bytes), metrics, fingerprint })
    }

    pub fn load(family: FontFamily, path: &Path) -> Result<Self, FontError> {
        Self::from_bytes(family, fs::read(path)?)
    }

    pub fn family(&self) -> FontFamily {
        self.family
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn metrics(&self) -> FontMetrics {
        self.metrics
    }

    /// Width and height of a single-line label at `font_size`, in the same
    /// units as the size.
    pub fn measure(&self, text: &str, font_size: f32) -> (f32, f32) {
        let height = self.metrics.line_height(font_size);
        let Ok(face) = Face::parse(&self.bytes, 0) else {
            return (0.0, height);
        };

        let units: u32 = text
            .chars()
            .map(|ch| {
                let glyph = face.glyph_index(ch).unwrap_or(GlyphId(0));
                face.glyph_hor_advance(glyph).unwrap_or(0) as u32
            })
            .sum();

        (units as f32 / self.metrics.units_per_em as f32 * font_size, height)
    }
}

/// The serif and sans assets, whichever of them could be loaded.
#[derive(Debug, Clone, Default)]
pub struct FontLibrary {
    assets: BTreeMap<FontFamily, FontAsset>,
}

impl FontLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads both families; a missing or unreadable file only disables that family.
    pub fn load(serif: &Path, sans: &Path) -> Self {
        let mut library = Self::new();
        for (family, path) in [(FontFamily::Serif, serif), (FontFamily::Sans, sans)] {
            match FontAsset::load(family, path) {
                Ok(asset) => library.insert(asset),
                Err(err) => warn!("font asset {family} unavailable at {}: {err}", path.display()),
            }
        }
        library
    }

    pub fn insert(&mut self, asset: FontAsset) {
        self.assets.insert(asset.family(), asset);
    }

    pub fn get(&self, family: FontFamily) -> Option<&FontAsset> {
        self.assets.get(&family)
    }

    pub fn families(&self) -> impl Iterator<Item = FontFamily> + '_ {
        self.assets.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Subset,
    /// Subsetting failed; the full font is embedded with original glyph ids.
    Full,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FontPayload {
    pub family: FontFamily,
    pub base_font: String,
    pub bytes: Arc<Vec<u8>>,
    pub kind: PayloadKind,
    pub cids: BTreeMap<char, u16>,
    pub widths: BTreeMap<u16, i64>,
    pub metrics: FontMetrics,
}

impl FontPayload {
    /// Identity-H code units for `text`; unmapped characters become notdef.
    pub fn encode(&self, text: &str) -> Vec<u16> {
        text.chars().map(|ch| self.cids.get(&ch).copied().unwrap_or(0)).collect()
    }

    pub fn is_subset(&self) -> bool {
        self.kind == PayloadKind::Subset
    }
}

pub type FontMap = BTreeMap<FontFamily, Arc<FontPayload>>;

type MemoKey = (FontFamily, u64, Vec<char>);

/// Builds embeddable font payloads and remembers them per character set, so
/// repeated saves with unchanged text reuse the same bytes.
#[derive(Debug, Default)]
pub struct FontSubsetBuilder {
    memo: Mutex<HashMap<MemoKey, Arc<FontPayload>>>,
}

impl FontSubsetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` for an empty set (nothing to embed) or an unparsable font.
    pub fn build(
        &self,
        asset: &FontAsset,
        codepoints: &BTreeSet<char>,
    ) -> Option<Arc<FontPayload>> {
        if codepoints.is_empty() {
            return None;
        }

        let key: MemoKey =
            (asset.family(), asset.fingerprint, codepoints.iter().copied().collect());
        if let Some(payload) = self.memo.lock().unwrap().get(&key) {
            debug!("reusing {} font payload for {} codepoints", asset.family(), codepoints.len());
            return Some(Arc::clone(payload));
        }

        let payload = Arc::new(build_payload(asset, codepoints)?);
        self.memo.lock().unwrap().insert(key, Arc::clone(&payload));
        Some(payload)
    }

    /// Builds payloads for every family in `usage` that has a loaded asset.
    pub fn build_all(
        &self,
        library: &FontLibrary,
        usage: &BTreeMap<FontFamily, BTreeSet<char>>,
    ) -> FontMap {
        usage
            .iter()
            .filter_map(|(family, codepoints)| {
                let asset = library.get(*family)?;
                Some((*family, self.build(asset, codepoints)?))
            })
            .collect()
    }

    pub fn cached_payloads(&self) -> usize {
        self.memo.lock().unwrap().len()
    }
}

fn build_payload(asset: &FontAsset, codepoints: &BTreeSet<char>) -> Option<FontPayload> {
    let face = match Face::parse(asset.bytes(), 0) {
        Ok(face) => face,
        Err(err) => {
            warn!("cannot embed {} font: {err}", asset.family());
            return None;
        }
    };

    let mapped: Vec<(char, GlyphId)> = codepoints
        .iter()
        .filter_map(|&ch| face.glyph_index(ch).map(|glyph| (ch, glyph)))
        .collect();

    let mut remapper = GlyphRemapper::new();
    for (_, glyph) in &mapped {
        remapper.remap(glyph.0);
    }

    let metrics = asset.metrics();
    let advance = |glyph: GlyphId| {
        metrics.to_pdf_units(face.glyph_hor_advance(glyph).unwrap_or(0) as i32)
    };

    let (bytes, kind, cids) = match subsetter::subset(asset.bytes(), 0, &remapper) {
        Ok(bytes) => {
            let cids = mapped
                .iter()
                .filter_map(|&(ch, glyph)| remapper.get(glyph.0).map(|cid| (ch, cid)))
                .collect::<BTreeMap<_, _>>();
            (bytes, PayloadKind::Subset, cids)
        }
        Err(err) => {
            warn!("subsetting {} font failed ({err:?}), embedding full font", asset.family());
            let cids = mapped.iter().map(|&(ch, glyph)| (ch, glyph.0)).collect();
            (asset.bytes().to_vec(), PayloadKind::Full, cids)
        }
    };

    let mut widths = BTreeMap::new();
    widths.insert(0, advance(GlyphId(0)));
    for &(ch, glyph) in &mapped {
        if let Some(&cid) = cids.get(&ch) {
            widths.insert(cid, advance(glyph));
        }
    }

    debug!(
        "built {} font payload: {} glyphs, {} bytes ({kind:?})",
        asset.family(),
        widths.len(),
        bytes.len()
    );

    Some(FontPayload {
        family: asset.family(),
        base_font: format!(
            "{}+{}",
            subset_tag(asset.family(), codepoints),
            base_name(asset.family())
        ),
        bytes: Arc::new(bytes),
        kind,
        cids,
        widths,
        metrics,
    })
}

fn base_name(family: FontFamily) -> &'static str {
    match family {
        FontFamily::Serif => "MarkupSerif",
        FontFamily::Sans => "MarkupSans",
    }
}

/// Six uppercase letters derived from the character set.
fn subset_tag(family: FontFamily, codepoints: &BTreeSet<char>) -> String {
    let mut seed = family.as_str().as_bytes().to_vec();
    for ch in codepoints {
        seed.extend_from_slice(&(*ch as u32).to_le_bytes());
    }

    let mut hash = fnv1a(&seed);
    (0..6)
        .map(|_| {
            let letter = (b'A' + (hash % 26) as u8) as char;
            hash /= 26;
            letter
        })
        .collect()
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ *byte as u64).wrapping_mul(0x0100_0000_01b3)
    })
}

/// Distinct characters per family across every non-empty text annotation.
pub fn collect_codepoints(annotations: &AnnotationSet) -> BTreeMap<FontFamily, BTreeSet<char>> {
    let mut usage: BTreeMap<FontFamily, BTreeSet<char>> = BTreeMap::new();
    for text in annotations.texts.iter().filter(|text| !text.text.is_empty()) {
        usage.entry(text.style.font_family).or_default().extend(text.text.chars());
    }
    usage
}
