use doc_model::{FontFamily, TextStyle};
use pdf_engine::FontLibrary;
use std::sync::Arc;

/// Sizes a single-line label. Used both when a label is created and when its
/// text, size or family changes, so bounds never go stale.
pub trait TextMeasure: Send + Sync {
    /// Width and height in doc units.
    fn measure(&self, text: &str, style: &TextStyle) -> (f32, f32);
}

/// Average-advance estimate for when no font program is loaded.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApproximateMeasure;

impl ApproximateMeasure {
    fn average_advance(family: FontFamily) -> f32 {
        match family {
            FontFamily::Serif => 0.5,
            FontFamily::Sans => 0.55,
        }
    }
}

impl TextMeasure for ApproximateMeasure {
    fn measure(&self, text: &str, style: &TextStyle) -> (f32, f32) {
        let advance = Self::average_advance(style.font_family) * style.font_size;
        (text.chars().count() as f32 * advance, style.font_size)
    }
}

/// Measures with the real glyph advances of the loaded assets.
#[derive(Debug, Clone)]
pub struct FontMeasure {
    library: Arc<FontLibrary>,
}

impl FontMeasure {
    pub fn new(library: Arc<FontLibrary>) -> Self {
        Self { library }
    }
}

impl TextMeasure for FontMeasure {
    fn measure(&self, text: &str, style: &TextStyle) -> (f32, f32) {
        match self.library.get(style.font_family) {
            Some(asset) => asset.measure(text, style.font_size),
            None => ApproximateMeasure.measure(text, style),
        }
    }
}
