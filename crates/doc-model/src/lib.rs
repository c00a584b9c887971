mod color;
mod source;
pub mod transform;

pub use color::{Color, ColorParseError};
pub use source::{DocumentId, DocumentIdError};

use serde::{Deserialize, Serialize};
use std::fmt;

pub const MIN_ZOOM: f32 = 0.25;
pub const MAX_ZOOM: f32 = 4.0;

/// Smallest committed rectangle edge, in doc-space units.
pub const MIN_RECT_SIZE: f32 = 5.0;

pub fn clamp_zoom(zoom: f32) -> f32 {
    if zoom.is_finite() {
        zoom.clamp(MIN_ZOOM, MAX_ZOOM)
    } else {
        1.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontFamily {
    Serif,
    Sans,
}

impl FontFamily {
    pub const ALL: [FontFamily; 2] = [FontFamily::Serif, FontFamily::Sans];

    pub fn as_str(self) -> &'static str {
        match self {
            FontFamily::Serif => "serif",
            FontFamily::Sans => "sans",
        }
    }
}

impl fmt::Display for FontFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    Text,
    Rect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(pub u64);

/// Type-tagged annotation identity, rendered as `t-<n>` or `r-<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnnotationRef {
    pub kind: AnnotationKind,
    pub id: AnnotationId,
}

impl AnnotationRef {
    pub fn text(id: AnnotationId) -> Self {
        Self { kind: AnnotationKind::Text, id }
    }

    pub fn rect(id: AnnotationId) -> Self {
        Self { kind: AnnotationKind::Rect, id }
    }
}

impl fmt::Display for AnnotationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.kind {
            AnnotationKind::Text => 't',
            AnnotationKind::Rect => 'r',
        };
        write!(f, "{tag}-{}", self.id.0)
    }
}

/// Axis-aligned box in doc space (y grows downward).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DocRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl DocRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Box spanning two arbitrary corners, whichever direction the drag went.
    pub fn from_corners(a: (f32, f32), b: (f32, f32)) -> Self {
        Self {
            x: a.0.min(b.0),
            y: a.1.min(b.1),
            width: (a.0 - b.0).abs(),
            height: (a.1 - b.1).abs(),
        }
    }

    pub fn contains(&self, x: f32, y: f32, margin: f32) -> bool {
        x >= self.x - margin
            && x <= self.x + self.width + margin
            && y >= self.y - margin
            && y <= self.y + self.height + margin
    }

    pub fn meets_minimum(&self) -> bool {
        self.width >= MIN_RECT_SIZE && self.height >= MIN_RECT_SIZE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextStyle {
    pub font_size: f32,
    pub font_family: FontFamily,
    pub color: Color,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self { font_size: 16.0, font_family: FontFamily::Sans, color: Color::BLACK }
    }
}

/// A text label. `(x, y)` is the left end of the baseline; the label box
/// extends `height` units above it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextAnnotation {
    pub id: AnnotationId,
    pub page_index: u32,
    pub x: f32,
    pub y: f32,
    pub text: String,
    #[serde(default)]
    pub style: TextStyle,
    /// Derived from the text and style; recomputed on every edit.
    #[serde(default)]
    pub width: f32,
    #[serde(default)]
    pub height: f32,
}

impl TextAnnotation {
    pub fn reference(&self) -> AnnotationRef {
        AnnotationRef::text(self.id)
    }

    pub fn bounds(&self) -> DocRect {
        DocRect::new(self.x, self.y - self.height, self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RectAnnotation {
    pub id: AnnotationId,
    pub page_index: u32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub color: Color,
}

impl RectAnnotation {
    pub fn reference(&self) -> AnnotationRef {
        AnnotationRef::rect(self.id)
    }

    pub fn bounds(&self) -> DocRect {
        DocRect::new(self.x, self.y, self.width, self.height)
    }
}

/// Both annotation lists, each in insertion order (oldest first).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSet {
    #[serde(default)]
    pub texts: Vec<TextAnnotation>,
    #[serde(default)]
    pub rects: Vec<RectAnnotation>,
}

impl AnnotationSet {
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty() && self.rects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.texts.len() + self.rects.len()
    }

    pub fn contains(&self, reference: AnnotationRef) -> bool {
        match reference.kind {
            AnnotationKind::Text => self.text(reference.id).is_some(),
            AnnotationKind::Rect => self.rect(reference.id).is_some(),
        }
    }

    pub fn text(&self, id: AnnotationId) -> Option<&TextAnnotation> {
        self.texts.iter().find(|text| text.id == id)
    }

    pub fn text_mut(&mut self, id: AnnotationId) -> Option<&mut TextAnnotation> {
        self.texts.iter_mut().find(|text| text.id == id)
    }

    pub fn rect(&self, id: AnnotationId) -> Option<&RectAnnotation> {
        self.rects.iter().find(|rect| rect.id == id)
    }

    pub fn rect_mut(&mut self, id: AnnotationId) -> Option<&mut RectAnnotation> {
        self.rects.iter_mut().find(|rect| rect.id == id)
    }

    pub fn bounds_of(&self, reference: AnnotationRef) -> Option<DocRect> {
        match reference.kind {
            AnnotationKind::Text => self.text(reference.id).map(TextAnnotation::bounds),
            AnnotationKind::Rect => self.rect(reference.id).map(RectAnnotation::bounds),
        }
    }

    pub fn texts_on_page(&self, page_index: u32) -> impl Iterator<Item = &TextAnnotation> {
        self.texts.iter().filter(move |text| text.page_index == page_index)
    }

    pub fn rects_on_page(&self, page_index: u32) -> impl Iterator<Item = &RectAnnotation> {
        self.rects.iter().filter(move |rect| rect.page_index == page_index)
    }

    /// Largest id in use, so a restored set can resume numbering after it.
    pub fn max_id(&self) -> Option<AnnotationId> {
        let texts = self.texts.iter().map(|text| text.id);
        let rects = self.rects.iter().map(|rect| rect.id);
        texts.chain(rects).max()
    }

    pub fn pages(&self) -> std::collections::BTreeSet<u32> {
        let texts = self.texts.iter().map(|text| text.page_index);
        let rects = self.rects.iter().map(|rect| rect.page_index);
        texts.chain(rects).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EditMode {
    AddText,
    AddRect,
    #[default]
    Select,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorState {
    pub current_page: u32,
    pub total_pages: u32,
    pub zoom: f32,
    pub edit_mode: EditMode,
    pub selected: Option<AnnotationRef>,
    pub hovered: Option<AnnotationRef>,
}

impl Default for EditorState {
    fn default() -> Self {
        Self {
            current_page: 1,
            total_pages: 0,
            zoom: 1.0,
            edit_mode: EditMode::Select,
            selected: None,
            hovered: None,
        }
    }
}

impl EditorState {
    pub fn for_document(total_pages: u32) -> Self {
        Self { total_pages, ..Self::default() }
    }

    pub fn clamp_page(&self, page: u32) -> u32 {
        page.max(1).min(self.total_pages.max(1))
    }

    /// Drops selection/hover refs that no longer resolve in `annotations`.
    pub fn retain_valid_refs(&mut self, annotations: &AnnotationSet) {
        if self.selected.is_some_and(|reference| !annotations.contains(reference)) {
            self.selected = None;
        }
        if self.hovered.is_some_and(|reference| !annotations.contains(reference)) {
            self.hovered = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(id: u64, page_index: u32) -> RectAnnotation {
        RectAnnotation {
            id: AnnotationId(id),
            page_index,
            x: 10.0,
            y: 10.0,
            width: 20.0,
            height: 20.0,
            color: Color::WHITE,
        }
    }

    #[test]
    fn zoom_is_clamped_and_non_finite_resets() {
        assert_eq!(clamp_zoom(0.01), MIN_ZOOM);
        assert_eq!(clamp_zoom(12.0), MAX_ZOOM);
        assert_eq!(clamp_zoom(1.5), 1.5);
        assert_eq!(clamp_zoom(f32::NAN), 1.0);
    }

    #[test]
    fn from_corners_normalizes_drag_direction() {
        let rect = DocRect::from_corners((50.0, 40.0), (20.0, 10.0));
        assert_eq!(rect, DocRect::new(20.0, 10.0, 30.0, 30.0));
        assert!(rect.meets_minimum());
        assert!(!DocRect::from_corners((0.0, 0.0), (3.0, 3.0)).meets_minimum());
    }

    #[test]
    fn text_bounds_sit_above_the_baseline() {
        let text = TextAnnotation {
            id: AnnotationId(1),
            page_index: 1,
            x: 100.0,
            y: 100.0,
            text: "AB".to_owned(),
            style: TextStyle::default(),
            width: 20.0,
            height: 16.0,
        };

        let bounds = text.bounds();
        assert_eq!(bounds, DocRect::new(100.0, 84.0, 20.0, 16.0));
        assert!(bounds.contains(110.0, 90.0, 0.0));
        assert!(!bounds.contains(110.0, 110.0, 0.0));
    }

    #[test]
    fn references_render_with_kind_tag() {
        assert_eq!(AnnotationRef::text(AnnotationId(3)).to_string(), "t-3");
        assert_eq!(AnnotationRef::rect(AnnotationId(12)).to_string(), "r-12");
    }

    #[test]
    fn retain_valid_refs_drops_dangling_selection() {
        let set = AnnotationSet { texts: Vec::new(), rects: vec![rect(1, 1)] };
        let mut state = EditorState::for_document(2);
        state.selected = Some(AnnotationRef::rect(AnnotationId(7)));
        state.hovered = Some(AnnotationRef::rect(AnnotationId(1)));

        state.retain_valid_refs(&set);

        assert_eq!(state.selected, None);
        assert_eq!(state.hovered, Some(AnnotationRef::rect(AnnotationId(1))));
    }

    #[test]
    fn page_is_clamped_to_document_bounds() {
        let state = EditorState::for_document(3);
        assert_eq!(state.clamp_page(0), 1);
        assert_eq!(state.clamp_page(9), 3);
        assert_eq!(EditorState::default().clamp_page(4), 1);
    }

    #[test]
    fn annotation_set_serializes_colors_as_hex() {
        let set = AnnotationSet { texts: Vec::new(), rects: vec![rect(4, 2)] };
        let json = serde_json::to_value(&set).expect("set should serialize");

        assert_eq!(json["rects"][0]["color"], "#ffffff");
        assert_eq!(json["rects"][0]["id"], 4);

        let back: AnnotationSet = serde_json::from_value(json).expect("set should deserialize");
        assert_eq!(back, set);
        assert_eq!(back.max_id(), Some(AnnotationId(4)));
        assert_eq!(back.pages().into_iter().collect::<Vec<_>>(), vec![2]);
    }
}
