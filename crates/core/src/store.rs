//! Annotation store: the annotation lists plus selection, hover, page and
//! zoom state.
//!
//! Every mutation of the annotation lists records an undo snapshot first;
//! selection and hover changes do not. Any state change bumps a version
//! counter published on a watch channel, which drives overlay redraws.

use crate::config::{EditorConfig, DEFAULT_HISTORY_LIMIT, DEFAULT_TEXT_HIT_MARGIN};
use crate::history::History;
use crate::measure::TextMeasure;
use doc_model::transform::point_to_doc_space;
use doc_model::{
    clamp_zoom, AnnotationId, AnnotationKind, AnnotationRef, AnnotationSet, Color, DocRect,
    EditMode, EditorState, FontFamily, RectAnnotation, TextAnnotation, TextStyle,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoreOptions {
    pub history_limit: usize,
    pub text_hit_margin: f32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { history_limit: DEFAULT_HISTORY_LIMIT, text_hit_margin: DEFAULT_TEXT_HIT_MARGIN }
    }
}

impl From<&EditorConfig> for StoreOptions {
    fn from(config: &EditorConfig) -> Self {
        Self { history_limit: config.history_limit, text_hit_margin: config.text_hit_margin }
    }
}

pub struct AnnotationStore {
    annotations: AnnotationSet,
    state: EditorState,
    history: History,
    next_id: u64,
    measure: Arc<dyn TextMeasure>,
    text_hit_margin: f32,
    version: watch::Sender<u64>,
}

impl AnnotationStore {
    pub fn new(measure: Arc<dyn TextMeasure>, options: StoreOptions) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            annotations: AnnotationSet::default(),
            state: EditorState::default(),
            history: History::new(options.history_limit),
            next_id: 1,
            measure,
            text_hit_margin: options.text_hit_margin,
            version,
        }
    }

    pub fn annotations(&self) -> &AnnotationSet {
        &self.annotations
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn selected(&self) -> Option<AnnotationRef> {
        self.state.selected
    }

    pub fn hovered(&self) -> Option<AnnotationRef> {
        self.state.hovered
    }

    pub fn zoom(&self) -> f32 {
        self.state.zoom
    }

    pub fn current_page(&self) -> u32 {
        self.state.current_page
    }

    pub fn total_pages(&self) -> u32 {
        self.state.total_pages
    }

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// Resets everything for a freshly opened document; zoom and edit mode carry over.
    pub fn load_document(&mut self, total_pages: u32) {
        let zoom = self.state.zoom;
        let edit_mode = self.state.edit_mode;
        self.state = EditorState { zoom, edit_mode, ..EditorState::for_document(total_pages) };
        self.annotations = AnnotationSet::default();
        self.history.clear();
        self.next_id = 1;
        self.bump();
    }

    /// Drops all annotations and the undo history.
    pub fn clear(&mut self) {
        self.annotations = AnnotationSet::default();
        self.history.clear();
        self.state.retain_valid_refs(&self.annotations);
        self.bump();
    }

    /// Replaces the annotations wholesale, e.g. when resuming a session.
    /// Annotations on pages the document does not have are discarded.
    pub fn restore(&mut self, mut annotations: AnnotationSet) {
        let total_pages = self.state.total_pages;
        let before = annotations.len();
        annotations.texts.retain(|text| (1..=total_pages).contains(&text.page_index));
        annotations.rects.retain(|rect| (1..=total_pages).contains(&rect.page_index));
        if annotations.len() != before {
            log::warn!(
                "discarded {} restored annotations outside pages 1..={total_pages}",
                before - annotations.len()
            );
        }

        // Ids are shared by both kinds; the first occurrence wins.
        let before = annotations.len();
        let mut seen = HashSet::new();
        annotations.texts.retain(|text| seen.insert(text.id));
        annotations.rects.retain(|rect| seen.insert(rect.id));
        if annotations.len() != before {
            log::warn!(
                "discarded {} restored annotations with duplicate ids",
                before - annotations.len()
            );
        }

        self.next_id = annotations.max_id().map_or(1, |id| id.0 + 1);
        self.annotations = annotations;
        self.history.clear();
        self.state.retain_valid_refs(&self.annotations);
        self.bump();
    }

    /// Removes annotations that are unchanged since `exported` was written
    /// into the document, since they are now part of the page content.
    pub fn retire_exported(&mut self, exported: &AnnotationSet) {
        self.annotations.texts.retain(|text| exported.text(text.id) != Some(text));
        self.annotations.rects.retain(|rect| exported.rect(rect.id) != Some(rect));
        self.history.clear();
        self.state.retain_valid_refs(&self.annotations);
        self.bump();
    }

    /// Adds a label with its baseline starting at doc-space `(x, y)` on the current page.
    pub fn add_text(
        &mut self,
        x: f32,
        y: f32,
        text: &str,
        style: TextStyle,
    ) -> Option<AnnotationRef> {
        if text.is_empty() || self.state.total_pages == 0 {
            return None;
        }

        self.snapshot();
        let id = self.allocate_id();
        let (width, height) = self.measure.measure(text, &style);
        self.annotations.texts.push(TextAnnotation {
            id,
            page_index: self.state.current_page,
            x,
            y,
            text: text.to_string(),
            style,
            width,
            height,
        });
        self.bump();
        Some(AnnotationRef::text(id))
    }

    /// Adds a filled rectangle on the current page. Rectangles smaller than
    /// the minimum in either direction are ignored.
    pub fn add_rect(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Color,
    ) -> Option<AnnotationRef> {
        let rect = DocRect::new(x, y, width, height);
        if !rect.meets_minimum() || self.state.total_pages == 0 {
            return None;
        }

        self.snapshot();
        let id = self.allocate_id();
        self.annotations.rects.push(RectAnnotation {
            id,
            page_index: self.state.current_page,
            x,
            y,
            width,
            height,
            color,
        });
        self.bump();
        Some(AnnotationRef::rect(id))
    }

    /// Topmost annotation under a screen-space point on the current page.
    ///
    /// Exact hits on either kind resolve to the most recently added one.
    /// Only when nothing is hit exactly do text labels get their hit margin,
    /// so a rectangle lying under a label's margin stays selectable.
    pub fn hit_test(&self, screen_x: f32, screen_y: f32) -> Option<AnnotationRef> {
        let (x, y) = point_to_doc_space(screen_x, screen_y, self.state.zoom);
        let page = self.state.current_page;

        let rects = self
            .annotations
            .rects_on_page(page)
            .filter(|rect| rect.bounds().contains(x, y, 0.0))
            .map(RectAnnotation::reference);
        let texts = self
            .annotations
            .texts_on_page(page)
            .filter(|text| text.bounds().contains(x, y, 0.0))
            .map(TextAnnotation::reference);

        if let Some(hit) = rects.chain(texts).max_by_key(|reference| reference.id) {
            return Some(hit);
        }

        self.annotations
            .texts_on_page(page)
            .filter(|text| text.bounds().contains(x, y, self.text_hit_margin))
            .map(TextAnnotation::reference)
            .max_by_key(|reference| reference.id)
    }

    /// Whether a screen-space point falls within the selected annotation's hit area.
    pub fn selection_contains(&self, screen_x: f32, screen_y: f32) -> bool {
        let Some(selected) = self.state.selected else {
            return false;
        };
        let (x, y) = point_to_doc_space(screen_x, screen_y, self.state.zoom);
        let margin = match selected.kind {
            AnnotationKind::Text => self.text_hit_margin,
            AnnotationKind::Rect => 0.0,
        };
        self.annotations.bounds_of(selected).is_some_and(|bounds| bounds.contains(x, y, margin))
    }

    pub fn select(&mut self, reference: AnnotationRef) -> bool {
        if !self.annotations.contains(reference) {
            return false;
        }
        if self.state.selected != Some(reference) {
            self.state.selected = Some(reference);
            self.bump();
        }
        true
    }

    pub fn deselect(&mut self) -> bool {
        if self.state.selected.take().is_some() {
            self.bump();
            return true;
        }
        false
    }

    pub fn set_hovered(&mut self, reference: Option<AnnotationRef>) -> bool {
        let reference = reference.filter(|reference| self.annotations.contains(*reference));
        if self.state.hovered == reference {
            return false;
        }
        self.state.hovered = reference;
        self.bump();
        true
    }

    pub fn set_edit_mode(&mut self, mode: EditMode) -> bool {
        if self.state.edit_mode == mode {
            return false;
        }
        self.state.edit_mode = mode;
        self.bump();
        true
    }

    /// Moves to page `page`, clamped to the document. Clears selection and hover.
    pub fn set_page(&mut self, page: u32) -> bool {
        let page = self.state.clamp_page(page);
        if page == self.state.current_page {
            return false;
        }
        self.state.current_page = page;
        self.state.selected = None;
        self.state.hovered = None;
        self.bump();
        true
    }

    /// Sets the zoom factor, clamped to the supported range. Returns the applied value.
    pub fn set_zoom(&mut self, zoom: f32) -> f32 {
        let zoom = clamp_zoom(zoom);
        if zoom != self.state.zoom {
            self.state.zoom = zoom;
            self.bump();
        }
        zoom
    }

    pub fn update_selected_text(&mut self, text: &str) -> bool {
        self.edit_selected_text(|label| {
            if label.text == text {
                return false;
            }
            label.text = text.to_string();
            true
        })
    }

    pub fn update_selected_font_size(&mut self, font_size: f32) -> bool {
        if !(font_size.is_finite() && font_size > 0.0) {
            return false;
        }
        self.edit_selected_text(|label| {
            if label.style.font_size == font_size {
                return false;
            }
            label.style.font_size = font_size;
            true
        })
    }

    pub fn update_selected_font_family(&mut self, family: FontFamily) -> bool {
        self.edit_selected_text(|label| {
            if label.style.font_family == family {
                return false;
            }
            label.style.font_family = family;
            true
        })
    }

    pub fn update_selected_color(&mut self, color: Color) -> bool {
        let Some(selected) = self.state.selected else {
            return false;
        };
        let current = match selected.kind {
            AnnotationKind::Text => self.annotations.text(selected.id).map(|text| text.style.color),
            AnnotationKind::Rect => self.annotations.rect(selected.id).map(|rect| rect.color),
        };
        if current.is_none() || current == Some(color) {
            return false;
        }

        self.snapshot();
        match selected.kind {
            AnnotationKind::Text => {
                if let Some(text) = self.annotations.text_mut(selected.id) {
                    text.style.color = color;
                }
            }
            AnnotationKind::Rect => {
                if let Some(rect) = self.annotations.rect_mut(selected.id) {
                    rect.color = color;
                }
            }
        }
        self.bump();
        true
    }

    pub fn delete_selected(&mut self) -> bool {
        let Some(selected) = self.state.selected else {
            return false;
        };
        if !self.annotations.contains(selected) {
            return false;
        }

        self.snapshot();
        match selected.kind {
            AnnotationKind::Text => self.annotations.texts.retain(|text| text.id != selected.id),
            AnnotationKind::Rect => self.annotations.rects.retain(|rect| rect.id != selected.id),
        }
        self.state.retain_valid_refs(&self.annotations);
        self.bump();
        true
    }

    /// Moves the selection by a doc-space offset as one undoable step.
    pub fn nudge_selected(&mut self, dx: f32, dy: f32) -> bool {
        if !self.selection_exists() || (dx == 0.0 && dy == 0.0) {
            return false;
        }
        self.snapshot();
        self.translate_selected(dx, dy);
        self.bump();
        true
    }

    /// Records the single undo snapshot for a drag gesture.
    pub fn begin_drag(&mut self) -> bool {
        if !self.selection_exists() {
            return false;
        }
        self.snapshot();
        true
    }

    /// Moves the selection during a drag without recording history.
    pub fn drag_selected_by(&mut self, dx: f32, dy: f32) -> bool {
        if !self.selection_exists() {
            return false;
        }
        self.translate_selected(dx, dy);
        self.bump();
        true
    }

    /// Restores the annotations as they were before the last mutation.
    pub fn undo(&mut self) -> bool {
        let Some(snapshot) = self.history.pop() else {
            return false;
        };
        self.annotations = snapshot;
        self.state.retain_valid_refs(&self.annotations);
        self.bump();
        true
    }

    fn edit_selected_text(&mut self, edit: impl FnOnce(&mut TextAnnotation) -> bool) -> bool {
        let Some(selected) = self.state.selected.filter(|r| r.kind == AnnotationKind::Text) else {
            return false;
        };
        let Some(mut label) = self.annotations.text(selected.id).cloned() else {
            return false;
        };
        if !edit(&mut label) {
            return false;
        }

        let (width, height) = self.measure.measure(&label.text, &label.style);
        label.width = width;
        label.height = height;

        self.snapshot();
        if let Some(text) = self.annotations.text_mut(selected.id) {
            *text = label;
        }
        self.bump();
        true
    }

    fn translate_selected(&mut self, dx: f32, dy: f32) {
        let Some(selected) = self.state.selected else {
            return;
        };
        match selected.kind {
            AnnotationKind::Text => {
                if let Some(text) = self.annotations.text_mut(selected.id) {
                    text.x += dx;
                    text.y += dy;
                }
            }
            AnnotationKind::Rect => {
                if let Some(rect) = self.annotations.rect_mut(selected.id) {
                    rect.x += dx;
                    rect.y += dy;
                }
            }
        }
    }

    fn selection_exists(&self) -> bool {
        self.state.selected.is_some_and(|selected| self.annotations.contains(selected))
    }

    fn snapshot(&mut self) {
        self.history.push(self.annotations.clone());
    }

    fn allocate_id(&mut self) -> AnnotationId {
        let id = AnnotationId(self.next_id);
        self.next_id += 1;
        id
    }

    fn bump(&mut self) {
        self.version.send_modify(|version| *version += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedMeasure;

    impl TextMeasure for FixedMeasure {
        fn measure(&self, text: &str, style: &TextStyle) -> (f32, f32) {
            let per_char = match style.font_family {
                FontFamily::Sans => 0.5,
                FontFamily::Serif => 0.6,
            };
            (text.chars().count() as f32 * style.font_size * per_char, style.font_size)
        }
    }

    fn store(pages: u32) -> AnnotationStore {
        let mut store = AnnotationStore::new(Arc::new(FixedMeasure), StoreOptions::default());
        store.load_document(pages);
        store
    }

    fn style(font_size: f32) -> TextStyle {
        TextStyle { font_size, ..TextStyle::default() }
    }

    #[test]
    fn add_text_measures_bounds_above_the_baseline() {
        let mut store = store(1);
        let reference = store.add_text(100.0, 100.0, "Hello", style(10.0)).expect("text added");

        assert_eq!(reference.to_string(), "t-1");
        let text = store.annotations().text(reference.id).expect("text exists");
        assert_eq!((text.width, text.height), (25.0, 10.0));
        assert_eq!(text.bounds(), DocRect::new(100.0, 90.0, 25.0, 10.0));
        assert_eq!(text.page_index, 1);
    }

    #[test]
    fn add_text_needs_a_document_and_text() {
        let mut empty = store(0);
        assert!(empty.add_text(1.0, 1.0, "A", style(10.0)).is_none());

        let mut store = store(1);
        assert!(store.add_text(1.0, 1.0, "", style(10.0)).is_none());
        assert!(!store.can_undo());
    }

    #[test]
    fn undersized_rectangles_are_ignored() {
        let mut store = store(1);

        assert!(store.add_rect(10.0, 10.0, 3.0, 3.0, Color::WHITE).is_none());
        assert!(store.add_rect(10.0, 10.0, 4.9, 100.0, Color::WHITE).is_none());
        assert!(store.annotations().rects.is_empty());
        assert!(!store.can_undo());

        assert!(store.add_rect(10.0, 10.0, 5.0, 5.0, Color::WHITE).is_some());
    }

    #[test]
    fn hit_test_finds_the_single_annotation_under_the_point() {
        let mut store = store(1);
        let rect = store.add_rect(10.0, 10.0, 50.0, 50.0, Color::WHITE).expect("rect added");
        let text = store.add_text(200.0, 200.0, "Hi", style(10.0)).expect("text added");

        assert_eq!(store.hit_test(30.0, 30.0), Some(rect));
        assert_eq!(store.hit_test(205.0, 195.0), Some(text));
        assert_eq!(store.hit_test(500.0, 500.0), None);
    }

    #[test]
    fn overlapping_hits_resolve_to_the_newest_annotation() {
        let mut store = store(1);
        store.add_rect(0.0, 0.0, 100.0, 100.0, Color::WHITE).expect("rect added");
        let label = store.add_text(10.0, 50.0, "Label", style(10.0)).expect("text added");
        assert_eq!(store.hit_test(20.0, 45.0), Some(label));

        let cover = store.add_rect(0.0, 0.0, 100.0, 100.0, Color::BLACK).expect("rect added");
        assert_eq!(store.hit_test(20.0, 45.0), Some(cover));
    }

    #[test]
    fn text_margin_applies_only_without_an_exact_hit() {
        let mut store = store(1);
        let rect = store.add_rect(205.0, 200.0, 20.0, 20.0, Color::WHITE).expect("rect added");
        let text = store.add_text(200.0, 200.0, "Hi", style(10.0)).expect("text added");

        assert_eq!(store.hit_test(212.0, 202.0), Some(rect));
        assert_eq!(store.hit_test(212.0, 195.0), Some(text));
        assert_eq!(store.hit_test(215.0, 195.0), None);
    }

    #[test]
    fn hit_test_works_in_screen_space() {
        let mut store = store(1);
        let rect = store.add_rect(10.0, 10.0, 50.0, 50.0, Color::WHITE).expect("rect added");
        store.set_zoom(2.0);

        assert_eq!(store.hit_test(40.0, 40.0), Some(rect));
        assert_eq!(store.hit_test(130.0, 130.0), None);
    }

    #[test]
    fn hit_test_ignores_other_pages() {
        let mut store = store(2);
        store.add_rect(10.0, 10.0, 50.0, 50.0, Color::WHITE).expect("rect added");
        store.set_page(2);

        assert_eq!(store.hit_test(30.0, 30.0), None);
    }

    #[test]
    fn attribute_edits_remeasure_the_label() {
        let mut store = store(1);
        let text = store.add_text(0.0, 50.0, "Hello", style(10.0)).expect("text added");
        store.select(text);

        assert!(store.update_selected_text("Hello world"));
        assert_eq!(store.annotations().texts[0].width, 55.0);

        assert!(store.update_selected_font_size(20.0));
        let label = &store.annotations().texts[0];
        assert_eq!((label.width, label.height), (110.0, 20.0));

        assert!(store.update_selected_font_family(FontFamily::Serif));
        assert!((store.annotations().texts[0].width - 132.0).abs() < 1e-4);
        assert_eq!(store.history_len(), 4);

        assert!(!store.update_selected_text("Hello world"));
        assert!(!store.update_selected_font_size(-1.0));
        assert_eq!(store.history_len(), 4);
    }

    #[test]
    fn selection_and_hover_do_not_record_history() {
        let mut store = store(1);
        let rect = store.add_rect(0.0, 0.0, 10.0, 10.0, Color::WHITE).expect("rect added");
        let history = store.history_len();
        let version = store.version();

        assert!(store.select(rect));
        assert!(store.set_hovered(Some(rect)));
        assert!(store.deselect());

        assert_eq!(store.history_len(), history);
        assert!(store.version() > version);
    }

    #[test]
    fn undoing_every_mutation_restores_the_original_list() {
        let mut store = store(1);
        let before = store.annotations().clone();

        let text = store.add_text(10.0, 20.0, "AB", style(12.0)).expect("text added");
        let rect = store.add_rect(30.0, 30.0, 40.0, 40.0, Color::WHITE).expect("rect added");
        store.select(rect);
        assert!(store.nudge_selected(1.0, 2.0));
        assert!(store.update_selected_color(Color::RED));
        store.select(text);
        assert!(store.update_selected_text("ABC"));
        assert!(store.delete_selected());

        for _ in 0..6 {
            assert!(store.undo());
        }
        assert_eq!(store.annotations(), &before);
        assert!(!store.undo());
    }

    #[test]
    fn a_whole_drag_is_one_undo_step() {
        let mut store = store(1);
        let rect = store.add_rect(10.0, 10.0, 20.0, 20.0, Color::WHITE).expect("rect added");
        store.select(rect);
        let history = store.history_len();

        assert!(store.begin_drag());
        for _ in 0..3 {
            assert!(store.drag_selected_by(1.0, 0.5));
        }
        assert_eq!(store.annotations().rects[0].x, 13.0);
        assert_eq!(store.history_len(), history + 1);

        assert!(store.undo());
        assert_eq!(store.annotations().rects[0].x, 10.0);
        assert_eq!(store.annotations().rects[0].y, 10.0);
    }

    #[test]
    fn undo_drops_selection_that_no_longer_exists() {
        let mut store = store(1);
        let rect = store.add_rect(0.0, 0.0, 10.0, 10.0, Color::WHITE).expect("rect added");
        store.select(rect);
        store.set_hovered(Some(rect));

        assert!(store.undo());
        assert_eq!(store.selected(), None);
        assert_eq!(store.hovered(), None);
    }

    #[test]
    fn page_changes_clamp_and_clear_selection() {
        let mut store = store(3);
        let rect = store.add_rect(0.0, 0.0, 10.0, 10.0, Color::WHITE).expect("rect added");
        store.select(rect);

        assert!(store.set_page(10));
        assert_eq!(store.current_page(), 3);
        assert_eq!(store.selected(), None);

        store.set_page(0);
        assert_eq!(store.current_page(), 1);
    }

    #[test]
    fn zoom_is_clamped() {
        let mut store = store(1);
        assert_eq!(store.set_zoom(10.0), 4.0);
        assert_eq!(store.set_zoom(0.1), 0.25);
        assert_eq!(store.set_zoom(f32::NAN), 1.0);
    }

    #[test]
    fn changes_are_published_on_the_version_channel() {
        let mut store = store(1);
        let mut versions = store.subscribe();
        let before = *versions.borrow_and_update();

        store.add_rect(0.0, 0.0, 10.0, 10.0, Color::WHITE);

        assert!(versions.has_changed().expect("sender should be alive"));
        assert!(*versions.borrow_and_update() > before);
    }

    #[test]
    fn restore_resumes_numbering_and_drops_missing_pages() {
        let mut store = store(2);
        let mut set = AnnotationSet::default();
        set.rects.push(RectAnnotation {
            id: AnnotationId(7),
            page_index: 1,
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
            color: Color::WHITE,
        });
        set.texts.push(TextAnnotation {
            id: AnnotationId(3),
            page_index: 5,
            x: 0.0,
            y: 10.0,
            text: "gone".to_string(),
            style: style(10.0),
            width: 20.0,
            height: 10.0,
        });

        store.restore(set);
        assert_eq!(store.annotations().len(), 1);

        let next = store.add_rect(20.0, 20.0, 10.0, 10.0, Color::WHITE).expect("rect added");
        assert_eq!(next.id, AnnotationId(8));
    }

    #[test]
    fn restore_drops_later_duplicate_ids() {
        let mut store = store(1);
        let rect = |id: u64, x: f32| RectAnnotation {
            id: AnnotationId(id),
            page_index: 1,
            x,
            y: 0.0,
            width: 10.0,
            height: 10.0,
            color: Color::WHITE,
        };
        let mut set = AnnotationSet::default();
        set.texts.push(TextAnnotation {
            id: AnnotationId(2),
            page_index: 1,
            x: 100.0,
            y: 50.0,
            text: "kept".to_string(),
            style: style(10.0),
            width: 20.0,
            height: 10.0,
        });
        set.rects.extend([rect(1, 0.0), rect(1, 40.0), rect(2, 80.0)]);

        store.restore(set);

        let rects = &store.annotations().rects;
        assert_eq!(rects.len(), 1);
        assert_eq!((rects[0].id, rects[0].x), (AnnotationId(1), 0.0));
        assert_eq!(store.annotations().texts.len(), 1);
        assert_eq!(store.hit_test(45.0, 5.0), None);
        assert_eq!(store.hit_test(5.0, 5.0), Some(AnnotationRef::rect(AnnotationId(1))));
        let next = store.add_rect(20.0, 20.0, 10.0, 10.0, Color::WHITE).expect("rect added");
        assert_eq!(next.id, AnnotationId(3));
    }

    #[test]
    fn retiring_exported_annotations_keeps_later_edits() {
        let mut store = store(1);
        store.add_rect(0.0, 0.0, 10.0, 10.0, Color::WHITE).expect("rect added");
        let moved = store.add_rect(50.0, 50.0, 10.0, 10.0, Color::WHITE).expect("rect added");
        let exported = store.annotations().clone();

        store.select(moved);
        store.nudge_selected(5.0, 0.0);
        store.retire_exported(&exported);

        assert_eq!(store.annotations().rects.len(), 1);
        assert_eq!(store.annotations().rects[0].id, moved.id);
        assert!(!store.can_undo());
    }
}
