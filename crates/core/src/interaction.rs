//! Pointer and keyboard state machine.
//!
//! The controller owns the single transient gesture (drawing, dragging,
//! panning or pinching) and turns raw input into store mutations. Pointer
//! coordinates are screen pixels relative to the page origin, except while
//! panning, where only their deltas matter.

use crate::store::AnnotationStore;
use doc_model::transform::point_to_doc_space;
use doc_model::{AnnotationRef, Color, DocRect, EditMode, TextStyle};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub pointer_id: u64,
    pub x: f32,
    pub y: f32,
    pub button: PointerButton,
    pub is_touch: bool,
}

impl PointerEvent {
    pub fn mouse(x: f32, y: f32) -> Self {
        Self { pointer_id: 0, x, y, button: PointerButton::Primary, is_touch: false }
    }

    pub fn secondary(x: f32, y: f32) -> Self {
        Self { button: PointerButton::Secondary, ..Self::mouse(x, y) }
    }

    pub fn touch(pointer_id: u64, x: f32, y: f32) -> Self {
        Self { pointer_id, is_touch: true, ..Self::mouse(x, y) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Delete,
    Backspace,
    Escape,
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    Undo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
}

/// What the host has to do after an input event.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Effects {
    pub redraw_overlay: bool,
    /// Page or zoom changed; the base page bitmap is out of date.
    pub rerender_base: bool,
    pub scroll_to: Option<(f32, f32)>,
    /// Annotations, page or zoom changed and the session should be saved.
    pub persist: bool,
}

impl Effects {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn overlay() -> Self {
        Self { redraw_overlay: true, ..Self::default() }
    }

    pub fn mutation() -> Self {
        Self { redraw_overlay: true, persist: true, ..Self::default() }
    }

    pub fn view_change() -> Self {
        Self { redraw_overlay: true, rerender_base: true, persist: true, ..Self::default() }
    }

    pub fn merge(self, other: Effects) -> Self {
        Self {
            redraw_overlay: self.redraw_overlay || other.redraw_overlay,
            rerender_base: self.rerender_base || other.rerender_base,
            scroll_to: other.scroll_to.or(self.scroll_to),
            persist: self.persist || other.persist,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    Idle,
    /// Doc-space corners of the uncommitted rectangle.
    DrawingRect { origin: (f32, f32), current: (f32, f32) },
    /// `last` is the previous doc-space pointer position; moves apply the
    /// delta from it. The undo snapshot is taken on the first real move.
    DraggingAnnotation { target: AnnotationRef, last: (f32, f32), moved: bool },
    Panning { origin: (f32, f32), initial_scroll: (f32, f32) },
    Pinching { initial_distance: f32, initial_zoom: f32 },
}

#[derive(Debug, Clone)]
pub struct InteractionController {
    gesture: Gesture,
    pending_text: String,
    text_style: TextStyle,
    rect_color: Color,
    scroll: (f32, f32),
    touches: BTreeMap<u64, (f32, f32)>,
}

impl InteractionController {
    pub fn new(text_style: TextStyle, rect_color: Color) -> Self {
        Self {
            gesture: Gesture::Idle,
            pending_text: String::new(),
            text_style,
            rect_color,
            scroll: (0.0, 0.0),
            touches: BTreeMap::new(),
        }
    }

    pub fn gesture(&self) -> &Gesture {
        &self.gesture
    }

    /// The rectangle being drawn, for the overlay preview.
    pub fn live_rect(&self) -> Option<DocRect> {
        match self.gesture {
            Gesture::DrawingRect { origin, current } => {
                Some(DocRect::from_corners(origin, current))
            }
            _ => None,
        }
    }

    pub fn rect_color(&self) -> Color {
        self.rect_color
    }

    pub fn set_rect_color(&mut self, color: Color) {
        self.rect_color = color;
    }

    pub fn text_style(&self) -> TextStyle {
        self.text_style
    }

    pub fn set_text_style(&mut self, style: TextStyle) {
        self.text_style = style;
    }

    pub fn pending_text(&self) -> &str {
        &self.pending_text
    }

    pub fn set_pending_text(&mut self, text: impl Into<String>) {
        self.pending_text = text.into();
    }

    pub fn scroll(&self) -> (f32, f32) {
        self.scroll
    }

    pub fn set_scroll(&mut self, scroll: (f32, f32)) {
        self.scroll = scroll;
    }

    pub fn set_edit_mode(&mut self, store: &mut AnnotationStore, mode: EditMode) -> Effects {
        let effects = self.cancel(store);
        if store.set_edit_mode(mode) {
            return effects.merge(Effects::overlay());
        }
        effects
    }

    /// Abandons the current gesture. A live rectangle is discarded; a drag
    /// keeps whatever movement already happened.
    pub fn cancel(&mut self, _store: &mut AnnotationStore) -> Effects {
        match std::mem::replace(&mut self.gesture, Gesture::Idle) {
            Gesture::Idle => Effects::none(),
            Gesture::DrawingRect { .. } => Effects::overlay(),
            Gesture::DraggingAnnotation { moved: true, .. } => Effects::mutation(),
            Gesture::DraggingAnnotation { .. } => Effects::overlay(),
            Gesture::Panning { .. } => Effects::none(),
            Gesture::Pinching { .. } => Effects { persist: true, ..Effects::none() },
        }
    }

    pub fn pointer_down(&mut self, store: &mut AnnotationStore, event: PointerEvent) -> Effects {
        if event.is_touch {
            self.touches.insert(event.pointer_id, (event.x, event.y));
            if self.touches.len() >= 2 {
                return self.start_pinch(store);
            }
        }

        if event.button == PointerButton::Secondary {
            let effects = self.cancel(store);
            self.gesture =
                Gesture::Panning { origin: (event.x, event.y), initial_scroll: self.scroll };
            return effects;
        }

        if self.gesture != Gesture::Idle {
            return Effects::none();
        }

        let point = point_to_doc_space(event.x, event.y, store.zoom());
        match store.state().edit_mode {
            EditMode::AddText => {
                if self.pending_text.trim().is_empty() {
                    return Effects::none();
                }
                match store.add_text(point.0, point.1, &self.pending_text, self.text_style) {
                    Some(_) => Effects::mutation(),
                    None => Effects::none(),
                }
            }
            EditMode::AddRect => {
                self.gesture = Gesture::DrawingRect { origin: point, current: point };
                Effects::overlay()
            }
            EditMode::Select => {
                if let Some(target) =
                    store.selected().filter(|_| store.selection_contains(event.x, event.y))
                {
                    self.gesture =
                        Gesture::DraggingAnnotation { target, last: point, moved: false };
                    return Effects::none();
                }

                let changed = match store.hit_test(event.x, event.y) {
                    Some(hit) => store.selected() != Some(hit) && store.select(hit),
                    None => store.deselect(),
                };
                if changed {
                    Effects::overlay()
                } else {
                    Effects::none()
                }
            }
        }
    }

    pub fn pointer_move(&mut self, store: &mut AnnotationStore, event: PointerEvent) -> Effects {
        if event.is_touch {
            if let Some(position) = self.touches.get_mut(&event.pointer_id) {
                *position = (event.x, event.y);
            }
        }

        let point = point_to_doc_space(event.x, event.y, store.zoom());
        let touch_distance = self.touch_distance();
        match &mut self.gesture {
            Gesture::Idle => {
                if store.state().edit_mode == EditMode::Select
                    && store.set_hovered(store.hit_test(event.x, event.y))
                {
                    return Effects::overlay();
                }
                Effects::none()
            }
            Gesture::DrawingRect { current, .. } => {
                *current = point;
                Effects::overlay()
            }
            Gesture::DraggingAnnotation { last, moved, .. } => {
                let (dx, dy) = (point.0 - last.0, point.1 - last.1);
                *last = point;
                if dx == 0.0 && dy == 0.0 {
                    return Effects::none();
                }
                if !*moved {
                    *moved = store.begin_drag();
                }
                if store.drag_selected_by(dx, dy) {
                    Effects::overlay()
                } else {
                    Effects::none()
                }
            }
            Gesture::Panning { origin, initial_scroll } => {
                let scroll = (
                    (initial_scroll.0 - (event.x - origin.0)).max(0.0),
                    (initial_scroll.1 - (event.y - origin.1)).max(0.0),
                );
                if scroll == self.scroll {
                    return Effects::none();
                }
                self.scroll = scroll;
                Effects { scroll_to: Some(scroll), ..Effects::none() }
            }
            Gesture::Pinching { initial_distance, initial_zoom } => {
                let Some(distance) = touch_distance else {
                    return Effects::none();
                };
                let zoom = *initial_zoom * distance / *initial_distance;
                let before = store.zoom();
                if store.set_zoom(zoom) != before {
                    Effects { redraw_overlay: true, rerender_base: true, ..Effects::none() }
                } else {
                    Effects::none()
                }
            }
        }
    }

    pub fn pointer_up(&mut self, store: &mut AnnotationStore, event: PointerEvent) -> Effects {
        if event.is_touch {
            self.touches.remove(&event.pointer_id);
            if matches!(self.gesture, Gesture::Pinching { .. }) {
                if self.touches.len() < 2 {
                    return self.cancel(store);
                }
                return Effects::none();
            }
        }

        let point = point_to_doc_space(event.x, event.y, store.zoom());
        match std::mem::replace(&mut self.gesture, Gesture::Idle) {
            Gesture::DrawingRect { origin, .. } => {
                let rect = DocRect::from_corners(origin, point);
                let committed =
                    store.add_rect(rect.x, rect.y, rect.width, rect.height, self.rect_color);
                if committed.is_some() {
                    Effects::mutation()
                } else {
                    log::debug!(
                        "discarding {}x{} rectangle below minimum",
                        rect.width,
                        rect.height
                    );
                    Effects::overlay()
                }
            }
            Gesture::DraggingAnnotation { moved: true, .. } => Effects::mutation(),
            Gesture::DraggingAnnotation { .. } | Gesture::Panning { .. } | Gesture::Idle => {
                Effects::none()
            }
            pinch @ Gesture::Pinching { .. } => {
                self.gesture = pinch;
                Effects::none()
            }
        }
    }

    pub fn key_down(
        &mut self,
        store: &mut AnnotationStore,
        key: Key,
        modifiers: Modifiers,
    ) -> Effects {
        let step = if modifiers.shift { 10.0 } else { 1.0 };
        let nudge = |store: &mut AnnotationStore, dx: f32, dy: f32| {
            if store.nudge_selected(dx, dy) {
                Effects::mutation()
            } else {
                Effects::none()
            }
        };

        match key {
            Key::Delete | Key::Backspace => {
                let effects = self.cancel(store);
                if store.delete_selected() {
                    effects.merge(Effects::mutation())
                } else {
                    effects
                }
            }
            Key::Escape => {
                let effects = self.cancel(store);
                if store.deselect() {
                    effects.merge(Effects::overlay())
                } else {
                    effects
                }
            }
            Key::ArrowLeft => nudge(store, -step, 0.0),
            Key::ArrowRight => nudge(store, step, 0.0),
            Key::ArrowUp => nudge(store, 0.0, -step),
            Key::ArrowDown => nudge(store, 0.0, step),
            Key::Undo => {
                let effects = self.cancel(store);
                if store.undo() {
                    effects.merge(Effects::mutation())
                } else {
                    effects
                }
            }
        }
    }

    fn start_pinch(&mut self, store: &mut AnnotationStore) -> Effects {
        let effects = self.cancel(store);
        match self.touch_distance() {
            Some(distance) if distance > 0.0 => {
                self.gesture =
                    Gesture::Pinching { initial_distance: distance, initial_zoom: store.zoom() };
            }
            _ => {}
        }
        effects
    }

    fn touch_distance(&self) -> Option<f32> {
        let mut touches = self.touches.values();
        let (ax, ay) = touches.next()?;
        let (bx, by) = touches.next()?;
        Some(((ax - bx).powi(2) + (ay - by).powi(2)).sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::TextMeasure;
    use crate::store::StoreOptions;
    use doc_model::{AnnotationKind, FontFamily};
    use std::sync::Arc;

    struct FixedMeasure;

    impl TextMeasure for FixedMeasure {
        fn measure(&self, text: &str, style: &TextStyle) -> (f32, f32) {
            (text.chars().count() as f32 * style.font_size * 0.5, style.font_size)
        }
    }

    fn setup(mode: EditMode) -> (AnnotationStore, InteractionController) {
        let mut store = AnnotationStore::new(Arc::new(FixedMeasure), StoreOptions::default());
        store.load_document(2);
        store.set_edit_mode(mode);
        let style =
            TextStyle { font_size: 10.0, font_family: FontFamily::Sans, ..TextStyle::default() };
        (store, InteractionController::new(style, Color::WHITE))
    }

    fn draw(
        store: &mut AnnotationStore,
        controller: &mut InteractionController,
        from: (f32, f32),
        to: (f32, f32),
    ) -> Effects {
        controller.pointer_down(store, PointerEvent::mouse(from.0, from.1));
        controller.pointer_move(store, PointerEvent::mouse(to.0, to.1));
        controller.pointer_up(store, PointerEvent::mouse(to.0, to.1))
    }

    #[test]
    fn rectangle_below_minimum_is_discarded() {
        let (mut store, mut controller) = setup(EditMode::AddRect);

        let effects = draw(&mut store, &mut controller, (50.0, 50.0), (53.0, 53.0));

        assert!(store.annotations().rects.is_empty());
        assert!(!effects.persist);
        assert!(!store.can_undo());
        assert_eq!(controller.gesture(), &Gesture::Idle);
    }

    #[test]
    fn drawn_rectangle_is_normalized_and_scaled_by_zoom() {
        let (mut store, mut controller) = setup(EditMode::AddRect);
        store.set_zoom(2.0);

        controller.pointer_down(&mut store, PointerEvent::mouse(200.0, 240.0));
        controller.pointer_move(&mut store, PointerEvent::mouse(100.0, 100.0));
        assert_eq!(controller.live_rect(), Some(DocRect::new(50.0, 50.0, 50.0, 70.0)));

        let effects = controller.pointer_up(&mut store, PointerEvent::mouse(100.0, 100.0));

        assert!(effects.persist && effects.redraw_overlay);
        let rect = &store.annotations().rects[0];
        assert_eq!(rect.bounds(), DocRect::new(50.0, 50.0, 50.0, 70.0));
        assert_eq!(rect.color, Color::WHITE);
        assert_eq!(controller.live_rect(), None);
    }

    #[test]
    fn add_text_commits_on_press_and_keeps_pending_text() {
        let (mut store, mut controller) = setup(EditMode::AddText);

        let nothing = controller.pointer_down(&mut store, PointerEvent::mouse(10.0, 10.0));
        assert!(nothing.is_empty());
        assert!(store.annotations().texts.is_empty());

        controller.set_pending_text("AB");
        let effects = controller.pointer_down(&mut store, PointerEvent::mouse(100.0, 100.0));

        assert!(effects.persist);
        let text = &store.annotations().texts[0];
        assert_eq!((text.x, text.y, text.text.as_str()), (100.0, 100.0, "AB"));
        assert_eq!(controller.pending_text(), "AB");
    }

    #[test]
    fn select_mode_press_selects_and_clears() {
        let (mut store, mut controller) = setup(EditMode::Select);
        let rect = store.add_rect(10.0, 10.0, 40.0, 40.0, Color::RED).expect("rect added");

        controller.pointer_down(&mut store, PointerEvent::mouse(20.0, 20.0));
        controller.pointer_up(&mut store, PointerEvent::mouse(20.0, 20.0));
        assert_eq!(store.selected(), Some(rect));

        controller.pointer_down(&mut store, PointerEvent::mouse(300.0, 300.0));
        controller.pointer_up(&mut store, PointerEvent::mouse(300.0, 300.0));
        assert_eq!(store.selected(), None);
    }

    #[test]
    fn drag_moves_selection_with_a_single_undo_step() {
        let (mut store, mut controller) = setup(EditMode::Select);
        let rect = store.add_rect(10.0, 10.0, 40.0, 40.0, Color::RED).expect("rect added");
        store.select(rect);
        let history_before = store.history_len();

        controller.pointer_down(&mut store, PointerEvent::mouse(20.0, 20.0));
        for step in 1..=5 {
            let x = 20.0 + step as f32 * 2.0;
            controller.pointer_move(&mut store, PointerEvent::mouse(x, 20.0));
        }
        let effects = controller.pointer_up(&mut store, PointerEvent::mouse(30.0, 20.0));

        assert!(effects.persist);
        assert_eq!(store.annotations().rects[0].x, 20.0);
        assert_eq!(store.history_len(), history_before + 1);

        controller.key_down(&mut store, Key::Undo, Modifiers::default());
        assert_eq!(store.annotations().rects[0].x, 10.0);
    }

    #[test]
    fn press_without_movement_does_not_record_history() {
        let (mut store, mut controller) = setup(EditMode::Select);
        let rect = store.add_rect(10.0, 10.0, 40.0, 40.0, Color::RED).expect("rect added");
        store.select(rect);
        let history_before = store.history_len();

        controller.pointer_down(&mut store, PointerEvent::mouse(20.0, 20.0));
        let effects = controller.pointer_up(&mut store, PointerEvent::mouse(20.0, 20.0));

        assert!(!effects.persist);
        assert_eq!(store.history_len(), history_before);
    }

    #[test]
    fn hover_tracks_pointer_in_select_mode() {
        let (mut store, mut controller) = setup(EditMode::Select);
        let rect = store.add_rect(10.0, 10.0, 40.0, 40.0, Color::RED).expect("rect added");

        let effects = controller.pointer_move(&mut store, PointerEvent::mouse(15.0, 15.0));
        assert!(effects.redraw_overlay);
        assert_eq!(store.hovered(), Some(rect));

        controller.pointer_move(&mut store, PointerEvent::mouse(200.0, 200.0));
        assert_eq!(store.hovered(), None);
    }

    #[test]
    fn arrow_keys_nudge_by_one_or_ten_units() {
        let (mut store, mut controller) = setup(EditMode::Select);
        let text = store.add_text(100.0, 100.0, "AB", TextStyle::default()).expect("text added");
        assert_eq!(text.kind, AnnotationKind::Text);
        store.select(text);

        controller.key_down(&mut store, Key::ArrowRight, Modifiers::default());
        controller.key_down(&mut store, Key::ArrowDown, Modifiers { shift: true });
        controller.key_down(&mut store, Key::ArrowLeft, Modifiers { shift: true });
        controller.key_down(&mut store, Key::ArrowUp, Modifiers::default());

        let label = store.annotations().text(text.id).expect("text exists");
        assert_eq!((label.x, label.y), (91.0, 109.0));
    }

    #[test]
    fn delete_and_escape_act_on_the_selection() {
        let (mut store, mut controller) = setup(EditMode::Select);
        let first = store.add_rect(10.0, 10.0, 40.0, 40.0, Color::RED).expect("rect added");
        let second = store.add_rect(60.0, 60.0, 40.0, 40.0, Color::RED).expect("rect added");

        store.select(first);
        let effects = controller.key_down(&mut store, Key::Escape, Modifiers::default());
        assert!(effects.redraw_overlay);
        assert_eq!(store.selected(), None);

        store.select(second);
        let effects = controller.key_down(&mut store, Key::Delete, Modifiers::default());
        assert!(effects.persist);
        assert_eq!(store.annotations().rects.len(), 1);
        assert!(store.annotations().rect(first.id).is_some());

        let nothing = controller.key_down(&mut store, Key::Backspace, Modifiers::default());
        assert!(nothing.is_empty());
    }

    #[test]
    fn secondary_button_pans_in_any_mode() {
        let (mut store, mut controller) = setup(EditMode::AddRect);
        controller.set_scroll((100.0, 100.0));

        controller.pointer_down(&mut store, PointerEvent::secondary(50.0, 50.0));
        let effects = controller.pointer_move(&mut store, PointerEvent::secondary(20.0, 70.0));
        controller.pointer_up(&mut store, PointerEvent::secondary(20.0, 70.0));

        assert_eq!(effects.scroll_to, Some((130.0, 80.0)));
        assert_eq!(controller.scroll(), (130.0, 80.0));
        assert!(store.annotations().rects.is_empty());
    }

    #[test]
    fn panning_never_scrolls_past_the_origin() {
        let (mut store, mut controller) = setup(EditMode::Select);

        controller.pointer_down(&mut store, PointerEvent::secondary(0.0, 0.0));
        controller.pointer_move(&mut store, PointerEvent::secondary(40.0, 40.0));

        assert_eq!(controller.scroll(), (0.0, 0.0));
    }

    #[test]
    fn second_touch_cancels_drawing_and_pinches_zoom() {
        let (mut store, mut controller) = setup(EditMode::AddRect);

        controller.pointer_down(&mut store, PointerEvent::touch(1, 100.0, 100.0));
        controller.pointer_move(&mut store, PointerEvent::touch(1, 150.0, 100.0));
        assert!(controller.live_rect().is_some());
        controller.pointer_down(&mut store, PointerEvent::touch(2, 250.0, 100.0));
        assert!(matches!(controller.gesture(), Gesture::Pinching { .. }));
        assert_eq!(controller.live_rect(), None);

        let effects = controller.pointer_move(&mut store, PointerEvent::touch(2, 350.0, 100.0));
        assert!(effects.rerender_base);
        assert!((store.zoom() - 2.0).abs() < 1e-4);

        controller.pointer_move(&mut store, PointerEvent::touch(2, 5000.0, 100.0));
        assert_eq!(store.zoom(), doc_model::MAX_ZOOM);

        let effects = controller.pointer_up(&mut store, PointerEvent::touch(2, 5000.0, 100.0));
        assert!(effects.persist);
        assert_eq!(controller.gesture(), &Gesture::Idle);
        controller.pointer_up(&mut store, PointerEvent::touch(1, 150.0, 100.0));
        assert!(store.annotations().rects.is_empty());
    }

    #[test]
    fn switching_modes_abandons_a_live_rectangle() {
        let (mut store, mut controller) = setup(EditMode::AddRect);

        controller.pointer_down(&mut store, PointerEvent::mouse(10.0, 10.0));
        controller.pointer_move(&mut store, PointerEvent::mouse(80.0, 80.0));
        controller.set_edit_mode(&mut store, EditMode::Select);
        controller.pointer_up(&mut store, PointerEvent::mouse(80.0, 80.0));

        assert_eq!(store.state().edit_mode, EditMode::Select);
        assert!(store.annotations().rects.is_empty());
    }

    #[test]
    fn effects_merge_keeps_latest_scroll_target() {
        let first = Effects { scroll_to: Some((1.0, 1.0)), ..Effects::overlay() };
        let second = Effects { scroll_to: Some((2.0, 2.0)), persist: true, ..Effects::none() };

        let merged = first.merge(second);

        assert!(merged.redraw_overlay && merged.persist && !merged.rerender_base);
        assert_eq!(merged.scroll_to, Some((2.0, 2.0)));
    }
}
