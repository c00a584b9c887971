//! Base page bitmaps and the annotation overlay painted on top of them.
//!
//! The base layer comes from a [`PageRasterizer`] and is slow, so it is
//! requested through a generation-stamped [`BaseRenderTicket`]; a result for
//! an older generation is dropped. The overlay is repainted synchronously
//! from an [`OverlayScene`] whenever the store version moves.

use crate::store::AnnotationStore;
use doc_model::{AnnotationRef, Color, DocRect, RectAnnotation, TextAnnotation};
use image::{Rgba, RgbaImage};
use pdf_engine::{FontLibrary, OpenDocument, PageRasterizer, PdfEngineError, RenderRequest};
use std::sync::Arc;
use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Stroke, Transform};
use tokio::sync::watch;
use ttf_parser::Face;

const SELECTION_COLOR: Color = Color { r: 37, g: 99, b: 235 };
const HOVER_COLOR: Color = Color { r: 147, g: 197, b: 253 };

/// Rasterized page the overlay is composed onto.
#[derive(Debug, Clone)]
pub struct BaseLayer {
    pub page: u32,
    pub zoom: f32,
    pub image: RgbaImage,
}

/// A pending base render, owned by whoever runs it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaseRenderTicket {
    pub generation: u64,
    pub page: u32,
    pub zoom: f32,
    pub request: RenderRequest,
}

impl BaseRenderTicket {
    /// Rasterizes on the blocking pool so input handling never waits on it.
    pub async fn run(
        self,
        rasterizer: Arc<dyn PageRasterizer>,
        document: OpenDocument,
    ) -> BaseRender {
        let request = self.request;
        let result = tokio::task::spawn_blocking(move || {
            rasterizer.render_page(&document, request)
        })
        .await
        .unwrap_or_else(|err| Err(PdfEngineError::Backend(format!("render task failed: {err}"))));

        BaseRender { ticket: self, result }
    }
}

#[derive(Debug)]
pub struct BaseRender {
    pub ticket: BaseRenderTicket,
    pub result: Result<RgbaImage, PdfEngineError>,
}

/// Everything needed to paint one overlay frame, detached from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayScene {
    /// Store version the scene was captured at.
    pub version: u64,
    pub page: u32,
    pub zoom: f32,
    /// Displayed page size in doc units.
    pub page_size: (f32, f32),
    pub texts: Vec<TextAnnotation>,
    pub rects: Vec<RectAnnotation>,
    pub selected: Option<AnnotationRef>,
    pub hovered: Option<AnnotationRef>,
    pub live_rect: Option<(DocRect, Color)>,
}

impl OverlayScene {
    pub fn capture(
        store: &AnnotationStore,
        page_size: (f32, f32),
        live_rect: Option<(DocRect, Color)>,
    ) -> Self {
        let page = store.current_page();
        let annotations = store.annotations();
        Self {
            version: store.version(),
            page,
            zoom: store.zoom(),
            page_size,
            texts: annotations.texts_on_page(page).cloned().collect(),
            rects: annotations.rects_on_page(page).cloned().collect(),
            selected: store.selected(),
            hovered: store.hovered(),
            live_rect,
        }
    }

    fn bounds_of(&self, reference: AnnotationRef) -> Option<DocRect> {
        self.texts
            .iter()
            .find(|text| text.reference() == reference)
            .map(TextAnnotation::bounds)
            .or_else(|| {
                self.rects.iter().find(|rect| rect.reference() == reference).map(|r| r.bounds())
            })
    }
}

#[derive(Debug)]
pub struct RenderPipeline {
    generation: u64,
    base: Option<BaseLayer>,
    device_pixel_ratio: f32,
    versions: watch::Receiver<u64>,
    fonts: Arc<FontLibrary>,
}

impl RenderPipeline {
    pub fn new(
        versions: watch::Receiver<u64>,
        fonts: Arc<FontLibrary>,
        device_pixel_ratio: f32,
    ) -> Self {
        let device_pixel_ratio =
            if device_pixel_ratio.is_finite() && device_pixel_ratio > 0.0 {
                device_pixel_ratio
            } else {
                1.0
            };
        Self { generation: 0, base: None, device_pixel_ratio, versions, fonts }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn device_pixel_ratio(&self) -> f32 {
        self.device_pixel_ratio
    }

    pub fn base(&self) -> Option<&BaseLayer> {
        self.base.as_ref()
    }

    /// Supersedes any outstanding base render and issues a new one.
    pub fn request_base(&mut self, page: u32, zoom: f32) -> BaseRenderTicket {
        self.generation += 1;
        let scale = zoom * self.device_pixel_ratio;
        BaseRenderTicket {
            generation: self.generation,
            page,
            zoom,
            request: RenderRequest { page, scale },
        }
    }

    pub fn is_current(&self, ticket: &BaseRenderTicket) -> bool {
        ticket.generation == self.generation
    }

    /// Installs a finished base render. Returns `Ok(false)` when the render was
    /// superseded and discarded.
    pub fn accept_base(&mut self, render: BaseRender) -> Result<bool, PdfEngineError> {
        if !self.is_current(&render.ticket) {
            log::debug!(
                "dropping base render for page {} (generation {} < {})",
                render.ticket.page,
                render.ticket.generation,
                self.generation
            );
            return Ok(false);
        }

        let image = render.result?;
        self.base = Some(BaseLayer { page: render.ticket.page, zoom: render.ticket.zoom, image });
        Ok(true)
    }

    /// Forgets the base layer and cancels outstanding renders.
    pub fn invalidate(&mut self) {
        self.generation += 1;
        self.base = None;
    }

    /// Whether the store moved since the last painted frame.
    pub fn needs_redraw(&self) -> bool {
        self.versions.has_changed().unwrap_or(false)
    }

    /// Paints the overlay for `scene`, or returns `None` when a newer store
    /// version already exists and this frame would show stale state.
    pub fn paint_frame(&mut self, scene: &OverlayScene) -> Option<RgbaImage> {
        let current = *self.versions.borrow_and_update();
        if scene.version < current {
            log::debug!("dropping overlay frame for version {} < {current}", scene.version);
            return None;
        }

        let (mut image, zoom) = match &self.base {
            Some(base) if base.page == scene.page => (base.image.clone(), base.zoom),
            _ => {
                let width = (scene.page_size.0 * scene.zoom * self.device_pixel_ratio).round();
                let height = (scene.page_size.1 * scene.zoom * self.device_pixel_ratio).round();
                let image = RgbaImage::from_pixel(
                    width.max(1.0) as u32,
                    height.max(1.0) as u32,
                    Rgba([255, 255, 255, 255]),
                );
                (image, scene.zoom)
            }
        };

        let scale = zoom * self.device_pixel_ratio;
        with_pixmap(&mut image, |pixmap| self.paint_overlay(pixmap, scene, scale));
        Some(image)
    }

    fn paint_overlay(&self, pixmap: &mut Pixmap, scene: &OverlayScene, scale: f32) {
        // Same stacking as the exported page: every mask, then every label.
        for rect in &scene.rects {
            fill_rect(pixmap, rect.bounds(), rect.color, 255, scale);
        }
        for text in scene.texts.iter().filter(|text| !text.text.is_empty()) {
            self.paint_text(pixmap, text, scale);
        }

        if let Some((rect, color)) = scene.live_rect {
            fill_rect(pixmap, rect, color, 160, scale);
            stroke_rect(pixmap, rect, SELECTION_COLOR, 1.0, scale);
        }
        if let Some(bounds) = scene.hovered.filter(|h| Some(*h) != scene.selected) {
            if let Some(bounds) = scene.bounds_of(bounds) {
                stroke_rect(pixmap, bounds, HOVER_COLOR, 1.0, scale);
            }
        }
        if let Some(bounds) = scene.selected.and_then(|selected| scene.bounds_of(selected)) {
            stroke_rect(pixmap, bounds, SELECTION_COLOR, 2.0, scale);
        }
    }

    fn paint_text(&self, pixmap: &mut Pixmap, text: &TextAnnotation, scale: f32) {
        let face = self
            .fonts
            .get(text.style.font_family)
            .and_then(|asset| Face::parse(asset.bytes(), 0).ok());
        let Some(face) = face else {
            fill_rect(pixmap, text.bounds(), text.style.color, 96, scale);
            return;
        };

        let units = text.style.font_size * scale / face.units_per_em().max(1) as f32;
        let mut outline = GlyphOutline {
            builder: PathBuilder::new(),
            origin: (text.x * scale, text.y * scale),
            units,
        };
        for ch in text.text.chars() {
            let Some(glyph) = face.glyph_index(ch) else {
                outline.origin.0 += text.style.font_size * scale * 0.5;
                continue;
            };
            face.outline_glyph(glyph, &mut outline);
            outline.origin.0 += face.glyph_hor_advance(glyph).unwrap_or(0) as f32 * units;
        }

        let Some(path) = outline.builder.finish() else {
            return;
        };
        let paint = solid(text.style.color, 255);
        pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    }
}

/// Converts font-unit outlines into buffer pixels at a pen position.
struct GlyphOutline {
    builder: PathBuilder,
    origin: (f32, f32),
    units: f32,
}

impl GlyphOutline {
    fn point(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin.0 + x * self.units, self.origin.1 - y * self.units)
    }
}

impl ttf_parser::OutlineBuilder for GlyphOutline {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.point(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.point(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.point(x1, y1);
        let (x, y) = self.point(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.point(x1, y1);
        let (x2, y2) = self.point(x2, y2);
        let (x, y) = self.point(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

/// Runs `f` on a pixmap view of `image` and copies the pixels back.
fn with_pixmap(image: &mut RgbaImage, f: impl FnOnce(&mut Pixmap)) {
    let Some(size) = tiny_skia::IntSize::from_wh(image.width(), image.height()) else {
        return;
    };
    let Some(mut pixmap) = Pixmap::from_vec(image.as_raw().clone(), size) else {
        return;
    };

    f(&mut pixmap);

    image.copy_from_slice(pixmap.data());
}

fn solid(color: Color, alpha: u8) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, alpha);
    paint.anti_alias = true;
    paint
}

fn scaled(rect: DocRect, scale: f32) -> Option<tiny_skia::Rect> {
    tiny_skia::Rect::from_xywh(
        rect.x * scale,
        rect.y * scale,
        rect.width * scale,
        rect.height * scale,
    )
}

fn fill_rect(pixmap: &mut Pixmap, rect: DocRect, color: Color, alpha: u8, scale: f32) {
    if let Some(rect) = scaled(rect, scale) {
        pixmap.fill_rect(rect, &solid(color, alpha), Transform::identity(), None);
    }
}

fn stroke_rect(pixmap: &mut Pixmap, rect: DocRect, color: Color, width: f32, scale: f32) {
    let Some(rect) = scaled(rect, scale) else {
        return;
    };
    let path = PathBuilder::from_rect(rect);
    let stroke = Stroke { width, ..Stroke::default() };
    pixmap.stroke_path(&path, &solid(color, 255), &stroke, Transform::identity(), None);
}
