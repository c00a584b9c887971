//! The editor façade.
//!
//! [`Editor`] owns the store, the interaction controller and the render
//! pipeline, and hands out owned jobs for the slow work (loading, base
//! rendering, export). Jobs carry the generation they were issued for, and
//! their results go back through `apply_*`, which drops anything that no
//! longer matches the active document.

use crate::autosave::SessionWriter;
use crate::config::EditorConfig;
use crate::interaction::{Effects, InteractionController, Key, Modifiers, PointerEvent};
use crate::loader::{DocumentLoader, LoadError, LoadedDocument};
use crate::measure::FontMeasure;
use crate::render::{BaseRender, BaseRenderTicket, OverlayScene, RenderPipeline};
use crate::store::{AnnotationStore, StoreOptions};
use chrono::Utc;
use doc_model::{AnnotationSet, Color, DocumentId, EditMode, FontFamily, TextStyle};
use image::RgbaImage;
use pdf_engine::{
    collect_codepoints, export_document, ExportError, FontLibrary, FontMap, FontSubsetBuilder,
    OpenDocument, PageRasterizer, PdfEngineError,
};
use std::fmt;
use std::sync::Arc;
use storage::{SessionSnapshot, SessionStore};

pub const DEFAULT_ARTIFACT_NAME: &str = "edited.pdf";

#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("no document is open")]
    NoDocument,
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("render failed: {0}")]
    Render(#[from] PdfEngineError),
    #[error("background task failed: {0}")]
    Task(String),
}

pub type EditorResult<T> = Result<T, EditorError>;

#[derive(Debug, Clone)]
struct ActiveDocument {
    id: DocumentId,
    display_name: Option<String>,
    document: OpenDocument,
    /// Bumped whenever the document bytes change.
    revision: u64,
}

/// A pending load for one document id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub generation: u64,
    pub id: DocumentId,
}

impl LoadTicket {
    pub async fn run(self, loader: &DocumentLoader) -> LoadOutcome {
        let result = loader.load(&self.id).await;
        LoadOutcome { ticket: self, result }
    }
}

#[derive(Debug)]
pub struct LoadOutcome {
    pub ticket: LoadTicket,
    pub result: Result<LoadedDocument, LoadError>,
}

/// A base render bundled with what it needs to run off the editor.
pub struct BaseRenderJob {
    pub ticket: BaseRenderTicket,
    rasterizer: Arc<dyn PageRasterizer>,
    document: OpenDocument,
}

impl fmt::Debug for BaseRenderJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseRenderJob").field("ticket", &self.ticket).finish_non_exhaustive()
    }
}

impl BaseRenderJob {
    pub async fn run(self) -> BaseRender {
        self.ticket.run(self.rasterizer, self.document).await
    }
}

/// Fonts and bytes produced for one export.
#[derive(Debug, Clone)]
pub struct ComposedExport {
    pub bytes: Vec<u8>,
    pub fonts: FontMap,
}

/// Subsets each family used by `annotations` and writes them into `original`.
pub fn compose_export(
    original: &[u8],
    annotations: &AnnotationSet,
    library: &FontLibrary,
    builder: &FontSubsetBuilder,
) -> Result<ComposedExport, ExportError> {
    let usage = collect_codepoints(annotations);
    let fonts = builder.build_all(library, &usage);
    let bytes = export_document(original, annotations, &fonts)?;
    Ok(ComposedExport { bytes, fonts })
}

/// Everything an export needs, detached from the editor.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub document_id: DocumentId,
    pub revision: u64,
    pub display_name: Option<String>,
    pub annotations: AnnotationSet,
    original: Arc<Vec<u8>>,
    fonts: Arc<FontLibrary>,
    builder: Arc<FontSubsetBuilder>,
}

impl ExportJob {
    /// Composes the export on the blocking pool.
    pub async fn run(self) -> ExportOutcome {
        let original = Arc::clone(&self.original);
        let annotations = self.annotations.clone();
        let fonts = Arc::clone(&self.fonts);
        let builder = Arc::clone(&self.builder);

        let result = tokio::task::spawn_blocking(move || {
            compose_export(&original, &annotations, &fonts, &builder)
        })
        .await
        .map_err(|err| EditorError::Task(err.to_string()))
        .and_then(|result| result.map_err(EditorError::from));

        ExportOutcome { job: self, result }
    }
}

#[derive(Debug)]
pub struct ExportOutcome {
    pub job: ExportJob,
    pub result: EditorResult<ComposedExport>,
}

/// The downloadable result of a save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub document_id: DocumentId,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Artifact file name: `<stem>_edited.pdf` from the display name, or
/// [`DEFAULT_ARTIFACT_NAME`].
pub fn artifact_name(display_name: Option<&str>) -> String {
    let stem = display_name
        .map(|name| name.rsplit(['/', '\\']).next().unwrap_or(name).trim())
        .map(|name| match name.len().checked_sub(4) {
            Some(split)
                if name.is_char_boundary(split) && name[split..].eq_ignore_ascii_case(".pdf") =>
            {
                &name[..split]
            }
            _ => name,
        })
        .filter(|stem| !stem.is_empty());

    match stem {
        Some(stem) => format!("{stem}_edited.pdf"),
        None => DEFAULT_ARTIFACT_NAME.to_owned(),
    }
}

pub struct Editor {
    config: EditorConfig,
    store: AnnotationStore,
    controller: InteractionController,
    pipeline: RenderPipeline,
    fonts: Arc<FontLibrary>,
    builder: Arc<FontSubsetBuilder>,
    rasterizer: Arc<dyn PageRasterizer>,
    sessions: Option<SessionWriter>,
    loader: Option<DocumentLoader>,
    active: Option<ActiveDocument>,
    load_generation: u64,
}

impl fmt::Debug for Editor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Editor")
            .field("document", &self.active.as_ref().map(|active| &active.id))
            .field("state", self.store.state())
            .field("gesture", self.controller.gesture())
            .finish_non_exhaustive()
    }
}

impl Editor {
    pub fn new(
        config: EditorConfig,
        fonts: FontLibrary,
        rasterizer: Arc<dyn PageRasterizer>,
        sessions: Option<SessionStore>,
    ) -> Self {
        let fonts = Arc::new(fonts);
        let measure = Arc::new(FontMeasure::new(Arc::clone(&fonts)));
        let store = AnnotationStore::new(measure, StoreOptions::from(&config));
        let controller = InteractionController::new(config.text_style, config.rect_color);
        let pipeline =
            RenderPipeline::new(store.subscribe(), Arc::clone(&fonts), config.device_pixel_ratio);

        Self {
            config,
            store,
            controller,
            pipeline,
            fonts,
            builder: Arc::new(FontSubsetBuilder::new()),
            rasterizer,
            sessions: sessions.map(SessionWriter::new),
            loader: None,
            active: None,
            load_generation: 0,
        }
    }

    /// Fonts from the configured paths, the default rasterizer and the
    /// platform session store.
    pub fn from_config(config: EditorConfig) -> Self {
        let fonts = FontLibrary::load(&config.fonts.serif, &config.fonts.sans);
        let sessions = match SessionStore::from_default_project() {
            Ok(sessions) => Some(sessions),
            Err(err) => {
                log::warn!("session resume disabled: {err}");
                None
            }
        };
        Self::new(config, fonts, Arc::new(pdf_engine::default_rasterizer()), sessions)
    }

    /// Attaches the loader whose cache receives every applied export.
    pub fn with_loader(mut self, loader: DocumentLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn loader(&self) -> Option<&DocumentLoader> {
        self.loader.as_ref()
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn controller(&self) -> &InteractionController {
        &self.controller
    }

    pub fn pipeline(&self) -> &RenderPipeline {
        &self.pipeline
    }

    pub fn fonts(&self) -> &FontLibrary {
        &self.fonts
    }

    pub fn document_id(&self) -> Option<&DocumentId> {
        self.active.as_ref().map(|active| &active.id)
    }

    pub fn display_name(&self) -> Option<&str> {
        self.active.as_ref().and_then(|active| active.display_name.as_deref())
    }

    pub fn document(&self) -> Option<&OpenDocument> {
        self.active.as_ref().map(|active| &active.document)
    }

    /// Displayed size of the current page in doc units.
    pub fn page_size(&self) -> Option<(f32, f32)> {
        let document = self.document()?;
        let geometry = document.info().page(self.store.current_page()).ok()?;
        Some(geometry.displayed_size().unwrap_or((geometry.width_pt, geometry.height_pt)))
    }

    /// Starts loading `id`, superseding any load still in flight.
    pub fn begin_load(&mut self, id: DocumentId) -> LoadTicket {
        self.load_generation += 1;
        LoadTicket { generation: self.load_generation, id }
    }

    /// Applies a finished load. Results of superseded loads are ignored.
    ///
    /// An unusable document closes the editor; a retrieval failure leaves the
    /// current document open so the load can be retried.
    pub async fn apply_load(&mut self, outcome: LoadOutcome) -> EditorResult<Effects> {
        if outcome.ticket.generation != self.load_generation {
            log::debug!(
                "dropping load of {} (generation {} < {})",
                outcome.ticket.id,
                outcome.ticket.generation,
                self.load_generation
            );
            return Ok(Effects::none());
        }

        let loaded = match outcome.result {
            Ok(loaded) => loaded,
            Err(err @ LoadError::InvalidDocument(_)) => {
                log::warn!("{} is not a usable document: {err}", outcome.ticket.id);
                self.close();
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        };

        let revision = self.active.as_ref().map_or(0, |active| active.revision) + 1;
        self.controller.cancel(&mut self.store);
        self.store.load_document(loaded.document.page_count());
        self.pipeline.invalidate();
        self.active = Some(ActiveDocument {
            id: loaded.id,
            display_name: loaded.display_name,
            document: loaded.document,
            revision,
        });
        self.resume_session().await;
        self.persist();

        Ok(Effects::view_change())
    }

    /// Drops the active document and everything drawn on it.
    pub fn close(&mut self) {
        self.controller.cancel(&mut self.store);
        self.active = None;
        self.store.load_document(0);
        self.pipeline.invalidate();
    }

    pub fn request_base_render(&mut self) -> EditorResult<BaseRenderJob> {
        let document = self.document().cloned().ok_or(EditorError::NoDocument)?;
        let ticket = self.pipeline.request_base(self.store.current_page(), self.store.zoom());
        Ok(BaseRenderJob { ticket, rasterizer: Arc::clone(&self.rasterizer), document })
    }

    /// Returns whether the render was installed.
    pub fn apply_base_render(&mut self, render: BaseRender) -> EditorResult<bool> {
        Ok(self.pipeline.accept_base(render)?)
    }

    pub fn overlay_scene(&self) -> Option<OverlayScene> {
        let color = self.controller.rect_color();
        let live_rect = self.controller.live_rect().map(|rect| (rect, color));
        Some(OverlayScene::capture(&self.store, self.page_size()?, live_rect))
    }

    /// Paints the current overlay, or `None` without a document.
    pub fn paint_overlay(&mut self) -> Option<RgbaImage> {
        let scene = self.overlay_scene()?;
        self.pipeline.paint_frame(&scene)
    }

    pub fn begin_export(&self) -> EditorResult<ExportJob> {
        let active = self.active.as_ref().ok_or(EditorError::NoDocument)?;
        Ok(ExportJob {
            document_id: active.id.clone(),
            revision: active.revision,
            display_name: active.display_name.clone(),
            annotations: self.store.annotations().clone(),
            original: active.document.shared_bytes(),
            fonts: Arc::clone(&self.fonts),
            builder: Arc::clone(&self.builder),
        })
    }

    /// Applies a finished export: the exported bytes become the document, the
    /// annotations baked into them leave the overlay, and the attached
    /// loader's cache is overwritten with the new bytes. Returns `None` when
    /// the export was for a document or revision that is no longer active.
    pub async fn apply_export(
        &mut self,
        outcome: ExportOutcome,
    ) -> EditorResult<Option<ExportArtifact>> {
        let job = outcome.job;
        let current = self
            .active
            .as_ref()
            .is_some_and(|active| active.id == job.document_id && active.revision == job.revision);
        if !current {
            log::debug!("dropping export of {} revision {}", job.document_id, job.revision);
            return Ok(None);
        }

        let composed = outcome.result?;
        let document = OpenDocument::from_bytes(composed.bytes.clone())?;

        let Some(active) = self.active.as_mut() else {
            return Ok(None);
        };
        active.document = document;
        active.revision += 1;
        let file_name = artifact_name(active.display_name.as_deref());

        self.controller.cancel(&mut self.store);
        self.store.retire_exported(&job.annotations);
        self.pipeline.invalidate();
        self.persist();
        if let Some(loader) = &self.loader {
            loader.store_export(&job.document_id, &composed.bytes).await;
        }

        log::info!("exported {} as {file_name} ({} bytes)", job.document_id, composed.bytes.len());
        Ok(Some(ExportArtifact { document_id: job.document_id, file_name, bytes: composed.bytes }))
    }

    /// Waits until every queued session snapshot has been written.
    pub async fn flush_session(&self) {
        if let Some(sessions) = &self.sessions {
            sessions.flush().await;
        }
    }

    pub fn pointer_down(&mut self, event: PointerEvent) -> Effects {
        let effects = self.controller.pointer_down(&mut self.store, event);
        self.after(effects)
    }

    pub fn pointer_move(&mut self, event: PointerEvent) -> Effects {
        let effects = self.controller.pointer_move(&mut self.store, event);
        self.after(effects)
    }

    pub fn pointer_up(&mut self, event: PointerEvent) -> Effects {
        let effects = self.controller.pointer_up(&mut self.store, event);
        self.after(effects)
    }

    pub fn key_down(&mut self, key: Key, modifiers: Modifiers) -> Effects {
        let effects = self.controller.key_down(&mut self.store, key, modifiers);
        self.after(effects)
    }

    pub fn set_edit_mode(&mut self, mode: EditMode) -> Effects {
        let effects = self.controller.set_edit_mode(&mut self.store, mode);
        self.after(effects)
    }

    pub fn set_page(&mut self, page: u32) -> Effects {
        let mut effects = self.controller.cancel(&mut self.store);
        if self.store.set_page(page) {
            effects = effects.merge(Effects::view_change());
        }
        self.after(effects)
    }

    pub fn set_zoom(&mut self, zoom: f32) -> Effects {
        let before = self.store.zoom();
        let mut effects = Effects::none();
        if self.store.set_zoom(zoom) != before {
            effects = Effects::view_change();
        }
        self.after(effects)
    }

    pub fn set_pending_text(&mut self, text: impl Into<String>) {
        self.controller.set_pending_text(text);
    }

    pub fn set_text_style(&mut self, style: TextStyle) {
        self.controller.set_text_style(style);
    }

    pub fn set_rect_color(&mut self, color: Color) {
        self.controller.set_rect_color(color);
    }

    pub fn update_selected_text(&mut self, text: &str) -> Effects {
        let changed = self.store.update_selected_text(text);
        self.after_mutation(changed)
    }

    pub fn update_selected_font_size(&mut self, font_size: f32) -> Effects {
        let changed = self.store.update_selected_font_size(font_size);
        self.after_mutation(changed)
    }

    pub fn update_selected_font_family(&mut self, family: FontFamily) -> Effects {
        let changed = self.store.update_selected_font_family(family);
        self.after_mutation(changed)
    }

    pub fn update_selected_color(&mut self, color: Color) -> Effects {
        let changed = self.store.update_selected_color(color);
        self.after_mutation(changed)
    }

    fn after_mutation(&mut self, changed: bool) -> Effects {
        if changed {
            self.after(Effects::mutation())
        } else {
            Effects::none()
        }
    }

    fn after(&mut self, effects: Effects) -> Effects {
        if effects.persist {
            self.persist();
        }
        effects
    }

    /// Restores the saved annotations, page and zoom when the last session
    /// was for the document that just opened.
    async fn resume_session(&mut self) {
        let (Some(sessions), Some(active)) = (&self.sessions, &self.active) else {
            return;
        };
        let snapshot = match sessions.load().await {
            Ok(Some(snapshot)) if snapshot.document_id == active.id => snapshot,
            Ok(_) => return,
            Err(err) => {
                log::warn!("could not read saved session: {err}");
                return;
            }
        };

        log::info!(
            "resuming {} with {} annotations on page {}",
            snapshot.document_id,
            snapshot.annotations.len(),
            snapshot.current_page
        );
        self.store.restore(snapshot.annotations);
        self.store.set_page(snapshot.current_page);
        self.store.set_zoom(snapshot.zoom);
    }

    fn persist(&mut self) {
        let (Some(sessions), Some(active)) = (&mut self.sessions, &self.active) else {
            return;
        };
        let snapshot = SessionSnapshot {
            document_id: active.id.clone(),
            display_name: active.display_name.clone(),
            annotations: self.store.annotations().clone(),
            current_page: self.store.current_page(),
            zoom: self.store.zoom(),
            saved_at: Utc::now(),
        };
        sessions.save(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeSource;
    use pdf_markup_cache::{CacheConfig, PersistentCache};
    use pdf_engine::testing::{page_content, sample_pdf, synthetic_font, PageSpec};
    use pdf_engine::{BlankRasterizer, FontAsset};
    use tempfile::TempDir;
    use ttf_parser::Face;

    fn id(raw: &str) -> DocumentId {
        DocumentId::new(raw).expect("valid id")
    }

    fn sans_library() -> FontLibrary {
        let mut library = FontLibrary::new();
        library.insert(
            FontAsset::from_bytes(FontFamily::Sans, synthetic_font()).expect("font should parse"),
        );
        library
    }

    fn editor(sessions: Option<SessionStore>) -> Editor {
        Editor::new(EditorConfig::default(), sans_library(), Arc::new(BlankRasterizer), sessions)
    }

    fn loader(documents: &[(&str, Vec<u8>)]) -> DocumentLoader {
        let source = documents
            .iter()
            .fold(FakeSource::new(), |source, (id, bytes)| source.with_document(id, bytes.clone()));
        DocumentLoader::new(Arc::new(source), None)
    }

    async fn open(editor: &mut Editor, loader: &DocumentLoader, raw_id: &str) {
        let ticket = editor.begin_load(id(raw_id));
        let outcome = ticket.run(loader).await;
        editor.apply_load(outcome).await.expect("load should apply");
    }

    async fn export(editor: &mut Editor) -> ExportArtifact {
        let outcome = editor.begin_export().expect("document is open").run().await;
        let applied = editor.apply_export(outcome).await.expect("export should succeed");
        applied.expect("export is current")
    }

    fn sans(font_size: f32) -> TextStyle {
        TextStyle { font_size, font_family: FontFamily::Sans, ..TextStyle::default() }
    }

    #[tokio::test]
    async fn text_on_unrotated_page_exports_at_flipped_y() {
        let loader = loader(&[("doc", sample_pdf(&[PageSpec::letter()]))]);
        let mut editor = editor(None);
        open(&mut editor, &loader, "doc").await;

        editor.set_edit_mode(EditMode::AddText);
        editor.set_text_style(sans(12.0));
        editor.set_pending_text("AB");
        let effects = editor.pointer_down(PointerEvent::mouse(100.0, 100.0));
        assert!(effects.persist);

        let artifact = export(&mut editor).await;

        let content = page_content(&artifact.bytes, 1);
        assert!(content.contains("1 0 0 1 100 692 Tm"), "content was:\n{content}");
        assert_eq!(artifact.file_name, DEFAULT_ARTIFACT_NAME);
    }

    #[tokio::test]
    async fn text_on_quarter_turn_page_uses_rotated_mapping() {
        let loader = loader(&[("doc", sample_pdf(&[PageSpec::letter().rotated(90)]))]);
        let mut editor = editor(None);
        open(&mut editor, &loader, "doc").await;
        assert_eq!(editor.page_size(), Some((792.0, 612.0)));

        editor.set_edit_mode(EditMode::AddText);
        editor.set_text_style(sans(12.0));
        editor.set_pending_text("AB");
        editor.pointer_down(PointerEvent::mouse(80.0, 120.0));

        let artifact = export(&mut editor).await;

        let content = page_content(&artifact.bytes, 1);
        assert!(content.contains("0 1 -1 0 120 80 Tm"), "content was:\n{content}");
    }

    #[tokio::test]
    async fn only_used_family_and_characters_are_embedded() {
        let original = sample_pdf(&[PageSpec::letter()]);
        let mut library = sans_library();
        library.insert(
            FontAsset::from_bytes(FontFamily::Serif, synthetic_font()).expect("font should parse"),
        );
        let mut editor =
            Editor::new(EditorConfig::default(), library, Arc::new(BlankRasterizer), None);
        open(&mut editor, &loader(&[("doc", original)]), "doc").await;

        editor.set_edit_mode(EditMode::AddText);
        editor.set_text_style(sans(12.0));
        editor.set_pending_text("AäA");
        editor.pointer_down(PointerEvent::mouse(50.0, 50.0));

        let job = editor.begin_export().expect("document is open");
        let composed = compose_export(
            &job.original,
            &job.annotations,
            &editor.fonts,
            &FontSubsetBuilder::new(),
        )
        .expect("export should succeed");

        assert_eq!(composed.fonts.keys().copied().collect::<Vec<_>>(), vec![FontFamily::Sans]);
        let payload = &composed.fonts[&FontFamily::Sans];
        assert_eq!(payload.cids.keys().copied().collect::<String>(), "Aä");
        let face = Face::parse(&payload.bytes, 0).expect("subset should parse");
        assert_eq!(face.number_of_glyphs(), 3);
    }

    #[tokio::test]
    async fn export_retires_baked_annotations_and_advances_the_document() {
        let loader = loader(&[("doc", sample_pdf(&[PageSpec::letter()]))]);
        let mut editor = editor(None);
        open(&mut editor, &loader, "doc").await;
        editor.set_edit_mode(EditMode::AddRect);
        editor.pointer_down(PointerEvent::mouse(10.0, 10.0));
        editor.pointer_move(PointerEvent::mouse(60.0, 40.0));
        editor.pointer_up(PointerEvent::mouse(60.0, 40.0));
        assert_eq!(editor.store().annotations().rects.len(), 1);

        let artifact = export(&mut editor).await;

        assert!(editor.store().annotations().is_empty());
        assert!(!editor.store().can_undo());
        let document = editor.document().expect("document stays open");
        assert_eq!(document.bytes(), artifact.bytes.as_slice());
    }

    #[tokio::test]
    async fn reopening_after_export_serves_the_exported_bytes() {
        let dir = TempDir::new().expect("tempdir");
        let original = sample_pdf(&[PageSpec::letter()]);
        let source = Arc::new(FakeSource::new().with_document("doc", original));
        let config = CacheConfig::default().with_dir(dir.path().join("cache"));
        let cache = PersistentCache::open(&config).await.expect("cache should open");
        let loader = DocumentLoader::new(source.clone(), Some(cache));
        let sessions = SessionStore::with_root(dir.path().join("session"));
        let mut editor = editor(Some(sessions)).with_loader(loader.clone());
        open(&mut editor, &loader, "doc").await;

        editor.set_edit_mode(EditMode::AddText);
        editor.set_text_style(sans(12.0));
        editor.set_pending_text("AB");
        editor.pointer_down(PointerEvent::mouse(100.0, 100.0));
        export(&mut editor).await;
        assert!(editor.store().annotations().is_empty());

        open(&mut editor, &loader, "doc").await;

        let reopened = editor.document().expect("document reopened");
        let content = page_content(reopened.bytes(), 1);
        assert!(content.contains("1 0 0 1 100 692 Tm"), "content was:\n{content}");
        assert!(editor.store().annotations().is_empty());
        assert_eq!(source.byte_fetches(), 1);
    }

    #[tokio::test]
    async fn export_for_a_replaced_document_is_dropped() {
        let loader = loader(&[
            ("first", sample_pdf(&[PageSpec::letter()])),
            ("second", sample_pdf(&[PageSpec::letter(), PageSpec::letter()])),
        ]);
        let mut editor = editor(None);
        open(&mut editor, &loader, "first").await;
        editor.set_edit_mode(EditMode::AddRect);
        editor.pointer_down(PointerEvent::mouse(10.0, 10.0));
        editor.pointer_up(PointerEvent::mouse(60.0, 40.0));

        let job = editor.begin_export().expect("document is open");
        open(&mut editor, &loader, "second").await;
        let second_bytes = editor.document().expect("second is open").bytes().to_vec();

        let outcome = job.run().await;
        assert!(outcome.result.is_ok());
        let applied = editor.apply_export(outcome).await.expect("stale export is not an error");
        assert!(applied.is_none());
        assert_eq!(editor.document_id(), Some(&id("second")));
        assert_eq!(editor.document().expect("second is open").bytes(), second_bytes.as_slice());
    }

    #[tokio::test]
    async fn export_without_font_keeps_document_editable() {
        let loader = loader(&[("doc", sample_pdf(&[PageSpec::letter()]))]);
        let rasterizer = Arc::new(BlankRasterizer);
        let mut editor = Editor::new(EditorConfig::default(), FontLibrary::new(), rasterizer, None);
        open(&mut editor, &loader, "doc").await;
        editor.set_edit_mode(EditMode::AddText);
        editor.set_pending_text("AB");
        editor.pointer_down(PointerEvent::mouse(100.0, 100.0));

        let outcome = editor.begin_export().expect("document is open").run().await;
        let err = editor.apply_export(outcome).await.expect_err("no font to embed");

        assert!(matches!(err, EditorError::Export(ExportError::MissingEmbeddedFont(_))));
        assert_eq!(editor.store().annotations().texts.len(), 1);
        assert!(editor.document().is_some());
    }

    #[tokio::test]
    async fn superseded_load_is_ignored() {
        let loader = loader(&[
            ("first", sample_pdf(&[PageSpec::letter()])),
            ("second", sample_pdf(&[PageSpec::letter(), PageSpec::letter()])),
        ]);
        let mut editor = editor(None);

        let first = editor.begin_load(id("first"));
        let second = editor.begin_load(id("second"));
        let second = second.run(&loader).await;
        let first = first.run(&loader).await;

        editor.apply_load(second).await.expect("second applies");
        let effects = editor.apply_load(first).await.expect("stale load is not an error");

        assert!(effects.is_empty());
        assert_eq!(editor.document_id(), Some(&id("second")));
        assert_eq!(editor.store().total_pages(), 2);
    }

    #[tokio::test]
    async fn invalid_document_reverts_to_no_document() {
        let loader = loader(&[
            ("good", sample_pdf(&[PageSpec::letter()])),
            ("bad", b"not a pdf".to_vec()),
        ]);
        let mut editor = editor(None);
        open(&mut editor, &loader, "good").await;

        let outcome = editor.begin_load(id("bad")).run(&loader).await;
        let err = editor.apply_load(outcome).await.expect_err("bad document");

        assert!(matches!(err, EditorError::Load(LoadError::InvalidDocument(_))));
        assert!(editor.document().is_none());
        assert_eq!(editor.store().total_pages(), 0);
        assert!(matches!(editor.begin_export(), Err(EditorError::NoDocument)));
    }

    #[tokio::test]
    async fn retrieval_failure_keeps_the_open_document() {
        let loader = loader(&[("good", sample_pdf(&[PageSpec::letter()]))]);
        let mut editor = editor(None);
        open(&mut editor, &loader, "good").await;

        let outcome = editor.begin_load(id("missing")).run(&loader).await;
        let err = editor.apply_load(outcome).await.expect_err("nothing to fetch");

        assert!(matches!(err, EditorError::Load(LoadError::Retrieval(_))));
        assert_eq!(editor.document_id(), Some(&id("good")));
    }

    #[tokio::test]
    async fn stale_base_render_is_not_painted() {
        let loader = loader(&[("doc", sample_pdf(&[PageSpec::letter(), PageSpec::letter()]))]);
        let mut editor = editor(None);
        open(&mut editor, &loader, "doc").await;

        let first = editor.request_base_render().expect("document is open");
        let effects = editor.set_page(2);
        assert!(effects.rerender_base);
        let second = editor.request_base_render().expect("document is open");

        assert!(!editor.apply_base_render(first.run().await).expect("stale render dropped"));
        assert!(editor.apply_base_render(second.run().await).expect("render applies"));
        assert_eq!(editor.pipeline().base().map(|base| base.page), Some(2));
        assert!(editor.paint_overlay().is_some());
    }

    #[tokio::test]
    async fn session_resumes_for_the_same_document() {
        let dir = TempDir::new().expect("tempdir");
        let loader = loader(&[
            ("doc", sample_pdf(&[PageSpec::letter(), PageSpec::letter()])),
            ("other", sample_pdf(&[PageSpec::letter()])),
        ]);

        let mut editor = editor(Some(SessionStore::with_root(dir.path())));
        open(&mut editor, &loader, "doc").await;
        editor.set_page(2);
        editor.set_zoom(1.5);
        editor.set_edit_mode(EditMode::AddRect);
        editor.pointer_down(PointerEvent::mouse(30.0, 30.0));
        editor.pointer_up(PointerEvent::mouse(90.0, 90.0));
        let saved = editor.store().annotations().clone();
        editor.flush_session().await;
        drop(editor);

        let mut resumed = self::editor(Some(SessionStore::with_root(dir.path())));
        open(&mut resumed, &loader, "doc").await;
        assert_eq!(resumed.store().annotations(), &saved);
        assert_eq!(resumed.store().current_page(), 2);
        assert_eq!(resumed.store().zoom(), 1.5);

        let mut other = self::editor(Some(SessionStore::with_root(dir.path())));
        open(&mut other, &loader, "other").await;
        assert!(other.store().annotations().is_empty());
    }

    #[test]
    fn artifact_names_follow_the_display_name() {
        assert_eq!(artifact_name(Some("Floor plan.pdf")), "Floor plan_edited.pdf");
        assert_eq!(artifact_name(Some("scan.PDF")), "scan_edited.pdf");
        assert_eq!(artifact_name(Some("notes")), "notes_edited.pdf");
        assert_eq!(artifact_name(Some("dir/report.pdf")), "report_edited.pdf");
        assert_eq!(artifact_name(Some("  ")), DEFAULT_ARTIFACT_NAME);
        assert_eq!(artifact_name(None), DEFAULT_ARTIFACT_NAME);
    }
}
