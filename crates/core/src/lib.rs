//! PDF Markup Core Library
//!
//! Annotation state, input handling, rendering and the editor session that
//! ties loading, caching and export together.

pub mod autosave;
pub mod config;
pub mod history;
pub mod interaction;
pub mod loader;
pub mod measure;
pub mod remote;
pub mod render;
pub mod session;
pub mod store;
#[cfg(test)]
mod test_support;

pub use autosave::SessionWriter;
pub use config::{EditorConfig, FontPaths};
pub use history::History;
pub use interaction::{
    Effects, Gesture, InteractionController, Key, Modifiers, PointerButton, PointerEvent,
};
pub use loader::{DocumentLoader, LoadError, LoadedDocument};
pub use measure::{ApproximateMeasure, FontMeasure, TextMeasure};
pub use remote::{DocumentSource, HttpSource, OfflineSource, RemoteMetadata, RetrievalError};
pub use render::{BaseLayer, BaseRender, BaseRenderTicket, OverlayScene, RenderPipeline};
pub use session::{
    artifact_name, compose_export, BaseRenderJob, ComposedExport, Editor, EditorError,
    EditorResult, ExportArtifact, ExportJob, ExportOutcome, LoadOutcome, LoadTicket,
};
pub use store::{AnnotationStore, StoreOptions};
