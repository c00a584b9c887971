pub mod export;
pub mod fonts;
mod objects;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

use doc_model::transform::{self, InvalidRotation, Rotation};
use image::{ImageBuffer, Rgba};
use lopdf::Document;
use std::sync::Arc;

pub use export::{export_document, ExportError};
pub use fonts::{
    collect_codepoints, FontAsset, FontError, FontLibrary, FontMap, FontMetrics, FontPayload,
    FontSubsetBuilder, PayloadKind,
};

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("encrypted PDFs are not supported")]
    EncryptedUnsupported,
    #[error("backend error: {0}")]
    Backend(String),
}

impl PdfEngineError {
    /// Whether the bytes themselves are unusable, as opposed to a caller error.
    pub fn is_invalid_document(&self) -> bool {
        matches!(
            self,
            PdfEngineError::Parse(_)
                | PdfEngineError::InvalidDocument(_)
                | PdfEngineError::EncryptedUnsupported
        )
    }
}

/// Media box and native rotation of one page, in PDF user space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub origin_x: f32,
    pub origin_y: f32,
    pub width_pt: f32,
    pub height_pt: f32,
    /// `/Rotate` normalized into `0..360`; not necessarily a quarter turn.
    pub rotation: i64,
}

impl PageGeometry {
    pub const LETTER: PageGeometry = PageGeometry {
        origin_x: 0.0,
        origin_y: 0.0,
        width_pt: 612.0,
        height_pt: 792.0,
        rotation: 0,
    };

    pub fn rotation(&self) -> Result<Rotation, InvalidRotation> {
        Rotation::try_from(self.rotation)
    }

    /// Size of the page as a viewer shows it, axes swapped on quarter turns.
    pub fn displayed_size(&self) -> Result<(f32, f32), InvalidRotation> {
        Ok(transform::displayed_size(self.width_pt, self.height_pt, self.rotation()?))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentInfo {
    pub pages: Vec<PageGeometry>,
}

impl DocumentInfo {
    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    /// Page geometry by 1-based page number.
    pub fn page(&self, page: u32) -> Result<&PageGeometry, PdfEngineError> {
        page.checked_sub(1)
            .and_then(|index| self.pages.get(index as usize))
            .ok_or(PdfEngineError::PageOutOfRange { page, page_count: self.page_count() })
    }
}

/// Reads page count, sizes and rotations without keeping the parsed document.
pub fn probe(bytes: &[u8]) -> Result<DocumentInfo, PdfEngineError> {
    if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
        return Err(PdfEngineError::EncryptedUnsupported);
    }

    let doc = Document::load_mem(bytes)?;
    let pages = doc
        .get_pages()
        .into_values()
        .map(|page_id| objects::page_geometry(&doc, page_id))
        .collect::<Vec<_>>();

    if pages.is_empty() {
        return Err(PdfEngineError::InvalidDocument("document has no pages".to_owned()));
    }

    Ok(DocumentInfo { pages })
}

/// Document bytes paired with their probed layout; cheap to clone.
#[derive(Debug, Clone)]
pub struct OpenDocument {
    bytes: Arc<Vec<u8>>,
    info: Arc<DocumentInfo>,
}

impl OpenDocument {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, PdfEngineError> {
        let info = probe(&bytes)?;
        Ok(Self { bytes: Arc::new(bytes), info: Arc::new(info) })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn shared_bytes(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.bytes)
    }

    pub fn info(&self) -> &DocumentInfo {
        &self.info
    }

    pub fn page_count(&self) -> u32 {
        self.info.page_count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    /// 1-based page number.
    pub page: u32,
    /// Output pixels per PDF point (zoom times device pixel ratio).
    pub scale: f32,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self { page: 1, scale: 1.0 }
    }
}

/// Turns a page into a preview bitmap laid out in displayed orientation.
pub trait PageRasterizer: Send + Sync {
    fn render_page(
        &self,
        document: &OpenDocument,
        request: RenderRequest,
    ) -> Result<RgbaImage, PdfEngineError>;
}

/// Paper-colored placeholder pages at the correct displayed size.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlankRasterizer;

impl PageRasterizer for BlankRasterizer {
    fn render_page(
        &self,
        document: &OpenDocument,
        request: RenderRequest,
    ) -> Result<RgbaImage, PdfEngineError> {
        let geometry = document.info().page(request.page)?;
        let scale = if request.scale <= 0.0 { 1.0 } else { request.scale };
        let (width_pt, height_pt) = geometry
            .displayed_size()
            .unwrap_or((geometry.width_pt, geometry.height_pt));

        let width = (width_pt * scale).round().max(1.0) as u32;
        let height = (height_pt * scale).round().max(1.0) as u32;

        let mut image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));

        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, Rgba([220, 220, 220, 255]));
                image.put_pixel(x, height - 1, Rgba([220, 220, 220, 255]));
            }
            for y in 0..height {
                image.put_pixel(0, y, Rgba([220, 220, 220, 255]));
                image.put_pixel(width - 1, y, Rgba([220, 220, 220, 255]));
            }
        }

        Ok(image)
    }
}

pub fn default_rasterizer() -> BlankRasterizer {
    BlankRasterizer
}
