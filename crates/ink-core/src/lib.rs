//! PaperInk core
//!
//! Capture, replay and export of freehand ink and text labels over rasterized
//! PDF pages.

pub mod capture;
pub mod compositor;
pub mod export;
pub mod mapper;
pub mod session;
pub mod surface;

pub use capture::{CaptureState, LiveSegment, StrokeCapture, DECIMATION_THRESHOLD};
pub use export::{export_document, ExportRequest, ExportedPdf};
pub use mapper::{to_export_space, CoordinateMapper};
pub use session::{AnnotationSession, RenderOutcome, RenderTicket};
pub use surface::{DrawCommand, DrawSurface, PixmapSurface, RecordingSurface, SurfaceError};

use ink_model::ModelError;
use pdf_engine::PdfEngineError;

/// Errors surfaced at the load, navigate and export boundaries.
#[derive(Debug, thiserror::Error)]
pub enum InkError {
    #[error("failed to decode document: {0}")]
    Decode(#[source] PdfEngineError),
    #[error("failed to render page {page}: {source}")]
    Render {
        page: u32,
        #[source]
        source: PdfEngineError,
    },
    #[error("failed to encode export: {0}")]
    Encode(#[source] PdfEngineError),
    #[error("no document is loaded")]
    NoDocument,
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

pub type InkResult<T> = Result<T, InkError>;
