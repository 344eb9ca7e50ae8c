//! Annotation data model for PaperInk.
//!
//! Points live in the pixel space of the surface they were captured on. Strokes
//! and text labels are immutable once built; the [`AnnotationStore`] owns them
//! per 1-based page number.

mod annotation;
mod geometry;
mod preferences;
mod store;

pub use annotation::{
    Annotation, AnnotationKind, Stroke, TextAnnotation, ToolKind, ToolSettings, ERASER_WIDTH,
};
pub use geometry::{Color, Point, SurfaceSize};
pub use preferences::{ExportConfig, Preferences, ReplayOrder};
pub use store::{AnnotationStore, PageAnnotations};

/// Pixels added to a label's size to get its font size, on screen and in exports.
pub const TEXT_SIZE_OFFSET: f32 = 10.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("text annotation must not be empty")]
    EmptyText,
    #[error("stroke width must be a positive number, got {0}")]
    InvalidWidth(f32),
    #[error("text size must be a positive number, got {0}")]
    InvalidTextSize(f32),
    #[error("invalid color literal {0:?}, expected #RRGGBB or #RRGGBBAA")]
    InvalidColor(String),
    #[error("{name} must be a positive number, got {value}")]
    InvalidScale { name: &'static str, value: f32 },
    #[error("jpeg quality must be between 1 and 100, got {0}")]
    InvalidJpegQuality(u8),
}
