use crate::geometry::{Color, Point};
use crate::{ModelError, TEXT_SIZE_OFFSET};
use serde::{Deserialize, Serialize};

/// Width of eraser gestures in surface pixels, whatever the pen width.
pub const ERASER_WIDTH: f32 = 5.0;

/// What a freehand gesture does to the ink already on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Paints with the tool color
    #[default]
    Pen,
    /// Clears ink under the gesture
    Eraser,
}

/// The pen a gesture or label is committed with.
///
/// A value, not shared state: capture takes a copy when a gesture starts and
/// text placement takes one at the moment of placement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub color: Color,
    /// Stroke width in surface pixels
    pub width: f32,
    /// Label size; the rendered font size is `text_size + TEXT_SIZE_OFFSET`
    pub text_size: f32,
    pub kind: ToolKind,
}

impl ToolSettings {
    pub fn new(color: Color, width: f32, text_size: f32) -> Result<Self, ModelError> {
        let settings = Self { color, width, text_size, kind: ToolKind::Pen };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        ensure_positive(self.width).map_err(ModelError::InvalidWidth)?;
        ensure_positive(self.text_size).map_err(ModelError::InvalidTextSize)?;
        Ok(())
    }

    pub fn with_color(self, color: Color) -> Self {
        Self { color, ..self }
    }

    pub fn with_kind(self, kind: ToolKind) -> Self {
        Self { kind, ..self }
    }

    /// Width a gesture started with this tool is drawn at
    pub fn stroke_width(&self) -> f32 {
        match self.kind {
            ToolKind::Pen => self.width,
            ToolKind::Eraser => ERASER_WIDTH,
        }
    }
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self { color: Color::BLACK, width: 2.0, text_size: 14.0, kind: ToolKind::Pen }
    }
}

/// One committed freehand gesture.
///
/// Points are owned by the stroke; nothing else holds a reference to them.
/// Eraser strokes live in the same history as ink so undo restores what
/// they cleared.
#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    points: Vec<Point>,
    color: Color,
    width: f32,
    kind: ToolKind,
}

impl Stroke {
    pub fn new(points: Vec<Point>, color: Color, width: f32) -> Result<Self, ModelError> {
        ensure_positive(width).map_err(ModelError::InvalidWidth)?;
        Ok(Self { points, color, width, kind: ToolKind::Pen })
    }

    pub fn eraser(points: Vec<Point>, width: f32) -> Result<Self, ModelError> {
        let stroke = Self::new(points, Color::WHITE, width)?;
        Ok(Self { kind: ToolKind::Eraser, ..stroke })
    }

    pub fn with_tool(points: Vec<Point>, tool: &ToolSettings) -> Result<Self, ModelError> {
        match tool.kind {
            ToolKind::Pen => Self::new(points, tool.color, tool.width),
            ToolKind::Eraser => Self::eraser(points, tool.stroke_width()),
        }
    }

    pub fn kind(&self) -> ToolKind {
        self.kind
    }

    pub fn is_eraser(&self) -> bool {
        self.kind == ToolKind::Eraser
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    /// Strokes with fewer than two points have no visible segment
    pub fn is_degenerate(&self) -> bool {
        self.points.len() < 2
    }
}

/// One placed text label.
#[derive(Debug, Clone, PartialEq)]
pub struct TextAnnotation {
    text: String,
    anchor: Point,
    color: Color,
    size: f32,
}

impl TextAnnotation {
    pub fn new(
        text: impl Into<String>,
        anchor: Point,
        color: Color,
        size: f32,
    ) -> Result<Self, ModelError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ModelError::EmptyText);
        }
        ensure_positive(size).map_err(ModelError::InvalidTextSize)?;

        Ok(Self { text, anchor, color, size })
    }

    pub fn with_tool(
        text: impl Into<String>,
        anchor: Point,
        tool: &ToolSettings,
    ) -> Result<Self, ModelError> {
        Self::new(text, anchor, tool.color, tool.text_size)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Baseline origin of the first glyph
    pub fn anchor(&self) -> Point {
        self.anchor
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    pub fn font_size(&self) -> f32 {
        self.size + TEXT_SIZE_OFFSET
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnnotationKind {
    Stroke,
    Text,
}

/// An entry in a page's commit history.
#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    Stroke(Stroke),
    Text(TextAnnotation),
}

impl Annotation {
    pub fn kind(&self) -> AnnotationKind {
        match self {
            Annotation::Stroke(_) => AnnotationKind::Stroke,
            Annotation::Text(_) => AnnotationKind::Text,
        }
    }
}

impl From<Stroke> for Annotation {
    fn from(value: Stroke) -> Self {
        Annotation::Stroke(value)
    }
}

impl From<TextAnnotation> for Annotation {
    fn from(value: TextAnnotation) -> Self {
        Annotation::Text(value)
    }
}

fn ensure_positive(value: f32) -> Result<(), f32> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(value)
    }
}
