use crate::annotation::ToolSettings;
use crate::ModelError;
use serde::{Deserialize, Serialize};

/// Replay order for a page's annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayOrder {
    /// Every stroke first, then every label. Labels always sit above ink.
    #[default]
    StrokesThenText,
    /// Commit order across both kinds.
    Committed,
}

/// Export tuning.
///
/// Export pages always use the native page viewport (scale 1.0, in points)
/// for image placement and coordinate mapping. `raster_scale` only changes
/// the pixel density of the embedded page image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub raster_scale: f32,
    /// Disk radius is `width / 2 * stroke_radius_scale`
    pub stroke_radius_scale: f32,
    /// Font size is `(size + 10) * text_size_scale`
    pub text_size_scale: f32,
    pub jpeg_quality: u8,
    pub replay_order: ReplayOrder,
}

impl ExportConfig {
    pub fn validate(&self) -> Result<(), ModelError> {
        ensure_scale("raster_scale", self.raster_scale)?;
        ensure_scale("stroke_radius_scale", self.stroke_radius_scale)?;
        ensure_scale("text_size_scale", self.text_size_scale)?;
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ModelError::InvalidJpegQuality(self.jpeg_quality));
        }
        Ok(())
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            raster_scale: 1.0,
            stroke_radius_scale: 1.0,
            text_size_scale: 1.0,
            jpeg_quality: 85,
            replay_order: ReplayOrder::StrokesThenText,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub tool: ToolSettings,
    /// Scale the on-screen surface is rendered at
    pub display_scale: f32,
    pub export: ExportConfig,
}

impl Preferences {
    pub fn validate(&self) -> Result<(), ModelError> {
        self.tool.validate()?;
        ensure_scale("display_scale", self.display_scale)?;
        self.export.validate()
    }
}

impl Default for Preferences {
    fn default() -> Self {
        Self { tool: ToolSettings::default(), display_scale: 1.0, export: ExportConfig::default() }
    }
}

fn ensure_scale(name: &'static str, value: f32) -> Result<(), ModelError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ModelError::InvalidScale { name, value })
    }
}
