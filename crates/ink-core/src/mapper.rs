//! Canvas → export coordinate mapping
//!
//! Both spaces derive from the same page viewport, so they share an aspect
//! ratio; each axis is still scaled independently. Disk radius and font size
//! are plain linear multipliers taken from [`ExportConfig`], never derived
//! from the source/destination ratio.

use ink_model::{ExportConfig, Point, SurfaceSize, TextAnnotation};

/// `x' = x / source.width * dest.width`, `y' = y / source.height * dest.height`
pub fn to_export_space(point: Point, source: SurfaceSize, dest: SurfaceSize) -> Point {
    Point::new(
        scale_axis(point.x, source.width, dest.width),
        scale_axis(point.y, source.height, dest.height),
    )
}

fn scale_axis(value: f32, source: f32, dest: f32) -> f32 {
    if source > 0.0 {
        value / source * dest
    } else {
        value
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    source: SurfaceSize,
    dest: SurfaceSize,
    radius_scale: f32,
    text_scale: f32,
}

impl CoordinateMapper {
    pub fn new(source: SurfaceSize, dest: SurfaceSize, config: &ExportConfig) -> Self {
        Self {
            source,
            dest,
            radius_scale: config.stroke_radius_scale,
            text_scale: config.text_size_scale,
        }
    }

    pub fn map_point(&self, point: Point) -> Point {
        to_export_space(point, self.source, self.dest)
    }

    /// Disk radius stamped for each sample of a stroke of `width`
    pub fn disk_radius(&self, width: f32) -> f32 {
        width / 2.0 * self.radius_scale
    }

    pub fn font_size(&self, label: &TextAnnotation) -> f32 {
        label.font_size() * self.text_scale
    }

    pub fn source(&self) -> SurfaceSize {
        self.source
    }

    pub fn dest(&self) -> SurfaceSize {
        self.dest
    }
}
