//! Drawing surfaces
//!
//! A [`DrawSurface`] is the 2D context the session and compositor draw into.
//! [`PixmapSurface`] rasterizes with tiny-skia; [`RecordingSurface`] keeps the
//! command list so a host (or a test) can replay it elsewhere.

use ink_model::{Color, Point, SurfaceSize};
use pdf_engine::RgbaImage;
use tiny_skia as sk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot allocate a {width}x{height} drawing surface")]
pub struct SurfaceError {
    pub width: u32,
    pub height: u32,
}

pub trait DrawSurface {
    fn size(&self) -> SurfaceSize;
    /// Resize to `size` and discard all pixel content
    fn reset(&mut self, size: SurfaceSize) -> Result<(), SurfaceError>;
    /// Blit a page raster at the origin
    fn draw_image(&mut self, image: &RgbaImage);
    /// Round-capped, round-joined poly-line. Fewer than two points draw nothing.
    fn stroke_polyline(&mut self, points: &[Point], color: Color, width: f32);
    /// Clear annotation ink under a round-capped poly-line. The page raster
    /// drawn with [`DrawSurface::draw_image`] is left intact.
    fn erase_polyline(&mut self, points: &[Point], width: f32);
    fn fill_disk(&mut self, center: Point, radius: f32, color: Color);
    /// Single-line text with its baseline starting at `anchor`
    fn fill_text(&mut self, text: &str, anchor: Point, color: Color, font_size: f32);
}

/// Raster surface with the page image and the annotation ink on separate
/// layers. Reads see the ink composited over the page.
pub struct PixmapSurface {
    background: sk::Pixmap,
    ink: sk::Pixmap,
}

impl PixmapSurface {
    pub fn new(size: SurfaceSize) -> Result<Self, SurfaceError> {
        Ok(Self { background: allocate(size)?, ink: allocate(size)? })
    }

    /// Page raster with the ink layer drawn over it
    pub fn composite(&self) -> sk::Pixmap {
        let mut composite = self.background.clone();
        composite.draw_pixmap(
            0,
            0,
            self.ink.as_ref(),
            &sk::PixmapPaint::default(),
            sk::Transform::identity(),
            None,
        );
        composite
    }

    /// Straight-alpha copy of the composited surface
    pub fn to_rgba_image(&self) -> RgbaImage {
        let composite = self.composite();
        let mut data = Vec::with_capacity(composite.pixels().len() * 4);
        for pixel in composite.pixels() {
            let color = pixel.demultiply();
            data.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
        }

        RgbaImage::from_raw(composite.width(), composite.height(), data)
            .unwrap_or_else(|| RgbaImage::new(composite.width(), composite.height()))
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        let color = self.composite().pixel(x, y)?.demultiply();
        Some(Color::new(color.red(), color.green(), color.blue(), color.alpha()))
    }
}

fn allocate(size: SurfaceSize) -> Result<sk::Pixmap, SurfaceError> {
    let (width, height) = size.to_pixels();
    sk::Pixmap::new(width, height).ok_or(SurfaceError { width, height })
}

fn paint(color: Color) -> sk::Paint<'static> {
    let mut paint = sk::Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, color.a);
    paint.anti_alias = true;
    paint
}

fn polyline_path(points: &[Point]) -> Option<sk::Path> {
    let [first, rest @ ..] = points else {
        return None;
    };
    if rest.is_empty() {
        return None;
    }

    let mut builder = sk::PathBuilder::new();
    builder.move_to(first.x, first.y);
    for point in rest {
        builder.line_to(point.x, point.y);
    }
    builder.finish()
}

fn round_stroke(width: f32) -> sk::Stroke {
    sk::Stroke {
        width,
        line_cap: sk::LineCap::Round,
        line_join: sk::LineJoin::Round,
        ..Default::default()
    }
}

impl DrawSurface for PixmapSurface {
    fn size(&self) -> SurfaceSize {
        SurfaceSize::new(self.background.width() as f32, self.background.height() as f32)
    }

    fn reset(&mut self, size: SurfaceSize) -> Result<(), SurfaceError> {
        self.background = allocate(size)?;
        self.ink = allocate(size)?;
        Ok(())
    }

    fn draw_image(&mut self, image: &RgbaImage) {
        let mut data = Vec::with_capacity(image.as_raw().len());
        for pixel in image.pixels() {
            let [r, g, b, a] = pixel.0;
            let color = sk::ColorU8::from_rgba(r, g, b, a).premultiply();
            data.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
        }

        let Some(source) = sk::IntSize::from_wh(image.width(), image.height())
            .and_then(|size| sk::Pixmap::from_vec(data, size))
        else {
            log::warn!("skipping empty {}x{} page image", image.width(), image.height());
            return;
        };

        self.background.draw_pixmap(
            0,
            0,
            source.as_ref(),
            &sk::PixmapPaint::default(),
            sk::Transform::identity(),
            None,
        );
    }

    fn stroke_polyline(&mut self, points: &[Point], color: Color, width: f32) {
        let Some(path) = polyline_path(points) else {
            return;
        };
        self.ink.stroke_path(
            &path,
            &paint(color),
            &round_stroke(width),
            sk::Transform::identity(),
            None,
        );
    }

    fn erase_polyline(&mut self, points: &[Point], width: f32) {
        let Some(path) = polyline_path(points) else {
            return;
        };
        let mut paint = paint(Color::BLACK);
        paint.blend_mode = sk::BlendMode::DestinationOut;
        self.ink.stroke_path(&path, &paint, &round_stroke(width), sk::Transform::identity(), None);
    }

    fn fill_disk(&mut self, center: Point, radius: f32, color: Color) {
        let Some(path) = sk::PathBuilder::from_circle(center.x, center.y, radius) else {
            return;
        };
        self.ink.fill_path(
            &path,
            &paint(color),
            sk::FillRule::Winding,
            sk::Transform::identity(),
            None,
        );
    }

    /// Glyphs are approximated by boxes: there is no font rasterizer here, the
    /// boxes only reserve the label's footprint in previews.
    fn fill_text(&mut self, text: &str, anchor: Point, color: Color, font_size: f32) {
        let advance = font_size * 0.6;
        let glyph_width = advance * 0.8;
        let paint = paint(color);

        let mut x = anchor.x;
        for ch in text.chars() {
            let height = if ch.is_whitespace() || ch.is_control() {
                None
            } else if ch.is_uppercase() || ch.is_ascii_digit() {
                Some(font_size * 0.7)
            } else if ch.is_lowercase() {
                Some(font_size * 0.5)
            } else {
                Some(font_size * 0.6)
            };

            if let Some(rect) =
                height.and_then(|h| sk::Rect::from_xywh(x, anchor.y - h, glyph_width, h))
            {
                self.ink.fill_rect(rect, &paint, sk::Transform::identity(), None);
            }

            x += advance;
        }
    }
}

/// One recorded call on a [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Reset(SurfaceSize),
    Image { width: u32, height: u32 },
    Polyline { points: Vec<Point>, color: Color, width: f32 },
    Erase { points: Vec<Point>, width: f32 },
    Disk { center: Point, radius: f32, color: Color },
    Text { text: String, anchor: Point, color: Color, font_size: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSurface {
    size: SurfaceSize,
    commands: Vec<DrawCommand>,
}

impl RecordingSurface {
    pub fn new(size: SurfaceSize) -> Self {
        Self { size, commands: Vec::new() }
    }

    /// Commands issued since the last reset
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn polylines(&self) -> impl Iterator<Item = &DrawCommand> {
        self.commands.iter().filter(|command| matches!(command, DrawCommand::Polyline { .. }))
    }

    pub fn texts(&self) -> impl Iterator<Item = &DrawCommand> {
        self.commands.iter().filter(|command| matches!(command, DrawCommand::Text { .. }))
    }
}

impl Default for RecordingSurface {
    fn default() -> Self {
        Self::new(SurfaceSize::new(1.0, 1.0))
    }
}

impl DrawSurface for RecordingSurface {
    fn size(&self) -> SurfaceSize {
        self.size
    }

    fn reset(&mut self, size: SurfaceSize) -> Result<(), SurfaceError> {
        self.size = size;
        self.commands.clear();
        self.commands.push(DrawCommand::Reset(size));
        Ok(())
    }

    fn draw_image(&mut self, image: &RgbaImage) {
        self.commands.push(DrawCommand::Image { width: image.width(), height: image.height() });
    }

    fn stroke_polyline(&mut self, points: &[Point], color: Color, width: f32) {
        if points.len() < 2 {
            return;
        }
        self.commands.push(DrawCommand::Polyline { points: points.to_vec(), color, width });
    }

    fn erase_polyline(&mut self, points: &[Point], width: f32) {
        if points.len() < 2 {
            return;
        }
        self.commands.push(DrawCommand::Erase { points: points.to_vec(), width });
    }

    fn fill_disk(&mut self, center: Point, radius: f32, color: Color) {
        self.commands.push(DrawCommand::Disk { center, radius, color });
    }

    fn fill_text(&mut self, text: &str, anchor: Point, color: Color, font_size: f32) {
        self.commands.push(DrawCommand::Text {
            text: text.to_owned(),
            anchor,
            color,
            font_size,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn surface(width: f32, height: f32) -> PixmapSurface {
        PixmapSurface::new(SurfaceSize::new(width, height)).expect("surface should allocate")
    }

    #[test]
    fn reset_resizes_and_clears() {
        let mut surface = surface(20.0, 20.0);
        surface.fill_disk(Point::new(10.0, 10.0), 5.0, Color::RED);

        surface.reset(SurfaceSize::new(40.0, 30.0)).unwrap();

        assert_eq!(surface.size(), SurfaceSize::new(40.0, 30.0));
        assert_eq!(surface.pixel(10, 10).map(|c| c.a), Some(0));
    }

    #[test]
    fn page_image_is_blitted_at_origin() {
        let mut surface = surface(4.0, 4.0);
        let page = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255]));

        surface.draw_image(&page);

        assert_eq!(surface.pixel(3, 3), Some(Color::rgb(10, 20, 30)));
    }

    #[test]
    fn polyline_covers_its_path() {
        let mut surface = surface(20.0, 20.0);
        surface.stroke_polyline(
            &[Point::new(2.0, 10.0), Point::new(18.0, 10.0)],
            Color::BLUE,
            4.0,
        );

        assert_eq!(surface.pixel(10, 10), Some(Color::BLUE));
        assert_eq!(surface.pixel(10, 2).map(|c| c.a), Some(0));
    }

    #[test]
    fn eraser_clears_ink_but_keeps_the_page() {
        let mut surface = surface(20.0, 20.0);
        surface.draw_image(&RgbaImage::from_pixel(20, 20, Rgba([10, 20, 30, 255])));
        let line = [Point::new(2.0, 10.0), Point::new(18.0, 10.0)];
        surface.stroke_polyline(&line, Color::RED, 6.0);
        surface.fill_disk(Point::new(10.0, 3.0), 2.0, Color::BLUE);

        surface.erase_polyline(&line, 5.0);

        assert_eq!(surface.pixel(10, 10), Some(Color::rgb(10, 20, 30)));
        assert_eq!(surface.pixel(10, 3), Some(Color::BLUE));
    }

    #[test]
    fn ink_drawn_after_erasing_is_visible() {
        let mut surface = surface(20.0, 20.0);
        let line = [Point::new(2.0, 10.0), Point::new(18.0, 10.0)];
        surface.erase_polyline(&line, 5.0);
        surface.stroke_polyline(&line, Color::RED, 4.0);

        assert_eq!(surface.pixel(10, 10), Some(Color::RED));
    }

    #[test]
    fn single_point_polyline_draws_nothing() {
        let mut surface = surface(10.0, 10.0);
        surface.stroke_polyline(&[Point::new(5.0, 5.0)], Color::BLACK, 4.0);
        surface.stroke_polyline(&[], Color::BLACK, 4.0);

        assert!(surface.to_rgba_image().pixels().all(|p| p.0[3] == 0));
    }

    #[test]
    fn text_marks_pixels_above_the_baseline() {
        let mut surface = surface(60.0, 40.0);
        surface.fill_text("OK", Point::new(5.0, 30.0), Color::BLACK, 20.0);

        assert_eq!(surface.pixel(8, 25).map(|c| c.a), Some(255));
        assert_eq!(surface.pixel(8, 35).map(|c| c.a), Some(0));
    }

    #[test]
    fn recording_surface_drops_history_on_reset() {
        let mut surface = RecordingSurface::default();
        surface.fill_disk(Point::new(1.0, 1.0), 1.0, Color::BLACK);
        surface.reset(SurfaceSize::new(10.0, 10.0)).unwrap();

        assert_eq!(surface.commands(), &[DrawCommand::Reset(SurfaceSize::new(10.0, 10.0))]);
    }
}
