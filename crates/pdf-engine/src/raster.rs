//! Content-stream rasterizer for the lopdf backend.
//!
//! Executes the path, color, graphics-state and text operators of a page's
//! content stream onto a tiny-skia pixmap over a white page. Text is drawn as
//! glyph boxes placed with the text matrix, so labels keep their position and
//! extent without a font rasterizer. Images, shadings and clipping are not
//! drawn.

use crate::{PdfEngineError, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId};
use tiny_skia as sk;

/// Boxed glyph metrics as fractions of the font size
const GLYPH_ADVANCE: f32 = 0.6;
const GLYPH_WIDTH: f32 = 0.5;
const GLYPH_HEIGHT: f32 = 0.7;

/// Page geometry in PDF user space: MediaBox origin and extent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct MediaBox {
    pub x0: f32,
    pub y0: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy)]
struct GraphicsState {
    ctm: sk::Transform,
    fill: sk::Color,
    stroke: sk::Color,
    line_width: f32,
    line_cap: sk::LineCap,
    line_join: sk::LineJoin,
    miter_limit: f32,
    font_size: f32,
    leading: f32,
    char_space: f32,
    word_space: f32,
    horizontal_scaling: f32,
    rise: f32,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: sk::Transform::identity(),
            fill: sk::Color::BLACK,
            stroke: sk::Color::BLACK,
            line_width: 1.0,
            line_cap: sk::LineCap::Butt,
            line_join: sk::LineJoin::Miter,
            miter_limit: 10.0,
            font_size: 12.0,
            leading: 0.0,
            char_space: 0.0,
            word_space: 0.0,
            horizontal_scaling: 1.0,
            rise: 0.0,
        }
    }
}

struct Rasterizer {
    pixmap: sk::Pixmap,
    base: sk::Transform,
    state: GraphicsState,
    saved: Vec<GraphicsState>,
    path: sk::PathBuilder,
    text_matrix: sk::Transform,
    text_line_matrix: sk::Transform,
}

/// Render `page_id` into a `width` x `height` image.
pub(crate) fn render_page(
    doc: &Document,
    page_id: ObjectId,
    media_box: MediaBox,
    width: u32,
    height: u32,
) -> Result<RgbaImage, PdfEngineError> {
    let mut pixmap = sk::Pixmap::new(width, height).ok_or_else(|| {
        PdfEngineError::Backend(format!("cannot allocate a {width}x{height} page raster"))
    })?;
    pixmap.fill(sk::Color::WHITE);

    let sx = width as f32 / media_box.width.max(f32::EPSILON);
    let sy = height as f32 / media_box.height.max(f32::EPSILON);
    // PDF user space has its origin bottom-left with y up
    let base = sk::Transform::from_row(
        sx,
        0.0,
        0.0,
        -sy,
        -media_box.x0 * sx,
        height as f32 + media_box.y0 * sy,
    );

    let content = doc.get_page_content(page_id)?;
    let operations = Content::decode(&content)?.operations;

    let mut rasterizer = Rasterizer {
        pixmap,
        base,
        state: GraphicsState::default(),
        saved: Vec::new(),
        path: sk::PathBuilder::new(),
        text_matrix: sk::Transform::identity(),
        text_line_matrix: sk::Transform::identity(),
    };
    for operation in &operations {
        rasterizer.execute(operation);
    }

    Ok(to_rgba_image(&rasterizer.pixmap))
}

fn to_rgba_image(pixmap: &sk::Pixmap) -> RgbaImage {
    let mut data = Vec::with_capacity(pixmap.pixels().len() * 4);
    for pixel in pixmap.pixels() {
        let color = pixel.demultiply();
        data.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
    }

    RgbaImage::from_raw(pixmap.width(), pixmap.height(), data)
        .unwrap_or_else(|| RgbaImage::new(pixmap.width(), pixmap.height()))
}

fn numbers(operands: &[Object]) -> Vec<f32> {
    operands.iter().filter_map(|operand| operand.as_float().ok()).collect()
}

fn matrix(values: &[f32]) -> Option<sk::Transform> {
    let [a, b, c, d, e, f] = values else {
        return None;
    };
    Some(sk::Transform::from_row(*a, *b, *c, *d, *e, *f))
}

fn gray(level: f32) -> sk::Color {
    rgb(level, level, level)
}

fn rgb(r: f32, g: f32, b: f32) -> sk::Color {
    sk::Color::from_rgba(r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0), 1.0)
        .unwrap_or(sk::Color::BLACK)
}

fn cmyk(c: f32, m: f32, y: f32, k: f32) -> sk::Color {
    rgb((1.0 - c) * (1.0 - k), (1.0 - m) * (1.0 - k), (1.0 - y) * (1.0 - k))
}

/// Color from the operands of `sc`/`scn` style operators, by component count
fn color_from_components(values: &[f32]) -> Option<sk::Color> {
    match values {
        [level] => Some(gray(*level)),
        [r, g, b] => Some(rgb(*r, *g, *b)),
        [c, m, y, k] => Some(cmyk(*c, *m, *y, *k)),
        _ => None,
    }
}

fn line_cap(style: f32) -> sk::LineCap {
    match style as i64 {
        1 => sk::LineCap::Round,
        2 => sk::LineCap::Square,
        _ => sk::LineCap::Butt,
    }
}

fn line_join(style: f32) -> sk::LineJoin {
    match style as i64 {
        1 => sk::LineJoin::Round,
        2 => sk::LineJoin::Bevel,
        _ => sk::LineJoin::Miter,
    }
}

fn paint(color: sk::Color) -> sk::Paint<'static> {
    let mut paint = sk::Paint::default();
    paint.set_color(color);
    paint.anti_alias = true;
    paint
}

impl Rasterizer {
    fn device_transform(&self) -> sk::Transform {
        self.base.pre_concat(self.state.ctm)
    }

    fn execute(&mut self, operation: &Operation) {
        let values = numbers(&operation.operands);

        match (operation.operator.as_str(), values.as_slice()) {
            ("q", _) => self.saved.push(self.state),
            ("Q", _) => {
                if let Some(state) = self.saved.pop() {
                    self.state = state;
                }
            }
            ("cm", values) => {
                if let Some(m) = matrix(values) {
                    self.state.ctm = self.state.ctm.pre_concat(m);
                }
            }

            ("g", [level]) => self.state.fill = gray(*level),
            ("G", [level]) => self.state.stroke = gray(*level),
            ("rg", [r, g, b]) => self.state.fill = rgb(*r, *g, *b),
            ("RG", [r, g, b]) => self.state.stroke = rgb(*r, *g, *b),
            ("k", [c, m, y, k]) => self.state.fill = cmyk(*c, *m, *y, *k),
            ("K", [c, m, y, k]) => self.state.stroke = cmyk(*c, *m, *y, *k),
            ("sc" | "scn", values) => {
                if let Some(color) = color_from_components(values) {
                    self.state.fill = color;
                }
            }
            ("SC" | "SCN", values) => {
                if let Some(color) = color_from_components(values) {
                    self.state.stroke = color;
                }
            }

            ("w", [width]) => self.state.line_width = *width,
            ("J", [style]) => self.state.line_cap = line_cap(*style),
            ("j", [style]) => self.state.line_join = line_join(*style),
            ("M", [limit]) => self.state.miter_limit = *limit,

            ("m", [x, y]) => self.path.move_to(*x, *y),
            ("l", [x, y]) => self.path.line_to(*x, *y),
            ("c", [x1, y1, x2, y2, x3, y3]) => self.path.cubic_to(*x1, *y1, *x2, *y2, *x3, *y3),
            ("v", [x2, y2, x3, y3]) => {
                if let Some(last) = self.path.last_point() {
                    self.path.cubic_to(last.x, last.y, *x2, *y2, *x3, *y3);
                }
            }
            ("y", [x1, y1, x3, y3]) => self.path.cubic_to(*x1, *y1, *x3, *y3, *x3, *y3),
            ("re", [x, y, width, height]) => {
                let (left, right) = (x.min(x + width), x.max(x + width));
                let (bottom, top) = (y.min(y + height), y.max(y + height));
                if let Some(rect) = sk::Rect::from_ltrb(left, bottom, right, top) {
                    self.path.push_rect(rect);
                }
            }
            ("h", _) => self.path.close(),

            ("f" | "F", _) => self.paint_path(Some(sk::FillRule::Winding), false),
            ("f*", _) => self.paint_path(Some(sk::FillRule::EvenOdd), false),
            ("S", _) => self.paint_path(None, true),
            ("s", _) => {
                self.path.close();
                self.paint_path(None, true);
            }
            ("B", _) => self.paint_path(Some(sk::FillRule::Winding), true),
            ("B*", _) => self.paint_path(Some(sk::FillRule::EvenOdd), true),
            ("b", _) => {
                self.path.close();
                self.paint_path(Some(sk::FillRule::Winding), true);
            }
            ("b*", _) => {
                self.path.close();
                self.paint_path(Some(sk::FillRule::EvenOdd), true);
            }
            ("n", _) => self.path = sk::PathBuilder::new(),
            // clipping is not applied
            ("W" | "W*", _) => {}

            ("BT", _) => {
                self.text_matrix = sk::Transform::identity();
                self.text_line_matrix = sk::Transform::identity();
            }
            ("Tf", _) => {
                if let Some(size) = operation.operands.get(1).and_then(|o| o.as_float().ok()) {
                    self.state.font_size = size;
                }
            }
            ("Tc", [spacing]) => self.state.char_space = *spacing,
            ("Tw", [spacing]) => self.state.word_space = *spacing,
            ("Tz", [scale]) => self.state.horizontal_scaling = *scale / 100.0,
            ("TL", [leading]) => self.state.leading = *leading,
            ("Ts", [rise]) => self.state.rise = *rise,
            ("Td", [tx, ty]) => self.move_text_line(*tx, *ty),
            ("TD", [tx, ty]) => {
                self.state.leading = -ty;
                self.move_text_line(*tx, *ty);
            }
            ("Tm", values) => {
                if let Some(m) = matrix(values) {
                    self.text_matrix = m;
                    self.text_line_matrix = m;
                }
            }
            ("T*", _) => self.next_text_line(),
            ("Tj", _) => {
                if let Some(text) = operation.operands.first().and_then(|o| o.as_str().ok()) {
                    self.show_text(text);
                }
            }
            ("'", _) => {
                self.next_text_line();
                if let Some(text) = operation.operands.first().and_then(|o| o.as_str().ok()) {
                    self.show_text(text);
                }
            }
            ("\"", _) => {
                if let [word, chars, ..] = values.as_slice() {
                    self.state.word_space = *word;
                    self.state.char_space = *chars;
                }
                self.next_text_line();
                if let Some(text) = operation.operands.get(2).and_then(|o| o.as_str().ok()) {
                    self.show_text(text);
                }
            }
            ("TJ", _) => {
                if let Some(items) = operation.operands.first().and_then(|o| o.as_array().ok()) {
                    self.show_text_array(items);
                }
            }

            (operator, _) => log::trace!("skipping content operator {operator}"),
        }
    }

    fn paint_path(&mut self, fill: Option<sk::FillRule>, stroke: bool) {
        let builder = std::mem::replace(&mut self.path, sk::PathBuilder::new());
        let Some(path) = builder.finish() else {
            return;
        };
        let transform = self.device_transform();

        if let Some(rule) = fill {
            self.pixmap.fill_path(&path, &paint(self.state.fill), rule, transform, None);
        }

        if stroke {
            let style = sk::Stroke {
                // Zero-width lines are the thinnest line the device can draw
                width: self.state.line_width.max(0.0),
                line_cap: self.state.line_cap,
                line_join: self.state.line_join,
                miter_limit: self.state.miter_limit,
                ..Default::default()
            };
            self.pixmap.stroke_path(&path, &paint(self.state.stroke), &style, transform, None);
        }
    }

    fn move_text_line(&mut self, tx: f32, ty: f32) {
        self.text_line_matrix =
            self.text_line_matrix.pre_concat(sk::Transform::from_translate(tx, ty));
        self.text_matrix = self.text_line_matrix;
    }

    fn next_text_line(&mut self) {
        self.move_text_line(0.0, -self.state.leading);
    }

    fn show_text(&mut self, bytes: &[u8]) {
        let state = self.state;
        let glyph_space = sk::Transform::from_row(
            state.font_size * state.horizontal_scaling,
            0.0,
            0.0,
            state.font_size,
            0.0,
            state.rise,
        );
        let fill = paint(state.fill);

        for &byte in bytes {
            if !byte.is_ascii_whitespace() && !byte.is_ascii_control() {
                let transform =
                    self.device_transform().pre_concat(self.text_matrix).pre_concat(glyph_space);
                if let Some(rect) = sk::Rect::from_xywh(0.0, 0.0, GLYPH_WIDTH, GLYPH_HEIGHT) {
                    self.pixmap.fill_rect(rect, &fill, transform, None);
                }
            }

            let word_space = if byte == b' ' { state.word_space } else { 0.0 };
            let advance = (GLYPH_ADVANCE * state.font_size + state.char_space + word_space)
                * state.horizontal_scaling;
            self.text_matrix =
                self.text_matrix.pre_concat(sk::Transform::from_translate(advance, 0.0));
        }
    }

    fn show_text_array(&mut self, items: &[Object]) {
        for item in items {
            match item {
                Object::String(bytes, _) => self.show_text(bytes),
                other => {
                    if let Ok(adjustment) = other.as_float() {
                        let shift = -adjustment / 1000.0
                            * self.state.font_size
                            * self.state.horizontal_scaling;
                        self.text_matrix =
                            self.text_matrix.pre_concat(sk::Transform::from_translate(shift, 0.0));
                    }
                }
            }
        }
    }
}
