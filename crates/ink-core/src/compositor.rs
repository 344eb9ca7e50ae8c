//! Replay of committed annotations onto a [`DrawSurface`].

use crate::surface::{DrawSurface, SurfaceError};
use ink_model::{
    Annotation, AnnotationStore, PageAnnotations, ReplayOrder, Stroke, SurfaceSize, TextAnnotation,
};
use pdf_engine::RgbaImage;

/// Poly-line through the stroke's points, or the ink it clears for eraser
/// strokes. Strokes with fewer than two points leave the surface untouched.
pub fn draw_stroke<S: DrawSurface + ?Sized>(surface: &mut S, stroke: &Stroke) {
    if stroke.is_degenerate() {
        return;
    }
    if stroke.is_eraser() {
        surface.erase_polyline(stroke.points(), stroke.width());
    } else {
        surface.stroke_polyline(stroke.points(), stroke.color(), stroke.width());
    }
}

pub fn draw_text<S: DrawSurface + ?Sized>(surface: &mut S, label: &TextAnnotation) {
    surface.fill_text(label.text(), label.anchor(), label.color(), label.font_size());
}

fn draw_annotation<S: DrawSurface + ?Sized>(surface: &mut S, annotation: &Annotation) {
    match annotation {
        Annotation::Stroke(stroke) => draw_stroke(surface, stroke),
        Annotation::Text(label) => draw_text(surface, label),
    }
}

/// Replay one page's annotations. Returns how many were drawn.
pub fn render_annotations<S: DrawSurface + ?Sized>(
    surface: &mut S,
    annotations: &PageAnnotations,
    order: ReplayOrder,
) -> usize {
    match order {
        ReplayOrder::StrokesThenText => {
            for stroke in annotations.strokes() {
                draw_stroke(surface, stroke);
            }
            for label in annotations.texts() {
                draw_text(surface, label);
            }
        }
        ReplayOrder::Committed => {
            for annotation in annotations.iter() {
                draw_annotation(surface, annotation);
            }
        }
    }

    annotations.len()
}

/// Replay everything stored for `page`; unannotated pages draw nothing.
pub fn render_page_annotations<S: DrawSurface + ?Sized>(
    surface: &mut S,
    store: &AnnotationStore,
    page: u32,
    order: ReplayOrder,
) -> usize {
    store.get(page).map_or(0, |annotations| render_annotations(surface, annotations, order))
}

/// Full refresh: resize to the background, blit it and replay the page.
pub fn repaint<S: DrawSurface + ?Sized>(
    surface: &mut S,
    background: &RgbaImage,
    store: &AnnotationStore,
    page: u32,
    order: ReplayOrder,
) -> Result<usize, SurfaceError> {
    surface.reset(SurfaceSize::new(background.width() as f32, background.height() as f32))?;
    surface.draw_image(background);

    let drawn = render_page_annotations(surface, store, page, order);
    log::debug!("repainted page {page} with {drawn} annotations");
    Ok(drawn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{DrawCommand, PixmapSurface, RecordingSurface};
    use ink_model::{Color, Point};

    fn stroke(points: &[(f32, f32)]) -> Stroke {
        let points = points.iter().map(|&(x, y)| Point::new(x, y)).collect();
        Stroke::new(points, Color::BLACK, 3.0).unwrap()
    }

    fn label(text: &str) -> TextAnnotation {
        TextAnnotation::new(text, Point::new(5.0, 5.0), Color::RED, 14.0).unwrap()
    }

    fn kinds(surface: &RecordingSurface) -> Vec<&'static str> {
        surface
            .commands()
            .iter()
            .map(|command| match command {
                DrawCommand::Reset(_) => "reset",
                DrawCommand::Image { .. } => "image",
                DrawCommand::Polyline { .. } => "stroke",
                DrawCommand::Erase { .. } => "erase",
                DrawCommand::Disk { .. } => "disk",
                DrawCommand::Text { .. } => "text",
            })
            .collect()
    }

    #[test]
    fn degenerate_strokes_draw_nothing() {
        let mut surface = RecordingSurface::default();
        draw_stroke(&mut surface, &stroke(&[]));
        draw_stroke(&mut surface, &stroke(&[(1.0, 1.0)]));

        assert!(surface.commands().is_empty());
    }

    #[test]
    fn text_is_drawn_ten_units_larger_than_its_size() {
        let mut surface = RecordingSurface::default();
        draw_text(&mut surface, &label("OK"));

        let [DrawCommand::Text { font_size, text, .. }] = surface.commands() else {
            panic!("expected a single text command");
        };
        assert_eq!(text, "OK");
        assert_eq!(*font_size, 24.0);
    }

    #[test]
    fn strokes_replay_under_text_by_default() {
        let mut store = AnnotationStore::new();
        store.add_text(1, label("first"));
        store.add_stroke(1, stroke(&[(0.0, 0.0), (1.0, 0.0)]));
        store.add_stroke(1, stroke(&[(0.0, 2.0), (1.0, 2.0)]));

        let mut surface = RecordingSurface::default();
        let drawn =
            render_page_annotations(&mut surface, &store, 1, ReplayOrder::StrokesThenText);

        assert_eq!(drawn, 3);
        assert_eq!(kinds(&surface), vec!["stroke", "stroke", "text"]);
    }

    #[test]
    fn committed_order_interleaves_kinds() {
        let mut store = AnnotationStore::new();
        store.add_stroke(1, stroke(&[(0.0, 0.0), (1.0, 0.0)]));
        store.add_text(1, label("middle"));
        store.add_stroke(1, stroke(&[(0.0, 2.0), (1.0, 2.0)]));

        let mut surface = RecordingSurface::default();
        render_page_annotations(&mut surface, &store, 1, ReplayOrder::Committed);

        assert_eq!(kinds(&surface), vec!["stroke", "text", "stroke"]);
    }

    #[test]
    fn eraser_strokes_replay_in_stroke_order() {
        let mut store = AnnotationStore::new();
        store.add_stroke(1, stroke(&[(0.0, 0.0), (8.0, 0.0)]));
        let eraser = Stroke::eraser(vec![Point::new(0.0, 0.0), Point::new(4.0, 0.0)], 5.0);
        store.add_stroke(1, eraser.unwrap());
        store.add_text(1, label("kept"));

        let mut surface = RecordingSurface::default();
        render_page_annotations(&mut surface, &store, 1, ReplayOrder::StrokesThenText);

        assert_eq!(kinds(&surface), vec!["stroke", "erase", "text"]);
    }

    #[test]
    fn erased_ink_returns_after_undo() {
        let mut store = AnnotationStore::new();
        store.add_stroke(1, stroke(&[(2.0, 10.0), (18.0, 10.0)]));
        let eraser = Stroke::eraser(vec![Point::new(2.0, 10.0), Point::new(18.0, 10.0)], 5.0);
        store.add_stroke(1, eraser.unwrap());
        let background = RgbaImage::from_pixel(20, 20, image::Rgba([255, 255, 255, 255]));

        let mut surface = PixmapSurface::new(SurfaceSize::new(1.0, 1.0)).unwrap();
        repaint(&mut surface, &background, &store, 1, ReplayOrder::default()).unwrap();
        assert_eq!(surface.pixel(10, 10), Some(Color::WHITE));

        store.undo(1);
        repaint(&mut surface, &background, &store, 1, ReplayOrder::default()).unwrap();
        assert_eq!(surface.pixel(10, 10), Some(Color::BLACK));
    }

    #[test]
    fn unannotated_page_replays_nothing() {
        let store = AnnotationStore::new();
        let mut surface = RecordingSurface::default();

        assert_eq!(render_page_annotations(&mut surface, &store, 4, ReplayOrder::default()), 0);
        assert!(surface.commands().is_empty());
    }

    #[test]
    fn repaint_resizes_to_the_background_first() {
        let mut store = AnnotationStore::new();
        store.add_stroke(2, stroke(&[(0.0, 0.0), (4.0, 4.0)]));
        let background = RgbaImage::new(30, 40);

        let mut surface = RecordingSurface::default();
        repaint(&mut surface, &background, &store, 2, ReplayOrder::default()).unwrap();

        assert_eq!(surface.size(), SurfaceSize::new(30.0, 40.0));
        assert_eq!(kinds(&surface), vec!["reset", "image", "stroke"]);
    }
}
