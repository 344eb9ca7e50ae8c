//! Export pipeline
//!
//! Pages are exported one at a time, in order. Each page is rasterized into
//! its own buffer, embedded as a JPEG background covering the native page
//! (points, viewport at scale 1.0), then the page's annotations are stamped
//! on top: one filled disk per stroke sample and one text run per label.
//! Samples covered by a later eraser stroke are not stamped; labels are
//! never erased in the export.
//! Any render or encode failure aborts the whole export before `save`.

use crate::mapper::CoordinateMapper;
use crate::{InkError, InkResult};
use image::Rgba;
use ink_model::{
    Annotation, AnnotationStore, Color, ExportConfig, PageAnnotations, Point, ReplayOrder, Stroke,
    SurfaceSize, TextAnnotation,
};
use pdf_engine::{
    DocumentHandle, EncodedImage, PageSize, PdfAssembler, PdfEngine, PdfEngineError,
    RenderRequest,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    /// Output name; the input file name, unmodified
    pub file_name: String,
    /// Scale the annotations were captured at
    pub display_scale: f32,
    pub config: ExportConfig,
}

impl ExportRequest {
    pub fn new(file_name: impl Into<String>, display_scale: f32, config: ExportConfig) -> Self {
        Self { file_name: file_name.into(), display_scale, config }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportedPdf {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub page_count: u32,
}

pub fn export_document<E, A>(
    engine: &E,
    handle: DocumentHandle,
    store: &AnnotationStore,
    request: &ExportRequest,
    assembler: &mut A,
) -> InkResult<ExportedPdf>
where
    E: PdfEngine + ?Sized,
    A: PdfAssembler + ?Sized,
{
    let page_count = engine.page_count(handle).map_err(InkError::Decode)?;
    if page_count == 0 {
        return Err(InkError::Encode(PdfEngineError::Assembly("document has no pages".to_owned())));
    }

    for page in 1..=page_count {
        let size =
            engine.page_size(handle, page).map_err(|source| InkError::Render { page, source })?;
        if page == 1 {
            assembler.new_document(size);
        } else {
            assembler.add_page(size);
        }

        export_page(engine, handle, store, request, assembler, page, size)?;
    }

    let bytes = assembler.save().map_err(InkError::Encode)?;
    log::info!(
        "exported {} ({page_count} pages, {} annotations, {} bytes)",
        request.file_name,
        store.total_annotations(),
        bytes.len()
    );

    Ok(ExportedPdf { file_name: request.file_name.clone(), bytes, page_count })
}

fn export_page<E, A>(
    engine: &E,
    handle: DocumentHandle,
    store: &AnnotationStore,
    request: &ExportRequest,
    assembler: &mut A,
    page: u32,
    size: PageSize,
) -> InkResult<()>
where
    E: PdfEngine + ?Sized,
    A: PdfAssembler + ?Sized,
{
    let config = &request.config;
    let raster = engine
        .render_page(handle, RenderRequest { page_number: page, scale: config.raster_scale })
        .map_err(|source| InkError::Render { page, source })?;
    let image = EncodedImage::from_rgba(&raster, config.jpeg_quality).map_err(InkError::Encode)?;

    let native = size.viewport(1.0);
    assembler
        .add_image(&image, 0.0, 0.0, native.width, native.height)
        .map_err(InkError::Encode)?;

    let Some(annotations) = store.get(page) else {
        log::debug!("page {page} exported without annotations");
        return Ok(());
    };

    // Points were captured on the rounded raster the display surface holds.
    let (display_width, display_height) = size.viewport(request.display_scale).to_pixels();
    let mapper = CoordinateMapper::new(
        SurfaceSize::new(display_width as f32, display_height as f32),
        SurfaceSize::new(native.width, native.height),
        config,
    );
    stamp_annotations(assembler, &mapper, annotations, config.replay_order);
    log::debug!("page {page} exported with {} annotations", annotations.len());

    Ok(())
}

fn stamp_annotations<A: PdfAssembler + ?Sized>(
    assembler: &mut A,
    mapper: &CoordinateMapper,
    annotations: &PageAnnotations,
    order: ReplayOrder,
) {
    let erasers = Erasers::of(annotations);
    match order {
        ReplayOrder::StrokesThenText => {
            for (index, annotation) in annotations.iter().enumerate() {
                if let Annotation::Stroke(stroke) = annotation {
                    stamp_stroke(assembler, mapper, stroke, |point| erasers.covers(index, point));
                }
            }
            for label in annotations.texts() {
                place_text(assembler, mapper, label);
            }
        }
        ReplayOrder::Committed => {
            for (index, annotation) in annotations.iter().enumerate() {
                match annotation {
                    Annotation::Stroke(stroke) => {
                        stamp_stroke(assembler, mapper, stroke, |point| {
                            erasers.covers(index, point)
                        })
                    }
                    Annotation::Text(label) => place_text(assembler, mapper, label),
                }
            }
        }
    }
}

/// Eraser strokes of one page with their position in the commit history.
struct Erasers<'a> {
    strokes: Vec<(usize, &'a Stroke)>,
}

impl<'a> Erasers<'a> {
    fn of(annotations: &'a PageAnnotations) -> Self {
        let strokes = annotations
            .iter()
            .enumerate()
            .filter_map(|(index, annotation)| match annotation {
                Annotation::Stroke(stroke) if stroke.is_eraser() => Some((index, stroke)),
                _ => None,
            })
            .collect();
        Self { strokes }
    }

    /// Whether an eraser committed after history entry `index` passes over
    /// `point`. One-point erasers clear nothing, as on screen.
    fn covers(&self, index: usize, point: Point) -> bool {
        self.strokes.iter().filter(|(at, _)| *at > index).any(|(_, eraser)| {
            let reach = eraser.width() / 2.0;
            eraser
                .points()
                .windows(2)
                .any(|pair| distance_to_segment(point, pair[0], pair[1]) <= reach)
        })
    }
}

fn distance_to_segment(point: Point, start: Point, end: Point) -> f32 {
    let (dx, dy) = (end.x - start.x, end.y - start.y);
    let length_squared = dx * dx + dy * dy;
    let t = if length_squared > 0.0 {
        (((point.x - start.x) * dx + (point.y - start.y) * dy) / length_squared).clamp(0.0, 1.0)
    } else {
        0.0
    };
    point.distance_to(&start.lerp(&end, t))
}

/// Disk-stamping: every sample that survives erasing becomes one filled
/// circle. Eraser strokes stamp nothing.
fn stamp_stroke<A, F>(assembler: &mut A, mapper: &CoordinateMapper, stroke: &Stroke, erased: F)
where
    A: PdfAssembler + ?Sized,
    F: Fn(Point) -> bool,
{
    if stroke.is_eraser() {
        return;
    }

    let mut samples = stroke.points().iter().copied().filter(|point| !erased(*point)).peekable();
    if samples.peek().is_none() {
        return;
    }

    let radius = mapper.disk_radius(stroke.width());
    assembler.set_fill_color(rgba(stroke.color()));
    for point in samples {
        let center = mapper.map_point(point);
        assembler.circle(center.x, center.y, radius);
    }
}

fn place_text<A: PdfAssembler + ?Sized>(
    assembler: &mut A,
    mapper: &CoordinateMapper,
    label: &TextAnnotation,
) {
    let anchor = mapper.map_point(label.anchor());
    assembler.set_text_color(rgba(label.color()));
    assembler.set_font_size(mapper.font_size(label));
    assembler.text(label.text(), anchor.x, anchor.y);
}

fn rgba(color: Color) -> Rgba<u8> {
    Rgba([color.r, color.g, color.b, color.a])
}
