use image::{ImageBuffer, Rgba};
use lopdf::{Document, ObjectId};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub mod assembly;
mod raster;

pub use assembly::{EncodedImage, LopdfAssembler, PdfAssembler};
#[cfg(feature = "pdfium")]
pub use pdfium_backend::PdfiumEngine;

use raster::MediaBox;

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Native page size in PDF points (viewport at scale 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageSize {
    pub fn viewport(self, scale: f32) -> Viewport {
        let scale = sanitize_scale(scale);
        Viewport { width: self.width_pt * scale, height: self.height_pt * scale }
    }
}

/// Page dimensions in pixels at a given render scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn to_pixels(self) -> (u32, u32) {
        (self.width.round().max(1.0) as u32, self.height.round().max(1.0) as u32)
    }
}

/// Page numbers are 1-based.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_number: u32,
    pub scale: f32,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self { page_number: 1, scale: 1.0 }
    }
}

#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("encrypted PDFs are not supported in the default backend")]
    EncryptedUnsupported,
    #[error("backend error: {0}")]
    Backend(String),
    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("PDF assembly failed: {0}")]
    Assembly(String),
}

/// Document source and page rasterizer.
pub trait PdfEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError>;
    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError>;
    fn page_size(
        &self,
        handle: DocumentHandle,
        page_number: u32,
    ) -> Result<PageSize, PdfEngineError>;
    /// Rasterize one page. The image is sized to the page viewport at `request.scale`.
    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RgbaImage, PdfEngineError>;
    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError>;

    fn viewport(
        &self,
        handle: DocumentHandle,
        page_number: u32,
        scale: f32,
    ) -> Result<Viewport, PdfEngineError> {
        Ok(self.page_size(handle, page_number)?.viewport(scale))
    }
}

#[derive(Debug, Clone)]
struct DocumentRecord {
    bytes: Vec<u8>,
    document: Document,
    pages: Vec<PageRecord>,
}

#[derive(Debug, Clone, Copy)]
struct PageRecord {
    id: ObjectId,
    media_box: MediaBox,
}

impl PageRecord {
    fn size(&self) -> PageSize {
        PageSize { width_pt: self.media_box.width, height_pt: self.media_box.height }
    }
}

/// Pure-Rust backend. Page geometry comes from each page's MediaBox and page
/// content is rasterized by [`raster`] (paths, colors, boxed text).
#[derive(Debug, Default)]
pub struct LopdfEngine {
    next_handle: u64,
    docs: HashMap<DocumentHandle, DocumentRecord>,
}

const LETTER: MediaBox = MediaBox { x0: 0.0, y0: 0.0, width: 612.0, height: 792.0 };

impl LopdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse(bytes: &[u8]) -> Result<(Document, Vec<PageRecord>), PdfEngineError> {
        let doc = Document::load_mem(bytes)?;
        if doc.trailer.get(b"Encrypt").is_ok() {
            return Err(PdfEngineError::EncryptedUnsupported);
        }

        let pages: Vec<PageRecord> = doc
            .get_pages()
            .into_values()
            .map(|id| PageRecord { id, media_box: media_box(&doc, id).unwrap_or(LETTER) })
            .collect();

        if pages.is_empty() {
            return Err(PdfEngineError::Backend("document has no pages".to_owned()));
        }

        Ok((doc, pages))
    }

    fn record(&self, handle: DocumentHandle) -> Result<&DocumentRecord, PdfEngineError> {
        self.docs.get(&handle).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }

    fn page(&self, handle: DocumentHandle, page_number: u32) -> Result<PageRecord, PdfEngineError> {
        let record = self.record(handle)?;
        let out_of_range = || PdfEngineError::PageOutOfRange {
            page: page_number,
            page_count: record.pages.len() as u32,
        };

        let index = page_number.checked_sub(1).ok_or_else(out_of_range)?;
        record.pages.get(index as usize).copied().ok_or_else(out_of_range)
    }

    /// Raw bytes the document was opened from
    pub fn bytes(&self, handle: DocumentHandle) -> Result<&[u8], PdfEngineError> {
        Ok(&self.record(handle)?.bytes)
    }
}

/// MediaBox of `page_id`, inherited from the page tree when the page has none
fn media_box(doc: &Document, page_id: ObjectId) -> Option<MediaBox> {
    let mut node = doc.get_dictionary(page_id).ok()?;

    // page trees are shallow; the bound guards against Parent cycles
    for _ in 0..32 {
        if let Ok(array) = node.get(b"MediaBox").and_then(|obj| obj.as_array()) {
            let [x0, y0, x1, y1] = array.as_slice() else {
                return None;
            };
            let (x0, y0) = (x0.as_float().ok()?, y0.as_float().ok()?);
            let (x1, y1) = (x1.as_float().ok()?, y1.as_float().ok()?);
            return Some(MediaBox {
                x0: x0.min(x1),
                y0: y0.min(y1),
                width: (x1 - x0).abs(),
                height: (y1 - y0).abs(),
            });
        }

        let parent = node.get(b"Parent").and_then(|obj| obj.as_reference()).ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }

    None
}

impl PdfEngine for LopdfEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
        let bytes = match source {
            OpenSource::Path(path) => fs::read(path)?,
            OpenSource::Bytes(bytes) => bytes,
        };

        let (document, pages) = Self::parse(&bytes)?;

        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        log::debug!("opened document {} with {} pages", handle.raw(), pages.len());
        self.docs.insert(handle, DocumentRecord { bytes, document, pages });

        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        Ok(self.record(handle)?.pages.len() as u32)
    }

    fn page_size(
        &self,
        handle: DocumentHandle,
        page_number: u32,
    ) -> Result<PageSize, PdfEngineError> {
        Ok(self.page(handle, page_number)?.size())
    }

    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RgbaImage, PdfEngineError> {
        let page = self.page(handle, request.page_number)?;
        let (width, height) = page.size().viewport(request.scale).to_pixels();

        raster::render_page(&self.record(handle)?.document, page.id, page.media_box, width, height)
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        self.docs.remove(&handle).map(|_| ()).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

impl<T: PdfEngine + ?Sized> PdfEngine for Box<T> {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
        (**self).open(source)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        (**self).page_count(handle)
    }

    fn page_size(
        &self,
        handle: DocumentHandle,
        page_number: u32,
    ) -> Result<PageSize, PdfEngineError> {
        (**self).page_size(handle, page_number)
    }

    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RgbaImage, PdfEngineError> {
        (**self).render_page(handle, request)
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        (**self).close(handle)
    }
}

#[cfg(feature = "pdfium")]
pub mod pdfium_backend {
    use super::*;
    use pdfium_render::prelude::*;

    /// Renders real page content through Pdfium. Page geometry and handles are
    /// shared with [`LopdfEngine`] so both backends agree on viewport sizes.
    pub struct PdfiumEngine {
        pdfium: Pdfium,
        inner: LopdfEngine,
    }

    impl PdfiumEngine {
        pub fn from_system_library() -> Result<Self, PdfEngineError> {
            let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "./",
            ))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|err| {
                PdfEngineError::Backend(format!("failed to bind pdfium system library: {err}"))
            })?;

            Ok(Self { pdfium: Pdfium::new(bindings), inner: LopdfEngine::default() })
        }
    }

    fn backend(err: PdfiumError) -> PdfEngineError {
        PdfEngineError::Backend(err.to_string())
    }

    impl PdfEngine for PdfiumEngine {
        fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
            self.inner.open(source)
        }

        fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
            self.inner.page_count(handle)
        }

        fn page_size(
            &self,
            handle: DocumentHandle,
            page_number: u32,
        ) -> Result<PageSize, PdfEngineError> {
            self.inner.page_size(handle, page_number)
        }

        fn render_page(
            &self,
            handle: DocumentHandle,
            request: RenderRequest,
        ) -> Result<RgbaImage, PdfEngineError> {
            let (width, height) =
                self.inner.viewport(handle, request.page_number, request.scale)?.to_pixels();

            let document = self
                .pdfium
                .load_pdf_from_byte_slice(self.inner.bytes(handle)?, None)
                .map_err(backend)?;
            let page =
                document.pages().get((request.page_number - 1) as u16).map_err(backend)?;

            let config = PdfRenderConfig::new()
                .set_target_width(width as i32)
                .set_target_height(height as i32);
            let bitmap = page.render_with_config(&config).map_err(backend)?;

            let (width, height) = (bitmap.width() as u32, bitmap.height() as u32);
            RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes())
                .ok_or_else(|| PdfEngineError::Backend("bitmap size mismatch".to_owned()))
        }

        fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
            self.inner.close(handle)
        }
    }
}

/// Pdfium when the `pdfium` feature is enabled and the library binds,
/// otherwise the lopdf rasterizer.
pub fn default_engine() -> Box<dyn PdfEngine> {
    #[cfg(feature = "pdfium")]
    {
        match PdfiumEngine::from_system_library() {
            Ok(engine) => return Box::new(engine),
            Err(err) => log::warn!("{err}; falling back to the lopdf rasterizer"),
        }
    }

    Box::new(LopdfEngine::new())
}

fn sanitize_scale(scale: f32) -> f32 {
    if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pdf_bytes() -> &'static [u8] {
        include_bytes!("../../../tests/fixtures/small.pdf")
    }

    fn two_page_pdf_bytes() -> &'static [u8] {
        include_bytes!("../../../tests/fixtures/two-page.pdf")
    }

    #[test]
    fn opens_pdf_and_reads_page_count() {
        let mut engine = LopdfEngine::new();
        let handle = engine
            .open(OpenSource::Bytes(sample_pdf_bytes().to_vec()))
            .expect("open should succeed");

        assert_eq!(engine.page_count(handle).expect("count should succeed"), 1);
    }

    #[test]
    fn page_sizes_come_from_each_media_box() {
        let mut engine = LopdfEngine::new();
        let handle = engine
            .open(OpenSource::Bytes(two_page_pdf_bytes().to_vec()))
            .expect("open should succeed");

        assert_eq!(
            engine.page_size(handle, 1).expect("page 1"),
            PageSize { width_pt: 612.0, height_pt: 792.0 }
        );
        assert_eq!(
            engine.page_size(handle, 2).expect("page 2"),
            PageSize { width_pt: 595.0, height_pt: 842.0 }
        );
    }

    #[test]
    fn render_sizes_image_to_scaled_viewport() {
        let mut engine = LopdfEngine::new();
        let handle = engine
            .open(OpenSource::Bytes(sample_pdf_bytes().to_vec()))
            .expect("open should succeed");

        let image = engine
            .render_page(handle, RenderRequest { page_number: 1, scale: 1.5 })
            .expect("render should succeed");

        assert_eq!((image.width(), image.height()), (918, 1188));
    }

    #[test]
    fn page_numbers_outside_document_are_rejected() {
        let mut engine = LopdfEngine::new();
        let handle = engine
            .open(OpenSource::Bytes(sample_pdf_bytes().to_vec()))
            .expect("open should succeed");

        for page in [0, 2] {
            let err = engine
                .render_page(handle, RenderRequest { page_number: page, scale: 1.0 })
                .expect_err("out of range page should fail");
            assert!(matches!(err, PdfEngineError::PageOutOfRange { page_count: 1, .. }));
        }
    }

    #[test]
    fn malformed_bytes_fail_to_open() {
        let mut engine = LopdfEngine::new();
        let err = engine
            .open(OpenSource::Bytes(b"this is not a pdf".to_vec()))
            .expect_err("garbage should not parse");

        assert!(matches!(err, PdfEngineError::Parse(_)));
    }

    #[test]
    fn invalid_handle_returns_error() {
        let engine = LopdfEngine::new();
        let err =
            engine.page_count(DocumentHandle(999)).expect_err("should fail for unknown handle");

        assert!(matches!(err, PdfEngineError::InvalidHandle(999)));
    }

    fn darkest_in(image: &RgbaImage, xs: std::ops::Range<u32>, ys: std::ops::Range<u32>) -> u8 {
        ys.flat_map(|y| xs.clone().map(move |x| image.get_pixel(x, y).0[0])).min().unwrap_or(255)
    }

    /// One-page document whose only content is `content`
    fn single_page_pdf(content: &[u8]) -> Vec<u8> {
        use lopdf::{dictionary, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1_i64,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(300),
                    Object::Integer(400),
                ],
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("document should serialize");
        bytes
    }

    #[test]
    fn render_draws_page_content() {
        let mut engine = LopdfEngine::new();
        let handle = engine.open(sample_pdf_bytes().to_vec().into()).expect("open should succeed");

        let image = engine.render_page(handle, RenderRequest::default()).expect("render");

        // "Page one" sits on the baseline at y = 692pt, i.e. pixel row 100
        assert!(darkest_in(&image, 72..180, 80..100) < 128, "page text should be visible");
        assert_eq!(darkest_in(&image, 300..400, 300..400), 255);
    }

    #[test]
    fn trailer_encryption_is_rejected() {
        let mut engine = LopdfEngine::new();
        let err = engine
            .open(include_bytes!("../../../tests/fixtures/encrypted.pdf").to_vec().into())
            .expect_err("encrypted documents are not supported");

        assert!(matches!(err, PdfEngineError::EncryptedUnsupported));
    }

    #[test]
    fn encrypt_literal_in_content_is_not_encryption() {
        let bytes = single_page_pdf(b"BT /F1 12 Tf 10 10 Td (see /Encrypt docs) Tj ET");
        let mut engine = LopdfEngine::new();

        let handle = engine.open(bytes.into()).expect("plain document should open");
        assert_eq!(engine.page_count(handle).unwrap(), 1);
    }

    #[test]
    fn media_box_is_inherited_from_the_page_tree() {
        let mut engine = LopdfEngine::new();
        let handle = engine.open(single_page_pdf(b"").into()).expect("open should succeed");

        assert_eq!(
            engine.page_size(handle, 1).unwrap(),
            PageSize { width_pt: 300.0, height_pt: 400.0 }
        );
    }

    #[test]
    fn boxed_engines_delegate() {
        let mut engine: Box<dyn PdfEngine> = Box::new(LopdfEngine::new());
        let handle = engine.open(two_page_pdf_bytes().to_vec().into()).unwrap();

        assert_eq!(engine.page_count(handle).unwrap(), 2);
        engine.close(handle).unwrap();
        assert!(matches!(engine.page_count(handle), Err(PdfEngineError::InvalidHandle(_))));
    }

    #[test]
    fn default_engine_renders_page_content() {
        let mut engine = default_engine();
        let handle = engine.open(sample_pdf_bytes().to_vec().into()).unwrap();

        let image = engine.render_page(handle, RenderRequest::default()).unwrap();
        assert!(darkest_in(&image, 72..180, 80..100) < 128);
    }

    #[cfg(feature = "pdfium")]
    #[test]
    fn pdfium_renders_page_text() {
        let Ok(mut engine) = PdfiumEngine::from_system_library() else {
            eprintln!("pdfium library not found, skipping");
            return;
        };
        let handle = engine.open(sample_pdf_bytes().to_vec().into()).unwrap();

        let image = engine.render_page(handle, RenderRequest::default()).unwrap();
        assert_eq!((image.width(), image.height()), (612, 792));
        assert!(darkest_in(&image, 72..180, 80..100) < 128);
    }

    #[test]
    fn non_positive_scale_falls_back_to_native_size() {
        let size = PageSize { width_pt: 100.0, height_pt: 50.0 };
        assert_eq!(size.viewport(0.0), Viewport { width: 100.0, height: 50.0 });
        assert_eq!(size.viewport(2.0).to_pixels(), (200, 100));
    }
}
