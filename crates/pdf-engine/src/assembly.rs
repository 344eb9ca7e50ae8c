//! Output document assembly.
//!
//! [`PdfAssembler`] is the drawing vocabulary the export pipeline speaks:
//! full-page images, filled circles and single-line text. All coordinates are
//! in points with the origin at the top-left of the current page; backends
//! flip to PDF's bottom-left origin themselves. Colors keep their alpha:
//! translucent fills and text are painted through an `ExtGState` with a
//! matching `/ca`.

use crate::{PageSize, PdfEngineError, RgbaImage};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgba};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};

/// Control-point distance for approximating a quarter circle with a cubic Bézier
const KAPPA: f32 = 0.552_284_8;

/// A rasterized page encoded for embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub width: u32,
    pub height: u32,
    /// Baseline JPEG data, embedded as-is with `DCTDecode`
    pub jpeg: Vec<u8>,
}

impl EncodedImage {
    pub fn from_rgba(image: &RgbaImage, quality: u8) -> Result<Self, PdfEngineError> {
        let rgb = DynamicImage::ImageRgba8(image.clone()).into_rgb8();

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100)).encode_image(&rgb)?;

        Ok(Self { width: image.width(), height: image.height(), jpeg })
    }
}

pub trait PdfAssembler {
    /// Start a fresh output document whose first page has `first_page` size
    fn new_document(&mut self, first_page: PageSize);
    fn add_image(
        &mut self,
        image: &EncodedImage,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) -> Result<(), PdfEngineError>;
    fn set_fill_color(&mut self, color: Rgba<u8>);
    /// Filled circle in the current fill color
    fn circle(&mut self, x: f32, y: f32, radius: f32);
    fn set_text_color(&mut self, color: Rgba<u8>);
    fn set_font_size(&mut self, size: f32);
    /// Text whose baseline starts at `(x, y)`
    fn text(&mut self, text: &str, x: f32, y: f32);
    fn add_page(&mut self, size: PageSize);
    fn page_count(&self) -> usize;
    /// Serialize the document
    fn save(&mut self) -> Result<Vec<u8>, PdfEngineError>;
}

#[derive(Debug, Clone)]
struct PageDraft {
    size: PageSize,
    operations: Vec<Operation>,
    images: Vec<EncodedImage>,
    /// Distinct non-opaque alpha levels used on the page
    alphas: Vec<u8>,
}

impl PageDraft {
    fn new(size: PageSize) -> Self {
        Self { size, operations: Vec::new(), images: Vec::new(), alphas: Vec::new() }
    }

    fn flip_y(&self, y: f32) -> f32 {
        self.size.height_pt - y
    }

    /// `gs` selecting the graphics state for `alpha`; opaque colors need none
    fn alpha_operation(&mut self, alpha: u8) -> Option<Operation> {
        if alpha == u8::MAX {
            return None;
        }
        if !self.alphas.contains(&alpha) {
            self.alphas.push(alpha);
        }
        Some(Operation::new("gs", vec![Object::Name(alpha_state_name(alpha).into_bytes())]))
    }
}

/// Builds the output with lopdf: one JPEG XObject per page image, Bézier
/// circles for disks and the standard Helvetica font for text.
#[derive(Debug, Clone)]
pub struct LopdfAssembler {
    pages: Vec<PageDraft>,
    fill_color: Rgba<u8>,
    text_color: Rgba<u8>,
    font_size: f32,
}

impl Default for LopdfAssembler {
    fn default() -> Self {
        Self {
            pages: Vec::new(),
            fill_color: Rgba([0, 0, 0, 255]),
            text_color: Rgba([0, 0, 0, 255]),
            font_size: 16.0,
        }
    }
}

impl LopdfAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_page(&mut self) -> &mut PageDraft {
        if self.pages.is_empty() {
            self.pages.push(PageDraft::new(PageSize { width_pt: 612.0, height_pt: 792.0 }));
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn build(&self) -> Result<Document, PdfEngineError> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });

        let mut kids: Vec<Object> = Vec::with_capacity(self.pages.len());
        for draft in &self.pages {
            let mut xobjects = Dictionary::new();
            for (index, image) in draft.images.iter().enumerate() {
                let image_stream = Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => image.width as i64,
                        "Height" => image.height as i64,
                        "ColorSpace" => "DeviceRGB",
                        "BitsPerComponent" => 8_i64,
                        "Filter" => "DCTDecode",
                    },
                    image.jpeg.clone(),
                )
                .with_compression(false);
                let image_id = doc.add_object(image_stream);
                xobjects.set(image_name(index), image_id);
            }

            let content = Content { operations: draft.operations.clone() };
            let encoded =
                content.encode().map_err(|err| PdfEngineError::Assembly(err.to_string()))?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

            let mut resources = dictionary! {
                "Font" => dictionary! { "F1" => font_id },
                "XObject" => xobjects,
            };
            if !draft.alphas.is_empty() {
                let mut states = Dictionary::new();
                for &alpha in &draft.alphas {
                    let opacity = alpha as f32 / 255.0;
                    states.set(
                        alpha_state_name(alpha),
                        dictionary! { "Type" => "ExtGState", "ca" => opacity, "CA" => opacity },
                    );
                }
                resources.set("ExtGState", states);
            }

            let media_box: Vec<Object> = vec![
                Object::Integer(0),
                Object::Integer(0),
                draft.size.width_pt.into(),
                draft.size.height_pt.into(),
            ];
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => media_box,
                "Contents" => content_id,
                "Resources" => resources,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        Ok(doc)
    }
}

impl PdfAssembler for LopdfAssembler {
    fn new_document(&mut self, first_page: PageSize) {
        *self = Self::default();
        self.pages.push(PageDraft::new(first_page));
    }

    fn add_image(
        &mut self,
        image: &EncodedImage,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) -> Result<(), PdfEngineError> {
        if image.jpeg.is_empty() || image.width == 0 || image.height == 0 {
            return Err(PdfEngineError::Assembly("empty page image".to_owned()));
        }

        let page = self.current_page();
        let name = image_name(page.images.len());
        let bottom = page.flip_y(y + height);
        page.images.push(image.clone());

        page.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    width.into(),
                    Object::Integer(0),
                    Object::Integer(0),
                    height.into(),
                    x.into(),
                    bottom.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.into_bytes())]),
            Operation::new("Q", vec![]),
        ]);

        Ok(())
    }

    fn set_fill_color(&mut self, color: Rgba<u8>) {
        self.fill_color = color;
    }

    fn circle(&mut self, x: f32, y: f32, radius: f32) {
        let color = self.fill_color;
        let page = self.current_page();
        let cx = x;
        let cy = page.flip_y(y);
        let r = radius.max(0.0);
        let k = r * KAPPA;

        let mut operations = vec![Operation::new("q", vec![])];
        operations.extend(page.alpha_operation(color.0[3]));
        operations.push(rgb_operation("rg", color));
        operations.push(Operation::new("m", vec![(cx + r).into(), cy.into()]));
        for [x1, y1, x2, y2, x3, y3] in [
            [cx + r, cy + k, cx + k, cy + r, cx, cy + r],
            [cx - k, cy + r, cx - r, cy + k, cx - r, cy],
            [cx - r, cy - k, cx - k, cy - r, cx, cy - r],
            [cx + k, cy - r, cx + r, cy - k, cx + r, cy],
        ] {
            operations.push(Operation::new(
                "c",
                vec![x1.into(), y1.into(), x2.into(), y2.into(), x3.into(), y3.into()],
            ));
        }
        operations.push(Operation::new("f", vec![]));
        operations.push(Operation::new("Q", vec![]));

        page.operations.extend(operations);
    }

    fn set_text_color(&mut self, color: Rgba<u8>) {
        self.text_color = color;
    }

    fn set_font_size(&mut self, size: f32) {
        self.font_size = size;
    }

    fn text(&mut self, text: &str, x: f32, y: f32) {
        let color = self.text_color;
        let font_size = self.font_size;
        let page = self.current_page();
        let baseline = page.flip_y(y);
        let alpha = page.alpha_operation(color.0[3]);

        page.operations.push(Operation::new("q", vec![]));
        page.operations.extend(alpha);
        page.operations.extend([
            Operation::new("BT", vec![]),
            rgb_operation("rg", color),
            Operation::new("Tf", vec!["F1".into(), font_size.into()]),
            Operation::new("Td", vec![x.into(), baseline.into()]),
            Operation::new("Tj", vec![Object::string_literal(win_ansi_bytes(text))]),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ]);
    }

    fn add_page(&mut self, size: PageSize) {
        self.pages.push(PageDraft::new(size));
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn save(&mut self) -> Result<Vec<u8>, PdfEngineError> {
        let mut doc = self.build()?;
        doc.compress();

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).map_err(|err| PdfEngineError::Assembly(err.to_string()))?;
        Ok(bytes)
    }
}

fn image_name(index: usize) -> String {
    format!("Im{}", index + 1)
}

fn alpha_state_name(alpha: u8) -> String {
    format!("GSa{alpha}")
}

/// Color components only; alpha goes through [`PageDraft::alpha_operation`]
fn rgb_operation(operator: &str, color: Rgba<u8>) -> Operation {
    let [r, g, b, _] = color.0;
    Operation::new(
        operator,
        vec![
            (r as f32 / 255.0).into(),
            (g as f32 / 255.0).into(),
            (b as f32 / 255.0).into(),
        ],
    )
}

/// Helvetica is set with WinAnsiEncoding; characters outside Latin-1 become `?`.
fn win_ansi_bytes(text: &str) -> Vec<u8> {
    text.chars().map(|ch| u8::try_from(u32::from(ch)).unwrap_or(b'?')).collect()
}
