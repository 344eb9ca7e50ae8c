//! Annotation session
//!
//! Owns the open document, the on-screen surface, the annotation store and
//! the capture state machine, and routes host events between them.
//!
//! Navigation is two-phase so hosts can rasterize off the event loop:
//! [`AnnotationSession::begin_navigation`] hands out a [`RenderTicket`] and
//! [`AnnotationSession::complete_render`] applies the result only if the
//! ticket is still the latest one. [`AnnotationSession::go_to_page`] runs both
//! phases synchronously.

use crate::capture::{CaptureState, LiveSegment, StrokeCapture};
use crate::compositor::{draw_text, repaint};
use crate::export::{export_document, ExportRequest, ExportedPdf};
use crate::surface::DrawSurface;
use crate::{InkError, InkResult};
use ink_model::{
    Annotation, AnnotationStore, Point, Preferences, TextAnnotation, ToolKind, ToolSettings,
};
use pdf_engine::{
    DocumentHandle, PdfAssembler, PdfEngine, PdfEngineError, RenderRequest, RgbaImage,
};

/// Identifies one requested page render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTicket {
    page: u32,
    generation: u64,
}

impl RenderTicket {
    pub fn page(&self) -> u32 {
        self.page
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// The surface now shows the ticket's page
    Applied,
    /// A newer navigation superseded the ticket; the result was dropped
    Stale,
}

#[derive(Debug, Clone)]
struct LoadedDocument {
    handle: DocumentHandle,
    file_name: String,
    page_count: u32,
}

#[derive(Debug, Clone)]
struct DisplayedPage {
    page: u32,
    background: RgbaImage,
}

pub struct AnnotationSession<E: PdfEngine, S: DrawSurface> {
    engine: E,
    surface: S,
    preferences: Preferences,
    tool: ToolSettings,
    document: Option<LoadedDocument>,
    store: AnnotationStore,
    capture: StrokeCapture,
    current_page: u32,
    displayed: Option<DisplayedPage>,
    generation: u64,
}

impl<E: PdfEngine, S: DrawSurface> AnnotationSession<E, S> {
    pub fn new(engine: E, surface: S, preferences: Preferences) -> Self {
        Self {
            engine,
            surface,
            tool: preferences.tool,
            preferences,
            document: None,
            store: AnnotationStore::new(),
            capture: StrokeCapture::new(),
            current_page: 1,
            displayed: None,
            generation: 0,
        }
    }

    /// Replace the open document with `bytes`.
    ///
    /// On a decode failure the previous document, its annotations and the
    /// surface are left untouched. On success all annotations are discarded
    /// and page 1 is shown; a failed first render is logged, not returned.
    pub fn load(&mut self, file_name: impl Into<String>, bytes: Vec<u8>) -> InkResult<u32> {
        let file_name = file_name.into();
        let handle = self.engine.open(bytes.into()).map_err(InkError::Decode)?;
        let page_count = match self.engine.page_count(handle) {
            Ok(count) => count,
            Err(err) => {
                let _ = self.engine.close(handle);
                return Err(InkError::Decode(err));
            }
        };

        if let Some(previous) = self.document.take() {
            if let Err(err) = self.engine.close(previous.handle) {
                log::warn!("failed to close {}: {err}", previous.file_name);
            }
        }

        log::info!("loaded {file_name} ({page_count} pages)");
        self.document = Some(LoadedDocument { handle, file_name, page_count });
        self.store = AnnotationStore::new();
        self.capture.reset();
        self.current_page = 1;
        self.displayed = None;
        self.generation += 1;

        if let Err(err) = self.go_to_page(1) {
            log::error!("{err}");
        }

        Ok(page_count)
    }

    /// Start navigating to `page`. Any gesture in progress is committed to the
    /// page it was drawn on before the current page changes.
    pub fn begin_navigation(&mut self, page: u32) -> InkResult<RenderTicket> {
        let page_count = self.document()?.page_count;
        if !(1..=page_count).contains(&page) {
            let err = InkError::Render {
                page,
                source: PdfEngineError::PageOutOfRange { page, page_count },
            };
            log::error!("{err}");
            return Err(err);
        }

        self.commit_gesture();
        self.current_page = page;
        self.generation += 1;
        log::debug!("navigating to page {page} (generation {})", self.generation);

        Ok(RenderTicket { page, generation: self.generation })
    }

    /// Rasterize the ticket's page at the display scale
    pub fn render(&self, ticket: RenderTicket) -> InkResult<RgbaImage> {
        let document = self.document()?;
        self.engine
            .render_page(
                document.handle,
                RenderRequest { page_number: ticket.page, scale: self.preferences.display_scale },
            )
            .map_err(|source| InkError::Render { page: ticket.page, source })
    }

    /// Apply a finished render.
    ///
    /// Results for superseded tickets are dropped. A failed render keeps the
    /// previously displayed page on screen and current.
    pub fn complete_render(
        &mut self,
        ticket: RenderTicket,
        result: InkResult<RgbaImage>,
    ) -> InkResult<RenderOutcome> {
        if ticket.generation != self.generation || ticket.page != self.current_page {
            log::debug!(
                "dropping stale render of page {} (generation {} < {})",
                ticket.page,
                ticket.generation,
                self.generation
            );
            return Ok(RenderOutcome::Stale);
        }

        let background = match result {
            Ok(background) => background,
            Err(err) => {
                log::error!("{err}");
                if let Some(displayed) = &self.displayed {
                    self.current_page = displayed.page;
                }
                return Err(err);
            }
        };

        repaint(
            &mut self.surface,
            &background,
            &self.store,
            ticket.page,
            self.preferences.export.replay_order,
        )?;
        self.displayed = Some(DisplayedPage { page: ticket.page, background });

        Ok(RenderOutcome::Applied)
    }

    pub fn go_to_page(&mut self, page: u32) -> InkResult<()> {
        let ticket = self.begin_navigation(page)?;
        let result = self.render(ticket);
        self.complete_render(ticket, result)?;
        Ok(())
    }

    /// Returns `false` without navigating when already on the last page.
    pub fn next_page(&mut self) -> InkResult<bool> {
        if self.current_page >= self.document()?.page_count {
            return Ok(false);
        }
        self.go_to_page(self.current_page + 1)?;
        Ok(true)
    }

    /// Returns `false` without navigating when already on the first page.
    pub fn previous_page(&mut self) -> InkResult<bool> {
        self.document()?;
        if self.current_page <= 1 {
            return Ok(false);
        }
        self.go_to_page(self.current_page - 1)?;
        Ok(true)
    }

    /// Pointer input only lands on a page that is actually on screen.
    fn accepts_input(&self) -> bool {
        self.displayed.as_ref().is_some_and(|displayed| displayed.page == self.current_page)
    }

    pub fn pointer_down(&mut self, point: Point) -> InkResult<()> {
        if !self.accepts_input() {
            log::warn!("ignoring pointer down while page {} is not displayed", self.current_page);
            return Ok(());
        }

        if let Some(previous) = self.capture.pointer_down(point, self.tool)? {
            self.store.add_stroke(self.current_page, previous);
        }
        Ok(())
    }

    /// Extend the running stroke and draw the new ink live
    pub fn pointer_move(&mut self, point: Point) -> Option<LiveSegment> {
        if !self.accepts_input() {
            return None;
        }

        let segment = self.capture.pointer_move(point)?;
        match segment.kind {
            ToolKind::Pen => {
                self.surface.stroke_polyline(&segment.points, segment.color, segment.width)
            }
            ToolKind::Eraser => self.surface.erase_polyline(&segment.points, segment.width),
        }
        Some(segment)
    }

    /// Returns whether a stroke was committed
    pub fn pointer_up(&mut self) -> bool {
        self.commit_gesture()
    }

    pub fn pointer_leave(&mut self) -> bool {
        self.commit_gesture()
    }

    fn commit_gesture(&mut self) -> bool {
        let Some(stroke) = self.capture.pointer_up() else {
            return false;
        };

        let page = self.current_page;
        log::debug!("committed {}-point stroke on page {page}", stroke.points().len());
        self.store.add_stroke(page, stroke);
        true
    }

    /// Place a label with the current tool. Returns `false` when the current
    /// page is not displayed yet.
    pub fn place_text(&mut self, anchor: Point, text: &str) -> InkResult<bool> {
        self.document()?;
        if !self.accepts_input() {
            log::warn!("ignoring text while page {} is not displayed", self.current_page);
            return Ok(false);
        }

        let label = TextAnnotation::with_tool(text, anchor, &self.tool)?;
        draw_text(&mut self.surface, &label);
        self.store.add_text(self.current_page, label);
        Ok(true)
    }

    /// Remove the last annotation committed on the current page and repaint.
    /// A gesture in progress is committed first, so it is what gets removed.
    pub fn undo(&mut self) -> InkResult<Option<Annotation>> {
        self.commit_gesture();

        let Some(removed) = self.store.undo(self.current_page) else {
            return Ok(None);
        };

        if let Some(displayed) = self.displayed.as_ref().filter(|d| d.page == self.current_page) {
            repaint(
                &mut self.surface,
                &displayed.background,
                &self.store,
                displayed.page,
                self.preferences.export.replay_order,
            )?;
        }

        Ok(Some(removed))
    }

    /// Tool used by gestures and labels started from now on
    pub fn set_tool(&mut self, tool: ToolSettings) -> InkResult<()> {
        tool.validate()?;
        self.tool = tool;
        Ok(())
    }

    /// Export every page with its annotations. A gesture in progress is
    /// committed first.
    pub fn export<A: PdfAssembler + ?Sized>(
        &mut self,
        assembler: &mut A,
    ) -> InkResult<ExportedPdf> {
        self.commit_gesture();

        let document = self.document()?;
        let request = ExportRequest::new(
            document.file_name.clone(),
            self.preferences.display_scale,
            self.preferences.export,
        );
        export_document(&self.engine, document.handle, &self.store, &request, assembler)
    }

    fn document(&self) -> InkResult<&LoadedDocument> {
        self.document.as_ref().ok_or(InkError::NoDocument)
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn displayed_page(&self) -> Option<u32> {
        self.displayed.as_ref().map(|displayed| displayed.page)
    }

    pub fn page_count(&self) -> Option<u32> {
        self.document.as_ref().map(|document| document.page_count)
    }

    pub fn file_name(&self) -> Option<&str> {
        self.document.as_ref().map(|document| document.file_name.as_str())
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn capture_state(&self) -> &CaptureState {
        self.capture.state()
    }

    pub fn tool(&self) -> &ToolSettings {
        &self.tool
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}
