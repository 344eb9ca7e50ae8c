//! Gesture scripts: recorded host input replayed against a session.
//!
//! A script is a JSON array of events, e.g.
//!
//! ```json
//! [
//!   { "event": "set_color", "color": "#ff0000" },
//!   { "event": "stroke", "points": [[10, 10], [40, 12], [80, 30]] },
//!   { "event": "text", "x": 50, "y": 60, "text": "OK" },
//!   { "event": "set_tool_kind", "kind": "eraser" },
//!   { "event": "stroke", "points": [[10, 10], [40, 12]] },
//!   { "event": "next_page" }
//! ]
//! ```

use anyhow::{Context, Result};
use ink_core::{AnnotationSession, DrawSurface};
use ink_model::{Color, Point, ToolKind, ToolSettings};
use pdf_engine::PdfEngine;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScriptEvent {
    PointerDown { x: f32, y: f32 },
    PointerMove { x: f32, y: f32 },
    PointerUp,
    PointerLeave,
    /// Press, move through every point, release
    Stroke { points: Vec<[f32; 2]> },
    Text { x: f32, y: f32, text: String },
    Undo,
    NextPage,
    PreviousPage,
    GoToPage { page: u32 },
    SetColor { color: Color },
    SetWidth { width: f32 },
    SetTextSize { size: f32 },
    /// Switch between pen and eraser
    SetToolKind { kind: ToolKind },
}

pub fn load_script(path: &Path) -> Result<Vec<ScriptEvent>> {
    let bytes = fs::read(path)
        .with_context(|| format!("failed to read gesture script {}", path.display()))?;
    parse_script(&bytes).with_context(|| format!("invalid gesture script {}", path.display()))
}

pub fn parse_script(bytes: &[u8]) -> Result<Vec<ScriptEvent>> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Apply every event in order. Stops at the first failing event.
pub fn replay<E, S>(session: &mut AnnotationSession<E, S>, events: &[ScriptEvent]) -> Result<()>
where
    E: PdfEngine,
    S: DrawSurface,
{
    for (index, event) in events.iter().enumerate() {
        apply(session, event)
            .with_context(|| format!("script event {index} ({event:?}) failed"))?;
    }
    Ok(())
}

fn apply<E, S>(session: &mut AnnotationSession<E, S>, event: &ScriptEvent) -> Result<()>
where
    E: PdfEngine,
    S: DrawSurface,
{
    match event {
        ScriptEvent::PointerDown { x, y } => session.pointer_down(Point::new(*x, *y))?,
        ScriptEvent::PointerMove { x, y } => {
            session.pointer_move(Point::new(*x, *y));
        }
        ScriptEvent::PointerUp => {
            session.pointer_up();
        }
        ScriptEvent::PointerLeave => {
            session.pointer_leave();
        }
        ScriptEvent::Stroke { points } => {
            let Some(([x, y], rest)) = points.split_first() else {
                anyhow::bail!("stroke needs at least one point");
            };
            session.pointer_down(Point::new(*x, *y))?;
            for [x, y] in rest {
                session.pointer_move(Point::new(*x, *y));
            }
            session.pointer_up();
        }
        ScriptEvent::Text { x, y, text } => {
            session.place_text(Point::new(*x, *y), text)?;
        }
        ScriptEvent::Undo => {
            session.undo()?;
        }
        ScriptEvent::NextPage => {
            session.next_page()?;
        }
        ScriptEvent::PreviousPage => {
            session.previous_page()?;
        }
        ScriptEvent::GoToPage { page } => session.go_to_page(*page)?,
        ScriptEvent::SetColor { color } => {
            session.set_tool(session.tool().with_color(*color))?;
        }
        ScriptEvent::SetWidth { width } => {
            session.set_tool(ToolSettings { width: *width, ..*session.tool() })?;
        }
        ScriptEvent::SetTextSize { size } => {
            session.set_tool(ToolSettings { text_size: *size, ..*session.tool() })?;
        }
        ScriptEvent::SetToolKind { kind } => {
            session.set_tool(session.tool().with_kind(*kind))?;
        }
    }

    Ok(())
}
