//! Freehand stroke capture
//!
//! Turns a pointer drag into a densely sampled, immutable [`Stroke`].
//!
//! Moves closer than [`DECIMATION_THRESHOLD`] to the last sample are dropped.
//! Longer moves are subdivided so consecutive points are about one pixel
//! apart along the straight line between the last sample and the pointer.
//! The export stamps one disk per point, so this density is what makes the
//! exported ink look continuous.

use ink_model::{Color, ModelError, Point, Stroke, ToolKind, ToolSettings};

/// Minimum distance in surface pixels between recorded samples
pub const DECIMATION_THRESHOLD: f32 = 2.0;

/// Capture state. `Committing` is not represented: it happens inside a single
/// call and always ends in [`CaptureState::Idle`].
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureState {
    Idle,
    Dragging(Gesture),
}

/// An in-progress drag.
#[derive(Debug, Clone, PartialEq)]
pub struct Gesture {
    /// Raw pointer position of the last accepted move (or the press)
    last_sample: Point,
    points: Vec<Point>,
    tool: ToolSettings,
}

impl Gesture {
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn tool(&self) -> &ToolSettings {
        &self.tool
    }
}

/// Newly emitted ink to draw on the live surface.
///
/// `points[0]` is the last point that was already on screen, so drawing the
/// whole slice as a poly-line extends the visible stroke without gaps.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSegment {
    pub points: Vec<Point>,
    pub color: Color,
    pub width: f32,
    /// Eraser segments clear ink instead of painting `color`
    pub kind: ToolKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrokeCapture {
    state: CaptureState,
}

impl Default for StrokeCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl StrokeCapture {
    pub fn new() -> Self {
        Self { state: CaptureState::Idle }
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, CaptureState::Dragging(_))
    }

    /// Start a gesture with a snapshot of the current tool.
    ///
    /// A press that arrives mid-drag first commits the running gesture, which
    /// is returned so the caller can store it.
    pub fn pointer_down(
        &mut self,
        point: Point,
        tool: ToolSettings,
    ) -> Result<Option<Stroke>, ModelError> {
        tool.validate()?;

        let previous = self.commit();
        self.state =
            CaptureState::Dragging(Gesture { last_sample: point, points: vec![point], tool });

        Ok(previous)
    }

    /// Feed a pointer move. Returns `None` while idle or when the move is
    /// decimated.
    pub fn pointer_move(&mut self, point: Point) -> Option<LiveSegment> {
        let CaptureState::Dragging(gesture) = &mut self.state else {
            return None;
        };

        let distance = gesture.last_sample.distance_to(&point);
        if distance < DECIMATION_THRESHOLD {
            return None;
        }

        let start = gesture.last_sample;
        let interpolated = interpolate(start, point, distance);

        let mut points = Vec::with_capacity(interpolated.len() + 1);
        points.push(gesture.points.last().copied().unwrap_or(start));
        points.extend_from_slice(&interpolated);

        gesture.points.extend(interpolated);
        gesture.last_sample = point;

        Some(LiveSegment {
            points,
            color: gesture.tool.color,
            width: gesture.tool.stroke_width(),
            kind: gesture.tool.kind,
        })
    }

    /// Finish the gesture. Returns the committed stroke, or `None` when idle.
    pub fn pointer_up(&mut self) -> Option<Stroke> {
        self.commit()
    }

    /// Leaving the surface mid-drag commits exactly like [`Self::pointer_up`].
    pub fn pointer_leave(&mut self) -> Option<Stroke> {
        self.commit()
    }

    /// Drop any in-progress gesture without committing it
    pub fn reset(&mut self) {
        self.state = CaptureState::Idle;
    }

    fn commit(&mut self) -> Option<Stroke> {
        let CaptureState::Dragging(gesture) = std::mem::replace(&mut self.state, CaptureState::Idle)
        else {
            return None;
        };

        // The tool was validated on press, so building the stroke cannot fail.
        Stroke::with_tool(gesture.points, &gesture.tool).ok()
    }
}

/// Points at parameter steps of `1 / distance` from `start` (exclusive) to
/// `end` (inclusive). The final point is exactly `end`.
fn interpolate(start: Point, end: Point, distance: f32) -> Vec<Point> {
    let step = 1.0 / distance;
    let steps = distance.ceil() as usize;

    (1..=steps).map(|i| start.lerp(&end, (i as f32 * step).min(1.0))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> ToolSettings {
        ToolSettings::default()
    }

    fn drag(capture: &mut StrokeCapture, path: &[(f32, f32)]) {
        let (x, y) = path[0];
        capture.pointer_down(Point::new(x, y), tool()).expect("valid tool");
        for &(x, y) in &path[1..] {
            capture.pointer_move(Point::new(x, y));
        }
    }

    #[test]
    fn press_records_the_first_point() {
        let mut capture = StrokeCapture::new();
        capture.pointer_down(Point::new(4.0, 5.0), tool()).unwrap();

        let CaptureState::Dragging(gesture) = capture.state() else {
            panic!("expected dragging state");
        };
        assert_eq!(gesture.points(), &[Point::new(4.0, 5.0)]);
    }

    #[test]
    fn ten_pixel_drag_emits_one_point_per_pixel() {
        let mut capture = StrokeCapture::new();
        drag(&mut capture, &[(0.0, 0.0), (10.0, 0.0)]);
        let stroke = capture.pointer_up().expect("stroke committed");

        // press point plus ten interpolated samples
        assert_eq!(stroke.points().len(), 11);
        for point in stroke.points() {
            assert_eq!(point.y, 0.0);
            assert!((0.0..=10.0).contains(&point.x));
        }
        assert_eq!(stroke.points().last(), Some(&Point::new(10.0, 0.0)));
    }

    #[test]
    fn consecutive_samples_are_about_one_pixel_apart() {
        let mut capture = StrokeCapture::new();
        drag(&mut capture, &[(0.0, 0.0), (30.0, 40.0)]);
        let stroke = capture.pointer_up().unwrap();

        for pair in stroke.points().windows(2) {
            let gap = pair[0].distance_to(&pair[1]);
            assert!(gap <= 1.0 + 1e-3, "gap {gap} too wide");
        }
    }

    #[test]
    fn short_moves_are_decimated() {
        let mut capture = StrokeCapture::new();
        capture.pointer_down(Point::new(0.0, 0.0), tool()).unwrap();

        assert!(capture.pointer_move(Point::new(1.0, 1.0)).is_none());
        assert!(capture.pointer_move(Point::new(1.9, 0.0)).is_none());

        let stroke = capture.pointer_up().unwrap();
        assert_eq!(stroke.points(), &[Point::new(0.0, 0.0)]);
    }

    #[test]
    fn decimation_measures_from_the_last_raw_sample() {
        let mut capture = StrokeCapture::new();
        capture.pointer_down(Point::new(0.0, 0.0), tool()).unwrap();

        assert!(capture.pointer_move(Point::new(2.5, 0.0)).is_some());
        // 1.5 px from the last raw sample, even though it is 4 px from the press
        assert!(capture.pointer_move(Point::new(4.0, 0.0)).is_none());
        assert!(capture.pointer_move(Point::new(4.5, 0.0)).is_some());
    }

    #[test]
    fn live_segment_starts_at_the_previous_tail() {
        let mut capture = StrokeCapture::new();
        capture.pointer_down(Point::new(10.0, 10.0), tool()).unwrap();

        let segment = capture.pointer_move(Point::new(12.0, 10.0)).expect("segment");
        assert_eq!(
            segment.points,
            vec![Point::new(10.0, 10.0), Point::new(11.0, 10.0), Point::new(12.0, 10.0)]
        );
        assert_eq!(segment.width, tool().width);
    }

    #[test]
    fn eraser_gestures_use_the_eraser_width() {
        let eraser = tool().with_kind(ToolKind::Eraser);
        let mut capture = StrokeCapture::new();
        capture.pointer_down(Point::new(0.0, 0.0), eraser).unwrap();

        let segment = capture.pointer_move(Point::new(3.0, 0.0)).expect("segment");
        assert_eq!(segment.kind, ToolKind::Eraser);
        assert_eq!(segment.width, ink_model::ERASER_WIDTH);

        let stroke = capture.pointer_up().unwrap();
        assert!(stroke.is_eraser());
    }

    #[test]
    fn pointer_leave_commits_like_pointer_up() {
        let path = [(0.0, 0.0), (5.0, 0.0), (5.0, 6.0)];

        let mut up = StrokeCapture::new();
        drag(&mut up, &path);
        let via_up = up.pointer_up();

        let mut leave = StrokeCapture::new();
        drag(&mut leave, &path);
        let via_leave = leave.pointer_leave();

        assert!(via_up.is_some());
        assert_eq!(via_up, via_leave);
        assert_eq!(leave.state(), &CaptureState::Idle);
    }

    #[test]
    fn zero_length_drag_commits_a_single_point_stroke() {
        let mut capture = StrokeCapture::new();
        capture.pointer_down(Point::new(3.0, 3.0), tool()).unwrap();

        let stroke = capture.pointer_up().expect("zero-length drag still commits");
        assert_eq!(stroke.points().len(), 1);
        assert!(!capture.is_dragging());
    }

    #[test]
    fn release_while_idle_commits_nothing() {
        let mut capture = StrokeCapture::new();
        assert!(capture.pointer_up().is_none());
        assert!(capture.pointer_leave().is_none());
        assert!(capture.pointer_move(Point::new(50.0, 50.0)).is_none());
    }

    #[test]
    fn gesture_keeps_the_tool_it_started_with() {
        let red = tool().with_color(Color::RED);
        let mut capture = StrokeCapture::new();
        capture.pointer_down(Point::new(0.0, 0.0), red).unwrap();
        capture.pointer_move(Point::new(4.0, 0.0));

        let stroke = capture.pointer_up().unwrap();
        assert_eq!(stroke.color(), Color::RED);
    }

    #[test]
    fn press_mid_drag_returns_the_running_stroke() {
        let mut capture = StrokeCapture::new();
        drag(&mut capture, &[(0.0, 0.0), (3.0, 0.0)]);

        let previous = capture.pointer_down(Point::new(50.0, 50.0), tool()).unwrap();
        assert_eq!(previous.map(|s| s.points().len()), Some(4));
        assert!(capture.is_dragging());
    }

    #[test]
    fn invalid_tool_is_rejected_on_press() {
        let mut capture = StrokeCapture::new();
        let broken = ToolSettings { width: 0.0, ..tool() };

        assert!(capture.pointer_down(Point::new(0.0, 0.0), broken).is_err());
        assert!(!capture.is_dragging());
    }
}
