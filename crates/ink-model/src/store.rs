use crate::annotation::{Annotation, Stroke, TextAnnotation};
use std::collections::BTreeMap;

/// Annotations of one page, in commit order.
///
/// Commit order is the undo order. It is also the z-order when replayed with
/// [`crate::ReplayOrder::Committed`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageAnnotations {
    history: Vec<Annotation>,
}

impl PageAnnotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, annotation: impl Into<Annotation>) {
        self.history.push(annotation.into());
    }

    /// Remove the most recently committed annotation, whatever its kind
    pub fn pop(&mut self) -> Option<Annotation> {
        self.history.pop()
    }

    /// All annotations in commit order
    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.history.iter()
    }

    pub fn strokes(&self) -> impl Iterator<Item = &Stroke> {
        self.history.iter().filter_map(|annotation| match annotation {
            Annotation::Stroke(stroke) => Some(stroke),
            Annotation::Text(_) => None,
        })
    }

    pub fn texts(&self) -> impl Iterator<Item = &TextAnnotation> {
        self.history.iter().filter_map(|annotation| match annotation {
            Annotation::Text(text) => Some(text),
            Annotation::Stroke(_) => None,
        })
    }

    pub fn last(&self) -> Option<&Annotation> {
        self.history.last()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

/// Per-page annotations for one loaded document.
///
/// Pages are absent until their first annotation is committed and become
/// absent again when undo empties them. Replace the whole store when a new
/// document is loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationStore {
    pages: BTreeMap<u32, PageAnnotations>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stroke(&mut self, page: u32, stroke: Stroke) {
        self.pages.entry(page).or_default().push(stroke);
    }

    pub fn add_text(&mut self, page: u32, text: TextAnnotation) {
        self.pages.entry(page).or_default().push(text);
    }

    /// Remove the most recent annotation on `page`. No-op on unannotated pages.
    pub fn undo(&mut self, page: u32) -> Option<Annotation> {
        let annotations = self.pages.get_mut(&page)?;
        let removed = annotations.pop();

        if annotations.is_empty() {
            self.pages.remove(&page);
        }

        removed
    }

    pub fn get(&self, page: u32) -> Option<&PageAnnotations> {
        self.pages.get(&page)
    }

    /// Annotated page numbers in ascending order
    pub fn annotated_pages(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn total_annotations(&self) -> usize {
        self.pages.values().map(PageAnnotations::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AnnotationKind, Color, Point};
    use proptest::prelude::*;

    fn stroke(x: f32) -> Stroke {
        Stroke::new(vec![Point::new(x, 0.0), Point::new(x + 1.0, 0.0)], Color::BLACK, 2.0)
            .expect("valid stroke")
    }

    fn label(text: &str) -> TextAnnotation {
        TextAnnotation::new(text, Point::new(10.0, 10.0), Color::RED, 12.0).expect("valid label")
    }

    #[test]
    fn unannotated_pages_are_absent() {
        let mut store = AnnotationStore::new();
        store.add_stroke(2, stroke(0.0));

        assert!(store.get(1).is_none());
        assert!(store.get(3).is_none());
        assert_eq!(store.get(2).map(PageAnnotations::len), Some(1));
        assert_eq!(store.annotated_pages().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn undo_on_empty_page_is_a_no_op() {
        let mut store = AnnotationStore::new();
        assert!(store.undo(1).is_none());

        store.add_stroke(1, stroke(0.0));
        assert!(store.undo(2).is_none());
        assert_eq!(store.total_annotations(), 1);
    }

    #[test]
    fn undo_follows_interleaved_commit_order() {
        let mut store = AnnotationStore::new();
        store.add_stroke(1, stroke(0.0));
        store.add_text(1, label("first"));
        store.add_stroke(1, stroke(5.0));

        assert_eq!(store.undo(1).map(|a| a.kind()), Some(AnnotationKind::Stroke));
        assert_eq!(store.undo(1), Some(Annotation::Text(label("first"))));
        assert_eq!(store.undo(1), Some(Annotation::Stroke(stroke(0.0))));
        assert!(store.get(1).is_none(), "emptied page should be absent again");
    }

    #[test]
    fn undo_only_touches_the_requested_page() {
        let mut store = AnnotationStore::new();
        store.add_stroke(1, stroke(0.0));
        store.add_stroke(2, stroke(1.0));

        store.undo(2);

        assert_eq!(store.get(1).map(PageAnnotations::len), Some(1));
        assert!(store.get(2).is_none());
    }

    #[test]
    fn kind_filters_preserve_insertion_order() {
        let mut page = PageAnnotations::new();
        page.push(stroke(0.0));
        page.push(label("a"));
        page.push(stroke(3.0));
        page.push(label("b"));

        let xs: Vec<f32> = page.strokes().map(|s| s.points()[0].x).collect();
        let texts: Vec<&str> = page.texts().map(TextAnnotation::text).collect();

        assert_eq!(xs, vec![0.0, 3.0]);
        assert_eq!(texts, vec!["a", "b"]);
    }

    proptest! {
        #[test]
        fn undo_k_times_removes_last_k_in_reverse(count in 0usize..24, k in 0usize..30) {
            let mut store = AnnotationStore::new();
            let committed: Vec<Stroke> = (0..count).map(|i| stroke(i as f32)).collect();
            for item in &committed {
                store.add_stroke(1, item.clone());
            }

            let mut removed = Vec::new();
            for _ in 0..k {
                if let Some(Annotation::Stroke(stroke)) = store.undo(1) {
                    removed.push(stroke);
                }
            }

            let expected_removed = k.min(count);
            prop_assert_eq!(removed.len(), expected_removed);

            let expected: Vec<Stroke> =
                committed.iter().rev().take(expected_removed).cloned().collect();
            prop_assert_eq!(removed, expected);

            let remaining = store.get(1).map(PageAnnotations::len).unwrap_or(0);
            prop_assert_eq!(remaining, count - expected_removed);
        }
    }
}
