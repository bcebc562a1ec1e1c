//! Caption segmentation into "before" and "after" spans.

/// Default marker separating the text found before and after an image.
pub const DEFAULT_SPLIT_MARKER: &str = "<SPLIT>";

/// Split a caption at the first occurrence of `marker`.
///
/// Both halves are trimmed. Without a marker the whole caption is the
/// "before" span and the "after" span is empty.
pub fn segment<'a>(caption: &'a str, marker: &str) -> (&'a str, &'a str) {
    match caption.split_once(marker) {
        Some((before, after)) => (before.trim(), after.trim()),
        None => (caption.trim(), ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_with_marker() {
        let (before, after) = segment("a red car <SPLIT> driving fast", DEFAULT_SPLIT_MARKER);
        assert_eq!(before, "a red car");
        assert_eq!(after, "driving fast");
    }

    #[test]
    fn test_segment_without_marker() {
        let (before, after) = segment("just a caption", DEFAULT_SPLIT_MARKER);
        assert_eq!(before, "just a caption");
        assert_eq!(after, "");
    }

    #[test]
    fn test_segment_empty() {
        assert_eq!(segment("", DEFAULT_SPLIT_MARKER), ("", ""));
    }

    #[test]
    fn test_segment_splits_on_first_marker_only() {
        let (before, after) = segment("a <SPLIT> b <SPLIT> c", DEFAULT_SPLIT_MARKER);
        assert_eq!(before, "a");
        assert_eq!(after, "b <SPLIT> c");
    }

    #[test]
    fn test_segment_marker_at_edges() {
        assert_eq!(segment("<SPLIT> after", DEFAULT_SPLIT_MARKER), ("", "after"));
        assert_eq!(segment("before <SPLIT>", DEFAULT_SPLIT_MARKER), ("before", ""));
    }
}
