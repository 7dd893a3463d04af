//! Segment classification for route patterns.

use percent_encoding::percent_decode_str;

/// The kind of a single pattern segment.
///
/// A pattern is split on `/` into non-empty segments; each segment is matched
/// against the corresponding request-path segment according to its kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentKind {
    /// Matched by string equality against the request segment.
    Literal,

    /// `:name`: matches any single segment and captures it under `name`.
    Param,

    /// `*`: matches any single segment without capturing it.
    Wildcard,
}

impl SegmentKind {
    /// Classifies a pattern segment. A bare `:` has no parameter name and is
    /// treated as a literal.
    pub(crate) fn of(segment: &str) -> SegmentKind {
        if segment == "*" {
            SegmentKind::Wildcard
        } else if segment.len() > 1 && segment.starts_with(':') {
            SegmentKind::Param
        } else {
            SegmentKind::Literal
        }
    }
}

/// Splits a pattern into its non-empty segments; leading and trailing slashes
/// normalise away.
pub(crate) fn split_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Splits a request path into percent-decoded, non-empty segments. Segments
/// that do not decode to valid UTF-8 are dropped.
pub(crate) fn request_segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            percent_decode_str(s)
                .decode_utf8()
                .ok()
                .map(|decoded| decoded.into_owned())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_segments() {
        assert_eq!(SegmentKind::of("users"), SegmentKind::Literal);
        assert_eq!(SegmentKind::of(":id"), SegmentKind::Param);
        assert_eq!(SegmentKind::of("*"), SegmentKind::Wildcard);
        assert_eq!(SegmentKind::of(":"), SegmentKind::Literal);
    }

    #[test]
    fn split_drops_empty_segments() {
        assert_eq!(split_segments("/a//b/"), vec!["a", "b"]);
        assert!(split_segments("/").is_empty());
    }

    #[test]
    fn request_segments_are_percent_decoded() {
        assert_eq!(request_segments("/%61ctivate/x"), vec!["activate", "x"]);
    }
}
