//! Defines the pattern trie used to match request paths against routes.

use std::collections::HashMap;

use log::trace;

use crate::router::segment::{split_segments, SegmentKind};

/// The outcome of a successful lookup: the canonical pattern that matched
/// (parameters retain their `:name` form) and the captured parameter values.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchResult {
    /// Canonical pattern string, e.g. `/user/:id`.
    pub path: String,
    /// Parameter name → matched request segment text.
    pub params: HashMap<String, String>,
}

/// A member of the trie representing one pattern segment.
///
/// A node exclusively owns its children; no parent back-references are kept.
/// Terminal nodes carry the canonical pattern string they complete, which is
/// the key used to fetch the handler from the outer route map.
struct Node {
    segment: String,
    kind: SegmentKind,
    pattern: Option<String>,
    children: Vec<Node>,
}

impl Node {
    fn new(segment: &str) -> Node {
        Node {
            segment: segment.to_owned(),
            kind: SegmentKind::of(segment),
            pattern: None,
            children: Vec::new(),
        }
    }

    fn matches(&self, request_segment: &str) -> bool {
        match self.kind {
            SegmentKind::Literal => self.segment == request_segment,
            SegmentKind::Param | SegmentKind::Wildcard => true,
        }
    }

    fn param_name(&self) -> &str {
        &self.segment[1..]
    }
}

/// A trie of route patterns with `:param` and `*` segments.
///
/// Patterns sharing a prefix share that prefix's trie path. Lookup walks
/// children in insertion order and the first matching child wins, so a
/// `:param` pattern inserted before a literal sibling shadows it.
pub struct RouteTrie {
    root: Node,
}

impl RouteTrie {
    /// Creates an empty trie.
    pub fn new() -> RouteTrie {
        RouteTrie {
            root: Node::new("/"),
        }
    }

    /// Returns the canonical form of a pattern: its non-empty segments joined
    /// by `/` with a leading slash, `/` for the root.
    pub fn canonical(pattern: &str) -> String {
        let segments = split_segments(pattern);
        if segments.is_empty() {
            "/".to_owned()
        } else {
            let mut path = String::new();
            for segment in segments {
                path.push('/');
                path.push_str(segment);
            }
            path
        }
    }

    /// Inserts a pattern, creating nodes for segments not already present and
    /// marking the terminal node with the canonical pattern string.
    pub fn insert(&mut self, pattern: &str) {
        let canonical = RouteTrie::canonical(pattern);
        trace!(target: "nanoserve::router", " inserting pattern `{}`", canonical);

        let mut node = &mut self.root;
        for segment in split_segments(pattern) {
            let index = match node.children.iter().position(|c| c.segment == segment) {
                Some(index) => index,
                None => {
                    node.children.push(Node::new(segment));
                    node.children.len() - 1
                }
            };
            node = &mut node.children[index];
        }

        node.pattern = Some(canonical);
    }

    /// Matches a request path, already split into non-empty segments, against
    /// the trie.
    ///
    /// At each level the children are tried in insertion order; a child
    /// matches by literal equality, or by being `*`, or by being a `:param`
    /// (which records the segment text under the parameter name).
    ///
    /// The walk aborts early when the chosen child has a non-empty child list
    /// whose length equals the request's segment count including the root
    /// marker. The observable effect is that a pattern acting as both a leaf
    /// and the parent of two or more children cannot be matched directly.
    pub fn lookup(&self, segments: &[String]) -> Option<MatchResult> {
        let marked_len = segments.len() + 1;
        let mut node = &self.root;
        let mut params = HashMap::new();

        for segment in segments {
            let child = match node.children.iter().find(|c| c.matches(segment)) {
                Some(child) => child,
                None => {
                    trace!(target: "nanoserve::router", " no child matches `{}`", segment);
                    return None;
                }
            };

            if child.kind == SegmentKind::Param {
                params.insert(child.param_name().to_owned(), segment.clone());
            }

            if !child.children.is_empty() && child.children.len() == marked_len {
                trace!(
                    target: "nanoserve::router",
                    " aborting walk at `{}`, fan-out equals segment count",
                    child.segment
                );
                return None;
            }

            node = child;
        }

        node.pattern.as_ref().map(|pattern| MatchResult {
            path: pattern.clone(),
            params,
        })
    }
}

impl Default for RouteTrie {
    fn default() -> Self {
        RouteTrie::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segments(path: &str) -> Vec<String> {
        crate::router::segment::request_segments(path)
    }

    #[test]
    fn captures_parameter_segments() {
        let mut trie = RouteTrie::new();
        trie.insert("/user/:id");

        let result = trie.lookup(&segments("/user/123")).unwrap();
        assert_eq!(result.path, "/user/:id");
        assert_eq!(result.params.get("id").map(String::as_str), Some("123"));
    }

    #[test]
    fn longer_request_paths_miss() {
        let mut trie = RouteTrie::new();
        trie.insert("/a/b");

        assert!(trie.lookup(&segments("/a/b/c")).is_none());
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let mut trie = RouteTrie::new();
        trie.insert("/a/:x");
        trie.insert("/a/b");

        // The parameter child was inserted first, so it shadows the literal.
        let result = trie.lookup(&segments("/a/b")).unwrap();
        assert_eq!(result.path, "/a/:x");
        assert_eq!(result.params.get("x").map(String::as_str), Some("b"));
    }

    #[test]
    fn literal_inserted_first_wins_the_tie() {
        let mut trie = RouteTrie::new();
        trie.insert("/a/b");
        trie.insert("/a/:x");

        let result = trie.lookup(&segments("/a/b")).unwrap();
        assert_eq!(result.path, "/a/b");
        assert!(result.params.is_empty());
    }

    #[test]
    fn root_requires_explicit_insertion() {
        let mut trie = RouteTrie::new();
        assert!(trie.lookup(&segments("/")).is_none());

        trie.insert("/");
        let result = trie.lookup(&segments("/")).unwrap();
        assert_eq!(result.path, "/");
    }

    #[test]
    fn wildcard_matches_any_single_segment() {
        let mut trie = RouteTrie::new();
        trie.insert("/files/*");

        assert!(trie.lookup(&segments("/files/readme")).is_some());
        assert!(trie.lookup(&segments("/files/a/b")).is_none());
    }

    #[test]
    fn shared_prefixes_share_trie_paths() {
        let mut trie = RouteTrie::new();
        trie.insert("/api/users");
        trie.insert("/api/rooms");

        assert_eq!(trie.root.children.len(), 1);
        assert_eq!(trie.root.children[0].children.len(), 2);
    }

    #[test]
    fn canonical_normalises_slashes() {
        assert_eq!(RouteTrie::canonical("user//:id/"), "/user/:id");
        assert_eq!(RouteTrie::canonical("/"), "/");
    }

    // Early-miss behaviour: a pattern that is both a leaf and the parent of
    // two or more children cannot be matched directly.
    #[test]
    fn leaf_with_wide_fan_out_is_unreachable() {
        let mut trie = RouteTrie::new();
        trie.insert("/a");
        trie.insert("/a/b");
        trie.insert("/a/c");

        assert!(trie.lookup(&segments("/a")).is_none());
        assert!(trie.lookup(&segments("/a/b")).is_some());
        assert!(trie.lookup(&segments("/a/c")).is_some());
    }
}
