//! Defines the route table: a pattern trie plus a canonical-pattern map.

pub mod segment;
pub mod trie;

use std::collections::HashMap;

use log::trace;

use crate::handler::RouteHandler;
use crate::router::segment::request_segments;
use crate::router::trie::{MatchResult, RouteTrie};

/// Maps canonical pattern strings to their handlers, alongside a `RouteTrie`
/// holding the patterns themselves.
///
/// A lookup composes the two: the trie resolves a request path to the
/// canonical pattern it matches, and the map resolves that pattern to its
/// handler. If either step fails the route is a miss.
///
/// Registering a second handler for a pattern replaces the first.
pub struct RouteTree {
    handlers: HashMap<String, RouteHandler>,
    trie: RouteTrie,
}

impl RouteTree {
    /// Creates an empty route table.
    pub fn new() -> RouteTree {
        RouteTree {
            handlers: HashMap::new(),
            trie: RouteTrie::new(),
        }
    }

    /// Registers a handler for a pattern.
    pub fn insert(&mut self, pattern: &str, handler: RouteHandler) {
        let canonical = RouteTrie::canonical(pattern);
        self.trie.insert(pattern);
        self.handlers.insert(canonical, handler);
    }

    /// Resolves a request path to its handler and captured parameters.
    pub fn lookup(&self, path: &str) -> Option<(&RouteHandler, MatchResult)> {
        let segments = request_segments(path);
        let matched = self.trie.lookup(&segments)?;
        trace!(target: "nanoserve::router", " `{}` matched `{}`", path, matched.path);

        let handler = self.handlers.get(&matched.path)?;
        Some((handler, matched))
    }

    /// True iff at least one pattern is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for RouteTree {
    fn default() -> Self {
        RouteTree::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::handler::RouteMethod;

    fn noop_handler(method: RouteMethod) -> RouteHandler {
        RouteHandler::http(method, std::sync::Arc::new(|_req, _res| Box::pin(async { Ok(()) })))
    }

    #[test]
    fn lookup_resolves_handler_and_params() {
        let mut tree = RouteTree::new();
        tree.insert("/user/:id", noop_handler(RouteMethod::Get));

        let (handler, matched) = tree.lookup("/user/42").unwrap();
        assert_eq!(handler.method(), RouteMethod::Get);
        assert_eq!(matched.params.get("id").map(String::as_str), Some("42"));
    }

    #[test]
    fn lookup_misses_on_unknown_paths() {
        let mut tree = RouteTree::new();
        tree.insert("/user/:id", noop_handler(RouteMethod::Get));

        assert!(tree.lookup("/nope").is_none());
    }

    #[test]
    fn registering_a_pattern_twice_replaces_the_handler() {
        let mut tree = RouteTree::new();
        tree.insert("/thing", noop_handler(RouteMethod::Get));
        tree.insert("/thing", noop_handler(RouteMethod::Post));

        let (handler, _) = tree.lookup("/thing").unwrap();
        assert_eq!(handler.method(), RouteMethod::Post);
    }
}
