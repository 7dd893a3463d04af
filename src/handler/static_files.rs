//! The static-file fallback handler.
//!
//! When a static root is configured, requests that miss the route table fall
//! through here. The request path is normalised component-by-component before
//! touching the filesystem; with the jail enabled (the default), any `..`
//! segment is an immediate miss.

use std::path::{Path, PathBuf};

use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, LAST_MODIFIED};
use hyper::{Body, Response, StatusCode};
use log::{debug, trace};
use tokio_util::io::ReaderStream;

use crate::handler::not_found;
use crate::router::segment::request_segments;

/// Serves files under a root directory.
#[derive(Clone, Debug)]
pub struct StaticFiles {
    root: PathBuf,
    directory_listing: bool,
    follow_symlinks: bool,
    jail_to_root: bool,
}

impl StaticFiles {
    /// Creates a handler rooted at `root` with the conservative defaults: no
    /// directory listings, no symlink traversal, jailed to the root.
    pub fn new<P: Into<PathBuf>>(root: P) -> StaticFiles {
        StaticFiles {
            root: root.into(),
            directory_listing: false,
            follow_symlinks: false,
            jail_to_root: true,
        }
    }

    /// Enables or disables HTML directory listings.
    pub fn with_directory_listing(mut self, enabled: bool) -> Self {
        self.directory_listing = enabled;
        self
    }

    /// Controls whether symlinked entries are served.
    pub fn with_follow_symlinks(mut self, enabled: bool) -> Self {
        self.follow_symlinks = enabled;
        self
    }

    /// Controls whether `..` segments may escape the root.
    pub fn with_jail_to_root(mut self, enabled: bool) -> Self {
        self.jail_to_root = enabled;
        self
    }

    /// Resolves a request path to a response: a streamed file, an `index.html`
    /// or listing for directories, or `404 Not Found`.
    pub(crate) async fn serve(&self, request_path: &str) -> Response<Body> {
        let relative = match self.normalize(request_path) {
            Some(path) => path,
            None => {
                debug!(target: "nanoserve::static", " rejected path `{}`", request_path);
                return not_found();
            }
        };

        let full = self.root.join(relative);
        trace!(target: "nanoserve::static", " resolving `{}` to {}", request_path, full.display());

        if !self.follow_symlinks {
            if let Ok(meta) = tokio::fs::symlink_metadata(&full).await {
                if meta.file_type().is_symlink() {
                    return not_found();
                }
            }
        }

        match tokio::fs::metadata(&full).await {
            Ok(meta) if meta.is_dir() => {
                let index = full.join("index.html");
                if tokio::fs::metadata(&index).await.is_ok() {
                    file_response(&index).await
                } else if self.directory_listing {
                    listing_response(&full, request_path).await
                } else {
                    not_found()
                }
            }
            Ok(_) => file_response(&full).await,
            Err(_) => not_found(),
        }
    }

    fn normalize(&self, request_path: &str) -> Option<PathBuf> {
        let mut normalized = PathBuf::new();

        for segment in request_segments(request_path) {
            match segment.as_str() {
                "." => {}
                ".." => {
                    if self.jail_to_root {
                        return None;
                    }
                    normalized.push("..");
                }
                _ => normalized.push(segment),
            }
        }

        Some(normalized)
    }
}

async fn file_response(path: &Path) -> Response<Body> {
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(err) => {
            debug!(target: "nanoserve::static", " unable to open {}: {}", path.display(), err);
            return not_found();
        }
    };

    let mut builder = Response::builder().status(StatusCode::OK);

    if let Ok(meta) = file.metadata().await {
        builder = builder.header(CONTENT_LENGTH, meta.len());
        if let Ok(modified) = meta.modified() {
            builder = builder.header(LAST_MODIFIED, httpdate::fmt_http_date(modified));
        }
    }

    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let content_type = HeaderValue::from_str(mime.as_ref())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    builder
        .header(CONTENT_TYPE, content_type)
        .body(Body::wrap_stream(ReaderStream::new(file)))
        .unwrap_or_else(|_| not_found())
}

/// Escapes the characters HTML gives meaning to, for use in both text nodes
/// and double-quoted attribute values.
fn html_escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

async fn listing_response(dir: &Path, request_path: &str) -> Response<Body> {
    let mut entries = Vec::new();

    let mut reader = match tokio::fs::read_dir(dir).await {
        Ok(reader) => reader,
        Err(_) => return not_found(),
    };

    while let Ok(Some(entry)) = reader.next_entry().await {
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            name.push('/');
        }
        entries.push(name);
    }
    entries.sort();

    // Entry names and the request path are attacker-controlled; escape them
    // before they reach markup or href attributes.
    let title = html_escape(request_path);
    let base = html_escape(request_path.trim_end_matches('/'));
    let mut page = String::new();
    page.push_str("<html><head><title>Index of ");
    page.push_str(&title);
    page.push_str("</title></head><body><h1>Index of ");
    page.push_str(&title);
    page.push_str("</h1><ul>");
    for name in entries {
        let name = html_escape(&name);
        page.push_str(&format!("<li><a href=\"{}/{}\">{}</a></li>", base, name, name));
    }
    page.push_str("</ul></body></html>");

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"))
        .body(Body::from(page))
        .unwrap_or_else(|_| not_found())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fixture_root(name: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("nanoserve-static-{}", name));
        tokio::fs::remove_dir_all(&root).await.ok();
        tokio::fs::create_dir_all(root.join("sub")).await.unwrap();
        tokio::fs::write(root.join("hello.txt"), "hi there").await.unwrap();
        tokio::fs::write(root.join("sub/page.html"), "<p>page</p>").await.unwrap();
        root
    }

    #[tokio::test]
    async fn serves_files_with_guessed_mime() {
        let root = fixture_root("serve").await;
        let handler = StaticFiles::new(&root);

        let response = handler.serve("/hello.txt").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "text/plain"
        );
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&body[..], b"hi there");
    }

    #[tokio::test]
    async fn missing_files_are_404() {
        let root = fixture_root("missing").await;
        let handler = StaticFiles::new(&root);

        let response = handler.serve("/nope.txt").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn jail_rejects_parent_traversal() {
        let root = fixture_root("jail").await;
        let handler = StaticFiles::new(root.join("sub"));

        let response = handler.serve("/../hello.txt").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let unjailed = StaticFiles::new(root.join("sub")).with_jail_to_root(false);
        let response = unjailed.serve("/../hello.txt").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn directories_list_only_when_enabled() {
        let root = fixture_root("listing").await;

        let silent = StaticFiles::new(&root);
        assert_eq!(silent.serve("/sub").await.status(), StatusCode::NOT_FOUND);

        let listing = StaticFiles::new(&root).with_directory_listing(true);
        let response = listing.serve("/sub").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let page = String::from_utf8(body.to_vec()).unwrap();
        assert!(page.contains("page.html"));
    }

    // Angle brackets are not valid in Windows file names.
    #[cfg(unix)]
    #[tokio::test]
    async fn listings_escape_markup_in_names_and_paths() {
        let root = fixture_root("escape").await;
        tokio::fs::write(root.join("sub/<img src=x onerror=alert(1)>.txt"), "x")
            .await
            .unwrap();

        let listing = StaticFiles::new(&root).with_directory_listing(true);
        let response = listing.serve("/sub").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let page = String::from_utf8(body.to_vec()).unwrap();
        assert!(!page.contains("<img"));
        assert!(page.contains("&lt;img src=x onerror=alert(1)&gt;.txt"));
    }

    #[test]
    fn html_escape_covers_attribute_breakouts() {
        assert_eq!(
            html_escape(r#""><script>&"#),
            "&quot;&gt;&lt;script&gt;&amp;"
        );
        assert_eq!(html_escape("plain-name.txt"), "plain-name.txt");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinks_are_hidden_unless_followed() {
        let root = fixture_root("symlink").await;
        std::os::unix::fs::symlink(root.join("hello.txt"), root.join("link.txt")).unwrap();

        let hidden = StaticFiles::new(&root);
        assert_eq!(hidden.serve("/link.txt").await.status(), StatusCode::NOT_FOUND);

        let followed = StaticFiles::new(&root).with_follow_symlinks(true);
        assert_eq!(followed.serve("/link.txt").await.status(), StatusCode::OK);
    }
}
