//! Static file serving

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

const INDEX_HTML: &str = include_str!("../site/index.html");
const GLASSES_HTML: &str = include_str!("../site/glasses.html");
const STYLES_CSS: &str = include_str!("../site/styles.css");

/// Embedded storefront pages
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticFiles;

impl StaticFiles {
    pub fn new() -> Self {
        Self
    }

    /// Look up an embedded file by request path (leading slash optional)
    pub fn get(&self, path: &str) -> Option<&'static str> {
        match path.trim_start_matches('/') {
            "" | "index.html" => Some(INDEX_HTML),
            "glasses.html" => Some(GLASSES_HTML),
            "styles.css" => Some(STYLES_CSS),
            _ => None,
        }
    }

    /// Serve a static file
    pub fn serve(&self, path: &str) -> Response {
        match self.get(path) {
            Some(content) => serve_embedded(content, guess_content_type(path)),
            None => not_found(),
        }
    }
}

fn guess_content_type(path: &str) -> &'static str {
    if path.ends_with(".css") {
        "text/css; charset=utf-8"
    } else if path.ends_with(".js") {
        "application/javascript"
    } else if path.ends_with(".png") {
        "image/png"
    } else if path.ends_with(".svg") {
        "image/svg+xml"
    } else {
        "text/html; charset=utf-8"
    }
}

fn serve_embedded(content: &'static str, content_type: &'static str) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        content,
    )
        .into_response()
}

/// 404 page shared by the fallback route
pub fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        NOT_FOUND_HTML,
    )
        .into_response()
}

const NOT_FOUND_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Page Not Found | Bike Gear</title>
</head>
<body>
    <h1>Page not found</h1>
    <p><a href="index.html">Back to the helmets</a></p>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_and_index_are_the_helmets_page() {
        let files = StaticFiles::new();
        assert_eq!(files.get("/"), files.get("/index.html"));
        assert!(files.get("/").unwrap().contains("Beautiful Bike Helmets"));
    }

    #[test]
    fn test_glasses_page_is_embedded() {
        let page = StaticFiles::new().get("glasses.html").unwrap();
        assert!(page.contains(r#"data-page-context="glasses""#));
        assert!(page.contains(r#"data-track="shop-glasses-collection""#));
    }

    #[test]
    fn test_unknown_path() {
        let files = StaticFiles::new();
        assert!(files.get("/non-existent-page.html").is_none());
        assert_eq!(files.serve("/non-existent-page.html").status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_content_types() {
        assert_eq!(guess_content_type("/styles.css"), "text/css; charset=utf-8");
        assert_eq!(guess_content_type("/glasses.html"), "text/html; charset=utf-8");
        assert_eq!(guess_content_type("/"), "text/html; charset=utf-8");
    }
}
