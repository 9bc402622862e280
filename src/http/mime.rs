//! Content-type inference from file extensions, and the reverse lookup used
//! when a POSTed resource arrives without an extension.

const TABLE: &[(&str, &str)] = &[
    ("html", "text/html; charset=utf-8"),
    ("htm", "text/html; charset=utf-8"),
    ("css", "text/css; charset=utf-8"),
    ("js", "application/javascript; charset=utf-8"),
    ("mjs", "application/javascript; charset=utf-8"),
    ("json", "application/json; charset=utf-8"),
    ("jsonld", "application/ld+json"),
    ("ttl", "text/turtle; charset=utf-8"),
    ("n3", "text/n3; charset=utf-8"),
    ("nt", "application/n-triples"),
    ("rdf", "application/rdf+xml"),
    ("txt", "text/plain; charset=utf-8"),
    ("md", "text/markdown; charset=utf-8"),
    ("csv", "text/csv; charset=utf-8"),
    ("xml", "application/xml"),
    ("svg", "image/svg+xml"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("ico", "image/x-icon"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("gz", "application/gzip"),
    ("wasm", "application/wasm"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("bin", "application/octet-stream"),
];

/// Full content-type (with charset where applicable) for a file extension.
///
/// ```
/// # use localpod::http::mime::content_type_for_extension;
/// assert_eq!(content_type_for_extension("PNG"), Some("image/png"));
/// assert_eq!(content_type_for_extension("nope"), None);
/// ```
pub fn content_type_for_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.to_ascii_lowercase();
    TABLE
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, ct)| *ct)
}

/// Content-type for a path, based on whatever follows its last dot.
pub fn content_type_for_path(path: &std::path::Path) -> Option<&'static str> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(content_type_for_extension)
}

/// Preferred extension for a Content-Type header value.
///
/// Parameters such as `; charset=utf-8` are ignored. The first table entry
/// for a media type wins, so `text/html` maps to `html`.
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if essence.is_empty() {
        return None;
    }
    TABLE
        .iter()
        .find(|(_, ct)| ct.split(';').next().unwrap_or_default() == essence)
        .map(|(ext, _)| *ext)
}
