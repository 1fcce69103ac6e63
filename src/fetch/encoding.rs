// src/fetch/encoding.rs
use encoding_rs::{Encoding, UTF_8};
use once_cell::sync::Lazy;
use regex::Regex;

// Only the head of a document is searched for a charset declaration
const SNIFF_BYTES: usize = 1000;

static META_HTTP_EQUIV_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]+http-equiv\s*=\s*["']?content-type["']?[^>]+content\s*=\s*["']?[^"'>]*;\s*charset\s*=\s*([^"'\s;>]+)"#)
        .expect("Failed to compile META_HTTP_EQUIV_RE")
});

static META_CHARSET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?([^"'\s;/>]+)"#)
        .expect("Failed to compile META_CHARSET_RE")
});

static HEADER_CHARSET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)charset\s*=\s*["']?([^"'\s;]+)"#).expect("Failed to compile HEADER_CHARSET_RE")
});

/// Finds the encoding a document declares for itself in a `<meta>` tag.
pub fn sniff_meta_charset(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(SNIFF_BYTES)]);
    [&*META_HTTP_EQUIV_RE, &*META_CHARSET_RE]
        .iter()
        .filter_map(|re| re.captures(&head))
        .filter_map(|caps| caps.get(1))
        .find_map(|label| Encoding::for_label(label.as_str().as_bytes()))
}

/// Encoding named by a `Content-Type` header value, e.g. `text/html; charset=GBK`.
pub fn header_charset(content_type: &str) -> Option<&'static Encoding> {
    HEADER_CHARSET_RE
        .captures(content_type)
        .and_then(|caps| caps.get(1))
        .and_then(|label| Encoding::for_label(label.as_str().as_bytes()))
}

/// Picks the encoding for a response body: a `<meta>` declaration first,
/// then the server's header, then UTF-8.
pub fn detect_encoding(bytes: &[u8], content_type: Option<&str>) -> &'static Encoding {
    sniff_meta_charset(bytes)
        .or_else(|| content_type.and_then(header_charset))
        .unwrap_or(UTF_8)
}

/// Decodes a response body to UTF-8. Invalid sequences become U+FFFD.
pub fn decode_document(bytes: &[u8], content_type: Option<&str>) -> String {
    let encoding = detect_encoding(bytes, content_type);
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        tracing::warn!("Document had invalid {} sequences, replaced", used.name());
    } else {
        tracing::debug!("Decoded {} bytes as {}", bytes.len(), used.name());
    }
    text.into_owned()
}
