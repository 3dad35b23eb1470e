// src/utils/charset.rs

//! Response body decoding.
//!
//! The charset is taken from the `Content-Type` header, then from a
//! `<meta>` declaration in the document head, then from a UTF-8 validity
//! check, and finally from statistical detection.

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use scraper::{Html, Selector};

/// Bytes of the body scanned for a `<meta>` declaration.
const META_SCAN_LIMIT: usize = 4096;

/// Decode a response body into text.
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> String {
    let encoding = detect_encoding(bytes, content_type);
    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

/// Pick the encoding of a response body.
pub fn detect_encoding(bytes: &[u8], content_type: Option<&str>) -> &'static Encoding {
    if let Some(encoding) = content_type.and_then(charset_from_content_type) {
        return encoding;
    }
    if let Some(encoding) = charset_from_meta(bytes) {
        return encoding;
    }
    if std::str::from_utf8(bytes).is_ok() {
        return UTF_8;
    }
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    detector.guess(None, true)
}

fn charset_from_label(label: &str) -> Option<&'static Encoding> {
    let label = label.trim().trim_matches(|c| c == '"' || c == '\'');
    Encoding::for_label(label.as_bytes())
}

fn charset_from_content_type(content_type: &str) -> Option<&'static Encoding> {
    content_type.split(';').find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("charset") {
            charset_from_label(value)
        } else {
            None
        }
    })
}

fn charset_from_meta(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(META_SCAN_LIMIT)];
    let head = String::from_utf8_lossy(head);
    let document = Html::parse_document(&head);

    let charset = Selector::parse("meta[charset]").ok()?;
    if let Some(encoding) = document
        .select(&charset)
        .filter_map(|el| el.value().attr("charset"))
        .find_map(charset_from_label)
    {
        return Some(encoding);
    }

    let http_equiv = Selector::parse("meta[http-equiv][content]").ok()?;
    document
        .select(&http_equiv)
        .filter(|el| {
            el.value()
                .attr("http-equiv")
                .is_some_and(|v| v.eq_ignore_ascii_case("content-type"))
        })
        .filter_map(|el| el.value().attr("content"))
        .find_map(charset_from_content_type)
}
