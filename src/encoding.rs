use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};

/// How far into the document a `<meta charset>` declaration is looked for.
const CHARSET_SNIFF_BYTES: usize = 2048;

/// Decodes a raw document to UTF-8 text.
///
/// A byte order mark wins, then valid UTF-8 is taken as is. Otherwise the
/// charset declared in the markup is used, falling back to windows-1252,
/// which is what the site served before it moved to UTF-8.
pub fn normalize_to_utf8(raw: &[u8]) -> Cow<'_, str> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(raw) {
        let (text, _) = encoding.decode_without_bom_handling(&raw[bom_len..]);
        return text;
    }
    if let Ok(text) = std::str::from_utf8(raw) {
        return Cow::Borrowed(text);
    }

    let encoding = declared_charset(raw)
        .filter(|enc| *enc != UTF_8)
        .unwrap_or(WINDOWS_1252);
    log::debug!("decoding document as {}", encoding.name());
    let (text, had_errors) = encoding.decode_without_bom_handling(raw);
    if had_errors {
        log::warn!("document contained bytes invalid for {}", encoding.name());
    }
    text
}

fn declared_charset(raw: &[u8]) -> Option<&'static Encoding> {
    let head = &raw[..raw.len().min(CHARSET_SNIFF_BYTES)];
    let lowered = head.to_ascii_lowercase();
    let needle = b"charset=";
    let start = lowered.windows(needle.len()).position(|w| w == needle)? + needle.len();

    let label: Vec<u8> = lowered[start..]
        .iter()
        .skip_while(|b| matches!(b, b'"' | b'\'' | b' '))
        .take_while(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'.'))
        .copied()
        .collect();
    Encoding::for_label(&label)
}

#[test]
fn test_latin1_bytes_are_decoded() {
    // "Vélo" in windows-1252
    let raw = b"<html><body><h1>V\xe9lo</h1></body></html>";
    assert!(normalize_to_utf8(raw).contains("Vélo"));
}

#[test]
fn test_utf8_is_borrowed() {
    let raw = "<h1>Vélo</h1>".as_bytes();
    assert!(matches!(normalize_to_utf8(raw), Cow::Borrowed(_)));
}

#[test]
fn test_declared_charset() {
    let raw = b"<meta http-equiv=\"Content-Type\" content=\"text/html; charset=ISO-8859-15\"><p>\xa4</p>";
    assert!(normalize_to_utf8(raw).contains('€'));
}
