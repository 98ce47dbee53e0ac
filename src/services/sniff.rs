//! Content sniffing for the inline-content read path.

/// Decode `bytes` as UTF-8 text. `None` when the content is binary.
pub fn decode(bytes: &[u8]) -> Option<&str> {
    std::str::from_utf8(bytes).ok()
}

/// True when `bytes` are renderable as UTF-8 text.
pub fn is_text(bytes: &[u8]) -> bool {
    decode(bytes).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_decodes() {
        assert_eq!(decode(b"hello \xc3\xa9"), Some("hello \u{e9}"));
        assert!(is_text(b""));
    }

    #[test]
    fn invalid_byte_is_not_text() {
        assert_eq!(decode(&[0xFF]), None);
        assert!(!is_text(&[0xFF]));
    }
}
