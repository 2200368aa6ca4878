//! Textual HTML patching.
//!
//! Fragments are inserted immediately before the first closing body tag.
//! This is a plain byte search, not an HTML parse: content without the marker
//! is returned untouched.

use bytes::{Bytes, BytesMut};

/// Injection point for reports and payloads.
pub const SPLICE_MARKER: &str = "</body>";

/// Insert `fragment` on its own line before the first `</body>`.
pub fn splice_before_body_close(content: Bytes, fragment: &str) -> Bytes {
    let Some(at) = find(&content, SPLICE_MARKER.as_bytes()) else {
        return content;
    };

    let mut spliced = BytesMut::with_capacity(content.len() + fragment.len() + 2);
    spliced.extend_from_slice(&content[..at]);
    spliced.extend_from_slice(b"\n");
    spliced.extend_from_slice(fragment.as_bytes());
    spliced.extend_from_slice(b"\n");
    spliced.extend_from_slice(&content[at..]);
    spliced.freeze()
}

/// Returns true if `content` carries the splice marker.
pub fn has_marker(content: &[u8]) -> bool {
    find(content, SPLICE_MARKER.as_bytes()).is_some()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserts_before_closing_body() {
        let content = Bytes::from("<html><body><p>hi</p></body></html>");
        let spliced = splice_before_body_close(content, "<div>report</div>");
        assert_eq!(
            spliced,
            Bytes::from("<html><body><p>hi</p>\n<div>report</div>\n</body></html>")
        );
    }

    #[test]
    fn missing_marker_is_noop() {
        let content = Bytes::from("{\"json\": true}");
        let spliced = splice_before_body_close(content.clone(), "<div>report</div>");
        assert_eq!(spliced, content);
    }

    #[test]
    fn only_first_marker_is_used() {
        let content = Bytes::from("<body>a</body>b</body>");
        let spliced = splice_before_body_close(content, "X");
        assert_eq!(spliced, Bytes::from("<body>a\nX\n</body>b</body>"));
    }

    #[test]
    fn works_on_non_utf8_content() {
        let mut raw = vec![0xff, 0xfe];
        raw.extend_from_slice(b"</body>");
        let spliced = splice_before_body_close(Bytes::from(raw), "X");
        assert_eq!(&spliced[..], &b"\xff\xfe\nX\n</body>"[..]);
    }

    #[test]
    fn marker_detection() {
        assert!(has_marker(b"<body></body>"));
        assert!(!has_marker(b"<body>"));
        assert!(!has_marker(b""));
    }
}
