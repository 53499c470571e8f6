//! Recursive multipart decoding

use crate::domain::communication::email::Attachment;

use super::{
    encoding::{text_body, TransferEncoding},
    headers::{split_message, HeaderFields, MimeValue},
};

/// Multiparts nested deeper than this are ignored
pub(super) const MAX_DEPTH: usize = 16;

const DEFAULT_ATTACHMENT_NAME: &str = "attachment";

/// What a multipart body yielded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct MultipartContent {
    pub(super) text: Option<String>,
    pub(super) html: Option<String>,
    pub(super) attachments: Vec<Attachment>,
}

/// Decodes a multipart body declared with `boundary`.
///
/// Decoding stops at the first part that cannot be parsed; whatever was
/// collected until then is returned. Nested multiparts only fill the text
/// and HTML slots that are still empty at this level.
pub(super) fn decode(body: &[u8], boundary: Option<&str>, depth: usize) -> MultipartContent {
    let mut content = MultipartContent::default();

    let Some(boundary) = boundary.filter(|boundary| !boundary.is_empty()) else {
        return content;
    };

    if depth >= MAX_DEPTH {
        return content;
    }

    for raw in split_parts(body, boundary) {
        let Some(part) = Part::parse(raw) else {
            break;
        };

        let decoded = part.transfer_encoding().decode(part.body);

        if let Some(filename) = part.attachment_filename() {
            content.attachments.push(Attachment::new(filename, decoded));
            continue;
        }

        let content_type = part.content_type();

        if content_type.is_multipart() {
            let nested = decode(&decoded, content_type.param("boundary"), depth + 1);

            if content.text.is_none() {
                content.text = nested.text;
            }
            if content.html.is_none() {
                content.html = nested.html;
            }
            content.attachments.extend(nested.attachments);
            continue;
        }

        match content_type.value() {
            "text/plain" => content.text = text_body(&decoded),
            "text/html" => content.html = text_body(&decoded),
            _ => {}
        }
    }

    content
}

enum Delimiter {
    Next,
    Close,
}

fn delimiter(line: &[u8], dash_boundary: &[u8]) -> Option<Delimiter> {
    let mut line = line;
    while let Some((last, rest)) = line.split_last() {
        if !matches!(*last, b'\r' | b'\n' | b' ' | b'\t') {
            break;
        }
        line = rest;
    }

    let rest = line.strip_prefix(dash_boundary)?;

    match rest {
        b"" => Some(Delimiter::Next),
        b"--" => Some(Delimiter::Close),
        _ => None,
    }
}

/// Splits a multipart body into the raw bytes of each part.
///
/// The line break before a delimiter belongs to the delimiter. A final part
/// that is never closed by a delimiter runs to the end of the body.
fn split_parts<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let dash_boundary = format!("--{boundary}");
    let mut parts = Vec::new();
    let mut part_start = None;
    let mut offset = 0;

    for line in body.split_inclusive(|&b| b == b'\n') {
        let line_start = offset;
        offset += line.len();

        let Some(kind) = delimiter(line, dash_boundary.as_bytes()) else {
            continue;
        };

        if let Some(start) = part_start.take() {
            parts.push(strip_line_break(&body[start..line_start]));
        }

        match kind {
            Delimiter::Next => part_start = Some(offset),
            Delimiter::Close => break,
        }
    }

    if let Some(start) = part_start {
        parts.push(strip_line_break(&body[start..]));
    }

    parts
}

fn strip_line_break(part: &[u8]) -> &[u8] {
    part.strip_suffix(b"\r\n")
        .or_else(|| part.strip_suffix(b"\n"))
        .unwrap_or(part)
}

struct Part<'a> {
    headers: HeaderFields,
    body: &'a [u8],
}

impl<'a> Part<'a> {
    fn parse(raw: &'a [u8]) -> Option<Self> {
        let (head, body) = match split_message(raw) {
            (head, Some(body)) => (head, body),
            // headers followed directly by the delimiter: an empty body
            (head, None) if raw.ends_with(b"\n") => (head, &raw[raw.len()..]),
            (_, None) => return None,
        };

        let headers = HeaderFields::parse(&String::from_utf8_lossy(head));

        if headers.is_malformed() {
            return None;
        }

        Some(Self { headers, body })
    }

    fn transfer_encoding(&self) -> TransferEncoding {
        TransferEncoding::from_header(self.headers.get("Content-Transfer-Encoding"))
    }

    /// Parts without a Content-Type have an empty type and are neither
    /// text nor HTML.
    fn content_type(&self) -> MimeValue {
        self.headers
            .get("Content-Type")
            .map(MimeValue::content_type)
            .unwrap_or_default()
    }

    /// The filename to store this part under, if it is an attachment.
    ///
    /// `attachment` parts always are; `inline` parts only when they carry a
    /// filename.
    fn attachment_filename(&self) -> Option<String> {
        let disposition = MimeValue::disposition(self.headers.get("Content-Disposition")?);

        match disposition.value() {
            "attachment" => Some(
                disposition
                    .filename()
                    .unwrap_or_else(|| DEFAULT_ATTACHMENT_NAME.to_string()),
            ),
            "inline" => disposition.filename(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_parts_skips_preamble_and_epilogue() {
        let body = b"preamble\r\n--b\r\nA: 1\r\n\r\none\r\n--b\r\n\r\ntwo\r\n--b--\r\nepilogue";
        let parts = split_parts(body, "b");

        assert_eq!(parts, vec![&b"A: 1\r\n\r\none"[..], &b"\r\ntwo"[..]]);
    }

    #[test]
    fn test_split_parts_ignores_longer_boundaries() {
        let body = b"--b\n\nkeep\n--bb\nstill part\n--b--\n";
        let parts = split_parts(body, "b");

        assert_eq!(parts, vec![&b"\nkeep\n--bb\nstill part"[..]]);
    }

    #[test]
    fn test_split_parts_keeps_unterminated_part() {
        let body = b"--b\n\nfirst\n--b\n\nsecond, truncated\n";
        let parts = split_parts(body, "b");

        assert_eq!(parts, vec![&b"\nfirst"[..], &b"\nsecond, truncated"[..]]);
    }

    #[test]
    fn test_decode_truncated_attachment() {
        let body = b"--b\nContent-Type: text/plain\n\nkept\n--b\nContent-Disposition: attachment; filename=cut.bin\n\nnever finish";
        let content = decode(body, Some("b"), 0);

        assert_eq!(content.text.as_deref(), Some("kept"));
        assert_eq!(
            content.attachments,
            vec![Attachment::new("cut.bin", b"never finish".to_vec())]
        );
    }

    #[test]
    fn test_decode_without_boundary_yields_nothing() {
        let content = decode(b"--\n\ntext\n----\n", None, 0);

        assert_eq!(content, MultipartContent::default());
    }

    #[test]
    fn test_decode_stops_at_unparsable_part() {
        let body = b"--b\nContent-Type: text/plain\n\nfirst\n--b\nnot a header line\n\nbroken\n--b\nContent-Disposition: attachment; filename=\"late.txt\"\n\nlate\n--b--\n";
        let content = decode(body, Some("b"), 0);

        assert_eq!(content.text.as_deref(), Some("first"));
        assert!(content.attachments.is_empty());
    }

    #[test]
    fn test_decode_ignores_part_without_content_type() {
        let body = b"--b\n\nuntyped body\n--b\nContent-Type: text/html\n\n<p>typed</p>\n--b--\n";
        let content = decode(body, Some("b"), 0);

        assert_eq!(content.text, None);
        assert_eq!(content.html.as_deref(), Some("<p>typed</p>"));
        assert!(content.attachments.is_empty());
    }

    #[test]
    fn test_decode_headers_only_part() {
        let body = b"--b\nContent-Type: text/html\n\n--b\nContent-Type: text/plain\n\nafter\n--b--\n";
        let content = decode(body, Some("b"), 0);

        assert_eq!(content.html, None);
        assert_eq!(content.text.as_deref(), Some("after"));
    }

    #[test]
    fn test_decode_inline_without_filename_is_body() {
        let body = b"--b\nContent-Type: text/html\nContent-Disposition: inline\n\n<p>hi</p>\n--b--\n";
        let content = decode(body, Some("b"), 0);

        assert_eq!(content.html.as_deref(), Some("<p>hi</p>"));
        assert!(content.attachments.is_empty());
    }

    #[test]
    fn test_decode_base64_attachment() {
        let body = b"--b\r\nContent-Disposition: attachment; filename=\"hello.bin\"\r\nContent-Transfer-Encoding: base64\r\n\r\nSGVsbG8=\r\n--b--\r\n";
        let content = decode(body, Some("b"), 0);

        assert_eq!(
            content.attachments,
            vec![Attachment::new("hello.bin", b"Hello".to_vec())]
        );
    }

    #[test]
    fn test_decode_later_text_part_overwrites() {
        let body = b"--b\nContent-Type: text/plain\n\nfirst\n--b\nContent-Type: text/plain\n\nsecond\n--b--\n";
        let content = decode(body, Some("b"), 0);

        assert_eq!(content.text.as_deref(), Some("second"));
    }

    #[test]
    fn test_decode_empty_later_part_clears_slot() {
        let body = b"--b\nContent-Type: text/plain\n\nfirst\n--b\nContent-Type: text/plain\n\n--b--\n";
        let content = decode(body, Some("b"), 0);

        assert_eq!(content.text, None);
    }

    #[test]
    fn test_decode_nested_does_not_replace_filled_slots() {
        let body = b"--o\nContent-Type: text/plain\n\nouter\n--o\nContent-Type: multipart/alternative; boundary=i\n\n--i\nContent-Type: text/plain\n\ninner\n--i\nContent-Type: text/html\n\n<i>inner</i>\n--i--\n--o--\n";
        let content = decode(body, Some("o"), 0);

        assert_eq!(content.text.as_deref(), Some("outer"));
        assert_eq!(content.html.as_deref(), Some("<i>inner</i>"));
    }

    #[test]
    fn test_decode_respects_depth_limit() {
        let body = b"--b\nContent-Type: text/plain\n\ndeep\n--b--\n";

        assert_eq!(decode(body, Some("b"), MAX_DEPTH), MultipartContent::default());
        assert_eq!(
            decode(body, Some("b"), MAX_DEPTH - 1).text.as_deref(),
            Some("deep")
        );
    }
}
