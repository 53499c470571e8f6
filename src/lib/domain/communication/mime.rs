//! MIME normalization
//!
//! Turns a raw submitted message into an [`Email`]. Parsing never fails:
//! anything that cannot be understood is left out of the result.

mod encoding;
mod headers;
mod multipart;

use crate::domain::communication::email::Email;

use self::{
    encoding::{text_body, TransferEncoding},
    headers::{split_message, HeaderFields, MimeValue},
    multipart::MultipartContent,
};

/// Builds an [`Email`] from a message received over the wire.
///
/// # Arguments
/// * `from` - The envelope sender.
/// * `recipients` - The envelope recipients. These are authoritative; `To`
///   headers in the message are not consulted.
/// * `raw` - The message as submitted: headers, a blank line, then the body.
///
/// # Returns
/// The normalized [`Email`]. It is not validated; see [`Email::validate`].
pub fn normalize(from: &str, recipients: &[String], raw: &[u8]) -> Email {
    let (head, body) = split_message(raw);
    let headers = HeaderFields::parse(&String::from_utf8_lossy(head));

    let content = body
        .map(|body| decode_body(&headers, body))
        .unwrap_or_default();

    let mut email = Email::new(
        from,
        recipients,
        headers.get("Subject").unwrap_or_default(),
        content.text,
        content.html,
        headers.first_values(),
    );

    email.cc = headers.get("Cc").map(split_addresses).unwrap_or_default();
    email.bcc = headers.get("Bcc").map(split_addresses).unwrap_or_default();
    email.reply_to = headers
        .get("Reply-To")
        .filter(|reply_to| !reply_to.is_empty())
        .map(str::to_string);
    email.attachments = content.attachments;

    email
}

fn decode_body(headers: &HeaderFields, body: &[u8]) -> MultipartContent {
    let content_type = headers.get("Content-Type").map(MimeValue::content_type);

    if let Some(content_type) = content_type.as_ref().filter(|ct| ct.is_multipart()) {
        return multipart::decode(body, content_type.param("boundary"), 0);
    }

    let decoded = TransferEncoding::from_header(headers.get("Content-Transfer-Encoding"))
        .decode(body);

    match content_type {
        Some(content_type) if content_type.value() == "text/html" => MultipartContent {
            html: text_body(&decoded),
            ..Default::default()
        },
        _ => MultipartContent {
            text: text_body(&decoded),
            ..Default::default()
        },
    }
}

fn split_addresses(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|address| !address.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    use super::*;

    const SENDER: &str = "sender@example.com";

    fn recipients() -> Vec<String> {
        vec!["recipient@example.com".to_string()]
    }

    #[test]
    fn test_simple_text() {
        let raw = b"Subject: Test\nFrom: sender@example.com\nContent-Type: text/plain; charset=utf-8\n\nHello, World!";

        let email = normalize(SENDER, &recipients(), raw);

        assert_eq!(email.subject, "Test");
        assert_eq!(email.text.as_deref(), Some("Hello, World!"));
        assert_eq!(email.html, None);
        assert_eq!(email.from, SENDER);
        assert_eq!(email.to, recipients());
    }

    #[test]
    fn test_simple_html() {
        let raw = b"Subject: Test\r\nContent-Type: text/html; charset=utf-8\r\n\r\n<b>Hello</b>";

        let email = normalize(SENDER, &recipients(), raw);

        assert_eq!(email.html.as_deref(), Some("<b>Hello</b>"));
        assert_eq!(email.text, None);
    }

    #[test]
    fn test_missing_content_type_is_text() {
        let email = normalize(SENDER, &recipients(), b"Subject: Test\n\nBody");

        assert_eq!(email.text.as_deref(), Some("Body"));
        assert!(email.validate().is_ok());
    }

    #[test]
    fn test_unrecognized_content_type_is_text() {
        let raw = b"Content-Type: application/json\n\n{\"a\": 1}";

        let email = normalize(SENDER, &recipients(), raw);

        assert_eq!(email.text.as_deref(), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_no_blank_line() {
        let raw = b"Subject: Only headers\nX-Custom: yes\nContent-Type: text/plain";

        let email = normalize(SENDER, &recipients(), raw);

        assert_eq!(email.text, None);
        assert_eq!(email.html, None);
        assert!(email.attachments.is_empty());
        assert_eq!(email.subject, "Only headers");
        assert_eq!(email.header("x-custom"), Some("yes"));
    }

    #[test]
    fn test_empty_body() {
        let email = normalize(SENDER, &recipients(), b"Subject: Test\nFrom: a@example.com\n\n");

        assert_eq!(email.text, None);
        assert_eq!(email.html, None);
    }

    #[test]
    fn test_base64_round_trip() {
        let original = "Grüße aus dem Gateway!\nSecond line.";
        let raw = format!(
            "Subject: Test\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Transfer-Encoding: base64\r\n\r\n{}\r\n",
            STANDARD.encode(original)
        );

        let email = normalize(SENDER, &recipients(), raw.as_bytes());

        assert_eq!(email.text.as_deref(), Some(original));
    }

    #[test]
    fn test_quoted_printable() {
        let raw = b"Subject: Test\nContent-Type: text/plain; charset=utf-8\nContent-Transfer-Encoding: quoted-printable\n\nHello=20World!\n";

        let email = normalize(SENDER, &recipients(), raw);

        assert_eq!(email.text.as_deref().map(str::trim_end), Some("Hello World!"));
    }

    #[test]
    fn test_unknown_transfer_encoding_is_kept() {
        let raw = b"Content-Transfer-Encoding: x-rot13\n\nUryyb";

        let email = normalize(SENDER, &recipients(), raw);

        assert_eq!(email.text.as_deref(), Some("Uryyb"));
    }

    #[test]
    fn test_cc_bcc_and_reply_to() {
        let raw = b"Subject: Test\nCc: cc1@example.com, , cc2@example.com \nBcc: bcc@example.com\nReply-To: reply@example.com\n\nBody text\n";

        let email = normalize(SENDER, &recipients(), raw);

        assert_eq!(email.cc, vec!["cc1@example.com", "cc2@example.com"]);
        assert_eq!(email.bcc, vec!["bcc@example.com"]);
        assert_eq!(email.reply_to.as_deref(), Some("reply@example.com"));
    }

    #[test]
    fn test_recipients_come_from_envelope() {
        let envelope = vec!["r1@example.com".to_string(), "r2@example.com".to_string()];
        let raw = b"To: someone-else@example.com\n\nBody";

        let email = normalize(SENDER, &envelope, raw);

        assert_eq!(email.to, envelope);
        assert!(email.tags.is_empty());
    }

    #[test]
    fn test_custom_headers_first_occurrence_wins() {
        let raw = b"Subject: Test\nX-Custom-Header: Custom Value\nX-Another-Header: Another Value\nx-custom-header: Duplicate\n\nBody text\n";

        let email = normalize(SENDER, &recipients(), raw);

        assert_eq!(
            email.headers.get("X-Custom-Header").map(String::as_str),
            Some("Custom Value")
        );
        assert_eq!(
            email.headers.get("X-Another-Header").map(String::as_str),
            Some("Another Value")
        );
        assert!(!email.headers.contains_key("x-custom-header"));
    }

    #[test]
    fn test_multipart_alternative() {
        let raw = b"Subject: Test
Content-Type: multipart/alternative; boundary=boundary12345

--boundary12345
Content-Type: text/plain

Plain text version
--boundary12345
Content-Type: text/html

<b>HTML version</b>
--boundary12345--
";

        let email = normalize(SENDER, &recipients(), raw);

        assert_eq!(email.text.as_deref(), Some("Plain text version"));
        assert_eq!(email.html.as_deref(), Some("<b>HTML version</b>"));
    }

    #[test]
    fn test_multipart_alternative_html_first() {
        let raw = b"Content-Type: multipart/alternative; boundary=\"b\"\r\n\r\n--b\r\nContent-Type: text/html\r\n\r\n<p>first</p>\r\n--b\r\nContent-Type: text/plain\r\n\r\nsecond\r\n--b--\r\n";

        let email = normalize(SENDER, &recipients(), raw);

        assert_eq!(email.text.as_deref(), Some("second"));
        assert_eq!(email.html.as_deref(), Some("<p>first</p>"));
    }

    #[test]
    fn test_multiple_attachments_in_order() {
        let raw = b"Subject: Test
Content-Type: multipart/mixed; boundary=boundary12345

--boundary12345
Content-Type: text/plain

Body text
--boundary12345
Content-Disposition: attachment; filename=\"file1.txt\"

Content 1
--boundary12345
Content-Disposition: attachment; filename=\"file2.txt\"
Content-Transfer-Encoding: base64

Q29udGVudCAy
--boundary12345--
";

        let email = normalize(SENDER, &recipients(), raw);

        assert_eq!(email.text.as_deref(), Some("Body text"));
        assert_eq!(email.attachments.len(), 2);
        assert_eq!(email.attachments[0].filename, "file1.txt");
        assert_eq!(email.attachments[0].content, b"Content 1");
        assert_eq!(email.attachments[1].filename, "file2.txt");
        assert_eq!(email.attachments[1].content, b"Content 2");
    }

    #[test]
    fn test_attachment_without_filename() {
        let raw = b"Subject: Test
Content-Type: multipart/mixed; boundary=boundary12345

--boundary12345
Content-Type: text/plain

Body
--boundary12345
Content-Disposition: attachment

Attachment content
--boundary12345--
";

        let email = normalize(SENDER, &recipients(), raw);

        assert_eq!(email.attachments.len(), 1);
        assert_eq!(email.attachments[0].filename, "attachment");
        assert_eq!(email.attachments[0].content, b"Attachment content");
    }

    #[test]
    fn test_inline_attachment_with_filename() {
        let raw = b"Subject: Test
Content-Type: multipart/related; boundary=boundary12345

--boundary12345
Content-Type: text/html

<img src=\"cid:image.png\">
--boundary12345
Content-Type: image/png
Content-Disposition: inline; filename=\"image.png\"

PNG content
--boundary12345--
";

        let email = normalize(SENDER, &recipients(), raw);

        assert_eq!(email.html.as_deref(), Some("<img src=\"cid:image.png\">"));
        assert_eq!(email.attachments.len(), 1);
        assert_eq!(email.attachments[0].filename, "image.png");
    }

    #[test]
    fn test_nested_multipart() {
        let raw = b"Subject: Test
From: sender@example.com
Content-Type: multipart/mixed; boundary=outer12345

--outer12345
Content-Type: multipart/alternative; boundary=inner12345

--inner12345
Content-Type: text/plain

Plain
--inner12345
Content-Type: text/html

<b>HTML</b>
--inner12345--
--outer12345
Content-Disposition: attachment; filename=\"file.txt\"

Attachment content
--outer12345--
";

        let email = normalize(SENDER, &recipients(), raw);

        assert_eq!(email.text.as_deref(), Some("Plain"));
        assert_eq!(email.html.as_deref(), Some("<b>HTML</b>"));
        assert_eq!(email.attachments.len(), 1);
        assert_eq!(email.attachments[0].filename, "file.txt");
    }

    #[test]
    fn test_nested_attachments_keep_traversal_order() {
        let raw = b"Content-Type: multipart/mixed; boundary=o

--o
Content-Disposition: attachment; filename=a.txt

A
--o
Content-Type: multipart/mixed; boundary=i

--i
Content-Disposition: attachment; filename=b.txt

B
--i--
--o
Content-Disposition: attachment; filename=c.txt

C
--o--
";

        let email = normalize(SENDER, &recipients(), raw);

        let names: Vec<_> = email
            .attachments
            .iter()
            .map(|a| a.filename.as_str())
            .collect();

        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
    }

    #[test]
    fn test_truncated_multipart_keeps_partial_part() {
        let raw = b"Content-Type: multipart/mixed; boundary=b

--b
Content-Type: text/plain

kept
--b
Content-Disposition: attachment; filename=cut.bin

never finish";

        let email = normalize(SENDER, &recipients(), raw);

        assert_eq!(email.text.as_deref(), Some("kept"));
        assert_eq!(email.attachments.len(), 1);
        assert_eq!(email.attachments[0].filename, "cut.bin");
        assert_eq!(email.attachments[0].content, b"never finish");
    }

    #[test]
    fn test_multipart_with_wrong_boundary() {
        let raw = b"Content-Type: multipart/mixed; boundary=expected\n\n--actual\nContent-Type: text/plain\n\ntext\n--actual--\n";

        let email = normalize(SENDER, &recipients(), raw);

        assert_eq!(email.text, None);
        assert_eq!(email.html, None);
        assert!(email.attachments.is_empty());
    }
}
