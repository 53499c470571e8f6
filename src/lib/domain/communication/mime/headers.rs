//! Header blocks and parameterized header values

use std::collections::{BTreeMap, HashMap, HashSet};

use mailparse::{DispositionType, ParsedContentDisposition, ParsedContentType};

/// Splits a message (or part) into its header block and body.
///
/// The first `\r\n\r\n` wins; a bare `\n\n` is only used when there is no
/// CRLF blank line. Returns `None` for the body when there is no blank line.
pub(super) fn split_message(raw: &[u8]) -> (&[u8], Option<&[u8]>) {
    if let Some(body) = raw.strip_prefix(b"\r\n") {
        return (&[], Some(body));
    }

    if let Some(body) = raw.strip_prefix(b"\n") {
        return (&[], Some(body));
    }

    if let Some(pos) = find(raw, b"\r\n\r\n") {
        return (&raw[..pos], Some(&raw[pos + 4..]));
    }

    if let Some(pos) = find(raw, b"\n\n") {
        return (&raw[..pos], Some(&raw[pos + 2..]));
    }

    (raw, None)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// An ordered list of header fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct HeaderFields {
    fields: Vec<(String, String)>,
    malformed: bool,
}

impl HeaderFields {
    /// Parses a header block, unfolding continuation lines.
    ///
    /// Lines that are neither a `Name: value` field nor a continuation are
    /// skipped, and the block is flagged as malformed.
    pub(super) fn parse(block: &str) -> Self {
        let mut headers = Self::default();

        for line in block.lines() {
            if line.starts_with(' ') || line.starts_with('\t') {
                match headers.fields.last_mut() {
                    Some((_, value)) => {
                        if !value.is_empty() {
                            value.push(' ');
                        }
                        value.push_str(line.trim());
                    }
                    None => headers.malformed = true,
                }
                continue;
            }

            if line.trim().is_empty() {
                continue;
            }

            match line.split_once(':') {
                Some((name, value)) if !name.trim().is_empty() => {
                    headers
                        .fields
                        .push((name.trim().to_string(), value.trim().to_string()));
                }
                _ => headers.malformed = true,
            }
        }

        headers
    }

    /// Returns the first value of the named header, ignoring case.
    pub(super) fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whether any line of the block could not be parsed
    pub(super) fn is_malformed(&self) -> bool {
        self.malformed
    }

    /// Collapses the fields into a map, keeping the first value (and the
    /// spelling of the first name) of each case-insensitive header name.
    pub(super) fn first_values(&self) -> HashMap<String, String> {
        let mut seen = HashSet::new();
        let mut map = HashMap::new();

        for (name, value) in &self.fields {
            if seen.insert(name.to_ascii_lowercase()) {
                map.insert(name.clone(), value.clone());
            }
        }

        map
    }
}

/// A parameterized header value, as used by `Content-Type` and
/// `Content-Disposition`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct MimeValue {
    value: String,
    params: BTreeMap<String, String>,
}

impl MimeValue {
    /// Parses a `Content-Type` value such as `multipart/mixed; boundary=x`.
    pub(super) fn content_type(header: &str) -> Self {
        let ParsedContentType {
            mimetype, params, ..
        } = mailparse::parse_content_type(header);

        Self {
            value: mimetype.trim().to_ascii_lowercase(),
            params,
        }
    }

    /// Parses a `Content-Disposition` value such as `attachment; filename=x`.
    pub(super) fn disposition(header: &str) -> Self {
        let ParsedContentDisposition {
            disposition,
            params,
        } = mailparse::parse_content_disposition(header);

        let value = match disposition {
            DispositionType::Inline => "inline".to_string(),
            DispositionType::Attachment => "attachment".to_string(),
            DispositionType::FormData => "form-data".to_string(),
            DispositionType::Extension(other) => other.trim().to_ascii_lowercase(),
        };

        Self { value, params }
    }

    /// The lowercased leading token, e.g. `multipart/mixed` or `attachment`
    pub(super) fn value(&self) -> &str {
        &self.value
    }

    pub(super) fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub(super) fn is_multipart(&self) -> bool {
        self.value.starts_with("multipart/")
    }

    /// The declared filename, with RFC 2231 `filename*` already decoded.
    ///
    /// Directory components are stripped; an empty name counts as absent.
    pub(super) fn filename(&self) -> Option<String> {
        let base = self
            .param("filename")?
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .trim();

        (!base.is_empty()).then(|| base.to_string())
    }
}
