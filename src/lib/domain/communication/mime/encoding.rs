//! Content-Transfer-Encoding decoding

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};
use quoted_printable::ParseMode;

const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// The transfer encodings the normalizer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TransferEncoding {
    Base64,
    QuotedPrintable,
    /// `7bit`, `8bit`, `binary`, absent or unknown: kept as-is
    Identity,
}

impl TransferEncoding {
    pub(super) fn from_header(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("base64") => Self::Base64,
            Some("quoted-printable") => Self::QuotedPrintable,
            _ => Self::Identity,
        }
    }

    pub(super) fn decode(self, body: &[u8]) -> Vec<u8> {
        match self {
            Self::Base64 => decode_base64(body),
            Self::QuotedPrintable => decode_quoted_printable(body),
            Self::Identity => body.to_vec(),
        }
    }
}

/// Converts a decoded body to text; an empty body counts as absent.
pub(super) fn text_body(decoded: &[u8]) -> Option<String> {
    (!decoded.is_empty()).then(|| String::from_utf8_lossy(decoded).into_owned())
}

/// Whitespace is ignored. When the input turns invalid part way through,
/// everything decoded up to the bad quantum is kept; input that does not
/// start with valid base64 is returned unchanged.
fn decode_base64(body: &[u8]) -> Vec<u8> {
    let cleaned: Vec<u8> = body
        .iter()
        .filter(|b| !b.is_ascii_whitespace())
        .copied()
        .collect();

    if let Ok(decoded) = LENIENT_BASE64.decode(&cleaned) {
        return decoded;
    }

    let mut decoded = Vec::with_capacity(cleaned.len() / 4 * 3);

    for quantum in cleaned.chunks(4) {
        match LENIENT_BASE64.decode(quantum) {
            Ok(bytes) => decoded.extend(bytes),
            Err(_) => break,
        }
    }

    if decoded.is_empty() {
        body.to_vec()
    } else {
        decoded
    }
}

/// Invalid escapes are kept literally. Input the decoder rejects outright is
/// returned unchanged.
fn decode_quoted_printable(body: &[u8]) -> Vec<u8> {
    quoted_printable::decode(body, ParseMode::Robust).unwrap_or_else(|_| body.to_vec())
}
