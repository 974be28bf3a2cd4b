//! Character set detection and encoding-safe output.
//!
//! Decoding runs a fixed ladder: BOM sniff, then the XML declaration label,
//! then strict UTF-8, then windows-1251 (the dominant legacy encoding for
//! Russian e-books). Encoding goes through [`EncodingPlan`]: single-byte
//! targets get a counting numeric-character-reference fallback bounded by a
//! per-document threshold, so a document that would come out mostly as
//! `&#x...;` soup is rejected with [`Error::FallbackOverflow`] instead.

use encoding_rs::{Encoding, EncoderResult, UTF_8, WINDOWS_1251};

use crate::error::{Error, Result};

/// Decoded document text together with the detected source encoding.
pub struct DecodedText {
    pub text: String,
    pub encoding: &'static Encoding,
}

/// Decode raw document bytes.
///
/// Detection order: byte-order mark, XML declaration `encoding` label,
/// strict UTF-8 validation, windows-1251 fallback.
pub fn decode(bytes: &[u8]) -> DecodedText {
    if let Some((encoding, _bom_len)) = Encoding::for_bom(bytes) {
        let (text, _, _) = encoding.decode(bytes);
        return DecodedText {
            text: text.into_owned(),
            encoding,
        };
    }

    if let Some(label) = extract_xml_encoding(bytes)
        && let Some(encoding) = Encoding::for_label(label.as_bytes())
    {
        let (text, _, _) = encoding.decode(bytes);
        return DecodedText {
            text: text.into_owned(),
            encoding,
        };
    }

    let (text, _, malformed) = UTF_8.decode(bytes);
    if !malformed {
        return DecodedText {
            text: text.into_owned(),
            encoding: UTF_8,
        };
    }

    let (text, _, _) = WINDOWS_1251.decode(bytes);
    DecodedText {
        text: text.into_owned(),
        encoding: WINDOWS_1251,
    }
}

/// Extract the encoding label from an XML declaration.
///
/// Parses `<?xml ... encoding="..." ?>` in the first ~100 bytes.
pub fn extract_xml_encoding(bytes: &[u8]) -> Option<&str> {
    let check_len = bytes.len().min(100);
    let prefix = &bytes[..check_len];

    let xml_start = prefix.windows(5).position(|w| w == b"<?xml")?;
    let after_xml = &prefix[xml_start..];

    let enc_pos = after_xml
        .windows(9)
        .position(|w| w.eq_ignore_ascii_case(b"encoding="))?;
    let after_enc = &after_xml[enc_pos + 9..];

    if after_enc.is_empty() {
        return None;
    }

    let quote = after_enc[0];
    if quote != b'"' && quote != b'\'' {
        return None;
    }

    let value_start = 1;
    let value_end = after_enc[value_start..].iter().position(|&b| b == quote)? + value_start;

    std::str::from_utf8(&after_enc[value_start..value_end]).ok()
}

/// Resolve a user-supplied encoding label.
pub fn encoding_for_label(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.as_bytes())
        .ok_or_else(|| Error::UnknownEncoding(label.to_string()))
}

/// Output encoding choice for one document.
#[derive(Debug, Clone, Copy)]
pub struct EncodingPlan {
    pub encoding: &'static Encoding,
    /// Unmappable-character budget; crossing it aborts the encode.
    pub threshold: u64,
}

impl EncodingPlan {
    /// Choose the output encoding for a document.
    ///
    /// An explicit user preference wins; otherwise the detected source
    /// encoding is kept. UTF-16 sources serialize as UTF-8 (encoders only
    /// produce ASCII-compatible encodings). The threshold is 25% of the
    /// document's visible text length.
    pub fn choose(
        preferred: Option<&'static Encoding>,
        detected: &'static Encoding,
        text_len: usize,
    ) -> Self {
        let encoding = preferred.unwrap_or(detected).output_encoding();
        Self {
            encoding,
            threshold: (text_len as f64 * 0.25) as u64,
        }
    }

    /// The universal retry target. Cannot overflow the fallback.
    pub fn utf8() -> Self {
        Self {
            encoding: UTF_8,
            threshold: 0,
        }
    }

    pub fn label(&self) -> &'static str {
        self.encoding.name()
    }
}

/// Encode serialized document text according to a plan.
///
/// Characters the target cannot represent become `&#xH;` references
/// (uppercase hex of the Unicode scalar value) and are counted; exceeding
/// the plan's threshold aborts with [`Error::FallbackOverflow`] rather than
/// emitting a partially substituted document.
pub fn encode(text: &str, plan: &EncodingPlan) -> Result<Vec<u8>> {
    if plan.encoding == UTF_8 {
        return Ok(text.as_bytes().to_vec());
    }

    let mut encoder = plan.encoding.new_encoder();
    let mut out = Vec::with_capacity(text.len() + 16);
    let mut unmapped: u64 = 0;
    let mut src = text;

    loop {
        let needed = encoder
            .max_buffer_length_from_utf8_without_replacement(src.len())
            .unwrap_or(src.len() + 16);
        out.reserve(needed.max(16));

        let (result, read) = encoder.encode_from_utf8_to_vec_without_replacement(src, &mut out, true);
        src = &src[read..];

        match result {
            EncoderResult::InputEmpty => break,
            EncoderResult::OutputFull => continue,
            EncoderResult::Unmappable(c) => {
                unmapped += 1;
                if unmapped > plan.threshold {
                    return Err(Error::FallbackOverflow(plan.encoding.name()));
                }
                let reference = format!("&#x{:X};", c as u32);
                out.extend_from_slice(reference.as_bytes());
            }
        }
    }

    Ok(out)
}
