use log::warn;

/// Decode RFC 2047 encoded words in a header value.
pub fn decode_mime_words(raw: &[u8]) -> String {
    // mailparse expects a full "Key: value" header line
    let mut line = b"X: ".to_vec();
    line.extend_from_slice(raw);
    line.extend_from_slice(b"\r\n");

    match mailparse::parse_header(&line) {
        Ok((h, _idx)) => h.get_value(),
        Err(_) => decode_text(raw, None),
    }
}

/// One step of the body charset fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate<'a> {
    /// Charset named by the part's `Content-Type`.
    Declared(&'a str),
    Utf8,
    Latin1,
    Iso8859_1,
    Windows1252,
}

impl Candidate<'_> {
    /// Strict decode: `None` when the label is unknown or the bytes are not
    /// valid in this encoding.
    fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            Candidate::Declared(label) if is_ascii_label(label) => {
                bytes.is_ascii().then(|| String::from_utf8_lossy(bytes).into_owned())
            }
            Candidate::Declared(label) => {
                let encoding = encoding_rs::Encoding::for_label(label.trim().as_bytes())?;
                encoding
                    .decode_without_bom_handling_and_without_replacement(bytes)
                    .map(|s| s.into_owned())
            }
            Candidate::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_owned),
            // ISO-8859-1 maps every byte to the code point of the same value.
            Candidate::Latin1 | Candidate::Iso8859_1 => {
                Some(bytes.iter().map(|&b| b as char).collect())
            }
            Candidate::Windows1252 => encoding_rs::WINDOWS_1252
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|s| s.into_owned()),
        }
    }
}

// encoding_rs treats ASCII labels as windows-1252, which would accept
// undeclared 8-bit bodies and hide UTF-8 behind mojibake.
fn is_ascii_label(label: &str) -> bool {
    matches!(
        label.trim().to_ascii_lowercase().as_str(),
        "us-ascii" | "ascii" | "ansi_x3.4-1968" | "us"
    )
}

/// Declared charset first (when present), then the fixed fallbacks.
pub fn fallback_chain(declared: Option<&str>) -> Vec<Candidate<'_>> {
    let mut chain = Vec::with_capacity(5);
    if let Some(label) = declared.map(str::trim).filter(|l| !l.is_empty()) {
        chain.push(Candidate::Declared(label));
    }
    chain.extend([
        Candidate::Utf8,
        Candidate::Latin1,
        Candidate::Iso8859_1,
        Candidate::Windows1252,
    ]);
    chain
}

/// Try each candidate in order; if none accepts the bytes, decode as UTF-8
/// with U+FFFD substitution. Never fails.
pub fn decode_with(candidates: &[Candidate<'_>], bytes: &[u8]) -> String {
    for candidate in candidates {
        if let Some(text) = candidate.decode(bytes) {
            return text;
        }
    }
    warn!("Failed to decode with all encodings, using replacement characters");
    String::from_utf8_lossy(bytes).into_owned()
}

pub fn decode_text(bytes: &[u8], declared: Option<&str>) -> String {
    decode_with(&fallback_chain(declared), bytes)
}
