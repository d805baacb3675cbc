/// Encoding Adapter - plain text <-> execution service wire format
///
/// The execution service expects and returns standard base64 for source,
/// stdin and every captured stream. Long payloads come back line-wrapped,
/// so whitespace is ignored on the way in.
use base64::{engine::general_purpose, Engine as _};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("decoded payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub fn encode(text: &str) -> String {
    general_purpose::STANDARD.encode(text)
}

pub fn decode(wire: &str) -> Result<String, DecodeError> {
    let compact: String = wire.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = general_purpose::STANDARD.decode(compact)?;
    Ok(String::from_utf8(bytes)?)
}
