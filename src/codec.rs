//! Byte/string codecs
//!
//! Salts travel inside file names as lower-case hex; digests printed by the
//! command line may be rendered either way.

use crate::error::{ChurnError, ErrorCategory, ErrorKind, Result};
use base64::{Engine, engine::general_purpose::STANDARD};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteCodec {
    /// Lower-case hexadecimal, two characters per byte.
    Hex,
    /// Standard base64 alphabet with padding.
    Base64,
}

impl ByteCodec {
    pub fn encode(self, bytes: &[u8]) -> String {
        match self {
            ByteCodec::Hex => hex::encode(bytes),
            ByteCodec::Base64 => STANDARD.encode(bytes),
        }
    }

    pub fn decode(self, text: &str) -> Result<Vec<u8>> {
        match self {
            ByteCodec::Hex => hex::decode(text).map_err(|e| {
                ChurnError::with_kind_and_source(
                    ErrorCategory::User,
                    ErrorKind::Codec,
                    format!("hex decoding failed: {}", e),
                    e,
                )
            }),
            ByteCodec::Base64 => STANDARD.decode(text).map_err(|e| {
                ChurnError::with_kind_and_source(
                    ErrorCategory::User,
                    ErrorKind::Codec,
                    format!("base64 decoding failed: {}", e),
                    e,
                )
            }),
        }
    }
}
