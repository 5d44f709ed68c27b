//! Byte decoding with a best-guess fallback.
//!
//! Order: byte-order mark, strict UTF-8, then the encoding guessed by
//! `chardetng`. Malformed sequences are fatal in every step.

use crate::error::{CodecError, CodecResult};
use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use tracing::debug;

/// Decoded text plus the encoding that produced it
#[derive(Debug, Clone)]
pub struct Decoded {
    pub text: String,
    pub encoding: &'static str,
}

pub fn decode(bytes: &[u8]) -> CodecResult<Decoded> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        return decode_strict(encoding, &bytes[bom_len..], 0);
    }

    let invalid_at = match std::str::from_utf8(bytes) {
        Ok(text) => {
            return Ok(Decoded {
                text: text.to_string(),
                encoding: UTF_8.name(),
            })
        }
        Err(e) => e.valid_up_to(),
    };

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let guess = detector.guess(None, false);

    debug!(
        guess = guess.name(),
        invalid_at, "Subtitle bytes are not UTF-8, trying detected encoding"
    );

    decode_strict(guess, bytes, invalid_at)
}

fn decode_strict(encoding: &'static Encoding, bytes: &[u8], offset: usize) -> CodecResult<Decoded> {
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| Decoded {
            text: text.into_owned(),
            encoding: encoding.name(),
        })
        .ok_or_else(|| CodecError::Encoding {
            offset,
            encoding: encoding.name().to_string(),
        })
}
