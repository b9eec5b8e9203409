// Message codec — turning untrusted payload bytes into router payloads

use thiserror::Error;

use crate::config::PayloadDecoding;

/// Maximum attribute value length accepted from a central (ATT limit)
pub const MAX_PAYLOAD_SIZE: usize = 512;

/// Errors while decoding a payload
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Payload too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },
    #[error("Byte 0x{byte:02X} at offset {offset} is not ASCII")]
    NotAscii { offset: usize, byte: u8 },
    #[error("Invalid UTF-8 at offset {offset}")]
    InvalidUtf8 { offset: usize },
}

/// Decode written bytes into text according to `decoding`
pub fn decode_text(bytes: &[u8], decoding: PayloadDecoding) -> Result<String, DecodeError> {
    if bytes.len() > MAX_PAYLOAD_SIZE {
        return Err(DecodeError::TooLarge {
            size: bytes.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    match decoding {
        // Every byte maps onto the code point of the same value
        PayloadDecoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        PayloadDecoding::Ascii => {
            if let Some((offset, &byte)) = bytes.iter().enumerate().find(|(_, b)| !b.is_ascii()) {
                return Err(DecodeError::NotAscii { offset, byte });
            }
            Ok(bytes.iter().map(|&b| char::from(b)).collect())
        }
        PayloadDecoding::Utf8 => std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| DecodeError::InvalidUtf8 {
                offset: e.valid_up_to(),
            }),
    }
}

/// Decode manufacturer data into an opaque 32-bit token.
///
/// The bytes are read as one little-endian unsigned integer of any length
/// and masked to its low 32 bits, so only the first four bytes matter.
/// Empty data decodes to 0.
pub fn decode_token(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    let len = bytes.len().min(4);
    buf[..len].copy_from_slice(&bytes[..len]);
    u32::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin1_decoding() {
        assert_eq!(
            decode_text(&[65, 66, 67], PayloadDecoding::Latin1).unwrap(),
            "ABC"
        );
        // High bytes become U+0080..=U+00FF rather than failing
        let text = decode_text(&[0xE9, 0xFF], PayloadDecoding::Latin1).unwrap();
        assert_eq!(text, "\u{e9}\u{ff}");
        assert_eq!(decode_text(&[], PayloadDecoding::Latin1).unwrap(), "");
    }

    #[test]
    fn test_ascii_decoding_rejects_high_bytes() {
        assert_eq!(
            decode_text(b"hello", PayloadDecoding::Ascii).unwrap(),
            "hello"
        );
        assert_eq!(
            decode_text(&[0x41, 0x80], PayloadDecoding::Ascii),
            Err(DecodeError::NotAscii {
                offset: 1,
                byte: 0x80
            })
        );
    }

    #[test]
    fn test_utf8_decoding() {
        assert_eq!(
            decode_text("čau".as_bytes(), PayloadDecoding::Utf8).unwrap(),
            "čau"
        );
        assert_eq!(
            decode_text(&[0x61, 0xC3], PayloadDecoding::Utf8),
            Err(DecodeError::InvalidUtf8 { offset: 1 })
        );
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let data = vec![0x41u8; MAX_PAYLOAD_SIZE + 1];
        let result = decode_text(&data, PayloadDecoding::Latin1);
        assert!(matches!(result, Err(DecodeError::TooLarge { .. })));

        let data = vec![0x41u8; MAX_PAYLOAD_SIZE];
        assert!(decode_text(&data, PayloadDecoding::Latin1).is_ok());
    }

    #[test]
    fn test_decode_token_little_endian() {
        assert_eq!(decode_token(&[0x01, 0x00, 0x00, 0x00]), 1);
        assert_eq!(decode_token(&[0x78, 0x56, 0x34, 0x12]), 0x1234_5678);
        assert_eq!(decode_token(&[0xFF, 0x01]), 0x01FF);
        assert_eq!(decode_token(&[]), 0);
    }

    #[test]
    fn test_decode_token_masks_to_low_32_bits() {
        assert_eq!(
            decode_token(&[0x78, 0x56, 0x34, 0x12, 0xAA, 0xBB, 0xCC]),
            0x1234_5678
        );
    }
}
