//! Decoder for the modified UTF-8 variant used throughout the stream format.
//!
//! This is the JVM encoding described in the JNI specification: only one- to
//! three-byte forms exist, U+0000 is written as the two-byte sequence `C0 80`
//! (a lone zero byte is never valid), and supplementary code points appear as
//! two three-byte-encoded surrogate halves. A standard UTF-8 decoder must not
//! be substituted here; the two formats differ on exactly those points.

use crate::{Result, StreamError};

/// Decodes `data` into a string. Surrogate halves are paired back into their
/// supplementary code point; an unpaired half is a format error.
pub fn decode(data: &[u8]) -> Result<String> {
    let mut units: Vec<u16> = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        let a = data[i];
        i += 1;
        if a & 0x80 == 0 {
            // U+0001..U+007F
            if a == 0 {
                return Err(StreamError::NullInUtf);
            }
            units.push(a as u16);
        } else if a & 0xe0 == 0xc0 {
            // U+0000..U+07FF
            let b = continuation(data, i)?;
            i += 1;
            units.push(((a as u16 & 0x1f) << 6) | (b as u16 & 0x3f));
        } else if a & 0xf0 == 0xe0 {
            // U+0800..U+FFFF, including surrogate halves
            let b = continuation(data, i)?;
            let c = continuation(data, i + 1)?;
            i += 2;
            units.push(((a as u16 & 0x0f) << 12) | ((b as u16 & 0x3f) << 6) | (c as u16 & 0x3f));
        } else {
            return Err(StreamError::InvalidUtfByte(a));
        }
    }
    String::from_utf16(&units).map_err(|_| StreamError::UnpairedSurrogate)
}

fn continuation(data: &[u8], i: usize) -> Result<u8> {
    let b = *data.get(i).ok_or(StreamError::TruncatedUtf)?;
    if b & 0xc0 != 0x80 {
        return Err(StreamError::BadUtfContinuation);
    }
    Ok(b)
}

#[cfg(test)]
mod decode_tests {
    use super::*;

    #[test]
    fn it_should_decode_ascii() {
        assert_eq!("zoo", decode(b"zoo").unwrap());
    }

    #[test]
    fn it_should_reject_a_lone_zero_byte() {
        assert!(matches!(decode(&[0x7a, 0x00]), Err(StreamError::NullInUtf)));
    }

    #[test]
    fn it_should_decode_the_two_byte_form_of_nul() {
        assert_eq!("\u{0}", decode(&[0xc0, 0x80]).unwrap());
    }

    #[test]
    fn it_should_decode_two_byte_sequences() {
        assert_eq!("\u{e9}", decode(&[0xc3, 0xa9]).unwrap());
    }

    #[test]
    fn it_should_decode_three_byte_sequences() {
        assert_eq!("\u{20ac}", decode(&[0xe2, 0x82, 0xac]).unwrap());
    }

    #[test]
    fn it_should_pair_surrogate_halves() {
        assert_eq!(
            "\u{10400}",
            decode(&[0xed, 0xa0, 0x81, 0xed, 0xb0, 0x80]).unwrap()
        );
    }

    #[test]
    fn it_should_reject_a_bad_continuation_byte() {
        assert!(matches!(
            decode(&[0xc3, 0x29]),
            Err(StreamError::BadUtfContinuation)
        ));
    }

    #[test]
    fn it_should_reject_four_byte_sequences() {
        assert!(matches!(
            decode(&[0xf0, 0x90, 0x90, 0x80]),
            Err(StreamError::InvalidUtfByte(0xf0))
        ));
    }

    #[test]
    fn it_should_reject_an_unpaired_surrogate() {
        assert!(matches!(
            decode(&[0xed, 0xa0, 0x81]),
            Err(StreamError::UnpairedSurrogate)
        ));
    }

    #[test]
    fn it_should_reject_a_truncated_sequence() {
        assert!(matches!(decode(&[0xe2, 0x82]), Err(StreamError::TruncatedUtf)));
    }
}
