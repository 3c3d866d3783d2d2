//! Primitive encoders shared by the message and registrar codecs
//!
//! Strings are UTF-8 with a 32-bit big-endian length prefix. Optional
//! strings carry a one-byte presence marker first.

use bytes::{Buf, BufMut, Bytes};

use crate::error::DecodeError;

pub(crate) fn put_string(buf: &mut impl BufMut, value: &str) {
    // Anything past u32 cannot fit a transport packet, so the codec
    // rejects the frame before it is written.
    let len = u32::try_from(value.len()).unwrap_or(u32::MAX);
    buf.put_u32(len);
    buf.put_slice(value.as_bytes());
}

pub(crate) fn put_opt_string(buf: &mut impl BufMut, value: Option<&str>) {
    match value {
        Some(v) => {
            buf.put_u8(1);
            put_string(buf, v);
        }
        None => buf.put_u8(0),
    }
}

pub(crate) fn get_u8(buf: &mut Bytes) -> Result<u8, DecodeError> {
    if buf.remaining() < 1 {
        return Err(DecodeError::UnexpectedEof);
    }
    Ok(buf.get_u8())
}

pub(crate) fn get_u16(buf: &mut Bytes) -> Result<u16, DecodeError> {
    if buf.remaining() < 2 {
        return Err(DecodeError::UnexpectedEof);
    }
    Ok(buf.get_u16())
}

pub(crate) fn get_u32(buf: &mut Bytes) -> Result<u32, DecodeError> {
    if buf.remaining() < 4 {
        return Err(DecodeError::UnexpectedEof);
    }
    Ok(buf.get_u32())
}

pub(crate) fn get_u64(buf: &mut Bytes) -> Result<u64, DecodeError> {
    if buf.remaining() < 8 {
        return Err(DecodeError::UnexpectedEof);
    }
    Ok(buf.get_u64())
}

pub(crate) fn get_string(buf: &mut Bytes) -> Result<String, DecodeError> {
    let len = get_u32(buf)? as usize;
    if buf.remaining() < len {
        return Err(DecodeError::UnexpectedEof);
    }
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
}

pub(crate) fn get_opt_string(buf: &mut Bytes) -> Result<Option<String>, DecodeError> {
    match get_u8(buf)? {
        0 => Ok(None),
        1 => get_string(buf).map(Some),
        value => Err(DecodeError::InvalidTag {
            field: "option",
            value,
        }),
    }
}

/// Interpret a frame as UTF-8 text
pub(crate) fn frame_str(frame: &Bytes) -> Result<&str, DecodeError> {
    std::str::from_utf8(frame).map_err(|_| DecodeError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;

    #[test]
    fn test_strings() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "héllo");
        put_opt_string(&mut buf, None);
        put_opt_string(&mut buf, Some(""));

        let mut bytes = buf.freeze();
        assert_eq!(get_string(&mut bytes).unwrap(), "héllo");
        assert_eq!(get_opt_string(&mut bytes).unwrap(), None);
        assert_eq!(get_opt_string(&mut bytes).unwrap(), Some(String::new()));
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_short_buffers() {
        let mut bytes = Bytes::from_static(&[0, 0, 0, 5, b'a']);
        assert_eq!(get_string(&mut bytes), Err(DecodeError::UnexpectedEof));
        assert_eq!(get_u64(&mut Bytes::new()), Err(DecodeError::UnexpectedEof));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut bytes = Bytes::from_static(&[0, 0, 0, 2, 0xff, 0xfe]);
        assert_eq!(get_string(&mut bytes), Err(DecodeError::InvalidUtf8));
    }

    #[test]
    fn test_strings_past_u16_length() {
        for len in [u16::MAX as usize, u16::MAX as usize + 1] {
            let value = "x".repeat(len);
            let mut buf = BytesMut::new();
            put_string(&mut buf, &value);
            assert_eq!(buf.len(), 4 + len);

            let mut bytes = buf.freeze();
            assert_eq!(get_string(&mut bytes).unwrap(), value);
            assert!(bytes.is_empty());
        }
    }

    #[test]
    fn test_multibyte_string_kept_whole() {
        let value = "é".repeat(40_000);
        let mut buf = BytesMut::new();
        put_string(&mut buf, &value);
        put_string(&mut buf, "next");

        let mut bytes = buf.freeze();
        assert_eq!(get_string(&mut bytes).unwrap(), value);
        assert_eq!(get_string(&mut bytes).unwrap(), "next");
    }
}
