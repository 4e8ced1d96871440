//! Encoders for requests and responses, plus the string codec.
//!
//! Strings are a big-endian `u16` byte length followed by that many UTF-8
//! bytes. Lengths above [`MAX_STRING_LEN`] are rejected on both sides.

use crate::error::ProtocolError;
use crate::opcode::Opcode;
use crate::snapshot::{PlantSnapshot, SNAPSHOT_SIZE};
use crate::MAX_STRING_LEN;
use bytes::{BufMut, BytesMut};

/// Builds complete requests and responses.
pub struct Encoder;

impl Encoder {
    /// Encodes a bare opcode (commands without payload and all responses).
    pub fn opcode(op: Opcode) -> BytesMut {
        let mut buf = BytesMut::with_capacity(2);
        buf.put_i16(op.code());
        buf
    }

    /// Encodes a raw opcode value, including codes unknown to this crate.
    pub fn raw_opcode(code: i16) -> BytesMut {
        let mut buf = BytesMut::with_capacity(2);
        buf.put_i16(code);
        buf
    }

    /// Encodes a command carrying one i16 argument (`SET_V1`, `SET_V2`, `SET_PUMP`).
    pub fn command_with_arg(op: Opcode, arg: i16) -> BytesMut {
        let mut buf = BytesMut::with_capacity(4);
        buf.put_i16(op.code());
        buf.put_i16(arg);
        buf
    }

    /// Encodes a `LOGIN` request.
    pub fn login(login: &str, password: &str) -> Result<BytesMut, ProtocolError> {
        let mut buf = BytesMut::with_capacity(6 + login.len() + password.len());
        buf.put_i16(Opcode::Login.code());
        encode_string(&mut buf, login)?;
        encode_string(&mut buf, password)?;
        Ok(buf)
    }

    /// Encodes the `OK` + snapshot reply to `GET_DATA`.
    pub fn data_reply(snapshot: &PlantSnapshot) -> BytesMut {
        let mut buf = BytesMut::with_capacity(2 + SNAPSHOT_SIZE);
        buf.put_i16(Opcode::Ok.code());
        snapshot.encode(&mut buf);
        buf
    }
}

/// Appends a length-prefixed string.
pub fn encode_string(buf: &mut BytesMut, s: &str) -> Result<(), ProtocolError> {
    let len = s.len();
    if len > MAX_STRING_LEN {
        return Err(ProtocolError::StringTooLong {
            len,
            max: MAX_STRING_LEN,
        });
    }
    buf.put_u16(len as u16);
    buf.put_slice(s.as_bytes());
    Ok(())
}

/// Validates a decoded string length prefix.
pub fn string_len(prefix: u16) -> Result<usize, ProtocolError> {
    let len = prefix as usize;
    if len > MAX_STRING_LEN {
        return Err(ProtocolError::StringTooLong {
            len,
            max: MAX_STRING_LEN,
        });
    }
    Ok(len)
}

/// Converts the body of a length-prefixed string.
pub fn decode_string_body(body: Vec<u8>) -> Result<String, ProtocolError> {
    String::from_utf8(body).map_err(|_| ProtocolError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_login_layout() {
        let buf = Encoder::login("alice1", "secret").unwrap();
        assert_eq!(&buf[0..2], &Opcode::Login.code().to_be_bytes());
        assert_eq!(&buf[2..4], &[0, 6]);
        assert_eq!(&buf[4..10], b"alice1");
        assert_eq!(&buf[10..12], &[0, 6]);
        assert_eq!(&buf[12..18], b"secret");
    }

    #[test]
    fn test_command_with_arg_layout() {
        let buf = Encoder::command_with_arg(Opcode::SetPump, 5000);
        assert_eq!(buf.len(), 4);
        assert_eq!(&buf[0..2], &Opcode::SetPump.code().to_be_bytes());
        assert_eq!(&buf[2..4], &5000i16.to_be_bytes());
    }

    #[test]
    fn test_data_reply_layout() {
        let snapshot = PlantSnapshot {
            pump_input: 5000,
            ..Default::default()
        };
        let buf = Encoder::data_reply(&snapshot);
        assert_eq!(buf.len(), 2 + SNAPSHOT_SIZE);
        assert_eq!(&buf[0..2], &Opcode::Ok.code().to_be_bytes());
        assert_eq!(PlantSnapshot::decode(&buf[2..]).unwrap(), snapshot);
    }

    #[test]
    fn test_string_len_limit() {
        assert_eq!(string_len(MAX_STRING_LEN as u16).unwrap(), MAX_STRING_LEN);
        let result = string_len((MAX_STRING_LEN + 1) as u16);
        assert!(matches!(result, Err(ProtocolError::StringTooLong { .. })));
    }

    #[test]
    fn test_decode_string_body_invalid_utf8() {
        let result = decode_string_body(vec![0xC3, 0x28]);
        assert!(matches!(result, Err(ProtocolError::InvalidUtf8)));
    }

    #[test]
    fn test_encode_string_too_long() {
        let long = "x".repeat(MAX_STRING_LEN + 1);
        let result = Encoder::login(&long, "password");
        assert!(matches!(result, Err(ProtocolError::StringTooLong { .. })));
    }

    #[test]
    fn test_empty_string() {
        let mut buf = BytesMut::new();
        encode_string(&mut buf, "").unwrap();
        assert_eq!(&buf[..], &[0, 0]);
        assert_eq!(string_len(0).unwrap(), 0);
        assert_eq!(decode_string_body(Vec::new()).unwrap(), "");
    }

    proptest! {
        #[test]
        fn prop_string_body_never_panics(data in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = decode_string_body(data);
        }

        #[test]
        fn prop_string_len_bounds(prefix in any::<u16>()) {
            match string_len(prefix) {
                Ok(len) => prop_assert!(len <= MAX_STRING_LEN),
                Err(_) => prop_assert!(prefix as usize > MAX_STRING_LEN),
            }
        }

        #[test]
        fn prop_snapshot_decode_never_panics(data in proptest::collection::vec(any::<u8>(), 0..32)) {
            let _ = PlantSnapshot::decode(&data);
        }
    }
}
