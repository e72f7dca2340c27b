//! RCON packet framing.
//!
//! ```text
//! i32 LE  length     (bytes that follow: id + type + body + 2)
//! i32 LE  request id
//! i32 LE  type
//! [u8]    body       (ASCII/UTF-8, no interior NUL)
//! 0x00 0x00
//! ```

use std::io::{Read, Write};

use crate::error::RconError;

/// Largest body the game server accepts in one packet.
pub const MAX_BODY_LEN: usize = 4096;

/// id + type + two trailing NULs.
const MIN_LENGTH: i32 = 10;

/// Packet type field values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// Server reply carrying command output.
    ResponseValue,
    /// Client command, and the server's login acknowledgement.
    ExecCommand,
    /// Client login.
    Login,
    Other(i32),
}

impl PacketType {
    pub fn code(self) -> i32 {
        match self {
            PacketType::ResponseValue => 0,
            PacketType::ExecCommand => 2,
            PacketType::Login => 3,
            PacketType::Other(code) => code,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            0 => PacketType::ResponseValue,
            2 => PacketType::ExecCommand,
            3 => PacketType::Login,
            other => PacketType::Other(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub request_id: i32,
    pub kind: PacketType,
    pub body: String,
}

impl Packet {
    pub fn new(request_id: i32, kind: PacketType, body: impl Into<String>) -> Self {
        Self {
            request_id,
            kind,
            body: body.into(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, RconError> {
        let body = self.body.as_bytes();
        if body.len() > MAX_BODY_LEN {
            return Err(RconError::Protocol(format!(
                "body of {} bytes exceeds the {MAX_BODY_LEN} byte limit",
                body.len()
            )));
        }
        // Bounded by MAX_BODY_LEN above.
        let length = MIN_LENGTH + body.len() as i32;
        let mut buf = Vec::with_capacity(4 + length as usize);
        buf.extend_from_slice(&length.to_le_bytes());
        buf.extend_from_slice(&self.request_id.to_le_bytes());
        buf.extend_from_slice(&self.kind.code().to_le_bytes());
        buf.extend_from_slice(body);
        buf.extend_from_slice(&[0, 0]);
        Ok(buf)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), RconError> {
        writer.write_all(&self.encode()?)?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, RconError> {
        let mut word = [0u8; 4];
        reader.read_exact(&mut word)?;
        let length = i32::from_le_bytes(word);
        if length < MIN_LENGTH {
            return Err(RconError::Protocol(format!("packet length {length} is too short")));
        }
        let body_len = (length - MIN_LENGTH) as usize;
        if body_len > MAX_BODY_LEN {
            return Err(RconError::Protocol(format!(
                "packet length {length} exceeds the {MAX_BODY_LEN} byte body limit"
            )));
        }

        let mut rest = vec![0u8; length as usize];
        reader.read_exact(&mut rest)?;
        let request_id = i32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]);
        let kind = PacketType::from_code(i32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]));
        if rest[8 + body_len..] != [0, 0] {
            return Err(RconError::Protocol("packet is missing its NUL terminator".to_string()));
        }
        let body = String::from_utf8_lossy(&rest[8..8 + body_len]).into_owned();
        Ok(Self {
            request_id,
            kind,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn encodes_documented_layout() {
        let bytes = Packet::new(7, PacketType::ExecCommand, "list").encode().unwrap();
        assert_eq!(&bytes[0..4], &14i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &7i32.to_le_bytes());
        assert_eq!(&bytes[8..12], &2i32.to_le_bytes());
        assert_eq!(&bytes[12..16], b"list");
        assert_eq!(&bytes[16..], &[0, 0]);
    }

    #[test]
    fn decodes_what_it_encodes() {
        let packet = Packet::new(-1, PacketType::ExecCommand, "");
        let mut cursor = Cursor::new(packet.encode().unwrap());
        assert_eq!(Packet::read_from(&mut cursor).unwrap(), packet);
    }

    #[test]
    fn rejects_short_length() {
        let mut bytes = 9i32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0; 9]);
        let err = Packet::read_from(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, RconError::Protocol(_)), "got: {err}");
    }

    #[test]
    fn rejects_oversized_body() {
        let err = Packet::new(1, PacketType::ExecCommand, "x".repeat(MAX_BODY_LEN + 1))
            .encode()
            .unwrap_err();
        assert!(matches!(err, RconError::Protocol(_)));

        let bytes = (MIN_LENGTH + MAX_BODY_LEN as i32 + 1).to_le_bytes().to_vec();
        let err = Packet::read_from(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, RconError::Protocol(_)));
    }

    #[test]
    fn truncated_stream_is_an_io_error() {
        let mut bytes = Packet::new(1, PacketType::ResponseValue, "hello").encode().unwrap();
        bytes.truncate(bytes.len() - 3);
        let err = Packet::read_from(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, RconError::Io(_)), "got: {err}");
    }
}
