//! TF1 frame codec
//!
//! Request layout (little-endian):
//!
//! | Offset | Size | Field |
//! |---|---|---|
//! | 0 | 1 | `0xAA` |
//! | 1 | 1 | command id |
//! | 2 | 1 | reserved, `0x00` |
//! | 3 | 1 | `0x5A` |
//! | 4 | 2 | total frame length |
//! | 6 | 2 | sequence number |
//! | 8 | 4 | `"TF1\0"` |
//! | 12 | N | data |
//!
//! Responses echo the command at offset 1, carry their declared length at
//! offset 4, a status byte at offset 6 and a command-specific value at 8.

use crate::errors::FrameError;

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// First byte of every request frame
pub const FRAME_HEAD: u8 = 0xAA;

/// Fourth byte of every request frame
pub const FRAME_MARKER: u8 = 0x5A;

/// Protocol tag at offset 8
pub const PROTOCOL_TAG: [u8; 4] = *b"TF1\0";

/// Request header length; also the per-chunk overhead subtracted from the
/// negotiated cache capacity
pub const HEADER_LEN: usize = 12;

/// Shortest response the decoder accepts
pub const MIN_RESPONSE_LEN: usize = 10;

/// Offset of the 16-bit length field in both directions
pub const LENGTH_OFFSET: usize = 4;

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

/// Request command ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Handshake = 17,
    Chunk = 18,
}

impl Command {
    pub const fn id(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            17 => Ok(Command::Handshake),
            18 => Ok(Command::Chunk),
            other => Err(FrameError::UnhandledCommand(other)),
        }
    }
}

// ----------------------------------------------------------------------------
// Encoding
// ----------------------------------------------------------------------------

/// Encode a request frame, failing rather than truncating when it would not
/// fit in `capacity` bytes
pub fn encode_frame(
    command: Command,
    sequence: u16,
    data: &[u8],
    capacity: usize,
) -> Result<Vec<u8>, FrameError> {
    let size = HEADER_LEN + data.len();
    if size > capacity || size > u16::MAX as usize {
        return Err(FrameError::FrameTooLarge {
            size,
            max: capacity.min(u16::MAX as usize),
        });
    }

    let mut frame = Vec::with_capacity(size);
    frame.push(FRAME_HEAD);
    frame.push(command.id());
    frame.push(0x00);
    frame.push(FRAME_MARKER);
    frame.extend_from_slice(&(size as u16).to_le_bytes());
    frame.extend_from_slice(&sequence.to_le_bytes());
    frame.extend_from_slice(&PROTOCOL_TAG);
    frame.extend_from_slice(data);
    Ok(frame)
}

/// Handshake frame announcing the total payload length
pub fn encode_handshake(payload_len: usize, capacity: usize) -> Result<Vec<u8>, FrameError> {
    let total = u32::try_from(payload_len)
        .map_err(|_| FrameError::PayloadTooLarge { len: payload_len })?;
    encode_frame(Command::Handshake, 0, &total.to_le_bytes(), capacity)
}

/// Chunk frame carrying one payload slice
pub fn encode_chunk(sequence: u16, data: &[u8], capacity: usize) -> Result<Vec<u8>, FrameError> {
    encode_frame(Command::Chunk, sequence, data, capacity)
}

// ----------------------------------------------------------------------------
// Decoding
// ----------------------------------------------------------------------------

/// Device response to a handshake or chunk request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    /// Command echoed from the triggering request
    pub command: Command,
    /// 0 on success
    pub status: u8,
    /// Negotiated cache capacity for handshake acks, unused for chunk acks
    pub value: u16,
}

impl Response {
    /// Decode a reassembled response frame
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < MIN_RESPONSE_LEN {
            return Err(FrameError::ShortFrame { len: bytes.len() });
        }
        let command = Command::try_from(bytes[1])?;
        Ok(Self {
            command,
            status: bytes[6],
            value: u16::from_le_bytes([bytes[8], bytes[9]]),
        })
    }

    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

/// Length field of a (possibly partial) frame, once enough bytes are present
pub fn declared_length(bytes: &[u8]) -> Option<u16> {
    bytes
        .get(LENGTH_OFFSET..LENGTH_OFFSET + 2)
        .map(|field| u16::from_le_bytes([field[0], field[1]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_layout() {
        let frame = encode_handshake(250, 600).unwrap();
        assert_eq!(
            frame,
            vec![
                0xAA, 17, 0x00, 0x5A, // head, command, reserved, marker
                16, 0, // total length
                0, 0, // sequence
                b'T', b'F', b'1', 0, // tag
                250, 0, 0, 0, // payload length
            ]
        );
    }

    #[test]
    fn test_chunk_layout() {
        let frame = encode_chunk(0x0102, &[9, 8, 7], 600).unwrap();
        assert_eq!(frame.len(), 15);
        assert_eq!(&frame[..4], &[0xAA, 18, 0x00, 0x5A]);
        assert_eq!(&frame[4..6], &[15, 0]);
        assert_eq!(&frame[6..8], &[0x02, 0x01]);
        assert_eq!(&frame[8..12], b"TF1\0");
        assert_eq!(&frame[12..], &[9, 8, 7]);
        assert_eq!(declared_length(&frame), Some(15));
    }

    #[test]
    fn test_encode_rejects_oversized_frame() {
        let data = vec![0u8; 589];
        assert_eq!(
            encode_chunk(1, &data, 600),
            Err(FrameError::FrameTooLarge { size: 601, max: 600 })
        );
        assert!(encode_chunk(1, &data[..588], 600).is_ok());
    }

    #[test]
    fn test_decode_handshake_ack() {
        let bytes = [0xAA, 17, 0, 0x5A, 10, 0, 0, 0, 62, 0];
        let response = Response::decode(&bytes).unwrap();
        assert_eq!(response.command, Command::Handshake);
        assert!(response.is_success());
        assert_eq!(response.value, 62);
    }

    #[test]
    fn test_decode_rejects_short_and_unknown() {
        assert_eq!(
            Response::decode(&[0xAA, 17, 0, 0x5A, 8, 0, 0, 0, 0]),
            Err(FrameError::ShortFrame { len: 9 })
        );
        assert_eq!(
            Response::decode(&[0xAA, 99, 0, 0x5A, 10, 0, 0, 0, 0, 0]),
            Err(FrameError::UnhandledCommand(99))
        );
    }

    #[test]
    fn test_declared_length_needs_six_bytes() {
        assert_eq!(declared_length(&[0xAA, 17, 0, 0x5A, 8]), None);
        assert_eq!(declared_length(&[0xAA, 17, 0, 0x5A, 8, 1]), Some(0x0108));
    }
}
