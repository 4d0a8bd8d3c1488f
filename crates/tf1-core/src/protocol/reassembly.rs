//! Notification reassembly
//!
//! The peripheral may split one response across several notifications. The
//! buffer accumulates fragments until the length declared at offset 4 (plus
//! a fixed 2-byte adjustment the firmware expects) has arrived.

use tracing::debug;

use crate::errors::ReassemblyError;
use crate::protocol::frame::declared_length;

/// Added to the declared length field to obtain the on-air response length
pub const LENGTH_ADJUSTMENT: usize = 2;

// ----------------------------------------------------------------------------
// Reassembly Buffer
// ----------------------------------------------------------------------------

/// Bounded accumulator for one inbound response frame
#[derive(Debug, Clone)]
pub struct ReassemblyBuffer {
    buffer: Vec<u8>,
    capacity: usize,
    expected_len: Option<usize>,
}

impl ReassemblyBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            capacity,
            expected_len: None,
        }
    }

    /// Append a fragment, returning a frame once one is complete
    ///
    /// On overflow or an impossible declared length every buffered byte is
    /// dropped. Bytes past the end of a completed frame in the same fragment
    /// are discarded with it.
    pub fn push(&mut self, fragment: &[u8]) -> Result<Option<Vec<u8>>, ReassemblyError> {
        if fragment.is_empty() {
            return Ok(None);
        }

        if self.buffer.len() + fragment.len() > self.capacity {
            let err = ReassemblyError::Overflow {
                buffered: self.buffer.len(),
                incoming: fragment.len(),
                capacity: self.capacity,
            };
            self.reset();
            return Err(err);
        }
        self.buffer.extend_from_slice(fragment);

        if self.expected_len.is_none() {
            if let Some(declared) = declared_length(&self.buffer) {
                let expected = declared as usize + LENGTH_ADJUSTMENT;
                if expected > self.capacity {
                    self.reset();
                    return Err(ReassemblyError::InvalidLength {
                        expected,
                        capacity: self.capacity,
                    });
                }
                self.expected_len = Some(expected);
            }
        }

        match self.expected_len {
            Some(expected) if self.buffer.len() >= expected => {
                let trailing = self.buffer.len() - expected;
                if trailing > 0 {
                    debug!("Discarding {} bytes past the end of a response frame", trailing);
                }
                self.buffer.truncate(expected);
                let frame = core::mem::take(&mut self.buffer);
                self.reset();
                Ok(Some(frame))
            }
            _ => Ok(None),
        }
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.expected_len = None;
    }

    /// Bytes currently buffered
    pub fn received_len(&self) -> usize {
        self.buffer.len()
    }

    /// Expected frame length, once at least the length field has arrived
    pub fn expected_len(&self) -> Option<usize> {
        self.expected_len
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Handshake ack whose declared length makes the frame 10 bytes on air
    fn handshake_ack(capacity: u16) -> Vec<u8> {
        let [lo, hi] = capacity.to_le_bytes();
        vec![0xAA, 17, 0x00, 0x5A, 8, 0, 0, 0, lo, hi]
    }

    #[test]
    fn test_single_fragment_frame() {
        let mut buffer = ReassemblyBuffer::new(1024);
        let frame = buffer.push(&handshake_ack(62)).unwrap();
        assert_eq!(frame, Some(handshake_ack(62)));
        assert!(buffer.is_empty());
        assert_eq!(buffer.expected_len(), None);
    }

    #[test]
    fn test_split_fragments() {
        let mut buffer = ReassemblyBuffer::new(1024);
        let ack = handshake_ack(500);
        assert_eq!(buffer.push(&ack[..3]).unwrap(), None);
        assert_eq!(buffer.expected_len(), None);
        assert_eq!(buffer.push(&ack[3..7]).unwrap(), None);
        assert_eq!(buffer.expected_len(), Some(10));
        assert_eq!(buffer.push(&ack[7..]).unwrap(), Some(ack));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_empty_fragment_is_ignored() {
        let mut buffer = ReassemblyBuffer::new(16);
        assert_eq!(buffer.push(&[]).unwrap(), None);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_overflow_discards_everything() {
        let mut buffer = ReassemblyBuffer::new(8);
        assert_eq!(buffer.push(&[0xAA, 17, 0]).unwrap(), None);
        let err = buffer.push(&[0u8; 6]).unwrap_err();
        assert_eq!(
            err,
            ReassemblyError::Overflow {
                buffered: 3,
                incoming: 6,
                capacity: 8
            }
        );
        assert_eq!(buffer.received_len(), 0);
        assert_eq!(buffer.expected_len(), None);
    }

    #[test]
    fn test_declared_length_beyond_capacity_resets() {
        let mut buffer = ReassemblyBuffer::new(1024);
        // 1023 + 2 > 1024
        let header = [0xAA, 17, 0x00, 0x5A, 0xFF, 0x03];
        let err = buffer.push(&header).unwrap_err();
        assert_eq!(
            err,
            ReassemblyError::InvalidLength {
                expected: 1025,
                capacity: 1024
            }
        );
        assert_eq!(buffer.received_len(), 0);
    }

    #[test]
    fn test_trailing_bytes_in_same_delivery_are_dropped() {
        let mut buffer = ReassemblyBuffer::new(1024);
        let mut delivery = handshake_ack(62);
        delivery.extend_from_slice(&[0xAA, 18, 0x00]);

        let frame = buffer.push(&delivery).unwrap();
        assert_eq!(frame, Some(handshake_ack(62)));
        // The start of the next frame is not carried over.
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_buffer_accepts_next_frame_after_delivery() {
        let mut buffer = ReassemblyBuffer::new(1024);
        let first = handshake_ack(62);
        let second = vec![0xAA, 18, 0x00, 0x5A, 8, 0, 1, 0, 0, 0];
        assert_eq!(buffer.push(&first).unwrap(), Some(first));
        assert_eq!(buffer.push(&second).unwrap(), Some(second));
    }
}
