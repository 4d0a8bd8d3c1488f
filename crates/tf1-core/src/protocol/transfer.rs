//! Transfer session
//!
//! Drives one payload through handshake, chunk, ack and retry. The session
//! produces frames and decides what to do with each response; writing the
//! frames to the radio is left to the link.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::protocol::frame::{encode_chunk, encode_handshake, Command, Response, HEADER_LEN};
use crate::types::Payload;

// ----------------------------------------------------------------------------
// Session State
// ----------------------------------------------------------------------------

/// Where the transfer currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferPhase {
    /// No handshake sent on this connection yet
    Idle,
    AwaitingHandshakeAck,
    AwaitingChunkAck,
    /// Every payload byte acknowledged
    Complete,
    /// Handshake refused, unusable capacity or a frame that cannot be built
    Aborted,
    /// Retry budget spent on one chunk
    Exhausted,
}

impl TransferPhase {
    /// No further frames will be sent on this connection
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransferPhase::Complete | TransferPhase::Aborted | TransferPhase::Exhausted
        )
    }
}

/// Snapshot of transfer progress for observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStatus {
    pub phase: TransferPhase,
    pub bytes_sent: usize,
    pub total: usize,
    pub sequence: u16,
    pub retries: u32,
}

/// What the link should do after feeding a response to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferAction {
    /// Write a new frame
    Transmit(Vec<u8>),
    /// Write the pending chunk frame again, byte for byte
    Retransmit(Vec<u8>),
    /// The payload is fully acknowledged
    Complete,
    /// The transfer stopped for good on this connection
    Stop,
    /// The response did not apply to the current phase
    Ignore,
}

/// Per-connection transfer state
#[derive(Debug, Clone)]
pub struct TransferSession {
    payload: Payload,
    frame_capacity: usize,
    max_retries: u32,
    phase: TransferPhase,
    chunk_size: usize,
    sequence: u16,
    bytes_sent: usize,
    awaiting_ack: bool,
    retry_count: u32,
    pending_frame: Vec<u8>,
    pending_data_len: usize,
}

impl TransferSession {
    /// Create an idle session for `payload`
    pub fn new(payload: Payload, frame_capacity: usize, max_retries: u32) -> Self {
        Self {
            payload,
            frame_capacity,
            max_retries,
            phase: TransferPhase::Idle,
            chunk_size: 0,
            sequence: 1,
            bytes_sent: 0,
            awaiting_ack: false,
            retry_count: 0,
            pending_frame: Vec::new(),
            pending_data_len: 0,
        }
    }

    /// Forget all progress
    pub fn reset(&mut self) {
        self.phase = TransferPhase::Idle;
        self.chunk_size = 0;
        self.sequence = 1;
        self.bytes_sent = 0;
        self.awaiting_ack = false;
        self.retry_count = 0;
        self.pending_frame.clear();
        self.pending_data_len = 0;
    }

    /// Start a fresh transfer and return the handshake frame to send
    pub fn begin_handshake(&mut self) -> TransferAction {
        self.reset();
        match encode_handshake(self.payload.len(), self.frame_capacity) {
            Ok(frame) => {
                info!("Starting transfer of {} bytes", self.payload.len());
                self.phase = TransferPhase::AwaitingHandshakeAck;
                TransferAction::Transmit(frame)
            }
            Err(e) => {
                error!("Cannot build handshake: {}", e);
                self.phase = TransferPhase::Aborted;
                TransferAction::Stop
            }
        }
    }

    /// Apply a decoded device response
    pub fn on_response(&mut self, response: Response) -> TransferAction {
        match (self.phase, response.command) {
            (TransferPhase::AwaitingHandshakeAck, Command::Handshake) => {
                self.on_handshake_ack(response)
            }
            (TransferPhase::AwaitingChunkAck, Command::Chunk) => self.on_chunk_ack(response),
            (phase, command) => {
                warn!("Ignoring {:?} response in phase {:?}", command, phase);
                TransferAction::Ignore
            }
        }
    }

    fn on_handshake_ack(&mut self, response: Response) -> TransferAction {
        if !response.is_success() {
            error!("Device rejected handshake (status={})", response.status);
            self.phase = TransferPhase::Aborted;
            return TransferAction::Stop;
        }

        let cache_capacity = response.value as usize;
        info!("Handshake ack: cache_capacity={}", cache_capacity);
        if cache_capacity <= HEADER_LEN {
            error!("Cache capacity ({}) too small", cache_capacity);
            self.phase = TransferPhase::Aborted;
            return TransferAction::Stop;
        }

        self.chunk_size = cache_capacity - HEADER_LEN;
        self.sequence = 1;
        self.bytes_sent = 0;
        self.awaiting_ack = false;
        self.next_chunk()
    }

    fn on_chunk_ack(&mut self, response: Response) -> TransferAction {
        if !response.is_success() {
            warn!("Device reported chunk failure (status={})", response.status);
            return self.retry();
        }

        self.awaiting_ack = false;
        self.bytes_sent += self.pending_data_len;
        info!(
            "Chunk {} acked ({}/{} bytes)",
            self.sequence,
            self.bytes_sent,
            self.payload.len()
        );

        if self.bytes_sent >= self.payload.len() {
            info!("Payload transfer complete");
            self.phase = TransferPhase::Complete;
            return TransferAction::Complete;
        }

        match self.sequence.checked_add(1) {
            Some(next) => {
                self.sequence = next;
                self.next_chunk()
            }
            None => {
                error!("Sequence number space exhausted at {} bytes", self.bytes_sent);
                self.phase = TransferPhase::Aborted;
                TransferAction::Stop
            }
        }
    }

    /// Build and record the chunk starting at `bytes_sent`
    fn next_chunk(&mut self) -> TransferAction {
        let total = self.payload.len();
        if self.bytes_sent >= total {
            info!("Payload already transmitted");
            self.phase = TransferPhase::Complete;
            return TransferAction::Complete;
        }

        let chunk_len = self.chunk_size.min(total - self.bytes_sent);
        let data = &self.payload[self.bytes_sent..self.bytes_sent + chunk_len];
        let frame = match encode_chunk(self.sequence, data, self.frame_capacity) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Chunk {} not sent: {}", self.sequence, e);
                self.phase = TransferPhase::Aborted;
                return TransferAction::Stop;
            }
        };

        debug!("Chunk {} carries {} bytes", self.sequence, chunk_len);
        self.pending_frame = frame.clone();
        self.pending_data_len = chunk_len;
        self.awaiting_ack = true;
        self.retry_count = 0;
        self.phase = TransferPhase::AwaitingChunkAck;
        TransferAction::Transmit(frame)
    }

    /// Resend the pending chunk unchanged, within the retry budget
    fn retry(&mut self) -> TransferAction {
        if !self.awaiting_ack || self.pending_frame.is_empty() {
            return TransferAction::Ignore;
        }

        self.retry_count += 1;
        if self.retry_count > self.max_retries {
            error!("Chunk {} retry limit reached; giving up", self.sequence);
            self.phase = TransferPhase::Exhausted;
            return TransferAction::Stop;
        }

        warn!(
            "Resending chunk seq {} (attempt {})",
            self.sequence, self.retry_count
        );
        TransferAction::Retransmit(self.pending_frame.clone())
    }

    pub fn phase(&self) -> TransferPhase {
        self.phase
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    pub fn is_awaiting_ack(&self) -> bool {
        self.awaiting_ack
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Last chunk frame sent and not yet acknowledged
    pub fn pending_frame(&self) -> Option<&[u8]> {
        if self.awaiting_ack {
            Some(&self.pending_frame)
        } else {
            None
        }
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn status(&self) -> TransferStatus {
        TransferStatus {
            phase: self.phase,
            bytes_sent: self.bytes_sent,
            total: self.payload.len(),
            sequence: self.sequence,
            retries: self.retry_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ack(command: Command, status: u8, value: u16) -> Response {
        Response {
            command,
            status,
            value,
        }
    }

    fn session(len: usize) -> TransferSession {
        let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
        TransferSession::new(Payload::new(payload), 600, 3)
    }

    fn transmitted(action: TransferAction) -> Vec<u8> {
        match action {
            TransferAction::Transmit(frame) => frame,
            other => panic!("expected Transmit, got {:?}", other),
        }
    }

    #[test]
    fn test_handshake_then_first_chunk() {
        let mut session = session(250);
        let handshake = transmitted(session.begin_handshake());
        assert_eq!(handshake[1], 17);
        assert_eq!(&handshake[12..], &250u32.to_le_bytes());
        assert_eq!(session.phase(), TransferPhase::AwaitingHandshakeAck);

        let chunk = transmitted(session.on_response(ack(Command::Handshake, 0, 62)));
        assert_eq!(session.chunk_size(), 50);
        assert_eq!(chunk.len(), 62);
        assert_eq!(&chunk[6..8], &[1, 0]);
        assert_eq!(&chunk[12..], &session.payload()[..50]);
        assert!(session.is_awaiting_ack());
        assert_eq!(session.pending_frame(), Some(chunk.as_slice()));
    }

    #[test]
    fn test_rejected_handshake_stops_without_retry() {
        let mut session = session(250);
        session.begin_handshake();
        assert_eq!(
            session.on_response(ack(Command::Handshake, 1, 62)),
            TransferAction::Stop
        );
        assert_eq!(session.phase(), TransferPhase::Aborted);
        assert!(!session.is_awaiting_ack());
    }

    #[test]
    fn test_small_cache_capacity_sends_nothing() {
        for capacity in [0u16, 1, 12] {
            let mut session = session(250);
            session.begin_handshake();
            assert_eq!(
                session.on_response(ack(Command::Handshake, 0, capacity)),
                TransferAction::Stop
            );
            assert_eq!(session.bytes_sent(), 0);
            assert_eq!(session.pending_frame(), None);
        }
    }

    #[test]
    fn test_capacity_beyond_frame_buffer_aborts() {
        let mut session = session(1000);
        session.begin_handshake();
        // 12 + 601 bytes of data does not fit in 600
        assert_eq!(
            session.on_response(ack(Command::Handshake, 0, 613)),
            TransferAction::Stop
        );
        assert_eq!(session.phase(), TransferPhase::Aborted);
    }

    #[test]
    fn test_last_chunk_is_short() {
        let mut session = session(120);
        session.begin_handshake();
        transmitted(session.on_response(ack(Command::Handshake, 0, 62)));
        transmitted(session.on_response(ack(Command::Chunk, 0, 0)));
        let last = transmitted(session.on_response(ack(Command::Chunk, 0, 0)));
        assert_eq!(last.len(), HEADER_LEN + 20);
        assert_eq!(&last[6..8], &[3, 0]);
        assert_eq!(
            session.on_response(ack(Command::Chunk, 0, 0)),
            TransferAction::Complete
        );
        assert_eq!(session.bytes_sent(), 120);
    }

    #[test]
    fn test_failure_ack_retransmits_identical_frame() {
        let mut session = session(250);
        session.begin_handshake();
        let original = transmitted(session.on_response(ack(Command::Handshake, 0, 62)));

        for attempt in 1..=3 {
            assert_eq!(
                session.on_response(ack(Command::Chunk, 2, 0)),
                TransferAction::Retransmit(original.clone())
            );
            assert_eq!(session.retry_count(), attempt);
            assert_eq!(session.sequence(), 1);
        }

        assert_eq!(
            session.on_response(ack(Command::Chunk, 2, 0)),
            TransferAction::Stop
        );
        assert_eq!(session.phase(), TransferPhase::Exhausted);
        assert_eq!(session.bytes_sent(), 0);
    }

    #[test]
    fn test_successful_ack_resets_retry_budget() {
        let mut session = session(250);
        session.begin_handshake();
        transmitted(session.on_response(ack(Command::Handshake, 0, 62)));
        session.on_response(ack(Command::Chunk, 2, 0));
        session.on_response(ack(Command::Chunk, 2, 0));
        transmitted(session.on_response(ack(Command::Chunk, 0, 0)));
        assert_eq!(session.retry_count(), 0);
        assert_eq!(session.sequence(), 2);
    }

    #[test]
    fn test_mismatched_command_is_ignored() {
        let mut session = session(250);
        session.begin_handshake();
        assert_eq!(
            session.on_response(ack(Command::Chunk, 0, 0)),
            TransferAction::Ignore
        );
        assert_eq!(session.phase(), TransferPhase::AwaitingHandshakeAck);

        transmitted(session.on_response(ack(Command::Handshake, 0, 62)));
        assert_eq!(
            session.on_response(ack(Command::Handshake, 0, 62)),
            TransferAction::Ignore
        );
        assert_eq!(session.sequence(), 1);
    }

    #[test]
    fn test_empty_payload_completes_after_handshake() {
        let mut session = session(0);
        let handshake = transmitted(session.begin_handshake());
        assert_eq!(&handshake[12..], &[0, 0, 0, 0]);
        assert_eq!(
            session.on_response(ack(Command::Handshake, 0, 62)),
            TransferAction::Complete
        );
    }

    #[test]
    fn test_reset_restores_initial_values() {
        let mut session = session(250);
        session.begin_handshake();
        session.on_response(ack(Command::Handshake, 0, 62));
        session.on_response(ack(Command::Chunk, 0, 0));
        session.reset();
        let status = session.status();
        assert_eq!(status.phase, TransferPhase::Idle);
        assert_eq!(status.bytes_sent, 0);
        assert_eq!(status.sequence, 1);
        assert_eq!(status.retries, 0);
        assert_eq!(session.pending_frame(), None);
    }
}
