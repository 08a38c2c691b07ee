//! Common test utilities and shared imports

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#[allow(unused_imports)]
pub use bytes::Bytes;
#[allow(unused_imports)]
pub use hex;
#[allow(unused_imports)]
pub use pwa_lib::error::{DecodeError, TransportError};
#[allow(unused_imports)]
pub use pwa_lib::frame::{FrameCodec, WireOrder};
#[allow(unused_imports)]
pub use pwa_lib::link::SerialLink;
#[allow(unused_imports)]
pub use pwa_lib::param::{Reading, Setting};
#[allow(unused_imports)]
pub use pwa_lib::session::{CancelToken, CycleState, Reply, SessionConfig, SharedSession, TransportSession};
#[allow(unused_imports)]
pub use pwa_lib::status::DeviceStatus;

use std::collections::VecDeque;
use std::io;

/// Decode hex string to bytes for testing
#[allow(dead_code)]
pub fn hex_to_bytes(hex_data: &str) -> Bytes {
    Bytes::from(hex::decode(hex_data).expect("Failed to decode hex"))
}

/// GET salt level, header-first
#[allow(dead_code)]
pub const GET_SALT_LEVEL_HF: &str = "30000be0";
/// PUT salt level = 42, header-first
#[allow(dead_code)]
pub const PUT_SALT_LEVEL_42_HF: &str = "3b000b0000002a15";
/// DATA reply salt level = 42, header-first
#[allow(dead_code)]
pub const DATA_SALT_LEVEL_42_HF: &str = "33000b0000002a0d";
/// DATA reply salt level = 42, trailer-first
#[allow(dead_code)]
pub const DATA_SALT_LEVEL_42_TF: &str = "0d2a0000000b0033";
#[allow(dead_code)]
pub const DONE_HF: &str = "37dc";
#[allow(dead_code)]
pub const BAD_HF: &str = "38dd";
#[allow(dead_code)]
pub const NOT_FOUND_HF: &str = "35da";
#[allow(dead_code)]
pub const DONE_TF: &str = "dc37";
#[allow(dead_code)]
pub const BAD_TF: &str = "dd38";

/// Scripted [`SerialLink`] that records everything the session does.
///
/// Incoming bytes carry the tick at which they become readable, measured in
/// ticks slept so far. Replies queued with [`MockLink::reply_on_write`] are
/// released one batch per successful write.
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct MockLink {
    incoming: VecDeque<(u64, u8)>,
    on_write: VecDeque<Vec<u8>>,
    cancel_at: Option<(u64, CancelToken)>,
    pub writes: Vec<Vec<u8>>,
    pub fail_writes: bool,
    pub fail_reads: bool,
    pub polls: u64,
    pub ticks_slept: u64,
    pub reads: u64,
}

#[allow(dead_code)]
impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link with `hex_data` already waiting in the receive queue
    pub fn with_incoming(hex_data: &str) -> Self {
        let mut link = Self::new();
        link.push_incoming(hex_data);
        link
    }

    /// Link that never accepts a write
    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn push_incoming(&mut self, hex_data: &str) {
        self.push_incoming_after(0, hex_data);
    }

    /// Make `hex_data` readable once `ticks` more ticks have been slept
    pub fn push_incoming_after(&mut self, ticks: u64, hex_data: &str) {
        let ready = self.ticks_slept + ticks;
        for byte in hex_to_bytes(hex_data) {
            self.incoming.push_back((ready, byte));
        }
    }

    /// Queue `hex_data` to arrive after the next write; `""` means no answer
    pub fn reply_on_write(mut self, hex_data: &str) -> Self {
        self.on_write.push_back(hex_to_bytes(hex_data).to_vec());
        self
    }

    /// Cancel `token` once `ticks` ticks have been slept
    pub fn cancel_after(mut self, ticks: u64, token: CancelToken) -> Self {
        self.cancel_at = Some((ticks, token));
        self
    }

    pub fn pending(&self) -> usize {
        self.incoming.len()
    }

    pub fn last_write_hex(&self) -> Option<String> {
        self.writes.last().map(hex::encode)
    }
}

impl SerialLink for MockLink {
    fn write_bytes(&mut self, data: &[u8]) -> bool {
        if self.fail_writes {
            return false;
        }
        self.writes.push(data.to_vec());
        if let Some(reply) = self.on_write.pop_front() {
            let ready = self.ticks_slept;
            self.incoming.extend(reply.into_iter().map(|b| (ready, b)));
        }
        true
    }

    fn byte_available(&mut self) -> bool {
        self.polls += 1;
        self.incoming.front().is_some_and(|(ready, _)| *ready <= self.ticks_slept)
    }

    fn read_byte(&mut self) -> io::Result<u8> {
        if self.fail_reads {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock read failure"));
        }
        self.reads += 1;
        self.incoming
            .pop_front()
            .map(|(_, b)| b)
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "mock queue empty"))
    }

    fn sleep_ticks(&mut self, ticks: u32) {
        self.ticks_slept += u64::from(ticks);
        if let Some((at, token)) = &self.cancel_at {
            if self.ticks_slept >= *at {
                token.cancel();
            }
        }
    }
}

/// Session over `link` with a short budget so timeouts stay cheap
#[allow(dead_code)]
pub fn session(link: MockLink, wire_order: WireOrder, timeout_ticks: u32) -> TransportSession<MockLink> {
    let config = SessionConfig {
        wire_order,
        timeout_ticks,
        ..SessionConfig::default()
    };
    TransportSession::new(link, config)
}
