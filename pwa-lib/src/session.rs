//! Request/response cycles over the controller link.
//!
//! A [`TransportSession`] owns one [`SerialLink`] and runs exactly one cycle
//! at a time: encode, write, then poll for reply bytes until a complete
//! frame is recognized or the Timeout Budget runs out.
//!
//! ```text
//! Idle -> RequestSent -> Receiving -> Complete
//!                     |            -> TimedOut
//!                     |            -> Cancelled
//!                     -> WriteFailed
//! ```
//!
//! Nothing is retried here; [`TransportSession::get_value_with_retry`] is a
//! convenience for callers that want to repeat whole requests.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use strum_macros::Display;
use tracing::{debug, trace, warn};

use crate::constants::{CMD_DATA, DATA_REPLY_LEN, DEFAULT_TICK_MS, DEFAULT_TIMEOUT_TICKS, SHORT_REPLY_LEN};
use crate::error::{Result, TransportError};
use crate::frame::{FrameCodec, WireOrder};
use crate::link::SerialLink;
use crate::status::DeviceStatus;

/// Session settings, loadable from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub wire_order: WireOrder,
    /// Timeout Budget per request, in ticks
    pub timeout_ticks: u32,
    /// Length of one polling tick in milliseconds
    pub tick_ms: u64,
    /// Fail DATA replies that echo a different parameter id
    pub enforce_param_id_match: bool,
    /// Check the trailing checksum byte of replies
    pub verify_reply_checksum: bool,
    /// Report `DecodeMismatch` instead of `Timeout` when unframed bytes arrived
    pub strict_framing: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            wire_order: WireOrder::HeaderFirst,
            timeout_ticks: DEFAULT_TIMEOUT_TICKS,
            tick_ms: DEFAULT_TICK_MS,
            enforce_param_id_match: false,
            verify_reply_checksum: false,
            strict_framing: false,
        }
    }
}

impl SessionConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ticks == 0 {
            return Err(TransportError::Config("timeout_ticks must be at least 1".to_string()));
        }
        if self.tick_ms == 0 {
            return Err(TransportError::Config("tick_ms must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn codec(&self) -> FrameCodec {
        FrameCodec::new(self.wire_order)
            .with_param_id_check(self.enforce_param_id_match)
            .with_reply_checksum(self.verify_reply_checksum)
    }
}

/// Cooperative cancellation flag, checked once per poll iteration.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Where a session is within its current request cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CycleState {
    Idle,
    RequestSent,
    Receiving,
    Complete,
    TimedOut,
    WriteFailed,
    Cancelled,
}

/// Outcome of a GET: the decoded value and the device status.
///
/// `value` is zero when the device answered with a short status reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub value: i32,
    pub status: DeviceStatus,
}

#[derive(Debug, Clone, Copy)]
enum Expect {
    Get { param_id: u16 },
    Set,
}

impl Expect {
    /// Longest reply this request can produce
    fn window(self) -> usize {
        match self {
            Expect::Get { .. } => DATA_REPLY_LEN,
            Expect::Set => SHORT_REPLY_LEN,
        }
    }
}

/// Single-owner request/response engine over one serial link.
pub struct TransportSession<L> {
    link: L,
    config: SessionConfig,
    codec: FrameCodec,
    rx: BytesMut,
    state: CycleState,
    cancel: Option<CancelToken>,
}

impl<L: SerialLink> TransportSession<L> {
    pub fn new(link: L, config: SessionConfig) -> Self {
        let codec = config.codec();
        Self {
            link,
            config,
            codec,
            rx: BytesMut::with_capacity(DATA_REPLY_LEN),
            state: CycleState::Idle,
            cancel: None,
        }
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }

    /// State reached by the most recent cycle
    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn into_link(self) -> L {
        self.link
    }

    /// Read one parameter.
    pub fn get_value(&mut self, param_id: impl Into<u16>) -> Result<Reply> {
        let param_id = param_id.into();
        let frame = self.codec.encode_get(param_id);
        self.send(&frame)?;
        self.receive(Expect::Get { param_id })
    }

    /// Write one parameter and return the terminal status the device reports.
    pub fn set_value(&mut self, param_id: impl Into<u16>, value: i32) -> Result<DeviceStatus> {
        let frame = self.codec.encode_set(param_id.into(), value);
        self.send(&frame)?;
        self.receive(Expect::Set).map(|reply| reply.status)
    }

    /// `get_value`, repeated up to `attempts` times while it times out.
    pub fn get_value_with_retry(&mut self, param_id: impl Into<u16>, attempts: u32) -> Result<Reply> {
        let param_id = param_id.into();
        let mut attempt = 1;
        loop {
            match self.get_value(param_id) {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(param_id, attempt, "GET failed: {}; retrying", e);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    fn transition(&mut self, next: CycleState) {
        trace!(from = %self.state, to = %next, "Cycle state");
        self.state = next;
    }

    fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.transition(CycleState::Idle);
        debug!(bytes = hex::encode(frame), "UART write");
        if !self.link.write_bytes(frame) {
            self.transition(CycleState::WriteFailed);
            return Err(TransportError::WriteFailed { requested: frame.len() });
        }
        self.transition(CycleState::RequestSent);
        Ok(())
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    fn receive(&mut self, expect: Expect) -> Result<Reply> {
        let mut budget = self.config.timeout_ticks;
        let mut garbage = 0usize;
        self.rx.clear();
        self.transition(CycleState::Receiving);

        while budget > 0 {
            if self.cancelled() {
                self.transition(CycleState::Cancelled);
                return Err(TransportError::Cancelled);
            }

            if !self.link.byte_available() {
                self.link.sleep_ticks(1);
                budget -= 1;
                continue;
            }

            let byte = match self.link.read_byte() {
                Ok(byte) => byte,
                Err(e) => {
                    self.transition(CycleState::Idle);
                    return Err(e.into());
                }
            };

            match self.accept(byte, expect, &mut garbage) {
                Ok(Some(reply)) => {
                    debug!(bytes = hex::encode(&self.rx), "UART read");
                    self.transition(CycleState::Complete);
                    return Ok(reply);
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(bytes = hex::encode(&self.rx), "UART read (rejected)");
                    self.transition(CycleState::Complete);
                    return Err(e);
                }
            }
        }

        self.transition(CycleState::TimedOut);
        let unframed = garbage + self.rx.len();
        if unframed > 0 {
            debug!(bytes = hex::encode(&self.rx), garbage, "Timed out with unframed bytes");
        }
        if self.config.strict_framing && unframed > 0 {
            return Err(TransportError::DecodeMismatch { garbage: unframed });
        }
        Err(TransportError::Timeout {
            ticks: self.config.timeout_ticks,
        })
    }

    /// Feed one received byte into the reply buffer.
    fn accept(&mut self, byte: u8, expect: Expect, garbage: &mut usize) -> Result<Option<Reply>> {
        let order = self.codec.wire_order();

        // Header-first replies are identified by their first byte.
        if order == WireOrder::HeaderFirst && self.rx.is_empty() && !self.can_start(byte, expect) {
            trace!(byte, "Discarding byte outside a reply frame");
            *garbage += 1;
            return Ok(None);
        }

        self.rx.put_u8(byte);
        if let Some(reply) = self.match_reply(expect)? {
            return Ok(Some(reply));
        }

        if self.rx.len() >= expect.window() {
            match order {
                WireOrder::HeaderFirst => {
                    *garbage += self.rx.len();
                    self.rx.clear();
                }
                WireOrder::TrailerFirst => {
                    *garbage += 1;
                    self.rx.advance(1);
                }
            }
        }
        Ok(None)
    }

    fn can_start(&self, byte: u8, expect: Expect) -> bool {
        let order = self.codec.wire_order();
        match expect {
            Expect::Get { .. } => byte == CMD_DATA || order.status_of(byte).is_some(),
            Expect::Set => order.status_of(byte).is_some(),
        }
    }

    /// Check whether the buffer now holds a complete reply.
    ///
    /// Header-first frames start at the head of the buffer. Trailer-first
    /// frames end at the most recent byte, so their candidates are suffixes.
    fn match_reply(&self, expect: Expect) -> Result<Option<Reply>> {
        let rx = &self.rx[..];

        if let Expect::Get { param_id } = expect {
            if let Some(frame) = self.candidate(rx, DATA_REPLY_LEN) {
                if self.codec.is_data_reply(frame) {
                    let data = self.codec.decode_data_reply(frame, param_id)?;
                    return Ok(Some(Reply {
                        value: data.value,
                        status: data.status,
                    }));
                }
            }
        }

        let reading = matches!(expect, Expect::Get { .. });
        let trailer_first = self.codec.wire_order() == WireOrder::TrailerFirst;

        // While reading, a trailer-first status reply must be the whole
        // buffer: any adjacent pair inside a DATA reply can look like one.
        let frame = if reading && trailer_first {
            (rx.len() == SHORT_REPLY_LEN).then_some(rx)
        } else {
            self.candidate(rx, SHORT_REPLY_LEN)
        };
        let Some(frame) = frame else {
            return Ok(None);
        };
        if self.codec.short_reply_status(frame).is_none() {
            return Ok(None);
        }
        // A trailer-first data reply can open with a status-like byte pair;
        // only a checksummed pair counts as a status reply while reading.
        if reading && trailer_first && !self.codec.short_reply_checksum_ok(frame) {
            return Ok(None);
        }

        let status = self.codec.decode_error_reply(frame)?;
        Ok(Some(Reply { value: 0, status }))
    }

    fn candidate<'a>(&self, rx: &'a [u8], len: usize) -> Option<&'a [u8]> {
        match self.codec.wire_order() {
            WireOrder::HeaderFirst => (rx.len() == len).then_some(rx),
            WireOrder::TrailerFirst => rx.len().checked_sub(len).map(|start| &rx[start..]),
        }
    }
}

/// A session behind a mutex, held for the whole request cycle.
pub struct SharedSession<L> {
    inner: Arc<Mutex<TransportSession<L>>>,
}

impl<L> Clone for SharedSession<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: SerialLink> SharedSession<L> {
    pub fn new(session: TransportSession<L>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    // A panic mid-cycle leaves nothing half-done: every cycle starts from a cleared buffer.
    fn lock(&self) -> MutexGuard<'_, TransportSession<L>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_value(&self, param_id: impl Into<u16>) -> Result<Reply> {
        self.lock().get_value(param_id)
    }

    pub fn set_value(&self, param_id: impl Into<u16>, value: i32) -> Result<DeviceStatus> {
        self.lock().set_value(param_id, value)
    }

    /// Run `f` with exclusive access to the session
    pub fn with_session<T>(&self, f: impl FnOnce(&mut TransportSession<L>) -> T) -> T {
        f(&mut self.lock())
    }
}
