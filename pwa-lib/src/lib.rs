//! Protocol engine for the PWA water-softener controller UART link.
//!
//! [`frame`] encodes requests and decodes replies without touching I/O;
//! [`session`] drives one blocking request/response cycle at a time over a
//! [`link::SerialLink`].

pub mod constants;
pub mod error;
pub mod frame;
pub mod link;
pub mod param;
pub mod session;
pub mod status;


pub use error::{DecodeError, Result, TransportError};
pub use frame::{CommandFrame, DataReply, FrameCodec, WireOrder};
pub use link::{SerialLink, SerialPortLink};
pub use param::{PropertyValue, Reading, Setting, ValueKind};
pub use session::{CancelToken, CycleState, Reply, SessionConfig, SharedSession, TransportSession};
pub use status::DeviceStatus;
