// Protocol constants for the PWA controller UART link

/// Seed added to every frame checksum
pub const CHECKSUM_SEED: u8 = 0xA5;

/// Command: read one parameter
pub const CMD_GET1: u8 = 0x30;

/// Command: read all parameters
pub const CMD_GETALL: u8 = 0x31;

/// Command: read one 16-bit word
pub const CMD_GETWORD: u8 = 0x32;

/// Reply: parameter data follows
pub const CMD_DATA: u8 = 0x33;

/// Reply: word data follows
pub const CMD_WORD: u8 = 0x34;

/// Command: write one parameter
pub const CMD_PUT1: u8 = 0x3B;

/// Reply: command completed
pub const CMD_DONE: u8 = 0x37;

/// Status: parameter id not found
pub const RET_NOT_FOUND: u8 = 0x35;

/// Status: operation not allowed (header-first revision only)
pub const RET_NOT_ALLOWED: u8 = 0x36;

/// Status: done
pub const RET_DONE: u8 = 0x37;

/// Status: malformed request
pub const RET_BAD: u8 = 0x38;

/// Status: value is volatile and was not stored
pub const RET_DATA_VOLATILE: u8 = 0x3D;

/// Size of a GET request (command, id x2, checksum)
pub const GET_FRAME_LEN: usize = 4;

/// Size of a PUT request (command, id x2, value x4, checksum)
pub const SET_FRAME_LEN: usize = 8;

/// Size of the value field carried by PUT requests and DATA replies
pub const VALUE_LEN: usize = 4;

/// Size of a DATA reply
pub const DATA_REPLY_LEN: usize = 8;

/// Size of a short status reply
pub const SHORT_REPLY_LEN: usize = 2;

/// Default Timeout Budget in ticks (~2 s at 1 ms per tick)
pub const DEFAULT_TIMEOUT_TICKS: u32 = 0x7D0;

/// Default tick length in milliseconds
pub const DEFAULT_TICK_MS: u64 = 1;

/// Default baud rate of the controller link
pub const DEFAULT_BAUD_RATE: u32 = 9600;
