//! Parameter ids understood by the controller.
//!
//! Ids are plain `u16` keys on the wire. [`Reading`] lists the ids the
//! property layer polls with GET, [`Setting`] the ids it writes with PUT.
//! The two tables overlap (salt level, recharge time, ...) but also reuse ids
//! with a different meaning: id 2 is the status word on read and the
//! "recharge now or tonight" trigger on write.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;
use strum_macros::Display;

/// Attributes readable with a GET request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoPrimitive, TryFromPrimitive)]
#[strum(serialize_all = "kebab-case")]
#[repr(u16)]
pub enum Reading {
    SaltAlarm = 1,
    Status = 2,
    AverageWaterUsed = 7,
    SaltLevel = 11,
    WaterHardness = 16,
    WaterUsedToday = 18,
    TotalWaterUsed = 27,
    RechargeTime = 28,
    WaterAvailable = 10029,
    DaysBetweenRecharges = 10040,
    TotalRecharges = 10045,
    DaysPoweredUp = 10051,
    TimeOfDay = 10052,
    ErrorCode = 10055,
    FlowRate = 10080,
    ResinAlert = 10094,
}

impl Reading {
    pub const ALL: [Reading; 16] = [
        Reading::SaltAlarm,
        Reading::Status,
        Reading::AverageWaterUsed,
        Reading::SaltLevel,
        Reading::WaterHardness,
        Reading::WaterUsedToday,
        Reading::TotalWaterUsed,
        Reading::RechargeTime,
        Reading::WaterAvailable,
        Reading::DaysBetweenRecharges,
        Reading::TotalRecharges,
        Reading::DaysPoweredUp,
        Reading::TimeOfDay,
        Reading::ErrorCode,
        Reading::FlowRate,
        Reading::ResinAlert,
    ];

    /// Wire id of this reading
    pub fn id(self) -> u16 {
        self.into()
    }

    /// Look up a reading by its kebab-case name (e.g. `salt-level`)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.to_string() == name)
    }

    /// The type the property layer publishes this reading as
    pub fn kind(self) -> ValueKind {
        match self {
            Reading::Status | Reading::SaltLevel => ValueKind::Byte,
            Reading::SaltAlarm => ValueKind::Flag,
            Reading::WaterHardness => ValueKind::U16,
            Reading::AverageWaterUsed | Reading::WaterUsedToday | Reading::TotalWaterUsed => ValueKind::U32,
            _ => ValueKind::I32,
        }
    }

    /// Narrow a decoded 32-bit value to this reading's published type
    pub fn interpret(self, value: i32) -> PropertyValue {
        self.kind().interpret(value)
    }
}

/// Attributes writable with a PUT request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoPrimitive, TryFromPrimitive)]
#[strum(serialize_all = "kebab-case")]
#[repr(u16)]
pub enum Setting {
    RechargeNowOrTonight = 2,
    SaltLevel = 11,
    RechargeTime = 28,
    MaxDaysBetweenRegenerations = 10040,
    PresentTimeOfDay = 10052,
}

impl Setting {
    pub const ALL: [Setting; 5] = [
        Setting::RechargeNowOrTonight,
        Setting::SaltLevel,
        Setting::RechargeTime,
        Setting::MaxDaysBetweenRegenerations,
        Setting::PresentTimeOfDay,
    ];

    /// Wire id of this setting
    pub fn id(self) -> u16 {
        self.into()
    }

    /// Look up a setting by its kebab-case name (e.g. `recharge-time`)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.to_string() == name)
    }
}

/// Published type of a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Byte,
    Flag,
    U16,
    U32,
    I32,
}

impl ValueKind {
    pub fn interpret(self, value: i32) -> PropertyValue {
        match self {
            ValueKind::Byte => PropertyValue::Byte(value as u8),
            ValueKind::Flag => PropertyValue::Flag(value & 0xFF != 0),
            ValueKind::U16 => PropertyValue::U16(value as u16),
            ValueKind::U32 => PropertyValue::U32(value as u32),
            ValueKind::I32 => PropertyValue::I32(value),
        }
    }
}

/// A decoded value in its published type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyValue {
    Byte(u8),
    Flag(bool),
    U16(u16),
    U32(u32),
    I32(i32),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Byte(v) => write!(f, "{}", v),
            PropertyValue::Flag(v) => write!(f, "{}", v),
            PropertyValue::U16(v) => write!(f, "{}", v),
            PropertyValue::U32(v) => write!(f, "{}", v),
            PropertyValue::I32(v) => write!(f, "{}", v),
        }
    }
}
