use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum_macros::Display;

/// One-byte outcome code reported by the controller.
///
/// A device status is a successful decode, not a transport failure. `Data`
/// accompanies a decoded value; every other variant arrives in a short reply
/// and ends a request cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum DeviceStatus {
    #[strum(to_string = "data")]
    Data = 0x33,
    #[strum(to_string = "not found")]
    NotFound = 0x35,
    #[strum(to_string = "not allowed")]
    NotAllowed = 0x36,
    #[strum(to_string = "done")]
    Done = 0x37,
    #[strum(to_string = "bad request")]
    BadRequest = 0x38,
    #[strum(to_string = "data volatile")]
    DataVolatile = 0x3D,
}

impl DeviceStatus {
    /// Raw status byte as it appears on the wire
    pub fn code(self) -> u8 {
        self.into()
    }

    /// True for statuses carried by a short reply
    pub fn is_terminal(self) -> bool {
        self != DeviceStatus::Data
    }

    /// True when the device accepted the request
    pub fn is_success(self) -> bool {
        matches!(self, DeviceStatus::Data | DeviceStatus::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_wire_values() {
        use crate::constants::*;

        assert_eq!(DeviceStatus::Data.code(), CMD_DATA);
        assert_eq!(DeviceStatus::NotFound.code(), RET_NOT_FOUND);
        assert_eq!(DeviceStatus::NotAllowed.code(), RET_NOT_ALLOWED);
        assert_eq!(DeviceStatus::Done.code(), RET_DONE);
        assert_eq!(DeviceStatus::Done.code(), CMD_DONE);
        assert_eq!(DeviceStatus::BadRequest.code(), RET_BAD);
        assert_eq!(DeviceStatus::DataVolatile.code(), RET_DATA_VOLATILE);
    }

    #[test]
    fn unknown_byte_is_rejected() {
        assert!(DeviceStatus::try_from(0x39u8).is_err());
        assert_eq!(DeviceStatus::try_from(0x36u8).unwrap(), DeviceStatus::NotAllowed);
    }

    #[test]
    fn data_is_not_terminal() {
        assert!(!DeviceStatus::Data.is_terminal());
        assert!(DeviceStatus::Done.is_terminal());
        assert!(DeviceStatus::Done.is_success());
        assert!(!DeviceStatus::BadRequest.is_success());
    }

    #[test]
    fn display_names() {
        assert_eq!(DeviceStatus::DataVolatile.to_string(), "data volatile");
    }
}
