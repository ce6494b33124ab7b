// Server result codes carried in the msg header (spec §4.1, §6),
// mapped onto the client's finite `ErrorKind` taxonomy. Values are the
// long-stable, publicly documented Aerospike wire result codes.

use aerospike_base::ErrorKind;

pub const OK: u8 = 0;
pub const SERVER_ERROR: u8 = 1;
pub const KEY_NOT_FOUND: u8 = 2;
pub const GENERATION_ERROR: u8 = 3;
pub const PARAMETER_ERROR: u8 = 4;
pub const KEY_EXISTS: u8 = 5;
pub const BIN_EXISTS: u8 = 6;
pub const CLUSTER_KEY_MISMATCH: u8 = 7;
pub const SERVER_MEM_ERROR: u8 = 8;
pub const TIMEOUT: u8 = 9;
pub const NO_XDS: u8 = 10;
pub const SERVER_NOT_AVAILABLE: u8 = 11;
pub const BIN_TYPE_ERROR: u8 = 12;
pub const RECORD_TOO_BIG: u8 = 13;
pub const KEY_BUSY: u8 = 14;
pub const SCAN_ABORT: u8 = 15;
pub const UNSUPPORTED_FEATURE: u8 = 16;
pub const BIN_NOT_FOUND: u8 = 17;
pub const DEVICE_OVERLOAD: u8 = 18;
pub const KEY_MISMATCH: u8 = 19;
pub const INVALID_NAMESPACE: u8 = 20;
pub const BIN_NAME_TOO_LONG: u8 = 21;
pub const FAIL_FORBIDDEN: u8 = 22;
pub const MRT_BLOCKED: u8 = 120;
pub const MRT_ABORTED: u8 = 121;

/// `None` means success (code 0); `Some` carries the `ErrorKind` the
/// rest of the client should raise.
pub fn classify(code: u8) -> Option<ErrorKind> {
    match code {
        OK => None,
        KEY_NOT_FOUND => Some(ErrorKind::RecordNotFound),
        GENERATION_ERROR => Some(ErrorKind::GenerationMismatch),
        KEY_EXISTS => Some(ErrorKind::RecordAlreadyExists),
        KEY_MISMATCH => Some(ErrorKind::KeyMismatch),
        BIN_NAME_TOO_LONG => Some(ErrorKind::BinNameTooLong),
        INVALID_NAMESPACE => Some(ErrorKind::NamespaceNotFound),
        TIMEOUT => Some(ErrorKind::Timeout),
        SERVER_NOT_AVAILABLE | DEVICE_OVERLOAD | KEY_BUSY => Some(ErrorKind::Unavailable),
        MRT_ABORTED => Some(ErrorKind::MrtAborted),
        PARAMETER_ERROR => Some(ErrorKind::Param),
        _ => Some(ErrorKind::Unknown),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ok_classifies_as_success() {
        assert!(classify(OK).is_none());
    }

    #[test]
    fn known_codes_map_to_specific_kinds() {
        assert_eq!(classify(KEY_NOT_FOUND), Some(ErrorKind::RecordNotFound));
        assert_eq!(classify(GENERATION_ERROR), Some(ErrorKind::GenerationMismatch));
    }

    #[test]
    fn unknown_code_is_unknown_kind() {
        assert_eq!(classify(200), Some(ErrorKind::Unknown));
    }
}
