//! FFI result codes returned by all `octane_link_*` functions.

use octane_link::Error;

/// Result codes for the C ABI surface.
///
/// Every `octane_link_*` function that returns `i32` uses these values.
/// Callers should check for `Ok` (0) and handle the rest.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiResult {
    /// Success.
    Ok = 0,
    /// The handle does not exist in the global handle table.
    InvalidHandle = 1,
    /// A required argument was null, not valid UTF-8, or rejected.
    InvalidArgument = 2,
    /// No free callback ID left for this signature.
    PoolExhausted = 3,
    /// The callback ID is not in use (never registered, or released twice).
    NotRegistered = 4,
    /// The output buffer cannot hold the reply; `out_len` has the size needed.
    BufferTooSmall = 5,
    /// An internal error occurred (logged via tracing).
    Internal = 6,
}

impl From<&Error> for FfiResult {
    fn from(err: &Error) -> Self {
        match err {
            Error::PoolExhausted { .. } => FfiResult::PoolExhausted,
            Error::IdNotInUse { .. } => FfiResult::NotRegistered,
            Error::AlreadyRegistered { .. }
            | Error::InvalidAddress(_)
            | Error::InvalidArgument(_)
            | Error::Config(_) => FfiResult::InvalidArgument,
            _ => FfiResult::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use octane_link::FuncType;

    #[test]
    fn pool_errors_map_to_their_own_codes() {
        let exhausted = Error::PoolExhausted {
            func_type: FuncType::OnNewImage,
            max: 40,
        };
        let not_in_use = Error::IdNotInUse {
            func_type: FuncType::OnNewImage,
            id: 3,
        };
        assert_eq!(FfiResult::from(&exhausted), FfiResult::PoolExhausted);
        assert_eq!(FfiResult::from(&not_in_use), FfiResult::NotRegistered);
        assert_eq!(
            FfiResult::from(&Error::MalformedEvent("x".into())),
            FfiResult::Internal
        );
    }
}
