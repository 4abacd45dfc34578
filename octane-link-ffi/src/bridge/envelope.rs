//! EventEnvelope: versioned wrapper around callback arguments for native hosts.

use octane_link::{CallbackId, FuncType};
use serde::Serialize;

/// Versioned envelope wrapping every payload handed to a native callback.
///
/// Fields:
/// - `version`: Schema version (always 1 for now).
/// - `seq`: Monotonically increasing sequence number per registered callback.
/// - `timestamp_ms`: UTC milliseconds when the envelope was created.
/// - `func_type`: Signature name, e.g. `"OnNewImage"`.
/// - `callback_id`: ID the callback was registered under.
/// - `payload`: The signature's arguments.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope<'a, T: Serialize> {
    pub version: u32,
    pub seq: u64,
    pub timestamp_ms: i64,
    pub func_type: FuncType,
    pub callback_id: u32,
    pub payload: &'a T,
}

impl<'a, T: Serialize> EventEnvelope<'a, T> {
    pub fn new(seq: u64, func_type: FuncType, id: CallbackId, payload: &'a T) -> Self {
        Self {
            version: 1,
            seq,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            func_type,
            callback_id: id.get(),
            payload,
        }
    }
}
