//! Safe wrapper around a native function pointer for callback dispatch.

use std::ffi::{c_char, c_void, CStr, CString};
use std::sync::atomic::{AtomicU64, Ordering};

use octane_link::{CallbackId, Signature};

use crate::bridge::envelope::EventEnvelope;

/// Native callback signature: receives a UTF-8 JSON envelope (pointer + length)
/// and the opaque user data given at registration.
///
/// May return null (use the signature's default answer) or a NUL-terminated
/// UTF-8 JSON value, e.g. `"\"/textures/wood.png\""` for `AssetMissing` or
/// `true` for `CommandModuleRun`. The returned string is copied before the
/// bridge does anything else, but it must stay valid after the callback
/// returns (static storage or a buffer owned by `user_data`).
pub type NativeCallback = unsafe extern "C" fn(
    json_ptr: *const c_char,
    json_len: usize,
    user_data: *mut c_void,
) -> *const c_char;

/// Wraps a native callback with its user_data pointer.
///
/// The host is responsible for keeping the callback and user_data valid
/// until the callback is unregistered or the handle destroyed.
pub struct CallbackSink {
    cb: NativeCallback,
    user_data: *mut c_void,
    seq: AtomicU64,
}

// Safety: The host guarantees thread-safe access to user_data.
// The callback may be invoked from a runtime worker thread.
unsafe impl Send for CallbackSink {}
unsafe impl Sync for CallbackSink {}

impl CallbackSink {
    /// Create a new callback sink from a native function pointer and user data.
    pub fn new(cb: NativeCallback, user_data: *mut c_void) -> Self {
        Self {
            cb,
            user_data,
            seq: AtomicU64::new(0),
        }
    }

    /// Hand a JSON string to the native callback and copy out its reply.
    ///
    /// If the string contains interior NUL bytes the call is dropped
    /// (this should never happen with well-formed JSON).
    pub fn dispatch(&self, json: &str) -> Option<String> {
        let Ok(cstr) = CString::new(json) else {
            tracing::warn!("callback JSON contained interior NUL byte, dropping");
            return None;
        };
        let reply = unsafe { (self.cb)(cstr.as_ptr(), json.len(), self.user_data) };
        if reply.is_null() {
            return None;
        }
        match unsafe { CStr::from_ptr(reply) }.to_str() {
            Ok(s) => Some(s.to_owned()),
            Err(_) => {
                tracing::warn!("native callback returned invalid UTF-8, ignoring reply");
                None
            }
        }
    }

    /// Serialize `args` into an envelope, call the native side, and decode
    /// its reply as the signature's output.
    pub fn invoke<S: Signature>(&self, id: CallbackId, args: &S::Args) -> S::Output {
        let func_type = S::FUNC_TYPE;
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let envelope = EventEnvelope::new(seq, func_type, id, args);
        let json = match serde_json::to_string(&envelope) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(%func_type, "failed to encode callback payload: {e}");
                return S::Output::default();
            }
        };
        let Some(reply) = self.dispatch(&json) else {
            return S::Output::default();
        };
        serde_json::from_str(&reply).unwrap_or_else(|e| {
            tracing::warn!(%func_type, "unreadable callback reply {reply:?}: {e}");
            S::Output::default()
        })
    }
}
