//! C ABI exports: the public surface consumed by native renderer hosts.
//!
//! All functions are `extern "C"` and `#[no_mangle]`.
//! Handles are opaque `u64` IDs into a global `DashMap`.

use std::ffi::{c_char, c_void, CStr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use octane_link::config::LinkConfig;
use octane_link::connection::ChannelState;
use octane_link::signature::{Signature, SignatureVisitor};
use octane_link::{CallbackId, FuncType};

use crate::bridge::callback::{CallbackSink, NativeCallback};
use crate::core::LinkCore;
use crate::error::FfiResult;

/// Global handle table. Maps handle IDs → Arc<LinkCore>.
static HANDLES: Lazy<DashMap<u64, Arc<LinkCore>>> = Lazy::new(DashMap::new);

/// Monotonic handle counter.
static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Helper: read a C string pointer into a Rust String, returning None on null or invalid UTF-8.
unsafe fn read_c_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok().map(String::from)
}

/// Helper: look up a handle, cloning the Arc so no table guard outlives the call.
fn core_for(handle: u64) -> Option<Arc<LinkCore>> {
    HANDLES.get(&handle).map(|core| Arc::clone(&core))
}

/// Helper: parse a signature name passed from C.
unsafe fn read_func_type(ptr: *const c_char) -> Option<FuncType> {
    let name = unsafe { read_c_str(ptr) }?;
    match name.parse() {
        Ok(ft) => Some(ft),
        Err(e) => {
            tracing::warn!("{e}");
            None
        }
    }
}

// ─── Create / Destroy ────────────────────────────────────────────────

/// Create a new link instance from a JSON configuration string.
///
/// # Safety
///
/// `config_json` must be a valid, NUL-terminated UTF-8 C string, or null.
/// Null loads the user's config file (or defaults).
///
/// Config JSON schema (every field optional):
/// ```json
/// {
///   "server_address": "127.0.0.1:51022",
///   "callback_source": "my-plugin",
///   "max_callbacks_per_type": 40,
///   "connect_timeout_ms": 2000,
///   "request_timeout_ms": 10000
/// }
/// ```
///
/// Returns a non-zero handle on success, or 0 on failure.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn octane_link_create(config_json: *const c_char) -> u64 {
    let config = if config_json.is_null() {
        LinkConfig::load_or_default()
    } else {
        let Some(json_str) = (unsafe { read_c_str(config_json) }) else {
            tracing::error!("octane_link_create: config_json is not valid UTF-8");
            return 0;
        };
        let mut config: LinkConfig = match serde_json::from_str(&json_str) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("octane_link_create: invalid JSON: {e}");
                return 0;
            }
        };
        if let Err(e) = config.validate() {
            tracing::error!("octane_link_create: {e}");
            return 0;
        }
        config.apply_env();
        config
    };

    let id = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
    HANDLES.insert(id, Arc::new(LinkCore::new(id, config)));
    tracing::debug!("octane_link_create: created handle {id}");
    id
}

/// Destroy a link instance: stops its listener and drops every registered callback.
///
/// Safe to call multiple times; the second call is a no-op.
///
/// # Safety
///
/// `handle` must be a value previously returned by `octane_link_create`,
/// or the call is a no-op.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn octane_link_destroy(handle: u64) {
    if let Some((_, core)) = HANDLES.remove(&handle) {
        tracing::debug!("octane_link_destroy: destroying handle {handle}");
        core.shutdown();
    }
}

// ─── Connection ──────────────────────────────────────────────────────

/// Point the handle at a different renderer. The channel is rebuilt lazily
/// on next use; a running listener keeps its current stream.
///
/// # Safety
///
/// `address` must be a valid, NUL-terminated UTF-8 C string, or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn octane_link_set_server_address(
    handle: u64,
    address: *const c_char,
) -> i32 {
    let Some(core) = core_for(handle) else {
        return FfiResult::InvalidHandle as i32;
    };
    let Some(addr) = (unsafe { read_c_str(address) }) else {
        return FfiResult::InvalidArgument as i32;
    };
    if let Err(e) = addr.parse::<octane_link::connection::ServerAddress>() {
        tracing::warn!("octane_link_set_server_address: {e}");
        return FfiResult::InvalidArgument as i32;
    }
    core.connection.set_server_address(addr);
    FfiResult::Ok as i32
}

/// Report whether the handle holds a live channel: 1 initialized,
/// 0 uninitialized, or the negated `InvalidHandle` code.
///
/// # Safety
///
/// Always safe to call; unknown handles return an error code.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn octane_link_channel_state(handle: u64) -> i32 {
    let Some(core) = core_for(handle) else {
        return -(FfiResult::InvalidHandle as i32);
    };
    match core.connection.state() {
        ChannelState::Initialized => 1,
        ChannelState::Uninitialized => 0,
    }
}

// ─── Callbacks ───────────────────────────────────────────────────────

/// Registers a native sink under a freshly allocated ID for one signature.
struct RegisterNative {
    core: Arc<LinkCore>,
    sink: Arc<CallbackSink>,
}

impl SignatureVisitor for RegisterNative {
    type Output = octane_link::Result<CallbackId>;

    fn visit<S: Signature>(self) -> Self::Output {
        let registry = &self.core.registry;
        let id = registry.allocate::<S>()?;
        let sink = self.sink;
        let registered =
            registry.register::<S, _>(id, move |args: S::Args| sink.invoke::<S>(id, &args));
        if let Err(e) = registered {
            let _ = registry.pools().release_id(S::FUNC_TYPE, id);
            return Err(e);
        }
        Ok(id)
    }
}

/// Register a native callback for the signature named `func_type`
/// (e.g. `"OnNewImage"`). The allocated callback ID is written to `out_id`.
///
/// The callback will be invoked from a background thread with JSON envelopes.
///
/// # Safety
///
/// `func_type` must be a valid, NUL-terminated UTF-8 C string. `cb` must be a
/// valid function pointer. `user_data` must remain valid until the callback
/// is unregistered or the handle destroyed. `out_id` must be null or point to
/// writable memory for one `u32`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn octane_link_register(
    handle: u64,
    func_type: *const c_char,
    cb: NativeCallback,
    user_data: *mut c_void,
    out_id: *mut u32,
) -> i32 {
    let Some(core) = core_for(handle) else {
        return FfiResult::InvalidHandle as i32;
    };
    let Some(ft) = (unsafe { read_func_type(func_type) }) else {
        return FfiResult::InvalidArgument as i32;
    };
    let sink = Arc::new(CallbackSink::new(cb, user_data));
    match ft.visit(RegisterNative { core, sink }) {
        Ok(id) => {
            if !out_id.is_null() {
                unsafe { *out_id = id.get() };
            }
            tracing::debug!("octane_link_register: {ft} callback {id} on handle {handle}");
            FfiResult::Ok as i32
        }
        Err(e) => {
            tracing::warn!("octane_link_register: {e}");
            FfiResult::from(&e) as i32
        }
    }
}

/// Unregister the callback stored under `id` and release the ID.
///
/// Returns `NotRegistered` if the ID is not in use (including a second
/// unregister of the same ID).
///
/// # Safety
///
/// `func_type` must be a valid, NUL-terminated UTF-8 C string, or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn octane_link_unregister(
    handle: u64,
    func_type: *const c_char,
    id: u32,
) -> i32 {
    let Some(core) = core_for(handle) else {
        return FfiResult::InvalidHandle as i32;
    };
    let Some(ft) = (unsafe { read_func_type(func_type) }) else {
        return FfiResult::InvalidArgument as i32;
    };
    match core.registry.unregister_dyn(ft, CallbackId(id)) {
        Ok(()) => FfiResult::Ok as i32,
        Err(e) => {
            tracing::warn!("octane_link_unregister: {e}");
            FfiResult::from(&e) as i32
        }
    }
}

/// Deliver a callback in-process, for hosts running inside the renderer.
///
/// `payload_json` holds the signature's arguments. The JSON-encoded return
/// value is written NUL-terminated to `out_buf` and its length (without the
/// NUL) to `out_len`. If `out_cap` is too small, `out_len` still receives the
/// required length and `BufferTooSmall` is returned. `out_buf` may be null
/// when the caller does not want the reply.
///
/// An ID with no registered callback is not an error: the reply is the
/// signature's default value.
///
/// # Safety
///
/// `func_type` and `payload_json` must be valid, NUL-terminated UTF-8 C
/// strings. `out_buf` must be null or point to `out_cap` writable bytes;
/// `out_len` must be null or point to a writable `usize`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn octane_link_invoke(
    handle: u64,
    func_type: *const c_char,
    id: u32,
    payload_json: *const c_char,
    out_buf: *mut c_char,
    out_cap: usize,
    out_len: *mut usize,
) -> i32 {
    let Some(core) = core_for(handle) else {
        return FfiResult::InvalidHandle as i32;
    };
    let Some(ft) = (unsafe { read_func_type(func_type) }) else {
        return FfiResult::InvalidArgument as i32;
    };
    let Some(payload) = (unsafe { read_c_str(payload_json) }) else {
        return FfiResult::InvalidArgument as i32;
    };

    let reply = match core.registry.invoke_json(ft, CallbackId(id), &payload) {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!("octane_link_invoke: {e}");
            return FfiResult::from(&e) as i32;
        }
    };

    if !out_len.is_null() {
        unsafe { *out_len = reply.len() };
    }
    if out_buf.is_null() {
        return FfiResult::Ok as i32;
    }
    if out_cap < reply.len() + 1 {
        return FfiResult::BufferTooSmall as i32;
    }
    unsafe {
        std::ptr::copy_nonoverlapping(reply.as_ptr(), out_buf.cast::<u8>(), reply.len());
        *out_buf.add(reply.len()) = 0;
    }
    FfiResult::Ok as i32
}

// ─── Listener ────────────────────────────────────────────────────────

/// Subscribe to the renderer's callback stream.
///
/// Spawns the listener on the shared runtime and returns immediately.
/// Calling it while a listener is already running is a no-op. The listener
/// does not reconnect; call again after it stops.
///
/// # Safety
///
/// `handle` must be a valid handle from `octane_link_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn octane_link_start_listener(handle: u64) -> i32 {
    let Some(core) = core_for(handle) else {
        return FfiResult::InvalidHandle as i32;
    };
    if core.start_listener() {
        FfiResult::Ok as i32
    } else {
        // Destroyed between the lookup and the spawn.
        FfiResult::InvalidHandle as i32
    }
}

/// 1 while a listener is running for the handle, 0 otherwise, or the
/// negated `InvalidHandle` code.
///
/// # Safety
///
/// Always safe to call; unknown handles return an error code.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn octane_link_is_listening(handle: u64) -> i32 {
    let Some(core) = core_for(handle) else {
        return -(FfiResult::InvalidHandle as i32);
    };
    i32::from(core.listening.load(Ordering::Acquire))
}
