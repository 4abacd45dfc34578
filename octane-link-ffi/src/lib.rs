//! C ABI bridge over octane-link for native renderer hosts.
//!
//! Exposes an `extern "C"` surface a C or C++ plugin host can call directly.
//! Internally manages a static tokio runtime and a global handle table of
//! `LinkCore` instances, one per connection to a renderer.

pub mod bridge;
pub mod core;
pub mod error;

use once_cell::sync::Lazy;

/// Shared tokio runtime for the callback listeners.
/// Two worker threads: one stream per handle is the common case.
pub(crate) static RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("octane-link")
        .build()
        .expect("Failed to create tokio runtime")
});
