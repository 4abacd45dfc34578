//! LinkCore: per-handle state managed by the global handle table.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use octane_link::config::LinkConfig;
use octane_link::connection::{ConnectionManager, GrpcConnector};
use octane_link::dispatch::CallbackListener;
use octane_link::CallbackRegistry;
use parking_lot::Mutex;

use crate::RUNTIME;

/// Listener task plus the flag `shutdown` sets. Both change under one lock.
#[derive(Default)]
pub struct ListenerSlot {
    pub task: Option<tokio::task::JoinHandle<()>>,
    pub closed: bool,
}

/// Per-connection state. One instance per `octane_link_create` call.
///
/// Stored in the global `HANDLES` table (see `bridge::abi`) behind an `Arc`.
pub struct LinkCore {
    /// Unique handle ID (key in the HANDLES table).
    pub id: u64,
    /// Configuration the handle was created with.
    pub config: LinkConfig,
    /// Callback IDs and the native callbacks registered under them.
    pub registry: Arc<CallbackRegistry>,
    /// Channel to the renderer, created on first use.
    pub connection: Arc<ConnectionManager<GrpcConnector>>,
    /// Whether a callback stream listener is currently running.
    pub listening: Arc<AtomicBool>,
    /// Listener task (set by start_listener, aborted on shutdown).
    pub listener: Mutex<ListenerSlot>,
}

impl LinkCore {
    pub fn new(id: u64, config: LinkConfig) -> Self {
        Self {
            id,
            registry: config.registry(),
            connection: Arc::new(config.connection_manager()),
            config,
            listening: Arc::new(AtomicBool::new(false)),
            listener: Mutex::new(ListenerSlot::default()),
        }
    }

    /// Spawn the callback stream listener unless one is running.
    ///
    /// Returns `false` once the core has been shut down. The slot lock is
    /// held across the spawn, so a concurrent `shutdown` either sees the
    /// task and aborts it, or runs first and no task is spawned.
    pub fn start_listener(&self) -> bool {
        let mut slot = self.listener.lock();
        if slot.closed {
            return false;
        }
        if self.listening.swap(true, Ordering::AcqRel) {
            return true;
        }

        let listener = CallbackListener::new(
            Arc::clone(&self.connection),
            Arc::clone(&self.registry),
            self.config.callback_source(),
        );
        let listening = Arc::clone(&self.listening);
        let handle = self.id;
        slot.task = Some(RUNTIME.spawn(async move {
            match listener.run().await {
                Ok(stats) => tracing::info!(
                    "callback stream for handle {handle} ended after {} events",
                    stats.delivered
                ),
                Err(e) => tracing::error!("callback stream for handle {handle} failed: {e}"),
            }
            listening.store(false, Ordering::Release);
        }));
        true
    }

    /// Abort the listener and refuse to start another. Idempotent.
    pub fn shutdown(&self) {
        let mut slot = self.listener.lock();
        slot.closed = true;
        if let Some(task) = slot.task.take() {
            task.abort();
        }
        self.listening.store(false, Ordering::Release);
    }
}
