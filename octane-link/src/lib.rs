//! Client-side plumbing for driving an out-of-process Octane renderer.
//!
//! The renderer calls back into this process asynchronously: new images,
//! render failures, missing assets, UI events, log lines. Each callback the
//! host registers gets a small integer ID, scoped to its signature, which is
//! sent to the renderer and comes back with every notification.
//!
//! - [`registry::CallbackRegistry`] allocates IDs and maps them to callbacks.
//! - [`connection::ConnectionManager`] owns the lazily created channel.
//! - [`dispatch::CallbackListener`] reads the callback stream and invokes
//!   the registry.
//!
//! ```no_run
//! use std::sync::Arc;
//! use octane_link::config::LinkConfig;
//! use octane_link::dispatch::CallbackListener;
//! use octane_link::signature::OnNewImage;
//!
//! # async fn run() -> octane_link::Result<()> {
//! let config = LinkConfig::load_or_default();
//! let registry = config.registry();
//! let connection = Arc::new(config.connection_manager());
//!
//! let id = registry.register_new::<OnNewImage, _>(|images| {
//!     println!("{} new images", images.len());
//! })?;
//! // ... pass `id` to the renderer in a render request ...
//!
//! CallbackListener::new(connection, Arc::clone(&registry), config.callback_source())
//!     .run()
//!     .await?;
//! registry.unregister::<OnNewImage>(id)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod payload;
pub mod pool;
pub mod proto;
pub mod registry;
pub mod signature;

pub use error::{Error, Result};
pub use pool::CallbackId;
pub use registry::CallbackRegistry;
pub use signature::{FuncType, Signature};
