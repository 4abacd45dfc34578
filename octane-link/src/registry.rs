//! The callback registry: callback IDs to callbacks, for every signature.
//!
//! One concurrent table holds every registered callback, keyed by
//! `(FuncType, id)`. Entries are stored type-erased and downcast back to the
//! signature's handler type on invoke; since the key carries the func type,
//! the downcast always matches in practice.
//!
//! No lock is held while a callback runs. `invoke` clones the handler out of
//! the table and drops the shard guard before calling it, so callbacks may
//! register, unregister or invoke other callbacks freely.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::{Error, Result};
use crate::pool::{CallbackId, DEFAULT_MAX_CALLBACKS, IdPools};
use crate::signature::{FuncType, Signature, SignatureVisitor};

/// Shared handler type for signature `S`.
pub type Handler<S> =
    Arc<dyn Fn(<S as Signature>::Args) -> <S as Signature>::Output + Send + Sync>;

type ErasedHandler = Box<dyn Any + Send + Sync>;

pub struct CallbackRegistry {
    pools: IdPools,
    table: DashMap<(FuncType, CallbackId), ErasedHandler>,
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CALLBACKS)
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("registered", &self.table.len())
            .field("max_per_type", &self.pools.max_size())
            .finish()
    }
}

impl CallbackRegistry {
    /// Registry allowing `max_per_type` outstanding callbacks per signature.
    pub fn new(max_per_type: u32) -> Self {
        Self {
            pools: IdPools::new(max_per_type),
            table: DashMap::new(),
        }
    }

    pub fn pools(&self) -> &IdPools {
        &self.pools
    }

    /// Reserve an ID for a callback of signature `S`.
    pub fn allocate<S: Signature>(&self) -> Result<CallbackId> {
        self.pools.next_id(S::FUNC_TYPE)
    }

    /// Store `callback` under a previously allocated `id`.
    pub fn register<S, F>(&self, id: CallbackId, callback: F) -> Result<()>
    where
        S: Signature,
        F: Fn(S::Args) -> S::Output + Send + Sync + 'static,
    {
        let func_type = S::FUNC_TYPE;
        let handler: Handler<S> = Arc::new(callback);
        // The pool lock is held across the check and the insert, so the ID
        // cannot be released in between.
        let rejected = self.pools.with_used(func_type, id, || {
            match self.table.entry((func_type, id)) {
                Entry::Occupied(_) => Some(handler),
                Entry::Vacant(slot) => {
                    slot.insert(Box::new(handler));
                    None
                }
            }
        })?;
        if rejected.is_some() {
            return Err(Error::AlreadyRegistered {
                func_type,
                id: id.get(),
            });
        }
        tracing::debug!(%func_type, %id, "callback registered");
        Ok(())
    }

    /// Allocate an ID and register `callback` under it.
    pub fn register_new<S, F>(&self, callback: F) -> Result<CallbackId>
    where
        S: Signature,
        F: Fn(S::Args) -> S::Output + Send + Sync + 'static,
    {
        let id = self.allocate::<S>()?;
        if let Err(e) = self.register::<S, F>(id, callback) {
            let _ = self.pools.release_id(S::FUNC_TYPE, id);
            return Err(e);
        }
        Ok(id)
    }

    /// Remove the callback stored under `id` and return the ID to its pool.
    ///
    /// Fails with [`Error::IdNotInUse`], changing nothing, if `id` is not
    /// currently allocated for `S` (for example when unregistered twice).
    pub fn unregister<S: Signature>(&self, id: CallbackId) -> Result<()> {
        self.unregister_dyn(S::FUNC_TYPE, id)
    }

    /// [`unregister`](Self::unregister) for a signature known only at runtime.
    pub fn unregister_dyn(&self, func_type: FuncType, id: CallbackId) -> Result<()> {
        // Entry out first, ID back second, under one lock: a thread that
        // allocates the same ID next always finds the slot empty.
        let removed = self
            .pools
            .release_after(func_type, id, || self.table.remove(&(func_type, id)))?;
        // Dropped outside the pool lock; the handler may own registry state.
        drop(removed);
        tracing::debug!(%func_type, %id, "callback unregistered");
        Ok(())
    }

    /// Call the callback registered under `id` with `args`.
    ///
    /// A missing ID yields `S::Output::default()`: the host has simply lost
    /// interest. A panicking callback is contained here and also yields the
    /// default.
    pub fn invoke<S: Signature>(&self, id: CallbackId, args: S::Args) -> S::Output {
        let func_type = S::FUNC_TYPE;
        let handler = self
            .table
            .get(&(func_type, id))
            .and_then(|entry| entry.downcast_ref::<Handler<S>>().cloned());

        let Some(handler) = handler else {
            tracing::debug!(%func_type, %id, "no callback registered, ignoring");
            return S::Output::default();
        };

        match catch_unwind(AssertUnwindSafe(|| handler(args))) {
            Ok(output) => output,
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(%func_type, %id, "callback panicked: {msg}");
                S::Output::default()
            }
        }
    }

    /// Invoke by runtime name with JSON-encoded arguments, returning the
    /// JSON-encoded output. Used where the signature is not known statically.
    pub fn invoke_json(&self, func_type: FuncType, id: CallbackId, args_json: &str) -> Result<String> {
        struct InvokeJson<'a> {
            registry: &'a CallbackRegistry,
            id: CallbackId,
            args_json: &'a str,
        }

        impl SignatureVisitor for InvokeJson<'_> {
            type Output = Result<String>;

            fn visit<S: Signature>(self) -> Result<String> {
                let args: S::Args = serde_json::from_str(self.args_json).map_err(|e| {
                    Error::InvalidArgument(format!("bad {} payload: {e}", S::FUNC_TYPE))
                })?;
                let output = self.registry.invoke::<S>(self.id, args);
                serde_json::to_string(&output)
                    .map_err(|e| Error::InvalidArgument(format!("unserializable output: {e}")))
            }
        }

        func_type.visit(InvokeJson {
            registry: self,
            id,
            args_json,
        })
    }

    pub fn is_registered<S: Signature>(&self, id: CallbackId) -> bool {
        self.table.contains_key(&(S::FUNC_TYPE, id))
    }

    /// Number of registered callbacks across all signatures.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Sorted IDs holding a callback for `func_type`.
    pub fn registered_ids(&self, func_type: FuncType) -> Vec<CallbackId> {
        let mut ids: Vec<CallbackId> = self
            .table
            .iter()
            .filter(|entry| entry.key().0 == func_type)
            .map(|entry| entry.key().1)
            .collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{AssetMissingRequest, ComponentEvent, RenderImage};
    use crate::signature::{AssetMissing, ButtonClicked, CommandModuleRun, OnNewImage, OnRenderFailure};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn register_invoke_unregister_round_trip() {
        let registry = CallbackRegistry::default();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_cb = Arc::clone(&seen);

        let id = registry
            .register_new::<OnNewImage, _>(move |images| {
                seen_cb.fetch_add(images.len(), Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(id, CallbackId(1));

        registry.invoke::<OnNewImage>(id, vec![RenderImage::default()]);
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        registry.unregister::<OnNewImage>(id).unwrap();
        registry.invoke::<OnNewImage>(id, vec![RenderImage::default()]);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn return_values_propagate_unchanged() {
        let registry = CallbackRegistry::default();
        let id = registry
            .register_new::<AssetMissing, _>(|req| format!("/assets/{}", req.file_name))
            .unwrap();
        let resolved = registry.invoke::<AssetMissing>(
            id,
            AssetMissingRequest {
                file_name: "wood.png".into(),
                ..Default::default()
            },
        );
        assert_eq!(resolved, "/assets/wood.png");
    }

    #[test]
    fn missing_id_returns_default() {
        let registry = CallbackRegistry::default();
        assert!(!registry.invoke::<CommandModuleRun>(CallbackId(3), Default::default()));
        assert_eq!(
            registry.invoke::<AssetMissing>(CallbackId(1), Default::default()),
            String::new()
        );
    }

    #[test]
    fn register_requires_allocated_id() {
        let registry = CallbackRegistry::default();
        let err = registry
            .register::<OnRenderFailure, _>(CallbackId(5), |_| {})
            .unwrap_err();
        assert!(matches!(err, Error::IdNotInUse { id: 5, .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn register_twice_under_same_id_fails() {
        let registry = CallbackRegistry::default();
        let id = registry.allocate::<ButtonClicked>().unwrap();
        registry.register::<ButtonClicked, _>(id, |_| {}).unwrap();
        let err = registry.register::<ButtonClicked, _>(id, |_| {}).unwrap_err();
        assert!(matches!(err, Error::AlreadyRegistered { .. }));
    }

    #[test]
    fn double_unregister_is_an_error() {
        let registry = CallbackRegistry::default();
        let id = registry.register_new::<ButtonClicked, _>(|_| {}).unwrap();
        registry.unregister::<ButtonClicked>(id).unwrap();
        assert!(matches!(
            registry.unregister::<ButtonClicked>(id),
            Err(Error::IdNotInUse { .. })
        ));
    }

    #[test]
    fn panicking_callback_yields_default() {
        let registry = CallbackRegistry::default();
        let id = registry
            .register_new::<CommandModuleRun, _>(|_| panic!("module crashed"))
            .unwrap();
        assert!(!registry.invoke::<CommandModuleRun>(id, Default::default()));
        // Still registered; a later call behaves the same.
        assert!(registry.is_registered::<CommandModuleRun>(id));
    }

    #[test]
    fn callbacks_can_reenter_the_registry() {
        let registry = Arc::new(CallbackRegistry::default());
        let inner = Arc::clone(&registry);
        let id = registry
            .register_new::<ButtonClicked, _>(move |event: ComponentEvent| {
                // Unregister ourselves from inside the callback.
                let _ = inner.unregister::<ButtonClicked>(CallbackId(event.component_handle as u32));
            })
            .unwrap();

        registry.invoke::<ButtonClicked>(
            id,
            ComponentEvent {
                component_handle: u64::from(id.get()),
            },
        );
        assert!(!registry.is_registered::<ButtonClicked>(id));
    }

    #[test]
    fn invoke_json_round_trips_through_serde() {
        let registry = CallbackRegistry::default();
        let id = registry
            .register_new::<CommandModuleRun, _>(|req| req.module_id == 42)
            .unwrap();
        let out = registry
            .invoke_json(FuncType::CommandModuleRun, id, r#"{"module_id":42}"#)
            .unwrap();
        assert_eq!(out, "true");

        let err = registry
            .invoke_json(FuncType::CommandModuleRun, id, "not json")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn registered_ids_are_scoped_and_sorted() {
        let registry = CallbackRegistry::default();
        for _ in 0..3 {
            registry.register_new::<ButtonClicked, _>(|_| {}).unwrap();
        }
        registry.register_new::<OnRenderFailure, _>(|_| {}).unwrap();
        assert_eq!(
            registry.registered_ids(FuncType::ButtonClicked),
            vec![CallbackId(1), CallbackId(2), CallbackId(3)]
        );
        assert_eq!(registry.len(), 4);
    }
}
