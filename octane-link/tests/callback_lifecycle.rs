//! Callback lifecycle tests: allocation, registration, invocation, release.
//!
//! Tests cover:
//! - The OnNewImage walk-through: allocate, register, invoke, release, re-release
//! - Pool partitioning while IDs are taken and returned
//! - Delivering wire events end to end through the dispatcher
//! - Re-entrant registration from inside a running callback

use std::sync::Arc;

use parking_lot::Mutex;

use octane_link::dispatch::{CallbackEvent, Dispatcher};
use octane_link::payload::RenderImage;
use octane_link::proto::{self, stream_callback_request::Payload};
use octane_link::signature::{ApiLog, OnNewImage, SelectionObserver};
use octane_link::{CallbackId, CallbackRegistry, Error, FuncType};

#[test]
fn new_image_walk_through() {
    let registry = CallbackRegistry::default();
    let calls: Arc<Mutex<Vec<Vec<RenderImage>>>> = Arc::new(Mutex::new(Vec::new()));

    let id = registry.allocate::<OnNewImage>().unwrap();
    assert_eq!(id, CallbackId(1));

    let log = Arc::clone(&calls);
    registry
        .register::<OnNewImage, _>(id, move |images| log.lock().push(images))
        .unwrap();

    let image = RenderImage {
        width: 1920,
        height: 1080,
        ..Default::default()
    };
    registry.invoke::<OnNewImage>(id, vec![image.clone()]);
    assert_eq!(*calls.lock(), vec![vec![image.clone()]]);

    registry.unregister::<OnNewImage>(id).unwrap();
    registry.invoke::<OnNewImage>(id, vec![image]);
    assert_eq!(calls.lock().len(), 1, "no call after release");

    match registry.unregister::<OnNewImage>(id) {
        Err(Error::IdNotInUse { func_type, id }) => {
            assert_eq!(func_type, FuncType::OnNewImage);
            assert_eq!(id, 1);
        }
        other => panic!("expected IdNotInUse, got {other:?}"),
    }
}

#[test]
fn pool_stays_partitioned_through_churn() {
    let registry = CallbackRegistry::new(12);
    let mut held = Vec::new();
    for round in 0..30u32 {
        if round % 3 == 2 {
            let id = held.remove(0);
            registry.unregister::<ApiLog>(id).unwrap();
        } else {
            held.push(registry.register_new::<ApiLog, _>(|_| {}).unwrap());
        }

        let (available, used) = registry.pools().snapshot(FuncType::ApiLog);
        assert!(available.iter().all(|id| !used.contains(id)));
        let mut union: Vec<u32> = available.iter().chain(&used).copied().collect();
        union.sort_unstable();
        assert_eq!(union, (1..=12).collect::<Vec<_>>());
        assert_eq!(used.len(), held.len());
    }
}

#[test]
fn wire_event_reaches_registered_callback() {
    let registry = Arc::new(CallbackRegistry::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let id = registry
        .register_new::<ApiLog, _>(move |msg| sink.lock().push(msg.text))
        .unwrap();

    let message = proto::StreamCallbackRequest {
        payload: Some(Payload::ApiLog(proto::ApiLogEvent {
            callback_id: id.get(),
            level: 1,
            text: "scene loaded".to_string(),
        })),
    };
    let dispatcher = Dispatcher::new(Arc::clone(&registry));
    let reply = dispatcher.dispatch(CallbackEvent::from_wire(message).unwrap());

    assert!(reply.is_none());
    assert_eq!(*seen.lock(), vec!["scene loaded".to_string()]);
}

#[test]
fn callback_can_register_another_callback() {
    let registry = Arc::new(CallbackRegistry::default());
    let inner = Arc::clone(&registry);
    let spawned = Arc::new(Mutex::new(None));
    let spawned_slot = Arc::clone(&spawned);

    let id = registry
        .register_new::<SelectionObserver, _>(move |()| {
            let child = inner.register_new::<ApiLog, _>(|_| {}).unwrap();
            *spawned_slot.lock() = Some(child);
        })
        .unwrap();

    registry.invoke::<SelectionObserver>(id, ());
    let child = (*spawned.lock()).expect("callback ran");
    assert!(registry.is_registered::<ApiLog>(child));
}
