//! Delivery of renderer notifications to registered callbacks.
//!
//! The renderer pushes [`proto::StreamCallbackRequest`] messages on a
//! server-streaming RPC. Each one names a callback ID and carries the
//! arguments for one signature. [`CallbackEvent::from_wire`] decodes them,
//! [`Dispatcher`] invokes the registry, and [`CallbackListener`] ties both
//! to a live channel and posts return values back.

use std::sync::Arc;

use http::uri::PathAndQuery;
use tonic::codec::ProstCodec;
use tonic::transport::Channel;

use crate::connection::{ConnectionManager, GrpcConnector};
use crate::error::{Error, Result};
use crate::payload::{
    AssetMissingRequest, ChangeEvent, CheckboxEvent, ComponentEvent, LogLevel, LogMessage,
    ModuleRunRequest, MouseEventInfo, MouseEventKind, OcioErrorReport, RenderImage,
    RenderStatistics,
};
use crate::pool::CallbackId;
use crate::proto::{self, stream_callback_request::Payload};
use crate::registry::CallbackRegistry;
use crate::signature::{self, FuncType};

/// Decoded arguments of one notification.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    NewImage(Vec<RenderImage>),
    RenderFailure,
    NewStatistics(RenderStatistics),
    OcioError(OcioErrorReport),
    AssetMissing(AssetMissingRequest),
    ApiLog(LogMessage),
    Change(ChangeEvent),
    ProjectManager,
    Selection,
    CommandModuleRun(ModuleRunRequest),
    ButtonClicked(ComponentEvent),
    ComboBoxChanged(ComponentEvent),
    TextEditorChanged(ComponentEvent),
    CheckboxChecked(CheckboxEvent),
    Mouse(MouseEventInfo),
}

impl EventPayload {
    pub fn func_type(&self) -> FuncType {
        match self {
            EventPayload::NewImage(_) => FuncType::OnNewImage,
            EventPayload::RenderFailure => FuncType::OnRenderFailure,
            EventPayload::NewStatistics(_) => FuncType::OnNewStatistics,
            EventPayload::OcioError(_) => FuncType::OnOcioError,
            EventPayload::AssetMissing(_) => FuncType::AssetMissing,
            EventPayload::ApiLog(_) => FuncType::ApiLog,
            EventPayload::Change(_) => FuncType::ChangeObserver,
            EventPayload::ProjectManager => FuncType::ProjectManagerObserver,
            EventPayload::Selection => FuncType::SelectionObserver,
            EventPayload::CommandModuleRun(_) => FuncType::CommandModuleRun,
            EventPayload::ButtonClicked(_) => FuncType::ButtonClicked,
            EventPayload::ComboBoxChanged(_) => FuncType::ComboBoxChanged,
            EventPayload::TextEditorChanged(_) => FuncType::TextEditorChanged,
            EventPayload::CheckboxChecked(_) => FuncType::CheckboxChecked,
            EventPayload::Mouse(_) => FuncType::MouseEvent,
        }
    }
}

/// A notification addressed to one registered callback.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackEvent {
    pub id: CallbackId,
    pub payload: EventPayload,
}

impl CallbackEvent {
    pub fn func_type(&self) -> FuncType {
        self.payload.func_type()
    }

    /// Decode a stream message. Messages without a payload or with the
    /// reserved ID 0 are rejected.
    pub fn from_wire(message: proto::StreamCallbackRequest) -> Result<Self> {
        let Some(payload) = message.payload else {
            return Err(Error::MalformedEvent("missing payload".to_string()));
        };

        let (id, payload) = match payload {
            Payload::NewImage(ev) => (
                ev.callback_id,
                EventPayload::NewImage(ev.images.into_iter().map(render_image).collect()),
            ),
            Payload::RenderFailure(ev) => (ev.callback_id, EventPayload::RenderFailure),
            Payload::NewStatistics(ev) => (
                ev.callback_id,
                EventPayload::NewStatistics(RenderStatistics {
                    samples_per_pixel: ev.samples_per_pixel,
                    max_samples_per_pixel: ev.max_samples_per_pixel,
                    render_time_s: ev.render_time,
                    estimated_time_left_s: ev.estimated_time_left,
                    render_state: ev.render_state,
                }),
            ),
            Payload::OcioError(ev) => (
                ev.callback_id,
                EventPayload::OcioError(OcioErrorReport {
                    messages: ev.messages,
                    has_error: ev.has_error,
                }),
            ),
            Payload::AssetMissing(ev) => (
                ev.callback_id,
                EventPayload::AssetMissing(AssetMissingRequest {
                    file_name: ev.file_name,
                    node_name: ev.node_name,
                    attribute_id: ev.attribute_id,
                }),
            ),
            Payload::ApiLog(ev) => (
                ev.callback_id,
                EventPayload::ApiLog(LogMessage {
                    level: LogLevel::from_wire(ev.level),
                    text: ev.text,
                }),
            ),
            Payload::ChangeObserver(ev) => (
                ev.callback_id,
                EventPayload::Change(ChangeEvent {
                    item_handle: ev.item_handle,
                    change_type: ev.change_type,
                    index: ev.index,
                }),
            ),
            Payload::ProjectManager(ev) => (ev.callback_id, EventPayload::ProjectManager),
            Payload::Selection(ev) => (ev.callback_id, EventPayload::Selection),
            Payload::CommandModuleRun(ev) => (
                ev.callback_id,
                EventPayload::CommandModuleRun(ModuleRunRequest {
                    module_id: ev.module_id,
                }),
            ),
            Payload::ButtonClicked(ev) => {
                (ev.callback_id, EventPayload::ButtonClicked(component(&ev)))
            }
            Payload::ComboBoxChanged(ev) => {
                (ev.callback_id, EventPayload::ComboBoxChanged(component(&ev)))
            }
            Payload::TextEditorChanged(ev) => {
                (ev.callback_id, EventPayload::TextEditorChanged(component(&ev)))
            }
            Payload::CheckboxChecked(ev) => (
                ev.callback_id,
                EventPayload::CheckboxChecked(CheckboxEvent {
                    component_handle: ev.component_handle,
                    checked: ev.checked,
                }),
            ),
            Payload::MouseEvent(ev) => (
                ev.callback_id,
                EventPayload::Mouse(MouseEventInfo {
                    component_handle: ev.component_handle,
                    kind: MouseEventKind::from_wire(ev.kind),
                    x: ev.x,
                    y: ev.y,
                }),
            ),
        };

        if id == 0 {
            return Err(Error::MalformedEvent(format!(
                "{} event with callback id 0",
                payload.func_type()
            )));
        }
        Ok(CallbackEvent {
            id: CallbackId(id),
            payload,
        })
    }
}

fn render_image(img: proto::RenderImage) -> RenderImage {
    RenderImage {
        width: img.width,
        height: img.height,
        image_type: img.image_type,
        color_space: img.color_space,
        is_linear: img.is_linear,
        render_pass_id: img.render_pass_id,
        tonemapped_samples_per_pixel: img.tonemapped_samples_per_pixel,
        calculated_samples_per_pixel: img.calculated_samples_per_pixel,
        sub_sample_index: img.sub_sample_index,
        render_time_s: img.render_time,
        buffer_len: img.buffer_len,
    }
}

fn component(ev: &proto::ComponentEvent) -> ComponentEvent {
    ComponentEvent {
        component_handle: ev.component_handle,
    }
}

/// Return value of a non-void callback, addressed back to the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub func_type: FuncType,
    pub id: CallbackId,
    pub value: ReplyValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplyValue {
    Text(String),
    Flag(bool),
}

impl Reply {
    pub fn into_wire(self) -> proto::CallbackReply {
        proto::CallbackReply {
            func_type: self.func_type.name().to_string(),
            callback_id: self.id.get(),
            value: Some(match self.value {
                ReplyValue::Text(s) => proto::callback_reply::Value::Text(s),
                ReplyValue::Flag(b) => proto::callback_reply::Value::Flag(b),
            }),
        }
    }
}

/// Routes decoded events to the registry.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<CallbackRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<CallbackRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.registry
    }

    /// Invoke the callback the event is addressed to. Returns the value to
    /// send back for non-void signatures.
    pub fn dispatch(&self, event: CallbackEvent) -> Option<Reply> {
        let id = event.id;
        let reg = &self.registry;
        match event.payload {
            EventPayload::NewImage(images) => reg.invoke::<signature::OnNewImage>(id, images),
            EventPayload::RenderFailure => reg.invoke::<signature::OnRenderFailure>(id, ()),
            EventPayload::NewStatistics(stats) => {
                reg.invoke::<signature::OnNewStatistics>(id, stats)
            }
            EventPayload::OcioError(report) => reg.invoke::<signature::OnOcioError>(id, report),
            EventPayload::AssetMissing(request) => {
                let path = reg.invoke::<signature::AssetMissing>(id, request);
                return Some(Reply {
                    func_type: FuncType::AssetMissing,
                    id,
                    value: ReplyValue::Text(path),
                });
            }
            EventPayload::ApiLog(msg) => reg.invoke::<signature::ApiLog>(id, msg),
            EventPayload::Change(change) => reg.invoke::<signature::ChangeObserver>(id, change),
            EventPayload::ProjectManager => {
                reg.invoke::<signature::ProjectManagerObserver>(id, ())
            }
            EventPayload::Selection => reg.invoke::<signature::SelectionObserver>(id, ()),
            EventPayload::CommandModuleRun(request) => {
                let ran = reg.invoke::<signature::CommandModuleRun>(id, request);
                return Some(Reply {
                    func_type: FuncType::CommandModuleRun,
                    id,
                    value: ReplyValue::Flag(ran),
                });
            }
            EventPayload::ButtonClicked(ev) => reg.invoke::<signature::ButtonClicked>(id, ev),
            EventPayload::ComboBoxChanged(ev) => reg.invoke::<signature::ComboBoxChanged>(id, ev),
            EventPayload::TextEditorChanged(ev) => {
                reg.invoke::<signature::TextEditorChanged>(id, ev)
            }
            EventPayload::CheckboxChecked(ev) => reg.invoke::<signature::CheckboxChecked>(id, ev),
            EventPayload::Mouse(ev) => reg.invoke::<signature::MouseEvent>(id, ev),
        }
        None
    }

    /// [`dispatch`](Self::dispatch) on tokio's blocking pool, so a slow
    /// callback does not hold up the runtime worker driving the stream.
    pub async fn deliver(&self, event: CallbackEvent) -> Option<Reply> {
        let dispatcher = self.clone();
        let func_type = event.func_type();
        match tokio::task::spawn_blocking(move || dispatcher.dispatch(event)).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(%func_type, "callback task failed: {e}");
                None
            }
        }
    }
}

/// Counters reported when a listener's stream ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    pub delivered: u64,
    pub malformed: u64,
    pub replies_sent: u64,
    pub replies_failed: u64,
}

/// Subscribes to the renderer's callback stream and dispatches every event.
///
/// There is no reconnect: `run` returns when the stream closes or fails and
/// the caller decides whether to start again.
pub struct CallbackListener {
    connection: Arc<ConnectionManager<GrpcConnector>>,
    dispatcher: Dispatcher,
    callback_source: String,
}

impl CallbackListener {
    pub fn new(
        connection: Arc<ConnectionManager<GrpcConnector>>,
        registry: Arc<CallbackRegistry>,
        callback_source: impl Into<String>,
    ) -> Self {
        Self {
            connection,
            dispatcher: Dispatcher::new(registry),
            callback_source: callback_source.into(),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn run(&self) -> Result<ListenerStats> {
        let channel = self.connection.channel()?;
        let mut client = tonic::client::Grpc::new(Channel::clone(&channel));
        client.ready().await?;

        let request = tonic::Request::new(proto::CallbackChannelRequest {
            callback_source: self.callback_source.clone(),
        });
        let codec =
            ProstCodec::<proto::CallbackChannelRequest, proto::StreamCallbackRequest>::default();
        let mut stream = client
            .server_streaming(request, PathAndQuery::from_static(proto::CALLBACK_CHANNEL_PATH), codec)
            .await?
            .into_inner();
        tracing::info!(source = %self.callback_source, "callback stream open");

        let mut stats = ListenerStats::default();
        while let Some(message) = stream.message().await? {
            let event = match CallbackEvent::from_wire(message) {
                Ok(event) => event,
                Err(e) => {
                    stats.malformed += 1;
                    tracing::warn!("dropping callback event: {e}");
                    continue;
                }
            };
            stats.delivered += 1;
            let Some(reply) = self.dispatcher.deliver(event).await else {
                continue;
            };
            match self.send_reply(&channel, reply).await {
                Ok(()) => stats.replies_sent += 1,
                Err(e) => {
                    stats.replies_failed += 1;
                    tracing::warn!("failed to send callback reply: {e}");
                }
            }
        }

        tracing::info!(
            delivered = stats.delivered,
            malformed = stats.malformed,
            "callback stream closed"
        );
        Ok(stats)
    }

    async fn send_reply(&self, channel: &Channel, reply: Reply) -> Result<()> {
        let mut client = tonic::client::Grpc::new(channel.clone());
        client.ready().await?;
        let codec = ProstCodec::<proto::CallbackReply, proto::Empty>::default();
        client
            .unary(
                tonic::Request::new(reply.into_wire()),
                PathAndQuery::from_static(proto::CALLBACK_REPLY_PATH),
                codec,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn wire(payload: Payload) -> proto::StreamCallbackRequest {
        proto::StreamCallbackRequest {
            payload: Some(payload),
        }
    }

    #[test]
    fn decodes_new_image_event() {
        let event = CallbackEvent::from_wire(wire(Payload::NewImage(proto::NewImageEvent {
            callback_id: 1,
            images: vec![proto::RenderImage {
                width: 640,
                height: 480,
                render_time: 1.5,
                ..Default::default()
            }],
        })))
        .unwrap();
        assert_eq!(event.id, CallbackId(1));
        assert_eq!(event.func_type(), FuncType::OnNewImage);
        match event.payload {
            EventPayload::NewImage(images) => {
                assert_eq!(images.len(), 1);
                assert_eq!(images[0].width, 640);
                assert_eq!(images[0].render_time_s, 1.5);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn rejects_empty_payload_and_zero_id() {
        assert!(matches!(
            CallbackEvent::from_wire(proto::StreamCallbackRequest { payload: None }),
            Err(Error::MalformedEvent(_))
        ));
        assert!(matches!(
            CallbackEvent::from_wire(wire(Payload::Selection(proto::BareEvent { callback_id: 0 }))),
            Err(Error::MalformedEvent(_))
        ));
    }

    #[test]
    fn survives_a_prost_round_trip() {
        use prost::Message;

        let original = wire(Payload::ApiLog(proto::ApiLogEvent {
            callback_id: 4,
            level: 2,
            text: "device 0 out of memory".to_string(),
        }));
        let bytes = original.encode_to_vec();
        let decoded = proto::StreamCallbackRequest::decode(bytes.as_slice()).unwrap();
        let event = CallbackEvent::from_wire(decoded).unwrap();
        assert_eq!(
            event.payload,
            EventPayload::ApiLog(LogMessage {
                level: LogLevel::Warning,
                text: "device 0 out of memory".to_string(),
            })
        );
    }

    #[test]
    fn void_events_invoke_without_reply() {
        let registry = Arc::new(CallbackRegistry::default());
        let clicks = Arc::new(AtomicU64::new(0));
        let clicks_cb = Arc::clone(&clicks);
        let id = registry
            .register_new::<signature::ButtonClicked, _>(move |ev| {
                clicks_cb.store(ev.component_handle, Ordering::SeqCst);
            })
            .unwrap();

        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        let reply = dispatcher.dispatch(CallbackEvent {
            id,
            payload: EventPayload::ButtonClicked(ComponentEvent {
                component_handle: 99,
            }),
        });
        assert!(reply.is_none());
        assert_eq!(clicks.load(Ordering::SeqCst), 99);
    }

    #[test]
    fn asset_missing_replies_with_resolved_path() {
        let registry = Arc::new(CallbackRegistry::default());
        let id = registry
            .register_new::<signature::AssetMissing, _>(|req| format!("/mnt/textures/{}", req.file_name))
            .unwrap();

        let reply = Dispatcher::new(registry)
            .dispatch(CallbackEvent {
                id,
                payload: EventPayload::AssetMissing(AssetMissingRequest {
                    file_name: "brick.exr".to_string(),
                    ..Default::default()
                }),
            })
            .unwrap();
        assert_eq!(reply.value, ReplyValue::Text("/mnt/textures/brick.exr".to_string()));

        let wire = reply.into_wire();
        assert_eq!(wire.func_type, "AssetMissing");
        assert_eq!(wire.callback_id, 1);
    }

    #[test]
    fn unregistered_command_module_replies_false() {
        let registry = Arc::new(CallbackRegistry::default());
        let reply = Dispatcher::new(registry)
            .dispatch(CallbackEvent {
                id: CallbackId(7),
                payload: EventPayload::CommandModuleRun(ModuleRunRequest { module_id: 1 }),
            })
            .unwrap();
        assert_eq!(reply.value, ReplyValue::Flag(false));
    }

    #[tokio::test]
    async fn slow_callback_leaves_the_runtime_free() {
        let registry = Arc::new(CallbackRegistry::default());
        let (tx, rx) = std::sync::mpsc::channel::<u64>();
        let rx = parking_lot::Mutex::new(rx);
        let received = Arc::new(AtomicU64::new(0));
        let received_cb = Arc::clone(&received);
        let id = registry
            .register_new::<signature::ButtonClicked, _>(move |_| {
                // Waits for a value sent by a task on the same runtime.
                if let Ok(v) = rx.lock().recv_timeout(std::time::Duration::from_secs(5)) {
                    received_cb.store(v, Ordering::SeqCst);
                }
            })
            .unwrap();

        let feeder = tokio::spawn(async move {
            tokio::task::yield_now().await;
            tx.send(7).unwrap();
        });
        let reply = Dispatcher::new(registry)
            .deliver(CallbackEvent {
                id,
                payload: EventPayload::ButtonClicked(ComponentEvent::default()),
            })
            .await;
        feeder.await.unwrap();

        assert!(reply.is_none());
        assert_eq!(received.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn deliver_returns_replies_for_non_void_signatures() {
        let registry = Arc::new(CallbackRegistry::default());
        let id = registry
            .register_new::<signature::CommandModuleRun, _>(|req| req.module_id == 3)
            .unwrap();
        let reply = Dispatcher::new(registry)
            .deliver(CallbackEvent {
                id,
                payload: EventPayload::CommandModuleRun(ModuleRunRequest { module_id: 3 }),
            })
            .await
            .unwrap();
        assert_eq!(reply.value, ReplyValue::Flag(true));
    }

    #[tokio::test]
    async fn listener_reports_unreachable_renderer() {
        let connector = GrpcConnector {
            connect_timeout: Some(std::time::Duration::from_millis(500)),
            request_timeout: Some(std::time::Duration::from_secs(2)),
        };
        let connection = Arc::new(ConnectionManager::new(connector, "127.0.0.1:1"));
        let listener = CallbackListener::new(connection, Arc::new(CallbackRegistry::default()), "");
        assert!(listener.run().await.is_err());
    }
}
