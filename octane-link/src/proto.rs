//! Wire messages of the renderer's callback stream service.
//!
//! Only the messages the callback stream needs are declared here, by hand,
//! with prost derives. The rest of the renderer's API is generated proxy
//! code and lives elsewhere.

/// Server-streaming RPC that delivers callback invocations.
pub const CALLBACK_CHANNEL_PATH: &str = "/octaneapi.StreamCallbackService/callbackChannel";
/// Unary RPC carrying return values of non-void callbacks back to the renderer.
pub const CALLBACK_REPLY_PATH: &str = "/octaneapi.StreamCallbackService/callbackReply";

#[derive(Clone, PartialEq, prost::Message)]
pub struct Empty {}

/// Opens the callback stream. `callback_source` identifies this client when
/// several hosts share one renderer (embedded module mode).
#[derive(Clone, PartialEq, prost::Message)]
pub struct CallbackChannelRequest {
    #[prost(string, tag = "1")]
    pub callback_source: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RenderImage {
    #[prost(uint32, tag = "1")]
    pub width: u32,
    #[prost(uint32, tag = "2")]
    pub height: u32,
    #[prost(uint32, tag = "3")]
    pub image_type: u32,
    #[prost(uint32, tag = "4")]
    pub color_space: u32,
    #[prost(bool, tag = "5")]
    pub is_linear: bool,
    #[prost(uint32, tag = "6")]
    pub render_pass_id: u32,
    #[prost(float, tag = "7")]
    pub tonemapped_samples_per_pixel: f32,
    #[prost(float, tag = "8")]
    pub calculated_samples_per_pixel: f32,
    #[prost(uint32, tag = "9")]
    pub sub_sample_index: u32,
    #[prost(double, tag = "10")]
    pub render_time: f64,
    #[prost(uint64, tag = "11")]
    pub buffer_len: u64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct NewImageEvent {
    #[prost(uint32, tag = "1")]
    pub callback_id: u32,
    #[prost(message, repeated, tag = "2")]
    pub images: Vec<RenderImage>,
}

/// Events that carry nothing but the callback ID.
#[derive(Clone, PartialEq, prost::Message)]
pub struct BareEvent {
    #[prost(uint32, tag = "1")]
    pub callback_id: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct NewStatisticsEvent {
    #[prost(uint32, tag = "1")]
    pub callback_id: u32,
    #[prost(float, tag = "2")]
    pub samples_per_pixel: f32,
    #[prost(uint32, tag = "3")]
    pub max_samples_per_pixel: u32,
    #[prost(double, tag = "4")]
    pub render_time: f64,
    #[prost(double, tag = "5")]
    pub estimated_time_left: f64,
    #[prost(uint32, tag = "6")]
    pub render_state: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct OcioErrorEvent {
    #[prost(uint32, tag = "1")]
    pub callback_id: u32,
    #[prost(string, repeated, tag = "2")]
    pub messages: Vec<String>,
    #[prost(bool, tag = "3")]
    pub has_error: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AssetMissingEvent {
    #[prost(uint32, tag = "1")]
    pub callback_id: u32,
    #[prost(string, tag = "2")]
    pub file_name: String,
    #[prost(string, tag = "3")]
    pub node_name: String,
    #[prost(uint32, tag = "4")]
    pub attribute_id: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ApiLogEvent {
    #[prost(uint32, tag = "1")]
    pub callback_id: u32,
    #[prost(uint32, tag = "2")]
    pub level: u32,
    #[prost(string, tag = "3")]
    pub text: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ChangeObserverEvent {
    #[prost(uint32, tag = "1")]
    pub callback_id: u32,
    #[prost(uint64, tag = "2")]
    pub item_handle: u64,
    #[prost(uint32, tag = "3")]
    pub change_type: u32,
    #[prost(int32, tag = "4")]
    pub index: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CommandModuleRunEvent {
    #[prost(uint32, tag = "1")]
    pub callback_id: u32,
    #[prost(uint32, tag = "2")]
    pub module_id: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ComponentEvent {
    #[prost(uint32, tag = "1")]
    pub callback_id: u32,
    #[prost(uint64, tag = "2")]
    pub component_handle: u64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CheckboxEvent {
    #[prost(uint32, tag = "1")]
    pub callback_id: u32,
    #[prost(uint64, tag = "2")]
    pub component_handle: u64,
    #[prost(bool, tag = "3")]
    pub checked: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MouseEvent {
    #[prost(uint32, tag = "1")]
    pub callback_id: u32,
    #[prost(uint64, tag = "2")]
    pub component_handle: u64,
    #[prost(uint32, tag = "3")]
    pub kind: u32,
    #[prost(float, tag = "4")]
    pub x: f32,
    #[prost(float, tag = "5")]
    pub y: f32,
}

/// One callback invocation pushed by the renderer.
#[derive(Clone, PartialEq, prost::Message)]
pub struct StreamCallbackRequest {
    #[prost(
        oneof = "stream_callback_request::Payload",
        tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15"
    )]
    pub payload: Option<stream_callback_request::Payload>,
}

pub mod stream_callback_request {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "1")]
        NewImage(super::NewImageEvent),
        #[prost(message, tag = "2")]
        RenderFailure(super::BareEvent),
        #[prost(message, tag = "3")]
        NewStatistics(super::NewStatisticsEvent),
        #[prost(message, tag = "4")]
        OcioError(super::OcioErrorEvent),
        #[prost(message, tag = "5")]
        AssetMissing(super::AssetMissingEvent),
        #[prost(message, tag = "6")]
        ApiLog(super::ApiLogEvent),
        #[prost(message, tag = "7")]
        ChangeObserver(super::ChangeObserverEvent),
        #[prost(message, tag = "8")]
        ProjectManager(super::BareEvent),
        #[prost(message, tag = "9")]
        Selection(super::BareEvent),
        #[prost(message, tag = "10")]
        CommandModuleRun(super::CommandModuleRunEvent),
        #[prost(message, tag = "11")]
        ButtonClicked(super::ComponentEvent),
        #[prost(message, tag = "12")]
        ComboBoxChanged(super::ComponentEvent),
        #[prost(message, tag = "13")]
        TextEditorChanged(super::ComponentEvent),
        #[prost(message, tag = "14")]
        CheckboxChecked(super::CheckboxEvent),
        #[prost(message, tag = "15")]
        MouseEvent(super::MouseEvent),
    }
}

/// Return value of a non-void callback.
#[derive(Clone, PartialEq, prost::Message)]
pub struct CallbackReply {
    #[prost(string, tag = "1")]
    pub func_type: String,
    #[prost(uint32, tag = "2")]
    pub callback_id: u32,
    #[prost(oneof = "callback_reply::Value", tags = "3, 4")]
    pub value: Option<callback_reply::Value>,
}

pub mod callback_reply {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Value {
        #[prost(string, tag = "3")]
        Text(String),
        #[prost(bool, tag = "4")]
        Flag(bool),
    }
}
