//! Arguments handed to callbacks when the renderer fires them.
//!
//! These are plain data; the wire messages in [`crate::proto`] convert into
//! them before dispatch, and the FFI bridge serializes them to JSON for
//! native hosts.

use serde::{Deserialize, Serialize};

/// One rendered image delivered with an `OnNewImage` notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    /// Pixel layout as reported by the renderer (LDR RGBA, HDR RGBA, ...).
    pub image_type: u32,
    pub color_space: u32,
    pub is_linear: bool,
    pub render_pass_id: u32,
    pub tonemapped_samples_per_pixel: f32,
    pub calculated_samples_per_pixel: f32,
    pub sub_sample_index: u32,
    pub render_time_s: f64,
    /// Size of the pixel buffer held by the renderer, in bytes.
    pub buffer_len: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderStatistics {
    pub samples_per_pixel: f32,
    pub max_samples_per_pixel: u32,
    pub render_time_s: f64,
    pub estimated_time_left_s: f64,
    pub render_state: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcioErrorReport {
    pub messages: Vec<String>,
    pub has_error: bool,
}

/// The renderer could not open a referenced file and asks the host where it went.
/// The callback answers with a replacement path, or an empty string to give up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetMissingRequest {
    pub file_name: String,
    pub node_name: String,
    pub attribute_id: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn from_wire(value: u32) -> Self {
        match value {
            0 => LogLevel::Debug,
            2 => LogLevel::Warning,
            3 => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogMessage {
    pub level: LogLevel,
    pub text: String,
}

/// A node graph item changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeEvent {
    pub item_handle: u64,
    pub change_type: u32,
    /// Pin or attribute index, `-1` when the change concerns the whole item.
    pub index: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleRunRequest {
    pub module_id: u32,
}

/// A UI component owned by the renderer reported an interaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentEvent {
    pub component_handle: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckboxEvent {
    pub component_handle: u64,
    pub checked: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseEventKind {
    #[default]
    Move,
    Down,
    Up,
    DoubleClick,
    Wheel,
}

impl MouseEventKind {
    pub fn from_wire(value: u32) -> Self {
        match value {
            1 => MouseEventKind::Down,
            2 => MouseEventKind::Up,
            3 => MouseEventKind::DoubleClick,
            4 => MouseEventKind::Wheel,
            _ => MouseEventKind::Move,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MouseEventInfo {
    pub component_handle: u64,
    pub kind: MouseEventKind,
    pub x: f32,
    pub y: f32,
}
