//! Wire payloads exchanged with the cloud service. Field names follow
//! the service's JSON spelling via serde renames; anything the client
//! doesn't interpret stays a `serde_json::Value`.

use serde::Deserialize;

/// Every REST reply arrives wrapped in this envelope. A reply can be
/// an HTTP 200 and still signal failure through `success`.

#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    pub token: String,
    pub user_id: String,
    #[serde(default)]
    pub serial_number: Option<String>,
}

/// One entry of the device listing.

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceData {
    pub device_id: String,
    pub device_name: String,
    pub device_type: String,
    #[serde(default)]
    pub unique_id: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub x_cloud_id: Option<String>,
    #[serde(default)]
    pub media_object_count: Option<i64>,
    #[serde(default)]
    pub presigned_last_image_url: Option<String>,
    #[serde(default)]
    pub presigned_full_frame_snapshot_url: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub properties: Option<serde_json::Value>,
}

/// One message from the event stream. The first message after a
/// subscribe is a handshake carrying only `status`; the rest name a
/// resource and carry a property bag.

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEvent {
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub properties: Option<serde_json::Value>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub trans_id: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
}

impl StreamEvent {
    /// `true` for the handshake the service sends right after a
    /// successful subscribe.

    pub fn is_connect_ack(&self) -> bool {
        self.resource.is_none()
            && matches!(self.status.as_deref(), Some("connected"))
    }
}

/// One recording from the media library.

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    pub device_id: String,
    /// Day of capture, rendered `YYYYMMDD` in the camera's timezone.
    pub created_date: String,
    /// Capture instant, milliseconds since the epoch.
    pub local_created_date: i64,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub presigned_content_url: Option<String>,
    #[serde(default)]
    pub presigned_thumbnail_url: Option<String>,
    #[serde(default)]
    pub media_duration_second: Option<i64>,
    #[serde(default)]
    pub unique_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub mode_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// The automation definitions for one base station. The definitions
/// endpoint returns a map of these, keyed by the station's unique id.

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationDefinition {
    #[serde(default)]
    pub modes: Vec<ModeRecord>,
    #[serde(default)]
    pub schedules: Vec<ScheduleRecord>,
}

/// One entry of the active-automation listing.

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationActive {
    pub unique_id: String,
    #[serde(default)]
    pub active_modes: Vec<String>,
    #[serde(default)]
    pub active_schedules: Vec<String>,
}
