use serde::{Deserialize, Serialize};

/// Body of `GET /api/coyote/status`. The backend may include extra fields
/// (it also reports the device uid there); they are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub is_connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<u8>,
}

impl DeviceStatus {
    /// Battery reading constrained to 0..=100; anything absent or out of
    /// range reads as unknown rather than zero.
    pub fn battery_percent(&self) -> Option<u8> {
        self.battery_level.filter(|level| *level <= 100)
    }
}

/// Body of `GET /api/coyote/uid`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceUid {
    pub uid: String,
}

/// Body of `POST /api/coyote/start`. An empty uid asks the backend to
/// auto-detect the device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartDeviceRequest {
    pub uid: String,
}

/// Body of a 2xx start/stop response. The backend acknowledges with a short
/// free-text message ("starting", "already started", "stopping", ...); any
/// 2xx counts as acceptance and the message is informational only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandAck {
    #[serde(default)]
    pub msg: String,
}
