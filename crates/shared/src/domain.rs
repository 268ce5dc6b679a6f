use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connection state the operator has asked for. Set only by an accepted
/// operator request, a command-failure revert, or the first observation after
/// startup; routine polling never writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredState {
    Disconnected,
    Connected,
}

impl DesiredState {
    pub fn from_observed(connected: bool) -> Self {
        if connected {
            Self::Connected
        } else {
            Self::Disconnected
        }
    }

    pub fn wants_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Start,
    Stop,
}

/// Externally visible link phase, derived from desired state, observed state
/// and the in-flight transition. `Unknown` covers the window before the first
/// status observation, during which connect/disconnect controls stay disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPhase {
    Unknown,
    Disconnected,
    Connected,
    PendingStart,
    PendingStop,
}

/// Latest observed truth about the device, replaced wholesale on every
/// successful status poll. A failed poll leaves the previous snapshot in
/// place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub connected: bool,
    /// Battery reading in percent; `None` when the backend did not report one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_percent: Option<u8>,
    pub observed_at: DateTime<Utc>,
}
