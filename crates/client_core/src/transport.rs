use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use shared::{
    error::CommandError,
    protocol::{CommandAck, DeviceStatus, DeviceUid, StartDeviceRequest},
};
use tracing::debug;

/// Backend control API as the supervisor sees it: a status query, the uid
/// lookup, and the start/stop command pair. Implementations perform the
/// network call and nothing else; no retries, and all state mutation stays in
/// the supervisor.
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    async fn fetch_status(&self) -> Result<DeviceStatus>;
    async fn fetch_uid(&self) -> Result<String>;
    async fn send_start(&self, uid: &str) -> Result<(), CommandError>;
    async fn send_stop(&self) -> Result<(), CommandError>;
}

/// `DeviceBackend` over the dashboard backend's HTTP API.
pub struct HttpDeviceBackend {
    http: Client,
    base_url: String,
}

impl HttpDeviceBackend {
    /// `base_url` must not end with a slash; path segments are appended
    /// verbatim.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Any 2xx is acceptance; the ack message is informational only. Non-2xx
    /// carries the backend's `{detail}` body.
    async fn accept(response: reqwest::Response) -> Result<(), CommandError> {
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| CommandError::Unreachable(err.to_string()))?;
        if status.is_success() {
            if let Ok(ack) = serde_json::from_slice::<CommandAck>(&body) {
                debug!(msg = %ack.msg, "command acknowledged");
            }
            return Ok(());
        }
        Err(CommandError::from_response(status.as_u16(), &body))
    }
}

#[async_trait]
impl DeviceBackend for HttpDeviceBackend {
    async fn fetch_status(&self) -> Result<DeviceStatus> {
        let status = self
            .http
            .get(self.endpoint("/api/coyote/status"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(status)
    }

    async fn fetch_uid(&self) -> Result<String> {
        let body: DeviceUid = self
            .http
            .get(self.endpoint("/api/coyote/uid"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body.uid)
    }

    async fn send_start(&self, uid: &str) -> Result<(), CommandError> {
        let response = self
            .http
            .post(self.endpoint("/api/coyote/start"))
            .json(&StartDeviceRequest {
                uid: uid.to_string(),
            })
            .send()
            .await
            .map_err(|err| CommandError::Unreachable(err.to_string()))?;
        Self::accept(response).await
    }

    async fn send_stop(&self) -> Result<(), CommandError> {
        let response = self
            .http
            .get(self.endpoint("/api/coyote/stop"))
            .send()
            .await
            .map_err(|err| CommandError::Unreachable(err.to_string()))?;
        Self::accept(response).await
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
