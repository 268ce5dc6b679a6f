use std::{collections::HashMap, fs, time::Duration};

use anyhow::Context;
use client_core::SupervisorOptions;
use serde::Deserialize;
use url::Url;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub backend_url: String,
    pub poll_interval_ms: u64,
    pub confirm_timeout_secs: u64,
    pub notice_dismiss_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:8000".into(),
            poll_interval_ms: 3000,
            confirm_timeout_secs: 40,
            notice_dismiss_ms: 5000,
        }
    }
}

impl Settings {
    pub fn supervisor_options(&self) -> SupervisorOptions {
        SupervisorOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            confirm_timeout: Duration::from_secs(self.confirm_timeout_secs),
            notice_dismiss_after: Duration::from_millis(self.notice_dismiss_ms),
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("console.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(&raw) {
            if let Some(v) = file_cfg.get("backend_url").and_then(|v| v.as_str()) {
                settings.backend_url = v.to_string();
            }
            if let Some(v) = file_cfg.get("poll_interval_ms").and_then(|v| v.as_integer()) {
                if v > 0 {
                    settings.poll_interval_ms = v as u64;
                }
            }
            if let Some(v) = file_cfg
                .get("confirm_timeout_secs")
                .and_then(|v| v.as_integer())
            {
                if v > 0 {
                    settings.confirm_timeout_secs = v as u64;
                }
            }
            if let Some(v) = file_cfg.get("notice_dismiss_ms").and_then(|v| v.as_integer()) {
                if v > 0 {
                    settings.notice_dismiss_ms = v as u64;
                }
            }
        }
    }

    if let Ok(v) = std::env::var("COYOTE_BACKEND_URL") {
        settings.backend_url = v;
    }
    if let Ok(v) = std::env::var("APP__BACKEND_URL") {
        settings.backend_url = v;
    }

    if let Ok(v) = std::env::var("COYOTE_POLL_INTERVAL_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            if parsed > 0 {
                settings.poll_interval_ms = parsed;
            }
        }
    }
    if let Ok(v) = std::env::var("APP__POLL_INTERVAL_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            if parsed > 0 {
                settings.poll_interval_ms = parsed;
            }
        }
    }

    if let Ok(v) = std::env::var("COYOTE_CONFIRM_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.confirm_timeout_secs = parsed;
        }
    }
    if let Ok(v) = std::env::var("APP__CONFIRM_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.confirm_timeout_secs = parsed;
        }
    }

    if let Ok(v) = std::env::var("COYOTE_NOTICE_DISMISS_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.notice_dismiss_ms = parsed;
        }
    }
    if let Ok(v) = std::env::var("APP__NOTICE_DISMISS_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.notice_dismiss_ms = parsed;
        }
    }

    settings
}

pub fn prepare_backend_url(raw: &str) -> anyhow::Result<String> {
    let backend_url = normalize_backend_url(raw);
    Url::parse(&backend_url).with_context(|| format!("invalid backend url '{raw}'"))?;
    Ok(backend_url)
}

fn normalize_backend_url(raw: &str) -> String {
    let raw = raw.trim();

    if raw.is_empty() {
        return Settings::default().backend_url;
    }

    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };

    with_scheme.trim_end_matches('/').to_string()
}
