use std::{fs, path::Path, time::Duration};

use anyhow::{anyhow, Context};
use serde::Deserialize;
use shared::domain::MediaType;
use url::Url;

use crate::{
    catalog::DEFAULT_PAGE_SIZE,
    throttle::{ThrottleSettings, DEFAULT_DEAD_ZONE, DEFAULT_JOYSTICK_SPEED, DEFAULT_QUIESCENCE},
};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_DEVICE_PORT: u16 = 8082;

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSettings {
    pub api_base_url: String,
    pub device_port: u16,
    pub page_size: u32,
    pub default_media_type: MediaType,
    pub quiescence: Duration,
    pub dead_zone: f64,
    pub joystick_speed: f64,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            device_port: DEFAULT_DEVICE_PORT,
            page_size: DEFAULT_PAGE_SIZE,
            default_media_type: MediaType::Photo,
            quiescence: DEFAULT_QUIESCENCE,
            dead_zone: DEFAULT_DEAD_ZONE,
            joystick_speed: DEFAULT_JOYSTICK_SPEED,
        }
    }
}

impl ControllerSettings {
    pub fn throttle(&self) -> ThrottleSettings {
        ThrottleSettings {
            quiescence: self.quiescence,
            dead_zone: self.dead_zone,
            speed: self.joystick_speed,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    api_base_url: Option<String>,
    device_port: Option<u16>,
    page_size: Option<u32>,
    default_media_type: Option<i64>,
    quiescence_ms: Option<u64>,
    dead_zone: Option<f64>,
    joystick_speed: Option<f64>,
}

/// Defaults, then the optional TOML file, then the process environment.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<ControllerSettings> {
    let mut settings = ControllerSettings::default();

    if let Some(path) = config_path {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        apply_file(&mut settings, &raw)
            .with_context(|| format!("invalid config file '{}'", path.display()))?;
    }

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings.api_base_url = normalize_base_url(&settings.api_base_url)?;
    Ok(settings)
}

fn apply_file(settings: &mut ControllerSettings, raw: &str) -> anyhow::Result<()> {
    let file: SettingsFile = toml::from_str(raw)?;

    if let Some(v) = file.api_base_url {
        settings.api_base_url = v;
    }
    if let Some(v) = file.device_port {
        settings.device_port = v;
    }
    if let Some(v) = file.page_size.filter(|v| *v > 0) {
        settings.page_size = v;
    }
    if let Some(v) = file.default_media_type {
        settings.default_media_type = MediaType::from(v);
    }
    if let Some(v) = file.quiescence_ms {
        settings.quiescence = Duration::from_millis(v);
    }
    if let Some(v) = file.dead_zone.filter(|v| valid_dead_zone(*v)) {
        settings.dead_zone = v;
    }
    if let Some(v) = file.joystick_speed.filter(|v| valid_speed(*v)) {
        settings.joystick_speed = v;
    }

    Ok(())
}

/// `APP__*` names take precedence over the bare ones. Unparseable numbers
/// and out-of-range values leave the current value in place.
pub fn apply_env_overrides<F>(settings: &mut ControllerSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("DWARF_API_BASE_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = lookup("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = lookup("APP__DEVICE_PORT").and_then(|v| v.parse().ok()) {
        settings.device_port = v;
    }
    if let Some(v) = lookup("APP__PAGE_SIZE")
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|v| *v > 0)
    {
        settings.page_size = v;
    }
    if let Some(v) = lookup("APP__DEFAULT_MEDIA_TYPE").and_then(|v| v.parse::<i64>().ok()) {
        settings.default_media_type = MediaType::from(v);
    }
    if let Some(v) = lookup("APP__QUIESCENCE_MS").and_then(|v| v.parse::<u64>().ok()) {
        settings.quiescence = Duration::from_millis(v);
    }
    if let Some(v) = lookup("APP__DEAD_ZONE")
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| valid_dead_zone(*v))
    {
        settings.dead_zone = v;
    }
    if let Some(v) = lookup("APP__JOYSTICK_SPEED")
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| valid_speed(*v))
    {
        settings.joystick_speed = v;
    }
}

// dead zone is a fraction of full deflection
fn valid_dead_zone(v: f64) -> bool {
    v.is_finite() && (0.0..=1.0).contains(&v)
}

fn valid_speed(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

pub fn normalize_base_url(raw: &str) -> anyhow::Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok(DEFAULT_API_BASE_URL.to_string());
    }

    let parsed =
        Url::parse(trimmed).with_context(|| format!("invalid API base url '{trimmed}'"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(anyhow!(
            "API base url must start with http:// or https://, got '{trimmed}'"
        ));
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
