use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::{DeviceInfo, MediaCount, MediaItem, MediaType},
    error::DeviceFault,
};

/// Resource paths exposed by the device proxy, relative to the API base URL.
pub mod endpoints {
    pub const DEVICE_CONNECT: &str = "/device/connect";

    pub const CAMERA_TELE_OPEN: &str = "/camera/tele/open";
    pub const CAMERA_TELE_CLOSE: &str = "/camera/tele/close";
    pub const CAMERA_TELE_PHOTO: &str = "/camera/tele/photo";
    pub const CAMERA_TELE_VIDEO_START: &str = "/camera/tele/video/start";
    pub const CAMERA_TELE_VIDEO_STOP: &str = "/camera/tele/video/stop";

    pub const ALBUM_COUNTS: &str = "/album/counts";
    pub const ALBUM_LIST: &str = "/album/list";
    pub const ALBUM_DELETE: &str = "/album/delete";

    pub const ASTRO_CALIBRATION_START: &str = "/astro/calibration/start";
    pub const ASTRO_CALIBRATION_STOP: &str = "/astro/calibration/stop";
    pub const ASTRO_GOTO_DSO: &str = "/astro/goto/dso";
    pub const ASTRO_GOTO_STOP: &str = "/astro/goto/stop";
    pub const ASTRO_ONE_CLICK_GOTO_DSO: &str = "/astro/goto/one-click/dso";
    pub const ASTRO_ONE_CLICK_GOTO_STOP: &str = "/astro/goto/one-click/stop";
    pub const ASTRO_STACKING_START: &str = "/astro/stacking/start";
    pub const ASTRO_STACKING_STOP: &str = "/astro/stacking/stop";

    pub const FOCUS_AUTO: &str = "/focus/auto";
    pub const FOCUS_ASTRO_START: &str = "/focus/astro/start";
    pub const FOCUS_ASTRO_STOP: &str = "/focus/astro/stop";
    pub const FOCUS_MANUAL_STEP: &str = "/focus/manual/step";

    pub const MOTOR_STOP: &str = "/motor/stop";
    pub const MOTOR_JOYSTICK_START: &str = "/motor/joystick/start";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub ip: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenCameraRequest {
    pub binning: bool,
    pub rtsp_encode_type: i64,
}

impl Default for OpenCameraRequest {
    fn default() -> Self {
        Self {
            binning: false,
            rtsp_encode_type: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JoystickRequest {
    pub vector_angle: f64,
    pub vector_length: f64,
    pub speed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopMotorRequest {
    pub motor_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoFocusRequest {
    pub mode: i64,
    pub center_x: i64,
    pub center_y: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AstroFocusRequest {
    pub mode: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualFocusRequest {
    pub direction: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GotoDsoRequest {
    pub ra: f64,
    pub dec: f64,
    pub target_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaListRequest {
    pub media_type: MediaType,
    pub page_index: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDeleteItem {
    pub media_type: MediaType,
    pub file_path: String,
    pub file_name: String,
}

impl From<&MediaItem> for MediaDeleteItem {
    fn from(item: &MediaItem) -> Self {
        Self {
            media_type: item.media_type,
            file_path: item.file_path.clone(),
            file_name: item.file_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDeleteRequest {
    pub items: Vec<MediaDeleteItem>,
}

const SUCCESS_STATUSES: &[&str] = &["success", "connected"];
const NO_RESPONSE_STATUS: &str = "no_response";

fn payload_message(payload: &Value) -> Option<String> {
    ["message", "detail", "msg"]
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Folds a proxy response into success or a [`DeviceFault`].
///
/// A recognized `status` string wins; otherwise a numeric `code` decides, `0`
/// meaning success. Payloads carrying neither are data responses and count as
/// success.
pub fn interpret_response(payload: &Value) -> Result<(), DeviceFault> {
    let code = payload.get("code").and_then(Value::as_i64);
    let message = payload_message(payload);

    match payload.get("status").and_then(Value::as_str) {
        Some(status) if SUCCESS_STATUSES.contains(&status) => Ok(()),
        Some(NO_RESPONSE_STATUS) => Err(DeviceFault::new(
            None,
            message.unwrap_or_else(|| "device did not respond".to_string()),
        )),
        Some(status) => match code {
            Some(code) if code != 0 => Err(DeviceFault::from_code(code, message)),
            _ => Err(DeviceFault::new(
                code,
                message.unwrap_or_else(|| format!("device reported status '{status}'")),
            )),
        },
        None => match code {
            Some(code) if code != 0 => Err(DeviceFault::from_code(code, message)),
            _ => Ok(()),
        },
    }
}

#[derive(Debug, Deserialize)]
struct RawMediaItem {
    #[serde(default, rename = "fileName", alias = "file_name")]
    file_name: Option<String>,
    #[serde(default, rename = "filePath", alias = "file_path")]
    file_path: Option<String>,
    #[serde(default, rename = "fileSize", alias = "file_size")]
    file_size: Option<u64>,
    #[serde(default, rename = "mediaType", alias = "media_type")]
    media_type: Option<i64>,
    #[serde(default, rename = "modificationTime", alias = "modification_time")]
    modification_time: Option<i64>,
    #[serde(default, rename = "createTime", alias = "create_time")]
    create_time: Option<i64>,
}

impl RawMediaItem {
    fn into_item(self, fallback_type: MediaType) -> MediaItem {
        MediaItem {
            file_name: self.file_name.unwrap_or_default(),
            file_path: self.file_path.unwrap_or_default(),
            file_size: self.file_size.unwrap_or_default(),
            media_type: self.media_type.map(MediaType::from).unwrap_or(fallback_type),
            timestamp: self.modification_time.or(self.create_time),
        }
    }
}

fn media_list_array(payload: &Value) -> Option<&Value> {
    let data = payload.get("data");
    data.filter(|v| v.is_array())
        .or_else(|| payload.get("list").filter(|v| v.is_array()))
        .or_else(|| data.and_then(|d| d.get("list")).filter(|v| v.is_array()))
        .or_else(|| payload.get("mediaInfos").filter(|v| v.is_array()))
}

/// Pulls album entries out of a list response. The proxy has shipped the list
/// under `data`, `list`, `data.list` and `mediaInfos`; a payload with none of
/// them is an empty page. Entries missing a media type take `fallback_type`.
pub fn extract_media_items(
    payload: &Value,
    fallback_type: MediaType,
) -> Result<Vec<MediaItem>, serde_json::Error> {
    let Some(array) = media_list_array(payload) else {
        return Ok(Vec::new());
    };

    let raw: Vec<RawMediaItem> = serde_json::from_value(array.clone())?;
    Ok(raw
        .into_iter()
        .map(|item| item.into_item(fallback_type))
        .collect())
}

#[derive(Debug, Deserialize)]
struct RawMediaCount {
    #[serde(rename = "mediaType", alias = "media_type")]
    media_type: i64,
    #[serde(default)]
    count: u64,
}

const NAMED_COUNT_KEYS: &[(&str, MediaType)] = &[
    ("photo", MediaType::Photo),
    ("video", MediaType::Video),
    ("burst", MediaType::Burst),
    ("stacking", MediaType::Astro),
    ("astro", MediaType::Astro),
    ("panorama", MediaType::Panorama),
];

/// Reads per-type album counts. Accepts a list of `{mediaType, count}` entries
/// or an object keyed by category name, either bare or under `data`.
pub fn extract_media_counts(payload: &Value) -> Result<Vec<MediaCount>, serde_json::Error> {
    let data = payload.get("data").unwrap_or(payload);

    if data.is_array() {
        let raw: Vec<RawMediaCount> = serde_json::from_value(data.clone())?;
        return Ok(raw
            .into_iter()
            .map(|entry| MediaCount {
                media_type: MediaType::from(entry.media_type),
                count: entry.count,
            })
            .collect());
    }

    let mut counts = Vec::new();
    for (key, media_type) in NAMED_COUNT_KEYS {
        let Some(count) = data.get(*key).and_then(Value::as_u64) else {
            continue;
        };
        if counts
            .iter()
            .any(|existing: &MediaCount| existing.media_type == *media_type)
        {
            continue;
        }
        counts.push(MediaCount {
            media_type: *media_type,
            count,
        });
    }
    Ok(counts)
}

/// Device details from a connect response; missing fields stay `None`.
pub fn extract_device_info(payload: &Value) -> DeviceInfo {
    payload
        .get("device")
        .cloned()
        .and_then(|device| serde_json::from_value(device).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn success_status_and_zero_code_are_success() {
        assert!(interpret_response(&json!({"status": "success", "code": 0})).is_ok());
        assert!(interpret_response(&json!({"status": "connected"})).is_ok());
        assert!(interpret_response(&json!({"code": 0})).is_ok());
        assert!(interpret_response(&json!({"data": []})).is_ok());
    }

    #[test]
    fn error_status_keeps_device_code() {
        let fault = interpret_response(&json!({"status": "error", "code": 374}))
            .expect_err("must fail");
        assert!(fault.is_already_open_or_busy());
        assert_eq!(fault.message, "camera already open or busy");
    }

    #[test]
    fn no_response_status_has_no_code() {
        let fault = interpret_response(&json!({"status": "no_response"})).expect_err("must fail");
        assert_eq!(fault.code, None);
        assert_eq!(fault.message, "device did not respond");
    }

    #[test]
    fn bare_nonzero_code_is_a_fault_with_payload_message() {
        let fault = interpret_response(&json!({"code": 377, "message": "bad exposure"}))
            .expect_err("must fail");
        assert_eq!(fault.code, Some(377));
        assert_eq!(fault.message, "bad exposure");
    }

    #[test]
    fn media_items_found_under_every_known_shape() {
        let entry = json!({"fileName": "a.jpg", "filePath": "/p", "fileSize": 10, "mediaType": 1});
        for payload in [
            json!({"data": [entry.clone()]}),
            json!({"list": [entry.clone()]}),
            json!({"code": 0, "data": {"list": [entry.clone()]}}),
            json!({"mediaInfos": [entry.clone()]}),
        ] {
            let items = extract_media_items(&payload, MediaType::All).expect("items");
            assert_eq!(items.len(), 1, "payload {payload}");
            assert_eq!(items[0].file_name, "a.jpg");
        }
        assert!(extract_media_items(&json!({"code": 0}), MediaType::All)
            .expect("empty")
            .is_empty());
    }

    #[test]
    fn media_item_accepts_snake_case_and_prefers_modification_time() {
        let payload = json!({"data": [{
            "file_name": "m31.fits",
            "file_path": "/astro",
            "file_size": 2048,
            "modificationTime": 1_700_000_000,
            "createTime": 1_600_000_000
        }]});
        let items = extract_media_items(&payload, MediaType::Astro).expect("items");
        assert_eq!(items[0].media_type, MediaType::Astro);
        assert_eq!(items[0].file_size, 2048);
        assert_eq!(items[0].timestamp, Some(1_700_000_000));
    }

    #[test]
    fn counts_accept_list_and_named_object() {
        let listed = extract_media_counts(&json!({"data": [
            {"mediaType": 1, "count": 4},
            {"mediaType": 2, "count": 1}
        ]}))
        .expect("counts");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].media_type, MediaType::Photo);

        let named = extract_media_counts(&json!({"code": 0, "data": {"photo": 3, "video": 0, "stacking": 2}}))
            .expect("counts");
        assert!(named.contains(&MediaCount {
            media_type: MediaType::Astro,
            count: 2
        }));
        assert_eq!(named.len(), 3);
    }

    #[test]
    fn device_info_is_optional() {
        let info = extract_device_info(&json!({"status": "connected", "device": {"device_name": "DWARF_1234"}}));
        assert_eq!(info.device_name.as_deref(), Some("DWARF_1234"));
        assert_eq!(extract_device_info(&json!({})), DeviceInfo::default());
    }
}
