use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use client_core::{
    catalog::PageState,
    config::ControllerSettings,
    error::ControllerError,
    DeviceCommand, DeviceController,
};
use serde_json::{json, Value};
use shared::{
    domain::{CameraState, ConnectionState, MediaType},
    protocol::endpoints,
};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Default)]
struct FakeDevice {
    camera_open: bool,
    album: Vec<String>,
    requests: Vec<(String, Option<String>)>,
}

type Shared = Arc<Mutex<FakeDevice>>;

async fn log(state: &Shared, path: &str, query: &HashMap<String, String>) {
    state
        .lock()
        .await
        .requests
        .push((path.to_string(), query.get("ip").cloned()));
}

async fn connect(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    log(&state, endpoints::DEVICE_CONNECT, &query).await;
    Json(json!({
        "status": "connected",
        "device": {"device_name": "DWARF II", "ip_address": body["ip"]},
    }))
}

async fn open_camera(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    log(&state, endpoints::CAMERA_TELE_OPEN, &query).await;
    let mut device = state.lock().await;
    if device.camera_open {
        return Json(json!({"code": 374, "message": "camera already open"}));
    }
    device.camera_open = true;
    Json(json!({"code": 0}))
}

async fn take_photo(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    log(&state, endpoints::CAMERA_TELE_PHOTO, &query).await;
    let mut device = state.lock().await;
    let name = format!("DWARF_{:04}.jpg", device.album.len());
    device.album.insert(0, name);
    Json(json!({"status": "success"}))
}

async fn counts(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    log(&state, endpoints::ALBUM_COUNTS, &query).await;
    let total = state.lock().await.album.len();
    Json(json!({"code": 0, "data": {"photo": total, "video": 0}}))
}

async fn list(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    log(&state, endpoints::ALBUM_LIST, &query).await;
    let page_index = body["page_index"].as_u64().unwrap_or_default() as usize;
    let page_size = body["page_size"].as_u64().unwrap_or(12) as usize;
    let device = state.lock().await;
    let items: Vec<Value> = device
        .album
        .iter()
        .skip(page_index * page_size)
        .take(page_size)
        .map(|name| {
            json!({
                "file_name": name,
                "file_path": "/DWARF_II/Normal_Photos",
                "file_size": 4096,
                "media_type": 1,
            })
        })
        .collect();
    Json(json!({"code": 0, "data": {"list": items}}))
}

async fn delete(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    log(&state, endpoints::ALBUM_DELETE, &query).await;
    let doomed: Vec<String> = body["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["file_name"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    state
        .lock()
        .await
        .album
        .retain(|name| !doomed.contains(name));
    Json(json!({"code": 0}))
}

async fn spawn_device_proxy(album: Vec<String>) -> anyhow::Result<(String, Shared)> {
    let state: Shared = Arc::new(Mutex::new(FakeDevice {
        album,
        ..FakeDevice::default()
    }));
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let api = Router::new()
        .route(endpoints::DEVICE_CONNECT, post(connect))
        .route(endpoints::CAMERA_TELE_OPEN, post(open_camera))
        .route(endpoints::CAMERA_TELE_PHOTO, post(take_photo))
        .route(endpoints::ALBUM_COUNTS, get(counts))
        .route(endpoints::ALBUM_LIST, post(list))
        .route(endpoints::ALBUM_DELETE, post(delete))
        .with_state(state.clone());
    let app = Router::new().nest("/api", api);

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Ok((format!("http://{addr}/api"), state))
}

fn settings_for(base: String) -> ControllerSettings {
    ControllerSettings {
        api_base_url: base,
        page_size: 4,
        ..ControllerSettings::default()
    }
}

#[tokio::test]
async fn capture_browse_and_delete_against_a_proxy() {
    let album: Vec<String> = (0..6).map(|i| format!("OLD_{i:02}.jpg")).collect();
    let (base, state) = spawn_device_proxy(album).await.expect("spawn proxy");
    let controller = DeviceController::new(settings_for(base));

    let device = controller.connect("192.168.88.1").await.expect("connect");
    assert_eq!(device.device_name.as_deref(), Some("DWARF II"));

    controller.open_camera().await.expect("open");
    controller.open_camera().await.expect("reopen is idempotent");
    assert_eq!(controller.session().await.camera, CameraState::Open);

    controller
        .issue_command(DeviceCommand::TakePhoto)
        .await
        .expect("photo");
    let snapshot = controller.catalog().await;
    let first_page = match snapshot.page {
        PageState::Loaded(page) => page,
        other => panic!("album not loaded after capture: {other:?}"),
    };
    assert_eq!(first_page.items.len(), 4);
    assert!(first_page.has_more);
    assert_eq!(first_page.items[0].file_name, "DWARF_0006.jpg");
    assert_eq!(first_page.items[0].media_type, MediaType::Photo);
    assert_eq!(snapshot.counts[0].count, 7);

    let second_page = controller
        .next_page()
        .await
        .expect("second page")
        .expect("more pages");
    assert_eq!(second_page.items.len(), 3);
    assert!(!second_page.has_more);
    assert!(controller.next_page().await.expect("no-op").is_none());

    let victim = second_page.items[0].clone();
    let reloaded = controller.delete_item(&victim).await.expect("delete");
    assert_eq!(reloaded.items.len(), 2);
    assert_eq!(controller.catalog().await.query.page_index, 1);
    assert!(!state.lock().await.album.contains(&victim.file_name));

    let device = state.lock().await;
    let (first_path, first_ip) = &device.requests[0];
    assert_eq!(first_path, endpoints::DEVICE_CONNECT);
    assert_eq!(first_ip, &None);
    assert!(device.requests[1..]
        .iter()
        .all(|(_, ip)| ip.as_deref() == Some("192.168.88.1")));
}

#[tokio::test]
async fn nothing_reaches_the_proxy_after_disconnect() {
    let (base, state) = spawn_device_proxy(Vec::new()).await.expect("spawn proxy");
    let controller = DeviceController::new(settings_for(base));

    controller.connect("192.168.88.1").await.expect("connect");
    controller.open_camera().await.expect("open");
    controller.disconnect().await;
    let before = state.lock().await.requests.len();

    assert!(matches!(
        controller.issue_command(DeviceCommand::TakePhoto).await,
        Err(ControllerError::NotConnected)
    ));
    assert!(matches!(
        controller.set_filter(MediaType::Video).await,
        Err(ControllerError::NotConnected)
    ));
    let session = controller.session().await;
    assert_eq!(session.connection, ConnectionState::Disconnected);
    assert_eq!(session.camera, CameraState::Closed);
    assert_eq!(state.lock().await.requests.len(), before);
}

#[tokio::test]
async fn unreachable_proxy_surfaces_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let controller = DeviceController::new(settings_for(format!("http://{addr}/api")));
    let err = controller
        .connect("192.168.88.1")
        .await
        .expect_err("nothing listening");
    assert!(matches!(err, ControllerError::Network(_)));
    assert_eq!(
        controller.session().await.connection,
        ConnectionState::Error
    );
}
