use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use shared::{
    domain::{CameraState, ControlVector, DeviceInfo, MediaItem, MediaType},
    protocol::{
        endpoints, extract_device_info, AstroFocusRequest, AutoFocusRequest, ConnectRequest,
        GotoDsoRequest, JoystickRequest, ManualFocusRequest, OpenCameraRequest, StopMotorRequest,
    },
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

pub mod catalog;
pub mod config;
pub mod error;
pub mod gateway;
pub mod session;
pub mod throttle;

use catalog::{CatalogPage, CatalogSnapshot, CatalogState};
use config::ControllerSettings;
use error::{ControllerError, GatewayError, Result};
use gateway::{CommandGateway, GatewayRequest, HttpGateway};
use session::{Requirement, SessionSnapshot, SessionState};
use throttle::{ControlThrottler, DragSample, MotorSink};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Every device capability the controller can issue. All of them pass the
/// session guard before anything reaches the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    TakePhoto,
    StartVideo,
    StopVideo,
    StartCalibration,
    StopCalibration,
    StartStacking,
    StopStacking,
    GotoDso { ra: f64, dec: f64, target_name: String },
    StopGoto,
    /// Goto with the device's own calibrate-then-slew sequence.
    OneClickGotoDso { ra: f64, dec: f64, target_name: String },
    StopOneClickGoto,
    AutoFocus { mode: i64 },
    /// `mode`: 0 slow, 1 fast.
    StartAstroFocus { mode: i64 },
    StopAstroFocus,
    /// `direction`: 0 far, 1 near.
    ManualFocusStep { direction: i64 },
    JoystickVector(ControlVector),
    /// Full-deflection nudge towards `angle` degrees.
    MoveMotor { angle: f64 },
    StopMotor { motor_id: i64 },
}

impl DeviceCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TakePhoto => "take_photo",
            Self::StartVideo => "start_video",
            Self::StopVideo => "stop_video",
            Self::StartCalibration => "start_calibration",
            Self::StopCalibration => "stop_calibration",
            Self::StartStacking => "start_stacking",
            Self::StopStacking => "stop_stacking",
            Self::GotoDso { .. } => "goto_dso",
            Self::StopGoto => "stop_goto",
            Self::OneClickGotoDso { .. } => "one_click_goto_dso",
            Self::StopOneClickGoto => "stop_one_click_goto",
            Self::AutoFocus { .. } => "auto_focus",
            Self::StartAstroFocus { .. } => "start_astro_focus",
            Self::StopAstroFocus => "stop_astro_focus",
            Self::ManualFocusStep { .. } => "manual_focus_step",
            Self::JoystickVector(_) => "joystick_vector",
            Self::MoveMotor { .. } => "move_motor",
            Self::StopMotor { .. } => "stop_motor",
        }
    }

    pub fn requirement(&self) -> Requirement {
        match self {
            Self::TakePhoto | Self::StartVideo | Self::StopVideo => Requirement::CameraOpen,
            _ => Requirement::Connected,
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::GotoDso {
                ra,
                dec,
                target_name,
            }
            | Self::OneClickGotoDso {
                ra,
                dec,
                target_name,
            } => {
                if !ra.is_finite() || !dec.is_finite() {
                    return Err(ControllerError::validation(
                        "goto needs finite right ascension and declination",
                    ));
                }
                if target_name.trim().is_empty() {
                    return Err(ControllerError::validation("goto needs a target name"));
                }
                Ok(())
            }
            Self::JoystickVector(vector) => {
                if !(vector.angle.is_finite()
                    && vector.magnitude.is_finite()
                    && vector.speed.is_finite())
                {
                    return Err(ControllerError::validation("joystick vector must be finite"));
                }
                Ok(())
            }
            Self::MoveMotor { angle } if !angle.is_finite() => {
                Err(ControllerError::validation("motor angle must be finite"))
            }
            _ => Ok(()),
        }
    }

    fn request(&self, settings: &ControllerSettings) -> Result<GatewayRequest, GatewayError> {
        let request = match self {
            Self::TakePhoto => GatewayRequest::post(endpoints::CAMERA_TELE_PHOTO),
            Self::StartVideo => GatewayRequest::post(endpoints::CAMERA_TELE_VIDEO_START),
            Self::StopVideo => GatewayRequest::post(endpoints::CAMERA_TELE_VIDEO_STOP),
            Self::StartCalibration => GatewayRequest::post(endpoints::ASTRO_CALIBRATION_START),
            Self::StopCalibration => GatewayRequest::post(endpoints::ASTRO_CALIBRATION_STOP),
            Self::StartStacking => GatewayRequest::post(endpoints::ASTRO_STACKING_START),
            Self::StopStacking => GatewayRequest::post(endpoints::ASTRO_STACKING_STOP),
            Self::GotoDso {
                ra,
                dec,
                target_name,
            } => goto_request(endpoints::ASTRO_GOTO_DSO, *ra, *dec, target_name)?,
            Self::StopGoto => GatewayRequest::post(endpoints::ASTRO_GOTO_STOP),
            Self::OneClickGotoDso {
                ra,
                dec,
                target_name,
            } => goto_request(endpoints::ASTRO_ONE_CLICK_GOTO_DSO, *ra, *dec, target_name)?,
            Self::StopOneClickGoto => GatewayRequest::post(endpoints::ASTRO_ONE_CLICK_GOTO_STOP),
            Self::AutoFocus { mode } => {
                GatewayRequest::post(endpoints::FOCUS_AUTO).with_body(&AutoFocusRequest {
                    mode: *mode,
                    center_x: 0,
                    center_y: 0,
                })?
            }
            Self::StartAstroFocus { mode } => GatewayRequest::post(endpoints::FOCUS_ASTRO_START)
                .with_body(&AstroFocusRequest { mode: *mode })?,
            Self::StopAstroFocus => GatewayRequest::post(endpoints::FOCUS_ASTRO_STOP),
            Self::ManualFocusStep { direction } => {
                GatewayRequest::post(endpoints::FOCUS_MANUAL_STEP).with_body(
                    &ManualFocusRequest {
                        direction: *direction,
                    },
                )?
            }
            Self::JoystickVector(vector) => joystick_request(*vector)?,
            Self::MoveMotor { angle } => joystick_request(ControlVector::full_deflection(
                *angle,
                settings.joystick_speed,
            ))?,
            Self::StopMotor { motor_id } => GatewayRequest::post(endpoints::MOTOR_STOP)
                .with_body(&StopMotorRequest {
                    motor_id: *motor_id,
                })?,
        };
        Ok(request)
    }
}

fn goto_request(
    path: &'static str,
    ra: f64,
    dec: f64,
    target_name: &str,
) -> Result<GatewayRequest, GatewayError> {
    GatewayRequest::post(path).with_body(&GotoDsoRequest {
        ra,
        dec,
        target_name: target_name.trim().to_string(),
    })
}

fn joystick_request(vector: ControlVector) -> Result<GatewayRequest, GatewayError> {
    GatewayRequest::post(endpoints::MOTOR_JOYSTICK_START).with_body(&JoystickRequest {
        vector_angle: vector.angle,
        vector_length: vector.magnitude,
        speed: vector.speed,
    })
}

#[derive(Debug, Clone)]
pub enum ControllerEvent {
    SessionChanged(SessionSnapshot),
    CatalogChanged(CatalogSnapshot),
    CommandCompleted {
        command: &'static str,
    },
    CommandFailed {
        command: &'static str,
        message: String,
    },
}

/// Owns one device session, its album browser and the joystick throttler.
/// Presentation code holds an `Arc` and listens on `subscribe_events`.
pub struct DeviceController {
    settings: ControllerSettings,
    gateway: Arc<dyn CommandGateway>,
    session: Mutex<SessionState>,
    catalog: Mutex<CatalogState>,
    throttler: ControlThrottler,
    events: broadcast::Sender<ControllerEvent>,
}

impl DeviceController {
    pub fn new(settings: ControllerSettings) -> Arc<Self> {
        let gateway = Arc::new(HttpGateway::new(settings.api_base_url.clone()));
        Self::with_gateway(settings, gateway)
    }

    pub fn with_gateway(
        settings: ControllerSettings,
        gateway: Arc<dyn CommandGateway>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            session: Mutex::new(SessionState::new()),
            catalog: Mutex::new(CatalogState::new(
                settings.default_media_type,
                settings.page_size,
            )),
            throttler: ControlThrottler::new(settings.throttle()),
            gateway,
            settings,
            events,
        })
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    pub async fn session(&self) -> SessionSnapshot {
        self.session.lock().await.snapshot()
    }

    pub async fn catalog(&self) -> CatalogSnapshot {
        self.catalog.lock().await.snapshot()
    }

    fn emit(&self, event: ControllerEvent) {
        let _ = self.events.send(event);
    }

    fn command_failed(&self, command: &'static str, err: &ControllerError) {
        warn!(command, "device command failed: {err}");
        self.emit(ControllerEvent::CommandFailed {
            command,
            message: err.to_string(),
        });
    }

    pub async fn connect(&self, address: &str) -> Result<DeviceInfo> {
        let (ticket, address) = {
            let mut session = self.session.lock().await;
            let started = session.begin_connect(address)?;
            self.emit(ControllerEvent::SessionChanged(session.snapshot()));
            started
        };
        info!(address = %address, port = self.settings.device_port, "session: connecting");

        let request = GatewayRequest::post(endpoints::DEVICE_CONNECT).with_body(&ConnectRequest {
            ip: address.clone(),
            port: self.settings.device_port,
        })?;
        let outcome = self.gateway.send(request).await;

        let mut session = self.session.lock().await;
        match outcome {
            Ok(payload) => {
                let device = extract_device_info(&payload);
                if !session.complete_connect(ticket, address.clone(), device.clone()) {
                    debug!(address = %address, "session: connect response superseded");
                    return Err(ControllerError::Superseded);
                }
                info!(address = %address, device = ?device.device_name, "session: connected");
                self.emit(ControllerEvent::SessionChanged(session.snapshot()));
                Ok(device)
            }
            Err(err) => {
                let err = ControllerError::from(err);
                if session.fail_connect(ticket) {
                    warn!(address = %address, "session: connect failed: {err}");
                    self.emit(ControllerEvent::SessionChanged(session.snapshot()));
                } else {
                    debug!(address = %address, "session: stale connect failed: {err}");
                }
                Err(err)
            }
        }
    }

    /// Drops the binding locally without talking to the device. Pending
    /// joystick sends and in-flight page loads are discarded.
    pub async fn disconnect(&self) {
        let cancelled = self.throttler.cancel_pending().await;
        {
            let mut session = self.session.lock().await;
            session.disconnect();
            self.emit(ControllerEvent::SessionChanged(session.snapshot()));
        }
        {
            let mut catalog = self.catalog.lock().await;
            catalog.reset();
            self.emit(ControllerEvent::CatalogChanged(catalog.snapshot()));
        }
        info!(cancelled_joystick = cancelled, "session: disconnected");
    }

    /// Opens the tele camera. The device answering "already open or busy"
    /// counts as success.
    pub async fn open_camera(&self) -> Result<()> {
        self.switch_camera(CameraState::Open).await
    }

    pub async fn close_camera(&self) -> Result<()> {
        self.switch_camera(CameraState::Closed).await
    }

    async fn switch_camera(&self, target: CameraState) -> Result<()> {
        let command = match target {
            CameraState::Open => "open_camera",
            CameraState::Closed => "close_camera",
        };
        let bound = match self.session.lock().await.require(Requirement::Connected) {
            Ok(bound) => bound,
            Err(err) => {
                self.command_failed(command, &err);
                return Err(err);
            }
        };

        let request = match target {
            CameraState::Open => GatewayRequest::post(endpoints::CAMERA_TELE_OPEN)
                .for_device(bound.address.clone())
                .with_body(&OpenCameraRequest::default())?,
            CameraState::Closed => {
                GatewayRequest::post(endpoints::CAMERA_TELE_CLOSE).for_device(bound.address.clone())
            }
        };

        match self.gateway.send(request).await {
            Ok(_) => {}
            Err(GatewayError::Device(fault))
                if target == CameraState::Open && fault.is_already_open_or_busy() =>
            {
                info!(code = ?fault.code, "camera: already open, treating as opened");
            }
            Err(err) => {
                let err = ControllerError::from(err);
                self.command_failed(command, &err);
                return Err(err);
            }
        }

        let mut session = self.session.lock().await;
        if session.set_camera(&bound, target) {
            info!(address = %bound.address, camera = ?target, "camera: state changed");
            self.emit(ControllerEvent::SessionChanged(session.snapshot()));
        } else {
            debug!(camera = ?target, "camera: confirmation arrived after session changed");
        }
        self.emit(ControllerEvent::CommandCompleted { command });
        Ok(())
    }

    /// Sends one device command once the session allows it. Refused commands
    /// never reach the network.
    pub async fn issue_command(&self, command: DeviceCommand) -> Result<Value> {
        let name = command.name();
        match self.dispatch(&command).await {
            Ok(payload) => {
                debug!(command = name, "device command completed");
                self.emit(ControllerEvent::CommandCompleted { command: name });
                if command == DeviceCommand::TakePhoto {
                    self.refresh_after_capture().await;
                }
                Ok(payload)
            }
            Err(err) => {
                self.command_failed(name, &err);
                Err(err)
            }
        }
    }

    async fn dispatch(&self, command: &DeviceCommand) -> Result<Value> {
        command.validate()?;
        let bound = self.session.lock().await.require(command.requirement())?;
        let request = command
            .request(&self.settings)?
            .for_device(bound.address);
        Ok(self.gateway.send(request).await?)
    }

    async fn refresh_after_capture(&self) {
        if let Err(err) = self.load_page(true).await {
            warn!("album refresh after capture failed: {err}");
        }
    }

    /// Feeds one pointer sample to the throttler. Returns the vector that
    /// will be sent once the pointer rests, or `None` inside the dead zone.
    pub async fn joystick_move(self: &Arc<Self>, sample: DragSample) -> Result<Option<ControlVector>> {
        self.session.lock().await.require(Requirement::Connected)?;
        let sink: Arc<dyn MotorSink> = self.clone();
        Ok(self.throttler.sample(sink, sample).await)
    }

    /// Ends a drag: the pending vector is dropped and a stop is sent.
    pub async fn joystick_release(&self) -> Result<()> {
        self.throttler.release(self).await
    }

    /// Loads the current page, rewinding to the first one when `reset`.
    pub async fn load_page(&self, reset: bool) -> Result<CatalogPage> {
        let bound = self.session.lock().await.require(Requirement::Connected)?;

        let ticket = {
            let mut catalog = self.catalog.lock().await;
            let ticket = catalog.begin_load(reset);
            self.emit(ControllerEvent::CatalogChanged(catalog.snapshot()));
            ticket
        };
        debug!(
            media_type = ticket.query.media_type.code(),
            page_index = ticket.query.page_index,
            "album: loading page"
        );

        let fetched = catalog::fetch_page(self.gateway.as_ref(), &bound.address, ticket.query).await;

        let mut catalog = self.catalog.lock().await;
        match fetched {
            Ok((counts, items)) => match catalog.finish_load(ticket, counts, items) {
                Some(page) => {
                    info!(
                        page_index = ticket.query.page_index,
                        items = page.items.len(),
                        has_more = page.has_more,
                        "album: page loaded"
                    );
                    self.emit(ControllerEvent::CatalogChanged(catalog.snapshot()));
                    Ok(page)
                }
                None => {
                    debug!("album: page load superseded");
                    Err(ControllerError::Superseded)
                }
            },
            Err(err) => {
                if !catalog.fail_load(ticket, err.to_string()) {
                    debug!("album: superseded page load failed: {err}");
                    return Err(ControllerError::Superseded);
                }
                warn!(page_index = ticket.query.page_index, "album: page load failed: {err}");
                self.emit(ControllerEvent::CatalogChanged(catalog.snapshot()));
                Err(ControllerError::CatalogLoad(Box::new(err)))
            }
        }
    }

    pub async fn set_filter(&self, media_type: MediaType) -> Result<CatalogPage> {
        self.catalog.lock().await.set_filter(media_type);
        self.load_page(true).await
    }

    /// `Ok(None)` when the last page was not full.
    pub async fn next_page(&self) -> Result<Option<CatalogPage>> {
        self.session.lock().await.require(Requirement::Connected)?;
        if !self.catalog.lock().await.advance() {
            return Ok(None);
        }
        self.load_page(false).await.map(Some)
    }

    /// `Ok(None)` on the first page.
    pub async fn previous_page(&self) -> Result<Option<CatalogPage>> {
        self.session.lock().await.require(Requirement::Connected)?;
        if !self.catalog.lock().await.retreat() {
            return Ok(None);
        }
        self.load_page(false).await.map(Some)
    }

    pub async fn delete_item(&self, item: &MediaItem) -> Result<CatalogPage> {
        const COMMAND: &str = "delete_item";

        let deleted = async {
            let bound = self.session.lock().await.require(Requirement::Connected)?;
            let request = catalog::delete_request(&bound.address, item)?;
            self.gateway.send(request).await?;
            Ok::<_, ControllerError>(())
        }
        .await;
        if let Err(err) = deleted {
            self.command_failed(COMMAND, &err);
            return Err(err);
        }

        info!(file = %item.file_name, "album: item deleted");
        self.emit(ControllerEvent::CommandCompleted { command: COMMAND });
        self.load_page(false).await
    }
}

#[async_trait]
impl MotorSink for DeviceController {
    async fn send_vector(&self, vector: ControlVector) -> Result<()> {
        self.issue_command(DeviceCommand::JoystickVector(vector))
            .await
            .map(|_| ())
    }

    async fn send_stop(&self) -> Result<()> {
        self.issue_command(DeviceCommand::StopMotor { motor_id: 0 })
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
