use super::*;

fn connected(address: &str) -> SessionState {
    let mut session = SessionState::new();
    let (ticket, address) = session.begin_connect(address).expect("begin");
    assert!(session.complete_connect(ticket, address, DeviceInfo::default()));
    session
}

#[test]
fn starts_disconnected_with_camera_closed() {
    let session = SessionState::new();
    let snapshot = session.snapshot();
    assert_eq!(snapshot.connection, ConnectionState::Disconnected);
    assert_eq!(snapshot.camera, CameraState::Closed);
    assert!(snapshot.device_address.is_none());
}

#[test]
fn empty_address_is_rejected_without_state_change() {
    let mut session = SessionState::new();
    let err = session.begin_connect("   ").expect_err("must fail");
    assert!(matches!(err, ControllerError::Validation(_)));
    assert_eq!(session.connection(), ConnectionState::Disconnected);
}

#[test]
fn successful_connect_binds_trimmed_address() {
    let session = connected(" 10.0.0.5 ");
    let snapshot = session.snapshot();
    assert_eq!(snapshot.connection, ConnectionState::Connected);
    assert_eq!(snapshot.device_address.as_deref(), Some("10.0.0.5"));
    assert_eq!(
        session.require(Requirement::Connected).expect("bound").address,
        "10.0.0.5"
    );
}

#[test]
fn failed_connect_moves_to_error_without_binding() {
    let mut session = SessionState::new();
    let (ticket, _) = session.begin_connect("10.0.0.5").expect("begin");
    assert!(session.fail_connect(ticket));
    assert_eq!(session.connection(), ConnectionState::Error);
    assert!(session.snapshot().device_address.is_none());
    assert!(matches!(
        session.require(Requirement::Connected),
        Err(ControllerError::NotConnected)
    ));
}

#[test]
fn guard_refuses_while_connecting() {
    let mut session = SessionState::new();
    session.begin_connect("10.0.0.5").expect("begin");
    assert!(matches!(
        session.require(Requirement::Connected),
        Err(ControllerError::NotConnected)
    ));
}

#[test]
fn camera_dependent_commands_need_open_camera() {
    let mut session = connected("10.0.0.5");
    assert!(matches!(
        session.require(Requirement::CameraOpen),
        Err(ControllerError::CameraNotOpen)
    ));

    let bound = session.require(Requirement::Connected).expect("bound");
    assert!(session.set_camera(&bound, CameraState::Open));
    assert!(session.require(Requirement::CameraOpen).is_ok());
}

#[test]
fn disconnect_forces_camera_closed() {
    let mut session = connected("10.0.0.5");
    let bound = session.require(Requirement::Connected).expect("bound");
    session.set_camera(&bound, CameraState::Open);

    session.disconnect();
    let snapshot = session.snapshot();
    assert_eq!(snapshot.connection, ConnectionState::Disconnected);
    assert_eq!(snapshot.camera, CameraState::Closed);
    assert!(snapshot.device_address.is_none());
}

#[test]
fn camera_confirmation_after_disconnect_is_dropped() {
    let mut session = connected("10.0.0.5");
    let bound = session.require(Requirement::Connected).expect("bound");
    session.disconnect();

    assert!(!session.set_camera(&bound, CameraState::Open));
    assert_eq!(session.camera(), CameraState::Closed);
}

#[test]
fn superseded_connect_response_is_ignored() {
    let mut session = SessionState::new();
    let (first, first_address) = session.begin_connect("10.0.0.5").expect("first");
    let (second, second_address) = session.begin_connect("10.0.0.6").expect("second");

    assert!(!session.complete_connect(first, first_address, DeviceInfo::default()));
    assert_eq!(session.connection(), ConnectionState::Connecting);

    assert!(session.complete_connect(second, second_address, DeviceInfo::default()));
    assert_eq!(
        session.snapshot().device_address.as_deref(),
        Some("10.0.0.6")
    );

    assert!(!session.fail_connect(first));
    assert_eq!(session.connection(), ConnectionState::Connected);
}

#[test]
fn disconnect_during_connect_wins() {
    let mut session = SessionState::new();
    let (ticket, address) = session.begin_connect("10.0.0.5").expect("begin");
    session.disconnect();

    assert!(!session.complete_connect(ticket, address, DeviceInfo::default()));
    assert_eq!(session.connection(), ConnectionState::Disconnected);
}

#[test]
fn camera_is_open_only_while_connected_for_any_operation_sequence() {
    // Deterministic pseudo-random walk over every transition, including
    // stale completions and confirmations.
    let mut seed: u64 = 0x5eed_1234;
    let mut next = move || {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (seed >> 33) as u32
    };

    let mut session = SessionState::new();
    let mut tickets: Vec<(ConnectTicket, String)> = Vec::new();
    let mut bindings: Vec<BoundDevice> = Vec::new();

    for _ in 0..5_000 {
        match next() % 6 {
            0 => {
                let address = format!("10.0.0.{}", next() % 4);
                if let Ok(ticket) = session.begin_connect(&address) {
                    tickets.push(ticket);
                }
            }
            1 => {
                if let Some((ticket, address)) = tickets.pop() {
                    session.complete_connect(ticket, address, DeviceInfo::default());
                }
            }
            2 => {
                if let Some((ticket, _)) = tickets.pop() {
                    session.fail_connect(ticket);
                }
            }
            3 => session.disconnect(),
            4 => {
                if let Ok(bound) = session.require(Requirement::Connected) {
                    bindings.push(bound);
                }
            }
            _ => {
                if !bindings.is_empty() {
                    let index = next() as usize % bindings.len();
                    let bound = bindings.swap_remove(index);
                    let camera = if next() % 2 == 0 {
                        CameraState::Open
                    } else {
                        CameraState::Closed
                    };
                    session.set_camera(&bound, camera);
                }
            }
        }

        if session.camera() == CameraState::Open {
            assert_eq!(session.connection(), ConnectionState::Connected);
            assert!(session.snapshot().device_address.is_some());
        }
    }
}
