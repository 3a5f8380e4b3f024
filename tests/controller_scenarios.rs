//! End-to-end controller scenarios driven through the simulated stack.

use ble_controller::domain::component::SensorComponent;
use ble_controller::domain::error::{ConfigurationError, LifecycleError};
use ble_controller::domain::models::{ControllerState, EventChannel};
use ble_controller::domain::uuid::{validate, BleUuid};
use ble_controller::{
    BleController, ComponentArena, ControllerError, ControllerEvent, PairingResponse, PeerId,
    SecurityMode, SimulatedStack,
};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

fn uuid(s: &str) -> BleUuid {
    validate(s).unwrap()
}

fn controller_with_sensor(
    mode: SecurityMode,
) -> (BleController<SimulatedStack>, Arc<SensorComponent>) {
    let sensor = Arc::new(SensorComponent::new("C", 0));
    let mut arena = ComponentArena::new();
    arena.insert(sensor.clone()).unwrap();
    (BleController::new(mode, arena, SimulatedStack::new()), sensor)
}

#[derive(Default)]
struct Recorded {
    pass_keys: Vec<String>,
    results: Vec<bool>,
}

fn record_events(controller: &mut BleController<SimulatedStack>) -> Arc<Mutex<Recorded>> {
    let recorded = Arc::new(Mutex::new(Recorded::default()));
    let r = recorded.clone();
    controller
        .on_show_pass_key(move |key| {
            r.lock().unwrap().pass_keys.push(key.to_string());
            Ok(())
        })
        .unwrap();
    let r = recorded.clone();
    controller
        .on_authentication_complete(move |success| {
            r.lock().unwrap().results.push(success);
            Ok(())
        })
        .unwrap();
    recorded
}

#[test]
fn pairing_with_stack_pass_key_reports_success_once() {
    let (mut controller, _) = controller_with_sensor(SecurityMode::ShowPassKey);
    let recorded = record_events(&mut controller);
    controller.start().unwrap();

    let peer = PeerId(1);
    controller.on_connect(peer);
    let response = controller.on_pairing_request(peer, Some(123456));
    assert_eq!(response, PairingResponse::DisplayPasskey("123456".to_string()));
    controller.on_authentication_result(peer, true);

    let recorded = recorded.lock().unwrap();
    assert_eq!(recorded.pass_keys, ["123456"]);
    assert_eq!(recorded.results, [true]);
    assert!(controller.is_authenticated());
}

#[test]
fn disconnect_before_confirmation_does_not_report_completion() {
    let (mut controller, _) = controller_with_sensor(SecurityMode::ShowPassKey);
    let recorded = record_events(&mut controller);
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let mut controller = controller.with_event_sender(sender);
    controller.start().unwrap();

    let peer = PeerId(7);
    controller.on_connect(peer);
    controller.on_pairing_request(peer, Some(123456));
    controller.on_disconnect(peer);

    let recorded = recorded.lock().unwrap();
    assert_eq!(recorded.pass_keys.len(), 1);
    assert!(recorded.results.is_empty());

    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    assert!(events.contains(&ControllerEvent::PairingAbandoned(peer)));
    assert!(!events
        .iter()
        .any(|e| matches!(e, ControllerEvent::Authenticated { .. })));
}

#[test]
fn security_disabled_rejects_trigger_registration() {
    let (mut controller, _) = controller_with_sensor(SecurityMode::None);

    let err = controller.on_show_pass_key(|_| Ok(())).unwrap_err();
    assert!(matches!(
        err,
        ControllerError::Configuration(ConfigurationError::SecurityDisabledButTriggerRequested(
            EventChannel::ShowPassKey
        ))
    ));
    let err = controller.on_authentication_complete(|_| Ok(())).unwrap_err();
    assert!(matches!(
        err,
        ControllerError::Configuration(ConfigurationError::SecurityDisabledButTriggerRequested(
            EventChannel::AuthenticationComplete
        ))
    ));
}

#[test]
fn security_disabled_accepts_pairing_without_authentication() {
    let (mut controller, _) = controller_with_sensor(SecurityMode::None);
    controller.start().unwrap();

    let response = controller.on_pairing_request(PeerId(1), Some(1));
    assert_eq!(response, PairingResponse::AcceptWithoutAuthentication);
    controller.on_authentication_result(PeerId(1), true);
    assert!(controller.take_handler_failures().is_empty());
    assert!(!controller.is_authenticated());
}

#[test]
fn read_requires_running_controller() {
    let (mut controller, sensor) = controller_with_sensor(SecurityMode::None);
    controller
        .register_component("C", "180D", "2A37", false)
        .unwrap();
    sensor.publish_state(64.0);

    let err = controller
        .on_read(PeerId(1), &uuid("180D"), &uuid("2A37"))
        .unwrap_err();
    assert!(matches!(
        err,
        ControllerError::Lifecycle(LifecycleError::NotRunning)
    ));

    controller.start().unwrap();
    let value = controller
        .on_read(PeerId(1), &uuid("180D"), &uuid("2A37"))
        .unwrap();
    assert_eq!(value, b"64");
}

#[test]
fn start_twice_is_rejected_and_advertising_unchanged() {
    let (mut controller, _) = controller_with_sensor(SecurityMode::None);
    controller
        .register_component("C", "180D", "2A37", true)
        .unwrap();
    controller.start().unwrap();
    let advertised = controller.stack().advertised().unwrap().to_vec();

    let err = controller.start().unwrap_err();
    assert!(matches!(
        err,
        ControllerError::Lifecycle(LifecycleError::AlreadyStarted)
    ));
    assert_eq!(controller.state(), ControllerState::Running);
    assert_eq!(controller.stack().advertise_calls(), 1);
    assert_eq!(controller.stack().advertised().unwrap(), advertised.as_slice());
}

#[test]
fn duplicate_registration_keeps_first_binding() {
    let (mut controller, _) = controller_with_sensor(SecurityMode::None);
    controller
        .register_component("C", "180D", "2A37", true)
        .unwrap();
    let before = controller.services().to_vec();

    let err = controller
        .register_component("C", "180d", "2a37", false)
        .unwrap_err();
    assert!(matches!(
        err,
        ControllerError::Configuration(ConfigurationError::DuplicateCharacteristic { .. })
    ));
    assert_eq!(controller.services(), before.as_slice());
}

#[test]
fn unknown_component_fails_fast() {
    let (mut controller, _) = controller_with_sensor(SecurityMode::None);
    let err = controller
        .register_component("missing", "180D", "2A37", true)
        .unwrap_err();
    let ControllerError::Configuration(ConfigurationError::UnknownComponent(name)) = err else {
        panic!("expected UnknownComponent, got {:?}", err);
    };
    assert_eq!(name, "missing");
    assert!(controller.services().is_empty());
}

#[test]
fn advertised_services_follow_registration_order() {
    let (mut controller, _) = controller_with_sensor(SecurityMode::ShowPassKey);
    controller
        .register_component("C", "181A", "2A6E", false)
        .unwrap();
    controller
        .register_component("C", "180D", "2A37", true)
        .unwrap();
    controller
        .register_component("C", "181A", "2A6F", false)
        .unwrap();
    controller.start().unwrap();

    let advertised = controller.stack().advertised().unwrap();
    let services: Vec<_> = advertised.iter().map(|s| s.uuid.to_string()).collect();
    assert_eq!(services, ["181A", "180D"]);
    let chars: Vec<_> = advertised[0]
        .characteristics
        .iter()
        .map(|c| c.uuid.to_string())
        .collect();
    assert_eq!(chars, ["2A6E", "2A6F"]);
    assert!(advertised.iter().all(|s| s.characteristics.iter().all(|c| c.encrypted)));
}

#[test]
fn failing_handler_does_not_stop_other_handlers() {
    let (mut controller, _) = controller_with_sensor(SecurityMode::ShowPassKey);
    controller
        .on_authentication_complete(|_| anyhow::bail!("led strip unreachable"))
        .unwrap();
    let recorded = record_events(&mut controller);
    controller.start().unwrap();

    controller.on_pairing_request(PeerId(1), Some(999));
    controller.on_authentication_result(PeerId(1), false);

    assert_eq!(recorded.lock().unwrap().results, [false]);
    let failures = controller.take_handler_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].total, 2);
    assert!(failures[0].failures[0].message.contains("led strip unreachable"));
}

#[test]
fn next_pairing_after_disconnect_starts_fresh() {
    let (mut controller, _) = controller_with_sensor(SecurityMode::ShowPassKey);
    let recorded = record_events(&mut controller);
    controller.start().unwrap();

    controller.on_pairing_request(PeerId(1), Some(111111));
    controller.on_authentication_result(PeerId(1), false);
    controller.on_disconnect(PeerId(1));

    controller.on_pairing_request(PeerId(2), Some(222222));
    controller.on_authentication_result(PeerId(2), true);

    let recorded = recorded.lock().unwrap();
    assert_eq!(recorded.pass_keys, ["111111", "222222"]);
    assert_eq!(recorded.results, [false, true]);
}

#[test]
fn configuration_error_prevents_start() {
    let (mut controller, _) = controller_with_sensor(SecurityMode::None);
    controller
        .register_component("C", "180D", "2A37", true)
        .unwrap();
    assert!(controller
        .register_component("C", "180D", "not a uuid", true)
        .is_err());

    let err = controller.start().unwrap_err();
    assert!(matches!(
        err,
        ControllerError::Configuration(ConfigurationError::InvalidUuid(_))
    ));
    assert!(!controller.stack().is_advertising());
}

#[test]
fn authentication_result_from_other_peer_is_ignored() {
    let (mut controller, _) = controller_with_sensor(SecurityMode::ShowPassKey);
    let recorded = record_events(&mut controller);
    controller.start().unwrap();
    controller.on_connect(PeerId(1));
    controller.on_connect(PeerId(2));

    controller.on_pairing_request(PeerId(1), Some(123456));
    controller.on_authentication_result(PeerId(2), true);

    assert!(recorded.lock().unwrap().results.is_empty());
    assert!(!controller.is_authenticated());
}
