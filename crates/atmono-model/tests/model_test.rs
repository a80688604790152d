//! Command channel tests against the simulated controller.

use std::sync::Arc;
use std::time::Duration;

use atmono_mock::{MockServer, SimulationConfig};
use atmono_model::{DeviceSnapshot, Model, ModelConfig, ModelError};
use atmono_protocol::{DeviceStatus, ProtocolError, Reply};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

// ============================================================================
// Helpers
// ============================================================================

fn fast_config() -> ModelConfig {
    ModelConfig {
        wait_ready_interval: 0.01,
        ..ModelConfig::default()
    }
}

async fn start_server(delay: Duration) -> MockServer {
    let config = SimulationConfig::default().with_actuation_delay(delay);
    MockServer::start(config).await.unwrap()
}

async fn connect(server: &MockServer, config: ModelConfig) -> Model {
    let model = Model::new(config);
    model.connect(&server.host(), server.port()).await.unwrap();
    model
}

async fn setup() -> (MockServer, Model) {
    let server = start_server(Duration::from_millis(10)).await;
    let model = connect(&server, fast_config()).await;
    (server, model)
}

/// A controller that answers every line with the same canned text, or never
/// answers at all when `reply` is `None`.
async fn start_fake_controller(reply: Option<&'static str>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(_)) = lines.next_line().await {
            if let Some(reply) = reply {
                let _ = writer.write_all(format!("{}\r\n", reply).as_bytes()).await;
            }
        }
    });

    port
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_default_wavelength() {
    let (_server, model) = setup().await;
    assert!(model.connected());
    assert_eq!(model.get_wavelength().await.unwrap(), 320.0);
}

#[tokio::test]
async fn test_set_wavelength_then_wait_ready() {
    let (_server, model) = setup().await;

    assert_eq!(model.set_wavelength(1130.0).await.unwrap(), Reply::Ok);
    model.wait_ready("change wavelength").await.unwrap();
    assert_eq!(model.get_wavelength().await.unwrap(), 1130.0);
}

#[tokio::test]
async fn test_set_grating_out_of_range() {
    let (_server, model) = setup().await;

    let before = model.get_grating().await.unwrap();
    assert_eq!(model.set_grating(99).await.unwrap(), Reply::OutOfRange);
    assert_eq!(model.get_grating().await.unwrap(), before);
}

#[tokio::test]
async fn test_disconnect_fails_request_in_flight() {
    let server = start_server(Duration::from_secs(1)).await;
    let model = Arc::new(connect(&server, fast_config()).await);
    let device = server.device();

    let pending = {
        let model = model.clone();
        tokio::spawn(async move { model.set_wavelength(900.0).await })
    };
    while !device.state().busy {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    model.disconnect().await;

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(ModelError::ConnectionClosed)), "{:?}", result);
    assert!(!model.connected());
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn test_concurrent_requests_are_serialized() {
    let (_server, model) = setup().await;
    let model = Arc::new(model);

    let mut tasks = Vec::new();
    for i in 0..10 {
        let model = model.clone();
        tasks.push(tokio::spawn(async move {
            // Commands never see BUSY: the next request waits for the reply
            assert_eq!(model.set_exit_slit(f64::from(i % 7)).await.unwrap(), Reply::Ok);
            assert_eq!(model.get_wavelength().await.unwrap(), 320.0);
            assert_eq!(model.get_grating().await.unwrap(), 0);
            assert_eq!(model.get_status().await.unwrap(), DeviceStatus::Ready);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let exit_slit = model.get_exit_slit().await.unwrap();
    assert!((0..7).any(|i| f64::from(i) == exit_slit));
}

#[tokio::test]
async fn test_queued_commands_run_in_issue_order() {
    let server = start_server(Duration::from_millis(100)).await;
    let model = Arc::new(connect(&server, fast_config()).await);
    let device = server.device();

    let first = tokio::spawn({
        let model = model.clone();
        async move { model.set_exit_slit(1.0).await.unwrap() }
    });
    while !device.state().busy {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let second = tokio::spawn({
        let model = model.clone();
        async move { model.set_exit_slit(2.0).await.unwrap() }
    });
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    let third = tokio::spawn({
        let model = model.clone();
        async move { model.set_exit_slit(3.0).await.unwrap() }
    });

    for task in [first, second, third] {
        assert_eq!(task.await.unwrap(), Reply::Ok);
    }
    assert_eq!(model.get_exit_slit().await.unwrap(), 3.0);
}

#[tokio::test]
async fn test_in_range_values_round_trip() {
    let (_server, model) = setup().await;

    for wavelength in [320.0, 532.5, 1130.0] {
        assert_eq!(model.set_wavelength(wavelength).await.unwrap(), Reply::Ok);
        assert_eq!(model.get_wavelength().await.unwrap(), wavelength);
    }
    for width in [0.0, 3.25, 7.0] {
        assert_eq!(model.set_entrance_slit(width).await.unwrap(), Reply::Ok);
        assert_eq!(model.get_entrance_slit().await.unwrap(), width);
        assert_eq!(model.set_exit_slit(width).await.unwrap(), Reply::Ok);
        assert_eq!(model.get_exit_slit().await.unwrap(), width);
    }
}

#[tokio::test]
async fn test_out_of_range_values_leave_state() {
    let (_server, model) = setup().await;
    let before = model.snapshot().await.unwrap();

    for wavelength in [319.9, 1130.1] {
        assert_eq!(model.set_wavelength(wavelength).await.unwrap(), Reply::OutOfRange);
    }
    for width in [-0.5, 7.01] {
        assert_eq!(model.set_entrance_slit(width).await.unwrap(), Reply::OutOfRange);
        assert_eq!(model.set_exit_slit(width).await.unwrap(), Reply::OutOfRange);
    }

    assert_eq!(model.snapshot().await.unwrap(), before);
}

#[tokio::test]
async fn test_malformed_argument_rejected() {
    let (_server, model) = setup().await;
    let before = model.snapshot().await.unwrap();
    let timeout = Duration::from_secs(2);

    for request in ["!WL FOO", "!GR FOO", "!ENS FOO", "!EXS FOO", "!CLW FOO"] {
        let reply = model.send(request, timeout).await.unwrap();
        assert_eq!(Reply::parse(&reply).unwrap(), Reply::Rejected, "{}", request);
    }

    assert_eq!(model.snapshot().await.unwrap(), before);
}

#[tokio::test]
async fn test_commands_rejected_when_not_ready() {
    let (server, model) = setup().await;
    server.device().force_status(DeviceStatus::Fault);

    assert_eq!(model.set_wavelength(500.0).await.unwrap(), Reply::Rejected);
    assert_eq!(model.set_grating(1).await.unwrap(), Reply::Rejected);
    assert_eq!(model.set_entrance_slit(1.0).await.unwrap(), Reply::Rejected);
    assert_eq!(model.set_exit_slit(1.0).await.unwrap(), Reply::Rejected);
    assert_eq!(model.set_calibrate_wavelength(-318.0).await.unwrap(), Reply::Rejected);
    assert_eq!(model.set_all(500.0, 1, 1.0, 1.0).await.unwrap(), Reply::Rejected);

    // Reset is the way out
    assert_eq!(model.reset_controller().await.unwrap(), Reply::Ok);
    assert_eq!(model.get_status().await.unwrap(), DeviceStatus::Ready);
}

#[tokio::test]
async fn test_reset_restores_defaults_twice() {
    let (_server, model) = setup().await;
    let home = DeviceSnapshot {
        wavelength: 320.0,
        grating: 0,
        entrance_slit: 0.0,
        exit_slit: 0.0,
        status: DeviceStatus::Ready,
    };

    assert_eq!(model.set_all(900.0, 2, 4.0, 5.0).await.unwrap(), Reply::Ok);
    assert_eq!(model.set_calibrate_wavelength(-895.0).await.unwrap(), Reply::Ok);

    for _ in 0..2 {
        assert_eq!(model.reset_controller().await.unwrap(), Reply::Ok);
        model.wait_ready("reset").await.unwrap();
        assert_eq!(model.snapshot().await.unwrap(), home);
    }

    // The offset was cleared too
    assert_eq!(model.set_wavelength(700.0).await.unwrap(), Reply::Ok);
    assert_eq!(model.get_wavelength().await.unwrap(), 700.0);
}

#[tokio::test]
async fn test_set_all_never_partially_commits() {
    let (_server, model) = setup().await;
    let before = model.snapshot().await.unwrap();

    // Wavelength is valid, grating is not: nothing moves
    assert_eq!(model.set_all(800.0, 99, 1.0, 1.0).await.unwrap(), Reply::OutOfRange);
    assert_eq!(model.snapshot().await.unwrap(), before);

    let reply = model.send("!SET 800 1 1", Duration::from_secs(2)).await.unwrap();
    assert_eq!(Reply::parse(&reply).unwrap(), Reply::Rejected);
    assert_eq!(model.snapshot().await.unwrap(), before);

    assert_eq!(model.set_all(800.0, 1, 1.5, 2.5).await.unwrap(), Reply::Ok);
    let after = model.snapshot().await.unwrap();
    assert_eq!(after.wavelength, 800.0);
    assert_eq!(after.grating, 1);
    assert_eq!(after.entrance_slit, 1.5);
    assert_eq!(after.exit_slit, 2.5);
}

// ============================================================================
// Typed operations
// ============================================================================

#[tokio::test]
async fn test_calibration_offset_applies_to_moves() {
    let (_server, model) = setup().await;

    assert_eq!(model.set_calibrate_wavelength(10.0).await.unwrap(), Reply::OutOfRange);
    assert_eq!(model.set_calibrate_wavelength(-318.0).await.unwrap(), Reply::Ok);

    assert_eq!(model.set_wavelength(700.0).await.unwrap(), Reply::Ok);
    assert_eq!(model.get_wavelength().await.unwrap(), 382.0);
}

#[tokio::test]
async fn test_snapshot() {
    let (_server, model) = setup().await;
    assert_eq!(model.set_grating(2).await.unwrap(), Reply::Ok);

    let snapshot = model.snapshot().await.unwrap();
    assert_eq!(
        snapshot,
        DeviceSnapshot {
            wavelength: 320.0,
            grating: 2,
            entrance_slit: 0.0,
            exit_slit: 0.0,
            status: DeviceStatus::Ready,
        }
    );
}

// ============================================================================
// Readiness
// ============================================================================

#[tokio::test]
async fn test_wait_ready_fault() {
    let (server, model) = setup().await;
    server.device().force_status(DeviceStatus::Fault);

    let result = model.wait_ready("change wavelength").await;
    assert!(matches!(result, Err(ModelError::DeviceFault { .. })), "{:?}", result);
}

#[tokio::test]
async fn test_wait_ready_offline() {
    let (server, model) = setup().await;
    server.device().force_status(DeviceStatus::Offline);

    let result = model.wait_ready("change entrance slit").await;
    assert!(matches!(result, Err(ModelError::DeviceOffline { .. })), "{:?}", result);
}

#[tokio::test]
async fn test_wait_ready_timeout() {
    let server = start_server(Duration::from_millis(10)).await;
    let config = ModelConfig {
        move_timeout: 0.05,
        ..fast_config()
    };
    let model = connect(&server, config).await;
    server.device().force_status(DeviceStatus::SettingUp);

    let result = model.wait_ready("change wavelength").await;
    match result {
        Err(ModelError::WaitTimeout { label, timeout }) => {
            assert_eq!(label, "change wavelength");
            assert_eq!(timeout, Duration::from_millis(50));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_wait_ready_grating_uses_longer_timeout() {
    let server = start_server(Duration::from_millis(10)).await;
    let config = ModelConfig {
        move_timeout: 0.05,
        move_grating_timeout: 10.0,
        ..fast_config()
    };
    let model = connect(&server, config).await;
    let device = server.device();
    device.force_status(DeviceStatus::SettingUp);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        device.force_status(DeviceStatus::Ready);
    });

    model.wait_ready("change grating").await.unwrap();
}

// ============================================================================
// Connection handling
// ============================================================================

#[tokio::test]
async fn test_connect_twice() {
    let (server, model) = setup().await;
    let result = model.connect(&server.host(), server.port()).await;
    assert!(matches!(result, Err(ModelError::AlreadyConnected)));
    assert!(model.connected());
}

#[tokio::test]
async fn test_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let model = Model::new(fast_config());
    let result = model.connect("127.0.0.1", port).await;
    assert!(matches!(result, Err(ModelError::Connect { .. })), "{:?}", result);
    assert!(!model.connected());
}

#[tokio::test]
async fn test_not_connected() {
    let model = Model::default();
    assert!(!model.connected());
    assert!(matches!(model.get_status().await, Err(ModelError::NotConnected)));
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let (server, model) = setup().await;

    model.disconnect().await;
    model.disconnect().await;
    assert!(!model.connected());
    assert!(matches!(model.get_wavelength().await, Err(ModelError::NotConnected)));

    // The controller notices and goes offline; reconnecting brings it back
    let device = server.device();
    for _ in 0..200 {
        if device.status() == DeviceStatus::Offline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(device.status(), DeviceStatus::Offline);

    model.connect(&server.host(), server.port()).await.unwrap();
    assert_eq!(model.get_status().await.unwrap(), DeviceStatus::Ready);
}

#[tokio::test]
async fn test_reply_timeout_drops_connection() {
    let port = start_fake_controller(None).await;
    let model = Model::new(fast_config());
    model.connect("127.0.0.1", port).await.unwrap();

    let result = model.send("?WL", Duration::from_millis(50)).await;
    assert!(matches!(result, Err(ModelError::Timeout { .. })), "{:?}", result);
    assert!(!model.connected());
}

#[tokio::test]
async fn test_reply_tag_mismatch() {
    let port = start_fake_controller(Some("#GR 1")).await;
    let model = Model::new(fast_config());
    model.connect("127.0.0.1", port).await.unwrap();

    let result = model.get_wavelength().await;
    assert!(
        matches!(
            result,
            Err(ModelError::Protocol(ProtocolError::UnexpectedReply { expected: "#WL", .. }))
        ),
        "{:?}",
        result
    );

    // A value where an outcome was expected is not a known reply
    let result = model.set_grating(1).await;
    assert!(
        matches!(result, Err(ModelError::Protocol(ProtocolError::UnknownReply(_)))),
        "{:?}",
        result
    );

    // Protocol errors do not tear down the link
    assert!(model.connected());
    assert_eq!(model.get_grating().await.unwrap(), 1);
}
