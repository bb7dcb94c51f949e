//! Request/response round trips against a scripted mock daemon.

mod common;

use std::collections::HashMap;

use common::{assert_no_pending_events, expect_log_containing, recv_event, recv_non_log_event, MockDaemon};
use powertune_client::{
    ClientService, DaemonCmd, DaemonError, DeviceInfoPacket, ErrorSet, Frame, PacketError,
    ServiceEvent,
};
use serde_json::{json, Value};

/// Spawns the service, connects it to the daemon and waits for both sides.
async fn connected_service() -> (
    ClientService,
    tokio::sync::mpsc::UnboundedReceiver<ServiceEvent>,
    common::DaemonConn,
    MockDaemon,
) {
    let daemon = MockDaemon::bind().await;
    let (service, mut events) = ClientService::spawn();

    service.connect_to_daemon("127.0.0.1", daemon.port());
    let conn = daemon.accept().await;

    match recv_event(&mut events, 2).await {
        ServiceEvent::Connected { address, port } => {
            assert_eq!(address, "127.0.0.1");
            assert_eq!(port, daemon.port());
        }
        other => panic!("expected Connected, got {:?}", other),
    }

    (service, events, conn, daemon)
}

#[tokio::test]
async fn profile_list_roundtrip() {
    let (service, mut events, mut conn, _daemon) = connected_service().await;

    service.send_get_profile_list_request();

    let request = conn.read_frame().await;
    assert_eq!(request.command(), Some(DaemonCmd::GetProfileList));
    assert_eq!(request.arg_count(), 1);

    conn.send_frame(&Frame::new(DaemonCmd::GetProfileList, vec![json!(["a", "b"])]))
        .await;

    assert_eq!(
        recv_non_log_event(&mut events, 2).await,
        ServiceEvent::ProfileListReceived(vec!["a".to_string(), "b".to_string()])
    );

    service.shutdown().await;
}

#[tokio::test]
async fn write_profile_roundtrip_fires_exactly_once() {
    let (service, mut events, mut conn, _daemon) = connected_service().await;

    service.send_write_profile_request("p1", Default::default());

    let request = conn.read_frame().await;
    assert_eq!(request.command(), Some(DaemonCmd::WriteProfile));
    assert_eq!(request.string_value(1).as_deref(), Some("p1"));
    assert!(request.value(2).expect("settings packet").is_object());

    conn.send_frame(&Frame::new(DaemonCmd::WriteProfile, vec![Value::from(true)]))
        .await;

    assert_eq!(
        recv_non_log_event(&mut events, 2).await,
        ServiceEvent::ProfileWritten(true)
    );
    assert_no_pending_events(&mut events).await;

    service.shutdown().await;
}

#[tokio::test]
async fn device_info_roundtrip() {
    let (service, mut events, mut conn, _daemon) = connected_service().await;

    service.send_get_device_info_packet_request();
    let request = conn.read_frame().await;
    assert_eq!(request.command(), Some(DaemonCmd::GetDeviceInfoPacket));

    let packet = DeviceInfoPacket {
        cpu_model: "Ryzen 7 7840U".to_string(),
        core_count: 8,
        has_battery: true,
        ..DeviceInfoPacket::default()
    };
    conn.send_frame(&Frame::new(
        DaemonCmd::GetDeviceInfoPacket,
        vec![serde_json::to_value(&packet).expect("encode packet")],
    ))
    .await;

    assert_eq!(
        recv_non_log_event(&mut events, 2).await,
        ServiceEvent::DeviceInfoReceived(packet)
    );

    service.shutdown().await;
}

#[tokio::test]
async fn settings_applied_carries_the_error_set() {
    let (service, mut events, mut conn, _daemon) = connected_service().await;

    service.send_apply_settings_request(Default::default());
    let request = conn.read_frame().await;
    assert_eq!(request.command(), Some(DaemonCmd::ApplyClientSettings));

    let mut errors = ErrorSet::new();
    errors.insert(DaemonError::BatteryChargeLimitApply);
    conn.send_frame(&Frame::new(
        DaemonCmd::ApplyClientSettings,
        vec![serde_json::to_value(&errors).expect("encode errors")],
    ))
    .await;

    assert_eq!(
        recv_non_log_event(&mut events, 2).await,
        ServiceEvent::SettingsApplied(errors)
    );

    service.shutdown().await;
}

#[tokio::test]
async fn export_profiles_roundtrip() {
    let (service, mut events, mut conn, _daemon) = connected_service().await;

    service.send_export_profiles_request("all");
    let request = conn.read_frame().await;
    assert_eq!(request.command(), Some(DaemonCmd::ExportProfiles));

    let mut exported = HashMap::new();
    exported.insert("quiet".to_string(), vec![1u8, 2, 3]);
    conn.send_frame(&Frame::new(
        DaemonCmd::ExportProfiles,
        vec![serde_json::to_value(&exported).expect("encode map")],
    ))
    .await;

    assert_eq!(
        recv_non_log_event(&mut events, 2).await,
        ServiceEvent::ProfilesExported(exported)
    );

    service.shutdown().await;
}

#[tokio::test]
async fn print_error_logs_the_decoded_text_then_fails() {
    let (service, mut events, mut conn, _daemon) = connected_service().await;

    conn.send_frame(&Frame::new(
        DaemonCmd::PrintError,
        vec![serde_json::to_value(DaemonError::ProfileNotFound).expect("encode code")],
    ))
    .await;

    expect_log_containing(&mut events, DaemonError::ProfileNotFound.message(), 2).await;
    assert_eq!(
        recv_non_log_event(&mut events, 2).await,
        ServiceEvent::CommandFailed
    );

    service.shutdown().await;
}

#[tokio::test]
async fn short_frame_yields_a_protocol_error_before_decoding() {
    let (service, mut events, mut conn, _daemon) = connected_service().await;

    // apply-profile requires three values; send only the tag.
    conn.send_frame(&Frame::new(DaemonCmd::ApplyProfile, vec![])).await;

    expect_log_containing(&mut events, "invalid command arguments", 2).await;
    assert_eq!(
        recv_non_log_event(&mut events, 2).await,
        ServiceEvent::ServiceError
    );

    service.shutdown().await;
}

#[tokio::test]
async fn unknown_tag_is_logged_and_fails() {
    let (service, mut events, mut conn, _daemon) = connected_service().await;

    conn.send_raw(b"[99]\n").await;

    expect_log_containing(&mut events, "unknown cmd 99", 2).await;
    assert_eq!(
        recv_non_log_event(&mut events, 2).await,
        ServiceEvent::CommandFailed
    );

    service.shutdown().await;
}

#[tokio::test]
async fn packet_with_embedded_error_downgrades_to_failure() {
    let (service, mut events, mut conn, _daemon) = connected_service().await;

    service.send_get_daemon_packet_request();
    conn.read_frame().await;

    let packet = powertune_client::DaemonPacket {
        error: PacketError::AccessDenied,
        ..Default::default()
    };
    conn.send_frame(&Frame::new(
        DaemonCmd::GetDaemonPacket,
        vec![serde_json::to_value(&packet).expect("encode packet")],
    ))
    .await;

    expect_log_containing(&mut events, PacketError::AccessDenied.message(), 2).await;
    assert_eq!(
        recv_non_log_event(&mut events, 2).await,
        ServiceEvent::CommandFailed
    );

    service.shutdown().await;
}

#[tokio::test]
async fn daemon_pushes_need_no_request() {
    let (service, mut events, mut conn, _daemon) = connected_service().await;

    let mut errors = ErrorSet::new();
    errors.insert(DaemonError::CpuFreqApply);
    conn.send_frame(&Frame::new(
        DaemonCmd::BatteryStatusChanged,
        vec![
            serde_json::to_value(&errors).expect("encode errors"),
            Value::from("on-battery"),
        ],
    ))
    .await;

    assert_eq!(
        recv_non_log_event(&mut events, 2).await,
        ServiceEvent::BatteryStatusChanged(errors, "on-battery".to_string())
    );

    service.shutdown().await;
}

#[tokio::test]
async fn frames_split_across_tcp_segments_are_reassembled() {
    let (service, mut events, mut conn, _daemon) = connected_service().await;

    let bytes = Frame::new(DaemonCmd::GetProfileList, vec![json!(["solo"])])
        .encode()
        .expect("encode");
    let (head, tail) = bytes.split_at(bytes.len() / 2);

    conn.send_raw(head).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    conn.send_raw(tail).await;

    assert_eq!(
        recv_non_log_event(&mut events, 2).await,
        ServiceEvent::ProfileListReceived(vec!["solo".to_string()])
    );

    service.shutdown().await;
}

#[tokio::test]
async fn multiple_frames_in_one_burst_are_all_drained() {
    let (service, mut events, mut conn, _daemon) = connected_service().await;

    let mut burst = Frame::new(DaemonCmd::WriteProfile, vec![Value::from(true)])
        .encode()
        .expect("encode");
    burst.extend(
        Frame::new(DaemonCmd::DeleteProfile, vec![Value::from(false)])
            .encode()
            .expect("encode"),
    );
    conn.send_raw(&burst).await;

    assert_eq!(
        recv_non_log_event(&mut events, 2).await,
        ServiceEvent::ProfileWritten(true)
    );
    assert_eq!(
        recv_non_log_event(&mut events, 2).await,
        ServiceEvent::ProfileDeleted(false)
    );

    service.shutdown().await;
}
