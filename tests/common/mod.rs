//! Shared helpers: a scripted mock daemon and event-stream utilities.

#![allow(dead_code)]

use std::sync::Once;
use std::time::Duration;

use powertune_client::{Frame, ServiceEvent};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

static INIT_TRACING: Once = Once::new();

/// Installs a test subscriber honoring `RUST_LOG`, once per process.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A TCP listener standing in for the power-tuning daemon.
pub struct MockDaemon {
    listener: TcpListener,
    port: u16,
}

impl MockDaemon {
    /// Binds on an ephemeral localhost port.
    pub async fn bind() -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        Self { listener, port }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Accepts the next client connection.
    pub async fn accept(&self) -> DaemonConn {
        let (stream, _) = self.listener.accept().await.expect("accept");
        DaemonConn {
            stream,
            buf: Vec::new(),
        }
    }
}

/// One accepted client connection, with frame-level send and receive.
pub struct DaemonConn {
    stream: TcpStream,
    buf: Vec<u8>,
}

impl DaemonConn {
    /// Reads one complete frame from the client.
    pub async fn read_frame(&mut self) -> Frame {
        loop {
            if let Some(newline) = self.buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.buf.drain(..=newline).collect();
                return Frame::decode(&line[..newline]).expect("well-formed frame from client");
            }

            let mut chunk = [0u8; 1024];
            let n = self.stream.read(&mut chunk).await.expect("read");
            assert!(n > 0, "client closed the connection mid-frame");
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Sends one frame to the client.
    pub async fn send_frame(&mut self, frame: &Frame) {
        let bytes = frame.encode().expect("encode frame");
        self.send_raw(&bytes).await;
    }

    /// Sends raw bytes, for segmentation and malformed-input scenarios.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("write");
        self.stream.flush().await.expect("flush");
    }
}

/// Receives the next event, failing the test after `secs` real seconds.
pub async fn recv_event(rx: &mut mpsc::UnboundedReceiver<ServiceEvent>, secs: u64) -> ServiceEvent {
    timeout(Duration::from_secs(secs), rx.recv())
        .await
        .expect("timed out waiting for a service event")
        .expect("event channel closed")
}

/// Receives the next event, skipping log messages on the way.
pub async fn recv_non_log_event(
    rx: &mut mpsc::UnboundedReceiver<ServiceEvent>,
    secs: u64,
) -> ServiceEvent {
    loop {
        match recv_event(rx, secs).await {
            ServiceEvent::LogMessage(_) => continue,
            event => return event,
        }
    }
}

/// Receives events until a log message matches `needle`; panics on any
/// non-log event arriving first.
pub async fn expect_log_containing(
    rx: &mut mpsc::UnboundedReceiver<ServiceEvent>,
    needle: &str,
    secs: u64,
) -> String {
    loop {
        match recv_event(rx, secs).await {
            ServiceEvent::LogMessage(msg) if msg.contains(needle) => return msg,
            ServiceEvent::LogMessage(_) => continue,
            other => panic!("expected log containing {:?}, got {:?}", needle, other),
        }
    }
}

/// Asserts that no further events are pending after a short settle delay.
pub async fn assert_no_pending_events(rx: &mut mpsc::UnboundedReceiver<ServiceEvent>) {
    tokio::time::sleep(Duration::from_millis(100)).await;
    if let Ok(event) = rx.try_recv() {
        panic!("unexpected pending event: {:?}", event);
    }
}
