//! The dispatcher worker: a single task owning all connection state.
//!
//! The worker reacts to three event sources in one `tokio::select!` loop:
//! caller commands from the facade, socket readiness (including the
//! in-flight connect attempt), and the earliest request-timer deadline.
//! Every outcome leaves as a [`ServiceEvent`]; nothing blocks the caller.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::events::ServiceEvent;
use crate::packets::{DaemonError, DaemonPacket, DeviceInfoPacket, ErrorSet, PacketError};
use crate::protocol::{DaemonCmd, Frame, Request};
use crate::timers::RequestTimerPool;
use crate::transport::{open_connection, TransportConnection, TransportErrorKind};

/// Caller requests forwarded into the worker, one per facade operation.
#[derive(Debug)]
pub(crate) enum WorkerCommand {
    Connect { address: String, port: u16 },
    Disconnect,
    Send(Request),
    Shutdown,
}

type ConnectFuture = Pin<Box<dyn Future<Output = Result<TcpStream, TransportErrorKind>> + Send>>;

/// Connection lifecycle state, owning whatever the phase needs.
enum ConnectionState {
    Disconnected,
    Connecting(ConnectFuture),
    Connected(TransportConnection),
}

impl ConnectionState {
    fn phase(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting(_) => "connecting",
            ConnectionState::Connected(_) => "connected",
        }
    }
}

/// Outcome of one socket readiness cycle.
enum SocketIo {
    ConnectResult(Result<TcpStream, TransportErrorKind>),
    Read(std::io::Result<usize>),
}

pub(crate) struct ServiceWorker {
    commands: mpsc::UnboundedReceiver<WorkerCommand>,
    events: mpsc::UnboundedSender<ServiceEvent>,
    state: ConnectionState,
    timers: RequestTimerPool,
    /// Daemon endpoint remembered while connecting/connected; cleared on
    /// every transition to Disconnected.
    address: String,
    port: u16,
}

impl ServiceWorker {
    pub(crate) fn new(
        commands: mpsc::UnboundedReceiver<WorkerCommand>,
        events: mpsc::UnboundedSender<ServiceEvent>,
    ) -> Self {
        Self {
            commands,
            events,
            state: ConnectionState::Disconnected,
            timers: RequestTimerPool::new(),
            address: String::new(),
            port: 0,
        }
    }

    /// Runs the event loop until a shutdown command arrives or the facade
    /// drops its command sender. The socket and timers are torn down before
    /// the task finishes.
    pub(crate) async fn run(mut self) {
        tracing::debug!("service worker started");

        loop {
            let next_deadline = self.timers.next_deadline();
            let socket_active = !matches!(self.state, ConnectionState::Disconnected);

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(WorkerCommand::Connect { address, port }) => {
                        self.handle_connect(address, port).await;
                    }
                    Some(WorkerCommand::Disconnect) => self.handle_disconnect().await,
                    Some(WorkerCommand::Send(request)) => self.handle_send(request).await,
                    Some(WorkerCommand::Shutdown) | None => {
                        self.teardown_connection().await;
                        break;
                    }
                },
                io = Self::socket_io(&mut self.state), if socket_active => {
                    self.on_socket_io(io).await;
                }
                _ = tokio::time::sleep_until(
                    next_deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600)),
                ), if next_deadline.is_some() => {
                    self.on_timers_expired();
                }
            }
        }

        tracing::debug!("service worker stopped");
    }

    /// Awaits the pending socket operation for the current phase. Never
    /// polled while disconnected (guarded in the select loop).
    async fn socket_io(state: &mut ConnectionState) -> SocketIo {
        match state {
            ConnectionState::Connecting(attempt) => {
                SocketIo::ConnectResult(attempt.as_mut().await)
            }
            ConnectionState::Connected(conn) => SocketIo::Read(conn.read_more().await),
            ConnectionState::Disconnected => std::future::pending::<SocketIo>().await,
        }
    }

    fn emit(&self, event: ServiceEvent) {
        // The relay outlives the worker; a send can only fail mid-shutdown.
        let _ = self.events.send(event);
    }

    fn emit_log(&self, message: String) {
        self.emit(ServiceEvent::LogMessage(message));
    }

    fn error_msg(&self, message: &str) -> String {
        format!("[{}]: {}", self.address, message)
    }

    /// Tears down whatever connection phase is current: stops all timers,
    /// gracefully closes an established socket, aborts an in-flight connect
    /// and forgets the endpoint. Returns whether the close was clean.
    async fn teardown_connection(&mut self) -> bool {
        self.timers.stop_all();
        self.address.clear();
        self.port = 0;

        let prior = std::mem::replace(&mut self.state, ConnectionState::Disconnected);
        match prior {
            ConnectionState::Connected(mut conn) => match conn.shutdown().await {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!(error = %err, "socket did not close cleanly");
                    false
                }
            },
            // Dropping the connect future aborts the attempt.
            ConnectionState::Connecting(_) | ConnectionState::Disconnected => true,
        }
    }

    /// Connect is idempotent: any prior connection or attempt is torn down
    /// first, silently, then a fresh attempt starts.
    async fn handle_connect(&mut self, address: String, port: u16) {
        tracing::debug!(%address, port, prior = self.state.phase(), "connecting to daemon");
        self.teardown_connection().await;

        self.address = address.clone();
        self.port = port;
        self.state = ConnectionState::Connecting(Box::pin(open_connection(address, port)));
    }

    async fn handle_disconnect(&mut self) {
        tracing::debug!(prior = self.state.phase(), "disconnecting from daemon");
        if !self.teardown_connection().await {
            self.emit_log("Failed to close daemon socket".to_string());
        }
        self.emit(ServiceEvent::Disconnected);
    }

    async fn handle_send(&mut self, request: Request) {
        let cmd = request.command();

        if !matches!(self.state, ConnectionState::Connected(_)) {
            self.emit_log(self.error_msg(&format!(
                "cannot send cmd {}: not connected to daemon",
                cmd
            )));
            self.emit(ServiceEvent::CommandFailed);
            return;
        }

        let bytes = match request.into_frame().and_then(|frame| frame.encode()) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(error = %err, %cmd, "failed to encode request");
                self.emit_log(self.error_msg(&format!("Failed to send cmd {}", cmd)));
                self.emit(ServiceEvent::CommandFailed);
                return;
            }
        };

        let written = match &mut self.state {
            ConnectionState::Connected(conn) => conn.send(&bytes).await,
            _ => return,
        };

        match written {
            Ok(()) => self.timers.start(&self.address, cmd),
            Err(err) => self.on_transport_error(&err).await,
        }
    }

    async fn on_socket_io(&mut self, io: SocketIo) {
        match io {
            SocketIo::ConnectResult(Ok(stream)) => {
                tracing::info!(address = %self.address, port = self.port, "connected to daemon");
                self.state = ConnectionState::Connected(TransportConnection::new(stream));
                self.emit(ServiceEvent::Connected {
                    address: self.address.clone(),
                    port: self.port,
                });
            }
            SocketIo::ConnectResult(Err(kind)) => {
                self.emit_log(self.error_msg(&kind.to_string()));
                if !self.teardown_connection().await {
                    self.emit_log("Failed to close connection on error".to_string());
                }
                self.emit(ServiceEvent::ServiceError);
            }
            SocketIo::Read(Ok(0)) => {
                // Remote close: surface the transport category, then both
                // the error and the disconnect.
                self.emit_log(self.error_msg(&TransportErrorKind::RemoteClosed.to_string()));
                if !self.teardown_connection().await {
                    self.emit_log("failed to gracefully disconnect daemon!".to_string());
                }
                self.emit(ServiceEvent::ServiceError);
                self.emit(ServiceEvent::Disconnected);
            }
            SocketIo::Read(Ok(_)) => self.drain_frames(),
            SocketIo::Read(Err(err)) => self.on_transport_error(&err).await,
        }
    }

    async fn on_transport_error(&mut self, err: &std::io::Error) {
        let kind = TransportErrorKind::classify(err);
        self.emit_log(self.error_msg(&kind.to_string()));
        if !self.teardown_connection().await {
            self.emit_log("Failed to close connection on error".to_string());
        }
        self.emit(ServiceEvent::ServiceError);
    }

    /// Extracts every complete frame already buffered; a frame that fails
    /// to decode stops the drain, later bytes wait for the next readiness.
    fn drain_frames(&mut self) {
        loop {
            let extracted = match &mut self.state {
                ConnectionState::Connected(conn) => conn.try_extract_frame(),
                _ => None,
            };

            match extracted {
                None => break,
                Some(Ok(frame)) => self.parse_cmd(frame),
                Some(Err(err)) => {
                    tracing::warn!(error = %err, "dropping malformed frame");
                    self.emit_log(self.error_msg("Failed to get data from daemon"));
                    self.emit(ServiceEvent::CommandFailed);
                    break;
                }
            }
        }
    }

    fn on_timers_expired(&mut self) {
        for key in self.timers.take_expired(Instant::now()) {
            self.emit_log(format!(
                "[{}]: request timeout for cmd: {}",
                key.address, key.cmd
            ));
            self.emit(ServiceEvent::CommandFailed);
        }
    }

    /// Validates and dispatches one inbound frame.
    fn parse_cmd(&mut self, frame: Frame) {
        let cmd = match frame.command() {
            Some(cmd) => cmd,
            None => {
                self.emit_log(self.error_msg(&format!("unknown cmd {}", frame.tag())));
                self.emit(ServiceEvent::CommandFailed);
                return;
            }
        };

        if frame.arg_count() < cmd.min_args() {
            self.emit_log(self.error_msg("invalid command arguments from daemon"));
            self.emit(ServiceEvent::ServiceError);
            return;
        }

        match cmd {
            DaemonCmd::PrintError => {
                let code = frame
                    .decode_value::<DaemonError>(1)
                    .unwrap_or(DaemonError::Unknown);
                self.emit_log(self.error_msg(code.message()));
                self.emit(ServiceEvent::CommandFailed);
            }
            DaemonCmd::DaemonCommandFailed => {
                // The daemon names the command it could not execute; only
                // its timer stops, no user-facing notification fires.
                if let Some(failed) = frame.int_value(1).and_then(DaemonCmd::from_wire) {
                    let address = self.address.clone();
                    self.timers.stop_for(&address, failed);
                }
            }
            DaemonCmd::GetDeviceInfoPacket => {
                self.stop_own_timer(cmd);
                match frame.decode_value::<DeviceInfoPacket>(1) {
                    Err(_) => {
                        self.emit_log(self.error_msg("Unable to unpack device info packet"));
                        self.emit(ServiceEvent::CommandFailed);
                    }
                    Ok(packet) if packet.error != PacketError::NoError => {
                        self.emit_log(packet.error.message().to_string());
                        self.emit(ServiceEvent::CommandFailed);
                    }
                    Ok(packet) => self.emit(ServiceEvent::DeviceInfoReceived(packet)),
                }
            }
            DaemonCmd::GetDaemonPacket => {
                self.stop_own_timer(cmd);
                match frame.decode_value::<DaemonPacket>(1) {
                    Err(_) => {
                        self.emit_log(self.error_msg("Unable to unpack daemon packet"));
                        self.emit(ServiceEvent::CommandFailed);
                    }
                    Ok(packet) if packet.error != PacketError::NoError => {
                        self.emit_log(packet.error.message().to_string());
                        self.emit(ServiceEvent::CommandFailed);
                    }
                    Ok(packet) => self.emit(ServiceEvent::DaemonPacketReceived(packet)),
                }
            }
            DaemonCmd::GetDaemonSettings => {
                self.stop_own_timer(cmd);
                let data = frame.decode_value::<Vec<u8>>(1).unwrap_or_default();
                if data.is_empty() {
                    self.emit_log(self.error_msg("Unable to get daemon settings"));
                    self.emit(ServiceEvent::CommandFailed);
                } else {
                    self.emit(ServiceEvent::DaemonSettingsReceived(data));
                }
            }
            DaemonCmd::ApplyClientSettings => {
                self.stop_own_timer(cmd);
                match frame.decode_value::<ErrorSet>(1) {
                    Err(_) => {
                        self.emit_log(self.error_msg("Unable to get apply settings result"));
                        self.emit(ServiceEvent::CommandFailed);
                    }
                    Ok(errors) => self.emit(ServiceEvent::SettingsApplied(errors)),
                }
            }
            DaemonCmd::DeleteProfile => {
                self.stop_own_timer(cmd);
                self.emit(ServiceEvent::ProfileDeleted(
                    frame.bool_value(1).unwrap_or(false),
                ));
            }
            DaemonCmd::WriteProfile => {
                self.stop_own_timer(cmd);
                self.emit(ServiceEvent::ProfileWritten(
                    frame.bool_value(1).unwrap_or(false),
                ));
            }
            DaemonCmd::GetProfileList => {
                self.stop_own_timer(cmd);
                let list = frame.decode_value::<Vec<String>>(1).unwrap_or_default();
                self.emit(ServiceEvent::ProfileListReceived(list));
            }
            DaemonCmd::ApplyProfile => {
                self.stop_own_timer(cmd);
                match frame.decode_value::<ErrorSet>(1) {
                    Err(_) => {
                        self.emit_log(self.error_msg("Unable to get apply profile result"));
                        self.emit(ServiceEvent::CommandFailed);
                    }
                    Ok(errors) => {
                        let name = frame.string_value(2).unwrap_or_default();
                        self.emit(ServiceEvent::ProfileApplied(errors, name));
                    }
                }
            }
            DaemonCmd::LoadProfile => {
                self.stop_own_timer(cmd);
                match frame.decode_value::<DaemonPacket>(1) {
                    Err(_) => {
                        self.emit_log(self.error_msg("Unable to unpack daemon packet"));
                        self.emit(ServiceEvent::CommandFailed);
                    }
                    Ok(packet) => {
                        let name = frame.string_value(2).unwrap_or_default();
                        self.emit_log(format!("Loaded profile: {}", name));
                        self.emit(ServiceEvent::DaemonPacketReceived(packet));
                    }
                }
            }
            DaemonCmd::ExportProfiles => {
                self.stop_own_timer(cmd);
                match frame.decode_value::<std::collections::HashMap<String, Vec<u8>>>(1) {
                    Err(_) => {
                        self.emit_log(self.error_msg("Failed to get exported profiles data"));
                        self.emit(ServiceEvent::CommandFailed);
                    }
                    Ok(exported) => self.emit(ServiceEvent::ProfilesExported(exported)),
                }
            }
            DaemonCmd::ImportProfiles => {
                self.stop_own_timer(cmd);
                self.emit(ServiceEvent::ProfilesImported(
                    frame.bool_value(1).unwrap_or(false),
                ));
            }
            DaemonCmd::ApplyDaemonSettings => {
                self.stop_own_timer(cmd);
                self.emit(ServiceEvent::DaemonSettingsApplied(
                    frame.bool_value(1).unwrap_or(false),
                ));
            }
            // Daemon-initiated pushes: no request, so no timer to stop.
            DaemonCmd::BatteryStatusChanged => match frame.decode_value::<ErrorSet>(1) {
                Err(_) => {
                    self.emit_log(
                        self.error_msg("Unable to get battery status change event result"),
                    );
                    self.emit(ServiceEvent::CommandFailed);
                }
                Ok(errors) => {
                    let name = frame.string_value(2).unwrap_or_default();
                    self.emit(ServiceEvent::BatteryStatusChanged(errors, name));
                }
            },
            DaemonCmd::WakeFromSleep => match frame.decode_value::<ErrorSet>(1) {
                Err(_) => {
                    self.emit_log(self.error_msg("Unable to get wake from sleep event result"));
                    self.emit(ServiceEvent::CommandFailed);
                }
                Ok(errors) => self.emit(ServiceEvent::WakeFromSleep(errors)),
            },
            DaemonCmd::ApplyTimerTick => match frame.decode_value::<ErrorSet>(1) {
                Err(_) => {
                    self.emit_log(self.error_msg("Unable to get apply timer result"));
                    self.emit(ServiceEvent::CommandFailed);
                }
                Ok(errors) => self.emit(ServiceEvent::ApplyTimerTick(errors)),
            },
        }
    }

    fn stop_own_timer(&mut self, cmd: DaemonCmd) {
        let address = self.address.clone();
        self.timers.stop_for(&address, cmd);
    }
}
