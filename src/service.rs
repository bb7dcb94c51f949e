//! The caller-facing facade over the dispatcher worker.
//!
//! [`ClientService`] spawns the worker task and a relay task at
//! construction. Every method forwards a command onto the worker's queue
//! and returns immediately; outcomes arrive on the event receiver handed
//! back by [`ClientService::spawn`]. The relay observes the event stream on
//! its way out to keep the synchronous accessors
//! ([`ClientService::is_connected`] and friends) truthful.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::events::ServiceEvent;
use crate::packets::ClientPacket;
use crate::protocol::Request;
use crate::worker::{ServiceWorker, WorkerCommand};

#[derive(Debug, Default)]
struct SharedState {
    /// Daemon endpoint while connected, `None` otherwise.
    endpoint: Mutex<Option<(String, u16)>>,
}

impl SharedState {
    fn set_endpoint(&self, endpoint: Option<(String, u16)>) {
        *self
            .endpoint
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = endpoint;
    }

    fn endpoint(&self) -> Option<(String, u16)> {
        self.endpoint
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Handle to the daemon client service.
///
/// All operations are fire-and-forget: they enqueue work for the worker
/// task and never block. Results, errors and daemon-initiated pushes are
/// delivered as [`ServiceEvent`]s on the receiver returned by
/// [`ClientService::spawn`].
///
/// # Example
///
/// ```no_run
/// use powertune_client::{ClientService, ServiceEvent};
///
/// #[tokio::main]
/// async fn main() {
///     let (service, mut events) = ClientService::spawn();
///
///     service.connect_to_daemon("127.0.0.1", 29177);
///     while let Some(event) = events.recv().await {
///         match event {
///             ServiceEvent::Connected { .. } => service.send_get_device_info_packet_request(),
///             ServiceEvent::DeviceInfoReceived(info) => {
///                 println!("{} ({} cores)", info.cpu_model, info.core_count);
///                 break;
///             }
///             _ => {}
///         }
///     }
///
///     service.shutdown().await;
/// }
/// ```
#[derive(Debug)]
pub struct ClientService {
    commands: mpsc::UnboundedSender<WorkerCommand>,
    shared: Arc<SharedState>,
    worker: Option<JoinHandle<()>>,
    relay: Option<JoinHandle<()>>,
}

impl ClientService {
    /// Spawns the worker and relay tasks and returns the service handle
    /// together with the caller's event receiver.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn() -> (Self, mpsc::UnboundedReceiver<ServiceEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (worker_tx, worker_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(SharedState::default());
        let worker = tokio::spawn(ServiceWorker::new(command_rx, worker_tx).run());
        let relay = tokio::spawn(relay_events(worker_rx, event_tx, Arc::clone(&shared)));

        (
            Self {
                commands: command_tx,
                shared,
                worker: Some(worker),
                relay: Some(relay),
            },
            event_rx,
        )
    }

    /// Major version of the client service.
    pub fn major_version() -> u32 {
        env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0)
    }

    /// Minor version of the client service.
    pub fn minor_version() -> u32 {
        env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0)
    }

    /// Whether the daemon connection is currently established.
    pub fn is_connected(&self) -> bool {
        self.shared.endpoint().is_some()
    }

    /// Address of the connected daemon, `None` while disconnected.
    pub fn daemon_address(&self) -> Option<String> {
        self.shared.endpoint().map(|(address, _)| address)
    }

    /// Port of the connected daemon, `None` while disconnected.
    pub fn daemon_port(&self) -> Option<u16> {
        self.shared.endpoint().map(|(_, port)| port)
    }

    /// Connects to the daemon, tearing down any prior connection first.
    pub fn connect_to_daemon(&self, address: impl Into<String>, port: u16) {
        self.command(WorkerCommand::Connect {
            address: address.into(),
            port,
        });
    }

    /// Disconnects from the daemon, cancelling every in-flight request.
    pub fn disconnect_from_daemon(&self) {
        self.command(WorkerCommand::Disconnect);
    }

    /// Requests the static device description.
    pub fn send_get_device_info_packet_request(&self) {
        self.send(Request::GetDeviceInfoPacket);
    }

    /// Requests the current daemon-side tuning state.
    pub fn send_get_daemon_packet_request(&self) {
        self.send(Request::GetDaemonPacket);
    }

    /// Asks the daemon to apply the given settings.
    pub fn send_apply_settings_request(&self, packet: ClientPacket) {
        self.send(Request::ApplySettings(packet));
    }

    /// Requests the daemon's own settings blob.
    pub fn send_get_daemon_settings_request(&self) {
        self.send(Request::GetDaemonSettings);
    }

    /// Replaces the daemon's own settings blob.
    pub fn send_apply_daemon_settings_request(&self, data: Vec<u8>) {
        self.send(Request::ApplyDaemonSettings(data));
    }

    /// Requests the list of stored profile names.
    pub fn send_get_profile_list_request(&self) {
        self.send(Request::GetProfileList);
    }

    /// Deletes a stored profile.
    pub fn send_delete_profile_request(&self, name: impl Into<String>) {
        self.send(Request::DeleteProfile(name.into()));
    }

    /// Creates or overwrites a stored profile.
    pub fn send_write_profile_request(&self, name: impl Into<String>, packet: ClientPacket) {
        self.send(Request::WriteProfile(name.into(), packet));
    }

    /// Loads a stored profile into a daemon packet without applying it.
    pub fn send_load_profile_request(&self, name: impl Into<String>) {
        self.send(Request::LoadProfile(name.into()));
    }

    /// Applies a stored profile.
    pub fn send_apply_profile_request(&self, name: impl Into<String>) {
        self.send(Request::ApplyProfile(name.into()));
    }

    /// Exports stored profiles as a name-to-blob map.
    pub fn send_export_profiles_request(&self, name: impl Into<String>) {
        self.send(Request::ExportProfiles(name.into()));
    }

    /// Imports profiles from a name-to-blob map.
    pub fn send_import_profiles_request(&self, profiles: HashMap<String, Vec<u8>>) {
        self.send(Request::ImportProfiles(profiles));
    }

    /// Stops the worker and waits for it to finish draining its socket and
    /// timers before returning.
    pub async fn shutdown(mut self) {
        self.command(WorkerCommand::Shutdown);
        if let Some(handle) = self.worker.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.relay.take() {
            let _ = handle.await;
        }
    }

    fn send(&self, request: Request) {
        self.command(WorkerCommand::Send(request));
    }

    fn command(&self, command: WorkerCommand) {
        // A send can only fail after shutdown, when there is nobody left
        // to care about the command.
        let _ = self.commands.send(command);
    }
}

impl Drop for ClientService {
    fn drop(&mut self) {
        let _ = self.commands.send(WorkerCommand::Shutdown);
    }
}

/// Forwards worker events to the caller, mirroring connection transitions
/// into the shared state the synchronous accessors read.
async fn relay_events(
    mut worker_rx: mpsc::UnboundedReceiver<ServiceEvent>,
    caller_tx: mpsc::UnboundedSender<ServiceEvent>,
    shared: Arc<SharedState>,
) {
    while let Some(event) = worker_rx.recv().await {
        match &event {
            ServiceEvent::Connected { address, port } => {
                shared.set_endpoint(Some((address.clone(), *port)));
            }
            ServiceEvent::Disconnected | ServiceEvent::ServiceError => {
                shared.set_endpoint(None);
            }
            _ => {}
        }
        // The caller may have dropped its receiver; state tracking above
        // still has to run, so send failures are ignored.
        let _ = caller_tx.send(event);
    }
}
