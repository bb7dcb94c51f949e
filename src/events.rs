//! Notifications delivered to the caller.

use std::collections::HashMap;

use crate::packets::{DaemonPacket, DeviceInfoPacket, ErrorSet};

/// Asynchronous outcome notifications, one per observable event.
///
/// Every failure mode the worker encounters (transport, protocol,
/// application, timeout) is converted into exactly one of these; nothing is
/// ever returned or thrown across the caller boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    /// A log line the caller may want to surface to the user.
    LogMessage(String),
    /// The connection to the daemon is established.
    Connected {
        /// Address the connection was made to.
        address: String,
        /// Port the connection was made to.
        port: u16,
    },
    /// The connection to the daemon is closed.
    Disconnected,
    /// The connection failed or broke; a log line with the transport
    /// category precedes this event.
    ServiceError,
    /// A command could not be completed (encode failure, protocol error,
    /// daemon-reported error, or timeout); details precede it as a log line.
    CommandFailed,
    /// Response to a get-device-info request.
    DeviceInfoReceived(DeviceInfoPacket),
    /// Response to a get-daemon-packet or load-profile request.
    DaemonPacketReceived(DaemonPacket),
    /// Response to an apply-settings request; empty set means fully applied.
    SettingsApplied(ErrorSet),
    /// Response to an apply-daemon-settings request.
    DaemonSettingsApplied(bool),
    /// Response to a get-daemon-settings request.
    DaemonSettingsReceived(Vec<u8>),
    /// Push: battery status changed and the named profile was re-applied.
    BatteryStatusChanged(ErrorSet, String),
    /// Push: settings were re-applied after waking from sleep.
    WakeFromSleep(ErrorSet),
    /// Push: the daemon's periodic apply timer re-applied settings.
    ApplyTimerTick(ErrorSet),
    /// Response to an apply-profile request, with the profile name.
    ProfileApplied(ErrorSet, String),
    /// Response to a get-profile-list request.
    ProfileListReceived(Vec<String>),
    /// Response to a delete-profile request.
    ProfileDeleted(bool),
    /// Response to a write-profile request.
    ProfileWritten(bool),
    /// Response to an export-profiles request.
    ProfilesExported(HashMap<String, Vec<u8>>),
    /// Response to an import-profiles request.
    ProfilesImported(bool),
}
