//! Payload types exchanged with the power-tuning daemon.
//!
//! Packets are plain serde values carried inside wire frames. Inbound
//! packets embed a [`PacketError`] status the daemon sets when it could not
//! assemble the payload; a non-[`PacketError::NoError`] status downgrades
//! the response to a generic failure on the client side.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Granular failure reasons reported by the daemon.
///
/// "Applied" style responses carry a whole [`ErrorSet`] of these, so a
/// partially-successful apply (say, CPU limits written but the battery
/// charge threshold rejected) is representable instead of a bare
/// pass/fail.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum DaemonError {
    /// Unclassified daemon-side failure.
    Unknown,
    /// The daemon lacks permission for the requested sysfs/driver write.
    PermissionDenied,
    /// The target device node does not exist on this machine.
    DeviceNotFound,
    /// Writing the CPU frequency limit failed.
    CpuFreqApply,
    /// Writing the energy/performance preference failed.
    EnergyProfileApply,
    /// Toggling turbo/boost failed.
    BoostToggle,
    /// Writing the battery charge limit failed.
    BatteryChargeLimitApply,
    /// The named profile does not exist on the daemon side.
    ProfileNotFound,
    /// The daemon could not read or write its profile storage.
    ProfileStorage,
    /// The request was understood but its arguments were rejected.
    InvalidRequest,
    /// The operation is not supported on this platform.
    NotSupported,
}

impl DaemonError {
    /// Human-readable description, used for log lines shown to the caller.
    pub fn message(&self) -> &'static str {
        match self {
            DaemonError::Unknown => "unknown daemon error",
            DaemonError::PermissionDenied => "daemon has no permission for the requested operation",
            DaemonError::DeviceNotFound => "target device not found",
            DaemonError::CpuFreqApply => "failed to apply CPU frequency limit",
            DaemonError::EnergyProfileApply => "failed to apply energy profile",
            DaemonError::BoostToggle => "failed to toggle CPU boost",
            DaemonError::BatteryChargeLimitApply => "failed to apply battery charge limit",
            DaemonError::ProfileNotFound => "profile not found",
            DaemonError::ProfileStorage => "daemon profile storage error",
            DaemonError::InvalidRequest => "invalid request arguments",
            DaemonError::NotSupported => "operation not supported on this platform",
        }
    }
}

/// Set of independent failure reasons attached to a partially-successful
/// operation. Empty means fully applied.
pub type ErrorSet = BTreeSet<DaemonError>;

/// Status embedded in inbound packets.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum PacketError {
    /// Packet was assembled successfully.
    #[default]
    NoError,
    /// The daemon failed to read the underlying hardware state.
    ReadFailure,
    /// The daemon was denied access to the underlying hardware state.
    AccessDenied,
    /// The packet could not be assembled from the daemon's state.
    Malformed,
    /// The request is not supported by this daemon build.
    Unsupported,
}

impl PacketError {
    /// Human-readable description, used for log lines shown to the caller.
    pub fn message(&self) -> &'static str {
        match self {
            PacketError::NoError => "no error",
            PacketError::ReadFailure => "daemon failed to read hardware state",
            PacketError::AccessDenied => "daemon was denied access to hardware state",
            PacketError::Malformed => "daemon produced a malformed packet",
            PacketError::Unsupported => "request not supported by this daemon",
        }
    }
}

/// CPU vendor reported by the daemon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuVendor {
    /// Vendor could not be determined.
    #[default]
    Unknown,
    /// Intel CPU.
    Intel,
    /// AMD CPU.
    Amd,
}

/// Operating system the daemon runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OsType {
    /// OS could not be determined.
    #[default]
    Unknown,
    /// Linux.
    Linux,
    /// Windows.
    Windows,
}

/// Static device description, answered to a get-device-info request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfoPacket {
    /// Daemon-side status for this packet.
    pub error: PacketError,
    /// Detected CPU vendor.
    pub cpu_vendor: CpuVendor,
    /// Operating system the daemon runs on.
    pub os_type: OsType,
    /// CPU model string as reported by the platform.
    pub cpu_model: String,
    /// Number of physical cores.
    pub core_count: u32,
    /// Whether the machine has a battery.
    pub has_battery: bool,
}

/// Current daemon-side tuning state, answered to a get-daemon-packet or
/// load-profile request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaemonPacket {
    /// Daemon-side status for this packet.
    pub error: PacketError,
    /// Name of the profile currently applied, empty if none.
    pub active_profile: String,
    /// Current CPU frequency limit in MHz, 0 for unlimited.
    pub cpu_freq_limit_mhz: u32,
    /// Current energy/performance preference.
    pub energy_profile: String,
    /// Whether turbo/boost is enabled.
    pub boost_enabled: bool,
    /// Battery charge limit in percent, 100 for none.
    pub battery_charge_limit: u8,
}

/// Settings the client asks the daemon to apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientPacket {
    /// Requested CPU frequency limit in MHz, 0 for unlimited.
    pub cpu_freq_limit_mhz: u32,
    /// Requested energy/performance preference.
    pub energy_profile: String,
    /// Whether turbo/boost should be enabled.
    pub boost_enabled: bool,
    /// Requested battery charge limit in percent, 100 for none.
    pub battery_charge_limit: u8,
    /// Whether these settings also apply while on battery power.
    pub apply_on_battery: bool,
}
