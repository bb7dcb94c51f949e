//! Client-side service for the PowerTune power-tuning daemon.
//!
//! A privileged daemon applies hardware power-tuning settings (CPU
//! frequency limits, energy profiles, battery charge thresholds) and
//! stores named profiles; this crate runs in the calling process and talks
//! to it over a local TCP connection.
//!
//! The public surface is intentionally small:
//!
//! - [`ClientService`]: spawn it, fire commands at it, never block.
//! - [`ServiceEvent`]: every outcome (responses, daemon pushes, failures,
//!   timeouts, connection transitions) arrives on one event channel.
//!
//! Internally a single worker task owns the socket, frames commands as
//! newline-delimited JSON, correlates responses and timeouts per
//! (address, command) pair, and classifies every failure mode into a log
//! line plus one event, so the caller observes exactly one outcome per
//! request, even over an unreliable, partially-buffered byte stream.

/// Daemon endpoint configuration loaded from TOML.
pub mod config;

/// Payload types exchanged with the daemon.
pub mod packets;

/// Wire protocol: command tags and JSON-line frames.
pub mod protocol;

mod events;
mod service;
mod timers;
mod transport;
mod worker;

pub use events::ServiceEvent;
pub use packets::{
    ClientPacket, CpuVendor, DaemonError, DaemonPacket, DeviceInfoPacket, ErrorSet, OsType,
    PacketError,
};
pub use protocol::{DaemonCmd, Frame, FrameError};
pub use service::ClientService;
