//! Wire protocol for the daemon connection.
//!
//! Every message is one JSON line: a JSON array whose first element is the
//! integer command tag and whose remaining elements are the command-specific
//! values (strings, byte blobs, packets, lists, maps), terminated by `\n`:
//!
//! ```text
//! [7, "quiet", {"cpu_freq_limit_mhz": 2400, ...}]\n
//! ```
//!
//! The newline makes frames self-delimiting, so the reader can tell
//! "not enough bytes yet" apart from a complete frame without a length
//! prefix, and TCP segmentation never splits the decoding logic.

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::packets::ClientPacket;

/// Command tags of the daemon protocol, with their wire discriminants.
///
/// The same tag identifies a request and its response; responses to
/// daemon-initiated pushes (battery, wake, periodic apply tick) use tags of
/// their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DaemonCmd {
    /// Request the static device description.
    GetDeviceInfoPacket,
    /// Request the current daemon-side tuning state.
    GetDaemonPacket,
    /// Apply the client's settings packet.
    ApplyClientSettings,
    /// Request the daemon's own settings blob.
    GetDaemonSettings,
    /// Replace the daemon's own settings blob.
    ApplyDaemonSettings,
    /// Request the list of stored profile names.
    GetProfileList,
    /// Delete a stored profile.
    DeleteProfile,
    /// Create or overwrite a stored profile.
    WriteProfile,
    /// Load a stored profile into a daemon packet without applying it.
    LoadProfile,
    /// Apply a stored profile.
    ApplyProfile,
    /// Export stored profiles as a name-to-blob map.
    ExportProfiles,
    /// Import profiles from a name-to-blob map.
    ImportProfiles,
    /// Push: the daemon's periodic apply timer fired.
    ApplyTimerTick,
    /// Push: the battery status changed and a profile was re-applied.
    BatteryStatusChanged,
    /// Push: the system woke from sleep and settings were re-applied.
    WakeFromSleep,
    /// The daemon could not execute a command; value 1 names its tag.
    DaemonCommandFailed,
    /// The daemon asks the client to surface an error code.
    PrintError,
}

impl DaemonCmd {
    /// Wire discriminant of this command.
    pub fn wire_tag(self) -> i64 {
        match self {
            DaemonCmd::GetDeviceInfoPacket => 0,
            DaemonCmd::GetDaemonPacket => 1,
            DaemonCmd::ApplyClientSettings => 2,
            DaemonCmd::GetDaemonSettings => 3,
            DaemonCmd::ApplyDaemonSettings => 4,
            DaemonCmd::GetProfileList => 5,
            DaemonCmd::DeleteProfile => 6,
            DaemonCmd::WriteProfile => 7,
            DaemonCmd::LoadProfile => 8,
            DaemonCmd::ApplyProfile => 9,
            DaemonCmd::ExportProfiles => 10,
            DaemonCmd::ImportProfiles => 11,
            DaemonCmd::ApplyTimerTick => 12,
            DaemonCmd::BatteryStatusChanged => 13,
            DaemonCmd::WakeFromSleep => 14,
            DaemonCmd::DaemonCommandFailed => 15,
            DaemonCmd::PrintError => 16,
        }
    }

    /// Maps a wire discriminant back to a command, `None` for unknown tags.
    pub fn from_wire(tag: i64) -> Option<Self> {
        Some(match tag {
            0 => DaemonCmd::GetDeviceInfoPacket,
            1 => DaemonCmd::GetDaemonPacket,
            2 => DaemonCmd::ApplyClientSettings,
            3 => DaemonCmd::GetDaemonSettings,
            4 => DaemonCmd::ApplyDaemonSettings,
            5 => DaemonCmd::GetProfileList,
            6 => DaemonCmd::DeleteProfile,
            7 => DaemonCmd::WriteProfile,
            8 => DaemonCmd::LoadProfile,
            9 => DaemonCmd::ApplyProfile,
            10 => DaemonCmd::ExportProfiles,
            11 => DaemonCmd::ImportProfiles,
            12 => DaemonCmd::ApplyTimerTick,
            13 => DaemonCmd::BatteryStatusChanged,
            14 => DaemonCmd::WakeFromSleep,
            15 => DaemonCmd::DaemonCommandFailed,
            16 => DaemonCmd::PrintError,
            _ => return None,
        })
    }

    /// Minimum total argument count (tag included) a frame with this tag
    /// must carry before command-specific decoding may run.
    pub(crate) fn min_args(self) -> usize {
        match self {
            DaemonCmd::DaemonCommandFailed => 1,
            DaemonCmd::PrintError
            | DaemonCmd::GetDaemonSettings
            | DaemonCmd::ApplyClientSettings
            | DaemonCmd::DeleteProfile
            | DaemonCmd::WriteProfile
            | DaemonCmd::GetProfileList
            | DaemonCmd::ExportProfiles
            | DaemonCmd::ImportProfiles
            | DaemonCmd::ApplyTimerTick
            | DaemonCmd::ApplyDaemonSettings
            | DaemonCmd::WakeFromSleep => 2,
            DaemonCmd::ApplyProfile
            | DaemonCmd::LoadProfile
            | DaemonCmd::BatteryStatusChanged => 3,
            DaemonCmd::GetDeviceInfoPacket | DaemonCmd::GetDaemonPacket => 1,
        }
    }
}

impl fmt::Display for DaemonCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire_tag())
    }
}

/// Errors produced while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The bytes are not valid JSON, or a value failed typed decoding.
    #[error("invalid frame payload: {0}")]
    Json(#[from] serde_json::Error),
    /// The line decoded to something other than a JSON array.
    #[error("frame is not an array")]
    NotAnArray,
    /// The line decoded to an empty array; the tag at value 0 is mandatory.
    #[error("frame is empty")]
    Empty,
    /// Value 0 is not an integer tag.
    #[error("frame tag is not an integer")]
    InvalidTag,
    /// A command-specific value is absent.
    #[error("frame value {0} is missing")]
    MissingValue(usize),
}

/// One wire message: an integer tag plus ordered command-specific values.
///
/// The tag is kept raw so that frames with unknown tags survive decoding
/// and can be reported instead of being dropped on the floor.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    tag: i64,
    values: Vec<Value>,
}

impl Frame {
    /// Builds a frame for a known command.
    pub fn new(cmd: DaemonCmd, values: Vec<Value>) -> Self {
        Self {
            tag: cmd.wire_tag(),
            values,
        }
    }

    /// Builds a frame with a raw tag, known to the protocol or not.
    pub fn with_raw_tag(tag: i64, values: Vec<Value>) -> Self {
        Self { tag, values }
    }

    /// Raw wire tag (value 0).
    pub fn tag(&self) -> i64 {
        self.tag
    }

    /// The tag as a known command, `None` if the tag is unknown.
    pub fn command(&self) -> Option<DaemonCmd> {
        DaemonCmd::from_wire(self.tag)
    }

    /// Total argument count, tag included, matching the protocol's
    /// "value 0 is the tag" numbering.
    pub fn arg_count(&self) -> usize {
        1 + self.values.len()
    }

    /// Returns value `index` (1-based; value 0 is the tag).
    pub fn value(&self, index: usize) -> Option<&Value> {
        if index == 0 {
            return None;
        }
        self.values.get(index - 1)
    }

    /// Returns value `index` if it is a JSON string.
    pub fn string_value(&self, index: usize) -> Option<String> {
        self.value(index)?.as_str().map(str::to_owned)
    }

    /// Returns value `index` if it is a JSON integer.
    pub fn int_value(&self, index: usize) -> Option<i64> {
        self.value(index)?.as_i64()
    }

    /// Returns value `index` if it is a JSON boolean.
    pub fn bool_value(&self, index: usize) -> Option<bool> {
        self.value(index)?.as_bool()
    }

    /// Decodes value `index` into a typed payload.
    pub fn decode_value<T: DeserializeOwned>(&self, index: usize) -> Result<T, FrameError> {
        let value = self
            .value(index)
            .ok_or(FrameError::MissingValue(index))?
            .clone();
        Ok(serde_json::from_value(value)?)
    }

    /// Encodes the frame to its wire form, newline included.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let mut array = Vec::with_capacity(self.arg_count());
        array.push(Value::from(self.tag));
        array.extend(self.values.iter().cloned());

        let mut bytes = serde_json::to_vec(&Value::Array(array))?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Decodes one complete line (without its trailing newline).
    pub fn decode(line: &[u8]) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_slice(line)?;
        let array = match value {
            Value::Array(array) => array,
            _ => return Err(FrameError::NotAnArray),
        };
        let mut items = array.into_iter();
        let tag = items
            .next()
            .ok_or(FrameError::Empty)?
            .as_i64()
            .ok_or(FrameError::InvalidTag)?;

        Ok(Self {
            tag,
            values: items.collect(),
        })
    }
}

/// A caller request, one variant per command kind the client can send.
///
/// Each variant carries exactly the typed fields its command needs; the
/// frame shape is produced in one place by [`Request::into_frame`].
#[derive(Debug, Clone)]
pub(crate) enum Request {
    GetDeviceInfoPacket,
    GetDaemonPacket,
    ApplySettings(ClientPacket),
    GetDaemonSettings,
    ApplyDaemonSettings(Vec<u8>),
    GetProfileList,
    DeleteProfile(String),
    WriteProfile(String, ClientPacket),
    LoadProfile(String),
    ApplyProfile(String),
    ExportProfiles(String),
    ImportProfiles(HashMap<String, Vec<u8>>),
}

impl Request {
    /// The command tag this request is sent under.
    pub(crate) fn command(&self) -> DaemonCmd {
        match self {
            Request::GetDeviceInfoPacket => DaemonCmd::GetDeviceInfoPacket,
            Request::GetDaemonPacket => DaemonCmd::GetDaemonPacket,
            Request::ApplySettings(_) => DaemonCmd::ApplyClientSettings,
            Request::GetDaemonSettings => DaemonCmd::GetDaemonSettings,
            Request::ApplyDaemonSettings(_) => DaemonCmd::ApplyDaemonSettings,
            Request::GetProfileList => DaemonCmd::GetProfileList,
            Request::DeleteProfile(_) => DaemonCmd::DeleteProfile,
            Request::WriteProfile(..) => DaemonCmd::WriteProfile,
            Request::LoadProfile(_) => DaemonCmd::LoadProfile,
            Request::ApplyProfile(_) => DaemonCmd::ApplyProfile,
            Request::ExportProfiles(_) => DaemonCmd::ExportProfiles,
            Request::ImportProfiles(_) => DaemonCmd::ImportProfiles,
        }
    }

    /// Builds the outbound frame for this request.
    pub(crate) fn into_frame(self) -> Result<Frame, FrameError> {
        let cmd = self.command();
        let values = match self {
            Request::GetDeviceInfoPacket
            | Request::GetDaemonPacket
            | Request::GetDaemonSettings
            | Request::GetProfileList => Vec::new(),
            Request::ApplySettings(packet) => vec![serde_json::to_value(packet)?],
            Request::ApplyDaemonSettings(blob) => vec![serde_json::to_value(blob)?],
            Request::DeleteProfile(name)
            | Request::LoadProfile(name)
            | Request::ApplyProfile(name)
            | Request::ExportProfiles(name) => vec![Value::from(name)],
            Request::WriteProfile(name, packet) => {
                vec![Value::from(name), serde_json::to_value(packet)?]
            }
            Request::ImportProfiles(profiles) => vec![serde_json::to_value(profiles)?],
        };

        Ok(Frame::new(cmd, values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packets::{DaemonError, ErrorSet};

    #[test]
    fn wire_tags_roundtrip() {
        for tag in 0..17 {
            let cmd = DaemonCmd::from_wire(tag).expect("known tag");
            assert_eq!(cmd.wire_tag(), tag);
        }
        assert_eq!(DaemonCmd::from_wire(17), None);
        assert_eq!(DaemonCmd::from_wire(-1), None);
    }

    #[test]
    fn frame_roundtrips_through_wire_form() {
        let frame = Frame::new(
            DaemonCmd::WriteProfile,
            vec![Value::from("quiet"), Value::from(true)],
        );

        let bytes = frame.encode().expect("encode");
        assert_eq!(*bytes.last().expect("non-empty"), b'\n');

        let back = Frame::decode(&bytes[..bytes.len() - 1]).expect("decode");
        assert_eq!(back, frame);
        assert_eq!(back.command(), Some(DaemonCmd::WriteProfile));
        assert_eq!(back.string_value(1).as_deref(), Some("quiet"));
        assert_eq!(back.bool_value(2), Some(true));
    }

    #[test]
    fn decode_rejects_non_array_payloads() {
        assert!(matches!(
            Frame::decode(b"{\"cmd\": 1}"),
            Err(FrameError::NotAnArray)
        ));
        assert!(matches!(Frame::decode(b"[]"), Err(FrameError::Empty)));
        assert!(matches!(
            Frame::decode(b"[\"seven\"]"),
            Err(FrameError::InvalidTag)
        ));
        assert!(matches!(
            Frame::decode(b"[7, \"unterminated"),
            Err(FrameError::Json(_))
        ));
    }

    #[test]
    fn unknown_tags_survive_decoding() {
        let frame = Frame::decode(b"[99, \"payload\"]").expect("decode");
        assert_eq!(frame.tag(), 99);
        assert_eq!(frame.command(), None);
    }

    #[test]
    fn typed_value_decoding() {
        let mut errors = ErrorSet::new();
        errors.insert(DaemonError::CpuFreqApply);

        let frame = Frame::new(
            DaemonCmd::ApplyClientSettings,
            vec![serde_json::to_value(&errors).expect("encode error set")],
        );

        let decoded: ErrorSet = frame.decode_value(1).expect("decode error set");
        assert_eq!(decoded, errors);
        assert!(matches!(
            frame.decode_value::<ErrorSet>(2),
            Err(FrameError::MissingValue(2))
        ));
    }

    #[test]
    fn min_args_matches_the_protocol_table() {
        assert_eq!(DaemonCmd::DaemonCommandFailed.min_args(), 1);
        assert_eq!(DaemonCmd::GetDeviceInfoPacket.min_args(), 1);
        assert_eq!(DaemonCmd::PrintError.min_args(), 2);
        assert_eq!(DaemonCmd::WriteProfile.min_args(), 2);
        assert_eq!(DaemonCmd::ApplyProfile.min_args(), 3);
        assert_eq!(DaemonCmd::BatteryStatusChanged.min_args(), 3);
    }

    #[test]
    fn requests_build_the_documented_frame_shapes() {
        let frame = Request::GetProfileList.into_frame().expect("frame");
        assert_eq!(frame.command(), Some(DaemonCmd::GetProfileList));
        assert_eq!(frame.arg_count(), 1);

        let frame = Request::DeleteProfile("quiet".to_string())
            .into_frame()
            .expect("frame");
        assert_eq!(frame.command(), Some(DaemonCmd::DeleteProfile));
        assert_eq!(frame.string_value(1).as_deref(), Some("quiet"));

        let frame = Request::WriteProfile("quiet".to_string(), ClientPacket::default())
            .into_frame()
            .expect("frame");
        assert_eq!(frame.arg_count(), 3);
        assert!(frame.value(2).expect("packet value").is_object());
    }
}
