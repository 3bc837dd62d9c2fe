//! SmartPort packet header decoding.
//!
//! After the sync marker, a packet begins with the packet-start byte `0xC3`
//! followed by a fixed header:
//!
//! | Offset | Field    | Notes                                   |
//! |--------|----------|-----------------------------------------|
//! | +0     | `0xC3`   | packet start                            |
//! | +1     | dest     | destination unit address                |
//! | +2     | src      | source address (host)                   |
//! | +3     | type     | `0x80`/`0x85` = command packet          |
//! | +4     | aux      |                                         |
//! | +5     | status   |                                         |
//! | +6     | oddcnt   | number of odd bytes                     |
//! | +7     | grpcnt   | number of 7-byte groups                 |
//! | +8     | command  | only meaningful for command packets     |
//!
//! Every field read is bounds-checked against the captured length. A capture
//! that stops early yields a [`PacketView`] over what was captured rather than
//! an error, and a capture without a marker is classified for diagnostics.

use core::fmt;

use crate::consts::{
    COMMAND_PACKET_TYPES, OFFSET_AUX, OFFSET_COMMAND, OFFSET_DEST, OFFSET_GRPCNT, OFFSET_ODDCNT,
    OFFSET_SRC, OFFSET_STATUS, OFFSET_TYPE, PACKET_START, SYNC_MARKER_LEN,
};
use crate::sync::find_sync;

/// SmartPort command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Command {
    /// `0x00`
    Status,
    /// `0x01`
    ReadBlock,
    /// `0x02`
    WriteBlock,
    /// `0x03`
    Format,
    /// `0x04`
    Control,
    /// `0x05`
    Init,
    /// `0x06`
    Open,
    /// `0x07`
    Close,
    /// `0x08`
    Read,
    /// `0x09`
    Write,
    /// Any other code.
    Unknown(u8),
}

impl Command {
    /// Wire code of this command.
    pub const fn code(self) -> u8 {
        match self {
            Command::Status => 0x00,
            Command::ReadBlock => 0x01,
            Command::WriteBlock => 0x02,
            Command::Format => 0x03,
            Command::Control => 0x04,
            Command::Init => 0x05,
            Command::Open => 0x06,
            Command::Close => 0x07,
            Command::Read => 0x08,
            Command::Write => 0x09,
            Command::Unknown(code) => code,
        }
    }

    /// Upper-case protocol name, `"UNKNOWN"` for unrecognised codes.
    pub const fn name(self) -> &'static str {
        match self {
            Command::Status => "STATUS",
            Command::ReadBlock => "READBLOCK",
            Command::WriteBlock => "WRITEBLOCK",
            Command::Format => "FORMAT",
            Command::Control => "CONTROL",
            Command::Init => "INIT",
            Command::Open => "OPEN",
            Command::Close => "CLOSE",
            Command::Read => "READ",
            Command::Write => "WRITE",
            Command::Unknown(_) => "UNKNOWN",
        }
    }
}

impl From<u8> for Command {
    fn from(code: u8) -> Self {
        match code {
            0x00 => Command::Status,
            0x01 => Command::ReadBlock,
            0x02 => Command::WriteBlock,
            0x03 => Command::Format,
            0x04 => Command::Control,
            0x05 => Command::Init,
            0x06 => Command::Open,
            0x07 => Command::Close,
            0x08 => Command::Read,
            0x09 => Command::Write,
            other => Command::Unknown(other),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a packet type carries a command code.
pub fn is_command_type(packet_type: u8) -> bool {
    COMMAND_PACKET_TYPES.contains(&packet_type)
}

/// Borrowed view of a packet in a capture buffer.
///
/// Starts at the packet-start byte and ends at the end of the capture. Field
/// accessors return `None` for anything that was not captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketView<'a> {
    bytes: &'a [u8],
    start: usize,
}

impl<'a> PacketView<'a> {
    /// Builds a view over `buffer` with the packet-start byte at `start`.
    ///
    /// Returns `None` if `start` is out of bounds or does not hold `0xC3`.
    pub fn new(buffer: &'a [u8], start: usize) -> Option<Self> {
        let bytes = buffer.get(start..)?;
        if bytes.first() != Some(&PACKET_START) {
            return None;
        }
        Some(Self { bytes, start })
    }

    /// Offset of the packet-start byte in the capture buffer.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Captured bytes from the packet start on.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Byte at `offset` from the packet start, if captured.
    pub fn field(&self, offset: usize) -> Option<u8> {
        self.bytes.get(offset).copied()
    }

    /// Destination address.
    pub fn dest(&self) -> Option<u8> {
        self.field(OFFSET_DEST)
    }

    /// Source address.
    pub fn src(&self) -> Option<u8> {
        self.field(OFFSET_SRC)
    }

    /// Packet type.
    pub fn packet_type(&self) -> Option<u8> {
        self.field(OFFSET_TYPE)
    }

    /// Auxiliary type.
    pub fn aux(&self) -> Option<u8> {
        self.field(OFFSET_AUX)
    }

    /// Status byte.
    pub fn status(&self) -> Option<u8> {
        self.field(OFFSET_STATUS)
    }

    /// Odd-byte count.
    pub fn odd_count(&self) -> Option<u8> {
        self.field(OFFSET_ODDCNT)
    }

    /// 7-byte group count.
    pub fn group_count(&self) -> Option<u8> {
        self.field(OFFSET_GRPCNT)
    }

    /// Raw command byte, regardless of packet type.
    pub fn command_code(&self) -> Option<u8> {
        self.field(OFFSET_COMMAND)
    }

    /// Number of header fields (after the packet-start byte) that were captured.
    pub fn header_fields(&self) -> usize {
        self.bytes.len().saturating_sub(1).min(OFFSET_COMMAND)
    }

    /// Full header, if every field up to the command byte was captured.
    pub fn summary(&self) -> Option<PacketSummary> {
        let packet_type = self.packet_type()?;
        let code = self.command_code()?;
        Some(PacketSummary {
            start: self.start,
            dest: self.dest()?,
            src: self.src()?,
            packet_type,
            aux: self.aux()?,
            status: self.status()?,
            odd_count: self.odd_count()?,
            group_count: self.group_count()?,
            command: is_command_type(packet_type).then(|| Command::from(code)),
        })
    }
}

/// Decoded packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct PacketSummary {
    /// Offset of the packet-start byte in the capture buffer.
    pub start: usize,
    /// Destination address.
    pub dest: u8,
    /// Source address.
    pub src: u8,
    /// Packet type.
    pub packet_type: u8,
    /// Auxiliary type.
    pub aux: u8,
    /// Status byte.
    pub status: u8,
    /// Odd-byte count.
    pub odd_count: u8,
    /// 7-byte group count.
    pub group_count: u8,
    /// Command, present only for command packet types.
    pub command: Option<Command>,
}

/// Result of decoding after a sync marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decode<'a> {
    /// The byte after the marker is missing or is not `0xC3`.
    NoPacketStart,
    /// The capture ends before the command byte.
    Insufficient(PacketView<'a>),
    /// Complete header.
    Header(PacketSummary),
}

/// Decodes the packet header following the sync marker at `sync_offset`.
///
/// # Returns
/// - [`Decode::NoPacketStart`] if the packet-start byte is absent
/// - [`Decode::Insufficient`] if the capture stops before the command byte;
///   the view still exposes the fields that were captured
/// - [`Decode::Header`] otherwise
pub fn decode(buffer: &[u8], sync_offset: usize) -> Decode<'_> {
    let start = sync_offset.saturating_add(SYNC_MARKER_LEN);
    match PacketView::new(buffer, start) {
        None => Decode::NoPacketStart,
        Some(view) => match view.summary() {
            Some(summary) => Decode::Header(summary),
            None => Decode::Insufficient(view),
        },
    }
}

/// Diagnostic class of a capture with no sync marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum BufferClass {
    /// Every byte is `0x00` (also an empty capture): wrdata stuck low or mistimed.
    UniformZero,
    /// Every byte is `0xFF`: wrdata stuck high or mistimed.
    UniformOne,
    /// Varying data without a marker: sampling phase is probably off.
    MixedNoSync,
}

/// Classifies a capture that contains no sync marker.
pub fn classify(buffer: &[u8]) -> BufferClass {
    if buffer.iter().all(|&b| b == 0x00) {
        BufferClass::UniformZero
    } else if buffer.iter().all(|&b| b == 0xFF) {
        BufferClass::UniformOne
    } else {
        BufferClass::MixedNoSync
    }
}

/// Full analysis of one capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Analysis<'a> {
    /// No sync marker anywhere in the capture.
    NoSync(BufferClass),
    /// Marker found at `offset`.
    Synced {
        /// Offset of the sync marker.
        offset: usize,
        /// Header decoding result.
        decode: Decode<'a>,
    },
}

impl Analysis<'_> {
    /// Decoded command, if the capture held a complete command packet.
    pub fn command(&self) -> Option<Command> {
        match self {
            Analysis::Synced {
                decode: Decode::Header(summary),
                ..
            } => summary.command,
            _ => None,
        }
    }
}

/// Searches `buffer` for a sync marker and decodes what follows it.
pub fn analyze(buffer: &[u8]) -> Analysis<'_> {
    match find_sync(buffer) {
        Some(offset) => Analysis::Synced {
            offset,
            decode: decode(buffer, offset),
        },
        None => Analysis::NoSync(classify(buffer)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::SYNC_MARKER;

    fn packet(tail: &[u8], out: &mut [u8; 32]) -> usize {
        out[..SYNC_MARKER_LEN].copy_from_slice(&SYNC_MARKER);
        out[SYNC_MARKER_LEN..SYNC_MARKER_LEN + tail.len()].copy_from_slice(tail);
        SYNC_MARKER_LEN + tail.len()
    }

    #[test]
    fn test_command_table() {
        let names = [
            "STATUS",
            "READBLOCK",
            "WRITEBLOCK",
            "FORMAT",
            "CONTROL",
            "INIT",
            "OPEN",
            "CLOSE",
            "READ",
            "WRITE",
        ];
        for (code, name) in names.iter().enumerate() {
            let command = Command::from(code as u8);
            assert_eq!(command.name(), *name);
            assert_eq!(command.code(), code as u8);
        }
        assert_eq!(Command::from(0x20), Command::Unknown(0x20));
        assert_eq!(Command::from(0x20).name(), "UNKNOWN");
        assert_eq!(Command::from(0x0A).name(), "UNKNOWN");
    }

    #[test]
    fn test_decode_command_packet() {
        for code in 0u8..=0x09 {
            let mut buf = [0u8; 32];
            let len = packet(
                &[0xC3, 0x81, 0x80, 0x80, 0x80, 0x80, 0x82, 0x81, code, 0x00],
                &mut buf,
            );
            match decode(&buf[..len], 0) {
                Decode::Header(summary) => {
                    assert_eq!(summary.start, 6);
                    assert_eq!(summary.dest, 0x81);
                    assert_eq!(summary.src, 0x80);
                    assert_eq!(summary.packet_type, 0x80);
                    assert_eq!(summary.odd_count, 0x82);
                    assert_eq!(summary.group_count, 0x81);
                    assert_eq!(summary.command, Some(Command::from(code)));
                }
                other => panic!("unexpected decode {other:?}"),
            }
        }
    }

    #[test]
    fn test_decode_read_block_and_unknown() {
        let mut buf = [0u8; 32];
        let len = packet(&[0xC3, 0x81, 0x80, 0x80, 0x80, 0x80, 0x82, 0x81, 0x01], &mut buf);
        let analysis = analyze(&buf[..len]);
        assert_eq!(analysis.command(), Some(Command::ReadBlock));
        assert_eq!(analysis.command().map(Command::name), Some("READBLOCK"));

        let len = packet(&[0xC3, 0x81, 0x80, 0x85, 0x80, 0x80, 0x82, 0x81, 0x20], &mut buf);
        assert_eq!(analyze(&buf[..len]).command().map(Command::name), Some("UNKNOWN"));
    }

    #[test]
    fn test_non_command_type_has_no_command() {
        let mut buf = [0u8; 32];
        let len = packet(&[0xC3, 0x81, 0x80, 0x81, 0x80, 0x80, 0x82, 0x81, 0x01], &mut buf);
        match decode(&buf[..len], 0) {
            Decode::Header(summary) => {
                assert_eq!(summary.packet_type, 0x81);
                assert_eq!(summary.command, None);
            }
            other => panic!("unexpected decode {other:?}"),
        }
    }

    #[test]
    fn test_truncated_before_command_is_insufficient() {
        let mut buf = [0u8; 32];
        let len = packet(&[0xC3, 0x81, 0x80, 0x80, 0x80, 0x80, 0x82, 0x81, 0x01], &mut buf);
        // Drop the command byte and then every header byte in turn.
        for cut in SYNC_MARKER_LEN + 1..len {
            match decode(&buf[..cut], 0) {
                Decode::Insufficient(view) => {
                    assert_eq!(view.start(), SYNC_MARKER_LEN);
                    assert_eq!(view.header_fields(), cut - SYNC_MARKER_LEN - 1);
                    assert_eq!(view.command_code(), None);
                }
                other => panic!("cut {cut}: unexpected decode {other:?}"),
            }
        }

        match decode(&buf[..SYNC_MARKER_LEN + 4], 0) {
            Decode::Insufficient(view) => {
                assert_eq!(view.dest(), Some(0x81));
                assert_eq!(view.src(), Some(0x80));
                assert_eq!(view.packet_type(), Some(0x80));
                assert_eq!(view.aux(), None);
                assert_eq!(view.as_bytes(), &[0xC3, 0x81, 0x80, 0x80]);
            }
            other => panic!("unexpected decode {other:?}"),
        }
    }

    #[test]
    fn test_missing_packet_start() {
        let mut buf = [0u8; 32];
        let len = packet(&[0xC2, 0x81], &mut buf);
        assert_eq!(decode(&buf[..len], 0), Decode::NoPacketStart);
        assert_eq!(decode(&SYNC_MARKER, 0), Decode::NoPacketStart);
        assert_eq!(decode(&SYNC_MARKER, usize::MAX), Decode::NoPacketStart);
    }

    #[test]
    fn test_classify_without_sync() {
        assert_eq!(analyze(&[0x00; 16]), Analysis::NoSync(BufferClass::UniformZero));
        assert_eq!(analyze(&[0xFF; 16]), Analysis::NoSync(BufferClass::UniformOne));
        assert_eq!(
            analyze(&[0xFF, 0x3F, 0x00, 0x12]),
            Analysis::NoSync(BufferClass::MixedNoSync)
        );
        assert_eq!(classify(&[]), BufferClass::UniformZero);
    }

    #[test]
    fn test_sync_after_noise() {
        let buf = [
            0x12, 0x34, 0xFF, 0x3F, 0xCF, 0xF3, 0xFC, 0xFF, 0xC3, 0x81, 0x80, 0x80, 0x80, 0x80,
            0x82, 0x81, 0x05,
        ];
        match analyze(&buf) {
            Analysis::Synced { offset, decode } => {
                assert_eq!(offset, 2);
                assert!(matches!(decode, Decode::Header(s) if s.start == 8));
            }
            other => panic!("unexpected analysis {other:?}"),
        }
        assert_eq!(analyze(&buf).command(), Some(Command::Init));
    }
}
