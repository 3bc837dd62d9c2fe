//! Constants used across the SmartPort observer.
//!
//! This module defines the wire-level constants of the SmartPort bus as it is
//! presented by the FPGA adapter: bit timing, framing markers, header layout,
//! command codes, and the default session timings used by the capture engine.
//!
//! ## Key Concepts
//!
//! - **Bit cell**: each bit occupies a fixed 4 µs slot (250 kbps), MSB first, no parity.
//! - **Sync marker**: a 6-byte self-synchronizing preamble that precedes every packet.
//! - **Packet start**: a single `0xC3` byte immediately following the sync marker.
//! - **Header**: fixed offsets relative to the packet-start byte.
//! - **Enable pattern**: the phase-line nibble the host drives when it addresses a SmartPort device.
//!
//! These values should be used wherever sampling or framing logic is implemented
//! so that timing and offsets stay consistent between the sampler and the decoder.

/// Duration of one bit cell, in microseconds.
pub const BIT_CELL_US: u32 = 4;

/// Half of a bit cell, in microseconds. Samples are taken at this offset into each cell.
pub const HALF_BIT_US: u32 = BIT_CELL_US / 2;

/// Number of bits assembled into one captured byte.
pub const BITS_PER_BYTE: u8 = 8;

/// Fixed capacity (in bytes) of a single capture session.
pub const CAPTURE_SIZE: usize = 128;

/// The 6-byte SmartPort sync marker.
///
/// Every packet is preceded by this self-synchronizing pattern. Bit-boundary
/// alignment is only trustworthy once it has been matched exactly.
pub const SYNC_MARKER: [u8; 6] = [0xFF, 0x3F, 0xCF, 0xF3, 0xFC, 0xFF];

/// See [`SYNC_MARKER`](crate::consts::SYNC_MARKER)
pub const SYNC_MARKER_LEN: usize = SYNC_MARKER.len();

/// The packet-start marker that follows the sync marker.
pub const PACKET_START: u8 = 0xC3;

/// Offset of the destination address, relative to the packet-start byte.
pub const OFFSET_DEST: usize = 1;
/// Offset of the source address, relative to the packet-start byte.
pub const OFFSET_SRC: usize = 2;
/// Offset of the packet type, relative to the packet-start byte.
pub const OFFSET_TYPE: usize = 3;
/// Offset of the auxiliary type byte, relative to the packet-start byte.
pub const OFFSET_AUX: usize = 4;
/// Offset of the status byte, relative to the packet-start byte.
pub const OFFSET_STATUS: usize = 5;
/// Offset of the odd-byte count, relative to the packet-start byte.
pub const OFFSET_ODDCNT: usize = 6;
/// Offset of the 7-byte group count, relative to the packet-start byte.
pub const OFFSET_GRPCNT: usize = 7;
/// Offset of the command code, relative to the packet-start byte.
///
/// Only meaningful for command packets (see [`COMMAND_PACKET_TYPES`]).
pub const OFFSET_COMMAND: usize = 8;

/// Packet type values that carry a command code.
pub const COMMAND_PACKET_TYPES: [u8; 2] = [0x80, 0x85];

/// Phase-line nibble asserted by the host to enable a SmartPort device.
pub const PHASE_ENABLE: u8 = 0b1011;

/// Alternate enable nibble seen on some host controllers.
pub const PHASE_ENABLE_ALT: u8 = 0b1010;

/// Phase-line nibble used by the host to reset the SmartPort chain.
pub const PHASE_RESET: u8 = 0b0101;

/// Default time to wait for `_wrreq` to go low after the enable pattern, in microseconds.
pub const REQUEST_TIMEOUT_US: u32 = 50_000;

/// Default length of the wrdata activity check window, in microseconds.
pub const ACTIVITY_WINDOW_US: u32 = 2_000;

/// Default maximum duration of the byte capture phase, in microseconds.
pub const CAPTURE_TIMEOUT_US: u32 = 10_000;

/// Default time the probe waits for the host to release the drive, in microseconds.
///
/// Some host controllers leave the drive enabled after a "no device connected" result.
pub const RELEASE_TIMEOUT_US: u32 = 3_000_000;

/// Default poll interval while waiting for the drive to be released, in microseconds.
pub const RELEASE_POLL_US: u32 = 10_000;

/// Default hold-off before re-arming after a completed command, in microseconds.
pub const REARM_HOLDOFF_US: u32 = 500_000;

/// Default hold-off after the drive is deselected while a command was active, in microseconds.
pub const DESELECT_HOLDOFF_US: u32 = 100_000;

/// Default number of samples in a signal trace.
pub const TRACE_SAMPLES: u32 = 2_000;

/// Default spacing of signal trace samples, in microseconds.
pub const TRACE_INTERVAL_US: u32 = 2;

/// Number of line changes a signal trace keeps.
pub const TRACE_CHANGES: usize = 10;

/// Number of leading wrdata levels a signal trace keeps.
pub const TRACE_PREVIEW: usize = 32;
