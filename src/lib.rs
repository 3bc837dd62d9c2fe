//! # smartport-probe
//!
//! A portable, no_std observer for the Apple II SmartPort disk bus, written for
//! FPGA adapters that expose the bus as a set of memory-mapped GPIO lines.
//!
//! The crate recovers raw bytes from the host's write-data line by bit-cell
//! sampling, locates the SmartPort sync marker, and decodes the command packet
//! header that follows. It drives only the handshake lines (ACK and read-data)
//! and never answers a command: it is a diagnostic probe, not an emulated drive.
//!
//! Building blocks:
//! - `embedded-hal` traits for digital I/O and delays
//! - a [`SignalBus`](bus::SignalBus) capability trait over the adapter lines
//! - a deadline-based byte assembler on an absolute sampling grid
//! - an interrupt-free capture window using `critical-section`
//! - a deterministic simulator ([`sim`]) for host-side testing
//!
//! ## Crate features
//! | Feature                     | Description |
//! |-----------------------------|-------------|
//! | `std`                       | Disables `#![no_std]` |
//! | `critical-window` (default) | Runs each capture inside `critical_section::with` |
//! | `defmt-0-3`                 | Uses `defmt` logging |
//! | `log`                       | Uses `log` logging |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use smartport_probe::bus::PinBus;
//! use smartport_probe::capture::{CaptureConfig, CaptureController, CaptureSession};
//! use smartport_probe::probe::{Probe, ProbeConfig};
//!
//! let bus = PinBus::new(phases, wrdata, [enable1, enable2], wrreq, rddata, ack);
//! let controller = CaptureController::new(bus, clock, delay, CaptureConfig::default());
//! let mut probe = Probe::new(controller, ProbeConfig::default());
//! probe.start()?;
//!
//! let mut session = CaptureSession::new();
//! loop {
//!     let _ = probe.next_command(&mut session);
//! }
//! ```
//!
//! `clock` is anything implementing [`Clock`](timer::Clock), including a
//! closure returning a free-running nanosecond count.
//!
//! ## Integration Notes
//!
//! - A bit cell is 4 µs; each byte is sampled at cell centres, MSB first
//! - Logging is held off until a capture ends, never inside the capture window
//! - One probe owns the bus; nothing is kept in statics
//!
//! --
//! Designed for `#![no_std]` use on soft-core CPUs with a free-running timer.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "critical-window")]
pub use critical_section;

pub use heapless;

#[macro_use]
mod fmt;

pub mod bus;
pub mod capture;
pub mod consts;
pub mod handshake;
pub mod packet;
pub mod probe;
pub mod sampler;
pub mod sim;
pub mod sync;
pub mod timer;
pub mod trace;
