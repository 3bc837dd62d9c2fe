//! Arming loop around the capture controller.
//!
//! The probe watches the phase lines for the SmartPort enable pattern, runs
//! one capture session per command, then waits for the host to release the
//! drive before re-arming. It is the polling loop a firmware `main` sits in:
//!
//! ```rust,ignore
//! let mut probe = Probe::new(controller, ProbeConfig::default());
//! probe.start()?;
//! let mut session = CaptureSession::new();
//! loop {
//!     let termination = probe.next_command(&mut session);
//!     if let Some(command) = session.analyze().command() {
//!         // ...
//!     }
//! }
//! ```
//!
//! Host controllers may leave the drive enabled after a "no device connected"
//! result, so the release wait is bounded.
//!
//! [`next_trace`](Probe::next_trace) runs the same cycle with a raw
//! [`SignalTrace`] in place of the byte capture, for bring-up when nothing
//! decodes.

use core::convert::Infallible;

use embedded_hal::delay::DelayNs;

use crate::bus::{PhasePattern, SignalBus, enable_condition, read_phases};
use crate::capture::{CaptureController, CaptureSession, Termination};
use crate::fmt::Hex;
use crate::consts::{DESELECT_HOLDOFF_US, REARM_HOLDOFF_US, RELEASE_POLL_US, RELEASE_TIMEOUT_US};
use crate::packet::{Analysis, Decode};
use crate::timer::{Clock, us_to_ns};
use crate::trace::{SignalTrace, TraceConfig};

/// Captured bytes shown in the capture log line.
const LOGGED_BYTES: usize = 32;

/// Timing of the arming loop. All values in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct ProbeConfig {
    /// Longest wait for the host to release the drive after a command.
    pub release_timeout_us: u32,
    /// Poll interval while waiting for release.
    pub release_poll_us: u32,
    /// Pause before re-arming after a command.
    pub rearm_holdoff_us: u32,
    /// Pause after the drive is deselected while a command was active.
    pub deselect_holdoff_us: u32,
    /// Signal trace taken by [`Probe::record_trace`].
    pub trace: TraceConfig,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            release_timeout_us: RELEASE_TIMEOUT_US,
            release_poll_us: RELEASE_POLL_US,
            rearm_holdoff_us: REARM_HOLDOFF_US,
            deselect_holdoff_us: DESELECT_HOLDOFF_US,
            trace: TraceConfig::default(),
        }
    }
}

/// SmartPort command observer.
#[derive(Debug)]
pub struct Probe<B, C, D> {
    /// Capture engine.
    pub controller: CaptureController<B, C, D>,
    config: ProbeConfig,
    command_active: bool,
    last_phases: Option<u8>,
    commands: u32,
}

impl<B, C, D> Probe<B, C, D>
where
    B: SignalBus,
    C: Clock,
    D: DelayNs,
{
    /// Wraps a controller.
    pub fn new(controller: CaptureController<B, C, D>, config: ProbeConfig) -> Self {
        Self {
            controller,
            config,
            command_active: false,
            last_phases: None,
            commands: 0,
        }
    }

    /// Puts the handshake lines in their ready/idle state.
    pub fn start(&mut self) -> Result<(), B::Error> {
        self.controller.handshake().idle()?;
        info!("waiting for SmartPort activity");
        Ok(())
    }

    /// Whether a command has been detected and not yet released.
    pub fn is_command_active(&self) -> bool {
        self.command_active
    }

    /// Number of enable events observed.
    pub fn commands(&self) -> u32 {
        self.commands
    }

    /// Polls the phase and enable lines once.
    ///
    /// # Returns
    /// - `Ok(pattern)`: the drive was just enabled with a SmartPort enable pattern
    /// - `Err(WouldBlock)`: nothing new; call again
    ///
    /// A drive deselected while a command is marked active clears the mark and
    /// holds off briefly before returning.
    pub fn poll_enable(&mut self) -> nb::Result<PhasePattern, Infallible> {
        let phases = read_phases(&mut self.controller.bus);
        let enabled = enable_condition(&mut self.controller.bus);
        let pattern = PhasePattern::from(phases);

        if self.last_phases != Some(phases) {
            if !pattern.is_enable() {
                debug!("phase: {:?}", pattern);
            }
            self.last_phases = Some(phases);
        }

        if enabled && pattern.is_enable() {
            if !self.command_active {
                self.command_active = true;
                self.commands = self.commands.wrapping_add(1);
                return Ok(pattern);
            }
        } else if self.command_active && !enabled {
            self.command_active = false;
            self.controller
                .timebase
                .pause_us(self.config.deselect_holdoff_us);
        }
        Err(nb::Error::WouldBlock)
    }

    /// Blocks until [`poll_enable`](Self::poll_enable) reports an enable.
    pub fn wait_for_enable(&mut self) -> PhasePattern {
        match nb::block!(self.poll_enable()) {
            Ok(pattern) => pattern,
            Err(never) => match never {},
        }
    }

    /// Runs one capture session and logs what it found.
    pub fn observe(&mut self, session: &mut CaptureSession) -> Termination {
        self.controller.arm();
        let termination = self.controller.run(session);
        log_analysis(session);
        termination
    }

    /// Waits for the host to drop the enable condition, then re-arms.
    ///
    /// Returns `false` if the release timeout expired with the drive still enabled.
    /// Either way the command is cleared and the re-arm hold-off applied.
    pub fn wait_for_release(&mut self) -> bool {
        let start = self.controller.timebase.now_ns();
        let timeout = us_to_ns(self.config.release_timeout_us);
        let released = loop {
            if !enable_condition(&mut self.controller.bus) {
                break true;
            }
            if self.controller.timebase.elapsed_ns(start) >= timeout {
                break false;
            }
            self.controller
                .timebase
                .pause_us(self.config.release_poll_us);
        };

        self.command_active = false;
        self.controller
            .timebase
            .pause_us(self.config.rearm_holdoff_us);
        if !released {
            debug!("drive still enabled, re-arming anyway");
        }
        released
    }

    /// Enable, capture, release: one full command cycle.
    pub fn next_command(&mut self, session: &mut CaptureSession) -> Termination {
        let pattern = self.wait_for_enable();
        info!("SmartPort enable (phase={:?})", pattern);
        let termination = self.observe(session);
        let _ = self.wait_for_release();
        termination
    }

    /// Records a signal trace with the configured length and logs it.
    pub fn record_trace(&mut self) -> SignalTrace {
        let trace = self.controller.trace(&self.config.trace);
        log_trace(&trace);
        trace
    }

    /// Enable, trace, release: the command cycle with a signal trace instead
    /// of a byte capture.
    pub fn next_trace(&mut self) -> SignalTrace {
        let pattern = self.wait_for_enable();
        info!("SmartPort enable (phase={:?})", pattern);
        let trace = self.record_trace();
        let _ = self.wait_for_release();
        trace
    }
}

fn log_trace(trace: &SignalTrace) {
    info!(
        "trace: {} samples in {} ns",
        trace.samples,
        trace.elapsed_ns
    );
    for change in trace.changes() {
        debug!(
            "sig@{}: wrdata={} _wrreq={} _enbl1={} _enbl2={}",
            change.index,
            change.lines.wrdata,
            change.lines.wrreq,
            change.lines.enable1,
            change.lines.enable2
        );
    }
    info!(
        "_wrreq low {}/{}, wrdata high {}/{}, transitions {}",
        trace.wrreq_low,
        trace.samples,
        trace.wrdata_high,
        trace.samples,
        trace.transitions
    );
    debug!("wrdata: {:?}", trace.preview());
    let lines = trace.final_lines;
    debug!(
        "state: wrdata={} _enbl1={} _enbl2={} _wrreq={} ack={}",
        lines.wrdata,
        lines.enable1,
        lines.enable2,
        lines.wrreq,
        trace.ack
    );
}

fn log_analysis(session: &CaptureSession) {
    let bytes = session.bytes();
    debug!(
        "capture: {} bytes: {:?}",
        bytes.len(),
        Hex(&bytes[..bytes.len().min(LOGGED_BYTES)])
    );
    match session.analyze() {
        Analysis::Synced { offset, decode } => {
            info!("sync at offset {}", offset);
            match decode {
                Decode::NoPacketStart => debug!("no packet start after sync"),
                Decode::Insufficient(view) => {
                    debug!(
                        "packet start at {}, only {} header bytes",
                        view.start(),
                        view.header_fields()
                    )
                }
                Decode::Header(summary) => {
                    info!(
                        "packet dest={} src={} type={}",
                        summary.dest,
                        summary.src,
                        summary.packet_type
                    );
                    if let Some(command) = summary.command {
                        info!("command {} ({})", command.code(), command.name());
                    }
                }
            }
        }
        Analysis::NoSync(class) => warn!("no sync: {:?}", class),
    }
}
