//! Capture session state machine.
//!
//! This module provides [`CaptureController`], which turns one host write
//! request into a bounded byte capture, and [`CaptureSession`], the owned
//! buffer a session fills.
//!
//! ## States
//!
//! ```text
//! Idle ──arm()──▶ WaitForRequest ──_wrreq low──▶ ActivityCheck ──▶ Capturing
//!                       │                                              │
//!                       └──timeout──▶ Done(Timeout(Request))           ├─▶ Done(Full)
//!                                                                      ├─▶ Done(Timeout(Capture))
//!                                                                      └─▶ Done(Deselected)
//! ```
//!
//! `Done` is terminal for the session. The next [`run`](CaptureController::run)
//! clears the session buffer before waiting again.
//!
//! ## Timing
//!
//! `ActivityCheck` and `Capturing` execute back to back inside one
//! [`capture_window`](crate::timer::capture_window). No logging happens inside
//! the window; the controller reports once the session is `Done`.
//!
//! ## Outcomes
//!
//! Timeouts and deselection are ordinary results reported as [`Termination`],
//! never errors. The only lines touched during a session are reads.

use embedded_hal::delay::DelayNs;
use heapless::Vec;

use crate::bus::{Line, LineSnapshot, SignalBus, enable_condition, is_asserted_low};
use crate::consts::{
    ACTIVITY_WINDOW_US, BIT_CELL_US, CAPTURE_SIZE, CAPTURE_TIMEOUT_US, REQUEST_TIMEOUT_US,
};
use crate::handshake::HandshakeSignaler;
use crate::packet::{Analysis, analyze};
use crate::sampler::{ByteAssembler, sample};
use crate::timer::{Clock, Timebase, capture_window, us_to_ns};
use crate::trace::{SignalTrace, TraceConfig};

/// Fixed-capacity capture storage.
pub type CaptureBuffer = Vec<u8, CAPTURE_SIZE>;

/// Session timing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct CaptureConfig {
    /// Bit cell duration in microseconds.
    pub bit_cell_us: u32,
    /// How long to wait for `_wrreq` after arming.
    pub request_timeout_us: u32,
    /// Length of the wrdata activity check.
    pub activity_window_us: u32,
    /// Maximum duration of the byte capture.
    pub capture_timeout_us: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            bit_cell_us: BIT_CELL_US,
            request_timeout_us: REQUEST_TIMEOUT_US,
            activity_window_us: ACTIVITY_WINDOW_US,
            capture_timeout_us: CAPTURE_TIMEOUT_US,
        }
    }
}

/// Which wait ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum TimeoutStage {
    /// `_wrreq` never went low.
    Request,
    /// The capture ran past its time budget.
    Capture,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Termination {
    /// The buffer reached capacity.
    Full,
    /// A timeout expired.
    Timeout(TimeoutStage),
    /// The enable condition dropped mid-capture.
    Deselected,
}

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum CaptureState {
    /// Not armed.
    #[default]
    Idle,
    /// Armed, waiting for `_wrreq` to go low.
    WaitForRequest,
    /// Measuring wrdata activity.
    ActivityCheck,
    /// Assembling bytes into the session buffer.
    Capturing,
    /// Session finished.
    Done(Termination),
}

/// wrdata statistics from the activity check window.
///
/// Diagnostic only; the session captures regardless of what it shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct ActivityReport {
    /// Samples taken.
    pub samples: u32,
    /// Samples that read high.
    pub high: u32,
    /// Level changes between consecutive samples.
    pub transitions: u32,
}

impl ActivityReport {
    /// Share of high samples, in percent, rounded to one decimal.
    pub fn high_percent(&self) -> f32 {
        if self.samples == 0 {
            return 0.0;
        }
        libm::roundf(1000.0 * self.high as f32 / self.samples as f32) / 10.0
    }

    /// Whether wrdata never changed level.
    pub fn is_silent(&self) -> bool {
        self.transitions == 0
    }

    fn record(&mut self, level: bool, last: bool) {
        self.samples += 1;
        if level {
            self.high += 1;
        }
        if level != last {
            self.transitions += 1;
        }
    }
}

/// One capture attempt's data.
///
/// Owned by the caller and lent to the controller for the duration of
/// [`CaptureController::run`]; read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct CaptureSession {
    buffer: CaptureBuffer,
    activity: Option<ActivityReport>,
    snapshot: Option<LineSnapshot>,
    termination: Option<Termination>,
}

impl CaptureSession {
    /// Creates an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all data from a previous run.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.activity = None;
        self.snapshot = None;
        self.termination = None;
    }

    /// Captured bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Number of captured bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether the buffer reached capacity.
    pub fn is_full(&self) -> bool {
        self.buffer.is_full()
    }

    /// Activity check result, if the session got that far.
    pub fn activity(&self) -> Option<&ActivityReport> {
        self.activity.as_ref()
    }

    /// Line levels recorded on a request timeout or a silent wrdata line.
    pub fn snapshot(&self) -> Option<&LineSnapshot> {
        self.snapshot.as_ref()
    }

    /// How the last run ended.
    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    /// Runs sync search and header decoding over the captured bytes.
    pub fn analyze(&self) -> Analysis<'_> {
        analyze(&self.buffer)
    }

    /// Appends a byte. Callers check [`is_full`](Self::is_full) first.
    fn push(&mut self, byte: u8) {
        let _ = self.buffer.push(byte);
    }
}

/// Drives one capture session at a time over a [`SignalBus`].
///
/// ## Example
///
/// ```rust
/// use smartport_probe::bus::Line;
/// use smartport_probe::capture::{CaptureConfig, CaptureController, CaptureSession, Termination};
/// use smartport_probe::sim::{SimBus, SimClock, SimDelay, SimTime, Waveform};
///
/// let time = SimTime::new();
/// let bus = SimBus::new(&time)
///     .with_line(Line::WrReq, Waveform::Constant(false))
///     .with_line(Line::Enable1, Waveform::Constant(false));
/// let mut controller = CaptureController::new(
///     bus,
///     SimClock::new(&time),
///     SimDelay::new(&time),
///     CaptureConfig::default(),
/// );
///
/// let mut session = CaptureSession::new();
/// controller.arm();
/// assert_eq!(controller.run(&mut session), Termination::Full);
/// assert_eq!(session.len(), 128);
/// ```
#[derive(Debug)]
pub struct CaptureController<B, C, D> {
    /// Adapter lines.
    pub bus: B,
    /// Clock and delay.
    pub timebase: Timebase<C, D>,
    assembler: ByteAssembler,
    config: CaptureConfig,
    state: CaptureState,
}

impl<B, C, D> CaptureController<B, C, D>
where
    B: SignalBus,
    C: Clock,
    D: DelayNs,
{
    /// Creates an idle controller.
    pub fn new(bus: B, clock: C, delay: D, config: CaptureConfig) -> Self {
        Self {
            bus,
            timebase: Timebase::new(clock, delay),
            assembler: ByteAssembler::new(Line::WrData, config.bit_cell_us),
            config,
            state: CaptureState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Session timing in use.
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Arms the controller: the next [`run`](Self::run) waits for a write request.
    ///
    /// Called once the enable pattern has been seen on the phase lines.
    pub fn arm(&mut self) {
        self.state = CaptureState::WaitForRequest;
    }

    /// Runs a session to completion and returns why it ended.
    ///
    /// Arms first if the controller is not already armed. The session buffer is
    /// cleared before waiting for the request.
    pub fn run(&mut self, session: &mut CaptureSession) -> Termination {
        if self.state != CaptureState::WaitForRequest {
            self.arm();
        }
        session.reset();

        let termination = loop {
            match self.state {
                CaptureState::Idle => self.arm(),
                CaptureState::WaitForRequest => self.state = self.wait_for_request(session),
                CaptureState::ActivityCheck | CaptureState::Capturing => {
                    let next = capture_window(|| self.capture(session));
                    self.state = next;
                }
                CaptureState::Done(termination) => break termination,
            }
        };
        session.termination = Some(termination);
        self.report(session, termination);
        termination
    }

    /// Records a [`SignalTrace`] inside the capture window.
    ///
    /// Independent of the session state machine: the controller state is left
    /// as it was.
    pub fn trace(&mut self, config: &TraceConfig) -> SignalTrace {
        let trace =
            capture_window(|| SignalTrace::record(&mut self.bus, &mut self.timebase, config));
        trace!(
            "trace: {} samples, {} changes",
            trace.samples,
            trace.transitions
        );
        trace
    }

    /// Borrows the bus for handshake line driving.
    pub fn handshake(&mut self) -> HandshakeSignaler<'_, B> {
        HandshakeSignaler::new(&mut self.bus)
    }

    /// Releases the bus, clock and delay.
    pub fn release(self) -> (B, C, D) {
        (self.bus, self.timebase.clock, self.timebase.delay)
    }

    fn wait_for_request(&mut self, session: &mut CaptureSession) -> CaptureState {
        let start = self.timebase.now_ns();
        let timeout = us_to_ns(self.config.request_timeout_us);
        while self.timebase.elapsed_ns(start) < timeout {
            if is_asserted_low(&mut self.bus, Line::WrReq) {
                return CaptureState::ActivityCheck;
            }
        }
        session.snapshot = Some(LineSnapshot::capture(&mut self.bus));
        CaptureState::Done(Termination::Timeout(TimeoutStage::Request))
    }

    /// Activity check followed by byte capture. Runs inside the capture window.
    fn capture(&mut self, session: &mut CaptureSession) -> CaptureState {
        if self.state == CaptureState::ActivityCheck {
            let activity = self.check_activity();
            if activity.is_silent() {
                session.snapshot = Some(LineSnapshot::capture(&mut self.bus));
            }
            session.activity = Some(activity);
            self.state = CaptureState::Capturing;
        }
        self.capture_bytes(session)
    }

    fn check_activity(&mut self) -> ActivityReport {
        let start = self.timebase.now_ns();
        let window = us_to_ns(self.config.activity_window_us);
        let mut last = sample(&mut self.bus, Line::WrData);
        let mut report = ActivityReport::default();
        report.record(last, last);

        while self.timebase.elapsed_ns(start) < window {
            let level = sample(&mut self.bus, Line::WrData);
            report.record(level, last);
            last = level;
        }
        report
    }

    fn capture_bytes(&mut self, session: &mut CaptureSession) -> CaptureState {
        let start = self.timebase.now_ns();
        let timeout = us_to_ns(self.config.capture_timeout_us);
        self.assembler.align(start);

        loop {
            if session.is_full() {
                return CaptureState::Done(Termination::Full);
            }
            if self.timebase.elapsed_ns(start) > timeout {
                return CaptureState::Done(Termination::Timeout(TimeoutStage::Capture));
            }
            let byte = self.assembler.read_byte(&mut self.bus, &mut self.timebase);
            session.push(byte);
            if !enable_condition(&mut self.bus) {
                return CaptureState::Done(Termination::Deselected);
            }
        }
    }

    fn report(&self, session: &CaptureSession, termination: Termination) {
        debug!("capture done: {:?}, {} bytes", termination, session.len());
        if let Some(activity) = session.activity() {
            trace!(
                "wrdata: {} samples, {} high, {} transitions",
                activity.samples,
                activity.high,
                activity.transitions
            );
            if activity.is_silent() {
                warn!("no transitions on wrdata");
            }
        }
        if let Some(lines) = session.snapshot() {
            debug!(
                "lines: wrdata={} _enbl1={} _enbl2={} _wrreq={}",
                lines.wrdata,
                lines.enable1,
                lines.enable2,
                lines.wrreq
            );
        }
    }
}
