//! Deterministic simulation of the adapter lines.
//!
//! The simulator stands in for the hardware when the capture engine runs on
//! a host: a shared [`SimTime`] is advanced by [`SimDelay`] and by each line
//! read, [`SimClock`] reports it, and [`SimBus`] answers reads from per-line
//! [`Waveform`]s evaluated at the current simulated instant.
//!
//! Nothing here allocates, so the simulator also works on target for
//! bring-up without the adapter board connected.
//!
//! ## Example
//!
//! ```rust
//! use smartport_probe::bus::{Line, SignalBus};
//! use smartport_probe::sim::{SimBus, SimTime, Waveform};
//!
//! let time = SimTime::new();
//! let mut bus = SimBus::new(&time).with_line(
//!     Line::WrReq,
//!     Waveform::Step { at_ns: 1_000, before: true, after: false },
//! );
//! assert_eq!(bus.read(Line::WrReq), Ok(true));
//! time.advance_ns(1_000);
//! assert_eq!(bus.read(Line::WrReq), Ok(false));
//! ```

use core::cell::Cell;

use embedded_hal::delay::DelayNs;

use crate::bus::{BusError, Direction, Line, SignalBus};
use crate::timer::Clock;

/// Default simulated cost of one line read, in nanoseconds.
pub const DEFAULT_READ_COST_NS: u64 = 100;

/// Shared simulated time, in nanoseconds.
#[derive(Debug, Default)]
pub struct SimTime {
    now_ns: Cell<u64>,
}

impl SimTime {
    /// Starts the simulation at t = 0.
    pub const fn new() -> Self {
        Self {
            now_ns: Cell::new(0),
        }
    }

    /// Current simulated time.
    pub fn now_ns(&self) -> u64 {
        self.now_ns.get()
    }

    /// Moves simulated time forward.
    pub fn advance_ns(&self, ns: u64) {
        self.now_ns.set(self.now_ns.get().saturating_add(ns));
    }
}

/// [`Clock`] reading a [`SimTime`].
#[derive(Debug, Clone, Copy)]
pub struct SimClock<'a>(&'a SimTime);

impl<'a> SimClock<'a> {
    /// Creates a clock over `time`.
    pub fn new(time: &'a SimTime) -> Self {
        Self(time)
    }
}

impl Clock for SimClock<'_> {
    fn now_ns(&mut self) -> u64 {
        self.0.now_ns()
    }
}

/// `DelayNs` that advances a [`SimTime`] instead of spinning.
#[derive(Debug, Clone, Copy)]
pub struct SimDelay<'a>(&'a SimTime);

impl<'a> SimDelay<'a> {
    /// Creates a delay over `time`.
    pub fn new(time: &'a SimTime) -> Self {
        Self(time)
    }
}

impl DelayNs for SimDelay<'_> {
    fn delay_ns(&mut self, ns: u32) {
        self.0.advance_ns(u64::from(ns));
    }
}

/// Level of a simulated line as a function of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform<'a> {
    /// Held at one level.
    Constant(bool),
    /// Switches once at `at_ns`.
    Step {
        /// Switch instant.
        at_ns: u64,
        /// Level before `at_ns`.
        before: bool,
        /// Level from `at_ns` on.
        after: bool,
    },
    /// Serial bytes, MSB first, one bit per `cell_ns`, starting at `start_ns`.
    Bits {
        /// Start of the first bit cell.
        start_ns: u64,
        /// Bit cell duration.
        cell_ns: u64,
        /// Bytes to send.
        bytes: &'a [u8],
        /// Level before and after the bytes.
        idle: bool,
    },
}

impl Waveform<'_> {
    /// Level at `t_ns`.
    pub fn level_at(&self, t_ns: u64) -> bool {
        match *self {
            Waveform::Constant(level) => level,
            Waveform::Step {
                at_ns,
                before,
                after,
            } => {
                if t_ns < at_ns {
                    before
                } else {
                    after
                }
            }
            Waveform::Bits {
                start_ns,
                cell_ns,
                bytes,
                idle,
            } => {
                if t_ns < start_ns || cell_ns == 0 {
                    return idle;
                }
                let bit = (t_ns - start_ns) / cell_ns;
                let index = usize::try_from(bit / 8).unwrap_or(usize::MAX);
                match bytes.get(index) {
                    Some(byte) => byte & (0x80 >> (bit % 8)) != 0,
                    None => idle,
                }
            }
        }
    }
}

/// Simulated adapter lines.
///
/// Every line starts as `Constant(true)`: phases all on, enables and `_wrreq`
/// deasserted, wrdata idle high. Output lines read back the last level written
/// to them.
#[derive(Debug)]
pub struct SimBus<'a> {
    time: &'a SimTime,
    waveforms: [Waveform<'a>; Line::COUNT],
    driven: [Option<bool>; Line::COUNT],
    directions: [Direction; Line::COUNT],
    read_cost_ns: u64,
    writes: u32,
}

impl<'a> SimBus<'a> {
    /// Creates a bus with every line idle high.
    pub fn new(time: &'a SimTime) -> Self {
        let mut directions = [Direction::Input; Line::COUNT];
        directions[Line::RdData.index()] = Direction::Output;
        directions[Line::Ack.index()] = Direction::InputOutput;
        Self {
            time,
            waveforms: [Waveform::Constant(true); Line::COUNT],
            driven: [None; Line::COUNT],
            directions,
            read_cost_ns: DEFAULT_READ_COST_NS,
            writes: 0,
        }
    }

    /// Replaces the waveform of `line`.
    pub fn with_line(mut self, line: Line, waveform: Waveform<'a>) -> Self {
        self.waveforms[line.index()] = waveform;
        self
    }

    /// Sets the four phase lines from a nibble (`Phase3` is bit 3).
    pub fn with_phases(mut self, nibble: u8) -> Self {
        for (bit, line) in Line::PHASES.iter().enumerate() {
            self.waveforms[line.index()] = Waveform::Constant(nibble & (1 << bit) != 0);
        }
        self
    }

    /// Sets how far simulated time moves on each read.
    ///
    /// A zero cost makes sampling instants exact but any loop that polls a
    /// line without delaying will never see time pass.
    pub fn with_read_cost(mut self, ns: u64) -> Self {
        self.read_cost_ns = ns;
        self
    }

    /// Level last written to `line`, if any.
    pub fn driven(&self, line: Line) -> Option<bool> {
        self.driven[line.index()]
    }

    /// Current mode of `line`.
    pub fn direction(&self, line: Line) -> Direction {
        self.directions[line.index()]
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> u32 {
        self.writes
    }
}

impl SignalBus for SimBus<'_> {
    type Error = BusError;

    fn read(&mut self, line: Line) -> Result<bool, BusError> {
        let t = self.time.now_ns();
        let level = self.driven[line.index()]
            .unwrap_or_else(|| self.waveforms[line.index()].level_at(t));
        self.time.advance_ns(self.read_cost_ns);
        Ok(level)
    }

    fn write(&mut self, line: Line, level: bool) -> Result<(), BusError> {
        if !line.is_output() {
            return Err(BusError::InputOnly(line));
        }
        self.driven[line.index()] = Some(level);
        self.writes += 1;
        Ok(())
    }

    fn set_direction(&mut self, line: Line, direction: Direction) -> Result<(), BusError> {
        let allowed = match line {
            Line::Ack => true,
            Line::RdData => direction == Direction::Output,
            _ => direction == Direction::Input,
        };
        if !allowed {
            return Err(BusError::UnsupportedDirection { line, direction });
        }
        self.directions[line.index()] = direction;
        Ok(())
    }
}
