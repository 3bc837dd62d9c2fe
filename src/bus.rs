//! Hardware capability layer for the SmartPort adapter lines.
//!
//! The capture engine never touches pins directly. It talks to a [`SignalBus`],
//! a minimal line-indexed capability (`read`, `write`, `set_direction`) that can be
//! backed by real `embedded-hal` pins ([`PinBus`]) or by the deterministic
//! simulator in [`crate::sim`].
//!
//! ## Lines
//!
//! | Line      | Direction     | Polarity    | Notes                                   |
//! |-----------|---------------|-------------|-----------------------------------------|
//! | `Phase0-3`| input         | active-high | stepper phases, carry the enable nibble |
//! | `WrData`  | input         | -           | serial data from the host               |
//! | `RdData`  | output        | -           | idles high                              |
//! | `Ack`     | bidirectional | active-low  | acknowledge / sense                     |
//! | `Enable1` | input         | active-low  | drive 1 enable                          |
//! | `WrReq`   | input         | active-low  | host write request                      |
//! | `Enable2` | input         | active-low  | drive 2 enable                          |
//! | `Debug`   | input         | -           | reserved, optional (FPGA Q7 tap)        |
//!
//! Polarity is preserved exactly as wired; helpers such as [`enable_condition`]
//! apply the active-low interpretation.

use embedded_hal::digital::{Error as _, ErrorKind, InputPin, OutputPin};
use thiserror::Error;

use crate::consts::{PHASE_ENABLE, PHASE_ENABLE_ALT, PHASE_RESET};

/// A single adapter line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Line {
    /// Stepper phase 0.
    Phase0,
    /// Stepper phase 1.
    Phase1,
    /// Stepper phase 2.
    Phase2,
    /// Stepper phase 3.
    Phase3,
    /// Write data from the host.
    WrData,
    /// Read data towards the host.
    RdData,
    /// Acknowledge / sense line.
    Ack,
    /// Drive 1 enable (active-low).
    Enable1,
    /// Write request (active-low).
    WrReq,
    /// Drive 2 enable (active-low).
    Enable2,
    /// Reserved debug input.
    ///
    /// Intended for packet-boundary disambiguation once the extra adapter wire
    /// is fitted. Nothing in the decode path depends on it.
    Debug,
}

impl Line {
    /// Number of distinct lines.
    pub const COUNT: usize = 11;

    /// All lines, in index order.
    pub const ALL: [Line; Line::COUNT] = [
        Line::Phase0,
        Line::Phase1,
        Line::Phase2,
        Line::Phase3,
        Line::WrData,
        Line::RdData,
        Line::Ack,
        Line::Enable1,
        Line::WrReq,
        Line::Enable2,
        Line::Debug,
    ];

    /// The four phase lines, least significant first.
    pub const PHASES: [Line; 4] = [Line::Phase0, Line::Phase1, Line::Phase2, Line::Phase3];

    /// Stable index of this line, usable for per-line tables.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Whether this line is driven by the probe.
    pub const fn is_output(self) -> bool {
        matches!(self, Line::RdData | Line::Ack)
    }
}

/// Electrical mode of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Direction {
    /// High-impedance input.
    #[default]
    Input,
    /// Push-pull output.
    Output,
    /// Output with read-back enabled.
    InputOutput,
}

/// Faults reported by bus implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum BusError {
    /// The line has no pin attached (only the optional debug input).
    #[error("line {0:?} is not wired")]
    NotWired(Line),
    /// A write was attempted on an input-only line.
    #[error("line {0:?} is input-only")]
    InputOnly(Line),
    /// The line cannot be switched into the requested mode.
    #[error("line {line:?} cannot be placed in {direction:?} mode")]
    UnsupportedDirection {
        /// Line the request was made for.
        line: Line,
        /// Requested mode.
        direction: Direction,
    },
    /// The underlying pin reported an error.
    #[error("pin fault on {line:?}: {kind:?}")]
    Pin {
        /// Line whose pin failed.
        line: Line,
        /// Error kind reported by the HAL.
        kind: ErrorKind,
    },
}

/// Minimal line-indexed hardware capability.
///
/// Implementations must not block or yield inside `read`: it is called from
/// the capture window at sub-bit-cell cadence.
pub trait SignalBus {
    /// Error type for hardware faults.
    type Error: core::fmt::Debug;

    /// Reads the current level of `line` (`true` = high).
    fn read(&mut self, line: Line) -> Result<bool, Self::Error>;

    /// Drives `line` to `level` (`true` = high).
    fn write(&mut self, line: Line, level: bool) -> Result<(), Self::Error>;

    /// Switches `line` into `direction`.
    fn set_direction(&mut self, line: Line, direction: Direction) -> Result<(), Self::Error>;
}

impl<B: SignalBus + ?Sized> SignalBus for &mut B {
    type Error = B::Error;

    fn read(&mut self, line: Line) -> Result<bool, Self::Error> {
        (**self).read(line)
    }

    fn write(&mut self, line: Line, level: bool) -> Result<(), Self::Error> {
        (**self).write(line, level)
    }

    fn set_direction(&mut self, line: Line, direction: Direction) -> Result<(), Self::Error> {
        (**self).set_direction(line, direction)
    }
}

/// Returns `true` only if `line` reads low without error.
///
/// A faulty read is never taken as an assertion of an active-low line.
pub fn is_asserted_low<B: SignalBus>(bus: &mut B, line: Line) -> bool {
    matches!(bus.read(line), Ok(false))
}

/// Evaluates the enable condition: either active-low enable line asserted.
pub fn enable_condition<B: SignalBus>(bus: &mut B) -> bool {
    is_asserted_low(bus, Line::Enable1) || is_asserted_low(bus, Line::Enable2)
}

/// Reads the four phase lines into a nibble (`Phase3` is bit 3).
pub fn read_phases<B: SignalBus>(bus: &mut B) -> u8 {
    Line::PHASES
        .iter()
        .enumerate()
        .fold(0u8, |acc, (bit, &line)| {
            acc | (u8::from(bus.read(line).unwrap_or(false)) << bit)
        })
}

/// Classification of the phase-line nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum PhasePattern {
    /// `0b1011`: SmartPort enable.
    Enable,
    /// `0b1010`: alternate SmartPort enable.
    EnableAlt,
    /// `0b0101`: bus reset.
    Reset,
    /// All phases off.
    AllOff,
    /// All phases on.
    AllOn,
    /// Any other combination.
    Other(u8),
}

impl PhasePattern {
    /// Whether the host is addressing a SmartPort device.
    pub const fn is_enable(self) -> bool {
        matches!(self, PhasePattern::Enable | PhasePattern::EnableAlt)
    }

    /// The raw nibble this pattern was built from.
    pub const fn nibble(self) -> u8 {
        match self {
            PhasePattern::Enable => PHASE_ENABLE,
            PhasePattern::EnableAlt => PHASE_ENABLE_ALT,
            PhasePattern::Reset => PHASE_RESET,
            PhasePattern::AllOff => 0b0000,
            PhasePattern::AllOn => 0b1111,
            PhasePattern::Other(n) => n,
        }
    }
}

impl From<u8> for PhasePattern {
    fn from(nibble: u8) -> Self {
        match nibble & 0x0F {
            PHASE_ENABLE => PhasePattern::Enable,
            PHASE_ENABLE_ALT => PhasePattern::EnableAlt,
            PHASE_RESET => PhasePattern::Reset,
            0b0000 => PhasePattern::AllOff,
            0b1111 => PhasePattern::AllOn,
            n => PhasePattern::Other(n),
        }
    }
}

/// Raw levels of the request-path lines at one instant.
///
/// Taken when a session gives up waiting for `_wrreq` or sees a silent
/// wrdata line, to tell a stuck line from a timing problem. Also the unit of a
/// [`SignalTrace`](crate::trace::SignalTrace).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct LineSnapshot {
    /// `wrdata` level.
    pub wrdata: bool,
    /// `_enbl1` level.
    pub enable1: bool,
    /// `_enbl2` level.
    pub enable2: bool,
    /// `_wrreq` level.
    pub wrreq: bool,
}

impl LineSnapshot {
    /// Reads the four lines. Faulty reads are recorded as low.
    pub fn capture<B: SignalBus>(bus: &mut B) -> Self {
        let mut level = |line: Line| bus.read(line).unwrap_or(false);
        Self {
            wrdata: level(Line::WrData),
            enable1: level(Line::Enable1),
            enable2: level(Line::Enable2),
            wrreq: level(Line::WrReq),
        }
    }
}

/// [`SignalBus`] over `embedded-hal` 1.0 pins.
///
/// Inputs share one pin type `IN` (typically the HAL's degraded input type),
/// `OUT` drives read-data and `ACK` is a flexible pin that can both drive and
/// read back the acknowledge/sense line.
///
/// `embedded-hal` has no runtime mode switching, so [`set_direction`](SignalBus::set_direction)
/// only validates that the request matches how the HAL configured each pin.
#[derive(Debug)]
pub struct PinBus<IN, OUT, ACK> {
    /// Phase inputs, `Phase0` first.
    pub phases: [IN; 4],
    /// Write data input.
    pub wrdata: IN,
    /// `_enbl1` input.
    pub enable1: IN,
    /// `_enbl2` input.
    pub enable2: IN,
    /// `_wrreq` input.
    pub wrreq: IN,
    /// Optional debug input.
    pub debug: Option<IN>,
    /// Read data output.
    pub rddata: OUT,
    /// Acknowledge / sense pin.
    pub ack: ACK,
    ack_mode: Direction,
}

impl<IN, OUT, ACK> PinBus<IN, OUT, ACK>
where
    IN: InputPin,
    OUT: OutputPin,
    ACK: InputPin + OutputPin,
{
    /// Creates a bus from already-configured pins.
    ///
    /// # Arguments
    /// - `phases`: phase inputs, `Phase0` first
    /// - `wrdata`: write data input
    /// - `enables`: `_enbl1` and `_enbl2`
    /// - `wrreq`: write request input
    /// - `rddata`: read data output
    /// - `ack`: acknowledge / sense pin, configured for input and output
    pub fn new(
        phases: [IN; 4],
        wrdata: IN,
        enables: [IN; 2],
        wrreq: IN,
        rddata: OUT,
        ack: ACK,
    ) -> Self {
        let [enable1, enable2] = enables;
        Self {
            phases,
            wrdata,
            enable1,
            enable2,
            wrreq,
            debug: None,
            rddata,
            ack,
            ack_mode: Direction::InputOutput,
        }
    }

    /// Attaches the optional debug input.
    pub fn with_debug(mut self, debug: IN) -> Self {
        self.debug = Some(debug);
        self
    }

    /// Mode last requested for the acknowledge line.
    pub fn ack_mode(&self) -> Direction {
        self.ack_mode
    }

    fn input(&mut self, line: Line) -> Result<&mut IN, BusError> {
        match line {
            Line::Phase0 => Ok(&mut self.phases[0]),
            Line::Phase1 => Ok(&mut self.phases[1]),
            Line::Phase2 => Ok(&mut self.phases[2]),
            Line::Phase3 => Ok(&mut self.phases[3]),
            Line::WrData => Ok(&mut self.wrdata),
            Line::Enable1 => Ok(&mut self.enable1),
            Line::Enable2 => Ok(&mut self.enable2),
            Line::WrReq => Ok(&mut self.wrreq),
            Line::Debug => self.debug.as_mut().ok_or(BusError::NotWired(line)),
            Line::RdData | Line::Ack => Err(BusError::UnsupportedDirection {
                line,
                direction: Direction::Input,
            }),
        }
    }
}

impl<IN, OUT, ACK> SignalBus for PinBus<IN, OUT, ACK>
where
    IN: InputPin,
    OUT: OutputPin,
    ACK: InputPin + OutputPin,
{
    type Error = BusError;

    fn read(&mut self, line: Line) -> Result<bool, BusError> {
        let fault = |e: ErrorKind| BusError::Pin { line, kind: e };
        match line {
            Line::Ack => self.ack.is_high().map_err(|e| fault(e.kind())),
            _ => self.input(line)?.is_high().map_err(|e| fault(e.kind())),
        }
    }

    fn write(&mut self, line: Line, level: bool) -> Result<(), BusError> {
        let fault = |e: ErrorKind| BusError::Pin { line, kind: e };
        match line {
            Line::RdData if level => self.rddata.set_high().map_err(|e| fault(e.kind())),
            Line::RdData => self.rddata.set_low().map_err(|e| fault(e.kind())),
            Line::Ack if level => self.ack.set_high().map_err(|e| fault(e.kind())),
            Line::Ack => self.ack.set_low().map_err(|e| fault(e.kind())),
            _ => Err(BusError::InputOnly(line)),
        }
    }

    fn set_direction(&mut self, line: Line, direction: Direction) -> Result<(), BusError> {
        match (line, direction) {
            (Line::Ack, Direction::Output | Direction::InputOutput) => {
                self.ack_mode = direction;
                Ok(())
            }
            (Line::RdData, Direction::Output) => Ok(()),
            (Line::Debug, Direction::Input) if self.debug.is_none() => {
                Err(BusError::NotWired(line))
            }
            (l, Direction::Input) if !l.is_output() => Ok(()),
            _ => Err(BusError::UnsupportedDirection { line, direction }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };

    fn quiet() -> PinMock {
        PinMock::new(&[])
    }

    fn reads(states: &[PinState]) -> PinMock {
        PinMock::new(
            &states
                .iter()
                .map(|&s| PinTransaction::get(s))
                .collect::<Vec<_>>(),
        )
    }

    fn done(bus: &mut PinBus<PinMock, PinMock, PinMock>) {
        for pin in bus.phases.iter_mut() {
            pin.done();
        }
        bus.wrdata.done();
        bus.enable1.done();
        bus.enable2.done();
        bus.wrreq.done();
        if let Some(debug) = bus.debug.as_mut() {
            debug.done();
        }
        bus.rddata.done();
        bus.ack.done();
    }

    #[test]
    fn test_read_phases_builds_nibble() {
        use PinState::{High, Low};
        let mut bus = PinBus::new(
            [reads(&[High]), reads(&[High]), reads(&[Low]), reads(&[High])],
            quiet(),
            [quiet(), quiet()],
            quiet(),
            quiet(),
            quiet(),
        );

        let nibble = read_phases(&mut bus);
        assert_eq!(nibble, 0b1011);
        assert_eq!(PhasePattern::from(nibble), PhasePattern::Enable);
        done(&mut bus);
    }

    #[test]
    fn test_enable_condition_is_active_low_or() {
        let mut bus = PinBus::new(
            [quiet(), quiet(), quiet(), quiet()],
            quiet(),
            [
                reads(&[PinState::High, PinState::High]),
                reads(&[PinState::Low, PinState::High]),
            ],
            quiet(),
            quiet(),
            quiet(),
        );

        assert!(enable_condition(&mut bus));
        assert!(!enable_condition(&mut bus));
        done(&mut bus);
    }

    #[test]
    fn test_writes_rejected_on_inputs() {
        let mut bus = PinBus::new(
            [quiet(), quiet(), quiet(), quiet()],
            quiet(),
            [quiet(), quiet()],
            quiet(),
            PinMock::new(&[PinTransaction::set(PinState::Low)]),
            quiet(),
        );

        assert_eq!(bus.write(Line::WrData, true), Err(BusError::InputOnly(Line::WrData)));
        assert_eq!(bus.write(Line::RdData, false), Ok(()));
        done(&mut bus);
    }

    #[test]
    fn test_debug_line_unwired_until_attached() {
        let mut bus = PinBus::new(
            [quiet(), quiet(), quiet(), quiet()],
            quiet(),
            [quiet(), quiet()],
            quiet(),
            quiet(),
            quiet(),
        );
        assert_eq!(bus.read(Line::Debug), Err(BusError::NotWired(Line::Debug)));
        assert_eq!(
            bus.set_direction(Line::Debug, Direction::Input),
            Err(BusError::NotWired(Line::Debug))
        );

        let mut bus = bus.with_debug(reads(&[PinState::High]));
        assert_eq!(bus.read(Line::Debug), Ok(true));
        done(&mut bus);
    }

    #[test]
    fn test_direction_validation() {
        let mut bus = PinBus::new(
            [quiet(), quiet(), quiet(), quiet()],
            quiet(),
            [quiet(), quiet()],
            quiet(),
            quiet(),
            quiet(),
        );

        assert_eq!(bus.ack_mode(), Direction::InputOutput);
        assert_eq!(bus.set_direction(Line::Ack, Direction::Output), Ok(()));
        assert_eq!(bus.ack_mode(), Direction::Output);
        assert_eq!(bus.set_direction(Line::WrReq, Direction::Input), Ok(()));
        assert_eq!(
            bus.set_direction(Line::WrReq, Direction::Output),
            Err(BusError::UnsupportedDirection {
                line: Line::WrReq,
                direction: Direction::Output
            })
        );
        assert!(bus.set_direction(Line::Ack, Direction::Input).is_err());
        done(&mut bus);
    }

    #[test]
    fn test_line_indices_are_dense() {
        for (i, line) in Line::ALL.iter().enumerate() {
            assert_eq!(line.index(), i);
        }
        let outputs = Line::ALL.iter().filter(|line| line.is_output()).count();
        assert_eq!(outputs, 2);
    }

    #[test]
    fn test_phase_pattern_classification() {
        assert_eq!(PhasePattern::from(0b1010), PhasePattern::EnableAlt);
        assert_eq!(PhasePattern::from(0b0101), PhasePattern::Reset);
        assert_eq!(PhasePattern::from(0b0000), PhasePattern::AllOff);
        assert_eq!(PhasePattern::from(0b1111), PhasePattern::AllOn);
        assert_eq!(PhasePattern::from(0b0110), PhasePattern::Other(0b0110));
        assert!(PhasePattern::EnableAlt.is_enable());
        assert!(!PhasePattern::Reset.is_enable());
        assert_eq!(PhasePattern::Other(0b0110).nibble(), 0b0110);
    }
}
