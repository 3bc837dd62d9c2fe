//! Acknowledge/sense and read-data line driving.
//!
//! SmartPort devices signal readiness on the ACK (sense) line:
//! - ACK deasserted = HIGH (sense = 1): device ready to receive
//! - ACK asserted = LOW (sense = 0): device acknowledging
//!
//! Read-data idles HIGH. The lines are actively driven rather than left to a
//! pull-up, and every level change re-applies output mode in case the pin was
//! left as an input by earlier bring-up code.
//!
//! This module carries no bus timing: when to assert or release is decided by
//! the caller.

use crate::bus::{Direction, Line, SignalBus};

/// Drives the handshake lines of a [`SignalBus`].
#[derive(Debug)]
pub struct HandshakeSignaler<'a, B> {
    bus: &'a mut B,
}

impl<'a, B: SignalBus> HandshakeSignaler<'a, B> {
    /// Borrows `bus` for handshake operations.
    pub fn new(bus: &'a mut B) -> Self {
        Self { bus }
    }

    /// Drives ACK low (acknowledge).
    pub fn assert(&mut self) -> Result<(), B::Error> {
        self.drive(Line::Ack, false)
    }

    /// Drives ACK high (ready).
    pub fn deassert(&mut self) -> Result<(), B::Error> {
        self.drive(Line::Ack, true)
    }

    /// Applies the session-start defaults: ACK high (ready), read-data high (idle).
    pub fn idle(&mut self) -> Result<(), B::Error> {
        self.deassert()?;
        self.drive(Line::RdData, true)
    }

    /// Reads back the ACK line.
    pub fn sense(&mut self) -> Result<bool, B::Error> {
        self.bus.read(Line::Ack)
    }

    fn drive(&mut self, line: Line, level: bool) -> Result<(), B::Error> {
        self.bus.write(line, level)?;
        self.bus.set_direction(line, Direction::Output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusError, PinBus};
    use crate::sim::{SimBus, SimTime};
    use embedded_hal_mock::eh1::MockError;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };

    #[test]
    fn test_idle_drives_ack_and_rddata_high() {
        let time = SimTime::new();
        let mut bus = SimBus::new(&time);
        HandshakeSignaler::new(&mut bus).idle().unwrap();

        assert_eq!(bus.driven(Line::Ack), Some(true));
        assert_eq!(bus.driven(Line::RdData), Some(true));
        assert_eq!(bus.direction(Line::Ack), Direction::Output);
        assert_eq!(bus.direction(Line::RdData), Direction::Output);
    }

    #[test]
    fn test_assert_then_deassert() {
        let time = SimTime::new();
        let mut bus = SimBus::new(&time);
        let mut hs = HandshakeSignaler::new(&mut bus);

        hs.assert().unwrap();
        assert_eq!(hs.sense(), Ok(false));
        hs.deassert().unwrap();
        assert_eq!(hs.sense(), Ok(true));
        assert_eq!(bus.writes(), 2);
    }

    #[test]
    fn test_reasserts_output_mode() {
        let time = SimTime::new();
        let mut bus = SimBus::new(&time);
        bus.set_direction(Line::Ack, Direction::Input).unwrap();

        HandshakeSignaler::new(&mut bus).assert().unwrap();
        assert_eq!(bus.direction(Line::Ack), Direction::Output);
    }

    #[test]
    fn test_idle_on_hal_pins() {
        let quiet = || PinMock::new(&[]);
        let mut bus = PinBus::new(
            [quiet(), quiet(), quiet(), quiet()],
            quiet(),
            [quiet(), quiet()],
            quiet(),
            PinMock::new(&[PinTransaction::set(PinState::High)]),
            PinMock::new(&[
                PinTransaction::set(PinState::High),
                PinTransaction::set(PinState::Low),
            ]),
        );

        let mut hs = HandshakeSignaler::new(&mut bus);
        hs.idle().unwrap();
        hs.assert().unwrap();
        assert_eq!(bus.ack_mode(), Direction::Output);

        for pin in bus.phases.iter_mut() {
            pin.done();
        }
        bus.wrdata.done();
        bus.enable1.done();
        bus.enable2.done();
        bus.wrreq.done();
        bus.rddata.done();
        bus.ack.done();
    }

    #[test]
    fn test_pin_fault_propagates() {
        let quiet = || PinMock::new(&[]);
        let mut bus = PinBus::new(
            [quiet(), quiet(), quiet(), quiet()],
            quiet(),
            [quiet(), quiet()],
            quiet(),
            quiet(),
            PinMock::new(&[PinTransaction::set(PinState::High)
                .with_error(MockError::Io(std::io::ErrorKind::NotConnected))]),
        );

        let err = HandshakeSignaler::new(&mut bus).deassert().unwrap_err();
        assert!(matches!(err, BusError::Pin { line: Line::Ack, .. }));

        for pin in bus.phases.iter_mut() {
            pin.done();
        }
        bus.wrdata.done();
        bus.enable1.done();
        bus.enable2.done();
        bus.wrreq.done();
        bus.rddata.done();
        bus.ack.done();
    }
}
