//! Bit sampling and byte assembly for the SmartPort write-data line.
//!
//! SmartPort sends one bit every 4 µs, most significant bit first, with no
//! parity or framing inside a byte. The assembler samples the line once per bit
//! cell, at the centre of the cell, and shifts the levels into a byte.
//!
//! Sampling instants are laid on an absolute grid anchored at
//! [`ByteAssembler::align`]: bit `n` of the stream is sampled at
//! `origin + n * cell + cell / 2`. Time spent between bytes (the enable check,
//! buffer bookkeeping) is absorbed by the grid instead of shifting every later
//! sample.

use embedded_hal::delay::DelayNs;

use crate::bus::{Line, SignalBus};
use crate::consts::{BIT_CELL_US, BITS_PER_BYTE};
use crate::timer::{Clock, Timebase, us_to_ns};

/// Reads one line once.
///
/// No debouncing and no waiting; safe to call at any cadence inside a capture
/// window. A faulty read is taken as a low level.
#[inline]
pub fn sample<B: SignalBus>(bus: &mut B, line: Line) -> bool {
    bus.read(line).unwrap_or(false)
}

/// Assembles bytes from timed samples of one line.
#[derive(Debug, Clone)]
pub struct ByteAssembler {
    /// Sampled line.
    line: Line,

    /// Bit cell duration in nanoseconds.
    cell_ns: u64,

    /// Start of the next bit cell on the sampling grid.
    ///
    /// Advanced by eight cells per byte. If the caller falls more than half a
    /// cell behind it, the grid restarts at the current time.
    origin_ns: u64,
}

impl Default for ByteAssembler {
    fn default() -> Self {
        Self::new(Line::WrData, BIT_CELL_US)
    }
}

impl ByteAssembler {
    /// Creates an assembler sampling `line` with `bit_cell_us` cells.
    pub fn new(line: Line, bit_cell_us: u32) -> Self {
        Self {
            line,
            cell_ns: us_to_ns(bit_cell_us),
            origin_ns: 0,
        }
    }

    /// Restarts the sampling grid so the next bit cell begins at `now_ns`.
    pub fn align(&mut self, now_ns: u64) {
        self.origin_ns = now_ns;
    }

    /// Start of the next bit cell.
    pub fn origin_ns(&self) -> u64 {
        self.origin_ns
    }

    /// Duration of one assembled byte in nanoseconds.
    pub fn byte_ns(&self) -> u64 {
        self.cell_ns * u64::from(BITS_PER_BYTE)
    }

    /// Samples eight bit cells and returns them as a byte, MSB first.
    ///
    /// Blocks for exactly eight bit cells from the grid origin. Cannot fail;
    /// the result is only meaningful if nothing preempts the caller while it runs.
    pub fn read_byte<B, C, D>(&mut self, bus: &mut B, timebase: &mut Timebase<C, D>) -> u8
    where
        B: SignalBus,
        C: Clock,
        D: DelayNs,
    {
        let half = self.cell_ns / 2;
        let now = timebase.now_ns();
        if now > self.origin_ns + half {
            self.origin_ns = now;
        }

        let mut byte = 0u8;
        for bit in 0..BITS_PER_BYTE {
            timebase.wait_until(self.origin_ns + u64::from(bit) * self.cell_ns + half);
            byte = (byte << 1) | u8::from(sample(bus, self.line));
        }

        self.origin_ns += self.byte_ns();
        timebase.wait_until(self.origin_ns);
        byte
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimBus, SimClock, SimDelay, SimTime, Waveform};

    fn assemble(wave: Waveform<'_>, count: usize, out: &mut [u8]) -> u64 {
        let time = SimTime::new();
        let mut bus = SimBus::new(&time).with_line(Line::WrData, wave);
        let mut tb = Timebase::new(SimClock::new(&time), SimDelay::new(&time));
        let mut assembler = ByteAssembler::default();
        assembler.align(0);
        for slot in out.iter_mut().take(count) {
            *slot = assembler.read_byte(&mut bus, &mut tb);
        }
        time.now_ns()
    }

    #[test]
    fn test_constant_high_reads_ff() {
        let mut out = [0u8; 1];
        let _ = assemble(Waveform::Constant(true), 1, &mut out);
        assert_eq!(out[0], 0xFF);
    }

    #[test]
    fn test_constant_low_reads_00() {
        let mut out = [0xAAu8; 1];
        let _ = assemble(Waveform::Constant(false), 1, &mut out);
        assert_eq!(out[0], 0x00);
    }

    #[test]
    fn test_bit_pattern_is_msb_first() {
        let bytes = [0b1011_0010];
        let mut out = [0u8; 1];
        let _ = assemble(
            Waveform::Bits {
                start_ns: 0,
                cell_ns: 4_000,
                bytes: &bytes,
                idle: false,
            },
            1,
            &mut out,
        );
        assert_eq!(out[0], 0xB2);
    }

    #[test]
    fn test_byte_takes_eight_cells() {
        let mut out = [0u8; 3];
        let elapsed = assemble(Waveform::Constant(true), 3, &mut out);
        assert_eq!(elapsed, 3 * 32_000);
    }

    #[test]
    fn test_consecutive_bytes_stay_on_grid() {
        // Read overhead of 300 ns per sample would drift a chained-delay
        // sampler by 2.4 µs per byte; the grid keeps every sample centred.
        let bytes = [0xFF, 0x3F, 0xCF, 0xF3, 0xFC, 0xFF, 0xC3, 0x81];
        let time = SimTime::new();
        let mut bus = SimBus::new(&time).with_read_cost(300).with_line(
            Line::WrData,
            Waveform::Bits {
                start_ns: 0,
                cell_ns: 4_000,
                bytes: &bytes,
                idle: true,
            },
        );
        let mut tb = Timebase::new(SimClock::new(&time), SimDelay::new(&time));
        let mut assembler = ByteAssembler::default();
        assembler.align(0);

        for &expected in bytes.iter() {
            assert_eq!(assembler.read_byte(&mut bus, &mut tb), expected);
        }
    }

    #[test]
    fn test_late_caller_restarts_grid() {
        let time = SimTime::new();
        let mut bus = SimBus::new(&time);
        let mut tb = Timebase::new(SimClock::new(&time), SimDelay::new(&time));
        let mut assembler = ByteAssembler::default();
        assembler.align(0);

        time.advance_ns(100_000);
        let _ = assembler.read_byte(&mut bus, &mut tb);
        assert_eq!(assembler.origin_ns(), 132_000);
    }

    #[test]
    fn test_sample_reads_level() {
        let time = SimTime::new();
        let mut bus = SimBus::new(&time).with_line(Line::WrData, Waveform::Constant(false));
        assert!(!sample(&mut bus, Line::WrData));
        assert!(sample(&mut bus, Line::WrReq));
    }
}
