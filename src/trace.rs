//! Raw signal trace of the request-path lines.
//!
//! When a capture never decodes, the byte stream alone cannot say whether
//! `_wrreq` ever dropped or whether wrdata moved at all. A [`SignalTrace`]
//! samples wrdata, `_wrreq`, `_enbl1` and `_enbl2` together at a fixed
//! interval (2000 samples at 2 µs by default) right after the enable, and keeps
//! a fixed-size summary:
//!
//! - per-line counts (`_wrreq` low, wrdata high) and the number of changes
//! - the first [`TRACE_CHANGES`] changes with their sample index
//! - the first [`TRACE_PREVIEW`] wrdata levels
//! - the line levels after the trace, ACK included
//!
//! Nothing is stored per sample, so the trace fits on the stack regardless of
//! its length.

use embedded_hal::delay::DelayNs;
use heapless::Vec;

use crate::bus::{Line, LineSnapshot, SignalBus};
use crate::consts::{TRACE_CHANGES, TRACE_INTERVAL_US, TRACE_PREVIEW, TRACE_SAMPLES};
use crate::timer::{Clock, Timebase, us_to_ns};

/// Signal trace length and spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct TraceConfig {
    /// Number of samples.
    pub samples: u32,
    /// Spacing between samples in microseconds.
    pub interval_us: u32,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            samples: TRACE_SAMPLES,
            interval_us: TRACE_INTERVAL_US,
        }
    }
}

/// A sample whose levels differ from the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct SignalChange {
    /// Sample index, from 0.
    pub index: u32,
    /// Levels at that sample.
    pub lines: LineSnapshot,
}

/// Summary of one signal trace.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct SignalTrace {
    /// Samples taken.
    pub samples: u32,
    /// Samples with `_wrreq` low.
    pub wrreq_low: u32,
    /// Samples with wrdata high.
    pub wrdata_high: u32,
    /// Samples that differ from the previous one on any line.
    pub transitions: u32,
    /// Time from the first sample to the end of the last one.
    pub elapsed_ns: u64,
    /// Levels read once the trace finished.
    pub final_lines: LineSnapshot,
    /// ACK level read once the trace finished.
    pub ack: bool,
    changes: Vec<SignalChange, TRACE_CHANGES>,
    preview: Vec<bool, TRACE_PREVIEW>,
}

impl SignalTrace {
    /// Samples the request-path lines `config.samples` times.
    ///
    /// Samples sit on an absolute grid `config.interval_us` apart starting now.
    /// Blocks for the whole trace; wrap it in
    /// [`capture_window`](crate::timer::capture_window) to keep the spacing exact.
    pub fn record<B, C, D>(
        bus: &mut B,
        timebase: &mut Timebase<C, D>,
        config: &TraceConfig,
    ) -> Self
    where
        B: SignalBus,
        C: Clock,
        D: DelayNs,
    {
        let mut trace = Self::default();
        let interval = us_to_ns(config.interval_us);
        let start = timebase.now_ns();
        let mut last = None;

        for index in 0..config.samples {
            timebase.wait_until(start + u64::from(index) * interval);
            let lines = LineSnapshot::capture(bus);
            trace.record_sample(index, lines, last);
            last = Some(lines);
        }

        trace.elapsed_ns = timebase.elapsed_ns(start);
        trace.final_lines = LineSnapshot::capture(bus);
        trace.ack = bus.read(Line::Ack).unwrap_or(false);
        trace
    }

    /// The first recorded changes, oldest first.
    pub fn changes(&self) -> &[SignalChange] {
        &self.changes
    }

    /// The first wrdata levels, oldest first.
    pub fn preview(&self) -> &[bool] {
        &self.preview
    }

    /// Whether `_wrreq` was seen low at any sample.
    pub fn saw_request(&self) -> bool {
        self.wrreq_low > 0
    }

    fn record_sample(&mut self, index: u32, lines: LineSnapshot, last: Option<LineSnapshot>) {
        self.samples += 1;
        if !lines.wrreq {
            self.wrreq_low += 1;
        }
        if lines.wrdata {
            self.wrdata_high += 1;
        }
        if !self.preview.is_full() {
            let _ = self.preview.push(lines.wrdata);
        }
        if last.is_some_and(|last| last != lines) {
            self.transitions += 1;
            if !self.changes.is_full() {
                let _ = self.changes.push(SignalChange { index, lines });
            }
        }
    }
}
