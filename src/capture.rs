//! Capture state machine.
//!
//! Consumes the live event stream one event at a time and drives the three
//! capture cycles: CPI measurement, data collection and free-running logging.
//! Each cycle clears the log when armed, records events according to the
//! active state and produces a [`CycleOutcome`] when it completes. A command
//! arriving while a cycle is in progress aborts it and re-arms instead of
//! queuing.

use crate::event::{calibrate_timestamps, MouseEvent};
use crate::log::{EventLog, DEFAULT_CPI};
use crate::stats::{interval_statistics, IntervalMode, StatisticsRecord};

/// Distance the operator is instructed to move during a Measure cycle.
pub const REFERENCE_DISTANCE_CM: f64 = 10.0;

const CM_PER_INCH: f64 = 2.54;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    MeasureWait,
    Measuring,
    CollectWait,
    Collecting,
    Logging,
}

/// Operator commands dispatched to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Measure,
    Collect,
    ToggleLog,
}

/// Summary of a completed Collect cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectSummary {
    pub events: usize,
    /// Net displacement, signed sums of the raw deltas.
    pub net_x: i64,
    pub net_y: i64,
    pub net_x_cm: f64,
    pub net_y_cm: f64,
    /// Total path length over per-event deltas, in counts.
    pub path_counts: f64,
    pub path_cm: f64,
}

/// What a state transition produced, surfaced to the operator shell.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// A cycle was armed and is waiting for input.
    Armed(CaptureState),
    /// Measure cycle finished; CPI was written back into the log.
    Measured { cpi: f64 },
    /// Collect cycle finished.
    Collected { summary: CollectSummary, stats: StatisticsRecord },
    /// Logging cycle finished.
    LogStopped { stats: StatisticsRecord },
}

/// The application's capture context: log, mode and clock frequency.
#[derive(Debug)]
pub struct CaptureEngine {
    pub log: EventLog,
    state: CaptureState,
    ticks_per_sec: i64,
}

impl CaptureEngine {
    pub fn new(ticks_per_sec: i64) -> Self {
        Self { log: EventLog::new(), state: CaptureState::Idle, ticks_per_sec }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_logging(&self) -> bool {
        self.state == CaptureState::Logging
    }

    /// Dispatch an operator command. An in-progress cycle is aborted (log
    /// cleared) and the commanded cycle armed in its place.
    pub fn handle_command(&mut self, command: Command) -> CycleOutcome {
        match command {
            Command::Measure => {
                self.log.clear();
                self.state = CaptureState::MeasureWait;
                tracing::debug!("armed measure cycle");
                CycleOutcome::Armed(self.state)
            }
            Command::Collect => {
                self.log.clear();
                self.state = CaptureState::CollectWait;
                tracing::debug!("armed collect cycle");
                CycleOutcome::Armed(self.state)
            }
            Command::ToggleLog => {
                if self.state == CaptureState::Logging {
                    self.finish_log()
                } else {
                    self.log.clear();
                    self.state = CaptureState::Logging;
                    tracing::debug!("logging started");
                    CycleOutcome::Armed(self.state)
                }
            }
        }
    }

    /// Feed one motion event through the state machine.
    ///
    /// Unrecognized button bits are ignored; states that record
    /// unconditionally still store the event.
    pub fn handle_event(&mut self, event: MouseEvent) -> Option<CycleOutcome> {
        match self.state {
            CaptureState::Idle => None,
            CaptureState::MeasureWait => {
                if event.is_left_down() {
                    self.log.push(event);
                    self.state = CaptureState::Measuring;
                }
                None
            }
            CaptureState::Measuring => {
                self.log.push(event);
                if event.is_left_up() {
                    Some(self.finish_measure())
                } else {
                    None
                }
            }
            CaptureState::CollectWait => {
                if event.is_left_down() {
                    self.log.push(event);
                    self.state = CaptureState::Collecting;
                }
                None
            }
            CaptureState::Collecting => {
                self.log.push(event);
                if event.is_left_up() {
                    Some(self.finish_collect())
                } else {
                    None
                }
            }
            CaptureState::Logging => {
                self.log.push(event);
                None
            }
        }
    }

    fn finish_measure(&mut self) -> CycleOutcome {
        let sum_x = self.log.delta_x() as f64;
        let sum_y = self.log.delta_y() as f64;
        calibrate_timestamps(self.log.events_mut(), self.ticks_per_sec);

        let counts = (sum_x * sum_x + sum_y * sum_y).sqrt();
        let cpi = (counts / (REFERENCE_DISTANCE_CM / CM_PER_INCH)).round();
        self.log.cpi = cpi;
        self.state = CaptureState::Idle;
        tracing::info!(cpi, events = self.log.len(), "measure cycle complete");
        CycleOutcome::Measured { cpi }
    }

    fn finish_collect(&mut self) -> CycleOutcome {
        calibrate_timestamps(self.log.events_mut(), self.ticks_per_sec);

        let net_x = self.log.delta_x();
        let net_y = self.log.delta_y();
        let path_counts = self.log.path();
        let cpi = if self.log.cpi > 0.0 { self.log.cpi } else { DEFAULT_CPI };

        let summary = CollectSummary {
            events: self.log.len(),
            net_x,
            net_y,
            net_x_cm: (net_x as f64 / cpi * CM_PER_INCH).abs(),
            net_y_cm: (net_y as f64 / cpi * CM_PER_INCH).abs(),
            path_counts,
            path_cm: path_counts / cpi * CM_PER_INCH,
        };
        let stats = interval_statistics(&self.log, IntervalMode::Interval);
        self.state = CaptureState::Idle;
        tracing::info!(events = summary.events, path = summary.path_cm, "collect cycle complete");
        CycleOutcome::Collected { summary, stats }
    }

    fn finish_log(&mut self) -> CycleOutcome {
        calibrate_timestamps(self.log.events_mut(), self.ticks_per_sec);
        let stats = interval_statistics(&self.log, IntervalMode::Interval);
        self.state = CaptureState::Idle;
        tracing::info!(events = self.log.len(), "logging stopped");
        CycleOutcome::LogStopped { stats }
    }
}
