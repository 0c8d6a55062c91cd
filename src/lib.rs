//! mousemeter library
//!
//! Capture, analyze and plot the raw motion stream of a USB mouse. The
//! pipeline runs in stages:
//!
//! - `source`: pcap-framed USB HID acquisition turning reports into events
//! - `capture`: the Measure/Collect/Log state machine over a shared log
//! - `event` / `log`: event representation, timestamp calibration, storage
//!   and CSV persistence
//! - `stats` / `series`: interval statistics and plottable series extraction
//! - `plot` / `chart`: the interactive plot engine and its worker threads
//! - `gui`: the eframe operator shell
//!
//! # Example
//!
//! ```rust,ignore
//! use mousemeter::capture::{CaptureEngine, Command};
//! use mousemeter::series::{extract_series, PlotMetric};
//!
//! let mut engine = CaptureEngine::new(1_000_000);
//! engine.handle_command(Command::ToggleLog);
//! // feed events from a source...
//! let series = extract_series(&engine.log, PlotMetric::IntervalVsTime);
//! ```

pub mod capture;
pub mod chart;
pub mod config;
pub mod error;
pub mod event;
pub mod gui;
pub mod log;
pub mod plot;
pub mod series;
pub mod source;
pub mod stats;

pub use error::{MeterError, Result};
pub use event::MouseEvent;
pub use log::EventLog;
