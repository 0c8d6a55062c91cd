//! Captured event storage and plain-text persistence.
//!
//! The [`EventLog`] owns the ordered sequence of events of the current
//! capture cycle, plus its description and the device CPI. Length is bounded
//! by a hard cap; once the cap is hit further appends are silently dropped,
//! which bounds memory during a runaway logging session.
//!
//! The on-disk format matches the original MouseTester tool:
//!
//! ```text
//! <description>
//! <cpi>
//! xCount,yCount,Time (ms),buttonflags
//! <dx>,<dy>,<time_ms>,<flags>
//! ...
//! ```

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{MeterError, Result};
use crate::event::MouseEvent;

/// Hard cap on stored events.
pub const MAX_EVENTS: usize = 1_000_000;
/// Sensitivity assumed when the log's CPI is unknown.
pub const DEFAULT_CPI: f64 = 400.0;

const INITIAL_CAPACITY: usize = 1024;

/// Description, CPI and the ordered event sequence of one capture cycle.
#[derive(Debug, Clone)]
pub struct EventLog {
    pub desc: String,
    /// Counts per inch; 0 or negative means "unknown".
    pub cpi: f64,
    events: Vec<MouseEvent>,
    cap: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_cap(MAX_EVENTS)
    }

    /// A log that stops accepting events past `cap` entries.
    pub fn with_cap(cap: usize) -> Self {
        Self {
            desc: "MouseTester".to_owned(),
            cpi: DEFAULT_CPI,
            events: Vec::with_capacity(INITIAL_CAPACITY.min(cap)),
            cap,
        }
    }

    /// Append an event; silently dropped once the cap is reached.
    pub fn push(&mut self, event: MouseEvent) {
        if self.events.len() < self.cap {
            self.events.push(event);
        }
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[MouseEvent] {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut [MouseEvent] {
        &mut self.events
    }

    /// Signed sum of all X deltas, in counts.
    pub fn delta_x(&self) -> i64 {
        self.events.iter().map(|e| e.dx as i64).sum()
    }

    /// Signed sum of all Y deltas, in counts.
    pub fn delta_y(&self) -> i64 {
        self.events.iter().map(|e| e.dy as i64).sum()
    }

    /// Total path length: sum of per-event displacement magnitudes.
    ///
    /// Uses each event's own reported delta, not positional reconstruction.
    pub fn path(&self) -> f64 {
        self.events.iter().map(|e| e.magnitude()).sum()
    }

    /// CPI guarded against the "unknown" sentinel.
    pub fn safe_cpi(&self) -> f64 {
        if self.cpi > 0.0 { self.cpi } else { DEFAULT_CPI }
    }

    /// Write the log to `path`, staging through a sibling temp file so a
    /// failed write never leaves a partial file behind.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("tmp");
        {
            let mut w = BufWriter::new(File::create(&tmp)?);
            writeln!(w, "{}", self.desc)?;
            writeln!(w, "{:.1}", self.cpi)?;
            writeln!(w, "xCount,yCount,Time (ms),buttonflags")?;
            for e in &self.events {
                writeln!(w, "{},{},{:.6},{}", e.dx, e.dy, e.time_ms, e.button_flags)?;
            }
            w.flush()?;
        }
        fs::rename(&tmp, path)?;
        tracing::info!(path = %path.display(), events = self.events.len(), "log saved");
        Ok(())
    }

    /// Load a log from `path`, replacing `self` only on full header success.
    ///
    /// Malformed data rows terminate parsing without error; a missing or
    /// unparsable description/CPI line fails the load and leaves `self`
    /// untouched.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MeterError::LogNotFound { path: path.to_owned() }
            } else {
                MeterError::Io(e)
            }
        })?;
        let staged = Self::parse(BufReader::new(file), self.cap)?;
        tracing::info!(path = %path.display(), events = staged.events.len(), "log loaded");
        *self = staged;
        Ok(())
    }

    fn parse(reader: impl BufRead, cap: usize) -> Result<Self> {
        let mut lines = reader.lines();

        let desc = lines
            .next()
            .transpose()?
            .ok_or_else(|| MeterError::header("missing description line"))?;
        let cpi_line = lines
            .next()
            .transpose()?
            .ok_or_else(|| MeterError::header("missing CPI line"))?;
        let cpi: f64 = cpi_line
            .trim()
            .parse()
            .map_err(|_| MeterError::header(format!("unparsable CPI '{}'", cpi_line.trim())))?;
        // Column header line: only a skip marker on reload.
        lines
            .next()
            .transpose()?
            .ok_or_else(|| MeterError::header("missing column header line"))?;

        let mut log = Self::with_cap(cap);
        log.desc = desc;
        log.cpi = cpi;

        for line in lines {
            let line = line?;
            let Some(event) = parse_event_row(&line) else {
                tracing::trace!(row = %line, "stopping at unparsable data row");
                break;
            };
            log.push(event);
        }
        Ok(log)
    }
}

fn parse_event_row(line: &str) -> Option<MouseEvent> {
    let mut fields = line.trim().split(',');
    let dx: i32 = fields.next()?.trim().parse().ok()?;
    let dy: i32 = fields.next()?.trim().parse().ok()?;
    let time_ms: f64 = fields.next()?.trim().parse().ok()?;
    let flags: u16 = fields.next()?.trim().parse().ok()?;
    Some(MouseEvent { button_flags: flags, dx, dy, counter: 0, time_ms })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_log() -> EventLog {
        let mut log = EventLog::new();
        log.desc = "test mouse".to_owned();
        log.cpi = 800.0;
        log.push(MouseEvent { button_flags: 1, dx: 3, dy: -4, counter: 0, time_ms: 0.0 });
        log.push(MouseEvent { button_flags: 0, dx: -1, dy: 2, counter: 0, time_ms: 1.25 });
        log.push(MouseEvent { button_flags: 2, dx: 10, dy: 0, counter: 0, time_ms: 2.5 });
        log
    }

    #[test]
    fn cap_is_enforced_silently() {
        let mut log = EventLog::with_cap(3);
        for i in 0..10 {
            log.push(MouseEvent::new(0, i, 0, i as i64));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.events()[2].dx, 2);
    }

    #[test]
    fn delta_and_path() {
        let log = sample_log();
        assert_eq!(log.delta_x(), 12);
        assert_eq!(log.delta_y(), -2);
        let expected = 5.0 + (5.0_f64).sqrt() + 10.0;
        assert!((log.path() - expected).abs() < 1e-12);
    }

    #[test]
    fn safe_cpi_falls_back() {
        let mut log = EventLog::new();
        log.cpi = 0.0;
        assert_eq!(log.safe_cpi(), DEFAULT_CPI);
        log.cpi = -5.0;
        assert_eq!(log.safe_cpi(), DEFAULT_CPI);
        log.cpi = 1600.0;
        assert_eq!(log.safe_cpi(), 1600.0);
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");

        let log = sample_log();
        log.save(&path).unwrap();

        let mut loaded = EventLog::new();
        loaded.load(&path).unwrap();

        assert_eq!(loaded.desc, log.desc);
        assert!((loaded.cpi - log.cpi).abs() < 1e-9);
        assert_eq!(loaded.len(), log.len());
        for (a, b) in loaded.events().iter().zip(log.events()) {
            assert_eq!(a.dx, b.dx);
            assert_eq!(a.dy, b.dy);
            assert_eq!(a.button_flags, b.button_flags);
            assert!((a.time_ms - b.time_ms).abs() < 1e-9);
        }
    }

    #[test]
    fn load_missing_header_fails_and_preserves_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "only a description\n").unwrap();

        let mut log = sample_log();
        let err = log.load(&path);
        assert!(err.is_err());
        assert_eq!(log.len(), 3);
        assert_eq!(log.desc, "test mouse");
    }

    #[test]
    fn load_unparsable_cpi_fails() {
        let parsed = EventLog::parse(Cursor::new("desc\nnot-a-number\nheader\n"), MAX_EVENTS);
        assert!(parsed.is_err());
    }

    #[test]
    fn parsing_stops_at_first_bad_row() {
        let text = "desc\n400.0\nxCount,yCount,Time (ms),buttonflags\n1,2,0.5,0\nbogus row\n3,4,1.0,0\n";
        let log = EventLog::parse(Cursor::new(text), MAX_EVENTS).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.events()[0].dx, 1);
    }

    #[test]
    fn load_nonexistent_reports_not_found() {
        let mut log = EventLog::new();
        match log.load(Path::new("/definitely/not/here.csv")) {
            Err(MeterError::LogNotFound { .. }) => {}
            other => panic!("expected LogNotFound, got {other:?}"),
        }
    }
}
