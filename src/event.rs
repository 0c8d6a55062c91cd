//! Raw motion events and timestamp calibration.
//!
//! A [`MouseEvent`] is one relative-displacement report from the sensor,
//! stamped with the host's raw monotonic counter. Timestamps in milliseconds
//! are filled in lazily by [`calibrate_timestamps`] once a capture cycle
//! completes, zero-referenced to the first event of the cycle.

/// Button edge flags carried by a motion event (RawInput encoding).
///
/// Bits outside these constants are preserved but ignored by the capture
/// state machine.
pub mod button {
    pub const LEFT_DOWN: u16 = 0x0001;
    pub const LEFT_UP: u16 = 0x0002;
    pub const RIGHT_DOWN: u16 = 0x0004;
    pub const RIGHT_UP: u16 = 0x0008;
    pub const MIDDLE_DOWN: u16 = 0x0010;
    pub const MIDDLE_UP: u16 = 0x0020;
}

/// One reported relative displacement + button-state sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MouseEvent {
    /// Button edge bitmask, see [`button`].
    pub button_flags: u16,
    /// Relative X displacement in device counts.
    pub dx: i32,
    /// Relative Y displacement in device counts.
    pub dy: i32,
    /// Raw monotonic counter value at arrival, in source ticks.
    pub counter: i64,
    /// Calibrated timestamp in milliseconds, 0 until calibration runs.
    pub time_ms: f64,
}

impl MouseEvent {
    pub fn new(button_flags: u16, dx: i32, dy: i32, counter: i64) -> Self {
        Self { button_flags, dx, dy, counter, time_ms: 0.0 }
    }

    pub fn is_left_down(&self) -> bool {
        self.button_flags & button::LEFT_DOWN != 0
    }

    pub fn is_left_up(&self) -> bool {
        self.button_flags & button::LEFT_UP != 0
    }

    /// Displacement magnitude of this single report, in counts.
    pub fn magnitude(&self) -> f64 {
        ((self.dx as f64).powi(2) + (self.dy as f64).powi(2)).sqrt()
    }
}

/// Convert raw counter ticks into zero-based millisecond timestamps.
///
/// The first event of the slice defines t = 0. A non-positive tick frequency
/// degrades to a 1:1 tick-to-millisecond mapping instead of dividing by zero.
/// Empty slices are a no-op.
pub fn calibrate_timestamps(events: &mut [MouseEvent], ticks_per_sec: i64) {
    let Some(first) = events.first() else { return };
    let base = first.counter;

    let ms_per_tick = if ticks_per_sec > 0 {
        1000.0 / ticks_per_sec as f64
    } else {
        1.0
    };

    for e in events.iter_mut() {
        e.time_ms = (e.counter - base) as f64 * ms_per_tick;
    }
}
