//! Chart workers.
//!
//! Each open chart runs on its own thread that owns a [`PlotView`] over a
//! deep copy of the extracted series, so later capture activity never
//! repaints an open chart. The shell talks to a worker through a command
//! channel and receives rendered RGB frames back; dropping the
//! [`ChartHandle`] closes the command channel, which the worker observes and
//! exits on.

use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use crate::error::{MeterError, Result};
use crate::plot::{PlotView, ZOOM_IN, ZOOM_OUT};
use crate::series::{Color, Series};

pub const DEFAULT_CHART_WIDTH: u32 = 900;
pub const DEFAULT_CHART_HEIGHT: u32 = 600;

/// View manipulation requests forwarded to a chart worker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChartCommand {
    Pan { dx: f32, dy: f32 },
    ZoomIn,
    ZoomOut,
    SetRange { start: f64, end: f64 },
    SetSeriesColor { index: usize, color: Color },
    Resize { width: u32, height: u32 },
}

/// One rendered chart raster, RGB8, row-major.
#[derive(Debug, Clone)]
pub struct ChartFrame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl ChartFrame {
    /// Write the frame to disk as a PNG.
    pub fn save_png(&self, path: &Path) -> Result<()> {
        let img = image::RgbImage::from_raw(self.width, self.height, self.rgb.clone())
            .ok_or_else(|| MeterError::export("frame buffer size mismatch"))?;
        img.save(path).map_err(|e| MeterError::export(e.to_string()))?;
        tracing::info!(path = %path.display(), "chart exported");
        Ok(())
    }
}

/// Shell-side handle to a chart worker thread.
pub struct ChartHandle {
    title: String,
    /// Series names and current colors, mirrored for the color picker.
    series_info: Vec<(String, Color)>,
    commands: Sender<ChartCommand>,
    frames: Receiver<ChartFrame>,
    worker: Option<JoinHandle<()>>,
}

/// Spawn a worker owning `series` and return its handle. The series vector
/// is moved in; callers clone first if they need to keep the data.
pub fn spawn_chart(title: impl Into<String>, series: Vec<Series>) -> ChartHandle {
    let title = title.into();
    let series_info = series.iter().map(|s| (s.name.clone(), s.color)).collect();
    let (cmd_tx, cmd_rx) = mpsc::channel::<ChartCommand>();
    let (frame_tx, frame_rx) = mpsc::channel::<ChartFrame>();

    let thread_title = title.clone();
    let worker = thread::spawn(move || {
        chart_worker(thread_title, series, &cmd_rx, &frame_tx);
    });

    ChartHandle { title, series_info, commands: cmd_tx, frames: frame_rx, worker: Some(worker) }
}

fn chart_worker(
    title: String,
    series: Vec<Series>,
    commands: &Receiver<ChartCommand>,
    frames: &Sender<ChartFrame>,
) {
    let mut view = PlotView::new(&title);
    for s in series {
        view.add_series(s);
    }
    let (mut w, mut h) = (DEFAULT_CHART_WIDTH, DEFAULT_CHART_HEIGHT);

    let send_frame = |view: &mut PlotView, w: u32, h: u32| -> bool {
        let f = view.paint(w, h);
        frames
            .send(ChartFrame { width: f.width, height: f.height, rgb: f.rgb.clone() })
            .is_ok()
    };

    if !send_frame(&mut view, w, h) {
        return;
    }
    tracing::debug!(%title, "chart worker started");

    // Blocks between commands; repaint happens only when the view is dirty.
    while let Ok(cmd) = commands.recv() {
        match cmd {
            ChartCommand::Pan { dx, dy } => view.pan(dx, dy),
            ChartCommand::ZoomIn => view.zoom(ZOOM_IN),
            ChartCommand::ZoomOut => view.zoom(ZOOM_OUT),
            ChartCommand::SetRange { start, end } => {
                if !view.set_range(start, end) {
                    tracing::warn!(%title, start, end, "rejected empty x range");
                }
            }
            ChartCommand::SetSeriesColor { index, color } => view.set_series_color(index, color),
            ChartCommand::Resize { width, height } => {
                w = width.max(1);
                h = height.max(1);
            }
        }
        if !send_frame(&mut view, w, h) {
            break;
        }
    }
    tracing::debug!(%title, "chart worker stopped");
}

impl ChartHandle {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn series_info(&self) -> &[(String, Color)] {
        &self.series_info
    }

    /// Queue a command; a dead worker makes this a no-op.
    pub fn send(&mut self, cmd: ChartCommand) {
        if let ChartCommand::SetSeriesColor { index, color } = cmd {
            if let Some(info) = self.series_info.get_mut(index) {
                info.1 = color;
            }
        }
        let _ = self.commands.send(cmd);
    }

    /// Drain the frame channel and return the newest frame, if any arrived
    /// since the last poll.
    pub fn poll_frame(&self) -> Option<ChartFrame> {
        let mut latest = None;
        loop {
            match self.frames.try_recv() {
                Ok(f) => latest = Some(f),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        latest
    }
}

impl Drop for ChartHandle {
    fn drop(&mut self) {
        // Hang up the command channel so the worker's recv fails.
        let (dead_tx, _) = mpsc::channel();
        self.commands = dead_tx;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
