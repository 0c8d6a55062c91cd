use eframe::egui;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use crate::capture::{CaptureEngine, CaptureState, CollectSummary, Command, CycleOutcome};
use crate::chart::{spawn_chart, ChartCommand, ChartHandle};
use crate::config::AppConfig;
use crate::log::EventLog;
use crate::series::{extract_series, export_csv, Color, PlotMetric};
use crate::stats::StatisticsRecord;

pub struct MeterGui {
    engine: Arc<Mutex<CaptureEngine>>,
    outcomes: Receiver<CycleOutcome>,
    stop_flag: Arc<AtomicBool>,
    config: AppConfig,

    description: String,
    cpi_text: String,
    file_path: String,
    metric: PlotMetric,

    status: String,
    last_stats: Option<StatisticsRecord>,
    last_summary: Option<CollectSummary>,

    charts: Vec<ChartWindow>,
    next_chart_id: usize,
}

/// One open chart window backed by a worker thread.
struct ChartWindow {
    id: usize,
    handle: ChartHandle,
    last_frame: Option<crate::chart::ChartFrame>,
    texture: Option<egui::TextureHandle>,
    size: (u32, u32),
    open: bool,
    range_text: (String, String),
}

/// Label/value rows for the statistics grid.
fn stats_rows(s: &StatisticsRecord) -> Vec<(&'static str, String)> {
    vec![
        ("Mean", format!("{:.3} ms", s.mean)),
        ("Std dev", format!("{:.3} ms", s.stdev)),
        ("Median", format!("{:.3} ms", s.median)),
        ("Min", format!("{:.3} ms", s.min)),
        ("Max", format!("{:.3} ms", s.max)),
        ("Range", format!("{:.3} ms", s.range)),
        ("1% low", format!("{:.3} ms", s.p1_low)),
        ("0.1% low", format!("{:.3} ms", s.p01_low)),
        ("99% high", format!("{:.3} ms", s.p99_high)),
        ("99.9% high", format!("{:.3} ms", s.p999_high)),
    ]
}

fn summary_text(s: &CollectSummary) -> String {
    format!(
        "{} events, net x {} ({:.3} cm), net y {} ({:.3} cm), path {:.1} counts ({:.3} cm)",
        s.events, s.net_x, s.net_x_cm, s.net_y, s.net_y_cm, s.path_counts, s.path_cm
    )
}

impl MeterGui {
    pub fn new(
        engine: Arc<Mutex<CaptureEngine>>,
        outcomes: Receiver<CycleOutcome>,
        stop_flag: Arc<AtomicBool>,
        config: AppConfig,
    ) -> Self {
        let cpi_text = format!("{:.0}", config.default_cpi);
        Self {
            engine,
            outcomes,
            stop_flag,
            config,
            description: String::new(),
            cpi_text,
            file_path: "measurement.csv".to_owned(),
            metric: PlotMetric::IntervalVsTime,
            status: "Ready".to_owned(),
            last_stats: None,
            last_summary: None,
            charts: Vec::new(),
            next_chart_id: 0,
        }
    }

    fn apply_outcome(&mut self, outcome: CycleOutcome) {
        match outcome {
            CycleOutcome::Armed(state) => {
                self.status = match state {
                    CaptureState::MeasureWait => {
                        "Hold the button and move 10 cm, then release".to_owned()
                    }
                    CaptureState::CollectWait => "Hold the button and move, then release".to_owned(),
                    CaptureState::Logging => "Logging... toggle again to stop".to_owned(),
                    _ => "Armed".to_owned(),
                };
            }
            CycleOutcome::Measured { cpi } => {
                self.cpi_text = format!("{cpi:.0}");
                self.status = format!("Measured {cpi:.0} CPI");
                self.last_stats = None;
                self.last_summary = None;
            }
            CycleOutcome::Collected { summary, stats } => {
                self.status = format!("Collected {} events", summary.events);
                self.last_summary = Some(summary);
                self.last_stats = Some(stats);
            }
            CycleOutcome::LogStopped { stats } => {
                self.status = "Logging stopped".to_owned();
                self.last_summary = None;
                self.last_stats = Some(stats);
            }
        }
    }

    fn send_command(&mut self, command: Command) {
        let outcome = match self.engine.lock() {
            Ok(mut engine) => engine.handle_command(command),
            Err(_) => {
                self.status = "Capture engine unavailable".to_owned();
                return;
            }
        };
        self.apply_outcome(outcome);
    }

    /// Push the editable description/CPI fields into the log.
    fn sync_fields_into_log(log: &mut EventLog, description: &str, cpi_text: &str) {
        log.desc = description.to_owned();
        if let Ok(cpi) = cpi_text.trim().parse::<f64>() {
            if cpi > 0.0 {
                log.cpi = cpi;
            }
        }
    }

    fn plot_current(&mut self) {
        let series = match self.engine.lock() {
            Ok(mut engine) => {
                Self::sync_fields_into_log(&mut engine.log, &self.description, &self.cpi_text);
                extract_series(&engine.log, self.metric)
            }
            Err(_) => {
                self.status = "Capture engine unavailable".to_owned();
                return;
            }
        };
        if series.is_empty() {
            self.status = "Nothing to plot".to_owned();
            return;
        }

        let title = format!("{} #{}", self.metric.title(), self.next_chart_id + 1);
        let handle = spawn_chart(title, series);
        self.charts.push(ChartWindow {
            id: self.next_chart_id,
            handle,
            last_frame: None,
            texture: None,
            size: (self.config.chart_width, self.config.chart_height),
            open: true,
            range_text: (String::new(), String::new()),
        });
        self.next_chart_id += 1;
        self.status = format!("Opened {}", self.metric.title());
    }

    fn save_log(&mut self) {
        let result = match self.engine.lock() {
            Ok(mut engine) => {
                Self::sync_fields_into_log(&mut engine.log, &self.description, &self.cpi_text);
                engine.log.save(self.file_path.as_ref())
            }
            Err(_) => {
                self.status = "Capture engine unavailable".to_owned();
                return;
            }
        };
        self.status = match result {
            Ok(()) => format!("Saved {}", self.file_path),
            Err(e) => format!("Save failed: {e}"),
        };
    }

    fn load_log(&mut self) {
        let mut log = EventLog::with_cap(self.config.max_events);
        match log.load(self.file_path.as_ref()) {
            Ok(()) => {
                self.description = log.desc.clone();
                self.cpi_text = format!("{:.0}", log.cpi);
                self.status = format!("Loaded {} events from {}", log.len(), self.file_path);
                if let Ok(mut engine) = self.engine.lock() {
                    engine.log = log;
                }
                self.last_stats = None;
                self.last_summary = None;
            }
            Err(e) => self.status = format!("Load failed: {e}"),
        }
    }

    fn export_series(&mut self) {
        let result = match self.engine.lock() {
            Ok(mut engine) => {
                Self::sync_fields_into_log(&mut engine.log, &self.description, &self.cpi_text);
                export_csv(&engine.log, self.metric, self.file_path.as_ref())
            }
            Err(_) => {
                self.status = "Capture engine unavailable".to_owned();
                return;
            }
        };
        self.status = match result {
            Ok(()) => format!("Exported {}", self.file_path),
            Err(e) => format!("Export failed: {e}"),
        };
    }

    fn show_chart_windows(&mut self, ctx: &egui::Context) {
        for chart in &mut self.charts {
            let mut open = chart.open;
            egui::Window::new(chart.handle.title())
                .id(egui::Id::new(chart.id))
                .open(&mut open)
                .default_size([chart.size.0 as f32, chart.size.1 as f32 + 40.0])
                .show(ctx, |ui| {
                    ui.horizontal(|ui| {
                        ui.label("Range:");
                        ui.add(
                            egui::TextEdit::singleline(&mut chart.range_text.0)
                                .desired_width(70.0),
                        );
                        ui.add(
                            egui::TextEdit::singleline(&mut chart.range_text.1)
                                .desired_width(70.0),
                        );
                        if ui.button("Apply").clicked() {
                            if let (Ok(start), Ok(end)) = (
                                chart.range_text.0.trim().parse::<f64>(),
                                chart.range_text.1.trim().parse::<f64>(),
                            ) {
                                chart.handle.send(ChartCommand::SetRange { start, end });
                            }
                        }
                        ui.separator();
                        for i in 0..chart.handle.series_info().len() {
                            let (name, color) = chart.handle.series_info()[i].clone();
                            let mut rgb = [color.r, color.g, color.b];
                            if ui.color_edit_button_srgb(&mut rgb).changed() {
                                chart.handle.send(ChartCommand::SetSeriesColor {
                                    index: i,
                                    color: Color::rgb(rgb[0], rgb[1], rgb[2]),
                                });
                            }
                            ui.label(name);
                        }
                        ui.separator();
                        if ui.button("PNG").clicked() {
                            if let Some(frame) = &chart.last_frame {
                                let path = format!("chart-{}.png", chart.id + 1);
                                if let Err(e) = frame.save_png(path.as_ref()) {
                                    tracing::warn!(error = %e, "chart export failed");
                                }
                            }
                        }
                    });

                    let avail = ui.available_size();
                    let want = ((avail.x.max(100.0)) as u32, (avail.y.max(100.0)) as u32);
                    if want != chart.size {
                        chart.size = want;
                        chart
                            .handle
                            .send(ChartCommand::Resize { width: want.0, height: want.1 });
                    }

                    if let Some(frame) = chart.handle.poll_frame() {
                        let image = egui::ColorImage::from_rgb(
                            [frame.width as usize, frame.height as usize],
                            &frame.rgb,
                        );
                        match &mut chart.texture {
                            Some(t) => t.set(image, egui::TextureOptions::NEAREST),
                            None => {
                                chart.texture = Some(ctx.load_texture(
                                    format!("chart-{}", chart.id),
                                    image,
                                    egui::TextureOptions::NEAREST,
                                ));
                            }
                        }
                        chart.last_frame = Some(frame);
                    }

                    if let Some(texture) = &chart.texture {
                        let response = ui.add(
                            egui::Image::new(texture)
                                .fit_to_exact_size(avail)
                                .sense(egui::Sense::click_and_drag()),
                        );
                        if response.dragged() {
                            let d = response.drag_delta();
                            if d != egui::Vec2::ZERO {
                                chart.handle.send(ChartCommand::Pan { dx: d.x, dy: d.y });
                            }
                        }
                        if response.hovered() {
                            let scroll = ctx.input(|i| i.raw_scroll_delta.y);
                            if scroll > 0.0 {
                                chart.handle.send(ChartCommand::ZoomIn);
                            } else if scroll < 0.0 {
                                chart.handle.send(ChartCommand::ZoomOut);
                            }
                        }
                    } else {
                        ui.spinner();
                    }
                });
            chart.open = open;
        }
        // Dropping a closed window's handle stops its worker.
        self.charts.retain(|c| c.open);
    }
}

impl eframe::App for MeterGui {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        while let Ok(outcome) = self.outcomes.try_recv() {
            self.apply_outcome(outcome);
        }

        if ctx.input(|i| i.key_pressed(egui::Key::F1)) {
            self.send_command(Command::ToggleLog);
        }
        if ctx.input(|i| i.key_pressed(egui::Key::F3)) {
            self.plot_current();
        }

        let (state, event_count) = match self.engine.lock() {
            Ok(engine) => (engine.state(), engine.log.len()),
            Err(_) => (CaptureState::Idle, 0),
        };

        egui::TopBottomPanel::top("controls").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label("Description:");
                ui.add(egui::TextEdit::singleline(&mut self.description).desired_width(180.0));
                ui.label("CPI:");
                ui.add(egui::TextEdit::singleline(&mut self.cpi_text).desired_width(60.0));
                ui.separator();
                if ui.button("Measure").clicked() {
                    self.send_command(Command::Measure);
                }
                if ui.button("Collect").clicked() {
                    self.send_command(Command::Collect);
                }
                let log_label =
                    if state == CaptureState::Logging { "Stop log (F1)" } else { "Start log (F1)" };
                if ui.button(log_label).clicked() {
                    self.send_command(Command::ToggleLog);
                }
            });
            ui.horizontal(|ui| {
                egui::ComboBox::from_id_source("metric")
                    .selected_text(self.metric.title())
                    .show_ui(ui, |ui| {
                        for m in PlotMetric::ALL {
                            ui.selectable_value(&mut self.metric, m, m.title());
                        }
                    });
                if ui.button("Plot (F3)").clicked() {
                    self.plot_current();
                }
                ui.separator();
                ui.label("File:");
                ui.add(egui::TextEdit::singleline(&mut self.file_path).desired_width(200.0));
                if ui.button("Save").clicked() {
                    self.save_log();
                }
                if ui.button("Load").clicked() {
                    self.load_log();
                }
                if ui.button("Export CSV").clicked() {
                    self.export_series();
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.horizontal(|ui| {
                if state == CaptureState::Logging {
                    ui.colored_label(egui::Color32::GREEN, "● Logging");
                } else if state != CaptureState::Idle {
                    ui.colored_label(egui::Color32::YELLOW, "● Armed");
                }
                ui.label(&self.status);
                ui.separator();
                ui.label(format!("{event_count} events"));
            });
            ui.separator();

            if let Some(summary) = &self.last_summary {
                ui.label(summary_text(summary));
                ui.add_space(6.0);
            }

            if let Some(stats) = self.last_stats {
                egui::Grid::new("stats_grid")
                    .num_columns(2)
                    .spacing([40.0, 4.0])
                    .striped(true)
                    .show(ui, |ui| {
                        for (label, value) in stats_rows(&stats) {
                            ui.label(label);
                            ui.label(value);
                            ui.end_row();
                        }
                    });
            }
        });

        self.show_chart_windows(ctx);

        // Keep the event counter live while a cycle is armed or logging.
        if state != CaptureState::Idle {
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}

pub fn run_gui(
    engine: Arc<Mutex<CaptureEngine>>,
    outcomes: Receiver<CycleOutcome>,
    stop_flag: Arc<AtomicBool>,
    config: AppConfig,
) -> Result<(), eframe::Error> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([640.0, 420.0])
            .with_title("Mouse Meter"),
        ..Default::default()
    };
    eframe::run_native(
        "Mouse Meter",
        options,
        Box::new(move |_cc| Box::new(MeterGui::new(engine, outcomes, stop_flag, config))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_grid_covers_all_fields() {
        let s = StatisticsRecord { mean: 1.0, stdev: 0.1, ..Default::default() };
        let rows = stats_rows(&s);
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[0], ("Mean", "1.000 ms".to_owned()));
    }

    #[test]
    fn field_sync_rejects_bad_cpi() {
        let mut log = EventLog::new();
        log.cpi = 800.0;
        MeterGui::sync_fields_into_log(&mut log, "test run", "not a number");
        assert_eq!(log.desc, "test run");
        assert_eq!(log.cpi, 800.0);

        MeterGui::sync_fields_into_log(&mut log, "test run", "-100");
        assert_eq!(log.cpi, 800.0);

        MeterGui::sync_fields_into_log(&mut log, "test run", " 1600 ");
        assert_eq!(log.cpi, 1600.0);
    }

    #[test]
    fn collect_summary_line() {
        let s = CollectSummary {
            events: 3,
            net_x: 150,
            net_y: 0,
            net_x_cm: 0.9525,
            net_y_cm: 0.0,
            path_counts: 150.0,
            path_cm: 0.9525,
        };
        let text = summary_text(&s);
        assert!(text.contains("3 events"));
        assert!(text.contains("0.953 cm"));
    }
}
