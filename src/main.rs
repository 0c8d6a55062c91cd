use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

use mousemeter::capture::CaptureEngine;
use mousemeter::config::{AppConfig, CONFIG_FILE};
use mousemeter::gui;
use mousemeter::log::EventLog;
use mousemeter::source::{self, TargetDevice, PCAP_TICKS_PER_SEC};

const USBPCAP_EXE: &str = r"C:\Program Files\USBPcap\USBPcapCMD.exe";
const USBPCAP_DEVICE: &str = r"\\.\USBPcap1";

fn main() -> Result<()> {
    let config = AppConfig::load(Path::new(CONFIG_FILE))?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let target: Option<TargetDevice> = match &config.device {
        Some(spec) => Some(spec.parse()?),
        None => None,
    };

    let mut engine = CaptureEngine::new(PCAP_TICKS_PER_SEC);
    engine.log = EventLog::with_cap(config.max_events);
    engine.log.cpi = config.default_cpi;
    let engine = Arc::new(Mutex::new(engine));
    let stop = Arc::new(AtomicBool::new(false));
    let (outcome_tx, outcome_rx) = mpsc::channel();

    match source::spawn_usbpcap(USBPCAP_EXE, USBPCAP_DEVICE, target) {
        Ok((mut child, src)) => {
            let engine = Arc::clone(&engine);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                if let Err(e) = source::run_capture(src, engine, stop, outcome_tx) {
                    tracing::error!(error = %e, "capture loop failed");
                }
                child.kill().ok();
                child.wait().ok();
            });
        }
        // Without a capture source the shell still loads and plots saved logs.
        Err(e) => tracing::warn!(error = %e, "live capture unavailable"),
    }

    gui::run_gui(engine, outcome_rx, stop, config).map_err(|e| anyhow!("gui error: {e}"))
}
