//! Live event acquisition from a USBPcap stream.
//!
//! A [`UsbPcapSource`] wraps any byte stream carrying pcap-framed USB
//! traffic (normally the stdout pipe of `USBPcapCMD.exe`), reassembles the
//! records across read boundaries and turns HID mouse reports into
//! [`MouseEvent`]s. Raw reports carry button levels, not transitions, so the
//! source diffs against the previous report to synthesize press/release edge
//! flags. The pcap microsecond timestamp doubles as the event counter, which
//! makes the calibration frequency a fixed 1 MHz.

use std::io::{Cursor, Read};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::capture::{CaptureEngine, CycleOutcome};
use crate::error::{MeterError, Result};
use crate::event::{button, MouseEvent};

/// Counter resolution of pcap timestamps.
pub const PCAP_TICKS_PER_SEC: i64 = 1_000_000;

const PCAP_GLOBAL_HEADER_LEN: usize = 24;
const READ_CHUNK: usize = 65535;

/// Anything that can hand out calibratable motion events.
pub trait EventSource {
    /// The next event, or `None` when the stream is exhausted.
    fn next_event(&mut self) -> Result<Option<MouseEvent>>;
}

/// Capture filter, written as `bus.device.endpoint`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetDevice {
    pub bus_id: u16,
    pub device_address: u16,
    pub endpoint: u8,
}

impl FromStr for TargetDevice {
    type Err = MeterError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return Err(MeterError::source(format!(
                "invalid device \"{s}\", expected bus.device.endpoint"
            )));
        }
        let bad = |name: &str| MeterError::source(format!("invalid {name} in device \"{s}\""));
        Ok(TargetDevice {
            bus_id: parts[0].parse().map_err(|_| bad("bus"))?,
            device_address: parts[1].parse().map_err(|_| bad("device"))?,
            endpoint: parts[2].parse().map_err(|_| bad("endpoint"))?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct PcapRecordHeader {
    ts_sec: u32,
    ts_usec: u32,
    incl_len: u32,
}

impl PcapRecordHeader {
    fn parse(data: &[u8]) -> Option<(Self, usize)> {
        if data.len() < 16 {
            return None;
        }
        let mut cur = Cursor::new(data);
        let ts_sec = cur.read_u32::<LittleEndian>().ok()?;
        let ts_usec = cur.read_u32::<LittleEndian>().ok()?;
        let incl_len = cur.read_u32::<LittleEndian>().ok()?;
        let _orig_len = cur.read_u32::<LittleEndian>().ok()?;
        Some((PcapRecordHeader { ts_sec, ts_usec, incl_len }, 16))
    }

    fn counter(&self) -> i64 {
        self.ts_sec as i64 * PCAP_TICKS_PER_SEC + self.ts_usec as i64
    }
}

#[derive(Debug, Clone, Copy)]
struct UsbPcapHeader {
    bus_id: u16,
    device_address: u16,
    endpoint: u8,
    direction_in: bool,
    data_length: u32,
}

impl UsbPcapHeader {
    fn parse(data: &[u8]) -> Option<(Self, usize)> {
        if data.len() < 27 {
            return None;
        }
        let mut cur = Cursor::new(data);
        let _header_len = cur.read_u16::<LittleEndian>().ok()?;
        let _irp_id = cur.read_u64::<LittleEndian>().ok()?;
        let _status = cur.read_u32::<LittleEndian>().ok()?;
        let _function = cur.read_u16::<LittleEndian>().ok()?;
        let _info = cur.read_u8().ok()?;
        let bus_id = cur.read_u16::<LittleEndian>().ok()?;
        let device_address = cur.read_u16::<LittleEndian>().ok()?;
        let raw_endpoint = cur.read_u8().ok()?;
        let _transfer_type = cur.read_u8().ok()?;
        let data_length = cur.read_u32::<LittleEndian>().ok()?;

        Some((
            UsbPcapHeader {
                bus_id,
                device_address,
                endpoint: raw_endpoint & 0x7F,
                direction_in: (raw_endpoint & 0x80) != 0,
                data_length,
            },
            27,
        ))
    }
}

/// Turn a HID button-level byte pair into press/release edge flags.
fn edge_flags(prev: u8, cur: u8) -> u16 {
    const LEVELS: [(u8, u16, u16); 3] = [
        (0x01, button::LEFT_DOWN, button::LEFT_UP),
        (0x02, button::RIGHT_DOWN, button::RIGHT_UP),
        (0x04, button::MIDDLE_DOWN, button::MIDDLE_UP),
    ];
    let mut flags = 0;
    for (bit, down, up) in LEVELS {
        if cur & bit != 0 && prev & bit == 0 {
            flags |= down;
        }
        if cur & bit == 0 && prev & bit != 0 {
            flags |= up;
        }
    }
    flags
}

/// Extract (buttons, dx, dy) from a 7-byte (no report ID) or 8-byte (leading
/// report ID) HID mouse report.
fn parse_hid_report(payload: &[u8]) -> Option<(u8, i16, i16)> {
    let body = match payload.len() {
        8 => &payload[1..],
        7 => payload,
        _ => return None,
    };
    let dx = i16::from_le_bytes([body[1], body[2]]);
    let dy = i16::from_le_bytes([body[3], body[4]]);
    Some((body[0], dx, dy))
}

/// Streaming pcap parser over any reader.
pub struct UsbPcapSource<R: Read> {
    reader: R,
    buffer: Vec<u8>,
    skipped_global: bool,
    target: Option<TargetDevice>,
    prev_buttons: u8,
    eof: bool,
}

impl<R: Read> UsbPcapSource<R> {
    pub fn new(reader: R, target: Option<TargetDevice>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(READ_CHUNK * 4),
            skipped_global: false,
            target,
            prev_buttons: 0,
            eof: false,
        }
    }

    /// Pop the next complete record off the reassembly buffer.
    fn next_buffered(&mut self) -> Option<MouseEvent> {
        loop {
            if !self.skipped_global {
                if self.buffer.len() < PCAP_GLOBAL_HEADER_LEN {
                    return None;
                }
                self.buffer.drain(0..PCAP_GLOBAL_HEADER_LEN);
                self.skipped_global = true;
                tracing::debug!("skipped pcap global header");
            }

            let (rec, rec_size) = PcapRecordHeader::parse(&self.buffer)?;
            let total = rec_size + rec.incl_len as usize;
            if self.buffer.len() < total {
                return None;
            }
            let event = self.record_to_event(&rec, rec_size, total);
            self.buffer.drain(0..total);
            if let Some(event) = event {
                return Some(event);
            }
        }
    }

    fn record_to_event(
        &mut self,
        rec: &PcapRecordHeader,
        rec_size: usize,
        total: usize,
    ) -> Option<MouseEvent> {
        let record = &self.buffer[rec_size..total];
        let (usb, usb_size) = UsbPcapHeader::parse(record)?;
        if !usb.direction_in {
            return None;
        }
        if let Some(t) = self.target {
            if usb.bus_id != t.bus_id
                || usb.device_address != t.device_address
                || usb.endpoint != t.endpoint
            {
                return None;
            }
        }
        let payload = &record[usb_size..];
        if payload.len() < usb.data_length as usize {
            return None;
        }
        let (buttons, dx, dy) = parse_hid_report(&payload[..usb.data_length as usize])?;

        let flags = edge_flags(self.prev_buttons, buttons);
        self.prev_buttons = buttons;
        Some(MouseEvent::new(flags, dx as i32, dy as i32, rec.counter()))
    }
}

impl<R: Read> EventSource for UsbPcapSource<R> {
    fn next_event(&mut self) -> Result<Option<MouseEvent>> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(event) = self.next_buffered() {
                return Ok(Some(event));
            }
            if self.eof {
                return Ok(None);
            }
            let n = self.reader.read(&mut chunk)?;
            if n == 0 {
                self.eof = true;
                tracing::info!("capture stream closed");
            } else {
                self.buffer.extend_from_slice(&chunk[..n]);
            }
        }
    }
}

/// Launch `USBPcapCMD.exe` streaming to stdout and wrap the pipe.
pub fn spawn_usbpcap(
    exe: &str,
    filter_device: &str,
    target: Option<TargetDevice>,
) -> Result<(Child, UsbPcapSource<ChildStdout>)> {
    let mut child = Command::new(exe)
        .args(["-d", filter_device, "-o", "-", "-A", "-s", "65535", "-b", "262144"])
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|e| MeterError::source(format!("failed to start {exe}: {e}")))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| MeterError::source("capture process has no stdout pipe"))?;
    tracing::info!(exe, filter_device, "capture process started");
    Ok((child, UsbPcapSource::new(stdout, target)))
}

/// Pump a source into the shared engine until the stream ends or `stop` is
/// raised, forwarding completed cycle outcomes to the shell.
pub fn run_capture<S: EventSource>(
    mut source: S,
    engine: Arc<Mutex<CaptureEngine>>,
    stop: Arc<AtomicBool>,
    outcomes: Sender<CycleOutcome>,
) -> Result<()> {
    while !stop.load(Ordering::Relaxed) {
        let Some(event) = source.next_event()? else {
            break;
        };
        let outcome = {
            let mut engine = engine
                .lock()
                .map_err(|_| MeterError::source("capture engine lock poisoned"))?;
            engine.handle_event(event)
        };
        if let Some(outcome) = outcome {
            if outcomes.send(outcome).is_err() {
                break;
            }
        }
    }
    tracing::debug!("capture loop finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build one pcap record wrapping a USBPcap packet with `payload`.
    fn record(ts_usec: u32, bus: u16, dev: u16, endpoint: u8, in_dir: bool, payload: &[u8]) -> Vec<u8> {
        let mut usb = Vec::new();
        usb.extend_from_slice(&27u16.to_le_bytes());
        usb.extend_from_slice(&0u64.to_le_bytes()); // irp_id
        usb.extend_from_slice(&0u32.to_le_bytes()); // status
        usb.extend_from_slice(&9u16.to_le_bytes()); // function
        usb.push(0); // info
        usb.extend_from_slice(&bus.to_le_bytes());
        usb.extend_from_slice(&dev.to_le_bytes());
        usb.push(if in_dir { endpoint | 0x80 } else { endpoint });
        usb.push(1); // transfer type
        usb.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        usb.extend_from_slice(payload);

        let mut rec = Vec::new();
        rec.extend_from_slice(&0u32.to_le_bytes()); // ts_sec
        rec.extend_from_slice(&ts_usec.to_le_bytes());
        rec.extend_from_slice(&(usb.len() as u32).to_le_bytes());
        rec.extend_from_slice(&(usb.len() as u32).to_le_bytes());
        rec.extend(usb);
        rec
    }

    fn report8(buttons: u8, dx: i16, dy: i16) -> Vec<u8> {
        let mut p = vec![0x01, buttons];
        p.extend_from_slice(&dx.to_le_bytes());
        p.extend_from_slice(&dy.to_le_bytes());
        p.extend_from_slice(&[0, 0]);
        p
    }

    fn stream(records: &[Vec<u8>]) -> Vec<u8> {
        let mut bytes = vec![0u8; 24]; // global header, contents ignored
        for r in records {
            bytes.extend_from_slice(r);
        }
        bytes
    }

    #[test]
    fn parses_motion_reports() {
        let bytes = stream(&[
            record(1000, 1, 3, 1, true, &report8(0, 10, -10)),
            record(2000, 1, 3, 1, true, &report8(0, -3, 7)),
        ]);
        let mut src = UsbPcapSource::new(Cursor::new(bytes), None);

        let e = src.next_event().unwrap().unwrap();
        assert_eq!((e.dx, e.dy, e.counter), (10, -10, 1000));
        let e = src.next_event().unwrap().unwrap();
        assert_eq!((e.dx, e.dy, e.counter), (-3, 7, 2000));
        assert!(src.next_event().unwrap().is_none());
    }

    #[test]
    fn button_levels_become_edges() {
        let bytes = stream(&[
            record(0, 1, 3, 1, true, &report8(0x01, 0, 0)), // left pressed
            record(1, 1, 3, 1, true, &report8(0x01, 5, 0)), // held: no edge
            record(2, 1, 3, 1, true, &report8(0x00, 0, 0)), // released
        ]);
        let mut src = UsbPcapSource::new(Cursor::new(bytes), None);

        assert_eq!(src.next_event().unwrap().unwrap().button_flags, button::LEFT_DOWN);
        assert_eq!(src.next_event().unwrap().unwrap().button_flags, 0);
        assert_eq!(src.next_event().unwrap().unwrap().button_flags, button::LEFT_UP);
    }

    #[test]
    fn seven_byte_reports_without_report_id() {
        let mut p = vec![0x00u8];
        p.extend_from_slice(&20i16.to_le_bytes());
        p.extend_from_slice(&(-20i16).to_le_bytes());
        p.extend_from_slice(&[0, 0]);
        let bytes = stream(&[record(5, 1, 3, 1, true, &p)]);

        let mut src = UsbPcapSource::new(Cursor::new(bytes), None);
        let e = src.next_event().unwrap().unwrap();
        assert_eq!((e.dx, e.dy), (20, -20));
    }

    #[test]
    fn target_filter_and_direction() {
        let target: TargetDevice = "1.3.1".parse().unwrap();
        let bytes = stream(&[
            record(0, 1, 3, 1, false, &report8(0, 1, 1)), // OUT direction
            record(1, 2, 3, 1, true, &report8(0, 2, 2)),  // wrong bus
            record(2, 1, 3, 1, true, &report8(0, 3, 3)),  // match
        ]);
        let mut src = UsbPcapSource::new(Cursor::new(bytes), Some(target));

        let e = src.next_event().unwrap().unwrap();
        assert_eq!((e.dx, e.dy), (3, 3));
        assert!(src.next_event().unwrap().is_none());
    }

    #[test]
    fn split_reads_reassemble() {
        let bytes = stream(&[record(9, 1, 3, 1, true, &report8(0, 42, 0))]);
        // A reader that returns one byte at a time.
        struct OneByte(Cursor<Vec<u8>>);
        impl Read for OneByte {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                let n = 1.min(buf.len());
                self.0.read(&mut buf[..n])
            }
        }
        let mut src = UsbPcapSource::new(OneByte(Cursor::new(bytes)), None);
        let e = src.next_event().unwrap().unwrap();
        assert_eq!(e.dx, 42);
    }

    #[test]
    fn device_string_parsing() {
        let t: TargetDevice = "2.14.3".parse().unwrap();
        assert_eq!(t, TargetDevice { bus_id: 2, device_address: 14, endpoint: 3 });
        assert!("2.14".parse::<TargetDevice>().is_err());
        assert!("a.b.c".parse::<TargetDevice>().is_err());
    }

    #[test]
    fn capture_loop_feeds_engine() {
        use crate::capture::Command;

        let bytes = stream(&[
            record(0, 1, 3, 1, true, &report8(0x01, 0, 0)),
            record(1000, 1, 3, 1, true, &report8(0x01, 100, 0)),
            record(2000, 1, 3, 1, true, &report8(0x00, 0, 0)),
        ]);
        let src = UsbPcapSource::new(Cursor::new(bytes), None);

        let engine = Arc::new(Mutex::new(CaptureEngine::new(PCAP_TICKS_PER_SEC)));
        engine.lock().unwrap().handle_command(Command::Collect);
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = std::sync::mpsc::channel();

        run_capture(src, engine.clone(), stop, tx).unwrap();

        let outcome = rx.try_recv().unwrap();
        assert!(matches!(outcome, CycleOutcome::Collected { summary, .. } if summary.net_x == 100));
    }
}
