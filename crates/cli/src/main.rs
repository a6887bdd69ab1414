//! wellspring CLI: inspect and stream Apple Wellspring trackpads.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::ffi::CString;
use std::path::PathBuf;
use std::sync::Mutex;
use wellspring_core::config::{ButtonChannel, DriverConfig};
use wellspring_core::device::{self, DeviceInfo};
use wellspring_core::driver::Wellspring;
use wellspring_core::error::Error;
use wellspring_core::mode::{self, InterfaceMode, ModeState, REPORT_TYPE_FEATURE};
use wellspring_core::profile::{self, Variant};
use wellspring_core::transfer::{Channel, Completion, InterruptHost, TransferId, TransportError};
use wellspring_core::transport::{ControlRequest, ControlTransport, UR_GET_REPORT, UR_SET_REPORT};

/// hidapi read timeout per poll.
const READ_TIMEOUT_MS: i32 = 100;
/// Largest input report we expect.
const READ_BUF_LEN: usize = 512;

/// hidapi-backed host.
///
/// Control requests map onto feature reports. Interrupt transfers are
/// emulated: `submit` arms a read that [`CliHidHost::poll`] performs.
struct CliHidHost {
    device: hidapi::HidDevice,
    armed: Mutex<[Option<(TransferId, usize)>; 2]>,
}

impl CliHidHost {
    fn open(info: &DeviceInfo) -> Result<Self> {
        let api = hidapi::HidApi::new().map_err(|e| anyhow::anyhow!("hidapi init: {e}"))?;
        let path = CString::new(info.path.clone()).context("device path contains NUL")?;
        let device = api.open_path(&path).map_err(|e| {
            anyhow::anyhow!(
                "open HID device (VID=0x{:04X} PID=0x{:04X} path={}): {e}",
                info.vid,
                info.pid,
                info.path
            )
        })?;

        Ok(Self {
            device,
            armed: Mutex::new([None; 2]),
        })
    }

    fn slot(channel: Channel) -> usize {
        match channel {
            Channel::Button => 0,
            Channel::Trackpad => 1,
        }
    }

    fn armed(&self, channel: Channel) -> Option<(TransferId, usize)> {
        self.armed.lock().ok().and_then(|a| a[Self::slot(channel)])
    }

    fn disarm(&self, channel: Channel) {
        if let Ok(mut armed) = self.armed.lock() {
            armed[Self::slot(channel)] = None;
        }
    }

    /// Run one armed trackpad read and report it to the driver.
    ///
    /// Returns `false` when nothing is armed.
    fn poll(&self, driver: &Wellspring<CliHidHost>) -> bool {
        let Some((id, len)) = self.armed(Channel::Trackpad) else {
            return false;
        };
        let mut buf = vec![0u8; READ_BUF_LEN.max(len)];
        match self.device.read_timeout(&mut buf, READ_TIMEOUT_MS) {
            Ok(0) => {}
            Ok(n) => {
                self.disarm(Channel::Trackpad);
                driver.on_transfer_complete(
                    id,
                    Completion::Transferred { len: n },
                    &buf[..n],
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "interrupt read failed");
                self.disarm(Channel::Trackpad);
                driver.on_transfer_complete(
                    id,
                    Completion::Failed(TransportError::Fault),
                    &[],
                );
            }
        }
        true
    }

    fn feature_report_id(req: &ControlRequest) -> wellspring_core::error::Result<u8> {
        let [report_type, report_id] = req.value.to_be_bytes();
        if report_type != REPORT_TYPE_FEATURE {
            return Err(Error::Hid(format!(
                "unsupported report type 0x{report_type:02X}"
            )));
        }
        Ok(report_id)
    }
}

impl ControlTransport for CliHidHost {
    fn control_in(
        &self,
        req: &ControlRequest,
        buf: &mut [u8],
    ) -> wellspring_core::error::Result<usize> {
        if req.request != UR_GET_REPORT {
            return Err(Error::Hid(format!(
                "unsupported IN request 0x{:02X}",
                req.request
            )));
        }
        let mut report = vec![0u8; req.length as usize + 1];
        report[0] = Self::feature_report_id(req)?;
        let n = self
            .device
            .get_feature_report(&mut report)
            .map_err(|e| Error::Hid(format!("get_feature_report: {e}")))?;

        // First byte is the report id
        let payload = report.get(1..n).unwrap_or(&[]);
        let n = payload.len().min(buf.len());
        buf[..n].copy_from_slice(&payload[..n]);
        Ok(n)
    }

    fn control_out(&self, req: &ControlRequest, data: &[u8]) -> wellspring_core::error::Result<()> {
        if req.request != UR_SET_REPORT {
            return Err(Error::Hid(format!(
                "unsupported OUT request 0x{:02X}",
                req.request
            )));
        }
        let mut report = Vec::with_capacity(data.len() + 1);
        report.push(Self::feature_report_id(req)?);
        report.extend_from_slice(data);
        self.device
            .send_feature_report(&report)
            .map_err(|e| Error::Hid(format!("send_feature_report: {e}")))
    }

    fn control_segments(&self, segments: &[&[u8]]) -> wellspring_core::error::Result<()> {
        // hidapi has no raw control pipe; rebuild the request from the setup segment.
        let req = segments
            .first()
            .and_then(|s| ControlRequest::decode(s))
            .ok_or_else(|| Error::Hid("missing setup segment".into()))?;
        let payload = segments.get(1).copied().unwrap_or(&[]);
        self.control_out(&req, payload)
    }
}

impl InterruptHost for CliHidHost {
    fn submit(&self, id: TransferId, len: usize) -> wellspring_core::error::Result<()> {
        let mut armed = self
            .armed
            .lock()
            .map_err(|_| Error::Hid("armed state poisoned".into()))?;
        armed[Self::slot(id.channel)] = Some((id, len));
        tracing::trace!(
            endpoint = format_args!("0x{:02X}", id.channel.endpoint()),
            len,
            "submit"
        );
        Ok(())
    }

    fn clear_stall(&self, channel: Channel) -> wellspring_core::error::Result<()> {
        tracing::debug!(
            endpoint = format_args!("0x{:02X}", channel.endpoint()),
            "hidraw clears stalls itself"
        );
        Ok(())
    }

    fn stop_transfer(&self, channel: Channel) {
        self.disarm(channel);
    }

    fn set_interval(&self, channel: Channel, interval_ms: u32) -> wellspring_core::error::Result<()> {
        tracing::info!(
            channel = %channel,
            interval_ms,
            "polling interval is fixed by the kernel under hidraw; ignoring"
        );
        Ok(())
    }
}

fn first_device(interface: Option<i32>) -> Result<DeviceInfo> {
    let devices = device::discover_devices()?;
    devices
        .into_iter()
        .find(|d| interface.map_or(true, |i| d.interface == i))
        .ok_or_else(|| anyhow::anyhow!("No supported Wellspring trackpad found"))
}

fn parse_mode(name: &str) -> Result<InterfaceMode> {
    match name.to_lowercase().as_str() {
        "raw" | "raw-sensor" => Ok(InterfaceMode::RawSensor),
        "hid" => Ok(InterfaceMode::Hid),
        other => anyhow::bail!("Unknown mode '{other}'. Valid modes: raw, hid"),
    }
}

#[derive(Parser)]
#[command(
    name = "wellspring",
    version,
    about = "Apple Wellspring trackpad mode control and telemetry"
)]
struct Cli {
    /// HID interface number to use (default: first found).
    #[arg(long, global = true)]
    interface: Option<i32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List connected Wellspring trackpads.
    ListDevices,
    /// Show the device profile table.
    Profiles {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
        /// Only this variant (e.g. "wellspring4a", "6").
        variant: Option<String>,
    },
    /// Read the current mode report.
    GetMode,
    /// Switch the device mode.
    SetMode {
        /// Mode: raw or hid.
        mode: String,
    },
    /// Stream decoded frames as JSON lines.
    Stream {
        /// Stop after this many frames.
        #[arg(long, default_value_t = 100)]
        frames: usize,
        /// Driver configuration (JSON).
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("wellspring_core=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::ListDevices => {
            let devices = device::discover_devices()?;
            if devices.is_empty() {
                println!("No Wellspring trackpads found.");
                println!("Ensure you have read/write access to the hidraw node.");
            } else {
                for dev in &devices {
                    let name = profile::lookup(dev.variant)?.name;
                    let status = match CliHidHost::open(dev) {
                        Ok(host) => format!("{:?}", wellspring_core::comm::check_device_status(&host)),
                        Err(e) => {
                            tracing::debug!("open failed: {e:#}");
                            "Unavailable".to_string()
                        }
                    };
                    println!(
                        "{} (VID: 0x{:04X}, PID: 0x{:04X}, interface: {}, path: {}) [{}]",
                        name, dev.vid, dev.pid, dev.interface, dev.path, status
                    );
                }
            }
        }
        Commands::Profiles { json, variant } => {
            let selected = match variant {
                Some(name) => {
                    let v = Variant::from_name(&name)
                        .ok_or_else(|| anyhow::anyhow!("Unknown variant '{name}'"))?;
                    vec![profile::lookup(v)?]
                }
                None => profile::profiles().iter().collect(),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&selected)?);
            } else {
                for p in selected {
                    let pids = device::product_ids(p.variant)
                        .map(|pid| format!("0x{pid:04X}"))
                        .collect::<Vec<_>>()
                        .join(", ");
                    println!("{} [{}]", p.name, pids);
                    println!(
                        "  header: {} bytes, trackpad frame: {} bytes, button frame: {} bytes, flags: 0x{:X}",
                        p.header_len(),
                        p.trackpad_frame_len,
                        p.button_frame_len,
                        p.features.bits()
                    );
                    for (label, axis) in [
                        ("pressure", p.pressure),
                        ("width", p.width),
                        ("x", p.x),
                        ("y", p.y),
                    ] {
                        println!(
                            "  {label:>8}: res {:>5}, noise {}, range {}..={}",
                            axis.resolution, axis.noise, axis.min, axis.max
                        );
                    }
                }
            }
        }
        Commands::GetMode => {
            let host = CliHidHost::open(&first_device(cli.interface)?)?;
            let mut state = ModeState::new();
            let bytes = wellspring_core::comm::with_retry(wellspring_core::comm::MAX_RETRIES, || {
                mode::query_mode(&host, &mut state)
            })?;
            let label = InterfaceMode::from_byte(bytes[0])
                .map(|m| m.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!("Mode report: {bytes:02X?} ({label})");
        }
        Commands::SetMode { mode: name } => {
            let target = parse_mode(&name)?;
            let host = CliHidHost::open(&first_device(cli.interface)?)?;
            let mut state = ModeState::new();
            wellspring_core::comm::with_retry(wellspring_core::comm::MAX_RETRIES, || {
                mode::switch_mode(&host, &mut state, target)
            })?;
            println!("Mode set to {target}");
        }
        Commands::Stream { frames, config } => {
            let mut config = match config {
                Some(path) => DriverConfig::from_path(&path)?,
                None => DriverConfig::default(),
            };
            // hidraw exposes only the multi-touch interface
            config.button_channel = ButtonChannel::Disabled;

            let info = first_device(cli.interface)?;
            let host = CliHidHost::open(&info)?;
            let driver = Wellspring::attach(host, info.variant, config)?;
            driver.open()?;
            driver.start()?;

            let mut printed = 0;
            while printed < frames {
                if !driver.host().poll(&driver) {
                    if driver.context(Channel::Trackpad).is_halted() {
                        tracing::error!("trackpad channel halted after repeated errors");
                        break;
                    }
                    // Queue full or cancelled: drain, then re-arm
                    driver.start()?;
                    if driver.host().armed(Channel::Trackpad).is_none() {
                        break;
                    }
                }
                for frame in driver.drain_frames() {
                    println!("{}", serde_json::to_string(&frame)?);
                    printed += 1;
                }
            }

            let stopped = driver.stop();
            driver.close();
            stopped?;
        }
    }

    Ok(())
}
