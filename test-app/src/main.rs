// sdrlink test application -- CLI tool for exercising the HiQSDR, UHF
// transceiver, legacy serial and generic drivers against real hardware or
// a mock transport.
//
// Usage:
//   sdrlink-test-app --family hiqsdr --ip 192.168.2.196 info
//   sdrlink-test-app --family hiqsdr --mock freq 7100000 --tx 7100000
//   sdrlink-test-app --family uhf --ip 192.168.1.199 decim list
//   sdrlink-test-app --family uhf --ip 192.168.1.199 decim set 8
//   sdrlink-test-app --family hiqsdr --ip 192.168.2.196 vna --start 1e6 --stop 30e6
//   sdrlink-test-app --family serial --port /dev/ttyUSB0 freq 145500000
//   sdrlink-test-app --family hiqsdr --ip 192.168.2.196 monitor --duration 30
//   sdrlink-test-app discover --ip 192.168.2.10

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use sdrlink::hiqsdr::HiQsdrBuilder;
use sdrlink::serial::SerialLegacyBuilder;
use sdrlink::transport::sndp;
use sdrlink::uhf::UhfBuilder;
use sdrlink::{
    DeviceConfig, DeviceFamily, Generic, HardwareDriver, Mode, SyncState, VnaSweepSpec,
    format_freq_mhz, run_heartbeat,
};
use sdrlink_test_harness::MockTransport;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// sdrlink test application -- drives SDR front-ends from the command line.
#[derive(Parser)]
#[command(name = "sdrlink-test-app", version, about)]
struct Cli {
    /// Device family.
    #[arg(long, value_enum, default_value = "generic")]
    family: Family,

    /// Device IP address (HiQSDR, UHF).
    #[arg(long)]
    ip: Option<Ipv4Addr>,

    /// Netmask of the device's subnet, for SNDP.
    #[arg(long, default_value = "255.255.255.0")]
    netmask: Ipv4Addr,

    /// Disable SNDP address programming.
    #[arg(long)]
    no_sndp: bool,

    /// Serial port path (legacy serial receivers).
    #[arg(long)]
    port: Option<String>,

    /// Override the serial baud rate.
    #[arg(long)]
    baud: Option<u32>,

    /// Initial sample rate in samples per second.
    #[arg(long)]
    rate: Option<u32>,

    /// Use a mock transport that echoes every frame instead of real hardware.
    #[arg(long)]
    mock: bool,

    /// Heartbeat ticks to wait for the device to sync.
    #[arg(long, default_value_t = 30)]
    ticks: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Family {
    Generic,
    Hiqsdr,
    Uhf,
    Serial,
}

#[derive(Subcommand)]
enum Command {
    /// Open the device, sync, and print what it reports.
    Info,

    /// Tune the receiver (and optionally the transmitter).
    Freq {
        /// Receive frequency in hertz.
        vfo_hz: i64,
        /// Transmit frequency in hertz.
        #[arg(long)]
        tx: Option<i64>,
        /// Mode name (e.g. USB, CWU, DGT-U).
        #[arg(long)]
        mode: Option<String>,
        /// Band name, for band filter and tx level tables.
        #[arg(long)]
        band: Option<String>,
    },

    /// Sample rate operations.
    Decim {
        #[command(subcommand)]
        action: DecimAction,
    },

    /// Start a VNA sweep (HiQSDR only).
    Vna {
        #[arg(long)]
        start: f64,
        #[arg(long)]
        stop: f64,
        #[arg(long, default_value_t = 1000)]
        points: u16,
    },

    /// Run the heartbeat and print driver events.
    Monitor {
        /// Duration in seconds (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },

    /// Broadcast an SNDP request and list responders.
    Discover {
        /// Any address on the subnet to search.
        #[arg(long)]
        ip: Ipv4Addr,
        #[arg(long, default_value = "255.255.255.0")]
        netmask: Ipv4Addr,
        /// Listen window in milliseconds.
        #[arg(long, default_value_t = 1000)]
        window_ms: u64,
    },
}

#[derive(Subcommand)]
enum DecimAction {
    /// List the selectable sample rates.
    List,
    /// Select a sample rate by index.
    Set { index: usize },
    /// Select the table entry nearest to a sample rate.
    Rate { rate_hz: u32 },
}

// ---------------------------------------------------------------------------
// Driver construction
// ---------------------------------------------------------------------------

fn build_config(cli: &Cli) -> Result<DeviceConfig> {
    let needs_ip = || {
        cli.ip.or(cli.mock.then_some(Ipv4Addr::LOCALHOST)).context(
            "--ip is required for this family unless --mock is used",
        )
    };
    let mut config = match cli.family {
        Family::Generic => DeviceConfig::generic(),
        Family::Hiqsdr => DeviceConfig::hiqsdr(needs_ip()?),
        Family::Uhf => DeviceConfig::uhf(needs_ip()?),
        Family::Serial => {
            let port = match (&cli.port, cli.mock) {
                (Some(port), _) => port.clone(),
                (None, true) => "mock".to_string(),
                (None, false) => bail!("--port is required for serial receivers"),
            };
            let mut config = DeviceConfig::serial_legacy(&port);
            if let Some(baud) = cli.baud {
                config = config.with_serial(&port, baud);
            }
            config
        }
    };
    if config.network.is_some() {
        config = config
            .with_netmask(cli.netmask)
            .with_sndp(!cli.no_sndp && !cli.mock);
    }
    if let Some(rate) = cli.rate {
        config = config.with_initial_sample_rate(rate);
    }
    Ok(config)
}

fn create_driver(cli: &Cli) -> Result<Box<dyn HardwareDriver>> {
    let config = build_config(cli)?;
    if !cli.mock {
        return sdrlink::open_driver(config).context("failed to build driver");
    }

    let mock = MockTransport::new();
    let handle = mock.handle();
    let driver: Box<dyn HardwareDriver> = match config.family {
        DeviceFamily::Generic => Box::new(Generic::new()),
        DeviceFamily::HiQsdr => {
            handle.echo();
            Box::new(HiQsdrBuilder::new(config).build_with_transport(Box::new(mock))?)
        }
        DeviceFamily::UhfTransceiver => {
            handle.echo();
            Box::new(UhfBuilder::new(config).build_with_transport(Box::new(mock))?)
        }
        DeviceFamily::SerialLegacy => Box::new(
            SerialLegacyBuilder::new(config).build_with_transport(Box::new(mock))?,
        ),
    };
    Ok(driver)
}

/// Run heartbeats until the driver is synced or `ticks` have passed.
async fn settle(driver: &mut dyn HardwareDriver, ticks: u32) -> SyncState {
    let mut state = driver.sync_state();
    for _ in 0..ticks {
        state = driver.heartbeat().await;
        if state == SyncState::Synced {
            break;
        }
        tokio::time::sleep(sdrlink::driver::DEFAULT_HEARTBEAT_INTERVAL).await;
    }
    if state != SyncState::Synced {
        tracing::warn!(?state, ticks, "Device did not sync");
    }
    state
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

async fn cmd_info(driver: &mut dyn HardwareDriver, ticks: u32) -> Result<()> {
    let state = settle(driver, ticks).await;
    let info = driver.info();
    println!("Family:     {}", info.family);
    println!("Model:      {}", info.model_name);
    println!("Sync state: {state}");
    match driver.firmware_version() {
        Some(v) => println!("Firmware:   1.{v}"),
        None => println!("Firmware:   unknown"),
    }
    if let Some(text) = driver.status_text() {
        println!("Status:     {text}");
    }
    if let Some((lo, hi)) = driver.decimation_range() {
        println!("Rates:      {lo} .. {hi} sps");
    }
    Ok(())
}

async fn cmd_freq(
    driver: &mut dyn HardwareDriver,
    ticks: u32,
    vfo_hz: i64,
    tx_hz: Option<i64>,
    mode: Option<&str>,
    band: Option<&str>,
) -> Result<()> {
    if let Some(band) = band {
        driver.set_band(band);
    }
    if let Some(mode) = mode {
        let mode: Mode = mode.parse()?;
        driver.set_mode(mode);
    }
    let tuning = driver.set_frequency(tx_hz, vfo_hz);
    let state = settle(driver, ticks).await;
    println!("VFO:    {}", format_freq_mhz(tuning.vfo_hz as f64));
    println!("Actual: {}", format_freq_mhz(tuning.vfo_actual_hz));
    if tuning.tx_hz > 0 {
        println!("TX:     {}", format_freq_mhz(tuning.tx_hz as f64));
    }
    println!("Sync:   {state}");
    Ok(())
}

async fn cmd_decim(driver: &mut dyn HardwareDriver, ticks: u32, action: &DecimAction) -> Result<()> {
    let choices = driver.decimation_choices();
    if choices.is_empty() {
        bail!("{} has a fixed sample rate", driver.info().model_name);
    }
    match action {
        DecimAction::List => {
            let current = driver.decimation_index();
            for (i, label) in choices.iter().enumerate() {
                let marker = if Some(i) == current { "*" } else { " " };
                println!("{marker} {i:>2}  {label}");
            }
        }
        DecimAction::Set { index } => {
            if *index >= choices.len() {
                bail!("index {index} out of range (0..{})", choices.len());
            }
            let rate = driver.set_decimation(Some(*index));
            let state = settle(driver, ticks).await;
            println!("Sample rate: {rate} sps ({})", choices[*index]);
            println!("Sync:        {state}");
        }
        DecimAction::Rate { rate_hz } => {
            let (index, rate) = driver
                .select_decimation(*rate_hz)
                .context("driver has no rate table")?;
            let state = settle(driver, ticks).await;
            println!("Sample rate: {rate} sps ({})", choices[index]);
            println!("Sync:        {state}");
        }
    }
    Ok(())
}

async fn cmd_vna(
    driver: &mut dyn HardwareDriver,
    ticks: u32,
    start: f64,
    stop: f64,
    points: u16,
) -> Result<()> {
    let spec = VnaSweepSpec::new(start, stop, points).context("invalid sweep")?;
    let endpoints = driver.set_vna(&spec)?;
    let state = settle(driver, ticks).await;
    println!(
        "Sweep {} .. {} in {points} points",
        format_freq_mhz(endpoints.start_hz),
        format_freq_mhz(endpoints.stop_hz)
    );
    println!("Sync: {state}");
    Ok(())
}

async fn cmd_monitor(mut driver: Box<dyn HardwareDriver>, duration_secs: u64) -> Result<()> {
    let mut events = driver.subscribe();
    let cancel = CancellationToken::new();

    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("[event] {event:?}");
        }
    });

    let stopper = cancel.clone();
    tokio::spawn(async move {
        let deadline = (duration_secs > 0).then(|| Instant::now() + Duration::from_secs(duration_secs));
        match deadline {
            Some(at) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(at.into()) => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            None => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
        stopper.cancel();
    });

    println!("Monitoring (Ctrl-C to stop)...");
    run_heartbeat(
        driver.as_mut(),
        sdrlink::driver::DEFAULT_HEARTBEAT_INTERVAL,
        cancel,
    )
    .await?;
    drop(driver);
    printer.await.ok();
    Ok(())
}

async fn cmd_discover(ip: Ipv4Addr, netmask: Ipv4Addr, window_ms: u64) -> Result<()> {
    let broadcast = sndp::broadcast_address(ip, netmask);
    println!("Sending SNDP request to {broadcast} ({window_ms} ms)...");
    let found = sdrlink::transport::discover(broadcast, Duration::from_millis(window_ms))
        .await
        .context("SNDP discovery failed")?;
    if found.is_empty() {
        println!("No devices found.");
        return Ok(());
    }
    println!("{:<22}  {:<12}  Streams to", "Address", "Device");
    println!("{:<22}  {:<12}  {}", "-".repeat(22), "-".repeat(12), "-".repeat(15));
    for r in &found {
        println!("{:<22}  {:<12}  {}", r.addr, format!("{:?}", r.signature), r.configured_ip);
    }
    println!();
    println!("{} device(s) found.", found.len());
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if let Command::Discover {
        ip,
        netmask,
        window_ms,
    } = &cli.command
    {
        return cmd_discover(*ip, *netmask, *window_ms).await;
    }

    let mut driver = create_driver(&cli)?;
    let description = driver.open().await.context("failed to open device")?;
    println!("Opened {description}");

    let result = match &cli.command {
        Command::Info => cmd_info(driver.as_mut(), cli.ticks).await,
        Command::Freq {
            vfo_hz,
            tx,
            mode,
            band,
        } => {
            cmd_freq(
                driver.as_mut(),
                cli.ticks,
                *vfo_hz,
                *tx,
                mode.as_deref(),
                band.as_deref(),
            )
            .await
        }
        Command::Decim { action } => cmd_decim(driver.as_mut(), cli.ticks, action).await,
        Command::Vna {
            start,
            stop,
            points,
        } => cmd_vna(driver.as_mut(), cli.ticks, *start, *stop, *points).await,
        Command::Monitor { duration } => return cmd_monitor(driver, *duration).await,
        Command::Discover { .. } => unreachable!("discover handled above"),
    };

    driver.close().await.ok();
    result
}
