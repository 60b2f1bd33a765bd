//! CAN monitor on the loopback bus.
//!
//! Lists the channels, opens one, optionally transmits frames given as `ID#DATA`
//! and prints every received message until interrupted with Ctrl-C.
use canapi::bitrate::{Baudrate, CiaIndex, DataPhase};
use canapi::can::ChannelController;
use canapi::config::ChannelConfig;
use canapi::loopback::{cia_timing, LoopbackBus};
use canapi::message::{Message, MessageFlags};
use canapi::mode::OperationMode;
use canapi::transport::Timeout;
use canapi::Error;
use clap::Parser;
use log::{debug, error, info, warn};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "can_moni", version, about = "CAN API V3 monitor (loopback bus)")]
struct Cli {
    /// Channel to open
    #[arg(long, short = 'c', default_value = "0")]
    channel: i32,

    /// Number of channels on the loopback bus
    #[arg(long, default_value = "2")]
    channels: u8,

    /// Nominal bit-rate in kbit/s (1000, 800, 500, 250, 125, 100, 50, 20 or 10)
    #[arg(long, short = 'b', default_value = "250", value_parser = parse_baudrate)]
    baudrate: CiaIndex,

    /// CAN FD operation (data phase at 2 Mbit/s with --brs)
    #[arg(long)]
    fd: bool,

    /// Bit-rate switching
    #[arg(long, requires = "fd")]
    brs: bool,

    /// Monitor mode (listen-only)
    #[arg(long)]
    monitor: bool,

    /// Receive error frames
    #[arg(long)]
    err: bool,

    /// Suppress extended frames
    #[arg(long)]
    no_xtd: bool,

    /// Suppress remote frames
    #[arg(long)]
    no_rtr: bool,

    /// Shared access to the channel
    #[arg(long)]
    shared: bool,

    /// Frames to transmit after start, e.g. `123#DEADBEEF` or `1ABCDEF0#01`
    #[arg(long, short = 's', value_parser = parse_message)]
    send: Vec<Message>,

    /// Stop after this many received messages
    #[arg(long, short = 'n')]
    count: Option<u64>,

    /// Read timeout in milliseconds, blocks until Ctrl-C if omitted
    #[arg(long, short = 't')]
    timeout: Option<u16>,

    /// Debug output
    #[arg(long, short = 'v')]
    verbose: bool,
}

impl Cli {
    fn mode(&self) -> OperationMode {
        let flags = [
            (self.fd, OperationMode::FD_OPERATION),
            (self.brs, OperationMode::BITRATE_SWITCHING),
            (self.shared, OperationMode::SHARED_ACCESS),
            (self.no_xtd, OperationMode::EXTENDED_FRAMES_DISABLED),
            (self.no_rtr, OperationMode::REMOTE_FRAMES_DISABLED),
            (self.err, OperationMode::ERROR_FRAMES_ENABLED),
            (self.monitor, OperationMode::MONITOR_MODE),
        ];

        flags
            .into_iter()
            .filter(|(enabled, _)| *enabled)
            .fold(OperationMode::DEFAULT, |mode, (_, flag)| mode | flag)
    }

    fn baudrate(&self) -> Baudrate {
        if !self.fd {
            return Baudrate::Index(self.baudrate);
        }

        // CAN FD requires bit-timing registers
        let mut bitrate = cia_timing(self.baudrate);
        bitrate.data = DataPhase {
            brp: 2,
            tseg1: 15,
            tseg2: 4,
            sjw: 4,
        };
        Baudrate::Timing(bitrate)
    }

    fn timeout(&self) -> Timeout {
        self.timeout.map_or(Timeout::Infinite, Timeout::from)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("+++ error: {error} ({})", error.code());
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn run(cli: &Cli) -> Result<(), Error> {
    let bus = Arc::new(LoopbackBus::new(cli.channels));
    println!("{}", ChannelController::version(&*bus));

    for channel in ChannelController::channels(&*bus)? {
        let state = ChannelController::probe(&*bus, channel.channel, cli.mode())?;
        println!("  {}: {} ({}, {}) - {state}", channel.channel, channel.name, channel.vendor, channel.driver);
    }

    let config = ChannelConfig::new(cli.channel, cli.mode(), cli.baudrate());
    let mut controller = ChannelController::open(bus, &config)?;
    info!("Channel {} started", cli.channel);

    if let Ok(speed) = controller.speed() {
        println!(
            "Bit-rate: {:.0} kbit/s @ {:.1}%",
            speed.nominal.bus_speed / 1000.0,
            speed.nominal.sample_point
        );
    }

    let canceller = controller.canceller()?;
    if let Err(error) = ctrlc::set_handler(move || {
        if let Err(error) = canceller.signal() {
            warn!("Signal failed: {error}");
        }
    }) {
        warn!("Ctrl-C handler not installed: {error}");
    }

    for message in &cli.send {
        if let Err(error) = controller.write(message, Timeout::Infinite) {
            error!("Write {:#x} failed: {error}", message.raw_id());
        }
    }

    monitor(&mut controller, cli.timeout(), cli.count);

    match controller.status() {
        Ok(status) => println!("Status: {:#04x}", status.as_register()),
        Err(error) => warn!("Status not available: {error}"),
    }
    if let Ok(statistics) = controller.statistics() {
        println!(
            "Frames: {} sent, {} received, {} errors",
            statistics.transmitted, statistics.received, statistics.errors
        );
    }

    controller.reset()?;
    controller.teardown()?;

    Ok(())
}

/// Prints received messages until signalled, the count is reached or a read fails
fn monitor(controller: &mut ChannelController<LoopbackBus>, timeout: Timeout, count: Option<u64>) {
    let mut received = 0u64;

    while count.map_or(true, |count| received < count) {
        match controller.read(timeout) {
            Ok(Some(message)) => {
                received += 1;
                print_message(received, &message);
            }
            Ok(None) => debug!("No message within {timeout:?}"),
            Err(Error::Timeout) => {
                info!("Interrupted");
                break;
            }
            Err(error) => {
                error!("Read failed: {error}");
                break;
            }
        }
    }
}

fn print_message(index: u64, message: &Message) {
    let flags = message.flags();
    let id = if flags.is_extended_frame() {
        format!("{:08X}", message.raw_id())
    } else {
        format!("{:03X}", message.raw_id())
    };
    let kind = [
        (flags.is_extended_frame(), 'X'),
        (flags.is_remote_frame(), 'R'),
        (flags.is_fd_long_frame(), 'F'),
        (flags.is_fd_fast_frame(), 'B'),
        (flags.is_error_state_indicator(), 'E'),
        (flags.is_status_message(), 'S'),
    ]
    .iter()
    .map(|(set, marker)| if *set { *marker } else { ' ' })
    .collect::<String>();
    let data = message
        .payload()
        .iter()
        .map(|byte| format!("{byte:02X}"))
        .collect::<Vec<_>>()
        .join(" ");

    println!(
        "{index:>7}\t{:>10.6}\t{id}\t{kind}\t[{}] {data}",
        message.timestamp().as_secs_f64(),
        message.dlc().len()
    );
}

fn parse_baudrate(value: &str) -> Result<CiaIndex, String> {
    let kbps: u32 = value.parse().map_err(|_| format!("invalid bit-rate '{value}'"))?;
    CiaIndex::from_kbps(kbps).ok_or_else(|| format!("no CiA index for {kbps} kbit/s"))
}

/// Parses `ID#DATA`, identifiers above 0x7FF or with more than three digits are extended
fn parse_message(value: &str) -> Result<Message, String> {
    let (id, data) = value.split_once('#').ok_or("expected ID#DATA")?;
    let raw_id = u32::from_str_radix(id, 16).map_err(|_| format!("invalid identifier '{id}'"))?;

    if !data.is_ascii() || data.len() % 2 != 0 {
        return Err(format!("invalid data '{data}'"));
    }
    let payload = (0..data.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&data[i..i + 2], 16))
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|_| format!("invalid data '{data}'"))?;

    let mut flags = MessageFlags::STANDARD;
    if id.len() > 3 || raw_id > 0x7FF {
        flags |= MessageFlags::EXTENDED;
    }
    if payload.len() > 8 {
        flags |= MessageFlags::FD_LONG;
    }

    Message::from_raw_id(raw_id, flags, &payload).map_err(|error| error.to_string())
}
