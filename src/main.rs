use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::PathBuf;
use std::process;

use clap_verbosity_flag::{InfoLevel, Verbosity};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use pwa_lib::constants::DEFAULT_BAUD_RATE;
use pwa_lib::{CommandFrame, DeviceStatus, Reading, SerialPortLink, SessionConfig, Setting, TransportSession, WireOrder};

/// Read and write parameters of a PWA water-softener controller over its UART link.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Serial port the controller is attached to (e.g., /dev/ttyUSB0).
    #[arg(short, long, global = true)]
    port: Option<String>,
    #[arg(short, long, global = true, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,
    /// JSON file with session settings. Flags below override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Byte order of the controller revision: header-first or trailer-first.
    #[arg(long, global = true, value_parser = parse_wire_order)]
    wire_order: Option<WireOrder>,
    /// Polling ticks to wait for a reply before giving up.
    #[arg(long, global = true)]
    timeout_ticks: Option<u32>,
    /// Length of one polling tick in milliseconds.
    #[arg(long, global = true)]
    tick_ms: Option<u64>,
    /// Report unframed bytes as a decode mismatch instead of a timeout.
    #[arg(long, global = true)]
    strict: bool,
    /// Reject DATA replies that echo a different parameter id.
    #[arg(long, global = true)]
    enforce_param_id: bool,
    /// Verify the checksum byte of replies.
    #[arg(long, global = true)]
    verify_checksum: bool,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long, global = true)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read one parameter (name such as `salt-level`, or a numeric id)
    Get { reading: String },
    /// Write one parameter (name such as `recharge-time`, or a numeric id)
    Set {
        setting: String,
        #[arg(allow_hyphen_values = true)]
        value: i32,
    },
    /// Read every known parameter in turn
    Dump,
    /// Print a request frame in hex without opening a port
    Encode {
        #[command(subcommand)]
        frame: EncodeCommand,
    },
    /// Parse a hex-encoded request frame
    Decode { hex: String },
}

#[derive(Subcommand, Debug)]
enum EncodeCommand {
    Get {
        param: String,
    },
    Set {
        param: String,
        #[arg(allow_hyphen_values = true)]
        value: i32,
    },
}

fn parse_wire_order(s: &str) -> Result<WireOrder, String> {
    match s {
        "header-first" => Ok(WireOrder::HeaderFirst),
        "trailer-first" => Ok(WireOrder::TrailerFirst),
        other => Err(format!("unknown wire order '{}' (expected header-first or trailer-first)", other)),
    }
}

fn setup_logging(log_file_path: Option<PathBuf>, verbosity: &Verbosity<InfoLevel>) -> Result<Option<WorkerGuard>> {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .without_time();

    let (file_layer, guard) = if let Some(ref path) = log_file_path {
        let log_file = File::create(path).with_context(|| format!("Failed to create log file at: {:?}", path))?;
        let (non_blocking_writer, guard) = tracing_appender::non_blocking(log_file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false)
            .with_target(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    // INFO by default, DEBUG with -v (frame hex dumps), TRACE with -vv (cycle states)
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let Some(path) = log_file_path {
        info!("Logging to file: {:?}", path);
    }

    Ok(guard)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = setup_logging(cli.log_file.clone(), &cli.verbose)?;

    if let Err(e) = run(&cli) {
        error!("{:?}", e);
        process::exit(1);
    }

    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Get { reading } => get(cli, reading),
        Command::Set { setting, value } => set(cli, setting, *value),
        Command::Dump => dump(cli),
        Command::Encode { frame } => encode(cli, frame),
        Command::Decode { hex } => decode(cli, hex),
    }
}

fn session_config(cli: &Cli) -> Result<SessionConfig> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::from_json_file(path)
            .with_context(|| format!("Failed to load session config from {:?}", path))?,
        None => SessionConfig::default(),
    };

    if let Some(order) = cli.wire_order {
        config.wire_order = order;
    }
    if let Some(ticks) = cli.timeout_ticks {
        config.timeout_ticks = ticks;
    }
    if let Some(ms) = cli.tick_ms {
        config.tick_ms = ms;
    }
    config.strict_framing |= cli.strict;
    config.enforce_param_id_match |= cli.enforce_param_id;
    config.verify_reply_checksum |= cli.verify_checksum;

    config.validate().context("Invalid session settings")?;
    Ok(config)
}

fn open_session(cli: &Cli) -> Result<TransportSession<SerialPortLink>> {
    let config = session_config(cli)?;
    let port = cli
        .port
        .as_deref()
        .context("--port is required for commands that talk to the controller")?;
    let link = SerialPortLink::open(port, cli.baud, config.tick())
        .with_context(|| format!("Failed to open serial port {}", port))?;
    info!(wire_order = %config.wire_order, timeout_ticks = config.timeout_ticks, "Session ready");
    Ok(TransportSession::new(link, config))
}

/// Resolve a reading by name or numeric id
fn resolve_reading(arg: &str) -> Result<(u16, Option<Reading>)> {
    if let Some(reading) = Reading::from_name(arg) {
        return Ok((reading.id(), Some(reading)));
    }
    let id: u16 = arg.parse().map_err(|_| anyhow!("Unknown reading '{}'", arg))?;
    Ok((id, Reading::try_from(id).ok()))
}

/// Resolve a setting by name or numeric id
fn resolve_setting(arg: &str) -> Result<u16> {
    if let Some(setting) = Setting::from_name(arg) {
        return Ok(setting.id());
    }
    arg.parse().map_err(|_| anyhow!("Unknown setting '{}'", arg))
}

fn print_reading(label: &str, reading: Option<Reading>, value: i32, status: DeviceStatus) {
    match (status, reading) {
        (DeviceStatus::Data, Some(reading)) => println!("{}: {}", label, reading.interpret(value)),
        (DeviceStatus::Data, None) => println!("{}: {}", label, value),
        (status, _) => println!("{}: <{}>", label, status),
    }
}

fn get(cli: &Cli, arg: &str) -> Result<()> {
    let (id, reading) = resolve_reading(arg)?;
    let mut session = open_session(cli)?;
    let reply = session
        .get_value(id)
        .with_context(|| format!("GET {} failed", arg))?;
    print_reading(arg, reading, reply.value, reply.status);
    Ok(())
}

fn set(cli: &Cli, arg: &str, value: i32) -> Result<()> {
    let id = resolve_setting(arg)?;
    let mut session = open_session(cli)?;
    let status = session
        .set_value(id, value)
        .with_context(|| format!("SET {} = {} failed", arg, value))?;
    println!("{} = {}: {}", arg, value, status);
    if !status.is_success() {
        bail!("Controller refused {} = {} ({})", arg, value, status);
    }
    Ok(())
}

fn dump(cli: &Cli) -> Result<()> {
    let mut session = open_session(cli)?;
    let mut failures = 0;

    for reading in Reading::ALL {
        let label = reading.to_string();
        match session.get_value(reading) {
            Ok(reply) => print_reading(&label, Some(reading), reply.value, reply.status),
            Err(e) => {
                warn!(id = reading.id(), "GET {} failed: {}", label, e);
                println!("{}: <{}>", label, e);
                failures += 1;
            }
        }
    }

    if failures == Reading::ALL.len() {
        bail!("No reading could be retrieved");
    }
    Ok(())
}

fn encode(cli: &Cli, frame: &EncodeCommand) -> Result<()> {
    let codec = session_config(cli)?.codec();
    let encoded = match frame {
        EncodeCommand::Get { param } => codec.encode_get(resolve_reading(param)?.0).to_vec(),
        EncodeCommand::Set { param, value } => codec.encode_set(resolve_setting(param)?, *value).to_vec(),
    };
    println!("{}", hex::encode(encoded));
    Ok(())
}

fn decode(cli: &Cli, hex_frame: &str) -> Result<()> {
    let order = session_config(cli)?.wire_order;
    let raw = hex::decode(hex_frame.replace([' ', ':'], "")).context("Frame is not valid hex")?;
    let frame = CommandFrame::decode(&raw, order).context("Not a valid request frame")?;

    let name = Reading::try_from(frame.param_id)
        .map(|r| r.to_string())
        .unwrap_or_else(|_| frame.param_id.to_string());
    match frame.payload {
        Some(value) => println!("command {:#04x} param {} value {}", frame.command, name, value),
        None => println!("command {:#04x} param {}", frame.command, name),
    }
    Ok(())
}
