//! UartLink CLI
//!
//! Sends framed commands to a microcontroller and monitors what it reports
//! back. Data goes to stdout, diagnostics to stderr.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::codec::FramedRead;
use tracing_subscriber::EnvFilter;
use uartlink_core::cli::{print_exit_codes, CliResult};
use uartlink_core::config::{self, AppConfig, ConfigError};
use uartlink_core::core::codec::{create_codec, format_hex, parse_hex, Codec, CodecType, TextCodec};
use uartlink_core::core::protocol::{
    dispatch, FrameCodec, FrameShape, Output, OutputCommand, ParseEvent,
};
use uartlink_core::core::session::{Session, SessionEvent};
use uartlink_core::core::transport::{list_ports, SerialConfig, SerialFlowControl, SerialParity};
use uartlink_core::DeviceEvent;

/// CLI output format
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable text
    Text,
    /// One JSON object per line
    Json,
}

/// Output switch position
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Switch {
    /// Turn on
    On,
    /// Turn off
    Off,
}

/// UartLink CLI
#[derive(Parser, Debug)]
#[command(
    name = "uartlink",
    author = "UartLink Team",
    version,
    about = "Framed serial link to a microcontroller",
    long_about = None
)]
struct Cli {
    /// Output format
    #[arg(long, value_enum, global = true, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file (defaults to the per-user config directory)
    #[arg(long, global = true, env = "UARTLINK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Serial settings; anything omitted comes from the config file
#[derive(Args, Debug)]
struct ConnArgs {
    /// Serial port name (e.g., COM3, /dev/ttyUSB0)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Data bits (5-8)
    #[arg(long)]
    data_bits: Option<u8>,

    /// Parity (none, odd, even)
    #[arg(long)]
    parity: Option<SerialParity>,

    /// Stop bits (1, 2)
    #[arg(long)]
    stop_bits: Option<u8>,

    /// Flow control (none, hw, sw)
    #[arg(long)]
    flow: Option<SerialFlowControl>,

    /// Read/write timeout (ms)
    #[arg(long)]
    timeout_ms: Option<u64>,
}

impl ConnArgs {
    fn apply(&self, mut cfg: SerialConfig) -> SerialConfig {
        if let Some(port) = &self.port {
            cfg.port.clone_from(port);
        }
        if let Some(baud) = self.baud {
            cfg.baud_rate = baud;
        }
        if let Some(bits) = self.data_bits {
            cfg.data_bits = bits;
        }
        if let Some(parity) = self.parity {
            cfg.parity = parity;
        }
        if let Some(bits) = self.stop_bits {
            cfg.stop_bits = bits;
        }
        if let Some(flow) = self.flow {
            cfg.flow_control = flow;
        }
        if let Some(ms) = self.timeout_ms {
            cfg.timeout_ms = ms;
        }
        cfg
    }
}

/// Outbound frame shape; anything omitted comes from the config file
#[derive(Args, Debug)]
struct FrameArgs {
    /// Header bytes as hex (e.g., "EF 01")
    #[arg(long)]
    header: Option<String>,

    /// Trailer bytes as hex; "" for none
    #[arg(long)]
    tail: Option<String>,

    /// Append CRC-16
    #[arg(long, overrides_with = "no_crc")]
    crc: bool,

    /// Do not append CRC-16
    #[arg(long, overrides_with = "crc")]
    no_crc: bool,

    /// Emit the length field
    #[arg(long, overrides_with = "no_length")]
    length: bool,

    /// Do not emit the length field
    #[arg(long, overrides_with = "length")]
    no_length: bool,
}

impl FrameArgs {
    fn shape(&self, base: &config::FrameConfig) -> Result<FrameShape, ConfigError> {
        let mut frame = base.clone();
        if let Some(header) = &self.header {
            frame.header.clone_from(header);
        }
        if let Some(tail) = &self.tail {
            frame.tail.clone_from(tail);
        }
        if self.crc || self.no_crc {
            frame.crc = self.crc;
        }
        if self.length || self.no_length {
            frame.length = self.length;
        }
        frame.shape()
    }
}

/// How DATA arguments are interpreted
#[derive(Args, Debug)]
struct InputArgs {
    /// DATA is hex
    #[arg(long, conflicts_with = "text")]
    hex: bool,

    /// DATA is ASCII text
    #[arg(long)]
    text: bool,
}

impl InputArgs {
    fn mode(&self, default: CodecType) -> CodecType {
        if self.hex {
            CodecType::Hex
        } else if self.text {
            CodecType::Text
        } else {
            default
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available serial ports
    Ports {
        /// Show detailed info
        #[arg(short, long)]
        detailed: bool,
    },

    /// Print link traffic and decoded frames until interrupted
    Monitor {
        #[command(flatten)]
        conn: ConnArgs,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Send raw text or hex
    Send {
        #[command(flatten)]
        conn: ConnArgs,

        #[command(flatten)]
        input: InputArgs,

        /// Append CR LF to text
        #[arg(long)]
        newline: bool,

        /// Keep printing received data for this many milliseconds
        #[arg(long, default_value_t = 0)]
        listen: u64,

        /// Data to send
        data: String,
    },

    /// Send a payload wrapped in a frame
    Frame {
        #[command(flatten)]
        conn: ConnArgs,

        #[command(flatten)]
        frame: FrameArgs,

        #[command(flatten)]
        input: InputArgs,

        /// Keep printing received data for this many milliseconds
        #[arg(long, default_value_t = 0)]
        listen: u64,

        /// Payload
        data: String,
    },

    /// Switch an output on the device
    Led {
        #[command(flatten)]
        conn: ConnArgs,

        /// Output (led0, led1)
        output: Output,

        /// New state
        #[arg(value_enum)]
        state: Switch,

        /// Keep printing received data for this many milliseconds
        #[arg(long, default_value_t = 0)]
        listen: u64,
    },

    /// Print the wire bytes for a payload without opening a port
    Pack {
        #[command(flatten)]
        frame: FrameArgs,

        #[command(flatten)]
        input: InputArgs,

        /// Payload
        data: String,
    },

    /// Run the receive parser over captured bytes
    Decode {
        /// Binary capture file
        #[arg(long, conflicts_with = "data")]
        file: Option<PathBuf>,

        /// Hex bytes
        data: Option<String>,
    },

    /// Configuration file management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print the exit code table
    ExitCodes,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the configuration file location
    Path,
    /// Write the effective configuration to the config file
    Init,
}

/// Renders session events for the terminal
struct Printer {
    format: OutputFormat,
    timestamps: bool,
    codec: Box<dyn Codec>,
}

impl Printer {
    fn new(cli: &Cli, config: &AppConfig) -> Self {
        Self {
            format: cli.format,
            timestamps: config.display.timestamps,
            codec: create_codec(config.display.mode),
        }
    }

    fn print(&self, event: &SessionEvent) {
        match self.format {
            OutputFormat::Json => {
                let mut value = serde_json::to_value(event).unwrap_or_default();
                if let Some(obj) = value.as_object_mut() {
                    obj.insert("time".into(), chrono::Local::now().to_rfc3339().into());
                }
                println!("{value}");
            }
            OutputFormat::Text => {
                let line = match event {
                    SessionEvent::StateChanged { status, .. } => status.clone(),
                    SessionEvent::DataReceived { data } => {
                        format!("RX {}", self.codec.encode(data))
                    }
                    SessionEvent::DataSent { data } => format!("TX {}", format_hex(data)),
                    SessionEvent::FrameReceived { payload } => {
                        format!("RX(FRAME) {}", format_hex(payload))
                    }
                    SessionEvent::ChecksumMismatch { expected, received } => format!(
                        "RX frame CRC error (expected {expected:04X}, got {received:04X}), dropped"
                    ),
                    SessionEvent::Device(DeviceEvent::Reading(reading)) => {
                        format!("Reading: {reading}")
                    }
                    SessionEvent::OutputChanged { output, on } => {
                        format!("{output} {}", if *on { "on" } else { "off" })
                    }
                };
                if self.timestamps {
                    println!("[{}] {line}", chrono::Local::now().format("%H:%M:%S%.3f"));
                } else {
                    println!("{line}");
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    let result = match run(&cli).await {
        Ok(()) => CliResult::success(),
        Err(err) => CliResult::from_error(&err),
    };

    if !result.is_success() {
        if let Some(msg) = result.message() {
            eprintln!("error: {msg}");
        }
    }
    result.to_exit_code()
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match cli.format {
        OutputFormat::Json => builder.json().init(),
        OutputFormat::Text => builder.init(),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => match AppConfig::load() {
            Err(ConfigError::NoConfigDir) => AppConfig::default(),
            other => other?,
        },
    };
    Ok(config)
}

fn decode_input(mode: CodecType, data: &str, newline: bool) -> anyhow::Result<Vec<u8>> {
    let bytes = match mode {
        CodecType::Hex => parse_hex(data)?,
        CodecType::Text => TextCodec::new().append_crlf(newline).decode(data)?.to_vec(),
    };
    Ok(bytes)
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let printer = Printer::new(cli, &config);

    match &cli.command {
        Commands::Ports { detailed } => show_ports(cli, *detailed),
        Commands::Monitor { conn, duration } => {
            let (mut session, mut rx) = open_session(&conn.apply(config.serial.clone()))?;
            let limit = duration.map(Duration::from_secs);
            pump_events(&mut rx, &printer, limit).await;
            finish(cli, &mut session);
            Ok(())
        }
        Commands::Send { conn, input, newline, listen, data } => {
            let newline = *newline || config.display.append_newline;
            let bytes = decode_input(input.mode(config.display.mode), data, newline)?;
            let (mut session, mut rx) = open_session(&conn.apply(config.serial.clone()))?;
            session.send(&bytes).await?;
            pump_events(&mut rx, &printer, Some(Duration::from_millis(*listen))).await;
            finish(cli, &mut session);
            Ok(())
        }
        Commands::Frame { conn, frame, input, listen, data } => {
            let shape = frame.shape(&config.frame)?;
            let payload = decode_input(input.mode(config.display.mode), data, false)?;
            let (mut session, mut rx) = open_session(&conn.apply(config.serial.clone()))?;
            session.send_frame(&shape, &payload).await?;
            pump_events(&mut rx, &printer, Some(Duration::from_millis(*listen))).await;
            finish(cli, &mut session);
            Ok(())
        }
        Commands::Led { conn, output, state, listen } => {
            let command = OutputCommand::new(*output, matches!(state, Switch::On));
            let (mut session, mut rx) = open_session(&conn.apply(config.serial.clone()))?;
            session.send_command(command).await?;
            pump_events(&mut rx, &printer, Some(Duration::from_millis(*listen))).await;
            finish(cli, &mut session);
            Ok(())
        }
        Commands::Pack { frame, input, data } => {
            let shape = frame.shape(&config.frame)?;
            let payload = decode_input(input.mode(config.display.mode), data, false)?;
            let wire = shape.pack(&payload);
            match cli.format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({ "frame": format_hex(&wire), "length": wire.len() })
                ),
                OutputFormat::Text => println!("{}", format_hex(&wire)),
            }
            Ok(())
        }
        Commands::Decode { file, data } => {
            decode_capture(&printer, file.as_ref(), data.as_deref()).await
        }
        Commands::Config { action } => handle_config(cli, action, &config),
        Commands::ExitCodes => {
            print_exit_codes();
            Ok(())
        }
    }
}

fn show_ports(cli: &Cli, detailed: bool) -> anyhow::Result<()> {
    let ports = list_ports()?;

    if ports.is_empty() {
        if !cli.quiet {
            eprintln!("No serial ports found.");
        }
        return Ok(());
    }

    match cli.format {
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = ports
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "name": p.port_name,
                        "type": format!("{:?}", p.port_type)
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            let mut names: Vec<_> = ports.iter().collect();
            names.sort_by(|a, b| a.port_name.cmp(&b.port_name));
            for port in names {
                if detailed {
                    println!("{} [{:?}]", port.port_name, port.port_type);
                } else {
                    println!("{}", port.port_name);
                }
            }
        }
    }

    Ok(())
}

fn open_session(
    serial: &SerialConfig,
) -> anyhow::Result<(Session, broadcast::Receiver<SessionEvent>)> {
    let mut session = Session::new();
    let rx = session.subscribe();
    session
        .connect(serial.clone())
        .with_context(|| format!("connecting to {}", serial.connection_info()))?;
    Ok((session, rx))
}

fn finish(cli: &Cli, session: &mut Session) {
    session.disconnect();
    if !cli.quiet {
        eprintln!("{}", session.stats());
    }
}

/// Print events until the limit passes, Ctrl+C, or the stream closes
async fn pump_events(
    rx: &mut broadcast::Receiver<SessionEvent>,
    printer: &Printer,
    limit: Option<Duration>,
) {
    let deadline = async {
        match limit {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            () = &mut deadline => break,
            event = rx.recv() => match event {
                Ok(event) => printer.print(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    // Events already queued (e.g. the write just made) still get printed.
    while let Ok(event) = rx.try_recv() {
        printer.print(&event);
    }
}

async fn decode_capture(
    printer: &Printer,
    file: Option<&PathBuf>,
    data: Option<&str>,
) -> anyhow::Result<()> {
    let input: Box<dyn AsyncRead + Unpin + Send> = match (file, data) {
        (Some(path), _) => Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening {}", path.display()))?,
        ),
        (None, Some(hex)) => Box::new(std::io::Cursor::new(parse_hex(hex)?)),
        (None, None) => bail!("nothing to decode: pass hex DATA or --file"),
    };

    let mut frames = FramedRead::new(input, FrameCodec::default());
    while let Some(event) = frames.next().await {
        match event? {
            ParseEvent::Payload(payload) => {
                let device = dispatch(&payload);
                printer.print(&SessionEvent::FrameReceived { payload });
                if let Some(device) = device {
                    printer.print(&SessionEvent::Device(device));
                }
            }
            ParseEvent::ChecksumMismatch { expected, received } => {
                printer.print(&SessionEvent::ChecksumMismatch { expected, received });
            }
        }
    }
    Ok(())
}

fn handle_config(cli: &Cli, action: &ConfigAction, app: &AppConfig) -> anyhow::Result<()> {
    let path = cli.config.clone().or_else(config::config_path);

    match action {
        ConfigAction::Show => print!("{}", toml::to_string_pretty(app)?),
        ConfigAction::Path => match path {
            Some(path) => println!("{}", path.display()),
            None => bail!(ConfigError::NoConfigDir),
        },
        ConfigAction::Init => {
            let path = path.ok_or(ConfigError::NoConfigDir)?;
            app.save_to(&path)?;
            if !cli.quiet {
                eprintln!("Wrote {}", path.display());
            }
        }
    }
    Ok(())
}
