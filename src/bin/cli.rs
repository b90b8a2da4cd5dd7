//! DPA CLI
//!
//! Encodes and decodes DPA frames, evaluates the protocol timing formulas and
//! runs the protocol layer against a simulated network.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use crossbeam::channel;
use tracing_subscriber::{fmt, EnvFilter};

use iqrf_dpa::network::{ChannelTransport, SimulatedNetwork, SimulatorConfig};
use iqrf_dpa::protocol::{
    is_confirmation, CallRequest, Confirmation, DeviceInterface, Message, MessageCodec,
    NodeAddress, Value,
};
use iqrf_dpa::timing::{
    frc_wait_ms, response_wait, timeslot_length, FrcMode, FrcResponseTime, FrcTimingParams,
    RfMode, TrSeries, WaitStrategy,
};
use iqrf_dpa::{Config, ProtocolLayer};

/// DPA CLI
#[derive(Parser, Debug)]
#[command(name = "dpa-cli")]
#[command(about = "IQRF DPA protocol toolbox")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encode a call into a request frame
    Encode {
        /// Node address (0 = coordinator, 255 = broadcast)
        #[arg(short, long, default_value = "0")]
        node: u8,

        /// Device interface, e.g. eeprom
        #[arg(short, long)]
        interface: DeviceInterface,

        /// Method name, e.g. read
        #[arg(short, long)]
        method: String,

        /// Argument as type:value (u8, u16, bool, bytes as hex)
        #[arg(short, long = "arg")]
        args: Vec<String>,

        /// HW profile
        #[arg(long, default_value_t = CallRequest::HWPID_ANY)]
        hwpid: u16,
    },

    /// Decode a response or confirmation frame given in hex
    Decode {
        frame: String,
    },

    /// Evaluate the timing formulas
    Timing {
        #[command(subcommand)]
        command: TimingCommands,
    },

    /// Send requests through the protocol layer to a simulated network
    Simulate {
        /// Number of requests
        #[arg(short, long, default_value = "3")]
        count: usize,

        /// Target node
        #[arg(short, long, default_value = "1")]
        node: u8,

        /// JSON config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum TimingCommands {
    /// Time to wait for a response
    Response {
        #[arg(long, default_value = "1")]
        hops: u8,

        /// Timeslot length in 10 ms units
        #[arg(long, default_value = "4")]
        timeslot: u8,

        /// Request addressed to the coordinator (no confirmation)
        #[arg(long)]
        coordinator: bool,

        /// Base time to wait for response (ms)
        #[arg(long, default_value = "2000")]
        base: u64,
    },

    /// Time to wait for an FRC response
    Frc {
        #[arg(long)]
        nodes: u16,

        /// FRC response time in ms (40, 320, ..., 20480)
        #[arg(long, default_value = "40")]
        response_time: u64,

        #[arg(long, default_value = "0")]
        user_data_len: usize,

        #[arg(long, default_value = "std")]
        rf_mode: RfMode,
    },

    /// Timeslot length of a packet
    Timeslot {
        #[arg(long)]
        len: usize,

        #[arg(long, default_value = "std")]
        rf_mode: RfMode,

        #[arg(long, default_value = "tr72x")]
        tr_series: TrSeries,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,iqrf_dpa=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args.command) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<(), String> {
    match command {
        Commands::Encode { node, interface, method, args, hwpid } => {
            let args = args
                .iter()
                .map(|arg| parse_value(arg))
                .collect::<Result<Vec<_>, _>>()?;
            let request = CallRequest::new("cli", NodeAddress::from_byte(node), interface, method)
                .with_args(args)
                .with_hw_profile(hwpid);

            let frame = MessageCodec::default()
                .encode(&request)
                .map_err(|e| e.to_string())?;
            println!("{}", to_hex(&frame));
        }

        Commands::Decode { frame } => {
            let frame = parse_hex(&frame)?;
            if is_confirmation(&frame) {
                let confirmation = Confirmation::decode(&frame).map_err(|e| e.to_string())?;
                println!("{:#?}", confirmation);
            } else {
                let decoded = MessageCodec::default()
                    .decode_response(&frame)
                    .map_err(|e| e.to_string())?;
                println!("{:#?}", decoded);
            }
        }

        Commands::Timing { command } => run_timing(command)?,

        Commands::Simulate { count, node, config } => {
            let config = match config {
                Some(path) => Config::from_file(path).map_err(|e| e.to_string())?,
                None => Config::default(),
            };
            simulate(&config, count, node)?;
        }
    }

    Ok(())
}

fn run_timing(command: TimingCommands) -> Result<(), String> {
    match command {
        TimingCommands::Response { hops, timeslot, coordinator, base } => {
            let confirmation = Confirmation {
                dpa_value: 0,
                hops,
                timeslot_length: timeslot,
                hops_response: hops,
            };
            let wait = response_wait(
                Duration::from_millis(base),
                &WaitStrategy::Default,
                (!coordinator).then_some(&confirmation),
            );
            println!("{} ms", wait.as_millis());
        }

        TimingCommands::Frc { nodes, response_time, user_data_len, rf_mode } => {
            let response_time = FrcResponseTime::from_millis(response_time)
                .ok_or_else(|| format!("Invalid FRC response time: {} ms", response_time))?;
            let params = FrcTimingParams { bonded_nodes: nodes, rf_mode, response_time };
            let mode = if user_data_len <= 2 { FrcMode::Standard } else { FrcMode::Advanced };
            println!("{} ms", frc_wait_ms(&params, mode));
        }

        TimingCommands::Timeslot { len, rf_mode, tr_series } => {
            let ts = timeslot_length(rf_mode, tr_series, len);
            println!("{} ({} ms)", ts, ts as u64 * 10);
        }
    }

    Ok(())
}

fn simulate(config: &Config, count: usize, node: u8) -> Result<(), String> {
    const NETWORK: &str = "simulated";

    let (transport, frames) = ChannelTransport::new();
    let (messages_tx, messages) = channel::unbounded::<Message>();

    let layer = Arc::new(ProtocolLayer::new(config, Arc::new(transport), Arc::new(messages_tx)));
    layer.start().map_err(|e| e.to_string())?;

    let receiver = Arc::clone(&layer);
    let mut network = SimulatedNetwork::spawn(frames, SimulatorConfig::default(), move |frame, network_id| {
        receiver.on_receive(frame, network_id)
    })
    .map_err(|e| e.to_string())?;

    let target = NodeAddress::from_byte(node);
    let mut sent = 0;
    for _ in 0..count {
        let request = CallRequest::new(NETWORK, target, DeviceInterface::Os, "read");
        match layer.send_request(request) {
            Ok(id) => {
                tracing::info!("Sent request {}", id);
                sent += 1;
            }
            Err(e) => tracing::error!("Send failed: {}", e),
        }
    }

    let wait = config.time_to_wait_for_confirmation() + config.base_time_to_wait_for_response();
    for _ in 0..sent {
        match messages.recv_timeout(wait) {
            Ok(message) => println!("{:#?}", message),
            Err(_) => {
                tracing::warn!("No message within {:?}", wait);
                break;
            }
        }
    }

    network.stop();
    layer.destroy();
    tracing::info!("Network timing after run: {:?}", layer.network_timing(NETWORK));
    Ok(())
}

// =============================================================================
// Argument parsing
// =============================================================================

fn parse_value(arg: &str) -> Result<Value, String> {
    let (kind, value) = arg
        .split_once(':')
        .ok_or_else(|| format!("Argument must be type:value, got {}", arg))?;

    match kind {
        "u8" => parse_int(value)
            .and_then(|v| u8::try_from(v).map_err(|e| e.to_string()))
            .map(Value::U8),
        "u16" => parse_int(value)
            .and_then(|v| u16::try_from(v).map_err(|e| e.to_string()))
            .map(Value::U16),
        "bool" => value
            .parse::<bool>()
            .map(Value::Bool)
            .map_err(|e| e.to_string()),
        "bytes" => parse_hex(value).map(Value::Bytes),
        other => Err(format!("Unknown argument type: {}", other)),
    }
}

fn parse_int(value: &str) -> Result<u64, String> {
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("Invalid number {}: {}", value, e))
}

fn parse_hex(text: &str) -> Result<Vec<u8>, String> {
    let digits: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.' && *c != ':')
        .collect();
    if !digits.is_ascii() || digits.len() % 2 != 0 {
        return Err(format!("Odd number of hex digits: {}", text));
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|e| format!("Invalid hex {}: {}", &digits[i..i + 2], e))
        })
        .collect()
}

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(".")
}
