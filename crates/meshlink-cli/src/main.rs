//! `meshlink`: run a host-side mesh node against a serial-attached LoRa modem.
//!
//! ```bash
//! # Listen and print traffic, announcing ourselves every 30 s
//! meshlink --address 0x0002 listen --hello-every 30
//!
//! # Send a message once node 0x0002 has been heard from
//! meshlink --address 0x0001 send --to 0x0002 hola
//!
//! # Ask node 0x0002 to toggle its LED
//! meshlink command --to 0x0002 led
//! ```

mod config;
mod runner;
mod serial;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use meshlink_node::{
    Delivery, MonotonicClock, NodeError, NodeEvent, ProtocolStack, RemoteCommand,
};
use meshlink_packet::NodeAddress;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub use config::{CliConfig, SerialConfig};
use runner::{Outcome, Runner};
use serial::SerialTransport;

// ============================================================================
// Errors
// ============================================================================

/// Errors that end the process.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Node(#[from] NodeError),

    #[error("failed to open serial port: {0}")]
    Serial(#[from] serialport::Error),

    #[error("failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("node {0} was not heard from")]
    Unreachable(NodeAddress),

    #[error("message {0} was not acknowledged")]
    NotDelivered(u16),
}

// ============================================================================
// Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "meshlink")]
#[command(about = "Mesh node driving a LoRa modem over a serial link")]
struct Cli {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Local node address (hex, e.g. 0x0002)
    #[arg(short, long, value_parser = parse_address)]
    address: Option<NodeAddress>,

    /// Serial device of the modem
    #[arg(short, long)]
    device: Option<String>,

    /// Serial line speed
    #[arg(short, long)]
    baud: Option<u32>,

    /// Log filter (overrides RUST_LOG), e.g. "debug" or "meshlink_node=trace"
    #[arg(long)]
    log_level: Option<String>,

    /// Allow reliable sends to nodes no Hello has been received from
    #[arg(long)]
    no_neighbor_check: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the node and print received traffic until interrupted
    Listen {
        /// Send a Hello every N seconds
        #[arg(long, value_name = "SECS")]
        hello_every: Option<u64>,
    },
    /// Broadcast a single Hello
    Hello,
    /// Listen for a while, then list the nodes heard from
    Neighbors {
        /// How long to listen
        #[arg(long, default_value_t = 10, value_name = "SECS")]
        listen: u64,
    },
    /// Send a message to one node and wait for its Ack
    Send {
        #[arg(long, value_parser = parse_address)]
        to: NodeAddress,
        /// How long to wait for a Hello from the destination
        #[arg(long, default_value_t = 10, value_name = "SECS")]
        discover: u64,
        text: String,
    },
    /// Send a message to every node
    Broadcast { text: String },
    /// Ask a node to drive its modem (test, led or oled)
    Command {
        #[arg(long, value_parser = parse_address)]
        to: NodeAddress,
        #[arg(long, default_value_t = 10, value_name = "SECS")]
        discover: u64,
        kind: RemoteCommand,
        /// Display text for `oled`
        text: Option<String>,
    },
    /// Send a raw command to the locally attached modem
    Device {
        /// Command code (0-15)
        #[arg(value_parser = clap::value_parser!(u8).range(0..16))]
        cmd: u8,
        /// Command data, truncated to 63 bytes
        data: Option<String>,
    },
}

/// Parse a node address given as hex, with or without `0x`.
fn parse_address(s: &str) -> Result<NodeAddress, String> {
    s.parse::<NodeAddress>()
        .map_err(|e| format!("invalid address '{}': {}", s, e))
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    if let Err(e) = run(cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Merge the config file with command-line overrides.
fn load_config(cli: &Cli) -> Result<CliConfig, CliError> {
    let mut config = match &cli.config {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::default(),
    };
    if let Some(address) = cli.address {
        config.node.address = address;
    }
    if let Some(device) = &cli.device {
        config.serial.device = device.clone();
    }
    if let Some(baud) = cli.baud {
        config.serial.baud_rate = baud;
    }
    if cli.no_neighbor_check {
        config.node.require_known_neighbor = false;
    }
    if let Command::Listen {
        hello_every: Some(secs),
    } = cli.command
    {
        config.hello_interval_secs = Some(secs);
    }
    config.node.validate()?;
    Ok(config)
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(&cli)?;

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = running.clone();
    ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst))?;

    meshlink_metrics::describe_metrics();

    let transport = SerialTransport::open(&config.serial)?;
    let stack = ProtocolStack::new(config.node.clone(), transport, MonotonicClock::new())?;
    let mut runner = Runner::new(stack, running, config.poll_interval())
        .with_hello_interval(config.hello_interval());

    info!(
        "node {} on {} at {} baud",
        config.node.address, config.serial.device, config.serial.baud_rate
    );

    match cli.command {
        Command::Listen { .. } => {
            runner.announce()?;
            runner.run(|_, event| {
                print_event(event);
                true
            });
        }
        Command::Hello => {
            runner.announce()?;
        }
        Command::Neighbors { listen } => {
            runner.announce()?;
            runner.listen_for(Duration::from_secs(listen), print_event);
            let neighbors = runner.stack().neighbor_list();
            if neighbors.is_empty() {
                println!("no nodes heard");
            }
            for (address, age) in neighbors {
                println!("{}  last hello {}s ago", address, age.as_secs());
            }
        }
        Command::Send {
            to,
            discover,
            ref text,
        } => {
            ensure_reachable(&mut runner, to, discover)?;
            let id = runner.stack_mut().send_unicast(to, text.as_bytes())?;
            await_delivery(&mut runner, id)?;
        }
        Command::Broadcast { ref text } => {
            runner.stack_mut().send_broadcast(text.as_bytes())?;
        }
        Command::Command {
            to,
            discover,
            kind,
            ref text,
        } => {
            ensure_reachable(&mut runner, to, discover)?;
            let data = text.as_deref().unwrap_or("").as_bytes();
            let id = runner.stack_mut().send_remote_command(to, kind, data)?;
            await_delivery(&mut runner, id)?;
        }
        Command::Device { cmd, ref data } => {
            let data = data.as_deref().unwrap_or("").as_bytes();
            runner.stack_mut().send_device_command(cmd, data)?;
        }
    }

    Ok(())
}

fn ensure_reachable<T, C>(
    runner: &mut Runner<T, C>,
    to: NodeAddress,
    discover_secs: u64,
) -> Result<(), CliError>
where
    T: meshlink_node::Transport,
    C: meshlink_node::Clock,
{
    if runner.stack().can_reach(to) {
        return Ok(());
    }
    info!("waiting up to {}s for a hello from {}", discover_secs, to);
    runner.announce()?;
    if runner.wait_for_neighbor(to, Duration::from_secs(discover_secs), print_event) {
        Ok(())
    } else {
        Err(CliError::Unreachable(to))
    }
}

fn await_delivery<T, C>(runner: &mut Runner<T, C>, id: u16) -> Result<(), CliError>
where
    T: meshlink_node::Transport,
    C: meshlink_node::Clock,
{
    match runner.wait_for_outcome(id, print_event) {
        Outcome::Acknowledged => {
            println!("message {} delivered", id);
            Ok(())
        }
        Outcome::Failed => Err(CliError::NotDelivered(id)),
        Outcome::Interrupted => {
            info!("interrupted before message {} was acknowledged", id);
            Ok(())
        }
    }
}

fn print_event(event: &NodeEvent) {
    match event {
        NodeEvent::MessageReceived {
            from,
            delivery,
            payload,
            ..
        } => {
            let kind = match delivery {
                Delivery::Unicast => "unicast",
                Delivery::Broadcast => "broadcast",
            };
            println!("[{}] {} {}", from, kind, String::from_utf8_lossy(payload));
        }
        NodeEvent::RemoteCommandReceived { from, kind, .. } => {
            println!("[{}] {} command", from, kind);
        }
        NodeEvent::DeliveryFailed {
            destination,
            message_id,
        } => {
            println!("message {} to {} not acknowledged", message_id, destination);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x0002"), Ok(NodeAddress(2)));
        assert_eq!(parse_address("2"), Ok(NodeAddress(2)));
        assert_eq!(parse_address("ffff"), Ok(NodeAddress::BROADCAST));
        assert!(parse_address("0xZZ").is_err());
    }

    #[test]
    fn test_cli_send() {
        let cli = Cli::try_parse_from(["meshlink", "-a", "0x0001", "send", "--to", "0x0002", "hola"])
            .expect("valid args");
        assert_eq!(cli.address, Some(NodeAddress(1)));
        match cli.command {
            Command::Send { to, discover, text } => {
                assert_eq!(to, NodeAddress(2));
                assert_eq!(discover, 10);
                assert_eq!(text, "hola");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_remote_command() {
        let cli = Cli::try_parse_from(["meshlink", "command", "--to", "2", "oled", "hi there"])
            .expect("valid args");
        match cli.command {
            Command::Command { kind, text, .. } => {
                assert_eq!(kind, RemoteCommand::Oled);
                assert_eq!(text.as_deref(), Some("hi there"));
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(Cli::try_parse_from(["meshlink", "command", "--to", "2", "blink"]).is_err());
    }

    #[test]
    fn test_cli_device_code_range() {
        assert!(Cli::try_parse_from(["meshlink", "device", "7", "hi"]).is_ok());
        assert!(Cli::try_parse_from(["meshlink", "device", "16"]).is_err());
    }

    #[test]
    fn test_overrides_applied() {
        let cli = Cli::try_parse_from([
            "meshlink",
            "--address",
            "0x0003",
            "--device",
            "/dev/ttyACM0",
            "--baud",
            "9600",
            "--no-neighbor-check",
            "listen",
            "--hello-every",
            "15",
        ])
        .expect("valid args");
        let config = load_config(&cli).expect("valid config");
        assert_eq!(config.node.address, NodeAddress(3));
        assert_eq!(config.serial.device, "/dev/ttyACM0");
        assert_eq!(config.serial.baud_rate, 9600);
        assert!(!config.node.require_known_neighbor);
        assert_eq!(config.hello_interval_secs, Some(15));
    }

    #[test]
    fn test_broadcast_address_rejected() {
        let cli = Cli::try_parse_from(["meshlink", "-a", "0xFFFF", "hello"]).expect("valid args");
        assert!(matches!(load_config(&cli), Err(CliError::Node(NodeError::Config(_)))));
    }
}
