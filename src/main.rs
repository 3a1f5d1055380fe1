//! tcproxy: TCP forwarding proxy with source-address routing
//!
//! This is the main entry point for the proxy.
//!
//! # Usage
//!
//! ```bash
//! # Run with a configuration file
//! ./tcproxy /etc/tcproxy.conf
//!
//! # Add a route to the running instance
//! ./tcproxy -c /etc/tcproxy.conf --send "add 10.0.0.1 10.0.0.3:80"
//!
//! # Stop the running instance
//! ./tcproxy -c /etc/tcproxy.conf --send exit
//! ```

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use tcproxy::config::{load_config_with_env, LogConfig};
use tcproxy::{ControlClient, InstanceGuard, TcpProxy};

/// Command-line arguments
struct Args {
    /// Configuration file path
    config_path: Option<PathBuf>,
    /// Check configuration only
    check_config: bool,
    /// Control command to deliver to the running instance
    send: Option<String>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config_path = None;
        let mut check_config = false;
        let mut send = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-c" | "--config" => {
                    if let Some(path) = args.next() {
                        config_path = Some(PathBuf::from(path));
                    }
                }
                "--check" => {
                    check_config = true;
                }
                "-s" | "--send" => {
                    send = args.next();
                }
                "-h" | "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "-v" | "--version" => {
                    println!("tcproxy v{}", tcproxy::VERSION);
                    std::process::exit(0);
                }
                _ if !arg.starts_with('-') && config_path.is_none() => {
                    config_path = Some(PathBuf::from(arg));
                }
                _ => {
                    eprintln!("Unknown argument: {}", arg);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        Self {
            config_path,
            check_config,
            send,
        }
    }
}

fn print_help() {
    println!(
        r#"tcproxy v{}

TCP forwarding proxy routing clients by source address.

USAGE:
    tcproxy [OPTIONS] <CONFIG>

OPTIONS:
    -c, --config <PATH>     Configuration file path
    --check                 Check configuration and exit
    -s, --send <COMMAND>    Send a control command to the running instance
    -h, --help              Print help information
    -v, --version           Print version information

COMMANDS:
    exit                                Stop the running instance
    add <source> <target-host>:<port>   Add or retarget a route

ENVIRONMENT:
    TCPROXY_PORT             Override listen port
    TCPROXY_LOG_LEVEL        Override log level (trace, debug, info, warn, error)
    TCPROXY_CONTROL_PATH     Override control channel path
    TCPROXY_MAX_CONNECTIONS  Override descriptor slots
    RUST_LOG                 Additional log filter directives

EXAMPLE:
    # /etc/tcproxy.conf
    port: 8080
    route: 10.0.0.1 10.0.0.2:8080

    tcproxy /etc/tcproxy.conf
"#,
        tcproxy::VERSION
    );
}

/// Initialize logging
fn init_logging(log: &LogConfig) {
    let level = match log.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(log.target);

    if log.format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Program name used for default runtime paths
fn program_name() -> String {
    std::env::args()
        .next()
        .as_deref()
        .map(Path::new)
        .and_then(Path::file_stem)
        .and_then(|s| s.to_str())
        .unwrap_or("tcproxy")
        .to_string()
}

/// Main application entry point
fn main() -> Result<()> {
    let start_time = Instant::now();

    let args = Args::parse();
    let program = program_name();

    let Some(config_path) = args.config_path else {
        eprintln!("{program}: no configuration file specified");
        print_help();
        std::process::exit(1);
    };

    let config = load_config_with_env(&config_path)
        .map_err(|e| anyhow!("Failed to load configuration from {:?}: {}", config_path, e))?
        .with_program_defaults(&program);

    if args.check_config {
        println!("Configuration is valid");
        println!("  Port: {}", config.port);
        println!("  Routes: {}", config.routes.len());
        println!("  Control channel: {:?}", config.control.path);
        println!("  Max connections: {}", config.reactor.max_connections);
        return Ok(());
    }

    if let Some(command) = args.send {
        let path = config
            .control
            .path
            .clone()
            .ok_or_else(|| anyhow!("No control channel path configured"))?;
        ControlClient::new(&path)
            .send(&command)
            .with_context(|| format!("Failed to send {command:?} to {}", path.display()))?;
        println!("Sent \"{command}\"");
        return Ok(());
    }

    init_logging(&config.log);

    info!("tcproxy v{} starting", tcproxy::VERSION);

    let _guard = if config.instance.enabled {
        let lock_path = config
            .instance
            .lock_path
            .clone()
            .ok_or_else(|| anyhow!("No lock path configured"))?;
        Some(InstanceGuard::acquire(lock_path)?)
    } else {
        None
    };

    let mut proxy = TcpProxy::new(&config).context("Failed to start proxy")?;
    proxy.run().context("Event loop failed")?;

    info!("Done after {:?}", start_time.elapsed());
    Ok(())
}
