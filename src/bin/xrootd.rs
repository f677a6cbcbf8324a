//! xrootd server CLI binary.
//!
//! # Commands
//!
//! - `serve` - Accept xrootd connections with the built-in base handler
//! - `decode` - Decode a captured client byte stream and print its requests

use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bytes::BytesMut;
use clap::{Parser, Subcommand, ValueEnum};
use xrootd::{
    config::{Config, SessionMode},
    protocol::{Request, ServerRole},
    BaseHandlerFactory, FrameDecoder, TcpTransport, Transport, VERSION,
};

#[derive(Parser)]
#[command(name = "xrootd")]
#[command(version = VERSION)]
#[command(about = "xrootd protocol server engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the xrootd server
    Serve {
        /// Config file (default: <config dir>/xrootd/config.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Listen port
        #[arg(short, long)]
        port: Option<u16>,

        /// Listen host
        #[arg(long)]
        host: Option<String>,

        /// Bind to all interfaces
        #[arg(long)]
        bind_all: bool,

        /// Role announced in the handshake
        #[arg(long, value_enum)]
        role: Option<RoleArg>,

        /// Session mode
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Maximum logical streams per connection
        #[arg(long)]
        max_streams: Option<usize>,

        /// Close connections without open files after this many seconds
        #[arg(long)]
        idle_timeout: Option<u64>,

        /// Log as JSON lines
        #[arg(long)]
        json: bool,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,
    },

    /// Decode captured client bytes (handshake first) and print the requests
    Decode {
        /// Input file path (default: stdin)
        file: Option<PathBuf>,

        /// Print full request contents
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    LoadBalancer,
    DataServer,
}

impl From<RoleArg> for ServerRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::LoadBalancer => ServerRole::LoadBalancer,
            RoleArg::DataServer => ServerRole::DataServer,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Multiplexed,
    Dedicated,
    Direct,
}

impl From<ModeArg> for SessionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Multiplexed => SessionMode::Multiplexed,
            ModeArg::Dedicated => SessionMode::Dedicated,
            ModeArg::Direct => SessionMode::Direct,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            port,
            host,
            bind_all,
            role,
            mode,
            max_streams,
            idle_timeout,
            json,
            verbose,
        } => {
            init_logging(verbose, json);

            let mut config = match config {
                Some(path) => Config::from_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => Config::load_default()?,
            }
            .with_env();

            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            if bind_all {
                config.server.host = "0.0.0.0".to_string();
            }
            if let Some(role) = role {
                config.server.role = role.into();
            }
            if let Some(mode) = mode {
                config.sessions.mode = mode.into();
            }
            if let Some(max_streams) = max_streams {
                config.sessions.max_streams = max_streams;
            }
            if let Some(secs) = idle_timeout {
                config.sessions.idle_timeout_secs = secs;
            }

            cmd_serve(&config)
        },

        Commands::Decode { file, verbose } => cmd_decode(file, verbose),
    }
}

fn init_logging(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn cmd_serve(config: &Config) -> anyhow::Result<()> {
    let server = config.server_config()?;
    let transport = TcpTransport::new(server.addr);

    tracing::info!("Starting xrootd {} on {}", VERSION, transport.listen_addr());
    tracing::info!("Sessions: {}", server.connection.policy);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        tokio::select! {
            result = transport.serve(server.connection, Arc::new(BaseHandlerFactory)) => {
                result?;
            },
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("Shutting down");
            },
        }
        Ok::<_, anyhow::Error>(())
    })
}

fn cmd_decode(file: Option<PathBuf>, verbose: bool) -> anyhow::Result<()> {
    let bytes = match file {
        Some(path) => std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf)?;
            buf
        },
    };

    let mut buf = BytesMut::from(&bytes[..]);
    let mut decoder = FrameDecoder::new();
    let mut count = 0usize;

    while let Some(request) = decoder.decode(&mut buf)? {
        count += 1;
        print_request(&request, verbose);
    }

    if !buf.is_empty() {
        eprintln!("{} trailing bytes (incomplete frame)", buf.len());
    }
    eprintln!("{count} frames decoded");
    Ok(())
}

fn print_request(request: &Request, verbose: bool) {
    match request {
        Request::Handshake(hs) => println!("handshake  {} bytes", hs.payload.len()),
        Request::Open(open) => println!(
            "sid {:>5}  {:<14} {} flags={}",
            open.stream_id,
            request.kind().name(),
            open.path,
            open.flags
        ),
        _ => println!("sid {:>5}  {}", request.stream_id(), request.kind().name()),
    }
    if verbose {
        println!("           {request:?}");
    }
}
