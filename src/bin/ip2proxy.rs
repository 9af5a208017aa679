mod cli_utils;
mod commands;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use ip2proxy::IoMode;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use commands::{cmd_batch, cmd_inspect, cmd_query};

#[derive(Parser)]
#[command(name = "ip2proxy")]
#[command(
    about = "Offline proxy and geolocation lookups against IP2Proxy BIN databases",
    long_about = "ip2proxy - Look up IPv4/IPv6 addresses in IP2Proxy BIN databases (PX1-PX12)\n\n\
    Answers whether an address is an anonymizing proxy, VPN, TOR exit, data center\n\
    or search engine range, plus country, region, city, ISP, ASN and threat data\n\
    where the database type carries them. No network access is needed.\n\n\
    Examples:\n\
      ip2proxy query IP2PROXY-LITE-PX4.BIN 1.2.3.4\n\
      ip2proxy query IP2PROXY-LITE-PX4.BIN 2001:db8::1 --field proxyType --io-mode mmap\n\
      ip2proxy inspect IP2PROXY-LITE-PX4.BIN --json\n\
      ip2proxy batch IP2PROXY-LITE-PX4.BIN addresses.txt.gz -j 8"
)]
#[command(version)]
struct Cli {
    /// Log to stderr (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up a single address
    Query {
        /// Path to the IP2Proxy BIN file
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// IPv4 or IPv6 address
        #[arg(value_name = "IP")]
        ip: String,

        /// Print a single attribute (e.g. proxyType, countryCode, isp) instead of JSON
        #[arg(short, long)]
        field: Option<String>,

        /// How to read the database: buffered (file handle per lookup) or mmap
        #[arg(long, value_name = "MODE", default_value_t = IoMode::Buffered)]
        io_mode: IoMode,

        /// Quiet mode - no output, only exit code (0 = found, 1 = not found)
        #[arg(short, long)]
        quiet: bool,
    },

    /// Show header information for a BIN file
    Inspect {
        /// Path to the IP2Proxy BIN file
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Look up addresses from files or stdin (one per line), NDJSON output
    Batch {
        /// Path to the IP2Proxy BIN file
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Input files (plain or gzip), or "-" for stdin
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,

        /// Number of worker threads (default: all cores)
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        /// How to read the database: buffered (file handle per lookup) or mmap
        #[arg(long, value_name = "MODE", default_value_t = IoMode::Buffered)]
        io_mode: IoMode,

        /// Print summary statistics to stderr
        #[arg(short, long)]
        stats: bool,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "ip2proxy=debug",
        _ => "ip2proxy=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Query {
            database,
            ip,
            field,
            io_mode,
            quiet,
        } => cmd_query(database, ip, field, io_mode, quiet),
        Commands::Inspect { database, json } => cmd_inspect(database, json),
        Commands::Batch {
            database,
            inputs,
            threads,
            io_mode,
            stats,
        } => cmd_batch(database, inputs, threads, io_mode, stats),
    }
}
