// Main entry point for the application

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use arqx::common::config::{ArqConfig, ClientConfig, ServerConfig};
use arqx::common::error::{Error, TransferOutcome};
use arqx::common::types::{Protocol, DEFAULT_WINDOW_SIZE};
use arqx::validation::hash::{compare_files, Comparison, HashAlgorithm};
use arqx::{Client, Server};

#[derive(Parser)]
#[command(name = "arqx")]
#[command(about = "Reliable file transfer over UDP (Stop-and-Wait / Go-Back-N)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve files to clients
    Serve {
        /// UDP port to listen on
        #[arg(default_value_t = 9000)]
        port: u16,

        /// Bind address
        #[arg(long, default_value = "0.0.0.0")]
        bind: String,

        /// Directory requested file names are resolved against
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// ARQ protocol
        #[arg(long, value_enum, default_value_t = Protocol::StopAndWait)]
        protocol: Protocol,

        /// Probability of dropping an outgoing packet (0.0-1.0)
        #[arg(long, default_value_t = 0.0)]
        loss: f64,

        /// Probability of corrupting an outgoing packet (0.0-1.0)
        #[arg(long, default_value_t = 0.0)]
        corrupt: f64,

        /// Seed for reproducible impairment
        #[arg(long)]
        seed: Option<u64>,

        /// Go-Back-N window size
        #[arg(long, default_value_t = DEFAULT_WINDOW_SIZE)]
        window: usize,

        /// Seconds to wait for a request before shutting down
        #[arg(long)]
        idle_timeout: Option<u64>,

        /// Show a progress bar while sending
        #[arg(long)]
        progress: bool,

        /// Print per-session statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Download a file from a server
    Fetch {
        /// Server address, e.g. 127.0.0.1:9000
        server: SocketAddr,

        /// File to request
        filename: String,

        /// Where to save it (default: receive_test/recv_<filename>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// ARQ protocol; must match the server
        #[arg(long, value_enum, default_value_t = Protocol::StopAndWait)]
        protocol: Protocol,

        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare two files by digest
    Hashcheck {
        first: PathBuf,
        second: PathBuf,

        #[arg(long, value_enum, default_value_t = HashAlgorithm::Sha256)]
        algo: HashAlgorithm,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        if let Err(e) = ctrlc::set_handler(move || cancel.store(true, Ordering::SeqCst)) {
            log::warn!("Could not install Ctrl-C handler: {}", e);
        }
    }

    let code = match cli.command {
        Commands::Serve {
            port,
            bind,
            root,
            protocol,
            loss,
            corrupt,
            seed,
            window,
            idle_timeout,
            progress,
            json,
        } => serve(
            &bind, port, root, protocol, loss, corrupt, seed, window, idle_timeout, progress, json, cancel,
        ),
        Commands::Fetch {
            server,
            filename,
            output,
            protocol,
            json,
        } => fetch(server, &filename, output, protocol, json, cancel),
        Commands::Hashcheck { first, second, algo } => hashcheck(&first, &second, algo),
    };

    std::process::exit(code);
}

#[allow(clippy::too_many_arguments)]
fn serve(
    bind: &str,
    port: u16,
    root: PathBuf,
    protocol: Protocol,
    loss: f64,
    corrupt: f64,
    seed: Option<u64>,
    window: usize,
    idle_timeout: Option<u64>,
    progress: bool,
    json: bool,
    cancel: Arc<AtomicBool>,
) -> i32 {
    let result = (|| -> arqx::Result<()> {
        let bind_addr: SocketAddr = format!("{}:{}", bind, port)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid bind address {}:{}: {}", bind, port, e)))?;
        let arq = ArqConfig::default().with_window_size(window)?;

        let mut config = ServerConfig::new(bind_addr, protocol)
            .with_root(root)
            .with_impairment(loss, corrupt, seed)?
            .with_arq(arq);
        if let Some(secs) = idle_timeout {
            config = config.with_idle_timeout(Duration::from_secs(secs));
        }
        config.show_progress = progress;
        config.json_reports = json;

        let mut server = Server::bind(config)?.with_cancel(cancel);
        server.run()
    })();

    match result {
        Ok(()) => 0,
        Err(Error::Cancelled) => {
            println!("\nServer shutting down...");
            TransferOutcome::Cancelled.exit_code()
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            e.outcome().exit_code()
        }
    }
}

fn fetch(
    server: SocketAddr,
    filename: &str,
    output: Option<PathBuf>,
    protocol: Protocol,
    json: bool,
    cancel: Arc<AtomicBool>,
) -> i32 {
    let save_as = output.unwrap_or_else(|| {
        let base = Path::new(filename)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "download".to_string());
        PathBuf::from("receive_test").join(format!("recv_{}", base))
    });

    println!("Requesting file: '{}'", filename);
    println!("Will save as:    '{}'", save_as.display());
    println!("Server:          {} ({})", server, protocol);
    println!("{}", "-".repeat(50));

    let config = ClientConfig::new(server, protocol);
    let client = Client::new(config).with_cancel(cancel);

    match client.fetch(filename, &save_as) {
        Ok(report) => {
            if json {
                match serde_json::to_string_pretty(&report) {
                    Ok(s) => println!("{}", s),
                    Err(e) => eprintln!("Could not serialize report: {}", e),
                }
            } else {
                println!("\nFile transfer completed successfully!");
                println!("Saved as: '{}'", save_as.display());
                println!("{}", report);
            }
            TransferOutcome::Success.exit_code()
        }
        Err(e) => {
            let outcome = e.outcome();
            if json {
                let value = serde_json::json!({
                    "outcome": outcome,
                    "error": e.to_string(),
                    "stats": e.stats(),
                });
                println!("{}", value);
            } else {
                eprintln!("\nFile transfer failed: {}", e);
                if let Some(stats) = e.stats() {
                    println!("{}", stats);
                }
            }
            outcome.exit_code()
        }
    }
}

fn hashcheck(first: &Path, second: &Path, algo: HashAlgorithm) -> i32 {
    match compare_files(first, second, algo) {
        Ok(comparison) => {
            match &comparison {
                Comparison::Match { digest } => {
                    println!("{}  {}", digest, first.display());
                    println!("{}  {}", digest, second.display());
                    println!("MATCH ({})", algo);
                }
                Comparison::Mismatch { first: a, second: b } => {
                    println!("{}  {}", a, first.display());
                    println!("{}  {}", b, second.display());
                    println!("MISMATCH ({})", algo);
                }
                Comparison::Missing(path) => {
                    eprintln!("File not found: {}", path.display());
                }
            }
            comparison.exit_code()
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            2
        }
    }
}
